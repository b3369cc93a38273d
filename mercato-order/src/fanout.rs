use crate::models::Order;
use crate::repository::OrderRepository;
use async_trait::async_trait;
use chrono::Utc;
use mercato_core::{Identity, IdentityError, IdentityVerifier};
use mercato_shared::{ChangeKind, OrderChangedEvent};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Realtime subscription topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Order(Uuid),
    User(String),
    Admins,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Order(id) => write!(f, "order:{}", id),
            Topic::User(id) => write!(f, "user:{}", id),
            Topic::Admins => f.write_str("role:admin"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Realtime transport unavailable: {0}")]
    Unavailable(String),
}

/// Topic-based delivery of order events to connected observers.
#[async_trait]
pub trait Transport: Send + Sync {
    fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<OrderChangedEvent>;

    /// Called after a receiver of `topic` has been dropped.
    fn release(&self, topic: &Topic);

    /// Returns how many receivers the event reached.
    async fn publish(&self, topic: &Topic, event: &OrderChangedEvent) -> Result<usize, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error(transparent)]
    Unauthenticated(#[from] IdentityError),
}

/// One realtime connection's set of topics.
///
/// Dropping the subscription releases every topic it still holds.
pub struct Subscription {
    identity: Identity,
    transport: Arc<dyn Transport>,
    streams: StreamMap<Topic, BroadcastStream<OrderChangedEvent>>,
}

impl Subscription {
    fn new(identity: Identity, transport: Arc<dyn Transport>) -> Self {
        Self {
            identity,
            transport,
            streams: StreamMap::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.streams.contains_key(topic)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.streams.keys().cloned().collect()
    }

    fn add(&mut self, topic: Topic) {
        if self.streams.contains_key(&topic) {
            return;
        }
        let rx = self.transport.subscribe(&topic);
        self.streams.insert(topic, BroadcastStream::new(rx));
    }

    fn remove(&mut self, topic: &Topic) -> bool {
        if self.streams.remove(topic).is_some() {
            self.transport.release(topic);
            true
        } else {
            false
        }
    }

    /// Next event on any subscribed topic.
    ///
    /// A receiver that fell behind skips what it missed and keeps going.
    pub async fn next(&mut self) -> Option<(Topic, OrderChangedEvent)> {
        loop {
            match self.streams.next().await? {
                (topic, Ok(event)) => return Some((topic, event)),
                (topic, Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(user_id = %self.identity.user_id, %topic, skipped, "Realtime observer lagged, events dropped");
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for topic in self.topics() {
            self.remove(&topic);
        }
    }
}

/// Routes order events to the owner, every administrator and anyone
/// currently viewing the order.
pub struct FanoutRouter {
    transport: Arc<dyn Transport>,
    verifier: Arc<dyn IdentityVerifier>,
    orders: Arc<dyn OrderRepository>,
    publish_timeout: Duration,
}

impl FanoutRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn IdentityVerifier>,
        orders: Arc<dyn OrderRepository>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            verifier,
            orders,
            publish_timeout,
        }
    }

    /// Authenticate a connection and subscribe it to its standing topics.
    pub fn connect(&self, credential: &str) -> Result<Subscription, FanoutError> {
        let identity = self.verifier.verify(credential)?;
        let mut subscription = Subscription::new(identity.clone(), self.transport.clone());

        subscription.add(Topic::User(identity.user_id.clone()));
        if identity.is_admin() {
            subscription.add(Topic::Admins);
        }

        info!(user_id = %identity.user_id, role = %identity.role, "Realtime observer connected");
        Ok(subscription)
    }

    /// Join `order:<id>` if the caller may view the order.
    ///
    /// Denials, unknown orders and lookup failures all return false without
    /// telling the caller which one happened.
    pub async fn join_order(&self, subscription: &mut Subscription, order_id: Uuid) -> bool {
        let order = match self.orders.load(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                debug!(%order_id, "Join ignored, order does not exist");
                return false;
            }
            Err(e) => {
                warn!(%order_id, "Join denied, order lookup failed: {}", e);
                return false;
            }
        };

        if !subscription.identity().can_view(&order.owner_id) {
            warn!(
                %order_id,
                user_id = %subscription.identity().user_id,
                "Join denied, requester does not own the order"
            );
            return false;
        }

        subscription.add(Topic::Order(order_id));
        true
    }

    pub fn leave_order(&self, subscription: &mut Subscription, order_id: Uuid) -> bool {
        subscription.remove(&Topic::Order(order_id))
    }

    /// Publish a change to `order:<id>`, `user:<owner>` and `role:admin`.
    ///
    /// Best effort: failures and timeouts are logged, never returned.
    /// Returns the number of receivers reached.
    pub async fn broadcast(&self, order: &Order, kind: ChangeKind) -> usize {
        let snapshot = match serde_json::to_value(order) {
            Ok(value) => value,
            Err(e) => {
                warn!(order_id = %order.id, "Failed to serialize order for fanout: {}", e);
                return 0;
            }
        };

        let event = OrderChangedEvent {
            order_id: order.id,
            owner_id: order.owner_id.clone(),
            kind,
            order_status: order.order_status.to_string(),
            payment_status: order.payment_status.to_string(),
            order: snapshot,
            occurred_at: Utc::now(),
        };

        let mut delivered = 0;
        for topic in [
            Topic::Order(order.id),
            Topic::User(order.owner_id.clone()),
            Topic::Admins,
        ] {
            match tokio::time::timeout(self.publish_timeout, self.transport.publish(&topic, &event)).await {
                Ok(Ok(count)) => delivered += count,
                Ok(Err(e)) => warn!(order_id = %order.id, %topic, "Fanout publish failed: {}", e),
                Err(_) => warn!(order_id = %order.id, %topic, "Fanout publish timed out"),
            }
        }

        debug!(order_id = %order.id, kind = ?kind, delivered, "Order change broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::TopicHub;
    use crate::models::OrderItem;
    use crate::repository::InMemoryOrderRepository;
    use mercato_core::Role;

    /// Credentials of the form `<role>:<user>`
    struct StaticVerifier;

    impl IdentityVerifier for StaticVerifier {
        fn verify(&self, credential: &str) -> Result<Identity, IdentityError> {
            let (role, user) = credential
                .split_once(':')
                .ok_or_else(|| IdentityError::Unauthenticated("malformed".to_string()))?;
            Ok(Identity {
                user_id: user.to_string(),
                role: role.parse::<Role>()?,
            })
        }
    }

    async fn setup() -> (FanoutRouter, Arc<TopicHub>, Order) {
        let hub = Arc::new(TopicHub::default());
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order = Order::new("alice", vec![OrderItem::new(Uuid::new_v4(), 1, 100)], "EUR").unwrap();
        let order = repo.save(&order, None).await.unwrap();

        let router = FanoutRouter::new(hub.clone(), Arc::new(StaticVerifier), repo, Duration::from_secs(1));
        (router, hub, order)
    }

    async fn next_event(subscription: &mut Subscription) -> Option<(Topic, OrderChangedEvent)> {
        tokio::time::timeout(Duration::from_millis(50), subscription.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_connect_subscribes_standing_topics() {
        let (router, _, _) = setup().await;

        let customer = router.connect("customer:alice").unwrap();
        assert_eq!(customer.topics(), vec![Topic::User("alice".to_string())]);

        let admin = router.connect("admin:root").unwrap();
        assert!(admin.is_subscribed(&Topic::Admins));
        assert!(admin.is_subscribed(&Topic::User("root".to_string())));
    }

    #[tokio::test]
    async fn test_bad_credential_rejected() {
        let (router, _, _) = setup().await;
        assert!(router.connect("garbage").is_err());
        assert!(router.connect("wizard:merlin").is_err());
    }

    #[tokio::test]
    async fn test_owner_and_admin_receive_change() {
        let (router, _, order) = setup().await;
        let mut owner = router.connect("customer:alice").unwrap();
        let mut admin = router.connect("admin:root").unwrap();

        let delivered = router.broadcast(&order, ChangeKind::Updated).await;
        assert_eq!(delivered, 2);

        let (topic, event) = next_event(&mut owner).await.unwrap();
        assert_eq!(topic, Topic::User("alice".to_string()));
        assert_eq!(event.order_id, order.id);

        let (topic, _) = next_event(&mut admin).await.unwrap();
        assert_eq!(topic, Topic::Admins);
    }

    #[tokio::test]
    async fn test_stranger_cannot_join_order() {
        let (router, _, order) = setup().await;
        let mut stranger = router.connect("customer:mallory").unwrap();

        assert!(!router.join_order(&mut stranger, order.id).await);
        assert!(!stranger.is_subscribed(&Topic::Order(order.id)));

        router.broadcast(&order, ChangeKind::Updated).await;
        assert!(next_event(&mut stranger).await.is_none());
    }

    #[tokio::test]
    async fn test_owner_and_admin_can_join_order() {
        let (router, _, order) = setup().await;
        let mut owner = router.connect("customer:alice").unwrap();
        let mut admin = router.connect("admin:root").unwrap();

        assert!(router.join_order(&mut owner, order.id).await);
        assert!(router.join_order(&mut admin, order.id).await);
        assert!(!router.join_order(&mut admin, Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_topics_pruned_on_leave_and_disconnect() {
        let (router, hub, order) = setup().await;
        let mut owner = router.connect("customer:alice").unwrap();
        router.join_order(&mut owner, order.id).await;
        assert_eq!(hub.topic_count(), 2);

        assert!(router.leave_order(&mut owner, order.id));
        assert_eq!(hub.subscriber_count(&Topic::Order(order.id)), 0);
        assert_eq!(hub.topic_count(), 1);

        drop(owner);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn test_topic_names() {
        let id = Uuid::nil();
        assert_eq!(Topic::Order(id).to_string(), format!("order:{}", id));
        assert_eq!(Topic::User("42".to_string()).to_string(), "user:42");
        assert_eq!(Topic::Admins.to_string(), "role:admin");
    }

    /// Hub whose order topics error and whose user topics never answer
    struct FlakyTransport {
        hub: TopicHub,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<OrderChangedEvent> {
            self.hub.subscribe(topic)
        }

        fn release(&self, topic: &Topic) {
            self.hub.release(topic)
        }

        async fn publish(&self, topic: &Topic, event: &OrderChangedEvent) -> Result<usize, TransportError> {
            match topic {
                Topic::Order(_) => Err(TransportError::Unavailable("broker down".to_string())),
                Topic::User(_) => std::future::pending().await,
                Topic::Admins => self.hub.publish(topic, event).await,
            }
        }
    }

    #[tokio::test]
    async fn test_failed_topics_do_not_block_the_rest() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order = Order::new("alice", vec![OrderItem::new(Uuid::new_v4(), 1, 100)], "EUR").unwrap();
        let order = repo.save(&order, None).await.unwrap();
        let transport = Arc::new(FlakyTransport { hub: TopicHub::default() });
        let router = FanoutRouter::new(transport, Arc::new(StaticVerifier), repo, Duration::from_millis(20));

        let mut owner = router.connect("customer:alice").unwrap();
        assert!(router.join_order(&mut owner, order.id).await);
        let mut admin = router.connect("admin:root").unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(1), router.broadcast(&order, ChangeKind::Updated))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let (topic, _) = next_event(&mut admin).await.unwrap();
        assert_eq!(topic, Topic::Admins);
        assert!(next_event(&mut owner).await.is_none());
    }
}
