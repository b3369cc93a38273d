use anyhow::Context;
use mercato_api::{app, middleware::JwtVerifier, AppState};
use mercato_core::{LogMailer, Mailer};
use mercato_order::{FanoutRouter, OrderService, ServiceSettings, StockLedger, TopicHub};
use mercato_store::{Config, DbClient, HttpMailer, PgOrderRepository, PgStockStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercato_api=debug,mercato_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Mercato API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let db = Arc::new(db);

    // Redis (optional, rate limiting only)
    let redis = match config.redis.url.as_deref() {
        Some(url) => match RedisClient::new(url) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let notifications = &config.notifications;
    let mailer: Arc<dyn Mailer> = match notifications.mail_relay_url.as_deref() {
        Some(url) => Arc::new(HttpMailer::new(url, notifications.side_effect_timeout())?),
        None => Arc::new(LogMailer),
    };

    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
    let orders = Arc::new(PgOrderRepository::new(db.pool.clone()));
    let ledger = StockLedger::new(Arc::new(PgStockStore::new(db.pool.clone())));

    let fanout = Arc::new(FanoutRouter::new(
        Arc::new(TopicHub::new(notifications.channel_capacity)),
        verifier.clone(),
        orders.clone(),
        notifications.side_effect_timeout(),
    ));

    let settings = ServiceSettings {
        return_window: chrono::Duration::days(config.business_rules.return_window_days),
        max_save_attempts: config.business_rules.max_save_attempts,
        admin_alert_email: notifications.admin_alert_email.clone(),
        side_effect_timeout: notifications.side_effect_timeout(),
    };
    let service = Arc::new(OrderService::new(orders, ledger, fanout.clone(), mailer, settings));

    let shutdown = CancellationToken::new();
    let app_state = AppState {
        orders: service,
        fanout,
        verifier,
        db: Some(db),
        redis,
        webhook_secret: Arc::from(config.webhooks.payment_secret.as_str()),
        shutdown: shutdown.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C and cancels every realtime connection
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, closing realtime connections");
    shutdown.cancel();
}
