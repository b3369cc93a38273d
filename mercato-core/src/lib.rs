//! Contracts shared by every Mercato crate: who is calling, what the payment
//! gateway told us, and how transactional mail leaves the system.

pub mod identity;
pub mod mailer;
pub mod payment;

pub use identity::{Identity, IdentityError, IdentityVerifier, Role};
pub use mailer::{EmailMessage, LogMailer, Mailer, SendError};
pub use payment::{PaymentError, PaymentEvent, PaymentStatus};
