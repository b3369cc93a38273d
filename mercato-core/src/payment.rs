use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Normalize a free-text gateway status.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace. An empty
    /// string means the gateway has not reported yet.
    pub fn normalize(raw: &str) -> Result<Self, PaymentError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "succeeded" | "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "" | "pending" => Ok(PaymentStatus::Pending),
            _ => Err(PaymentError::UnrecognizedStatus(raw.trim().to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Unrecognized payment status: {0:?}")]
    UnrecognizedStatus(String),
}

/// Opaque confirmation pushed by the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub order_id: Uuid,
    pub status: String,
    pub reference: Option<String>,
}
