//! Payment records and their status machine.

use chrono::{DateTime, Utc};
use common::{PaymentId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// The status of a payment in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           ├──► Failed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created at checkout start, awaiting the gateway outcome.
    #[default]
    Pending,

    /// Gateway accepted the charge (terminal state).
    Completed,

    /// Gateway declined the charge (terminal state).
    Failed,

    /// Abandoned before settlement (terminal state).
    Cancelled,
}

impl PaymentStatus {
    /// Returns true if a gateway outcome can still be applied.
    pub fn can_settle(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if the payment can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Identifier of the payment instrument (e.g. `credit_card`, `paypal`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    /// Parses a caller-supplied method, rejecting blank values.
    pub fn parse(method: &str) -> Result<Self, DomainError> {
        let trimmed = method.trim();
        if trimmed.is_empty() {
            return Err(DomainError::PaymentMethodRequired);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the payment gateway reported for a single charge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOutcome {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub message: String,
}

impl GatewayOutcome {
    pub fn approved(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            message: message.into(),
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            message: message.into(),
        }
    }
}

/// Payment to be inserted; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
}

/// A persisted payment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Applies a gateway outcome, moving to `Completed` or `Failed`.
    pub fn settle(&mut self, outcome: &GatewayOutcome, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_settle() {
            return Err(DomainError::InvalidPaymentTransition {
                current: self.status,
                action: "settle",
            });
        }

        if outcome.success {
            self.status = PaymentStatus::Completed;
            self.gateway_transaction_id = outcome.transaction_id.clone();
        } else {
            self.status = PaymentStatus::Failed;
        }
        self.gateway_response = Some(outcome.message.clone());
        self.updated_at = now;
        Ok(())
    }

    /// Cancels a pending payment.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_cancel() {
            return Err(DomainError::InvalidPaymentTransition {
                current: self.status,
                action: "cancel",
            });
        }
        self.status = PaymentStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}
