//! Orders created from a settled cart.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::{CartLine, total_of};
use crate::error::DomainError;
use crate::money::Money;

/// The status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    /// Paid and stock taken.
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            // older rows used "completed" for the same state
            "confirmed" | "completed" => Ok(OrderStatus::Confirmed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// One product line of an order, priced at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or(DomainError::AmountOverflow {
                context: "order line total",
            })
    }

    /// Prices an order line from the cart line's fee snapshot.
    pub fn from_cart_line(order_id: OrderId, line: &CartLine) -> Self {
        Self {
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.fee,
        }
    }
}

/// Order header to be inserted; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_id: Option<PaymentId>,
    pub total: Money,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Builds a confirmed order header whose total is the sum of the cart
    /// lines at their fee snapshot.
    pub fn confirmed_from_cart(
        user_id: UserId,
        payment_id: PaymentId,
        lines: &[CartLine],
    ) -> Result<Self, DomainError> {
        Ok(Self {
            user_id,
            payment_id: Some(payment_id),
            total: total_of(lines)?,
            status: OrderStatus::Confirmed,
        })
    }
}

/// A persisted order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub payment_id: Option<PaymentId>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmed_from_cart_totals_fee_snapshot() {
        let user_id = UserId::new();
        let now = Utc::now();
        let lines = vec![
            CartLine {
                user_id,
                product_id: ProductId::new(),
                quantity: 2,
                fee: Money::from_cents(1000),
                created_at: now,
                updated_at: now,
            },
            CartLine {
                user_id,
                product_id: ProductId::new(),
                quantity: 1,
                fee: Money::from_cents(500),
                created_at: now,
                updated_at: now,
            },
        ];

        let payment_id = PaymentId::new();
        let order = NewOrder::confirmed_from_cart(user_id, payment_id, &lines).unwrap();

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_id, Some(payment_id));
        assert_eq!(order.total, Money::from_cents(2500));

        let order_id = OrderId::new();
        let line = OrderLine::from_cart_line(order_id, &lines[0]);
        assert_eq!(line.unit_price, Money::from_cents(1000));
        assert_eq!(line.line_total(), Ok(Money::from_cents(2000)));
    }

    #[test]
    fn confirmed_from_cart_rejects_total_overflow() {
        let user_id = UserId::new();
        let now = Utc::now();
        let line = |cents: i64| CartLine {
            user_id,
            product_id: ProductId::new(),
            quantity: 2,
            fee: Money::from_cents(cents),
            created_at: now,
            updated_at: now,
        };

        let err = NewOrder::confirmed_from_cart(
            user_id,
            PaymentId::new(),
            &[line(4_000_000_000_000_000_000), line(1_000_000_000_000_000_000)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::AmountOverflow { .. }));
    }

    #[test]
    fn status_accepts_legacy_completed() {
        assert_eq!(
            "completed".parse::<OrderStatus>().unwrap(),
            OrderStatus::Confirmed
        );
        assert_eq!(OrderStatus::Confirmed.to_string(), "confirmed");
    }
}
