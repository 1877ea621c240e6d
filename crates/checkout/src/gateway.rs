//! Payment gateway trait and implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::{GatewayOutcome, Money, PaymentMethod};
use rand::Rng;

use crate::error::CheckoutError;

/// Trait for charging a payment instrument.
///
/// A declined charge is a normal outcome (`success == false`); `Err` is
/// reserved for the gateway being unreachable.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<GatewayOutcome, CheckoutError>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
    async fn charge(
        &self,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<GatewayOutcome, CheckoutError> {
        (**self).charge(amount, method).await
    }
}

/// Gateway that approves charges at random after a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    success_rate: f64,
    delay: Duration,
}

impl SimulatedGateway {
    /// Creates a gateway approving roughly `success_rate` of charges.
    /// The rate is clamped to `0.0..=1.0`.
    pub fn new(success_rate: f64, delay: Duration) -> Self {
        let success_rate = if success_rate.is_nan() {
            0.0
        } else {
            success_rate.clamp(0.0, 1.0)
        };
        Self {
            success_rate,
            delay,
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(0.5, Duration::ZERO)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    #[tracing::instrument(skip(self))]
    async fn charge(
        &self,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<GatewayOutcome, CheckoutError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        // ThreadRng is !Send; keep it out of any await.
        let (approved, reference) = {
            let mut rng = rand::rng();
            (
                rng.random_bool(self.success_rate),
                rng.random_range(100_000..1_000_000u32),
            )
        };

        if approved {
            Ok(GatewayOutcome::approved(
                format!("TXN-{reference}"),
                format!("{method} charge of {amount} approved"),
            ))
        } else {
            Ok(GatewayOutcome::declined(format!(
                "{method} charge of {amount} declined"
            )))
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    decline: AtomicBool,
    unavailable: AtomicBool,
    charges: AtomicU32,
}

/// Deterministic gateway for testing and fixed configurations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<InMemoryGatewayState>,
}

impl InMemoryGateway {
    /// Creates a gateway that approves every charge.
    pub fn approving() -> Self {
        Self::default()
    }

    /// Creates a gateway that declines every charge.
    pub fn declining() -> Self {
        let gateway = Self::default();
        gateway.set_decline(true);
        gateway
    }

    /// Configures the gateway to decline subsequent charges.
    pub fn set_decline(&self, decline: bool) {
        self.state.decline.store(decline, Ordering::SeqCst);
    }

    /// Configures the gateway to fail subsequent charges with an error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of charge attempts that reached the gateway.
    pub fn charge_count(&self) -> u32 {
        self.state.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn charge(
        &self,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<GatewayOutcome, CheckoutError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(CheckoutError::Gateway("gateway unavailable".to_string()));
        }

        let n = self.state.charges.fetch_add(1, Ordering::SeqCst) + 1;

        if self.state.decline.load(Ordering::SeqCst) {
            return Ok(GatewayOutcome::declined(format!(
                "{method} charge of {amount} declined"
            )));
        }

        Ok(GatewayOutcome::approved(
            format!("TXN-{n:04}"),
            format!("{method} charge of {amount} approved"),
        ))
    }
}
