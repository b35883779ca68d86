use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentAttemptState {
    Idle,
    AwaitingGatewayReturn,
    Reconciling,
    Paid,
    Cancelled,
}

impl PaymentAttemptState {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptEvent {
    CheckoutStarted,
    GatewayReturned,
    ConfirmedPaid,
    ConfirmedCancelled,
    /// The reconcile call failed in transport; the claim is released.
    ReconcileFailed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AttemptTransitionError {
    #[error("invalid payment attempt transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PaymentAttemptState, event: AttemptEvent },
}

/// A gateway return may arrive in a fresh process that never saw the checkout,
/// so `Idle` accepts `GatewayReturned` as well.
pub fn transition(
    current: PaymentAttemptState,
    event: AttemptEvent,
) -> Result<PaymentAttemptState, AttemptTransitionError> {
    use AttemptEvent::{
        CheckoutStarted, ConfirmedCancelled, ConfirmedPaid, GatewayReturned, ReconcileFailed,
    };
    use PaymentAttemptState::{AwaitingGatewayReturn, Cancelled, Idle, Paid, Reconciling};

    let next = match (current, event) {
        (Idle, CheckoutStarted) => AwaitingGatewayReturn,
        (Idle, GatewayReturned) | (AwaitingGatewayReturn, GatewayReturned) => Reconciling,
        (Reconciling, ConfirmedPaid) => Paid,
        (Reconciling, ConfirmedCancelled) => Cancelled,
        (Reconciling, ReconcileFailed) => AwaitingGatewayReturn,
        _ => return Err(AttemptTransitionError::InvalidTransition { state: current, event }),
    };
    Ok(next)
}
