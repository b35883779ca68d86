//! Gateway checkout and return-path reconciliation.
//!
//! Starting a payment leaves the application, so the intent is persisted before
//! navigation and read back when the gateway routes the customer home. Each order
//! code is reconciled at most once per process: the attempt map is checked and
//! updated under one lock acquisition before any collaborator call is awaited.
//! Settled order codes also leave a marker in the store so a reloaded process
//! replaying the same return does not reach the gateway again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::domain::booking::{BookingId, BookingStatus};
use crate::domain::payment::{OrderCode, PaymentIntent, PaymentKind};
use crate::errors::{PortalError, StoreError};
use crate::payment::attempt::{transition, AttemptEvent, PaymentAttemptState};
use crate::ports::{
    BookingService, CheckoutSession, KeyValueStore, Navigator, PaymentGateway, PaymentStatus,
    ReconcileRequest,
};
use crate::status::normalize_or_default;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Paid { booking_id: BookingId, kind: PaymentKind },
    Cancelled { booking_id: BookingId, kind: PaymentKind },
    /// The gateway answered but reported `success = false`.
    Rejected { booking_id: BookingId, kind: PaymentKind },
    AlreadyProcessed,
    NothingToReconcile,
}

impl ReconcileOutcome {
    fn settled_status(&self) -> Option<&'static str> {
        match self {
            Self::Paid { .. } => Some("PAID"),
            Self::Cancelled { .. } => Some("CANCELLED"),
            Self::Rejected { .. } => Some("REJECTED"),
            Self::AlreadyProcessed | Self::NothingToReconcile => None,
        }
    }

    pub fn booking_id(&self) -> Option<&BookingId> {
        match self {
            Self::Paid { booking_id, .. }
            | Self::Cancelled { booking_id, .. }
            | Self::Rejected { booking_id, .. } => Some(booking_id),
            Self::AlreadyProcessed | Self::NothingToReconcile => None,
        }
    }
}

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    bookings: Arc<dyn BookingService>,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    attempts: Mutex<HashMap<OrderCode, PaymentAttemptState>>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<dyn BookingService>,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self { gateway, bookings, store, navigator, attempts: Mutex::new(HashMap::new()) }
    }

    fn attempts(&self) -> MutexGuard<'_, HashMap<OrderCode, PaymentAttemptState>> {
        self.attempts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn attempt_state(&self, order_code: &OrderCode) -> PaymentAttemptState {
        self.attempts().get(order_code).copied().unwrap_or(PaymentAttemptState::Idle)
    }

    /// Requests a checkout session, persists the intent, then navigates away.
    pub async fn initiate(
        &self,
        booking_id: &BookingId,
        kind: PaymentKind,
    ) -> Result<CheckoutSession, PortalError> {
        let session = self.gateway.initiate_checkout(booking_id, kind).await?;
        if session.order_code.0.trim().is_empty() || session.redirect_url.trim().is_empty() {
            return Err(PortalError::Rejected(format!(
                "checkout for booking {booking_id} returned no order code or redirect"
            )));
        }

        let intent = PaymentIntent::new(session.order_code.clone(), booking_id.clone(), kind);
        let encoded = intent.to_json().map_err(|error| StoreError::Corrupt {
            key: PaymentIntent::STORAGE_KEY.to_string(),
            message: error.to_string(),
        })?;
        self.store.set(PaymentIntent::STORAGE_KEY, &encoded).await?;

        {
            let mut attempts = self.attempts();
            let current =
                attempts.get(&session.order_code).copied().unwrap_or(PaymentAttemptState::Idle);
            match transition(current, AttemptEvent::CheckoutStarted) {
                Ok(next) => {
                    attempts.insert(session.order_code.clone(), next);
                }
                Err(error) => {
                    warn!(
                        event_name = "payment.checkout.reused_order_code",
                        order_code = %session.order_code,
                        error = %error,
                        "gateway issued an order code that was already used"
                    );
                }
            }
        }

        info!(
            event_name = "payment.checkout.started",
            booking_id = %booking_id,
            order_code = %session.order_code,
            kind = %kind,
            "payment intent persisted, redirecting to gateway"
        );
        self.navigator.navigate(&session.redirect_url);
        Ok(session)
    }

    pub async fn pending_intent(&self) -> Result<Option<PaymentIntent>, PortalError> {
        let Some(raw) = self.store.get(PaymentIntent::STORAGE_KEY).await? else {
            return Ok(None);
        };
        let intent = PaymentIntent::from_json(&raw).map_err(|error| StoreError::Corrupt {
            key: PaymentIntent::STORAGE_KEY.to_string(),
            message: error.to_string(),
        })?;
        Ok(Some(intent))
    }

    /// Handles a gateway return. `routed_booking` is the booking id carried by
    /// the return route, used only when no intent was persisted.
    pub async fn reconcile(
        &self,
        order_code: &OrderCode,
        raw_status: &str,
        routed_booking: Option<&BookingId>,
    ) -> Result<ReconcileOutcome, PortalError> {
        if !self.begin(order_code) {
            debug!(
                event_name = "payment.reconcile.duplicate",
                order_code = %order_code,
                "gateway return already handled"
            );
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        if let Some(settled) = self.settled_marker(order_code).await {
            let event = if settled == "PAID" {
                AttemptEvent::ConfirmedPaid
            } else {
                AttemptEvent::ConfirmedCancelled
            };
            self.finish(order_code, event);
            info!(
                event_name = "payment.reconcile.replayed",
                order_code = %order_code,
                settled = %settled,
                "gateway return was settled by an earlier process"
            );
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let (intent, stored) = match self.pending_intent().await {
            Ok(intent) => {
                let stored = intent.is_some();
                (intent, stored)
            }
            Err(error) => {
                warn!(
                    event_name = "payment.intent.unreadable",
                    order_code = %order_code,
                    error = %error,
                    "stored payment intent unreadable, treating as missing"
                );
                (None, true)
            }
        };

        let result = self.settle(order_code, raw_status, intent, routed_booking).await;

        if let Some(settled) = result.as_ref().ok().and_then(ReconcileOutcome::settled_status) {
            if let Err(error) = self.store.set(&order_code.processed_key(), settled).await {
                warn!(
                    event_name = "payment.reconcile.marker_failed",
                    order_code = %order_code,
                    error = %error,
                    "failed to record settled order code"
                );
            }
        }

        if stored {
            if let Err(error) = self.store.delete(PaymentIntent::STORAGE_KEY).await {
                warn!(
                    event_name = "payment.intent.delete_failed",
                    order_code = %order_code,
                    error = %error,
                    "failed to clear stored payment intent"
                );
            }
        }
        result
    }

    async fn settled_marker(&self, order_code: &OrderCode) -> Option<String> {
        match self.store.get(&order_code.processed_key()).await {
            Ok(marker) => marker,
            Err(error) => {
                warn!(
                    event_name = "payment.reconcile.marker_unreadable",
                    order_code = %order_code,
                    error = %error,
                    "settled marker unreadable, reconciling anyway"
                );
                None
            }
        }
    }

    /// Claims the order code; false when it was already being reconciled or settled.
    fn begin(&self, order_code: &OrderCode) -> bool {
        let mut attempts = self.attempts();
        let current = attempts.get(order_code).copied().unwrap_or(PaymentAttemptState::Idle);
        match transition(current, AttemptEvent::GatewayReturned) {
            Ok(next) => {
                attempts.insert(order_code.clone(), next);
                true
            }
            Err(_) => false,
        }
    }

    fn finish(&self, order_code: &OrderCode, event: AttemptEvent) {
        let mut attempts = self.attempts();
        let current = attempts.get(order_code).copied().unwrap_or(PaymentAttemptState::Idle);
        match transition(current, event) {
            Ok(next) => {
                attempts.insert(order_code.clone(), next);
            }
            Err(error) => {
                warn!(
                    event_name = "payment.attempt.invalid_transition",
                    order_code = %order_code,
                    error = %error,
                    "payment attempt state rejected settlement"
                );
            }
        }
    }

    async fn settle(
        &self,
        order_code: &OrderCode,
        raw_status: &str,
        intent: Option<PaymentIntent>,
        routed_booking: Option<&BookingId>,
    ) -> Result<ReconcileOutcome, PortalError> {
        let (booking_id, kind) = match intent {
            Some(intent) => {
                if &intent.order_code != order_code {
                    warn!(
                        event_name = "payment.intent.order_mismatch",
                        stored_order_code = %intent.order_code,
                        order_code = %order_code,
                        "stored intent belongs to another order, using the returned order code"
                    );
                }
                (intent.booking_id, intent.kind)
            }
            None => {
                let Some(booking_id) = routed_booking else {
                    info!(
                        event_name = "payment.reconcile.nothing",
                        order_code = %order_code,
                        "no stored intent and no routed booking"
                    );
                    return Ok(ReconcileOutcome::NothingToReconcile);
                };
                let Some(kind) = self.payable_kind(booking_id).await? else {
                    info!(
                        event_name = "payment.reconcile.nothing",
                        order_code = %order_code,
                        booking_id = %booking_id,
                        "no stored intent and the routed booking is not awaiting payment"
                    );
                    return Ok(ReconcileOutcome::NothingToReconcile);
                };
                warn!(
                    event_name = "payment.intent.missing",
                    order_code = %order_code,
                    booking_id = %booking_id,
                    kind = %kind,
                    "no stored intent, reconciling against the routed booking"
                );
                (booking_id.clone(), kind)
            }
        };

        let status = PaymentStatus::from_gateway(raw_status);
        let request = ReconcileRequest {
            order_code: order_code.clone(),
            status,
            booking_id: booking_id.clone(),
            kind,
        };
        let response = match self.gateway.reconcile_payment(&request).await {
            Ok(response) => response,
            Err(error) => {
                self.finish(order_code, AttemptEvent::ReconcileFailed);
                return Err(error.into());
            }
        };

        if !response.success {
            warn!(
                event_name = "payment.reconcile.rejected",
                order_code = %order_code,
                booking_id = %booking_id,
                "gateway did not accept the reconciliation"
            );
            self.finish(order_code, AttemptEvent::ConfirmedCancelled);
            return Ok(ReconcileOutcome::Rejected { booking_id, kind });
        }

        info!(
            event_name = "payment.reconcile.completed",
            order_code = %order_code,
            booking_id = %booking_id,
            kind = %kind,
            status = response.status.as_str(),
            "payment reconciled"
        );
        match response.status {
            PaymentStatus::Paid => {
                self.finish(order_code, AttemptEvent::ConfirmedPaid);
                Ok(ReconcileOutcome::Paid { booking_id, kind })
            }
            PaymentStatus::Cancelled => {
                self.finish(order_code, AttemptEvent::ConfirmedCancelled);
                Ok(ReconcileOutcome::Cancelled { booking_id, kind })
            }
        }
    }

    /// Only a booking still inside a payment window names its kind; any other
    /// status may already reflect this very payment.
    async fn payable_kind(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<PaymentKind>, PortalError> {
        let record = self.bookings.fetch_booking(booking_id).await?;
        Ok(match normalize_or_default(&record.status) {
            BookingStatus::Pending => Some(PaymentKind::Deposit),
            BookingStatus::SampleReceived => Some(PaymentKind::Remainder),
            _ => None,
        })
    }
}
