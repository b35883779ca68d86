//! One open booking and the actions a customer can take on it.
//!
//! The server is the source of truth: every mutating action awaits a full
//! refresh before handing back a view, and a response for a booking that is no
//! longer open is discarded.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::confirmation::{
    format_collection_time, CollectionConfirmation, ConfirmationFlags, ConfirmationTracker,
    DeliveryConfirmation,
};
use crate::domain::booking::{Booking, BookingId, BookingStatus};
use crate::domain::payment::{OrderCode, PaymentKind};
use crate::domain::sample::has_sample_info;
use crate::errors::PortalError;
use crate::feedback::{should_offer_feedback, FeedbackCache, FeedbackLookup};
use crate::payment::{PaymentOrchestrator, ReconcileOutcome};
use crate::ports::{BookingService, KeyValueStore, Navigator, PaymentGateway, SampleService};
use crate::progress::{derive, Progress, ProgressFacts};

/// Remote services a session drives.
#[derive(Clone)]
pub struct Collaborators {
    pub bookings: Arc<dyn BookingService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub samples: Arc<dyn SampleService>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub progress: Progress,
    pub flags: ConfirmationFlags,
    pub feedback: FeedbackLookup,
    pub offer_feedback: bool,
}

/// Result of a gateway return. The view is refreshed even when reconciling failed.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentReturn {
    pub outcome: Result<ReconcileOutcome, PortalError>,
    pub view: BookingView,
}

#[derive(Default)]
struct SessionState {
    active: Option<BookingId>,
    last_status: Option<BookingStatus>,
}

pub struct BookingSession {
    bookings: Arc<dyn BookingService>,
    samples: Arc<dyn SampleService>,
    payments: PaymentOrchestrator,
    confirmations: ConfirmationTracker,
    feedback: Arc<FeedbackCache>,
    state: Mutex<SessionState>,
}

impl BookingSession {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn KeyValueStore>,
        feedback: Arc<FeedbackCache>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let Collaborators { bookings, payments, samples } = collaborators;
        Self {
            payments: PaymentOrchestrator::new(
                payments,
                bookings.clone(),
                store.clone(),
                navigator,
            ),
            confirmations: ConfirmationTracker::new(bookings.clone(), store),
            bookings,
            samples,
            feedback,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn payments(&self) -> &PaymentOrchestrator {
        &self.payments
    }

    pub fn active_booking(&self) -> Option<BookingId> {
        self.state().active.clone()
    }

    /// Switches the open booking. Cached feedback answers belong to the previous
    /// booking's context and are dropped when the id changes.
    pub fn open(&self, booking_id: &BookingId) {
        let mut state = self.state();
        if state.active.as_ref() == Some(booking_id) {
            return;
        }
        state.active = Some(booking_id.clone());
        state.last_status = None;
        drop(state);

        self.feedback.clear();
        debug!(event_name = "session.opened", booking_id = %booking_id, "booking opened");
    }

    fn require_active(&self) -> Result<BookingId, PortalError> {
        self.active_booking().ok_or(PortalError::NoActiveBooking)
    }

    fn ensure_still_active(&self, received: &BookingId) -> Result<(), PortalError> {
        match self.active_booking() {
            Some(active) if &active == received => Ok(()),
            Some(active) => {
                Err(PortalError::StaleResponse { active, received: received.clone() })
            }
            None => Err(PortalError::NoActiveBooking),
        }
    }

    pub async fn refresh(&self) -> Result<BookingView, PortalError> {
        let booking_id = self.require_active()?;
        let refresh_id = Uuid::new_v4();

        let record = self.bookings.fetch_booking(&booking_id).await?;
        if record.id != booking_id {
            return Err(PortalError::StaleResponse { active: booking_id, received: record.id });
        }
        self.ensure_still_active(&booking_id)?;

        let booking = Booking::from_record(record);
        let flags = self.confirmations.load_flags(&booking.id).await?;
        let sample_info = if booking.status == BookingStatus::WaitingForSample {
            self.sample_info(&booking.id).await
        } else {
            None
        };

        let facts = ProgressFacts {
            price: booking.price,
            has_sample_info: sample_info,
            delivery_confirmed: flags.delivery_confirmed,
            collection_confirmed: flags.collection_confirmed,
            appointment_at: booking.appointment_at,
        };
        let progress = derive(booking.status, &facts);

        let feedback = match (&booking.user_id, &booking.test_service_id) {
            (Some(user), Some(service)) if booking.status == BookingStatus::Completed => {
                self.feedback.check(user, service).await;
                self.feedback.lookup(user, service)
            }
            _ => FeedbackLookup::Unchecked,
        };
        let offer_feedback = should_offer_feedback(booking.status, &feedback);

        self.ensure_still_active(&booking.id)?;
        self.record_status(&booking);

        debug!(
            event_name = "session.refreshed",
            refresh_id = %refresh_id,
            booking_id = %booking.id,
            status = %booking.status,
            current_step = progress.current_step,
            "booking view refreshed"
        );
        Ok(BookingView { booking, progress, flags, feedback, offer_feedback })
    }

    fn record_status(&self, booking: &Booking) {
        let mut state = self.state();
        if let Some(previous) = state.last_status {
            if previous != booking.status && !previous.can_transition_to(booking.status) {
                warn!(
                    event_name = "session.status_regressed",
                    booking_id = %booking.id,
                    previous = %previous,
                    current = %booking.status,
                    "booking status moved backwards, showing server state"
                );
            }
        }
        state.last_status = Some(booking.status);
    }

    /// `None` when the kit or its samples could not be read.
    async fn sample_info(&self, booking_id: &BookingId) -> Option<bool> {
        let kit = match self.samples.fetch_kit_for_booking(booking_id).await {
            Ok(Some(kit)) => kit,
            Ok(None) => {
                debug!(event_name = "session.kit_missing", booking_id = %booking_id, "no kit found");
                return None;
            }
            Err(error) => {
                warn!(
                    event_name = "session.kit_lookup_failed",
                    booking_id = %booking_id,
                    error = %error,
                    "could not load kit"
                );
                return None;
            }
        };

        match self.samples.fetch_samples_for_kit(&kit.id).await {
            Ok(samples) => Some(has_sample_info(&kit, &samples)),
            Err(error) => {
                warn!(
                    event_name = "session.sample_lookup_failed",
                    booking_id = %booking_id,
                    kit_id = %kit.id,
                    error = %error,
                    "could not load samples"
                );
                None
            }
        }
    }

    pub async fn pay(&self, kind: PaymentKind) -> Result<BookingView, PortalError> {
        let booking_id = self.require_active()?;
        self.payments.initiate(&booking_id, kind).await?;
        self.refresh().await
    }

    /// Handles the gateway's return. The reconciled booking becomes the open one
    /// and is refetched whatever the reconcile outcome. Only a failed refresh is
    /// an error here, reported as the reconcile error when there was one.
    pub async fn complete_payment_return(
        &self,
        order_code: &OrderCode,
        raw_status: &str,
    ) -> Result<PaymentReturn, PortalError> {
        let routed = self.active_booking();
        let outcome = self.payments.reconcile(order_code, raw_status, routed.as_ref()).await;
        match &outcome {
            Ok(outcome) => {
                if let Some(booking_id) = outcome.booking_id() {
                    self.open(booking_id);
                }
                info!(
                    event_name = "session.payment_returned",
                    order_code = %order_code,
                    outcome = ?outcome,
                    "gateway return handled"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "session.payment_return_failed",
                    order_code = %order_code,
                    error = %error,
                    "gateway return could not be reconciled, refreshing anyway"
                );
            }
        }

        match self.refresh().await {
            Ok(view) => Ok(PaymentReturn { outcome, view }),
            Err(refresh_error) => Err(outcome.err().unwrap_or(refresh_error)),
        }
    }

    pub async fn confirm_delivery(
        &self,
    ) -> Result<(DeliveryConfirmation, BookingView), PortalError> {
        let booking_id = self.require_active()?;
        let confirmation = self.confirmations.confirm_delivery(&booking_id).await?;
        let view = self.refresh().await?;
        Ok((confirmation, view))
    }

    pub async fn confirm_collection(
        &self,
        when: DateTime<Utc>,
    ) -> Result<(CollectionConfirmation, BookingView), PortalError> {
        let booking_id = self.require_active()?;
        let confirmation = self
            .confirmations
            .confirm_collection(&booking_id, &format_collection_time(when))
            .await?;
        let view = self.refresh().await?;
        Ok((confirmation, view))
    }
}
