//! Kit-receipt and sample-collection confirmations.
//!
//! A confirmation is a one-way flag per booking. Once the local flag is set the
//! remote call is never repeated, so a double click or a reload after success
//! costs nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::booking::{BookingId, BookingStatus};
use crate::errors::PortalError;
use crate::ports::{Acknowledgement, BookingService, KeyValueStore};

const FLAG_SET: &str = "true";

/// Customer-facing collection time sent to the backend, e.g. `14:30 01/03/2026`.
pub const COLLECTION_TIME_FORMAT: &str = "%H:%M %d/%m/%Y";

pub fn format_collection_time(at: DateTime<Utc>) -> String {
    at.format(COLLECTION_TIME_FORMAT).to_string()
}

pub fn delivery_key(booking_id: &BookingId) -> String {
    format!("delivery_confirmed_{booking_id}")
}

pub fn collection_key(booking_id: &BookingId) -> String {
    format!("collection_confirmed_{booking_id}")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationFlags {
    pub delivery_confirmed: bool,
    pub collection_confirmed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryConfirmation {
    /// `status_synced` is false when the follow-up status push failed; the
    /// confirmation itself still stands.
    Confirmed { status_synced: bool },
    AlreadyConfirmed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionConfirmation {
    Confirmed,
    AlreadyConfirmed,
}

pub struct ConfirmationTracker {
    bookings: Arc<dyn BookingService>,
    store: Arc<dyn KeyValueStore>,
}

impl ConfirmationTracker {
    pub fn new(bookings: Arc<dyn BookingService>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { bookings, store }
    }

    pub async fn is_delivery_confirmed(&self, booking_id: &BookingId) -> Result<bool, PortalError> {
        self.flag(&delivery_key(booking_id)).await
    }

    pub async fn is_collection_confirmed(
        &self,
        booking_id: &BookingId,
    ) -> Result<bool, PortalError> {
        self.flag(&collection_key(booking_id)).await
    }

    pub async fn load_flags(&self, booking_id: &BookingId) -> Result<ConfirmationFlags, PortalError> {
        Ok(ConfirmationFlags {
            delivery_confirmed: self.is_delivery_confirmed(booking_id).await?,
            collection_confirmed: self.is_collection_confirmed(booking_id).await?,
        })
    }

    pub async fn confirm_delivery(
        &self,
        booking_id: &BookingId,
    ) -> Result<DeliveryConfirmation, PortalError> {
        if self.is_delivery_confirmed(booking_id).await? {
            return Ok(DeliveryConfirmation::AlreadyConfirmed);
        }

        let ack = self.bookings.confirm_delivery(booking_id).await?;
        accept(ack, "kit receipt")?;
        self.store.set(&delivery_key(booking_id), FLAG_SET).await?;

        let next = BookingStatus::WaitingForSample;
        let status_synced = match self.bookings.update_status(booking_id, next.backend_code()).await
        {
            Ok(ack) if ack.success => true,
            Ok(ack) => {
                warn!(
                    event_name = "confirmation.status_push_failed",
                    booking_id = %booking_id,
                    target_status = %next,
                    reason = ack.message.as_deref().unwrap_or("rejected"),
                    "kit receipt confirmed but status update was rejected"
                );
                false
            }
            Err(error) => {
                warn!(
                    event_name = "confirmation.status_push_failed",
                    booking_id = %booking_id,
                    target_status = %next,
                    error = %error,
                    "kit receipt confirmed but status update failed"
                );
                false
            }
        };

        info!(
            event_name = "confirmation.delivery.recorded",
            booking_id = %booking_id,
            status_synced,
            "kit receipt confirmed"
        );
        Ok(DeliveryConfirmation::Confirmed { status_synced })
    }

    /// `human_date_time` is usually produced by [`format_collection_time`].
    pub async fn confirm_collection(
        &self,
        booking_id: &BookingId,
        human_date_time: &str,
    ) -> Result<CollectionConfirmation, PortalError> {
        if self.is_collection_confirmed(booking_id).await? {
            return Ok(CollectionConfirmation::AlreadyConfirmed);
        }

        let ack = self.bookings.confirm_collection(booking_id, human_date_time).await?;
        accept(ack, "sample collection")?;
        self.store.set(&collection_key(booking_id), FLAG_SET).await?;

        info!(
            event_name = "confirmation.collection.recorded",
            booking_id = %booking_id,
            collection_time = human_date_time,
            "sample collection confirmed"
        );
        Ok(CollectionConfirmation::Confirmed)
    }

    async fn flag(&self, key: &str) -> Result<bool, PortalError> {
        Ok(self.store.get(key).await?.as_deref() == Some(FLAG_SET))
    }
}

fn accept(ack: Acknowledgement, what: &str) -> Result<(), PortalError> {
    if ack.success {
        Ok(())
    } else {
        Err(PortalError::Rejected(
            ack.message.unwrap_or_else(|| format!("{what} confirmation was not accepted")),
        ))
    }
}
