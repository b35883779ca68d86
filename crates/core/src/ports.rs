//! Contracts for the remote booking backend and local persisted state.
//!
//! The core never talks to the network or browser storage directly; it is
//! driven through these traits so tests can substitute in-memory fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::booking::{BookingId, BookingRecord};
use crate::domain::feedback::{Feedback, FeedbackId, UserId};
use crate::domain::payment::{OrderCode, PaymentKind};
use crate::domain::sample::{KitId, Sample, TestKit};
use crate::errors::{RemoteError, StoreError};

/// Generic `{ success, message }` reply used by confirmation endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl Acknowledgement {
    pub fn ok() -> Self {
        Self { success: true, message: None }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub order_code: OrderCode,
    #[serde(alias = "checkoutUrl")]
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Cancelled,
}

impl PaymentStatus {
    /// Only an exact `PAID` counts as paid.
    pub fn from_gateway(raw: &str) -> Self {
        if raw == "PAID" {
            Self::Paid
        } else {
            Self::Cancelled
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub order_code: OrderCode,
    pub status: PaymentStatus,
    pub booking_id: BookingId,
    pub kind: PaymentKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub status: PaymentStatus,
}

#[async_trait]
pub trait BookingService: Send + Sync {
    async fn fetch_booking(&self, id: &BookingId) -> Result<BookingRecord, RemoteError>;
    async fn update_status(&self, id: &BookingId, code: u8) -> Result<Acknowledgement, RemoteError>;
    async fn confirm_delivery(&self, id: &BookingId) -> Result<Acknowledgement, RemoteError>;
    async fn confirm_collection(
        &self,
        id: &BookingId,
        human_date_time: &str,
    ) -> Result<Acknowledgement, RemoteError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_checkout(
        &self,
        booking_id: &BookingId,
        kind: PaymentKind,
    ) -> Result<CheckoutSession, RemoteError>;
    async fn reconcile_payment(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconcileResponse, RemoteError>;
}

#[async_trait]
pub trait SampleService: Send + Sync {
    async fn fetch_kit_for_booking(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<TestKit>, RemoteError>;
    async fn fetch_samples_for_kit(&self, kit_id: &KitId) -> Result<Vec<Sample>, RemoteError>;
}

#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn fetch_user_feedbacks(&self, user: &UserId) -> Result<Vec<Feedback>, RemoteError>;
    async fn fetch_feedback_detail(&self, id: &FeedbackId) -> Result<Feedback, RemoteError>;
}

/// Sends the customer to the payment gateway. Control may never come back to
/// the caller's task, so anything that must survive is persisted first.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Navigator that only records the last destination.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    visited: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        match self.visited.lock() {
            Ok(visited) => visited.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        match self.visited.lock() {
            Ok(mut visited) => visited.push(url.to_string()),
            Err(poisoned) => poisoned.into_inner().push(url.to_string()),
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    pub fn snapshot(&self) -> HashMap<String, String> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryKeyValueStore, KeyValueStore, Navigator, PaymentStatus, RecordingNavigator};

    #[test]
    fn only_exact_paid_counts_as_paid() {
        assert_eq!(PaymentStatus::from_gateway("PAID"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_gateway("paid"), PaymentStatus::Cancelled);
        assert_eq!(PaymentStatus::from_gateway(" PAID"), PaymentStatus::Cancelled);
        assert_eq!(PaymentStatus::from_gateway("PENDING"), PaymentStatus::Cancelled);
        assert_eq!(PaymentStatus::from_gateway(""), PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn in_memory_store_supports_get_set_delete() {
        let store = InMemoryKeyValueStore::default();
        store.set("delivery_confirmed_BK-1", "true").await.expect("set");
        assert_eq!(
            store.get("delivery_confirmed_BK-1").await.expect("get").as_deref(),
            Some("true")
        );

        store.delete("delivery_confirmed_BK-1").await.expect("delete");
        assert_eq!(store.get("delivery_confirmed_BK-1").await.expect("get"), None);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn recording_navigator_keeps_visit_order() {
        let navigator = RecordingNavigator::default();
        navigator.navigate("https://pay.example/a");
        navigator.navigate("https://pay.example/b");
        assert_eq!(navigator.visited(), vec!["https://pay.example/a", "https://pay.example/b"]);
    }
}
