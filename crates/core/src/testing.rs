//! In-memory collaborator fakes with call counters, shared by unit tests and
//! downstream crates through the `test-support` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::booking::{BookingId, BookingRecord, BookingStatus, RawAmount, RawStatus};
use crate::domain::feedback::{Feedback, FeedbackId, UserId};
use crate::domain::payment::{OrderCode, PaymentKind};
use crate::domain::sample::{KitId, Sample, TestKit};
use crate::errors::RemoteError;
use crate::ports::{
    Acknowledgement, BookingService, CheckoutSession, FeedbackService, PaymentGateway,
    PaymentStatus, ReconcileRequest, ReconcileResponse, SampleService,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn booking_record(id: &str, status: RawStatus, price: i64) -> BookingRecord {
    BookingRecord {
        id: BookingId(id.to_string()),
        status,
        price: Some(RawAmount::Integer(price)),
        collection_method: Some("SelfSample".to_string()),
        appointment_date: Some("2026-03-01T09:00:00Z".to_string()),
        customer_name: Some("Tran Thi B".to_string()),
        email: Some("b@example.com".to_string()),
        phone: Some("0900000000".to_string()),
        notes: None,
        user_id: Some("U-1".to_string()),
        test_service_id: Some("S-1".to_string()),
    }
}

#[derive(Default)]
pub struct FakeBookingService {
    records: Mutex<HashMap<BookingId, BookingRecord>>,
    status_updates: Mutex<Vec<(BookingId, u8)>>,
    fetch_error: Mutex<Option<RemoteError>>,
    update_error: Mutex<Option<RemoteError>>,
    delivery_reply: Mutex<Option<Result<Acknowledgement, RemoteError>>>,
    collection_reply: Mutex<Option<Result<Acknowledgement, RemoteError>>>,
    fetch_calls: AtomicUsize,
    delivery_calls: AtomicUsize,
    collection_calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeBookingService {
    pub fn with_booking(record: BookingRecord) -> Self {
        let fake = Self::default();
        fake.insert(record);
        fake
    }

    /// Holds every fetch open until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn insert(&self, record: BookingRecord) {
        lock(&self.records).insert(record.id.clone(), record);
    }

    pub fn set_status(&self, id: &BookingId, status: RawStatus) {
        if let Some(record) = lock(&self.records).get_mut(id) {
            record.status = status;
        }
    }

    pub fn fail_fetch_with(&self, error: Option<RemoteError>) {
        *lock(&self.fetch_error) = error;
    }

    pub fn fail_update_with(&self, error: Option<RemoteError>) {
        *lock(&self.update_error) = error;
    }

    pub fn reply_to_delivery(&self, reply: Result<Acknowledgement, RemoteError>) {
        *lock(&self.delivery_reply) = Some(reply);
    }

    pub fn reply_to_collection(&self, reply: Result<Acknowledgement, RemoteError>) {
        *lock(&self.collection_reply) = Some(reply);
    }

    pub fn status_updates(&self) -> Vec<(BookingId, u8)> {
        lock(&self.status_updates).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn delivery_count(&self) -> usize {
        self.delivery_calls.load(Ordering::SeqCst)
    }

    pub fn collection_count(&self) -> usize {
        self.collection_calls.load(Ordering::SeqCst)
    }

    fn advance(&self, id: &BookingId, from: BookingStatus, to: BookingStatus) {
        let mut records = lock(&self.records);
        if let Some(record) = records.get_mut(id) {
            if crate::status::normalize_or_default(&record.status) == from {
                record.status = RawStatus::Code(i64::from(to.backend_code()));
            }
        }
    }
}

#[async_trait]
impl BookingService for FakeBookingService {
    async fn fetch_booking(&self, id: &BookingId) -> Result<BookingRecord, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = lock(&self.fetch_error).clone() {
            return Err(error);
        }
        lock(&self.records).get(id).cloned().ok_or_else(|| {
            RemoteError::new(crate::errors::RemoteErrorKind::NotFound, format!("booking {id}"))
        })
    }

    async fn update_status(&self, id: &BookingId, code: u8) -> Result<Acknowledgement, RemoteError> {
        lock(&self.status_updates).push((id.clone(), code));
        if let Some(error) = lock(&self.update_error).clone() {
            return Err(error);
        }
        self.set_status(id, RawStatus::Code(i64::from(code)));
        Ok(Acknowledgement::ok())
    }

    async fn confirm_delivery(&self, _id: &BookingId) -> Result<Acknowledgement, RemoteError> {
        self.delivery_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.delivery_reply).clone().unwrap_or_else(|| Ok(Acknowledgement::ok()))
    }

    async fn confirm_collection(
        &self,
        _id: &BookingId,
        _human_date_time: &str,
    ) -> Result<Acknowledgement, RemoteError> {
        self.collection_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.collection_reply).clone().unwrap_or_else(|| Ok(Acknowledgement::ok()))
    }
}

#[derive(Default)]
pub struct FakePaymentGateway {
    checkout_error: Mutex<Option<RemoteError>>,
    reconcile_reply: Mutex<Option<Result<ReconcileResponse, RemoteError>>>,
    reconcile_requests: Mutex<Vec<ReconcileRequest>>,
    checkout_calls: AtomicUsize,
    next_order: AtomicUsize,
    bookings: Option<Arc<FakeBookingService>>,
    gate: Option<Arc<Notify>>,
}

impl FakePaymentGateway {
    /// Paid reconciliations advance the linked booking the way the backend does.
    pub fn linked_to(bookings: Arc<FakeBookingService>) -> Self {
        Self { bookings: Some(bookings), ..Self::default() }
    }

    /// Holds every reconcile call open until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_checkout_with(&self, error: Option<RemoteError>) {
        *lock(&self.checkout_error) = error;
    }

    pub fn reply_to_reconcile(&self, reply: Result<ReconcileResponse, RemoteError>) {
        *lock(&self.reconcile_reply) = Some(reply);
    }

    pub fn reconcile_requests(&self) -> Vec<ReconcileRequest> {
        lock(&self.reconcile_requests).clone()
    }

    pub fn reconcile_count(&self) -> usize {
        lock(&self.reconcile_requests).len()
    }

    pub fn checkout_count(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn initiate_checkout(
        &self,
        booking_id: &BookingId,
        kind: PaymentKind,
    ) -> Result<CheckoutSession, RemoteError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.checkout_error).clone() {
            return Err(error);
        }
        let sequence = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let order_code = OrderCode(format!("ORD-{}-{sequence}", booking_id.0));
        Ok(CheckoutSession {
            redirect_url: format!("https://pay.example/checkout/{}?kind={kind}", order_code.0),
            order_code,
        })
    }

    async fn reconcile_payment(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconcileResponse, RemoteError> {
        lock(&self.reconcile_requests).push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reply = lock(&self.reconcile_reply)
            .clone()
            .unwrap_or(Ok(ReconcileResponse { success: true, status: request.status }));

        if let (Ok(response), Some(bookings)) = (&reply, &self.bookings) {
            if response.success && response.status == PaymentStatus::Paid {
                match request.kind {
                    PaymentKind::Deposit => bookings.advance(
                        &request.booking_id,
                        BookingStatus::Pending,
                        BookingStatus::PreparingKit,
                    ),
                    PaymentKind::Remainder => bookings.advance(
                        &request.booking_id,
                        BookingStatus::SampleReceived,
                        BookingStatus::Testing,
                    ),
                }
            }
        }
        reply
    }
}

#[derive(Default)]
pub struct FakeSampleService {
    kits: Mutex<HashMap<BookingId, TestKit>>,
    samples: Mutex<HashMap<KitId, Vec<Sample>>>,
    error: Mutex<Option<RemoteError>>,
}

impl FakeSampleService {
    pub fn with_kit(booking_id: &BookingId, sample_count: u32, recorded: usize) -> Self {
        let fake = Self::default();
        let kit = TestKit { id: KitId(format!("KIT-{}", booking_id.0)), sample_count };
        let samples = (0..recorded)
            .map(|index| Sample {
                id: format!("SMP-{index}"),
                participant_name: None,
                sample_type: Some("buccal swab".to_string()),
            })
            .collect();
        lock(&fake.samples).insert(kit.id.clone(), samples);
        lock(&fake.kits).insert(booking_id.clone(), kit);
        fake
    }

    pub fn fail_with(&self, error: Option<RemoteError>) {
        *lock(&self.error) = error;
    }
}

#[async_trait]
impl SampleService for FakeSampleService {
    async fn fetch_kit_for_booking(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<TestKit>, RemoteError> {
        if let Some(error) = lock(&self.error).clone() {
            return Err(error);
        }
        Ok(lock(&self.kits).get(booking_id).cloned())
    }

    async fn fetch_samples_for_kit(&self, kit_id: &KitId) -> Result<Vec<Sample>, RemoteError> {
        if let Some(error) = lock(&self.error).clone() {
            return Err(error);
        }
        Ok(lock(&self.samples).get(kit_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeFeedbackService {
    by_user: Mutex<HashMap<UserId, Vec<Feedback>>>,
    details: Mutex<HashMap<FeedbackId, Feedback>>,
    list_error: Mutex<Option<RemoteError>>,
    detail_error: Mutex<Option<RemoteError>>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeFeedbackService {
    pub fn with_feedback(feedback: Feedback) -> Self {
        let fake = Self::default();
        fake.add(feedback);
        fake
    }

    /// Holds every list call open until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn add(&self, feedback: Feedback) {
        lock(&self.by_user).entry(feedback.user_id.clone()).or_default().push(feedback);
    }

    /// Detail endpoint answer that differs from the listed summary.
    pub fn set_detail(&self, feedback: Feedback) {
        lock(&self.details).insert(feedback.id.clone(), feedback);
    }

    pub fn fail_list_with(&self, error: Option<RemoteError>) {
        *lock(&self.list_error) = error;
    }

    pub fn fail_detail_with(&self, error: Option<RemoteError>) {
        *lock(&self.detail_error) = error;
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_count(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackService for FakeFeedbackService {
    async fn fetch_user_feedbacks(&self, user: &UserId) -> Result<Vec<Feedback>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = lock(&self.list_error).clone() {
            return Err(error);
        }
        Ok(lock(&self.by_user).get(user).cloned().unwrap_or_default())
    }

    async fn fetch_feedback_detail(&self, id: &FeedbackId) -> Result<Feedback, RemoteError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.detail_error).clone() {
            return Err(error);
        }
        if let Some(detail) = lock(&self.details).get(id).cloned() {
            return Ok(detail);
        }
        lock(&self.by_user)
            .values()
            .flatten()
            .find(|feedback| &feedback.id == id)
            .cloned()
            .ok_or_else(|| {
                RemoteError::new(crate::errors::RemoteErrorKind::NotFound, format!("feedback {id}"))
            })
    }
}
