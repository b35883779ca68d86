//! Process-wide cache answering "has this user already reviewed this test service?".
//!
//! Lookups are deduplicated: while one check for a key is in flight, further
//! checks return the current cached value instead of issuing another request.
//! The in-flight mark is taken in the same critical section as the cache lookup.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::booking::BookingStatus;
use crate::domain::feedback::{validate_feedback, Feedback, TestServiceId, UserId};
use crate::ports::FeedbackService;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeedbackKey {
    pub user: UserId,
    pub service: TestServiceId,
}

impl FeedbackKey {
    pub fn new(user: &UserId, service: &TestServiceId) -> Self {
        Self { user: user.clone(), service: service.clone() }
    }
}

impl fmt::Display for FeedbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user, self.service)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "feedback", rename_all = "snake_case")]
pub enum FeedbackLookup {
    /// No completed check for this pair yet.
    Unchecked,
    /// Checked, and the user has not reviewed this service.
    Absent,
    Present(Feedback),
}

impl FeedbackLookup {
    pub fn feedback(&self) -> Option<&Feedback> {
        match self {
            Self::Present(feedback) => Some(feedback),
            Self::Unchecked | Self::Absent => None,
        }
    }
}

/// The review form is offered only for completed bookings confirmed to have no feedback.
pub fn should_offer_feedback(status: BookingStatus, lookup: &FeedbackLookup) -> bool {
    status == BookingStatus::Completed && matches!(lookup, FeedbackLookup::Absent)
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<FeedbackKey, Option<Feedback>>,
    in_flight: HashSet<FeedbackKey>,
    errors: HashMap<FeedbackKey, String>,
}

pub struct FeedbackCache {
    service: Arc<dyn FeedbackService>,
    state: Mutex<CacheState>,
}

struct InFlight<'a> {
    cache: &'a FeedbackCache,
    key: FeedbackKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cache.state().in_flight.remove(&self.key);
    }
}

impl FeedbackCache {
    pub fn new(service: Arc<dyn FeedbackService>) -> Self {
        Self { service, state: Mutex::new(CacheState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the user's feedback for `service`, asking the backend at most once
    /// per key until [`clear`](Self::clear) or [`invalidate`](Self::invalidate).
    pub async fn check(&self, user: &UserId, service: &TestServiceId) -> Option<Feedback> {
        let key = FeedbackKey::new(user, service);
        let _in_flight = {
            let mut state = self.state();
            if let Some(cached) = state.entries.get(&key) {
                return cached.clone();
            }
            if !state.in_flight.insert(key.clone()) {
                debug!(event_name = "feedback.check.in_flight", key = %key, "check already running");
                return None;
            }
            InFlight { cache: self, key: key.clone() }
        };

        let listed = match self.service.fetch_user_feedbacks(user).await {
            Ok(listed) => listed,
            Err(error) => {
                warn!(
                    event_name = "feedback.check.failed",
                    key = %key,
                    error = %error,
                    "feedback lookup failed, will retry on next check"
                );
                self.state().errors.insert(key, error.to_string());
                return None;
            }
        };

        let resolved = match listed.into_iter().find(|feedback| &feedback.test_service_id == service)
        {
            Some(summary) => self.resolve(&key, summary).await,
            None => None,
        };

        let mut state = self.state();
        state.errors.remove(&key);
        state.entries.insert(key, resolved.clone());
        resolved
    }

    async fn resolve(&self, key: &FeedbackKey, summary: Feedback) -> Option<Feedback> {
        let detail = self.service.fetch_feedback_detail(&summary.id).await;
        let feedback = match detail {
            Ok(detail) => detail,
            Err(error) => {
                debug!(
                    event_name = "feedback.detail.fallback",
                    key = %key,
                    feedback_id = %summary.id,
                    error = %error,
                    "detail fetch failed, using listed record"
                );
                summary
            }
        };

        match validate_feedback(&feedback, &key.user, &key.service) {
            Ok(()) => Some(feedback),
            Err(violation) => {
                warn!(
                    event_name = "feedback.integrity_violation",
                    key = %key,
                    feedback_id = %feedback.id,
                    violation = %violation,
                    "backend returned inconsistent feedback, treating as absent"
                );
                None
            }
        }
    }

    /// Cached feedback only, re-checked against the requested service.
    pub fn get(&self, user: &UserId, service: &TestServiceId) -> Option<Feedback> {
        self.lookup(user, service).feedback().cloned()
    }

    pub fn lookup(&self, user: &UserId, service: &TestServiceId) -> FeedbackLookup {
        let state = self.state();
        match state.entries.get(&FeedbackKey::new(user, service)) {
            None => FeedbackLookup::Unchecked,
            Some(Some(feedback)) if &feedback.test_service_id == service => {
                FeedbackLookup::Present(feedback.clone())
            }
            Some(_) => FeedbackLookup::Absent,
        }
    }

    pub fn is_pending(&self, user: &UserId, service: &TestServiceId) -> bool {
        self.state().in_flight.contains(&FeedbackKey::new(user, service))
    }

    pub fn last_error(&self, user: &UserId, service: &TestServiceId) -> Option<String> {
        self.state().errors.get(&FeedbackKey::new(user, service)).cloned()
    }

    pub fn invalidate(&self, user: &UserId, service: &TestServiceId) {
        let key = FeedbackKey::new(user, service);
        let mut state = self.state();
        state.entries.remove(&key);
        state.errors.remove(&key);
    }

    /// Drops every cached answer. In-flight checks still finish and store their result.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::domain::booking::BookingStatus;
    use crate::domain::feedback::{Feedback, FeedbackId, TestServiceId, UserId};
    use crate::errors::RemoteError;
    use crate::testing::FakeFeedbackService;

    use super::{should_offer_feedback, FeedbackCache, FeedbackKey, FeedbackLookup};

    fn user() -> UserId {
        UserId("U-1".to_string())
    }

    fn service() -> TestServiceId {
        TestServiceId("S-1".to_string())
    }

    fn feedback(id: &str, service: &str, rating: i32) -> Feedback {
        Feedback {
            id: FeedbackId(id.to_string()),
            user_id: user(),
            test_service_id: TestServiceId(service.to_string()),
            rating,
            comment: Some("clear report".to_string()),
            created_at: None,
        }
    }

    #[test]
    fn key_display_joins_user_and_service() {
        assert_eq!(FeedbackKey::new(&user(), &service()).to_string(), "U-1_S-1");
    }

    #[tokio::test]
    async fn found_feedback_is_cached_after_one_request() {
        let fake = Arc::new(FakeFeedbackService::with_feedback(feedback("FB-1", "S-1", 4)));
        let cache = FeedbackCache::new(fake.clone());

        let first = cache.check(&user(), &service()).await;
        let second = cache.check(&user(), &service()).await;

        assert_eq!(first.as_ref().map(|f| f.id.0.as_str()), Some("FB-1"));
        assert_eq!(first, second);
        assert_eq!(fake.list_count(), 1);
        assert_eq!(fake.detail_count(), 1);
        assert_eq!(cache.get(&user(), &service()), first);
    }

    #[tokio::test]
    async fn absent_is_distinct_from_unchecked() {
        let fake = Arc::new(FakeFeedbackService::with_feedback(feedback("FB-2", "S-9", 5)));
        let cache = FeedbackCache::new(fake.clone());

        assert_eq!(cache.lookup(&user(), &service()), FeedbackLookup::Unchecked);
        assert_eq!(cache.check(&user(), &service()).await, None);
        assert_eq!(cache.lookup(&user(), &service()), FeedbackLookup::Absent);

        cache.check(&user(), &service()).await;
        assert_eq!(fake.list_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_checks_issue_a_single_request() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(
            FakeFeedbackService::with_feedback(feedback("FB-1", "S-1", 4)).gated(gate.clone()),
        );
        let cache = Arc::new(FeedbackCache::new(fake.clone()));

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.check(&user(), &service()).await })
        };
        while fake.list_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(cache.is_pending(&user(), &service()));

        let second = cache.check(&user(), &service()).await;
        assert_eq!(second, None);

        gate.notify_one();
        let first = first.await.expect("join");

        assert!(first.is_some());
        assert_eq!(fake.list_count(), 1);
        assert!(!cache.is_pending(&user(), &service()));
    }

    #[tokio::test]
    async fn failures_are_recorded_but_not_cached() {
        let fake = Arc::new(FakeFeedbackService::with_feedback(feedback("FB-1", "S-1", 4)));
        fake.fail_list_with(Some(RemoteError::timeout("slow backend")));
        let cache = FeedbackCache::new(fake.clone());

        assert_eq!(cache.check(&user(), &service()).await, None);
        assert_eq!(cache.lookup(&user(), &service()), FeedbackLookup::Unchecked);
        assert_eq!(
            cache.last_error(&user(), &service()).as_deref(),
            Some("timeout failure: slow backend")
        );

        fake.fail_list_with(None);
        assert!(cache.check(&user(), &service()).await.is_some());
        assert_eq!(fake.list_count(), 2);
        assert_eq!(cache.last_error(&user(), &service()), None);
    }

    #[tokio::test]
    async fn detail_failure_falls_back_to_listed_record() {
        let fake = Arc::new(FakeFeedbackService::with_feedback(feedback("FB-1", "S-1", 3)));
        fake.fail_detail_with(Some(RemoteError::network("dropped")));
        let cache = FeedbackCache::new(fake.clone());

        let found = cache.check(&user(), &service()).await;

        assert_eq!(found.map(|f| f.rating), Some(3));
    }

    #[tokio::test]
    async fn inconsistent_detail_is_cached_as_absent() {
        let fake = Arc::new(FakeFeedbackService::with_feedback(feedback("FB-1", "S-1", 4)));
        fake.set_detail(feedback("FB-1", "S-1", 9));
        let cache = FeedbackCache::new(fake.clone());

        assert_eq!(cache.check(&user(), &service()).await, None);
        assert_eq!(cache.lookup(&user(), &service()), FeedbackLookup::Absent);
    }

    #[tokio::test]
    async fn clear_and_invalidate_force_a_new_request() {
        let fake = Arc::new(FakeFeedbackService::with_feedback(feedback("FB-1", "S-1", 4)));
        let cache = FeedbackCache::new(fake.clone());

        cache.check(&user(), &service()).await;
        cache.invalidate(&user(), &service());
        cache.check(&user(), &service()).await;
        cache.clear();
        assert_eq!(cache.lookup(&user(), &service()), FeedbackLookup::Unchecked);
        cache.check(&user(), &service()).await;

        assert_eq!(fake.list_count(), 3);
    }

    #[test]
    fn feedback_form_is_offered_only_for_completed_and_absent() {
        assert!(should_offer_feedback(BookingStatus::Completed, &FeedbackLookup::Absent));
        assert!(!should_offer_feedback(BookingStatus::Completed, &FeedbackLookup::Unchecked));
        assert!(!should_offer_feedback(
            BookingStatus::Completed,
            &FeedbackLookup::Present(feedback("FB-1", "S-1", 5))
        ));
        assert!(!should_offer_feedback(BookingStatus::Testing, &FeedbackLookup::Absent));
    }
}
