use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(#[serde(deserialize_with = "crate::domain::string_or_number")] pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestServiceId(#[serde(deserialize_with = "crate::domain::string_or_number")] pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackId(#[serde(deserialize_with = "crate::domain::string_or_number")] pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TestServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(alias = "feedbackId")]
    pub id: FeedbackId,
    pub user_id: UserId,
    #[serde(alias = "serviceId")]
    pub test_service_id: TestServiceId,
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FeedbackValidationError {
    #[error("feedback id is empty")]
    MissingId,
    #[error("feedback belongs to user `{actual}`, expected `{expected}`")]
    UserMismatch { expected: UserId, actual: UserId },
    #[error("feedback belongs to test service `{actual}`, expected `{expected}`")]
    ServiceMismatch { expected: TestServiceId, actual: TestServiceId },
    #[error("rating {0} is outside {MIN_RATING}..={MAX_RATING}")]
    RatingOutOfRange(i32),
}

/// Structural check applied before a feedback record is trusted by the cache.
pub fn validate_feedback(
    feedback: &Feedback,
    user: &UserId,
    service: &TestServiceId,
) -> Result<(), FeedbackValidationError> {
    if feedback.id.0.trim().is_empty() {
        return Err(FeedbackValidationError::MissingId);
    }
    if &feedback.user_id != user {
        return Err(FeedbackValidationError::UserMismatch {
            expected: user.clone(),
            actual: feedback.user_id.clone(),
        });
    }
    if &feedback.test_service_id != service {
        return Err(FeedbackValidationError::ServiceMismatch {
            expected: service.clone(),
            actual: feedback.test_service_id.clone(),
        });
    }
    if !(MIN_RATING..=MAX_RATING).contains(&feedback.rating) {
        return Err(FeedbackValidationError::RatingOutOfRange(feedback.rating));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        validate_feedback, Feedback, FeedbackId, FeedbackValidationError, TestServiceId, UserId,
    };

    fn feedback(rating: i32) -> Feedback {
        Feedback {
            id: FeedbackId("FB-1".to_string()),
            user_id: UserId("U-1".to_string()),
            test_service_id: TestServiceId("S-1".to_string()),
            rating,
            comment: Some("fast turnaround".to_string()),
            created_at: None,
        }
    }

    #[test]
    fn accepts_well_formed_feedback() {
        let user = UserId("U-1".to_string());
        let service = TestServiceId("S-1".to_string());
        assert_eq!(validate_feedback(&feedback(5), &user, &service), Ok(()));
    }

    #[test]
    fn rejects_structural_violations() {
        let user = UserId("U-1".to_string());
        let service = TestServiceId("S-1".to_string());

        assert_eq!(
            validate_feedback(&feedback(0), &user, &service),
            Err(FeedbackValidationError::RatingOutOfRange(0))
        );

        let mut blank = feedback(4);
        blank.id = FeedbackId("  ".to_string());
        assert_eq!(
            validate_feedback(&blank, &user, &service),
            Err(FeedbackValidationError::MissingId)
        );

        let other_service = TestServiceId("S-2".to_string());
        assert!(matches!(
            validate_feedback(&feedback(4), &user, &other_service),
            Err(FeedbackValidationError::ServiceMismatch { .. })
        ));

        let other_user = UserId("U-2".to_string());
        assert!(matches!(
            validate_feedback(&feedback(4), &other_user, &service),
            Err(FeedbackValidationError::UserMismatch { .. })
        ));
    }
}
