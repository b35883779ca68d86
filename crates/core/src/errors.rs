use thiserror::Error;

use crate::domain::booking::BookingId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("unknown booking status code {0} (expected 0..=11)")]
    UnknownStatusCode(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Server,
    Network,
    Timeout,
    Decode,
    Rejected,
}

impl RemoteErrorKind {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500..=599 => Self::Server,
            _ => Self::Rejected,
        }
    }

    /// Failures worth retrying later without user intervention.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Server)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Server => "server_error",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Decode => "decode",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{} failure: {message}", kind.as_str())]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("local store unavailable: {0}")]
    Unavailable(String),
    #[error("local store value for `{key}` is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PortalError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("request was rejected: {0}")]
    Rejected(String),
    #[error("response for booking `{received}` arrived after switching to `{active}`")]
    StaleResponse { active: BookingId, received: BookingId },
    #[error("no booking is open")]
    NoActiveBooking,
}

impl PortalError {
    /// Guidance safe to show the customer, differentiated by failure category.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Remote(remote) => match remote.kind {
                RemoteErrorKind::Unauthorized => "Your session has expired. Please log in again.",
                RemoteErrorKind::Forbidden => "You do not have permission to perform this action.",
                RemoteErrorKind::NotFound => "The booking could not be found.",
                RemoteErrorKind::Server => {
                    "The service is temporarily unavailable. Please try again later."
                }
                RemoteErrorKind::Network | RemoteErrorKind::Timeout => {
                    "Could not reach the service. Check your connection and try again."
                }
                RemoteErrorKind::Decode | RemoteErrorKind::Rejected => {
                    "The request could not be processed. Please try again."
                }
            },
            Self::Store(_) => "Local data could not be saved. Please reload the page.",
            Self::Rejected(_) => "The request could not be processed. Please try again.",
            Self::StaleResponse { .. } | Self::NoActiveBooking => {
                "The booking view changed. Please reopen the booking."
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.is_retryable(),
            Self::Store(_) | Self::StaleResponse { .. } => true,
            Self::Rejected(_) | Self::NoActiveBooking => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{PortalError, RemoteError, RemoteErrorKind};

    #[test]
    fn http_statuses_map_to_categories() {
        assert_eq!(RemoteErrorKind::from_http_status(401), RemoteErrorKind::Unauthorized);
        assert_eq!(RemoteErrorKind::from_http_status(403), RemoteErrorKind::Forbidden);
        assert_eq!(RemoteErrorKind::from_http_status(404), RemoteErrorKind::NotFound);
        assert_eq!(RemoteErrorKind::from_http_status(503), RemoteErrorKind::Server);
        assert_eq!(RemoteErrorKind::from_http_status(422), RemoteErrorKind::Rejected);
    }

    #[test]
    fn unauthorized_asks_user_to_log_in_again() {
        let error = PortalError::from(RemoteError::new(RemoteErrorKind::Unauthorized, "401"));
        assert_eq!(error.user_message(), "Your session has expired. Please log in again.");
        assert!(!error.is_retryable());
    }

    #[test]
    fn timeouts_are_retryable_with_connection_guidance() {
        let error = PortalError::from(RemoteError::timeout("request exceeded 10s"));
        assert!(error.is_retryable());
        assert_eq!(
            error.user_message(),
            "Could not reach the service. Check your connection and try again."
        );
        assert_eq!(error.to_string(), "timeout failure: request exceeded 10s");
    }

    #[test]
    fn business_rejection_is_terminal() {
        let error = PortalError::Rejected("kit already confirmed by staff".to_string());
        assert!(!error.is_retryable());
    }
}
