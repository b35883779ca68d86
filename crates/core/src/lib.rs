pub mod config;
pub mod confirmation;
pub mod domain;
pub mod errors;
pub mod feedback;
pub mod payment;
pub mod ports;
pub mod progress;
pub mod session;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use confirmation::{
    CollectionConfirmation, ConfirmationFlags, ConfirmationTracker, DeliveryConfirmation,
};
pub use domain::booking::{Booking, BookingId, BookingRecord, BookingStatus, RawStatus};
pub use domain::feedback::{Feedback, FeedbackId, TestServiceId, UserId};
pub use domain::payment::{OrderCode, PaymentIntent, PaymentKind};
pub use errors::{PortalError, RemoteError, RemoteErrorKind, StatusError, StoreError};
pub use feedback::{should_offer_feedback, FeedbackCache, FeedbackKey, FeedbackLookup};
pub use payment::{PaymentAttemptState, PaymentOrchestrator, ReconcileOutcome};
pub use ports::{
    BookingService, FeedbackService, KeyValueStore, Navigator, PaymentGateway, SampleService,
};
pub use progress::{derive, Progress, ProgressFacts, ProgressStep, RequiredAction, StepStatus};
pub use session::{BookingSession, BookingView, Collaborators, PaymentReturn};
pub use status::normalize;
