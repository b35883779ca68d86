pub mod attempt;
pub mod orchestrator;

pub use attempt::{AttemptEvent, AttemptTransitionError, PaymentAttemptState};
pub use orchestrator::{PaymentOrchestrator, ReconcileOutcome};
