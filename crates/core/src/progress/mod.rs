pub mod engine;
pub mod steps;

pub use engine::{derive, derive_at, ProgressFacts};
pub use steps::{Progress, ProgressStep, RequiredAction, StepKind, StepStatus};
