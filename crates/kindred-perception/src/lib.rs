pub mod intent;
pub mod mode;
pub mod monologue;
pub mod safety;
pub mod types;

pub use types::{DetectionSignals, IntentResult, RoutingTarget, SafetyAssessment};
