pub mod orchestrator;

pub use orchestrator::{
    BatchReport, DetectionFailure, DetectionOrchestrator, OrchestratorError, Revalidation,
};
