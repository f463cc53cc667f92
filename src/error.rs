//! Error types for planning and the tool registry
//!
//! Library-level failures are typed so the orchestrator can tell a bad request
//! (ask the user to rephrase) from an orchestration bug (abort the plan).

use thiserror::Error;

use crate::planning::types::StepStatus;

#[derive(Debug, Error)]
pub enum PlanError {
    /// The request text is empty or cannot be turned into a plan
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A status update that is not an edge of the step state machine
    #[error("invalid transition for step {step_id}: {from} -> {to} ({reason})")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
        reason: String,
    },

    /// No step with this id exists in the plan
    #[error("unknown plan step: {0}")]
    UnknownStep(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("failed to parse tool definitions: {0}")]
    Parse(#[from] toml::de::Error),
}
