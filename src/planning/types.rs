//! Core types for execution planning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a request was classified when the plan was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// A single, directly named capability
    Simple,
    /// A sequence of dependent operations
    MultiStep,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::MultiStep => "multi_step",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Whether `self -> next` is an edge of the step state machine
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        )
    }

    /// Check the result/error payload a step in this status may carry
    ///
    /// `completed` needs a result reference, `failed` an error, and no other
    /// status carries either.
    pub(crate) fn check_payload(
        &self,
        has_result: bool,
        has_error: bool,
    ) -> Result<(), &'static str> {
        match self {
            StepStatus::Completed if !has_result => Err("completed requires a result reference"),
            StepStatus::Completed if has_error => Err("completed step cannot carry an error"),
            StepStatus::Failed if !has_error => Err("failed requires an error"),
            StepStatus::Failed if has_result => Err("failed step cannot carry a result reference"),
            StepStatus::Completed | StepStatus::Failed => Ok(()),
            _ if has_result || has_error => {
                Err("only completed or failed steps carry a result or error")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall plan status, derived from the step statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in an execution plan
///
/// Status, result and error are only changed through the status tracker so that
/// `result_ref` is present exactly when the step is completed and `error` exactly
/// when it failed. Deserialization checks the same rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredStep")]
pub struct PlanStep {
    /// Unique step ID within the owning plan
    pub id: String,
    /// Natural-language intent ("merge parcels with zoning layer")
    pub description: String,
    /// Tool expected to satisfy this step, `None` while unresolved
    pub tool_name: Option<String>,
    pub(super) status: StepStatus,
    pub(super) result_ref: Option<String>,
    pub(super) error: Option<String>,
    #[serde(default)]
    pub(super) started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(super) finished_at: Option<DateTime<Utc>>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool_name: None,
            status: StepStatus::Pending,
            result_ref: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// Output reference (e.g. a layer id), only set once completed
    pub fn result_ref(&self) -> Option<&str> {
        self.result_ref.as_deref()
    }

    /// Failure reason, only set once failed
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.tool_name.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

/// Serialized form of [`PlanStep`], validated before use
#[derive(Deserialize)]
struct StoredStep {
    id: String,
    description: String,
    #[serde(default)]
    tool_name: Option<String>,
    status: StepStatus,
    #[serde(default)]
    result_ref: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<StoredStep> for PlanStep {
    type Error = String;

    fn try_from(stored: StoredStep) -> Result<Self, Self::Error> {
        stored
            .status
            .check_payload(stored.result_ref.is_some(), stored.error.is_some())
            .map_err(|reason| format!("step {} ({}): {}", stored.id, stored.status, reason))?;

        Ok(Self {
            id: stored.id,
            description: stored.description,
            tool_name: stored.tool_name,
            status: stored.status,
            result_ref: stored.result_ref,
            error: stored.error,
            started_at: stored.started_at,
            finished_at: stored.finished_at,
        })
    }
}

/// An ordered plan of steps created for one user request
///
/// The plan status is never read back from storage; it is derived from the
/// steps on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredPlan")]
pub struct ExecutionPlan {
    /// Unique plan ID
    pub id: String,
    /// Original user request
    pub request: String,
    steps: Vec<PlanStep>,
    complexity: Complexity,
    status: PlanStatus,
    /// Keep executing after a failed step instead of failing the plan
    #[serde(default)]
    continue_on_failure: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct StoredPlan {
    id: String,
    request: String,
    steps: Vec<PlanStep>,
    complexity: Complexity,
    #[serde(default)]
    continue_on_failure: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<StoredPlan> for ExecutionPlan {
    type Error = String;

    fn try_from(stored: StoredPlan) -> Result<Self, Self::Error> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = stored.steps.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(format!("duplicate step id {} in plan {}", dup.id, stored.id));
        }

        let mut plan = Self {
            id: stored.id,
            request: stored.request,
            steps: stored.steps,
            complexity: stored.complexity,
            status: PlanStatus::Pending,
            continue_on_failure: stored.continue_on_failure,
            created_at: stored.created_at,
        };
        plan.refresh_status();
        Ok(plan)
    }
}

impl ExecutionPlan {
    pub fn new(request: impl Into<String>, complexity: Complexity) -> Self {
        let plan_id = format!("plan-{}", &Uuid::new_v4().to_string()[..8]);
        let mut plan = Self {
            id: plan_id,
            request: request.into(),
            steps: Vec::new(),
            complexity,
            status: PlanStatus::Pending,
            continue_on_failure: false,
            created_at: Utc::now(),
        };
        plan.refresh_status();
        plan
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self.refresh_status();
        self
    }

    /// Append a pending step; its id is `step-<position>`
    pub fn with_step(mut self, description: impl Into<String>, tool_name: Option<String>) -> Self {
        self.push_step(description.into(), tool_name);
        self
    }

    pub(crate) fn push_step(&mut self, description: String, tool_name: Option<String>) {
        let mut step = PlanStep::new(format!("step-{}", self.steps.len() + 1), description);
        step.tool_name = tool_name;
        self.steps.push(step);
        self.refresh_status();
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn continue_on_failure(&self) -> bool {
        self.continue_on_failure
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub(super) fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub(super) fn step_at_mut(&mut self, index: usize) -> &mut PlanStep {
        &mut self.steps[index]
    }

    /// Record the tool chosen for a step
    ///
    /// Returns false when no step has this id.
    pub fn assign_tool(&mut self, step_id: &str, tool_name: impl Into<String>) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.tool_name = Some(tool_name.into());
                true
            }
            None => false,
        }
    }

    /// First step still waiting to run
    pub fn next_pending(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Recompute the derived plan status from the step statuses
    pub(crate) fn refresh_status(&mut self) {
        self.status = derive_status(&self.steps, self.continue_on_failure);
    }

    /// One-line summary, e.g. "2/3 steps completed, 1 failed"
    pub fn summary(&self) -> String {
        let completed = self.count_with_status(StepStatus::Completed);
        let failed = self.count_with_status(StepStatus::Failed);
        let total = self.steps.len();

        if failed > 0 {
            format!("{}/{} steps completed, {} failed", completed, total, failed)
        } else {
            format!("{}/{} steps completed", completed, total)
        }
    }
}

fn derive_status(steps: &[PlanStep], continue_on_failure: bool) -> PlanStatus {
    let any_failed = steps.iter().any(|s| s.status == StepStatus::Failed);
    if any_failed && !continue_on_failure {
        return PlanStatus::Failed;
    }

    let any_open = steps
        .iter()
        .any(|s| matches!(s.status, StepStatus::Pending | StepStatus::InProgress));
    if any_open {
        PlanStatus::Pending
    } else if any_failed {
        PlanStatus::Failed
    } else {
        PlanStatus::Completed
    }
}

/// Events emitted while a plan executes
#[derive(Debug, Clone)]
pub enum PlanEvent {
    StepStarted {
        plan_id: String,
        step_id: String,
        tool_name: String,
    },
    StepCompleted {
        plan_id: String,
        step_id: String,
        success: bool,
        result_ref: Option<String>,
        error: Option<String>,
    },
    StepSkipped {
        plan_id: String,
        step_id: String,
    },
    PlanFinished {
        plan_id: String,
        status: PlanStatus,
        summary: String,
    },
}
