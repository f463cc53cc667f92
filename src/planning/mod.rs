//! Execution Planning Module
//!
//! Turns requests into ordered plans of tool invocations, matches steps to
//! registered tools, tracks step status as tools run, and renders the plan
//! state for the LLM system prompt.

pub mod addendum;
pub mod complexity;
pub mod executor;
pub mod matcher;
pub mod planner;
pub mod tracker;
pub mod types;

pub use addendum::{build_plan_system_addendum, EMPTY_PLAN_ADDENDUM};
pub use complexity::{assess_request, Assessment, ComplexityStrategy, LlmComplexityStrategy};
pub use executor::{PlanExecutor, StepRunner};
pub use matcher::{match_tool_to_plan_step, match_tool_with_score, resolve_plan_tools};
pub use planner::{create_execution_plan, TaskPlanner};
pub use tracker::{skip_pending_steps, update_plan_step_status};
pub use types::{Complexity, ExecutionPlan, PlanEvent, PlanStatus, PlanStep, StepStatus};
