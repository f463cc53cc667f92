//! System-prompt addendum describing the current plan

use super::types::ExecutionPlan;

/// Returned for a plan without steps
pub const EMPTY_PLAN_ADDENDUM: &str = "No plan steps.";

/// Render the plan state for injection into the LLM system prompt
///
/// Output depends only on complexity, status and the ordered steps, so the same
/// plan always renders to the same bytes.
pub fn build_plan_system_addendum(plan: &ExecutionPlan) -> String {
    if plan.is_empty() {
        return EMPTY_PLAN_ADDENDUM.to_string();
    }

    let mut output = String::new();
    output.push_str("## Current Execution Plan\n");
    output.push_str(&format!("Complexity: {}\n", plan.complexity()));
    output.push_str(&format!("Status: {}\n\n", plan.status()));

    for (i, step) in plan.steps().iter().enumerate() {
        let tool = step.tool_name.as_deref().unwrap_or("unresolved");
        output.push_str(&format!(
            "{}. {} [tool: {}] ({})",
            i + 1,
            step.description,
            tool,
            step.status()
        ));
        if let Some(result_ref) = step.result_ref() {
            output.push_str(&format!(" -> result: {}", result_ref));
        }
        if let Some(error) = step.error() {
            output.push_str(&format!(" -> error: {}", error));
        }
        output.push('\n');
    }

    output
}
