//! Request planner
//!
//! Turns a natural-language request into an [`ExecutionPlan`]. Classification
//! is heuristic (see [`super::complexity`]); an optional strategy such as the
//! LLM-backed one is consulted only when the heuristic flags a request as
//! ambiguous.

use std::sync::Arc;

use crate::config::PlanningConfig;
use crate::error::PlanError;
use crate::tools::ToolDescriptor;

use super::complexity::{assess_request, names_tool, words, Assessment, ComplexityStrategy};
use super::types::ExecutionPlan;

/// Build a plan for `request` with the default planning settings
pub fn create_execution_plan(
    request: &str,
    available_tools: &[ToolDescriptor],
) -> Result<ExecutionPlan, PlanError> {
    TaskPlanner::new(PlanningConfig::default()).plan(request, available_tools)
}

/// Plans requests against a tool set
pub struct TaskPlanner {
    config: PlanningConfig,
    strategy: Option<Arc<dyn ComplexityStrategy>>,
}

impl TaskPlanner {
    pub fn new(config: PlanningConfig) -> Self {
        Self {
            config,
            strategy: None,
        }
    }

    /// Consult `strategy` for requests the heuristic finds ambiguous
    pub fn with_strategy(mut self, strategy: Arc<dyn ComplexityStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    /// Create a plan using only the connector heuristic
    pub fn plan(
        &self,
        request: &str,
        available_tools: &[ToolDescriptor],
    ) -> Result<ExecutionPlan, PlanError> {
        validate_request(request)?;
        let tool_names = tool_names(available_tools);
        let assessment = assess_request(request, &tool_names);
        self.build_plan(request, assessment, &tool_names)
    }

    /// Create a plan, asking the strategy about ambiguous requests
    ///
    /// A failing or unusable strategy answer falls back to the heuristic.
    pub async fn create_plan(
        &self,
        request: &str,
        available_tools: &[ToolDescriptor],
    ) -> Result<ExecutionPlan, PlanError> {
        validate_request(request)?;
        let tool_names = tool_names(available_tools);
        let mut assessment = assess_request(request, &tool_names);

        if let Some(strategy) = &self.strategy {
            if assessment.ambiguous && self.config.consult_llm_on_ambiguity {
                tracing::debug!("Request is ambiguous, consulting complexity strategy");
                match strategy.classify(request, &assessment).await {
                    Ok(answer) if self.exceeds_max_steps(answer.clauses.len()) => {
                        tracing::warn!(
                            "Complexity strategy returned {} steps, using heuristic",
                            answer.clauses.len()
                        )
                    }
                    Ok(answer) => assessment = answer,
                    Err(e) => {
                        tracing::warn!("Complexity strategy failed, using heuristic: {:#}", e)
                    }
                }
            }
        }

        self.build_plan(request, assessment, &tool_names)
    }

    fn exceeds_max_steps(&self, steps: usize) -> bool {
        self.config.max_steps.is_some_and(|max| steps > max)
    }

    fn build_plan(
        &self,
        request: &str,
        assessment: Assessment,
        tool_names: &[&str],
    ) -> Result<ExecutionPlan, PlanError> {
        if let Some(max_steps) = self.config.max_steps {
            if assessment.clauses.len() > max_steps {
                return Err(PlanError::InvalidRequest(format!(
                    "request breaks down into {} steps, more than the limit of {}",
                    assessment.clauses.len(),
                    max_steps
                )));
            }
        }

        let mut plan = ExecutionPlan::new(request.trim(), assessment.complexity)
            .with_continue_on_failure(self.config.continue_on_failure);
        for clause in assessment.clauses {
            let tool = named_tool(&clause, tool_names);
            plan.push_step(clause, tool);
        }

        tracing::info!(
            "Created {} plan {} with {} step(s)",
            plan.complexity(),
            plan.id,
            plan.steps().len()
        );
        Ok(plan)
    }
}

fn validate_request(request: &str) -> Result<(), PlanError> {
    if request.trim().is_empty() {
        return Err(PlanError::InvalidRequest("request is empty".to_string()));
    }
    Ok(())
}

fn tool_names(tools: &[ToolDescriptor]) -> Vec<&str> {
    tools.iter().map(|t| t.name.as_str()).collect()
}

/// The tool named in `clause`, when exactly one is
fn named_tool(clause: &str, tool_names: &[&str]) -> Option<String> {
    let clause_words = words(clause);
    let mut named = tool_names
        .iter()
        .filter(|name| names_tool(&clause_words, name));
    match (named.next(), named.next()) {
        (Some(name), None) => Some(name.to_string()),
        _ => None,
    }
}
