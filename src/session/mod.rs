//! Agent session
//!
//! One session per user request flow. The orchestrator creates it, threads it
//! through planning and execution, and reads the plan addendum from it when
//! building the next LLM prompt. Nothing here is shared between sessions.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::config::PlanningConfig;
use crate::error::PlanError;
use crate::matching::find_layer;
use crate::planning::{
    build_plan_system_addendum, resolve_plan_tools, skip_pending_steps, update_plan_step_status,
    ComplexityStrategy, ExecutionPlan, PlanEvent, PlanExecutor, StepRunner, StepStatus,
    TaskPlanner, EMPTY_PLAN_ADDENDUM,
};
use crate::tools::ToolRegistry;

/// Finished plans kept per session
const MAX_PLAN_HISTORY: usize = 10;

pub struct AgentSession {
    tools: Arc<ToolRegistry>,
    planner: TaskPlanner,
    current_plan: Option<ExecutionPlan>,
    plan_history: Vec<ExecutionPlan>,
}

impl AgentSession {
    pub fn new(tools: Arc<ToolRegistry>, config: PlanningConfig) -> Self {
        Self {
            tools,
            planner: TaskPlanner::new(config),
            current_plan: None,
            plan_history: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ComplexityStrategy>) -> Self {
        self.planner = self.planner.with_strategy(strategy);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &PlanningConfig {
        self.planner.config()
    }

    /// Plan a request with the heuristic and resolve tools for its steps
    pub fn plan_request(&mut self, request: &str) -> Result<&ExecutionPlan, PlanError> {
        let plan = self.planner.plan(request, self.tools.tools())?;
        Ok(self.install_plan(plan))
    }

    /// Like [`Self::plan_request`], consulting the complexity strategy when needed
    pub async fn plan_request_with(
        &mut self,
        request: &str,
    ) -> Result<&ExecutionPlan, PlanError> {
        let plan = self.planner.create_plan(request, self.tools.tools()).await?;
        Ok(self.install_plan(plan))
    }

    fn install_plan(&mut self, mut plan: ExecutionPlan) -> &ExecutionPlan {
        let unresolved = resolve_plan_tools(
            &mut plan,
            self.tools.tools(),
            self.planner.config().match_threshold,
        );
        if !unresolved.is_empty() {
            tracing::debug!("Plan {} has unresolved steps: {:?}", plan.id, unresolved);
        }

        if let Some(old_plan) = self.current_plan.take() {
            self.archive(old_plan);
        }
        self.current_plan.insert(plan)
    }

    fn archive(&mut self, plan: ExecutionPlan) {
        if self.plan_history.len() >= MAX_PLAN_HISTORY {
            self.plan_history.remove(0);
        }
        self.plan_history.push(plan);
    }

    /// Get the current plan (if any)
    pub fn current_plan(&self) -> Option<&ExecutionPlan> {
        self.current_plan.as_ref()
    }

    /// Get plan history, oldest first
    pub fn history(&self) -> &[ExecutionPlan] {
        &self.plan_history
    }

    /// Update a step of the current plan
    pub fn update_step(
        &mut self,
        step_id: &str,
        new_status: StepStatus,
        result_ref: Option<String>,
        error: Option<String>,
    ) -> Result<&ExecutionPlan, PlanError> {
        let plan = self
            .current_plan
            .as_mut()
            .ok_or_else(|| PlanError::UnknownStep(step_id.to_string()))?;
        let plan = update_plan_step_status(plan, step_id, new_status, result_ref, error)?;
        Ok(&*plan)
    }

    /// Skip every pending step of the current plan
    pub fn abandon_plan(&mut self) -> Vec<String> {
        match self.current_plan.as_mut() {
            Some(plan) => {
                let skipped = skip_pending_steps(plan);
                tracing::info!("Abandoned plan {} ({} steps skipped)", plan.id, skipped.len());
                skipped
            }
            None => Vec::new(),
        }
    }

    /// Run the current plan through `runner`, reporting progress on `event_tx`
    pub async fn execute(
        &mut self,
        runner: &dyn StepRunner,
        event_tx: Option<mpsc::UnboundedSender<PlanEvent>>,
    ) -> Result<()> {
        let plan = self
            .current_plan
            .as_mut()
            .context("No plan to execute")?;
        let mut executor = PlanExecutor::new(&self.tools, self.planner.config().clone());
        if let Some(tx) = event_tx {
            executor = executor.with_events(tx);
        }
        executor.execute(plan, runner).await
    }

    /// Move the current plan to history once it is terminal
    pub fn finish_plan(&mut self) -> Option<&ExecutionPlan> {
        if !self.current_plan.as_ref()?.status().is_terminal() {
            return None;
        }
        let plan = self.current_plan.take()?;
        self.archive(plan);
        self.plan_history.last()
    }

    /// Plan fragment for the system prompt
    pub fn system_addendum(&self) -> String {
        match &self.current_plan {
            Some(plan) => build_plan_system_addendum(plan),
            None => EMPTY_PLAN_ADDENDUM.to_string(),
        }
    }

    /// Resolve a user-supplied layer name with the session's match threshold
    pub fn find_layer<'a>(&self, query: &str, layer_names: &'a [String]) -> Option<&'a str> {
        find_layer(query, layer_names, self.planner.config().match_threshold)
    }
}
