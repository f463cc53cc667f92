//! Plan executor
//!
//! Walks a plan in order on behalf of the orchestrator: resolves each step's
//! tool, hands it to a [`StepRunner`], and records the outcome through the
//! status tracker. Progress is reported on an event channel.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::PlanningConfig;
use crate::tools::{ToolDescriptor, ToolRegistry};

use super::matcher::match_tool_with_score;
use super::tracker::{skip_pending_steps, update_plan_step_status};
use super::types::{ExecutionPlan, PlanEvent, PlanStatus, PlanStep, StepStatus};

/// Runs one resolved step; implemented by the surrounding orchestrator
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Execute `step` with `tool` and return a reference to the produced output
    /// (e.g. a layer id)
    async fn run(&self, tool: &ToolDescriptor, step: &PlanStep) -> Result<String>;
}

/// Executes a plan step by step
pub struct PlanExecutor<'a> {
    registry: &'a ToolRegistry,
    config: PlanningConfig,
    event_tx: Option<mpsc::UnboundedSender<PlanEvent>>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry, config: PlanningConfig) -> Self {
        Self {
            registry,
            config,
            event_tx: None,
        }
    }

    pub fn with_events(mut self, event_tx: mpsc::UnboundedSender<PlanEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn emit(&self, event: PlanEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn resolve_tool(&self, step: &PlanStep) -> Option<&'a ToolDescriptor> {
        let registry: &'a ToolRegistry = self.registry;
        match &step.tool_name {
            Some(name) => registry.get(name),
            None => match_tool_with_score(step, registry.tools(), self.config.match_threshold)
                .map(|(tool, _)| tool),
        }
    }

    /// Run every pending step in order until the plan reaches a terminal status
    ///
    /// Errors are orchestration bugs (invalid transitions); tool failures are
    /// recorded on the step instead.
    pub async fn execute(&self, plan: &mut ExecutionPlan, runner: &dyn StepRunner) -> Result<()> {
        tracing::info!(
            "Executing plan {} ({} steps, {})",
            plan.id,
            plan.steps().len(),
            plan.complexity()
        );

        while let Some(step) = plan.next_pending().cloned() {
            if plan.status() == PlanStatus::Failed {
                break;
            }

            let tool = self.resolve_tool(&step);
            let tool_label = tool
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "unresolved".to_string());

            update_plan_step_status(plan, &step.id, StepStatus::InProgress, None, None)?;
            self.emit(PlanEvent::StepStarted {
                plan_id: plan.id.clone(),
                step_id: step.id.clone(),
                tool_name: tool_label,
            });

            let outcome = match tool {
                Some(tool) => {
                    if step.tool_name.is_none() {
                        plan.assign_tool(&step.id, tool.name.clone());
                    }
                    tracing::info!("Running step {} with tool {}", step.id, tool.name);
                    run_step(runner, tool, &step).await
                }
                None => Err(format!("No tool matches step: {}", step.description)),
            };

            match outcome {
                Ok(result_ref) => {
                    update_plan_step_status(
                        plan,
                        &step.id,
                        StepStatus::Completed,
                        Some(result_ref.clone()),
                        None,
                    )?;
                    self.emit(PlanEvent::StepCompleted {
                        plan_id: plan.id.clone(),
                        step_id: step.id.clone(),
                        success: true,
                        result_ref: Some(result_ref),
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::warn!("Step {} failed: {}", step.id, error);
                    update_plan_step_status(
                        plan,
                        &step.id,
                        StepStatus::Failed,
                        None,
                        Some(error.clone()),
                    )?;
                    self.emit(PlanEvent::StepCompleted {
                        plan_id: plan.id.clone(),
                        step_id: step.id.clone(),
                        success: false,
                        result_ref: None,
                        error: Some(error),
                    });
                }
            }
        }

        // Downstream steps of a failed plan are abandoned
        if plan.status() == PlanStatus::Failed {
            for step_id in skip_pending_steps(plan) {
                self.emit(PlanEvent::StepSkipped {
                    plan_id: plan.id.clone(),
                    step_id,
                });
            }
        }

        tracing::info!("Plan {} finished: {}", plan.id, plan.summary());
        self.emit(PlanEvent::PlanFinished {
            plan_id: plan.id.clone(),
            status: plan.status(),
            summary: plan.summary(),
        });

        Ok(())
    }
}

async fn run_step(
    runner: &dyn StepRunner,
    tool: &ToolDescriptor,
    step: &PlanStep,
) -> Result<String, String> {
    match runner.run(tool, step).await {
        Ok(result_ref) if result_ref.trim().is_empty() => {
            Err(format!("Tool {} returned no result", tool.name))
        }
        Ok(result_ref) => Ok(result_ref),
        Err(e) => Err(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::types::Complexity;
    use std::sync::Mutex;

    /// Records calls and fails for the configured tools
    struct FakeRunner {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepRunner for FakeRunner {
        async fn run(&self, tool: &ToolDescriptor, step: &PlanStep) -> Result<String> {
            self.calls.lock().unwrap().push(tool.name.clone());
            if self.failing.contains(&tool.name.as_str()) {
                anyhow::bail!("{} service unavailable", tool.name);
            }
            Ok(format!("{}-{}", tool.name, step.id))
        }
    }

    fn scenario_plan() -> ExecutionPlan {
        ExecutionPlan::new("r", Complexity::MultiStep)
            .with_step("Geocode 123 Main St", Some("geocode".to_string()))
            .with_step("compute its centroid", None)
            .with_step("merge with the zoning layer", None)
    }

    #[tokio::test]
    async fn test_execute_all_steps() {
        let registry = ToolRegistry::builtin();
        let runner = FakeRunner::new(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = PlanExecutor::new(&registry, PlanningConfig::default()).with_events(tx);

        let mut plan = scenario_plan();
        executor.execute(&mut plan, &runner).await.unwrap();

        assert_eq!(plan.status(), PlanStatus::Completed);
        assert_eq!(runner.calls(), vec!["geocode", "centroid", "merge"]);
        assert_eq!(plan.steps()[1].tool_name.as_deref(), Some("centroid"));
        assert_eq!(plan.steps()[2].result_ref(), Some("merge-step-3"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 7);
        assert!(matches!(
            events.last(),
            Some(PlanEvent::PlanFinished { status: PlanStatus::Completed, .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_skips_downstream() {
        let registry = ToolRegistry::builtin();
        let runner = FakeRunner::new(vec!["centroid"]);
        let executor = PlanExecutor::new(&registry, PlanningConfig::default());

        let mut plan = scenario_plan();
        executor.execute(&mut plan, &runner).await.unwrap();

        assert_eq!(plan.status(), PlanStatus::Failed);
        assert_eq!(runner.calls(), vec!["geocode", "centroid"]);
        assert_eq!(plan.steps()[1].status(), StepStatus::Failed);
        assert_eq!(plan.steps()[1].error(), Some("centroid service unavailable"));
        assert_eq!(plan.steps()[2].status(), StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_continue_on_failure_runs_remaining() {
        let registry = ToolRegistry::builtin();
        let runner = FakeRunner::new(vec!["centroid"]);
        let config = PlanningConfig {
            continue_on_failure: true,
            ..PlanningConfig::default()
        };
        let executor = PlanExecutor::new(&registry, config);

        let mut plan = scenario_plan().with_continue_on_failure(true);
        executor.execute(&mut plan, &runner).await.unwrap();

        assert_eq!(runner.calls(), vec!["geocode", "centroid", "merge"]);
        assert_eq!(plan.steps()[2].status(), StepStatus::Completed);
        assert_eq!(plan.status(), PlanStatus::Failed);
    }

    #[tokio::test]
    async fn test_unresolved_step_fails() {
        let registry = ToolRegistry::builtin();
        let runner = FakeRunner::new(vec![]);
        let executor = PlanExecutor::new(&registry, PlanningConfig::default());

        let mut plan = ExecutionPlan::new("r", Complexity::MultiStep)
            .with_step("reproject to EPSG 3857", None)
            .with_step("compute its centroid", None);
        executor.execute(&mut plan, &runner).await.unwrap();

        assert!(runner.calls().is_empty());
        assert_eq!(
            plan.steps()[0].error(),
            Some("No tool matches step: reproject to EPSG 3857")
        );
        assert_eq!(plan.steps()[1].status(), StepStatus::Skipped);
    }
}
