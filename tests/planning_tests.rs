use geo_assistant::error::PlanError;
use geo_assistant::planning::{
    build_plan_system_addendum, create_execution_plan, match_tool_to_plan_step,
    update_plan_step_status, Complexity, ExecutionPlan, PlanStatus, PlanStep, StepStatus,
};
use geo_assistant::tools::{ToolDescriptor, ToolRegistry};

fn scenario_tools() -> Vec<ToolDescriptor> {
    ToolRegistry::builtin()
        .tools()
        .iter()
        .filter(|t| ["geocode", "centroid", "merge"].contains(&t.name.as_str()))
        .cloned()
        .collect()
}

#[test]
fn test_geocode_centroid_merge_scenario() {
    let tools = scenario_tools();
    let plan = create_execution_plan(
        "Geocode 123 Main St, then compute its centroid, then merge with the zoning layer",
        &tools,
    )
    .unwrap();

    assert_eq!(plan.complexity(), Complexity::MultiStep);
    assert_eq!(plan.steps().len(), 3);
    assert!(plan.steps().iter().all(|s| s.status() == StepStatus::Pending));

    let resolved: Vec<&str> = plan
        .steps()
        .iter()
        .map(|step| match_tool_to_plan_step(step, &tools).map(|t| t.name.as_str()).unwrap_or(""))
        .collect();
    assert_eq!(resolved, vec!["geocode", "centroid", "merge"]);
}

#[test]
fn test_simple_request_single_step() {
    let tools = scenario_tools();
    let plan = create_execution_plan("Geocode 123 Main St, Springfield", &tools).unwrap();

    assert_eq!(plan.complexity(), Complexity::Simple);
    assert_eq!(plan.steps().len(), 1);
    assert_eq!(plan.steps()[0].description, "Geocode 123 Main St, Springfield");
    assert_eq!(plan.steps()[0].status(), StepStatus::Pending);
}

#[test]
fn test_empty_request_is_invalid() {
    let err = create_execution_plan("", &scenario_tools()).unwrap_err();
    assert!(matches!(err, PlanError::InvalidRequest(_)));
}

#[test]
fn test_empty_tool_set_never_matches() {
    let step = PlanStep::new("step-1", "geocode 1 Elm St");
    assert!(match_tool_to_plan_step(&step, &[]).is_none());
}

#[test]
fn test_matching_is_deterministic() {
    let tools = scenario_tools();
    let step = PlanStep::new("step-1", "merge with the zoning layer");
    let first = match_tool_to_plan_step(&step, &tools).map(|t| t.name.clone());
    for _ in 0..10 {
        assert_eq!(match_tool_to_plan_step(&step, &tools).map(|t| t.name.clone()), first);
    }
}

fn run_to(plan: &mut ExecutionPlan, step_id: &str, outcome: StepStatus) {
    update_plan_step_status(plan, step_id, StepStatus::InProgress, None, None).unwrap();
    let (result_ref, error) = match outcome {
        StepStatus::Completed => (Some(format!("{}-layer", step_id)), None),
        _ => (None, Some("tool crashed".to_string())),
    };
    update_plan_step_status(plan, step_id, outcome, result_ref, error).unwrap();
}

fn three_step_plan() -> ExecutionPlan {
    ExecutionPlan::new("r", Complexity::MultiStep)
        .with_step("geocode", Some("geocode".to_string()))
        .with_step("centroid", Some("centroid".to_string()))
        .with_step("merge", Some("merge".to_string()))
}

#[test]
fn test_derived_status_with_failure() {
    let mut plan = three_step_plan();
    run_to(&mut plan, "step-1", StepStatus::Completed);
    run_to(&mut plan, "step-2", StepStatus::Completed);
    run_to(&mut plan, "step-3", StepStatus::Failed);
    assert_eq!(plan.status(), PlanStatus::Failed);
}

#[test]
fn test_derived_status_all_completed() {
    let mut plan = three_step_plan();
    for id in ["step-1", "step-2", "step-3"] {
        run_to(&mut plan, id, StepStatus::Completed);
    }
    assert_eq!(plan.status(), PlanStatus::Completed);
}

#[test]
fn test_terminal_step_rejects_updates() {
    let mut plan = three_step_plan();
    run_to(&mut plan, "step-1", StepStatus::Completed);

    let err = update_plan_step_status(&mut plan, "step-1", StepStatus::InProgress, None, None)
        .unwrap_err();
    assert!(matches!(err, PlanError::InvalidTransition { .. }));
    assert_eq!(plan.steps()[0].status(), StepStatus::Completed);
}

#[test]
fn test_addendum_tracks_progress() {
    let mut plan = three_step_plan();
    let before = build_plan_system_addendum(&plan);
    assert_eq!(before, build_plan_system_addendum(&plan));

    run_to(&mut plan, "step-1", StepStatus::Completed);
    let after = build_plan_system_addendum(&plan);
    assert_ne!(before, after);
    assert!(after.contains("1. geocode [tool: geocode] (completed) -> result: step-1-layer"));
    assert!(after.contains("2. centroid [tool: centroid] (pending)"));
}
