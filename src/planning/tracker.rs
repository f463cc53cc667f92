//! Step status tracking
//!
//! Step state machine:
//! ```text
//! pending -> in_progress -> completed | failed
//! pending -> skipped
//! ```
//! `completed`, `failed` and `skipped` are terminal.

use chrono::Utc;

use crate::error::PlanError;

use super::types::{ExecutionPlan, StepStatus};

/// Apply a status change to one step and refresh the plan status
///
/// `result_ref` is required for `completed`, `error` for `failed`; no other
/// target accepts either. A rejected update leaves the plan unchanged.
pub fn update_plan_step_status<'a>(
    plan: &'a mut ExecutionPlan,
    step_id: &str,
    new_status: StepStatus,
    result_ref: Option<String>,
    error: Option<String>,
) -> Result<&'a mut ExecutionPlan, PlanError> {
    let index = plan
        .step_index(step_id)
        .ok_or_else(|| PlanError::UnknownStep(step_id.to_string()))?;
    let from = plan.steps()[index].status();

    let reject = |reason: &str| PlanError::InvalidTransition {
        step_id: step_id.to_string(),
        from,
        to: new_status,
        reason: reason.to_string(),
    };

    if !from.can_transition_to(new_status) {
        let reason = if from.is_terminal() {
            "step is already in a terminal state"
        } else {
            "not an allowed transition"
        };
        return Err(reject(reason));
    }

    new_status
        .check_payload(result_ref.is_some(), error.is_some())
        .map_err(reject)?;

    let now = Utc::now();
    let step = plan.step_at_mut(index);
    step.status = new_status;
    step.result_ref = result_ref;
    step.error = error;
    if new_status == StepStatus::InProgress {
        step.started_at = Some(now);
    } else {
        step.finished_at = Some(now);
    }

    plan.refresh_status();
    Ok(plan)
}

/// Move every remaining `pending` step to `skipped`
///
/// Used by the caller when it abandons a plan; returns the skipped step ids.
pub fn skip_pending_steps(plan: &mut ExecutionPlan) -> Vec<String> {
    let pending: Vec<String> = plan
        .steps()
        .iter()
        .filter(|s| s.status() == StepStatus::Pending)
        .map(|s| s.id.clone())
        .collect();

    pending
        .into_iter()
        .filter(|step_id| {
            update_plan_step_status(plan, step_id, StepStatus::Skipped, None, None).is_ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::types::{Complexity, PlanStatus};

    const ALL: [StepStatus; 5] = [
        StepStatus::Pending,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Failed,
        StepStatus::Skipped,
    ];

    fn plan(n: usize) -> ExecutionPlan {
        (1..=n).fold(ExecutionPlan::new("r", Complexity::MultiStep), |p, i| {
            p.with_step(format!("Step {}", i), None)
        })
    }

    fn payload(status: StepStatus) -> (Option<String>, Option<String>) {
        match status {
            StepStatus::Completed => (Some("layer-1".to_string()), None),
            StepStatus::Failed => (None, Some("boom".to_string())),
            _ => (None, None),
        }
    }

    /// Drive step-1 into `status` through allowed edges
    fn plan_with_first_step(status: StepStatus) -> ExecutionPlan {
        let mut p = plan(2);
        let path: &[StepStatus] = match status {
            StepStatus::Pending => &[],
            StepStatus::InProgress => &[StepStatus::InProgress],
            StepStatus::Completed => &[StepStatus::InProgress, StepStatus::Completed],
            StepStatus::Failed => &[StepStatus::InProgress, StepStatus::Failed],
            StepStatus::Skipped => &[StepStatus::Skipped],
        };
        for s in path {
            let (r, e) = payload(*s);
            update_plan_step_status(&mut p, "step-1", *s, r, e).unwrap();
        }
        p
    }

    #[test]
    fn test_transition_table() {
        for from in ALL {
            for to in ALL {
                let mut p = plan_with_first_step(from);
                let (r, e) = payload(to);
                let result = update_plan_step_status(&mut p, "step-1", to, r, e);
                if from.can_transition_to(to) {
                    assert!(result.is_ok(), "{} -> {} should succeed", from, to);
                    assert_eq!(p.steps()[0].status(), to);
                } else {
                    assert!(
                        matches!(result, Err(PlanError::InvalidTransition { .. })),
                        "{} -> {} should be rejected",
                        from,
                        to
                    );
                    assert_eq!(p.steps()[0].status(), from);
                }
            }
        }
    }

    #[test]
    fn test_completed_requires_result_ref() {
        let mut p = plan_with_first_step(StepStatus::InProgress);
        let err = update_plan_step_status(&mut p, "step-1", StepStatus::Completed, None, None)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));

        let err = update_plan_step_status(
            &mut p,
            "step-1",
            StepStatus::Completed,
            None,
            Some("oops".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));
        assert_eq!(p.steps()[0].status(), StepStatus::InProgress);
    }

    #[test]
    fn test_failed_requires_error() {
        let mut p = plan_with_first_step(StepStatus::InProgress);
        assert!(
            update_plan_step_status(&mut p, "step-1", StepStatus::Failed, None, None).is_err()
        );
        assert!(update_plan_step_status(
            &mut p,
            "step-1",
            StepStatus::Failed,
            Some("layer".to_string()),
            Some("boom".to_string()),
        )
        .is_err());

        update_plan_step_status(
            &mut p,
            "step-1",
            StepStatus::Failed,
            None,
            Some("boom".to_string()),
        )
        .unwrap();
        assert_eq!(p.steps()[0].error(), Some("boom"));
        assert_eq!(p.steps()[0].result_ref(), None);
    }

    #[test]
    fn test_in_progress_rejects_payload() {
        let mut p = plan(1);
        let err = update_plan_step_status(
            &mut p,
            "step-1",
            StepStatus::InProgress,
            Some("layer".to_string()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));
    }

    #[test]
    fn test_unknown_step() {
        let mut p = plan(1);
        let err = update_plan_step_status(&mut p, "step-7", StepStatus::InProgress, None, None)
            .unwrap_err();
        assert!(matches!(err, PlanError::UnknownStep(id) if id == "step-7"));
    }

    #[test]
    fn test_timestamps() {
        let mut p = plan(1);
        update_plan_step_status(&mut p, "step-1", StepStatus::InProgress, None, None).unwrap();
        assert!(p.steps()[0].started_at().is_some());
        assert!(p.steps()[0].finished_at().is_none());

        update_plan_step_status(
            &mut p,
            "step-1",
            StepStatus::Completed,
            Some("layer-9".to_string()),
            None,
        )
        .unwrap();
        assert!(p.steps()[0].finished_at().is_some());
    }

    #[test]
    fn test_plan_status_follows_steps() {
        let mut p = plan(3);
        for id in ["step-1", "step-2"] {
            update_plan_step_status(&mut p, id, StepStatus::InProgress, None, None).unwrap();
            assert_eq!(p.status(), PlanStatus::Pending);
            update_plan_step_status(&mut p, id, StepStatus::Completed, Some(format!("{}-out", id)), None)
                .unwrap();
        }
        assert_eq!(p.status(), PlanStatus::Pending);

        update_plan_step_status(&mut p, "step-3", StepStatus::InProgress, None, None).unwrap();
        update_plan_step_status(&mut p, "step-3", StepStatus::Failed, None, Some("x".to_string()))
            .unwrap();
        assert_eq!(p.status(), PlanStatus::Failed);
    }

    #[test]
    fn test_continue_on_failure_keeps_plan_open() {
        let mut p = plan(2).with_continue_on_failure(true);
        update_plan_step_status(&mut p, "step-1", StepStatus::InProgress, None, None).unwrap();
        update_plan_step_status(&mut p, "step-1", StepStatus::Failed, None, Some("x".to_string()))
            .unwrap();
        assert_eq!(p.status(), PlanStatus::Pending);

        update_plan_step_status(&mut p, "step-2", StepStatus::Skipped, None, None).unwrap();
        assert_eq!(p.status(), PlanStatus::Failed);
    }

    #[test]
    fn test_skip_pending_steps() {
        let mut p = plan(3);
        update_plan_step_status(&mut p, "step-1", StepStatus::InProgress, None, None).unwrap();

        let skipped = skip_pending_steps(&mut p);
        assert_eq!(skipped, vec!["step-2", "step-3"]);
        for id in &skipped {
            assert_eq!(p.step(id).unwrap().status(), StepStatus::Skipped);
        }
        assert_eq!(p.steps()[0].status(), StepStatus::InProgress);
        assert!(skip_pending_steps(&mut p).is_empty());
        assert_eq!(p.status(), PlanStatus::Pending);

        update_plan_step_status(&mut p, "step-1", StepStatus::Completed, Some("l".to_string()), None)
            .unwrap();
        assert_eq!(p.status(), PlanStatus::Completed);
    }
}
