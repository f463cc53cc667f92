//! Step-to-tool matching
//!
//! A tool's score for a step is the better of two signals:
//! - the tool name compared against every run of description words of the same
//!   length as the name (the intent keyword, e.g. "centroid" in "compute its centroid")
//! - the whole description compared against the tool's default prompt
//!
//! Both use [`crate::matching::similarity`].

use crate::matching::{best_by_score, similarity, DEFAULT_MATCH_THRESHOLD};
use crate::tools::ToolDescriptor;

use super::complexity::words;
use super::types::{ExecutionPlan, PlanStep};

/// Score one tool against a step description (0..=1)
pub fn score_tool(description: &str, tool: &ToolDescriptor) -> f32 {
    let description_words = words(description);
    let name_len = words(&tool.name).len().max(1);

    let keyword_score = if description_words.len() >= name_len {
        description_words
            .windows(name_len)
            .map(|window| similarity(&window.join(" "), &tool.name))
            .fold(0.0_f32, f32::max)
    } else {
        similarity(description, &tool.name)
    };

    let prompt_score = similarity(description, &tool.default_prompt);
    keyword_score.max(prompt_score)
}

/// Best tool for a step together with its score
pub fn match_tool_with_score<'a>(
    step: &PlanStep,
    available_tools: &'a [ToolDescriptor],
    threshold: f32,
) -> Option<(&'a ToolDescriptor, f32)> {
    let scores = available_tools
        .iter()
        .map(|tool| score_tool(&step.description, tool));
    let best = best_by_score(scores, threshold)?;

    let tool = &available_tools[best.index];
    tracing::debug!(
        "Matched step {} to tool {} (score {:.2})",
        step.id,
        tool.name,
        best.score
    );
    Some((tool, best.score))
}

/// Select the tool that best satisfies `step`, or `None` when nothing clears
/// the default threshold
///
/// Ties go to the tool declared first. Neither argument is modified.
pub fn match_tool_to_plan_step<'a>(
    step: &PlanStep,
    available_tools: &'a [ToolDescriptor],
) -> Option<&'a ToolDescriptor> {
    match_tool_with_score(step, available_tools, DEFAULT_MATCH_THRESHOLD).map(|(tool, _)| tool)
}

/// Assign a matched tool to every unresolved step
///
/// Returns the ids of steps that are still unresolved afterwards.
pub fn resolve_plan_tools(
    plan: &mut ExecutionPlan,
    available_tools: &[ToolDescriptor],
    threshold: f32,
) -> Vec<String> {
    let mut unresolved = Vec::new();
    let matches: Vec<(String, Option<String>)> = plan
        .steps()
        .iter()
        .filter(|step| !step.is_resolved())
        .map(|step| {
            let tool = match_tool_with_score(step, available_tools, threshold)
                .map(|(tool, _)| tool.name.clone());
            (step.id.clone(), tool)
        })
        .collect();

    for (step_id, tool) in matches {
        match tool {
            Some(name) => {
                plan.assign_tool(&step_id, name);
            }
            None => unresolved.push(step_id),
        }
    }
    unresolved
}
