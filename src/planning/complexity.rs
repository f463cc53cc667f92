//! Request complexity classification
//!
//! A request is split into clauses at explicit sequential connectors ("then",
//! "after that", ";" ...) and at "and"/"," when the following word is an action
//! verb. Clauses that carry no action are folded into their neighbour. Two or
//! more actionable clauses make the request multi-step; anything else is simple.
//!
//! When one clause still holds several distinct action verbs ("geocode the
//! addresses to merge with parcels") the result is flagged as ambiguous and a
//! [`ComplexityStrategy`] may be consulted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::llm::{LlmClient, Message};

use super::types::Complexity;

lazy_static::lazy_static! {
    static ref SEQUENCE_CONNECTOR: Regex = Regex::new(
        r"(?i)\s*[,;]?\s*\b(?:(?:and\s+)?(?:then|after\s+that|afterwards|finally)|followed\s+by)\b\s*,?\s*|\s*;\s*"
    )
    .expect("sequence connector pattern is valid");

    static ref SOFT_CONNECTOR: Regex = Regex::new(r"(?i)\s*,\s*(?:and\s+)?|\s+and\s+")
        .expect("soft connector pattern is valid");
}

/// Imperative verbs of the geoprocessing domain
const ACTION_VERBS: &[&str] = &[
    "add", "aggregate", "buffer", "calculate", "clip", "combine", "compute", "convert",
    "count", "create", "delete", "dissolve", "download", "export", "extract", "fetch",
    "filter", "find", "geocode", "get", "import", "intersect", "join", "list", "load",
    "locate", "measure", "merge", "parse", "remove", "rename", "reproject", "search",
    "select", "show", "simplify", "split", "style", "summarize", "transform", "union",
    "upload",
];

/// Outcome of classifying a request
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub complexity: Complexity,
    /// Step descriptions in textual order; one entry for simple requests
    pub clauses: Vec<String>,
    /// A single clause names several distinct actions
    pub ambiguous: bool,
}

/// Lowercase alphanumeric words of `text`
pub(crate) fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn is_action_verb(word: &str) -> bool {
    ACTION_VERBS.contains(&word)
}

/// Whether the words of `tool_name` appear contiguously in `clause_words`
pub(crate) fn names_tool(clause_words: &[String], tool_name: &str) -> bool {
    let tool_words = words(tool_name);
    if tool_words.is_empty() || tool_words.len() > clause_words.len() {
        return false;
    }
    clause_words
        .windows(tool_words.len())
        .any(|window| window == tool_words.as_slice())
}

fn distinct_verbs(clause_words: &[String]) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    for word in clause_words {
        if is_action_verb(word) && !seen.contains(&word.as_str()) {
            seen.push(word.as_str());
        }
    }
    seen.len()
}

fn is_actionable(clause: &str, tool_names: &[&str]) -> bool {
    let clause_words = words(clause);
    clause_words.iter().any(|w| is_action_verb(w))
        || tool_names.iter().any(|t| names_tool(&clause_words, t))
}

fn starts_with_action(text: &str, tool_names: &[&str]) -> bool {
    let clause_words = words(text);
    match clause_words.first() {
        Some(first) => {
            is_action_verb(first)
                || tool_names
                    .iter()
                    .any(|t| words(t).first().map(|w| w == first).unwrap_or(false))
        }
        None => false,
    }
}

fn clean_clause(clause: &str) -> String {
    clause
        .trim()
        .trim_matches(|c: char| c == ',' || c == ';' || c == '.' || c.is_whitespace())
        .to_string()
}

/// Split at "and"/"," only where an action follows
fn split_soft(clause: &str, tool_names: &[&str]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    for m in SOFT_CONNECTOR.find_iter(clause) {
        if starts_with_action(&clause[m.end()..], tool_names) {
            parts.push(clause[start..m.start()].to_string());
            start = m.end();
        }
    }
    parts.push(clause[start..].to_string());
    parts
}

/// Classify a request with the connector heuristic
pub fn assess_request(request: &str, tool_names: &[&str]) -> Assessment {
    let normalized = request.split_whitespace().collect::<Vec<_>>().join(" ");

    let clauses: Vec<String> = SEQUENCE_CONNECTOR
        .split(&normalized)
        .flat_map(|c| split_soft(c, tool_names))
        .map(|c| clean_clause(&c))
        .filter(|c| !c.is_empty())
        .collect();

    // Fold clauses without an action into a neighbour
    let mut folded: Vec<String> = Vec::new();
    let mut carry: Option<String> = None;
    for clause in clauses {
        if is_actionable(&clause, tool_names) {
            let clause = match carry.take() {
                Some(prefix) => format!("{} {}", prefix, clause),
                None => clause,
            };
            folded.push(clause);
        } else if let Some(last) = folded.last_mut() {
            last.push(' ');
            last.push_str(&clause);
        } else {
            carry = Some(match carry.take() {
                Some(prefix) => format!("{} {}", prefix, clause),
                None => clause,
            });
        }
    }

    if folded.len() >= 2 {
        tracing::debug!("Request split into {} actionable clauses", folded.len());
        return Assessment {
            complexity: Complexity::MultiStep,
            clauses: folded,
            ambiguous: false,
        };
    }

    let ambiguous = distinct_verbs(&words(&normalized)) >= 2;
    Assessment {
        complexity: Complexity::Simple,
        clauses: vec![normalized],
        ambiguous,
    }
}

/// Second opinion for requests the heuristic cannot settle
#[async_trait]
pub trait ComplexityStrategy: Send + Sync {
    async fn classify(&self, request: &str, heuristic: &Assessment) -> Result<Assessment>;
}

const CLASSIFY_PROMPT: &str = r#"You classify requests for a geospatial data assistant.

Decide whether the request needs one tool call ("simple") or an ordered sequence of
dependent operations ("multi_step"). For multi_step requests, list one short imperative
step per operation, in the order they must run.

## Output Format:
Respond with ONLY a JSON object (no markdown, no explanation):
{
  "complexity": "simple" | "multi_step",
  "steps": ["Geocode the addresses", "Merge the points with the parcels layer"]
}"#;

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    complexity: Complexity,
    #[serde(default)]
    steps: Vec<String>,
}

/// Asks the language model to classify ambiguous requests
pub struct LlmComplexityStrategy {
    client: Arc<dyn LlmClient>,
}

impl LlmComplexityStrategy {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComplexityStrategy for LlmComplexityStrategy {
    async fn classify(&self, request: &str, heuristic: &Assessment) -> Result<Assessment> {
        let messages = vec![Message::user(format!("Classify this request:\n\n{}", request))];
        let response = self
            .client
            .send_message_with_system(&messages, &[], Some(CLASSIFY_PROMPT))
            .await
            .context("Complexity classification request failed")?;

        let parsed = parse_classification(&response.message.text())?;
        let steps: Vec<String> = parsed
            .steps
            .iter()
            .map(|s| clean_clause(s))
            .filter(|s| !s.is_empty())
            .collect();

        match parsed.complexity {
            Complexity::MultiStep if steps.len() >= 2 => Ok(Assessment {
                complexity: Complexity::MultiStep,
                clauses: steps,
                ambiguous: false,
            }),
            Complexity::MultiStep => {
                anyhow::bail!("Model answered multi_step with {} usable steps", steps.len())
            }
            Complexity::Simple => Ok(Assessment {
                ambiguous: false,
                ..heuristic.clone()
            }),
        }
    }
}

/// Extract the JSON object from a model reply, tolerating fences and prose
fn parse_classification(text: &str) -> Result<ClassifyResponse> {
    let text = text.trim();
    let start = text.find('{').unwrap_or(0);
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    let json_str = if start < end { &text[start..end] } else { text };

    serde_json::from_str(json_str).map_err(|e| {
        anyhow::anyhow!(
            "Failed to parse classification JSON: {}. Response was: {}",
            e,
            text.chars().take(200).collect::<String>()
        )
    })
}
