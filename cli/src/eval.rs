//! Sequential offline evaluation: Recall@3 on cited URLs and exact match on answers.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use docqa_core::{EmbeddingModel, Reranker};
use docqa_rag::{AnswerGenerator, Bootstrap, PipelineCell, Source};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// How many leading sources count towards recall.
const RECALL_DEPTH: usize = 3;

/// One line of the questions file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvalCase {
    pub question: String,
    /// Pattern (or plain text) the answer should contain.
    #[serde(default)]
    pub expected: String,
    /// URL prefix one of the first three sources should start with.
    #[serde(default, alias = "source_url")]
    pub url: Option<String>,
}

/// Outcome for a single question.
#[derive(Debug, Clone, Serialize)]
pub struct EvalRow {
    pub question: String,
    pub expected: String,
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(rename = "recall@3")]
    pub recall_at_3: u8,
    pub exact: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate over all questions.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub total: usize,
    #[serde(rename = "recall@3")]
    pub recall_at_3: f64,
    pub exact: f64,
    pub details: Vec<EvalRow>,
}

/// Reads a JSONL questions file, skipping blank lines.
///
/// # Errors
/// Fails on unreadable files or lines that are not valid cases.
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid question", path.display(), i + 1))
        })
        .collect()
}

/// `true` when one of the first three sources starts with `expected_url`.
#[must_use]
pub fn recall_at_3(sources: &[Source], expected_url: Option<&str>) -> bool {
    let Some(expected) = expected_url.filter(|u| !u.is_empty()) else {
        return false;
    };
    sources
        .iter()
        .take(RECALL_DEPTH)
        .any(|s| s.url.starts_with(expected))
}

/// Case-insensitive regex search of `expected` in `answer`.
///
/// An invalid pattern falls back to a substring test on lowercased,
/// whitespace-collapsed text.
#[must_use]
pub fn exact_match(expected: &str, answer: &str) -> bool {
    match RegexBuilder::new(expected).case_insensitive(true).build() {
        Ok(re) => re.is_match(answer),
        Err(_) => normalize(answer).contains(&normalize(expected)),
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Asks every question in order, waiting `pause` between questions, and scores the answers.
pub async fn run<M, R, G, B>(
    cell: &PipelineCell<M, R, G, B>,
    cases: &[EvalCase],
    pause: Duration,
) -> EvalReport
where
    M: EmbeddingModel + Clone,
    R: Reranker,
    G: AnswerGenerator + Clone,
    B: Bootstrap,
{
    let mut details = Vec::with_capacity(cases.len());
    for (i, case) in cases.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        let started = Instant::now();
        let mut row = EvalRow {
            question: case.question.clone(),
            expected: case.expected.clone(),
            source_url: case.url.clone(),
            answer: None,
            sources: Vec::new(),
            recall_at_3: 0,
            exact: 0,
            elapsed_ms: None,
            error: None,
        };
        match cell.ask(&case.question).await {
            Ok(answer) => {
                row.recall_at_3 = recall_at_3(&answer.sources, case.url.as_deref()).into();
                row.exact = exact_match(&case.expected, &answer.answer).into();
                row.elapsed_ms = Some(started.elapsed().as_millis());
                row.answer = Some(answer.answer);
                row.sources = answer.sources;
            }
            Err(err) => {
                tracing::warn!(question = %case.question, error = %err, "evaluation question failed");
                row.error = Some(err.to_string());
            }
        }
        details.push(row);
    }
    summarize(details)
}

#[allow(clippy::cast_precision_loss)]
fn summarize(details: Vec<EvalRow>) -> EvalReport {
    let total = details.len().max(1);
    let recall: usize = details.iter().map(|r| usize::from(r.recall_at_3)).sum();
    let exact: usize = details.iter().map(|r| usize::from(r.exact)).sum();
    EvalReport {
        total,
        recall_at_3: recall as f64 / total as f64,
        exact: exact as f64 / total as f64,
        details,
    }
}
