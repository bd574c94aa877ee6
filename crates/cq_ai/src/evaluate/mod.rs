use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use cq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use crate::answer::{QueryOrchestrator, Response};
use crate::guardrails::cited_labels;
use crate::index::RetrievalResult;

mod suite;

pub use suite::default_suite;

const NOT_FOUND_MARKERS: [&str; 6] = [
    "not found",
    "not present",
    "not mentioned",
    "not in the",
    "cannot find",
    "no information",
];
const MIN_ANSWER_WORDS: usize = 10;
const LOW_SIMILARITY: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvalCategory {
    pub name: String,
    pub expected_behavior: String,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEvaluation {
    pub has_citation: bool,
    pub says_not_found: bool,
    pub is_too_short: bool,
    pub mentions_sources: bool,
    pub num_sources: u32,
    pub avg_similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalRecord {
    pub category: String,
    pub question: String,
    pub answer: Option<String>,
    pub sources: Vec<RetrievalResult>,
    pub evaluation: Option<AnswerEvaluation>,
    pub error_code: Option<String>,
    pub response_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryReport {
    pub category: String,
    pub questions: u32,
    pub avg_similarity: f64,
    pub with_citations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalReport {
    pub total: u32,
    pub failed: u32,
    pub avg_response_ms: f64,
    pub avg_similarity: f64,
    pub with_citations: u32,
    pub citation_rate: f64,
    pub says_not_found: u32,
    pub too_short: u32,
    pub categories: Vec<CategoryReport>,
    pub issues: Vec<String>,
}

/// Heuristic quality signals for a single answer.
pub fn evaluate_answer(response: &Response) -> AnswerEvaluation {
    let answer = response.answer_text.as_str();
    let lower = answer.to_lowercase();
    let sources = &response.sources_shown;

    let has_citation = !cited_labels(answer, sources.len()).is_empty()
        || sources
            .iter()
            .any(|s| answer.contains(&s.unit_id) || answer.contains(&s.title));
    let says_not_found = NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m));
    let is_too_short = lower.split_whitespace().count() < MIN_ANSWER_WORDS;
    let mentions_sources = sources.iter().any(|s| {
        let id = s.unit_id.to_lowercase();
        let bare = id.strip_prefix("article ").unwrap_or(&id);
        lower.contains(bare)
    });
    let avg_similarity = if sources.is_empty() {
        0.0
    } else {
        sources.iter().map(|s| s.score).sum::<f64>() / sources.len() as f64
    };

    AnswerEvaluation {
        has_citation,
        says_not_found,
        is_too_short,
        mentions_sources,
        num_sources: sources.len() as u32,
        avg_similarity,
    }
}

/// Asks every question of `suite`. A failed query is recorded with its code and the run goes on.
pub fn run_suite(orchestrator: &QueryOrchestrator, suite: &[EvalCategory], k: u32) -> Vec<EvalRecord> {
    let mut records = Vec::new();
    for category in suite {
        tracing::info!(category = %category.name, questions = category.questions.len(), "eval category");
        for question in category.questions.iter() {
            let started = Instant::now();
            let result = orchestrator.answer(question, k, false);
            let response_ms = started.elapsed().as_millis() as u64;

            let record = match result {
                Ok(response) => EvalRecord {
                    category: category.name.clone(),
                    question: question.clone(),
                    evaluation: Some(evaluate_answer(&response)),
                    answer: Some(response.answer_text),
                    sources: response.sources_shown,
                    error_code: None,
                    response_ms,
                },
                Err(e) => {
                    tracing::warn!(question = %question, code = %e.code, "eval question failed");
                    EvalRecord {
                        category: category.name.clone(),
                        question: question.clone(),
                        answer: None,
                        sources: Vec::new(),
                        evaluation: None,
                        error_code: Some(e.code),
                        response_ms,
                    }
                }
            };
            records.push(record);
        }
    }
    records
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub fn build_report(records: &[EvalRecord]) -> Result<EvalReport, AppError> {
    if records.is_empty() {
        return Err(AppError::new(
            codes::EVAL_FAILED,
            "No evaluation results to report",
        ));
    }

    let evaluated: Vec<&AnswerEvaluation> =
        records.iter().filter_map(|r| r.evaluation.as_ref()).collect();
    let with_citations = evaluated.iter().filter(|e| e.has_citation).count() as u32;

    // Category order follows first appearance in the run.
    let mut order: Vec<&str> = Vec::new();
    let mut by_category: BTreeMap<&str, Vec<&EvalRecord>> = BTreeMap::new();
    for r in records {
        if !by_category.contains_key(r.category.as_str()) {
            order.push(&r.category);
        }
        by_category.entry(&r.category).or_default().push(r);
    }
    let categories = order
        .iter()
        .map(|name| {
            let rs = by_category.get(name).map(Vec::as_slice).unwrap_or_default();
            CategoryReport {
                category: name.to_string(),
                questions: rs.len() as u32,
                avg_similarity: mean(rs.iter().filter_map(|r| r.evaluation.as_ref()).map(|e| e.avg_similarity)),
                with_citations: rs
                    .iter()
                    .filter(|r| r.evaluation.as_ref().is_some_and(|e| e.has_citation))
                    .count() as u32,
            }
        })
        .collect();

    let mut issues = Vec::new();
    for r in records {
        match (&r.evaluation, &r.error_code) {
            (Some(e), _) => {
                if e.is_too_short && !e.says_not_found {
                    issues.push(format!("Short answer: '{}'", r.question));
                }
                if e.avg_similarity < LOW_SIMILARITY {
                    issues.push(format!("Low similarity: '{}'", r.question));
                }
            }
            (None, Some(code)) => issues.push(format!("Failed ({code}): '{}'", r.question)),
            (None, None) => {}
        }
    }

    Ok(EvalReport {
        total: records.len() as u32,
        failed: records.iter().filter(|r| r.error_code.is_some()).count() as u32,
        avg_response_ms: mean(records.iter().map(|r| r.response_ms as f64)),
        avg_similarity: mean(evaluated.iter().map(|e| e.avg_similarity)),
        with_citations,
        citation_rate: with_citations as f64 / records.len() as f64,
        says_not_found: evaluated.iter().filter(|e| e.says_not_found).count() as u32,
        too_short: evaluated.iter().filter(|e| e.is_too_short).count() as u32,
        categories,
        issues,
    })
}

/// Writes the raw records as pretty JSON (tmp then rename).
pub fn save_records(path: &Path, records: &[EvalRecord]) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(records).map_err(|e| {
        AppError::new(codes::EVAL_FAILED, "Failed to encode evaluation results")
            .with_details(e.to_string())
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json.as_bytes()).map_err(|e| {
        AppError::new(codes::EVAL_FAILED, "Failed to write evaluation results")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(codes::EVAL_FAILED, "Failed to finalize evaluation results write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}
