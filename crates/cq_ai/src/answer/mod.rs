use std::collections::BTreeSet;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cq_core::config::RagConfig;
use cq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::guardrails::{cited_labels, mentions_not_found};
use crate::index::{RetrievalResult, SharedIndex};
use crate::llm::{GenerationOptions, Llm};

pub mod prompts;

use prompts::{source_label, GroundedPrompt};

/// Pipeline stage of one query. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Idle,
    Embedding,
    Retrieving,
    PromptBuilding,
    Generating,
    Validating,
    Done,
    Failed,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Done | QueryState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub answer_text: String,
    /// Unit titles of the sources the answer cites.
    pub citations: BTreeSet<String>,
    pub sources_shown: Vec<RetrievalResult>,
    pub grounded: bool,
    pub cited_labels: Vec<String>,
    pub says_not_found: bool,
    pub debug_prompt: Option<String>,
}

/// Result of a query together with every state it passed through.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub result: Result<Response, AppError>,
    pub states: Vec<QueryState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSettings {
    pub embedding_model: String,
    pub generation_model: String,
    pub options: GenerationOptions,
    /// Upper bound on the Generating step.
    pub timeout: Duration,
}

impl AnswerSettings {
    pub fn from_config(cfg: &RagConfig) -> Self {
        Self {
            embedding_model: cfg.embeddings.model.clone(),
            generation_model: cfg.generation.model.clone(),
            options: GenerationOptions {
                temperature: cfg.generation.temperature,
                max_output_tokens: cfg.generation.max_output_tokens,
            },
            timeout: Duration::from_secs(cfg.generation.timeout_secs),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        let t = self.options.temperature;
        if !(0.0..=1.0).contains(&t) {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "Generation temperature must be between 0 and 1",
            )
            .with_details(format!("temperature={t}")));
        }
        if self.options.max_output_tokens == 0 {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "Generation max_output_tokens must be greater than zero",
            ));
        }
        if self.timeout.is_zero() {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "Generation timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

struct StateTrail {
    current: QueryState,
    visited: Vec<QueryState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            current: QueryState::Idle,
            visited: vec![QueryState::Idle],
        }
    }

    fn enter(&mut self, to: QueryState) {
        tracing::debug!(from = ?self.current, to = ?to, "query state");
        self.current = to;
        self.visited.push(to);
    }

    fn fail(&mut self, err: AppError) -> AppError {
        tracing::warn!(state = ?self.current, code = %err.code, "query failed");
        if let Some(details) = err.details.as_deref() {
            tracing::debug!(details, "query failure details");
        }
        self.enter(QueryState::Failed);
        err
    }
}

/// Runs one question through embed, retrieve, prompt, generate and validate.
///
/// Holds no per-query state; many threads may share one orchestrator.
pub struct QueryOrchestrator {
    index: Arc<SharedIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    settings: AnswerSettings,
}

impl QueryOrchestrator {
    pub fn new(
        index: Arc<SharedIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn Llm>,
        settings: AnswerSettings,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        Ok(Self {
            index,
            embedder,
            llm,
            settings,
        })
    }

    pub fn settings(&self) -> &AnswerSettings {
        &self.settings
    }

    pub fn answer(
        &self,
        question: &str,
        k: u32,
        include_debug_context: bool,
    ) -> Result<Response, AppError> {
        self.answer_traced(question, k, include_debug_context).result
    }

    pub fn answer_traced(&self, question: &str, k: u32, include_debug_context: bool) -> QueryOutcome {
        let mut trail = StateTrail::new();
        let result = self
            .run(&mut trail, question, k, include_debug_context)
            .map_err(|e| trail.fail(e));
        if result.is_ok() {
            trail.enter(QueryState::Done);
        }
        QueryOutcome {
            result,
            states: trail.visited,
        }
    }

    fn run(
        &self,
        trail: &mut StateTrail,
        question: &str,
        k: u32,
        include_debug_context: bool,
    ) -> Result<Response, AppError> {
        trail.enter(QueryState::Embedding);
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::new(
                codes::EMPTY_QUERY,
                "Please enter a question",
            ));
        }
        let query_vector = self
            .embedder
            .embed(&self.settings.embedding_model, question)
            .map_err(|e| {
                AppError::new(
                    codes::EMBEDDING_UNAVAILABLE,
                    "The embedding service is unavailable",
                )
                .with_details(format!("{}: {}", e.code, e.details.unwrap_or(e.message)))
                .with_retryable(e.retryable)
            })?;

        trail.enter(QueryState::Retrieving);
        if k < 1 {
            return Err(AppError::new(
                codes::INVALID_K,
                "At least one source must be requested",
            )
            .with_details(format!("k={k}")));
        }
        // One frozen index for the whole query, even if a rebuild is installed meanwhile.
        let index = self.index.current();
        let hits = index.search(&query_vector, k as usize).map_err(|e| {
            if e.is(codes::EMPTY_INDEX) {
                AppError::new(
                    codes::NO_KNOWLEDGE_BASE,
                    "No knowledge base loaded; build the index first",
                )
            } else {
                e
            }
        })?;

        trail.enter(QueryState::PromptBuilding);
        let sources = hits
            .iter()
            .filter_map(|h| index.entry(&h.chunk_id))
            .map(|e| {
                (
                    e.metadata.unit_id.clone(),
                    e.metadata.title.clone(),
                    e.metadata.text.clone(),
                )
            })
            .collect();
        let prompt = GroundedPrompt::new(sources, question).render();

        trail.enter(QueryState::Generating);
        let answer_text = self.generate_with_timeout(prompt.clone())?;

        trail.enter(QueryState::Validating);
        let labels = cited_labels(&answer_text, hits.len());
        let says_not_found = mentions_not_found(&answer_text);
        let citations = hits
            .iter()
            .filter(|h| labels.contains(&h.rank))
            .map(|h| h.title.clone())
            .collect();
        let grounded = !labels.is_empty() || says_not_found;
        if !grounded {
            tracing::info!(sources = hits.len(), "answer carries no recognizable citation");
        }

        Ok(Response {
            answer_text,
            citations,
            sources_shown: hits,
            grounded,
            cited_labels: labels.iter().map(|n| source_label(*n as usize)).collect(),
            says_not_found,
            debug_prompt: include_debug_context.then_some(prompt),
        })
    }

    fn generate_with_timeout(&self, prompt: String) -> Result<String, AppError> {
        let (tx, rx) = mpsc::channel();
        let llm = Arc::clone(&self.llm);
        let model = self.settings.generation_model.clone();
        let options = self.settings.options;

        // A worker that outlives the timeout is left to finish on its own; its send fails.
        thread::Builder::new()
            .name("cq-generate".to_string())
            .spawn(move || {
                let _ = tx.send(llm.generate(&model, &prompt, &options));
            })
            .map_err(|e| {
                AppError::new(
                    codes::GENERATION_UNAVAILABLE,
                    "The language model is unavailable",
                )
                .with_details(e.to_string())
            })?;

        match rx.recv_timeout(self.settings.timeout) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) if e.is(codes::GENERATION_TIMEOUT) => Err(AppError::new(
                codes::GENERATION_TIMEOUT,
                "The language model did not answer in time",
            )
            .with_details(e.details.unwrap_or(e.message))
            .with_retryable(true)),
            Ok(Err(e)) => Err(AppError::new(
                codes::GENERATION_UNAVAILABLE,
                "The language model is unavailable",
            )
            .with_details(format!("{}: {}", e.code, e.details.unwrap_or(e.message)))
            .with_retryable(e.retryable)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(AppError::new(
                codes::GENERATION_TIMEOUT,
                "The language model did not answer in time",
            )
            .with_details(format!("timeout_ms={}", self.settings.timeout.as_millis()))
            .with_retryable(true)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(AppError::new(
                codes::GENERATION_UNAVAILABLE,
                "The language model is unavailable",
            )
            .with_details("generation worker exited without a result")),
        }
    }
}
