use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cq_ai::answer::prompts::NOT_FOUND_PHRASE;
use cq_ai::answer::{AnswerSettings, QueryOrchestrator, QueryState};
use cq_ai::embeddings::Embedder;
use cq_ai::index::{SharedIndex, VectorIndex};
use cq_ai::llm::{GenerationOptions, Llm};
use cq_core::domain::Chunk;
use cq_core::error::{codes, AppError};
use pretty_assertions::assert_eq;

const KEYWORDS: [&str; 3] = ["life", "equality", "religion"];

/// Bag-of-keywords embedder; counts calls so tests can assert no gateway was touched.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = input.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect())
    }
}

struct DownEmbedder;

impl Embedder for DownEmbedder {
    fn embed(&self, _model: &str, _input: &str) -> Result<Vec<f32>, AppError> {
        Err(AppError::new(codes::EMBEDDING_UNAVAILABLE, "down")
            .with_details("connection refused (os error 111)")
            .with_retryable(true))
    }
}

struct MockLlm {
    out: Result<String, AppError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockLlm {
    fn answering(text: &str) -> Self {
        Self {
            out: Ok(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Llm for MockLlm {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.out.clone()
    }
}

fn chunk(id: &str, unit_id: &str, title: &str, text: &str) -> Chunk {
    Chunk {
        chunk_id: id.to_string(),
        unit_id: unit_id.to_string(),
        unit_title: title.to_string(),
        text: text.to_string(),
        text_sha256: String::new(),
        token_count: text.split_whitespace().count() as u32,
        token_start: 0,
        byte_range: [0, text.len() as u32],
        position_in_unit: 0,
        overlap_with_prev: false,
    }
}

fn constitution_index() -> VectorIndex {
    let chunks = vec![
        chunk(
            "c14",
            "Article 14",
            "Equality before law",
            "The State shall not deny to any person equality before the law.",
        ),
        chunk(
            "c21",
            "Article 21",
            "Protection of life and personal liberty",
            "No person shall be deprived of his life or personal liberty.",
        ),
        chunk(
            "c25",
            "Article 25",
            "Freedom of conscience",
            "All persons are equally entitled to profess religion.",
        ),
    ];
    let embedder = KeywordEmbedder {
        calls: AtomicUsize::new(0),
    };
    let items = chunks
        .into_iter()
        .map(|c| {
            let v = embedder.embed("mock", &c.text).expect("embed");
            (c, v)
        })
        .collect();
    VectorIndex::build(items).expect("build")
}

fn settings(timeout: Duration) -> AnswerSettings {
    AnswerSettings {
        embedding_model: "mock-embed".to_string(),
        generation_model: "mock-llm".to_string(),
        options: GenerationOptions::default(),
        timeout,
    }
}

struct Harness {
    embedder: Arc<KeywordEmbedder>,
    llm: Arc<MockLlm>,
    orchestrator: QueryOrchestrator,
}

fn harness(index: VectorIndex, llm: MockLlm, timeout: Duration) -> Harness {
    let embedder = Arc::new(KeywordEmbedder {
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(llm);
    let orchestrator = QueryOrchestrator::new(
        Arc::new(SharedIndex::new(index)),
        embedder.clone(),
        llm.clone(),
        settings(timeout),
    )
    .expect("orchestrator");
    Harness {
        embedder,
        llm,
        orchestrator,
    }
}

#[test]
fn empty_question_fails_before_any_gateway_call() {
    let h = harness(
        constitution_index(),
        MockLlm::answering("unused"),
        Duration::from_secs(5),
    );
    for q in ["", "   \n\t"] {
        let outcome = h.orchestrator.answer_traced(q, 3, false);
        let err = outcome.result.expect_err("empty");
        assert_eq!(err.code, codes::EMPTY_QUERY);
        assert_eq!(
            outcome.states,
            vec![QueryState::Idle, QueryState::Embedding, QueryState::Failed]
        );
    }
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_k_is_rejected() {
    let h = harness(
        constitution_index(),
        MockLlm::answering("unused"),
        Duration::from_secs(5),
    );
    let err = h.orchestrator.answer("What is Article 21?", 0, false).expect_err("k=0");
    assert_eq!(err.code, codes::INVALID_K);
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_index_reports_missing_knowledge_base() {
    let h = harness(
        VectorIndex::empty(),
        MockLlm::answering("unused"),
        Duration::from_secs(5),
    );
    let err = h.orchestrator.answer("What is life?", 3, false).expect_err("empty index");
    assert_eq!(err.code, codes::NO_KNOWLEDGE_BASE);
    assert_eq!(err.hint(), "Build the index first (run `citizenquery build`).");
}

#[test]
fn cited_answer_is_grounded_and_walks_every_state() {
    let h = harness(
        constitution_index(),
        MockLlm::answering("Life and liberty are protected [Source 1]."),
        Duration::from_secs(5),
    );
    let outcome = h.orchestrator.answer_traced("What protects life?", 2, true);
    assert_eq!(
        outcome.states,
        vec![
            QueryState::Idle,
            QueryState::Embedding,
            QueryState::Retrieving,
            QueryState::PromptBuilding,
            QueryState::Generating,
            QueryState::Validating,
            QueryState::Done,
        ]
    );
    let resp = outcome.result.expect("answer");
    assert!(resp.grounded);
    assert!(!resp.says_not_found);
    assert_eq!(resp.sources_shown.len(), 2);
    assert_eq!(resp.sources_shown[0].chunk_id, "c21");
    assert_eq!(resp.cited_labels, vec!["Source 1".to_string()]);
    assert_eq!(
        resp.citations.iter().cloned().collect::<Vec<_>>(),
        vec!["Protection of life and personal liberty".to_string()]
    );

    let prompt = resp.debug_prompt.expect("debug prompt");
    assert!(prompt.contains("[Source 1] Article 21 - Protection of life and personal liberty"));
    assert!(prompt.contains("What protects life?"));
    assert!(!prompt.contains("[Source 3]"));
}

#[test]
fn uncited_answer_is_returned_but_not_grounded() {
    let h = harness(
        constitution_index(),
        MockLlm::answering("Everyone has rights."),
        Duration::from_secs(5),
    );
    let resp = h.orchestrator.answer("What about religion?", 3, false).expect("answer");
    assert!(!resp.grounded);
    assert!(resp.citations.is_empty());
    assert_eq!(resp.answer_text, "Everyone has rights.");
    assert!(resp.debug_prompt.is_none());
}

#[test]
fn not_found_phrase_counts_as_grounded() {
    let h = harness(
        constitution_index(),
        MockLlm::answering(NOT_FOUND_PHRASE),
        Duration::from_secs(5),
    );
    let resp = h.orchestrator.answer("Is there a right to free pizza?", 3, false).expect("answer");
    assert!(resp.grounded);
    assert!(resp.says_not_found);
    assert!(resp.citations.is_empty());
}

#[test]
fn slow_generation_times_out_instead_of_blocking() {
    let llm = MockLlm {
        out: Ok("late [Source 1]".to_string()),
        delay: Duration::from_secs(3),
        calls: AtomicUsize::new(0),
    };
    let h = harness(constitution_index(), llm, Duration::from_millis(100));

    let started = Instant::now();
    let outcome = h.orchestrator.answer_traced("What protects life?", 3, false);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.result.expect_err("timeout").code, codes::GENERATION_TIMEOUT);
    assert_eq!(outcome.states.last(), Some(&QueryState::Failed));
}

#[test]
fn gateway_failures_are_tagged_without_leaking_raw_output() {
    let llm = MockLlm {
        out: Err(AppError::new(codes::GENERATION_UNAVAILABLE, "raw")
            .with_details("status=500; body=panic in model runner")),
        delay: Duration::ZERO,
        calls: AtomicUsize::new(0),
    };
    let h = harness(constitution_index(), llm, Duration::from_secs(5));
    let err = h.orchestrator.answer("What protects life?", 3, false).expect_err("llm down");
    assert_eq!(err.code, codes::GENERATION_UNAVAILABLE);
    assert!(!err.message.contains("status=500"));
    assert!(err.details.unwrap_or_default().contains("status=500"));

    let orchestrator = QueryOrchestrator::new(
        Arc::new(SharedIndex::new(constitution_index())),
        Arc::new(DownEmbedder),
        Arc::new(MockLlm::answering("unused")),
        settings(Duration::from_secs(5)),
    )
    .expect("orchestrator");
    let err = orchestrator.answer("What protects life?", 3, false).expect_err("embed down");
    assert_eq!(err.code, codes::EMBEDDING_UNAVAILABLE);
    assert!(err.retryable);
    assert!(!err.message.contains("os error"));
}

#[test]
fn concurrent_queries_share_one_index() {
    let h = harness(
        constitution_index(),
        MockLlm::answering("See [Source 1]."),
        Duration::from_secs(5),
    );
    let orchestrator = Arc::new(h.orchestrator);
    let handles: Vec<_> = ["life", "equality", "religion", "life and religion"]
        .into_iter()
        .map(|q| {
            let o = Arc::clone(&orchestrator);
            thread::spawn(move || o.answer(q, 1, false).expect("answer"))
        })
        .collect();
    let firsts: Vec<String> = handles
        .into_iter()
        .map(|t| t.join().expect("join").sources_shown[0].chunk_id.clone())
        .collect();
    assert_eq!(firsts[0], "c21");
    assert_eq!(firsts[1], "c14");
    assert_eq!(firsts[2], "c25");
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 4);
}

#[test]
fn installing_a_rebuilt_index_changes_later_answers() {
    let shared = Arc::new(SharedIndex::empty());
    let orchestrator = QueryOrchestrator::new(
        Arc::clone(&shared),
        Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        }),
        Arc::new(MockLlm::answering("[Source 1]")),
        settings(Duration::from_secs(5)),
    )
    .expect("orchestrator");

    let err = orchestrator.answer("life", 3, false).expect_err("empty");
    assert_eq!(err.code, codes::NO_KNOWLEDGE_BASE);

    shared.install(constitution_index());
    let resp = orchestrator.answer("life", 3, false).expect("answer");
    assert_eq!(resp.sources_shown.len(), 3);
}
