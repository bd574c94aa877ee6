use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cq_ai::answer::{AnswerSettings, QueryOrchestrator, Response};
use cq_ai::embeddings::ollama_embed::OllamaEmbedder;
use cq_ai::evaluate::{build_report, default_suite, run_suite, save_records, EvalReport};
use cq_ai::index::{IndexStore, SharedIndex};
use cq_ai::llm::ollama_llm::OllamaLlm;
use cq_ai::ollama::OllamaClient;
use cq_core::config::RagConfig;
use cq_core::domain::Chunk;
use cq_core::error::AppError;
use cq_core::ingest::{clean_text, extract_units};
use cq_core::segment::{segment, ChunkStats};
use serde::{de::DeserializeOwned, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{report_app_error, Command};

pub fn dispatch(config: &RagConfig, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ingest { text_path } => ingest(config, &text_path),
        Command::Build => build(config),
        Command::Ask { question, k, debug } => {
            let orchestrator = orchestrator(config)?;
            let resp = orchestrator.answer(&question, k.unwrap_or(config.retrieval.top_k), debug)?;
            print_response(&resp);
            Ok(())
        }
        Command::Chat { k } => chat(config, k.unwrap_or(config.retrieval.top_k)),
        Command::Eval { k, out } => {
            let orchestrator = orchestrator(config)?;
            let records = run_suite(&orchestrator, &default_suite(), k.unwrap_or(config.retrieval.top_k));
            if let Some(path) = out.as_deref() {
                save_records(path, &records)?;
                println!("Results saved to {}", path.display());
            }
            print_report(&build_report(&records)?);
            Ok(())
        }
        Command::Status => status(config),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, json.as_bytes()).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))
}

fn ingest(config: &RagConfig, text_path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(text_path)
        .with_context(|| format!("reading {}", text_path.display()))?;
    let cleaned = clean_text(&raw)?;
    let extracted = extract_units(&cleaned)?;
    let segmented = segment(&extracted.units, config.segment_params()?)?;

    for w in extracted.warnings.iter().chain(segmented.warnings.iter()) {
        tracing::warn!(code = %w.code, details = ?w.details, "{}", w.message);
    }
    write_json(&config.paths.units_path, &extracted.units)?;
    write_json(&config.paths.chunks_path, &segmented.chunks)?;

    let stats = ChunkStats::from_output(&segmented);
    println!("Units extracted:   {}", extracted.units.len());
    println!("Chunks written:    {}", stats.total_chunks);
    println!("  whole units:     {}", stats.units_whole);
    println!("  split units:     {}", stats.units_split);
    println!("  dropped (empty): {}", stats.dropped_units);
    println!(
        "  tokens min/avg/max: {}/{:.1}/{}",
        stats.min_tokens, stats.avg_tokens, stats.max_tokens
    );
    println!("Chunks file: {}", config.paths.chunks_path.display());
    Ok(())
}

fn build(config: &RagConfig) -> anyhow::Result<()> {
    let chunks: Vec<Chunk> = read_json(&config.paths.chunks_path)
        .context("no chunk set found; run `citizenquery ingest <text-file>` first")?;
    let embedder = OllamaEmbedder::new(OllamaClient::new(&config.ollama.base_url)?);
    let built_at = OffsetDateTime::now_utc().format(&Rfc3339)?;

    let store = IndexStore::open(&config.paths.index_path);
    let (_, st) = store.build_with_embedder(&chunks, &embedder, &config.embeddings.model, &built_at)?;
    println!(
        "Index built: {} entries, {} dims, model {}",
        st.entry_count,
        st.dims.unwrap_or(0),
        config.embeddings.model
    );
    println!("Snapshot: {}", store.path().display());
    Ok(())
}

fn orchestrator(config: &RagConfig) -> Result<QueryOrchestrator, AppError> {
    let store = IndexStore::open(&config.paths.index_path);
    let (index, st) = store.load()?;
    if st.embedding_model.as_deref() != Some(config.embeddings.model.as_str()) {
        tracing::warn!(
            index_model = ?st.embedding_model,
            configured = %config.embeddings.model,
            "index was built with a different embedding model"
        );
    }

    let client = OllamaClient::new(&config.ollama.base_url)?;
    let settings = AnswerSettings::from_config(config);
    // The HTTP call gets a little slack so the orchestrator's own timeout fires first.
    let request_timeout = settings.timeout + Duration::from_secs(5);
    QueryOrchestrator::new(
        Arc::new(SharedIndex::new(index)),
        Arc::new(OllamaEmbedder::new(client.clone())),
        Arc::new(OllamaLlm::new(client, request_timeout)),
        settings,
    )
}

fn print_response(resp: &Response) {
    println!("{}", resp.answer_text.trim());
    println!();
    println!("Sources:");
    for s in resp.sources_shown.iter() {
        println!(
            "  [Source {}] {} - {} (similarity {:.3})",
            s.rank, s.unit_id, s.title, s.score
        );
    }
    if !resp.grounded {
        println!();
        println!("Note: this answer does not cite any of the sources shown; verify it against them.");
    }
    if let Some(prompt) = resp.debug_prompt.as_deref() {
        println!();
        println!("--- prompt ---");
        println!("{prompt}");
    }
}

fn chat(config: &RagConfig, k: u32) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config)?;
    let examples: Vec<String> = default_suite()
        .into_iter()
        .filter_map(|c| c.questions.into_iter().next())
        .collect();

    println!("Ask about the Constitution. Type `examples` for ideas, `quit` to leave.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "quit" | "exit" => break,
            "examples" => {
                for q in examples.iter() {
                    println!("  {q}");
                }
            }
            question => match orchestrator.answer(question, k, false) {
                Ok(resp) => print_response(&resp),
                Err(e) => report_app_error(&e),
            },
        }
        println!();
    }
    Ok(())
}

fn print_report(report: &EvalReport) {
    println!("Evaluation report");
    println!("  questions:          {}", report.total);
    println!("  failed:             {}", report.failed);
    println!("  avg response time:  {:.0} ms", report.avg_response_ms);
    println!("  avg similarity:     {:.1}%", report.avg_similarity * 100.0);
    println!(
        "  with citations:     {}/{} ({:.1}%)",
        report.with_citations,
        report.total,
        report.citation_rate * 100.0
    );
    println!("  says not found:     {}", report.says_not_found);
    println!("  too short:          {}", report.too_short);
    println!();
    for c in report.categories.iter() {
        println!(
            "  {}: {} questions, avg similarity {:.1}%, {} with citations",
            c.category,
            c.questions,
            c.avg_similarity * 100.0,
            c.with_citations
        );
    }
    println!();
    if report.issues.is_empty() {
        println!("No significant issues detected.");
    } else {
        println!("Potential issues:");
        for issue in report.issues.iter() {
            println!("  - {issue}");
        }
    }
}

fn status(config: &RagConfig) -> anyhow::Result<()> {
    let st = IndexStore::open(&config.paths.index_path).status()?;
    println!("{}", serde_json::to_string_pretty(&st)?);

    let client = OllamaClient::new(&config.ollama.base_url)?;
    match client.health_check() {
        Ok(()) => println!("Model service: reachable at {}", client.base_url()),
        Err(e) => {
            println!("Model service: unreachable at {}", client.base_url());
            report_app_error(&e);
        }
    }
    Ok(())
}
