//! Command-line front end for docqa.
//!
//! Answers questions about crawled product documentation from a local HNSW index,
//! using Ollama for embeddings and chat and an ONNX cross-encoder for reranking.
//!
//! # Usage
//!
//! ```bash
//! # Build the index from data/chunks/*.jsonl
//! docqa build
//!
//! # Ask a question; prints JSON on stdout
//! docqa ask "Which port does the administration console use?"
//!
//! # Evaluate against data/eval/questions.jsonl
//! docqa eval
//!
//! # Load backend models before the first real query
//! docqa warmup
//! ```
//!
//! Settings come from `docqa.toml` and `DOCQA_*` environment variables, for example
//! `DOCQA_OLLAMA_URL=http://gpu-box:11434`. Logs go to stderr; set `RUST_LOG` to adjust.

mod eval;
mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa_core::EmbeddingModel;
use docqa_core::llm::{LanguageModel, oneshot};
use docqa_ollama::Ollama;
use docqa_ort::OrtReranker;
use docqa_rag::{
    Bootstrap, ChunksOnDisk, ContextAnswerer, IndexProgress, IndexStage, LazyReranker,
    PipelineCell, RagError, VectorEncoder, build_from_chunks_with_progress,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::settings::{DEFAULT_CONFIG_FILE, Settings};

type Cell = PipelineCell<Ollama, OrtReranker, ContextAnswerer<Ollama>>;

/// Grounded question answering over product documentation.
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about)]
struct Args {
    /// Settings file (TOML). Missing files are ignored.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the index from the chunk files under `<data_dir>/chunks`.
    Build,
    /// Answer a question and print the answer with its sources as JSON.
    Ask {
        /// The question, 1 to 512 characters.
        question: String,
    },
    /// Run every question in a JSONL file and report Recall@3 and exact match.
    Eval {
        /// Questions file; defaults to `<data_dir>/eval/questions.jsonl`.
        questions: Option<PathBuf>,
        /// Milliseconds to wait between questions.
        #[arg(long, default_value_t = 0)]
        pause_ms: u64,
    },
    /// Send one embedding and one short chat request so Ollama loads both models.
    Warmup,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    tracing::debug!(?settings, "settings loaded");

    match args.command {
        Command::Build => build(&settings).await,
        Command::Ask { question } => ask(&settings, &question).await,
        Command::Eval {
            questions,
            pause_ms,
        } => {
            let path = questions
                .unwrap_or_else(|| settings.data_dir.join("eval").join("questions.jsonl"));
            evaluate(&settings, &path, Duration::from_millis(pause_ms)).await
        }
        Command::Warmup => warmup(&settings).await,
    }
}

fn pipeline_cell(settings: &Settings) -> Result<Cell> {
    let ollama = settings.ollama().context("creating Ollama client")?;
    let model_dir = settings.rerank_model_dir.clone();
    let reranker = LazyReranker::new(move || load_reranker(&model_dir));
    let answerer = ContextAnswerer::new(ollama.clone()).with_parameters(settings.parameters());
    Ok(PipelineCell::new(
        settings.rag_config(),
        ollama,
        reranker,
        answerer,
    ))
}

/// Loads the ONNX session and tokenizer without stalling the other runtime workers.
fn load_reranker(model_dir: &Path) -> Result<OrtReranker> {
    tokio::task::block_in_place(|| OrtReranker::from_directory(model_dir))
        .with_context(|| format!("loading reranker from {}", model_dir.display()))
}

async fn build(settings: &Settings) -> Result<ExitCode> {
    let config = settings.rag_config();
    ChunksOnDisk.prepare(&config).await?;

    let ollama = settings.ollama().context("creating Ollama client")?;
    let encoder = VectorEncoder::new(ollama).with_batch_size(config.embed_batch_size);
    let report = build_from_chunks_with_progress(&encoder, &config, log_progress).await?;

    println!(
        "{}",
        json!({
            "chunks": report.chunks,
            "duplicates": report.duplicates,
            "dimension": report.dimension,
            "index_dir": config.index_dir,
        })
    );
    Ok(ExitCode::SUCCESS)
}

fn log_progress(progress: IndexProgress) {
    match progress.stage {
        IndexStage::Embedding => tracing::info!(
            done = progress.processed,
            total = progress.total,
            "embedding chunks"
        ),
        stage => tracing::info!(?stage, chunks = progress.total, "index build"),
    }
}

async fn ask(settings: &Settings, question: &str) -> Result<ExitCode> {
    let cell = pipeline_cell(settings)?;
    let started = Instant::now();

    match cell.ask(question).await {
        Ok(answer) => {
            let elapsed_ms = started.elapsed().as_millis();
            println!(
                "{}",
                json!({
                    "answer": answer.answer,
                    "sources": answer.sources,
                    "used_chunks": answer.used_chunks,
                    "elapsed_ms": elapsed_ms,
                })
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(RagError::InvalidInput(reason)) => {
            println!("{}", json!({ "detail": reason }));
            Ok(ExitCode::from(2))
        }
        Err(err) => {
            tracing::error!(error = ?err, "query failed");
            println!(
                "{}",
                json!({ "detail": format!("service temporarily unavailable: {err}") })
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn evaluate(settings: &Settings, path: &Path, pause: Duration) -> Result<ExitCode> {
    let cases = eval::load_cases(path)?;
    let cell = pipeline_cell(settings)?;
    tracing::info!(questions = cases.len(), path = %path.display(), "evaluating");

    let report = eval::run(&cell, &cases, pause).await;
    let rendered = serde_json::to_string_pretty(&report)?;

    let out_dir = settings.data_dir.join("eval");
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let out_path = out_dir.join("eval_report.json");
    std::fs::write(&out_path, &rendered)
        .with_context(|| format!("writing {}", out_path.display()))?;

    println!("{rendered}");
    tracing::info!(
        recall_at_3 = report.recall_at_3,
        exact = report.exact,
        report = %out_path.display(),
        "evaluation finished"
    );
    Ok(ExitCode::SUCCESS)
}

async fn warmup(settings: &Settings) -> Result<ExitCode> {
    let ollama = settings.ollama().context("creating Ollama client")?;
    ollama
        .health()
        .await
        .with_context(|| format!("Ollama is not reachable at {}", settings.ollama_url))?;

    let vector = ollama
        .embed("warmup")
        .await
        .with_context(|| format!("warming up {}", ollama.embedding_model()))?;
    tracing::info!(
        model = ollama.embedding_model(),
        dimension = vector.len(),
        "embedding model ready"
    );

    let request = oneshot("Answer briefly.", "Test")
        .with_parameters(settings.parameters().max_tokens(8));
    ollama
        .complete(request)
        .await
        .with_context(|| format!("warming up {}", ollama.chat_model()))?;
    tracing::info!(model = ollama.chat_model(), "chat model ready");

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn reranker_load_runs_on_the_runtime_and_names_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-model");
        let err = load_reranker(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("no-model"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_reranker_load_is_retried_on_next_use() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let reranker = LazyReranker::new(move || load_reranker(&missing));

        assert!(reranker.get().await.is_err());
        assert!(reranker.get().await.is_err());
        assert!(!reranker.is_initialized());
    }
}
