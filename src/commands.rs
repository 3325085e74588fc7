use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::corpus::{Corpus, QueryOutcome};
use crate::documents::DocumentStore;
use crate::embeddings::OllamaClient;
use crate::generation::{self, EMPTY_KNOWLEDGE_BASE, OllamaGenerator};
use crate::mcp::{McpServer, register_tools};
use crate::retrieval::{RebuildReport, RetrievalService};

fn load_config() -> Result<Config> {
    Config::load_default().context("Failed to load configuration")
}

fn document_store(config: &Config) -> DocumentStore {
    DocumentStore::new(config.upload_dir_path())
}

fn build_service(config: &Config) -> Result<Arc<RetrievalService>> {
    let embedder = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let corpus = Corpus::new(Arc::new(embedder), config.chunking);
    Ok(Arc::new(RetrievalService::new(
        Arc::new(corpus),
        config.retrieval.clone(),
    )))
}

fn spinner(message: &'static str) -> ProgressBar {
    if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}

/// Index everything in the upload directory, returning `None` when it is empty
fn train_from_uploads(
    store: &DocumentStore,
    service: &RetrievalService,
) -> Result<Option<RebuildReport>> {
    let documents = store
        .load_documents()
        .context("Failed to load uploaded documents")?;

    if documents.is_empty() {
        return Ok(None);
    }

    let bar = spinner("Indexing documents");
    let result = service.train(documents);
    bar.finish_and_clear();

    let report = result.context("Failed to index documents")?;
    info!(
        "Indexed {} chunks from {} documents",
        report.indexed_chunk_count, report.document_count
    );
    Ok(Some(report))
}

/// Copy local files into the upload directory
#[inline]
pub fn upload_files(paths: &[PathBuf]) -> Result<()> {
    let config = load_config()?;
    let store = document_store(&config);

    let mut failures = 0;
    for path in paths {
        match store.import_file(path) {
            Ok(stored) => println!("📄 Uploaded {}", style(stored.display()).cyan()),
            Err(e) => {
                error!("Failed to upload {}: {}", path.display(), e);
                println!("{} {}: {}", style("✗").red(), path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} uploads failed", failures, paths.len());
    }

    println!();
    println!("Run 'docs-rag search' or 'docs-rag ask' to query the uploaded documents.");
    Ok(())
}

/// List files in the upload directory
#[inline]
pub fn list_documents() -> Result<()> {
    let config = load_config()?;
    let store = document_store(&config);

    let files = store.list_files().context("Failed to list uploads")?;
    if files.is_empty() {
        println!("No documents have been uploaded yet.");
        println!("Use 'docs-rag upload <files>' to add some.");
        return Ok(());
    }

    println!(
        "Uploaded documents in {} ({} total):",
        style(store.root().display()).dim(),
        files.len()
    );
    for file in &files {
        println!("  📄 {}", file);
    }

    Ok(())
}

/// Print the chunks nearest to `query`
#[inline]
pub fn search(query: &str, limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let store = document_store(&config);
    let service = build_service(&config)?;

    if train_from_uploads(&store, &service)?.is_none() {
        println!("{}", EMPTY_KNOWLEDGE_BASE);
        return Ok(());
    }

    let limit = limit.unwrap_or(config.retrieval.top_k);
    let results = match service.search(query, limit)? {
        QueryOutcome::EmptyCorpus => {
            println!("{}", EMPTY_KNOWLEDGE_BASE);
            return Ok(());
        }
        QueryOutcome::Matches(results) => results,
    };

    println!("Top {} results for {}:", results.len(), style(query).bold());
    println!();
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} {}",
            rank + 1,
            style(&result.source).cyan(),
            style(format!("(distance {:.4})", result.distance)).dim()
        );
        println!("   {}", result.text);
        println!();
    }

    Ok(())
}

/// Answer `query` from the uploaded documents
#[inline]
pub fn ask(query: &str) -> Result<()> {
    let config = load_config()?;
    let store = document_store(&config);
    let service = build_service(&config)?;
    let generator = OllamaGenerator::new(&config.ollama, &config.generation)?;

    train_from_uploads(&store, &service)?;

    let bar = spinner("Generating answer");
    let answer = generation::answer(&service, &generator, query);
    bar.finish_and_clear();

    let answer = answer?;
    if answer.success {
        println!("{}", answer.response);
    } else {
        println!("{}", style(&answer.response).yellow());
    }

    Ok(())
}

/// Start the MCP server on stdio
///
/// Stdout carries the protocol, so all human-readable output goes to stderr.
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let config = load_config()?;
    let store = Arc::new(document_store(&config));
    let service = build_service(&config)?;
    let generator = Arc::new(OllamaGenerator::new(&config.ollama, &config.generation)?);

    let health_client =
        OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    match tokio::task::spawn_blocking(move || health_client.health_check()).await? {
        Ok(()) => {
            info!(
                "Ollama connected at {}:{} with model {}",
                config.ollama.host, config.ollama.port, config.ollama.model
            );
        }
        Err(e) => {
            warn!("Ollama is not ready: {:#}", e);
            eprintln!(
                "{}",
                style("⚠️  Ollama may not be ready. Training and questions may fail.").yellow()
            );
        }
    }

    // The index lives in memory only; rebuild it from existing uploads
    {
        let store = Arc::clone(&store);
        let service = Arc::clone(&service);
        match tokio::task::spawn_blocking(move || train_from_uploads(&store, &service)).await? {
            Ok(Some(report)) => eprintln!(
                "✅ Indexed {} chunks from {} uploaded documents",
                report.indexed_chunk_count, report.document_count
            ),
            Ok(None) => eprintln!("No uploaded documents yet; use the upload_document tool"),
            Err(e) => {
                warn!("Initial training failed: {:#}", e);
                eprintln!("⚠️  Initial training failed; call train_documents to retry");
            }
        }
    }

    let server = Arc::new(McpServer::new(
        "docs-rag".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    register_tools(&server, store, service, generator).await;

    eprintln!(
        "🌐 MCP server ready with tools: upload_document, train_documents, training_status, search_documents, ask"
    );
    eprintln!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            if let Err(e) = &result {
                error!("MCP server error: {:#}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    eprintln!("✅ Shutdown complete");
    Ok(())
}
