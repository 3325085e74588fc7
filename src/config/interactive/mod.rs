
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::settings::{BATCH_SIZE_RANGE, TOP_K_RANGE};
use super::{Config, OllamaConfig};
use crate::embeddings::chunking::ChunkingConfig;

const PROTOCOLS: [&str; 2] = ["http", "https"];

/// Walk through every setting and optionally save the result
#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Docs RAG Configuration Setup").bold().cyan());
    eprintln!();

    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    let mut config = load_existing_config(&config_dir);

    section("Ollama", "Server used for embeddings and answer generation.");
    configure_ollama(&mut config.ollama)?;
    config
        .generation
        .set_model(prompt_model("Generation model", &config.generation.model)?)?;

    section("Retrieval", "How documents are split and how much context each answer gets.");
    config.chunking = prompt_chunking(config.chunking)?;
    config.retrieval.top_k = prompt_in_range(
        "Chunks of context per question",
        config.retrieval.top_k,
        TOP_K_RANGE,
    )?;

    eprintln!();
    eprintln!("{}", style("Checking Ollama...").yellow());
    if ollama_reachable(&config.ollama) {
        eprintln!("{}", style("✓ Ollama is reachable").green());
    } else {
        eprintln!("{}", style("⚠ Could not reach Ollama").yellow());
        eprintln!("Settings can still be saved; start Ollama before training.");
    }

    eprintln!();
    let save = Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?;
    if !save {
        eprintln!("Configuration not saved.");
        return Ok(());
    }

    config.save().context("Failed to save configuration")?;
    eprintln!(
        "{} {}",
        style("✓ Saved to").green(),
        style(config.config_file_path().display()).cyan()
    );
    Ok(())
}

/// Print the effective configuration
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());

    let url = config
        .ollama
        .base_url()
        .map_or_else(|e| format!("invalid ({})", e), |url| url.to_string());
    print_group(
        "Ollama",
        &[
            ("URL", url),
            ("Embedding model", config.ollama.model.clone()),
            ("Batch size", config.ollama.batch_size.to_string()),
            ("Generation model", config.generation.model.clone()),
            (
                "Generation timeout",
                format!("{}s", config.generation.timeout_seconds),
            ),
        ],
    );
    print_group(
        "Retrieval",
        &[
            ("Chunk size", format!("{} words", config.chunking.chunk_size)),
            ("Overlap", format!("{} words", config.chunking.overlap)),
            ("Top K", config.retrieval.top_k.to_string()),
            (
                "Upload directory",
                config.upload_dir_path().display().to_string(),
            ),
        ],
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    Ok(())
}

fn section(title: &str, description: &str) {
    eprintln!();
    eprintln!("{}", style(title).bold().yellow());
    eprintln!("{}", description);
    eprintln!();
}

fn print_group(title: &str, rows: &[(&str, String)]) {
    eprintln!();
    eprintln!("{}", style(format!("{}:", title)).bold().yellow());
    for (label, value) in rows {
        eprintln!("  {}: {}", label, style(value).cyan());
    }
}

fn load_existing_config(config_dir: &Path) -> Config {
    match Config::load(config_dir) {
        Ok(config) => {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        }
        Err(e) => {
            eprintln!(
                "{}",
                style(format!("Starting from defaults ({:#})", e)).yellow()
            );
            Config::with_base_dir(config_dir)
        }
    }
}

fn prompt_model(prompt: &str, current: &str) -> Result<String> {
    let model = Input::<String>::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(model)
}

fn prompt_in_range<T>(prompt: &str, current: T, range: RangeInclusive<T>) -> Result<T>
where
    T: Clone + Display + FromStr + PartialOrd,
    <T as FromStr>::Err: Display,
{
    let value = Input::<T>::new()
        .with_prompt(prompt)
        .default(current)
        .validate_with(|input: &T| {
            if range.contains(input) {
                Ok(())
            } else {
                Err(format!(
                    "Must be between {} and {}",
                    range.start(),
                    range.end()
                ))
            }
        })
        .interact_text()?;
    Ok(value)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let selected = Select::new()
        .with_prompt("Ollama protocol")
        .items(&PROTOCOLS)
        .default(
            PROTOCOLS
                .iter()
                .position(|p| *p == ollama.protocol)
                .unwrap_or(0),
        )
        .interact()?;
    ollama.set_protocol(PROTOCOLS[selected].to_string())?;

    let candidate = ollama.clone();
    let host = Input::<String>::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| {
            let mut probe = candidate.clone();
            probe.set_host(input.clone()).map_err(|e| e.to_string())
        })
        .interact_text()?;
    ollama.set_host(host)?;

    let port = prompt_in_range("Ollama port", ollama.port, 1..=u16::MAX)?;
    ollama.set_port(port)?;

    ollama.set_model(prompt_model("Embedding model", &ollama.model)?)?;

    let batch_size = prompt_in_range(
        "Texts per embedding request",
        ollama.batch_size,
        BATCH_SIZE_RANGE,
    )?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn prompt_chunking(current: ChunkingConfig) -> Result<ChunkingConfig> {
    let chunk_size = Input::<usize>::new()
        .with_prompt("Words per chunk")
        .default(current.chunk_size)
        .validate_with(|input: &usize| {
            ChunkingConfig {
                chunk_size: *input,
                overlap: 0,
            }
            .validate()
            .map_err(|e| e.to_string())
        })
        .interact_text()?;
    let max_overlap = chunk_size.saturating_sub(1);
    let overlap = prompt_in_range(
        "Words shared between consecutive chunks",
        current.overlap.min(max_overlap),
        0..=max_overlap,
    )?;

    let chunking = ChunkingConfig {
        chunk_size,
        overlap,
    };
    chunking.validate()?;
    Ok(chunking)
}

/// Any HTTP answer from `/api/version`, even a client error, means a server is listening
fn ollama_reachable(ollama: &OllamaConfig) -> bool {
    let Ok(url) = ollama.base_url().and_then(|base| {
        base.join("/api/version")
            .map_err(|e| super::ConfigError::InvalidUrl(e.to_string()))
    }) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) | Err(ureq::Error::StatusCode(_)) => true,
        Err(_) => false,
    }
}
