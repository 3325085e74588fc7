
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::DocsError;
use crate::config::OllamaConfig;
use crate::embeddings::Embedder;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Embedding client for a local or remote Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: usize,
    agent: ureq::Agent,
    retry: Retry,
}

/// Retries transient failures with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Retry {
    attempts: u32,
    backoff_base: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// 5xx responses and transport failures; everything else fails immediately
fn is_transient(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

impl Retry {
    fn backoff(&self, failed_attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2_u32.saturating_pow(failed_attempt.saturating_sub(1)))
    }

    fn run<F>(&self, what: &str, mut send: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            match send() {
                Ok(body) => {
                    debug!("{} succeeded on attempt {}", what, attempt);
                    return Ok(body);
                }
                Err(error) if is_transient(&error) && attempt < self.attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed ({}), attempt {}/{}; retrying in {:?}",
                        what, error, attempt, self.attempts, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(error) => {
                    warn!("{} failed on attempt {}: {}", what, attempt, error);
                    return Err(anyhow!("{} failed: {}", what, error));
                }
            }
        }
    }
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Invalid Ollama server address")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: usize::try_from(config.batch_size)
                .unwrap_or(usize::MAX)
                .max(1),
            agent: agent_with_timeout(DEFAULT_TIMEOUT),
            retry: Retry {
                attempts: DEFAULT_RETRY_ATTEMPTS,
                backoff_base: Duration::from_secs(1),
            },
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent_with_timeout(timeout);
        self
    }

    /// Total attempts per request, at least one
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts.max(1);
        self
    }

    /// Delay after the first failure; doubles after every further one
    #[inline]
    pub fn with_backoff_base(mut self, delay: Duration) -> Self {
        self.retry.backoff_base = delay;
        self
    }

    /// Check that the server answers and serves the configured model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Checking Ollama at {}", self.base_url);

        self.ping()?;
        self.validate_model().context("Model validation failed")?;

        info!(
            "Ollama at {} is serving model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Fail unless the server answers at all
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.get("/api/version")
            .map(drop)
            .with_context(|| format!("Ollama is not reachable at {}", self.base_url))
    }

    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            return Ok(());
        }

        let available = models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        Err(anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            self.model,
            available
        ))
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let body = self.get("/api/tags")?;
        let tags: TagsResponse =
            serde_json::from_str(&body).context("Failed to parse models response")?;

        debug!("Ollama reports {} models", tags.models.len());
        Ok(tags.models)
    }

    /// Embed `texts` in requests of at most `batch_size` inputs
    ///
    /// Output order matches input order.
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for (number, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Embedding batch {} ({} texts)", number + 1, batch.len());
            embeddings.extend(
                self.embed_batch(batch)
                    .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?,
            );
        }

        debug!("Generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = self.post_json(
            "/api/embed",
            &EmbedRequest {
                model: &self.model,
                inputs: texts,
            },
        )?;

        let response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Sent {} texts but received {} embeddings",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn get(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        self.retry.run(&format!("GET {}", url), || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<String> {
        let url = self.endpoint(path)?;
        let json = serde_json::to_string(body).context("Failed to serialize request")?;

        self.retry.run(&format!("POST {}", url), || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
            .map_err(|e| DocsError::Embedding(format!("{:#}", e)))
    }
}
