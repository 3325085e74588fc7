//! Answer generation on top of retrieved context


use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::{GenerationConfig, OllamaConfig};
use crate::retrieval::{ContextOutcome, RetrievalService};
use crate::{DocsError, Result};

pub const EMPTY_KNOWLEDGE_BASE: &str = "Knowledge base empty. Upload and train documents first.";
pub const NO_RESPONSE: &str = "No response from LLM";

/// Turns a prompt into generated text
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub success: bool,
    pub response: String,
}

/// Text generation through Ollama's `/api/generate`
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(ollama: &OllamaConfig, generation: &GenerationConfig) -> Result<Self> {
        let base_url = ollama
            .base_url()
            .map_err(|e| DocsError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(generation.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: generation.model.clone(),
            agent,
        })
    }
}

impl Generator for OllamaGenerator {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = self
            .base_url
            .join("/api/generate")
            .map_err(|e| DocsError::Generation(format!("Failed to build generate URL: {}", e)))?;

        let request = serde_json::to_string(&GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        })
        .map_err(|e| DocsError::Generation(format!("Failed to serialize request: {}", e)))?;

        debug!("Requesting generation from {} with model {}", url, self.model);

        let body = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| DocsError::Generation(e.to_string()))?;

        let response: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| DocsError::Generation(format!("Failed to parse response: {}", e)))?;

        Ok(response
            .response
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| NO_RESPONSE.to_string()))
    }
}

#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an expert hardware documentation AI. Answer user questions with context below. \
         If you can't answer from the context, say so.\n\n\
         CONTEXT:\n{context}\n\n\
         USER QUESTION: {question}\n\n\
         ANSWER:"
    )
}

/// Retrieve context for `question` and generate an answer from it
///
/// Retrieval errors are returned; a failed generation is reported inside a
/// successful answer.
#[inline]
pub fn answer(
    service: &RetrievalService,
    generator: &dyn Generator,
    question: &str,
) -> Result<Answer> {
    let context = match service.answer_context(question, None)? {
        ContextOutcome::EmptyCorpus => {
            return Ok(Answer {
                success: false,
                response: EMPTY_KNOWLEDGE_BASE.to_string(),
            });
        }
        ContextOutcome::Context(context) => context,
    };

    debug!("Answering from {} chunks", context.chunks.len());
    let prompt = build_prompt(&context.joined(), question);

    let response = match generator.generate(&prompt) {
        Ok(response) => response,
        Err(e) => {
            warn!("Generation failed: {}", e);
            format!("[LLM generation failed: {}]", e)
        }
    };

    Ok(Answer {
        success: true,
        response,
    })
}
