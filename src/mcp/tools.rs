//! Tool handlers exposing the document store, training, and retrieval

use crate::corpus::QueryOutcome;
use crate::documents::DocumentStore;
use crate::generation::{self, EMPTY_KNOWLEDGE_BASE, Generator};
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::retrieval::RetrievalService;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct UploadDocumentHandler {
    store: Arc<DocumentStore>,
}

pub struct TrainDocumentsHandler {
    store: Arc<DocumentStore>,
    service: Arc<RetrievalService>,
}

pub struct TrainingStatusHandler {
    store: Arc<DocumentStore>,
    service: Arc<RetrievalService>,
}

pub struct SearchDocumentsHandler {
    service: Arc<RetrievalService>,
}

pub struct AskHandler {
    service: Arc<RetrievalService>,
    generator: Arc<dyn Generator>,
}

/// Register every document tool with `server`
#[inline]
pub async fn register_tools(
    server: &McpServer,
    store: Arc<DocumentStore>,
    service: Arc<RetrievalService>,
    generator: Arc<dyn Generator>,
) {
    server
        .register_tool(
            UploadDocumentHandler::tool_definition(),
            UploadDocumentHandler::new(Arc::clone(&store)),
        )
        .await;
    server
        .register_tool(
            TrainDocumentsHandler::tool_definition(),
            TrainDocumentsHandler::new(Arc::clone(&store), Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            TrainingStatusHandler::tool_definition(),
            TrainingStatusHandler::new(store, Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            SearchDocumentsHandler::tool_definition(),
            SearchDocumentsHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            AskHandler::tool_definition(),
            AskHandler::new(service, generator),
        )
        .await;
}

impl UploadDocumentHandler {
    #[inline]
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "upload_document".to_string(),
            description: Some(
                "Store a text, markdown or PDF document for the next training run".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "File name, e.g. 'pinout.md'"
                    },
                    "content": {
                        "type": "string",
                        "description": "Document text, or the base64-encoded file when encoding is 'base64'"
                    },
                    "encoding": {
                        "type": "string",
                        "enum": ["text", "base64"],
                        "description": "How 'content' is encoded (default: text); use base64 for PDFs"
                    }
                },
                "required": ["name", "content"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for UploadDocumentHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let name = required_str(&args, "name")?.to_string();
        let content = required_str(&args, "content")?;
        let bytes = match args.get("encoding").and_then(Value::as_str) {
            None | Some("text") => content.as_bytes().to_vec(),
            Some("base64") => BASE64
                .decode(content.trim())
                .context("Parameter 'content' is not valid base64")?,
            Some(other) => return Err(anyhow!("Unsupported encoding: {}", other)),
        };

        let store = Arc::clone(&self.store);
        let path = tokio::task::spawn_blocking(move || store.save_upload(&name, &bytes))
            .await
            .context("Upload task panicked")??;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Uploaded document {}", filename);

        json_result(&json!({
            "filename": filename,
            "status": "uploaded"
        }))
    }
}

impl TrainDocumentsHandler {
    #[inline]
    pub fn new(store: Arc<DocumentStore>, service: Arc<RetrievalService>) -> Self {
        Self { store, service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "train_documents".to_string(),
            description: Some(
                "Index all uploaded documents, replacing the previous index".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for TrainDocumentsHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        let store = Arc::clone(&self.store);
        let service = Arc::clone(&self.service);

        let report = tokio::task::spawn_blocking(move || {
            let documents = store.load_documents()?;
            service.train(documents)
        })
        .await
        .context("Training task panicked")??;

        json_result(&report)
    }
}

impl TrainingStatusHandler {
    #[inline]
    pub fn new(store: Arc<DocumentStore>, service: Arc<RetrievalService>) -> Self {
        Self { store, service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "training_status".to_string(),
            description: Some(
                "Report what is currently indexed and which files are uploaded".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for TrainingStatusHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        let stats = self.service.status();

        let store = Arc::clone(&self.store);
        let uploaded = tokio::task::spawn_blocking(move || store.list_files())
            .await
            .context("Status task panicked")??;

        let status = if stats.chunk_count == 0 {
            "empty"
        } else {
            "completed"
        };

        json_result(&json!({
            "status": status,
            "chunk_count": stats.chunk_count,
            "documents": stats.documents,
            "dimension": stats.dimension,
            "built_at": stats.built_at,
            "uploaded_files": uploaded
        }))
    }
}

impl SearchDocumentsHandler {
    #[inline]
    pub fn new(service: Arc<RetrievalService>) -> Self {
        Self { service }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search_documents".to_string(),
            description: Some("Find the indexed chunks nearest to a query".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of results (default: configured top_k)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchDocumentsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_str(&args, "query")?.to_string();

        let limit = match args.get("limit") {
            None | Some(Value::Null) => self.service.config().top_k,
            Some(value) => value
                .as_u64()
                .filter(|limit| *limit > 0)
                .and_then(|limit| usize::try_from(limit).ok())
                .ok_or_else(|| anyhow!("Parameter 'limit' must be a positive integer"))?,
        };

        debug!("Searching documents: query='{}', limit={}", query, limit);

        let service = Arc::clone(&self.service);
        let outcome = tokio::task::spawn_blocking(move || service.search(&query, limit))
            .await
            .context("Search task panicked")??;

        match outcome {
            QueryOutcome::EmptyCorpus => Ok(CallToolResult::text(EMPTY_KNOWLEDGE_BASE)),
            QueryOutcome::Matches(results) => json_result(&json!({ "results": results })),
        }
    }
}

impl AskHandler {
    #[inline]
    pub fn new(service: Arc<RetrievalService>, generator: Arc<dyn Generator>) -> Self {
        Self { service, generator }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "ask".to_string(),
            description: Some(
                "Answer a question using the most relevant indexed context".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Question to answer"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AskHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_str(&args, "query")?.to_string();

        let service = Arc::clone(&self.service);
        let generator = Arc::clone(&self.generator);
        let answer = tokio::task::spawn_blocking(move || {
            generation::answer(&service, generator.as_ref(), &query)
        })
        .await
        .context("Ask task panicked")??;

        json_result(&answer)
    }
}

fn required_str<'a>(args: &'a HashMap<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Missing required parameter: {}", name))
}

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult> {
    Ok(CallToolResult::text(serde_json::to_string_pretty(value)?))
}
