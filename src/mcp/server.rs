//! MCP server framework: line-delimited JSON-RPC over stdio, tool registry,
//! and request routing

use crate::mcp::protocol::*;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct McpServer {
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    tools: RwLock<BTreeMap<String, Tool>>,
    tool_handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    connection_state: RwLock<ConnectionState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Executes one registered tool
///
/// An `Err` is reported to the client as an `isError` tool result.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        Self {
            server_info: Implementation { name, version },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            tools: RwLock::new(BTreeMap::new()),
            tool_handlers: RwLock::new(HashMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        self.tools.write().await.insert(tool_name.clone(), tool);
        self.tool_handlers
            .write()
            .await
            .insert(tool_name.clone(), Arc::new(handler));

        debug!("Registered tool: {}", tool_name);
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC messages until `reader` is exhausted
    ///
    /// Tool calls run as separate tasks and may answer out of order; every
    /// other message is handled in arrival order.
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let mut lines = reader.lines();
        let mut in_flight = JoinSet::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message = match parse_message(line) {
                Ok(message) => message,
                Err((error, id)) => {
                    error!("Rejected message: {}", error.message);
                    let response = JsonRpcErrorResponse::new(error, id);
                    send_message(&writer, &JsonRpcMessage::ErrorResponse(response)).await?;
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Request(request) if request.method == "tools/call" => {
                    let server = Arc::clone(&self);
                    let writer = Arc::clone(&writer);
                    in_flight.spawn(async move {
                        let reply = server.handle_request(request).await;
                        if let Err(e) = send_message(&writer, &reply).await {
                            error!("Failed to send tool result: {}", e);
                        }
                    });
                }
                message => {
                    if let Some(reply) = self.process_message(message).await {
                        send_message(&writer, &reply).await?;
                    }
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!("Tool call task failed: {}", e);
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        info!("MCP server stopped");
        Ok(())
    }

    /// Handle one message, returning the reply if the message expects one
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    #[inline]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        match result {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(error) => {
                error!("Error handling request {}: {}", request.method, error.message);
                JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, Some(request.id)))
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                *self.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => debug!("Received cancellation notification"),
            method => warn!("Unknown notification method: {}", method),
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params, "initialize")?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            return Err(JsonRpcError::unsupported_protocol_version(
                &params.protocol_version,
            ));
        }

        *self.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some(
                "Upload documents, train the index, then search or ask questions about them"
                    .to_string(),
            ),
        };

        info!("Client initialized: {}", params.client_info.name);
        to_value(&result)
    }

    async fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self.tools.read().await.values().cloned().collect();
        to_value(&ListToolsResult { tools })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params, "tools/call")?;

        let handler = self
            .tool_handlers
            .read()
            .await
            .get(&params.name)
            .cloned()
            .ok_or_else(|| JsonRpcError::tool_not_found(&params.name))?;

        let name = params.name.clone();
        debug!("Calling tool: {}", name);

        let result = match handler.handle(params).await {
            Ok(result) => result,
            Err(e) => {
                error!("Tool {} failed: {:#}", name, e);
                CallToolResult::error(format!("{:#}", e))
            }
        };

        to_value(&result)
    }
}

/// Parse and structurally validate one JSON-RPC message
///
/// On failure returns the error to send back and, when it could be read,
/// the id of the offending request.
pub(crate) fn parse_message(line: &str) -> Result<JsonRpcMessage, (JsonRpcError, Option<RequestId>)> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        debug!("Failed to parse JSON: {}", e);
        (JsonRpcError::parse_error(), None)
    })?;

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
    let invalid = |message: String| (JsonRpcError::invalid_request(message), id.clone());

    let Some(object) = value.as_object() else {
        return Err(invalid("Message must be a JSON object".to_string()));
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(invalid(format!(
            "Field 'jsonrpc' must be \"{}\"",
            JSONRPC_VERSION
        )));
    }

    let parsed = if object.contains_key("method") {
        if object.contains_key("id") {
            serde_json::from_value(value.clone()).map(JsonRpcMessage::Request)
        } else {
            serde_json::from_value(value.clone()).map(JsonRpcMessage::Notification)
        }
    } else if object.contains_key("result") {
        serde_json::from_value(value.clone()).map(JsonRpcMessage::Response)
    } else if object.contains_key("error") {
        serde_json::from_value(value.clone()).map(JsonRpcMessage::ErrorResponse)
    } else {
        return Err(invalid(
            "Value does not match any known JSON-RPC message type".to_string(),
        ));
    };

    parsed.map_err(|e| invalid(e.to_string()))
}

fn parse_params<T>(params: Option<Value>, method: &str) -> Result<T, JsonRpcError>
where
    T: serde::de::DeserializeOwned,
{
    let params = params.ok_or_else(|| {
        JsonRpcError::invalid_params(format!("{} request missing parameters", method))
    })?;
    serde_json::from_value(params).map_err(|e| {
        JsonRpcError::invalid_params(format!("Invalid {} parameters: {}", method, e))
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

async fn send_message<W>(writer: &Mutex<W>, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');

    let mut writer = writer.lock().await;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
