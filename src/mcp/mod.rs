//! MCP (Model Context Protocol) server
//!
//! JSON-RPC 2.0 over stdio, protocol version 2025-06-18, exposing document
//! upload, training, search, and question answering as tools.


pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::register_tools;
