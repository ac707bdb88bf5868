//! # spica-mcp
//!
//! MCP (Model Context Protocol) server for the Spica backend platform.
//!
//! This crate exposes Spica's REST API as tools for AI agents: buckets and
//! their records, identities, API keys, policies and serverless functions. It
//! also answers documentation questions from an OpenAI vector store. The
//! protocol is JSON-RPC 2.0 over stdin/stdout, one message per line.
//!
//! ## Tool groups
//!
//! `bucket_*`, `bucket_data_*`, `identity_*`, `apikey_*`, `policy_*`,
//! `function_*`, plus `search`, `fetch` and `answer_question`.
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "spica": {
//!       "command": "/path/to/spica-mcp",
//!       "env": {
//!         "SPICA_BASE_URL": "https://example.hq.spicaengine.com",
//!         "SPICA_API_KEY": "APIKEY 406bus18l2yiufdq"
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, you can use the library API:
//!
//! ```no_run
//! use std::path::Path;
//! use spica_mcp::{Config, McpServer, McpSession, ToolRegistry};
//!
//! # async fn serve() -> spica_mcp::Result<()> {
//! let config = Config::load(Path::new("spica-config.json"));
//! let server = McpServer::new(ToolRegistry::standard()?, McpSession::new(&config));
//!
//! // Reads from stdin, writes to stdout
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
mod convert;
pub mod docs;
mod error;
mod server;
mod session;
pub mod tools;

#[cfg(test)]
mod testing;

pub use client::{ApiRequest, Auth, HttpMethod, HttpTransport, SpicaClient, Transport};
pub use config::Config;
pub use convert::{merge_shallow, to_pretty_json};
pub use error::{McpError, RequestError, Result};
pub use server::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpServer};
pub use session::McpSession;
pub use tools::{ToolDef, ToolOutput, ToolRegistry};
