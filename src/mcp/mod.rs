//! Evaluation API exposed to MCP clients over stdio.
pub mod server;
pub mod tools;

pub use server::{McpContext, McpServer};
