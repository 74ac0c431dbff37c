// MCP transport
// JSON-RPC 2.0 over stdio, exposing the lending tools

pub mod protocol;
mod server;

pub use server::McpServer;
