// Lending MCP bridge - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod formatting;
pub mod http_client;
pub mod lifecycle;
pub mod mcp;
pub mod tools;
