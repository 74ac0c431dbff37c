use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::protocol::{
    negotiate_version, CallToolResult, InitializeParams, JsonRpcRequest, JsonRpcResponse,
    ToolCallParams, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use crate::http_client::ApiClient;
use crate::tools::{self, ToolName};

const SERVER_NAME: &str = "BATMC Lending";

/// MCP server over newline-delimited JSON-RPC
///
/// Every request is handled on its own task, so slow tool calls do not block
/// the read loop. Responses are written by a single writer task.
#[derive(Clone)]
pub struct McpServer {
    api: Arc<ApiClient>,
    instructions: String,
}

type RpcResult = std::result::Result<Value, (i32, String)>;

impl McpServer {
    pub fn new(api: Arc<ApiClient>, user_name: &str) -> Self {
        let instructions = format!(
            "Tools for managing {}'s lending records: borrowers, loans, payments and balances. \
             Amounts are in Philippine pesos and should be passed as decimal strings.",
            user_name
        );
        Self { api, instructions }
    }

    /// Serve until the reader reaches EOF; in-flight requests are completed first
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut in_flight = JoinSet::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }

            let request = match decode(&line) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(response) => {
                    let _ = tx.send(response);
                    continue;
                }
            };

            let server = self.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = server.handle(request).await {
                    let _ = tx.send(response);
                }
            });

            // Reap finished handlers so the set does not grow unbounded
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Request handler panicked");
                }
            }
        }

        tracing::info!("Input closed, waiting for in-flight requests");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Request handler panicked");
            }
        }

        drop(tx);
        writer_task.await??;
        Ok(())
    }

    /// Handle one message; notifications produce no response
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid request: jsonrpc must be \"2.0\"",
            ));
        }

        tracing::debug!(method = %request.method, "Handling request");
        let result: RpcResult = match request.method.as_str() {
            "initialize" => Ok(self.initialize(request.params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::definitions() })),
            "tools/call" => self.call_tool(request.params).await,
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err((code, message)) => JsonRpcResponse::error(id, code, message),
        })
    }

    fn initialize(&self, params: Option<Value>) -> Value {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(client = %client, "MCP client connected");
        }

        json!({
            "protocolVersion": negotiate_version(params.protocol_version.as_deref()),
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": self.instructions,
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> RpcResult {
        let params: ToolCallParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .ok_or_else(|| (INVALID_PARAMS, "Invalid tools/call params".to_string()))?;
        let tool = ToolName::parse(&params.name)
            .ok_or_else(|| (INVALID_PARAMS, format!("Unknown tool: {}", params.name)))?;

        let arguments = params.arguments.unwrap_or(Value::Null);
        let result = match tools::call(&self.api, tool, arguments).await {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                tracing::warn!(tool = tool.as_str(), error = %e, "Tool call failed");
                CallToolResult::error(format!("Error: {}", e))
            }
        };

        serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }
}

/// Decode one input line; blank lines yield `None`
///
/// Undecodable bytes or JSON are a parse error. Well-formed JSON that is not
/// a request object is an invalid request, answered with its `id` when one
/// can be read.
fn decode(line: &[u8]) -> std::result::Result<Option<JsonRpcRequest>, JsonRpcResponse> {
    let text = std::str::from_utf8(line).map_err(|e| {
        tracing::warn!(error = %e, "Non UTF-8 JSON-RPC message");
        JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error: invalid UTF-8")
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| {
        tracing::warn!(error = %e, "Unparsable JSON-RPC message");
        JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))
    })?;

    let id = match value.get("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
        _ => Value::Null,
    };
    serde_json::from_value(value).map(Some).map_err(|e| {
        tracing::warn!(error = %e, "Malformed JSON-RPC request");
        JsonRpcResponse::error(id, INVALID_REQUEST, format!("Invalid request: {}", e))
    })
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut frame = serde_json::to_vec(&response)?;
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }
    Ok(())
}
