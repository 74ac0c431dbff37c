// Integration tests for the MCP stdio server
//
// Requests are fed as newline-delimited JSON and responses collected from the
// other end of an in-memory duplex pipe.

mod common;

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use common::{api_client, logged_in, new_server, path};
use lending_mcp::mcp::protocol::{
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, SUPPORTED_PROTOCOL_VERSIONS,
};
use lending_mcp::mcp::McpServer;

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Run `lines` through a fresh server and return every response written
async fn exchange(server: &McpServer, lines: &[Value]) -> Vec<Value> {
    let mut input = String::new();
    for line in lines {
        input.push_str(&line.to_string());
        input.push('\n');
    }
    exchange_raw(server, input.as_bytes()).await
}

async fn exchange_raw(server: &McpServer, input: &[u8]) -> Vec<Value> {
    let (writer, mut output) = tokio::io::duplex(1 << 20);
    server.serve(input, writer).await.unwrap();

    let mut raw = String::new();
    output.read_to_string(&mut raw).await.unwrap();
    raw.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn by_id(responses: Vec<Value>) -> HashMap<String, Value> {
    responses
        .into_iter()
        .map(|r| (r["id"].to_string(), r))
        .collect()
}

async fn test_server(mock: &mut mockito::ServerGuard) -> McpServer {
    let (auth, _clock) = logged_in(mock).await;
    McpServer::new(Arc::new(api_client(mock, auth)), "Chester")
}

fn request(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

// ==================================================================================================
// Protocol
// ==================================================================================================

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let responses = by_id(
        exchange(
            &server,
            &[
                request(1, "initialize", json!({"protocolVersion": "2025-03-26"})),
                request(2, "initialize", json!({"protocolVersion": "1999-01-01"})),
            ],
        )
        .await,
    );

    let known = &responses["1"]["result"];
    assert_eq!(known["protocolVersion"], "2025-03-26");
    assert_eq!(known["serverInfo"]["name"], "BATMC Lending");
    assert!(known["capabilities"]["tools"].is_object());
    assert!(known["instructions"].as_str().unwrap().contains("Chester"));

    let unknown = &responses["2"]["result"];
    assert_eq!(unknown["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
}

#[tokio::test]
async fn test_tools_list_has_every_tool() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let responses = exchange(&server, &[request(7, "tools/list", json!({}))]).await;
    assert_eq!(responses.len(), 1);

    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in [
        "find_borrower",
        "list_borrowers",
        "create_borrower",
        "list_loans",
        "get_loan_balance",
        "create_loan",
        "record_payment",
    ] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
        assert!(tool["description"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_protocol_errors() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let responses = by_id(
        exchange(
            &server,
            &[
                request(1, "resources/list", json!({})),
                json!({"jsonrpc": "1.0", "id": 2, "method": "ping"}),
                request(3, "tools/call", json!({"name": "drop_tables", "arguments": {}})),
                request(4, "tools/call", json!({"arguments": {}})),
                request(5, "ping", json!({})),
            ],
        )
        .await,
    );

    assert_eq!(responses["1"]["error"]["code"], METHOD_NOT_FOUND);
    assert_eq!(responses["2"]["error"]["code"], INVALID_REQUEST);
    assert_eq!(responses["3"]["error"]["code"], INVALID_PARAMS);
    assert!(responses["3"]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("drop_tables"));
    assert_eq!(responses["4"]["error"]["code"], INVALID_PARAMS);
    assert_eq!(responses["5"]["result"], json!({}));
    assert!(responses["5"].get("error").is_none());
}

#[tokio::test]
async fn test_parse_error_keeps_serving() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let input = format!("{{not json\n\n{}\n", request(9, "ping", json!({})));
    let responses = exchange_raw(&server, input.as_bytes()).await;

    assert_eq!(responses.len(), 2);
    let parse_error = responses
        .iter()
        .find(|r| r["id"].is_null())
        .unwrap();
    assert_eq!(parse_error["error"]["code"], PARSE_ERROR);
    assert!(responses.iter().any(|r| r["id"] == 9));
}

#[tokio::test]
async fn test_invalid_utf8_keeps_serving() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let mut input = b"\xff\xfe\xfd\n".to_vec();
    input.extend_from_slice(request(3, "ping", json!({})).to_string().as_bytes());
    input.push(b'\n');
    let responses = exchange_raw(&server, &input).await;

    assert_eq!(responses.len(), 2);
    let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(parse_error["error"]["code"], PARSE_ERROR);
    assert!(responses.iter().any(|r| r["id"] == 3 && r["result"] == json!({})));
}

#[tokio::test]
async fn test_non_request_json_is_invalid_request() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let responses = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": 11}),
            json!([{"jsonrpc": "2.0", "id": 12, "method": "ping"}]),
            request(13, "ping", json!({})),
        ],
    )
    .await;

    assert_eq!(responses.len(), 3);
    let missing_method = responses.iter().find(|r| r["id"] == 11).unwrap();
    assert_eq!(missing_method["error"]["code"], INVALID_REQUEST);
    let batch = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(batch["error"]["code"], INVALID_REQUEST);
    assert!(responses.iter().any(|r| r["id"] == 13));
}

#[tokio::test]
async fn test_notifications_get_no_reply() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let responses = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 1}}),
        ],
    )
    .await;

    assert!(responses.is_empty());
}

// ==================================================================================================
// Tool calls
// ==================================================================================================

#[tokio::test]
async fn test_find_borrower_end_to_end() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;
    let listed = mock
        .mock("GET", path("/api/borrowers"))
        .match_header("authorization", "Bearer t1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {"id": "b-1", "name": "Maria Santos", "phone": "0917", "active_loan_count": 2},
                    {"id": "b-2", "name": "Jose Rizal", "phone": null, "active_loan_count": 0},
                    {"id": "b-3", "name": "Ana Santos-Reyes", "phone": "0918", "active_loan_count": 1}
                ],
                "total": 3
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let responses = exchange(
        &server,
        &[request(
            1,
            "tools/call",
            json!({"name": "find_borrower", "arguments": {"name": "santos"}}),
        )],
    )
    .await;

    let result = &responses[0]["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["type"], "text");
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Borrowers (2):"));
    assert!(text.contains("Maria Santos"));
    assert!(text.contains("Ana Santos-Reyes"));
    assert!(!text.contains("Jose Rizal"));
    listed.assert_async().await;
}

#[tokio::test]
async fn test_tool_api_error_is_rendered_as_text() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;
    let _failing = mock
        .mock("GET", path("/api/borrowers"))
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"database unavailable"}"#)
        .create_async()
        .await;

    let responses = exchange(
        &server,
        &[request(
            1,
            "tools/call",
            json!({"name": "find_borrower", "arguments": {"name": "maria"}}),
        )],
    )
    .await;

    let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
    assert_eq!(text, "Error (500): database unavailable");
}

#[tokio::test]
async fn test_bad_tool_arguments_are_flagged() {
    let mut mock = new_server().await;
    let server = test_server(&mut mock).await;

    let responses = exchange(
        &server,
        &[request(
            1,
            "tools/call",
            json!({"name": "find_borrower", "arguments": {"nickname": 3}}),
        )],
    )
    .await;

    let result = &responses[0]["result"];
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("Error:"));
}
