use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{error_text, fetch_borrowers_by_name, items, matches_name, ToolSpec};
use crate::error::Result;
use crate::formatting::{format_borrower_balance_list, format_borrower_created, format_borrower_list};
use crate::http_client::ApiClient;

const MAX_MATCHES: usize = 10;
const PAGE_SIZE: &str = "50";

pub(crate) fn find_borrower_spec() -> ToolSpec {
    (
        "Search for a borrower by name (partial, case-insensitive match). \
         Returns up to 10 matching borrowers with ID, name, phone, and active loan count.",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Full or partial borrower name"}
            },
            "required": ["name"]
        }),
    )
}

pub(crate) fn list_borrowers_spec() -> ToolSpec {
    (
        "List borrowers with their current outstanding balances. By default shows only \
         borrowers with active loans, including principal, total paid, and remaining balance. \
         Set active_only=false to list all borrowers (without balance details).",
        json!({
            "type": "object",
            "properties": {
                "active_only": {"type": "boolean", "default": true},
                "page": {"type": "integer", "minimum": 1, "default": 1}
            }
        }),
    )
}

pub(crate) fn create_borrower_spec() -> ToolSpec {
    (
        "Create a new borrower. Name and phone are required. Address is optional. \
         Example: create_borrower(name=\"Juan Dela Cruz\", phone=\"09171234567\")",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "phone": {"type": "string"},
                "address": {"type": "string"}
            },
            "required": ["name", "phone"]
        }),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct FindBorrowerArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListBorrowersArgs {
    #[serde(default = "default_true")]
    active_only: bool,
    #[serde(default = "default_page")]
    page: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateBorrowerArgs {
    name: String,
    phone: String,
    #[serde(default)]
    address: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_page() -> u32 {
    1
}

pub(crate) async fn find_borrower(api: &ApiClient, args: FindBorrowerArgs) -> Result<String> {
    let response = fetch_borrowers_by_name(api).await?;
    if response.status() != StatusCode::OK {
        return Ok(error_text(&response));
    }

    let search_lower = args.name.to_lowercase();
    let matches: Vec<Value> = items(&response, "items")
        .into_iter()
        .filter(|b| matches_name(b, &search_lower))
        .take(MAX_MATCHES)
        .collect();

    if matches.is_empty() {
        return Ok(format!("No borrowers found matching '{}'", args.name));
    }
    Ok(format_borrower_list(&matches))
}

pub(crate) async fn list_borrowers(api: &ApiClient, args: ListBorrowersArgs) -> Result<String> {
    if args.active_only {
        let response = api.get("/api/reports/borrowers", &[]).await?;
        if response.status() != StatusCode::OK {
            return Ok(error_text(&response));
        }
        return Ok(format_borrower_balance_list(&items(&response, "borrowers")));
    }

    let page = args.page.max(1).to_string();
    let response = api
        .get(
            "/api/borrowers",
            &[
                ("limit", PAGE_SIZE),
                ("page", page.as_str()),
                ("sort_by", "name"),
                ("sort_order", "asc"),
            ],
        )
        .await?;
    if response.status() != StatusCode::OK {
        return Ok(error_text(&response));
    }

    let data = response.value();
    let total = data.get("total").and_then(Value::as_u64).unwrap_or(0);
    let pages = data.get("pages").and_then(Value::as_u64).unwrap_or(1);

    let mut result = format_borrower_list(&items(&response, "items"));
    if pages > 1 {
        result.push_str(&format!("\n\nPage {} of {} (total: {})", page, pages, total));
    }
    Ok(result)
}

pub(crate) async fn create_borrower(api: &ApiClient, args: CreateBorrowerArgs) -> Result<String> {
    let mut body = Map::new();
    body.insert("name".to_string(), Value::String(args.name));
    body.insert("phone".to_string(), Value::String(args.phone));
    if let Some(address) = args.address {
        body.insert("address".to_string(), Value::String(address));
    }

    let response = api.post("/api/borrowers", Value::Object(body)).await?;
    match response.status() {
        StatusCode::CREATED => Ok(format_borrower_created(&response.value())),
        StatusCode::UNPROCESSABLE_ENTITY => Ok(validation_message(&response.value())),
        _ => Ok(error_text(&response)),
    }
}

/// Render a 422 body: either a list of field errors or a single message
fn validation_message(body: &Value) -> String {
    let detail = body.get("detail").unwrap_or(body);
    match detail {
        Value::Array(errors) => {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    let field = e
                        .get("loc")
                        .and_then(Value::as_array)
                        .and_then(|loc| loc.last())
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "?".to_string());
                    let msg = e.get("msg").and_then(Value::as_str).unwrap_or("?");
                    format!("  - {}: {}", field, msg)
                })
                .collect();
            format!("Validation error:\n{}", messages.join("\n"))
        }
        Value::String(s) => format!("Validation error: {}", s),
        other => format!("Validation error: {}", other),
    }
}
