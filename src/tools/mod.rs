// MCP tools over the lending API
// Each tool takes JSON arguments and returns human-readable text

mod borrowers;
mod loans;
mod payments;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, Result};
use crate::http_client::{ApiClient, ApiResponse};

/// Tools exposed to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    FindBorrower,
    ListBorrowers,
    CreateBorrower,
    ListLoans,
    GetLoanBalance,
    CreateLoan,
    RecordPayment,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::FindBorrower,
        ToolName::ListBorrowers,
        ToolName::CreateBorrower,
        ToolName::ListLoans,
        ToolName::GetLoanBalance,
        ToolName::CreateLoan,
        ToolName::RecordPayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::FindBorrower => "find_borrower",
            ToolName::ListBorrowers => "list_borrowers",
            ToolName::CreateBorrower => "create_borrower",
            ToolName::ListLoans => "list_loans",
            ToolName::GetLoanBalance => "get_loan_balance",
            ToolName::CreateLoan => "create_loan",
            ToolName::RecordPayment => "record_payment",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    fn definition(&self) -> ToolDefinition {
        let (description, input_schema) = match self {
            ToolName::FindBorrower => borrowers::find_borrower_spec(),
            ToolName::ListBorrowers => borrowers::list_borrowers_spec(),
            ToolName::CreateBorrower => borrowers::create_borrower_spec(),
            ToolName::ListLoans => loans::list_loans_spec(),
            ToolName::GetLoanBalance => loans::get_loan_balance_spec(),
            ToolName::CreateLoan => loans::create_loan_spec(),
            ToolName::RecordPayment => payments::record_payment_spec(),
        };
        ToolDefinition {
            name: self.as_str(),
            description,
            input_schema,
        }
    }
}

/// Description plus the JSON schema of a tool's arguments
pub(crate) type ToolSpec = (&'static str, Value);

/// Tool listing entry as sent in `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// All tool definitions, in listing order
pub fn definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(ToolName::definition).collect()
}

/// Run a tool
///
/// API-level failures are rendered into the returned text; only argument
/// errors, transport failures and auth failures come back as `Err`.
pub async fn call(api: &ApiClient, tool: ToolName, arguments: Value) -> Result<String> {
    tracing::debug!(tool = tool.as_str(), "Calling tool");
    match tool {
        ToolName::FindBorrower => borrowers::find_borrower(api, parse_args(arguments)?).await,
        ToolName::ListBorrowers => borrowers::list_borrowers(api, parse_args(arguments)?).await,
        ToolName::CreateBorrower => borrowers::create_borrower(api, parse_args(arguments)?).await,
        ToolName::ListLoans => loans::list_loans(api, parse_args(arguments)?).await,
        ToolName::GetLoanBalance => loans::get_loan_balance(api, parse_args(arguments)?).await,
        ToolName::CreateLoan => loans::create_loan(api, parse_args(arguments)?).await,
        ToolName::RecordPayment => payments::record_payment(api, parse_args(arguments)?).await,
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    // Hosts send `null` or omit arguments for tools without required params
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| ApiError::ValidationError(format!("Invalid arguments: {}", e)))
}

/// `Error (<status>): <detail>`
fn error_text(response: &ApiResponse) -> String {
    format!(
        "Error ({}): {}",
        response.status().as_u16(),
        response.detail()
    )
}

/// `items` array of a paged listing response
fn items(response: &ApiResponse, key: &str) -> Vec<Value> {
    match response.value().get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Case-insensitive substring match on the `name` field
fn matches_name(borrower: &Value, search_lower: &str) -> bool {
    borrower
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase()
        .contains(search_lower)
}

/// Validate an id before splicing it into a URL path
fn path_segment<'a>(name: &str, id: &'a str) -> Result<&'a str> {
    let id = id.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ApiError::ValidationError(format!(
            "{} must be an id such as a UUID, got '{}'",
            name, id
        )));
    }
    Ok(id)
}

/// Accept amounts as either JSON strings or numbers, keep them as decimal strings
fn amount_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected an amount as string or number, got {}",
            other
        ))),
    }
}

/// Borrower listing used for client-side name search
async fn fetch_borrowers_by_name(api: &ApiClient) -> Result<ApiResponse> {
    api.get(
        "/api/borrowers",
        &[("limit", "100"), ("sort_by", "name"), ("sort_order", "asc")],
    )
    .await
}
