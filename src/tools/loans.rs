use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::{error_text, fetch_borrowers_by_name, items, matches_name, path_segment, ToolSpec};
use crate::error::{ApiError, Result};
use crate::formatting::{format_loan_balance, format_loan_created, format_loan_list};
use crate::http_client::ApiClient;

const MAX_CANDIDATES: usize = 10;

pub(crate) fn list_loans_spec() -> ToolSpec {
    (
        "List loans with optional filters. Can filter by borrower name (partial match) and \
         loan status (active, paid_off, renewed). Default shows only active loans.",
        json!({
            "type": "object",
            "properties": {
                "borrower_name": {"type": "string"},
                "status": {"type": "string", "enum": ["active", "paid_off", "renewed"]},
                "include_closed": {"type": "boolean", "default": false}
            }
        }),
    )
}

pub(crate) fn get_loan_balance_spec() -> ToolSpec {
    (
        "Get the current balance for a specific loan. Shows remaining principal, total paid, \
         and loan status. The loan_id should be a UUID from a previous listing.",
        json!({
            "type": "object",
            "properties": {
                "loan_id": {"type": "string"}
            },
            "required": ["loan_id"]
        }),
    )
}

pub(crate) fn create_loan_spec() -> ToolSpec {
    (
        "Create a new loan for a borrower. Principal should be a string amount (e.g., '50000'). \
         Loan date in YYYY-MM-DD format. Interest charge day is 1-31. Funding defaults to \
         'cashflow'; use 'external_person' with external_funder_name for external funding.",
        json!({
            "type": "object",
            "properties": {
                "borrower_id": {"type": "string"},
                "principal": {"type": "string"},
                "loan_date": {"type": "string", "format": "date"},
                "interest_charge_day": {"type": "integer", "minimum": 1, "maximum": 31},
                "funding_source_type": {"type": "string", "default": "cashflow"},
                "external_funder_name": {"type": "string"},
                "previous_loan_id": {"type": "string"}
            },
            "required": ["borrower_id", "principal", "loan_date", "interest_charge_day"]
        }),
    )
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListLoansArgs {
    #[serde(default)]
    borrower_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    include_closed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetLoanBalanceArgs {
    loan_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateLoanArgs {
    borrower_id: String,
    #[serde(deserialize_with = "super::amount_string")]
    principal: String,
    loan_date: String,
    interest_charge_day: i64,
    #[serde(default = "default_funding_source")]
    funding_source_type: String,
    #[serde(default)]
    external_funder_name: Option<String>,
    #[serde(default)]
    previous_loan_id: Option<String>,
}

fn default_funding_source() -> String {
    "cashflow".to_string()
}

pub(crate) async fn list_loans(api: &ApiClient, args: ListLoansArgs) -> Result<String> {
    let (loans, balances) = tokio::join!(
        fetch_loans(api, &args),
        fetch_balances(api)
    );

    let mut loans = match loans? {
        Ok(loans) => loans,
        Err(message) => return Ok(message),
    };

    if let Some(status) = args.status.as_deref().filter(|s| !s.is_empty()) {
        let status_lower = status.to_lowercase();
        loans.retain(|loan| {
            loan.get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase() == status_lower)
        });
    }

    Ok(format_loan_list(&loans, &balances))
}

/// Loans to list, or a message to return to the caller instead
async fn fetch_loans(
    api: &ApiClient,
    args: &ListLoansArgs,
) -> Result<std::result::Result<Vec<Value>, String>> {
    let Some(borrower_name) = args.borrower_name.as_deref().filter(|s| !s.is_empty()) else {
        let include_closed = args.include_closed.to_string();
        let response = api
            .get(
                "/api/loans",
                &[
                    ("limit", "100"),
                    ("include_closed", include_closed.as_str()),
                    ("sort_by", "loan_date"),
                    ("sort_order", "desc"),
                ],
            )
            .await?;
        if response.status() != StatusCode::OK {
            return Ok(Err(error_text(&response)));
        }
        return Ok(Ok(items(&response, "items")));
    };

    let response = fetch_borrowers_by_name(api).await?;
    if response.status() != StatusCode::OK {
        return Ok(Err(error_text(&response)));
    }

    let search_lower = borrower_name.to_lowercase();
    let mut matches: Vec<Value> = items(&response, "items")
        .into_iter()
        .filter(|b| matches_name(b, &search_lower))
        .collect();

    match matches.len() {
        0 => {
            return Ok(Err(format!(
                "No borrower found matching '{}'",
                borrower_name
            )))
        }
        1 => {}
        _ => {
            let names: Vec<String> = matches
                .iter()
                .take(MAX_CANDIDATES)
                .map(|b| format!("  - {} (ID: {})", text_field(b, "name"), text_field(b, "id")))
                .collect();
            return Ok(Err(format!(
                "Multiple borrowers match '{}'. Please be more specific:\n{}",
                borrower_name,
                names.join("\n")
            )));
        }
    }

    let borrower = matches.remove(0);
    let borrower_id = text_field(&borrower, "id");
    let borrower_path = format!("/api/borrowers/{}", path_segment("borrower id", &borrower_id)?);
    let detail = api.get(&borrower_path, &[]).await?;
    if detail.status() != StatusCode::OK {
        return Ok(Err(error_text(&detail)));
    }

    // Loan summaries on the borrower detail do not carry the borrower itself
    let borrower_name = borrower.get("name").cloned().unwrap_or(Value::Null);
    let loans = items(&detail, "loans")
        .into_iter()
        .map(|mut loan| {
            if let Value::Object(fields) = &mut loan {
                fields.insert("borrower_id".to_string(), Value::String(borrower_id.clone()));
                fields.insert("borrower_name".to_string(), borrower_name.clone());
            }
            loan
        })
        .collect();
    Ok(Ok(loans))
}

/// Balance report rows keyed by borrower id; best-effort
async fn fetch_balances(api: &ApiClient) -> HashMap<String, Value> {
    match api.get("/api/reports/borrowers", &[]).await {
        Ok(response) if response.is_success() => index_by_borrower(items(&response, "borrowers")),
        Ok(response) => {
            tracing::warn!(status = %response.status(), "Balance report unavailable");
            HashMap::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch balance data");
            HashMap::new()
        }
    }
}

fn index_by_borrower(rows: Vec<Value>) -> HashMap<String, Value> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("borrower_id")?.as_str()?.to_string();
            Some((id, row))
        })
        .collect()
}

fn text_field(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub(crate) async fn get_loan_balance(api: &ApiClient, args: GetLoanBalanceArgs) -> Result<String> {
    let path = format!("/api/loans/{}", path_segment("loan_id", &args.loan_id)?);
    let response = api.get(&path, &[]).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok("Loan not found.".to_string());
    }
    if response.status() != StatusCode::OK {
        return Ok(error_text(&response));
    }

    let loan = response.value();
    let borrower_id = text_field(&loan, "borrower_id");

    let report = api.get("/api/reports/borrowers", &[]).await?;
    let balance = if report.status() == StatusCode::OK {
        index_by_borrower(items(&report, "borrowers")).remove(&borrower_id)
    } else {
        None
    };

    // Borrower has no active loans in the report (loan may be paid off or renewed)
    let balance = balance.unwrap_or_else(|| {
        json!({
            "borrower_name": "",
            "remaining_balance": 0,
            "total_paid": 0,
            "active_loan_count": 0
        })
    });

    Ok(format_loan_balance(&loan, &balance))
}

pub(crate) async fn create_loan(api: &ApiClient, args: CreateLoanArgs) -> Result<String> {
    if !(1..=31).contains(&args.interest_charge_day) {
        return Err(ApiError::ValidationError(format!(
            "interest_charge_day must be between 1 and 31, got {}",
            args.interest_charge_day
        )));
    }

    let mut funding_source = Map::new();
    funding_source.insert(
        "source_type".to_string(),
        Value::String(args.funding_source_type),
    );
    funding_source.insert("amount".to_string(), Value::String(args.principal.clone()));
    if let Some(name) = args.external_funder_name.filter(|s| !s.is_empty()) {
        funding_source.insert("external_funder_name".to_string(), Value::String(name));
    }

    let mut payload = json!({
        "borrower_id": args.borrower_id,
        "principal": args.principal,
        "loan_date": args.loan_date,
        "interest_charge_day": args.interest_charge_day,
        "funding_sources": [Value::Object(funding_source)],
    });
    if let Some(previous) = args.previous_loan_id.filter(|s| !s.is_empty()) {
        payload["previous_loan_id"] = Value::String(previous);
    }

    let response = api.post("/api/loans", payload).await?;
    if response.status() == StatusCode::CREATED {
        Ok(format_loan_created(&response.value()))
    } else {
        Ok(error_text(&response))
    }
}
