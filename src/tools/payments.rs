use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{error_text, ToolSpec};
use crate::error::{ApiError, Result};
use crate::formatting::format_payment_response;
use crate::http_client::ApiClient;

pub(crate) fn record_payment_spec() -> ToolSpec {
    (
        "Record a payment against one or more loans. payment_date in YYYY-MM-DD format. \
         total_amount as string (e.g., '5000'). allocations is a list of \
         {'loan_id': 'uuid', 'amount': 'string'} objects. The sum of allocation amounts \
         must equal total_amount.",
        json!({
            "type": "object",
            "properties": {
                "payment_date": {"type": "string", "format": "date"},
                "total_amount": {"type": "string"},
                "allocations": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "loan_id": {"type": "string"},
                            "amount": {"type": "string"}
                        },
                        "required": ["loan_id", "amount"]
                    }
                },
                "allow_overpayment": {"type": "boolean", "default": false},
                "notes": {"type": "string"}
            },
            "required": ["payment_date", "total_amount", "allocations"]
        }),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordPaymentArgs {
    payment_date: String,
    #[serde(deserialize_with = "super::amount_string")]
    total_amount: String,
    allocations: Vec<Allocation>,
    #[serde(default)]
    allow_overpayment: bool,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Allocation {
    loan_id: String,
    #[serde(deserialize_with = "super::amount_string")]
    amount: String,
}

pub(crate) async fn record_payment(api: &ApiClient, args: RecordPaymentArgs) -> Result<String> {
    if args.allocations.is_empty() {
        return Err(ApiError::ValidationError(
            "allocations must contain at least one loan".to_string(),
        ));
    }

    let allocations: Vec<Value> = args
        .allocations
        .into_iter()
        .map(|a| json!({"loan_id": a.loan_id, "amount": a.amount}))
        .collect();

    let mut payload = json!({
        "payment_date": args.payment_date,
        "total_amount": args.total_amount,
        "allocations": allocations,
        "allow_overpayment": args.allow_overpayment,
    });
    if let Some(notes) = args.notes.filter(|s| !s.is_empty()) {
        payload["notes"] = Value::String(notes);
    }

    let response = api.post("/api/payments", payload).await?;
    match response.status() {
        StatusCode::CREATED => Ok(format_payment_response(&response.value())),
        StatusCode::BAD_REQUEST => Ok(format!("Payment rejected: {}", response.detail())),
        _ => Ok(error_text(&response)),
    }
}
