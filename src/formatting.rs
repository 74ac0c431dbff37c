// Human-readable rendering of API records for tool output

use serde_json::Value;
use std::collections::HashMap;

/// Exact decimal amount, `units * 10^-scale`
///
/// Amounts are summed at full precision and only rounded when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    units: i128,
    scale: u32,
}

impl Amount {
    pub const ZERO: Amount = Amount { units: 0, scale: 0 };

    /// Parse a JSON string or number
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Self::parse(&n.to_string()),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Parse plain or exponent notation: `1234.5`, `-.25`, `1e21`, `1.5E-3`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (mantissa, exponent) = match s.find(|c: char| c == 'e' || c == 'E') {
            Some(i) => (&s[..i], s[i + 1..].parse::<i64>().ok()?),
            None => (s, 0),
        };

        let (negative, digits) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        // Trailing fractional zeros carry no value
        let frac = frac.trim_end_matches('0');
        let mut units: i128 = 0;
        for b in whole.bytes().chain(frac.bytes()) {
            units = units.checked_mul(10)?.checked_add((b - b'0') as i128)?;
        }
        if negative {
            units = -units;
        }

        let scale = (frac.len() as i64).checked_sub(exponent)?;
        if scale < 0 {
            let factor = 10i128.checked_pow(u32::try_from(-scale).ok()?)?;
            return Some(Self {
                units: units.checked_mul(factor)?,
                scale: 0,
            });
        }
        Some(Self {
            units,
            scale: u32::try_from(scale).ok()?,
        })
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        let scale = self.scale.max(other.scale);
        let a = self.rescale(scale)?;
        let b = other.rescale(scale)?;
        Some(Self {
            units: a.units.checked_add(b.units)?,
            scale,
        })
    }

    fn rescale(self, scale: u32) -> Option<Self> {
        let factor = 10i128.checked_pow(scale - self.scale)?;
        Some(Self {
            units: self.units.checked_mul(factor)?,
            scale,
        })
    }

    /// Round to whole cents, ties to even
    pub fn to_cents(self) -> Option<i128> {
        if self.scale <= 2 {
            return self.units.checked_mul(10i128.pow(2 - self.scale));
        }

        // Too many places for i128 means the value is well under half a cent
        let Some(divisor) = 10i128.checked_pow(self.scale - 2) else {
            return Some(0);
        };
        let magnitude = self.units.unsigned_abs();
        let divisor = divisor.unsigned_abs();
        let (mut quotient, remainder) = (magnitude / divisor, magnitude % divisor);
        let twice = remainder * 2;
        if twice > divisor || (twice == divisor && quotient % 2 == 1) {
            quotient += 1;
        }

        let cents = i128::try_from(quotient).ok()?;
        Some(if self.units < 0 { -cents } else { cents })
    }
}

/// Format cents as pesos: `P1,234.50`
pub fn format_cents(cents: i128) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("P{}{}.{:02}", sign, grouped, abs % 100)
}

/// Format an amount as pesos; missing amounts render as zero
pub fn format_money(amount: &Value) -> String {
    match amount {
        Value::Null => format_cents(0),
        other => match Amount::from_value(other).and_then(Amount::to_cents) {
            Some(cents) => format_cents(cents),
            None => format!("P{}", text(other)),
        },
    }
}

/// String form of a scalar field
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Field as text, `default` when absent or null
fn field(record: &Value, key: &str, default: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(v) => text(v),
    }
}

fn amount(record: &Value, key: &str) -> String {
    format_money(record.get(key).unwrap_or(&Value::Null))
}

/// Numbered borrower list with phone and active loan count
pub fn format_borrower_list(borrowers: &[Value]) -> String {
    if borrowers.is_empty() {
        return "No borrowers found.".to_string();
    }

    let mut lines = vec![format!("Borrowers ({}):", borrowers.len()), String::new()];
    for (i, b) in borrowers.iter().enumerate() {
        lines.push(format!("  {}. {}", i + 1, field(b, "name", "Unknown")));
        lines.push(format!(
            "     Phone: {} | Active loans: {}",
            field(b, "phone", "N/A"),
            field(b, "active_loan_count", "0")
        ));
        lines.push(format!("     ID: {}", field(b, "id", "")));
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

/// Borrowers from the balance report, with a total outstanding footer
pub fn format_borrower_balance_list(borrowers: &[Value]) -> String {
    if borrowers.is_empty() {
        return "No borrowers with active loans found.".to_string();
    }

    let mut total_outstanding = Amount::ZERO;
    let mut lines = vec![
        format!("Borrowers with Active Loans ({}):", borrowers.len()),
        String::new(),
    ];

    for (i, b) in borrowers.iter().enumerate() {
        if let Some(sum) = b
            .get("remaining_balance")
            .and_then(Amount::from_value)
            .and_then(|balance| total_outstanding.checked_add(balance))
        {
            total_outstanding = sum;
        }

        lines.push(format!("  {}. {}", i + 1, field(b, "borrower_name", "Unknown")));
        lines.push(format!(
            "     Principal: {} | Paid: {} | Balance: {}",
            amount(b, "total_principal"),
            amount(b, "total_paid"),
            amount(b, "remaining_balance")
        ));
        lines.push(format!(
            "     Active loans: {}",
            field(b, "active_loan_count", "0")
        ));
        lines.push(String::new());
    }

    lines.push("---".to_string());
    lines.push(format!(
        "Total Outstanding: {}",
        total_outstanding
            .to_cents()
            .map(format_cents)
            .unwrap_or_else(|| "P0.00".to_string())
    ));
    lines.join("\n")
}

/// Confirmation after creating a borrower
pub fn format_borrower_created(borrower: &Value) -> String {
    format!(
        "Borrower created successfully.\n  Name: {}\n  Phone: {}\n  ID: {}",
        field(borrower, "name", "Unknown"),
        field(borrower, "phone", "N/A"),
        field(borrower, "id", "")
    )
}

/// Loan list, enriched with the borrower's balance row when available
///
/// `balances` is keyed by borrower id.
pub fn format_loan_list(loans: &[Value], balances: &HashMap<String, Value>) -> String {
    if loans.is_empty() {
        return "No loans found.".to_string();
    }

    let mut lines = vec![format!("Loans ({}):", loans.len()), String::new()];
    for (i, loan) in loans.iter().enumerate() {
        let borrower_id = field(loan, "borrower_id", "");
        lines.push(format!(
            "  {}. {} - {} on {} [{}]",
            i + 1,
            field(loan, "borrower_name", "Unknown"),
            amount(loan, "principal"),
            field(loan, "loan_date", "N/A"),
            field(loan, "status", "unknown")
        ));
        if let Some(balance) = balances.get(&borrower_id) {
            lines.push(format!(
                "     Borrower balance: {} | Paid: {}",
                amount(balance, "remaining_balance"),
                amount(balance, "total_paid")
            ));
        }
        lines.push(format!("     ID: {}", field(loan, "id", "")));
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

/// One loan with its borrower's totals from the balance report
pub fn format_loan_balance(loan: &Value, balance: &Value) -> String {
    let borrower_name = match field(balance, "borrower_name", "") {
        name if name.is_empty() => field(loan, "borrower_name", "Unknown"),
        name => name,
    };

    let mut lines = vec![
        format!("Loan {}", field(loan, "id", "")),
        format!("  Borrower: {}", borrower_name),
        format!("  Principal: {}", amount(loan, "principal")),
        format!("  Loan date: {}", field(loan, "loan_date", "N/A")),
        format!("  Status: {}", field(loan, "status", "unknown")),
    ];
    if let Some(day) = loan.get("interest_charge_day").filter(|v| !v.is_null()) {
        lines.push(format!("  Interest charge day: {}", text(day)));
    }

    lines.push(String::new());
    lines.push("  Borrower totals (active loans):".to_string());
    lines.push(format!("    Total paid: {}", amount(balance, "total_paid")));
    lines.push(format!(
        "    Remaining balance: {}",
        amount(balance, "remaining_balance")
    ));
    lines.push(format!(
        "    Active loans: {}",
        field(balance, "active_loan_count", "0")
    ));

    lines.join("\n")
}

/// Confirmation after creating a loan
pub fn format_loan_created(loan: &Value) -> String {
    let mut lines = vec![
        "Loan created successfully.".to_string(),
        format!("  Principal: {}", amount(loan, "principal")),
        format!("  Loan date: {}", field(loan, "loan_date", "N/A")),
        format!(
            "  Interest charge day: {}",
            field(loan, "interest_charge_day", "N/A")
        ),
        format!("  Status: {}", field(loan, "status", "active")),
    ];
    if let Some(previous) = loan.get("previous_loan_id").filter(|v| !v.is_null()) {
        lines.push(format!("  Renews loan: {}", text(previous)));
    }
    lines.push(format!("  ID: {}", field(loan, "id", "")));
    lines.join("\n")
}

/// Receipt after recording a payment
pub fn format_payment_response(payment: &Value) -> String {
    let mut lines = vec![
        "Payment recorded successfully.".to_string(),
        format!("  Date: {}", field(payment, "payment_date", "N/A")),
        format!("  Total: {}", amount(payment, "total_amount")),
    ];

    let allocations = payment
        .get("allocations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if !allocations.is_empty() {
        lines.push("  Allocations:".to_string());
        for a in allocations {
            lines.push(format!(
                "    - Loan {}: {}",
                field(a, "loan_id", "?"),
                amount(a, "amount")
            ));
        }
    }

    if let Some(notes) = payment.get("notes").and_then(Value::as_str) {
        if !notes.is_empty() {
            lines.push(format!("  Notes: {}", notes));
        }
    }
    lines.push(format!("  ID: {}", field(payment, "id", "")));
    lines.join("\n")
}
