//! Bank statement row validation (spec.md §4.K): mirrors the fund row
//! validator, but each row carries one percentage AND one amount column
//! per fund, under the duplicated header run resolved via
//! [`parser::HeaderSpec::occurrence`].

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use model::{ErrorSeverity, FundCode, Money, Percent, RowError, TransactionType};
use parser::{HeaderSpec, ParsedRow};
use rust_decimal::Decimal;

pub const BANK_HEADER_SPECS: &[HeaderSpec] = &[
    spec("transaction_date", &["transactionDate", "transaction date", "date"], 1, true),
    spec("transaction_id", &["transactionId", "transaction id"], 1, true),
    spec("goal_number", &["goalNumber", "goal number"], 1, true),
    spec("account_number", &["accountNumber", "account number"], 1, true),
    spec("client_name", &["clientName", "client name"], 1, true),
    spec("transaction_type", &["transactionType", "type"], 1, true),
    spec("total_amount", &["totalAmount", "amount", "total amount"], 1, true),
    spec("xummf_pct", &["XUMMF"], 1, true),
    spec("xubf_pct", &["XUBF"], 1, true),
    spec("xudef_pct", &["XUDEF"], 1, true),
    spec("xuref_pct", &["XUREF"], 1, true),
    spec("xummf_amt", &["XUMMF"], 2, true),
    spec("xubf_amt", &["XUBF"], 2, true),
    spec("xudef_amt", &["XUDEF"], 2, true),
    spec("xuref_amt", &["XUREF"], 2, true),
];

const fn spec(canonical: &'static str, aliases: &'static [&'static str], occurrence: usize, required: bool) -> HeaderSpec {
    HeaderSpec { canonical, aliases, occurrence, required }
}

#[derive(Debug, Clone)]
pub struct BankRow {
    pub row_number: u64,
    pub transaction_date: NaiveDate,
    pub transaction_id: String,
    pub goal_number: String,
    pub account_number: String,
    pub client_name: String,
    pub transaction_type: TransactionType,
    pub total_amount: Money,
    pub fund_percentages: HashMap<FundCode, Percent>,
    pub fund_amounts: HashMap<FundCode, Money>,
}

fn get<'a>(raw: &'a ParsedRow, field: &str) -> Option<&'a str> {
    raw.fields.get(field).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn critical(row_number: u64, field: &str, code: &str, message: impl Into<String>) -> RowError {
    RowError {
        row_number,
        field: Some(field.to_string()),
        error_code: code.to_string(),
        severity: ErrorSeverity::Critical,
        message: message.into(),
        suggested_action: None,
        value: None,
    }
}

pub fn validate_bank_row(raw: &ParsedRow) -> (Option<BankRow>, Vec<RowError>) {
    let row_number = raw.row_number;
    let mut errors = Vec::new();

    macro_rules! require {
        ($field:expr) => {
            match get(raw, $field) {
                Some(v) => v,
                None => {
                    errors.push(critical(row_number, $field, "REQUIRED_FIELD_MISSING",
                        format!("required field {:?} is missing or empty", $field)));
                    return (None, errors);
                }
            }
        };
    }

    let transaction_date = match parser::parse_flexible_date(require!("transaction_date")) {
        Some(d) => d,
        None => {
            errors.push(critical(row_number, "transaction_date", "INVALID_DATE_FORMAT", "transactionDate could not be parsed"));
            return (None, errors);
        }
    };

    let transaction_id = require!("transaction_id").to_string();
    let goal_number = require!("goal_number").to_string();
    let account_number = require!("account_number").to_string();
    let client_name = require!("client_name").to_string();

    let transaction_type = match require!("transaction_type").trim().to_ascii_lowercase().as_str() {
        "deposit" => TransactionType::Deposit,
        "withdrawal" => TransactionType::Withdrawal,
        "redemption" => TransactionType::Redemption,
        _ => {
            errors.push(critical(row_number, "transaction_type", "INVALID_TRANSACTION_TYPE", "transactionType is not deposit/withdrawal/redemption"));
            return (None, errors);
        }
    };

    let total_amount = match parse_money(raw, "total_amount") {
        Some(m) => m,
        None => {
            errors.push(critical(row_number, "total_amount", "INVALID_NUMERIC_VALUE", "totalAmount is not a valid number"));
            return (None, errors);
        }
    };

    let mut fund_percentages = HashMap::new();
    let mut fund_amounts = HashMap::new();
    for (code, pct_field, amt_field) in [
        (FundCode::Xummf, "xummf_pct", "xummf_amt"),
        (FundCode::Xubf, "xubf_pct", "xubf_amt"),
        (FundCode::Xudef, "xudef_pct", "xudef_amt"),
        (FundCode::Xuref, "xuref_pct", "xuref_amt"),
    ] {
        let pct = match parse_percent(raw, pct_field) {
            Some(p) => p,
            None => {
                errors.push(critical(row_number, pct_field, "INVALID_NUMERIC_VALUE", format!("{pct_field} is not a valid percentage")));
                return (None, errors);
            }
        };
        let amt = match parse_money(raw, amt_field) {
            Some(m) => m,
            None => {
                errors.push(critical(row_number, amt_field, "INVALID_NUMERIC_VALUE", format!("{amt_field} is not a valid amount")));
                return (None, errors);
            }
        };
        fund_percentages.insert(code, pct);
        fund_amounts.insert(code, amt);
    }

    let row = BankRow {
        row_number,
        transaction_date,
        transaction_id,
        goal_number,
        account_number,
        client_name,
        transaction_type,
        total_amount,
        fund_percentages,
        fund_amounts,
    };

    if !row.fund_amounts_sum_to_total_within_rounding() {
        errors.push(critical(row_number, "total_amount", "BANK_AMOUNT_SUM_MISMATCH",
            "sum of per-fund amounts does not match totalAmount within rounding"));
    }
    if !row.percentages_sum_valid() {
        errors.push(critical(row_number, "total_amount", "BANK_PERCENTAGE_SUM_INVALID",
            "fund percentages do not sum to 1.00 within tolerance"));
    }

    if errors.iter().any(|e| e.severity == ErrorSeverity::Critical) {
        (None, errors)
    } else {
        (Some(row), errors)
    }
}

impl BankRow {
    pub fn fund_amounts_sum_to_total_within_rounding(&self) -> bool {
        let sum: Decimal = self.fund_amounts.values().map(|m| m.raw()).sum();
        (sum - self.total_amount.raw()).abs() <= Decimal::ONE
    }

    pub fn percentages_sum_valid(&self) -> bool {
        let any_nonzero = self.fund_percentages.values().any(|p| !p.value().is_zero());
        if !any_nonzero {
            return true;
        }
        let sum: Decimal = self.fund_percentages.values().map(|p| p.value()).sum();
        (sum - Decimal::ONE).abs() <= Decimal::new(1, 2)
    }
}

fn parse_money(raw: &ParsedRow, field: &str) -> Option<Money> {
    let cleaned = get(raw, field).map(model::clean_numeric_literal)?;
    Decimal::from_str(&cleaned).ok().map(Money::new)
}

fn parse_percent(raw: &ParsedRow, field: &str) -> Option<Percent> {
    let cleaned = get(raw, field).map(model::clean_numeric_literal)?;
    Decimal::from_str(&cleaned).ok().map(Percent::from_whole_or_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(overrides: &[(&str, &str)]) -> HashMap<&'static str, String> {
        let mut f: HashMap<&'static str, String> = HashMap::new();
        f.insert("transaction_date", "2025-01-02".to_string());
        f.insert("transaction_id", "S19292983/02-01-2025/1".to_string());
        f.insert("goal_number", "701-8076522785a".to_string());
        f.insert("account_number", "701-807".to_string());
        f.insert("client_name", "Jane Doe".to_string());
        f.insert("transaction_type", "deposit".to_string());
        f.insert("total_amount", "100.00".to_string());
        f.insert("xummf_pct", "80".to_string());
        f.insert("xubf_pct", "20".to_string());
        f.insert("xudef_pct", "0".to_string());
        f.insert("xuref_pct", "0".to_string());
        f.insert("xummf_amt", "80.00".to_string());
        f.insert("xubf_amt", "20.00".to_string());
        f.insert("xudef_amt", "0".to_string());
        f.insert("xuref_amt", "0".to_string());
        for (k, v) in overrides {
            f.insert(k, v.to_string());
        }
        f
    }

    fn row(fields: HashMap<&'static str, String>) -> ParsedRow {
        ParsedRow { row_number: 2, fields }
    }

    #[test]
    fn consistent_row_validates() {
        let (parsed, errors) = validate_bank_row(&row(fields(&[])));
        assert!(errors.is_empty(), "{errors:?}");
        assert!(parsed.is_some());
    }

    #[test]
    fn amount_sum_mismatch_is_critical() {
        let (parsed, errors) = validate_bank_row(&row(fields(&[("xummf_amt", "50.00")])));
        assert!(parsed.is_none());
        assert!(errors.iter().any(|e| e.error_code == "BANK_AMOUNT_SUM_MISMATCH"));
    }

    #[test]
    fn percentage_sum_invalid_is_critical() {
        let (parsed, errors) = validate_bank_row(&row(fields(&[("xummf_pct", "50")])));
        assert!(parsed.is_none());
        assert!(errors.iter().any(|e| e.error_code == "BANK_PERCENTAGE_SUM_INVALID"));
    }

    #[test]
    fn zero_total_row_skips_percentage_check() {
        let (parsed, errors) = validate_bank_row(&row(fields(&[
            ("total_amount", "0"), ("xummf_pct", "0"), ("xubf_pct", "0"),
            ("xummf_amt", "0"), ("xubf_amt", "0"),
        ])));
        assert!(parsed.is_some(), "{errors:?}");
    }
}
