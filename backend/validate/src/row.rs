//! Row Validator (spec.md §4.C): field rules for the fund feed.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use model::{AccountCategory, AccountType, Config, ErrorSeverity, FundCode, Money, RowError,
    TransactionSource, TransactionType, Units};
use parser::{HeaderSpec, ParsedRow};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const FUND_HEADER_SPECS: &[HeaderSpec] = &[
    spec("transaction_date", &["transactionDate", "transaction date"], true),
    spec("client_name", &["clientName", "client name"], true),
    spec("fund_code", &["fundCode", "fund code"], true),
    spec("amount", &["amount"], true),
    spec("units", &["units"], true),
    spec("transaction_type", &["transactionType", "type", "transaction type"], true),
    spec("bid_price", &["bidPrice", "bid"], true),
    spec("offer_price", &["offerPrice", "offer"], true),
    spec("mid_price", &["midPrice", "mid"], true),
    spec("date_created", &["dateCreated", "date created"], true),
    spec("goal_title", &["goalTitle", "goal title"], true),
    spec("goal_number", &["goalNumber", "goal number"], true),
    spec("account_number", &["accountNumber", "account number"], true),
    spec("account_type", &["accountType", "account type"], true),
    spec("account_category", &["accountCategory", "account category"], true),
    spec("transaction_id", &["transactionId", "transaction id"], true),
    spec("source", &["source"], true),
    spec("sponsor_code", &["sponsorCode", "sponsor code"], false),
];

const fn spec(canonical: &'static str, aliases: &'static [&'static str], required: bool) -> HeaderSpec {
    HeaderSpec { canonical, aliases, occurrence: 1, required }
}

#[derive(Debug, Clone)]
pub struct FundRow {
    pub row_number: u64,
    pub transaction_date: NaiveDate,
    pub client_name: String,
    pub fund_code: FundCode,
    pub amount: Money,
    pub units: Units,
    pub transaction_type: TransactionType,
    pub bid: Decimal,
    pub mid: Decimal,
    pub offer: Decimal,
    pub date_created: DateTime<Utc>,
    pub goal_title: String,
    pub goal_number: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub account_category: AccountCategory,
    pub transaction_id: String,
    pub source: TransactionSource,
    pub sponsor_code: Option<String>,
}

impl FundRow {
    pub fn goal_transaction_code(&self) -> Result<String, model::CodeError> {
        model::code::generate(self.transaction_date, &self.account_number, &self.goal_number)
    }
}

pub struct RowValidationOutcome {
    pub row: Option<FundRow>,
    pub errors: Vec<RowError>,
}

impl RowValidationOutcome {
    pub fn has_critical(&self) -> bool {
        self.errors.iter().any(|e| e.severity == ErrorSeverity::Critical)
    }
}

fn get<'a>(raw: &'a ParsedRow, field: &str) -> Option<&'a str> {
    raw.fields.get(field).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn critical(row_number: u64, field: &str, code: &str, message: impl Into<String>, value: Option<&str>) -> RowError {
    RowError {
        row_number,
        field: Some(field.to_string()),
        error_code: code.to_string(),
        severity: ErrorSeverity::Critical,
        message: message.into(),
        suggested_action: None,
        value: value.map(|s| s.to_string()),
    }
}

/// Validates one parsed fund-feed row against spec.md §4.C's field rules.
/// Returns the typed row when no critical error occurred (warnings still
/// allow a row through) plus the full list of errors/warnings raised.
pub fn validate_row(raw: &ParsedRow, config: &Config, today: NaiveDate) -> RowValidationOutcome {
    let row_number = raw.row_number;
    let mut errors: Vec<RowError> = Vec::new();

    for field in required_field_names() {
        if get(raw, field).is_none() {
            errors.push(critical(
                row_number,
                field,
                "REQUIRED_FIELD_MISSING",
                format!("required field {field:?} is missing or empty"),
                None,
            ));
        }
    }

    if !errors.is_empty() {
        return RowValidationOutcome { row: None, errors };
    }

    let transaction_date = match get(raw, "transaction_date").and_then(parser::parse_flexible_date) {
        Some(d) => d,
        None => {
            errors.push(critical(row_number, "transaction_date", "INVALID_DATE_FORMAT",
                "transactionDate could not be parsed", get(raw, "transaction_date")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let date_created = match get(raw, "date_created").and_then(parser::parse_flexible_date) {
        Some(d) => d.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        None => {
            errors.push(critical(row_number, "date_created", "INVALID_DATE_FORMAT",
                "dateCreated could not be parsed", get(raw, "date_created")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let fund_code = match get(raw, "fund_code").and_then(FundCode::parse) {
        Some(f) => f,
        None => {
            errors.push(critical(row_number, "fund_code", "INVALID_FUND_CODE",
                "fundCode is not one of XUMMF/XUBF/XUDEF/XUREF", get(raw, "fund_code")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let amount_raw = get(raw, "amount").map(model::clean_numeric_literal);
    let amount = match amount_raw.as_deref().and_then(|s| Decimal::from_str(s).ok()) {
        Some(d) => Money::new(d),
        None => {
            errors.push(critical(row_number, "amount", "INVALID_NUMERIC_VALUE",
                "amount is not a valid number", get(raw, "amount")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let units_raw = get(raw, "units").map(model::clean_numeric_literal);
    let units = match units_raw.as_deref().and_then(|s| Decimal::from_str(s).ok()) {
        Some(d) => Units::new(d),
        None => {
            errors.push(critical(row_number, "units", "INVALID_NUMERIC_VALUE",
                "units is not a valid number", get(raw, "units")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let bid = parse_price(raw, "bid_price", row_number, &mut errors);
    let mid = parse_price(raw, "mid_price", row_number, &mut errors);
    let offer = parse_price(raw, "offer_price", row_number, &mut errors);

    let transaction_type = match parse_transaction_type(get(raw, "transaction_type")) {
        Some(t) => t,
        None => {
            errors.push(critical(row_number, "transaction_type", "INVALID_TRANSACTION_TYPE",
                "transactionType is not deposit/withdrawal/redemption", get(raw, "transaction_type")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let source = match get(raw, "source").and_then(TransactionSource::parse) {
        Some(s) => s,
        None => {
            errors.push(critical(row_number, "source", "INVALID_SOURCE",
                "source is not in the enumerated channel set", get(raw, "source")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let account_type = match parse_account_type(get(raw, "account_type")) {
        Some(t) => t,
        None => {
            errors.push(critical(row_number, "account_type", "INVALID_ACCOUNT_TYPE",
                "accountType is not personal/pooled/joint/linked", get(raw, "account_type")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    let account_category = match parse_account_category(get(raw, "account_category")) {
        Some(c) => c,
        None => {
            errors.push(critical(row_number, "account_category", "INVALID_ACCOUNT_CATEGORY",
                "accountCategory is not recognised", get(raw, "account_category")));
            return RowValidationOutcome { row: None, errors };
        }
    };

    if let (Some(bid), Some(mid), Some(offer)) = (bid, mid, offer) {
        if !(bid <= mid && mid <= offer) {
            errors.push(critical(row_number, "bid_price", "PRICE_ORDER_INVALID",
                format!("expected bid <= mid <= offer, got {bid} / {mid} / {offer}"), None));
        }
    }

    let abs_amount = amount.raw().abs();
    if abs_amount < config.validation.amount_min || abs_amount > config.validation.amount_max {
        errors.push(critical(row_number, "amount", "AMOUNT_OUT_OF_RANGE",
            format!("abs(amount)={abs_amount} outside [{}, {}]",
                config.validation.amount_min, config.validation.amount_max),
            amount_raw.as_deref()));
    }

    if transaction_date > today {
        errors.push(critical(row_number, "transaction_date", "DATE_IN_FUTURE",
            "transactionDate is in the future", get(raw, "transaction_date")));
    } else {
        let floor = today
            .with_year(today.year() - config.validation.max_transaction_age_years)
            .unwrap_or(today);
        if transaction_date < floor {
            errors.push(critical(row_number, "transaction_date", "DATE_TOO_OLD",
                format!("transactionDate older than {} years", config.validation.max_transaction_age_years),
                get(raw, "transaction_date")));
        }
    }

    if transaction_type == TransactionType::Deposit {
        if let Some(offer) = offer {
            if let Some(expected) = amount.implied_units(offer) {
                let tolerance = config.validation.unit_identity_tolerance_fraction * abs_amount;
                let diff = (units.raw() * offer - amount.raw()).abs();
                if diff > tolerance {
                    errors.push(critical(row_number, "units", "UNIT_PRICE_MISMATCH",
                        format!("|units*offer - amount| = {diff} exceeds tolerance {tolerance}"),
                        units_raw.as_deref()));
                }
                let _ = expected; // documented relation; diff check above is the authoritative form
            }
        }
    }

    if !errors.iter().any(|e| e.severity == ErrorSeverity::Critical) {
        let row = FundRow {
            row_number,
            transaction_date,
            client_name: get(raw, "client_name").unwrap().to_string(),
            fund_code,
            amount,
            units,
            transaction_type,
            bid: bid.unwrap_or_default(),
            mid: mid.unwrap_or_default(),
            offer: offer.unwrap_or_default(),
            date_created,
            goal_title: get(raw, "goal_title").unwrap().to_string(),
            goal_number: get(raw, "goal_number").unwrap().to_string(),
            account_number: get(raw, "account_number").unwrap().to_string(),
            account_type,
            account_category,
            transaction_id: get(raw, "transaction_id").unwrap().to_string(),
            source,
            sponsor_code: get(raw, "sponsor_code").map(|s| s.to_string()),
        };
        RowValidationOutcome { row: Some(row), errors }
    } else {
        RowValidationOutcome { row: None, errors }
    }
}

fn parse_price(raw: &ParsedRow, field: &str, row_number: u64, errors: &mut Vec<RowError>) -> Option<Decimal> {
    let cleaned = get(raw, field).map(model::clean_numeric_literal);
    match cleaned.as_deref().and_then(|s| Decimal::from_str(s).ok()) {
        Some(d) => Some(d),
        None => {
            errors.push(critical(row_number, field, "INVALID_NUMERIC_VALUE",
                format!("{field} is not a valid number"), get(raw, field)));
            None
        }
    }
}

fn required_field_names() -> &'static [&'static str] {
    &[
        "transaction_date", "client_name", "fund_code", "amount", "units", "transaction_type",
        "bid_price", "mid_price", "offer_price", "date_created", "goal_title", "goal_number",
        "account_number", "account_type", "account_category", "transaction_id", "source",
    ]
}

fn parse_transaction_type(raw: Option<&str>) -> Option<TransactionType> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "deposit" => Some(TransactionType::Deposit),
        "withdrawal" => Some(TransactionType::Withdrawal),
        "redemption" => Some(TransactionType::Redemption),
        _ => None,
    }
}

fn parse_account_type(raw: Option<&str>) -> Option<AccountType> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "personal" => Some(AccountType::Personal),
        "pooled" => Some(AccountType::Pooled),
        "joint" => Some(AccountType::Joint),
        "linked" => Some(AccountType::Linked),
        _ => None,
    }
}

fn parse_account_category(raw: Option<&str>) -> Option<AccountCategory> {
    match raw?.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
        "general" => Some(AccountCategory::General),
        "family" => Some(AccountCategory::Family),
        "investment_clubs" => Some(AccountCategory::InvestmentClubs),
        "retirements_benefit_scheme" => Some(AccountCategory::RetirementsBenefitScheme),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_fields() -> HashMap<&'static str, String> {
        let mut f = HashMap::new();
        f.insert("transaction_date", "2025-01-02".to_string());
        f.insert("client_name", "Jane Doe".to_string());
        f.insert("fund_code", "XUMMF".to_string());
        f.insert("amount", "36085".to_string());
        f.insert("units", "2886.80".to_string());
        f.insert("transaction_type", "deposit".to_string());
        f.insert("bid_price", "12.48".to_string());
        f.insert("mid_price", "12.49".to_string());
        f.insert("offer_price", "12.50".to_string());
        f.insert("date_created", "2025-01-02".to_string());
        f.insert("goal_title", "School Fees".to_string());
        f.insert("goal_number", "701-8076522785a".to_string());
        f.insert("account_number", "701-807".to_string());
        f.insert("account_type", "personal".to_string());
        f.insert("account_category", "general".to_string());
        f.insert("transaction_id", "S19292983/02-01-2025/1".to_string());
        f.insert("source", "BANK".to_string());
        f
    }

    fn row(fields: HashMap<&'static str, String>) -> ParsedRow {
        ParsedRow { row_number: 2, fields }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn valid_row_passes_with_no_errors() {
        let outcome = validate_row(&row(base_fields()), &Config::default(), today());
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(outcome.row.is_some());
    }

    #[test]
    fn missing_required_field_is_critical() {
        let mut fields = base_fields();
        fields.remove("client_name");
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(outcome.has_critical());
        assert!(outcome.row.is_none());
        assert!(outcome.errors.iter().any(|e| e.error_code == "REQUIRED_FIELD_MISSING"));
    }

    #[test]
    fn amount_below_minimum_is_rejected() {
        let mut fields = base_fields();
        fields.insert("amount", "999.99".to_string());
        fields.insert("units", "80.07".to_string());
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(outcome.errors.iter().any(|e| e.error_code == "AMOUNT_OUT_OF_RANGE"));
    }

    #[test]
    fn amount_at_minimum_is_accepted() {
        let mut fields = base_fields();
        fields.insert("amount", "1000.00".to_string());
        fields.insert("units", "80.08".to_string());
        fields.insert("offer_price", "12.50".to_string());
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(!outcome.errors.iter().any(|e| e.error_code == "AMOUNT_OUT_OF_RANGE"));
    }

    #[test]
    fn future_transaction_date_is_rejected() {
        let mut fields = base_fields();
        fields.insert("transaction_date", "2025-12-31".to_string());
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(outcome.errors.iter().any(|e| e.error_code == "DATE_IN_FUTURE"));
    }

    #[test]
    fn price_order_violation_is_critical() {
        let mut fields = base_fields();
        fields.insert("bid_price", "13.00".to_string());
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(outcome.errors.iter().any(|e| e.error_code == "PRICE_ORDER_INVALID"));
    }

    #[test]
    fn unit_price_mismatch_on_deposit_is_critical() {
        let mut fields = base_fields();
        fields.insert("units", "1.0000".to_string());
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(outcome.errors.iter().any(|e| e.error_code == "UNIT_PRICE_MISMATCH"));
    }

    #[test]
    fn currency_formatted_amount_is_tolerated() {
        let mut fields = base_fields();
        fields.insert("amount", "KES 36,085.00".to_string());
        let outcome = validate_row(&row(fields), &Config::default(), today());
        assert!(outcome.row.is_some(), "{:?}", outcome.errors);
    }
}
