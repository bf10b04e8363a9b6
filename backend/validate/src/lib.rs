//! Row and group validation (spec.md §4.C, §4.D). [`row::validate_row`]
//! turns a parsed CSV/Excel row into a typed [`row::FundRow`] or a list of
//! [`model::RowError`]s; [`group::validate_group`] then checks the
//! invariants that only hold across a whole goalTransactionCode group.

pub mod error;
pub mod group;
pub mod row;

pub use error::ValidationError;
pub use group::validate_group;
pub use row::{validate_row, FundRow, RowValidationOutcome, FUND_HEADER_SPECS};

use model::{Config, Goal, RowError};
use std::collections::HashMap;
use tracing::info;

/// Runs the full row+group pipeline over one batch's parsed rows, returning
/// every row that passed (critical-error-free) and the combined error list.
pub fn validate_batch(
    parsed_rows: Vec<parser::ParsedRow>,
    config: &Config,
    today: chrono::NaiveDate,
    existing_goals: &HashMap<String, Goal>,
) -> (Vec<FundRow>, Vec<RowError>) {
    let total_rows = parsed_rows.len();
    let mut errors = Vec::new();
    let mut valid_rows = Vec::new();

    for raw in &parsed_rows {
        let outcome = validate_row(raw, config, today);
        errors.extend(outcome.errors);
        if let Some(row) = outcome.row {
            valid_rows.push(row);
        }
    }

    let groups = model::group_by_code(valid_rows, |row| {
        row.goal_transaction_code().unwrap_or_else(|_| format!("invalid:{}", row.row_number))
    });

    let mut accepted_rows = Vec::new();
    for (code, rows) in groups {
        let goal_key = rows.first().map(|r| format!("{}|{}", r.account_number, r.goal_number));
        let existing_goal = goal_key.and_then(|k| existing_goals.get(&k));
        let group_errors = validate_group(&code, &rows, existing_goal, config);
        let has_critical = group_errors.iter().any(|e| e.severity == model::ErrorSeverity::Critical);
        errors.extend(group_errors);
        if !has_critical {
            accepted_rows.extend(rows);
        }
    }

    info!(
        total_rows,
        accepted = accepted_rows.len(),
        rejected = errors.len(),
        "batch validation complete"
    );
    (accepted_rows, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn fields(overrides: &[(&str, &str)]) -> Map<&'static str, String> {
        let mut f: Map<&'static str, String> = Map::new();
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
        for (k, v) in overrides {
            f.insert(k, v.to_string());
        }
        f
    }

    #[test]
    fn batch_accepts_a_consistent_group_and_surfaces_size_warning() {
        let rows = vec![parser::ParsedRow { row_number: 2, fields: fields(&[]) }];
        let config = Config::default();
        let today = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let (accepted, errors) = validate_batch(rows, &config, today, &Map::new());
        assert_eq!(accepted.len(), 1);
        assert!(errors.iter().any(|e| e.error_code == "GOAL_TRANSACTION_GROUP_SIZE"));
    }

    #[test]
    fn batch_rejects_a_row_with_a_missing_required_field() {
        let mut bad_fields = fields(&[]);
        bad_fields.remove("account_number");
        let rows = vec![parser::ParsedRow { row_number: 2, fields: bad_fields }];
        let config = Config::default();
        let today = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let (accepted, errors) = validate_batch(rows, &config, today, &Map::new());
        assert!(accepted.is_empty());
        assert!(errors.iter().any(|e| e.error_code == "REQUIRED_FIELD_MISSING"));
    }
}
