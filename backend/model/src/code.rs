//! Goal-transaction code: `YYYY-MM-DD|accountNumber|goalNumber`.
//!
//! This is the composite identity that ties four per-fund legs together
//! into one virtual `GoalTransaction` (spec.md §3, §4.A).

use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("account number must not be empty")]
    EmptyAccountNumber,
    #[error("goal number must not be empty")]
    EmptyGoalNumber,
    #[error("malformed goal transaction code: {0:?}")]
    Malformed(String),
    #[error("invalid date in goal transaction code: {0}")]
    InvalidDate(String),
}

const SEPARATOR: char = '|';

/// `generate(date, accountNumber, goalNumber) -> code`
pub fn generate(
    date: NaiveDate,
    account_number: &str,
    goal_number: &str,
) -> Result<String, CodeError> {
    if account_number.trim().is_empty() {
        return Err(CodeError::EmptyAccountNumber);
    }
    if goal_number.trim().is_empty() {
        return Err(CodeError::EmptyGoalNumber);
    }
    Ok(format!(
        "{}{sep}{account_number}{sep}{goal_number}",
        date.format("%Y-%m-%d"),
        sep = SEPARATOR,
    ))
}

/// `parse(code) -> (date, accountNumber, goalNumber) | error`, the inverse
/// of [`generate`]. Must round-trip: `generate(parse(c)) == c`.
pub fn parse(code: &str) -> Result<(NaiveDate, String, String), CodeError> {
    let mut parts = code.splitn(3, SEPARATOR);
    let (date_part, account_part, goal_part) = match (parts.next(), parts.next(), parts.next()) {
        (Some(d), Some(a), Some(g)) if parts.next().is_none() => (d, a, g),
        _ => return Err(CodeError::Malformed(code.to_string())),
    };

    if account_part.is_empty() {
        return Err(CodeError::EmptyAccountNumber);
    }
    if goal_part.is_empty() {
        return Err(CodeError::EmptyGoalNumber);
    }

    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| CodeError::InvalidDate(date_part.to_string()))?;

    Ok((date, account_part.to_string(), goal_part.to_string()))
}

/// Groups rows by their goal-transaction code, preserving both the row
/// order within a group and the order in which groups were first seen.
pub fn group_by_code<T, F>(rows: Vec<T>, code_of: F) -> Vec<(String, Vec<T>)>
where
    F: Fn(&T) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();

    for row in rows {
        let code = code_of(&row);
        match index.get(&code) {
            Some(&pos) => groups[pos].1.push(row),
            None => {
                index.insert(code.clone(), groups.len());
                order.push(code.clone());
                groups.push((code, vec![row]));
            }
        }
    }

    groups
}
