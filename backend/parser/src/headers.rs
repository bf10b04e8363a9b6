//! Header-alias resolution: case-insensitive, whitespace-tolerant, with
//! support for the bank feed's duplicate fund-code header run (percentages
//! then amounts — spec.md §6 requires the second occurrence be kept as the
//! amount column).

use std::collections::HashMap;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy)]
pub struct HeaderSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    /// Which occurrence (1-based) of a matching alias this spec binds to.
    /// Almost always `1`; the bank schema uses `2` for the amount columns
    /// that share a header name with the percentage columns.
    pub occurrence: usize,
    pub required: bool,
}

pub struct HeaderMapping {
    /// canonical name -> raw column index
    columns: HashMap<&'static str, usize>,
}

impl HeaderMapping {
    pub fn column_of(&self, canonical: &str) -> Option<usize> {
        self.columns.get(canonical).copied()
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn resolve_headers(
    raw_headers: &[String],
    specs: &[HeaderSpec],
) -> Result<HeaderMapping, ParseError> {
    if raw_headers.is_empty() {
        return Err(ParseError::NoHeaderRow);
    }

    let normalized: Vec<String> = raw_headers.iter().map(|h| normalize(h)).collect();

    // For every (spec, alias) pair, count how many times we've seen that
    // alias text while scanning columns left to right, and bind the spec
    // to the column where the running count hits its configured occurrence.
    let mut seen_counts: HashMap<(usize, &'static str), usize> = HashMap::new();
    let mut columns: HashMap<&'static str, usize> = HashMap::new();

    for (col_idx, header) in normalized.iter().enumerate() {
        for (spec_idx, spec) in specs.iter().enumerate() {
            if columns.contains_key(spec.canonical) {
                continue;
            }
            let matches = spec.aliases.iter().any(|alias| normalize(alias) == *header);
            if !matches {
                continue;
            }
            for alias in spec.aliases {
                let key = (spec_idx, *alias);
                if normalize(alias) == *header {
                    let count = seen_counts.entry(key).or_insert(0);
                    *count += 1;
                    if *count == spec.occurrence {
                        columns.insert(spec.canonical, col_idx);
                    }
                    break;
                }
            }
        }
    }

    for spec in specs {
        if spec.required && !columns.contains_key(spec.canonical) {
            return Err(ParseError::MissingRequiredColumn(spec.canonical));
        }
    }

    Ok(HeaderMapping { columns })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[HeaderSpec] = &[
        HeaderSpec {
            canonical: "date",
            aliases: &["Date", "transactionDate"],
            occurrence: 1,
            required: true,
        },
        HeaderSpec {
            canonical: "xummf_pct",
            aliases: &["XUMMF"],
            occurrence: 1,
            required: true,
        },
        HeaderSpec {
            canonical: "xummf_amt",
            aliases: &["XUMMF"],
            occurrence: 2,
            required: true,
        },
    ];

    #[test]
    fn resolves_case_and_whitespace_insensitively() {
        let headers = vec!["  date ".to_string(), "XUMMF".to_string(), "XUMMF".to_string()];
        let mapping = resolve_headers(&headers, SPECS).unwrap();
        assert_eq!(mapping.column_of("date"), Some(0));
        assert_eq!(mapping.column_of("xummf_pct"), Some(1));
        assert_eq!(mapping.column_of("xummf_amt"), Some(2));
    }

    #[test]
    fn missing_required_column_errors() {
        let headers = vec!["Date".to_string()];
        let err = resolve_headers(&headers, SPECS).unwrap_err();
        assert!(matches!(err, ParseError::MissingRequiredColumn("xummf_pct")));
    }

    #[test]
    fn empty_header_row_errors() {
        let err = resolve_headers(&[], SPECS).unwrap_err();
        assert!(matches!(err, ParseError::NoHeaderRow));
    }
}
