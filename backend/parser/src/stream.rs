//! Row-by-row streaming over CSV and Excel sources into a bounded channel,
//! so a slow consumer back-pressures the producer instead of the whole
//! file being buffered in memory (spec.md §4.B, §9).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Reader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{ParseError, RowParseError};
use crate::headers::{resolve_headers, HeaderMapping, HeaderSpec};

/// One successfully parsed row: canonical column name -> raw cell text.
/// `row_number` is 1-based with the header counted as row 1, per spec.md
/// §4.B ("header is row 1").
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub row_number: u64,
    pub fields: HashMap<&'static str, String>,
}

#[derive(Debug)]
pub enum RowEvent {
    Row(ParsedRow),
    Error(RowParseError),
}

const CHANNEL_CAPACITY: usize = 256;

/// Spawns a blocking producer task that streams `path` and sends
/// [`RowEvent`]s on the returned channel. The caller drives the consumer
/// side; dropping the receiver stops the producer within one row.
pub fn stream_rows(
    path: PathBuf,
    specs: &'static [HeaderSpec],
) -> Result<mpsc::Receiver<RowEvent>, ParseError> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => {
            info!(path = %path.display(), "streaming csv source");
            tokio::task::spawn_blocking(move || stream_csv(path, specs, tx));
        }
        "xlsx" | "xls" | "xlsm" => {
            info!(path = %path.display(), "streaming excel source");
            tokio::task::spawn_blocking(move || stream_excel(path, specs, tx));
        }
        other => {
            warn!(path = %path.display(), extension = other, "unsupported source extension");
            return Err(ParseError::UnsupportedExtension(other.to_string()));
        }
    }

    Ok(rx)
}

fn stream_csv(path: PathBuf, specs: &'static [HeaderSpec], tx: mpsc::Sender<RowEvent>) {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&path)
    {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 0,
                message: format!("unreadable file {}: {e}", path.display()),
            }));
            return;
        }
    };

    let mut records = reader.records();
    let header_record = match records.next() {
        Some(Ok(r)) => r,
        Some(Err(e)) => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 1,
                message: format!("malformed header row: {e}"),
            }));
            return;
        }
        None => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 0,
                message: "no header row present".to_string(),
            }));
            return;
        }
    };

    let raw_headers: Vec<String> = header_record.iter().map(|s| s.to_string()).collect();
    let mapping = match resolve_headers(&raw_headers, specs) {
        Ok(m) => m,
        Err(e) => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 1,
                message: e.to_string(),
            }));
            return;
        }
    };

    let mut row_number: u64 = 1;
    let mut any_data_row = false;
    for record in records {
        row_number += 1;
        match record {
            Ok(record) => {
                any_data_row = true;
                let fields = extract_fields(&mapping, specs, |idx| record.get(idx));
                if tx.blocking_send(RowEvent::Row(ParsedRow { row_number, fields })).is_err() {
                    return;
                }
            }
            Err(e) => {
                if tx
                    .blocking_send(RowEvent::Error(RowParseError {
                        row_number,
                        message: format!("malformed row: {e}"),
                    }))
                    .is_err()
                {
                    return;
                }
            }
        }
    }

    if !any_data_row {
        let _ = tx.blocking_send(RowEvent::Error(RowParseError {
            row_number: 1,
            message: "no data rows present".to_string(),
        }));
    }
}

/// calamine has no row-streaming reader (the workbook's zip/XML format
/// forces loading a sheet's `Range` up front); this stays within the same
/// producer/consumer channel API so callers see identical back-pressure
/// semantics, but memory use is bounded per-sheet rather than per-row.
fn stream_excel(path: PathBuf, specs: &'static [HeaderSpec], tx: mpsc::Sender<RowEvent>) {
    let mut workbook = match open_workbook_auto(&path) {
        Ok(wb) => wb,
        Err(e) => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 0,
                message: format!("unreadable file {}: {e}", path.display()),
            }));
            return;
        }
    };

    let sheet_name = match workbook.sheet_names().first().cloned() {
        Some(name) => name,
        None => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 0,
                message: "workbook has no sheets".to_string(),
            }));
            return;
        }
    };

    let range = match workbook.worksheet_range(&sheet_name) {
        Ok(range) => range,
        Err(e) => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 0,
                message: format!("unreadable worksheet {sheet_name}: {e}"),
            }));
            return;
        }
    };

    let mut rows = range.rows();
    let header_row = match rows.next() {
        Some(row) => row,
        None => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 0,
                message: "no header row present".to_string(),
            }));
            return;
        }
    };

    let raw_headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    let mapping = match resolve_headers(&raw_headers, specs) {
        Ok(m) => m,
        Err(e) => {
            let _ = tx.blocking_send(RowEvent::Error(RowParseError {
                row_number: 1,
                message: e.to_string(),
            }));
            return;
        }
    };

    let mut row_number: u64 = 1;
    let mut any_data_row = false;
    for row in rows {
        row_number += 1;
        any_data_row = true;
        let fields = extract_fields(&mapping, specs, |idx| row.get(idx).map(|c| c.to_string()));
        if tx.blocking_send(RowEvent::Row(ParsedRow { row_number, fields })).is_err() {
            return;
        }
    }

    if !any_data_row {
        let _ = tx.blocking_send(RowEvent::Error(RowParseError {
            row_number: 1,
            message: "no data rows present".to_string(),
        }));
    }
}

fn extract_fields<F>(
    mapping: &HeaderMapping,
    specs: &'static [HeaderSpec],
    cell_at: F,
) -> HashMap<&'static str, String>
where
    F: Fn(usize) -> Option<String>,
{
    let mut fields = HashMap::new();
    for spec in specs {
        if let Some(idx) = mapping.column_of(spec.canonical) {
            if let Some(value) = cell_at(idx) {
                fields.insert(spec.canonical, value);
            }
        }
    }
    fields
}

pub fn is_supported_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|s| s.to_ascii_lowercase()).as_deref(),
        Some("csv") | Some("xlsx") | Some("xls") | Some("xlsm")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPECS: &[HeaderSpec] = &[
        HeaderSpec {
            canonical: "date",
            aliases: &["transactionDate", "Date"],
            occurrence: 1,
            required: true,
        },
        HeaderSpec {
            canonical: "amount",
            aliases: &["amount", "Amount"],
            occurrence: 1,
            required: true,
        },
    ];

    #[tokio::test]
    async fn streams_csv_rows_with_one_based_row_numbers() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "transactionDate,amount").unwrap();
        writeln!(file, "2025-01-02,100.00").unwrap();
        writeln!(file, "2025-01-03,200.00").unwrap();
        file.flush().unwrap();

        let mut rx = stream_rows(file.path().to_path_buf(), SPECS).unwrap();
        let mut rows = Vec::new();
        while let Some(event) = rx.recv().await {
            if let RowEvent::Row(row) = event {
                rows.push(row);
            }
        }
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].fields.get("amount").unwrap(), "100.00");
        assert_eq!(rows[1].row_number, 3);
    }

    #[tokio::test]
    async fn ragged_row_still_parses_the_columns_present() {
        // `flexible(true)` means a short/long row isn't a syntax error —
        // missing required fields are the row validator's job (spec.md
        // §4.C), not the streaming parser's.
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "transactionDate,amount").unwrap();
        writeln!(file, "2025-01-02,100.00,extra,columns,here").unwrap();
        writeln!(file, "2025-01-03,200.00").unwrap();
        file.flush().unwrap();

        let mut rx = stream_rows(file.path().to_path_buf(), SPECS).unwrap();
        let mut rows = Vec::new();
        while let Some(event) = rx.recv().await {
            if let RowEvent::Row(row) = event {
                rows.push(row);
            }
        }
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].row_number, 3);
    }

    #[tokio::test]
    async fn malformed_row_emits_error_and_parsing_continues() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "transactionDate,amount").unwrap();
        writeln!(file, "2025-01-02,100.00").unwrap();
        writeln!(file, "2025-01-03,\"200.00").unwrap(); // unterminated quote runs to EOF
        file.flush().unwrap();

        let mut rx = stream_rows(file.path().to_path_buf(), SPECS).unwrap();
        let mut rows = Vec::new();
        let mut errors = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                RowEvent::Row(row) => rows.push(row),
                RowEvent::Error(e) => errors.push(e),
            }
        }
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_number, 3);
    }

    #[tokio::test]
    async fn empty_file_reports_no_data_rows() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "transactionDate,amount").unwrap();
        file.flush().unwrap();

        let mut rx = stream_rows(file.path().to_path_buf(), SPECS).unwrap();
        let mut errors = Vec::new();
        while let Some(event) = rx.recv().await {
            if let RowEvent::Error(e) = event {
                errors.push(e);
            }
        }
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("no data rows"));
    }
}
