use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unreadable file: {0}")]
    UnreadableFile(String),
    #[error("no header row present")]
    NoHeaderRow,
    #[error("no data rows present")]
    NoDataRows,
    #[error("required column {0:?} not found (and no alias matched)")]
    MissingRequiredColumn(&'static str),
    #[error("unsupported file extension: {0:?}")]
    UnsupportedExtension(String),
}

/// A single malformed row: parsing continues past it (spec.md §4.B).
#[derive(Debug, Clone)]
pub struct RowParseError {
    pub row_number: u64,
    pub message: String,
}
