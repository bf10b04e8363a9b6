//! Streaming CSV/Excel row parser (spec.md §4.B), shared by the fund and
//! bank ingest pipelines via the [`headers::HeaderSpec`] table each schema
//! supplies.

pub mod dates;
pub mod error;
pub mod headers;
pub mod stream;
pub mod writer;

pub use dates::parse_flexible_date;
pub use error::{ParseError, RowParseError};
pub use headers::{resolve_headers, HeaderMapping, HeaderSpec};
pub use stream::{is_supported_extension, stream_rows, ParsedRow, RowEvent};
pub use writer::write_csv;
