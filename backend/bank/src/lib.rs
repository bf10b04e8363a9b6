//! Bank statement ingest pipeline (spec.md §4.K): mirrors the fund
//! pipeline's row validation shape over the duplicate percentage/amount
//! header schema, then best-effort links each row to the client/account/
//! goal master tables.

pub mod error;
pub mod linker;
pub mod pg;
pub mod repository;
pub mod row;

pub use error::BankError;
pub use linker::{link_row, MasterLookup};
pub use pg::PgBankRepository;
pub use repository::BankRepository;
pub use row::{validate_bank_row, BankRow, BANK_HEADER_SPECS};
