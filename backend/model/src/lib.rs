//! Domain types shared across the reconciliation engine: money arithmetic,
//! the goal-transaction code, and the persisted entity shapes of spec.md §3.

pub mod code;
pub mod config;
pub mod money;
pub mod types;

pub use code::{group_by_code, CodeError};
pub use config::Config;
pub use money::{clean_numeric_literal, Money, Percent, Units};
pub use types::*;
