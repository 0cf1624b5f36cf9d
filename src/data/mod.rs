//! Data loading and core structures
//!
//! Transaction ingestion from CSV with tolerant column resolution, plus the
//! feature matrix used by the model layer.

mod dataset;
pub mod schema;
mod table;

pub use dataset::{Dataset, Split};
pub use schema::{find_column, require_column, Column};
pub use table::{Transaction, TransactionTable};
