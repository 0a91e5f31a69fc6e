// Bronze ingestion: flat-file extraction and per-table loading

pub mod extract;
pub mod loader;

pub use loader::{run_isolated, LoadOutcome, TableLoadReport, TableLoader};
