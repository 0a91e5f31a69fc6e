// Medallion pipeline: bronze ingestion, silver processing, and batch orchestration

pub mod ingestion;
pub mod orchestrator;
pub mod processing;

pub use orchestrator::{BatchOrchestrator, BatchReport};
