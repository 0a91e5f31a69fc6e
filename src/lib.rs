pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod storage;
