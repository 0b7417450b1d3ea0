pub mod config;
pub mod error;
pub mod format;
pub mod service;
pub mod router;
pub mod middleware;
pub mod handlers;
pub mod db;
pub mod types;

pub use error::LedgerError;
pub use router::{LedgerState, ledger_router};
