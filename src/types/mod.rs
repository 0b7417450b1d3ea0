pub mod domain;
pub mod envelope;
pub mod reports;
pub mod requests;
pub mod sync;
