pub mod balance;
pub mod currency_converter;
pub mod fx_provider;
pub mod password;
pub mod report_cache;
pub mod reports;
pub mod schedule;
pub mod sync_actor;
pub mod sync_status;
pub mod unified_sync;
