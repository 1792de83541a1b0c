//! Concrete adapter implementations for ports.

#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod candle_cache;
pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod csv_weight_adapter;
pub mod file_config_adapter;
