//! Core domain types and simulation logic.

pub mod candle;
pub mod position;
pub mod filter;
pub mod portfolio;
pub mod execution;
pub mod indicator;
pub mod config;
pub mod config_validation;
pub mod exit_rules;
pub mod simulator;
pub mod backtest;
pub mod metrics;
pub mod algorithm_input;
pub mod error;
