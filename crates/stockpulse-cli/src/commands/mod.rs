//! Command handlers

pub mod config;
pub mod retrain;
pub mod status;
pub mod stock;
pub mod watch;
