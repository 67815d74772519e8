//! Infrastructure layer module
//!
//! Configuration loading and logging setup. Errors here are reported, not
//! matched on, so they surface as `anyhow::Error`.

pub mod config;
pub mod logging;
