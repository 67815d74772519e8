//! Domain layer for the Warden supervision engine
//!
//! This module contains core domain models, errors, and the ports through
//! which external collaborators are reached.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
