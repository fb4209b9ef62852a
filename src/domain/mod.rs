//! Domain layer for the Warden execution-safety core
//!
//! This module contains the domain models, the ports the services depend on
//! and the domain error type.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
