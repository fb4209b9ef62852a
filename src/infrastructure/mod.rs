//! Infrastructure layer module
//!
//! Configuration loading, logging setup and the subprocess primitive every
//! adapter runs external commands through.

pub mod config;
pub mod logging;
pub mod process;
