//! # audren common library
//!
//! Shared code for the audren workspace:
//! - Error type for configuration and I/O failures
//! - TOML configuration loading with platform default resolution
//! - Processor tick conversions used by cost estimation and deadlines

pub mod config;
pub mod error;
pub mod timing;

pub use error::{Error, Result};
