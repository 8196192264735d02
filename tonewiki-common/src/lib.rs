//! # Tonewiki Common Library
//!
//! Shared code for the tonewiki crates including:
//! - Error types
//! - Bootstrap configuration loading and storage root resolution
//! - Atomic file writes
//! - Tracing initialization
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
