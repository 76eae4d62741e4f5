//! Unified search over a data catalog's files and packages.

pub mod config;
pub mod error;
pub mod search;

pub use error::{AppError, Result};
