//! Inflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging bootstrap for the inflow workspace.

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{InflowError, Result};
