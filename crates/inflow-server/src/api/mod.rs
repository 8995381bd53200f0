//! HTTP API building blocks

pub mod response;

pub use response::{ApiResponse, ErrorResponse};
