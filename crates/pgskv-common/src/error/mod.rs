//! Error handling for pgskv.
//!
//! This module provides the error taxonomy surfaced to the relational
//! engine, a stable code per class, and the request status carried in
//! operation responses.

mod gate;

pub use gate::{ErrorCode, GateError, RequestStatus};

/// Result type alias for gate operations.
pub type GateResult<T> = std::result::Result<T, GateError>;
