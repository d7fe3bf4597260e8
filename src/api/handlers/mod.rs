//! API request handlers.

/// Liveness endpoint.
pub mod health;
/// Research pipeline endpoint.
pub mod research;
