//! HTTP API Handlers and Routes
//!
//! This module provides the REST API layer for Scholar Agent, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! - `GET /healthz` - `{status, version}`
//! - `POST /api/research` - `{query, top_k?, fanout?, provider?}` → `ResearchReport`
//!
//! Failures are returned as `{"error": ...}` with the status chosen by
//! [`AppError`](crate::types::AppError); source errors and any recovered
//! bibliography are attached to the body when present.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
