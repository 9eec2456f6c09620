//! `Leadgate` HTTP server.
//!
//! Wires the core admission pipeline, telemetry store and collaborators into
//! an Axum server. Serves the public subscription and document endpoints and
//! the admin-gated bot-detection telemetry endpoints under `/v1/*`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod providers;
pub mod routes;
pub mod state;
