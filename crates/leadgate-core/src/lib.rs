//! Core library for `Leadgate`.
//!
//! Contains the submission admission pipeline, its configuration resolver,
//! the telemetry store that records every admission decision, email
//! fingerprinting, and the collaborator traits for the contact registry and
//! the personalized document. This crate knows nothing about HTTP.

pub mod config;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod followup;
pub mod outcome;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod subscription;
pub mod telemetry;
