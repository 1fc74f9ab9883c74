//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store, registry and processor calls into use-case APIs.
//! - Keep transport layers decoupled from storage details.

pub mod inbox_service;
pub mod statistics;
