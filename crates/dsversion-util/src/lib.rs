//! Shared utilities for dsversion.
//!
//! This crate provides common utilities used across the dsversion workspace:
//! - ULID-based identifier generation
//! - Logging setup with tracing
//! - Data directory and config file resolution
//! - RAII-based timing for action measurement

pub mod id;
pub mod log;
pub mod path;
pub mod timing;

pub use id::{IdPrefix, Identifier};
pub use timing::TimingGuard;
