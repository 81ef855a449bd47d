//! Shared test utilities for converge
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and unique identifiers for live tests
//! - [`control_plane`]: Scripted in-memory control plane
//! - [`fixtures`]: Ready-made field sets for each resource kind

pub mod aws;
pub mod control_plane;
pub mod fixtures;

// Re-export commonly used items
pub use aws::{get_test_region, test_run_id};
pub use control_plane::{Call, CallKind, ScriptedControlPlane};
