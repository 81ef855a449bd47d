//! converge-common - Shared types and utilities
//!
//! This crate provides the types shared by the reconciliation engine, its
//! control plane adapters and the test utilities, without any AWS SDK
//! dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`control_plane`]: The remote control plane seam and its error classification
//! - [`defaults`]: Default polling, retry and timeout values
//! - [`fields`]: Loosely-shaped field values exchanged with the control plane
//! - [`kind`]: Resource kinds managed by converge
//! - [`resource`]: Specs, handles and observed state
//! - [`status`]: Canonical lifecycle statuses parsed from remote status strings
//! - [`validate`]: Identifier validators shared by resource kinds

pub mod control_plane;
pub mod defaults;
pub mod fields;
pub mod kind;
pub mod resource;
pub mod status;
pub mod validate;

// Re-export commonly used types
pub use control_plane::{ControlPlane, RemoteError, RemoteErrorClass, classify_remote_error};
pub use defaults::OperationTimeouts;
pub use fields::{FieldValue, Fields};
pub use kind::ResourceKind;
pub use resource::{ObservedState, RemoteSnapshot, ResourceHandle, ResourceSpec};
pub use status::ResourceStatus;
