//! AWS control plane adapters
//!
//! - [`context`]: Loads SDK configuration once per region
//! - [`error`]: Maps SDK errors onto [`converge_common::RemoteError`]
//! - [`rds`]: RDS DB snapshots as a [`converge_common::ControlPlane`]

pub mod context;
pub mod error;
pub mod rds;

pub use context::AwsContext;
pub use error::classify_sdk_error;
pub use rds::RdsSnapshotControlPlane;
