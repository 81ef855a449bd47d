//! converge-engine - reconciliation of eventually-consistent remote resources
//!
//! A [`Reconciler`] drives create, read, update and delete against any
//! [`converge_common::ControlPlane`], polling after each mutation until the
//! remote object settles. Desired and observed state are compared with
//! [`differ::diff`], which separates in-place updates from changes that need
//! a replacement. [`orchestrator::run_plans`] runs many of these at once.

pub mod aws;
pub mod config;
pub mod differ;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod wait;

pub use config::ReconcilerConfig;
pub use differ::{Diff, DriftRecord};
pub use error::{Operation, ReconcileError};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use orchestrator::{Applied, Plan, PlanResult, run_plans};
pub use reconciler::Reconciler;
pub use resources::{ResourceDefinition, SchemaRegistry};
pub use schema::{ResourceSchema, UpdateMode};
pub use wait::{Convergence, ConvergenceTarget, PollOutcome, WaitConfig, wait_for_convergence};
