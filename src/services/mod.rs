//! Service layer for hostkeeper
//!
//! The service layer drives artifact lifecycles on top of the storage layer:
//! validation, activation with rollback, removal and in-place mutation.

pub mod controller;
pub mod lifecycle;

pub use controller::{CommandController, ScriptedController, ServiceController};
pub use lifecycle::{ActivationReport, ActivationState, Lifecycle, MutationReport, ProvisionOutcome};
