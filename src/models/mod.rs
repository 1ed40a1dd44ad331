//! Core data models for hostkeeper
//!
//! Names, artifacts and backup components shared by every layer.

pub mod artifact;
pub mod component;
pub mod ids;

pub use artifact::ConfigArtifact;
pub use component::Component;
pub use ids::{Category, Identifier};
