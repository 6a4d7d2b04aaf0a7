//! Declarative cloud topology primitives.
//!
//! This crate owns the in-memory resource-and-permission graph model:
//! typed resource declarations, permission grants, event wiring, API routes,
//! deployment ordering, and deterministic rendering to a provider-consumable
//! deployment artifact. It intentionally excludes provider SDKs and the
//! deployment (diff/apply) engine that turns an artifact into live
//! resources.
//!
//! # Quick Start
//!
//! ```
//! use topo_core::{Capability, ResourceConfig, TopologyBuilder};
//! use topo_core::model::{BucketConfig, FunctionConfig};
//!
//! let mut topo = TopologyBuilder::new();
//! let images = topo
//!     .declare_resource("images", ResourceConfig::Bucket(BucketConfig::default()))
//!     .unwrap();
//! let detector = topo
//!     .declare_resource("detector", ResourceConfig::Function(FunctionConfig::default()))
//!     .unwrap();
//! topo.grant(detector.id(), images.id(), [Capability::Read]).unwrap();
//!
//! let artifact = topo.render().unwrap();
//! assert_eq!(artifact.resources.len(), 2);
//! ```

pub mod builder;
pub mod errors;
pub mod model;
mod ordering;
mod render;

pub use builder::{ResourceRef, TopologyBuilder};
pub use errors::TopologyError;
pub use model::{
    artifact_fingerprint, stable_artifact_json, ApiRoute, AuthMode, Capability, ConfigValue,
    DeploymentArtifact, EventType, GrantScope, HttpMethod, ResourceConfig, ResourceKind,
    TriggerCondition,
};
