//! Image-labeling pipeline topology.
//!
//! This crate declares the fixed topology of the image pipeline — upload
//! bucket, thumbnail bucket, label table, detection and service functions,
//! upload queue with dead-lettering, gateway routes, and the user identity
//! domain — on a `topo_core::TopologyBuilder`, and exports the rendered
//! deployment artifact as JSON for the external deployment engine.
//!
//! # Quick Start
//!
//! ```
//! use topo_image_pipeline::{build_image_pipeline, PipelineParams};
//!
//! let mut topo = build_image_pipeline(&PipelineParams::default()).unwrap();
//! let artifact = topo.render().unwrap();
//! assert_eq!(artifact.outputs["imageBucket"], "images");
//! ```

pub mod build;
pub mod export;
pub mod params;

pub use build::build_image_pipeline;
pub use export::{read_artifact_json, write_artifact_json};
pub use params::PipelineParams;
