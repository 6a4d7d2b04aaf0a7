//! Example: synthesize the image pipeline deployment artifact.
//!
//! Builds the full topology, renders it, prints a summary, and writes the
//! artifact JSON to the path given as the first argument (default
//! `deployment_artifact.json`).

use topo_core::artifact_fingerprint;
use topo_core::model::RemovalPolicy;
use topo_image_pipeline::{build_image_pipeline, write_artifact_json, PipelineParams};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "deployment_artifact.json".to_string());

    println!("Building image pipeline topology...");
    let params = PipelineParams::default();
    let mut topo = build_image_pipeline(&params)?;

    println!("Rendering deployment artifact...");
    let artifact = topo.render()?;

    println!("\n=== Topology Summary ===");
    println!("Resources: {}", artifact.resources.len());
    for record in &artifact.resources {
        let retained = match record.config.removal_policy() {
            RemovalPolicy::Retain => ", retained on teardown",
            RemovalPolicy::Destroy => "",
        };
        println!("  {} ({}{retained})", record.id, record.kind);
    }
    println!("Grants: {}", artifact.grants.len());
    println!("Service grants: {}", artifact.service_grants.len());
    println!("Event bindings: {}", artifact.event_bindings.len());
    println!("Routes: {}", artifact.routes.len());

    println!("\n=== Outputs ===");
    for (name, value) in &artifact.outputs {
        println!("  {name} = {value}");
    }

    println!("\nFingerprint: {}", artifact_fingerprint(&artifact));

    write_artifact_json(&artifact, &output_path)?;
    println!("Wrote {output_path}");

    Ok(())
}
