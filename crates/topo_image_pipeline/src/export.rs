//! Artifact file export.
//!
//! The deployment artifact is handed to the external deployment engine as a
//! JSON document; this module owns the single write at the end of a render
//! pass, plus the read-back used by tooling and tests.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use topo_core::DeploymentArtifact;

/// Write a rendered artifact as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if file creation or JSON serialization fails.
pub fn write_artifact_json(
    artifact: &DeploymentArtifact,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = create_output_file(path)?;
    serde_json::to_writer_pretty(file, artifact)?;
    Ok(())
}

/// Read an artifact back from a JSON file.
pub fn read_artifact_json(
    path: impl AsRef<Path>,
) -> Result<DeploymentArtifact, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let artifact = serde_json::from_reader(BufReader::new(file))?;
    Ok(artifact)
}

fn create_output_file(path: impl AsRef<Path>) -> Result<File, Box<dyn std::error::Error>> {
    Ok(File::create(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_image_pipeline;
    use crate::params::PipelineParams;

    #[test]
    fn written_artifact_reads_back_equal() {
        let mut topo =
            build_image_pipeline(&PipelineParams::default()).expect("pipeline should build");
        let artifact = topo.render().expect("render should pass");

        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("deployment_artifact.json");
        write_artifact_json(&artifact, &path).expect("write should pass");

        let read_back = read_artifact_json(&path).expect("read should pass");
        assert_eq!(read_back, artifact);
    }
}
