use serde::{Deserialize, Serialize};
use topo_core::model::RemovalPolicy;

/// Default memory for the label-detection function; image decoding is the
/// dominant cost, so it gets far more than the provider minimum.
const DEFAULT_DETECTOR_MEMORY_MB: u32 = 1024;
const DEFAULT_DETECTOR_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SERVICE_MEMORY_MB: u32 = 256;
const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_UPLOAD_MAX_RECEIVES: u32 = 3;

/// Tunable knobs of the image pipeline topology. Everything else about the
/// topology (resource set, wiring, grants) is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Teardown policy for the two image buckets.
    pub bucket_removal: RemovalPolicy,
    pub detector_memory_mb: u32,
    pub detector_timeout_secs: u64,
    pub service_memory_mb: u32,
    pub service_timeout_secs: u64,
    /// Delivery attempts before an upload notification lands in the DLQ.
    pub upload_max_receives: u32,
    /// Gateway deployment stage, also published as an artifact output.
    pub stage: String,
    /// Restrict upload notifications to these object-key suffixes; empty
    /// means every created object triggers detection.
    pub image_suffixes: Vec<String>,
    pub allow_self_sign_up: bool,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            bucket_removal: RemovalPolicy::Retain,
            detector_memory_mb: DEFAULT_DETECTOR_MEMORY_MB,
            detector_timeout_secs: DEFAULT_DETECTOR_TIMEOUT_SECS,
            service_memory_mb: DEFAULT_SERVICE_MEMORY_MB,
            service_timeout_secs: DEFAULT_SERVICE_TIMEOUT_SECS,
            upload_max_receives: DEFAULT_UPLOAD_MAX_RECEIVES,
            stage: "prod".to_string(),
            image_suffixes: vec![".jpg".to_string(), ".png".to_string()],
            allow_self_sign_up: true,
        }
    }
}

impl PipelineParams {
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_bucket_removal(mut self, removal: RemovalPolicy) -> Self {
        self.bucket_removal = removal;
        self
    }
}
