//! The image-labeling pipeline topology.
//!
//! One bucket receives image uploads, a queue fans the object-created
//! notifications out to a detection function that writes labels to a table
//! and thumbnails to a second bucket, and a service function behind the
//! gateway serves the results. An identity domain scopes end-user access to
//! each user's own key prefix.

use std::collections::BTreeMap;

use topo_core::model::{
    BucketConfig, ClientConfig, DeadLetterTarget, FunctionConfig, FunctionRuntime, GatewayConfig,
    IdentityDomainConfig, KeyAttribute, ParamLocation, QueueConfig, RemovalPolicy, RouteParam,
    SignInAlias, TableConfig,
};
use topo_core::{
    ApiRoute, AuthMode, Capability, ConfigValue, EventType, GrantScope, HttpMethod,
    ResourceConfig, TopologyBuilder, TopologyError, TriggerCondition,
};

use crate::params::PipelineParams;

pub const IMAGE_BUCKET_ID: &str = "images";
pub const THUMBNAIL_BUCKET_ID: &str = "thumbnails";
pub const LABELS_TABLE_ID: &str = "labels";
pub const DETECTOR_FUNCTION_ID: &str = "detector";
pub const SERVICE_FUNCTION_ID: &str = "service";
pub const UPLOAD_QUEUE_ID: &str = "uploads";
pub const UPLOAD_DLQ_ID: &str = "uploads-dlq";
pub const GATEWAY_ID: &str = "api";
pub const IDENTITY_DOMAIN_ID: &str = "users";

/// Key prefix end users own inside the image bucket.
pub const USER_PARTITION_BASE: &str = "private";

const DETECT_LABELS_ACTION: &str = "rekognition:DetectLabels";

/// Declare the full pipeline topology on a fresh builder. The builder is
/// returned still open so callers can extend it before rendering.
pub fn build_image_pipeline(params: &PipelineParams) -> Result<TopologyBuilder, TopologyError> {
    let mut topo = TopologyBuilder::new();

    let images = topo.declare_resource(
        IMAGE_BUCKET_ID,
        ResourceConfig::Bucket(BucketConfig {
            removal: params.bucket_removal,
            cors_enabled: true,
            versioned: false,
        }),
    )?;
    let thumbnails = topo.declare_resource(
        THUMBNAIL_BUCKET_ID,
        ResourceConfig::Bucket(BucketConfig {
            removal: params.bucket_removal,
            cors_enabled: false,
            versioned: false,
        }),
    )?;
    let labels = topo.declare_resource(
        LABELS_TABLE_ID,
        ResourceConfig::Table(TableConfig {
            partition_key: KeyAttribute::string("image"),
            sort_key: None,
            removal: RemovalPolicy::Destroy,
        }),
    )?;

    let dlq = topo.declare_resource(
        UPLOAD_DLQ_ID,
        ResourceConfig::Queue(QueueConfig::default()),
    )?;
    let uploads = topo.declare_resource(
        UPLOAD_QUEUE_ID,
        ResourceConfig::Queue(QueueConfig {
            // must exceed the detector timeout so in-flight messages are not
            // redelivered while a detection run is still executing
            visibility_timeout_secs: params.detector_timeout_secs * 6,
            dead_letter: Some(DeadLetterTarget {
                queue: dlq.id().to_string(),
                max_receive_count: params.upload_max_receives,
            }),
            ..QueueConfig::default()
        }),
    )?;

    let detector = topo.declare_resource(
        DETECTOR_FUNCTION_ID,
        ResourceConfig::Function(FunctionConfig {
            handler: "index.handler".to_string(),
            runtime: FunctionRuntime::Python312,
            memory_mb: params.detector_memory_mb,
            timeout_secs: params.detector_timeout_secs,
            environment: BTreeMap::from([
                ("TABLE".to_string(), ConfigValue::Ref(labels.id().to_string())),
                ("BUCKET".to_string(), ConfigValue::Ref(images.id().to_string())),
                (
                    "THUMBBUCKET".to_string(),
                    ConfigValue::Ref(thumbnails.id().to_string()),
                ),
            ]),
            code_asset: "rekognitionFunction".to_string(),
            removal: RemovalPolicy::Destroy,
        }),
    )?;
    let service = topo.declare_resource(
        SERVICE_FUNCTION_ID,
        ResourceConfig::Function(FunctionConfig {
            handler: "index.handler".to_string(),
            runtime: FunctionRuntime::Python312,
            memory_mb: params.service_memory_mb,
            timeout_secs: params.service_timeout_secs,
            environment: BTreeMap::from([
                ("TABLE".to_string(), ConfigValue::Ref(labels.id().to_string())),
                ("BUCKET".to_string(), ConfigValue::Ref(images.id().to_string())),
            ]),
            code_asset: "serviceFunction".to_string(),
            removal: RemovalPolicy::Destroy,
        }),
    )?;

    let gateway = topo.declare_resource(
        GATEWAY_ID,
        ResourceConfig::Gateway(GatewayConfig {
            stage: params.stage.clone(),
            cors_enabled: true,
            description: Some("image label service".to_string()),
            removal: RemovalPolicy::Destroy,
        }),
    )?;
    let users = topo.declare_resource(
        IDENTITY_DOMAIN_ID,
        ResourceConfig::IdentityDomain(IdentityDomainConfig {
            sign_in_aliases: vec![SignInAlias::Username, SignInAlias::Email],
            self_sign_up: params.allow_self_sign_up,
            auto_verify_email: true,
            client: ClientConfig::default(),
            allow_unauthenticated: false,
            removal: RemovalPolicy::Destroy,
        }),
    )?;

    // upload notifications: bucket -> queue -> detector
    if params.image_suffixes.is_empty() {
        topo.bind_event(
            images.id(),
            uploads.id(),
            TriggerCondition::on(EventType::ObjectCreated).with_prefix(format!(
                "{USER_PARTITION_BASE}/"
            )),
        )?;
    } else {
        for suffix in &params.image_suffixes {
            topo.bind_event(
                images.id(),
                uploads.id(),
                TriggerCondition::on(EventType::ObjectCreated)
                    .with_prefix(format!("{USER_PARTITION_BASE}/"))
                    .with_suffix(suffix.clone()),
            )?;
        }
    }
    topo.bind_event_with_dead_letter(
        uploads.id(),
        detector.id(),
        TriggerCondition::on(EventType::MessageAvailable),
        dlq.id(),
    )?;

    // detection pipeline permissions
    topo.grant(detector.id(), images.id(), [Capability::Read])?;
    topo.grant(detector.id(), thumbnails.id(), [Capability::Write])?;
    topo.grant(detector.id(), labels.id(), [Capability::Write])?;
    topo.grant(detector.id(), uploads.id(), [Capability::Consume])?;
    topo.allow_service_action(detector.id(), DETECT_LABELS_ACTION)?;

    // service permissions
    topo.grant(
        service.id(),
        images.id(),
        [Capability::Read, Capability::Delete],
    )?;
    topo.grant(
        service.id(),
        labels.id(),
        [Capability::Read, Capability::Write, Capability::Delete],
    )?;

    // authenticated users only touch their own partition
    topo.grant_scoped(
        users.id(),
        images.id(),
        [Capability::Read, Capability::Write, Capability::Delete],
        GrantScope::UserPartition {
            base: USER_PARTITION_BASE.to_string(),
        },
    )?;

    let key_param = BTreeMap::from([(
        "key".to_string(),
        RouteParam {
            location: ParamLocation::Query,
            required: true,
        },
    )]);
    topo.add_route(ApiRoute {
        path: "/images".to_string(),
        method: HttpMethod::Get,
        principal: service.id().to_string(),
        auth: AuthMode::IdentityDomain(users.id().to_string()),
        parameters: key_param.clone(),
    })?;
    topo.add_route(ApiRoute {
        path: "/images".to_string(),
        method: HttpMethod::Delete,
        principal: service.id().to_string(),
        auth: AuthMode::IdentityDomain(users.id().to_string()),
        parameters: key_param,
    })?;

    topo.set_output("imageBucket", ConfigValue::Ref(images.id().to_string()))?;
    topo.set_output(
        "thumbnailBucket",
        ConfigValue::Ref(thumbnails.id().to_string()),
    )?;
    topo.set_output("ddbTable", ConfigValue::Ref(labels.id().to_string()))?;
    topo.set_output("apiGateway", ConfigValue::Ref(gateway.id().to_string()))?;
    topo.set_output("userDomain", ConfigValue::Ref(users.id().to_string()))?;
    topo.set_output("deployStage", ConfigValue::Literal(params.stage.clone()))?;

    Ok(topo)
}
