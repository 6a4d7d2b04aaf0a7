use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ARTIFACT_SCHEMA_VERSION: &str = "v1";

pub const MIN_FUNCTION_MEMORY_MB: u32 = 128;
pub const MAX_FUNCTION_MEMORY_MB: u32 = 10_240;
pub const MAX_FUNCTION_TIMEOUT_SECS: u64 = 900;
pub const MAX_QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;
pub const MIN_QUEUE_RETENTION_HOURS: u32 = 1;
pub const MAX_QUEUE_RETENTION_HOURS: u32 = 336;
pub const MAX_DEAD_LETTER_RECEIVE_COUNT: u32 = 1_000;

/// Closed set of resource kinds the topology model understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    Table,
    Function,
    Queue,
    IdentityDomain,
    Gateway,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::Table => "table",
            Self::Function => "function",
            Self::Queue => "queue",
            Self::IdentityDomain => "identity_domain",
            Self::Gateway => "gateway",
        }
    }

    /// Only functions and identity-domain runtime roles act as grant principals.
    pub(crate) fn can_hold_grants(self) -> bool {
        matches!(self, Self::Function | Self::IdentityDomain)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Teardown behavior the deployment engine applies when a resource leaves the topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

/// A config field that is either a literal string or a reference to another
/// resource id. References create dependency edges and are resolved against
/// the declared resource set during render validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValue {
    Literal(String),
    Ref(String),
}

impl ConfigValue {
    pub fn referenced_id(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Ref(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub removal: RemovalPolicy,
    /// Browser clients upload directly, so CORS is usually on.
    pub cors_enabled: bool,
    pub versioned: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            removal: RemovalPolicy::Retain,
            cors_enabled: false,
            versioned: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl KeyAttribute {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: AttributeType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Exactly one partition key; tables without one are rejected at declaration.
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub removal: RemovalPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionRuntime {
    Python39,
    Python312,
    NodeJs20,
}

impl FunctionRuntime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python39 => "python3.9",
            Self::Python312 => "python3.12",
            Self::NodeJs20 => "nodejs20.x",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub handler: String,
    pub runtime: FunctionRuntime,
    pub memory_mb: u32,
    pub timeout_secs: u64,
    /// Values may reference other resources; refs are dependency edges.
    pub environment: BTreeMap<String, ConfigValue>,
    /// Relative path of the code bundle handed to the deployment engine.
    pub code_asset: String,
    pub removal: RemovalPolicy,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            handler: "index.handler".to_string(),
            runtime: FunctionRuntime::Python312,
            memory_mb: MIN_FUNCTION_MEMORY_MB,
            timeout_secs: 3,
            environment: BTreeMap::new(),
            code_asset: "handler".to_string(),
            removal: RemovalPolicy::Destroy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterTarget {
    /// Id of the queue receiving messages that exhausted delivery attempts.
    pub queue: String,
    pub max_receive_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub visibility_timeout_secs: u64,
    pub retention_hours: u32,
    pub dead_letter: Option<DeadLetterTarget>,
    pub removal: RemovalPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: 30,
            retention_hours: 96,
            dead_letter: None,
            removal: RemovalPolicy::Destroy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInAlias {
    Username,
    Email,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    UserPassword,
    UserSrp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub generate_secret: bool,
    pub auth_flows: Vec<AuthFlow>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            generate_secret: false,
            auth_flows: vec![AuthFlow::UserSrp],
        }
    }
}

/// User directory + client registration + exchange pool mapping authenticated
/// users to a runtime role. The domain id doubles as the grantable principal
/// for that role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDomainConfig {
    pub sign_in_aliases: Vec<SignInAlias>,
    pub self_sign_up: bool,
    pub auto_verify_email: bool,
    pub client: ClientConfig,
    pub allow_unauthenticated: bool,
    pub removal: RemovalPolicy,
}

impl Default for IdentityDomainConfig {
    fn default() -> Self {
        Self {
            sign_in_aliases: vec![SignInAlias::Email],
            self_sign_up: false,
            auto_verify_email: false,
            client: ClientConfig::default(),
            allow_unauthenticated: false,
            removal: RemovalPolicy::Destroy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub stage: String,
    pub cors_enabled: bool,
    pub description: Option<String>,
    pub removal: RemovalPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            stage: "prod".to_string(),
            cors_enabled: false,
            description: None,
            removal: RemovalPolicy::Destroy,
        }
    }
}

/// Per-kind configuration as a closed tagged variant. Keeping the set closed
/// makes declaration-time validation exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceConfig {
    Bucket(BucketConfig),
    Table(TableConfig),
    Function(FunctionConfig),
    Queue(QueueConfig),
    IdentityDomain(IdentityDomainConfig),
    Gateway(GatewayConfig),
}

impl ResourceConfig {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Bucket(_) => ResourceKind::Bucket,
            Self::Table(_) => ResourceKind::Table,
            Self::Function(_) => ResourceKind::Function,
            Self::Queue(_) => ResourceKind::Queue,
            Self::IdentityDomain(_) => ResourceKind::IdentityDomain,
            Self::Gateway(_) => ResourceKind::Gateway,
        }
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        match self {
            Self::Bucket(config) => config.removal,
            Self::Table(config) => config.removal,
            Self::Function(config) => config.removal,
            Self::Queue(config) => config.removal,
            Self::IdentityDomain(config) => config.removal,
            Self::Gateway(config) => config.removal,
        }
    }

    /// Resource ids this config points at through `ConfigValue::Ref` fields
    /// and the queue dead-letter target.
    pub(crate) fn referenced_ids(&self) -> Vec<&str> {
        match self {
            Self::Function(config) => config
                .environment
                .values()
                .filter_map(ConfigValue::referenced_id)
                .collect(),
            Self::Queue(config) => config
                .dead_letter
                .as_ref()
                .map(|target| vec![target.queue.as_str()])
                .unwrap_or_default(),
            Self::Bucket(_) | Self::Table(_) | Self::IdentityDomain(_) | Self::Gateway(_) => {
                Vec::new()
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Bucket(_) => Ok(()),
            Self::Table(config) => validate_table(config),
            Self::Function(config) => validate_function(config),
            Self::Queue(config) => validate_queue(config),
            Self::IdentityDomain(config) => validate_identity_domain(config),
            Self::Gateway(config) => validate_gateway(config),
        }
    }
}

fn validate_table(config: &TableConfig) -> Result<(), String> {
    if config.partition_key.name.trim().is_empty() {
        return Err("table must declare exactly one named partition key".to_string());
    }
    if let Some(sort_key) = &config.sort_key {
        if sort_key.name.trim().is_empty() {
            return Err("sort key name cannot be empty".to_string());
        }
        if sort_key.name == config.partition_key.name {
            return Err(format!(
                "sort key '{}' duplicates the partition key",
                sort_key.name
            ));
        }
    }
    Ok(())
}

fn validate_function(config: &FunctionConfig) -> Result<(), String> {
    if config.handler.trim().is_empty() {
        return Err("function handler cannot be empty".to_string());
    }
    if config.code_asset.trim().is_empty() {
        return Err("function code asset path cannot be empty".to_string());
    }
    if config.memory_mb < MIN_FUNCTION_MEMORY_MB || config.memory_mb > MAX_FUNCTION_MEMORY_MB {
        return Err(format!(
            "function memory {} MB is outside [{MIN_FUNCTION_MEMORY_MB}, {MAX_FUNCTION_MEMORY_MB}]",
            config.memory_mb
        ));
    }
    if config.timeout_secs == 0 || config.timeout_secs > MAX_FUNCTION_TIMEOUT_SECS {
        return Err(format!(
            "function timeout {}s is outside [1, {MAX_FUNCTION_TIMEOUT_SECS}]",
            config.timeout_secs
        ));
    }
    if config.environment.keys().any(|key| key.trim().is_empty()) {
        return Err("environment variable names must be non-empty".to_string());
    }
    Ok(())
}

fn validate_queue(config: &QueueConfig) -> Result<(), String> {
    if config.visibility_timeout_secs > MAX_QUEUE_VISIBILITY_TIMEOUT_SECS {
        return Err(format!(
            "queue visibility timeout {}s exceeds {MAX_QUEUE_VISIBILITY_TIMEOUT_SECS}s",
            config.visibility_timeout_secs
        ));
    }
    if config.retention_hours < MIN_QUEUE_RETENTION_HOURS
        || config.retention_hours > MAX_QUEUE_RETENTION_HOURS
    {
        return Err(format!(
            "queue retention {}h is outside [{MIN_QUEUE_RETENTION_HOURS}, {MAX_QUEUE_RETENTION_HOURS}]",
            config.retention_hours
        ));
    }
    if let Some(target) = &config.dead_letter {
        if target.queue.trim().is_empty() {
            return Err("dead-letter queue id cannot be empty".to_string());
        }
        if target.max_receive_count == 0 || target.max_receive_count > MAX_DEAD_LETTER_RECEIVE_COUNT
        {
            return Err(format!(
                "dead-letter max receive count {} is outside [1, {MAX_DEAD_LETTER_RECEIVE_COUNT}]",
                target.max_receive_count
            ));
        }
    }
    Ok(())
}

fn validate_identity_domain(config: &IdentityDomainConfig) -> Result<(), String> {
    if config.sign_in_aliases.is_empty() {
        return Err("identity domain must allow at least one sign-in alias".to_string());
    }
    Ok(())
}

fn validate_gateway(config: &GatewayConfig) -> Result<(), String> {
    if config.stage.trim().is_empty() {
        return Err("gateway stage name cannot be empty".to_string());
    }
    Ok(())
}

/// Capability a grant confers on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Write,
    List,
    Delete,
    Publish,
    Consume,
    Invoke,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::List => "list",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Consume => "consume",
            Self::Invoke => "invoke",
        }
    }

    pub(crate) fn applies_to(self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Bucket => {
                matches!(self, Self::Read | Self::Write | Self::List | Self::Delete)
            }
            ResourceKind::Table => matches!(self, Self::Read | Self::Write | Self::Delete),
            ResourceKind::Queue => matches!(self, Self::Publish | Self::Consume),
            ResourceKind::Function => matches!(self, Self::Invoke),
            ResourceKind::IdentityDomain | ResourceKind::Gateway => false,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope qualifier on a grant. `UserPartition` confines access to each
/// authenticated user's own key prefix under `base`; the deployment engine
/// owns the provider-specific partition token syntax.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    Topology,
    UserPartition { base: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub principal: String,
    pub resource: String,
    pub capabilities: BTreeSet<Capability>,
    pub scope: GrantScope,
}

/// Permission to call a named provider service action outside the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGrantRecord {
    pub principal: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ObjectCreated,
    ObjectRemoved,
    MessageAvailable,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ObjectCreated => "object_created",
            Self::ObjectRemoved => "object_removed",
            Self::MessageAvailable => "message_available",
        }
    }

    pub(crate) fn emitted_by(self, source: ResourceKind) -> bool {
        match self {
            Self::ObjectCreated | Self::ObjectRemoved => source == ResourceKind::Bucket,
            Self::MessageAvailable => source == ResourceKind::Queue,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `target` can receive `event` notifications from a `source` of the
/// given kind. Buckets notify queues or functions; queues feed functions.
pub(crate) fn valid_event_pair(
    source: ResourceKind,
    event: EventType,
    target: ResourceKind,
) -> bool {
    if !event.emitted_by(source) {
        return false;
    }
    match source {
        ResourceKind::Bucket => matches!(target, ResourceKind::Queue | ResourceKind::Function),
        ResourceKind::Queue => target == ResourceKind::Function,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub event: EventType,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl TriggerCondition {
    pub fn on(event: EventType) -> Self {
        Self {
            event,
            prefix: None,
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBinding {
    pub source: String,
    pub target: String,
    pub trigger: TriggerCondition,
    pub dead_letter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteParam {
    pub location: ParamLocation,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Anonymous,
    IdentityDomain(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub path: String,
    pub method: HttpMethod,
    pub principal: String,
    pub auth: AuthMode,
    pub parameters: BTreeMap<String, RouteParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub kind: ResourceKind,
    pub config: ResourceConfig,
}

/// Rendered, provider-consumable topology document. Resources appear in
/// deployment order; every other section is sorted by its natural key, so two
/// renders of the same declarations are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    pub schema_version: String,
    pub resources: Vec<ResourceRecord>,
    pub grants: Vec<GrantRecord>,
    pub service_grants: Vec<ServiceGrantRecord>,
    pub event_bindings: Vec<EventBinding>,
    pub routes: Vec<ApiRoute>,
    pub outputs: BTreeMap<String, String>,
}

pub fn stable_artifact_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of artifact value should not fail")
}

pub fn artifact_fingerprint(artifact: &DeploymentArtifact) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_artifact_json(artifact));
    format!("{:x}", hasher.finalize())
}
