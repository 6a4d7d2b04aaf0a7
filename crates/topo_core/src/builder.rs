//! Topology construction: declarations, grants, event wiring, and routes.
//!
//! A `TopologyBuilder` is the single writer for one topology graph. Every
//! declaration call validates its own inputs and fails fast; cross-cutting
//! consistency (dangling references left behind by `remove_resource`,
//! dependency cycles) is checked by `render` in one aggregate pass.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::TopologyError;
use crate::model::{
    valid_event_pair, ApiRoute, Capability, ConfigValue, EventBinding, GrantScope, HttpMethod,
    ResourceConfig, ResourceKind, TriggerCondition,
};

/// Cheap handle returned by `declare_resource` for ergonomic wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    id: String,
    kind: ResourceKind,
}

impl ResourceRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceEntry {
    pub(crate) config: ResourceConfig,
    /// Monotonic declaration sequence number, the deterministic tie-break
    /// for deployment ordering.
    pub(crate) declared_at: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct GrantKey {
    pub(crate) principal: String,
    pub(crate) resource: String,
    pub(crate) scope: GrantScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Open,
    Rendered,
}

#[derive(Debug)]
pub struct TopologyBuilder {
    state: BuilderState,
    next_declaration: usize,
    pub(crate) resources: BTreeMap<String, ResourceEntry>,
    pub(crate) grants: BTreeMap<GrantKey, BTreeSet<Capability>>,
    pub(crate) service_grants: BTreeSet<(String, String)>,
    pub(crate) events: Vec<EventBinding>,
    pub(crate) routes: BTreeMap<(String, HttpMethod), ApiRoute>,
    pub(crate) outputs: BTreeMap<String, ConfigValue>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self {
            state: BuilderState::Open,
            next_declaration: 0,
            resources: BTreeMap::new(),
            grants: BTreeMap::new(),
            service_grants: BTreeSet::new(),
            events: Vec::new(),
            routes: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.state == BuilderState::Rendered
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<ResourceKind> {
        self.resources.get(id).map(|entry| entry.config.kind())
    }

    /// Declare a new resource. The id must be unique within the topology and
    /// the config must satisfy its kind's schema.
    pub fn declare_resource(
        &mut self,
        id: &str,
        config: ResourceConfig,
    ) -> Result<ResourceRef, TopologyError> {
        self.ensure_open()?;
        let id = id.trim();
        if id.is_empty() {
            return Err(TopologyError::InvalidConfig {
                id: String::new(),
                message: "resource id cannot be empty".to_string(),
            });
        }
        if self.resources.contains_key(id) {
            return Err(TopologyError::DuplicateId { id: id.to_string() });
        }
        config
            .validate()
            .map_err(|message| TopologyError::InvalidConfig {
                id: id.to_string(),
                message,
            })?;

        let kind = config.kind();
        let declared_at = self.next_declaration;
        self.next_declaration += 1;
        self.resources.insert(
            id.to_string(),
            ResourceEntry {
                config,
                declared_at,
            },
        );
        Ok(ResourceRef {
            id: id.to_string(),
            kind,
        })
    }

    /// Remove a declared resource. Grants, bindings, routes, and outputs that
    /// still point at it are reported by `render`'s aggregate validation.
    pub fn remove_resource(&mut self, id: &str) -> Result<(), TopologyError> {
        self.ensure_open()?;
        if self.resources.remove(id).is_none() {
            return Err(TopologyError::UnknownReference {
                id: id.to_string(),
                context: "resource".to_string(),
            });
        }
        Ok(())
    }

    /// Grant capabilities on a whole resource. Repeating a grant widens the
    /// existing edge by set union instead of adding a second edge.
    pub fn grant(
        &mut self,
        principal_id: &str,
        resource_id: &str,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Result<(), TopologyError> {
        self.grant_scoped(principal_id, resource_id, capabilities, GrantScope::Topology)
    }

    /// Grant capabilities under an explicit scope. Edges merge per
    /// `(principal, resource, scope)`; a user-partition grant never widens a
    /// whole-resource grant or vice versa.
    pub fn grant_scoped(
        &mut self,
        principal_id: &str,
        resource_id: &str,
        capabilities: impl IntoIterator<Item = Capability>,
        scope: GrantScope,
    ) -> Result<(), TopologyError> {
        self.ensure_open()?;
        self.require_principal(principal_id)?;
        let resource_kind = self
            .resources
            .get(resource_id)
            .map(|entry| entry.config.kind())
            .ok_or_else(|| TopologyError::UnknownReference {
                id: resource_id.to_string(),
                context: "grant resource".to_string(),
            })?;

        let capabilities: BTreeSet<Capability> = capabilities.into_iter().collect();
        for capability in &capabilities {
            if !capability.applies_to(resource_kind) {
                return Err(TopologyError::IncompatibleTarget {
                    message: format!(
                        "capability '{capability}' does not apply to {resource_kind} '{resource_id}'"
                    ),
                });
            }
        }
        if capabilities.is_empty() {
            return Ok(());
        }

        self.grants
            .entry(GrantKey {
                principal: principal_id.to_string(),
                resource: resource_id.to_string(),
                scope,
            })
            .or_default()
            .extend(capabilities);
        Ok(())
    }

    /// Allow a principal to call a provider service action outside the
    /// topology (e.g. a managed image-recognition API). Idempotent.
    pub fn allow_service_action(
        &mut self,
        principal_id: &str,
        action: &str,
    ) -> Result<(), TopologyError> {
        self.ensure_open()?;
        self.require_principal(principal_id)?;
        let action = action.trim();
        if action.is_empty() {
            return Err(TopologyError::InvalidConfig {
                id: principal_id.to_string(),
                message: "service action cannot be empty".to_string(),
            });
        }
        self.service_grants
            .insert((principal_id.to_string(), action.to_string()));
        Ok(())
    }

    /// Wire an event notification from `source_id` to `target_id`.
    pub fn bind_event(
        &mut self,
        source_id: &str,
        target_id: &str,
        trigger: TriggerCondition,
    ) -> Result<(), TopologyError> {
        self.bind_event_inner(source_id, target_id, trigger, None)
    }

    /// Like `bind_event`, with a dead-letter queue for deliveries the target
    /// repeatedly fails to process.
    pub fn bind_event_with_dead_letter(
        &mut self,
        source_id: &str,
        target_id: &str,
        trigger: TriggerCondition,
        dead_letter_id: &str,
    ) -> Result<(), TopologyError> {
        self.bind_event_inner(source_id, target_id, trigger, Some(dead_letter_id))
    }

    fn bind_event_inner(
        &mut self,
        source_id: &str,
        target_id: &str,
        trigger: TriggerCondition,
        dead_letter_id: Option<&str>,
    ) -> Result<(), TopologyError> {
        self.ensure_open()?;
        let source_kind = self.require_resource(source_id, "event source")?;
        let target_kind = self.require_resource(target_id, "event target")?;

        if !trigger.event.emitted_by(source_kind) {
            return Err(TopologyError::IncompatibleTarget {
                message: format!(
                    "{source_kind} '{source_id}' does not emit {} events",
                    trigger.event
                ),
            });
        }
        if !valid_event_pair(source_kind, trigger.event, target_kind) {
            return Err(TopologyError::IncompatibleTarget {
                message: format!(
                    "{target_kind} '{target_id}' cannot receive {} events from {source_kind} '{source_id}'",
                    trigger.event
                ),
            });
        }

        if let Some(dead_letter) = dead_letter_id {
            let dead_letter_kind = self.require_resource(dead_letter, "event dead-letter target")?;
            if dead_letter_kind != ResourceKind::Queue {
                return Err(TopologyError::IncompatibleTarget {
                    message: format!(
                        "dead-letter target '{dead_letter}' must be a queue, got {dead_letter_kind}"
                    ),
                });
            }
        }

        self.events.push(EventBinding {
            source: source_id.to_string(),
            target: target_id.to_string(),
            trigger,
            dead_letter: dead_letter_id.map(str::to_string),
        });
        Ok(())
    }

    /// Declare an externally reachable route. `(path, method)` pairs are
    /// unique; the handling principal must be a declared function and a
    /// non-anonymous auth mode must name a declared identity domain.
    pub fn add_route(&mut self, route: ApiRoute) -> Result<(), TopologyError> {
        self.ensure_open()?;
        if !route.path.starts_with('/') {
            return Err(TopologyError::InvalidConfig {
                id: route.path.clone(),
                message: "route path must start with '/'".to_string(),
            });
        }
        let key = (route.path.clone(), route.method);
        if self.routes.contains_key(&key) {
            return Err(TopologyError::DuplicateRoute {
                method: route.method,
                path: route.path.clone(),
            });
        }

        let principal_kind = self.require_resource(&route.principal, "route principal")?;
        if principal_kind != ResourceKind::Function {
            return Err(TopologyError::IncompatibleTarget {
                message: format!(
                    "route {} {} must be handled by a function, '{}' is a {principal_kind}",
                    route.method, route.path, route.principal
                ),
            });
        }
        if let crate::model::AuthMode::IdentityDomain(domain_id) = &route.auth {
            let domain_kind = self.require_resource(domain_id, "route auth domain")?;
            if domain_kind != ResourceKind::IdentityDomain {
                return Err(TopologyError::IncompatibleTarget {
                    message: format!(
                        "auth reference '{domain_id}' must be an identity domain, got {domain_kind}"
                    ),
                });
            }
        }

        self.routes.insert(key, route);
        Ok(())
    }

    /// Publish a named artifact output. A `Ref` value resolves to the
    /// referenced resource's stable id at render time.
    pub fn set_output(&mut self, name: &str, value: ConfigValue) -> Result<(), TopologyError> {
        self.ensure_open()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TopologyError::InvalidConfig {
                id: String::new(),
                message: "output name cannot be empty".to_string(),
            });
        }
        if self.outputs.contains_key(name) {
            return Err(TopologyError::DuplicateId {
                id: name.to_string(),
            });
        }
        self.outputs.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<(), TopologyError> {
        match self.state {
            BuilderState::Open => Ok(()),
            BuilderState::Rendered => Err(TopologyError::ImmutableAfterRender),
        }
    }

    pub(crate) fn mark_rendered(&mut self) {
        self.state = BuilderState::Rendered;
    }

    fn require_resource(&self, id: &str, context: &str) -> Result<ResourceKind, TopologyError> {
        self.resources
            .get(id)
            .map(|entry| entry.config.kind())
            .ok_or_else(|| TopologyError::UnknownReference {
                id: id.to_string(),
                context: context.to_string(),
            })
    }

    fn require_principal(&self, id: &str) -> Result<ResourceKind, TopologyError> {
        let kind = self.require_resource(id, "grant principal")?;
        if !kind.can_hold_grants() {
            return Err(TopologyError::IncompatibleTarget {
                message: format!(
                    "{kind} '{id}' cannot act as a grant principal; only functions and identity domains hold grants"
                ),
            });
        }
        Ok(kind)
    }
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AuthMode, BucketConfig, EventType, FunctionConfig, KeyAttribute, RemovalPolicy,
        TableConfig,
    };

    fn bucket() -> ResourceConfig {
        ResourceConfig::Bucket(BucketConfig::default())
    }

    fn table() -> ResourceConfig {
        ResourceConfig::Table(TableConfig {
            partition_key: KeyAttribute::string("image"),
            sort_key: None,
            removal: RemovalPolicy::Retain,
        })
    }

    fn function() -> ResourceConfig {
        ResourceConfig::Function(FunctionConfig::default())
    }

    #[test]
    fn duplicate_id_leaves_first_declaration_intact() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");

        let error = topo
            .declare_resource("images", table())
            .expect_err("second declaration should fail");
        assert_eq!(
            error,
            TopologyError::DuplicateId {
                id: "images".to_string()
            }
        );
        assert_eq!(topo.kind_of("images"), Some(ResourceKind::Bucket));
    }

    #[test]
    fn invalid_config_is_rejected_before_insertion() {
        let mut topo = TopologyBuilder::new();
        let error = topo
            .declare_resource(
                "labels",
                ResourceConfig::Table(TableConfig {
                    partition_key: KeyAttribute::string(""),
                    sort_key: None,
                    removal: RemovalPolicy::Retain,
                }),
            )
            .expect_err("declaration should fail");

        assert!(matches!(error, TopologyError::InvalidConfig { .. }));
        assert!(!topo.contains_resource("labels"));
    }

    #[test]
    fn grant_requires_declared_endpoints() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("detector", function())
            .expect("declaration should pass");

        let error = topo
            .grant("detector", "images", [Capability::Read])
            .expect_err("grant should fail");
        assert_eq!(
            error,
            TopologyError::UnknownReference {
                id: "images".to_string(),
                context: "grant resource".to_string()
            }
        );
    }

    #[test]
    fn overlapping_grants_merge_into_one_edge() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");
        topo.declare_resource("detector", function())
            .expect("declaration should pass");

        topo.grant("detector", "images", [Capability::Read, Capability::List])
            .expect("grant should pass");
        topo.grant("detector", "images", [Capability::Read, Capability::Write])
            .expect("grant should pass");

        assert_eq!(topo.grants.len(), 1);
        let capabilities = topo.grants.values().next().expect("one edge expected");
        assert_eq!(
            capabilities.iter().copied().collect::<Vec<_>>(),
            vec![Capability::Read, Capability::Write, Capability::List]
        );
    }

    #[test]
    fn scoped_and_unscoped_grants_stay_distinct() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");
        topo.declare_resource("detector", function())
            .expect("declaration should pass");

        topo.grant("detector", "images", [Capability::Read])
            .expect("grant should pass");
        topo.grant_scoped(
            "detector",
            "images",
            [Capability::Write],
            GrantScope::UserPartition {
                base: "private".to_string(),
            },
        )
        .expect("grant should pass");

        assert_eq!(topo.grants.len(), 2);
    }

    #[test]
    fn bucket_cannot_act_as_principal() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");
        topo.declare_resource("labels", table())
            .expect("declaration should pass");

        let error = topo
            .grant("images", "labels", [Capability::Read])
            .expect_err("grant should fail");
        assert!(matches!(error, TopologyError::IncompatibleTarget { .. }));
    }

    #[test]
    fn binding_a_table_as_event_target_is_incompatible() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");
        topo.declare_resource("labels", table())
            .expect("declaration should pass");

        let error = topo
            .bind_event(
                "images",
                "labels",
                TriggerCondition::on(EventType::ObjectCreated),
            )
            .expect_err("binding should fail");
        assert_eq!(
            error,
            TopologyError::IncompatibleTarget {
                message: "table 'labels' cannot receive object_created events from bucket 'images'"
                    .to_string()
            }
        );
    }

    #[test]
    fn event_type_must_match_source_kind() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");
        topo.declare_resource("detector", function())
            .expect("declaration should pass");

        let error = topo
            .bind_event(
                "images",
                "detector",
                TriggerCondition::on(EventType::MessageAvailable),
            )
            .expect_err("binding should fail");
        assert_eq!(
            error,
            TopologyError::IncompatibleTarget {
                message: "bucket 'images' does not emit message_available events".to_string()
            }
        );
    }

    #[test]
    fn dead_letter_target_must_be_a_queue() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("images", bucket())
            .expect("declaration should pass");
        topo.declare_resource("detector", function())
            .expect("declaration should pass");
        topo.declare_resource("labels", table())
            .expect("declaration should pass");

        let error = topo
            .bind_event_with_dead_letter(
                "images",
                "detector",
                TriggerCondition::on(EventType::ObjectCreated),
                "labels",
            )
            .expect_err("binding should fail");
        assert!(matches!(error, TopologyError::IncompatibleTarget { .. }));
    }

    #[test]
    fn route_auth_must_name_a_declared_identity_domain() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("svc", function())
            .expect("declaration should pass");

        let error = topo
            .add_route(ApiRoute {
                path: "/images".to_string(),
                method: HttpMethod::Get,
                principal: "svc".to_string(),
                auth: AuthMode::IdentityDomain("pool-x".to_string()),
                parameters: BTreeMap::new(),
            })
            .expect_err("route should fail");
        assert_eq!(
            error,
            TopologyError::UnknownReference {
                id: "pool-x".to_string(),
                context: "route auth domain".to_string()
            }
        );
    }

    #[test]
    fn duplicate_path_method_pair_is_rejected() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("svc", function())
            .expect("declaration should pass");

        let route = ApiRoute {
            path: "/images".to_string(),
            method: HttpMethod::Get,
            principal: "svc".to_string(),
            auth: AuthMode::Anonymous,
            parameters: BTreeMap::new(),
        };
        topo.add_route(route.clone()).expect("route should pass");

        let error = topo.add_route(route).expect_err("second route should fail");
        assert_eq!(
            error,
            TopologyError::DuplicateRoute {
                method: HttpMethod::Get,
                path: "/images".to_string()
            }
        );
    }

    #[test]
    fn removing_an_unknown_resource_fails() {
        let mut topo = TopologyBuilder::new();
        let error = topo
            .remove_resource("ghost")
            .expect_err("removal should fail");
        assert!(matches!(error, TopologyError::UnknownReference { .. }));
    }

    #[test]
    fn service_actions_are_idempotent() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("detector", function())
            .expect("declaration should pass");

        topo.allow_service_action("detector", "rekognition:DetectLabels")
            .expect("service action should pass");
        topo.allow_service_action("detector", "rekognition:DetectLabels")
            .expect("service action should pass");

        assert_eq!(topo.service_grants.len(), 1);
    }
}
