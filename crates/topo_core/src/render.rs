//! Rendering: aggregate validation, deployment ordering, artifact assembly.
//!
//! `render` is a pure function of the declared graph. It either yields a
//! complete, internally consistent `DeploymentArtifact` or fails with no
//! artifact produced; there is no partial-success state.

use crate::builder::TopologyBuilder;
use crate::errors::TopologyError;
use crate::model::{
    valid_event_pair, AuthMode, ConfigValue, DeploymentArtifact, GrantRecord, ResourceKind,
    ResourceRecord, ServiceGrantRecord, ARTIFACT_SCHEMA_VERSION,
};
use crate::ordering;

impl TopologyBuilder {
    /// Validate the whole graph and render it to a deployment artifact.
    ///
    /// Reference violations are aggregated into one `Validation` error so a
    /// caller fixes everything in a single pass; a reference-clean graph
    /// that cannot be ordered fails with `CyclicDependency`. The first
    /// successful render freezes the builder; rendering again recomputes
    /// the same artifact, mutating fails with `ImmutableAfterRender`.
    pub fn render(&mut self) -> Result<DeploymentArtifact, TopologyError> {
        let violations = self.collect_violations();
        if !violations.is_empty() {
            return Err(TopologyError::Validation { violations });
        }

        let order = ordering::deployment_order(&self.resources)?;

        let resources = order
            .iter()
            .map(|id| {
                let entry = &self.resources[id];
                ResourceRecord {
                    id: id.clone(),
                    kind: entry.config.kind(),
                    config: entry.config.clone(),
                }
            })
            .collect();

        let grants = self
            .grants
            .iter()
            .map(|(key, capabilities)| GrantRecord {
                principal: key.principal.clone(),
                resource: key.resource.clone(),
                capabilities: capabilities.clone(),
                scope: key.scope.clone(),
            })
            .collect();

        let service_grants = self
            .service_grants
            .iter()
            .map(|(principal, action)| ServiceGrantRecord {
                principal: principal.clone(),
                action: action.clone(),
            })
            .collect();

        let outputs = self
            .outputs
            .iter()
            .map(|(name, value)| {
                let resolved = match value {
                    ConfigValue::Literal(text) => text.clone(),
                    // identifiers are user-supplied and stable, so a ref
                    // resolves to the referenced resource's own id
                    ConfigValue::Ref(id) => id.clone(),
                };
                (name.clone(), resolved)
            })
            .collect();

        let artifact = DeploymentArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            resources,
            grants,
            service_grants,
            event_bindings: self.events.clone(),
            routes: self.routes.values().cloned().collect(),
            outputs,
        };

        self.mark_rendered();
        Ok(artifact)
    }

    /// Sweep every edge of the graph for references to resources that are
    /// not (or no longer) declared, collecting every violation found.
    fn collect_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let kind_of = |id: &str| self.resources.get(id).map(|entry| entry.config.kind());

        for (id, entry) in &self.resources {
            for referenced in entry.config.referenced_ids() {
                if kind_of(referenced).is_none() {
                    violations.push(format!(
                        "resource '{id}': references unknown resource '{referenced}'"
                    ));
                }
            }
        }

        for (key, capabilities) in &self.grants {
            match kind_of(&key.principal) {
                None => violations.push(format!(
                    "grant '{}' -> '{}': principal is not declared",
                    key.principal, key.resource
                )),
                Some(kind) if !kind.can_hold_grants() => violations.push(format!(
                    "grant '{}' -> '{}': {kind} cannot act as a principal",
                    key.principal, key.resource
                )),
                Some(_) => {}
            }
            match kind_of(&key.resource) {
                None => violations.push(format!(
                    "grant '{}' -> '{}': resource is not declared",
                    key.principal, key.resource
                )),
                Some(kind) => {
                    for capability in capabilities {
                        if !capability.applies_to(kind) {
                            violations.push(format!(
                                "grant '{}' -> '{}': capability '{capability}' does not apply to {kind}",
                                key.principal, key.resource
                            ));
                        }
                    }
                }
            }
        }

        for (principal, action) in &self.service_grants {
            match kind_of(principal) {
                None => violations.push(format!(
                    "service grant '{principal}' -> '{action}': principal is not declared"
                )),
                Some(kind) if !kind.can_hold_grants() => violations.push(format!(
                    "service grant '{principal}' -> '{action}': {kind} cannot act as a principal"
                )),
                Some(_) => {}
            }
        }

        for binding in &self.events {
            let source_kind = kind_of(&binding.source);
            let target_kind = kind_of(&binding.target);
            if source_kind.is_none() {
                violations.push(format!(
                    "event binding '{}' -> '{}': source is not declared",
                    binding.source, binding.target
                ));
            }
            if target_kind.is_none() {
                violations.push(format!(
                    "event binding '{}' -> '{}': target is not declared",
                    binding.source, binding.target
                ));
            }
            if let (Some(source), Some(target)) = (source_kind, target_kind) {
                if !valid_event_pair(source, binding.trigger.event, target) {
                    violations.push(format!(
                        "event binding '{}' -> '{}': {target} cannot receive {} events from {source}",
                        binding.source, binding.target, binding.trigger.event
                    ));
                }
            }
            if let Some(dead_letter) = &binding.dead_letter {
                match kind_of(dead_letter) {
                    None => violations.push(format!(
                        "event binding '{}' -> '{}': dead-letter queue '{dead_letter}' is not declared",
                        binding.source, binding.target
                    )),
                    Some(ResourceKind::Queue) => {}
                    Some(kind) => violations.push(format!(
                        "event binding '{}' -> '{}': dead-letter target '{dead_letter}' is a {kind}, not a queue",
                        binding.source, binding.target
                    )),
                }
            }
        }

        for route in self.routes.values() {
            match kind_of(&route.principal) {
                None => violations.push(format!(
                    "route {} {}: principal '{}' is not declared",
                    route.method, route.path, route.principal
                )),
                Some(ResourceKind::Function) => {}
                Some(kind) => violations.push(format!(
                    "route {} {}: principal '{}' is a {kind}, not a function",
                    route.method, route.path, route.principal
                )),
            }
            if let AuthMode::IdentityDomain(domain_id) = &route.auth {
                match kind_of(domain_id) {
                    None => violations.push(format!(
                        "route {} {}: auth domain '{domain_id}' is not declared",
                        route.method, route.path
                    )),
                    Some(ResourceKind::IdentityDomain) => {}
                    Some(kind) => violations.push(format!(
                        "route {} {}: auth reference '{domain_id}' is a {kind}, not an identity domain",
                        route.method, route.path
                    )),
                }
            }
        }

        for (name, value) in &self.outputs {
            if let Some(referenced) = value.referenced_id() {
                if kind_of(referenced).is_none() {
                    violations.push(format!(
                        "output '{name}': references unknown resource '{referenced}'"
                    ));
                }
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{
        artifact_fingerprint, ApiRoute, BucketConfig, Capability, FunctionConfig, HttpMethod,
        KeyAttribute, RemovalPolicy, ResourceConfig, TableConfig,
    };

    fn labels_table() -> ResourceConfig {
        ResourceConfig::Table(TableConfig {
            partition_key: KeyAttribute::string("image"),
            sort_key: None,
            removal: RemovalPolicy::Retain,
        })
    }

    fn declare_detector_topology(topo: &mut TopologyBuilder) {
        topo.declare_resource("images", ResourceConfig::Bucket(BucketConfig::default()))
            .expect("declaration should pass");
        topo.declare_resource("labels", labels_table())
            .expect("declaration should pass");
        topo.declare_resource(
            "detector",
            ResourceConfig::Function(FunctionConfig::default()),
        )
        .expect("declaration should pass");
        topo.grant("detector", "images", [Capability::Read])
            .expect("grant should pass");
        topo.grant("detector", "labels", [Capability::Write])
            .expect("grant should pass");
    }

    #[test]
    fn render_emits_exactly_the_declared_set() {
        let mut topo = TopologyBuilder::new();
        declare_detector_topology(&mut topo);

        let artifact = topo.render().expect("render should pass");
        let ids: Vec<&str> = artifact
            .resources
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["images", "labels", "detector"]);
        assert_eq!(artifact.grants.len(), 2);
        assert!(artifact.event_bindings.is_empty());
        assert!(artifact.routes.is_empty());
    }

    #[test]
    fn render_is_idempotent_for_identical_declarations() {
        let mut first = TopologyBuilder::new();
        let mut second = TopologyBuilder::new();
        declare_detector_topology(&mut first);
        declare_detector_topology(&mut second);

        let artifact_a = first.render().expect("render should pass");
        let artifact_b = second.render().expect("render should pass");
        assert_eq!(
            artifact_fingerprint(&artifact_a),
            artifact_fingerprint(&artifact_b)
        );
    }

    #[test]
    fn re_render_yields_a_byte_identical_artifact() {
        let mut topo = TopologyBuilder::new();
        declare_detector_topology(&mut topo);

        let first = topo.render().expect("render should pass");
        let second = topo.render().expect("re-render should pass");
        assert_eq!(
            artifact_fingerprint(&first),
            artifact_fingerprint(&second)
        );
    }

    #[test]
    fn mutation_after_render_is_rejected() {
        let mut topo = TopologyBuilder::new();
        declare_detector_topology(&mut topo);
        topo.render().expect("render should pass");

        let error = topo
            .declare_resource("late", ResourceConfig::Bucket(BucketConfig::default()))
            .expect_err("declaration should fail");
        assert_eq!(error, TopologyError::ImmutableAfterRender);

        let error = topo
            .grant("detector", "images", [Capability::List])
            .expect_err("grant should fail");
        assert_eq!(error, TopologyError::ImmutableAfterRender);
    }

    #[test]
    fn render_aggregates_every_dangling_reference() {
        let mut topo = TopologyBuilder::new();
        declare_detector_topology(&mut topo);
        topo.set_output("imageBucket", ConfigValue::Ref("images".to_string()))
            .expect("output should pass");
        topo.remove_resource("images").expect("removal should pass");

        let error = topo.render().expect_err("render should fail");
        let violations = error.violations();
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .any(|violation| violation.contains("grant 'detector' -> 'images'")));
        assert!(violations
            .iter()
            .any(|violation| violation.contains("output 'imageBucket'")));
        assert!(!topo.is_rendered());
    }

    #[test]
    fn redeclared_resource_of_another_kind_invalidates_old_grants() {
        let mut topo = TopologyBuilder::new();
        declare_detector_topology(&mut topo);
        topo.remove_resource("images").expect("removal should pass");
        topo.declare_resource(
            "images",
            ResourceConfig::Queue(crate::model::QueueConfig::default()),
        )
        .expect("redeclaration should pass");

        let error = topo.render().expect_err("render should fail");
        assert!(error
            .violations()
            .iter()
            .any(|violation| violation.contains("capability 'read' does not apply to queue")));
    }

    #[test]
    fn declaration_order_of_independent_resources_is_preserved() {
        let mut forward = TopologyBuilder::new();
        forward
            .declare_resource("labels", labels_table())
            .expect("declaration should pass");
        forward
            .declare_resource("images", ResourceConfig::Bucket(BucketConfig::default()))
            .expect("declaration should pass");

        let artifact = forward.render().expect("render should pass");
        let ids: Vec<&str> = artifact
            .resources
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["labels", "images"]);
    }

    #[test]
    fn cycle_is_fatal_at_render_time() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource(
            "first",
            ResourceConfig::Function(FunctionConfig {
                environment: [("PEER".to_string(), ConfigValue::Ref("second".to_string()))]
                    .into_iter()
                    .collect(),
                ..FunctionConfig::default()
            }),
        )
        .expect("declaration should pass");
        topo.declare_resource(
            "second",
            ResourceConfig::Function(FunctionConfig {
                environment: [("PEER".to_string(), ConfigValue::Ref("first".to_string()))]
                    .into_iter()
                    .collect(),
                ..FunctionConfig::default()
            }),
        )
        .expect("declaration should pass");

        let error = topo.render().expect_err("render should fail");
        assert!(matches!(error, TopologyError::CyclicDependency { .. }));
        assert!(!topo.is_rendered());
    }

    #[test]
    fn outputs_resolve_refs_to_stable_ids() {
        let mut topo = TopologyBuilder::new();
        declare_detector_topology(&mut topo);
        topo.set_output("imageBucket", ConfigValue::Ref("images".to_string()))
            .expect("output should pass");
        topo.set_output(
            "deployStage",
            ConfigValue::Literal("prod".to_string()),
        )
        .expect("output should pass");

        let artifact = topo.render().expect("render should pass");
        assert_eq!(
            artifact.outputs,
            BTreeMap::from([
                ("deployStage".to_string(), "prod".to_string()),
                ("imageBucket".to_string(), "images".to_string()),
            ])
        );
    }

    #[test]
    fn routes_render_sorted_by_path_and_method() {
        let mut topo = TopologyBuilder::new();
        topo.declare_resource("svc", ResourceConfig::Function(FunctionConfig::default()))
            .expect("declaration should pass");
        topo.add_route(ApiRoute {
            path: "/images".to_string(),
            method: HttpMethod::Delete,
            principal: "svc".to_string(),
            auth: crate::model::AuthMode::Anonymous,
            parameters: BTreeMap::new(),
        })
        .expect("route should pass");
        topo.add_route(ApiRoute {
            path: "/health".to_string(),
            method: HttpMethod::Get,
            principal: "svc".to_string(),
            auth: crate::model::AuthMode::Anonymous,
            parameters: BTreeMap::new(),
        })
        .expect("route should pass");

        let artifact = topo.render().expect("render should pass");
        let paths: Vec<&str> = artifact
            .routes
            .iter()
            .map(|route| route.path.as_str())
            .collect();
        assert_eq!(paths, vec!["/health", "/images"]);
    }
}
