//! Top-level orchestrator
//!
//! Turns the two configuration documents into one [`ProvisioningOutput`]:
//! flat resources first (buckets, roles, glue jobs/workflows/triggers,
//! domain, users, blueprint, data-lake settings, event rules), then the
//! domain hierarchy, then a topological plan over the finished graph.
//!
//! The grant issuer is constructed once at the top of the run and handed
//! down by reference.

use std::collections::BTreeMap;

use govgraph_types::{
    BucketPurpose, EventRuleConfig, HierarchyDocument, JobPurpose, PolicyType,
    RequirementsDocument, RolePurpose,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::diagnostics::{DiagnosticKind, Diagnostics, Synthesis};
use crate::error::{ProvisionError, Result};
use crate::grants::{Clock, ExecutionRole, Grant, GrantIssuer, GrantPrincipal, SystemClock};
use crate::graph::{
    build_provisioning_plan, describe_plan, NodeId, ProvisioningPlan, ResourceGraph, RoleRef,
    Template, Token,
};
use crate::hierarchy::{HierarchyWalker, UnitOutcome, WalkContext};
use crate::lineage::{
    LineageBuilder, LineageSettings, DEFAULT_JOB_TEMP_BUCKET_PREFIX, DEFAULT_PUBLISH_JOB,
    DEFAULT_SCRIPT_LOCATION_PREFIX,
};
use crate::resources::access::create_data_lake_settings;
use crate::resources::compute::{
    create_glue_job, create_glue_trigger, create_glue_workflow, JobSpec, TriggerSpec,
};
use crate::resources::events::{create_event_rule, EventRuleSpec, EventTarget};
use crate::resources::governance::{create_blueprint, create_domain};
use crate::resources::identity::{create_iam_role, create_user_profile};
use crate::resources::storage::create_bucket;
use crate::resources::{BlueprintHandle, BucketTable, DomainHandle, RoleTable, UserTable};

/// Scope id of the domain-wide member-pool grant
pub const ALL_USERS_GRANT_ID: &str = "project-member-all-user-grant-permissions";

/// Role environments and lineage run as when none is declared
pub const DEFAULT_PROVISIONING_ROLE: &str = "AmazonDatazoneGlueProvisioningRole";

/// Everything one run produced
#[derive(Debug)]
pub struct ProvisioningOutput {
    pub synthesis: Synthesis,
    pub plan: ProvisioningPlan,
    pub domain: Option<DomainHandle>,
    pub units: Vec<UnitOutcome>,
}

impl ProvisioningOutput {
    pub fn graph(&self) -> &ResourceGraph {
        &self.synthesis.graph
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.synthesis.diagnostics
    }

    pub fn template(&self) -> Template {
        let description = match &self.domain {
            Some(domain) => format!("Governance domain {}", domain.name),
            None => "Governance resources".to_string(),
        };
        Template::from_graph(&self.synthesis.graph, &self.plan).with_description(description)
    }

    /// Dry-run rendering of the plan
    pub fn describe(&self) -> String {
        describe_plan(&self.synthesis.graph, &self.plan)
    }
}

pub fn synthesize(
    requirements: &RequirementsDocument,
    hierarchy: &HierarchyDocument,
) -> Result<ProvisioningOutput> {
    synthesize_with_clock(requirements, hierarchy, SystemClock)
}

/// Like [`synthesize`], with the clock forced grants take their timestamp from
pub fn synthesize_with_clock(
    requirements: &RequirementsDocument,
    hierarchy: &HierarchyDocument,
    clock: impl Clock + 'static,
) -> Result<ProvisioningOutput> {
    let mut stack = StackBuilder::new(requirements, clock)?;
    stack.create_buckets()?;
    stack.create_roles()?;
    stack.create_glue_resources()?;
    stack.create_domain(hierarchy.domain_name.as_deref())?;
    stack.create_users()?;
    stack.create_blueprint()?;
    stack.create_data_lake_settings()?;
    stack.create_event_rules()?;
    let units = stack.create_hierarchy(hierarchy)?;

    let plan = build_provisioning_plan(&stack.syn.graph)?;
    info!(
        nodes = stack.syn.graph.len(),
        edges = stack.syn.graph.edge_count(),
        phases = plan.phases.len(),
        diagnostics = stack.syn.diagnostics.len(),
        "Synthesized provisioning graph"
    );

    Ok(ProvisioningOutput {
        synthesis: stack.syn,
        plan,
        domain: stack.domain,
        units,
    })
}

struct StackBuilder<'r> {
    requirements: &'r RequirementsDocument,
    syn: Synthesis,
    execution: ExecutionRole,
    issuer: GrantIssuer,
    buckets: BucketTable,
    roles: RoleTable,
    users: UserTable,
    jobs: BTreeMap<String, NodeId>,
    workflows: BTreeMap<String, NodeId>,
    publish_job: Option<(String, NodeId)>,
    domain: Option<DomainHandle>,
    blueprint: Option<BlueprintHandle>,
    data_lake_settings: Option<NodeId>,
}

impl<'r> StackBuilder<'r> {
    fn new(requirements: &'r RequirementsDocument, clock: impl Clock + 'static) -> Result<Self> {
        let mut syn = Synthesis::new();
        let execution = ExecutionRole::resolve(requirements.settings.qualifier.as_deref())?;
        let issuer = GrantIssuer::with_clock(&mut syn.graph, &execution, clock)?;
        Ok(Self {
            requirements,
            syn,
            execution,
            issuer,
            buckets: BucketTable::new(),
            roles: RoleTable::default(),
            users: UserTable::new(),
            jobs: BTreeMap::new(),
            workflows: BTreeMap::new(),
            publish_job: None,
            domain: None,
            blueprint: None,
            data_lake_settings: None,
        })
    }

    fn create_buckets(&mut self) -> Result<()> {
        for (name, config) in &self.requirements.resources.s3_buckets {
            let bucket = create_bucket(&mut self.syn.graph, name, config)?;
            self.buckets.insert(bucket);
        }
        Ok(())
    }

    fn create_roles(&mut self) -> Result<()> {
        for (name, config) in &self.requirements.resources.iam_roles {
            let role = create_iam_role(&mut self.syn.graph, name, config)?;
            self.roles.insert(role);
        }
        Ok(())
    }

    fn create_glue_resources(&mut self) -> Result<()> {
        let resources = &self.requirements.resources;
        let script_prefix = self
            .requirements
            .settings
            .script_location_prefix
            .as_deref()
            .unwrap_or(DEFAULT_SCRIPT_LOCATION_PREFIX);

        for (name, config) in &resources.glue_jobs {
            let mut spec = JobSpec::from_config(name, config, script_prefix);
            let role = self.roles.get(&config.glue_job_role).map(|r| (r.arn(), r.node));
            if let Some((arn, _)) = &role {
                spec.role = arn.clone();
            }
            let node = create_glue_job(&mut self.syn.graph, &spec)?;
            if let Some((_, role_node)) = role {
                self.syn.graph.add_dependency(node, role_node)?;
            }
            if config.purpose == Some(JobPurpose::AssetPublishing) && self.publish_job.is_none() {
                self.publish_job = Some((name.clone(), node));
            }
            self.jobs.insert(name.clone(), node);
        }

        for (name, config) in &resources.glue_workflows {
            let node = create_glue_workflow(&mut self.syn.graph, name, config)?;
            if let Some((_, publish_job)) = &self.publish_job {
                self.syn.graph.add_dependency(node, *publish_job)?;
            }
            self.workflows.insert(name.clone(), node);
        }

        for (name, config) in &resources.glue_triggers {
            let spec = TriggerSpec::from_config(name, config);
            let node = create_glue_trigger(&mut self.syn.graph, &spec)?;
            for referenced in spec.referenced_names() {
                let prerequisite = self
                    .jobs
                    .get(referenced)
                    .or_else(|| self.workflows.get(referenced));
                match prerequisite {
                    Some(&prerequisite) => {
                        self.syn.graph.add_dependency(node, prerequisite)?;
                    }
                    None => debug!(
                        trigger = %name,
                        referenced,
                        "Trigger refers to a resource outside the requirements document"
                    ),
                }
            }
        }
        Ok(())
    }

    /// The domain named by the hierarchy document, else the first one declared
    fn create_domain(&mut self, preferred: Option<&str>) -> Result<()> {
        let domains = &self.requirements.resources.datazone_domains;
        let selected = preferred
            .and_then(|name| domains.get_key_value(name))
            .or_else(|| domains.iter().next());
        let Some((name, config)) = selected else {
            return Ok(());
        };

        for ignored in domains.keys().filter(|k| *k != name) {
            self.syn.diagnostics.warn(
                DiagnosticKind::IgnoredConfig,
                ignored.as_str(),
                format!("Only one domain is provisioned per run; using '{}'", name),
            );
        }

        let domain = create_domain(&mut self.syn.graph, name, config)?;
        if let Some(role) = self.roles.by_purpose(RolePurpose::DomainExecution) {
            self.syn.graph.add_dependency(domain.node, role.node)?;
        }

        self.issuer.issue(
            &mut self.syn.graph,
            ALL_USERS_GRANT_ID,
            &Grant::on_unit(
                domain.domain_id(),
                domain.root_unit_id(),
                GrantPrincipal::AllUsers,
                PolicyType::AddToProjectMemberPool,
            )
            .including_descendants(),
        )?;

        info!(domain = %name, "Created domain");
        self.domain = Some(domain);
        Ok(())
    }

    fn create_users(&mut self) -> Result<()> {
        for (key, config) in &self.requirements.resources.datazone_users {
            let Some(domain) = &self.domain else {
                self.syn.diagnostics.warn(
                    DiagnosticKind::MissingPrerequisite,
                    key.as_str(),
                    "User profile not created: domain is missing",
                );
                continue;
            };
            let user = create_user_profile(&mut self.syn.graph, key, config, domain)?;
            self.users.insert(user);
        }
        Ok(())
    }

    fn create_blueprint(&mut self) -> Result<()> {
        let Some(config) = &self.requirements.resources.datazone_blueprints else {
            return Ok(());
        };
        let Some(domain) = &self.domain else {
            self.syn.diagnostics.warn(
                DiagnosticKind::MissingPrerequisite,
                config.environment_blueprint_identifier.as_str(),
                "Blueprint configuration not created: domain is missing",
            );
            return Ok(());
        };

        let bucket = self.buckets.by_purpose(BucketPurpose::Blueprint);
        let blueprint = create_blueprint(
            &mut self.syn.graph,
            config,
            domain,
            bucket.map(|b| b.bucket_name()),
        )?;
        self.syn.graph.add_dependency(blueprint.node, domain.node)?;
        if let Some(bucket) = bucket {
            self.syn.graph.add_dependency(blueprint.node, bucket.node)?;
        }
        self.blueprint = Some(blueprint);
        Ok(())
    }

    /// Needed when configured, and whenever the hierarchy will be walked
    fn create_data_lake_settings(&mut self) -> Result<()> {
        let configured = self.requirements.resources.datalake_settings.as_ref();
        if configured.is_none() && !self.can_walk() {
            return Ok(());
        }

        let mut admins: Vec<Token> = configured
            .map(|c| c.admins.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|name| match self.roles.get(name) {
                Some(role) => role.arn(),
                None => RoleRef::named(name).arn(),
            })
            .collect();
        admins.push(self.execution.arn());

        let node = create_data_lake_settings(&mut self.syn.graph, &admins)?;
        for purpose in [RolePurpose::GlueProvisioning, RolePurpose::GlueManageAccess] {
            if let Some(role) = self.roles.by_purpose(purpose) {
                self.syn.graph.add_dependency(node, role.node)?;
            }
        }
        self.data_lake_settings = Some(node);
        Ok(())
    }

    fn create_event_rules(&mut self) -> Result<()> {
        for (name, config) in &self.requirements.resources.event_bridge_rules {
            let targets = config
                .targets
                .iter()
                .map(|t| EventTarget::from_config(name, t))
                .collect::<Result<Vec<_>, ProvisionError>>()?;

            let scoped_to_domain = config
                .event_pattern
                .source
                .iter()
                .any(|s| s == "aws.datazone");
            let mut prerequisites = Vec::new();
            let detail = if scoped_to_domain {
                let Some(domain) = &self.domain else {
                    self.syn.diagnostics.warn(
                        DiagnosticKind::MissingPrerequisite,
                        name.as_str(),
                        "Event rule not created: domain is missing",
                    );
                    continue;
                };
                prerequisites.push(domain.node);
                Some(json!({ "metadata": { "domain": [domain.domain_id()] } }))
            } else {
                self.resolve_bucket_names(config, &mut prerequisites)
            };

            let spec = EventRuleSpec {
                name: name.clone(),
                description: config.description.clone(),
                enabled: config.enabled.unwrap_or(true),
                event_bus: config.event_bus.clone(),
                source: config.event_pattern.source.clone(),
                detail_type: config.event_pattern.detail_type.clone(),
                detail,
                targets,
            };
            for target in &spec.targets {
                if let Some(&workflow) = self.workflows.get(target.target_name()) {
                    prerequisites.push(workflow);
                }
            }

            let node = create_event_rule(&mut self.syn.graph, &spec)?;
            self.syn.graph.depend_on_all(node, prerequisites)?;
        }
        Ok(())
    }

    /// Replace declared bucket names under `detail.bucket.name` by their
    /// physical names, collecting the bucket nodes as prerequisites
    fn resolve_bucket_names(
        &self,
        config: &EventRuleConfig,
        prerequisites: &mut Vec<NodeId>,
    ) -> Option<Value> {
        let mut detail = config.event_pattern.detail.clone()?;
        if let Some(names) = detail
            .pointer_mut("/bucket/name")
            .and_then(Value::as_array_mut)
        {
            for name in names.iter_mut() {
                let Some(bucket) = name.as_str().and_then(|n| self.buckets.get(n)) else {
                    continue;
                };
                prerequisites.push(bucket.node);
                *name = bucket.bucket_name().to_json();
            }
        }
        Some(detail)
    }

    fn can_walk(&self) -> bool {
        self.domain.is_some() && self.roles.by_purpose(RolePurpose::DomainExecution).is_some()
    }

    fn create_hierarchy(&mut self, hierarchy: &HierarchyDocument) -> Result<Vec<UnitOutcome>> {
        let domain = match (&self.domain, self.can_walk()) {
            (Some(domain), true) => domain,
            _ => {
                if !hierarchy.units.is_empty() {
                    self.syn.diagnostics.warn(
                        DiagnosticKind::MissingPrerequisite,
                        "domainUnits",
                        "Domain hierarchy not created: domain or domain execution role is missing",
                    );
                }
                return Ok(Vec::new());
            }
        };

        let provisioning_role = self
            .roles
            .by_purpose(RolePurpose::GlueProvisioning)
            .map(|r| r.role_ref())
            .unwrap_or_else(|| RoleRef::named(DEFAULT_PROVISIONING_ROLE));
        let lineage = LineageBuilder::new(self.lineage_settings());

        let ctx = WalkContext {
            domain,
            blueprint: self.blueprint.as_ref(),
            users: &self.users,
            buckets: &self.buckets,
            issuer: &self.issuer,
            execution: &self.execution,
            provisioning_role: &provisioning_role,
            lineage: &lineage,
            data_lake_settings: self.data_lake_settings,
        };
        HierarchyWalker::new(ctx).walk(&mut self.syn, &hierarchy.units)
    }

    fn lineage_settings(&self) -> LineageSettings {
        let settings = &self.requirements.settings;
        let publish_job_name = settings
            .publish_job_name
            .clone()
            .or_else(|| self.publish_job.as_ref().map(|(name, _)| name.clone()))
            .unwrap_or_else(|| DEFAULT_PUBLISH_JOB.to_string());
        let publish_job = self.jobs.get(&publish_job_name).copied();

        LineageSettings {
            script_location_prefix: settings
                .script_location_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_SCRIPT_LOCATION_PREFIX.to_string()),
            job_temp_bucket_prefix: settings
                .job_temp_bucket_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_JOB_TEMP_BUCKET_PREFIX.to_string()),
            publish_job_name,
            entity_path_root: settings.entity_path_root.clone().unwrap_or_default(),
            sql_assets_bucket: self
                .buckets
                .by_purpose(BucketPurpose::SqlAssets)
                .map(|b| b.bucket_name()),
            mapper_bucket: self
                .buckets
                .by_purpose(BucketPurpose::MapperConfigs)
                .map(|b| b.bucket_name()),
            publish_job,
        }
    }
}
