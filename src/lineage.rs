//! Lineage Builder
//!
//! Declares the fixed ten-step bundle of resources that moves one entity's
//! data from its source bucket into a governed, crawled target bucket:
//!
//! 1. target bucket
//! 2. copy job
//! 3. workflow
//! 4. on-demand trigger (copy job, inside the workflow)
//! 5. scheduled trigger (publish job)
//! 6. crawler over the target bucket
//! 7. conditional trigger (crawler after copy job success)
//! 8. object-created event rule starting the workflow
//! 9. data-location registration of the target bucket
//! 10. data-location access permission for the role
//!
//! Each step depends on the one before it, so the whole chain is linearly
//! ordered. All names are derived from `(unit path, project, entity)` so
//! that building twice with the same inputs yields the same names. The
//! readable part of a name only carries the unit's own name, so names end
//! in a digest of the full unit path to keep same-named units in different
//! subtrees apart.

use std::collections::BTreeMap;

use govgraph_types::{BucketConfig, GlueWorkflowConfig, RemovalPolicy, TriggerType};
use serde_json::json;
use tracing::debug;

use crate::error::GraphError;
use crate::graph::{short_digest, NodeId, ResourceGraph, RoleRef, Token};
use crate::resources::access::{create_data_location, create_data_location_permission};
use crate::resources::compute::{
    create_glue_crawler, create_glue_job, create_glue_trigger, create_glue_workflow, CrawlerSpec,
    JobSpec, TriggerAction, TriggerCondition, TriggerPredicate, TriggerSpec,
};
use crate::resources::events::{create_event_rule, EventRuleSpec, EventTarget};
use crate::resources::storage::{create_bucket, BucketHandle};

pub const COPY_SCRIPT: &str = "s3_object_copy.py";
pub const DEFAULT_PUBLISH_JOB: &str = "publish_project_assets";
pub const DEFAULT_JOB_TEMP_BUCKET_PREFIX: &str = "gluejob-output-bucket";
pub const DEFAULT_SCRIPT_LOCATION_PREFIX: &str = "s3://glue-scripts/";

// ============================================================================
// NAMING
// ============================================================================

/// Lower-case with all whitespace removed
pub fn compact(name: &str) -> String {
    name.split_whitespace().collect::<String>().to_lowercase()
}

/// Target bucket for a source bucket: `source-` prefix stripped, `target-` added
pub fn target_storage_name(source: &str) -> String {
    let stem = source.strip_prefix("source-").unwrap_or(source);
    format!("target-{}", stem).to_lowercase()
}

/// Catalog database the unit/project environment publishes into
pub fn database_name(unit: &str, project: &str) -> String {
    format!("env_{}_{}_pub_db", compact(unit), compact(project))
}

/// `parentUnit/unit/entityType`; the parent segment is omitted for top-level units
pub fn entity_path(parent_unit: Option<&str>, unit: &str, entity_type: &str) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(3);
    if let Some(parent) = parent_unit.map(compact).filter(|p| !p.is_empty()) {
        segments.push(parent);
    }
    segments.push(compact(unit));
    segments.push(compact(entity_type));
    segments.join("/")
}

/// Resource names of one bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageNames {
    pub target_bucket: String,
    pub job: String,
    pub workflow: String,
    pub on_demand_trigger: String,
    pub scheduled_trigger: String,
    pub crawler: String,
    pub conditional_trigger: String,
    pub event_rule: String,
    pub data_location: String,
    pub data_location_permission: String,
    pub table_prefix: String,
    pub entity_path: String,
}

impl LineageNames {
    pub fn derive(
        source_location: &str,
        parent_unit: Option<&str>,
        unit: &str,
        unit_path: &str,
        project: &str,
        entity_type: &str,
    ) -> Self {
        let stem = format!(
            "{}-{}-{}-{}",
            compact(unit),
            compact(project),
            compact(entity_type),
            short_digest([unit_path, project, entity_type])
        );
        let target_bucket = target_storage_name(source_location);
        Self {
            job: format!("gluejob-{}", stem),
            workflow: format!("workflow-{}", stem),
            on_demand_trigger: format!("trigger-{}", stem),
            scheduled_trigger: format!("scheduledtrigger-{}", stem),
            crawler: format!("crawler-{}", stem),
            conditional_trigger: format!("trigger-crawler-{}", stem),
            event_rule: format!("rule-{}", stem),
            data_location: target_bucket.clone(),
            data_location_permission: format!("{}-permission", target_bucket),
            table_prefix: format!("{}_", compact(entity_type)),
            entity_path: entity_path(parent_unit, unit, entity_type),
            target_bucket,
        }
    }

    /// Every derived resource name, in step order
    pub fn all(&self) -> [&str; 10] {
        [
            &self.target_bucket,
            &self.job,
            &self.workflow,
            &self.on_demand_trigger,
            &self.scheduled_trigger,
            &self.crawler,
            &self.conditional_trigger,
            &self.event_rule,
            &self.data_location,
            &self.data_location_permission,
        ]
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Run-wide lineage settings
#[derive(Debug, Clone)]
pub struct LineageSettings {
    pub script_location_prefix: String,
    pub job_temp_bucket_prefix: String,
    pub publish_job_name: String,
    /// Prefix joined in front of the entity path for the publish job
    pub entity_path_root: String,
    pub sql_assets_bucket: Option<Token>,
    pub mapper_bucket: Option<Token>,
    /// Node of the publish job, when it is declared in this run
    pub publish_job: Option<NodeId>,
}

impl Default for LineageSettings {
    fn default() -> Self {
        Self {
            script_location_prefix: DEFAULT_SCRIPT_LOCATION_PREFIX.to_string(),
            job_temp_bucket_prefix: DEFAULT_JOB_TEMP_BUCKET_PREFIX.to_string(),
            publish_job_name: DEFAULT_PUBLISH_JOB.to_string(),
            entity_path_root: String::new(),
            sql_assets_bucket: None,
            mapper_bucket: None,
            publish_job: None,
        }
    }
}

/// Inputs of one lineage bundle
#[derive(Debug, Clone)]
pub struct LineageRequest<'a> {
    pub source_location: &'a str,
    /// Declared bucket behind `source_location`, if any
    pub source_bucket: Option<&'a BucketHandle>,
    pub unit_name: &'a str,
    pub parent_unit_name: Option<&'a str>,
    /// Unique path of the unit in the hierarchy
    pub unit_path: &'a str,
    pub project_name: &'a str,
    pub role: &'a RoleRef,
    pub database_name: &'a str,
    pub domain_id: Token,
    pub project_id: Token,
    pub schedule_expression: &'a str,
    pub entity_type: &'a str,
    /// Nodes the first step must wait for
    pub after: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LineageBundle {
    pub source_location: String,
    pub names: LineageNames,
    pub target_storage: BucketHandle,
    pub job: NodeId,
    pub workflow: NodeId,
    pub on_demand_trigger: NodeId,
    pub scheduled_trigger: NodeId,
    pub crawler: NodeId,
    pub conditional_trigger: NodeId,
    pub event_rule: NodeId,
    pub access_resource: NodeId,
    pub access_grant: NodeId,
}

impl LineageBundle {
    /// Nodes in step order
    pub fn steps(&self) -> [NodeId; 10] {
        [
            self.target_storage.node,
            self.job,
            self.workflow,
            self.on_demand_trigger,
            self.scheduled_trigger,
            self.crawler,
            self.conditional_trigger,
            self.event_rule,
            self.access_resource,
            self.access_grant,
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineageBuilder {
    settings: LineageSettings,
}

impl LineageBuilder {
    pub fn new(settings: LineageSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LineageSettings {
        &self.settings
    }

    pub fn build(
        &self,
        graph: &mut ResourceGraph,
        request: &LineageRequest<'_>,
    ) -> Result<LineageBundle, GraphError> {
        let names = LineageNames::derive(
            request.source_location,
            request.parent_unit_name,
            request.unit_name,
            request.unit_path,
            request.project_name,
            request.entity_type,
        );
        let role_arn = request.role.arn();
        let source_name = match request.source_bucket {
            Some(bucket) => bucket.bucket_name(),
            None => Token::literal(request.source_location),
        };

        // 1. target bucket
        let target = create_bucket(
            graph,
            &names.target_bucket,
            &BucketConfig {
                removal_policy: Some(RemovalPolicy::Destroy),
                auto_delete_objects: Some(true),
                ..Default::default()
            },
        )?;
        graph.depend_on_all(target.node, request.after.iter().copied())?;
        let target_name = target.bucket_name();

        // 2. copy job
        let mut arguments = BTreeMap::new();
        arguments.insert("--SOURCE_BUCKET".to_string(), source_name.clone());
        arguments.insert("--TARGET_BUCKET".to_string(), target_name.clone());
        arguments.insert(
            "--TempDir".to_string(),
            Token::join([
                Token::literal(format!("s3://{}-", self.settings.job_temp_bucket_prefix)),
                Token::AccountId,
                Token::literal("-"),
                Token::Region,
                Token::literal("/temp/"),
            ]),
        );
        arguments.insert(
            "--job-bookmark-option".to_string(),
            Token::literal("job-bookmark-enable"),
        );
        let job = create_glue_job(
            graph,
            &JobSpec {
                name: names.job.clone(),
                role: role_arn.clone(),
                command: "glueetl".to_string(),
                python_version: Some("3".to_string()),
                script_location: Token::literal(format!(
                    "{}{}",
                    self.settings.script_location_prefix, COPY_SCRIPT
                )),
                arguments,
                description: Some(format!(
                    "Copy objects from source to target for {}",
                    request.project_name
                )),
                max_concurrent_runs: Some(1),
                glue_version: Some("5.0".to_string()),
                number_of_workers: Some(2),
                timeout: Some(120),
                worker_type: Some("G.1X".to_string()),
                job_run_queuing_enabled: Some(true),
                max_retries: None,
            },
        )?;
        graph.add_dependency(job, target.node)?;
        if let Some(source) = request.source_bucket {
            graph.add_dependency(job, source.node)?;
        }

        // 3. workflow
        let workflow = create_glue_workflow(
            graph,
            &names.workflow,
            &GlueWorkflowConfig {
                description: Some(format!("Workflow for {}", request.project_name)),
                ..Default::default()
            },
        )?;
        graph.add_dependency(workflow, job)?;

        // 4. on-demand trigger
        let on_demand_trigger = create_glue_trigger(
            graph,
            &TriggerSpec {
                name: names.on_demand_trigger.clone(),
                trigger_type: TriggerType::OnDemand,
                actions: vec![TriggerAction::job(&names.job)],
                description: Some(format!("Trigger for the workflow {}", names.workflow)),
                start_on_creation: Some(false),
                workflow_name: Some(names.workflow.clone()),
                predicate: None,
                schedule: None,
            },
        )?;
        graph.depend_on_all(on_demand_trigger, [job, workflow])?;

        // 5. scheduled publish trigger
        let scheduled_trigger = create_glue_trigger(
            graph,
            &TriggerSpec {
                name: names.scheduled_trigger.clone(),
                trigger_type: TriggerType::Scheduled,
                actions: vec![self.publish_action(request, &names, target_name.clone())],
                description: Some(format!(
                    "Scheduled trigger for the job {}",
                    self.settings.publish_job_name
                )),
                start_on_creation: Some(true),
                workflow_name: None,
                predicate: None,
                schedule: Some(request.schedule_expression.to_string()),
            },
        )?;
        graph.add_dependency(scheduled_trigger, on_demand_trigger)?;
        if let Some(publish_job) = self.settings.publish_job {
            graph.add_dependency(scheduled_trigger, publish_job)?;
        }

        // 6. crawler
        let crawler = create_glue_crawler(
            graph,
            &CrawlerSpec {
                name: names.crawler.clone(),
                role: role_arn.clone(),
                database_name: request.database_name.to_string(),
                description: format!("Crawler for {}", names.target_bucket),
                target_bucket: target_name.clone(),
                table_prefix: names.table_prefix.clone(),
            },
        )?;
        graph.depend_on_all(crawler, [target.node, scheduled_trigger])?;

        // 7. conditional crawler trigger
        let conditional_trigger = create_glue_trigger(
            graph,
            &TriggerSpec {
                name: names.conditional_trigger.clone(),
                trigger_type: TriggerType::Conditional,
                actions: vec![TriggerAction::crawler(&names.crawler)],
                description: Some(format!("Trigger the crawler for {}", request.project_name)),
                start_on_creation: Some(true),
                workflow_name: Some(names.workflow.clone()),
                predicate: Some(TriggerPredicate {
                    logical: None,
                    conditions: vec![TriggerCondition {
                        job_name: Some(names.job.clone()),
                        crawler_name: None,
                        state: "SUCCEEDED".to_string(),
                        logical_operator: "EQUALS".to_string(),
                    }],
                }),
                schedule: None,
            },
        )?;
        graph.depend_on_all(conditional_trigger, [crawler, job, workflow])?;

        // 8. object-created rule
        let event_rule = create_event_rule(
            graph,
            &EventRuleSpec {
                name: names.event_rule.clone(),
                description: Some(format!(
                    "Trigger workflow for {} on object creation",
                    request.project_name
                )),
                enabled: true,
                event_bus: Some("default".to_string()),
                source: vec!["aws.s3".to_string()],
                detail_type: vec!["Object Created".to_string()],
                detail: Some(json!({ "bucket": { "name": [source_name] } })),
                targets: vec![EventTarget::StartWorkflowRun {
                    workflow_name: names.workflow.clone(),
                }],
            },
        )?;
        graph.depend_on_all(event_rule, [conditional_trigger, workflow])?;

        // 9. data-location registration
        let access_resource =
            create_data_location(graph, &names.data_location, target_name.clone(), role_arn.clone())?;
        graph.depend_on_all(access_resource, [event_rule, target.node])?;

        // 10. data-location permission
        let access_grant = create_data_location_permission(
            graph,
            &names.data_location_permission,
            role_arn,
            target_name,
        )?;
        graph.add_dependency(access_grant, access_resource)?;

        debug!(
            unit = request.unit_name,
            project = request.project_name,
            entity = request.entity_type,
            target = %names.target_bucket,
            "Built lineage bundle"
        );

        Ok(LineageBundle {
            source_location: request.source_location.to_string(),
            names,
            target_storage: target,
            job,
            workflow,
            on_demand_trigger,
            scheduled_trigger,
            crawler,
            conditional_trigger,
            event_rule,
            access_resource,
            access_grant,
        })
    }

    fn publish_action(
        &self,
        request: &LineageRequest<'_>,
        names: &LineageNames,
        target_name: Token,
    ) -> TriggerAction {
        let mut arguments = BTreeMap::new();
        if let Some(bucket) = &self.settings.sql_assets_bucket {
            arguments.insert("--source_bucket_name".to_string(), bucket.clone());
        }
        if let Some(bucket) = &self.settings.mapper_bucket {
            arguments.insert("--mapper_bucket_name".to_string(), bucket.clone());
        }
        arguments.insert(
            "--project_name".to_string(),
            Token::literal(request.project_name),
        );
        arguments.insert("--data_bucket_name".to_string(), target_name);
        arguments.insert(
            "--entity_prefix".to_string(),
            Token::literal(format!("{}{}", self.settings.entity_path_root, names.entity_path)),
        );
        arguments.insert("--domain_id".to_string(), request.domain_id.clone());
        arguments.insert("--project_id".to_string(), request.project_id.clone());

        TriggerAction {
            job_name: Some(self.settings.publish_job_name.clone()),
            arguments,
            ..Default::default()
        }
    }
}
