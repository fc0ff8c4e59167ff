//! Glue jobs, workflows, triggers and crawlers

use std::collections::BTreeMap;

use govgraph_types::{GlueJobConfig, GlueTriggerConfig, GlueWorkflowConfig, TriggerType};
use serde::Serialize;
use serde_json::json;

use crate::error::GraphError;
use crate::graph::{NodeId, ResourceGraph, ResourceKind, RoleRef, Token};

// ============================================================================
// JOBS
// ============================================================================

/// A job declaration with deferred argument values
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub name: String,
    pub role: Token,
    pub command: String,
    pub python_version: Option<String>,
    pub script_location: Token,
    pub arguments: BTreeMap<String, Token>,
    pub description: Option<String>,
    pub max_concurrent_runs: Option<u32>,
    pub glue_version: Option<String>,
    pub number_of_workers: Option<u32>,
    pub timeout: Option<u32>,
    pub worker_type: Option<String>,
    pub job_run_queuing_enabled: Option<bool>,
    pub max_retries: Option<u32>,
}

impl JobSpec {
    /// Job from a requirements entry; scripts live under `script_prefix`
    pub fn from_config(name: &str, config: &GlueJobConfig, script_prefix: &str) -> Self {
        let script = config.script_name.as_deref().unwrap_or("");
        Self {
            name: name.to_string(),
            role: RoleRef::named(&config.glue_job_role).arn(),
            command: config.glue_job_type.clone().unwrap_or_else(|| "glueetl".to_string()),
            python_version: config.python_version.clone(),
            script_location: Token::literal(format!("{}{}", script_prefix, script)),
            arguments: config
                .glue_job_arguments
                .iter()
                .map(|(k, v)| (k.clone(), Token::literal(v.as_str())))
                .collect(),
            description: config.description.clone(),
            max_concurrent_runs: config.max_concurrent_runs,
            glue_version: config.glue_version.clone(),
            number_of_workers: config.number_of_workers,
            timeout: config.timeout,
            worker_type: config.worker_type.clone(),
            job_run_queuing_enabled: config.job_run_queuing_enabled,
            max_retries: config.max_retries,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct JobProperties<'a> {
    name: &'a str,
    role: &'a Token,
    command: serde_json::Value,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    default_arguments: &'a BTreeMap<String, Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_property: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    glue_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    number_of_workers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_run_queuing_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,
}

pub fn create_glue_job(graph: &mut ResourceGraph, spec: &JobSpec) -> Result<NodeId, GraphError> {
    let properties = JobProperties {
        name: &spec.name,
        role: &spec.role,
        command: json!({
            "Name": spec.command,
            "PythonVersion": spec.python_version,
            "ScriptLocation": spec.script_location,
        }),
        default_arguments: &spec.arguments,
        description: spec.description.as_deref(),
        execution_property: spec
            .max_concurrent_runs
            .map(|n| json!({ "MaxConcurrentRuns": n })),
        glue_version: spec.glue_version.as_deref(),
        number_of_workers: spec.number_of_workers,
        timeout: spec.timeout,
        worker_type: spec.worker_type.as_deref(),
        job_run_queuing_enabled: spec.job_run_queuing_enabled,
        max_retries: spec.max_retries,
    };
    graph.add(format!("GlueJob-{}", spec.name), ResourceKind::GlueJob, &properties)
}

// ============================================================================
// WORKFLOWS
// ============================================================================

pub fn create_glue_workflow(
    graph: &mut ResourceGraph,
    name: &str,
    config: &GlueWorkflowConfig,
) -> Result<NodeId, GraphError> {
    let mut properties = json!({ "Name": name });
    if let Some(description) = &config.description {
        properties["Description"] = json!(description);
    }
    if !config.default_run_properties.is_empty() {
        properties["DefaultRunProperties"] = json!(config.default_run_properties);
    }
    if let Some(max) = config.max_concurrent_runs {
        properties["MaxConcurrentRuns"] = json!(max);
    }
    graph.add(format!("GlueWorkflow-{}", name), ResourceKind::GlueWorkflow, &properties)
}

// ============================================================================
// TRIGGERS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawler_name: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl TriggerAction {
    pub fn job(name: impl Into<String>) -> Self {
        Self {
            job_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn crawler(name: impl Into<String>) -> Self {
        Self {
            crawler_name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Single predicate condition, e.g. job `X` state `SUCCEEDED`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawler_name: Option<String>,
    pub state: String,
    pub logical_operator: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerPredicate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical: Option<String>,
    pub conditions: Vec<TriggerCondition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerSpec {
    pub name: String,
    #[serde(rename = "Type")]
    pub trigger_type: TriggerType,
    pub actions: Vec<TriggerAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_on_creation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<TriggerPredicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

impl TriggerSpec {
    pub fn from_config(name: &str, config: &GlueTriggerConfig) -> Self {
        Self {
            name: name.to_string(),
            trigger_type: config.trigger_type,
            actions: config
                .actions
                .iter()
                .map(|a| TriggerAction {
                    job_name: a.job_name.clone(),
                    crawler_name: a.crawler_name.clone(),
                    arguments: a
                        .arguments
                        .iter()
                        .map(|(k, v)| (k.clone(), Token::literal(v.as_str())))
                        .collect(),
                    timeout: a.timeout,
                })
                .collect(),
            description: config.description.clone(),
            start_on_creation: config.start_on_creation,
            workflow_name: config.workflow_name.clone(),
            predicate: config.predicate.as_ref().map(|p| TriggerPredicate {
                logical: p.logical.clone(),
                conditions: p
                    .conditions
                    .iter()
                    .map(|c| TriggerCondition {
                        job_name: c.job_name.clone(),
                        crawler_name: c.crawler_name.clone(),
                        state: c.state.clone(),
                        logical_operator: c.logical_operator.clone(),
                    })
                    .collect(),
            }),
            schedule: config.schedule.clone(),
        }
    }

    /// Names of jobs, crawlers and the workflow this trigger refers to
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for action in &self.actions {
            names.extend(action.job_name.as_deref());
            names.extend(action.crawler_name.as_deref());
        }
        if let Some(predicate) = &self.predicate {
            for condition in &predicate.conditions {
                names.extend(condition.job_name.as_deref());
                names.extend(condition.crawler_name.as_deref());
            }
        }
        names.extend(self.workflow_name.as_deref());
        names
    }
}

pub fn create_glue_trigger(
    graph: &mut ResourceGraph,
    spec: &TriggerSpec,
) -> Result<NodeId, GraphError> {
    graph.add(format!("GlueTrigger-{}", spec.name), ResourceKind::GlueTrigger, spec)
}

// ============================================================================
// CRAWLERS
// ============================================================================

#[derive(Debug, Clone)]
pub struct CrawlerSpec {
    pub name: String,
    pub role: Token,
    pub database_name: String,
    pub description: String,
    /// Bucket name the crawler scans
    pub target_bucket: Token,
    pub table_prefix: String,
}

pub fn create_glue_crawler(
    graph: &mut ResourceGraph,
    spec: &CrawlerSpec,
) -> Result<NodeId, GraphError> {
    let configuration = json!({
        "Version": 1.0,
        "Grouping": {
            "TableLevelConfiguration": 1,
            "TableGroupingPolicy": "CombineCompatibleSchemas"
        },
        "CreatePartitionIndex": false
    });
    let path = Token::join([
        Token::literal("s3://"),
        spec.target_bucket.clone(),
        Token::literal("/"),
    ]);

    graph.add(
        format!("GlueCrawler-{}", spec.name),
        ResourceKind::GlueCrawler,
        &json!({
            "Name": spec.name,
            "Role": spec.role,
            "DatabaseName": spec.database_name,
            "Description": spec.description,
            "Targets": { "S3Targets": [{ "Path": path }] },
            "TablePrefix": spec.table_prefix,
            "Configuration": configuration.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use govgraph_types::{TriggerActionConfig, TriggerCondition as ConditionConfig};

    #[test]
    fn test_job_from_config() {
        let config = GlueJobConfig {
            glue_job_role: "GlueRole".into(),
            script_name: Some("publish.py".into()),
            glue_job_arguments: [("--mode".to_string(), "full".to_string())].into(),
            max_concurrent_runs: Some(1),
            ..Default::default()
        };
        let spec = JobSpec::from_config("publish", &config, "s3://scripts/");
        let mut g = ResourceGraph::new();
        let node = create_glue_job(&mut g, &spec).unwrap();

        let job = &g[node];
        assert_eq!(job.logical_id(), "GlueJob-publish");
        assert_eq!(job.property("/Command/Name"), Some(&json!("glueetl")));
        assert_eq!(job.property("/Command/ScriptLocation"), Some(&json!("s3://scripts/publish.py")));
        assert_eq!(job.property("/DefaultArguments/--mode"), Some(&json!("full")));
        assert_eq!(job.property("/ExecutionProperty/MaxConcurrentRuns"), Some(&json!(1)));
    }

    #[test]
    fn test_trigger_references() {
        let config = GlueTriggerConfig {
            trigger_type: TriggerType::Conditional,
            actions: vec![TriggerActionConfig {
                crawler_name: Some("crawl".into()),
                ..Default::default()
            }],
            description: None,
            start_on_creation: Some(true),
            workflow_name: Some("flow".into()),
            predicate: Some(govgraph_types::TriggerPredicate {
                logical: None,
                conditions: vec![ConditionConfig {
                    job_name: Some("copy".into()),
                    crawler_name: None,
                    state: "SUCCEEDED".into(),
                    logical_operator: "EQUALS".into(),
                }],
            }),
            schedule: None,
        };
        let spec = TriggerSpec::from_config("t", &config);
        assert_eq!(spec.referenced_names(), vec!["crawl", "copy", "flow"]);

        let mut g = ResourceGraph::new();
        let node = create_glue_trigger(&mut g, &spec).unwrap();
        assert_eq!(g[node].property("/Type"), Some(&json!("CONDITIONAL")));
        assert_eq!(
            g[node].property("/Predicate/Conditions/0/LogicalOperator"),
            Some(&json!("EQUALS"))
        );
    }

    #[test]
    fn test_crawler_configuration() {
        let mut g = ResourceGraph::new();
        let node = create_glue_crawler(
            &mut g,
            &CrawlerSpec {
                name: "crawler-x".into(),
                role: Token::literal("role"),
                database_name: "env_db".into(),
                description: "d".into(),
                target_bucket: Token::reference("Bucket-target-x"),
                table_prefix: "orders_".into(),
            },
        )
        .unwrap();

        let configuration = g[node].property("/Configuration").unwrap().as_str().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(configuration).unwrap();
        assert_eq!(parsed["Grouping"]["TableGroupingPolicy"], "CombineCompatibleSchemas");
        assert_eq!(parsed["CreatePartitionIndex"], false);
    }
}
