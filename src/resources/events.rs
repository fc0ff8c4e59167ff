//! Event rules

use govgraph_types::EventTargetConfig;
use serde_json::{json, Value};

use crate::error::{GraphError, ProvisionError};
use crate::graph::{NodeId, ResourceGraph, ResourceKind, Token};

/// What a rule does when it matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    StartWorkflowRun { workflow_name: String },
    InvokeFunction { function_name: String },
}

impl EventTarget {
    /// Only `Glue/startWorkflowRun` and `Lambda/invokeLambdaFunction` are supported
    pub fn from_config(rule: &str, config: &EventTargetConfig) -> Result<Self, ProvisionError> {
        let name = config.parameters.get("Name").cloned().unwrap_or_default();
        match (config.service.as_str(), config.action.as_str()) {
            ("Glue", "startWorkflowRun") => Ok(EventTarget::StartWorkflowRun {
                workflow_name: name,
            }),
            ("Lambda", "invokeLambdaFunction") => Ok(EventTarget::InvokeFunction {
                function_name: name,
            }),
            (service, action) => Err(ProvisionError::UnsupportedEventTarget {
                rule: rule.to_string(),
                service: service.to_string(),
                action: action.to_string(),
            }),
        }
    }

    /// Name of the resource the target acts on
    pub fn target_name(&self) -> &str {
        match self {
            EventTarget::StartWorkflowRun { workflow_name } => workflow_name,
            EventTarget::InvokeFunction { function_name } => function_name,
        }
    }

    fn to_json(&self, index: usize) -> Value {
        match self {
            EventTarget::StartWorkflowRun { workflow_name } => json!({
                "Id": format!("Target{}", index),
                "Service": "Glue",
                "Action": "startWorkflowRun",
                "Parameters": { "Name": workflow_name },
            }),
            EventTarget::InvokeFunction { function_name } => json!({
                "Id": format!("Target{}", index),
                "Arn": Token::join([
                    Token::literal("arn:aws:lambda:"),
                    Token::Region,
                    Token::literal(":"),
                    Token::AccountId,
                    Token::literal(format!(":function:{}", function_name)),
                ]),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventRuleSpec {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub event_bus: Option<String>,
    pub source: Vec<String>,
    pub detail_type: Vec<String>,
    /// Already-resolved detail filter
    pub detail: Option<Value>,
    pub targets: Vec<EventTarget>,
}

pub fn create_event_rule(
    graph: &mut ResourceGraph,
    spec: &EventRuleSpec,
) -> Result<NodeId, GraphError> {
    let mut pattern = json!({ "source": spec.source });
    if !spec.detail_type.is_empty() {
        pattern["detail-type"] = json!(spec.detail_type);
    }
    if let Some(detail) = &spec.detail {
        pattern["detail"] = detail.clone();
    }

    let targets: Vec<Value> = spec
        .targets
        .iter()
        .enumerate()
        .map(|(i, t)| t.to_json(i))
        .collect();

    let mut properties = json!({
        "Name": spec.name,
        "State": if spec.enabled { "ENABLED" } else { "DISABLED" },
        "EventPattern": pattern,
        "Targets": targets,
    });
    if let Some(description) = &spec.description {
        properties["Description"] = json!(description);
    }
    if let Some(bus) = &spec.event_bus {
        properties["EventBusName"] = json!(bus);
    }

    graph.add(format!("EventRule-{}", spec.name), ResourceKind::EventRule, &properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(service: &str, action: &str) -> EventTargetConfig {
        EventTargetConfig {
            action: action.into(),
            service: service.into(),
            parameters: [("Name".to_string(), "flow".to_string())].into(),
        }
    }

    #[test]
    fn test_supported_targets() {
        assert_eq!(
            EventTarget::from_config("r", &target("Glue", "startWorkflowRun")).unwrap(),
            EventTarget::StartWorkflowRun {
                workflow_name: "flow".into()
            }
        );
        assert_eq!(
            EventTarget::from_config("r", &target("Lambda", "invokeLambdaFunction"))
                .unwrap()
                .target_name(),
            "flow"
        );
    }

    #[test]
    fn test_unsupported_target_is_fatal() {
        let err = EventTarget::from_config("r", &target("SNS", "publish")).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::UnsupportedEventTarget { ref service, .. } if service == "SNS"
        ));
    }

    #[test]
    fn test_rule_pattern() {
        let mut g = ResourceGraph::new();
        let spec = EventRuleSpec {
            name: "rule-a".into(),
            description: None,
            enabled: true,
            event_bus: Some("default".into()),
            source: vec!["aws.s3".into()],
            detail_type: vec!["Object Created".into()],
            detail: Some(json!({"bucket": {"name": ["source-a"]}})),
            targets: vec![EventTarget::StartWorkflowRun {
                workflow_name: "flow".into(),
            }],
        };
        let node = create_event_rule(&mut g, &spec).unwrap();
        let rule = &g[node];
        assert_eq!(rule.property("/EventPattern/detail-type/0"), Some(&json!("Object Created")));
        assert_eq!(rule.property("/Targets/0/Parameters/Name"), Some(&json!("flow")));
        assert_eq!(rule.property("/State"), Some(&json!("ENABLED")));
    }
}
