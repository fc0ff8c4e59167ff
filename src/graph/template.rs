//! Serialized provisioning template handed to the backend
//!
//! Graph logical ids are paths that may hold any character. Template
//! logical ids must be alphanumeric, so each one is the graph id with every
//! other character stripped, plus a digest of the full graph id. The graph
//! id is kept under the resource's `Metadata.Path`, and every `Ref` and
//! `Fn::GetAtt` in the properties is rewritten to the template id.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use super::{short_digest, ProvisioningPlan, ResourceGraph};

/// Longest template logical id the backend accepts
pub const MAX_LOGICAL_ID_LEN: usize = 255;

const DIGEST_LEN: usize = 8;

/// Template logical id of a graph logical id
pub fn template_logical_id(logical_id: &str) -> String {
    let mut id: String = logical_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_LOGICAL_ID_LEN - DIGEST_LEN)
        .collect();
    id.push_str(&short_digest([logical_id]).to_uppercase());
    id
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Metadata")]
    pub metadata: TemplateMetadata,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateMetadata {
    /// Logical ids in provisioning order
    #[serde(rename = "ProvisioningOrder")]
    pub order: Vec<String>,
    #[serde(rename = "PhaseCount")]
    pub phase_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<&'static str>,
    #[serde(rename = "Metadata")]
    pub metadata: ResourceMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceMetadata {
    /// Graph logical id of the resource
    #[serde(rename = "Path")]
    pub path: String,
}

impl Template {
    pub fn from_graph(graph: &ResourceGraph, plan: &ProvisioningPlan) -> Self {
        let ids: HashMap<&str, String> = graph
            .nodes()
            .map(|node| (node.logical_id(), template_logical_id(node.logical_id())))
            .collect();
        let template_id = |logical_id: &str| {
            ids.get(logical_id)
                .cloned()
                .unwrap_or_else(|| template_logical_id(logical_id))
        };

        let resources = graph
            .nodes()
            .map(|node| {
                let mut properties = node.properties().clone();
                rewrite_references(&mut properties, &ids);
                let resource = TemplateResource {
                    resource_type: node.kind().type_name().to_string(),
                    properties,
                    depends_on: node
                        .depends_on()
                        .map(|id| template_id(graph[id].logical_id()))
                        .collect(),
                    deletion_policy: node.deletion_policy().map(|p| match p {
                        govgraph_types::RemovalPolicy::Destroy => "Delete",
                        govgraph_types::RemovalPolicy::Retain => "Retain",
                        govgraph_types::RemovalPolicy::Snapshot => "Snapshot",
                    }),
                    metadata: ResourceMetadata {
                        path: node.logical_id().to_string(),
                    },
                };
                (template_id(node.logical_id()), resource)
            })
            .collect();

        Self {
            description: None,
            metadata: TemplateMetadata {
                order: plan
                    .order
                    .iter()
                    .map(|&id| template_id(graph[id].logical_id()))
                    .collect(),
                phase_count: plan.phases.len(),
            },
            resources,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resource declared for a graph logical id
    pub fn resource_by_path(&self, logical_id: &str) -> Option<&TemplateResource> {
        self.resources.get(&template_logical_id(logical_id))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Point `Ref` and `Fn::GetAtt` targets at template ids. Pseudo parameters
/// such as `AWS::Region` are not graph nodes and stay as they are.
fn rewrite_references(value: &mut Value, ids: &HashMap<&str, String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get_mut("Ref") {
                if let Some(mapped) = ids.get(target.as_str()) {
                    *target = mapped.clone();
                }
            }
            if let Some(Value::Array(args)) = map.get_mut("Fn::GetAtt") {
                if let Some(Value::String(target)) = args.first_mut() {
                    if let Some(mapped) = ids.get(target.as_str()) {
                        *target = mapped.clone();
                    }
                }
            }
            map.values_mut().for_each(|v| rewrite_references(v, ids));
        }
        Value::Array(items) => items.iter_mut().for_each(|v| rewrite_references(v, ids)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_provisioning_plan, CompositeId, ResourceKind, Token};
    use serde_json::json;

    #[test]
    fn test_template_shape() {
        let mut g = ResourceGraph::new();
        let domain = g.add("Domain", ResourceKind::Domain, &json!({"Name": "gov"})).unwrap();
        let unit = g
            .add(
                "Unit",
                ResourceKind::DomainUnit,
                &json!({"DomainIdentifier": Token::reference("Domain")}),
            )
            .unwrap();
        g.add_dependency(unit, domain).unwrap();
        let plan = build_provisioning_plan(&g).unwrap();

        let domain_id = template_logical_id("Domain");
        let unit_id = template_logical_id("Unit");
        let value = serde_json::to_value(Template::from_graph(&g, &plan)).unwrap();
        let resource = &value["Resources"][unit_id.as_str()];
        assert_eq!(resource["Type"], "AWS::DataZone::DomainUnit");
        assert_eq!(resource["DependsOn"], json!([domain_id]));
        assert_eq!(resource["Metadata"]["Path"], "Unit");
        assert_eq!(
            resource["Properties"]["DomainIdentifier"],
            json!({"Ref": domain_id})
        );
        assert!(value["Resources"][domain_id.as_str()].get("DependsOn").is_none());
        assert_eq!(
            value["Metadata"]["ProvisioningOrder"],
            json!([domain_id, unit_id])
        );
    }

    #[test]
    fn test_template_ids_are_alphanumeric_and_distinct() {
        let paths = [
            "DataZoneDomainUnit-Sales/EMEA/UK",
            "DataZoneDomainUnit-Marketing/EMEA/UK",
            "DataZoneDomainUnit-SalesEMEA/UK",
            "DataZoneDomainUnit-Sales EMEA/UK",
        ];
        let ids: Vec<String> = paths.iter().map(|p| template_logical_id(p)).collect();
        for id in &ids {
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()), "{id}");
        }
        assert!(ids[0].starts_with("DataZoneDomainUnitSalesEMEAUK"));
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(template_logical_id(paths[0]), ids[0]);

        let long = "x".repeat(400);
        assert_eq!(template_logical_id(&long).len(), MAX_LOGICAL_ID_LEN);
    }

    #[test]
    fn test_references_follow_template_ids() {
        let mut g = ResourceGraph::new();
        g.add("Domain Root", ResourceKind::Domain, &json!({})).unwrap();
        g.add("Fn-A", ResourceKind::GrantFunction, &json!({})).unwrap();
        let part = CompositeId::new("Domain Root").entity_part();
        let grant = g
            .add(
                "Grant/1",
                ResourceKind::PolicyGrant,
                &json!({
                    "ServiceToken": Token::attr("Fn-A", "Arn"),
                    "DomainUnitIdentifier": part,
                    "Arn": Token::join([Token::literal("arn:"), Token::Region]),
                }),
            )
            .unwrap();
        let plan = build_provisioning_plan(&g).unwrap();
        let template = Template::from_graph(&g, &plan);

        let domain_id = template_logical_id("Domain Root");
        let resource = template.resource_by_path(g[grant].logical_id()).unwrap();
        assert_eq!(resource.metadata.path, "Grant/1");
        assert_eq!(
            resource.properties["ServiceToken"],
            json!({"Fn::GetAtt": [template_logical_id("Fn-A"), "Arn"]})
        );
        assert_eq!(
            resource.properties["DomainUnitIdentifier"]["Fn::Select"][1]["Fn::Split"][1],
            json!({"Ref": domain_id})
        );
        assert_eq!(
            resource.properties["Arn"]["Fn::Join"][1][1],
            json!({"Ref": "AWS::Region"})
        );
        let written = serde_json::to_string(&template).unwrap();
        assert!(!written.contains(r#"{"Ref":"Domain Root"}"#));
    }
}
