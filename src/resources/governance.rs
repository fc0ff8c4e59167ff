//! Governance resource shapes: domain, units, blueprint configuration,
//! projects, memberships, environment profiles and environments.
//!
//! These functions only declare nodes. Gating and cross-resource edges
//! live in [`crate::factory`] and [`crate::hierarchy`].

use govgraph_types::{BlueprintConfig, DomainConfig};
use serde::Serialize;
use serde_json::json;

use crate::error::GraphError;
use crate::graph::{CompositeId, NodeId, ResourceGraph, ResourceKind, RoleRef, Token};

/// The governance domain
#[derive(Debug, Clone)]
pub struct DomainHandle {
    pub node: NodeId,
    pub name: String,
    pub logical_id: String,
}

impl DomainHandle {
    pub fn domain_id(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    /// Identifier of the domain-wide root unit
    pub fn root_unit_id(&self) -> Token {
        Token::attr(&self.logical_id, "RootDomainUnitId")
    }
}

pub fn create_domain(
    graph: &mut ResourceGraph,
    name: &str,
    config: &DomainConfig,
) -> Result<DomainHandle, GraphError> {
    let logical_id = format!("DataZoneDomain-{}", name);
    let node = graph.add(
        &logical_id,
        ResourceKind::Domain,
        &json!({
            "Name": name,
            "Description": config.description,
            "DomainExecutionRole": RoleRef::service_role(&config.domain_execution_role).arn(),
            "KmsKeyIdentifier": config.kms_key_identifier,
        }),
    )?;
    Ok(DomainHandle {
        node,
        name: name.to_string(),
        logical_id,
    })
}

pub fn create_domain_unit(
    graph: &mut ResourceGraph,
    logical_id: &str,
    name: &str,
    domain_id: Token,
    parent_unit_id: Token,
) -> Result<NodeId, GraphError> {
    graph.add(
        logical_id,
        ResourceKind::DomainUnit,
        &json!({
            "DomainIdentifier": domain_id,
            "Name": name,
            "Description": format!("Domain unit for {}", name),
            "ParentDomainUnitIdentifier": parent_unit_id,
        }),
    )
}

/// Environment blueprint configuration of the domain
#[derive(Debug, Clone)]
pub struct BlueprintHandle {
    pub node: NodeId,
    pub id: CompositeId,
}

impl BlueprintHandle {
    /// `<account>:<blueprintId>`, the form policy grants address it by
    pub fn grant_entity_id(&self) -> Token {
        Token::join([Token::AccountId, Token::literal(":"), self.id.entity_part()])
    }
}

pub fn create_blueprint(
    graph: &mut ResourceGraph,
    config: &BlueprintConfig,
    domain: &DomainHandle,
    bucket_name: Option<Token>,
) -> Result<BlueprintHandle, GraphError> {
    let logical_id = "DataZoneBlueprint".to_string();
    let regional_parameters = match bucket_name {
        Some(bucket) => json!([{
            "Region": Token::Region,
            "Parameters": { "S3Location": Token::join([Token::literal("s3://"), bucket]) }
        }]),
        None => json!([]),
    };
    let enabled_regions: Vec<Token> = if config.enabled_regions.is_empty() {
        vec![Token::Region]
    } else {
        config.enabled_regions.iter().map(|r| Token::literal(r.as_str())).collect()
    };

    let node = graph.add(
        &logical_id,
        ResourceKind::BlueprintConfiguration,
        &json!({
            "DomainIdentifier": domain.domain_id(),
            "EnvironmentBlueprintIdentifier": config.environment_blueprint_identifier,
            "EnabledRegions": enabled_regions,
            "ManageAccessRoleArn": RoleRef::named(&config.manage_access_role_arn).arn(),
            "ProvisioningRoleArn": RoleRef::named(&config.provisioning_role_arn).arn(),
            "RegionalParameters": regional_parameters,
        }),
    )?;
    Ok(BlueprintHandle {
        node,
        id: CompositeId::new(logical_id),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ProjectProperties<'a> {
    pub domain_identifier: Token,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_unit_id: Option<Token>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub glossary_terms: Vec<String>,
}

pub(crate) fn create_project(
    graph: &mut ResourceGraph,
    logical_id: &str,
    properties: &ProjectProperties<'_>,
) -> Result<NodeId, GraphError> {
    graph.add(logical_id, ResourceKind::Project, properties)
}

/// Principal of a project membership
#[derive(Debug, Clone, PartialEq)]
pub enum MemberPrincipal {
    User(Token),
    Group(Token),
}

pub(crate) fn create_membership(
    graph: &mut ResourceGraph,
    logical_id: &str,
    designation: &str,
    domain_id: Token,
    project: &CompositeId,
    member: &MemberPrincipal,
) -> Result<NodeId, GraphError> {
    let member = match member {
        MemberPrincipal::User(id) => json!({ "UserIdentifier": id }),
        MemberPrincipal::Group(id) => json!({ "GroupIdentifier": id }),
    };
    graph.add(
        logical_id,
        ResourceKind::ProjectMembership,
        &json!({
            "Designation": designation,
            "DomainIdentifier": domain_id,
            "Member": member,
            "ProjectIdentifier": project.entity_part(),
        }),
    )
}

pub(crate) fn create_environment_profile(
    graph: &mut ResourceGraph,
    logical_id: &str,
    name: &str,
    description: &str,
    domain: &DomainHandle,
    blueprint: &BlueprintHandle,
    project: &CompositeId,
) -> Result<NodeId, GraphError> {
    graph.add(
        logical_id,
        ResourceKind::EnvironmentProfile,
        &json!({
            "DomainIdentifier": domain.domain_id(),
            "Name": name,
            "Description": description,
            "EnvironmentBlueprintIdentifier": blueprint.id.entity_part(),
            "ProjectIdentifier": project.entity_part(),
            "AwsAccountId": Token::AccountId,
            "AwsAccountRegion": Token::Region,
        }),
    )
}

pub(crate) struct EnvironmentProperties<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub role_arn: Token,
}

pub(crate) fn create_environment(
    graph: &mut ResourceGraph,
    logical_id: &str,
    properties: EnvironmentProperties<'_>,
    domain: &DomainHandle,
    project: &CompositeId,
    profile: &CompositeId,
) -> Result<NodeId, GraphError> {
    graph.add(
        logical_id,
        ResourceKind::Environment,
        &json!({
            "DomainIdentifier": domain.domain_id(),
            "Name": properties.name,
            "Description": properties.description,
            "EnvironmentAccountIdentifier": Token::AccountId,
            "EnvironmentAccountRegion": Token::Region,
            "EnvironmentProfileIdentifier": profile.entity_part(),
            "ProjectIdentifier": project.entity_part(),
            "EnvironmentRoleArn": properties.role_arn,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_uses_service_role_path() {
        let mut g = ResourceGraph::new();
        let config = DomainConfig {
            domain_execution_role: "ExecRole".into(),
            ..Default::default()
        };
        let domain = create_domain(&mut g, "governance", &config).unwrap();
        assert_eq!(domain.domain_id(), Token::reference("DataZoneDomain-governance"));

        let arn = g[domain.node].property("/DomainExecutionRole").unwrap();
        assert_eq!(arn["Fn::Join"][1][2], json!(":role/service-role/ExecRole"));
    }

    #[test]
    fn test_blueprint_points_at_bucket() {
        let mut g = ResourceGraph::new();
        let domain = create_domain(&mut g, "gov", &DomainConfig::default()).unwrap();
        let config = BlueprintConfig {
            environment_blueprint_identifier: "DefaultDataLake".into(),
            manage_access_role_arn: "Manage".into(),
            provisioning_role_arn: "Provision".into(),
            enabled_regions: vec![],
        };
        let bp = create_blueprint(&mut g, &config, &domain, Some(Token::reference("Bucket-bp")))
            .unwrap();
        let node = &g[bp.node];

        assert_eq!(node.property("/EnabledRegions/0"), Some(&json!({"Ref": "AWS::Region"})));
        assert_eq!(
            node.property("/RegionalParameters/0/Parameters/S3Location/Fn::Join/1/1"),
            Some(&json!({"Ref": "Bucket-bp"}))
        );
        assert_eq!(bp.grant_entity_id().referenced_logical_ids(), vec!["DataZoneBlueprint"]);
    }
}
