//! IAM roles and domain user profiles

use std::collections::BTreeMap;

use govgraph_types::{IamRoleConfig, RolePurpose, UserConfig};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::GraphError;
use crate::graph::{CompositeId, NodeId, ResourceGraph, ResourceKind, RoleRef, Token};

use super::governance::DomainHandle;

#[derive(Debug, Clone)]
pub struct RoleHandle {
    pub node: NodeId,
    pub name: String,
    pub logical_id: String,
    pub purpose: Option<RolePurpose>,
}

impl RoleHandle {
    pub fn arn(&self) -> Token {
        Token::attr(&self.logical_id, "Arn")
    }

    pub fn role_ref(&self) -> RoleRef {
        RoleRef::named(&self.name)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RoleProperties<'a> {
    role_name: &'a str,
    assume_role_policy_document: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    managed_policy_arns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    policies: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
}

/// Declare an IAM role.
///
/// With `trust_actions` set the trust policy is replaced by a datazone
/// service statement scoped to the source account (and tag keys, if given).
pub fn create_iam_role(
    graph: &mut ResourceGraph,
    name: &str,
    config: &IamRoleConfig,
) -> Result<RoleHandle, GraphError> {
    let logical_id = format!("Role-{}", name);

    let trust = match &config.trust_actions {
        Some(actions) => datazone_trust_policy(actions, config),
        None => service_trust_policy(&config.assume_roles),
    };

    let policies = config
        .attachment_policies
        .as_ref()
        .filter(|p| !p.actions.is_empty() && !p.resources.is_empty())
        .map(|p| {
            vec![json!({
                "PolicyName": "attachmentPolicy",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": p.actions,
                        "Resource": p.resources,
                    }]
                }
            })]
        })
        .unwrap_or_default();

    let properties = RoleProperties {
        role_name: name,
        assume_role_policy_document: trust,
        managed_policy_arns: config
            .managed_policies
            .iter()
            .map(|p| format!("arn:aws:iam::aws:policy/{}", p))
            .collect(),
        policies,
        path: config.path.as_deref(),
    };

    let node = graph.add(&logical_id, ResourceKind::IamRole, &properties)?;
    Ok(RoleHandle {
        node,
        name: name.to_string(),
        logical_id,
        purpose: config.purpose,
    })
}

fn service_trust_policy(services: &[String]) -> Value {
    let statements: Vec<Value> = services
        .iter()
        .map(|service| {
            json!({
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "sts:AssumeRole",
            })
        })
        .collect();
    json!({ "Version": "2012-10-17", "Statement": statements })
}

fn datazone_trust_policy(actions: &[String], config: &IamRoleConfig) -> Value {
    let mut unique: Vec<&String> = Vec::new();
    for action in actions {
        if !unique.contains(&action) {
            unique.push(action);
        }
    }

    let conditions = config.trust_conditions.as_ref();
    let source_account = conditions
        .and_then(|c| c.source_account.clone())
        .map(Token::Literal)
        .unwrap_or(Token::AccountId);

    let mut condition = Map::new();
    condition.insert(
        "StringEquals".to_string(),
        json!({ "aws:SourceAccount": source_account }),
    );
    if let Some(tag_keys) = conditions.and_then(|c| c.tag_keys.as_ref()) {
        condition.insert(
            "ForAllValues:StringLike".to_string(),
            json!({ "aws:TagKeys": tag_keys }),
        );
    }

    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "datazone.amazonaws.com" },
            "Action": unique,
            "Condition": condition,
        }]
    })
}

/// Roles declared in this run, by name
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    roles: BTreeMap<String, RoleHandle>,
}

impl RoleTable {
    pub fn insert(&mut self, handle: RoleHandle) {
        self.roles.insert(handle.name.clone(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&RoleHandle> {
        self.roles.get(name)
    }

    pub fn by_purpose(&self, purpose: RolePurpose) -> Option<&RoleHandle> {
        self.roles.values().find(|r| r.purpose == Some(purpose))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// A declared domain user profile
#[derive(Debug, Clone)]
pub struct UserHandle {
    pub node: NodeId,
    /// Symbolic key in the predefined-user table
    pub key: String,
    pub id: CompositeId,
    /// IAM principal ARN of the user
    pub principal_arn: Token,
}

impl UserHandle {
    /// Identifier used when adding the user to a project
    pub fn member_identifier(&self) -> Token {
        self.id.entity_part()
    }
}

/// Declare a user profile in the domain for the IAM role named by
/// `userIdentifier`.
pub fn create_user_profile(
    graph: &mut ResourceGraph,
    key: &str,
    config: &UserConfig,
    domain: &DomainHandle,
) -> Result<UserHandle, GraphError> {
    let logical_id = format!("DataZoneUser-{}", key);
    let principal_arn = RoleRef::named(&config.user_identifier).arn();

    let node = graph.add(
        &logical_id,
        ResourceKind::UserProfile,
        &json!({
            "DomainIdentifier": domain.domain_id(),
            "UserIdentifier": principal_arn,
            "Status": config.status,
            "UserType": config.user_type,
        }),
    )?;
    graph.add_dependency(node, domain.node)?;

    Ok(UserHandle {
        node,
        key: key.to_string(),
        id: CompositeId::new(logical_id),
        principal_arn,
    })
}

/// Predefined-user table: symbolic key to created user profile
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: BTreeMap<String, UserHandle>,
}

impl UserTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: UserHandle) {
        self.users.insert(handle.key.clone(), handle);
    }

    pub fn get(&self, key: &str) -> Option<&UserHandle> {
        self.users.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserHandle> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
