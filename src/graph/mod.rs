//! Resource dependency graph
//!
//! Nodes are declarative resource definitions with JSON properties that may
//! embed [`Token`]s. Edges point from a dependent node to the prerequisite
//! it must be provisioned after. Nodes are identified by a unique logical id
//! and addressed internally by insertion index ([`NodeId`]), which is also
//! the tie-breaker for stable ordering in [`plan`].

pub mod plan;
pub mod template;
pub mod token;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Index;

use govgraph_types::RemovalPolicy;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::GraphError;

pub use plan::{build_provisioning_plan, describe_plan, ProvisioningPhase, ProvisioningPlan};
pub use template::{template_logical_id, Template, TemplateResource};
pub use token::{CompositeId, CompositePart, RoleRef, Token};

/// Insertion index of a node in its [`ResourceGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of declarative resource a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Bucket,
    BucketPolicy,
    IamRole,
    IamPolicy,
    GlueJob,
    GlueWorkflow,
    GlueTrigger,
    GlueCrawler,
    EventRule,
    DataLakeSettings,
    DataLocationResource,
    DataLocationPermission,
    Domain,
    DomainUnit,
    UserProfile,
    BlueprintConfiguration,
    Project,
    ProjectMembership,
    EnvironmentProfile,
    Environment,
    GrantFunction,
    GrantProvider,
    PolicyGrant,
}

impl ResourceKind {
    /// Resource type name emitted into templates
    pub fn type_name(self) -> &'static str {
        match self {
            ResourceKind::Bucket => "AWS::S3::Bucket",
            ResourceKind::BucketPolicy => "AWS::S3::BucketPolicy",
            ResourceKind::IamRole => "AWS::IAM::Role",
            ResourceKind::IamPolicy => "AWS::IAM::Policy",
            ResourceKind::GlueJob => "AWS::Glue::Job",
            ResourceKind::GlueWorkflow => "AWS::Glue::Workflow",
            ResourceKind::GlueTrigger => "AWS::Glue::Trigger",
            ResourceKind::GlueCrawler => "AWS::Glue::Crawler",
            ResourceKind::EventRule => "AWS::Events::Rule",
            ResourceKind::DataLakeSettings => "AWS::LakeFormation::DataLakeSettings",
            ResourceKind::DataLocationResource => "AWS::LakeFormation::Resource",
            ResourceKind::DataLocationPermission => "AWS::LakeFormation::PrincipalPermissions",
            ResourceKind::Domain => "AWS::DataZone::Domain",
            ResourceKind::DomainUnit => "AWS::DataZone::DomainUnit",
            ResourceKind::UserProfile => "AWS::DataZone::UserProfile",
            ResourceKind::BlueprintConfiguration => {
                "AWS::DataZone::EnvironmentBlueprintConfiguration"
            }
            ResourceKind::Project => "AWS::DataZone::Project",
            ResourceKind::ProjectMembership => "AWS::DataZone::ProjectMembership",
            ResourceKind::EnvironmentProfile => "AWS::DataZone::EnvironmentProfile",
            ResourceKind::Environment => "AWS::DataZone::Environment",
            ResourceKind::GrantFunction => "AWS::Lambda::Function",
            // provider framework function in front of the grant function
            ResourceKind::GrantProvider => "AWS::Lambda::Function",
            ResourceKind::PolicyGrant => "Custom::DomainUnitPolicyGrant",
        }
    }
}

/// First eight hex digits of the SHA-256 over `parts`.
///
/// Each part is length-prefixed, so `["a-b", "c"]` and `["a", "b-c"]`
/// digest differently.
pub fn short_digest<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(&hasher.finalize()[..4])
}

/// Result of [`ResourceGraph::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    /// Same logical id with identical properties; the node is reused
    Unchanged,
    /// Same logical id with different properties; the node was replaced in place
    Updated,
}

#[derive(Debug, Clone)]
pub struct ResourceNode {
    id: NodeId,
    logical_id: String,
    kind: ResourceKind,
    properties: Value,
    depends_on: BTreeSet<NodeId>,
    deletion_policy: Option<RemovalPolicy>,
}

impl ResourceNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn properties(&self) -> &Value {
        &self.properties
    }

    /// Property lookup by JSON pointer, e.g. `/Name` or `/Member/UserIdentifier`
    pub fn property(&self, pointer: &str) -> Option<&Value> {
        self.properties.pointer(pointer)
    }

    /// Direct prerequisites, in insertion order
    pub fn depends_on(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.depends_on.iter().copied()
    }

    pub fn deletion_policy(&self) -> Option<RemovalPolicy> {
        self.deletion_policy
    }
}

/// Directed graph of resource definitions
#[derive(Debug, Default, Clone)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    by_logical_id: HashMap<String, NodeId>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Fails if the logical id is already taken.
    pub fn add<P: Serialize>(
        &mut self,
        logical_id: impl Into<String>,
        kind: ResourceKind,
        properties: &P,
    ) -> Result<NodeId, GraphError> {
        let logical_id = logical_id.into();
        if self.by_logical_id.contains_key(&logical_id) {
            return Err(GraphError::DuplicateLogicalId(logical_id));
        }
        let properties = to_properties(&logical_id, properties)?;
        Ok(self.push(logical_id, kind, properties))
    }

    /// Add a node, or reuse the node already holding this logical id.
    ///
    /// Differing properties replace the stored ones; existing edges are kept.
    pub fn upsert<P: Serialize>(
        &mut self,
        logical_id: impl Into<String>,
        kind: ResourceKind,
        properties: &P,
    ) -> Result<(NodeId, Upsert), GraphError> {
        let logical_id = logical_id.into();
        let properties = to_properties(&logical_id, properties)?;

        match self.by_logical_id.get(&logical_id) {
            Some(&id) => {
                let node = &mut self.nodes[id.0];
                if node.properties == properties && node.kind == kind {
                    Ok((id, Upsert::Unchanged))
                } else {
                    node.kind = kind;
                    node.properties = properties;
                    Ok((id, Upsert::Updated))
                }
            }
            None => Ok((self.push(logical_id, kind, properties), Upsert::Created)),
        }
    }

    fn push(&mut self, logical_id: String, kind: ResourceKind, properties: Value) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_logical_id.insert(logical_id.clone(), id);
        self.nodes.push(ResourceNode {
            id,
            logical_id,
            kind,
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
        });
        id
    }

    /// Record that `dependent` must be provisioned after `prerequisite`.
    ///
    /// Returns `false` when the edge already existed.
    pub fn add_dependency(
        &mut self,
        dependent: NodeId,
        prerequisite: NodeId,
    ) -> Result<bool, GraphError> {
        self.check(prerequisite)?;
        self.check(dependent)?;
        if dependent == prerequisite {
            return Err(GraphError::SelfDependency(
                self.nodes[dependent.0].logical_id.clone(),
            ));
        }
        Ok(self.nodes[dependent.0].depends_on.insert(prerequisite))
    }

    /// Add an edge from `dependent` to each prerequisite
    pub fn depend_on_all(
        &mut self,
        dependent: NodeId,
        prerequisites: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), GraphError> {
        for prerequisite in prerequisites {
            self.add_dependency(dependent, prerequisite)?;
        }
        Ok(())
    }

    pub fn set_deletion_policy(
        &mut self,
        id: NodeId,
        policy: RemovalPolicy,
    ) -> Result<(), GraphError> {
        self.check(id)?;
        self.nodes[id.0].deletion_policy = Some(policy);
        Ok(())
    }

    fn check(&self, id: NodeId) -> Result<(), GraphError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(id.0))
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id.0)
    }

    pub fn find(&self, logical_id: &str) -> Option<NodeId> {
        self.by_logical_id.get(logical_id).copied()
    }

    /// Like [`find`](Self::find) but an absent id is an error
    pub fn lookup(&self, logical_id: &str) -> Result<NodeId, GraphError> {
        self.find(logical_id)
            .ok_or_else(|| GraphError::UnknownLogicalId(logical_id.to_string()))
    }

    /// Node by logical id
    pub fn by_name(&self, logical_id: &str) -> Option<&ResourceNode> {
        self.find(logical_id).map(|id| &self.nodes[id.0])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    pub fn nodes_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.depends_on.len()).sum()
    }

    pub fn dependencies_of(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|n| n.depends_on.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.contains(&id))
            .map(|n| n.id)
            .collect()
    }

    /// Direct edge from `dependent` to `prerequisite`
    pub fn has_edge(&self, dependent: NodeId, prerequisite: NodeId) -> bool {
        self.get(dependent)
            .map(|n| n.depends_on.contains(&prerequisite))
            .unwrap_or(false)
    }

    /// Whether `dependent` transitively depends on `prerequisite`
    pub fn reaches(&self, dependent: NodeId, prerequisite: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![dependent];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            for &next in &node.depends_on {
                if next == prerequisite {
                    return true;
                }
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }
}

impl Index<NodeId> for ResourceGraph {
    type Output = ResourceNode;

    fn index(&self, id: NodeId) -> &ResourceNode {
        &self.nodes[id.0]
    }
}

fn to_properties<P: Serialize>(logical_id: &str, properties: &P) -> Result<Value, GraphError> {
    serde_json::to_value(properties).map_err(|source| GraphError::Properties {
        logical_id: logical_id.to_string(),
        source,
    })
}
