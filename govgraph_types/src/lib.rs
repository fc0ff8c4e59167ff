//! Governance graph types - Level 1 foundation types
//!
//! This crate holds the pure data structures shared by the graph compiler
//! (`govgraph`) and by the grant endpoint handler. It depends on nothing in
//! the workspace.
//!
//! ## Contents
//!
//! - The hierarchy document: organizational units, projects, entities and
//!   memberships
//! - The resource requirements document: flat storage, identity, compute,
//!   event and governance resource shapes
//! - The grant vocabulary: policy types, grant entity kinds, principal types
//!
//! ## Critical Rules
//!
//! 1. **NO BUSINESS LOGIC** - Only data structures, constructors and accessors
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - Field names follow the YAML documents operators write

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// HIERARCHY DOCUMENT
// ============================================================================

/// Root of the hierarchy document: the domain and its top-level units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyDocument {
    #[serde(default, rename = "domainName")]
    pub domain_name: Option<String>,
    #[serde(default, rename = "domainUnits")]
    pub units: Vec<OrganizationalUnit>,
}

/// A namespace node in the governance hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub name: String,
    #[serde(default, rename = "domainUnits")]
    pub children: Vec<OrganizationalUnit>,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl OrganizationalUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            projects: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: OrganizationalUnit) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_project(mut self, project: ProjectConfig) -> Self {
        self.projects.push(project);
        self
    }

    /// Number of units in this subtree, including this one.
    pub fn unit_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.unit_count()).sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "glossaryTerms")]
    pub glossary_terms: Vec<String>,
    #[serde(default, rename = "project_membership")]
    pub membership: BTreeMap<String, MembershipConfig>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: EntityConfig) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_member(mut self, key: impl Into<String>, member: MembershipConfig) -> Self {
        self.membership.insert(key.into(), member);
        self
    }
}

/// One data-pipeline entity of a project; yields one lineage bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub entity_type: String,
    #[serde(rename = "source_bucket")]
    pub source_location: String,
    #[serde(rename = "schedule_trigger_timing")]
    pub schedule_expression: String,
}

impl EntityConfig {
    pub fn new(
        entity_type: impl Into<String>,
        source_location: impl Into<String>,
        schedule_expression: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            source_location: source_location.into(),
            schedule_expression: schedule_expression.into(),
        }
    }
}

/// Project membership as written in the hierarchy document.
///
/// Exactly one principal source is expected: a predefined user key (resolved
/// through the run's user table), a direct user identifier, or a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipConfig {
    pub designation: String,
    #[serde(default)]
    pub user_identifier: Option<String>,
    #[serde(default)]
    pub group_identifier: Option<String>,
    #[serde(default)]
    pub predefined_user_key: Option<String>,
}

impl MembershipConfig {
    pub fn predefined(designation: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            predefined_user_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn user(designation: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            user_identifier: Some(user.into()),
            ..Default::default()
        }
    }

    pub fn group(designation: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            group_identifier: Some(group.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// REQUIREMENTS DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementsDocument {
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Flat resources, keyed by resource-type section then by resource name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub s3_buckets: BTreeMap<String, BucketConfig>,
    #[serde(default)]
    pub iam_roles: BTreeMap<String, IamRoleConfig>,
    #[serde(default)]
    pub glue_jobs: BTreeMap<String, GlueJobConfig>,
    #[serde(default)]
    pub glue_workflows: BTreeMap<String, GlueWorkflowConfig>,
    #[serde(default)]
    pub glue_triggers: BTreeMap<String, GlueTriggerConfig>,
    #[serde(default)]
    pub event_bridge_rules: BTreeMap<String, EventRuleConfig>,
    #[serde(default)]
    pub datazone_domains: BTreeMap<String, DomainConfig>,
    #[serde(default)]
    pub datazone_users: BTreeMap<String, UserConfig>,
    #[serde(default)]
    pub datazone_blueprints: Option<BlueprintConfig>,
    #[serde(default)]
    pub datalake_settings: Option<DataLakeSettingsConfig>,
}

/// Optional `settings:` section of the requirements document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default)]
    pub qualifier: Option<String>,
    #[serde(default)]
    pub script_location_prefix: Option<String>,
    #[serde(default)]
    pub job_temp_bucket_prefix: Option<String>,
    #[serde(default)]
    pub entity_path_root: Option<String>,
    #[serde(default)]
    pub publish_job_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketPurpose {
    Blueprint,
    SqlAssets,
    MapperConfigs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
    Snapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfig {
    #[serde(default)]
    pub purpose: Option<BucketPurpose>,
    #[serde(default)]
    pub encryption: Option<String>,
    #[serde(default, rename = "enforceSSL")]
    pub enforce_ssl: Option<bool>,
    #[serde(default)]
    pub removal_policy: Option<RemovalPolicy>,
    #[serde(default)]
    pub auto_delete_objects: Option<bool>,
    #[serde(default)]
    pub expiration_days: Option<u32>,
    #[serde(default)]
    pub event_bridge_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePurpose {
    GlueProvisioning,
    GlueManageAccess,
    DomainExecution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamRoleConfig {
    #[serde(default)]
    pub purpose: Option<RolePurpose>,
    #[serde(default)]
    pub assume_roles: Vec<String>,
    #[serde(default)]
    pub managed_policies: Vec<String>,
    #[serde(default, alias = "attachemt_policies")]
    pub attachment_policies: Option<PolicyStatementConfig>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub trust_actions: Option<Vec<String>>,
    #[serde(default)]
    pub trust_conditions: Option<TrustConditions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatementConfig {
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustConditions {
    #[serde(default)]
    pub source_account: Option<String>,
    #[serde(default)]
    pub tag_keys: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPurpose {
    AssetPublishing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlueJobConfig {
    #[serde(default)]
    pub purpose: Option<JobPurpose>,
    #[serde(default)]
    pub glue_job_type: Option<String>,
    #[serde(default, rename = "pythonVersion")]
    pub python_version: Option<String>,
    #[serde(default, rename = "scriptName")]
    pub script_name: Option<String>,
    pub glue_job_role: String,
    #[serde(default)]
    pub glue_job_arguments: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_concurrent_runs: Option<u32>,
    #[serde(default)]
    pub glue_version: Option<String>,
    #[serde(default, rename = "numberOfWorkers")]
    pub number_of_workers: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default, rename = "workerType")]
    pub worker_type: Option<String>,
    #[serde(default, rename = "jobRunQueuingEnabled")]
    pub job_run_queuing_enabled: Option<bool>,
    #[serde(default, rename = "maxRetries")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlueWorkflowConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_run_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub max_concurrent_runs: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    OnDemand,
    Scheduled,
    Conditional,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlueTriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub actions: Vec<TriggerActionConfig>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "startOnCreation")]
    pub start_on_creation: Option<bool>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub predicate: Option<TriggerPredicate>,
    #[serde(default)]
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerActionConfig {
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub crawler_name: Option<String>,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerPredicate {
    #[serde(default)]
    pub logical: Option<String>,
    #[serde(default)]
    pub conditions: Vec<TriggerCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCondition {
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub crawler_name: Option<String>,
    pub state: String,
    pub logical_operator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRuleConfig {
    pub event_pattern: EventPatternConfig,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub event_bus: Option<String>,
    #[serde(default)]
    pub targets: Vec<EventTargetConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatternConfig {
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub detail_type: Vec<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTargetConfig {
    pub action: String,
    pub service: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub domain_execution_role: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kms_key_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    pub user_identifier: String,
    pub status: String,
    pub user_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintConfig {
    pub environment_blueprint_identifier: String,
    pub manage_access_role_arn: String,
    pub provisioning_role_arn: String,
    #[serde(default)]
    pub enabled_regions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataLakeSettingsConfig {
    #[serde(default)]
    pub admins: Vec<String>,
}

// ============================================================================
// GRANT VOCABULARY
// ============================================================================

/// Error parsing grant vocabulary from request payload strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VocabularyError {
    #[error("Provided policy type doesn't exist: {0}")]
    UnknownPolicyType(String),
    #[error("Unknown entity type: {0}")]
    UnknownEntityKind(String),
    #[error("Invalid PrincipalType: {0}")]
    UnknownPrincipalType(String),
}

/// Authorization action a grant confers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    CreateProject,
    AddToProjectMemberPool,
    CreateGlossary,
    CreateFormType,
    CreateAssetType,
    CreateEnvironmentProfile,
    CreateEnvironment,
    CreateEnvironmentFromBlueprint,
    CreateProjectFromProjectProfile,
}

impl PolicyType {
    pub const ALL: [PolicyType; 9] = [
        PolicyType::CreateProject,
        PolicyType::AddToProjectMemberPool,
        PolicyType::CreateGlossary,
        PolicyType::CreateFormType,
        PolicyType::CreateAssetType,
        PolicyType::CreateEnvironmentProfile,
        PolicyType::CreateEnvironment,
        PolicyType::CreateEnvironmentFromBlueprint,
        PolicyType::CreateProjectFromProjectProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::CreateProject => "CREATE_PROJECT",
            PolicyType::AddToProjectMemberPool => "ADD_TO_PROJECT_MEMBER_POOL",
            PolicyType::CreateGlossary => "CREATE_GLOSSARY",
            PolicyType::CreateFormType => "CREATE_FORM_TYPE",
            PolicyType::CreateAssetType => "CREATE_ASSET_TYPE",
            PolicyType::CreateEnvironmentProfile => "CREATE_ENVIRONMENT_PROFILE",
            PolicyType::CreateEnvironment => "CREATE_ENVIRONMENT",
            PolicyType::CreateEnvironmentFromBlueprint => "CREATE_ENVIRONMENT_FROM_BLUEPRINT",
            PolicyType::CreateProjectFromProjectProfile => "CREATE_PROJECT_FROM_PROJECT_PROFILE",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyType::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| VocabularyError::UnknownPolicyType(s.to_string()))
    }
}

/// Kind of entity a grant is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantEntityKind {
    #[serde(rename = "DOMAIN_UNIT")]
    DomainUnit,
    #[serde(rename = "ENVIRONMENT_BLUEPRINT_CONFIGURATION")]
    BlueprintConfiguration,
    #[serde(rename = "ENVIRONMENT_PROFILE")]
    EnvironmentProfile,
    #[serde(rename = "ASSET_TYPE")]
    AssetType,
}

impl GrantEntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantEntityKind::DomainUnit => "DOMAIN_UNIT",
            GrantEntityKind::BlueprintConfiguration => "ENVIRONMENT_BLUEPRINT_CONFIGURATION",
            GrantEntityKind::EnvironmentProfile => "ENVIRONMENT_PROFILE",
            GrantEntityKind::AssetType => "ASSET_TYPE",
        }
    }
}

impl fmt::Display for GrantEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantEntityKind {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOMAIN_UNIT" => Ok(GrantEntityKind::DomainUnit),
            "ENVIRONMENT_BLUEPRINT_CONFIGURATION" => Ok(GrantEntityKind::BlueprintConfiguration),
            "ENVIRONMENT_PROFILE" => Ok(GrantEntityKind::EnvironmentProfile),
            "ASSET_TYPE" => Ok(GrantEntityKind::AssetType),
            other => Err(VocabularyError::UnknownEntityKind(other.to_string())),
        }
    }
}

/// How the grantee is identified in the request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalType {
    #[serde(rename = "IAM_USER")]
    IamUser,
    #[serde(rename = "IAM_GROUP")]
    IamGroup,
    #[serde(rename = "IAM_ROLE")]
    IamRole,
    /// Every user of the domain.
    #[serde(rename = "root")]
    AllUsers,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::IamUser => "IAM_USER",
            PrincipalType::IamGroup => "IAM_GROUP",
            PrincipalType::IamRole => "IAM_ROLE",
            PrincipalType::AllUsers => "root",
        }
    }
}

impl FromStr for PrincipalType {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IAM_USER" => Ok(PrincipalType::IamUser),
            "IAM_GROUP" => Ok(PrincipalType::IamGroup),
            "IAM_ROLE" => Ok(PrincipalType::IamRole),
            "root" => Ok(PrincipalType::AllUsers),
            other => Err(VocabularyError::UnknownPrincipalType(other.to_string())),
        }
    }
}
