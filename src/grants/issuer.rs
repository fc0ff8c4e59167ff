//! Grant Issuer
//!
//! One [`GrantIssuer`] exists per run. Constructing it declares the shared
//! endpoint function and its provider in the graph; constructing a second
//! one against the same graph fails on the duplicate logical ids. Callers
//! receive it by reference.
//!
//! The endpoint is four nodes: the grant function with its IAM policy, and
//! the provider framework function with the policy that lets it invoke the
//! grant function. Grants address the provider as their service token.

use std::sync::LazyLock;

use govgraph_types::{GrantEntityKind, PolicyType, PrincipalType};
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use super::{Grant, GrantPrincipal};
use crate::error::ProvisionError;
use crate::graph::{NodeId, ResourceGraph, ResourceKind, Token, Upsert};

/// Bootstrap qualifier used when none is configured
pub const DEFAULT_QUALIFIER: &str = "hnb659fds";

static QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{1,10}$").expect("qualifier regex is valid"));

/// Role the endpoint function runs as, the deployment execution role of
/// the bootstrap identified by `qualifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRole {
    qualifier: String,
}

impl ExecutionRole {
    pub fn resolve(qualifier: Option<&str>) -> Result<Self, ProvisionError> {
        let qualifier = qualifier.unwrap_or(DEFAULT_QUALIFIER).trim();
        if !QUALIFIER.is_match(qualifier) {
            return Err(ProvisionError::EndpointUnresolved(format!(
                "bootstrap qualifier '{}' must be 1-10 alphanumeric characters",
                qualifier
            )));
        }
        Ok(Self {
            qualifier: qualifier.to_string(),
        })
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// `cdk-<qualifier>-cfn-exec-role-<account>-<region>`
    pub fn role_name(&self) -> Token {
        Token::join([
            Token::literal(format!("cdk-{}-cfn-exec-role-", self.qualifier)),
            Token::AccountId,
            Token::literal("-"),
            Token::Region,
        ])
    }

    pub fn arn(&self) -> Token {
        Token::join([
            Token::literal("arn:aws:iam::"),
            Token::AccountId,
            Token::literal(":role/"),
            self.role_name(),
        ])
    }

    /// Bootstrap bucket the function code is published to
    pub fn assets_bucket(&self) -> Token {
        Token::join([
            Token::literal(format!("cdk-{}-assets-", self.qualifier)),
            Token::AccountId,
            Token::literal("-"),
            Token::Region,
        ])
    }

    pub fn principal(&self) -> GrantPrincipal {
        GrantPrincipal::Role(self.arn())
    }
}

/// Source of freshness tokens for forced grants
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Node of an issued grant
#[derive(Debug, Clone, PartialEq)]
pub struct GrantHandle {
    pub node: NodeId,
    pub logical_id: String,
    pub outcome: Upsert,
}

#[derive(Debug, Serialize)]
struct GrantPayload<'a> {
    #[serde(rename = "ServiceToken")]
    service_token: Token,
    #[serde(rename = "DomainIdentifier")]
    domain_identifier: &'a Token,
    #[serde(rename = "DomainUnitIdentifier")]
    domain_unit_identifier: &'a Token,
    #[serde(rename = "EntityIdentifier")]
    entity_identifier: &'a Token,
    #[serde(rename = "EntityType")]
    entity_type: GrantEntityKind,
    #[serde(rename = "PolicyType")]
    policy_type: PolicyType,
    #[serde(rename = "PrincipalType", skip_serializing_if = "Option::is_none")]
    principal_type: Option<PrincipalType>,
    #[serde(rename = "PrincipalArn", skip_serializing_if = "Option::is_none")]
    principal_arn: Option<&'a Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a Token>,
    #[serde(rename = "IncludeChildDomainUnits")]
    include_child_domain_units: bool,
    #[serde(rename = "Timestamp", skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

pub struct GrantIssuer {
    function: NodeId,
    provider: NodeId,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for GrantIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantIssuer")
            .field("function", &self.function)
            .field("provider", &self.provider)
            .finish()
    }
}

impl GrantIssuer {
    pub const FUNCTION_ID: &'static str = "SharedDomainUnitPermissionLambda";
    pub const FUNCTION_POLICY_ID: &'static str = "SharedDomainUnitPermissionPolicy";
    pub const PROVIDER_ID: &'static str = "SharedDomainUnitPermissionProvider";
    pub const PROVIDER_POLICY_ID: &'static str = "SharedDomainUnitPermissionProviderPolicy";

    /// Object keys of the published function bundles
    pub const HANDLER_ASSET: &'static str = "policy-grant-handler.zip";
    pub const FRAMEWORK_ASSET: &'static str = "provider-framework-on-event.zip";

    pub fn new(graph: &mut ResourceGraph, role: &ExecutionRole) -> Result<Self, ProvisionError> {
        Self::with_clock(graph, role, SystemClock)
    }

    /// Declare the shared endpoint and return the issuer bound to it
    pub fn with_clock(
        graph: &mut ResourceGraph,
        role: &ExecutionRole,
        clock: impl Clock + 'static,
    ) -> Result<Self, ProvisionError> {
        // grant function, behind the policy it runs with
        let function_policy = graph.add(
            Self::FUNCTION_POLICY_ID,
            ResourceKind::IamPolicy,
            &json!({
                "PolicyName": Self::FUNCTION_POLICY_ID,
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": ["iam:PassRole", "datazone:*"],
                        "Resource": "*",
                    }],
                },
                "Roles": [role.role_name()],
            }),
        )?;
        let function = graph.add(
            Self::FUNCTION_ID,
            ResourceKind::GrantFunction,
            &json!({
                "Runtime": "provided.al2023",
                "Handler": "policy-grant-handler",
                "Code": {
                    "S3Bucket": role.assets_bucket(),
                    "S3Key": Self::HANDLER_ASSET,
                },
                "Timeout": 900,
                "MemorySize": 256,
                "Role": role.arn(),
            }),
        )?;
        graph.add_dependency(function, function_policy)?;

        // provider framework, allowed to invoke the grant function
        let provider_policy = graph.add(
            Self::PROVIDER_POLICY_ID,
            ResourceKind::IamPolicy,
            &json!({
                "PolicyName": Self::PROVIDER_POLICY_ID,
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": "lambda:InvokeFunction",
                        "Resource": Token::attr(Self::FUNCTION_ID, "Arn"),
                    }],
                },
                "Roles": [role.role_name()],
            }),
        )?;
        graph.add_dependency(provider_policy, function)?;
        let provider = graph.add(
            Self::PROVIDER_ID,
            ResourceKind::GrantProvider,
            &json!({
                "Runtime": "nodejs20.x",
                "Handler": "framework.onEvent",
                "Code": {
                    "S3Bucket": role.assets_bucket(),
                    "S3Key": Self::FRAMEWORK_ASSET,
                },
                "Timeout": 900,
                "Role": role.arn(),
                "Environment": {
                    "Variables": {
                        "USER_ON_EVENT_FUNCTION_ARN": Token::attr(Self::FUNCTION_ID, "Arn"),
                    },
                },
            }),
        )?;
        graph.depend_on_all(provider, [function, provider_policy])?;

        tracing::debug!(qualifier = role.qualifier(), "Declared shared grant endpoint");
        Ok(Self {
            function,
            provider,
            clock: Box::new(clock),
        })
    }

    /// The endpoint function node
    pub fn endpoint(&self) -> NodeId {
        self.function
    }

    /// Issue a grant as node `<scope_id>-CustomResource`.
    ///
    /// Re-issuing under the same scope id reuses the node. The node depends
    /// on the endpoint and on every node the grant's identifiers refer to.
    pub fn issue(
        &self,
        graph: &mut ResourceGraph,
        scope_id: &str,
        grant: &Grant,
    ) -> Result<GrantHandle, ProvisionError> {
        let logical_id = format!("{}-CustomResource", scope_id);

        let payload = GrantPayload {
            service_token: Token::attr(Self::PROVIDER_ID, "Arn"),
            domain_identifier: &grant.domain_id,
            domain_unit_identifier: &grant.domain_unit_id,
            entity_identifier: grant.entity_identifier(),
            entity_type: grant.target.kind(),
            policy_type: grant.policy,
            principal_type: grant.principal.principal_type(),
            principal_arn: grant.principal.arn(),
            project_id: grant.project_id.as_ref(),
            include_child_domain_units: grant.include_descendants,
            timestamp: grant
                .force_refresh
                .then(|| self.clock.now_millis().to_string()),
        };

        let mut prerequisites = vec![self.function, self.provider];
        let referenced = [
            Some(&grant.domain_id),
            Some(&grant.domain_unit_id),
            Some(grant.entity_identifier()),
            grant.principal.arn(),
            grant.project_id.as_ref(),
        ];
        for token in referenced.into_iter().flatten() {
            for id in token.referenced_logical_ids() {
                prerequisites.push(graph.lookup(id)?);
            }
        }

        let (node, outcome) = graph.upsert(&logical_id, ResourceKind::PolicyGrant, &payload)?;
        graph.depend_on_all(node, prerequisites)?;

        tracing::debug!(
            grant = %logical_id,
            policy = %grant.policy,
            outcome = ?outcome,
            "Issued grant"
        );
        Ok(GrantHandle {
            node,
            logical_id,
            outcome,
        })
    }
}
