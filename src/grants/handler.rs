//! Endpoint-side grant handler
//!
//! Receives the custom-resource lifecycle events the backend dispatches for
//! each grant node, translates the payload into a policy-grant request and
//! calls the control plane through a [`PolicyGrantClient`]. Create and Update
//! add the grant, Delete removes it. Transient client failures are retried
//! with exponential backoff; the outcome is reported as Success or Failed.
//!
//! This crate ships the handler logic only. The runtime adapter is built
//! outside it, as the function bundle published under
//! [`GrantIssuer::HANDLER_ASSET`](super::GrantIssuer::HANDLER_ASSET). That
//! adapter supplies a [`PolicyGrantClient`] backed by the control-plane SDK,
//! passes each invocation event to [`GrantEventHandler::handle_value`] and
//! returns the [`GrantResponse`] to the provider framework that invoked it.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use govgraph_types::{GrantEntityKind, PolicyType, PrincipalType, VocabularyError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// EVENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GrantEvent {
    pub request_type: RequestType,
    pub resource_properties: GrantProperties,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
}

/// Grant payload as received. Vocabulary fields stay strings until
/// translation so that an unknown value fails the request, not the parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrantProperties {
    #[serde(rename = "DomainIdentifier", default)]
    pub domain_identifier: String,
    #[serde(rename = "DomainUnitIdentifier", default)]
    pub domain_unit_identifier: Option<String>,
    #[serde(rename = "EntityIdentifier", default)]
    pub entity_identifier: Option<String>,
    #[serde(rename = "EntityType", default)]
    pub entity_type: String,
    #[serde(rename = "PolicyType", default)]
    pub policy_type: String,
    #[serde(rename = "PrincipalType", default)]
    pub principal_type: Option<String>,
    #[serde(rename = "PrincipalArn", default)]
    pub principal_arn: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(
        rename = "IncludeChildDomainUnits",
        default,
        deserialize_with = "flexible_bool"
    )]
    pub include_child_domain_units: bool,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<String>,
}

/// Accepts `true`/`false` and their string forms; custom-resource
/// properties usually arrive stringified.
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected boolean for IncludeChildDomainUnits, got '{}'",
                other
            ))),
        },
    }
}

// ============================================================================
// TRANSLATION
// ============================================================================

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    #[error("Invalid PrincipalType: {0}")]
    InvalidPrincipal(String),

    #[error("Missing required property {0}")]
    MissingProperty(&'static str),

    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: ClientError,
    },
}

/// Control-plane request built from a grant payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyGrantRequest {
    pub domain_identifier: String,
    pub entity_identifier: String,
    pub entity_type: GrantEntityKind,
    pub policy_type: PolicyType,
    pub principal: Value,
    pub detail: Value,
}

pub fn translate(props: &GrantProperties) -> Result<PolicyGrantRequest, HandlerError> {
    let policy: PolicyType = props.policy_type.parse()?;
    let entity_type: GrantEntityKind = props.entity_type.parse()?;
    let principal_type = props
        .principal_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<PrincipalType>)
        .transpose()?;
    let entity_identifier = props
        .entity_identifier
        .clone()
        .ok_or(HandlerError::MissingProperty("EntityIdentifier"))?;

    let principal = principal_detail(props, policy, principal_type)?;
    let detail = policy_detail(policy, props);

    Ok(PolicyGrantRequest {
        domain_identifier: props.domain_identifier.clone(),
        entity_identifier,
        entity_type,
        policy_type: policy,
        principal,
        detail,
    })
}

fn principal_detail(
    props: &GrantProperties,
    policy: PolicyType,
    principal_type: Option<PrincipalType>,
) -> Result<Value, HandlerError> {
    let arn = || {
        props
            .principal_arn
            .clone()
            .ok_or(HandlerError::MissingProperty("PrincipalArn"))
    };

    match principal_type {
        Some(PrincipalType::IamUser | PrincipalType::IamRole)
            if policy != PolicyType::CreateEnvironmentProfile =>
        {
            Ok(json!({ "user": { "userIdentifier": arn()? } }))
        }
        Some(PrincipalType::IamGroup) => Ok(json!({ "group": { "groupIdentifier": arn()? } })),
        Some(PrincipalType::AllUsers) => Ok(json!({ "user": { "allUsersGrantFilter": {} } })),
        _ if policy == PolicyType::CreateEnvironmentProfile => Ok(json!({
            "project": {
                "projectDesignation": "OWNER",
                "projectGrantFilter": {
                    "domainUnitFilter": {
                        "domainUnit": props.domain_unit_identifier,
                        "includeChildDomainUnits": false
                    }
                },
                "projectIdentifier": props.project_id,
            }
        })),
        _ if policy == PolicyType::CreateEnvironment => Ok(json!({
            "project": {
                "projectDesignation": "OWNER",
                "projectIdentifier": props.project_id,
            }
        })),
        _ => Err(HandlerError::InvalidPrincipal(
            props.principal_type.clone().unwrap_or_default(),
        )),
    }
}

fn policy_detail(policy: PolicyType, props: &GrantProperties) -> Value {
    let include = props.include_child_domain_units;
    match policy {
        PolicyType::CreateProject => json!({ "createProject": { "includeChildDomainUnits": include } }),
        PolicyType::AddToProjectMemberPool => {
            json!({ "addToProjectMemberPool": { "includeChildDomainUnits": include } })
        }
        PolicyType::CreateGlossary => json!({ "createGlossary": { "includeChildDomainUnits": include } }),
        PolicyType::CreateFormType => json!({ "createFormType": { "includeChildDomainUnits": include } }),
        PolicyType::CreateAssetType => {
            json!({ "createAssetType": { "includeChildDomainUnits": include } })
        }
        PolicyType::CreateEnvironmentProfile => {
            json!({ "createEnvironmentProfile": { "domainUnitId": props.domain_unit_identifier } })
        }
        PolicyType::CreateEnvironment => json!({ "createEnvironment": {} }),
        PolicyType::CreateEnvironmentFromBlueprint => {
            json!({ "createEnvironmentFromBlueprint": { "includeChildDomainUnits": include } })
        }
        PolicyType::CreateProjectFromProjectProfile => json!({
            "createProjectFromProjectProfile": {
                "includeChildDomainUnits": include,
                "projectProfiles": []
            }
        }),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClientError(pub String);

/// Control-plane policy-grant API
#[async_trait]
pub trait PolicyGrantClient: Send + Sync {
    async fn add_policy_grant(&self, request: &PolicyGrantRequest) -> Result<(), ClientError>;
    async fn remove_policy_grant(&self, request: &PolicyGrantRequest) -> Result<(), ClientError>;
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Create and Update: 5 attempts, 5s doubling
    pub const UPSERT: RetryPolicy = RetryPolicy {
        attempts: 5,
        initial_delay: Duration::from_secs(5),
        multiplier: 2,
    };

    /// Delete: 3 attempts, 5s tripling
    pub const DELETE: RetryPolicy = RetryPolicy {
        attempts: 3,
        initial_delay: Duration::from_secs(5),
        multiplier: 3,
    };

    /// Delay after the given failed attempt (0-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay * self.multiplier.saturating_pow(attempt)
    }
}

// ============================================================================
// HANDLER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GrantResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub data: BTreeMap<String, String>,
}

impl GrantResponse {
    fn success(physical_resource_id: String, message: &str) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: "Success".to_string(),
            physical_resource_id,
            data: [("Message".to_string(), message.to_string())].into(),
        }
    }

    fn failed(physical_resource_id: String, error: &HandlerError) -> Self {
        let reason = error.to_string();
        Self {
            status: ResponseStatus::Failed,
            reason: reason.clone(),
            physical_resource_id,
            data: [("Error".to_string(), reason)].into(),
        }
    }
}

pub struct GrantEventHandler<C> {
    client: C,
    settle_delay: Duration,
    upsert_retry: RetryPolicy,
    delete_retry: RetryPolicy,
}

impl<C: PolicyGrantClient> GrantEventHandler<C> {
    /// Wait before the first call so freshly created entities are visible
    pub const SETTLE_DELAY: Duration = Duration::from_secs(10);

    pub fn new(client: C) -> Self {
        Self {
            client,
            settle_delay: Self::SETTLE_DELAY,
            upsert_retry: RetryPolicy::UPSERT,
            delete_retry: RetryPolicy::DELETE,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_retry(mut self, upsert: RetryPolicy, delete: RetryPolicy) -> Self {
        self.upsert_retry = upsert;
        self.delete_retry = delete;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Handle a raw event document
    pub async fn handle_value(&self, event: Value) -> GrantResponse {
        match serde_json::from_value::<GrantEvent>(event) {
            Ok(event) => self.handle(&event).await,
            Err(e) => {
                let error = HandlerError::from(e);
                warn!(error = %error, "Rejected grant event");
                GrantResponse::failed("unknown".to_string(), &error)
            }
        }
    }

    pub async fn handle(&self, event: &GrantEvent) -> GrantResponse {
        let props = &event.resource_properties;
        info!(
            request = ?event.request_type,
            domain = %props.domain_identifier,
            policy = %props.policy_type,
            "Received grant event"
        );
        tokio::time::sleep(self.settle_delay).await;

        let physical_resource_id = event
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| physical_id(props));

        match self.apply(event).await {
            Ok(message) => GrantResponse::success(physical_resource_id, message),
            Err(error) => {
                warn!(request = ?event.request_type, error = %error, "Grant event failed");
                GrantResponse::failed(physical_resource_id, &error)
            }
        }
    }

    async fn apply(&self, event: &GrantEvent) -> Result<&'static str, HandlerError> {
        let request = translate(&event.resource_properties)?;
        match event.request_type {
            RequestType::Create | RequestType::Update => {
                self.retry("AddPolicyGrant", self.upsert_retry, || {
                    self.client.add_policy_grant(&request)
                })
                .await?;
                Ok("Policy grant added/updated successfully")
            }
            RequestType::Delete => {
                self.retry("RemovePolicyGrant", self.delete_retry, || {
                    self.client.remove_policy_grant(&request)
                })
                .await?;
                Ok("Policy grant removed successfully")
            }
        }
    }

    async fn retry<F, Fut>(
        &self,
        operation: &'static str,
        policy: RetryPolicy,
        mut call: F,
    ) -> Result<(), HandlerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        let attempts = policy.attempts.max(1);
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(()) => {
                    info!(operation, attempt = attempt + 1, "Policy grant call succeeded");
                    return Ok(());
                }
                Err(last) if attempt + 1 >= attempts => {
                    return Err(HandlerError::RetriesExhausted {
                        operation,
                        attempts,
                        last,
                    });
                }
                Err(e) => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %e,
                        retry_in_secs = delay.as_secs(),
                        "Policy grant call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn physical_id(props: &GrantProperties) -> String {
    let raw = format!(
        "{}-{}-{}-{}",
        props.domain_identifier,
        props.entity_identifier.as_deref().unwrap_or(""),
        props.policy_type,
        props.principal_arn.as_deref().unwrap_or("")
    );
    raw.replace([':', '/'], "-")
}
