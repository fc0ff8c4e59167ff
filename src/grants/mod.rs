//! Out-of-band permission grants
//!
//! A grant cannot be declared as a plain resource. Instead each grant is a
//! custom-resource node whose properties form the request payload sent to
//! one shared endpoint function at apply time. [`issuer`] builds those nodes
//! and [`handler`] is the endpoint side that turns a payload into a
//! policy-grant API call.

pub mod handler;
pub mod issuer;

use govgraph_types::{GrantEntityKind, PolicyType, PrincipalType};

use crate::graph::Token;

pub use issuer::{Clock, ExecutionRole, FixedClock, GrantHandle, GrantIssuer, SystemClock};

/// Entity a grant is attached to
#[derive(Debug, Clone, PartialEq)]
pub enum GrantTarget {
    /// The unit named by the grant's `domain_unit_id`
    DomainUnit,
    /// Blueprint configuration, as `<account>:<blueprintId>`
    BlueprintConfiguration(Token),
    EnvironmentProfile(Token),
}

impl GrantTarget {
    pub fn kind(&self) -> GrantEntityKind {
        match self {
            GrantTarget::DomainUnit => GrantEntityKind::DomainUnit,
            GrantTarget::BlueprintConfiguration(_) => GrantEntityKind::BlueprintConfiguration,
            GrantTarget::EnvironmentProfile(_) => GrantEntityKind::EnvironmentProfile,
        }
    }
}

/// Who receives the grant
#[derive(Debug, Clone, PartialEq)]
pub enum GrantPrincipal {
    Role(Token),
    User(Token),
    Group(Token),
    /// Every user of the domain
    AllUsers,
    /// Derived by the endpoint from the project the grant is scoped to
    Project,
}

impl GrantPrincipal {
    pub fn principal_type(&self) -> Option<PrincipalType> {
        match self {
            GrantPrincipal::Role(_) => Some(PrincipalType::IamRole),
            GrantPrincipal::User(_) => Some(PrincipalType::IamUser),
            GrantPrincipal::Group(_) => Some(PrincipalType::IamGroup),
            GrantPrincipal::AllUsers => Some(PrincipalType::AllUsers),
            GrantPrincipal::Project => None,
        }
    }

    pub fn arn(&self) -> Option<&Token> {
        match self {
            GrantPrincipal::Role(arn) | GrantPrincipal::User(arn) | GrantPrincipal::Group(arn) => {
                Some(arn)
            }
            GrantPrincipal::AllUsers | GrantPrincipal::Project => None,
        }
    }
}

/// A permission grant to be issued through the shared endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub domain_id: Token,
    pub domain_unit_id: Token,
    pub target: GrantTarget,
    pub principal: GrantPrincipal,
    pub policy: PolicyType,
    pub project_id: Option<Token>,
    pub include_descendants: bool,
    /// Inject a fresh timestamp so the endpoint re-runs even if nothing else changed
    pub force_refresh: bool,
}

impl Grant {
    /// Grant on a unit itself, not including descendants
    pub fn on_unit(
        domain_id: Token,
        domain_unit_id: Token,
        principal: GrantPrincipal,
        policy: PolicyType,
    ) -> Self {
        Self {
            domain_id,
            domain_unit_id,
            target: GrantTarget::DomainUnit,
            principal,
            policy,
            project_id: None,
            include_descendants: false,
            force_refresh: false,
        }
    }

    pub fn with_target(mut self, target: GrantTarget) -> Self {
        self.target = target;
        self
    }

    pub fn including_descendants(mut self) -> Self {
        self.include_descendants = true;
        self
    }

    pub fn for_project(mut self, project_id: Token) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Identifier of the entity the grant is attached to
    pub fn entity_identifier(&self) -> &Token {
        match &self.target {
            GrantTarget::DomainUnit => &self.domain_unit_id,
            GrantTarget::BlueprintConfiguration(id) | GrantTarget::EnvironmentProfile(id) => id,
        }
    }
}
