//! Project/Environment Factory
//!
//! Gated creation of projects, memberships, environment profiles and
//! environments. A missing prerequisite is not an error: it is recorded as
//! a diagnostic and the factory returns `None` so the caller skips the
//! downstream work. Every produced node gets explicit edges onto its
//! prerequisites, since the composite identifiers it embeds do not order
//! anything by themselves.

use govgraph_types::{MembershipConfig, ProjectConfig};
use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Synthesis};
use crate::error::ProvisionError;
use crate::graph::{CompositeId, NodeId, Token};
use crate::resources::governance::{self, EnvironmentProperties, ProjectProperties};
use crate::resources::{BlueprintHandle, DomainHandle, MemberPrincipal, UserTable};

#[derive(Debug, Clone)]
pub struct ProjectHandle {
    pub node: NodeId,
    pub name: String,
    pub id: CompositeId,
    /// Membership nodes, in member-key order
    pub memberships: Vec<NodeId>,
}

impl ProjectHandle {
    /// Bare project id, as grants scoped to the project expect it
    pub fn attr_id(&self) -> Token {
        Token::attr(self.id.logical_id(), "Id")
    }
}

#[derive(Debug, Clone)]
pub struct ProfileHandle {
    pub node: NodeId,
    pub name: String,
    pub id: CompositeId,
}

impl ProfileHandle {
    pub fn attr_id(&self) -> Token {
        Token::attr(self.id.logical_id(), "Id")
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentHandle {
    pub node: NodeId,
    pub name: String,
    pub id: CompositeId,
}

/// Where a project lives
#[derive(Debug, Clone, Copy)]
pub struct ProjectPlacement<'a> {
    pub domain: Option<&'a DomainHandle>,
    pub unit: Option<&'a CompositeId>,
}

#[derive(Debug, Clone)]
pub struct ProfileSpec<'a> {
    pub logical_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Clone)]
pub struct EnvironmentSpec<'a> {
    pub logical_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub role_arn: Token,
}

/// Names of the absent prerequisites, or `None` when all are present
fn missing(prerequisites: &[(&'static str, bool)]) -> Option<String> {
    let absent: Vec<&str> = prerequisites
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    (!absent.is_empty()).then(|| absent.join(", "))
}

/// Create a project and its memberships.
///
/// Requires the domain. Membership principals are resolved through the
/// predefined-user table; a membership that cannot be resolved is skipped
/// with a diagnostic and its siblings are still processed.
pub fn create_project(
    syn: &mut Synthesis,
    logical_id: &str,
    config: &ProjectConfig,
    placement: ProjectPlacement<'_>,
    users: &UserTable,
) -> Result<Option<ProjectHandle>, ProvisionError> {
    let Some(domain) = placement.domain else {
        syn.diagnostics.warn(
            DiagnosticKind::MissingPrerequisite,
            logical_id,
            "Project not created: domain is missing",
        );
        return Ok(None);
    };

    let properties = ProjectProperties {
        domain_identifier: placement
            .unit
            .map(CompositeId::domain_part)
            .unwrap_or_else(|| domain.domain_id()),
        name: &config.name,
        description: config.description.as_deref(),
        domain_unit_id: placement.unit.map(CompositeId::entity_part),
        glossary_terms: config.glossary_terms.clone(),
    };
    let node = governance::create_project(&mut syn.graph, logical_id, &properties)?;
    syn.graph.add_dependency(node, domain.node)?;
    if let Some(unit) = placement.unit {
        let unit_node = syn.graph.lookup(unit.logical_id())?;
        syn.graph.add_dependency(node, unit_node)?;
    }

    let mut project = ProjectHandle {
        node,
        name: config.name.clone(),
        id: CompositeId::new(logical_id),
        memberships: Vec::new(),
    };

    for (key, member) in &config.membership {
        let subject = format!("{}/{}", config.name, key);
        let Some((principal, user_node)) = resolve_member(member, users) else {
            let reason = match &member.predefined_user_key {
                Some(user_key) => format!("Unknown predefined user '{}'", user_key),
                None => "Membership names no user or group".to_string(),
            };
            syn.diagnostics
                .warn(DiagnosticKind::UnresolvedMember, subject, reason);
            continue;
        };

        let membership_id = format!("{}-Membership-{}", logical_id, key);
        let membership = governance::create_membership(
            &mut syn.graph,
            &membership_id,
            &member.designation,
            domain.domain_id(),
            &project.id,
            &principal,
        )?;
        syn.graph.add_dependency(membership, node)?;
        if let Some(user_node) = user_node {
            syn.graph.add_dependency(membership, user_node)?;
        }
        project.memberships.push(membership);
    }

    debug!(
        project = %config.name,
        memberships = project.memberships.len(),
        "Created project"
    );
    Ok(Some(project))
}

fn resolve_member(
    member: &MembershipConfig,
    users: &UserTable,
) -> Option<(MemberPrincipal, Option<NodeId>)> {
    if let Some(key) = &member.predefined_user_key {
        let user = users.get(key)?;
        return Some((MemberPrincipal::User(user.member_identifier()), Some(user.node)));
    }
    if let Some(user) = &member.user_identifier {
        return Some((MemberPrincipal::User(Token::literal(user.as_str())), None));
    }
    member
        .group_identifier
        .as_ref()
        .map(|group| (MemberPrincipal::Group(Token::literal(group.as_str())), None))
}

/// Create an environment profile. Requires domain, blueprint and project.
pub fn create_environment_profile(
    syn: &mut Synthesis,
    spec: &ProfileSpec<'_>,
    domain: Option<&DomainHandle>,
    blueprint: Option<&BlueprintHandle>,
    project: Option<&ProjectHandle>,
) -> Result<Option<ProfileHandle>, ProvisionError> {
    let (Some(domain), Some(blueprint), Some(project)) = (domain, blueprint, project) else {
        let absent = missing(&[
            ("domain", domain.is_some()),
            ("blueprint", blueprint.is_some()),
            ("project", project.is_some()),
        ])
        .unwrap_or_default();
        syn.diagnostics.warn(
            DiagnosticKind::MissingPrerequisite,
            spec.logical_id,
            format!("Environment profile not created: missing {}", absent),
        );
        return Ok(None);
    };

    let node = governance::create_environment_profile(
        &mut syn.graph,
        spec.logical_id,
        spec.name,
        spec.description,
        domain,
        blueprint,
        &project.id,
    )?;
    syn.graph
        .depend_on_all(node, [domain.node, blueprint.node, project.node])?;

    Ok(Some(ProfileHandle {
        node,
        name: spec.name.to_string(),
        id: CompositeId::new(spec.logical_id),
    }))
}

/// Create an environment. Requires domain, project and profile.
pub fn create_environment(
    syn: &mut Synthesis,
    spec: &EnvironmentSpec<'_>,
    domain: Option<&DomainHandle>,
    project: Option<&ProjectHandle>,
    profile: Option<&ProfileHandle>,
) -> Result<Option<EnvironmentHandle>, ProvisionError> {
    let (Some(domain), Some(project), Some(profile)) = (domain, project, profile) else {
        let absent = missing(&[
            ("domain", domain.is_some()),
            ("project", project.is_some()),
            ("environment profile", profile.is_some()),
        ])
        .unwrap_or_default();
        syn.diagnostics.warn(
            DiagnosticKind::MissingPrerequisite,
            spec.logical_id,
            format!("Environment not created: missing {}", absent),
        );
        return Ok(None);
    };

    let node = governance::create_environment(
        &mut syn.graph,
        spec.logical_id,
        EnvironmentProperties {
            name: spec.name,
            description: spec.description,
            role_arn: spec.role_arn.clone(),
        },
        domain,
        &project.id,
        &profile.id,
    )?;
    syn.graph
        .depend_on_all(node, [domain.node, project.node, profile.node])?;

    Ok(Some(EnvironmentHandle {
        node,
        name: spec.name.to_string(),
        id: CompositeId::new(spec.logical_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ResourceKind, RoleRef};
    use crate::resources::governance::{create_blueprint, create_domain};
    use crate::resources::identity::create_user_profile;
    use govgraph_types::{BlueprintConfig, DomainConfig, UserConfig};
    use serde_json::json;

    fn setup() -> (Synthesis, DomainHandle, UserTable) {
        let mut syn = Synthesis::new();
        let domain = create_domain(&mut syn.graph, "gov", &DomainConfig::default()).unwrap();
        let mut users = UserTable::new();
        let user = create_user_profile(
            &mut syn.graph,
            "owner",
            &UserConfig {
                user_identifier: "Analyst".into(),
                status: "ACTIVATED".into(),
                user_type: "IAM_ROLE".into(),
            },
            &domain,
        )
        .unwrap();
        users.insert(user);
        (syn, domain, users)
    }

    fn blueprint(syn: &mut Synthesis, domain: &DomainHandle) -> BlueprintHandle {
        create_blueprint(
            &mut syn.graph,
            &BlueprintConfig {
                environment_blueprint_identifier: "DefaultDataLake".into(),
                manage_access_role_arn: "Manage".into(),
                provisioning_role_arn: "Provision".into(),
                enabled_regions: vec![],
            },
            domain,
            None,
        )
        .unwrap()
    }

    fn placement(domain: &DomainHandle) -> ProjectPlacement<'_> {
        ProjectPlacement {
            domain: Some(domain),
            unit: None,
        }
    }

    fn plain_project(syn: &mut Synthesis, domain: &DomainHandle, users: &UserTable) -> ProjectHandle {
        create_project(syn, "P", &ProjectConfig::new("x"), placement(domain), users)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_predefined_member_resolves_to_user() {
        let (mut syn, domain, users) = setup();
        let config = ProjectConfig::new("Leads")
            .with_member("a-owner", MembershipConfig::predefined("PROJECT_OWNER", "owner"));

        let project = create_project(&mut syn, "P", &config, placement(&domain), &users)
            .unwrap()
            .unwrap();

        assert_eq!(project.memberships.len(), 1);
        let membership = &syn.graph[project.memberships[0]];
        assert_eq!(membership.logical_id(), "P-Membership-a-owner");
        let expected = users.get("owner").unwrap().member_identifier();
        assert_eq!(
            membership.property("/Member/UserIdentifier"),
            Some(&expected.to_json())
        );
        assert!(syn.graph.has_edge(project.memberships[0], project.node));
        assert!(syn.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_member_is_skipped_siblings_kept() {
        let (mut syn, domain, users) = setup();
        let config = ProjectConfig::new("Leads")
            .with_member("a", MembershipConfig::predefined("PROJECT_OWNER", "missing"))
            .with_member("b", MembershipConfig::predefined("PROJECT_CONTRIBUTOR", "owner"))
            .with_member("c", MembershipConfig::group("PROJECT_CONTRIBUTOR", "grp-1"));

        let project = create_project(&mut syn, "P", &config, placement(&domain), &users)
            .unwrap()
            .unwrap();

        assert_eq!(project.memberships.len(), 2);
        assert!(syn.graph.find("P-Membership-a").is_none());
        assert_eq!(
            syn.graph
                .by_name("P-Membership-c")
                .unwrap()
                .property("/Member/GroupIdentifier"),
            Some(&json!("grp-1"))
        );
        let warnings: Vec<_> = syn
            .diagnostics
            .of_kind(DiagnosticKind::UnresolvedMember)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].subject, "Leads/a");
    }

    #[test]
    fn test_project_without_domain_is_skipped() {
        let (mut syn, _, users) = setup();
        let placement = ProjectPlacement {
            domain: None,
            unit: None,
        };
        let result =
            create_project(&mut syn, "P", &ProjectConfig::new("x"), placement, &users).unwrap();
        assert!(result.is_none());
        assert_eq!(
            syn.diagnostics
                .of_kind(DiagnosticKind::MissingPrerequisite)
                .count(),
            1
        );
    }

    #[test]
    fn test_project_under_unit_uses_composite_parts() {
        let (mut syn, domain, users) = setup();
        let unit_node = syn
            .graph
            .add("Unit", ResourceKind::DomainUnit, &json!({}))
            .unwrap();
        let unit = CompositeId::new("Unit");
        let placement = ProjectPlacement {
            domain: Some(&domain),
            unit: Some(&unit),
        };

        let project = create_project(&mut syn, "P", &ProjectConfig::new("x"), placement, &users)
            .unwrap()
            .unwrap();

        let node = &syn.graph[project.node];
        assert_eq!(node.property("/DomainUnitId"), Some(&unit.entity_part().to_json()));
        assert_eq!(node.property("/DomainIdentifier"), Some(&unit.domain_part().to_json()));
        assert!(syn.graph.has_edge(project.node, unit_node));
        assert!(syn.graph.has_edge(project.node, domain.node));
    }

    #[test]
    fn test_profile_gated_on_blueprint() {
        let (mut syn, domain, users) = setup();
        let project = plain_project(&mut syn, &domain, &users);
        let spec = ProfileSpec {
            logical_id: "Profile",
            name: "env_profile",
            description: "d",
        };

        let profile =
            create_environment_profile(&mut syn, &spec, Some(&domain), None, Some(&project))
                .unwrap();
        assert!(profile.is_none());
        assert!(syn.graph.find("Profile").is_none());
        let diagnostic = syn.diagnostics.iter().last().unwrap();
        assert_eq!(diagnostic.message, "Environment profile not created: missing blueprint");

        let bp = blueprint(&mut syn, &domain);
        let profile =
            create_environment_profile(&mut syn, &spec, Some(&domain), Some(&bp), Some(&project))
                .unwrap()
                .unwrap();
        assert!(syn.graph.has_edge(profile.node, bp.node));
        assert!(syn.graph.has_edge(profile.node, project.node));
    }

    #[test]
    fn test_environment_requires_profile() {
        let (mut syn, domain, users) = setup();
        let project = plain_project(&mut syn, &domain, &users);
        let spec = EnvironmentSpec {
            logical_id: "Env",
            name: "env",
            description: "d",
            role_arn: RoleRef::named("GlueProvisioning").arn(),
        };

        let before = syn.graph.len();
        let environment =
            create_environment(&mut syn, &spec, Some(&domain), Some(&project), None).unwrap();
        assert!(environment.is_none());
        assert_eq!(syn.graph.len(), before);

        let bp = blueprint(&mut syn, &domain);
        let profile = create_environment_profile(
            &mut syn,
            &ProfileSpec {
                logical_id: "Profile",
                name: "p",
                description: "d",
            },
            Some(&domain),
            Some(&bp),
            Some(&project),
        )
        .unwrap()
        .unwrap();
        let environment =
            create_environment(&mut syn, &spec, Some(&domain), Some(&project), Some(&profile))
                .unwrap()
                .unwrap();
        assert!(syn.graph.has_edge(environment.node, profile.node));
        assert_eq!(
            syn.graph[environment.node].property("/EnvironmentProfileIdentifier"),
            Some(&profile.id.entity_part().to_json())
        );
    }
}
