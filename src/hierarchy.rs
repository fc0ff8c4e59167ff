//! Hierarchy Walker
//!
//! Recursive tree-to-graph compiler for the organizational-unit hierarchy.
//! Per unit, in order:
//!
//! 1. the unit node, with exactly one edge onto its parent
//! 2. the project-creation grant (including descendants)
//! 3. one project-member-pool grant per known principal (this unit only)
//! 4. projects with memberships, then per project an environment-profile
//!    grant, the profile, an environment grant, the environment and, once
//!    the environment exists, one lineage bundle per entity
//! 5. child units, recursively
//!
//! Nothing is executed here; the walk only declares nodes and edges. A
//! failure anywhere inside a unit aborts the whole run as
//! [`ProvisionError::UnitCreation`] naming the innermost failing unit.

use govgraph_types::{EntityConfig, OrganizationalUnit, PolicyType, ProjectConfig};
use tracing::{error, info};

use crate::diagnostics::Synthesis;
use crate::error::ProvisionError;
use crate::factory::{
    self, EnvironmentSpec, ProfileHandle, ProfileSpec, ProjectHandle, ProjectPlacement,
};
use crate::grants::{ExecutionRole, Grant, GrantHandle, GrantIssuer, GrantPrincipal, GrantTarget};
use crate::graph::{CompositeId, NodeId, RoleRef};
use crate::lineage::{self, LineageBuilder, LineageBundle, LineageRequest};
use crate::resources::governance::create_domain_unit;
use crate::resources::{BlueprintHandle, BucketTable, DomainHandle, UserTable};

/// Everything the walk reads, created before it starts
#[derive(Debug, Clone, Copy)]
pub struct WalkContext<'a> {
    pub domain: &'a DomainHandle,
    pub blueprint: Option<&'a BlueprintHandle>,
    pub users: &'a UserTable,
    pub buckets: &'a BucketTable,
    pub issuer: &'a GrantIssuer,
    pub execution: &'a ExecutionRole,
    /// Role environments and lineage resources run as
    pub provisioning_role: &'a RoleRef,
    pub lineage: &'a LineageBuilder,
    pub data_lake_settings: Option<NodeId>,
}

/// Result of walking one unit and its subtree
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub name: String,
    /// Escaped names from the top-level unit down to this one, `/`-joined
    pub path: String,
    pub node: NodeId,
    pub id: CompositeId,
    pub project_grant: GrantHandle,
    pub member_grants: Vec<GrantHandle>,
    pub projects: Vec<ProjectOutcome>,
    pub children: Vec<UnitOutcome>,
}

impl UnitOutcome {
    /// This unit and all descendants, depth first
    pub fn flatten(&self) -> Vec<&UnitOutcome> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ProjectOutcome {
    pub project: ProjectHandle,
    pub profile_grant: Option<GrantHandle>,
    pub profile: Option<ProfileHandle>,
    pub environment_grant: Option<GrantHandle>,
    pub environment: Option<NodeId>,
    pub lineage: Vec<LineageBundle>,
}

/// Parent of the unit being created
#[derive(Debug, Clone, Copy)]
enum Parent<'p> {
    /// The domain's root unit
    Root,
    Unit {
        id: &'p CompositeId,
        node: NodeId,
        name: &'p str,
        path: &'p str,
    },
}

/// Escape a unit name for use as one segment of a unit path
fn path_segment(name: &str) -> String {
    name.replace('%', "%25")
        .replace('/', "%2F")
        .replace('#', "%23")
}

/// Logical id of the unit at `path`, its ancestors' escaped names joined
/// by `/`. Ids of resources scoped to the unit extend it past a `#`, which
/// no unit path contains.
pub fn unit_logical_id(path: &str) -> String {
    format!("DataZoneDomainUnit-{}", path)
}

/// Logical id of a resource scoped to the unit `unit_id`
fn scoped_id(unit_id: &str, kind: &str, key: impl std::fmt::Display) -> String {
    format!("{}#{}/{}", unit_id, kind, key)
}

pub struct HierarchyWalker<'a> {
    ctx: WalkContext<'a>,
}

impl<'a> HierarchyWalker<'a> {
    pub fn new(ctx: WalkContext<'a>) -> Self {
        Self { ctx }
    }

    /// Walk every top-level unit under the domain root
    pub fn walk(
        &self,
        syn: &mut Synthesis,
        units: &[OrganizationalUnit],
    ) -> Result<Vec<UnitOutcome>, ProvisionError> {
        let outcomes = units
            .iter()
            .map(|unit| self.walk_unit(syn, unit, Parent::Root))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            units = outcomes.iter().map(|u| u.flatten().len()).sum::<usize>(),
            nodes = syn.graph.len(),
            "Walked domain hierarchy"
        );
        Ok(outcomes)
    }

    fn walk_unit(
        &self,
        syn: &mut Synthesis,
        unit: &OrganizationalUnit,
        parent: Parent<'_>,
    ) -> Result<UnitOutcome, ProvisionError> {
        self.create_unit(syn, unit, parent).map_err(|e| match e {
            ProvisionError::UnitCreation { .. } => e,
            other => {
                error!(unit = %unit.name, error = %other, "Error creating domain unit");
                ProvisionError::UnitCreation {
                    unit: unit.name.clone(),
                    source: Box::new(other),
                }
            }
        })
    }

    fn create_unit(
        &self,
        syn: &mut Synthesis,
        unit: &OrganizationalUnit,
        parent: Parent<'_>,
    ) -> Result<UnitOutcome, ProvisionError> {
        let domain = self.ctx.domain;
        let (path, parent_unit_id, parent_node, parent_name) = match parent {
            Parent::Root => (
                path_segment(&unit.name),
                domain.root_unit_id(),
                domain.node,
                None,
            ),
            Parent::Unit {
                id,
                node,
                name,
                path,
            } => (
                format!("{}/{}", path, path_segment(&unit.name)),
                id.entity_part(),
                node,
                Some(name),
            ),
        };

        // 1. the unit
        let logical_id = unit_logical_id(&path);
        let node = create_domain_unit(
            &mut syn.graph,
            &logical_id,
            &unit.name,
            domain.domain_id(),
            parent_unit_id,
        )?;
        syn.graph.add_dependency(node, parent_node)?;
        let id = CompositeId::new(&logical_id);

        // 2. project creation
        let project_grant = self.ctx.issuer.issue(
            &mut syn.graph,
            &format!("{}#GrantProjectCreate", logical_id),
            &Grant::on_unit(
                domain.domain_id(),
                id.entity_part(),
                self.ctx.execution.principal(),
                PolicyType::CreateProject,
            )
            .including_descendants(),
        )?;

        // 3. member pool, this unit only
        let principals = std::iter::once(self.ctx.execution.principal()).chain(
            self.ctx
                .users
                .iter()
                .map(|user| GrantPrincipal::Role(user.principal_arn.clone())),
        );
        let mut member_grants = Vec::new();
        for (index, principal) in principals.enumerate() {
            let grant = self.ctx.issuer.issue(
                &mut syn.graph,
                &scoped_id(&logical_id, "GrantProjectMemberAddition", index),
                &Grant::on_unit(
                    domain.domain_id(),
                    id.entity_part(),
                    principal,
                    PolicyType::AddToProjectMemberPool,
                ),
            )?;
            member_grants.push(grant);
        }

        info!(
            unit = %unit.name,
            path = %path,
            projects = unit.projects.len(),
            children = unit.children.len(),
            "Created domain unit"
        );

        // 4. projects
        let scope = UnitScope {
            name: &unit.name,
            parent_name,
            path: &path,
            logical_id: &logical_id,
            id: &id,
            project_grant: &project_grant,
            member_grants: &member_grants,
        };
        let mut projects = Vec::with_capacity(unit.projects.len());
        for (index, project) in unit.projects.iter().enumerate() {
            if let Some(outcome) = self.create_project(syn, &scope, index, project)? {
                projects.push(outcome);
            }
        }

        // 5. children
        let mut children = Vec::with_capacity(unit.children.len());
        for child in &unit.children {
            let parent = Parent::Unit {
                id: &id,
                node,
                name: &unit.name,
                path: &path,
            };
            children.push(self.walk_unit(syn, child, parent)?);
        }

        Ok(UnitOutcome {
            name: unit.name.clone(),
            path,
            node,
            id,
            project_grant,
            member_grants,
            projects,
            children,
        })
    }

    fn create_project(
        &self,
        syn: &mut Synthesis,
        scope: &UnitScope<'_>,
        index: usize,
        config: &ProjectConfig,
    ) -> Result<Option<ProjectOutcome>, ProvisionError> {
        let domain = self.ctx.domain;
        let project_logical_id =
            scoped_id(scope.logical_id, "Project", path_segment(&config.name));
        let placement = ProjectPlacement {
            domain: Some(domain),
            unit: Some(scope.id),
        };
        let Some(project) =
            factory::create_project(syn, &project_logical_id, config, placement, self.ctx.users)?
        else {
            return Ok(None);
        };

        let member_nodes: Vec<NodeId> = scope.member_grants.iter().map(|g| g.node).collect();
        syn.graph.depend_on_all(
            project.node,
            [self.ctx.issuer.endpoint(), scope.project_grant.node]
                .into_iter()
                .chain(member_nodes.iter().copied()),
        )?;
        for &membership in &project.memberships {
            syn.graph
                .depend_on_all(membership, member_nodes.iter().copied())?;
        }

        // environment profile, behind its grant
        let profile_grant = match self.ctx.blueprint {
            Some(blueprint) => Some(self.ctx.issuer.issue(
                &mut syn.graph,
                &scoped_id(scope.logical_id, "GrantEnvProfile", index),
                &Grant::on_unit(
                    domain.domain_id(),
                    scope.id.entity_part(),
                    GrantPrincipal::Project,
                    PolicyType::CreateEnvironmentProfile,
                )
                .with_target(GrantTarget::BlueprintConfiguration(
                    blueprint.grant_entity_id(),
                ))
                .for_project(project.attr_id()),
            )?),
            None => None,
        };

        let profile_name = format!("env_profile_{}_{}", scope.name, config.name);
        let profile_description = format!(
            "environment profile for the project {} in the domain unit {}",
            config.name, scope.name
        );
        let profile = factory::create_environment_profile(
            syn,
            &ProfileSpec {
                logical_id: &scoped_id(
                    scope.logical_id,
                    "EnvProfile",
                    path_segment(&config.name),
                ),
                name: &profile_name,
                description: &profile_description,
            },
            Some(domain),
            self.ctx.blueprint,
            Some(&project),
        )?;

        let mut outcome = ProjectOutcome {
            project,
            profile_grant,
            profile: None,
            environment_grant: None,
            environment: None,
            lineage: Vec::new(),
        };
        let Some(profile) = profile else {
            return Ok(Some(outcome));
        };
        if let Some(grant) = &outcome.profile_grant {
            syn.graph.add_dependency(profile.node, grant.node)?;
        }

        // environment, behind its grant
        let environment_grant = self.ctx.issuer.issue(
            &mut syn.graph,
            &scoped_id(scope.logical_id, "GrantEnvironment", index),
            &Grant::on_unit(
                domain.domain_id(),
                scope.id.entity_part(),
                GrantPrincipal::Project,
                PolicyType::CreateEnvironment,
            )
            .with_target(GrantTarget::EnvironmentProfile(profile.attr_id()))
            .for_project(outcome.project.attr_id())
            .forced(),
        )?;

        let environment_name = format!("env_{}_{}", scope.name, config.name);
        let environment_description = format!(
            "environment for the project {} in the domain unit {}",
            config.name, scope.name
        );
        let environment = factory::create_environment(
            syn,
            &EnvironmentSpec {
                logical_id: &scoped_id(
                    scope.logical_id,
                    "Environment",
                    path_segment(&config.name),
                ),
                name: &environment_name,
                description: &environment_description,
                role_arn: self.ctx.provisioning_role.arn(),
            },
            Some(domain),
            Some(&outcome.project),
            Some(&profile),
        )?;
        outcome.profile = Some(profile);

        let Some(environment) = environment else {
            outcome.environment_grant = Some(environment_grant);
            return Ok(Some(outcome));
        };
        syn.graph
            .add_dependency(environment.node, environment_grant.node)?;
        if let Some(settings) = self.ctx.data_lake_settings {
            syn.graph.add_dependency(environment.node, settings)?;
        }
        outcome.environment_grant = Some(environment_grant);
        outcome.environment = Some(environment.node);

        // lineage, one bundle per entity
        let database = lineage::database_name(scope.name, &config.name);
        for entity in &config.entities {
            let bundle = self.build_lineage(
                syn,
                scope,
                &outcome.project,
                environment.node,
                &database,
                entity,
            )?;
            outcome.lineage.push(bundle);
        }

        Ok(Some(outcome))
    }

    fn build_lineage(
        &self,
        syn: &mut Synthesis,
        scope: &UnitScope<'_>,
        project: &ProjectHandle,
        environment: NodeId,
        database: &str,
        entity: &EntityConfig,
    ) -> Result<LineageBundle, ProvisionError> {
        let request = LineageRequest {
            source_location: &entity.source_location,
            source_bucket: self.ctx.buckets.get(&entity.source_location),
            unit_name: scope.name,
            parent_unit_name: scope.parent_name,
            unit_path: scope.path,
            project_name: &project.name,
            role: self.ctx.provisioning_role,
            database_name: database,
            domain_id: self.ctx.domain.domain_id(),
            project_id: project.id.entity_part(),
            schedule_expression: &entity.schedule_expression,
            entity_type: &entity.entity_type,
            after: vec![environment],
        };
        Ok(self.ctx.lineage.build(&mut syn.graph, &request)?)
    }
}

/// The unit whose projects are being created
struct UnitScope<'s> {
    name: &'s str,
    parent_name: Option<&'s str>,
    /// Escaped ancestor path, unique across the forest
    path: &'s str,
    logical_id: &'s str,
    id: &'s CompositeId,
    project_grant: &'s GrantHandle,
    member_grants: &'s [GrantHandle],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::grants::FixedClock;
    use crate::graph::build_provisioning_plan;
    use crate::resources::governance::{create_blueprint, create_domain};
    use crate::resources::identity::create_user_profile;
    use govgraph_types::{BlueprintConfig, DomainConfig, MembershipConfig, UserConfig};
    use serde_json::json;

    struct Fixture {
        syn: Synthesis,
        domain: DomainHandle,
        blueprint: Option<BlueprintHandle>,
        users: UserTable,
        buckets: BucketTable,
        issuer: GrantIssuer,
        execution: ExecutionRole,
        role: RoleRef,
        lineage: LineageBuilder,
    }

    impl Fixture {
        fn new(with_blueprint: bool) -> Self {
            let mut syn = Synthesis::new();
            let execution = ExecutionRole::resolve(None).unwrap();
            let issuer =
                GrantIssuer::with_clock(&mut syn.graph, &execution, FixedClock(1)).unwrap();
            let domain = create_domain(&mut syn.graph, "gov", &DomainConfig::default()).unwrap();
            let blueprint = with_blueprint.then(|| {
                create_blueprint(
                    &mut syn.graph,
                    &BlueprintConfig {
                        environment_blueprint_identifier: "DefaultDataLake".into(),
                        manage_access_role_arn: "Manage".into(),
                        provisioning_role_arn: "Provision".into(),
                        enabled_regions: vec![],
                    },
                    &domain,
                    None,
                )
                .unwrap()
            });
            let mut users = UserTable::new();
            users.insert(
                create_user_profile(
                    &mut syn.graph,
                    "owner",
                    &UserConfig {
                        user_identifier: "Analyst".into(),
                        status: "ACTIVATED".into(),
                        user_type: "IAM_ROLE".into(),
                    },
                    &domain,
                )
                .unwrap(),
            );
            Self {
                syn,
                domain,
                blueprint,
                users,
                buckets: BucketTable::new(),
                issuer,
                execution,
                role: RoleRef::named("GlueProvisioningRole"),
                lineage: LineageBuilder::default(),
            }
        }

        fn walk(
            &mut self,
            units: &[OrganizationalUnit],
        ) -> Result<Vec<UnitOutcome>, ProvisionError> {
            let ctx = WalkContext {
                domain: &self.domain,
                blueprint: self.blueprint.as_ref(),
                users: &self.users,
                buckets: &self.buckets,
                issuer: &self.issuer,
                execution: &self.execution,
                provisioning_role: &self.role,
                lineage: &self.lineage,
                data_lake_settings: None,
            };
            HierarchyWalker::new(ctx).walk(&mut self.syn, units)
        }
    }

    fn leads() -> ProjectConfig {
        ProjectConfig::new("Leads")
            .with_member("owner", MembershipConfig::predefined("PROJECT_OWNER", "owner"))
            .with_entity(EntityConfig::new("orders", "source-orders", "cron(0 2 * * ? *)"))
            .with_entity(EntityConfig::new("returns", "source-returns", "cron(0 3 * * ? *)"))
    }

    #[test]
    fn test_unit_has_single_edge_to_parent() {
        let mut fx = Fixture::new(true);
        let tree = OrganizationalUnit::new("Sales")
            .with_child(OrganizationalUnit::new("EMEA").with_child(OrganizationalUnit::new("UK")));
        let outcomes = fx.walk(&[tree]).unwrap();

        let sales = &outcomes[0];
        assert_eq!(fx.syn.graph.dependencies_of(sales.node), vec![fx.domain.node]);
        let emea = &sales.children[0];
        assert_eq!(fx.syn.graph.dependencies_of(emea.node), vec![sales.node]);
        let uk = &emea.children[0];
        assert_eq!(fx.syn.graph.dependencies_of(uk.node), vec![emea.node]);
        assert_eq!(fx.syn.graph[sales.node].logical_id(), "DataZoneDomainUnit-Sales");
        assert_eq!(
            fx.syn.graph[uk.node].logical_id(),
            "DataZoneDomainUnit-Sales/EMEA/UK"
        );
        assert_eq!(uk.path, "Sales/EMEA/UK");
        assert_eq!(fx.syn.graph[uk.node].property("/Name"), Some(&json!("UK")));
        assert!(build_provisioning_plan(&fx.syn.graph).is_ok());
    }

    fn regional_unit(source: &str) -> OrganizationalUnit {
        OrganizationalUnit::new("UK").with_project(
            ProjectConfig::new("Leads")
                .with_member("owner", MembershipConfig::predefined("PROJECT_OWNER", "owner"))
                .with_entity(EntityConfig::new("orders", source, "cron(0 2 * * ? *)")),
        )
    }

    #[test]
    fn test_same_names_in_different_subtrees_stay_distinct() {
        let mut fx = Fixture::new(true);
        let forest = [
            OrganizationalUnit::new("Sales").with_child(
                OrganizationalUnit::new("EMEA").with_child(regional_unit("source-sales-uk")),
            ),
            OrganizationalUnit::new("Marketing").with_child(
                OrganizationalUnit::new("EMEA").with_child(regional_unit("source-marketing-uk")),
            ),
        ];
        let outcomes = fx.walk(&forest).unwrap();
        let graph = &fx.syn.graph;

        let sales_uk = &outcomes[0].children[0].children[0];
        let marketing_uk = &outcomes[1].children[0].children[0];
        assert_eq!(graph[sales_uk.node].logical_id(), "DataZoneDomainUnit-Sales/EMEA/UK");
        assert_eq!(
            graph[marketing_uk.node].logical_id(),
            "DataZoneDomainUnit-Marketing/EMEA/UK"
        );
        for uk in [sales_uk, marketing_uk] {
            assert_eq!(graph[uk.node].property("/Name"), Some(&json!("UK")));
            assert_eq!(uk.projects[0].lineage.len(), 1);
        }
        assert_ne!(
            sales_uk.projects[0].lineage[0].names.job,
            marketing_uk.projects[0].lineage[0].names.job
        );
        assert_ne!(
            sales_uk.projects[0].project.node,
            marketing_uk.projects[0].project.node
        );
        assert!(build_provisioning_plan(graph).is_ok());
    }

    #[test]
    fn test_top_level_unit_beside_nested_namesake() {
        let mut fx = Fixture::new(true);
        let forest = [
            OrganizationalUnit::new("root").with_child(OrganizationalUnit::new("Sales")),
            OrganizationalUnit::new("Sales"),
        ];
        let outcomes = fx.walk(&forest).unwrap();
        let graph = &fx.syn.graph;

        let nested = &outcomes[0].children[0];
        let top = &outcomes[1];
        assert_eq!(graph[nested.node].logical_id(), "DataZoneDomainUnit-root/Sales");
        assert_eq!(graph[top.node].logical_id(), "DataZoneDomainUnit-Sales");
        assert_eq!(graph.dependencies_of(top.node), vec![fx.domain.node]);
        assert_eq!(graph.dependencies_of(nested.node), vec![outcomes[0].node]);
        assert_ne!(nested.project_grant.node, top.project_grant.node);
    }

    #[test]
    fn test_separators_in_unit_names_are_escaped() {
        let mut fx = Fixture::new(true);
        let forest = [
            OrganizationalUnit::new("A/B"),
            OrganizationalUnit::new("A").with_child(OrganizationalUnit::new("B")),
            OrganizationalUnit::new("A#Project"),
        ];
        let outcomes = fx.walk(&forest).unwrap();
        let graph = &fx.syn.graph;

        assert_eq!(graph[outcomes[0].node].logical_id(), "DataZoneDomainUnit-A%2FB");
        assert_eq!(graph[outcomes[0].node].property("/Name"), Some(&json!("A/B")));
        assert_eq!(
            graph[outcomes[1].children[0].node].logical_id(),
            "DataZoneDomainUnit-A/B"
        );
        assert_eq!(
            graph[outcomes[2].node].logical_id(),
            "DataZoneDomainUnit-A%23Project"
        );
    }

    #[test]
    fn test_unit_without_projects_still_grants() {
        let mut fx = Fixture::new(true);
        let outcomes = fx.walk(&[OrganizationalUnit::new("Empty")]).unwrap();
        let unit = &outcomes[0];

        assert!(unit.projects.is_empty());
        assert!(fx.syn.graph.has_edge(unit.project_grant.node, unit.node));
        let grant = &fx.syn.graph[unit.project_grant.node];
        assert_eq!(grant.property("/IncludeChildDomainUnits"), Some(&json!(true)));

        // execution principal plus one user
        assert_eq!(unit.member_grants.len(), 2);
        for member in &unit.member_grants {
            let node = &fx.syn.graph[member.node];
            assert_eq!(
                node.property("/PolicyType"),
                Some(&json!("ADD_TO_PROJECT_MEMBER_POOL"))
            );
            assert_eq!(node.property("/IncludeChildDomainUnits"), Some(&json!(false)));
        }
    }

    #[test]
    fn test_project_ordering_and_lineage() {
        let mut fx = Fixture::new(true);
        let outcomes = fx
            .walk(&[OrganizationalUnit::new("Sales").with_project(leads())])
            .unwrap();
        let unit = &outcomes[0];
        let project = &unit.projects[0];
        let graph = &fx.syn.graph;

        assert!(graph.has_edge(project.project.node, unit.project_grant.node));
        assert!(graph.has_edge(project.project.node, fx.issuer.endpoint()));
        for grant in &unit.member_grants {
            assert!(graph.has_edge(project.project.node, grant.node));
            assert!(graph.has_edge(project.project.memberships[0], grant.node));
        }

        let profile = project.profile.as_ref().unwrap();
        let profile_grant = project.profile_grant.as_ref().unwrap();
        assert!(graph.has_edge(profile.node, profile_grant.node));
        assert!(graph.has_edge(profile_grant.node, project.project.node));

        let environment = project.environment.unwrap();
        let environment_grant = project.environment_grant.as_ref().unwrap();
        assert!(graph.has_edge(environment, environment_grant.node));
        assert!(graph.has_edge(environment_grant.node, profile.node));
        assert_eq!(
            graph[environment_grant.node].property("/Timestamp"),
            Some(&json!("1"))
        );

        assert_eq!(project.lineage.len(), 2);
        for bundle in &project.lineage {
            assert!(graph.reaches(bundle.access_grant, environment));
            assert_eq!(
                graph[bundle.crawler].property("/DatabaseName"),
                Some(&json!("env_sales_leads_pub_db"))
            );
        }
        assert!(build_provisioning_plan(graph).is_ok());
    }

    #[test]
    fn test_project_without_entities_has_no_lineage() {
        let mut fx = Fixture::new(true);
        let outcomes = fx
            .walk(&[OrganizationalUnit::new("Sales").with_project(ProjectConfig::new("Bare"))])
            .unwrap();
        let project = &outcomes[0].projects[0];

        assert!(project.profile.is_some());
        assert!(project.environment.is_some());
        assert!(project.lineage.is_empty());
    }

    #[test]
    fn test_missing_blueprint_skips_environment() {
        let mut fx = Fixture::new(false);
        let outcomes = fx
            .walk(&[OrganizationalUnit::new("Sales").with_project(leads())])
            .unwrap();
        let project = &outcomes[0].projects[0];

        assert!(project.profile.is_none());
        assert!(project.environment_grant.is_none());
        assert!(project.environment.is_none());
        assert!(project.lineage.is_empty());
        assert!(fx
            .syn
            .graph
            .find("DataZoneDomainUnit-Sales#GrantEnvironment/0-CustomResource")
            .is_none());
        assert!(fx
            .syn
            .graph
            .find("DataZoneDomainUnit-Sales#GrantProjectCreate-CustomResource")
            .is_some());
        assert_eq!(
            fx.syn
                .diagnostics
                .of_kind(DiagnosticKind::MissingPrerequisite)
                .count(),
            1
        );
    }

    #[test]
    fn test_failure_names_innermost_unit() {
        let mut fx = Fixture::new(true);
        // two entities sharing a source bucket collide on the target bucket
        let project = ProjectConfig::new("Dup")
            .with_entity(EntityConfig::new("a", "source-x", "cron(0 1 * * ? *)"))
            .with_entity(EntityConfig::new("b", "source-x", "cron(0 1 * * ? *)"));
        let tree = OrganizationalUnit::new("Outer")
            .with_child(OrganizationalUnit::new("Inner").with_project(project));

        let err = fx.walk(&[tree]).unwrap_err();
        assert_eq!(err.failed_unit(), Some("Inner"));
        match err {
            ProvisionError::UnitCreation { source, .. } => {
                assert!(matches!(*source, ProvisionError::Graph(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
