//! Tree-shape invariants over generated hierarchies

use govgraph::config::{parse_requirements, TemplateVars};
use govgraph::govgraph_types::{EntityConfig, HierarchyDocument, OrganizationalUnit, ProjectConfig};
use govgraph::grants::FixedClock;
use govgraph::graph::ResourceKind;
use govgraph::hierarchy::{unit_logical_id, UnitOutcome};
use govgraph::{synthesize_with_clock, NodeId, ProvisioningOutput};
use proptest::prelude::*;

const REQUIREMENTS: &str = r#"
resources:
  iam_roles:
    ExecRole:
      purpose: domain_execution
      trust_actions: ["sts:AssumeRole"]
  datazone_domains:
    Corp:
      domainExecutionRole: ExecRole
  datazone_blueprints:
    environmentBlueprintIdentifier: DefaultDataLake
    manageAccessRoleArn: ManageAccessRole
    provisioningRoleArn: ProvisioningRole
"#;

/// Unit names are drawn from this pool, so cousins and units at different
/// depths share names. "root" also appears as an ordinary unit name.
const NAMES: [&str; 4] = ["root", "Sales", "EMEA", "UK"];

/// Unit shape: entity count per project, offset of the children's names
/// in [`NAMES`], then child shapes
#[derive(Debug, Clone)]
struct Shape {
    projects: Vec<usize>,
    child_names: usize,
    children: Vec<Shape>,
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let projects = prop::collection::vec(0usize..3, 0..3);
    let leaf = projects.clone().prop_map(|projects| Shape {
        projects,
        child_names: 0,
        children: Vec::new(),
    });
    leaf.prop_recursive(3, 24, 3, move |inner| {
        (projects.clone(), 0..NAMES.len(), prop::collection::vec(inner, 0..3)).prop_map(
            |(projects, child_names, children)| Shape {
                projects,
                child_names,
                children,
            },
        )
    })
}

/// Siblings get distinct names from the pool; sources are numbered in visit
/// order so every entity reads its own bucket
fn build_unit(shape: &Shape, name: &str, counter: &mut usize) -> OrganizationalUnit {
    let mut unit = OrganizationalUnit::new(name);
    for (p, entities) in shape.projects.iter().enumerate() {
        let mut project = ProjectConfig::new(format!("Project {}", p));
        for e in 0..*entities {
            *counter += 1;
            project = project.with_entity(EntityConfig::new(
                format!("entity{}", e),
                format!("source-{}", counter),
                "cron(0 6 * * ? *)",
            ));
        }
        unit = unit.with_project(project);
    }
    for (i, child) in shape.children.iter().enumerate() {
        let child_name = NAMES[(shape.child_names + i) % NAMES.len()];
        unit = unit.with_child(build_unit(child, child_name, counter));
    }
    unit
}

fn entity_count(shape: &Shape) -> usize {
    shape.projects.iter().sum::<usize>() + shape.children.iter().map(entity_count).sum::<usize>()
}

fn synthesize_forest(shapes: &[Shape]) -> ProvisioningOutput {
    let requirements = parse_requirements(REQUIREMENTS, &TemplateVars::default()).unwrap();
    let mut counter = 0;
    let hierarchy = HierarchyDocument {
        domain_name: None,
        units: shapes
            .iter()
            .enumerate()
            .map(|(i, s)| build_unit(s, NAMES[i % NAMES.len()], &mut counter))
            .collect(),
    };
    synthesize_with_clock(&requirements, &hierarchy, FixedClock(0)).unwrap()
}

fn check_parent_edges(output: &ProvisioningOutput, unit: &UnitOutcome, parent: NodeId) {
    assert_eq!(output.graph().dependencies_of(unit.node), vec![parent]);
    for child in &unit.children {
        check_parent_edges(output, child, unit.node);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// INVARIANT: every unit depends on exactly its parent.
    #[test]
    fn unit_has_single_parent_edge(shapes in prop::collection::vec(arb_shape(), 1..3)) {
        let output = synthesize_forest(&shapes);
        let domain = output.domain.as_ref().unwrap().node;
        for unit in &output.units {
            check_parent_edges(&output, unit, domain);
        }
    }

    /// INVARIANT: the plan covers the graph and respects every edge.
    #[test]
    fn plan_is_a_topological_order(shapes in prop::collection::vec(arb_shape(), 1..3)) {
        let output = synthesize_forest(&shapes);
        let graph = output.graph();
        prop_assert_eq!(output.plan.len(), graph.len());
        for node in graph.nodes() {
            for prerequisite in node.depends_on() {
                prop_assert!(
                    output.plan.position(prerequisite) < output.plan.position(node.id()),
                    "{} planned before its prerequisite",
                    node.logical_id()
                );
            }
        }
    }

    /// INVARIANT: one lineage bundle per entity, one unit node per unit.
    #[test]
    fn counts_follow_the_tree(shapes in prop::collection::vec(arb_shape(), 1..3)) {
        let output = synthesize_forest(&shapes);
        let graph = output.graph();
        let entities: usize = shapes.iter().map(entity_count).sum();
        let units: usize = output.units.iter().map(|u| u.flatten().len()).sum();

        prop_assert_eq!(graph.nodes_of_kind(ResourceKind::DataLocationPermission).count(), entities);
        prop_assert_eq!(graph.nodes_of_kind(ResourceKind::GlueCrawler).count(), entities);
        prop_assert_eq!(graph.nodes_of_kind(ResourceKind::DomainUnit).count(), units);
        prop_assert!(output.diagnostics().is_empty());
    }

    /// INVARIANT: a unit's grants are planned after the unit itself.
    #[test]
    fn unit_grants_follow_unit(shapes in prop::collection::vec(arb_shape(), 1..3)) {
        let output = synthesize_forest(&shapes);
        for unit in output.units.iter().flat_map(|u| u.flatten()) {
            let unit_position = output.plan.position(unit.node);
            prop_assert!(output.plan.position(unit.project_grant.node) > unit_position);
            for grant in &unit.member_grants {
                prop_assert!(output.plan.position(grant.node) > unit_position);
            }
        }
    }

    /// INVARIANT: unit ids follow the full path, names stay bare.
    #[test]
    fn unit_ids_follow_path(shapes in prop::collection::vec(arb_shape(), 1..3)) {
        let output = synthesize_forest(&shapes);
        let graph = output.graph();
        let mut ids = std::collections::BTreeSet::new();
        for unit in output.units.iter().flat_map(|u| u.flatten()) {
            let node = &graph[unit.node];
            let name = serde_json::json!(unit.name);
            prop_assert_eq!(node.logical_id(), unit_logical_id(&unit.path));
            prop_assert_eq!(node.property("/Name"), Some(&name));
            prop_assert!(unit.path.ends_with(unit.name.as_str()));
            prop_assert!(ids.insert(node.logical_id().to_string()));
        }
    }
}
