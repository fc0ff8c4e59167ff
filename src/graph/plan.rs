//! Provisioning plan and topological sort
//!
//! Implements Kahn's algorithm over the [`ResourceGraph`] with:
//! - Cycle detection with clear error messages
//! - Stable sort (preserves insertion order when no dependency relationship)
//! - Phases by dependency depth, for the backend's parallel scheduling

use std::collections::BinaryHeap;

use super::{NodeId, ResourceGraph};
use crate::error::CycleError;

/// Nodes in provisioning order
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    /// Topologically sorted node ids
    pub order: Vec<NodeId>,
    /// Nodes grouped by dependency depth
    pub phases: Vec<ProvisioningPhase>,
}

/// Nodes whose prerequisites all live in earlier phases
#[derive(Debug, Clone)]
pub struct ProvisioningPhase {
    pub depth: usize,
    pub nodes: Vec<NodeId>,
}

impl ProvisioningPlan {
    /// Position of a node in the provisioning order
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Wrapper for BinaryHeap to get min-heap behavior (stable sort by insertion index)
#[derive(Debug, Eq, PartialEq)]
struct MinHeapEntry(usize);

impl Ord for MinHeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for MinHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Build the provisioning plan using Kahn's algorithm
///
/// # Stable Sort
///
/// Among nodes whose prerequisites are satisfied, the one inserted first
/// into the graph is emitted first, so the same graph always yields the
/// same order.
pub fn build_provisioning_plan(graph: &ResourceGraph) -> Result<ProvisioningPlan, CycleError> {
    let n = graph.len();
    if n == 0 {
        return Ok(ProvisioningPlan {
            order: vec![],
            phases: vec![],
        });
    }

    // adj[i] = nodes that depend on node i (i must come before them)
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for node in graph.nodes() {
        for prerequisite in node.depends_on() {
            adj[prerequisite.index()].push(node.id().index());
            in_degree[node.id().index()] += 1;
        }
    }

    let mut heap: BinaryHeap<MinHeapEntry> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(idx, _)| MinHeapEntry(idx))
        .collect();

    let mut depth: Vec<usize> = vec![0; n];
    let mut sorted: Vec<usize> = Vec::with_capacity(n);
    while let Some(MinHeapEntry(idx)) = heap.pop() {
        sorted.push(idx);

        for &next in &adj[idx] {
            depth[next] = depth[next].max(depth[idx] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                heap.push(MinHeapEntry(next));
            }
        }
    }

    if sorted.len() != n {
        let remaining: Vec<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
        let nodes: Vec<String> = remaining
            .iter()
            .map(|&i| graph[NodeId(i)].logical_id().to_string())
            .collect();

        let mut explanation = String::from("Circular dependency detected:\n");
        for id in &nodes {
            explanation.push_str(&format!("  --> {}\n", id));
        }
        explanation.push_str("\nThese resources depend on each other in a cycle.");

        return Err(CycleError { nodes, explanation });
    }

    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut phases: Vec<ProvisioningPhase> = (0..=max_depth)
        .map(|d| ProvisioningPhase {
            depth: d,
            nodes: vec![],
        })
        .collect();
    let order: Vec<NodeId> = sorted.into_iter().map(NodeId).collect();
    for &id in &order {
        phases[depth[id.index()]].nodes.push(id);
    }

    Ok(ProvisioningPlan { order, phases })
}

/// Generate plan description for dry-run output
pub fn describe_plan(graph: &ResourceGraph, plan: &ProvisioningPlan) -> String {
    let mut output = String::new();
    output.push_str("Provisioning Plan\n");
    output.push_str("=================\n\n");
    output.push_str(&format!("Total resources: {}\n", plan.len()));
    output.push_str(&format!("Dependency edges: {}\n\n", graph.edge_count()));

    for phase in &plan.phases {
        output.push_str(&format!("Phase {}\n", phase.depth + 1));
        output.push_str(&"-".repeat(40));
        output.push('\n');

        for &id in &phase.nodes {
            let node = &graph[id];
            output.push_str(&format!(
                "  {} ({})\n",
                node.logical_id(),
                node.kind().type_name()
            ));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceKind;
    use serde_json::json;

    fn graph_of(ids: &[&str]) -> (ResourceGraph, Vec<NodeId>) {
        let mut g = ResourceGraph::new();
        let ids = ids
            .iter()
            .map(|id| g.add(*id, ResourceKind::Bucket, &json!({})).unwrap())
            .collect();
        (g, ids)
    }

    #[test]
    fn test_empty_plan() {
        let plan = build_provisioning_plan(&ResourceGraph::new()).unwrap();
        assert!(plan.order.is_empty());
        assert!(plan.phases.is_empty());
    }

    #[test]
    fn test_reordering_by_dependency() {
        let (mut g, ids) = graph_of(&["Project", "Unit", "Domain"]);
        g.add_dependency(ids[0], ids[1]).unwrap();
        g.add_dependency(ids[1], ids[2]).unwrap();

        let plan = build_provisioning_plan(&g).unwrap();
        assert_eq!(plan.order, vec![ids[2], ids[1], ids[0]]);
        assert_eq!(plan.phases.len(), 3);
    }

    #[test]
    fn test_stable_sort_preserves_insertion_order() {
        let (g, ids) = graph_of(&["A", "B", "C"]);
        let plan = build_provisioning_plan(&g).unwrap();
        assert_eq!(plan.order, ids);
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].nodes.len(), 3);
    }

    #[test]
    fn test_phases_by_depth() {
        let (mut g, ids) = graph_of(&["Root", "Left", "Right", "Leaf"]);
        g.add_dependency(ids[1], ids[0]).unwrap();
        g.add_dependency(ids[2], ids[0]).unwrap();
        g.add_dependency(ids[3], ids[1]).unwrap();
        g.add_dependency(ids[3], ids[2]).unwrap();

        let plan = build_provisioning_plan(&g).unwrap();
        let depths: Vec<Vec<NodeId>> = plan.phases.iter().map(|p| p.nodes.clone()).collect();
        assert_eq!(depths, vec![vec![ids[0]], vec![ids[1], ids[2]], vec![ids[3]]]);
    }

    #[test]
    fn test_cycle_detected() {
        let (mut g, ids) = graph_of(&["A", "B", "C"]);
        g.add_dependency(ids[0], ids[1]).unwrap();
        g.add_dependency(ids[1], ids[0]).unwrap();

        let err = build_provisioning_plan(&g).unwrap_err();
        assert_eq!(err.nodes, vec!["A".to_string(), "B".to_string()]);
        assert!(err.explanation.contains("Circular dependency"));
    }

    #[test]
    fn test_describe_plan() {
        let (mut g, ids) = graph_of(&["Source", "Target"]);
        g.add_dependency(ids[1], ids[0]).unwrap();
        let plan = build_provisioning_plan(&g).unwrap();
        let description = describe_plan(&g, &plan);

        assert!(description.contains("Provisioning Plan"));
        assert!(description.contains("Phase 2"));
        assert!(description.contains("Target (AWS::S3::Bucket)"));
    }
}
