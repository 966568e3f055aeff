//! The border walk: a closed traversal hugging the outside of the
//! crossroad. At every node it turns onto the neighbor immediately clockwise
//! of the direction it came from, so dead ends (the external nodes of
//! branches) bounce it back and the whole outer boundary gets walked twice,
//! once per side.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use geo::Point;

use crate::model::Way;
use crate::{geometry, CrossroadError, NodeID, SegmentedBranch, StreetGraph};

/// Adjacency over the ways of one intersection, with node positions.
pub(crate) struct WaySubgraph {
    adjacency: BTreeMap<NodeID, Vec<NodeID>>,
    points: BTreeMap<NodeID, Point<f64>>,
    edge_count: usize,
}

impl WaySubgraph {
    pub fn new(graph: &StreetGraph, ways: &BTreeMap<String, Way>) -> Self {
        let mut adjacency: BTreeMap<NodeID, BTreeSet<NodeID>> = BTreeMap::new();
        let mut points = BTreeMap::new();
        let mut edge_count = 0;
        for way in ways.values() {
            let [n1, n2] = way.junctions;
            if adjacency.entry(n1).or_default().insert(n2) {
                edge_count += 1;
            }
            adjacency.entry(n2).or_default().insert(n1);
            points.insert(n1, graph.point(n1));
            points.insert(n2, graph.point(n2));
        }
        Self {
            adjacency: adjacency
                .into_iter()
                .map(|(n, set)| (n, set.into_iter().collect()))
                .collect(),
            points,
            edge_count,
        }
    }

    pub fn contains(&self, n: NodeID) -> bool {
        self.adjacency.contains_key(&n)
    }

    fn azimuth(&self, from: NodeID, to: NodeID) -> f64 {
        geometry::azimuth(self.points[&from], self.points[&to])
    }

    /// The neighbor immediately clockwise of `prev`, looking from `current`.
    fn next_clockwise(&self, current: NodeID, prev: NodeID) -> Option<NodeID> {
        let mut by_azimuth: Vec<NodeID> = self.adjacency.get(&current)?.clone();
        by_azimuth.sort_by(|a, b| {
            self.azimuth(current, *a)
                .partial_cmp(&self.azimuth(current, *b))
                .unwrap()
                .then(a.cmp(b))
        });
        let idx = by_azimuth.iter().position(|n| *n == prev)?;
        Some(by_azimuth[(idx + 1) % by_azimuth.len()])
    }
}

/// Walk the outer boundary, starting at the smallest external node, until the
/// walk closes. Fails with `UnreachableGraphState` if it doesn't.
pub(crate) fn border_walk(sub: &WaySubgraph, externals: &BTreeSet<NodeID>) -> Result<Vec<NodeID>> {
    let Some(start) = externals.iter().copied().find(|n| sub.contains(*n)) else {
        bail!(CrossroadError::UnreachableGraphState(
            "no external node to start the border walk from".to_string()
        ));
    };

    // leave along the most northern edge first
    let mut first_neighbors = sub.adjacency[&start].clone();
    first_neighbors.sort_by(|a, b| {
        sub.azimuth(start, *a)
            .partial_cmp(&sub.azimuth(start, *b))
            .unwrap()
            .then(a.cmp(b))
    });
    let mut path = vec![start, first_neighbors[0]];

    let max_steps = 4 * sub.edge_count + 4;
    while path[path.len() - 1] != start {
        if path.len() > max_steps {
            bail!(CrossroadError::UnreachableGraphState(format!(
                "border walk from {} did not close within {} steps",
                start, max_steps
            )));
        }
        let current = path[path.len() - 1];
        let prev = path[path.len() - 2];
        let Some(next) = sub.next_clockwise(current, prev) else {
            bail!(CrossroadError::UnreachableGraphState(format!(
                "border walk stranded at {}",
                current
            )));
        };
        path.push(next);
    }
    Ok(path)
}

/// A branch way as the walk encountered it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct OrderedBranchWay {
    pub branch_id: usize,
    pub way_id: String,
    pub order: i64,
}

/// Annotate the branch ways in walk-encounter order. If the walk started
/// mid-branch, the start branch's trailing ways get negative orders so that
/// sorting restores one contiguous clockwise sequence.
pub(crate) fn branch_ways_in_walk(
    walk: &[NodeID],
    branches: &[SegmentedBranch],
    ways: &BTreeMap<String, Way>,
) -> Vec<OrderedBranchWay> {
    let mut entries: Vec<OrderedBranchWay> = Vec::new();

    for w in walk.windows(2) {
        let (n1, n2) = (w[0], w[1]);
        let Some(branch) = branches.iter().find(|b| {
            b.edges_by_nodes
                .iter()
                .any(|(a, c)| (*a == n1 && *c == n2) || (*a == n2 && *c == n1))
        }) else {
            continue;
        };
        let way_id = if ways.contains_key(&Way::key(n1, n2)) {
            Way::key(n1, n2)
        } else {
            Way::key(n2, n1)
        };
        if entries.iter().any(|e| e.way_id == way_id) {
            continue;
        }
        entries.push(OrderedBranchWay {
            branch_id: branch.id,
            way_id,
            order: entries.len() as i64,
        });
    }

    if let Some(first_branch) = entries.first().map(|e| e.branch_id) {
        if entries.iter().any(|e| e.branch_id != first_branch) {
            let total = entries.len() as i64;
            for i in (1..entries.len()).rev() {
                if entries[i].branch_id == first_branch {
                    entries[i].order -= total;
                } else {
                    break;
                }
            }
        }
    }
    entries.sort_by_key(|e| e.order);
    entries
}
