//! Pedestrian crossings: shortest paths in the dual graph whose vertices are
//! sidewalks and islands and whose edges are crosswalks. A crossing that
//! would walk along more than its two end sidewalks isn't a crossing, it's a
//! detour around the intersection.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use petgraph::algo::astar;
use petgraph::graphmap::UnGraphMap;

use crate::model::{Branch, Crossing, JunctionRole, JunctionTable, PedestrianNode, Way};
use crate::NodeID;

/// Crosswalks that can take part in a crossing: both pedestrian sides known.
fn linked_crosswalks(junctions: &JunctionTable) -> Vec<NodeID> {
    junctions
        .with_role(JunctionRole::Crosswalk)
        .into_iter()
        .filter(|id| {
            let linked = junctions
                .get(*id)
                .and_then(|j| j.crosswalk.as_ref())
                .map_or(0, |attrs| attrs.pedestrian_nodes.len());
            if linked == 1 {
                debug!("crosswalk {} only touches one pedestrian region", id);
            }
            linked >= 2
        })
        .collect()
}

/// Drop duplicate crosswalks: when two connect the same pair of pedestrian
/// nodes (in either order), the one sitting on the crossroad border wins.
fn dedupe_crosswalks(
    crosswalks: Vec<NodeID>,
    junctions: &JunctionTable,
    border_nodes: &BTreeSet<NodeID>,
) -> Vec<NodeID> {
    let nodes_of = |id: NodeID| -> Vec<PedestrianNode> {
        junctions.get(id).unwrap().crosswalk.as_ref().unwrap().pedestrian_nodes.clone()
    };

    let mut to_delete: BTreeSet<NodeID> = BTreeSet::new();
    for &c1 in &crosswalks {
        for &c2 in &crosswalks {
            if c1 == c2 {
                continue;
            }
            let pn1 = nodes_of(c1);
            let pn2 = nodes_of(c2);
            let reversed: Vec<PedestrianNode> = pn2.iter().rev().copied().collect();
            if (pn1 == pn2 || pn1 == reversed) && border_nodes.contains(&c1) {
                to_delete.insert(c2);
            }
        }
    }
    crosswalks
        .into_iter()
        .filter(|c| !to_delete.contains(c))
        .collect()
}

/// Build every crossing: for each ordered pair of sidewalks, the shortest
/// dual-graph path, kept when it stays off other sidewalks, deduplicated by
/// unordered vertex sequence.
pub(crate) fn build_crossings(
    junctions: &JunctionTable,
    border_nodes: &BTreeSet<NodeID>,
    sidewalk_count: usize,
) -> BTreeMap<String, Crossing> {
    let crosswalks = dedupe_crosswalks(linked_crosswalks(junctions), junctions, border_nodes);

    let mut pg: UnGraphMap<PedestrianNode, NodeID> = UnGraphMap::new();
    for id in crosswalks {
        let attrs = junctions.get(id).unwrap().crosswalk.as_ref().unwrap();
        pg.add_edge(attrs.pedestrian_nodes[0], attrs.pedestrian_nodes[1], id);
    }

    let mut crossings = BTreeMap::new();
    for start in 0..sidewalk_count {
        for end in 0..sidewalk_count {
            if start == end {
                continue;
            }
            let from = PedestrianNode::Sidewalk(start);
            let to = PedestrianNode::Sidewalk(end);
            if !pg.contains_node(from) || !pg.contains_node(to) {
                continue;
            }
            let Some((_, path)) = astar(&pg, from, |v| v == to, |_| 1usize, |_| 0) else {
                // this sidewalk can't be reached
                continue;
            };
            // keep paths that don't go through other sidewalks
            if path.iter().filter(|v| v.is_sidewalk()).count() > 2 {
                continue;
            }

            let id = path.iter().map(|v| v.to_string()).join(";");
            let reversed = path.iter().rev().map(|v| v.to_string()).join(";");
            if crossings.contains_key(&id) || crossings.contains_key(&reversed) {
                continue;
            }

            let crosswalks: Vec<NodeID> = path
                .windows(2)
                .map(|w| *pg.edge_weight(w[0], w[1]).unwrap())
                .collect();
            crossings.insert(
                id.clone(),
                Crossing {
                    id,
                    crosswalks,
                },
            );
        }
    }
    crossings
}

/// A crossing belongs to the branch whose ways touch exactly the sidewalks
/// the crossing connects.
pub(crate) fn attach_crossings_to_branches(
    branches: &mut [Branch],
    ways: &BTreeMap<String, Way>,
    crossings: &BTreeMap<String, Crossing>,
    junctions: &JunctionTable,
) {
    for branch in branches {
        let mut branch_sidewalks: BTreeSet<usize> = BTreeSet::new();
        for way_id in &branch.ways {
            if let Some(way) = ways.get(way_id) {
                branch_sidewalks.extend(way.sidewalks.iter().flatten());
            }
        }
        if branch_sidewalks.is_empty() {
            continue;
        }

        for crossing in crossings.values() {
            let mut crossing_sidewalks: BTreeSet<usize> = BTreeSet::new();
            for crosswalk in &crossing.crosswalks {
                if let Some(attrs) = junctions.get(*crosswalk).and_then(|j| j.crosswalk.as_ref()) {
                    for pn in &attrs.pedestrian_nodes {
                        if let PedestrianNode::Sidewalk(id) = pn {
                            crossing_sidewalks.insert(*id);
                        }
                    }
                }
            }
            if branch_sidewalks == crossing_sidewalks {
                branch.crossing = Some(crossing.id.clone());
                break;
            }
        }
    }
}
