//! Sidewalks and traffic islands. Sidewalks are read straight off the border
//! walk: one per stretch between the outermost externals of two different
//! branches. Islands are the inner faces of the crossroad, found as a
//! minimum cycle basis (Horton) of the way graph with each branch mouth
//! closed by a chord.

use std::collections::{BTreeMap, BTreeSet};

use geo::Point;
use petgraph::algo::astar;
use petgraph::graphmap::UnGraphMap;

use crate::model::{Branch, JunctionTable, PedestrianNode, Way};
use crate::{geometry, NodeID, StreetGraph};

/// The stretches of the border walk between branch-sidewalk nodes of
/// different branches. `sidewalk_node_branch` maps each outermost external
/// node to its branch.
pub(crate) fn sidewalk_paths(
    walk: &[NodeID],
    sidewalk_node_branch: &BTreeMap<NodeID, usize>,
) -> Vec<Vec<NodeID>> {
    let hits: Vec<usize> = walk
        .iter()
        .enumerate()
        .filter(|(_, n)| sidewalk_node_branch.contains_key(n))
        .map(|(i, _)| i)
        .collect();

    let mut paths = Vec::new();
    for pair in hits.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if sidewalk_node_branch[&walk[from]] != sidewalk_node_branch[&walk[to]] {
            paths.push(walk[from..=to].to_vec());
        }
        // same branch: the walk is just crossing that branch's mouth
    }
    paths
}

/// The outermost external node of each branch, at both ends of its way list.
pub(crate) fn sidewalk_nodes(
    branches: &[Branch],
    ways: &BTreeMap<String, Way>,
    border_nodes: &BTreeSet<NodeID>,
) -> BTreeMap<NodeID, usize> {
    let mut result = BTreeMap::new();
    for branch in branches {
        let externals = branch_externals(branch, ways, border_nodes);
        if let Some(first) = externals.first() {
            result.insert(*first, branch.id);
        }
        if let Some(last) = externals.last() {
            result.insert(*last, branch.id);
        }
    }
    result
}

/// Externals of a branch, in way order.
pub(crate) fn branch_externals(
    branch: &Branch,
    ways: &BTreeMap<String, Way>,
    border_nodes: &BTreeSet<NodeID>,
) -> Vec<NodeID> {
    let mut result = Vec::new();
    for way_id in &branch.ways {
        if let Some(way) = ways.get(way_id) {
            for junction in way.junctions {
                if !border_nodes.contains(&junction) {
                    result.push(junction);
                }
            }
        }
    }
    result
}

/// Write one sidewalk onto the ways it runs along: walking in the way's
/// stored direction puts it on the left slot, against it on the right. Every
/// crosswalk passed registers the sidewalk as one of its pedestrian nodes.
pub(crate) fn map_sidewalk_onto_ways(
    sidewalk_id: usize,
    path: &[NodeID],
    ways: &mut BTreeMap<String, Way>,
    junctions: &mut JunctionTable,
) {
    for w in path.windows(2) {
        let (n1, n2) = (w[0], w[1]);
        let Some(key) = find_way_key(ways, n1, n2) else {
            warn!("sidewalk {} runs along a missing way {}-{}", sidewalk_id, n1, n2);
            continue;
        };
        let way = ways.get_mut(&key).unwrap();
        if way.junctions[0] == n1 {
            way.sidewalks[0] = Some(sidewalk_id);
        } else {
            way.sidewalks[1] = Some(sidewalk_id);
        }
        for junction_id in way.junctions {
            if let Some(j) = junctions.get_mut(junction_id) {
                if j.is_crosswalk() {
                    j.add_pedestrian_node(PedestrianNode::Sidewalk(sidewalk_id));
                }
            }
        }
    }
}

/// The island faces of the crossroad: close every branch with chords between
/// its consecutive externals, then take the minimum cycle basis weighted by
/// great-circle length. Each face comes back as a clockwise closed walk.
pub(crate) fn island_paths(
    graph: &StreetGraph,
    ways: &BTreeMap<String, Way>,
    branches: &[Branch],
    border_nodes: &BTreeSet<NodeID>,
) -> Vec<Vec<NodeID>> {
    let mut points: BTreeMap<NodeID, Point<f64>> = BTreeMap::new();
    let mut edges: Vec<(NodeID, NodeID)> = Vec::new();
    let mut seen: BTreeSet<(NodeID, NodeID)> = BTreeSet::new();

    let mut push_edge = |edges: &mut Vec<(NodeID, NodeID)>, n1: NodeID, n2: NodeID| {
        let key = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
        if n1 != n2 && seen.insert(key) {
            edges.push(key);
        }
    };

    for way in ways.values() {
        let [n1, n2] = way.junctions;
        points.insert(n1, graph.point(n1));
        points.insert(n2, graph.point(n2));
        push_edge(&mut edges, n1, n2);
    }
    // close the branch mouths so border islands become faces
    for branch in branches {
        let externals = branch_externals(branch, ways, border_nodes);
        for w in externals.windows(2) {
            push_edge(&mut edges, w[0], w[1]);
        }
    }

    let weighted: Vec<(NodeID, NodeID, f64)> = edges
        .into_iter()
        .map(|(n1, n2)| (n1, n2, geometry::distance(points[&n1], points[&n2])))
        .collect();

    let mut faces = Vec::new();
    for cycle in minimum_cycle_basis(&weighted) {
        let mut face = order_cycle(&cycle);
        if !geometry::polygon_is_clockwise(
            &face.iter().map(|n| points[n]).collect::<Vec<_>>(),
        ) {
            face.reverse();
        }
        // close the loop
        face.push(face[0]);
        faces.push(face);
    }
    faces
}

/// Write one island onto the ways along its (clockwise) outline. The slots
/// mirror the sidewalk rule: an island walked in the way's stored direction
/// sits on the way's right.
pub(crate) fn map_island_onto_ways(
    island_id: usize,
    path: &[NodeID],
    ways: &mut BTreeMap<String, Way>,
    junctions: &mut JunctionTable,
) {
    for w in path.windows(2) {
        let (n1, n2) = (w[0], w[1]);
        // chords have no way; skip them
        let Some(key) = find_way_key(ways, n1, n2) else {
            continue;
        };
        let way = ways.get_mut(&key).unwrap();
        if way.junctions[0] == n1 {
            way.islands[1] = Some(island_id);
        } else {
            way.islands[0] = Some(island_id);
        }
        for junction_id in way.junctions {
            if let Some(j) = junctions.get_mut(junction_id) {
                if j.is_crosswalk() {
                    j.add_pedestrian_node(PedestrianNode::Island(island_id));
                }
            }
        }
    }
}

pub(crate) fn find_way_key(
    ways: &BTreeMap<String, Way>,
    n1: NodeID,
    n2: NodeID,
) -> Option<String> {
    let forward = Way::key(n1, n2);
    if ways.contains_key(&forward) {
        return Some(forward);
    }
    let reverse = Way::key(n2, n1);
    if ways.contains_key(&reverse) {
        return Some(reverse);
    }
    None
}

/// Horton's algorithm: candidate cycles are shortest-path trees closed by
/// one extra edge; a greedy pass keeps the lightest independent ones (over
/// GF(2) edge-incidence vectors) until the cycle space is spanned.
fn minimum_cycle_basis(edges: &[(NodeID, NodeID, f64)]) -> Vec<Vec<(NodeID, NodeID)>> {
    let mut pg: UnGraphMap<NodeID, f64> = UnGraphMap::new();
    for (n1, n2, w) in edges {
        pg.add_edge(*n1, *n2, *w);
    }
    let node_count = pg.node_count();
    if node_count == 0 {
        return Vec::new();
    }
    let components = petgraph::algo::connected_components(&pg);
    let dimension = edges.len() + components - node_count;
    if dimension == 0 {
        return Vec::new();
    }

    let edge_index: BTreeMap<(NodeID, NodeID), usize> = edges
        .iter()
        .enumerate()
        .map(|(i, (n1, n2, _))| ((*n1, *n2), i))
        .collect();
    let index_of = |n1: NodeID, n2: NodeID| -> usize {
        let key = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
        edge_index[&key]
    };

    let shortest = |from: NodeID, to: NodeID| -> Option<(f64, Vec<NodeID>)> {
        astar(&pg, from, |n| n == to, |(_, _, w)| *w, |_| 0.0)
    };

    // candidate cycles, deduplicated by edge set
    let nodes: Vec<NodeID> = pg.nodes().collect();
    let mut candidates: Vec<(f64, Vec<usize>)> = Vec::new();
    let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
    for v in &nodes {
        for (n1, n2, w) in edges {
            let Some((d1, p1)) = shortest(*v, *n1) else {
                continue;
            };
            let Some((d2, p2)) = shortest(*v, *n2) else {
                continue;
            };
            // the two paths must only share the root, or the closed walk
            // isn't a simple cycle
            let set1: BTreeSet<NodeID> = p1.iter().copied().collect();
            if p2.iter().filter(|n| set1.contains(n)).count() != 1 {
                continue;
            }

            let mut cycle: BTreeSet<usize> = BTreeSet::new();
            let mut degenerate = false;
            for path in [&p1, &p2] {
                for pair in path.windows(2) {
                    if !cycle.insert(index_of(pair[0], pair[1])) {
                        degenerate = true;
                    }
                }
            }
            if degenerate || !cycle.insert(index_of(*n1, *n2)) {
                continue;
            }

            let cycle: Vec<usize> = cycle.into_iter().collect();
            if seen.insert(cycle.clone()) {
                candidates.push((d1 + d2 + w, cycle));
            }
        }
    }
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

    // greedy selection of independent cycles, Gaussian elimination over GF(2)
    let words = (edges.len() + 63) / 64;
    let to_bits = |cycle: &[usize]| -> Vec<u64> {
        let mut bits = vec![0u64; words];
        for i in cycle {
            bits[i / 64] |= 1 << (i % 64);
        }
        bits
    };
    let mut pivots: Vec<(usize, Vec<u64>)> = Vec::new();
    let mut basis = Vec::new();

    for (_, cycle) in candidates {
        if basis.len() == dimension {
            break;
        }
        let mut bits = to_bits(&cycle);
        for (pivot, row) in &pivots {
            if bits[pivot / 64] & (1 << (pivot % 64)) != 0 {
                for (b, r) in bits.iter_mut().zip(row.iter()) {
                    *b ^= r;
                }
            }
        }
        if let Some(pivot) = first_set_bit(&bits) {
            pivots.push((pivot, bits));
            basis.push(cycle);
        }
    }

    basis
        .into_iter()
        .map(|cycle| {
            cycle
                .into_iter()
                .map(|i| (edges[i].0, edges[i].1))
                .collect()
        })
        .collect()
}

fn first_set_bit(bits: &[u64]) -> Option<usize> {
    for (i, word) in bits.iter().enumerate() {
        if *word != 0 {
            return Some(i * 64 + word.trailing_zeros() as usize);
        }
    }
    None
}

/// Order a cycle's edges into a simple walk (not closed; the caller closes
/// it after orienting).
fn order_cycle(cycle: &[(NodeID, NodeID)]) -> Vec<NodeID> {
    let mut adjacency: BTreeMap<NodeID, Vec<NodeID>> = BTreeMap::new();
    for (n1, n2) in cycle {
        adjacency.entry(*n1).or_default().push(*n2);
        adjacency.entry(*n2).or_default().push(*n1);
    }
    let start = *adjacency.keys().next().unwrap();
    let mut walk = vec![start];
    let mut prev = start;
    let mut current = adjacency[&start][0];
    while current != start {
        walk.push(current);
        let next = adjacency[&current]
            .iter()
            .copied()
            .find(|n| *n != prev)
            .unwrap();
        prev = current;
        current = next;
    }
    walk
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeID {
        NodeID(id)
    }

    #[test]
    fn basis_of_two_squares() {
        // two squares sharing the (short) middle edge 2-5:
        // 1-2-3
        // |  |  |
        // 4-5-6
        let edges = vec![
            (n(1), n(2), 1.0),
            (n(2), n(3), 1.1),
            (n(1), n(4), 1.0),
            (n(2), n(5), 0.5),
            (n(3), n(6), 1.0),
            (n(4), n(5), 1.0),
            (n(5), n(6), 1.1),
        ];
        let basis = minimum_cycle_basis(&edges);
        assert_eq!(basis.len(), 2);
        for cycle in &basis {
            assert_eq!(cycle.len(), 4);
        }
    }

    #[test]
    fn no_cycles_in_a_tree() {
        let edges = vec![(n(1), n(2), 1.0), (n(2), n(3), 1.0), (n(2), n(4), 1.0)];
        assert!(minimum_cycle_basis(&edges).is_empty());
    }

    #[test]
    fn ordering_a_cycle() {
        let cycle = vec![(n(3), n(1)), (n(1), n(2)), (n(2), n(3))];
        let walk = order_cycle(&cycle);
        assert_eq!(walk.len(), 3);
        assert_eq!(walk[0], n(1));
    }
}
