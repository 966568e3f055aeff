//! Reliability scoring: how confidently a node bounds a crossroad, sits
//! inside one, or an edge belongs to one, judged from tags and local
//! topology. Scores live on the graph and everything downstream reasons in
//! qualitative bands, never raw numbers.

use crate::{osm, NodeID, StreetGraph};

pub const STRONGLY_YES: f64 = 1000.0;
pub const STRONGLY_NO: f64 = 0.0;
pub const UNCERTAIN: f64 = (STRONGLY_YES + STRONGLY_NO) / 2.0;
pub const WEAKLY_YES: f64 = (STRONGLY_YES + UNCERTAIN) / 2.0;
pub const WEAKLY_NO: f64 = (STRONGLY_NO + UNCERTAIN) / 2.0;
pub const MODERATE_YES: f64 = (WEAKLY_YES + STRONGLY_YES) / 2.0;
pub const MODERATE_NO: f64 = (WEAKLY_NO + STRONGLY_NO) / 2.0;

/// Highway values that moderately suggest a crossroad boundary.
const MODERATE_BOUNDARY: [&str; 4] = ["stop", "traffic_signals", "motorway_junction", "give_way"];
/// Highway values that strongly suggest a boundary on small nodes.
const POSSIBLE_BOUNDARY: [&str; 1] = ["crossing"];
/// Highway values that are never a crossroad boundary.
const NO_BOUNDARY: [&str; 4] = ["bus_stop", "milestone", "steps", "elevator"];

/// Score every node and edge of the graph. Run once, before segmentation.
pub fn init(graph: &mut StreetGraph) {
    let scores: std::collections::BTreeMap<NodeID, (f64, f64)> = graph
        .node_ids()
        .collect::<Vec<_>>()
        .into_iter()
        .map(|n| (n, score_node(graph, n)))
        .collect();
    for node in graph.nodes_mut() {
        let (crossroad, boundary) = scores[&node.id];
        node.crossroad_score = crossroad;
        node.boundary_score = boundary;
    }

    for edge in graph.first_edges_mut() {
        if edge.tags.contains_key(osm::JUNCTION) {
            edge.crossroad_score = STRONGLY_YES;
        }
    }
}

fn score_node(graph: &StreetGraph, n: NodeID) -> (f64, f64) {
    let mut crossroad = UNCERTAIN;
    let mut boundary = UNCERTAIN;
    let degree = graph.degree(n);
    let tags = &graph.node(n).tags;

    if let Some(highway) = tags.get(osm::HIGHWAY) {
        if degree == 2 {
            crossroad = STRONGLY_NO;
        }

        if NO_BOUNDARY.contains(&highway.as_str()) {
            boundary = MODERATE_NO;
        } else if POSSIBLE_BOUNDARY.contains(&highway.as_str()) && degree <= 3 {
            boundary = STRONGLY_YES;
        } else if MODERATE_BOUNDARY.contains(&highway.as_str()) && degree <= 3 {
            boundary = MODERATE_YES;
            crossroad = MODERATE_YES;
        }

        if degree >= 3 {
            crossroad = STRONGLY_YES;
        }
    } else if degree == 2 {
        boundary = STRONGLY_NO;
        crossroad = STRONGLY_NO;
    } else if degree >= 4 {
        crossroad = STRONGLY_YES;
    } else if degree == 3 {
        if graph.adjacent_street_names(n).len() > 1 {
            // more than one street name, probably part of a crossroad
            crossroad = MODERATE_YES;
        } else if graph.is_part_of_local_triangle(n, 150.0) || graph.is_oneway_pair_separator(n) {
            crossroad = MODERATE_NO;
        } else {
            crossroad = MODERATE_YES;
        }
    }

    (crossroad, boundary)
}

pub fn is_strong_boundary(graph: &StreetGraph, n: NodeID) -> bool {
    graph.node(n).boundary_score == STRONGLY_YES
}

pub fn is_weakly_boundary(graph: &StreetGraph, n: NodeID) -> bool {
    graph.node(n).boundary_score >= WEAKLY_YES
}

pub fn is_strong_in_crossroad(graph: &StreetGraph, n: NodeID) -> bool {
    graph.node(n).crossroad_score == STRONGLY_YES
}

pub fn is_weakly_in_crossroad(graph: &StreetGraph, n: NodeID) -> bool {
    graph.node(n).crossroad_score >= WEAKLY_YES
}

pub fn is_weakly_in_crossroad_edge(graph: &StreetGraph, n1: NodeID, n2: NodeID) -> bool {
    graph
        .edge(n1, n2)
        .map_or(false, |e| e.crossroad_score >= WEAKLY_YES)
}

pub fn has_strong_boundary_in_path(graph: &StreetGraph, path: &[NodeID]) -> bool {
    path.iter().any(|n| is_strong_boundary(graph, *n))
}

/// A node neither certainly in nor certainly out: its score sits strictly
/// between the strong bands. Such nodes make link paths look more like inner
/// crossroad paths.
pub fn is_possible_crossroad(graph: &StreetGraph, n: NodeID) -> bool {
    let score = graph.node(n).crossroad_score;
    score > STRONGLY_NO && score <= STRONGLY_YES
}

/// From the directed start `(n1, n2)`, walk along degree-2 nodes until a weak
/// boundary is found. Empty if a bifurcation comes first or `max` is hit.
pub fn path_to_boundary(
    graph: &StreetGraph,
    n1: NodeID,
    n2: NodeID,
    max: Option<f64>,
) -> Vec<NodeID> {
    let mut path = vec![n1, n2];
    let mut length = graph.distance(n1, n2);

    while max.map_or(true, |m| length < m) && graph.is_middle_of_polyline(path[path.len() - 1]) {
        let last = path[path.len() - 1];
        let prev = path[path.len() - 2];
        let Some(next) = graph.opposite_neighbor(last, prev) else {
            break;
        };
        length += graph.distance(last, next);
        path.push(next);
        if is_weakly_boundary(graph, next) {
            return path;
        }
    }
    // reached a split node without finding a boundary
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tags;

    #[test]
    fn bands_are_ordered() {
        assert!(STRONGLY_NO < MODERATE_NO);
        assert!(MODERATE_NO < WEAKLY_NO);
        assert!(WEAKLY_NO < UNCERTAIN);
        assert!(UNCERTAIN < WEAKLY_YES);
        assert!(WEAKLY_YES < MODERATE_YES);
        assert!(MODERATE_YES < STRONGLY_YES);
    }

    fn tagged(kv: &[(&str, &str)]) -> Tags {
        kv.iter().copied().collect()
    }

    #[test]
    fn crossing_node_is_strong_boundary() {
        let mut g = StreetGraph::new();
        g.add_node(NodeID(1), 3.090, 45.773, Tags::empty());
        g.add_node(
            NodeID(2),
            3.091,
            45.773,
            tagged(&[("highway", "crossing")]),
        );
        g.add_node(NodeID(3), 3.092, 45.773, Tags::empty());
        g.add_edge(NodeID(1), NodeID(2), Tags::empty());
        g.add_edge(NodeID(2), NodeID(3), Tags::empty());
        init(&mut g);

        assert!(is_strong_boundary(&g, NodeID(2)));
        // A tagged degree-2 node can't be inside the crossroad
        assert_eq!(g.node(NodeID(2)).crossroad_score, STRONGLY_NO);
        // Untagged degree-1 endpoints stay uncertain
        assert_eq!(g.node(NodeID(1)).crossroad_score, UNCERTAIN);
    }

    #[test]
    fn untagged_degree_four_is_strong_crossroad() {
        let mut g = StreetGraph::new();
        g.add_node(NodeID(0), 3.091, 45.773, Tags::empty());
        for (i, (x, y)) in [(3.090, 45.773), (3.092, 45.773), (3.091, 45.772), (3.091, 45.774)]
            .iter()
            .enumerate()
        {
            let id = NodeID(i as u64 + 1);
            g.add_node(id, *x, *y, Tags::empty());
            g.add_edge(NodeID(0), id, Tags::empty());
        }
        init(&mut g);
        assert!(is_strong_in_crossroad(&g, NodeID(0)));
    }

    #[test]
    fn junction_tag_marks_edge() {
        let mut g = StreetGraph::new();
        g.add_node(NodeID(1), 3.090, 45.773, Tags::empty());
        g.add_node(NodeID(2), 3.091, 45.773, Tags::empty());
        g.add_edge(NodeID(1), NodeID(2), tagged(&[("junction", "yes")]));
        init(&mut g);
        assert!(is_weakly_in_crossroad_edge(&g, NodeID(1), NodeID(2)));
    }
}
