//! Growing a crossroad region from a seed node, and clustering neighboring
//! regions that are really one logical intersection (dog-bones, offset
//! T-junctions, ring-abouts).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{geometry, osm, reliability, NodeID, Region, RegionID, RegionIds, RegionKind, StreetGraph, Tags};

/// One outbound polyline from a crossroad: its bearing from the center, its
/// resolved street name, and the first edge along it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneDescription {
    pub angle: f64,
    pub street_name: Option<String>,
    pub edge: (NodeID, NodeID),
}

impl LaneDescription {
    /// Same named street, pointing in a compatible direction.
    pub fn is_similar(&self, other: &LaneDescription) -> bool {
        match (&self.street_name, &other.street_name) {
            (Some(a), Some(b)) if a == b => {
                geometry::angular_distance(self.angle, other.angle) < 90.0
            }
            _ => false,
        }
    }

    /// Within 45 degrees of perpendicular to the given bearing.
    pub fn is_orthogonal(&self, angle: f64) -> bool {
        let diff = geometry::angular_distance(self.angle, angle);
        (diff - 90.0).abs() <= 45.0
    }

    pub fn matches_edge(&self, n1: NodeID, n2: NodeID) -> bool {
        (self.edge.0 == n1 && self.edge.1 == n2) || (self.edge.0 == n2 && self.edge.1 == n1)
    }
}

/// Boundary distance thresholds in metres, by highway class. A crossroad of
/// a fast class reaches further than a service alley.
fn min_boundary_distance(class: &str) -> f64 {
    match class {
        "motorway" | "trunk" => 100.0,
        "primary" => 50.0,
        "secondary" => 25.0,
        "tertiary" => 20.0,
        "unclassified" | "residential" => 15.0,
        "living_street" => 10.0,
        "service" => 6.0,
        _ => 6.0,
    }
}

fn max_boundary_distance(class: &str) -> f64 {
    match class {
        "motorway" | "trunk" => 100.0,
        "primary" | "secondary" => 80.0,
        "tertiary" => 50.0,
        "unclassified" | "residential" => 40.0,
        "living_street" => 30.0,
        "service" => 20.0,
        _ => 25.0,
    }
}

const KNOWN_CLASSES: [&str; 9] = [
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "living_street",
    "service",
];

/// The threshold class of an edge. Link variants reuse their base class.
pub(crate) fn highway_class(tags: &Tags) -> &'static str {
    let Some(highway) = tags.get(osm::HIGHWAY) else {
        return "default";
    };
    let base = highway.strip_suffix("_link").unwrap_or(highway);
    KNOWN_CLASSES
        .iter()
        .find(|c| **c == base)
        .copied()
        .unwrap_or("default")
}

/// A segmented crossroad region: a center, the grown subgraph, and one
/// `LaneDescription` per outbound polyline, grouped into branches later.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Crossroad {
    pub region: Region,
    pub center: NodeID,
    pub lanes: Vec<LaneDescription>,
    pub branches: Vec<Vec<LaneDescription>>,
}

impl Crossroad {
    /// Grow a region from `seed` and describe its lanes.
    pub fn grow(graph: &mut StreetGraph, ids: &mut RegionIds, seed: NodeID) -> Self {
        let mut cr = Self {
            region: Region::new(ids.next_id(), RegionKind::Crossroad),
            center: seed,
            lanes: Vec::new(),
            branches: Vec::new(),
        };
        cr.propagate(graph, seed);
        cr.build_lanes_description(graph);
        cr
    }

    pub(crate) fn with_region(region: Region, center: NodeID) -> Self {
        Self {
            region,
            center,
            lanes: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn id(&self) -> RegionID {
        self.region.id
    }

    /// A node seeds a crossroad when it, or one of its incident edges, is at
    /// least weakly classified as in-crossroad.
    pub fn is_reliable_crossroad_node(graph: &StreetGraph, n: NodeID) -> bool {
        if reliability::is_weakly_in_crossroad(graph, n) {
            return true;
        }
        graph
            .neighbors(n)
            .into_iter()
            .any(|nb| reliability::is_weakly_in_crossroad_edge(graph, nb, n))
    }

    /// Scan the graph in id order and grow a crossroad at every unlabeled
    /// reliable seed. Grown regions with no real junction node ("straight
    /// crossings") are discarded.
    pub fn build_crossroads(graph: &mut StreetGraph, ids: &mut RegionIds) -> Vec<Crossroad> {
        let mut crossroads = Vec::new();
        for n in graph.node_ids().collect::<Vec<_>>() {
            if graph.node_region(n).is_none() && Self::is_reliable_crossroad_node(graph, n) {
                let cr = Crossroad::grow(graph, ids, n);
                if cr.is_straight_crossing(graph) {
                    cr.region.clear_labels(graph);
                } else {
                    crossroads.push(cr);
                }
            }
        }
        crossroads
    }

    /// A region where every node has at most two neighbors is just two
    /// polylines crossing, not a crossroad.
    pub fn is_straight_crossing(&self, graph: &StreetGraph) -> bool {
        !self.region.nodes.iter().any(|n| graph.degree(*n) > 2)
    }

    fn propagate(&mut self, graph: &mut StreetGraph, n: NodeID) {
        self.region.add_node(graph, n);
        self.center = n;

        for nb in graph.neighbors(n) {
            if graph.edge_region(n, nb).is_none() {
                let paths = self.possible_paths(graph, n, nb);
                for path in paths.iter().rev() {
                    if self.is_correct_inner_path(graph, path) {
                        self.region.add_path(graph, path);
                        break;
                    }
                }
            }
        }
    }

    /// Two candidate inner paths along the polyline from `(n1, n2)`: one
    /// stopping at the first weak boundary, one continuing to a strong stop.
    fn possible_paths(&self, graph: &StreetGraph, n1: NodeID, n2: NodeID) -> Vec<Vec<NodeID>> {
        let mut results = Vec::new();
        let mut path = vec![n1, n2];

        while self.is_middle_path_node(graph, path[path.len() - 1], false) {
            let last = path[path.len() - 1];
            let prev = path[path.len() - 2];
            let Some(next) = graph.opposite_neighbor(last, prev) else {
                warn!("cannot follow the polyline past {}", last);
                return results;
            };
            path.push(next);
            // reaching a known region stops the expansion
            if graph.node_region(next).is_some() {
                break;
            }
        }
        results.push(path.clone());

        if !self.is_middle_path_node(graph, path[path.len() - 1], true) {
            return results;
        }

        // past a weak border, continue until a strong one
        while self.is_middle_path_node(graph, path[path.len() - 1], true) {
            let last = path[path.len() - 1];
            let prev = path[path.len() - 2];
            let Some(next) = graph.opposite_neighbor(last, prev) else {
                warn!("cannot follow the polyline past {}", last);
                return results;
            };
            path.push(next);
            if graph.node_region(next).is_some() {
                break;
            }
        }
        results.push(path);

        results
    }

    fn is_middle_path_node(&self, graph: &StreetGraph, n: NodeID, strong: bool) -> bool {
        if graph.degree(n) != 2 {
            return false;
        }
        if strong {
            !(reliability::is_strong_boundary(graph, n)
                || reliability::is_strong_in_crossroad(graph, n))
        } else {
            !(reliability::is_weakly_boundary(graph, n)
                || reliability::is_weakly_in_crossroad(graph, n))
        }
    }

    fn is_inner_path_by_osmdata(&self, graph: &StreetGraph, path: &[NodeID]) -> bool {
        path.windows(2).all(|w| {
            graph
                .edge(w[0], w[1])
                .map_or(false, |e| e.tags.contains_key(osm::JUNCTION))
        })
    }

    fn is_correct_inner_path(&self, graph: &StreetGraph, path: &[NodeID]) -> bool {
        if path.len() < 2 {
            return false;
        }
        // loops are not correct inner paths in a crossing
        if path[0] == path[path.len() - 1] {
            return false;
        }

        // the OSM "junction" tag is a good clue on its own
        if self.is_inner_path_by_osmdata(graph, path) {
            return true;
        }

        let first = path[0];
        let last = path[path.len() - 1];
        if !reliability::is_weakly_in_crossroad(graph, first)
            || !reliability::is_weakly_boundary(graph, last)
        {
            return false;
        }

        let d = graph.path_length(path);
        // a crossroad with many lanes is larger
        let r = if graph.degree(first) > 4 { 2.0 } else { 1.0 };
        let class = self.max_highway_classification_other(graph, path);
        d < min_boundary_distance(class) * r
            || (d < max_boundary_distance(class) * r
                && self.closest_possible_bifurcation(graph, last) == Some(first))
    }

    /// The fastest class among the branches leaving the center, other than
    /// the one the path itself uses.
    fn max_highway_classification_other(&self, graph: &StreetGraph, path: &[NodeID]) -> &'static str {
        let mut result = "default";
        let mut value = max_boundary_distance(result);
        for nb in graph.neighbors(self.center) {
            if nb != path[1] {
                let class = graph
                    .edge(self.center, nb)
                    .map(|e| highway_class(&e.tags))
                    .unwrap_or("default");
                let v = max_boundary_distance(class);
                if v > value {
                    result = class;
                    value = v;
                }
            }
        }
        result
    }

    fn closest_possible_bifurcation(&self, graph: &StreetGraph, point: NodeID) -> Option<NodeID> {
        let mut result = None;
        let mut length = f64::MAX;
        for nb in graph.neighbors(point) {
            let path = graph.walk_to_bifurcation(point, nb, None);
            let l = graph.path_length(&path);
            if l < length {
                length = l;
                result = Some(path[path.len() - 1]);
            }
        }
        result
    }

    /// Mean distance from the center to the non-center borders, or half the
    /// min threshold of the fastest incident class when there are none.
    pub fn radius(&self, graph: &StreetGraph) -> f64 {
        let borders: Vec<NodeID> = self
            .region
            .nodes
            .iter()
            .copied()
            .filter(|n| self.region.is_boundary_node(graph, *n) && *n != self.center)
            .collect();
        if borders.is_empty() {
            let mut radius: f64 = 0.0;
            for nb in graph.neighbors(self.center) {
                let class = graph
                    .edge(self.center, nb)
                    .map(|e| highway_class(&e.tags))
                    .unwrap_or("default");
                // reduce the impact of missing lanes
                radius = radius.max(min_boundary_distance(class) / 2.0);
            }
            radius
        } else {
            borders
                .iter()
                .map(|b| graph.distance(self.center, *b))
                .sum::<f64>()
                / borders.len() as f64
        }
    }

    fn open_paths(&self, graph: &StreetGraph, point: NodeID, radius: f64) -> Vec<Vec<NodeID>> {
        graph
            .neighbors(point)
            .into_iter()
            .filter(|nb| !self.region.has_edge(*nb, point))
            .map(|nb| graph.walk_to_bifurcation(point, nb, Some(radius)))
            .collect()
    }

    fn lane_description_from_edge(&self, graph: &StreetGraph, edge: (NodeID, NodeID)) -> LaneDescription {
        let far = if self.center == edge.1 { edge.0 } else { edge.1 };
        let angle = graph.bearing(self.center, far);

        let mut name = graph
            .edge(edge.0, edge.1)
            .and_then(|e| e.tags.get(osm::NAME).cloned());
        if name.is_none() {
            // walk outwards until a named edge appears
            let path = graph.walk_to_bifurcation(edge.0, edge.1, None);
            for w in path.windows(2) {
                if let Some(n) = graph.edge(w[0], w[1]).and_then(|e| e.tags.get(osm::NAME)) {
                    name = Some(n.clone());
                    break;
                }
            }

            if name.is_none() {
                // a lone parallel path returning to the crossroad probably
                // carries the same name
                let end = path[path.len() - 1];
                let other_paths: Vec<Vec<NodeID>> = graph
                    .neighbors(end)
                    .into_iter()
                    .map(|nb| graph.walk_to_bifurcation(end, nb, None))
                    .filter(|op| self.region.has_node(op[op.len() - 1]))
                    .collect();
                if other_paths.len() == 1 {
                    name = graph
                        .edge(other_paths[0][0], other_paths[0][1])
                        .and_then(|e| e.tags.get(osm::NAME).cloned());
                }
            }
        }

        LaneDescription {
            angle,
            street_name: name,
            edge,
        }
    }

    fn lanes_description_from_node(&self, graph: &StreetGraph, border: NodeID) -> Vec<LaneDescription> {
        graph
            .neighbors(border)
            .into_iter()
            .filter(|nb| !self.region.has_edge(*nb, border))
            .map(|nb| self.lane_description_from_edge(graph, (border, nb)))
            .collect()
    }

    pub fn build_lanes_description(&mut self, graph: &StreetGraph) {
        self.lanes = Vec::new();
        let radius = self.radius(graph);
        let borders: Vec<NodeID> = self
            .region
            .nodes
            .iter()
            .copied()
            .filter(|n| self.region.is_boundary_node(graph, *n))
            .collect();

        for b in borders {
            if b != self.center {
                let mut lanes = self.lanes_description_from_node(graph, b);
                self.lanes.append(&mut lanes);
            } else {
                // all open polylines starting from the center itself
                for ol in self.open_paths(graph, self.center, radius) {
                    self.lanes
                        .push(self.lane_description_from_edge(graph, (ol[1], ol[0])));
                }
            }
        }
    }

    /// Group lanes into branches by name and angular similarity. A lane that
    /// bridges several branches merges them.
    pub fn compute_branches(&mut self) {
        self.branches = group_lanes(&self.lanes);
    }

    pub fn estimate_branch_width(&self, graph: &StreetGraph, branch: &[LaneDescription]) -> f64 {
        branch
            .iter()
            .map(|l| graph.estimate_edge_width(l.edge.0, l.edge.1))
            .sum()
    }

    pub fn max_branch_width(&self, graph: &StreetGraph) -> f64 {
        let grouped;
        let branches = if self.branches.is_empty() {
            grouped = group_lanes(&self.lanes);
            &grouped
        } else {
            &self.branches
        };
        branches
            .iter()
            .map(|b| self.estimate_branch_width(graph, b))
            .fold(0.0, f64::max)
    }
}

fn group_lanes(lanes: &[LaneDescription]) -> Vec<Vec<LaneDescription>> {
    let mut branches: Vec<Vec<LaneDescription>> = Vec::new();
    for lane in lanes {
        let matching: Vec<usize> = branches
            .iter()
            .enumerate()
            .filter(|(_, branch)| branch.iter().any(|l| l.is_similar(lane)))
            .map(|(i, _)| i)
            .collect();
        match matching.split_first() {
            None => branches.push(vec![lane.clone()]),
            Some((first, rest)) => {
                branches[*first].push(lane.clone());
                for idb in rest {
                    let moved = std::mem::take(&mut branches[*idb]);
                    branches[*first].extend(moved);
                }
            }
        }
        branches.retain(|b| !b.is_empty());
    }
    branches
}

// Clustering: deciding that two nearby regions are one logical crossroad,
// and merging them.
impl Crossroad {
    fn find_direct_path_to_possible_adjacent_bifurcation(
        &self,
        graph: &StreetGraph,
        point: NodeID,
    ) -> Option<Vec<NodeID>> {
        for nb in graph.neighbors(self.center) {
            let path = graph.walk_to_bifurcation(self.center, nb, None);
            if path[path.len() - 1] == point {
                return Some(path);
            }
        }
        None
    }

    pub fn in_same_cluster(&self, graph: &StreetGraph, other: &Crossroad) -> bool {
        if self.id() == other.id() {
            return false;
        }

        let angle = graph.bearing(self.center, other.center);

        // no direct path between centers, or a strong border on it: separate
        // crossroads
        let Some(path) =
            self.find_direct_path_to_possible_adjacent_bifurcation(graph, other.center)
        else {
            return false;
        };
        if reliability::has_strong_boundary_in_path(graph, &path) {
            return false;
        }

        // similar branches orthogonal to the junction axis
        for b1 in &self.lanes {
            for b2 in &other.lanes {
                if b1.is_similar(b2) && (b1.is_orthogonal(angle) || b2.is_orthogonal(angle)) {
                    return true;
                }
            }
        }
        false
    }

    /// Ids of the crossroads whose center lies within `scale` radii of ours.
    pub fn neighborhood(
        &self,
        graph: &StreetGraph,
        crossroads: &BTreeMap<RegionID, Crossroad>,
        scale: f64,
    ) -> Vec<RegionID> {
        let radius = self.radius(graph) * scale;
        crossroads
            .values()
            .filter(|c| c.id() != self.id() && graph.distance(self.center, c.center) < radius)
            .map(|c| c.id())
            .collect()
    }

    /// Partition crossroads into clusters of mutually-merged neighbors,
    /// re-stitching partial overlaps transitively. Single regions drop out.
    pub fn clusters(
        graph: &StreetGraph,
        order: &[RegionID],
        crossroads: &BTreeMap<RegionID, Crossroad>,
        scale: f64,
    ) -> Vec<Vec<RegionID>> {
        let mut result: Vec<Vec<RegionID>> = Vec::new();
        let mut visited: Vec<RegionID> = Vec::new();

        for &cid in order {
            let crossroad = &crossroads[&cid];
            let mut cluster = if !visited.contains(&cid) {
                visited.push(cid);
                vec![cid]
            } else {
                match result.iter().position(|c| c.contains(&cid)) {
                    Some(idx) => result.remove(idx),
                    None => vec![cid],
                }
            };

            for other in crossroad.neighborhood(graph, crossroads, scale) {
                if crossroad.in_same_cluster(graph, &crossroads[&other]) {
                    if !visited.contains(&other) {
                        visited.push(other);
                        cluster.push(other);
                    } else if let Some(idx) = result.iter().position(|c| c.contains(&other)) {
                        let mut absorbed = result.remove(idx);
                        cluster.append(&mut absorbed);
                    }
                    // otherwise the merge already happened earlier in this pass
                }
            }
            result.push(cluster);
        }

        result.retain(|c| c.len() > 1);
        result
    }

    /// Absorb `others` into this crossroad: take over their nodes and edges,
    /// connect all former centers, and re-center on the node closest to their
    /// centroid.
    pub fn merge(&mut self, graph: &mut StreetGraph, others: Vec<Crossroad>) {
        for other in &others {
            for n in &other.region.nodes {
                self.region.add_node(graph, *n);
            }
            for (n1, n2) in &other.region.edges {
                self.region.add_edge(graph, *n1, *n2);
            }
        }

        let mut old_centers: Vec<NodeID> = others.iter().map(|o| o.center).collect();
        old_centers.push(self.center);

        self.add_direct_paths_between_nodes(graph, &old_centers);

        let centroid = graph.centroid(&old_centers);
        let mut distance = f64::MAX;
        let mut new_center = self.center;
        for n in &self.region.nodes {
            let d = graph.distance_to(*n, centroid);
            if d < distance {
                distance = d;
                new_center = *n;
            }
        }
        self.center = new_center;

        self.build_lanes_description(graph);
    }

    /// Add every direct (bifurcation-free) path connecting two of the given
    /// nodes, as long as it's shorter than the region diameter.
    fn add_direct_paths_between_nodes(&mut self, graph: &mut StreetGraph, points: &[NodeID]) {
        for p1 in points {
            for nb in graph.neighbors(*p1) {
                if !self.region.has_edge(*p1, nb) {
                    let path = graph.walk_to_bifurcation(*p1, nb, None);
                    if points.contains(&path[path.len() - 1])
                        && graph.path_length(&path) < self.region.diameter(graph)
                    {
                        self.region.add_path(graph, &path);
                    }
                }
            }
        }
    }

    /// Complete the region: inner chords between its own nodes, and (when
    /// `boundaries` is set) unlabeled polylines out to the nearest weak
    /// boundary, bounded by `scale` radii.
    pub fn add_missing_paths(&mut self, graph: &mut StreetGraph, scale: f64, boundaries: bool) {
        let nodes = self.region.nodes.clone();
        self.add_direct_paths_between_nodes(graph, &nodes);

        if boundaries {
            let max_length = scale * self.radius(graph);
            for p1 in self.region.nodes.clone() {
                for nb in graph.neighbors(p1) {
                    if !self.region.has_edge(p1, nb) && graph.edge_region(p1, nb).is_none() {
                        let mut path = reliability::path_to_boundary(graph, p1, nb, None);
                        while path.len() > 2
                            && graph
                                .edge_region(path[path.len() - 2], path[path.len() - 1])
                                .is_some()
                        {
                            path.pop();
                        }
                        if !path.is_empty() && graph.path_length(&path) < max_length {
                            self.region.add_path(graph, &path);
                        }
                    }
                }
            }
        }

        self.build_lanes_description(graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highway_classes_fold_links() {
        let primary: Tags = [("highway", "primary")].into_iter().collect();
        let link: Tags = [("highway", "primary_link")].into_iter().collect();
        let odd: Tags = [("highway", "corridor")].into_iter().collect();
        assert_eq!(highway_class(&primary), "primary");
        assert_eq!(highway_class(&link), "primary");
        assert_eq!(highway_class(&odd), "default");
        assert_eq!(highway_class(&Tags::empty()), "default");
    }

    #[test]
    fn similar_lanes_need_matching_names() {
        let a = LaneDescription {
            angle: 10.0,
            street_name: Some("Rue A".to_string()),
            edge: (NodeID(1), NodeID(2)),
        };
        let mut b = a.clone();
        b.angle = 350.0;
        assert!(a.is_similar(&b));
        b.street_name = None;
        assert!(!a.is_similar(&b));
        b.street_name = Some("Rue B".to_string());
        assert!(!a.is_similar(&b));
    }

    #[test]
    fn orthogonality_window() {
        let lane = LaneDescription {
            angle: 0.0,
            street_name: None,
            edge: (NodeID(1), NodeID(2)),
        };
        assert!(lane.is_orthogonal(90.0));
        assert!(lane.is_orthogonal(60.0));
        assert!(!lane.is_orthogonal(30.0));
        assert!(lane.is_orthogonal(270.0));
    }

    #[test]
    fn bridging_lane_merges_branches() {
        let mk = |angle: f64, name: &str| LaneDescription {
            angle,
            street_name: Some(name.to_string()),
            edge: (NodeID(1), NodeID(2)),
        };
        // Two lanes of "A" far apart in angle don't group directly, but a
        // third between them bridges the gap
        let lanes = vec![mk(0.0, "A"), mk(160.0, "A"), mk(80.0, "A")];
        let branches = group_lanes(&lanes);
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].len(), 3);

        let lanes = vec![mk(0.0, "A"), mk(160.0, "A")];
        assert_eq!(group_lanes(&lanes).len(), 2);
    }
}
