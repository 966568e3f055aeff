//! Turns a street network annotated with OSM tags into a structured model of
//! a single road intersection: segmented crossroad regions, branches with
//! lane channels, sidewalks, traffic islands, and pedestrian crossings.
//!
//! The pipeline has two stages. `Segmentation` grows, clusters, and merges
//! crossroad regions over the whole graph; `model::Intersection` then
//! enriches one selected crossroad with everything an accessibility report
//! needs. Both stages are synchronous and deterministic.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::collections::{BTreeMap, BTreeSet};

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_btreemap, serialize_btreemap};

pub use self::crossroad::{Crossroad, LaneDescription};
pub use self::error::CrossroadError;
pub use self::ids::{EdgeID, NodeID, RegionID, RegionIds};
pub use self::io::{read_segmentation, write_segmentation, SegmentedBranch, SegmentedCrossroad};
pub use self::link::Link;
pub use self::model::Intersection;
pub use self::osm::Tags;
pub use self::region::{Region, RegionKind};
pub use self::segmentation::{RegionEntry, Segmentation, SegmentationOptions};

pub mod connections;
mod crossroad;
mod error;
pub mod geometry;
mod ids;
mod io;
mod link;
pub mod model;
pub mod osm;
mod region;
pub mod reliability;
mod segmentation;
mod utils;

/// One graph node: a point with OSM node tags and two reliability scores.
/// `x` is longitude, `y` latitude.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeID,
    pub x: f64,
    pub y: f64,
    pub tags: Tags,
    /// How reliably this node sits inside a crossroad, in [0, 1000].
    pub crossroad_score: f64,
    /// How reliably this node bounds a crossroad, in [0, 1000].
    pub boundary_score: f64,
}

impl Node {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// One stored edge. Endpoint order is stable per stored instance; callers
/// needing the original OSM way orientation must consult the raw way table,
/// which lives outside this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub n1: NodeID,
    pub n2: NodeID,
    pub tags: Tags,
    /// Great-circle length in metres, fixed at insertion time.
    pub length: f64,
    pub crossroad_score: f64,
}

impl Edge {
    pub fn other_side(&self, n: NodeID) -> NodeID {
        if self.n1 == n {
            self.n2
        } else {
            self.n1
        }
    }
}

/// Undirected multigraph over tagged nodes and edges, plus the region labels
/// the segmentation writes back onto it. Parallel edges are kept, but the
/// algorithms only ever consult the first one between a pair of endpoints.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreetGraph {
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    nodes: BTreeMap<NodeID, Node>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    edges: BTreeMap<(NodeID, NodeID), Vec<Edge>>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    adjacency: BTreeMap<NodeID, BTreeSet<NodeID>>,

    /// Region label per node; absent means unlabeled. Mutated only through
    /// `Region` operations.
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    node_regions: BTreeMap<NodeID, RegionID>,
    /// Region label per endpoint pair; labels all parallel edges at once.
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    edge_regions: BTreeMap<(NodeID, NodeID), RegionID>,
    /// Kind of each labeled region, persisted so an external loader can
    /// rebuild regions without rerunning segmentation.
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    region_kinds: BTreeMap<RegionID, RegionKind>,
}

impl StreetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeID, x: f64, y: f64, tags: Tags) {
        self.nodes.insert(
            id,
            Node {
                id,
                x,
                y,
                tags,
                crossroad_score: reliability::UNCERTAIN,
                boundary_score: reliability::UNCERTAIN,
            },
        );
        self.adjacency.entry(id).or_default();
    }

    /// Both endpoints must already exist. Returns the id of the stored edge,
    /// with `k > 0` for parallel duplicates.
    pub fn add_edge(&mut self, n1: NodeID, n2: NodeID, tags: Tags) -> EdgeID {
        let length = self.distance(n1, n2);
        self.adjacency.get_mut(&n1).unwrap().insert(n2);
        self.adjacency.get_mut(&n2).unwrap().insert(n1);
        let slot = self.edges.entry(EdgeID::key(n1, n2)).or_default();
        slot.push(Edge {
            n1,
            n2,
            tags,
            length,
            crossroad_score: reliability::UNCERTAIN,
        });
        EdgeID::new(n1, n2, slot.len() - 1)
    }

    pub fn node(&self, n: NodeID) -> &Node {
        &self.nodes[&n]
    }

    pub fn has_node(&self, n: NodeID) -> bool {
        self.nodes.contains_key(&n)
    }

    pub fn point(&self, n: NodeID) -> Point<f64> {
        self.nodes[&n].point()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeID> + '_ {
        self.nodes.keys().copied()
    }

    /// The first stored edge between the endpoints, in either orientation.
    pub fn edge(&self, n1: NodeID, n2: NodeID) -> Option<&Edge> {
        self.edges
            .get(&EdgeID::key(n1, n2))
            .and_then(|slot| slot.first())
    }

    pub fn has_edge(&self, n1: NodeID, n2: NodeID) -> bool {
        self.edges.contains_key(&EdgeID::key(n1, n2))
    }

    pub fn edge_keys(&self) -> impl Iterator<Item = (NodeID, NodeID)> + '_ {
        self.edges.keys().copied()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub(crate) fn first_edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.values_mut().filter_map(|slot| slot.first_mut())
    }

    /// Distinct adjacent nodes, in id order.
    pub fn neighbors(&self, n: NodeID) -> Vec<NodeID> {
        self.adjacency
            .get(&n)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct neighbors (parallel edges don't count twice).
    pub fn degree(&self, n: NodeID) -> usize {
        self.adjacency.get(&n).map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_bifurcation(&self, n: NodeID) -> bool {
        self.degree(n) > 2
    }

    pub fn is_middle_of_polyline(&self, n: NodeID) -> bool {
        self.degree(n) == 2
    }

    /// The neighbor of `n` that isn't `other`. Meaningful on polyline middle
    /// nodes, where there's exactly one.
    pub fn opposite_neighbor(&self, n: NodeID, other: NodeID) -> Option<NodeID> {
        self.neighbors(n).into_iter().find(|nb| *nb != other)
    }

    pub fn distance(&self, n1: NodeID, n2: NodeID) -> f64 {
        geometry::distance(self.point(n1), self.point(n2))
    }

    pub fn distance_to(&self, n: NodeID, point: Point<f64>) -> f64 {
        geometry::distance(self.point(n), point)
    }

    /// Links are shorter than real paths: `*_link` highway classes count half.
    pub fn distance_with_shortcut(&self, n1: NodeID, n2: NodeID) -> f64 {
        let mut coef = 1.0;
        if let Some(edge) = self.edge(n1, n2) {
            if edge.tags.is_any(
                osm::HIGHWAY,
                &[
                    "primary_link",
                    "secondary_link",
                    "tertiary_link",
                    "trunk_link",
                    "motorway_link",
                ],
            ) {
                coef = 0.5;
            }
        }
        self.distance(n1, n2) * coef
    }

    pub fn bearing(&self, n1: NodeID, n2: NodeID) -> f64 {
        geometry::bearing(self.point(n1), self.point(n2))
    }

    pub fn path_length(&self, path: &[NodeID]) -> f64 {
        path.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    pub fn centroid(&self, nodes: &[NodeID]) -> Point<f64> {
        let points: Vec<_> = nodes.iter().map(|n| self.point(*n)).collect();
        geometry::centroid(&points)
    }

    /// From the directed start `(n1, n2)`, extend along degree-2 nodes until a
    /// node of another degree is reached, or the optional max length exceeded.
    pub fn walk_to_bifurcation(&self, n1: NodeID, n2: NodeID, max: Option<f64>) -> Vec<NodeID> {
        let mut path = vec![n1, n2];
        let mut length = self.distance(n1, n2);

        while max.map_or(true, |m| length < m)
            && self.is_middle_of_polyline(path[path.len() - 1])
        {
            let last = path[path.len() - 1];
            let prev = path[path.len() - 2];
            match self.opposite_neighbor(last, prev) {
                Some(next) => {
                    length += self.distance(last, next);
                    path.push(next);
                }
                None => break,
            }
        }
        path
    }

    /// Distinct street names on incident edges; unnamed edges contribute None.
    pub fn adjacent_street_names(&self, n: NodeID) -> BTreeSet<Option<String>> {
        self.neighbors(n)
            .into_iter()
            .map(|nb| {
                self.edge(n, nb)
                    .and_then(|e| e.tags.get(osm::NAME).cloned())
            })
            .collect()
    }

    /// Degree-3 node with at least two one-way incident edges: the split
    /// point of a dual-carriageway pair, not a real crossroad.
    pub fn is_oneway_pair_separator(&self, n: NodeID) -> bool {
        if self.degree(n) != 3 {
            return false;
        }
        self.neighbors(n)
            .into_iter()
            .filter(|nb| self.edge(n, *nb).map_or(false, |e| e.tags.is_oneway()))
            .count()
            >= 2
    }

    /// True when `n` closes a small triangle of polylines: three bifurcations
    /// pairwise connected, with perimeter below `max_perimeter` metres.
    pub fn is_part_of_local_triangle(&self, n: NodeID, max_perimeter: f64) -> bool {
        let paths: Vec<Vec<NodeID>> = self
            .neighbors(n)
            .into_iter()
            .map(|nb| self.walk_to_bifurcation(n, nb, None))
            .collect();

        for (i1, p1) in paths.iter().enumerate() {
            let p1_end = p1[p1.len() - 1];
            let p1_end_paths: Vec<Vec<NodeID>> = self
                .neighbors(p1_end)
                .into_iter()
                .map(|nb| self.walk_to_bifurcation(p1_end, nb, None))
                .collect();
            let p1_end_neighbors: Vec<NodeID> =
                p1_end_paths.iter().map(|p| p[p.len() - 1]).collect();

            for p2 in &paths[i1..] {
                let p2_end = p2[p2.len() - 1];
                if p1_end_neighbors.contains(&p2_end) {
                    let closing = p1_end_paths
                        .iter()
                        .find(|p| p[p.len() - 1] == p2_end)
                        .unwrap();
                    let perimeter = self.path_length(p1)
                        + self.path_length(p2)
                        + self.path_length(closing);
                    if perimeter < max_perimeter {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Rough width of the carriageway of an edge, in metres, from the OSM
    /// `width` tag when numeric, otherwise lane count times a class width.
    pub fn estimate_edge_width(&self, n1: NodeID, n2: NodeID) -> f64 {
        let Some(edge) = self.edge(n1, n2) else {
            return 0.0;
        };
        if let Some(w) = edge.tags.get(osm::WIDTH).and_then(|v| v.parse::<f64>().ok()) {
            return w;
        }

        let count = match edge.tags.get(osm::LANES) {
            Some(v) => match v.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    warn!("non-numeric lanes={} on {}-{}", v, n1, n2);
                    if edge.tags.is_oneway() {
                        1
                    } else {
                        2
                    }
                }
            },
            None => {
                if edge.tags.is_oneway() {
                    1
                } else {
                    2
                }
            }
        };

        let lane_width = match edge.tags.get(osm::HIGHWAY).map(|v| v.as_str()) {
            Some("motorway") | Some("trunk") => 3.5,
            Some("primary") | Some("secondary") => 3.0,
            Some("service") => 2.25,
            Some(_) => 2.75,
            None => 3.0,
        };

        // Separated cycle tracks widen the carriageway by about one lane
        let has_cycle_track = edge.tags.is("cycleway", "track")
            || edge.tags.is("cycleway:left", "track")
            || edge.tags.is("cycleway:right", "track");
        if has_cycle_track {
            (count + 1) as f64 * lane_width
        } else {
            count as f64 * lane_width
        }
    }
}

// Region labels. Only `Region` operations write here.
impl StreetGraph {
    pub fn node_region(&self, n: NodeID) -> Option<RegionID> {
        self.node_regions.get(&n).copied()
    }

    pub fn edge_region(&self, n1: NodeID, n2: NodeID) -> Option<RegionID> {
        self.edge_regions.get(&EdgeID::key(n1, n2)).copied()
    }

    pub(crate) fn set_node_region(&mut self, n: NodeID, id: RegionID) {
        self.node_regions.insert(n, id);
    }

    pub(crate) fn set_edge_region(&mut self, n1: NodeID, n2: NodeID, id: RegionID) {
        self.edge_regions.insert(EdgeID::key(n1, n2), id);
    }

    pub(crate) fn clear_node_region(&mut self, n: NodeID) {
        self.node_regions.remove(&n);
    }

    pub(crate) fn clear_edge_region(&mut self, n1: NodeID, n2: NodeID) {
        self.edge_regions.remove(&EdgeID::key(n1, n2));
    }

    pub(crate) fn clear_all_region_labels(&mut self) {
        self.node_regions.clear();
        self.edge_regions.clear();
        self.region_kinds.clear();
    }

    pub fn region_kind(&self, id: RegionID) -> Option<RegionKind> {
        self.region_kinds.get(&id).copied()
    }

    pub(crate) fn set_region_kind(&mut self, id: RegionID, kind: RegionKind) {
        self.region_kinds.insert(id, kind);
    }

    pub(crate) fn labeled_nodes(&self) -> Vec<(NodeID, RegionID)> {
        self.node_regions.iter().map(|(n, r)| (*n, *r)).collect()
    }

    pub(crate) fn labeled_edges(&self) -> Vec<((NodeID, NodeID), RegionID)> {
        self.edge_regions.iter().map(|(e, r)| (*e, *r)).collect()
    }

    pub fn has_unlabeled_incident_edge(&self, n: NodeID) -> bool {
        self.neighbors(n)
            .into_iter()
            .any(|nb| self.edge_region(n, nb).is_none())
    }
}
