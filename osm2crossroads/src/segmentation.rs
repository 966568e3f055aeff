//! The segmentation driver: scores the graph, grows crossroads, clusters
//! them, builds links, merges over pairs and cycles, and answers
//! where-is-the-crossroad queries.

use std::collections::BTreeMap;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::connections::RegionConnections;
use crate::link::build_links_between_crossroads;
use crate::{
    geometry, reliability, Crossroad, Link, NodeID, Region, RegionID, RegionIds, RegionKind,
    StreetGraph,
};

/// Tuning knobs for the whole pipeline. The defaults are the full-pipeline
/// values; pass a smaller `max_cycle_elements` (the original segmentation
/// tool used 5) when ring-about detection doesn't matter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentationOptions {
    /// Score reliability fresh. When false, regions are rebuilt from the
    /// labels already stored on the graph instead.
    pub init: bool,
    /// Multiplier for pair/cycle distance thresholds.
    pub connection_intensity: f64,
    /// Upper bound on cycle length searched in the region-adjacency graph.
    pub max_cycle_elements: usize,
    /// Neighborhood multiplier for clustering.
    pub cluster_scale: f64,
    /// Multiplier for boundary-extension paths.
    pub boundary_scale: f64,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            init: true,
            connection_intensity: 2.0,
            max_cycle_elements: 10,
            cluster_scale: 3.0,
            boundary_scale: 2.0,
        }
    }
}

/// A region in the driver's table: a full crossroad, a connecting link, or a
/// plain labeled set rebuilt from stored metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegionEntry {
    Crossroad(Crossroad),
    Link(Link),
    Plain(Region),
}

impl RegionEntry {
    pub fn region(&self) -> &Region {
        match self {
            RegionEntry::Crossroad(c) => &c.region,
            RegionEntry::Link(l) => &l.region,
            RegionEntry::Plain(r) => r,
        }
    }

    pub fn region_mut(&mut self) -> &mut Region {
        match self {
            RegionEntry::Crossroad(c) => &mut c.region,
            RegionEntry::Link(l) => &mut l.region,
            RegionEntry::Plain(r) => r,
        }
    }

    pub fn is_crossroad(&self) -> bool {
        matches!(self, RegionEntry::Crossroad(_))
    }

    pub fn as_crossroad(&self) -> Option<&Crossroad> {
        match self {
            RegionEntry::Crossroad(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_crossroad_mut(&mut self) -> Option<&mut Crossroad> {
        match self {
            RegionEntry::Crossroad(c) => Some(c),
            _ => None,
        }
    }

    /// Snapshot this entry under a fresh id, sharing the underlying graph.
    /// Labels are not touched; the clone is a passive record.
    fn clone_with_id(&self, id: RegionID) -> RegionEntry {
        let mut copy = self.clone();
        match &mut copy {
            RegionEntry::Crossroad(c) => c.region.id = id,
            RegionEntry::Link(l) => l.region.id = id,
            RegionEntry::Plain(r) => r.id = id,
        }
        copy
    }
}

pub struct Segmentation {
    pub graph: StreetGraph,
    pub options: SegmentationOptions,
    pub regions: BTreeMap<RegionID, RegionEntry>,
    /// Pre-merge snapshots of regions absorbed into bigger ones, for the
    /// multiscale view.
    pub inner_regions: BTreeMap<RegionID, RegionEntry>,
    ids: RegionIds,
}

impl Segmentation {
    pub fn new(mut graph: StreetGraph, options: SegmentationOptions) -> Self {
        let mut ids = RegionIds::new();
        let regions = if options.init {
            reliability::init(&mut graph);
            BTreeMap::new()
        } else {
            rebuild_regions_from_labels(&mut graph, &mut ids)
        };
        Self {
            graph,
            options,
            regions,
            inner_regions: BTreeMap::new(),
            ids,
        }
    }

    /// Run the full pipeline. Deterministic: ties always break on node and
    /// region ids.
    pub fn process(&mut self) {
        self.graph.clear_all_region_labels();
        self.regions = BTreeMap::new();
        self.inner_regions = BTreeMap::new();

        // grow a crossroad at every reliable seed
        let crossroads = Crossroad::build_crossroads(&mut self.graph, &mut self.ids);
        let order: Vec<RegionID> = crossroads.iter().map(|c| c.id()).collect();
        let mut table: BTreeMap<RegionID, Crossroad> =
            crossroads.into_iter().map(|c| (c.id(), c)).collect();
        info!("grew {} crossroad regions", table.len());

        // group subparts of a single crossing, using street names
        let clusters = Crossroad::clusters(&self.graph, &order, &table, self.options.cluster_scale);
        for cluster in clusters {
            let others: Vec<Crossroad> = cluster[1..]
                .iter()
                .filter_map(|id| table.remove(id))
                .collect();
            if let Some(first) = table.get_mut(&cluster[0]) {
                first.merge(&mut self.graph, others);
            }
        }

        for (id, cr) in table {
            self.regions.insert(id, RegionEntry::Crossroad(cr));
        }

        // inner paths and missing boundaries
        self.add_missing_paths(true);

        // links between regions
        let crossroad_regions: Vec<&Region> = self
            .regions
            .values()
            .filter(|e| e.is_crossroad())
            .map(|e| e.region())
            .collect();
        let links =
            build_links_between_crossroads(&mut self.graph, &crossroad_regions, &mut self.ids);
        for (id, link) in links {
            self.regions.insert(id, RegionEntry::Link(link));
        }
        self.relabel_crossroad_regions();

        // merge crossings connected by pairs and cycles
        self.merge_linked_crossroads();

        // inner paths again, now over the merged shapes
        self.add_missing_paths(false);

        for entry in self.regions.values_mut() {
            if let RegionEntry::Crossroad(c) = entry {
                c.compute_branches();
            }
        }
        for entry in self.inner_regions.values_mut() {
            if let RegionEntry::Crossroad(c) = entry {
                c.compute_branches();
            }
        }
    }

    /// Reset graph labels so that exactly the crossroad regions are tagged.
    /// This is also the persistence point: kinds land on the graph so a later
    /// run can rebuild regions with `init = false`.
    fn relabel_crossroad_regions(&mut self) {
        self.graph.clear_all_region_labels();

        let mut labels: Vec<(RegionID, Vec<NodeID>, Vec<(NodeID, NodeID)>)> = Vec::new();
        for (rid, entry) in &self.regions {
            if entry.is_crossroad() {
                labels.push((
                    *rid,
                    entry.region().nodes.clone(),
                    entry.region().edges.clone(),
                ));
            }
        }
        for (rid, nodes, edges) in labels {
            for n in nodes {
                self.graph.set_node_region(n, rid);
            }
            for (n1, n2) in edges {
                self.graph.set_edge_region(n1, n2, rid);
            }
            self.graph.set_region_kind(rid, RegionKind::Crossroad);
        }
    }

    fn merge_linked_crossroads(&mut self) {
        let connections = RegionConnections::new(
            &self.graph,
            &self.regions,
            self.options.connection_intensity,
        );
        let cycles = connections.cycles(&self.graph, self.options.max_cycle_elements);
        let pairs = connections.pairs();
        drop(connections);

        // absorbed id -> surviving id
        let mut forwarded: BTreeMap<RegionID, RegionID> = BTreeMap::new();
        let resolve = |forwarded: &BTreeMap<RegionID, RegionID>, id: RegionID| -> RegionID {
            *forwarded.get(&id).unwrap_or(&id)
        };

        // multi crossings first: triangles, rings, ...
        for cycle in cycles {
            // the tour repeats its start; drop the closing element and map
            // every id through the forwarding table
            let resolved: Vec<_> = cycle[..cycle.len() - 1]
                .iter()
                .map(|(rid, paths)| {
                    let rid = if self.regions.contains_key(rid) {
                        *rid
                    } else {
                        resolve(&forwarded, *rid)
                    };
                    (rid, paths.clone())
                })
                .collect();

            let distinct: std::collections::BTreeSet<RegionID> =
                resolved.iter().map(|(rid, _)| *rid).collect();
            if distinct.len() <= 1 {
                continue;
            }

            let first_id = resolved[0].0;
            for rid in &distinct {
                self.snapshot_inner_region(*rid);
            }

            for w in resolved.windows(2) {
                let id2 = resolve(&forwarded, w[1].0);

                let node_paths: Vec<Vec<NodeID>> =
                    w[1].1.iter().map(|cp| cp.path.clone()).collect();
                if let Some(RegionEntry::Crossroad(first)) = self.regions.get_mut(&first_id) {
                    first.region.add_paths(&mut self.graph, &node_paths);
                }

                if id2 != first_id {
                    self.absorb(first_id, id2);
                    forward(&mut forwarded, id2, first_id);
                }
            }
        }

        // then bi-connected crossings
        for pair in pairs {
            let id1 = resolve(&forwarded, pair.a);
            let id2 = resolve(&forwarded, pair.b);
            if id1 == id2 {
                continue;
            }
            self.snapshot_inner_region(id1);
            self.snapshot_inner_region(id2);

            let node_paths: Vec<Vec<NodeID>> =
                pair.paths.iter().map(|cp| cp.path.clone()).collect();
            if let Some(RegionEntry::Crossroad(first)) = self.regions.get_mut(&id1) {
                first.region.add_paths(&mut self.graph, &node_paths);
            }

            self.absorb(id1, id2);
            forward(&mut forwarded, id2, id1);
        }
    }

    /// Merge region `absorbed` into `survivor` and drop it from the table.
    fn absorb(&mut self, survivor: RegionID, absorbed: RegionID) {
        let Some(entry) = self.regions.remove(&absorbed) else {
            return;
        };
        match entry {
            RegionEntry::Crossroad(other) => {
                if let Some(RegionEntry::Crossroad(first)) = self.regions.get_mut(&survivor) {
                    first.merge(&mut self.graph, vec![other]);
                }
            }
            // only crossroads take part in pair/cycle merges
            other_entry => {
                self.regions.insert(absorbed, other_entry);
            }
        }
    }

    fn snapshot_inner_region(&mut self, id: RegionID) {
        if let Some(entry) = self.regions.get(&id) {
            let new_id = self.ids.next_id();
            let clone = entry.clone_with_id(new_id);
            self.inner_regions.insert(new_id, clone);
        }
    }

    fn add_missing_paths(&mut self, boundaries: bool) {
        let scale = self.options.boundary_scale;
        let ids: Vec<RegionID> = self.regions.keys().copied().collect();
        for rid in ids {
            if let Some(RegionEntry::Crossroad(c)) = self.regions.get_mut(&rid) {
                c.add_missing_paths(&mut self.graph, scale, boundaries);
            }
        }
    }

    /// The crossroad whose center lies closest to the queried coordinate,
    /// optionally followed by the inner regions it swallowed (multiscale).
    /// Brute-force search; doesn't use a quadtree.
    pub fn get_crossroad(
        &self,
        latitude: f64,
        longitude: f64,
        multiscale: bool,
    ) -> Option<Vec<&Crossroad>> {
        let target = Point::new(longitude, latitude);
        let mut best: Option<(f64, &Crossroad)> = None;
        for entry in self.regions.values() {
            if let RegionEntry::Crossroad(c) = entry {
                let d = geometry::distance(self.graph.point(c.center), target);
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, c));
                }
            }
        }
        let main = best?.1;

        let mut result = vec![main];
        if multiscale {
            for entry in self.inner_regions.values() {
                if let RegionEntry::Crossroad(inner) = entry {
                    if main.region.contains(&inner.region) {
                        result.push(inner);
                    }
                }
            }
        }
        Some(result)
    }

    pub fn is_crossroad_node(&self, n: NodeID) -> bool {
        self.graph
            .node_region(n)
            .and_then(|rid| self.regions.get(&rid))
            .map_or(false, |e| e.is_crossroad())
    }

    pub fn in_crossroad_region(&self, n1: NodeID, n2: NodeID) -> bool {
        self.graph
            .edge_region(n1, n2)
            .and_then(|rid| self.regions.get(&rid))
            .map_or(false, |e| e.is_crossroad())
    }

    /// For each neighbor of `n`, the crossroad region its edge belongs to.
    pub fn adjacent_crossroad_regions(&self, n: NodeID) -> Vec<Option<RegionID>> {
        self.graph
            .neighbors(n)
            .into_iter()
            .map(|nb| {
                self.graph.edge_region(n, nb).filter(|rid| {
                    self.regions.get(rid).map_or(false, |e| e.is_crossroad())
                })
            })
            .collect()
    }
}

fn forward(forwarded: &mut BTreeMap<RegionID, RegionID>, absorbed: RegionID, survivor: RegionID) {
    forwarded.insert(absorbed, survivor);
    for v in forwarded.values_mut() {
        if *v == absorbed {
            *v = survivor;
        }
    }
}

/// Rebuild the region table from labels stored on the graph, without
/// re-scoring or re-segmenting. Crossroad centers aren't persisted, so they
/// are recomputed as the region node closest to its centroid.
fn rebuild_regions_from_labels(
    graph: &mut StreetGraph,
    ids: &mut RegionIds,
) -> BTreeMap<RegionID, RegionEntry> {
    let mut regions: BTreeMap<RegionID, RegionEntry> = BTreeMap::new();

    let make_entry = |graph: &StreetGraph, ids: &mut RegionIds, rid: RegionID| -> RegionEntry {
        ids.claim(rid);
        match graph.region_kind(rid) {
            Some(RegionKind::Crossroad) => RegionEntry::Crossroad(Crossroad::with_region(
                Region::new(rid, RegionKind::Crossroad),
                // placeholder until the region has nodes
                NodeID(0),
            )),
            Some(RegionKind::Link) => RegionEntry::Link(Link {
                region: Region::new(rid, RegionKind::Link),
                filled: false,
            }),
            _ => RegionEntry::Plain(Region::new(rid, RegionKind::Plain)),
        }
    };

    for (n, rid) in graph.labeled_nodes() {
        if !regions.contains_key(&rid) {
            let entry = make_entry(graph, ids, rid);
            regions.insert(rid, entry);
        }
        regions
            .get_mut(&rid)
            .unwrap()
            .region_mut()
            .add_node(graph, n);
    }

    for ((n1, n2), rid) in graph.labeled_edges() {
        if !regions.contains_key(&rid) {
            let entry = make_entry(graph, ids, rid);
            regions.insert(rid, entry);
        }
        let region = regions.get_mut(&rid).unwrap().region_mut();
        region.add_edge(graph, n1, n2);
        region.add_node(graph, n1);
        region.add_node(graph, n2);
    }

    // restore centers and lane descriptions for crossroads
    let rids: Vec<RegionID> = regions.keys().copied().collect();
    for rid in rids {
        let Some(RegionEntry::Crossroad(c)) = regions.get_mut(&rid) else {
            continue;
        };
        if c.region.nodes.is_empty() {
            continue;
        }
        let centroid = c.region.centroid(graph);
        let mut best = (f64::MAX, c.region.nodes[0]);
        for n in &c.region.nodes {
            let d = graph.distance_to(*n, centroid);
            if d < best.0 {
                best = (d, *n);
            }
        }
        c.center = best.1;
        c.build_lanes_description(graph);
    }

    regions
}
