//! Region adjacency between crossroads and links, and the two merge signals
//! read off it: bi-connected pairs and short cycles (dog-bones, ring-abouts,
//! triangles of mini-junctions).

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{E, PI};

use serde::{Deserialize, Serialize};

use crate::segmentation::RegionEntry;
use crate::{reliability, NodeID, RegionID, StreetGraph};

/// A connection never reaches further than this, whatever the branch widths
/// say.
const MAX_DISTANCE_CONNECTION: f64 = 50.0;
const MAX_LOOP_DISTANCE: f64 = MAX_DISTANCE_CONNECTION * PI;
/// A pair connected by a single path is only kept when the path is this many
/// times shorter than the connection threshold.
const RATIO_SINGLE_PATH: f64 = 5.0;

/// One in-link path connecting two crossroads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPath {
    pub path: Vec<NodeID>,
    pub link: RegionID,
    /// Short enough (including the stubs to both centers) to merge on its own.
    pub close: bool,
}

/// Two crossroads and every retained path between them. `a.0 < b.0` always.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPair {
    pub a: RegionID,
    pub b: RegionID,
    pub paths: Vec<ConnectionPath>,
}

/// A closed tour of crossroads; each element carries the paths that reach it
/// from the previous one. The first element repeats at the end.
pub type RegionCycle = Vec<(RegionID, Vec<ConnectionPath>)>;

pub struct RegionConnections {
    crossroads: Vec<RegionID>,
    max_branch_width: BTreeMap<RegionID, f64>,
    centers: BTreeMap<RegionID, NodeID>,
    /// crossroad -> link -> contact nodes, and link -> crossroad -> ditto.
    adjacencies: BTreeMap<RegionID, BTreeMap<RegionID, Vec<NodeID>>>,
    connected: Vec<ConnectedPair>,
    connection_threshold: f64,
}

impl RegionConnections {
    pub fn new(
        graph: &StreetGraph,
        regions: &BTreeMap<RegionID, RegionEntry>,
        connection_threshold: f64,
    ) -> Self {
        let mut crossroads = Vec::new();
        let mut max_branch_width = BTreeMap::new();
        let mut centers = BTreeMap::new();
        for (rid, entry) in regions {
            if let RegionEntry::Crossroad(cr) = entry {
                crossroads.push(*rid);
                max_branch_width.insert(*rid, cr.max_branch_width(graph));
                centers.insert(*rid, cr.center);
            }
        }

        // which regions contain each node
        let mut regions_by_node: BTreeMap<NodeID, Vec<RegionID>> = BTreeMap::new();
        for (rid, entry) in regions {
            for n in &entry.region().nodes {
                regions_by_node.entry(*n).or_default().push(*rid);
            }
        }

        // adjacency between regions of different typology sharing a node
        let mut adjacencies: BTreeMap<RegionID, BTreeMap<RegionID, Vec<NodeID>>> = BTreeMap::new();
        for (n, rids) in &regions_by_node {
            for r1 in rids {
                for r2 in rids {
                    if r1 != r2
                        && regions[r1].region().kind != regions[r2].region().kind
                    {
                        adjacencies
                            .entry(*r1)
                            .or_default()
                            .entry(*r2)
                            .or_default()
                            .push(*n);
                    }
                }
            }
        }

        let mut connections = Self {
            crossroads,
            max_branch_width,
            centers,
            adjacencies,
            connected: Vec::new(),
            connection_threshold,
        };
        connections.compute_connected_crossroads(graph, regions, &regions_by_node);
        connections
    }

    fn max_distance_connection(&self, cr1: RegionID, cr2: RegionID) -> f64 {
        let width = self.max_branch_width[&cr1].max(self.max_branch_width[&cr2]);
        (width * self.connection_threshold).min(MAX_DISTANCE_CONNECTION)
    }

    fn max_loop_distance(&self, cr: RegionID) -> f64 {
        (self.max_branch_width[&cr] * self.connection_threshold * PI).min(MAX_LOOP_DISTANCE)
    }

    fn compute_connected_crossroads(
        &mut self,
        graph: &StreetGraph,
        regions: &BTreeMap<RegionID, RegionEntry>,
        regions_by_node: &BTreeMap<NodeID, Vec<RegionID>>,
    ) {
        let mut raw: Vec<(RegionID, RegionID, ConnectionPath)> = Vec::new();

        for &cr in &self.crossroads {
            let Some(links) = self.adjacencies.get(&cr) else {
                continue;
            };
            for link in links.keys() {
                let Some(reachable) = self.adjacencies.get(link) else {
                    continue;
                };
                for &cr2 in reachable.keys() {
                    if cr >= cr2 {
                        continue;
                    }
                    let Some((path, distance)) =
                        self.path_in_link(graph, regions, regions_by_node, *link, cr, cr2)
                    else {
                        continue;
                    };
                    let max_d = self.max_distance_connection(cr, cr2);
                    if distance < max_d {
                        let with_stubs = distance
                            + graph.distance(self.centers[&cr], path[0])
                            + graph.distance(self.centers[&cr2], path[path.len() - 1]);
                        let close = with_stubs < max_d / RATIO_SINGLE_PATH;
                        raw.push((
                            cr,
                            cr2,
                            ConnectionPath {
                                path,
                                link: *link,
                                close,
                            },
                        ));
                    }
                }
            }
        }

        // merge multiple instances of the same pair
        let mut merged: BTreeMap<(RegionID, RegionID), Vec<ConnectionPath>> = BTreeMap::new();
        for (a, b, cp) in raw {
            merged.entry((a, b)).or_default().push(cp);
        }
        self.connected = merged
            .into_iter()
            .map(|((a, b), paths)| ConnectedPair { a, b, paths })
            .collect();
    }

    /// Shortest path inside link `l` between the contact nodes of `cr1` and
    /// `cr2`. Link-class edges count half, and paths through nodes that could
    /// themselves be crossroad interior get logarithmically shortened: they
    /// are probably inner paths of one bigger crossroad.
    fn path_in_link(
        &self,
        graph: &StreetGraph,
        regions: &BTreeMap<RegionID, RegionEntry>,
        regions_by_node: &BTreeMap<NodeID, Vec<RegionID>>,
        l: RegionID,
        cr1: RegionID,
        cr2: RegionID,
    ) -> Option<(Vec<NodeID>, f64)> {
        let link_region = regions[&l].region();
        let contacts = |cr: RegionID| -> Vec<NodeID> {
            link_region
                .nodes
                .iter()
                .copied()
                .filter(|n| regions_by_node[n].contains(&cr))
                .collect()
        };

        let (path, mut distance) = link_region.shortest_path_between(
            graph,
            &contacts(cr1),
            &contacts(cr2),
            Some(&|g: &StreetGraph, n1, n2| g.distance_with_shortcut(n1, n2)),
        )?;

        if path.len() > 2 {
            let possible = path[1..path.len() - 1]
                .iter()
                .filter(|n| reliability::is_possible_crossroad(graph, **n))
                .count();
            if possible > 0 {
                distance /= (E * (possible as f64 + 1.0)).ln();
            }
        }
        Some((path, distance))
    }

    /// Pairs worth merging: at least two connecting paths, or one close one.
    pub fn pairs(&self) -> Vec<ConnectedPair> {
        self.connected
            .iter()
            .filter(|c| c.paths.len() >= 2 || (c.paths.len() == 1 && c.paths[0].close))
            .cloned()
            .collect()
    }

    fn connected_to(&self, cr: RegionID) -> Vec<(RegionID, Vec<ConnectionPath>)> {
        let mut result = Vec::new();
        for pair in &self.connected {
            if pair.a == cr {
                result.push((pair.b, pair.paths.clone()));
            } else if pair.b == cr {
                result.push((pair.a, pair.paths.clone()));
            }
        }
        result
    }

    /// Simple loops in the region-adjacency graph, up to `max_elements`
    /// crossroads, whose direct center-hop perimeter stays plausible for one
    /// big intersection. Deduplicated by crossroad set.
    pub fn cycles(&self, graph: &StreetGraph, max_elements: usize) -> Vec<RegionCycle> {
        let mut results = Vec::new();
        for &cr in &self.crossroads {
            results.extend(self.cycles_from(graph, cr, max_elements));
        }

        let mut unique = Vec::new();
        let mut seen: Vec<BTreeSet<RegionID>> = Vec::new();
        for cycle in results {
            let elems: BTreeSet<RegionID> = cycle.iter().map(|(rid, _)| *rid).collect();
            if !seen.contains(&elems) {
                seen.push(elems);
                unique.push(cycle);
            }
        }
        unique
    }

    fn cycles_from(&self, graph: &StreetGraph, cr: RegionID, max_elements: usize) -> Vec<RegionCycle> {
        let mut paths: Vec<RegionCycle> = vec![vec![(cr, Vec::new())]];
        let mut results = Vec::new();
        let max_perimeter = self.max_loop_distance(cr);

        for _ in 0..max_elements {
            let mut new_paths = Vec::new();
            for p in &paths {
                for (next, next_paths) in self.connected_to(p[p.len() - 1].0) {
                    let acceptable = p.len() == 1
                        || (p[p.len() - 2].0 != next && !intersects_path_links(&next_paths, p));
                    if !acceptable {
                        continue;
                    }
                    if next == p[0].0 {
                        let mut cycle = p.clone();
                        cycle.push((next, next_paths));
                        if self.cycle_direct_length(graph, &cycle) < max_perimeter {
                            results.push(cycle);
                        }
                    } else {
                        let mut longer = p.clone();
                        longer.push((next, next_paths));
                        new_paths.push(longer);
                    }
                }
            }
            paths = new_paths;
        }

        results
    }

    /// Perimeter estimate from the first path of every hop, endpoint to
    /// endpoint.
    fn cycle_direct_length(&self, graph: &StreetGraph, cycle: &RegionCycle) -> f64 {
        cycle
            .iter()
            .filter(|(_, paths)| !paths.is_empty())
            .map(|(_, paths)| {
                let p = &paths[0].path;
                graph.distance(p[0], p[p.len() - 1])
            })
            .sum()
    }
}

/// True if the candidate hop shares more than one node with the links the
/// tour already used: it would double back over the same corridor.
fn intersects_path_links(next_paths: &[ConnectionPath], tour: &RegionCycle) -> bool {
    let next_nodes: BTreeSet<NodeID> = next_paths
        .iter()
        .flat_map(|cp| cp.path.iter().copied())
        .collect();

    for (_, paths) in tour {
        for cp in paths {
            let shared = cp
                .path
                .iter()
                .filter(|n| next_nodes.contains(n))
                .count();
            if shared > 1 {
                return true;
            }
        }
    }
    false
}
