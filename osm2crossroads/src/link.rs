//! Link regions: the narrow leftover corridors between crossroads. They seed
//! on the unlabeled edges hanging off a crossroad boundary and soak up
//! unlabeled graph until they dead-end or bump into another region.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NodeID, Region, RegionID, RegionIds, RegionKind, StreetGraph};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Link {
    pub region: Region,
    /// True when construction stopped at a node some other region already
    /// labeled, meaning this link actually reaches somewhere.
    pub filled: bool,
}

impl Link {
    pub fn id(&self) -> RegionID {
        self.region.id
    }

    /// A link holding a single boundary node with nowhere to go.
    pub fn single_node(graph: &mut StreetGraph, ids: &mut RegionIds, n: NodeID) -> Self {
        let mut link = Self {
            region: Region::new(ids.next_id(), RegionKind::Link),
            filled: false,
        };
        link.region.add_node(graph, n);
        link
    }

    /// Seed on the edge `(n1, n2)` and propagate.
    pub fn from_edge(graph: &mut StreetGraph, ids: &mut RegionIds, n1: NodeID, n2: NodeID) -> Self {
        let mut link = Self {
            region: Region::new(ids.next_id(), RegionKind::Link),
            filled: false,
        };
        link.region.add_node(graph, n1);
        if graph.node_region(n2).is_some() {
            link.filled = true;
        }
        link.region.add_node(graph, n2);
        link.region.add_edge(graph, n1, n2);
        if !link.filled {
            link.propagate_from(graph, n2);
        }
        link
    }

    fn propagate_from(&mut self, graph: &mut StreetGraph, start: NodeID) {
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for nb in graph.neighbors(current) {
                if graph.edge_region(current, nb).is_none() {
                    let open = graph.node_region(nb).is_none();
                    self.region.add_node(graph, nb);
                    self.region.add_edge(graph, current, nb);
                    if open {
                        stack.push(nb);
                    }
                }
            }
        }
    }
}

/// One link region per unlabeled edge leaving a crossroad boundary, plus a
/// single-node link for each boundary node that has no way out.
pub fn build_links_between_crossroads(
    graph: &mut StreetGraph,
    crossroads: &[&Region],
    ids: &mut RegionIds,
) -> BTreeMap<RegionID, Link> {
    let mut links: BTreeMap<RegionID, Link> = BTreeMap::new();

    for crossroad in crossroads {
        for b in crossroad.boundary_nodes(graph) {
            if graph.has_unlabeled_incident_edge(b) {
                for nb in graph.neighbors(b) {
                    if graph.edge_region(b, nb).is_none() {
                        let link = Link::from_edge(graph, ids, b, nb);
                        links.insert(link.id(), link);
                    }
                }
            } else if !links.values().any(|l| l.region.has_node(b)) {
                let link = Link::single_node(graph, ids, b);
                links.insert(link.id(), link);
            }
        }
    }

    links
}
