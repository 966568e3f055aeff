//! Labeled subgraphs: the unit the segmentation grows, merges, and rewrites.
//! A region owns ordered lists of node and edge ids; the graph's label
//! dictionaries mirror them, and only the operations here write those labels.

use geo::Point;
use petgraph::algo::astar;
use petgraph::graphmap::UnGraphMap;
use serde::{Deserialize, Serialize};

use crate::{NodeID, RegionID, StreetGraph};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegionKind {
    Plain,
    Crossroad,
    Link,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionID,
    pub kind: RegionKind,
    /// Insertion-ordered, duplicate-free.
    pub nodes: Vec<NodeID>,
    /// Insertion-ordered; an edge is stored once regardless of orientation.
    pub edges: Vec<(NodeID, NodeID)>,
}

impl Region {
    pub fn new(id: RegionID, kind: RegionKind) -> Self {
        Self {
            id,
            kind,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, graph: &mut StreetGraph, n: NodeID) {
        if !self.nodes.contains(&n) {
            self.nodes.push(n);
        }
        graph.set_node_region(n, self.id);
    }

    pub fn add_edge(&mut self, graph: &mut StreetGraph, n1: NodeID, n2: NodeID) {
        if !self.has_edge(n1, n2) {
            self.edges.push((n1, n2));
        }
        graph.set_edge_region(n1, n2, self.id);
    }

    pub fn add_path(&mut self, graph: &mut StreetGraph, path: &[NodeID]) {
        for n in path {
            self.add_node(graph, *n);
        }
        for w in path.windows(2) {
            self.add_edge(graph, w[0], w[1]);
        }
    }

    pub fn add_paths(&mut self, graph: &mut StreetGraph, paths: &[Vec<NodeID>]) {
        for path in paths {
            self.add_path(graph, path);
        }
    }

    /// Remove this region's labels from the graph. The region itself is
    /// expected to be dropped afterwards.
    pub fn clear_labels(&self, graph: &mut StreetGraph) {
        for (n1, n2) in &self.edges {
            graph.clear_edge_region(*n1, *n2);
        }
        for n in &self.nodes {
            graph.clear_node_region(*n);
        }
    }

    pub fn has_node(&self, n: NodeID) -> bool {
        self.nodes.contains(&n)
    }

    pub fn has_edge(&self, n1: NodeID, n2: NodeID) -> bool {
        self.edges.contains(&(n1, n2)) || self.edges.contains(&(n2, n1))
    }

    pub fn edges_with_node(&self, n: NodeID) -> Vec<(NodeID, NodeID)> {
        self.edges
            .iter()
            .filter(|(n1, n2)| *n1 == n || *n2 == n)
            .copied()
            .collect()
    }

    /// True if all nodes of `other` belong to this region.
    pub fn contains(&self, other: &Region) -> bool {
        other.nodes.iter().all(|n| self.has_node(*n))
    }

    /// A node with at least one incident edge outside the region.
    pub fn is_boundary_node(&self, graph: &StreetGraph, n: NodeID) -> bool {
        graph.degree(n) != self.edges_with_node(n).len()
    }

    pub fn boundary_nodes(&self, graph: &StreetGraph) -> Vec<NodeID> {
        self.nodes
            .iter()
            .copied()
            .filter(|n| self.is_boundary_node(graph, *n))
            .collect()
    }

    pub fn centroid(&self, graph: &StreetGraph) -> Point<f64> {
        graph.centroid(&self.nodes)
    }

    /// Max pairwise node distance. Quadratic, which is fine for
    /// intersection-sized regions.
    pub fn diameter(&self, graph: &StreetGraph) -> f64 {
        let mut result: f64 = 0.0;
        for n1 in &self.nodes {
            for n2 in &self.nodes {
                result = result.max(graph.distance(*n1, *n2));
            }
        }
        result
    }

    /// Shortest path staying on this region's edges, from any of `sources` to
    /// any of `targets`. Weights default to great-circle distance. Returns
    /// the path and its total weight, or None when the sets don't connect
    /// within three diameters.
    pub fn shortest_path_between(
        &self,
        graph: &StreetGraph,
        sources: &[NodeID],
        targets: &[NodeID],
        weight: Option<&dyn Fn(&StreetGraph, NodeID, NodeID) -> f64>,
    ) -> Option<(Vec<NodeID>, f64)> {
        if sources.is_empty() || targets.is_empty() {
            return None;
        }

        // Dijkstra via a zero-heuristic A*, with a virtual source (None)
        // fanning out to the whole source set.
        let mut pg: UnGraphMap<Option<NodeID>, f64> = UnGraphMap::new();
        for n in &self.nodes {
            pg.add_node(Some(*n));
        }
        for (n1, n2) in &self.edges {
            let w = match weight {
                Some(f) => f(graph, *n1, *n2),
                None => graph.distance(*n1, *n2),
            };
            pg.add_edge(Some(*n1), Some(*n2), w);
        }
        for s in sources {
            if self.has_node(*s) {
                pg.add_edge(None, Some(*s), 0.0);
            }
        }

        let (cost, path) = astar(
            &pg,
            None,
            |v| matches!(v, Some(n) if targets.contains(&n)),
            |(_, _, w)| *w,
            |_| 0.0,
        )?;

        // Large cutoff to allow for non-straight paths
        if cost > 3.0 * self.diameter(graph) {
            return None;
        }
        Some((path.into_iter().flatten().collect(), cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tags;

    fn chain(ids: &[u64]) -> (StreetGraph, Region) {
        let mut g = StreetGraph::new();
        for (i, id) in ids.iter().enumerate() {
            g.add_node(NodeID(*id), 3.09 + 0.001 * i as f64, 45.77, Tags::empty());
        }
        let mut region = Region::new(RegionID(0), RegionKind::Plain);
        for w in ids.windows(2) {
            g.add_edge(NodeID(w[0]), NodeID(w[1]), Tags::empty());
        }
        let path: Vec<NodeID> = ids.iter().map(|id| NodeID(*id)).collect();
        region.add_path(&mut g, &path);
        (g, region)
    }

    #[test]
    fn labels_follow_membership() {
        let (mut g, region) = chain(&[1, 2, 3]);
        for n in &region.nodes {
            assert_eq!(g.node_region(*n), Some(region.id));
        }
        assert_eq!(g.edge_region(NodeID(2), NodeID(1)), Some(region.id));

        region.clear_labels(&mut g);
        assert_eq!(g.node_region(NodeID(2)), None);
        assert_eq!(g.edge_region(NodeID(1), NodeID(2)), None);
    }

    #[test]
    fn add_path_is_idempotent() {
        let (mut g, mut region) = chain(&[1, 2, 3]);
        let before = region.clone();
        region.add_path(&mut g, &[NodeID(1), NodeID(2), NodeID(3)]);
        assert_eq!(before, region);
    }

    #[test]
    fn endpoints_of_a_chain_are_boundaries() {
        let (g, region) = chain(&[1, 2, 3]);
        assert_eq!(region.boundary_nodes(&g), Vec::<NodeID>::new());
        // Attach an extra edge outside the region: node 3 becomes a boundary
        let (mut g, region) = chain(&[1, 2, 3]);
        g.add_node(NodeID(9), 3.094, 45.77, Tags::empty());
        g.add_edge(NodeID(3), NodeID(9), Tags::empty());
        assert_eq!(region.boundary_nodes(&g), vec![NodeID(3)]);
    }

    #[test]
    fn shortest_path_stays_in_region() {
        let (g, region) = chain(&[1, 2, 3, 4]);
        let (path, cost) = region
            .shortest_path_between(&g, &[NodeID(1)], &[NodeID(4)], None)
            .unwrap();
        assert_eq!(path, vec![NodeID(1), NodeID(2), NodeID(3), NodeID(4)]);
        assert!(cost > 0.0);

        // Unreachable target set
        assert!(region
            .shortest_path_between(&g, &[NodeID(1)], &[NodeID(99)], None)
            .is_none());
    }
}
