//! Reading and writing segmentation documents: the JSON interchange format
//! between the segmentation stage and the enrichment stage. A document is
//! one "crossroad" entry plus any number of "branch" entries; a file holds
//! either one document or a list of them.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{Crossroad, CrossroadError, NodeID, StreetGraph};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EntryNodes {
    inner: Vec<u64>,
    border: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Coordinate {
    x: f64,
    y: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SegmentationEntry {
    Crossroad {
        nodes: EntryNodes,
        edges_by_nodes: Vec<(u64, u64)>,
        coordinates: BTreeMap<String, Coordinate>,
    },
    Branch {
        nodes: EntryNodes,
        edges_by_nodes: Vec<(u64, u64)>,
        coordinates: BTreeMap<String, Coordinate>,
    },
}

/// One parsed segmentation document.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentedCrossroad {
    pub inner_nodes: Vec<NodeID>,
    pub border_nodes: Vec<NodeID>,
    pub edges_by_nodes: Vec<(NodeID, NodeID)>,
    /// Coordinates for every node the document references (x = lon, y = lat).
    pub coordinates: BTreeMap<NodeID, (f64, f64)>,
    pub branches: Vec<SegmentedBranch>,
}

/// A branch entry. `id` is 1-based, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentedBranch {
    pub id: usize,
    pub inner_nodes: Vec<NodeID>,
    pub border_nodes: Vec<NodeID>,
    pub edges_by_nodes: Vec<(NodeID, NodeID)>,
}

/// Parse a segmentation file. Accepts a single document (`[entries...]`) or
/// several (`[[entries...], ...]`).
pub fn read_segmentation(json: &str) -> Result<Vec<SegmentedCrossroad>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CrossroadError::MalformedSegmentation(e.to_string()))?;

    if !value.is_array() {
        bail!(CrossroadError::MalformedSegmentation(
            "expected a JSON array".to_string()
        ));
    }
    let nested = value
        .as_array()
        .and_then(|items| items.first())
        .map_or(false, |first| first.is_array());

    let documents: Vec<Vec<SegmentationEntry>> = if nested {
        serde_json::from_value(value)
            .map_err(|e| CrossroadError::MalformedSegmentation(e.to_string()))?
    } else {
        vec![serde_json::from_value(value)
            .map_err(|e| CrossroadError::MalformedSegmentation(e.to_string()))?]
    };

    documents.into_iter().map(read_document).collect()
}

fn read_document(entries: Vec<SegmentationEntry>) -> Result<SegmentedCrossroad> {
    let mut crossroad: Option<SegmentedCrossroad> = None;
    let mut branches = Vec::new();
    let mut coordinates = BTreeMap::new();
    let mut next_branch_id = 1;

    for entry in entries {
        match entry {
            SegmentationEntry::Crossroad {
                nodes,
                edges_by_nodes,
                coordinates: coords,
            } => {
                if crossroad.is_some() {
                    bail!(CrossroadError::MalformedSegmentation(
                        "more than one crossroad entry in a document".to_string()
                    ));
                }
                merge_coordinates(&mut coordinates, coords)?;
                crossroad = Some(SegmentedCrossroad {
                    inner_nodes: nodes.inner.into_iter().map(NodeID).collect(),
                    border_nodes: nodes.border.into_iter().map(NodeID).collect(),
                    edges_by_nodes: edges_by_nodes
                        .into_iter()
                        .map(|(a, b)| (NodeID(a), NodeID(b)))
                        .collect(),
                    coordinates: BTreeMap::new(),
                    branches: Vec::new(),
                });
            }
            SegmentationEntry::Branch {
                nodes,
                edges_by_nodes,
                coordinates: coords,
            } => {
                merge_coordinates(&mut coordinates, coords)?;
                branches.push(SegmentedBranch {
                    id: next_branch_id,
                    inner_nodes: nodes.inner.into_iter().map(NodeID).collect(),
                    border_nodes: nodes.border.into_iter().map(NodeID).collect(),
                    edges_by_nodes: edges_by_nodes
                        .into_iter()
                        .map(|(a, b)| (NodeID(a), NodeID(b)))
                        .collect(),
                });
                next_branch_id += 1;
            }
        }
    }

    let Some(mut crossroad) = crossroad else {
        bail!(CrossroadError::MalformedSegmentation(
            "no entry of type \"crossroad\"".to_string()
        ));
    };
    crossroad.branches = branches;
    crossroad.coordinates = coordinates;

    // every referenced node must have a coordinate
    let referenced = crossroad.referenced_nodes();
    for n in referenced {
        if !crossroad.coordinates.contains_key(&n) {
            bail!(CrossroadError::MalformedSegmentation(format!(
                "{} referenced without coordinates",
                n
            )));
        }
    }

    Ok(crossroad)
}

fn merge_coordinates(
    into: &mut BTreeMap<NodeID, (f64, f64)>,
    coords: BTreeMap<String, Coordinate>,
) -> Result<()> {
    for (key, c) in coords {
        let id: u64 = key.parse().map_err(|_| {
            CrossroadError::MalformedSegmentation(format!("bad node id {:?}", key))
        })?;
        into.insert(NodeID(id), (c.x, c.y));
    }
    Ok(())
}

impl SegmentedCrossroad {
    /// Every node id the document mentions, in id order.
    pub fn referenced_nodes(&self) -> BTreeSet<NodeID> {
        let mut result: BTreeSet<NodeID> = BTreeSet::new();
        result.extend(self.inner_nodes.iter().copied());
        result.extend(self.border_nodes.iter().copied());
        for (a, b) in &self.edges_by_nodes {
            result.insert(*a);
            result.insert(*b);
        }
        for branch in &self.branches {
            result.extend(branch.inner_nodes.iter().copied());
            result.extend(branch.border_nodes.iter().copied());
            for (a, b) in &branch.edges_by_nodes {
                result.insert(*a);
                result.insert(*b);
            }
        }
        result
    }

    /// All nodes must exist in the graph the enrichment will run against.
    pub fn check_against_graph(&self, graph: &StreetGraph) -> Result<()> {
        for n in self.referenced_nodes() {
            if !graph.has_node(n) {
                bail!(CrossroadError::MalformedSegmentation(format!(
                    "{} is not part of the graph",
                    n
                )));
            }
        }
        Ok(())
    }
}

fn entry_for_region(
    graph: &StreetGraph,
    crossroad: &Crossroad,
) -> SegmentationEntry {
    let mut inner = Vec::new();
    let mut border = Vec::new();
    for n in &crossroad.region.nodes {
        if crossroad.region.is_boundary_node(graph, *n) {
            border.push(n.0);
        } else {
            inner.push(n.0);
        }
    }
    let coordinates = coordinates_for(graph, inner.iter().chain(border.iter()).copied());
    SegmentationEntry::Crossroad {
        nodes: EntryNodes { inner, border },
        edges_by_nodes: crossroad
            .region
            .edges
            .iter()
            .map(|(a, b)| (a.0, b.0))
            .collect(),
        coordinates,
    }
}

fn entry_for_branch(graph: &StreetGraph, branch: &[crate::LaneDescription]) -> SegmentationEntry {
    let mut nodes: BTreeSet<u64> = BTreeSet::new();
    for lane in branch {
        nodes.insert(lane.edge.0 .0);
        nodes.insert(lane.edge.1 .0);
    }
    let coordinates = coordinates_for(graph, nodes.iter().copied());
    SegmentationEntry::Branch {
        nodes: EntryNodes {
            inner: Vec::new(),
            border: nodes.into_iter().collect(),
        },
        edges_by_nodes: branch.iter().map(|l| (l.edge.0 .0, l.edge.1 .0)).collect(),
        coordinates,
    }
}

fn coordinates_for(
    graph: &StreetGraph,
    nodes: impl Iterator<Item = u64>,
) -> BTreeMap<String, Coordinate> {
    nodes
        .map(|id| {
            let node = graph.node(NodeID(id));
            (id.to_string(), Coordinate { x: node.x, y: node.y })
        })
        .collect()
}

/// Emit the segmentation document(s) for the given crossroads: the exact
/// inverse of `read_segmentation`. One crossroad produces a single document;
/// several produce a list of documents.
pub fn write_segmentation(graph: &StreetGraph, crossroads: &[&Crossroad]) -> Result<String> {
    let documents: Vec<Vec<SegmentationEntry>> = crossroads
        .iter()
        .map(|cr| {
            let mut entries = vec![entry_for_region(graph, cr)];
            for branch in &cr.branches {
                entries.push(entry_for_branch(graph, branch));
            }
            entries
        })
        .collect();

    let out = if documents.len() == 1 {
        serde_json::to_string(&documents[0])?
    } else {
        serde_json::to_string(&documents)?
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"[
        {"type": "crossroad",
         "nodes": {"inner": [1], "border": [2, 3]},
         "edges_by_nodes": [[1, 2], [1, 3]],
         "coordinates": {"1": {"x": 3.091, "y": 45.773},
                         "2": {"x": 3.090, "y": 45.773},
                         "3": {"x": 3.092, "y": 45.773}}},
        {"type": "branch",
         "nodes": {"inner": [], "border": [2, 4]},
         "edges_by_nodes": [[2, 4]],
         "coordinates": {"2": {"x": 3.090, "y": 45.773},
                         "4": {"x": 3.089, "y": 45.773}}}
    ]"#;

    #[test]
    fn reads_single_document() {
        let crossroads = read_segmentation(DOC).unwrap();
        assert_eq!(crossroads.len(), 1);
        let cr = &crossroads[0];
        assert_eq!(cr.inner_nodes, vec![NodeID(1)]);
        assert_eq!(cr.border_nodes, vec![NodeID(2), NodeID(3)]);
        assert_eq!(cr.branches.len(), 1);
        assert_eq!(cr.branches[0].id, 1);
        assert_eq!(cr.coordinates[&NodeID(4)], (3.089, 45.773));
    }

    #[test]
    fn reads_list_of_documents() {
        let both = format!("[{}, {}]", DOC, DOC);
        let crossroads = read_segmentation(&both).unwrap();
        assert_eq!(crossroads.len(), 2);
        assert_eq!(crossroads[0], crossroads[1]);
    }

    #[test]
    fn missing_crossroad_entry_is_malformed() {
        let json = r#"[{"type": "branch",
                        "nodes": {"inner": [], "border": [2]},
                        "edges_by_nodes": [],
                        "coordinates": {"2": {"x": 0.0, "y": 0.0}}}]"#;
        let err = read_segmentation(json).unwrap_err();
        assert!(err.to_string().contains("malformed segmentation"));
    }

    #[test]
    fn unreferenced_coordinates_are_malformed() {
        let json = r#"[{"type": "crossroad",
                        "nodes": {"inner": [1], "border": [2]},
                        "edges_by_nodes": [[1, 2]],
                        "coordinates": {"1": {"x": 0.0, "y": 0.0}}}]"#;
        assert!(read_segmentation(json).is_err());
    }
}
