//! Assembling the intersection model from a graph and one segmentation
//! document: junctions, ways with channels, clockwise-numbered branches,
//! then sidewalks, islands, and crossings.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use geo::Point;

use crate::model::{
    crossings, pedestrian, synthesize_channels, walk, Branch, Intersection, JunctionTable, Way,
    UNNAMED_STREET,
};
use crate::{geometry, osm, read_segmentation, NodeID, SegmentedCrossroad, StreetGraph};

impl Intersection {
    /// Build the model for the first crossroad of a segmentation file.
    pub fn from_json(graph: &StreetGraph, json: &str) -> Result<Intersection> {
        let crossroads = read_segmentation(json)?;
        Self::build(graph, &crossroads[0])
    }

    pub fn build(graph: &StreetGraph, seg: &SegmentedCrossroad) -> Result<Intersection> {
        seg.check_against_graph(graph)?;

        let border_set: BTreeSet<NodeID> = seg.border_nodes.iter().copied().collect();
        let crossroad_set: BTreeSet<NodeID> = seg
            .inner_nodes
            .iter()
            .chain(seg.border_nodes.iter())
            .copied()
            .collect();

        // intersection center, as the mean of the border nodes
        let border_points: Vec<Point<f64>> =
            seg.border_nodes.iter().map(|n| graph.point(*n)).collect();
        let center = geometry::centroid(&border_points);

        // junctions for the crossroad nodes and the branch externals
        let mut junctions = JunctionTable::new();
        let mut externals: BTreeSet<NodeID> = BTreeSet::new();
        for n in crossroad_set.iter() {
            let node = graph.node(*n);
            junctions.get_or_create(*n, node.x, node.y, &node.tags);
        }
        for branch in &seg.branches {
            for n in &branch.border_nodes {
                if !crossroad_set.contains(n) {
                    externals.insert(*n);
                    let node = graph.node(*n);
                    junctions.get_or_create(*n, node.x, node.y, &node.tags);
                }
            }
        }

        // ways: crossroad edges keep their direction as stored; branch edges
        // resolve in/out against the border set
        let mut ways: BTreeMap<String, Way> = BTreeMap::new();
        for (n1, n2) in &seg.edges_by_nodes {
            let way = create_way(&mut junctions, graph, *n1, *n2, None)?;
            ways.insert(way.id.clone(), way);
        }
        for branch in &seg.branches {
            for (n1, n2) in &branch.edges_by_nodes {
                let way = create_way(&mut junctions, graph, *n1, *n2, Some(&border_set))?;
                ways.insert(way.id.clone(), way);
            }
        }

        // the border walk drives branch ordering and sidewalk detection
        let subgraph = walk::WaySubgraph::new(graph, &ways);
        let (mut branches, border_walk) = match walk::border_walk(&subgraph, &externals) {
            Ok(path) => {
                let ordered = walk::branch_ways_in_walk(&path, &seg.branches, &ways);
                let mut by_branch: BTreeMap<usize, Vec<String>> = BTreeMap::new();
                let mut branch_order: Vec<usize> = Vec::new();
                for entry in ordered {
                    if !branch_order.contains(&entry.branch_id) {
                        branch_order.push(entry.branch_id);
                    }
                    by_branch.entry(entry.branch_id).or_default().push(entry.way_id);
                }
                let branches: Vec<Branch> = branch_order
                    .into_iter()
                    .map(|id| {
                        assemble_branch(
                            graph,
                            id,
                            by_branch.remove(&id).unwrap(),
                            &ways,
                            &crossroad_set,
                            center,
                        )
                    })
                    .collect();
                (branches, Some(path))
            }
            Err(err) => {
                warn!("{}; falling back to segmentation branch order", err);
                let branches: Vec<Branch> = seg
                    .branches
                    .iter()
                    .map(|b| {
                        let way_ids: Vec<String> = b
                            .edges_by_nodes
                            .iter()
                            .filter_map(|(n1, n2)| pedestrian::find_way_key(&ways, *n1, *n2))
                            .collect();
                        assemble_branch(graph, b.id, way_ids, &ways, &crossroad_set, center)
                    })
                    .collect();
                (branches, None)
            }
        };

        // shift so the branch nearest to north comes first, then number
        rotate_to_north(&mut branches);
        for (i, branch) in branches.iter_mut().enumerate() {
            branch.number = i + 1;
        }

        // sidewalks, one per stretch of the walk between two branches
        let mut sidewalk_count = 0;
        if let Some(path) = &border_walk {
            let sidewalk_nodes = pedestrian::sidewalk_nodes(&branches, &ways, &border_set);
            for (id, sidewalk) in pedestrian::sidewalk_paths(path, &sidewalk_nodes)
                .iter()
                .enumerate()
            {
                pedestrian::map_sidewalk_onto_ways(id, sidewalk, &mut ways, &mut junctions);
                sidewalk_count += 1;
            }
        }

        // islands: inner faces, clockwise
        for (id, island) in pedestrian::island_paths(graph, &ways, &branches, &border_set)
            .iter()
            .enumerate()
        {
            pedestrian::map_island_onto_ways(id, island, &mut ways, &mut junctions);
        }

        // crossings over the pedestrian dual graph
        let crossings_map = crossings::build_crossings(&junctions, &border_set, sidewalk_count);
        crossings::attach_crossings_to_branches(&mut branches, &ways, &crossings_map, &junctions);

        // the model keeps the crossroad's own junctions; externals were only
        // needed to wire up ways and crossings
        let junctions = junctions
            .into_map()
            .into_iter()
            .filter(|(id, _)| crossroad_set.contains(id))
            .collect();

        Ok(Intersection {
            center: (center.x(), center.y()),
            branches,
            junctions,
            ways,
            crossings: crossings_map,
        })
    }
}

/// Create the `Way` for one edge. The stored endpoint order of the graph is
/// the way's direction; asking for the reverse orientation silently flips.
fn create_way(
    junctions: &mut JunctionTable,
    graph: &StreetGraph,
    n1: NodeID,
    n2: NodeID,
    border_nodes: Option<&BTreeSet<NodeID>>,
) -> Result<Way> {
    let Some(edge) = graph.edge(n1, n2) else {
        bail!(crate::CrossroadError::MalformedSegmentation(format!(
            "edge {}-{} is not part of the graph",
            n1, n2
        )));
    };
    if edge.n1 != n1 {
        debug!("edge {}-{} stored in reverse, following the stored direction", n1, n2);
    }
    let (n1, n2) = (edge.n1, edge.n2);

    for id in [n1, n2] {
        let node = graph.node(id);
        junctions.get_or_create(id, node.x, node.y, &node.tags);
    }

    let name = edge
        .tags
        .get(osm::NAME)
        .cloned()
        .unwrap_or_else(|| UNNAMED_STREET.to_string());

    // drawn leaving the intersection iff the second junction is a border node
    let way_out = border_nodes.map(|border| border.contains(&n2));
    let channels = synthesize_channels(&edge.tags, way_out);

    Ok(Way {
        id: Way::key(n1, n2),
        name,
        junctions: [n1, n2],
        channels,
        sidewalks: [None, None],
        islands: [None, None],
    })
}

/// Build one branch: ways sorted by the azimuth of their outer node, angle
/// as the wrapped mean azimuth of all way junctions, street name from the
/// middle way.
fn assemble_branch(
    graph: &StreetGraph,
    id: usize,
    mut way_ids: Vec<String>,
    ways: &BTreeMap<String, Way>,
    crossroad_set: &BTreeSet<NodeID>,
    center: Point<f64>,
) -> Branch {
    // sort ways around the branch; bearings straddling north get unwrapped
    let outer_azimuth = |way_id: &String| -> f64 {
        let way = &ways[way_id];
        let outer = way
            .junctions
            .iter()
            .copied()
            .find(|n| !crossroad_set.contains(n))
            .unwrap_or(way.junctions[1]);
        geometry::azimuth(center, graph.point(outer))
    };
    let azimuths: Vec<f64> = way_ids.iter().map(outer_azimuth).collect();
    let straddles = azimuths.iter().any(|a| *a >= 270.0) && azimuths.iter().any(|a| *a < 90.0);
    let mut keyed: Vec<(f64, String)> = way_ids
        .drain(..)
        .zip(azimuths)
        .map(|(way_id, azimuth)| {
            let azimuth = if straddles && azimuth >= 270.0 {
                azimuth - 360.0
            } else {
                azimuth
            };
            (azimuth, way_id)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
    let way_ids: Vec<String> = keyed.into_iter().map(|(_, id)| id).collect();

    // branch angle: mean azimuth of the way junctions from the center
    let mut junction_nodes: Vec<NodeID> = Vec::new();
    for way_id in &way_ids {
        for n in ways[way_id].junctions {
            if !junction_nodes.contains(&n) {
                junction_nodes.push(n);
            }
        }
    }
    let mut angle_sum = 0.0;
    for n in &junction_nodes {
        let mut angle = geometry::azimuth(center, graph.point(*n));
        // angles near 0° count negative so the mean doesn't wrap
        if angle > 315.0 {
            angle -= 360.0;
        }
        angle_sum += angle;
    }
    let angle = if junction_nodes.is_empty() {
        0.0
    } else {
        angle_sum / junction_nodes.len() as f64
    };

    // the middle way names the branch
    let street_name = if way_ids.is_empty() {
        split_street_name(UNNAMED_STREET)
    } else {
        split_street_name(&ways[&way_ids[way_ids.len() / 2]].name)
    };

    Branch {
        id,
        number: 0,
        angle,
        street_name,
        ways: way_ids,
        crossing: None,
    }
}

/// "rue de la République" -> ("rue", "de la République")
fn split_street_name(name: &str) -> (String, String) {
    let mut words = name.split(' ');
    let head = words.next().unwrap_or_default().to_lowercase();
    let rest = words.collect::<Vec<_>>().join(" ");
    (head, rest)
}

/// Rotate the branch list so the one nearest to north (by wrapped angle)
/// leads. The cyclic clockwise order is preserved.
fn rotate_to_north(branches: &mut Vec<Branch>) {
    if branches.is_empty() {
        return;
    }
    let mut min_idx = 0;
    let mut max_idx = 0;
    for (i, branch) in branches.iter().enumerate() {
        if branch.angle < branches[min_idx].angle {
            min_idx = i;
        }
        if branch.angle > branches[max_idx].angle {
            max_idx = i;
        }
    }
    let index = if 360.0 - branches[max_idx].angle < branches[min_idx].angle {
        max_idx
    } else {
        min_idx
    };
    branches.rotate_left(index);
}
