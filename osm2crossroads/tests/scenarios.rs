//! End-to-end scenarios: build a small street graph in memory, segment it,
//! round-trip the segmentation document, and enrich the intersection model.

use std::collections::BTreeSet;

use osm2crossroads::model::{ChannelDirection, ChannelKind, Intersection};
use osm2crossroads::{
    read_segmentation, write_segmentation, NodeID, RegionEntry, Segmentation, SegmentationOptions,
    StreetGraph, Tags,
};

const BASE_LON: f64 = 3.0910;
const BASE_LAT: f64 = 45.7730;

fn tags(kv: &[(&str, &str)]) -> Tags {
    kv.iter().copied().collect()
}

/// Place a node `east`/`north` metres from the base coordinate.
fn add_node(graph: &mut StreetGraph, id: u64, east: f64, north: f64, t: Tags) {
    let lat = BASE_LAT + north / 111_320.0;
    let lon = BASE_LON + east / (111_320.0 * BASE_LAT.to_radians().cos());
    graph.add_node(NodeID(id), lon, lat, t);
}

fn n(id: u64) -> NodeID {
    NodeID(id)
}

fn process(graph: StreetGraph) -> Segmentation {
    let mut seg = Segmentation::new(graph, SegmentationOptions::default());
    seg.process();
    seg
}

fn crossroad_count(seg: &Segmentation) -> usize {
    seg.regions.values().filter(|e| e.is_crossroad()).count()
}

/// A + of two streets: "Rue X" east-west, "Rue Y" north-south, every border
/// node a crossing, untagged degree-4 center.
fn four_way_graph() -> StreetGraph {
    let mut g = StreetGraph::new();
    add_node(&mut g, 1, 0.0, 0.0, Tags::empty());
    add_node(&mut g, 2, 0.0, 8.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 3, 8.0, 0.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 4, 0.0, -8.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 5, -8.0, 0.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 6, 0.0, 25.0, Tags::empty());
    add_node(&mut g, 7, 25.0, 0.0, Tags::empty());
    add_node(&mut g, 8, 0.0, -25.0, Tags::empty());
    add_node(&mut g, 9, -25.0, 0.0, Tags::empty());

    let street = |name: &'static str| {
        tags(&[
            ("highway", "residential"),
            ("name", name),
            ("lanes:backward", "1"),
            ("lanes:forward", "1"),
        ])
    };
    for (n1, n2, name) in [
        (1, 2, "Rue Y"),
        (2, 6, "Rue Y"),
        (1, 4, "Rue Y"),
        (4, 8, "Rue Y"),
        (1, 3, "Rue X"),
        (3, 7, "Rue X"),
        (1, 5, "Rue X"),
        (5, 9, "Rue X"),
    ] {
        g.add_edge(n(n1), n(n2), street(name));
    }
    g
}

#[test]
fn four_way_segmentation() {
    let seg = process(four_way_graph());

    assert_eq!(crossroad_count(&seg), 1);
    let crossroad = seg
        .get_crossroad(BASE_LAT, BASE_LON, false)
        .expect("a crossroad near the query point")[0];
    assert_eq!(crossroad.center, n(1));
    assert_eq!(
        crossroad.region.nodes.iter().copied().collect::<BTreeSet<_>>(),
        [1, 2, 3, 4, 5].iter().map(|id| n(*id)).collect()
    );
    assert_eq!(crossroad.branches.len(), 4);

    // labels and region membership agree both ways
    for node in &crossroad.region.nodes {
        assert_eq!(seg.graph.node_region(*node), Some(crossroad.id()));
    }
    for node in seg.graph.node_ids() {
        if seg.graph.node_region(node) == Some(crossroad.id()) {
            assert!(crossroad.region.has_node(node));
        }
    }
}

#[test]
fn four_way_segmentation_roundtrip() {
    let seg = process(four_way_graph());
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];

    let json = write_segmentation(&seg.graph, &[crossroad]).unwrap();
    let parsed = read_segmentation(&json).unwrap();
    assert_eq!(parsed.len(), 1);
    let doc = &parsed[0];

    assert_eq!(doc.inner_nodes, vec![n(1)]);
    assert_eq!(
        doc.border_nodes.iter().copied().collect::<BTreeSet<_>>(),
        [2, 3, 4, 5].iter().map(|id| n(*id)).collect()
    );
    assert_eq!(doc.edges_by_nodes.len(), 4);
    assert_eq!(doc.branches.len(), 4);
    for branch in &doc.branches {
        assert_eq!(branch.edges_by_nodes.len(), 1);
    }
}

#[test]
fn four_way_rebuild_from_labels() {
    let seg = process(four_way_graph());
    let original = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];
    let original_nodes: BTreeSet<NodeID> = original.region.nodes.iter().copied().collect();
    let original_edges: BTreeSet<(NodeID, NodeID)> = original
        .region
        .edges
        .iter()
        .map(|(a, b)| if a <= b { (*a, *b) } else { (*b, *a) })
        .collect();

    let rebuilt = Segmentation::new(
        seg.graph.clone(),
        SegmentationOptions {
            init: false,
            ..SegmentationOptions::default()
        },
    );
    assert_eq!(crossroad_count(&rebuilt), 1);
    let entry = rebuilt
        .regions
        .values()
        .find(|e| e.is_crossroad())
        .and_then(RegionEntry::as_crossroad)
        .unwrap();
    assert_eq!(
        entry.region.nodes.iter().copied().collect::<BTreeSet<_>>(),
        original_nodes
    );
    assert_eq!(
        entry
            .region
            .edges
            .iter()
            .map(|(a, b)| if a <= b { (*a, *b) } else { (*b, *a) })
            .collect::<BTreeSet<_>>(),
        original_edges
    );
}

#[test]
fn four_way_intersection_model() {
    let seg = process(four_way_graph());
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];
    let json = write_segmentation(&seg.graph, &[crossroad]).unwrap();
    let model = Intersection::from_json(&seg.graph, &json).unwrap();

    // four branches, numbered clockwise from north
    assert_eq!(model.branches.len(), 4);
    let numbers: Vec<usize> = model.branches.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    let names: Vec<&str> = model
        .branches
        .iter()
        .map(|b| b.street_name.1.as_str())
        .collect();
    assert_eq!(names, vec!["Y", "X", "Y", "X"]);
    for window in model.branches.windows(2) {
        assert!(window[0].angle < window[1].angle);
    }

    // every branch way carries one channel per direction
    for branch in &model.branches {
        for way_id in &branch.ways {
            let way = &model.ways[way_id];
            assert_eq!(way.channels.len(), 2);
            assert!(way
                .channels
                .iter()
                .any(|c| c.direction == ChannelDirection::In));
            assert!(way
                .channels
                .iter()
                .any(|c| c.direction == ChannelDirection::Out));
        }
    }

    // four sidewalks, no islands
    let sidewalks: BTreeSet<usize> = model
        .ways
        .values()
        .flat_map(|w| w.sidewalks.iter().flatten().copied())
        .collect();
    assert_eq!(sidewalks.len(), 4);
    assert!(model
        .ways
        .values()
        .all(|w| w.islands.iter().all(Option::is_none)));

    // four single-crosswalk crossings, one per branch
    assert_eq!(model.crossings.len(), 4);
    for crossing in model.crossings.values() {
        assert_eq!(crossing.crosswalks.len(), 1);
    }
    for branch in &model.branches {
        let crossing_id = branch.crossing.as_ref().expect("branch has a crossing");
        assert!(model.crossings.contains_key(crossing_id));
    }

    // slots never point both sides at the same object
    for way in model.ways.values() {
        if let [Some(left), Some(right)] = way.sidewalks {
            assert_ne!(left, right);
        }
    }
}

/// "rue X" names here are checked as the second element of the split.
#[test]
fn four_way_street_name_split() {
    let seg = process(four_way_graph());
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];
    let json = write_segmentation(&seg.graph, &[crossroad]).unwrap();
    let model = Intersection::from_json(&seg.graph, &json).unwrap();
    assert_eq!(model.branches[0].street_name.0, "rue");
}

/// T-junction: two-way "Main St" east-west, a one-way two-lane unnamed stem
/// to the south.
fn t_junction_graph() -> StreetGraph {
    let mut g = StreetGraph::new();
    add_node(&mut g, 1, 0.0, 0.0, Tags::empty());
    add_node(&mut g, 2, -8.0, 0.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 3, 8.0, 0.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 4, 0.0, -8.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 5, -25.0, 0.0, Tags::empty());
    add_node(&mut g, 6, 25.0, 0.0, Tags::empty());
    add_node(&mut g, 7, 0.0, -25.0, Tags::empty());

    let main = tags(&[
        ("highway", "residential"),
        ("name", "Main St"),
        ("oneway", "no"),
    ]);
    let stem = tags(&[
        ("highway", "residential"),
        ("oneway", "yes"),
        ("lanes", "2"),
    ]);
    g.add_edge(n(1), n(2), main.clone());
    g.add_edge(n(2), n(5), main.clone());
    g.add_edge(n(1), n(3), main.clone());
    g.add_edge(n(3), n(6), main);
    g.add_edge(n(1), n(4), stem.clone());
    // stored pointing at the intersection, so its lanes leave it
    g.add_edge(n(7), n(4), stem);
    g
}

#[test]
fn t_junction_lane_synthesis() {
    let seg = process(t_junction_graph());
    assert_eq!(crossroad_count(&seg), 1);
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];
    assert_eq!(crossroad.branches.len(), 3);

    let json = write_segmentation(&seg.graph, &[crossroad]).unwrap();
    let model = Intersection::from_json(&seg.graph, &json).unwrap();
    assert_eq!(model.branches.len(), 3);

    // the unnamed stem renders with the placeholder name
    let stem = model
        .branches
        .iter()
        .find(|b| b.street_name == ("rue".to_string(), "qui n'a pas de nom".to_string()))
        .expect("the stem branch has the placeholder name");

    // oneway stem: two outgoing channels, nothing incoming
    let stem_way = &model.ways[&stem.ways[0]];
    assert_eq!(stem_way.channels.len(), 2);
    assert!(stem_way
        .channels
        .iter()
        .all(|c| c.kind == ChannelKind::Road && c.direction == ChannelDirection::Out));

    // the crossing street gets the default one-in one-out pair
    let main = model
        .branches
        .iter()
        .find(|b| b.street_name.1 == "St" && b.number == 1)
        .expect("a Main St branch");
    let main_way = &model.ways[&main.ways[0]];
    assert_eq!(main_way.channels.len(), 2);
    assert!(main_way
        .channels
        .iter()
        .any(|c| c.direction == ChannelDirection::In));
    assert!(main_way
        .channels
        .iter()
        .any(|c| c.direction == ChannelDirection::Out));
}

/// Dog-bone: two T-ish junctions 20 m apart, both carrying "Avenue A"
/// orthogonally to the connecting "Rue B".
fn dog_bone_graph() -> StreetGraph {
    let mut g = StreetGraph::new();
    add_node(&mut g, 1, 0.0, 0.0, Tags::empty());
    add_node(&mut g, 2, 20.0, 0.0, Tags::empty());
    for (id, east, north) in [
        (3, 0.0, 8.0),
        (4, 0.0, -8.0),
        (5, 20.0, 8.0),
        (6, 20.0, -8.0),
    ] {
        add_node(&mut g, id, east, north, tags(&[("highway", "crossing")]));
    }
    for (id, east, north) in [
        (7, 0.0, 25.0),
        (8, 0.0, -25.0),
        (9, 20.0, 25.0),
        (10, 20.0, -25.0),
    ] {
        add_node(&mut g, id, east, north, Tags::empty());
    }

    let avenue = tags(&[("highway", "residential"), ("name", "Avenue A")]);
    for (n1, n2) in [(1, 3), (3, 7), (1, 4), (4, 8), (2, 5), (5, 9), (2, 6), (6, 10)] {
        g.add_edge(n(n1), n(n2), avenue.clone());
    }
    g.add_edge(
        n(1),
        n(2),
        tags(&[("highway", "residential"), ("name", "Rue B")]),
    );
    g
}

#[test]
fn dog_bone_clusters_into_one_crossroad() {
    let seg = process(dog_bone_graph());

    assert_eq!(crossroad_count(&seg), 1);
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];

    // both former centers, and the path between them, belong to the merge
    assert!(crossroad.region.has_node(n(1)));
    assert!(crossroad.region.has_node(n(2)));
    assert!(crossroad.region.has_edge(n(1), n(2)));
    // the new center is the node nearest the midpoint of the old ones
    assert!(crossroad.center == n(1) || crossroad.center == n(2));
}

/// Ring of three: crossroads at the corners of a 20 m triangle, joined by
/// unnamed link polylines, each with its own named branch.
fn ring_graph() -> StreetGraph {
    let mut g = StreetGraph::new();
    add_node(&mut g, 1, 0.0, 0.0, Tags::empty());
    add_node(&mut g, 2, 20.0, 0.0, Tags::empty());
    add_node(&mut g, 3, 10.0, 17.3, Tags::empty());
    // polyline middles of the links
    add_node(&mut g, 4, 10.0, 0.0, Tags::empty());
    add_node(&mut g, 5, 5.0, 8.65, Tags::empty());
    add_node(&mut g, 6, 15.0, 8.65, Tags::empty());
    // one crossing + external per corner
    add_node(&mut g, 7, -5.7, -5.7, tags(&[("highway", "crossing")]));
    add_node(&mut g, 8, 25.7, -5.7, tags(&[("highway", "crossing")]));
    add_node(&mut g, 9, 10.0, 25.3, tags(&[("highway", "crossing")]));
    add_node(&mut g, 10, -17.0, -17.0, Tags::empty());
    add_node(&mut g, 11, 37.0, -17.0, Tags::empty());
    add_node(&mut g, 12, 10.0, 42.0, Tags::empty());

    for (n1, n2, name) in [
        (1, 7, "Rue 1"),
        (7, 10, "Rue 1"),
        (2, 8, "Rue 2"),
        (8, 11, "Rue 2"),
        (3, 9, "Rue 3"),
        (9, 12, "Rue 3"),
    ] {
        g.add_edge(n(n1), n(n2), tags(&[("highway", "residential"), ("name", name)]));
    }
    for (n1, n2) in [(1, 4), (4, 2), (1, 5), (5, 3), (2, 6), (6, 3)] {
        g.add_edge(n(n1), n(n2), tags(&[("highway", "residential")]));
    }
    g
}

#[test]
fn ring_of_three_merges_over_the_cycle() {
    let seg = process(ring_graph());

    assert_eq!(crossroad_count(&seg), 1);
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];
    for corner in [1, 2, 3] {
        assert!(crossroad.region.has_node(n(corner)));
    }

    // the three originals survive as inner regions
    let inner_crossroads = seg
        .inner_regions
        .values()
        .filter(|e| e.is_crossroad())
        .count();
    assert_eq!(inner_crossroads, 3);

    // multiscale query returns the merge plus its three parts
    let multiscale = seg.get_crossroad(BASE_LAT, BASE_LON, true).unwrap();
    assert_eq!(multiscale.len(), 4);
}

/// A branch split by a refuge island: two parallel "Rue Neuve" carriageways
/// with crossings on both, plus a plain two-way "Grande Rue".
fn island_graph() -> StreetGraph {
    let mut g = StreetGraph::new();
    add_node(&mut g, 1, 0.0, 0.0, Tags::empty());
    add_node(&mut g, 2, -8.0, 0.0, tags(&[("highway", "give_way")]));
    add_node(&mut g, 3, 8.0, 0.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 4, -3.0, 8.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 5, 3.0, 8.0, tags(&[("highway", "crossing")]));
    add_node(&mut g, 6, -25.0, 0.0, Tags::empty());
    add_node(&mut g, 7, 25.0, 0.0, Tags::empty());
    add_node(&mut g, 8, -3.0, 20.0, Tags::empty());
    add_node(&mut g, 9, 3.0, 20.0, Tags::empty());

    let grande = tags(&[("highway", "residential"), ("name", "Grande Rue")]);
    let neuve = tags(&[("highway", "residential"), ("name", "Rue Neuve")]);
    for (n1, n2, t) in [
        (1, 2, &grande),
        (2, 6, &grande),
        (1, 3, &grande),
        (3, 7, &grande),
        (1, 4, &neuve),
        (4, 8, &neuve),
        (1, 5, &neuve),
        (5, 9, &neuve),
    ] {
        g.add_edge(n(n1), n(n2), t.clone());
    }
    g
}

#[test]
fn island_detection_and_crossings() {
    let seg = process(island_graph());
    let crossroad = seg.get_crossroad(BASE_LAT, BASE_LON, false).unwrap()[0];
    // the two parallel carriageways group into one branch
    assert_eq!(crossroad.branches.len(), 3);

    let json = write_segmentation(&seg.graph, &[crossroad]).unwrap();
    let model = Intersection::from_json(&seg.graph, &json).unwrap();

    // exactly one island, mapped on both carriageways
    let islands: BTreeSet<usize> = model
        .ways
        .values()
        .flat_map(|w| w.islands.iter().flatten().copied())
        .collect();
    assert_eq!(islands.len(), 1);

    // the divided branch is number 1 (nearest north) and crosses in two hops
    let divided = &model.branches[0];
    assert_eq!(divided.number, 1);
    assert_eq!(divided.street_name.1, "Neuve");
    let crossing_id = divided.crossing.as_ref().expect("a crossing over the branch");
    let crossing = &model.crossings[crossing_id];
    assert_eq!(crossing.crosswalks, vec![n(4), n(5)]);

    // consecutive crosswalks of a crossing share a pedestrian node
    for crossing in model.crossings.values() {
        assert!(!crossing.crosswalks.is_empty());
        for pair in crossing.crosswalks.windows(2) {
            let a = &model.junctions[&pair[0]].crosswalk.as_ref().unwrap().pedestrian_nodes;
            let b = &model.junctions[&pair[1]].crosswalk.as_ref().unwrap().pedestrian_nodes;
            assert!(a.iter().any(|pn| b.contains(pn)));
        }
    }

    // the undivided street crosses in a single hop
    assert_eq!(model.crossings.len(), 2);
}
