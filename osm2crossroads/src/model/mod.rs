//! The enriched intersection model: junctions with layered roles, ways with
//! channels and pedestrian slots, branches, and crossings. Everything
//! references everything else by id through the owning maps; there are no
//! cyclic links.

mod build;
mod channels;
mod crossings;
mod pedestrian;
mod walk;

use std::collections::BTreeMap;
use std::fmt;

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

use crate::osm;
use crate::{NodeID, Tags};

pub use self::channels::synthesize_channels;

/// A pedestrian region around the intersection, identified by its index
/// among sidewalks or islands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PedestrianNode {
    Sidewalk(usize),
    Island(usize),
}

impl PedestrianNode {
    pub fn is_sidewalk(&self) -> bool {
        matches!(self, PedestrianNode::Sidewalk(_))
    }
}

impl fmt::Display for PedestrianNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PedestrianNode::Sidewalk(id) => write!(f, "s{}", id),
            PedestrianNode::Island(id) => write!(f, "i{}", id),
        }
    }
}

/// The roles a junction can play. They accumulate: a crosswalk may also
/// carry a pedestrian traffic light.
#[derive(EnumSetType, Debug, Hash, Serialize, Deserialize)]
pub enum JunctionRole {
    Crosswalk,
    PedestrianTrafficLight,
    TrafficLight,
    Bikebox,
    Yield,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TactilePaving {
    No,
    Yes,
    /// Present but degraded or wrongly laid.
    Incorrect,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkAttrs {
    pub tactile_paving: TactilePaving,
    /// The pedestrian regions this crosswalk connects; exactly two once
    /// sidewalks and islands have been mapped.
    pub pedestrian_nodes: Vec<PedestrianNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PedestrianLightAttrs {
    pub sound: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightAttrs {
    pub direction: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BikeboxAttrs {
    pub distance_from_light: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YieldAttrs {
    pub direction: String,
}

/// One node of the intersection, with whatever roles its tags justify. The
/// original modeled this as a decorator stack; here it's a role set plus one
/// optional attribute record per role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    pub id: NodeID,
    pub x: f64,
    pub y: f64,
    pub roles: EnumSet<JunctionRole>,
    pub crosswalk: Option<CrosswalkAttrs>,
    pub pedestrian_light: Option<PedestrianLightAttrs>,
    pub traffic_light: Option<TrafficLightAttrs>,
    pub bikebox: Option<BikeboxAttrs>,
    pub give_way: Option<YieldAttrs>,
}

impl Junction {
    pub fn new(id: NodeID, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            roles: EnumSet::new(),
            crosswalk: None,
            pedestrian_light: None,
            traffic_light: None,
            bikebox: None,
            give_way: None,
        }
    }

    /// Build a junction from a node's tags: `crossing` (or a bare
    /// `highway=crossing`) makes a crosswalk, plus a pedestrian light when
    /// signalized; `traffic_signals` a traffic light.
    pub fn from_tags(id: NodeID, x: f64, y: f64, tags: &Tags) -> Self {
        let mut junction = Self::new(id, x, y);

        let crossing = tags
            .get(osm::CROSSING)
            .cloned()
            .or_else(|| tags.is(osm::HIGHWAY, "crossing").then(|| "unmarked".to_string()));
        match crossing {
            Some(v) if v != "no" => {
                let tactile_paving = match tags.get(osm::TACTILE_PAVING).map(|t| t.as_str()) {
                    Some("yes") => TactilePaving::Yes,
                    Some("incorrect") => TactilePaving::Incorrect,
                    _ => TactilePaving::No,
                };
                junction.decorate_crosswalk(tactile_paving);
                if v == "traffic_signals" {
                    junction
                        .decorate_pedestrian_light(tags.is(osm::TRAFFIC_SIGNALS_SOUND, "yes"));
                }
            }
            _ => {}
        }

        if tags.contains_key(osm::TRAFFIC_SIGNALS) {
            let direction = tags
                .get(osm::TRAFFIC_SIGNALS_DIRECTION)
                .cloned()
                .unwrap_or_else(|| "forward".to_string());
            junction.decorate_traffic_light(direction);
        }

        junction
    }

    pub fn decorate_crosswalk(&mut self, tactile_paving: TactilePaving) {
        self.roles.insert(JunctionRole::Crosswalk);
        self.crosswalk = Some(CrosswalkAttrs {
            tactile_paving,
            pedestrian_nodes: Vec::new(),
        });
    }

    pub fn decorate_pedestrian_light(&mut self, sound: bool) {
        self.roles.insert(JunctionRole::PedestrianTrafficLight);
        self.pedestrian_light = Some(PedestrianLightAttrs { sound });
    }

    pub fn decorate_traffic_light(&mut self, direction: String) {
        self.roles.insert(JunctionRole::TrafficLight);
        self.traffic_light = Some(TrafficLightAttrs { direction });
    }

    pub fn decorate_bikebox(&mut self, distance_from_light: f64) {
        self.roles.insert(JunctionRole::Bikebox);
        self.bikebox = Some(BikeboxAttrs {
            distance_from_light,
        });
    }

    pub fn decorate_give_way(&mut self, direction: String) {
        self.roles.insert(JunctionRole::Yield);
        self.give_way = Some(YieldAttrs { direction });
    }

    pub fn is_crosswalk(&self) -> bool {
        self.roles.contains(JunctionRole::Crosswalk)
    }

    /// Record that a sidewalk or island touches this crosswalk.
    pub fn add_pedestrian_node(&mut self, pn: PedestrianNode) {
        if let Some(attrs) = &mut self.crosswalk {
            if !attrs.pedestrian_nodes.contains(&pn) {
                attrs.pedestrian_nodes.push(pn);
            }
        }
    }
}

/// The junction registry for one model build. The original kept a
/// process-wide dict that leaked between runs; a table owned by the builder
/// makes the lifetime explicit.
#[derive(Clone, Debug, Default)]
pub struct JunctionTable {
    junctions: BTreeMap<NodeID, Junction>,
}

impl JunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the junction for this node, or return the existing one so that
    /// shared endpoints alias.
    pub fn get_or_create(&mut self, id: NodeID, x: f64, y: f64, tags: &Tags) -> &mut Junction {
        self.junctions
            .entry(id)
            .or_insert_with(|| Junction::from_tags(id, x, y, tags))
    }

    pub fn get(&self, id: NodeID) -> Option<&Junction> {
        self.junctions.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeID) -> Option<&mut Junction> {
        self.junctions.get_mut(&id)
    }

    /// Ids of all junctions carrying the given role, in id order.
    pub fn with_role(&self, role: JunctionRole) -> Vec<NodeID> {
        self.junctions
            .values()
            .filter(|j| j.roles.contains(role))
            .map(|j| j.id)
            .collect()
    }

    pub fn into_map(self) -> BTreeMap<NodeID, Junction> {
        self.junctions
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Road,
    Bus,
    Bicycle,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelDirection {
    In,
    Out,
}

/// A single traffic lane of a way.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub direction: ChannelDirection,
}

/// One edge of the intersection as the model sees it. Left/right slots are
/// relative to the stored junction order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub id: String,
    pub name: String,
    pub junctions: [NodeID; 2],
    pub channels: Vec<Channel>,
    /// Sidewalk ids: [left, right].
    pub sidewalks: [Option<usize>; 2],
    /// Island ids: [left, right].
    pub islands: [Option<usize>; 2],
}

impl Way {
    pub fn key(n1: NodeID, n2: NodeID) -> String {
        format!("{}-{}", n1.0, n2.0)
    }
}

/// A group of ways leaving the intersection together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: usize,
    /// 1-based clockwise position, starting nearest to north.
    pub number: usize,
    pub angle: f64,
    /// Street name split into its head word and the rest ("rue", "de la
    /// République").
    pub street_name: (String, String),
    /// Way ids, ordered by the bearing of their outer node from the center.
    pub ways: Vec<String>,
    /// Id of the crossing that traverses this branch, when one exists.
    pub crossing: Option<String>,
}

/// An ordered run of crosswalks that crosses a branch in one or more hops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    pub id: String,
    pub crosswalks: Vec<NodeID>,
}

/// The final model of one intersection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intersection {
    /// Mean position of the crossroad border nodes (x = lon, y = lat).
    pub center: (f64, f64),
    /// Clockwise, numbered 1..N starting nearest to north.
    pub branches: Vec<Branch>,
    pub junctions: BTreeMap<NodeID, Junction>,
    pub ways: BTreeMap<String, Way>,
    pub crossings: BTreeMap<String, Crossing>,
}

pub(crate) const UNNAMED_STREET: &str = "rue qui n'a pas de nom";

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(kv: &[(&str, &str)]) -> Tags {
        kv.iter().copied().collect()
    }

    #[test]
    fn roles_accumulate() {
        let j = Junction::from_tags(
            NodeID(1),
            0.0,
            0.0,
            &tags(&[
                ("crossing", "traffic_signals"),
                ("tactile_paving", "yes"),
                ("traffic_signals", "signal"),
                ("traffic_signals:sound", "yes"),
            ]),
        );
        assert!(j.roles.contains(JunctionRole::Crosswalk));
        assert!(j.roles.contains(JunctionRole::PedestrianTrafficLight));
        assert!(j.roles.contains(JunctionRole::TrafficLight));
        assert_eq!(j.crosswalk.as_ref().unwrap().tactile_paving, TactilePaving::Yes);
        assert!(j.pedestrian_light.as_ref().unwrap().sound);
    }

    #[test]
    fn crossing_no_is_not_a_crosswalk() {
        let j = Junction::from_tags(NodeID(1), 0.0, 0.0, &tags(&[("crossing", "no")]));
        assert!(j.roles.is_empty());
    }

    #[test]
    fn junction_table_aliases_shared_endpoints() {
        let mut table = JunctionTable::new();
        table
            .get_or_create(NodeID(1), 0.0, 0.0, &tags(&[("crossing", "unmarked")]))
            .add_pedestrian_node(PedestrianNode::Sidewalk(0));
        // a second way touching the same node sees the same junction
        let j = table.get_or_create(NodeID(1), 0.0, 0.0, &Tags::empty());
        assert_eq!(
            j.crosswalk.as_ref().unwrap().pedestrian_nodes,
            vec![PedestrianNode::Sidewalk(0)]
        );
    }

    #[test]
    fn manual_decorations() {
        let mut j = Junction::new(NodeID(5), 0.0, 0.0);
        j.decorate_bikebox(3.0);
        j.decorate_give_way("forward".to_string());
        assert!(j.roles.contains(JunctionRole::Bikebox));
        assert!(j.roles.contains(JunctionRole::Yield));
    }
}
