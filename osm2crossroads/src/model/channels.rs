//! Lane synthesis: turning the lane tags of an edge into the channel list of
//! a way. Directions are resolved against the crossroad border set — a way
//! whose second junction is a border node is drawn leaving the intersection.

use crate::model::{Channel, ChannelDirection, ChannelKind};
use crate::{osm, Tags};

fn channel(kind: ChannelKind, way_out: Option<bool>, outbound: bool) -> Channel {
    let out = way_out.unwrap_or(false);
    let leaving = if outbound { out } else { !out };
    Channel {
        kind,
        direction: if leaving {
            ChannelDirection::Out
        } else {
            ChannelDirection::In
        },
    }
}

/// `lanes:backward` + `lanes:forward`, honoring designated psv lanes when
/// both `psv:lanes:*` are tagged. None when a count doesn't parse.
fn directed_channels(tags: &Tags, way_out: Option<bool>) -> Option<Vec<Channel>> {
    let mut channels = Vec::new();

    if tags.contains_key(osm::PSV_LANES_BACK) && tags.contains_key(osm::PSV_LANES_FWD) {
        for lane in tags.get(osm::PSV_LANES_BACK).unwrap().split('|') {
            let kind = if lane == "designated" {
                ChannelKind::Bus
            } else {
                ChannelKind::Road
            };
            channels.push(channel(kind, way_out, false));
        }
        for lane in tags.get(osm::PSV_LANES_FWD).unwrap().split('|') {
            let kind = if lane == "designated" {
                ChannelKind::Bus
            } else {
                ChannelKind::Road
            };
            channels.push(channel(kind, way_out, true));
        }
        return Some(channels);
    }

    let backward: usize = tags.get(osm::LANES_BACK)?.parse().ok()?;
    let forward: usize = tags.get(osm::LANES_FWD)?.parse().ok()?;
    for _ in 0..backward {
        channels.push(channel(ChannelKind::Road, way_out, false));
    }
    for _ in 0..forward {
        channels.push(channel(ChannelKind::Road, way_out, true));
    }
    Some(channels)
}

/// Plain `lanes=k`: k channels in the outbound direction, buses when the way
/// is a psv-designated service road.
fn undirected_channels(tags: &Tags, way_out: Option<bool>) -> Option<Vec<Channel>> {
    let count: usize = tags.get(osm::LANES)?.parse().ok()?;
    let kind = if tags.is(osm::HIGHWAY, "service") && tags.is(osm::PSV, "yes") {
        ChannelKind::Bus
    } else {
        ChannelKind::Road
    };
    Some((0..count).map(|_| channel(kind, way_out, true)).collect())
}

/// No usable lane tags: one outbound road lane, plus an inbound one unless
/// the way is one-way.
fn default_channels(tags: &Tags, way_out: Option<bool>) -> Vec<Channel> {
    if tags.is(osm::ONEWAY, "no") {
        vec![
            channel(ChannelKind::Road, way_out, true),
            channel(ChannelKind::Road, way_out, false),
        ]
    } else {
        vec![channel(ChannelKind::Road, way_out, true)]
    }
}

/// The channel list for an edge. `way_out` says whether the way's stored
/// direction leaves the intersection; None (no border set) records the
/// directions as provided.
pub fn synthesize_channels(tags: &Tags, way_out: Option<bool>) -> Vec<Channel> {
    if tags.contains_key(osm::LANES_BACK) && tags.contains_key(osm::LANES_FWD) {
        match directed_channels(tags, way_out) {
            Some(channels) => return channels,
            None => warn!(
                "non-numeric lanes:backward={:?} lanes:forward={:?}, using the default rule",
                tags.get(osm::LANES_BACK),
                tags.get(osm::LANES_FWD)
            ),
        }
    } else if tags.contains_key(osm::LANES) {
        match undirected_channels(tags, way_out) {
            Some(channels) => return channels,
            None => warn!(
                "non-numeric lanes={:?}, using the default rule",
                tags.get(osm::LANES)
            ),
        }
    }
    default_channels(tags, way_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(kv: &[(&str, &str)]) -> Tags {
        kv.iter().copied().collect()
    }

    fn count(channels: &[Channel], kind: ChannelKind, direction: ChannelDirection) -> usize {
        channels
            .iter()
            .filter(|c| c.kind == kind && c.direction == direction)
            .count()
    }

    #[test]
    fn directional_split() {
        let channels = synthesize_channels(
            &tags(&[("lanes:backward", "1"), ("lanes:forward", "1")]),
            Some(true),
        );
        assert_eq!(channels.len(), 2);
        assert_eq!(count(&channels, ChannelKind::Road, ChannelDirection::In), 1);
        assert_eq!(count(&channels, ChannelKind::Road, ChannelDirection::Out), 1);

        // Stored direction pointing inwards flips both
        let flipped = synthesize_channels(
            &tags(&[("lanes:backward", "2"), ("lanes:forward", "1")]),
            Some(false),
        );
        assert_eq!(count(&flipped, ChannelKind::Road, ChannelDirection::Out), 2);
        assert_eq!(count(&flipped, ChannelKind::Road, ChannelDirection::In), 1);
    }

    #[test]
    fn psv_lanes_make_buses() {
        let channels = synthesize_channels(
            &tags(&[
                ("lanes:backward", "2"),
                ("lanes:forward", "2"),
                ("psv:lanes:backward", "yes|designated"),
                ("psv:lanes:forward", "designated|yes"),
            ]),
            Some(true),
        );
        assert_eq!(channels.len(), 4);
        assert_eq!(count(&channels, ChannelKind::Bus, ChannelDirection::In), 1);
        assert_eq!(count(&channels, ChannelKind::Bus, ChannelDirection::Out), 1);
    }

    #[test]
    fn lane_count_matches_tag() {
        let channels = synthesize_channels(&tags(&[("lanes", "3")]), Some(true));
        assert_eq!(channels.len(), 3);
        assert!(channels
            .iter()
            .all(|c| c.direction == ChannelDirection::Out));
    }

    #[test]
    fn service_psv_is_bus() {
        let channels = synthesize_channels(
            &tags(&[("lanes", "1"), ("highway", "service"), ("psv", "yes")]),
            Some(true),
        );
        assert_eq!(channels, vec![Channel { kind: ChannelKind::Bus, direction: ChannelDirection::Out }]);
    }

    #[test]
    fn oneway_defaults() {
        // one-way: a single outbound channel
        let stem = synthesize_channels(&tags(&[("oneway", "yes")]), Some(true));
        assert_eq!(stem.len(), 1);
        assert_eq!(stem[0].direction, ChannelDirection::Out);

        // two-way: one out, one in
        let both = synthesize_channels(&tags(&[("oneway", "no")]), Some(true));
        assert_eq!(count(&both, ChannelKind::Road, ChannelDirection::Out), 1);
        assert_eq!(count(&both, ChannelKind::Road, ChannelDirection::In), 1);
    }

    #[test]
    fn bad_lane_count_falls_back() {
        let channels = synthesize_channels(&tags(&[("lanes", "two")]), Some(true));
        // default rule: single outbound road channel
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].kind, ChannelKind::Road);
    }
}
