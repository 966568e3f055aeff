//! OSM tag handling. `Tags` is adapted from abstreet's abstutil to keep this
//! crate free of git dependencies, trimmed to what the crossroad pipeline
//! reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const HIGHWAY: &str = "highway";
pub const NAME: &str = "name";
pub const JUNCTION: &str = "junction";
pub const ONEWAY: &str = "oneway";
pub const LANES: &str = "lanes";
pub const LANES_FWD: &str = "lanes:forward";
pub const LANES_BACK: &str = "lanes:backward";
pub const PSV: &str = "psv";
pub const PSV_LANES_FWD: &str = "psv:lanes:forward";
pub const PSV_LANES_BACK: &str = "psv:lanes:backward";
pub const WIDTH: &str = "width";
pub const CROSSING: &str = "crossing";
pub const TACTILE_PAVING: &str = "tactile_paving";
pub const TRAFFIC_SIGNALS: &str = "traffic_signals";
pub const TRAFFIC_SIGNALS_SOUND: &str = "traffic_signals:sound";
pub const TRAFFIC_SIGNALS_DIRECTION: &str = "traffic_signals:direction";

/// Convenience functions around a string->string map
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new(map: BTreeMap<String, String>) -> Tags {
        Tags(map)
    }

    pub fn empty() -> Tags {
        Tags(BTreeMap::new())
    }

    pub fn get(&self, k: &str) -> Option<&String> {
        self.0.get(k)
    }

    pub fn contains_key(&self, k: &str) -> bool {
        self.0.contains_key(k)
    }

    pub fn is(&self, k: &str, v: &str) -> bool {
        self.0.get(k) == Some(&v.to_string())
    }

    pub fn is_any(&self, k: &str, values: &[&str]) -> bool {
        if let Some(v) = self.0.get(k) {
            values.contains(&v.as_ref())
        } else {
            false
        }
    }

    /// OSM models one-way as anything other than an explicit "no"-ish value.
    pub fn is_oneway(&self) -> bool {
        match self.0.get(ONEWAY) {
            Some(v) => !matches!(v.as_str(), "no" | "false" | "0"),
            None => false,
        }
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, k: K, v: V) {
        self.0.insert(k.into(), v.into());
    }

    pub fn inner(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl<'a> std::iter::FromIterator<(&'a str, &'a str)> for Tags {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Tags(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
