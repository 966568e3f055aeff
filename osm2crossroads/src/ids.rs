use std::fmt;

use serde::{Deserialize, Serialize};

/// An OSM node identifier. Opaque and non-contiguous.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeID(pub u64);

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Node #{}", self.0)
    }
}

/// Identifies one stored edge of the multigraph. `k` disambiguates parallel
/// edges between the same endpoints; it's 0 almost everywhere.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeID {
    pub n1: NodeID,
    pub n2: NodeID,
    pub k: usize,
}

impl EdgeID {
    pub fn new(n1: NodeID, n2: NodeID, k: usize) -> Self {
        Self { n1, n2, k }
    }

    /// The endpoint pair with the smaller id first, used as the storage key
    /// for an undirected edge.
    pub fn key(n1: NodeID, n2: NodeID) -> (NodeID, NodeID) {
        if n1 <= n2 {
            (n1, n2)
        } else {
            (n2, n1)
        }
    }

    pub fn other_side(&self, n: NodeID) -> NodeID {
        if self.n1 == n {
            self.n2
        } else {
            self.n1
        }
    }
}

impl fmt::Display for EdgeID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Edge #{}-#{} ({})", self.n1.0, self.n2.0, self.k)
    }
}

/// Identifies a segmented region (crossroad or link). Allocated sequentially
/// by `RegionIds`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionID(pub u64);

impl fmt::Display for RegionID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Region #{}", self.0)
    }
}

/// Hands out region ids. Owned by the segmentation driver; the original kept
/// a process-wide counter, which made successive runs interfere.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegionIds {
    next: u64,
}

impl RegionIds {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_id(&mut self) -> RegionID {
        let id = RegionID(self.next);
        self.next += 1;
        id
    }

    /// Claim a specific id (used when rebuilding regions from stored labels),
    /// bumping the counter past it.
    pub fn claim(&mut self, id: RegionID) -> RegionID {
        if self.next <= id.0 {
            self.next = id.0 + 1;
        }
        id
    }
}
