use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// The six per-region counters kept on every region row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counters {
    pub channel_total: i64,
    pub channel_online: i64,
    pub channel_broken: i64,
    pub device_total: i64,
    pub device_online: i64,
    pub device_broken: i64,
}

/// The two kinds of leaf rows counted under a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Channel,
    Device,
}

impl LeafKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafKind::Channel => "channel",
            LeafKind::Device => "device",
        }
    }
}

/// Which subset of leaf rows a counter covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Total,
    Online,
    Broken,
}

impl Counters {
    pub fn is_zero(&self) -> bool {
        *self == Counters::default()
    }

    pub fn slot_mut(&mut self, kind: LeafKind, measure: Measure) -> &mut i64 {
        match (kind, measure) {
            (LeafKind::Channel, Measure::Total) => &mut self.channel_total,
            (LeafKind::Channel, Measure::Online) => &mut self.channel_online,
            (LeafKind::Channel, Measure::Broken) => &mut self.channel_broken,
            (LeafKind::Device, Measure::Total) => &mut self.device_total,
            (LeafKind::Device, Measure::Online) => &mut self.device_online,
            (LeafKind::Device, Measure::Broken) => &mut self.device_broken,
        }
    }

    /// The counters in column order: channel total/online/broken, then
    /// device total/online/broken.
    pub fn to_array(&self) -> [i64; 6] {
        [
            self.channel_total,
            self.channel_online,
            self.channel_broken,
            self.device_total,
            self.device_online,
            self.device_broken,
        ]
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, other: Counters) {
        self.channel_total += other.channel_total;
        self.channel_online += other.channel_online;
        self.channel_broken += other.channel_broken;
        self.device_total += other.device_total;
        self.device_online += other.device_online;
        self.device_broken += other.device_broken;
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channels {}/{}/{} devices {}/{}/{}",
            self.channel_total,
            self.channel_online,
            self.channel_broken,
            self.device_total,
            self.device_online,
            self.device_broken
        )
    }
}

/// One region row for the duration of a rollup pass.
///
/// `direct` holds the counts of channels and devices assigned to this region
/// itself. `totals` starts equal to `direct` and, after the fold, holds the
/// subtree-inclusive counts that get written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionNode {
    pub id: String,
    pub parent_id: String,
    pub direct: Counters,
    pub totals: Counters,
}

impl RegionNode {
    pub fn new(id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            direct: Counters::default(),
            totals: Counters::default(),
        }
    }

    pub fn seeded(id: impl Into<String>, parent_id: impl Into<String>, direct: Counters) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            direct,
            totals: direct,
        }
    }

    pub fn reset_totals(&mut self) {
        self.totals = self.direct;
    }

    /// Adds a child's (already folded) totals onto this node's totals.
    pub fn absorb(&mut self, child: &RegionNode) {
        self.totals += child.totals;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_adds_every_counter() {
        let mut parent = RegionNode::seeded(
            "A",
            "0",
            Counters {
                channel_total: 2,
                channel_online: 1,
                ..Counters::default()
            },
        );
        let child = RegionNode::seeded(
            "B",
            "A",
            Counters {
                channel_total: 3,
                channel_online: 2,
                channel_broken: 1,
                device_total: 4,
                device_online: 4,
                device_broken: 0,
            },
        );

        parent.absorb(&child);

        assert_eq!(parent.totals.channel_total, 5);
        assert_eq!(parent.totals.channel_online, 3);
        assert_eq!(parent.totals.channel_broken, 1);
        assert_eq!(parent.totals.device_total, 4);
        assert_eq!(parent.direct.channel_total, 2);
    }

    #[test]
    fn reset_restores_direct_counts() {
        let mut node = RegionNode::seeded(
            "A",
            "0",
            Counters {
                device_total: 1,
                ..Counters::default()
            },
        );
        node.totals.device_total = 10;
        node.reset_totals();
        assert_eq!(node.totals, node.direct);
    }
}
