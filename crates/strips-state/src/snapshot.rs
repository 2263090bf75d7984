//! Point-in-time views of the universe.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-in-time summary of the universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    /// Unique ID for this snapshot.
    pub id: Uuid,

    /// Level at snapshot time.
    pub level: usize,

    /// Store version at snapshot time.
    pub version: u64,

    /// Timestamp when the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Number of known objects.
    pub objects: usize,

    /// Number of known facts.
    pub facts: usize,

    /// Object counts per type name.
    pub objects_by_type: BTreeMap<String, usize>,
}

impl UniverseSnapshot {
    /// Returns true if nothing known in `earlier` is missing here.
    ///
    /// Counts are compared, which is exact for an append-only store.
    pub fn covers(&self, earlier: &UniverseSnapshot) -> bool {
        self.version >= earlier.version
            && self.objects >= earlier.objects
            && self.facts >= earlier.facts
            && earlier
                .objects_by_type
                .iter()
                .all(|(ty, count)| self.objects_by_type.get(ty).copied().unwrap_or(0) >= *count)
    }
}

/// How one level of the incremental planner went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSummary {
    /// The level number.
    pub level: usize,

    /// Inner refinement rounds run at this level.
    pub refinements: usize,

    /// Stream calls committed during this level.
    pub stream_calls: usize,

    /// Universe at the end of the level.
    pub universe: UniverseSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(version: u64, objects: usize, facts: usize) -> UniverseSnapshot {
        let mut objects_by_type = BTreeMap::new();
        objects_by_type.insert("POSE".to_string(), objects);
        UniverseSnapshot {
            id: Uuid::new_v4(),
            level: 0,
            version,
            timestamp: Utc::now(),
            objects,
            facts,
            objects_by_type,
        }
    }

    #[test]
    fn test_covers() {
        let early = snapshot(3, 2, 1);
        let late = snapshot(5, 3, 2);
        assert!(late.covers(&early));
        assert!(!early.covers(&late));
        assert!(early.covers(&early));
    }

    #[test]
    fn test_summary_serializes() {
        let summary = LevelSummary {
            level: 1,
            refinements: 2,
            stream_calls: 4,
            universe: snapshot(1, 1, 0),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["level"], 1);
        assert_eq!(json["universe"]["objects_by_type"]["POSE"], 1);
    }
}
