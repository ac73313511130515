//! Core ID types for the correspondence structures.

use serde::{Deserialize, Serialize};

/// Unique identifier for a view (one image's annotation record).
///
/// View ids are externally assigned; their numeric order defines the
/// navigation order. They serve as lightweight handles for
/// cross-referencing without Arc/Rc, which keeps the group structure
/// free of cyclic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub u64);

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Identifier for a keypoint, unique only within its owning view.
///
/// Assigned monotonically per view starting at 0; never reused within a
/// session even after removal. Only the `(ViewId, KeypointId)` pair is
/// globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeypointId(pub u64);

impl std::fmt::Display for KeypointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Unique identifier for a correspondence group (track).
///
/// Allocated as `max(existing) + 1` and retired permanently when the
/// group dissolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "G{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_equality_and_order() {
        assert_eq!(ViewId(42), ViewId(42));
        assert_ne!(ViewId(42), ViewId(43));
        assert!(GroupId(2) < GroupId(10));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", ViewId(3)), "V3");
        assert_eq!(format!("{}", KeypointId(5)), "K5");
        assert_eq!(format!("{}", GroupId(123)), "G123");
    }

    #[test]
    fn test_id_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<ViewId, &str> = HashMap::new();
        map.insert(ViewId(1), "first");
        assert_eq!(map.get(&ViewId(1)), Some(&"first"));
        assert_eq!(map.get(&ViewId(2)), None);
    }
}
