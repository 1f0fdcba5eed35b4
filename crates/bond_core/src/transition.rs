//! One-shot event detection across a single atomic write.
//!
//! `detect` must be fed the row exactly as read inside the write transaction
//! (`before`) and the row as written by it (`after`). Two separate reads would
//! let concurrent writers both claim the same crossing.

use serde::{Deserialize, Serialize};

use crate::levels::{is_rescue_band, phone_unlock_reached, IntimacyLevel};
use crate::state::RelationshipState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub points: i64,
    pub level: IntimacyLevel,
    pub phone_unlocked: bool,
    pub rescue_triggered: bool,
}

impl From<&RelationshipState> for Snapshot {
    fn from(state: &RelationshipState) -> Self {
        Self {
            points: state.affection_points,
            level: state.intimacy_level,
            phone_unlocked: state.phone_unlocked,
            rescue_triggered: state.rescue_triggered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub level_changed: bool,
    pub phone_just_unlocked: bool,
    pub rescue_just_triggered: bool,
}

pub fn detect(old: &Snapshot, new: &Snapshot) -> Transition {
    Transition {
        level_changed: old.level != new.level,
        phone_just_unlocked: !old.phone_unlocked && phone_unlock_reached(new.points),
        rescue_just_triggered: !old.rescue_triggered && is_rescue_band(new.points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::level_for;

    fn snap(points: i64, phone: bool, rescue: bool) -> Snapshot {
        Snapshot {
            points,
            level: level_for(points),
            phone_unlocked: phone,
            rescue_triggered: rescue,
        }
    }

    #[test]
    fn test_no_events_inside_band() {
        let t = detect(&snap(20, false, false), &snap(26, false, false));
        assert_eq!(t, Transition::default());
    }

    #[test]
    fn test_level_change() {
        let t = detect(&snap(9, false, false), &snap(13, false, false));
        assert!(t.level_changed);
        assert!(!t.phone_just_unlocked);
    }

    #[test]
    fn test_phone_unlock_fires_only_from_locked() {
        let t = detect(&snap(95, false, false), &snap(101, false, false));
        assert!(t.phone_just_unlocked);
        assert!(t.level_changed);

        let t = detect(&snap(95, false, false), &snap(100, false, false));
        assert!(!t.phone_just_unlocked);

        let t = detect(&snap(120, true, false), &snap(127, true, false));
        assert!(!t.phone_just_unlocked);
    }

    #[test]
    fn test_rescue_respects_latch() {
        let t = detect(&snap(-2, false, false), &snap(-6, false, false));
        assert!(t.rescue_just_triggered);

        let t = detect(&snap(-6, false, true), &snap(-9, false, true));
        assert!(!t.rescue_just_triggered);
    }

    #[test]
    fn test_broken_is_not_rescue() {
        let t = detect(&snap(-6, false, false), &snap(-12, false, false));
        assert!(!t.rescue_just_triggered);
    }
}
