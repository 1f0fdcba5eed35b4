//! Property-based tests for bond_core.
//!
//! Uses proptest to verify invariants that must hold for ALL possible inputs:
//! level monotonicity, delta ranges, clamping, and one-shot event semantics.

use bond_core::levels::{clamp_points, phone_unlock_reached};
use bond_core::{
    detect, is_broken, is_rescue_band, level_for, points_delta, points_range, FixedDraw,
    IntimacyLevel, PairKey, RelationshipState, Sentiment, SeededRandom, Snapshot, Stage,
    MAX_AFFECTION, MIN_AFFECTION,
};
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_sentiment() -> impl Strategy<Value = Sentiment> {
    prop_oneof![
        Just(Sentiment::Positive),
        Just(Sentiment::Neutral),
        Just(Sentiment::Negative),
    ]
}

fn arb_level() -> impl Strategy<Value = IntimacyLevel> {
    (0u8..=4).prop_map(|v| IntimacyLevel::new(v).unwrap())
}

fn arb_points() -> impl Strategy<Value = i64> {
    MIN_AFFECTION..=MAX_AFFECTION
}

fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
    (arb_points(), any::<bool>(), any::<bool>()).prop_map(|(points, phone, rescue)| Snapshot {
        points,
        level: level_for(points),
        phone_unlocked: phone,
        rescue_triggered: rescue,
    })
}

// ============================================================================
// Level resolver
// ============================================================================

proptest! {
    /// **Core invariant**: more points never means a lower level.
    #[test]
    fn level_is_monotonic(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(level_for(lo) <= level_for(hi));
    }

    #[test]
    fn broken_and_rescue_are_disjoint(points in -200i64..200) {
        prop_assert!(!(is_broken(points) && is_rescue_band(points)));
        if is_broken(points) || is_rescue_band(points) {
            prop_assert_eq!(level_for(points).value(), 0);
        }
    }

    #[test]
    fn stage_for_points_agrees_with_level(points in arb_points()) {
        let stage = Stage::for_points(points);
        if is_broken(points) {
            prop_assert_eq!(stage, Stage::Broken);
        } else {
            prop_assert_eq!(stage, Stage::from_level(level_for(points)));
        }
    }

    #[test]
    fn clamp_keeps_canonical_bounds(points in any::<i64>()) {
        let c = clamp_points(points);
        prop_assert!((MIN_AFFECTION..=MAX_AFFECTION).contains(&c));
    }
}

// ============================================================================
// Delta calculator
// ============================================================================

proptest! {
    /// Every draw lands inside the documented range for (sentiment, level).
    #[test]
    fn delta_within_documented_range(
        sentiment in arb_sentiment(),
        level in arb_level(),
        pinned in any::<i64>(),
        seed in any::<u64>(),
    ) {
        let range = points_range(sentiment, level);
        let pinned_delta = points_delta(sentiment, level, &FixedDraw(pinned));
        let seeded_delta = points_delta(sentiment, level, &SeededRandom::new(seed));
        prop_assert!(range.contains(pinned_delta));
        prop_assert!(range.contains(seeded_delta));
        if sentiment == Sentiment::Neutral {
            prop_assert_eq!(pinned_delta, 0);
            prop_assert_eq!(seeded_delta, 0);
        }
    }

    /// POSITIVE and NEGATIVE ranges are sign mirrors.
    #[test]
    fn delta_ranges_are_symmetric(level in arb_level()) {
        let pos = points_range(Sentiment::Positive, level);
        let neg = points_range(Sentiment::Negative, level);
        prop_assert_eq!(pos.min, -neg.max);
        prop_assert_eq!(pos.max, -neg.min);
        prop_assert!(pos.min > 0);
    }
}

// ============================================================================
// Transition detector
// ============================================================================

proptest! {
    /// Once the phone latch is set, no transition reports it again.
    #[test]
    fn phone_unlock_never_repeats(old in arb_snapshot(), new in arb_snapshot()) {
        let mut old = old;
        old.phone_unlocked = true;
        prop_assert!(!detect(&old, &new).phone_just_unlocked);
    }

    #[test]
    fn rescue_never_repeats(old in arb_snapshot(), new in arb_snapshot()) {
        let mut old = old;
        old.rescue_triggered = true;
        prop_assert!(!detect(&old, &new).rescue_just_triggered);
    }

    #[test]
    fn phone_unlock_requires_threshold(old in arb_snapshot(), new in arb_snapshot()) {
        let t = detect(&old, &new);
        if t.phone_just_unlocked {
            prop_assert!(phone_unlock_reached(new.points));
            prop_assert!(!old.phone_unlocked);
        }
        prop_assert_eq!(t.level_changed, old.level != new.level);
    }

    /// Points written through `set_points` always keep the level consistent.
    #[test]
    fn set_points_preserves_level_invariant(points in any::<i64>()) {
        let key = PairKey::new("u", "c").unwrap();
        let mut state = RelationshipState::new(&key, Utc::now());
        state.set_points(points);
        prop_assert!(state.is_level_consistent());
        prop_assert!((MIN_AFFECTION..=MAX_AFFECTION).contains(&state.affection_points));
    }
}
