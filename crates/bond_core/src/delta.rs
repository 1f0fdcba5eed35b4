//! Per-turn point delta.
//!
//! Low levels move slowly, higher levels swing harder. The draw is random by
//! nature, so it goes through a [`RandomSource`] that tests can pin.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::levels::IntimacyLevel;
use crate::sentiment::Sentiment;

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsRange {
    pub min: i64,
    pub max: i64,
}

impl PointsRange {
    const ZERO: PointsRange = PointsRange { min: 0, max: 0 };

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// POSITIVE magnitudes per level; NEGATIVE mirrors them.
const POSITIVE_RANGES: [(i64, i64); 5] = [(3, 5), (5, 7), (7, 10), (8, 10), (10, 10)];

pub fn points_range(sentiment: Sentiment, level: IntimacyLevel) -> PointsRange {
    let (lo, hi) = POSITIVE_RANGES[level.value() as usize];
    match sentiment {
        Sentiment::Positive => PointsRange { min: lo, max: hi },
        Sentiment::Negative => PointsRange { min: -hi, max: -lo },
        Sentiment::Neutral => PointsRange::ZERO,
    }
}

/// Signed delta for one turn. Constant ranges skip the random source.
pub fn points_delta(sentiment: Sentiment, level: IntimacyLevel, source: &dyn RandomSource) -> i64 {
    let range = points_range(sentiment, level);
    if range.min == range.max {
        return range.min;
    }
    let drawn = source.draw(range.min, range.max);
    // A misbehaving source must not push a value outside the documented range.
    drawn.clamp(range.min, range.max)
}

// ============================================================================
// Random sources
// ============================================================================

/// Uniform draw from an inclusive integer range.
pub trait RandomSource: Send + Sync {
    fn draw(&self, min: i64, max: i64) -> i64;
}

/// Production source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw(&self, min: i64, max: i64) -> i64 {
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Reproducible sequence from a fixed seed.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn draw(&self, min: i64, max: i64) -> i64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(min..=max),
            Err(poisoned) => poisoned.into_inner().gen_range(min..=max),
        }
    }
}

/// Always answers the same value, clamped into the requested range.
/// `FixedDraw(i64::MAX)` always takes the top of the range, `FixedDraw(i64::MIN)` the bottom.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub i64);

impl FixedDraw {
    pub const HIGHEST: FixedDraw = FixedDraw(i64::MAX);
    pub const LOWEST: FixedDraw = FixedDraw(i64::MIN);
}

impl RandomSource for FixedDraw {
    fn draw(&self, min: i64, max: i64) -> i64 {
        self.0.clamp(min, max)
    }
}
