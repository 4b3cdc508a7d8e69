//! Behavioral Metric Layout - Centralized Telemetry Definition
//!
//! **This file controls the telemetry schema shared by the normalizer,
//! the behavioral baseline and persisted baseline snapshots.**
//!
//! ## Rules:
//! 1. Add metric → increment METRIC_VERSION
//! 2. Change order → increment METRIC_VERSION
//! 3. Remove metric → increment METRIC_VERSION
//!
//! A baseline saved under a different layout is rejected on load.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// METRIC VERSION
// ============================================================================

/// Current metric layout version
pub const METRIC_VERSION: u8 = 1;

// ============================================================================
// METRIC LAYOUT (Authoritative source)
// ============================================================================

/// Telemetry metric names, in layout order. Also the JSON keys accepted
/// in the raw telemetry blob.
pub const METRIC_LAYOUT: &[&str] = &[
    "typing_duration_secs",    // 0: Time from first to last keystroke
    "typing_speed_cpm",        // 1: Characters per minute
    "pointer_moves",           // 2: Pointer move events
    "interaction_delay_secs",  // 3: Page load → first input
    "backspace_ratio",         // 4: Corrections / keystrokes
    "paste_count",             // 5: Copy/paste events
];

pub const METRIC_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMetric {
    TypingDuration,
    TypingSpeed,
    PointerMoves,
    InteractionDelay,
    BackspaceRatio,
    PasteCount,
}

impl BehaviorMetric {
    pub const ALL: [BehaviorMetric; METRIC_COUNT] = [
        BehaviorMetric::TypingDuration,
        BehaviorMetric::TypingSpeed,
        BehaviorMetric::PointerMoves,
        BehaviorMetric::InteractionDelay,
        BehaviorMetric::BackspaceRatio,
        BehaviorMetric::PasteCount,
    ];

    pub fn index(&self) -> usize {
        match self {
            BehaviorMetric::TypingDuration => 0,
            BehaviorMetric::TypingSpeed => 1,
            BehaviorMetric::PointerMoves => 2,
            BehaviorMetric::InteractionDelay => 3,
            BehaviorMetric::BackspaceRatio => 4,
            BehaviorMetric::PasteCount => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        METRIC_LAYOUT[self.index()]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for BehaviorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 of version + metric names, used to detect layout mismatches
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[METRIC_VERSION]);

    for name in METRIC_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }

    hasher.finalize()
}

/// Check if a persisted layout is compatible (same version, same hash)
pub fn is_layout_compatible(version: u8, hash: u32) -> bool {
    version == METRIC_VERSION && hash == layout_hash()
}

// ============================================================================
// TESTS
// ============================================================================
