//! Preparation cap computation and caching.
//!
//! Caps are cheap to compute but must never be read stale across a rule
//! config change, so the cache exposes explicit `invalidate` entry points
//! that every mutation path calls synchronously.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::ClassId;
use crate::progression::ClassProgression;
use crate::rules::ClassRuleConfig;

/// Derived per-class cap values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapSnapshot {
    pub max_cantrips: u32,
    pub max_spells: u32,
}

impl CapSnapshot {
    pub const ZERO: Self = Self {
        max_cantrips: 0,
        max_spells: 0,
    };

    /// Compute both caps from class data and the effective rule config.
    pub fn compute(config: &ClassRuleConfig, progression: &ClassProgression) -> Self {
        Self {
            max_cantrips: max_cantrips(config, progression),
            max_spells: max_spells(config, progression),
        }
    }
}

/// Maximum prepared cantrips: scale value plus bonus, floored at 0.
/// Unconditionally 0 while cantrips are hidden for the class.
pub fn max_cantrips(config: &ClassRuleConfig, progression: &ClassProgression) -> u32 {
    if !config.show_cantrips {
        return 0;
    }
    let base = progression.cantrip_scale_value();
    (base + config.cantrip_preparation_bonus).max(0) as u32
}

/// Maximum prepared leveled spells: configured maximum plus bonus, floored at 0.
pub fn max_spells(config: &ClassRuleConfig, progression: &ClassProgression) -> u32 {
    (progression.prepared_max as i64 + config.spell_preparation_bonus as i64).max(0) as u32
}

/// Per-class cap cache with explicit invalidation hooks.
#[derive(Debug, Clone, Default)]
pub struct CapCache {
    snapshots: HashMap<ClassId, CapSnapshot>,
}

impl CapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class_id: ClassId) -> Option<CapSnapshot> {
        self.snapshots.get(&class_id).copied()
    }

    pub fn store(&mut self, class_id: ClassId, snapshot: CapSnapshot) {
        self.snapshots.insert(class_id, snapshot);
    }

    /// Called from every mutation path touching one class (rule update,
    /// progression refresh).
    pub fn invalidate(&mut self, class_id: ClassId) {
        self.snapshots.remove(&class_id);
    }

    /// Called on character-wide events (level-up completion, edition change).
    pub fn invalidate_all(&mut self) {
        self.snapshots.clear();
    }
}
