//! Class spellcasting progression data.
//!
//! Read-only snapshot of what the external class/scaling data provider knows
//! about one class: its identifier, current level, scale-value table, and
//! configured preparation maximum. The core never fetches this itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::ClassArchetype;

/// Ordered candidate keys for the cantrip scale value; first match wins.
pub const CANTRIP_SCALE_KEYS: &[&str] = &["cantrips-known", "cantrips", "known-cantrips"];

/// Spellcasting progression for one class on one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProgression {
    /// Class identifier string, e.g. `"wizard"`.
    pub identifier: String,
    pub level: u8,
    /// Scale-value table from the class's advancement data.
    pub scale_values: BTreeMap<String, i32>,
    /// Configured maximum of prepared leveled spells, before bonuses.
    pub prepared_max: u32,
}

impl ClassProgression {
    pub fn new(identifier: impl Into<String>, level: u8) -> Self {
        Self {
            identifier: identifier.into(),
            level,
            scale_values: BTreeMap::new(),
            prepared_max: 0,
        }
    }

    pub fn with_scale_value(mut self, key: impl Into<String>, value: i32) -> Self {
        self.scale_values.insert(key.into(), value);
        self
    }

    pub fn with_prepared_max(mut self, prepared_max: u32) -> Self {
        self.prepared_max = prepared_max;
        self
    }

    /// Base cantrip cap from the scale-value table, 0 when absent.
    pub fn cantrip_scale_value(&self) -> i32 {
        CANTRIP_SCALE_KEYS
            .iter()
            .find_map(|key| self.scale_values.get(*key).copied())
            .unwrap_or(0)
    }

    pub fn archetype(&self) -> ClassArchetype {
        ClassArchetype::classify(&self.identifier)
    }
}
