//! Flag-shape adapter.
//!
//! Everything the service persists goes through the flag store as JSON
//! under the keys below. The wire structs in this module are the only
//! place that knows the persisted shape; domain types never serialize
//! directly into flags.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grimoire_domain::{
    ClassId, ClassRuleConfig, PeriodKind, PreparationLedger, PreparationSource, PreparedSpell,
    RuleSetEdition, SpellId, SwapTracker, SwapTrackingState,
};

pub const RULE_CONFIGS_KEY: &str = "spellPrep.ruleConfigs";
pub const LEDGER_KEY: &str = "spellPrep.preparedSpells";
pub const SWAP_STATES_KEY: &str = "spellPrep.swapTracking";
pub const LONG_REST_KEY: &str = "spellPrep.longRestActive";
pub const EDITION_KEY: &str = "spellPrep.editionOverride";
pub const LEVEL_BASELINE_KEY: &str = "spellPrep.levelBaseline";

/// Per-class rule config overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfigsFlag {
    pub overrides: Vec<RuleConfigOverrideWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfigOverrideWire {
    pub class_id: ClassId,
    pub config: ClassRuleConfig,
}

/// Full ledger contents as a flat entry list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFlag {
    pub entries: Vec<LedgerEntryWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryWire {
    pub class_id: ClassId,
    pub spell_id: SpellId,
    pub level: u8,
    pub source: PreparationSource,
}

impl LedgerFlag {
    pub fn encode(ledger: &PreparationLedger) -> Self {
        Self {
            entries: ledger
                .iter()
                .map(|(key, detail)| LedgerEntryWire {
                    class_id: key.class_id,
                    spell_id: key.spell_id,
                    level: detail.level,
                    source: detail.source,
                })
                .collect(),
        }
    }

    pub fn decode(self) -> PreparationLedger {
        let mut ledger = PreparationLedger::new();
        for entry in self.entries {
            ledger.prepare(
                entry.class_id,
                entry.spell_id,
                PreparedSpell {
                    level: entry.level,
                    source: entry.source,
                },
            );
        }
        ledger
    }
}

/// Open swap-tracking states across all classes and period kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStatesFlag {
    pub states: Vec<SwapStateWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStateWire {
    pub class_id: ClassId,
    pub period: PeriodKind,
    pub unlearned: Option<SpellId>,
    pub learned: Option<SpellId>,
    pub original_prepared: Vec<SpellId>,
}

impl SwapStatesFlag {
    pub fn encode(tracker: &SwapTracker) -> Self {
        Self {
            states: tracker
                .iter()
                .map(|(class_id, period, state)| SwapStateWire {
                    class_id,
                    period,
                    unlearned: state.unlearned(),
                    learned: state.learned(),
                    original_prepared: state.original_prepared().iter().copied().collect(),
                })
                .collect(),
        }
    }

    pub fn decode(self) -> SwapTracker {
        let mut tracker = SwapTracker::new();
        for wire in self.states {
            let original: BTreeSet<SpellId> = wire.original_prepared.into_iter().collect();
            tracker.insert_state(
                wire.class_id,
                wire.period,
                SwapTrackingState::from_parts(wire.unlearned, wire.learned, original),
            );
        }
        tracker
    }
}

/// Marker set while a long rest is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongRestFlag {
    pub active: bool,
    pub started_at: DateTime<Utc>,
}

impl LongRestFlag {
    pub fn begun_now() -> Self {
        Self {
            active: true,
            started_at: Utc::now(),
        }
    }
}

/// Per-character rule-set edition override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionFlag {
    pub edition: RuleSetEdition,
}

/// Baseline for level-up detection: the level and cantrip cap observed
/// when the last level-up period was completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelBaselineFlag {
    pub previous_level: u32,
    pub previous_cantrip_cap: u32,
    pub updated_at: DateTime<Utc>,
}

impl LevelBaselineFlag {
    pub fn observed_now(level: u32, cantrip_cap: u32) -> Self {
        Self {
            previous_level: level,
            previous_cantrip_cap: cantrip_cap,
            updated_at: Utc::now(),
        }
    }
}
