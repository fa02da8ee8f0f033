//! The authoritative prepared-spell membership record for a character.
//!
//! Physically a `classId → ordered map of spellId` structure; conceptually a
//! set of `(classId, spellId)` pairs with per-entry detail. A spell may be
//! prepared under multiple classes at once; the ledger never deduplicates
//! across classes. The flattened view is derived and re-derivable at any
//! time; it is never a second source of truth.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ClassId, ClassSpellKey, SpellId};

/// How a ledger entry came to be prepared.
///
/// `AlwaysPrepared` and `GrantedByFeature` entries never count against caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreparationSource {
    Prepared,
    AlwaysPrepared,
    GrantedByFeature,
}

/// Detail for one prepared entry: spell level 0 marks a cantrip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedSpell {
    pub level: u8,
    pub source: PreparationSource,
}

impl PreparedSpell {
    pub fn cantrip() -> Self {
        Self {
            level: 0,
            source: PreparationSource::Prepared,
        }
    }

    pub fn leveled(level: u8) -> Self {
        Self {
            level,
            source: PreparationSource::Prepared,
        }
    }

    pub fn with_source(mut self, source: PreparationSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }

    /// True when this entry counts against the preparation cap.
    pub fn counts_against_cap(&self) -> bool {
        matches!(self.source, PreparationSource::Prepared)
    }
}

/// Per-character prepared-spell ledger, keyed by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparationLedger {
    entries: BTreeMap<ClassId, BTreeMap<SpellId, PreparedSpell>>,
}

impl PreparationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_prepared(&self, class_id: ClassId, spell_id: SpellId) -> bool {
        self.entries
            .get(&class_id)
            .is_some_and(|spells| spells.contains_key(&spell_id))
    }

    pub fn contains(&self, key: &ClassSpellKey) -> bool {
        self.is_prepared(key.class_id, key.spell_id)
    }

    pub fn entry(&self, class_id: ClassId, spell_id: SpellId) -> Option<&PreparedSpell> {
        self.entries.get(&class_id)?.get(&spell_id)
    }

    /// Mark a spell prepared for a class. Idempotent: returns `true` only
    /// when the ledger actually changed.
    pub fn prepare(&mut self, class_id: ClassId, spell_id: SpellId, detail: PreparedSpell) -> bool {
        let spells = self.entries.entry(class_id).or_default();
        match spells.get(&spell_id) {
            Some(existing) if *existing == detail => false,
            _ => {
                spells.insert(spell_id, detail);
                true
            }
        }
    }

    /// Remove a prepared entry. Idempotent: returns `true` only when the
    /// ledger actually changed.
    pub fn unprepare(&mut self, class_id: ClassId, spell_id: SpellId) -> bool {
        let Some(spells) = self.entries.get_mut(&class_id) else {
            return false;
        };
        let removed = spells.remove(&spell_id).is_some();
        if spells.is_empty() {
            self.entries.remove(&class_id);
        }
        removed
    }

    /// All spells currently prepared for a class, in stable order.
    pub fn prepared_for_class(&self, class_id: ClassId) -> BTreeSet<SpellId> {
        self.entries
            .get(&class_id)
            .map(|spells| spells.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Derived union across all classes, for legacy/global-count consumers.
    pub fn flattened_all(&self) -> BTreeSet<SpellId> {
        self.entries
            .values()
            .flat_map(|spells| spells.keys().copied())
            .collect()
    }

    /// Prepared cantrips counting against the cap for a class.
    pub fn cantrip_count(&self, class_id: ClassId) -> u32 {
        self.count_where(class_id, |detail| {
            detail.is_cantrip() && detail.counts_against_cap()
        })
    }

    /// Prepared leveled spells counting against the cap for a class.
    pub fn spell_count(&self, class_id: ClassId) -> u32 {
        self.count_where(class_id, |detail| {
            !detail.is_cantrip() && detail.counts_against_cap()
        })
    }

    fn count_where(&self, class_id: ClassId, pred: impl Fn(&PreparedSpell) -> bool) -> u32 {
        self.entries
            .get(&class_id)
            .map(|spells| spells.values().filter(|detail| pred(detail)).count() as u32)
            .unwrap_or(0)
    }

    /// Drop every entry for a class; returns how many were removed.
    pub fn remove_class(&mut self, class_id: ClassId) -> usize {
        self.entries
            .remove(&class_id)
            .map(|spells| spells.len())
            .unwrap_or(0)
    }

    /// Remove specific entries for one class only; returns how many were
    /// removed. Other classes' entries for the same spells are untouched.
    pub fn remove_spells(&mut self, class_id: ClassId, spell_ids: &[SpellId]) -> usize {
        let mut removed = 0;
        for spell_id in spell_ids {
            if self.unprepare(class_id, *spell_id) {
                removed += 1;
            }
        }
        removed
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.entries.keys().copied()
    }

    /// Flat iteration over every entry as a composite key plus detail.
    pub fn iter(&self) -> impl Iterator<Item = (ClassSpellKey, &PreparedSpell)> {
        self.entries.iter().flat_map(|(class_id, spells)| {
            spells
                .iter()
                .map(|(spell_id, detail)| (ClassSpellKey::new(*class_id, *spell_id), detail))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
