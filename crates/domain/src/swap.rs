//! One-swap-per-period tracking.
//!
//! Each `(class, period kind)` pair gets at most one tracking state, created
//! lazily on the first recorded toggle inside an eligible period and deleted
//! when the period completes. A state remembers the single unlearned and
//! single learned spell of the period, plus a snapshot of what was prepared
//! when the period's first toggle happened.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::decision::DenyReason;
use crate::ids::{ClassId, SpellId};

/// The two kinds of eligible swap periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodKind {
    LevelUp,
    LongRest,
}

/// Swap bookkeeping for one class within one eligible period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapTrackingState {
    unlearned: Option<SpellId>,
    learned: Option<SpellId>,
    original_prepared: BTreeSet<SpellId>,
}

impl SwapTrackingState {
    /// Rebuild a state from persisted parts.
    pub fn from_parts(
        unlearned: Option<SpellId>,
        learned: Option<SpellId>,
        original_prepared: BTreeSet<SpellId>,
    ) -> Self {
        Self {
            unlearned,
            learned,
            original_prepared,
        }
    }

    fn opened_with(original_prepared: BTreeSet<SpellId>) -> Self {
        Self {
            original_prepared,
            ..Self::default()
        }
    }

    pub fn unlearned(&self) -> Option<SpellId> {
        self.unlearned
    }

    pub fn learned(&self) -> Option<SpellId> {
        self.learned
    }

    pub fn original_prepared(&self) -> &BTreeSet<SpellId> {
        &self.original_prepared
    }
}

/// Per-character swap tracker across all classes and period kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapTracker {
    states: HashMap<(ClassId, PeriodKind), SwapTrackingState>,
}

impl SwapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, class_id: ClassId, kind: PeriodKind) -> Option<&SwapTrackingState> {
        self.states.get(&(class_id, kind))
    }

    /// Install a persisted state (used when loading from the store).
    pub fn insert_state(&mut self, class_id: ClassId, kind: PeriodKind, state: SwapTrackingState) {
        self.states.insert((class_id, kind), state);
    }

    /// Whether a toggle is legal under the one-swap-per-period rules.
    ///
    /// Pure: never creates or mutates state. When no state exists yet,
    /// `fallback_original` stands in for the period-start snapshot.
    /// `require_freed_slot` enables the must-unlearn-before-learn rule
    /// (cantrips only).
    pub fn can_toggle(
        &self,
        class_id: ClassId,
        kind: PeriodKind,
        spell_id: SpellId,
        checking: bool,
        fallback_original: &BTreeSet<SpellId>,
        require_freed_slot: bool,
    ) -> Result<(), DenyReason> {
        let (unlearned, learned, original) = match self.state(class_id, kind) {
            Some(state) => (state.unlearned, state.learned, &state.original_prepared),
            None => (None, None, fallback_original),
        };

        if checking {
            if unlearned == Some(spell_id) {
                // Undo of this period's unlearn
                return Ok(());
            }
            if original.contains(&spell_id) {
                return Ok(());
            }
            if learned.is_some() && learned != Some(spell_id) {
                return Err(DenyReason::OnlyOneSwap);
            }
            if require_freed_slot && unlearned.is_none() {
                return Err(DenyReason::MustUnlearnFirst);
            }
            Ok(())
        } else {
            if learned == Some(spell_id) {
                // Undo of this period's learn
                return Ok(());
            }
            if !original.contains(&spell_id) {
                return Ok(());
            }
            if unlearned.is_some() && unlearned != Some(spell_id) {
                return Err(DenyReason::OnlyOneSwap);
            }
            Ok(())
        }
    }

    /// Record a committed toggle, creating the period state lazily.
    ///
    /// `current_prepared` must be the prepared set *before* the toggle is
    /// applied to the ledger; it becomes the period-start snapshot on first
    /// mutation. Transitions are checkbox-style: re-checking the tracked
    /// unlearned spell clears that slot, re-unchecking the tracked learned
    /// spell clears that slot.
    pub fn record_toggle(
        &mut self,
        class_id: ClassId,
        kind: PeriodKind,
        spell_id: SpellId,
        checking: bool,
        current_prepared: &BTreeSet<SpellId>,
    ) {
        let state = self
            .states
            .entry((class_id, kind))
            .or_insert_with(|| SwapTrackingState::opened_with(current_prepared.clone()));

        if checking {
            if state.unlearned == Some(spell_id) {
                state.unlearned = None;
            } else if !state.original_prepared.contains(&spell_id) {
                state.learned = Some(spell_id);
            }
        } else if state.learned == Some(spell_id) {
            state.learned = None;
        } else if state.original_prepared.contains(&spell_id) {
            state.unlearned = Some(spell_id);
        }
    }

    /// Clear tracking for every class for one period kind.
    pub fn complete(&mut self, kind: PeriodKind) {
        self.states.retain(|(_, k), _| *k != kind);
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (ClassId, PeriodKind, &SwapTrackingState)> {
        self.states
            .iter()
            .map(|((class_id, kind), state)| (*class_id, *kind, state))
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original(spells: &[SpellId]) -> BTreeSet<SpellId> {
        spells.iter().copied().collect()
    }

    mod transitions {
        use super::*;

        #[test]
        fn first_toggle_snapshots_the_prepared_set() {
            let mut tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let a = SpellId::new();
            let b = SpellId::new();
            let prepared = original(&[a, b]);

            tracker.record_toggle(class_id, PeriodKind::LongRest, a, false, &prepared);

            let state = tracker
                .state(class_id, PeriodKind::LongRest)
                .expect("state created lazily");
            assert_eq!(state.unlearned(), Some(a));
            assert_eq!(state.learned(), None);
            assert_eq!(state.original_prepared(), &prepared);
        }

        #[test]
        fn learn_then_undo_clears_the_slot() {
            let mut tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let new_spell = SpellId::new();
            let prepared = original(&[]);

            tracker.record_toggle(class_id, PeriodKind::LevelUp, new_spell, true, &prepared);
            assert_eq!(
                tracker
                    .state(class_id, PeriodKind::LevelUp)
                    .and_then(SwapTrackingState::learned),
                Some(new_spell)
            );

            tracker.record_toggle(class_id, PeriodKind::LevelUp, new_spell, false, &prepared);
            assert_eq!(
                tracker
                    .state(class_id, PeriodKind::LevelUp)
                    .and_then(SwapTrackingState::learned),
                None
            );
        }

        #[test]
        fn unlearn_then_recheck_clears_the_slot() {
            let mut tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let a = SpellId::new();
            let prepared = original(&[a]);

            tracker.record_toggle(class_id, PeriodKind::LongRest, a, false, &prepared);
            tracker.record_toggle(class_id, PeriodKind::LongRest, a, true, &prepared);

            let state = tracker
                .state(class_id, PeriodKind::LongRest)
                .expect("state persists until complete");
            assert_eq!(state.unlearned(), None);
        }
    }

    mod verdicts {
        use super::*;

        #[test]
        fn second_unlearn_is_denied() {
            let mut tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let a = SpellId::new();
            let c = SpellId::new();
            let prepared = original(&[a, c]);

            tracker.record_toggle(class_id, PeriodKind::LongRest, a, false, &prepared);

            let verdict = tracker.can_toggle(
                class_id,
                PeriodKind::LongRest,
                c,
                false,
                &prepared,
                true,
            );
            assert_eq!(verdict, Err(DenyReason::OnlyOneSwap));
        }

        #[test]
        fn second_learn_is_denied() {
            let mut tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let a = SpellId::new();
            let b = SpellId::new();
            let c = SpellId::new();
            let prepared = original(&[a]);

            tracker.record_toggle(class_id, PeriodKind::LongRest, a, false, &prepared);
            tracker.record_toggle(class_id, PeriodKind::LongRest, b, true, &prepared);

            let verdict =
                tracker.can_toggle(class_id, PeriodKind::LongRest, c, true, &prepared, true);
            assert_eq!(verdict, Err(DenyReason::OnlyOneSwap));
        }

        #[test]
        fn learning_requires_a_freed_slot_when_asked() {
            let tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let new_spell = SpellId::new();
            let prepared = original(&[SpellId::new()]);

            // Cantrip rule: no slot freed yet
            let verdict = tracker.can_toggle(
                class_id,
                PeriodKind::LevelUp,
                new_spell,
                true,
                &prepared,
                true,
            );
            assert_eq!(verdict, Err(DenyReason::MustUnlearnFirst));

            // Leveled-spell rule: no freed slot required
            let verdict = tracker.can_toggle(
                class_id,
                PeriodKind::LevelUp,
                new_spell,
                true,
                &prepared,
                false,
            );
            assert_eq!(verdict, Ok(()));
        }

        #[test]
        fn undo_toggles_are_always_allowed() {
            let mut tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let a = SpellId::new();
            let b = SpellId::new();
            let prepared = original(&[a]);

            tracker.record_toggle(class_id, PeriodKind::LongRest, a, false, &prepared);
            tracker.record_toggle(class_id, PeriodKind::LongRest, b, true, &prepared);

            // Re-check the unlearned spell, re-uncheck the learned spell
            assert_eq!(
                tracker.can_toggle(class_id, PeriodKind::LongRest, a, true, &prepared, true),
                Ok(())
            );
            assert_eq!(
                tracker.can_toggle(class_id, PeriodKind::LongRest, b, false, &prepared, true),
                Ok(())
            );
        }

        #[test]
        fn unchecking_a_non_original_spell_is_free() {
            let tracker = SwapTracker::new();
            let class_id = ClassId::new();
            let prepared = original(&[]);

            let verdict = tracker.can_toggle(
                class_id,
                PeriodKind::LongRest,
                SpellId::new(),
                false,
                &prepared,
                true,
            );
            assert_eq!(verdict, Ok(()));
        }
    }

    mod completion {
        use super::*;

        #[test]
        fn complete_clears_one_period_kind_for_all_classes() {
            let mut tracker = SwapTracker::new();
            let wizard = ClassId::new();
            let cleric = ClassId::new();
            let a = SpellId::new();
            let prepared = original(&[a]);

            tracker.record_toggle(wizard, PeriodKind::LongRest, a, false, &prepared);
            tracker.record_toggle(cleric, PeriodKind::LongRest, a, false, &prepared);
            tracker.record_toggle(wizard, PeriodKind::LevelUp, a, false, &prepared);

            tracker.complete(PeriodKind::LongRest);

            assert!(tracker.state(wizard, PeriodKind::LongRest).is_none());
            assert!(tracker.state(cleric, PeriodKind::LongRest).is_none());
            assert!(tracker.state(wizard, PeriodKind::LevelUp).is_some());
        }
    }
}
