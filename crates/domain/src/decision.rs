//! The preparation decision engine.
//!
//! One `PreparationEngine` is owned per character session, constructed once
//! and explicitly refreshed on external events (level change, rule-set
//! change). All `decide_*` calls are side-effect-free; a decision may be
//! computed, discarded, and recomputed freely before `commit_toggle`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::caps::{CapCache, CapSnapshot};
use crate::error::DomainError;
use crate::ids::{ClassId, SpellId};
use crate::ledger::{PreparationLedger, PreparedSpell};
use crate::progression::ClassProgression;
use crate::rules::{
    ClassArchetype, ClassRuleConfig, ClassRuleConfigUpdate, EnforcementBehavior, RuleSetEdition,
    SwapMode,
};
use crate::swap::{PeriodKind, SwapTracker};

/// Why a toggle was denied (or would be, under NotifyOnly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DenyReason {
    CapReached,
    SwapNotAllowed,
    OnlyOneSwap,
    MustUnlearnFirst,
}

impl DenyReason {
    /// Stable reason code for callers that key messages off strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapReached => "cap-reached",
            Self::SwapNotAllowed => "swap-not-allowed",
            Self::OnlyOneSwap => "only-one-swap",
            Self::MustUnlearnFirst => "must-unlearn-first",
        }
    }
}

/// Outcome of a toggle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleVerdict {
    Allowed,
    /// Allowed under NotifyOnly, but the caller should surface a notice.
    AllowedWithNotice(DenyReason),
    Denied(DenyReason),
}

impl ToggleVerdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Denied(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn notice(&self) -> Option<DenyReason> {
        match self {
            Self::AllowedWithNotice(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Context flags supplied by the caller for each decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodContext {
    pub during_level_up: bool,
    pub during_long_rest: bool,
}

impl PeriodContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn level_up() -> Self {
        Self {
            during_level_up: true,
            during_long_rest: false,
        }
    }

    pub fn long_rest() -> Self {
        Self {
            during_level_up: false,
            during_long_rest: true,
        }
    }
}

#[derive(Debug, Clone)]
struct ClassState {
    progression: ClassProgression,
    archetype: ClassArchetype,
    override_config: Option<ClassRuleConfig>,
}

/// Per-character decision engine owning the ledger, swap tracker, cap cache,
/// and resolved rule configurations.
#[derive(Debug, Clone)]
pub struct PreparationEngine {
    edition: RuleSetEdition,
    enforcement: EnforcementBehavior,
    classes: BTreeMap<ClassId, ClassState>,
    ledger: PreparationLedger,
    tracker: SwapTracker,
    caps: CapCache,
}

impl PreparationEngine {
    pub fn new(edition: RuleSetEdition, enforcement: EnforcementBehavior) -> Self {
        Self {
            edition,
            enforcement,
            classes: BTreeMap::new(),
            ledger: PreparationLedger::new(),
            tracker: SwapTracker::new(),
            caps: CapCache::new(),
        }
    }

    // =========================================================================
    // Class registration and configuration
    // =========================================================================

    /// Register or refresh a class's progression data.
    pub fn upsert_class(&mut self, class_id: ClassId, progression: ClassProgression) {
        let archetype = progression.archetype();
        match self.classes.get_mut(&class_id) {
            Some(state) => {
                state.progression = progression;
                state.archetype = archetype;
            }
            None => {
                self.classes.insert(
                    class_id,
                    ClassState {
                        progression,
                        archetype,
                        override_config: None,
                    },
                );
            }
        }
        self.caps.invalidate(class_id);
        self.refresh_caps(class_id);
    }

    /// Drop a class that no longer exists on the character. Ledger entries
    /// for the class are kept; they simply stop counting anywhere.
    pub fn remove_class(&mut self, class_id: ClassId) {
        self.classes.remove(&class_id);
        self.caps.invalidate(class_id);
    }

    pub fn is_known_class(&self, class_id: ClassId) -> bool {
        self.classes.contains_key(&class_id)
    }

    pub fn known_classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.keys().copied()
    }

    pub fn archetype(&self, class_id: ClassId) -> ClassArchetype {
        self.classes
            .get(&class_id)
            .map(|state| state.archetype)
            .unwrap_or(ClassArchetype::Generic)
    }

    pub fn progression(&self, class_id: ClassId) -> Option<&ClassProgression> {
        self.classes.get(&class_id).map(|state| &state.progression)
    }

    /// Effective rule config: stored override if the class is still active,
    /// otherwise edition defaults. Stale class identifiers fall back to the
    /// generic default; this never fails.
    pub fn effective_config(&self, class_id: ClassId) -> ClassRuleConfig {
        match self.classes.get(&class_id) {
            Some(state) => state
                .override_config
                .clone()
                .unwrap_or_else(|| ClassRuleConfig::default_for(self.edition, state.archetype)),
            None => ClassRuleConfig::default_for(self.edition, ClassArchetype::Generic),
        }
    }

    /// All stored overrides, for persistence adapters.
    pub fn config_overrides(&self) -> impl Iterator<Item = (ClassId, &ClassRuleConfig)> {
        self.classes.iter().filter_map(|(class_id, state)| {
            state.override_config.as_ref().map(|config| (*class_id, config))
        })
    }

    pub fn has_override(&self, class_id: ClassId) -> bool {
        self.classes
            .get(&class_id)
            .is_some_and(|state| state.override_config.is_some())
    }

    /// Install a stored override (used when loading from the store).
    pub fn set_config_override(&mut self, class_id: ClassId, config: ClassRuleConfig) {
        if let Some(state) = self.classes.get_mut(&class_id) {
            state.override_config = Some(config);
            self.caps.invalidate(class_id);
            self.refresh_caps(class_id);
        }
    }

    /// Merge a partial update into the class's effective config and store
    /// the result as the override. Cap cache is invalidated synchronously.
    pub fn apply_config_update(
        &mut self,
        class_id: ClassId,
        update: &ClassRuleConfigUpdate,
    ) -> Result<ClassRuleConfig, DomainError> {
        if !self.is_known_class(class_id) {
            return Err(DomainError::not_found("Class", class_id.to_string()));
        }
        let mut config = self.effective_config(class_id);
        config.apply(update);
        self.set_config_override(class_id, config.clone());
        Ok(config)
    }

    pub fn edition(&self) -> RuleSetEdition {
        self.edition
    }

    /// Switch editions; every cached cap and non-overridden default changes.
    pub fn set_edition(&mut self, edition: RuleSetEdition) {
        self.edition = edition;
        self.caps.invalidate_all();
        let classes: Vec<ClassId> = self.known_classes().collect();
        for class_id in classes {
            self.refresh_caps(class_id);
        }
    }

    pub fn enforcement(&self) -> EnforcementBehavior {
        self.enforcement
    }

    pub fn set_enforcement(&mut self, enforcement: EnforcementBehavior) {
        self.enforcement = enforcement;
    }

    // =========================================================================
    // Caps
    // =========================================================================

    /// Cached cap snapshot for a class; unknown classes cap at zero.
    pub fn caps(&self, class_id: ClassId) -> CapSnapshot {
        if let Some(snapshot) = self.caps.get(class_id) {
            return snapshot;
        }
        self.compute_caps(class_id)
    }

    fn compute_caps(&self, class_id: ClassId) -> CapSnapshot {
        match self.classes.get(&class_id) {
            Some(state) => {
                let config = self.effective_config(class_id);
                CapSnapshot::compute(&config, &state.progression)
            }
            None => CapSnapshot::ZERO,
        }
    }

    fn refresh_caps(&mut self, class_id: ClassId) {
        let snapshot = self.compute_caps(class_id);
        self.caps.store(class_id, snapshot);
    }

    /// Total character level across registered classes.
    pub fn total_level(&self) -> u32 {
        self.classes
            .values()
            .map(|state| state.progression.level as u32)
            .sum()
    }

    /// Sum of cantrip caps across registered classes.
    pub fn total_cantrip_cap(&self) -> u32 {
        self.known_classes()
            .map(|class_id| self.caps(class_id).max_cantrips)
            .sum()
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Can this cantrip be checked or unchecked right now?
    pub fn decide_cantrip_toggle(
        &self,
        class_id: ClassId,
        spell_id: SpellId,
        checking: bool,
        ctx: PeriodContext,
    ) -> ToggleVerdict {
        let over_cap = checking
            && self.ledger.cantrip_count(class_id) >= self.caps(class_id).max_cantrips;
        self.decide(class_id, spell_id, checking, ctx, true, over_cap)
    }

    /// Can this leveled spell be checked or unchecked right now?
    pub fn decide_spell_toggle(
        &self,
        class_id: ClassId,
        spell_id: SpellId,
        checking: bool,
        ctx: PeriodContext,
    ) -> ToggleVerdict {
        let over_cap =
            checking && self.ledger.spell_count(class_id) >= self.caps(class_id).max_spells;
        self.decide(class_id, spell_id, checking, ctx, false, over_cap)
    }

    fn decide(
        &self,
        class_id: ClassId,
        spell_id: SpellId,
        checking: bool,
        ctx: PeriodContext,
        cantrip: bool,
        over_cap: bool,
    ) -> ToggleVerdict {
        match self.enforcement {
            EnforcementBehavior::Unenforced => return ToggleVerdict::Allowed,
            EnforcementBehavior::NotifyOnly => {
                return if over_cap {
                    ToggleVerdict::AllowedWithNotice(DenyReason::CapReached)
                } else {
                    ToggleVerdict::Allowed
                };
            }
            EnforcementBehavior::Enforced => {}
        }

        if over_cap {
            return ToggleVerdict::Denied(DenyReason::CapReached);
        }

        let config = self.effective_config(class_id);
        let mode = if cantrip {
            config.cantrip_swap_mode
        } else {
            config.spell_swap_mode
        };
        let period = self.eligible_period(class_id, mode, cantrip, ctx);

        // Unchecking a previously prepared entry is a swap and needs an
        // open eligible period under the class's swap mode.
        if !checking && self.ledger.is_prepared(class_id, spell_id) && period.is_none() {
            return ToggleVerdict::Denied(DenyReason::SwapNotAllowed);
        }

        if let Some(kind) = period {
            let fallback = self.ledger.prepared_for_class(class_id);
            let require_freed_slot = cantrip;
            match self.tracker.can_toggle(
                class_id,
                kind,
                spell_id,
                checking,
                &fallback,
                require_freed_slot,
            ) {
                Ok(()) => ToggleVerdict::Allowed,
                Err(reason) => ToggleVerdict::Denied(reason),
            }
        } else {
            ToggleVerdict::Allowed
        }
    }

    /// Which period kind, if any, is currently open for this swap mode.
    fn eligible_period(
        &self,
        class_id: ClassId,
        mode: SwapMode,
        cantrip: bool,
        ctx: PeriodContext,
    ) -> Option<PeriodKind> {
        match mode {
            SwapMode::Never => None,
            SwapMode::OnLevelUp => ctx.during_level_up.then_some(PeriodKind::LevelUp),
            SwapMode::OnLongRest => {
                // Long-rest cantrip swapping is a wizard-only privilege.
                if cantrip && !self.archetype(class_id).supports_long_rest_cantrip_swap() {
                    return None;
                }
                ctx.during_long_rest.then_some(PeriodKind::LongRest)
            }
        }
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Apply an accepted toggle to the ledger and, when inside an eligible
    /// period, to the swap tracker. Returns whether the ledger changed.
    ///
    /// Callers are expected to have obtained an allowed verdict first; this
    /// method applies state and does not re-run the decision.
    pub fn commit_toggle(
        &mut self,
        class_id: ClassId,
        spell_id: SpellId,
        checking: bool,
        detail: PreparedSpell,
        ctx: PeriodContext,
    ) -> bool {
        let config = self.effective_config(class_id);
        let mode = if detail.is_cantrip() {
            config.cantrip_swap_mode
        } else {
            config.spell_swap_mode
        };

        if let Some(kind) = self.eligible_period(class_id, mode, detail.is_cantrip(), ctx) {
            // Snapshot before the ledger mutation so the period-start set is
            // captured correctly on lazy state creation.
            let snapshot = self.ledger.prepared_for_class(class_id);
            self.tracker
                .record_toggle(class_id, kind, spell_id, checking, &snapshot);
        }

        if checking {
            self.ledger.prepare(class_id, spell_id, detail)
        } else {
            self.ledger.unprepare(class_id, spell_id)
        }
    }

    /// Finalize a period: clears swap tracking for that kind across all
    /// classes. Level-up completion also invalidates every cap.
    pub fn complete_period(&mut self, kind: PeriodKind) {
        self.tracker.complete(kind);
        if kind == PeriodKind::LevelUp {
            self.caps.invalidate_all();
            let classes: Vec<ClassId> = self.known_classes().collect();
            for class_id in classes {
                self.refresh_caps(class_id);
            }
        }
    }

    // =========================================================================
    // State access (persistence adapters, tests)
    // =========================================================================

    pub fn ledger(&self) -> &PreparationLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PreparationLedger {
        &mut self.ledger
    }

    pub fn set_ledger(&mut self, ledger: PreparationLedger) {
        self.ledger = ledger;
    }

    pub fn tracker(&self) -> &SwapTracker {
        &self.tracker
    }

    pub fn set_tracker(&mut self, tracker: SwapTracker) {
        self.tracker = tracker;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PreparationSource;

    fn wizard_progression() -> ClassProgression {
        ClassProgression::new("wizard", 5)
            .with_scale_value("cantrips-known", 4)
            .with_prepared_max(8)
    }

    fn engine_with_wizard() -> (PreparationEngine, ClassId) {
        let mut engine =
            PreparationEngine::new(RuleSetEdition::Modern, EnforcementBehavior::Enforced);
        let wizard = ClassId::new();
        engine.upsert_class(wizard, wizard_progression());
        (engine, wizard)
    }

    fn prepare_cantrips(engine: &mut PreparationEngine, class_id: ClassId, n: usize) -> Vec<SpellId> {
        (0..n)
            .map(|_| {
                let spell_id = SpellId::new();
                engine.ledger_mut().prepare(
                    class_id,
                    spell_id,
                    PreparedSpell::cantrip(),
                );
                spell_id
            })
            .collect()
    }

    mod config_resolution {
        use super::*;

        #[test]
        fn effective_config_defaults_by_archetype_and_edition() {
            let (engine, wizard) = engine_with_wizard();
            let config = engine.effective_config(wizard);
            assert_eq!(config.cantrip_swap_mode, SwapMode::OnLongRest);
        }

        #[test]
        fn stale_class_falls_back_to_generic_default() {
            let (engine, _) = engine_with_wizard();
            let stale = ClassId::new();
            let config = engine.effective_config(stale);
            assert_eq!(
                config,
                ClassRuleConfig::default_for(RuleSetEdition::Modern, ClassArchetype::Generic)
            );
        }

        #[test]
        fn override_wins_over_default() {
            let (mut engine, wizard) = engine_with_wizard();
            let update = ClassRuleConfigUpdate {
                cantrip_swap_mode: Some(SwapMode::Never),
                ..Default::default()
            };
            let config = engine.apply_config_update(wizard, &update).expect("known class");
            assert_eq!(config.cantrip_swap_mode, SwapMode::Never);
            assert_eq!(engine.effective_config(wizard).cantrip_swap_mode, SwapMode::Never);
        }

        #[test]
        fn update_for_unknown_class_is_not_found() {
            let (mut engine, _) = engine_with_wizard();
            let result = engine.apply_config_update(ClassId::new(), &Default::default());
            assert!(matches!(result, Err(DomainError::NotFound { .. })));
        }

        #[test]
        fn config_update_invalidates_caps_synchronously() {
            let (mut engine, wizard) = engine_with_wizard();
            assert_eq!(engine.caps(wizard).max_cantrips, 4);

            let update = ClassRuleConfigUpdate {
                cantrip_preparation_bonus: Some(2),
                ..Default::default()
            };
            engine.apply_config_update(wizard, &update).expect("known class");
            assert_eq!(engine.caps(wizard).max_cantrips, 6);
        }

        #[test]
        fn edition_change_moves_non_overridden_defaults() {
            let (mut engine, wizard) = engine_with_wizard();
            engine.set_edition(RuleSetEdition::Legacy);
            assert_eq!(engine.effective_config(wizard).cantrip_swap_mode, SwapMode::Never);
        }
    }

    mod cap_enforcement {
        use super::*;

        #[test]
        fn checking_at_cap_is_denied_regardless_of_swap_mode() {
            let (mut engine, wizard) = engine_with_wizard();
            prepare_cantrips(&mut engine, wizard, 4);

            for ctx in [PeriodContext::none(), PeriodContext::long_rest()] {
                let verdict =
                    engine.decide_cantrip_toggle(wizard, SpellId::new(), true, ctx);
                assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::CapReached));
            }
        }

        #[test]
        fn granted_cantrips_do_not_consume_cap() {
            let (mut engine, wizard) = engine_with_wizard();
            prepare_cantrips(&mut engine, wizard, 3);
            engine.ledger_mut().prepare(
                wizard,
                SpellId::new(),
                PreparedSpell::cantrip().with_source(PreparationSource::GrantedByFeature),
            );

            let verdict = engine.decide_cantrip_toggle(
                wizard,
                SpellId::new(),
                true,
                PeriodContext::none(),
            );
            assert_eq!(verdict, ToggleVerdict::Allowed);
        }

        #[test]
        fn leveled_spells_use_their_own_cap() {
            let (mut engine, wizard) = engine_with_wizard();
            for _ in 0..8 {
                engine
                    .ledger_mut()
                    .prepare(wizard, SpellId::new(), PreparedSpell::leveled(1));
            }
            let verdict = engine.decide_spell_toggle(
                wizard,
                SpellId::new(),
                true,
                PeriodContext::none(),
            );
            assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::CapReached));
        }
    }

    mod enforcement_modes {
        use super::*;

        #[test]
        fn unenforced_allows_everything() {
            let (mut engine, wizard) = engine_with_wizard();
            engine.set_enforcement(EnforcementBehavior::Unenforced);
            let cantrips = prepare_cantrips(&mut engine, wizard, 4);

            // Over cap, outside any period, uncheck under a restrictive mode
            assert_eq!(
                engine.decide_cantrip_toggle(
                    wizard,
                    SpellId::new(),
                    true,
                    PeriodContext::none()
                ),
                ToggleVerdict::Allowed
            );
            assert_eq!(
                engine.decide_cantrip_toggle(wizard, cantrips[0], false, PeriodContext::none()),
                ToggleVerdict::Allowed
            );
        }

        #[test]
        fn notify_only_allows_with_notice_over_cap() {
            let (mut engine, wizard) = engine_with_wizard();
            engine.set_enforcement(EnforcementBehavior::NotifyOnly);
            prepare_cantrips(&mut engine, wizard, 4);

            let verdict = engine.decide_cantrip_toggle(
                wizard,
                SpellId::new(),
                true,
                PeriodContext::none(),
            );
            assert_eq!(
                verdict,
                ToggleVerdict::AllowedWithNotice(DenyReason::CapReached)
            );
            assert!(verdict.is_allowed());

            // Under cap: no notice
            let verdict = engine.decide_cantrip_toggle(
                wizard,
                SpellId::new(),
                false,
                PeriodContext::none(),
            );
            assert_eq!(verdict, ToggleVerdict::Allowed);
        }
    }

    mod swap_gating {
        use super::*;

        #[test]
        fn never_mode_denies_unchecking_prepared_cantrips() {
            let (mut engine, wizard) = engine_with_wizard();
            engine.set_edition(RuleSetEdition::Legacy); // legacy wizard: Never
            let cantrips = prepare_cantrips(&mut engine, wizard, 2);

            let verdict = engine.decide_cantrip_toggle(
                wizard,
                cantrips[0],
                false,
                PeriodContext::long_rest(),
            );
            assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::SwapNotAllowed));
        }

        #[test]
        fn long_rest_swap_requires_being_inside_the_rest() {
            let (mut engine, wizard) = engine_with_wizard();
            let cantrips = prepare_cantrips(&mut engine, wizard, 4);

            let verdict = engine.decide_cantrip_toggle(
                wizard,
                cantrips[0],
                false,
                PeriodContext::none(),
            );
            assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::SwapNotAllowed));
        }

        #[test]
        fn long_rest_cantrip_swap_is_wizard_only() {
            let mut engine =
                PreparationEngine::new(RuleSetEdition::Modern, EnforcementBehavior::Enforced);
            let cleric = ClassId::new();
            engine.upsert_class(
                cleric,
                ClassProgression::new("cleric", 5)
                    .with_scale_value("cantrips-known", 4)
                    .with_prepared_max(8),
            );
            // Force the long-rest mode onto a non-wizard
            engine
                .apply_config_update(
                    cleric,
                    &ClassRuleConfigUpdate {
                        cantrip_swap_mode: Some(SwapMode::OnLongRest),
                        ..Default::default()
                    },
                )
                .expect("known class");
            let spell_id = SpellId::new();
            engine
                .ledger_mut()
                .prepare(cleric, spell_id, PreparedSpell::cantrip());

            let verdict = engine.decide_cantrip_toggle(
                cleric,
                spell_id,
                false,
                PeriodContext::long_rest(),
            );
            assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::SwapNotAllowed));
        }

        #[test]
        fn level_up_mode_opens_during_level_up() {
            let (mut engine, wizard) = engine_with_wizard();
            engine
                .apply_config_update(
                    wizard,
                    &ClassRuleConfigUpdate {
                        cantrip_swap_mode: Some(SwapMode::OnLevelUp),
                        ..Default::default()
                    },
                )
                .expect("known class");
            let cantrips = prepare_cantrips(&mut engine, wizard, 2);

            assert_eq!(
                engine.decide_cantrip_toggle(wizard, cantrips[0], false, PeriodContext::none()),
                ToggleVerdict::Denied(DenyReason::SwapNotAllowed)
            );
            assert_eq!(
                engine.decide_cantrip_toggle(
                    wizard,
                    cantrips[0],
                    false,
                    PeriodContext::level_up()
                ),
                ToggleVerdict::Allowed
            );
        }

        #[test]
        fn leveled_spells_need_no_freed_slot() {
            let (mut engine, wizard) = engine_with_wizard();
            // Wizard modern: spells swap on long rest; 3 of 8 prepared
            for _ in 0..3 {
                engine
                    .ledger_mut()
                    .prepare(wizard, SpellId::new(), PreparedSpell::leveled(1));
            }
            let verdict = engine.decide_spell_toggle(
                wizard,
                SpellId::new(),
                true,
                PeriodContext::long_rest(),
            );
            assert_eq!(verdict, ToggleVerdict::Allowed);
        }

        #[test]
        fn cantrips_must_unlearn_before_learning_inside_a_period() {
            let (mut engine, wizard) = engine_with_wizard();
            prepare_cantrips(&mut engine, wizard, 3); // under cap

            let verdict = engine.decide_cantrip_toggle(
                wizard,
                SpellId::new(),
                true,
                PeriodContext::long_rest(),
            );
            assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::MustUnlearnFirst));
        }
    }

    mod full_swap_scenario {
        use super::*;

        /// The wizard long-rest scenario from top to bottom: 4/4 cantrips,
        /// enforced, swap on long rest.
        #[test]
        fn one_swap_per_long_rest() {
            let (mut engine, wizard) = engine_with_wizard();
            let cantrips = prepare_cantrips(&mut engine, wizard, 4);
            let spell_a = cantrips[0];
            let spell_b = SpellId::new();
            let spell_d = cantrips[1];
            let ctx = PeriodContext::long_rest();

            // Uncheck A
            let verdict = engine.decide_cantrip_toggle(wizard, spell_a, false, ctx);
            assert_eq!(verdict, ToggleVerdict::Allowed);
            engine.commit_toggle(wizard, spell_a, false, PreparedSpell::cantrip(), ctx);
            assert_eq!(engine.ledger().cantrip_count(wizard), 3);

            // Check B
            let verdict = engine.decide_cantrip_toggle(wizard, spell_b, true, ctx);
            assert_eq!(verdict, ToggleVerdict::Allowed);
            engine.commit_toggle(wizard, spell_b, true, PreparedSpell::cantrip(), ctx);
            assert_eq!(engine.ledger().cantrip_count(wizard), 4);

            let state = engine
                .tracker()
                .state(wizard, PeriodKind::LongRest)
                .expect("swap recorded");
            assert_eq!(state.unlearned(), Some(spell_a));
            assert_eq!(state.learned(), Some(spell_b));

            // A second swap is blocked until the rest completes
            let verdict = engine.decide_cantrip_toggle(wizard, spell_d, false, ctx);
            assert_eq!(verdict, ToggleVerdict::Denied(DenyReason::OnlyOneSwap));

            engine.complete_period(PeriodKind::LongRest);
            assert!(engine.tracker().state(wizard, PeriodKind::LongRest).is_none());
            // Ledger contents are untouched by completion
            assert_eq!(engine.ledger().cantrip_count(wizard), 4);

            // Next rest: a fresh swap is legal again
            let verdict = engine.decide_cantrip_toggle(wizard, spell_d, false, ctx);
            assert_eq!(verdict, ToggleVerdict::Allowed);
        }

        #[test]
        fn undoing_a_swap_reopens_it() {
            let (mut engine, wizard) = engine_with_wizard();
            let cantrips = prepare_cantrips(&mut engine, wizard, 4);
            let spell_a = cantrips[0];
            let spell_c = cantrips[1];
            let ctx = PeriodContext::long_rest();

            engine.commit_toggle(wizard, spell_a, false, PreparedSpell::cantrip(), ctx);
            // Changed my mind: re-check A
            let verdict = engine.decide_cantrip_toggle(wizard, spell_a, true, ctx);
            assert_eq!(verdict, ToggleVerdict::Allowed);
            engine.commit_toggle(wizard, spell_a, true, PreparedSpell::cantrip(), ctx);

            // The swap slot is free again for C
            let verdict = engine.decide_cantrip_toggle(wizard, spell_c, false, ctx);
            assert_eq!(verdict, ToggleVerdict::Allowed);
        }
    }
}
