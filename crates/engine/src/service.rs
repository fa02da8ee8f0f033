//! The preparation service.
//!
//! One `CharacterSession` per character, opened explicitly and kept behind
//! a `tokio::sync::RwLock`. The session owns a domain `PreparationEngine`;
//! this layer adds flag persistence, spell-list legality checks on config
//! changes, period bookkeeping, and user notifications.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use grimoire_domain::{
    CapSnapshot, CharacterId, ClassId, ClassRuleConfig, ClassRuleConfigUpdate, DenyReason,
    DomainError, EnforcementBehavior, PeriodContext, PeriodKind, PreparationEngine, PreparedSpell,
    RuleSetEdition, SpellId, ToggleVerdict,
};

use crate::flags::{
    EditionFlag, LedgerFlag, LevelBaselineFlag, LongRestFlag, RuleConfigOverrideWire,
    RuleConfigsFlag, SwapStatesFlag, EDITION_KEY, LEDGER_KEY, LEVEL_BASELINE_KEY, LONG_REST_KEY,
    RULE_CONFIGS_KEY, SWAP_STATES_KEY,
};
use crate::ports::{
    CharacterStorePort, ClassDataPort, NotificationPort, Severity, SpellListPort, StoreError,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("flag encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("no open session for character {0}")]
    NoSession(CharacterId),
}

/// Result of a rule config update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied(ClassRuleConfig),
    /// A spell-list change would invalidate currently prepared spells.
    /// Nothing was changed; retry with `confirmed = true` to proceed.
    RequiresConfirmation { invalidated: Vec<SpellId> },
}

struct CharacterSession {
    engine: PreparationEngine,
    long_rest_active: bool,
    baseline_level: u32,
    baseline_cantrip_cap: u32,
}

impl CharacterSession {
    /// A level-up period is open while the character's level or cantrip cap
    /// has grown past the stored baseline; a long rest is open between
    /// `begin_long_rest` and `complete_long_rest`.
    fn period_context(&self) -> PeriodContext {
        PeriodContext {
            during_level_up: self.engine.total_level() > self.baseline_level
                || self.engine.total_cantrip_cap() > self.baseline_cantrip_cap,
            during_long_rest: self.long_rest_active,
        }
    }
}

/// Session-managing facade over the domain engine.
pub struct PreparationService {
    store: Arc<dyn CharacterStorePort>,
    class_data: Arc<dyn ClassDataPort>,
    spell_lists: Arc<dyn SpellListPort>,
    notifier: Arc<dyn NotificationPort>,
    enforcement: EnforcementBehavior,
    default_edition: RuleSetEdition,
    sessions: RwLock<HashMap<CharacterId, CharacterSession>>,
}

impl PreparationService {
    pub fn new(
        store: Arc<dyn CharacterStorePort>,
        class_data: Arc<dyn ClassDataPort>,
        spell_lists: Arc<dyn SpellListPort>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            store,
            class_data,
            spell_lists,
            notifier,
            enforcement: EnforcementBehavior::Enforced,
            default_edition: RuleSetEdition::default(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_enforcement(mut self, enforcement: EnforcementBehavior) -> Self {
        self.enforcement = enforcement;
        self
    }

    pub fn with_default_edition(mut self, edition: RuleSetEdition) -> Self {
        self.default_edition = edition;
        self
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Open (or rebuild) the session for a character: pull class data and
    /// restore all persisted flags.
    pub async fn open_session(&self, character_id: CharacterId) -> Result<(), ServiceError> {
        let edition = self
            .load_flag::<EditionFlag>(character_id, EDITION_KEY)
            .await?
            .map(|flag| flag.edition)
            .unwrap_or(self.default_edition);

        let mut engine = PreparationEngine::new(edition, self.enforcement);
        for class_id in self.class_data.active_classes(character_id) {
            match self.class_data.progression(character_id, class_id) {
                Some(progression) => engine.upsert_class(class_id, progression),
                None => {
                    warn!(%character_id, %class_id, "active class has no progression data");
                }
            }
        }

        if let Some(flag) = self
            .load_flag::<RuleConfigsFlag>(character_id, RULE_CONFIGS_KEY)
            .await?
        {
            for wire in flag.overrides {
                if engine.is_known_class(wire.class_id) {
                    engine.set_config_override(wire.class_id, wire.config);
                } else {
                    warn!(
                        %character_id,
                        class_id = %wire.class_id,
                        "stored rule config for a class no longer on the character"
                    );
                }
            }
        }

        if let Some(flag) = self.load_flag::<LedgerFlag>(character_id, LEDGER_KEY).await? {
            engine.set_ledger(flag.decode());
        }
        if let Some(flag) = self
            .load_flag::<SwapStatesFlag>(character_id, SWAP_STATES_KEY)
            .await?
        {
            engine.set_tracker(flag.decode());
        }

        let long_rest_active = self
            .load_flag::<LongRestFlag>(character_id, LONG_REST_KEY)
            .await?
            .map(|flag| flag.active)
            .unwrap_or(false);

        let baseline = match self
            .load_flag::<LevelBaselineFlag>(character_id, LEVEL_BASELINE_KEY)
            .await?
        {
            Some(flag) => flag,
            None => {
                // First session for this character: current state becomes the
                // baseline, so no level-up period opens retroactively.
                let flag =
                    LevelBaselineFlag::observed_now(engine.total_level(), engine.total_cantrip_cap());
                self.persist_flag(character_id, LEVEL_BASELINE_KEY, &flag)
                    .await?;
                flag
            }
        };

        debug!(%character_id, classes = engine.known_classes().count(), "session opened");
        let session = CharacterSession {
            engine,
            long_rest_active,
            baseline_level: baseline.previous_level,
            baseline_cantrip_cap: baseline.previous_cantrip_cap,
        };
        self.sessions.write().await.insert(character_id, session);
        Ok(())
    }

    pub async fn close_session(&self, character_id: CharacterId) {
        self.sessions.write().await.remove(&character_id);
    }

    /// Re-pull class data after the host reports a sheet change. Classes
    /// that disappeared are dropped; new or changed classes are upserted.
    /// A level gain becomes visible to period detection here.
    pub async fn refresh_classes(&self, character_id: CharacterId) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;

        let active = self.class_data.active_classes(character_id);
        let stale: Vec<ClassId> = session
            .engine
            .known_classes()
            .filter(|class_id| !active.contains(class_id))
            .collect();
        for class_id in stale {
            debug!(%character_id, %class_id, "dropping class no longer on the character");
            session.engine.remove_class(class_id);
        }
        for class_id in active {
            match self.class_data.progression(character_id, class_id) {
                Some(progression) => session.engine.upsert_class(class_id, progression),
                None => warn!(%character_id, %class_id, "active class has no progression data"),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Rule configuration
    // =========================================================================

    /// Effective rule config for a class: stored override while the class
    /// is active, otherwise edition defaults. A stale class identifier logs
    /// a warning and falls back to the generic default.
    pub async fn resolve_config(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
    ) -> Result<ClassRuleConfig, ServiceError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;
        if !session.engine.is_known_class(class_id) {
            warn!(%character_id, %class_id, "resolving config for unknown class, using defaults");
        }
        Ok(session.engine.effective_config(class_id))
    }

    /// Merge a partial rule config update for one class.
    ///
    /// Changing the custom spell list checks every currently prepared spell
    /// of that class against the new list first. If any would become
    /// illegal, nothing happens until the caller confirms; on confirmation
    /// those entries are removed from this class's ledger only.
    pub async fn update_config(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
        update: &ClassRuleConfigUpdate,
        confirmed: bool,
    ) -> Result<UpdateOutcome, ServiceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;

        let current = session.engine.effective_config(class_id);
        let mut ledger_changed = false;

        if update.changes_spell_list(current.custom_spell_list) {
            if let Some(new_list) = update.custom_spell_list {
                let invalidated: Vec<SpellId> = session
                    .engine
                    .ledger()
                    .prepared_for_class(class_id)
                    .into_iter()
                    .filter(|spell_id| {
                        !self
                            .spell_lists
                            .is_legal_candidate(new_list, class_id, *spell_id)
                    })
                    .collect();

                if !invalidated.is_empty() {
                    if !confirmed {
                        debug!(
                            %character_id,
                            %class_id,
                            count = invalidated.len(),
                            "spell list change needs confirmation"
                        );
                        return Ok(UpdateOutcome::RequiresConfirmation { invalidated });
                    }
                    let removed = session
                        .engine
                        .ledger_mut()
                        .remove_spells(class_id, &invalidated);
                    warn!(
                        %character_id,
                        %class_id,
                        removed,
                        "unprepared spells invalidated by spell list change"
                    );
                    ledger_changed = removed > 0;
                }
            }
        }

        let config = session.engine.apply_config_update(class_id, update)?;

        let configs_flag = encode_overrides(&session.engine);
        let ledger_flag = ledger_changed.then(|| LedgerFlag::encode(session.engine.ledger()));
        self.persist_flag(character_id, RULE_CONFIGS_KEY, &configs_flag)
            .await?;
        if let Some(flag) = ledger_flag {
            self.persist_flag(character_id, LEDGER_KEY, &flag).await?;
        }
        Ok(UpdateOutcome::Applied(config))
    }

    /// Switch the character's rule-set edition; defaults and caps follow.
    pub async fn set_edition(
        &self,
        character_id: CharacterId,
        edition: RuleSetEdition,
    ) -> Result<(), ServiceError> {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&character_id)
                .ok_or(ServiceError::NoSession(character_id))?;
            session.engine.set_edition(edition);
        }
        self.persist_flag(character_id, EDITION_KEY, &EditionFlag { edition })
            .await
    }

    // =========================================================================
    // Toggles
    // =========================================================================

    /// Decide whether a toggle would be accepted right now. Read-only.
    pub async fn decide_toggle(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
        spell_id: SpellId,
        checking: bool,
        detail: PreparedSpell,
    ) -> Result<ToggleVerdict, ServiceError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;
        Ok(decide(&session.engine, class_id, spell_id, checking, detail, session.period_context()))
    }

    /// Decide and, if accepted, commit a toggle.
    ///
    /// On acceptance the ledger and swap tracker mutate first, then the
    /// flags persist. A persistence failure is reported to the notification
    /// sink and the error log but is not rolled back; the in-session state
    /// keeps the change and the verdict is still returned.
    pub async fn apply_toggle(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
        spell_id: SpellId,
        checking: bool,
        detail: PreparedSpell,
    ) -> Result<ToggleVerdict, ServiceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;

        let ctx = session.period_context();
        let verdict = decide(&session.engine, class_id, spell_id, checking, detail, ctx);
        match verdict {
            ToggleVerdict::Denied(reason) => {
                debug!(%character_id, %class_id, %spell_id, reason = reason.code(), "toggle denied");
                return Ok(verdict);
            }
            ToggleVerdict::AllowedWithNotice(reason) => {
                self.notifier.notify(deny_message(reason), Severity::Warning);
            }
            ToggleVerdict::Allowed => {}
        }

        let changed = session
            .engine
            .commit_toggle(class_id, spell_id, checking, detail, ctx);
        if !changed {
            return Ok(verdict);
        }

        let ledger_flag = LedgerFlag::encode(session.engine.ledger());
        let swap_flag = SwapStatesFlag::encode(session.engine.tracker());
        if let Err(err) = self
            .persist_toggle_flags(character_id, &ledger_flag, &swap_flag)
            .await
        {
            error!(%character_id, %err, "failed to persist preparation flags");
            self.notifier
                .notify("Spell preparation changes could not be saved", Severity::Warning);
        }
        Ok(verdict)
    }

    async fn persist_toggle_flags(
        &self,
        character_id: CharacterId,
        ledger: &LedgerFlag,
        swaps: &SwapStatesFlag,
    ) -> Result<(), ServiceError> {
        self.persist_flag(character_id, LEDGER_KEY, ledger).await?;
        self.persist_flag(character_id, SWAP_STATES_KEY, swaps).await
    }

    // =========================================================================
    // Periods
    // =========================================================================

    pub async fn begin_long_rest(&self, character_id: CharacterId) -> Result<(), ServiceError> {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&character_id)
                .ok_or(ServiceError::NoSession(character_id))?;
            session.long_rest_active = true;
        }
        self.persist_flag(character_id, LONG_REST_KEY, &LongRestFlag::begun_now())
            .await
    }

    /// Close the long rest: swap tracking for the rest clears, the ledger
    /// keeps its contents.
    pub async fn complete_long_rest(&self, character_id: CharacterId) -> Result<(), ServiceError> {
        let swap_flag = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&character_id)
                .ok_or(ServiceError::NoSession(character_id))?;
            session.engine.complete_period(PeriodKind::LongRest);
            session.long_rest_active = false;
            SwapStatesFlag::encode(session.engine.tracker())
        };
        self.store.clear_flag(character_id, LONG_REST_KEY).await?;
        self.persist_flag(character_id, SWAP_STATES_KEY, &swap_flag)
            .await
    }

    /// Close the level-up period: swap tracking for it clears and the
    /// current level and cantrip cap become the new baseline.
    pub async fn complete_level_up(&self, character_id: CharacterId) -> Result<(), ServiceError> {
        let (swap_flag, baseline_flag) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&character_id)
                .ok_or(ServiceError::NoSession(character_id))?;
            session.engine.complete_period(PeriodKind::LevelUp);
            let baseline = LevelBaselineFlag::observed_now(
                session.engine.total_level(),
                session.engine.total_cantrip_cap(),
            );
            session.baseline_level = baseline.previous_level;
            session.baseline_cantrip_cap = baseline.previous_cantrip_cap;
            (SwapStatesFlag::encode(session.engine.tracker()), baseline)
        };
        self.persist_flag(character_id, SWAP_STATES_KEY, &swap_flag)
            .await?;
        self.persist_flag(character_id, LEVEL_BASELINE_KEY, &baseline_flag)
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn caps(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
    ) -> Result<CapSnapshot, ServiceError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;
        Ok(session.engine.caps(class_id))
    }

    pub async fn prepared_spells(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
    ) -> Result<Vec<SpellId>, ServiceError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;
        Ok(session
            .engine
            .ledger()
            .prepared_for_class(class_id)
            .into_iter()
            .collect())
    }

    pub async fn is_long_rest_active(
        &self,
        character_id: CharacterId,
    ) -> Result<bool, ServiceError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&character_id)
            .ok_or(ServiceError::NoSession(character_id))?;
        Ok(session.long_rest_active)
    }

    // =========================================================================
    // Flag I/O
    // =========================================================================

    async fn persist_flag<T: Serialize>(
        &self,
        character_id: CharacterId,
        key: &str,
        value: &T,
    ) -> Result<(), ServiceError> {
        let json = serde_json::to_value(value)?;
        self.store.set_flag(character_id, key, json).await?;
        Ok(())
    }

    /// Missing and malformed flags both read as `None`; a malformed flag
    /// additionally logs a warning so bad data does not fail a session open.
    async fn load_flag<T: DeserializeOwned>(
        &self,
        character_id: CharacterId,
        key: &str,
    ) -> Result<Option<T>, ServiceError> {
        match self.store.get_flag(character_id, key).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(decoded) => Ok(Some(decoded)),
                Err(err) => {
                    warn!(%character_id, key, %err, "ignoring malformed flag");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

fn decide(
    engine: &PreparationEngine,
    class_id: ClassId,
    spell_id: SpellId,
    checking: bool,
    detail: PreparedSpell,
    ctx: PeriodContext,
) -> ToggleVerdict {
    if detail.is_cantrip() {
        engine.decide_cantrip_toggle(class_id, spell_id, checking, ctx)
    } else {
        engine.decide_spell_toggle(class_id, spell_id, checking, ctx)
    }
}

fn encode_overrides(engine: &PreparationEngine) -> RuleConfigsFlag {
    RuleConfigsFlag {
        overrides: engine
            .config_overrides()
            .map(|(class_id, config)| RuleConfigOverrideWire {
                class_id,
                config: config.clone(),
            })
            .collect(),
    }
}

fn deny_message(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::CapReached => "Preparation cap reached",
        DenyReason::SwapNotAllowed => "Swapping is not allowed right now",
        DenyReason::OnlyOneSwap => "Only one swap is allowed per period",
        DenyReason::MustUnlearnFirst => "Unlearn a cantrip before learning a new one",
    }
}
