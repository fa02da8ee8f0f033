//! Per-class preparation rule configuration.
//!
//! Every class with active spellcasting has an effective `ClassRuleConfig` at
//! all times: either a stored per-class override, or a default derived from
//! the character's rule-set edition and the class archetype. Resolution never
//! yields "no config".

use serde::{Deserialize, Serialize};

use crate::ids::SpellListId;

/// When a prepared cantrip or spell may be swapped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapMode {
    /// Preparation is fixed once made.
    Never,
    /// One swap per level-up period.
    OnLevelUp,
    /// One swap per long-rest period.
    OnLongRest,
}

/// How ritual-tagged spells may be cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RitualCastingMode {
    Never,
    WhenPrepared,
    Always,
}

/// Whether rule violations block an action, warn, or are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnforcementBehavior {
    Unenforced,
    NotifyOnly,
    Enforced,
}

/// The two built-in default tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleSetEdition {
    Legacy,
    Modern,
}

impl Default for RuleSetEdition {
    fn default() -> Self {
        Self::Legacy
    }
}

/// Closed set of class archetypes the default tables are keyed by.
///
/// Classification is by class identifier; anything unrecognized falls into
/// `Generic` (swap on level-up, cantrips visible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassArchetype {
    Wizard,
    /// Cleric and druid: prepared divine casters.
    PreparedDivine,
    Paladin,
    Ranger,
    /// Bard, sorcerer, and warlock: casters with a fixed known list.
    Spontaneous,
    Artificer,
    /// Unknown or homebrew classes.
    Generic,
}

impl ClassArchetype {
    /// Classify a class identifier string into an archetype.
    pub fn classify(identifier: &str) -> Self {
        match identifier.to_lowercase().as_str() {
            "wizard" => Self::Wizard,
            "cleric" | "druid" => Self::PreparedDivine,
            "paladin" => Self::Paladin,
            "ranger" => Self::Ranger,
            "bard" | "sorcerer" | "warlock" => Self::Spontaneous,
            "artificer" => Self::Artificer,
            _ => Self::Generic,
        }
    }

    /// Only wizards may replace a cantrip when finishing a long rest.
    pub fn supports_long_rest_cantrip_swap(self) -> bool {
        matches!(self, Self::Wizard)
    }
}

/// Effective preparation rules for one class on one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRuleConfig {
    pub cantrip_swap_mode: SwapMode,
    pub spell_swap_mode: SwapMode,
    pub ritual_casting_mode: RitualCastingMode,
    pub show_cantrips: bool,
    /// Additive to the computed cantrip cap; may be negative.
    pub cantrip_preparation_bonus: i32,
    /// Additive to the computed spell cap; may be negative.
    pub spell_preparation_bonus: i32,
    /// Optional external spell-list reference (opaque to this core).
    pub custom_spell_list: Option<SpellListId>,
}

impl ClassRuleConfig {
    /// Default configuration for an archetype under the given edition.
    pub fn default_for(edition: RuleSetEdition, archetype: ClassArchetype) -> Self {
        let (cantrip_swap_mode, spell_swap_mode, ritual_casting_mode, show_cantrips) =
            match edition {
                RuleSetEdition::Legacy => match archetype {
                    ClassArchetype::Wizard => (
                        SwapMode::Never,
                        SwapMode::OnLongRest,
                        RitualCastingMode::Always,
                        true,
                    ),
                    ClassArchetype::PreparedDivine => (
                        SwapMode::Never,
                        SwapMode::OnLongRest,
                        RitualCastingMode::WhenPrepared,
                        true,
                    ),
                    ClassArchetype::Paladin => (
                        SwapMode::Never,
                        SwapMode::OnLongRest,
                        RitualCastingMode::Never,
                        false,
                    ),
                    ClassArchetype::Ranger => (
                        SwapMode::Never,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::Never,
                        false,
                    ),
                    ClassArchetype::Spontaneous => (
                        SwapMode::Never,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::WhenPrepared,
                        true,
                    ),
                    ClassArchetype::Artificer => (
                        SwapMode::OnLongRest,
                        SwapMode::OnLongRest,
                        RitualCastingMode::WhenPrepared,
                        true,
                    ),
                    ClassArchetype::Generic => (
                        SwapMode::Never,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::Never,
                        true,
                    ),
                },
                RuleSetEdition::Modern => match archetype {
                    ClassArchetype::Wizard => (
                        SwapMode::OnLongRest,
                        SwapMode::OnLongRest,
                        RitualCastingMode::Always,
                        true,
                    ),
                    ClassArchetype::PreparedDivine => (
                        SwapMode::OnLevelUp,
                        SwapMode::OnLongRest,
                        RitualCastingMode::WhenPrepared,
                        true,
                    ),
                    ClassArchetype::Paladin => (
                        SwapMode::Never,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::Never,
                        false,
                    ),
                    ClassArchetype::Ranger => (
                        SwapMode::Never,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::Never,
                        false,
                    ),
                    ClassArchetype::Spontaneous => (
                        SwapMode::OnLevelUp,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::WhenPrepared,
                        true,
                    ),
                    ClassArchetype::Artificer => (
                        SwapMode::OnLevelUp,
                        SwapMode::OnLongRest,
                        RitualCastingMode::WhenPrepared,
                        true,
                    ),
                    ClassArchetype::Generic => (
                        SwapMode::OnLevelUp,
                        SwapMode::OnLevelUp,
                        RitualCastingMode::Never,
                        true,
                    ),
                },
            };

        Self {
            cantrip_swap_mode,
            spell_swap_mode,
            ritual_casting_mode,
            show_cantrips,
            cantrip_preparation_bonus: 0,
            spell_preparation_bonus: 0,
            custom_spell_list: None,
        }
    }

    /// Merge a partial update into this configuration.
    pub fn apply(&mut self, update: &ClassRuleConfigUpdate) {
        if let Some(mode) = update.cantrip_swap_mode {
            self.cantrip_swap_mode = mode;
        }
        if let Some(mode) = update.spell_swap_mode {
            self.spell_swap_mode = mode;
        }
        if let Some(mode) = update.ritual_casting_mode {
            self.ritual_casting_mode = mode;
        }
        if let Some(show) = update.show_cantrips {
            self.show_cantrips = show;
        }
        if let Some(bonus) = update.cantrip_preparation_bonus {
            self.cantrip_preparation_bonus = bonus;
        }
        if let Some(bonus) = update.spell_preparation_bonus {
            self.spell_preparation_bonus = bonus;
        }
        if let Some(list) = update.custom_spell_list {
            self.custom_spell_list = Some(list);
        }
        if update.clear_custom_spell_list {
            self.custom_spell_list = None;
        }
    }
}

/// Partial update for a `ClassRuleConfig`; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRuleConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cantrip_swap_mode: Option<SwapMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_swap_mode: Option<SwapMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ritual_casting_mode: Option<RitualCastingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_cantrips: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cantrip_preparation_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_preparation_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_spell_list: Option<SpellListId>,
    /// Explicitly remove any custom spell list.
    #[serde(default)]
    pub clear_custom_spell_list: bool,
}

impl ClassRuleConfigUpdate {
    /// True if applying this update would change the effective spell list.
    pub fn changes_spell_list(&self, current: Option<SpellListId>) -> bool {
        if self.clear_custom_spell_list {
            return current.is_some();
        }
        match self.custom_spell_list {
            Some(list) => current != Some(list),
            None => false,
        }
    }
}
