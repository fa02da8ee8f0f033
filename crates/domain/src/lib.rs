extern crate self as grimoire_domain;

pub mod caps;
pub mod decision;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod progression;
pub mod rules;
pub mod swap;

pub use error::DomainError;

// Re-export ID types
pub use ids::{CharacterId, ClassId, ClassSpellKey, SpellId, SpellListId};

// Re-export rule configuration types
pub use rules::{
    ClassArchetype, ClassRuleConfig, ClassRuleConfigUpdate, EnforcementBehavior,
    RitualCastingMode, RuleSetEdition, SwapMode,
};

// Re-export class data types
pub use progression::{ClassProgression, CANTRIP_SCALE_KEYS};

// Re-export preparation state types
pub use caps::{CapCache, CapSnapshot};
pub use ledger::{PreparationLedger, PreparationSource, PreparedSpell};
pub use swap::{PeriodKind, SwapTracker, SwapTrackingState};

// Re-export decision engine types
pub use decision::{DenyReason, PeriodContext, PreparationEngine, ToggleVerdict};
