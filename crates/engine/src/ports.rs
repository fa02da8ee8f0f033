//! Outbound ports for the preparation service.
//!
//! The service owns no I/O of its own. Everything it needs from the host
//! application comes through these traits: a flag store for persistence,
//! a class data provider for progressions, a spell list oracle for
//! candidate legality, and a notification sink for user-facing messages.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use grimoire_domain::{CharacterId, ClassId, ClassProgression, SpellId, SpellListId};

/// Errors from the character flag store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("flag read failed for '{key}': {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("flag write rejected for '{key}': {reason}")]
    WriteRejected { key: String, reason: String },
}

impl StoreError {
    pub fn read_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn write_rejected(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Port for per-character flag persistence.
///
/// Flags are opaque JSON values under string keys. The store is the only
/// durable state the service relies on; everything else is rebuilt from
/// the class data provider on session open.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CharacterStorePort: Send + Sync {
    async fn get_flag(
        &self,
        character_id: CharacterId,
        key: &str,
    ) -> Result<Option<Value>, StoreError>;

    async fn set_flag(
        &self,
        character_id: CharacterId,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    async fn clear_flag(&self, character_id: CharacterId, key: &str) -> Result<(), StoreError>;
}

/// Port for class and progression data.
///
/// Synchronous by design: implementations are expected to serve from data
/// the host has already loaded for the character sheet.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ClassDataPort: Send + Sync {
    /// Classes currently present on the character.
    fn active_classes(&self, character_id: CharacterId) -> Vec<ClassId>;

    /// Progression snapshot for one class, `None` when the class is gone
    /// or has no spellcasting data.
    fn progression(
        &self,
        character_id: CharacterId,
        class_id: ClassId,
    ) -> Option<ClassProgression>;
}

/// Port answering whether a spell is a legal preparation candidate under
/// a given spell list.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SpellListPort: Send + Sync {
    fn is_legal_candidate(&self, list_id: SpellListId, class_id: ClassId, spell_id: SpellId)
        -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// Fire-and-forget notification sink for user-facing messages.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait NotificationPort: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}
