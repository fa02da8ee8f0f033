//! In-memory flag store.
//!
//! Backs integration tests and demo setups. Writes can be made to fail on
//! demand to exercise persistence-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use grimoire_domain::CharacterId;

use crate::ports::{CharacterStorePort, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryCharacterStore {
    flags: RwLock<HashMap<(CharacterId, String), Value>>,
    fail_writes: AtomicBool,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return `StoreError::WriteRejected`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn flag_count(&self, character_id: CharacterId) -> usize {
        self.flags
            .read()
            .await
            .keys()
            .filter(|(id, _)| *id == character_id)
            .count()
    }
}

#[async_trait]
impl CharacterStorePort for InMemoryCharacterStore {
    async fn get_flag(
        &self,
        character_id: CharacterId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        let flags = self.flags.read().await;
        Ok(flags.get(&(character_id, key.to_string())).cloned())
    }

    async fn set_flag(
        &self,
        character_id: CharacterId,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write_rejected(key, "store unavailable"));
        }
        let mut flags = self.flags.write().await;
        flags.insert((character_id, key.to_string()), value);
        Ok(())
    }

    async fn clear_flag(&self, character_id: CharacterId, key: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write_rejected(key, "store unavailable"));
        }
        let mut flags = self.flags.write().await;
        flags.remove(&(character_id, key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_flags_per_character() {
        let store = InMemoryCharacterStore::new();
        let alice = CharacterId::new();
        let bob = CharacterId::new();

        store
            .set_flag(alice, "spellPrep.test", json!({"x": 1}))
            .await
            .expect("write succeeds");

        assert_eq!(
            store.get_flag(alice, "spellPrep.test").await.expect("read"),
            Some(json!({"x": 1}))
        );
        assert_eq!(store.get_flag(bob, "spellPrep.test").await.expect("read"), None);

        store.clear_flag(alice, "spellPrep.test").await.expect("clear");
        assert_eq!(store.flag_count(alice).await, 0);
    }

    #[tokio::test]
    async fn failing_writes_reject_but_reads_survive() {
        let store = InMemoryCharacterStore::new();
        let alice = CharacterId::new();
        store
            .set_flag(alice, "spellPrep.test", json!(true))
            .await
            .expect("write succeeds");

        store.set_fail_writes(true);
        let result = store.set_flag(alice, "spellPrep.test", json!(false)).await;
        assert!(matches!(result, Err(StoreError::WriteRejected { .. })));
        assert_eq!(
            store.get_flag(alice, "spellPrep.test").await.expect("read"),
            Some(json!(true))
        );
    }
}
