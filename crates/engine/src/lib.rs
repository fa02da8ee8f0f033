//! Grimoire engine: preparation services over the domain rule engine.
//!
//! The domain crate decides; this crate wires those decisions to a host
//! application through outbound ports, persists state as character flags,
//! and manages per-character sessions.

pub mod flags;
pub mod memory;
pub mod ports;
pub mod service;

pub use memory::InMemoryCharacterStore;
pub use ports::{
    CharacterStorePort, ClassDataPort, NotificationPort, Severity, SpellListPort, StoreError,
};
pub use service::{PreparationService, ServiceError, UpdateOutcome};
