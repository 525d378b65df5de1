

pub mod memory;
pub mod models;
pub mod store;

pub use memory::{InMemoryStore, MemoryTransaction};
pub use models::{EntityId, EntityRecord, ForeignKey};
pub use store::{EntityStore, StateFilter, StoreError, StoreTransaction};
