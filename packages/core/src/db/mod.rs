//! Persistence Layer
//!
//! The annotation model never owns durable storage. It talks to a remote
//! domain store through the [`DomainStore`] trait:
//!
//! - `store` - the async trait the model persists through
//! - `memory_store` - in-memory implementation with failure injection
//! - `events` - change notifications published after successful persistence
//! - `error` - store error taxonomy

pub mod error;
pub mod events;
pub mod memory_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use events::AnnotationEvent;
pub use memory_store::InMemoryStore;
pub use store::DomainStore;
