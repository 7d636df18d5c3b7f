//! Backend Adapter: abstract CRUD over remote entities, per spec §6.

pub mod adapter;
pub mod cache;
pub mod memory;

pub use adapter::{BackendAdapter, ListOptions};
pub use memory::InMemoryBackend;
