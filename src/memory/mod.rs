//! Per-session conversational memory.

pub mod store;

pub use store::VectorMemoryStore;
