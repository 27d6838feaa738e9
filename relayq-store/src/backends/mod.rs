//! Message store implementations
//!
//! - `sqlite`: durable store shared between relay processes
//! - `memory`: in-process store for tests and development

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
