//! Cache tiers and the manager composing them.

mod disk_store;
mod manager;
mod memory_store;

pub(crate) use disk_store::DiskStore;
pub use manager::CacheManager;
pub use memory_store::{MemoryStats, MemoryStore};
