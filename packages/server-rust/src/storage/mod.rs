//! Balance store implementations.
//!
//! - [`MemoryBalanceStore`]: `DashMap`-backed, for tests and ephemeral runs
//! - [`RedbBalanceStore`]: persistent embedded store (feature `redb`)

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb;

pub use memory::MemoryBalanceStore;
#[cfg(feature = "redb")]
pub use self::redb::RedbBalanceStore;
