//! Conformance tests for [`PersistenceStore`](crate::PersistenceStore) implementations.

mod store_builder;
mod suite;

pub use store_builder::StoreBuilder;
pub use suite::Suite;
