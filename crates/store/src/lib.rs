pub mod analytics;
pub mod counters;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod key;
pub mod keys;
pub mod kv;
pub mod registry;
pub mod retention;
pub mod retry;
pub mod schema;
pub mod spans;

#[cfg(test)]
mod test_support;

pub use db::{Store, StoreOptions, Versioned};
pub use kv::{DuckKv, KvStore, MemoryKv};
pub use retry::RetryPolicy;
