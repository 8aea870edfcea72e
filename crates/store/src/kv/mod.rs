//! Ordered key-value backends.
//!
//! Keys are opaque byte strings compared bytewise. Every stored entry carries
//! a version token that changes on each write; `compare_and_swap` is
//! conditioned on it.

use std::time::Duration;

use beacon_core::error::Result;

pub mod duck;
pub mod memory;

pub use duck::DuckKv;
pub use memory::MemoryKv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub entry: Entry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl ScanOptions {
    pub fn forward() -> Self {
        Self::default()
    }

    pub fn reverse() -> Self {
        Self {
            reverse: true,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub trait KvStore: Send + Sync {
    /// Expired entries read as absent.
    fn get(&self, key: &[u8]) -> Result<Option<Entry>>;

    /// Unconditional write; returns the new version.
    fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<u64>;

    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Live entries whose key strictly extends `prefix`, in key order.
    fn scan(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<KvPair>>;

    /// Writes only if the live version still equals `expected` (`None` meaning
    /// absent). A lost race returns `Ok(false)`.
    fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<u64>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool>;

    fn purge_expired(&self) -> Result<usize>;

    /// Releases the backend; later calls fail with `NotInitialized`.
    fn close(&self) -> Result<()>;
}

/// Exclusive upper bound of a prefix scan. Encoded key parts never start with
/// 0xFF, so every key extending `prefix` sorts below it.
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut upper = Vec::with_capacity(prefix.len() + 1);
    upper.extend_from_slice(prefix);
    upper.push(0xFF);
    upper
}
