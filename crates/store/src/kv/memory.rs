use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use beacon_core::error::{BeaconError, Result};

use super::{Entry, KvPair, KvStore, ScanOptions, prefix_upper_bound};

#[derive(Debug)]
struct KvEntry {
    value: Vec<u8>,
    version: u64,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<Vec<u8>, KvEntry>,
    next_version: u64,
    closed: bool,
}

impl MemoryState {
    fn insert(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> u64 {
        self.next_version += 1;
        self.entries.insert(
            key.to_vec(),
            KvEntry {
                value: value.to_vec(),
                version: self.next_version,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        self.next_version
    }
}

/// Process-local ordered map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        let state = self.state.read().expect("memory kv lock poisoned");
        if state.closed {
            return Err(BeaconError::NotInitialized);
        }
        Ok(state)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        let state = self.state.write().expect("memory kv lock poisoned");
        if state.closed {
            return Err(BeaconError::NotInitialized);
        }
        Ok(state)
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let state = self.read()?;
        let now = Instant::now();
        Ok(state
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| Entry {
                value: e.value.clone(),
                version: e.version,
            }))
    }

    fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<u64> {
        let mut state = self.write()?;
        Ok(state.insert(key, value, ttl))
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut state = self.write()?;
        Ok(state.entries.remove(key).is_some())
    }

    fn scan(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<KvPair>> {
        let state = self.read()?;
        let now = Instant::now();
        let upper = prefix_upper_bound(prefix);
        let range = state.entries.range::<[u8], _>((
            Bound::Excluded(prefix),
            Bound::Excluded(upper.as_slice()),
        ));
        let live = |(k, e): (&Vec<u8>, &KvEntry)| {
            e.is_live(now).then(|| KvPair {
                key: k.clone(),
                entry: Entry {
                    value: e.value.clone(),
                    version: e.version,
                },
            })
        };
        let limit = opts.limit.unwrap_or(usize::MAX);

        let pairs: Vec<KvPair> = if opts.reverse {
            range.rev().filter_map(live).take(limit).collect()
        } else {
            range.filter_map(live).take(limit).collect()
        };
        Ok(pairs)
    }

    fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<u64>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let mut state = self.write()?;
        let now = Instant::now();
        let current = state
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.version);

        let matches = match (expected, current) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == cur,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }

        state.insert(key, value, ttl);
        Ok(true)
    }

    fn purge_expired(&self) -> Result<usize> {
        let mut state = self.write()?;
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, e| e.is_live(now));
        Ok(before - state.entries.len())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.write().expect("memory kv lock poisoned");
        state.entries.clear();
        state.closed = true;
        Ok(())
    }
}
