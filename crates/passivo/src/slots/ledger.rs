//! Released-set ledger: the durable record of reclaimable slot numbers.
//!
//! Every method is all-or-nothing. A failed call leaves the ledger exactly as
//! it was before the call.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pool::PoolType;
use crate::persist::{self, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger storage unavailable: {0}")]
    Storage(#[from] PersistError),
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Storage for released slot numbers, keyed by pool.
#[async_trait]
pub trait ReleasedLedger: Send + Sync {
    /// All released numbers in `pool`, ascending.
    async fn released(&self, pool: PoolType) -> Result<BTreeSet<u32>, LedgerError>;

    /// Add `number`. Returns `false` if it was already present.
    async fn insert(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError>;

    /// Remove `number`. Returns `false` if it was not present.
    async fn remove(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError>;

    /// Remove and return the smallest released number in `pool`.
    async fn take_smallest(&self, pool: PoolType) -> Result<Option<u32>, LedgerError>;
}

/// On-disk shape of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub student: BTreeSet<u32>,
    #[serde(default)]
    pub staff: BTreeSet<u32>,
}

impl LedgerSnapshot {
    fn pool(&self, pool: PoolType) -> &BTreeSet<u32> {
        match pool {
            PoolType::Student => &self.student,
            PoolType::Staff => &self.staff,
        }
    }

    fn pool_mut(&mut self, pool: PoolType) -> &mut BTreeSet<u32> {
        match pool {
            PoolType::Student => &mut self.student,
            PoolType::Staff => &mut self.staff,
        }
    }
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: StdMutex<LedgerSnapshot>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerSnapshot>, LedgerError> {
        self.inner.lock().map_err(|_| LedgerError::Poisoned)
    }
}

#[async_trait]
impl ReleasedLedger for MemoryLedger {
    async fn released(&self, pool: PoolType) -> Result<BTreeSet<u32>, LedgerError> {
        Ok(self.lock()?.pool(pool).clone())
    }

    async fn insert(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError> {
        Ok(self.lock()?.pool_mut(pool).insert(number))
    }

    async fn remove(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError> {
        Ok(self.lock()?.pool_mut(pool).remove(&number))
    }

    async fn take_smallest(&self, pool: PoolType) -> Result<Option<u32>, LedgerError> {
        Ok(self.lock()?.pool_mut(pool).pop_first())
    }
}

/// Ledger persisted as a JSON file.
///
/// Mutations are applied to a copy, written to disk, and only then become
/// visible in memory.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    inner: StdMutex<LedgerSnapshot>,
}

impl FileLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let snapshot = persist::load_json::<LedgerSnapshot>(&path)?.unwrap_or_default();
        tracing::debug!(
            path = %path.display(),
            student = snapshot.student.len(),
            staff = snapshot.staff.len(),
            "Opened released-slot ledger"
        );
        Ok(Self {
            path,
            inner: StdMutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to a copy of the ledger and commit it if it reports a change.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut LedgerSnapshot) -> (R, bool),
    ) -> Result<R, LedgerError> {
        let mut current = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut next = current.clone();
        let (result, changed) = f(&mut next);
        if changed {
            persist::store_json(&self.path, &next)?;
            *current = next;
        }
        Ok(result)
    }
}

#[async_trait]
impl ReleasedLedger for FileLedger {
    async fn released(&self, pool: PoolType) -> Result<BTreeSet<u32>, LedgerError> {
        let current = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(current.pool(pool).clone())
    }

    async fn insert(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError> {
        self.mutate(|s| {
            let added = s.pool_mut(pool).insert(number);
            (added, added)
        })
    }

    async fn remove(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError> {
        self.mutate(|s| {
            let removed = s.pool_mut(pool).remove(&number);
            (removed, removed)
        })
    }

    async fn take_smallest(&self, pool: PoolType) -> Result<Option<u32>, LedgerError> {
        self.mutate(|s| {
            let taken = s.pool_mut(pool).pop_first();
            (taken, taken.is_some())
        })
    }
}
