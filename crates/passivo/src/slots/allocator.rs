//! Slot allocator: hands out, reclaims and lists shelf numbers per pool.
//!
//! A number is always in exactly one of three places: assigned to a live
//! record, sitting in the released ledger, or never issued. The allocator
//! owns the ledger; the record store owns assignments and passes a view of
//! them in as an [`Occupancy`].

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::ledger::{LedgerError, ReleasedLedger};
use super::pool::PoolType;

/// Read-only view of the numbers currently assigned to live records in one pool.
pub trait Occupancy {
    fn is_assigned(&self, number: u32) -> bool;
    fn max_assigned(&self) -> Option<u32>;
}

impl Occupancy for BTreeSet<u32> {
    fn is_assigned(&self, number: u32) -> bool {
        self.contains(&number)
    }

    fn max_assigned(&self) -> Option<u32> {
        self.last().copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{pool} pool has no slot numbers left")]
    Exhausted { pool: PoolType },
}

/// The number after `current`, or `Exhausted` at the top of the range.
fn next_number(pool: PoolType, current: u32) -> Result<u32, AllocatorError> {
    current
        .checked_add(1)
        .ok_or(AllocatorError::Exhausted { pool })
}

#[derive(Debug, Default)]
struct PoolState {
    /// Highest number handed out or consumed by this process. The sequence
    /// never restarts below it, even before the caller's record is written.
    last_issued: u32,
}

/// Allocator over a shared released-set ledger.
///
/// Each pool has its own lock, held only for the read-smallest-and-remove
/// step of [`acquire_next`](Self::acquire_next), never across the caller's
/// entity write.
pub struct SlotAllocator {
    ledger: Arc<dyn ReleasedLedger>,
    student: Mutex<PoolState>,
    staff: Mutex<PoolState>,
}

impl SlotAllocator {
    pub fn new(ledger: Arc<dyn ReleasedLedger>) -> Self {
        Self {
            ledger,
            student: Mutex::new(PoolState::default()),
            staff: Mutex::new(PoolState::default()),
        }
    }

    fn state(&self, pool: PoolType) -> &Mutex<PoolState> {
        match pool {
            PoolType::Student => &self.student,
            PoolType::Staff => &self.staff,
        }
    }

    /// Numbers a form may offer for `pool`.
    ///
    /// Released numbers still assigned to a live record are filtered out. If
    /// nothing is left, the only offer is the next sequential number.
    pub async fn list_available<O>(
        &self,
        pool: PoolType,
        occupancy: &O,
    ) -> Result<Vec<u32>, AllocatorError>
    where
        O: Occupancy + ?Sized,
    {
        let released = self.ledger.released(pool).await?;
        let free: Vec<u32> = released
            .into_iter()
            .filter(|n| !occupancy.is_assigned(*n))
            .collect();

        if !free.is_empty() {
            return Ok(free);
        }
        Ok(vec![next_number(pool, occupancy.max_assigned().unwrap_or(0))?])
    }

    /// Reserve a number for a record about to be written.
    ///
    /// Reuses the smallest released number before growing the sequence. If the
    /// caller's write fails, it must hand the number back with [`release`](Self::release).
    pub async fn acquire_next<O>(&self, pool: PoolType, occupancy: &O) -> Result<u32, AllocatorError>
    where
        O: Occupancy + ?Sized,
    {
        let mut state = self.state(pool).lock().await;

        while let Some(number) = self.ledger.take_smallest(pool).await? {
            if occupancy.is_assigned(number) {
                tracing::warn!(
                    pool = %pool,
                    number,
                    "Released slot is still assigned - discarding ledger entry"
                );
                continue;
            }
            state.last_issued = state.last_issued.max(number);
            tracing::debug!(pool = %pool, number, "Reusing released slot");
            return Ok(number);
        }

        let next = next_number(
            pool,
            occupancy.max_assigned().unwrap_or(0).max(state.last_issued),
        )?;
        state.last_issued = next;
        tracing::debug!(pool = %pool, number = next, "Issuing next sequential slot");
        Ok(next)
    }

    /// Return a number to the released set.
    ///
    /// `None` and `0` are ignored. Releasing a number that is already released
    /// is a no-op. Returns whether the ledger changed.
    pub async fn release(&self, number: Option<u32>, pool: PoolType) -> Result<bool, AllocatorError> {
        let Some(number) = number.filter(|n| *n != 0) else {
            return Ok(false);
        };

        let _state = self.state(pool).lock().await;
        let added = self.ledger.insert(number, pool).await?;
        if added {
            tracing::info!(pool = %pool, number, "Slot released");
        } else {
            tracing::debug!(pool = %pool, number, "Slot already released");
        }
        Ok(added)
    }

    /// Whether a manually chosen `number` is one of the current offers.
    pub async fn validate_assignment<O>(
        &self,
        number: u32,
        pool: PoolType,
        occupancy: &O,
    ) -> Result<bool, AllocatorError>
    where
        O: Occupancy + ?Sized,
    {
        Ok(self.list_available(pool, occupancy).await?.contains(&number))
    }

    /// Mark a validated manual pick as taken.
    ///
    /// Removes `number` from the released set if present and keeps the
    /// sequential counter from handing it out again. Returns whether a ledger
    /// entry was consumed.
    pub async fn consume(&self, number: u32, pool: PoolType) -> Result<bool, AllocatorError> {
        let mut state = self.state(pool).lock().await;
        let removed = self.ledger.remove(number, pool).await?;
        state.last_issued = state.last_issued.max(number);
        tracing::debug!(pool = %pool, number, from_ledger = removed, "Slot consumed");
        Ok(removed)
    }
}
