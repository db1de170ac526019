//! Passive-slot allocation.
//!
//! Two pools of shelf numbers (students, staff) share one allocator:
//! - `acquire_next` reuses the smallest released number before growing the sequence
//! - `release` returns a number to its pool's ledger, idempotently
//! - `list_available` / `validate_assignment` drive manual picks in forms

mod allocator;
mod ledger;
mod pool;

pub use allocator::{AllocatorError, Occupancy, SlotAllocator};
pub use ledger::{FileLedger, LedgerError, LedgerSnapshot, MemoryLedger, ReleasedLedger};
pub use pool::{PoolType, UnknownPool};
