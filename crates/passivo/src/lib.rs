//! passivo: passive-file slot allocation and record keeping for school archives.

mod health;
mod persist;
mod version;

pub mod config;
pub mod cover;
pub mod logging;
pub mod records;
pub mod service;
pub mod slots;
pub mod store;
pub mod transport;

pub use config::{ConfigError, ServerConfig};
pub use cover::{CoverField, CoverSheet};
pub use health::Health;
pub use persist::PersistError;
pub use service::{ArchiveService, HealthSnapshot};
pub use slots::{
    AllocatorError, FileLedger, LedgerError, LedgerSnapshot, MemoryLedger, Occupancy, PoolType,
    ReleasedLedger, SlotAllocator, UnknownPool,
};
pub use store::{DocumentHolder, RecordQuery, RecordStore, StoreError};
pub use version::{PASSIVO_VERSION, VersionInfo};
