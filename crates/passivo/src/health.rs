//! Health status types for the archive service.

use serde::{Deserialize, Serialize};

/// Health status of the archive service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    /// Just started, store not opened yet
    #[default]
    Starting,
    /// Serving requests
    Ready,
    /// Draining before shutdown
    ShuttingDown,
}
