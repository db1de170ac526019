//! Numbering pools for passive-file slots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two disjoint numbering spaces.
///
/// Students and staff each have their own shelf sequence, so slot `5` in
/// one pool says nothing about slot `5` in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Student,
    Staff,
}

impl PoolType {
    pub const ALL: [PoolType; 2] = [PoolType::Student, PoolType::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Student => "student",
            PoolType::Staff => "staff",
        }
    }

    /// Single-letter code used by the office's legacy ledgers.
    pub fn code(&self) -> char {
        match self {
            PoolType::Student => 'A',
            PoolType::Staff => 'P',
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pool '{0}', expected 'student' or 'staff'")]
pub struct UnknownPool(pub String);

impl FromStr for PoolType {
    type Err = UnknownPool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PoolType::ALL
            .into_iter()
            .find(|pool| {
                wanted.eq_ignore_ascii_case(pool.as_str())
                    || wanted.eq_ignore_ascii_case(pool.code().encode_utf8(&mut [0; 4]))
            })
            .ok_or_else(|| UnknownPool(s.to_string()))
    }
}
