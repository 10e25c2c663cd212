use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Whether a write is acknowledged only after it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Durability {
    Hard,
    #[default]
    Soft,
}

impl Durability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Durability::Hard => "hard",
            Durability::Soft => "soft",
        }
    }
}

impl FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hard" => Ok(Durability::Hard),
            "soft" => Ok(Durability::Soft),
            other => Err(format!("Unknown durability level: {other}")),
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the store does with an incoming row whose primary key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Reject the row and report a duplicate key.
    #[default]
    Error,
    /// Overwrite the stored row.
    Replace,
}

impl ConflictPolicy {
    /// `--force` imports overwrite duplicates; everything else rejects them.
    pub fn from_force(force: bool) -> Self {
        if force {
            ConflictPolicy::Replace
        } else {
            ConflictPolicy::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Error => "error",
            ConflictPolicy::Replace => "replace",
        }
    }

    pub fn overwrites(&self) -> bool {
        matches!(self, ConflictPolicy::Replace)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-insert options passed down to the store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    pub durability: Durability,
    pub conflict: ConflictPolicy,
}

impl WriteOptions {
    pub fn new(durability: Durability, conflict: ConflictPolicy) -> Self {
        Self {
            durability,
            conflict,
        }
    }
}
