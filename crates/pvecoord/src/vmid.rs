//! Proxmox VM identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A guest ID in the range Proxmox accepts (`100..=999_999_999`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VmId(u32);

impl VmId {
    pub const MIN: VmId = VmId(100);
    pub const MAX: VmId = VmId(999_999_999);

    pub const fn new(raw: u32) -> Option<Self> {
        if raw >= Self::MIN.0 && raw <= Self::MAX.0 {
            Some(VmId(raw))
        } else {
            None
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The following ID, or `None` past `VmId::MAX`.
    pub const fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid VM ID {0:?}: must be an integer between 100 and 999999999")]
pub struct ParseVmIdError(pub String);

impl TryFrom<u32> for VmId {
    type Error = ParseVmIdError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        VmId::new(raw).ok_or_else(|| ParseVmIdError(raw.to_string()))
    }
}

impl From<VmId> for u32 {
    fn from(id: VmId) -> Self {
        id.0
    }
}

impl FromStr for VmId {
    type Err = ParseVmIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(VmId::new)
            .ok_or_else(|| ParseVmIdError(s.to_string()))
    }
}
