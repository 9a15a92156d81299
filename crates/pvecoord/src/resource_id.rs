//! String identifiers for provisioned resources.
//!
//! Guests are addressed as `node/type/vmid` (e.g. `pve1/qemu/105`), cluster
//! objects such as pools as `type/id` (e.g. `pools/staging`).

use std::fmt;
use std::str::FromStr;

use crate::vmid::VmId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceIdError {
    #[error("invalid resource format: {input}. Must be {expected}")]
    Malformed {
        input: String,
        expected: &'static str,
    },
    #[error("invalid VM ID in resource {input}: {vm_id:?}")]
    InvalidVmId { input: String, vm_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub node: String,
    pub kind: String,
    pub vm_id: VmId,
}

impl ResourceId {
    pub fn new(node: impl Into<String>, kind: impl Into<String>, vm_id: VmId) -> Self {
        Self {
            node: node.into(),
            kind: kind.into(),
            vm_id,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.node, self.kind, self.vm_id)
    }
}

impl FromStr for ResourceId {
    type Err = ResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ResourceIdError::Malformed {
            input: s.to_string(),
            expected: "node/type/vmId",
        };

        let mut parts = s.split('/');
        let (Some(node), Some(kind), Some(raw_id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if node.is_empty() || kind.is_empty() || raw_id.is_empty() {
            return Err(malformed());
        }
        if !raw_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let vm_id = raw_id
            .parse::<VmId>()
            .map_err(|_| ResourceIdError::InvalidVmId {
                input: s.to_string(),
                vm_id: raw_id.to_string(),
            })?;

        Ok(ResourceId::new(node, kind, vm_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterResourceId {
    pub kind: String,
    pub id: String,
}

impl ClusterResourceId {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ClusterResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl FromStr for ClusterResourceId {
    type Err = ResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() && !id.contains('/') => {
                Ok(ClusterResourceId::new(kind, id))
            }
            _ => Err(ResourceIdError::Malformed {
                input: s.to_string(),
                expected: "type/resId",
            }),
        }
    }
}
