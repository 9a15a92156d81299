//! The remote authority that decides which VM IDs are free.

use async_trait::async_trait;

use crate::vmid::VmId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("no free VM ID above {0}")]
    Exhausted(VmId),
    #[error("authority returned VM ID {returned}, which is not above the last allocated ID {mark}")]
    NonMonotonic { mark: VmId, returned: VmId },
}

/// Source of free VM IDs.
///
/// `from = None` asks for the lowest free ID the platform offers; `Some(id)`
/// asks for the lowest free ID that is `>= id`.
#[async_trait]
pub trait IdAuthority: Send + Sync {
    async fn next_free_id(&self, from: Option<VmId>) -> Result<VmId, AuthorityError>;
}
