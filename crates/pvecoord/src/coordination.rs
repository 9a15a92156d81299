//! Shared coordination state for provisioning operations.
//!
//! One `Coordination` is built per provider configuration and handed to every
//! operation through an `Arc`. It owns two independent critical sections:
//! - the admission gate: a semaphore sized to `max_parallel` (see `gate`)
//! - the VM ID high-water mark: a mutex held across the authority query (see `allocator`)
//!
//! The allocator never takes an admission slot, so a slow `/cluster/nextid`
//! only delays other allocations, not gated API calls.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use crate::authority::IdAuthority;
use crate::config::ConfigError;
use crate::vmid::VmId;

/// Upper bound on concurrently admitted API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Parallelism(NonZeroUsize);

impl Parallelism {
    pub const DEFAULT: usize = 4;

    pub fn new(bound: usize) -> Option<Self> {
        if bound > Semaphore::MAX_PERMITS {
            return None;
        }
        NonZeroUsize::new(bound).map(Parallelism)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism(NonZeroUsize::MIN.saturating_add(Self::DEFAULT - 1))
    }
}

impl TryFrom<i64> for Parallelism {
    type Error = ConfigError;

    fn try_from(bound: i64) -> Result<Self, Self::Error> {
        if bound < 1 {
            return Err(ConfigError::InvalidParallelism(bound));
        }
        usize::try_from(bound)
            .ok()
            .and_then(Parallelism::new)
            .ok_or(ConfigError::ParallelismTooLarge {
                got: bound,
                max: Semaphore::MAX_PERMITS,
            })
    }
}

impl From<Parallelism> for i64 {
    fn from(p: Parallelism) -> Self {
        i64::try_from(p.get()).unwrap_or(i64::MAX)
    }
}

pub struct Coordination {
    max_parallel: Parallelism,
    pub(crate) slots: Arc<Semaphore>,
    /// `None` until the first allocation; `None < Some(_)` so it sorts below every ID.
    pub(crate) high_water: Mutex<Option<VmId>>,
    pub(crate) authority: Arc<dyn IdAuthority>,
}

impl Coordination {
    pub fn new(max_parallel: Parallelism, authority: Arc<dyn IdAuthority>) -> Arc<Self> {
        Arc::new(Self {
            max_parallel,
            slots: Arc::new(Semaphore::new(max_parallel.get())),
            high_water: Mutex::new(None),
            authority,
        })
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel.get()
    }

    /// Number of operations currently admitted.
    pub fn in_flight(&self) -> usize {
        self.max_parallel
            .get()
            .saturating_sub(self.slots.available_permits())
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop admitting operations. Waiting and future `acquire` calls fail with
    /// `GateError::Closed`; slots already held are unaffected.
    pub fn close(&self) {
        if !self.slots.is_closed() {
            self.slots.close();
            tracing::info!(in_flight = self.in_flight(), "Admission gate closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

impl fmt::Debug for Coordination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordination")
            .field("max_parallel", &self.max_parallel.get())
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
