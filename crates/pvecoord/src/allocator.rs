//! Serialized VM ID allocation.

use crate::authority::AuthorityError;
use crate::coordination::Coordination;
use crate::vmid::VmId;

impl Coordination {
    /// Allocate the next VM ID above everything this instance has handed out.
    ///
    /// The high-water mark stays locked while the authority is queried, so
    /// concurrent callers never query from the same floor. On failure the
    /// authority's error is returned as-is and the mark is left untouched.
    pub async fn next_vm_id(&self) -> Result<VmId, AuthorityError> {
        let mut mark = self.high_water.lock().await;

        let floor = match *mark {
            None => None,
            Some(last) => Some(last.next().ok_or(AuthorityError::Exhausted(last))?),
        };

        let id = self.authority.next_free_id(floor).await?;

        if let Some(last) = *mark
            && id <= last
        {
            tracing::warn!(mark = %last, returned = %id, "Authority returned a VM ID at or below the high-water mark");
            return Err(AuthorityError::NonMonotonic {
                mark: last,
                returned: id,
            });
        }

        *mark = Some(id);
        tracing::debug!(vm_id = %id, floor = ?floor.map(VmId::get), "Allocated VM ID");
        Ok(id)
    }

    /// Last VM ID handed out, if any.
    pub async fn high_water_mark(&self) -> Option<VmId> {
        *self.high_water.lock().await
    }
}
