// Per-device lock table
//
// Check-and-acquire happens under a single mutex so two concurrent `start`
// calls can never both observe a device as unlocked. Contention is reported,
// never queued.

use crate::{WipeError, WipeResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct DeviceLockTable {
    held: Mutex<HashSet<String>>,
}

impl DeviceLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding the table cannot leave the set half-updated
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire the lock for `device_id`, failing with `DeviceBusy` if held
    pub fn try_acquire(self: &Arc<Self>, device_id: &str) -> WipeResult<DeviceLockGuard> {
        let mut held = self.table();
        if !held.insert(device_id.to_string()) {
            return Err(WipeError::DeviceBusy(format!(
                "{} already has an active sanitization session",
                device_id
            )));
        }

        tracing::debug!(device = %device_id, "Device lock acquired");

        Ok(DeviceLockGuard {
            table: Arc::clone(self),
            device_id: device_id.to_string(),
        })
    }

    pub fn is_locked(&self, device_id: &str) -> bool {
        self.table().contains(device_id)
    }

    pub fn held_count(&self) -> usize {
        self.table().len()
    }

    fn release(&self, device_id: &str) {
        if self.table().remove(device_id) {
            tracing::debug!(device = %device_id, "Device lock released");
        }
    }
}

/// Holds a device lock; released when dropped.
#[derive(Debug)]
pub struct DeviceLockGuard {
    table: Arc<DeviceLockTable>,
    device_id: String,
}

impl DeviceLockGuard {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl Drop for DeviceLockGuard {
    fn drop(&mut self) {
        self.table.release(&self.device_id);
    }
}
