/// Erase backends - pluggable capabilities that perform the actual sanitization
///
/// The orchestrator never touches media directly. It drives an `EraseBackend`
/// one pass at a time and treats every call as a potentially long blocking
/// operation (seconds to hours depending on the device).
pub mod overwrite;
pub mod simulated;

pub use overwrite::{OverwriteBackend, PassPattern};
pub use simulated::{SimulatedBackend, SimulationConfig};

use crate::{DeviceIdentity, SanitizationProfile, WipeError, WipeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// What a backend reports after a pass or verification completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub detail: String,
    pub bytes_processed: u64,
}

impl PassReport {
    pub fn new(detail: impl Into<String>, bytes_processed: u64) -> Self {
        Self {
            detail: detail.into(),
            bytes_processed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    #[error("operation aborted: {0}")]
    Aborted(String),

    #[error("target rejected: {0}")]
    Rejected(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("readback mismatch: {0}")]
    Mismatch(String),
}

impl From<std::io::Error> for BackendFailure {
    fn from(err: std::io::Error) -> Self {
        BackendFailure::Write(err.to_string())
    }
}

/// Capability interface implemented per medium / erase standard.
///
/// All methods block until the device reports completion.
#[cfg_attr(test, mockall::automock)]
pub trait EraseBackend: Send + Sync {
    /// Short name recorded in logs
    fn name(&self) -> String;

    /// Check that the target can be sanitized by this backend
    fn prepare(&self, _device: &DeviceIdentity) -> Result<(), BackendFailure> {
        Ok(())
    }

    /// Run pass `pass_index` (1-based) across the whole device
    fn run_pass(
        &self,
        device: &DeviceIdentity,
        pass_index: u32,
    ) -> Result<PassReport, BackendFailure>;

    /// Read back device state after the final pass
    fn verify(&self, device: &DeviceIdentity) -> Result<PassReport, BackendFailure>;

    /// Request that an in-flight pass stop. Returns false when unsupported.
    fn abort(&self) -> bool {
        false
    }
}

/// Picks the backend for a session from the device and profile.
pub trait BackendSelector: Send + Sync {
    fn select(
        &self,
        device: &DeviceIdentity,
        profile: &SanitizationProfile,
    ) -> WipeResult<Arc<dyn EraseBackend>>;
}

impl<F> BackendSelector for F
where
    F: Fn(&DeviceIdentity, &SanitizationProfile) -> WipeResult<Arc<dyn EraseBackend>>
        + Send
        + Sync,
{
    fn select(
        &self,
        device: &DeviceIdentity,
        profile: &SanitizationProfile,
    ) -> WipeResult<Arc<dyn EraseBackend>> {
        self(device, profile)
    }
}

/// Builds an `OverwriteBackend` for devices whose write target was registered.
#[derive(Default)]
pub struct OverwriteSelector {
    targets: RwLock<HashMap<String, PathBuf>>,
}

impl OverwriteSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device_id: impl Into<String>, target: impl Into<PathBuf>) {
        if let Ok(mut targets) = self.targets.write() {
            targets.insert(device_id.into(), target.into());
        }
    }
}

impl BackendSelector for OverwriteSelector {
    fn select(
        &self,
        device: &DeviceIdentity,
        profile: &SanitizationProfile,
    ) -> WipeResult<Arc<dyn EraseBackend>> {
        let targets = self
            .targets
            .read()
            .map_err(|_| WipeError::BackendError("target table poisoned".to_string()))?;

        let path = targets.get(&device.device_id).ok_or_else(|| {
            WipeError::IneligibleDevice(format!(
                "no write target registered for {}",
                device.device_id
            ))
        })?;

        Ok(Arc::new(OverwriteBackend::new(
            path.clone(),
            profile.scheme,
            profile.pass_count,
        )))
    }
}

/// Builds a `SimulatedBackend` for every device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSelector {
    pub config: SimulationConfig,
}

impl BackendSelector for SimulatedSelector {
    fn select(
        &self,
        _device: &DeviceIdentity,
        _profile: &SanitizationProfile,
    ) -> WipeResult<Arc<dyn EraseBackend>> {
        Ok(Arc::new(SimulatedBackend::new(self.config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_selector_requires_registered_target() {
        let selector = OverwriteSelector::new();
        let device = DeviceIdentity::new("D1", "USB", 1024, true);

        let result = selector.select(&device, &SanitizationProfile::zero());
        assert!(matches!(result, Err(WipeError::IneligibleDevice(_))));
    }

    #[test]
    fn test_overwrite_selector_builds_backend() {
        let selector = OverwriteSelector::new();
        selector.register("D1", "/tmp/d1.img");
        let device = DeviceIdentity::new("D1", "USB", 1024, true);

        let backend = selector
            .select(&device, &SanitizationProfile::dod_5220())
            .expect("target is registered");
        assert_eq!(backend.name(), "overwrite");
    }

    #[test]
    fn test_closure_selector() {
        let selector = |_: &DeviceIdentity, _: &SanitizationProfile| -> WipeResult<Arc<dyn EraseBackend>> {
            Ok(Arc::new(SimulatedBackend::new(SimulationConfig::default())))
        };
        let device = DeviceIdentity::new("D1", "USB", 1024, true);

        let backend = selector
            .select(&device, &SanitizationProfile::zero())
            .expect("closure always selects");
        assert_eq!(backend.name(), "simulated");
    }

    #[test]
    fn test_backend_failure_from_io_error() {
        let failure: BackendFailure =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(failure, BackendFailure::Write(_)));
        assert!(failure.to_string().contains("denied"));
    }
}
