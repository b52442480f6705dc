/// Shared fixtures: devices, profiles, orchestrators and disk images
use super::scripted_backend::ScriptedBackend;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use wipecert::backend::{BackendSelector, EraseBackend};
use wipecert::{DeviceIdentity, SanitizationOrchestrator, SanitizationProfile, WipeResult};

pub const USB_CAPACITY: u64 = 8_000_000_000;

pub fn usb_device(id: &str) -> DeviceIdentity {
    DeviceIdentity::new(id, "USB Drive (8GB)", USB_CAPACITY, true).with_mount_point("/media/usb")
}

pub fn profile(method: &str, passes: u32, verify: bool) -> SanitizationProfile {
    SanitizationProfile {
        method: method.to_string(),
        pass_count: passes,
        verification_required: verify,
        ..SanitizationProfile::nist_clear()
    }
}

/// Orchestrator whose every session uses `backend`
pub fn orchestrator_for(backend: Arc<ScriptedBackend>) -> SanitizationOrchestrator {
    let backend: Arc<dyn EraseBackend> = backend;
    let selector =
        move |_: &DeviceIdentity, _: &SanitizationProfile| -> WipeResult<Arc<dyn EraseBackend>> {
            Ok(Arc::clone(&backend))
        };
    SanitizationOrchestrator::new(Arc::new(selector))
}

/// Orchestrator that builds a fresh backend per session
pub fn orchestrator_with_factory<F>(factory: F) -> SanitizationOrchestrator
where
    F: Fn() -> ScriptedBackend + Send + Sync + 'static,
{
    let selector =
        move |_: &DeviceIdentity, _: &SanitizationProfile| -> WipeResult<Arc<dyn EraseBackend>> {
            Ok(Arc::new(factory()))
        };
    let selector: Arc<dyn BackendSelector> = Arc::new(selector);
    SanitizationOrchestrator::new(selector)
}

/// Disk image of `size` bytes filled with a recognizable non-zero pattern
pub fn image_file(size: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create image");
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8 | 0x01).collect();
    file.write_all(&data).expect("fill image");
    file.flush().expect("flush image");
    file
}
