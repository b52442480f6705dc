use crate::ui::progress::human_bytes;
use crate::{DeviceIdentity, WipeError, WipeResult};
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

/// Builds a `DeviceIdentity` for a wipe target.
///
/// Block devices are described from sysfs; regular files are treated as
/// disk images of removable media.
#[derive(Debug, Clone)]
pub struct TargetDetector {
    sys_root: PathBuf,
    mounts_file: PathBuf,
}

impl Default for TargetDetector {
    fn default() -> Self {
        Self {
            sys_root: PathBuf::from("/sys"),
            mounts_file: PathBuf::from("/proc/mounts"),
        }
    }
}

impl TargetDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use alternative sysfs root and mount table
    pub fn with_roots(sys_root: impl Into<PathBuf>, mounts_file: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            mounts_file: mounts_file.into(),
        }
    }

    pub fn probe(
        &self,
        target: &Path,
        device_id: Option<&str>,
        display_name: Option<&str>,
    ) -> WipeResult<DeviceIdentity> {
        let canonical = fs::canonicalize(target)
            .map_err(|e| WipeError::IneligibleDevice(format!("{}: {}", target.display(), e)))?;
        let metadata = fs::metadata(&canonical)?;
        let file_type = metadata.file_type();

        let (capacity, removable, default_name) = if file_type.is_block_device() {
            let name = canonical
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    WipeError::IneligibleDevice(format!("{}: invalid device path", target.display()))
                })?
                .to_string();
            let capacity = self.sysfs_capacity(&name).unwrap_or(0);
            let model = self.sysfs_model(&name).unwrap_or_else(|| "Block Device".to_string());
            (
                capacity,
                self.is_removable(&name),
                format!("{} ({})", model, human_bytes(capacity as f64)),
            )
        } else if file_type.is_file() {
            let stem = canonical
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string());
            (
                metadata.len(),
                true,
                format!("{} (image, {})", stem, human_bytes(metadata.len() as f64)),
            )
        } else {
            return Err(WipeError::IneligibleDevice(format!(
                "{} is neither a block device nor an image file",
                target.display()
            )));
        };

        let device_path = canonical.to_string_lossy().to_string();
        let mut device = DeviceIdentity::new(
            device_id.unwrap_or(&device_path),
            display_name.map(str::to_string).unwrap_or(default_name),
            capacity,
            removable,
        );
        device.mount_points = self.mount_points(&device_path);

        tracing::debug!(
            device = %device.device_id,
            capacity = device.capacity_bytes,
            removable = device.is_removable,
            mounts = device.mount_points.len(),
            "Target probed"
        );

        Ok(device)
    }

    fn class_dir(&self, name: &str) -> PathBuf {
        self.sys_root.join("class").join("block").join(name)
    }

    /// Size in bytes from the 512-byte sector count in sysfs
    pub(crate) fn sysfs_capacity(&self, name: &str) -> Option<u64> {
        let sectors = fs::read_to_string(self.class_dir(name).join("size")).ok()?;
        sectors.trim().parse::<u64>().ok()?.checked_mul(512)
    }

    pub(crate) fn sysfs_model(&self, name: &str) -> Option<String> {
        let disk = self.parent_disk(name);
        let model = fs::read_to_string(self.class_dir(&disk).join("device").join("model")).ok()?;
        let model = model.trim();
        (!model.is_empty()).then(|| model.to_string())
    }

    /// Whole-disk name for a partition, or `name` itself
    pub(crate) fn parent_disk(&self, name: &str) -> String {
        let dir = self.class_dir(name);
        if !dir.join("partition").exists() {
            return name.to_string();
        }
        fs::canonicalize(&dir)
            .ok()
            .and_then(|real| {
                real.parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| name.to_string())
    }

    /// Removable flag from sysfs; USB-attached disks also count
    pub(crate) fn is_removable(&self, name: &str) -> bool {
        let disk = self.parent_disk(name);
        let flag = fs::read_to_string(self.sys_root.join("block").join(&disk).join("removable"))
            .map(|v| v.trim() == "1")
            .unwrap_or(false);
        if flag {
            return true;
        }

        fs::canonicalize(self.sys_root.join("block").join(&disk))
            .map(|real| real.to_string_lossy().contains("/usb"))
            .unwrap_or(false)
    }

    /// Mount points of `device_path` and its partitions, in mount table order
    pub fn mount_points(&self, device_path: &str) -> Vec<String> {
        fs::read_to_string(&self.mounts_file)
            .map(|mounts| parse_mount_points(&mounts, device_path))
            .unwrap_or_default()
    }
}

pub(crate) fn parse_mount_points(mounts: &str, device_path: &str) -> Vec<String> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let source = parts.next()?;
            let target = parts.next()?;
            let rest = source.strip_prefix(device_path)?;
            let is_partition = rest
                .trim_start_matches('p')
                .chars()
                .all(|c| c.is_ascii_digit());
            is_partition.then(|| target.replace("\\040", " "))
        })
        .collect()
}

/// Probe `target` with the system sysfs and mount table
pub fn probe_target(
    target: &Path,
    device_id: Option<&str>,
    display_name: Option<&str>,
) -> WipeResult<DeviceIdentity> {
    TargetDetector::new().probe(target, device_id, display_name)
}
