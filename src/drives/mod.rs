// Wipe target detection
//
// - detection.rs: probe a block device or disk image into a DeviceIdentity

pub mod detection;


pub use detection::{probe_target, TargetDetector};
