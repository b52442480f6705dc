/// Common test utilities for integration tests
///
/// This module provides shared functionality for integration tests including:
/// - Scripted erase backends with failure injection and pass gates
/// - Device, profile and image fixtures
/// - File content helpers
#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod scripted_backend;
#[allow(dead_code)]
pub mod test_helpers;
