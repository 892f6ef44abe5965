//! Shared test utilities for integration, chaos and property tests.
//!
//! This module provides:
//! - A recording TargetStore with fault injection
//! - A scripted ChangeSource for deterministic snapshot/watch input
//! - Event and config helpers

pub mod mock_target;
pub mod scripted_source;

#[allow(unused_imports)]
pub use mock_target::*;
#[allow(unused_imports)]
pub use scripted_source::*;

use keyspace_mirror::MirrorConfig;

/// Config for a test run: identity mapping over `prefix`, no progress noise.
#[allow(dead_code)]
pub fn test_config(prefix: &str) -> MirrorConfig {
    MirrorConfig {
        prefix: prefix.to_string(),
        progress_interval: "1h".to_string(),
        ..MirrorConfig::for_testing("127.0.0.1:2379")
    }
}
