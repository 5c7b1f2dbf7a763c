// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tuning knobs for asset registries and their worker pool.

use crate::error::{AssetError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an asset registry.
///
/// Missing fields fall back to their defaults when deserializing, so a RON
/// document only needs to mention what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capacity of the pending-apply queue.
    /// Background writers block once it is full until the owning thread drains it.
    pub apply_queue_capacity: usize,
    /// Capacity of the pending-removal queue.
    pub removal_queue_capacity: usize,
    /// Number of worker threads running load steps. `None` uses one per core.
    pub worker_threads: Option<usize>,
    /// Slice a blocked background writer waits before re-checking cancellation.
    pub enqueue_retry_ms: u64,
    /// How long tearing down the worker pool waits for in-flight loads.
    pub shutdown_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            apply_queue_capacity: 1024,
            removal_queue_capacity: 1024,
            worker_threads: None,
            enqueue_retry_ms: 10,
            shutdown_timeout_ms: 500,
        }
    }
}

impl RegistryConfig {
    /// Parses a configuration from RON text.
    ///
    /// ```
    /// use cairn_core::RegistryConfig;
    ///
    /// let config = RegistryConfig::from_ron("(worker_threads: Some(2))").unwrap();
    /// assert_eq!(config.worker_threads, Some(2));
    /// assert_eq!(config.apply_queue_capacity, 1024);
    /// ```
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| AssetError::InvalidConfig(e.to_string()))
    }

    /// Serializes the configuration to pretty-printed RON text.
    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).map_err(|e| AssetError::InvalidConfig(e.to_string()))
    }

    /// The pending-apply queue capacity, never zero.
    pub fn apply_capacity(&self) -> usize {
        self.apply_queue_capacity.max(1)
    }

    /// The pending-removal queue capacity, never zero.
    pub fn removal_capacity(&self) -> usize {
        self.removal_queue_capacity.max(1)
    }

    /// The retry slice of blocked background writers.
    pub fn enqueue_retry(&self) -> Duration {
        Duration::from_millis(self.enqueue_retry_ms.max(1))
    }

    /// The worker pool shutdown timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let config = RegistryConfig::from_ron("(apply_queue_capacity: 8)").unwrap();
        assert_eq!(config.apply_queue_capacity, 8);
        assert_eq!(config.removal_queue_capacity, 1024);
        assert_eq!(config.worker_threads, None);
    }

    #[test]
    fn round_trips_through_ron() {
        let config = RegistryConfig {
            worker_threads: Some(3),
            ..Default::default()
        };
        let text = config.to_ron().unwrap();
        assert_eq!(RegistryConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn malformed_text_is_invalid_config() {
        let err = RegistryConfig::from_ron("(apply_queue_capacity: \"many\")").unwrap_err();
        assert!(matches!(err, AssetError::InvalidConfig(_)));
    }

    #[test]
    fn zero_capacities_are_clamped() {
        let config = RegistryConfig {
            apply_queue_capacity: 0,
            removal_queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.apply_capacity(), 1);
        assert_eq!(config.removal_capacity(), 1);
    }
}
