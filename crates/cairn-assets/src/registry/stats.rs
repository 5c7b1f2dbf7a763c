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

//! Diagnostic snapshots of registry contents.

use cairn_core::{AssetId, AssetState, LoadPriority};
use std::fmt;

/// A point-in-time view of one asset, as listed by
/// [`Registry::stats`](crate::Registry::stats).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetStats {
    /// The asset identifier.
    pub id: AssetId,
    /// The unqualified name of the asset kind.
    pub kind: &'static str,
    /// The kind's description of the asset.
    pub description: String,
    /// Live references.
    pub ref_count: u32,
    /// Current state.
    pub state: AssetState,
    /// The most urgent priority it was requested with.
    pub priority: LoadPriority,
}

impl fmt::Display for AssetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<40} {:<16} refs={:<4} {:?}",
            self.description,
            self.state.to_string(),
            self.ref_count,
            self.priority
        )
    }
}

/// Asset counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSummary {
    /// Assets not started yet.
    pub queued: usize,
    /// Assets in `Loading` or `LoadingSecondary`.
    pub loading: usize,
    /// Loaded assets.
    pub loaded: usize,
    /// Failed assets.
    pub failed: usize,
    /// Disposed assets still waiting for removal.
    pub disposed: usize,
}

impl StateSummary {
    /// Counts the states of `stats`.
    pub fn of<'a>(stats: impl IntoIterator<Item = &'a AssetStats>) -> Self {
        stats.into_iter().fold(Self::default(), |mut summary, entry| {
            match entry.state {
                AssetState::Queued => summary.queued += 1,
                AssetState::Loading | AssetState::LoadingSecondary => summary.loading += 1,
                AssetState::Loaded => summary.loaded += 1,
                AssetState::Error => summary.failed += 1,
                AssetState::Disposed => summary.disposed += 1,
            }
            summary
        })
    }

    /// The total number of assets counted.
    pub fn total(&self) -> usize {
        self.queued + self.loading + self.loaded + self.failed + self.disposed
    }
}

impl fmt::Display for StateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loaded, {} loading, {} queued, {} failed, {} disposed",
            self.loaded, self.loading, self.queued, self.failed, self.disposed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: AssetState) -> AssetStats {
        AssetStats {
            id: AssetId::new(),
            kind: "Text",
            description: "Text(\"a.txt\")".into(),
            ref_count: 1,
            state,
            priority: LoadPriority::High,
        }
    }

    #[test]
    fn summary_counts_each_state() {
        let stats = vec![
            entry(AssetState::Loaded),
            entry(AssetState::Loaded),
            entry(AssetState::LoadingSecondary),
            entry(AssetState::Error),
        ];
        let summary = StateSummary::of(&stats);
        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.loading, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 4);
    }
}
