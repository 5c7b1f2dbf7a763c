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

use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared sharing scope of an asset kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locality {
    /// One instance shared process-wide, cached forever by info value.
    Global,
    /// Shared only within a bounded local registry (e.g. one scene).
    Context,
    /// Never cached by info value: every load mints a fresh identifier.
    SingleUsage,
}

impl Locality {
    /// Returns `true` if info values of this locality are cached by the
    /// identity registry.
    pub fn is_cached(self) -> bool {
        !matches!(self, Locality::SingleUsage)
    }

    /// Returns `true` if assets of this locality live in a local registry.
    pub fn is_local(self) -> bool {
        !matches!(self, Locality::Global)
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Locality::Global => "global",
            Locality::Context => "context",
            Locality::SingleUsage => "single-usage",
        };
        f.write_str(name)
    }
}

/// A scheduling hint attached to a load request.
///
/// Priorities modulate background ordering but never correctness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadPriority {
    /// Run the synchronous load step on the calling thread before returning.
    /// Only meaningful for cheap kinds; kinds that only load asynchronously
    /// fall back to a [`LoadPriority::High`] background load.
    Synchronous,
    /// Start the background load as soon as a worker is available.
    #[default]
    High,
    /// Yield once to already queued work before starting. Best effort: low
    /// priority loads are never held back behind high priority ones.
    Low,
}

impl LoadPriority {
    fn urgency(self) -> u8 {
        match self {
            LoadPriority::Synchronous => 2,
            LoadPriority::High => 1,
            LoadPriority::Low => 0,
        }
    }

    /// Returns `true` if `self` should be scheduled ahead of `other`.
    pub fn is_more_urgent_than(self, other: LoadPriority) -> bool {
        self.urgency() > other.urgency()
    }
}

/// The lifecycle state of a single asset.
///
/// Transitions are strictly ordered and never revisited:
///
/// ```text
/// Queued -> Loading -> [LoadingSecondary] -> Loaded
///              \               \               \
///               +---------------+---------------+--> Disposed | Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetState {
    /// Created, but no load step has started yet.
    Queued,
    /// The kind's load step is running.
    Loading,
    /// The load step finished; waiting on secondary (dependency) assets.
    LoadingSecondary,
    /// The value is available.
    Loaded,
    /// The reference count reached zero or the registry was torn down.
    Disposed,
    /// The load failed or was cancelled.
    Error,
}

impl AssetState {
    /// Returns `true` for the terminal states, [`AssetState::Disposed`] and
    /// [`AssetState::Error`].
    pub fn is_terminal(self) -> bool {
        matches!(self, AssetState::Disposed | AssetState::Error)
    }

    /// Returns `true` once the asset will make no further loading progress,
    /// i.e. it is loaded or terminal.
    pub fn is_settled(self) -> bool {
        self == AssetState::Loaded || self.is_terminal()
    }

    /// Returns `true` while a load step or a secondary wait is in flight.
    pub fn is_loading(self) -> bool {
        matches!(self, AssetState::Loading | AssetState::LoadingSecondary)
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
