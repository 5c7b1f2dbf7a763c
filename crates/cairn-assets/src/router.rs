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

//! Sends load requests to the global or the local registry by kind locality.

use crate::handle::{AssetHandle, UntypedHandle};
use crate::kind::AssetKind;
use crate::registry::{AssetStats, Registry};
use crate::scope::LoadAssets;
use cairn_core::{LoadPriority, Result};
use std::sync::Arc;

/// A pair of registries: the process-wide global one and a local one bounding
/// the lifetime of context assets (a level, a screen).
///
/// [`Locality::Global`](cairn_core::Locality::Global) kinds go to the global
/// registry; context and single-usage kinds go to the local one, so they
/// never outlive it.
pub struct AssetRouter {
    // Dropped first: local assets may still hold handles to global ones.
    local: Registry,
    global: Registry,
}

impl AssetRouter {
    /// Takes ownership of `global` and opens a first local registry on it.
    /// Must be called on `global`'s owning thread.
    pub fn new(global: Registry) -> Self {
        let local = global.new_local();
        Self { local, global }
    }

    /// The global registry.
    pub fn global(&self) -> &Registry {
        &self.global
    }

    /// The current local registry.
    pub fn local(&self) -> &Registry {
        &self.local
    }

    /// The registry serving kind `K`.
    pub fn registry_for<K: AssetKind>(&self) -> &Registry {
        if K::LOCALITY.is_local() {
            &self.local
        } else {
            &self.global
        }
    }

    /// Requests `info` from the registry matching `K`'s locality.
    pub fn load<K: AssetKind>(&self, info: K::Info, priority: LoadPriority) -> Result<AssetHandle<K::Value>> {
        self.registry_for::<K>().load::<K>(info, priority)
    }

    /// Like [`load`](Self::load), with a callback run on the owning thread
    /// once the value is usable.
    pub fn load_with<K, F>(
        &self,
        info: K::Info,
        priority: LoadPriority,
        on_loaded: F,
    ) -> Result<AssetHandle<K::Value>>
    where
        K: AssetKind,
        F: FnOnce(Arc<K::Value>) + Send + 'static,
    {
        self.registry_for::<K>()
            .load_with::<K, F>(info, priority, on_loaded)
    }

    /// Disposes `handle` through the local registry, which accepts both its
    /// own handles and global ones.
    pub fn unload<H: AsMut<UntypedHandle>>(&self, handle: &mut H) -> Result<()> {
        self.local.unload(handle)
    }

    /// Drains the global registry's queues, then the local registry's.
    pub fn apply_assets(&self) -> Result<()> {
        self.global.apply_assets()?;
        self.local.apply_assets()
    }

    /// Tears the local registry down and opens a fresh one.
    ///
    /// Every context asset is disposed, whatever its reference count; global
    /// assets they referenced lose those references.
    pub fn reset_local(&mut self) {
        let fresh = self.global.new_local();
        let old = std::mem::replace(&mut self.local, fresh);
        log::info!("AssetRouter: Resetting local registry ({} asset(s))", old.len());
        drop(old);
    }

    /// Stats of both registries, global first.
    pub fn stats(&self) -> Vec<AssetStats> {
        let mut stats = self.global.stats();
        stats.extend(self.local.stats());
        stats
    }
}

impl LoadAssets for AssetRouter {
    fn load_with_priority<K: AssetKind>(
        &self,
        info: K::Info,
        priority: LoadPriority,
    ) -> Result<AssetHandle<K::Value>> {
        self.load::<K>(info, priority)
    }
}

impl std::fmt::Debug for AssetRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetRouter")
            .field("global", &self.global)
            .field("local", &self.local)
            .finish()
    }
}
