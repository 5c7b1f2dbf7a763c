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

//! The context handed to a kind's load steps.

use crate::handle::{AssetHandle, UntypedHandle};
use crate::kind::AssetKind;
use crate::registry::{RegistryInner, WaitTarget};
use crate::worker::CancelSignal;
use cairn_core::vfs::ResourceStream;
use cairn_core::{AssetError, AssetId, LoadPriority, Result};
use std::io;
use std::sync::Arc;

/// What a load step can reach while it runs.
///
/// Secondary assets loaded through the context are owned by the asset being
/// loaded: they stay referenced until it unloads, and (unless the kind opts
/// out through [`AssetKind::wait_for_secondary`]) the asset only counts as
/// loaded once every one of them is.
pub struct LoadContext {
    registry: Arc<RegistryInner>,
    asset: AssetId,
    secondary: Vec<UntypedHandle>,
}

impl LoadContext {
    pub(crate) fn new(registry: Arc<RegistryInner>, asset: AssetId) -> Self {
        Self {
            registry,
            asset,
            secondary: Vec::new(),
        }
    }

    /// The identifier of the asset being loaded.
    pub fn asset_id(&self) -> AssetId {
        self.asset
    }

    /// Returns `true` once the registry started tearing down. Long load steps
    /// should check it between units of work.
    pub fn is_cancelled(&self) -> bool {
        self.registry.cancel_signal().is_cancelled()
    }

    /// The registry's cancellation signal, for load steps that await.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.registry.cancel_signal()
    }

    /// Opens a resource through the registry's provider.
    pub fn open(&self, path: &str) -> io::Result<ResourceStream> {
        self.registry.provider().open(path)
    }

    /// Reads a whole resource through the registry's provider.
    pub fn read_all(&self, path: &str) -> io::Result<Vec<u8>> {
        self.registry.provider().read_all(path)
    }

    /// Loads a secondary asset at [`LoadPriority::High`].
    pub fn load_secondary<K: AssetKind>(&mut self, info: K::Info) -> Result<AssetHandle<K::Value>> {
        self.load_secondary_with::<K>(info, LoadPriority::High)
    }

    /// Loads a secondary asset and keeps a reference to it for the lifetime of
    /// the asset being loaded. The returned handle is an extra reference the
    /// caller may keep or drop.
    ///
    /// Global kinds are loaded through the global registry; other kinds stay
    /// in the registry this asset lives in.
    pub fn load_secondary_with<K: AssetKind>(
        &mut self,
        info: K::Info,
        priority: LoadPriority,
    ) -> Result<AssetHandle<K::Value>> {
        let target = self.registry.route::<K>()?;
        let handle = target.load_here::<K>(info, priority, None)?;
        let extra = handle.clone();
        self.secondary.push(handle);
        Ok(extra.typed())
    }

    /// Adopts a handle obtained elsewhere as a secondary of this asset.
    ///
    /// # Errors
    /// [`AssetError::WrongLocalityUse`] if the handle belongs to a local
    /// registry this asset cannot reference.
    pub fn add_secondary(&mut self, handle: impl Into<UntypedHandle>) -> Result<()> {
        let handle = handle.into();
        self.check_reachable(&handle)?;
        self.secondary.push(handle);
        Ok(())
    }

    /// The number of secondary handles collected so far.
    pub fn secondary_count(&self) -> usize {
        self.secondary.len()
    }

    /// Waits until every given asset loaded.
    ///
    /// Fails fast with the first secondary failure, or with
    /// [`AssetError::Cancelled`] at teardown. Waiting on an asset that
    /// (transitively) waits on this one never resolves; kinds that form such
    /// groups must opt out of secondary waiting and wire themselves up in
    /// apply callbacks instead.
    pub async fn wait_for(&self, handles: &[&UntypedHandle]) -> Result<()> {
        let mut targets = Vec::with_capacity(handles.len());
        for handle in handles {
            self.check_reachable(handle)?;
            if let Some(target) = WaitTarget::of(handle) {
                targets.push(target);
            }
        }
        self.wait(targets).await
    }

    /// Waits for every secondary asset collected so far.
    pub async fn wait_for_secondary(&self) -> Result<()> {
        let targets = self.secondary.iter().filter_map(WaitTarget::of).collect();
        self.wait(targets).await
    }

    async fn wait(&self, targets: Vec<WaitTarget>) -> Result<()> {
        let cancel = self.registry.cancel_signal();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AssetError::Cancelled(self.asset)),
            result = RegistryInner::wait_for_all(self.registry.runtime(), targets) => result,
        }
    }

    fn check_reachable(&self, handle: &UntypedHandle) -> Result<()> {
        match handle.registry() {
            Some(owner) if !self.registry.can_reference(&owner) => {
                Err(AssetError::WrongLocalityUse(format!(
                    "asset {} cannot reference {} owned by {} registry",
                    self.asset,
                    handle.id(),
                    owner.scope()
                )))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn into_secondary(self) -> Vec<UntypedHandle> {
        self.secondary
    }
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("asset", &self.asset)
            .field("secondary", &self.secondary.len())
            .finish()
    }
}
