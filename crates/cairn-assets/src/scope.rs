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

//! Batches of handles bound to a unit of work.
//!
//! A [`HandleScope`] holds at most one reference per asset (an identifier in
//! the registry that owns it) and hands out copyable [`ScopedHandle`] tokens
//! in exchange. Context assets of two local registries can share an
//! identifier; the scope keeps them apart. With delayed
//! disposal enabled, disposing a token only records its identifier; the
//! recorded identifiers are released once, together, when delay is turned
//! off or the scope is flushed or dropped. Code that acquires and releases the
//! same asset many times per frame then never drives its count to zero in
//! between.

use crate::handle::{AssetHandle, UntypedHandle};
use crate::kind::AssetKind;
use crate::registry::{Registry, Scope};
use cairn_core::{AssetError, AssetId, AssetState, LoadPriority, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Anything that can serve load requests: a [`Registry`] or an
/// [`AssetRouter`](crate::AssetRouter).
pub trait LoadAssets {
    /// Requests `info` at `priority`. See [`Registry::load`].
    fn load_with_priority<K: AssetKind>(
        &self,
        info: K::Info,
        priority: LoadPriority,
    ) -> Result<AssetHandle<K::Value>>;
}

impl LoadAssets for Registry {
    fn load_with_priority<K: AssetKind>(
        &self,
        info: K::Info,
        priority: LoadPriority,
    ) -> Result<AssetHandle<K::Value>> {
        self.load::<K>(info, priority)
    }
}

/// A held reference: the identifier and the registry that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HeldKey {
    owner: Option<Scope>,
    id: AssetId,
}

impl HeldKey {
    fn of(handle: &UntypedHandle) -> Self {
        Self {
            owner: handle.owner(),
            id: handle.id(),
        }
    }
}

/// A copyable token standing for a reference held by a [`HandleScope`].
pub struct ScopedHandle<V> {
    key: HeldKey,
    _marker: PhantomData<fn() -> V>,
}

impl<V> ScopedHandle<V> {
    fn new(key: HeldKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// The identifier of the referenced asset.
    pub fn id(&self) -> AssetId {
        self.key.id
    }
}

impl<V> Clone for ScopedHandle<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for ScopedHandle<V> {}

impl<V> PartialEq for ScopedHandle<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<V> Eq for ScopedHandle<V> {}

impl<V> Hash for ScopedHandle<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<V> fmt::Debug for ScopedHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("id", &self.key.id)
            .field("owner", &self.key.owner)
            .finish()
    }
}

/// Defers and coalesces handle disposal for a unit of work.
///
/// # Example
///
/// ```ignore
/// let mut scope = HandleScope::delayed(&registry);
/// let icon = scope.load::<Texture>("icon.png".into())?;
/// scope.dispose(icon);
/// scope.dispose(icon); // coalesced
/// assert_eq!(scope.flush(), 1);
/// ```
pub struct HandleScope<'a, L: LoadAssets = Registry> {
    loader: &'a L,
    held: HashMap<HeldKey, UntypedHandle>,
    pending: HashSet<HeldKey>,
    delay_disposals: bool,
}

impl<'a, L: LoadAssets> HandleScope<'a, L> {
    /// Creates a scope that disposes immediately.
    pub fn new(loader: &'a L) -> Self {
        Self {
            loader,
            held: HashMap::new(),
            pending: HashSet::new(),
            delay_disposals: false,
        }
    }

    /// Creates a scope with delayed disposal enabled.
    pub fn delayed(loader: &'a L) -> Self {
        let mut scope = Self::new(loader);
        scope.delay_disposals = true;
        scope
    }

    /// Whether disposals are currently deferred.
    pub fn delay_disposals(&self) -> bool {
        self.delay_disposals
    }

    /// Turns deferral on or off. Turning it off flushes every recorded
    /// disposal.
    pub fn set_delay_disposals(&mut self, delay: bool) {
        self.delay_disposals = delay;
        if !delay {
            self.flush();
        }
    }

    /// Loads `info` at [`LoadPriority::High`].
    pub fn load<K: AssetKind>(&mut self, info: K::Info) -> Result<ScopedHandle<K::Value>> {
        self.load_with_priority::<K>(info, LoadPriority::High)
    }

    /// Loads `info` and keeps the reference in this scope.
    ///
    /// Loading an asset the scope already holds reuses that reference, and
    /// cancels a disposal recorded for it.
    pub fn load_with_priority<K: AssetKind>(
        &mut self,
        info: K::Info,
        priority: LoadPriority,
    ) -> Result<ScopedHandle<K::Value>> {
        let handle = self.loader.load_with_priority::<K>(info, priority)?;
        Ok(self.adopt(handle))
    }

    /// Moves an existing handle into the scope.
    ///
    /// Handles to the same identifier in different registries are distinct
    /// assets and are held separately.
    pub fn adopt<V: Send + Sync + 'static>(&mut self, handle: AssetHandle<V>) -> ScopedHandle<V> {
        let key = HeldKey::of(handle.as_untyped());
        self.pending.remove(&key);
        if self.held.contains_key(&key) {
            // The scope already owns a reference; the extra one goes back now.
            drop(handle);
        } else {
            self.held.insert(key, handle.untyped());
        }
        ScopedHandle::new(key)
    }

    /// Reads the value behind `handle`. Owning thread only.
    ///
    /// # Errors
    /// See [`AssetHandle::get`]; a token whose reference was already released
    /// yields [`AssetError::UseAfterDispose`].
    pub fn get<V: Send + Sync + 'static>(&self, handle: ScopedHandle<V>) -> Result<Arc<V>> {
        self.held
            .get(&handle.key)
            .ok_or(AssetError::UseAfterDispose(handle.key.id))?
            .read::<V>("HandleScope::get")
    }

    /// The state of the asset behind `handle`.
    pub fn state<V>(&self, handle: ScopedHandle<V>) -> AssetState {
        self.held
            .get(&handle.key)
            .map_or(AssetState::Disposed, UntypedHandle::state)
    }

    /// Returns a new owned handle to the asset behind `handle`, if the scope
    /// still holds it.
    pub fn handle<V: Send + Sync + 'static>(&self, handle: ScopedHandle<V>) -> Option<AssetHandle<V>> {
        self.held.get(&handle.key).map(|held| held.clone().typed())
    }

    /// Disposes `handle`, or records it when disposal is delayed.
    ///
    /// Disposing the same token several times costs its asset exactly the
    /// one reference the scope holds.
    pub fn dispose<V>(&mut self, handle: ScopedHandle<V>) {
        if !self.held.contains_key(&handle.key) {
            return;
        }
        if self.delay_disposals {
            self.pending.insert(handle.key);
        } else {
            self.release(handle.key);
        }
    }

    /// Releases every recorded disposal. Returns how many distinct assets
    /// were released.
    pub fn flush(&mut self) -> usize {
        let pending: Vec<HeldKey> = self.pending.drain().collect();
        let released = pending.iter().filter(|key| self.release(**key)).count();
        if released > 0 {
            log::trace!("HandleScope: Flushed {released} disposal(s)");
        }
        released
    }

    fn release(&mut self, key: HeldKey) -> bool {
        match self.held.remove(&key) {
            Some(mut handle) => {
                handle.dispose();
                true
            }
            None => false,
        }
    }

    /// The number of distinct assets referenced by the scope.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns `true` if the scope references nothing.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// The number of recorded, not yet flushed disposals.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<L: LoadAssets> Drop for HandleScope<'_, L> {
    fn drop(&mut self) {
        self.flush();
        // Remaining held handles release their references as the map drops.
    }
}

impl<L: LoadAssets> fmt::Debug for HandleScope<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleScope")
            .field("held", &self.held.len())
            .field("pending", &self.pending.len())
            .field("delay_disposals", &self.delay_disposals)
            .finish()
    }
}
