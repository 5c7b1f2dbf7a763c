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

//! Reference-counted handles to registry assets.

use crate::asset::Asset;
use crate::registry::{RegistryInner, Scope};
use cairn_core::{AssetError, AssetId, AssetState, Result};
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// An owned reference to an asset, without a value type.
///
/// Every live handle accounts for exactly one reference on its asset.
/// Cloning adds a reference; dropping or [`dispose`](Self::dispose) removes
/// it, exactly once. When the last handle goes away the asset unloads on the
/// releasing thread and its map entry is removed at the next
/// [`Registry::apply_assets`](crate::Registry::apply_assets).
///
/// Handles keep only a weak link to their registry. Once the registry is torn
/// down, dropping a handle is a no-op and reading through it fails with
/// [`AssetError::UseAfterDispose`].
pub struct UntypedHandle {
    registry: Option<Weak<RegistryInner>>,
    id: AssetId,
}

impl UntypedHandle {
    /// Wraps a reference that was already added on the asset.
    pub(crate) fn adopt(registry: &Arc<RegistryInner>, id: AssetId) -> Self {
        Self {
            registry: Some(Arc::downgrade(registry)),
            id,
        }
    }

    /// A handle that refers to nothing. Disposing it is a no-op.
    pub fn invalid() -> Self {
        Self {
            registry: None,
            id: AssetId::INVALID,
        }
    }

    /// The identifier of the referenced asset.
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Returns `false` once the handle was disposed, or if it never referred
    /// to anything.
    pub fn is_valid(&self) -> bool {
        self.registry.is_some()
    }

    /// The current state of the referenced asset.
    ///
    /// Disposed handles, and handles whose registry is gone, report
    /// [`AssetState::Disposed`].
    pub fn state(&self) -> AssetState {
        self.asset().map_or(AssetState::Disposed, |asset| asset.state())
    }

    /// Releases the reference held by this handle.
    ///
    /// Calling it again, or dropping the handle afterwards, does nothing.
    pub fn dispose(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.release(self.id);
        }
    }

    /// Converts into a typed handle without touching the reference count.
    ///
    /// The value type is checked when the value is read.
    pub fn typed<V: Send + Sync + 'static>(self) -> AssetHandle<V> {
        AssetHandle {
            inner: self,
            _marker: PhantomData,
        }
    }

    pub(crate) fn registry(&self) -> Option<Arc<RegistryInner>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    /// The scope of the registry holding the asset, while it is alive.
    pub(crate) fn owner(&self) -> Option<Scope> {
        self.registry().map(|registry| registry.scope())
    }

    pub(crate) fn asset(&self) -> Option<Arc<Asset>> {
        self.registry()?.lookup(self.id)
    }

    /// Reads the type-erased value of the asset on the owning thread.
    pub(crate) fn read<V: Send + Sync + 'static>(&self, operation: &'static str) -> Result<Arc<V>> {
        let Some(registry) = self.registry() else {
            return Err(if self.id.is_invalid() {
                AssetError::UnknownIdentifier(self.id)
            } else {
                AssetError::UseAfterDispose(self.id)
            });
        };
        registry.ensure_owning_thread(operation)?;

        let asset = registry
            .lookup(self.id)
            .ok_or(AssetError::UseAfterDispose(self.id))?;
        let value = asset.value()?.ok_or(AssetError::NotReady(self.id))?;
        value.downcast::<V>().map_err(|_| AssetError::WrongValueType {
            id: self.id,
            expected: type_name::<V>(),
        })
    }
}

impl Clone for UntypedHandle {
    fn clone(&self) -> Self {
        let Some(registry) = self.registry() else {
            return Self {
                registry: None,
                id: self.id,
            };
        };
        match registry.lookup(self.id) {
            Some(asset) if asset.add_ref() => Self::adopt(&registry, self.id),
            _ => {
                log::error!("Cloning a handle to {} which is no longer alive", self.id);
                Self {
                    registry: None,
                    id: self.id,
                }
            }
        }
    }
}

impl Drop for UntypedHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl AsMut<UntypedHandle> for UntypedHandle {
    fn as_mut(&mut self) -> &mut UntypedHandle {
        self
    }
}

impl PartialEq for UntypedHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UntypedHandle {}

impl fmt::Debug for UntypedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntypedHandle")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A handle whose value is read as `V`.
///
/// Same reference semantics as [`UntypedHandle`]; the type parameter only
/// affects reads.
pub struct AssetHandle<V> {
    inner: UntypedHandle,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Send + Sync + 'static> AssetHandle<V> {
    /// A typed handle that refers to nothing.
    pub fn invalid() -> Self {
        UntypedHandle::invalid().typed()
    }

    /// The identifier of the referenced asset.
    pub fn id(&self) -> AssetId {
        self.inner.id()
    }

    /// See [`UntypedHandle::is_valid`].
    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// See [`UntypedHandle::state`].
    pub fn state(&self) -> AssetState {
        self.inner.state()
    }

    /// Returns `true` once the value can be read.
    pub fn is_loaded(&self) -> bool {
        self.state() == AssetState::Loaded
    }

    /// Reads the loaded value. Owning thread only.
    ///
    /// # Errors
    /// - [`AssetError::NotReady`] while the asset is still loading.
    /// - The captured error if loading failed.
    /// - [`AssetError::UseAfterDispose`] if this handle or its asset is gone.
    /// - [`AssetError::ThreadViolation`] off the owning thread.
    /// - [`AssetError::WrongValueType`] if `V` is not the kind's value type.
    pub fn get(&self) -> Result<Arc<V>> {
        self.inner.read::<V>("AssetHandle::get")
    }

    /// Like [`get`](Self::get), but any failure reads as `None`.
    pub fn try_get(&self) -> Option<Arc<V>> {
        self.get().ok()
    }

    /// Releases the reference held by this handle. Idempotent.
    pub fn dispose(&mut self) {
        self.inner.dispose();
    }

    /// Drops the value type without touching the reference count.
    pub fn untyped(self) -> UntypedHandle {
        self.inner
    }

    /// Borrows the untyped view of this handle.
    pub fn as_untyped(&self) -> &UntypedHandle {
        &self.inner
    }
}

impl<V> Clone for AssetHandle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> AsMut<UntypedHandle> for AssetHandle<V> {
    fn as_mut(&mut self) -> &mut UntypedHandle {
        &mut self.inner
    }
}

impl<V> From<AssetHandle<V>> for UntypedHandle {
    fn from(handle: AssetHandle<V>) -> Self {
        handle.inner
    }
}

impl<V> PartialEq for AssetHandle<V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<V> Eq for AssetHandle<V> {}

impl<V> fmt::Debug for AssetHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetHandle")
            .field("id", &self.inner.id)
            .field("value", &type_name::<V>())
            .field("valid", &self.inner.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handles_are_inert() {
        let mut handle = UntypedHandle::invalid();
        assert!(!handle.is_valid());
        assert!(handle.id().is_invalid());
        assert_eq!(handle.state(), AssetState::Disposed);
        handle.dispose();
        handle.dispose();

        let clone = handle.clone();
        assert!(!clone.is_valid());
    }

    #[test]
    fn reading_an_invalid_handle_reports_the_identifier() {
        let handle = AssetHandle::<u32>::invalid();
        assert!(matches!(
            handle.get(),
            Err(AssetError::UnknownIdentifier(id)) if id.is_invalid()
        ));
        assert!(handle.try_get().is_none());
    }

    #[test]
    fn typed_and_untyped_round_trip_keeps_the_identifier() {
        let handle = AssetHandle::<String>::invalid();
        let id = handle.id();
        let untyped = handle.untyped();
        assert_eq!(untyped.id(), id);
        let typed: AssetHandle<String> = untyped.typed();
        assert_eq!(typed.id(), id);
    }
}
