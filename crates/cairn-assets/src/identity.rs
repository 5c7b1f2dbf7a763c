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

//! The kind registration table and the info-to-identifier mapping.

use crate::kind::{kind_name, AssetKind};
use cairn_core::{AssetError, AssetId, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

struct InfoIds<I> {
    by_info: HashMap<I, AssetId>,
    by_id: HashMap<AssetId, I>,
}

/// The registration entry of one kind: the kind itself and its identity map.
pub(crate) struct KindTable<K: AssetKind> {
    kind: Arc<K>,
    ids: RwLock<InfoIds<K::Info>>,
}

impl<K: AssetKind> KindTable<K> {
    fn new(kind: K) -> Self {
        Self {
            kind: Arc::new(kind),
            ids: RwLock::new(InfoIds {
                by_info: HashMap::new(),
                by_id: HashMap::new(),
            }),
        }
    }

    pub(crate) fn kind(&self) -> &Arc<K> {
        &self.kind
    }

    /// Returns the identifier of `info`, minting one on first sight.
    ///
    /// Single-usage kinds always mint a fresh identifier and record nothing.
    pub(crate) fn resolve(&self, info: &K::Info) -> AssetId {
        if !K::LOCALITY.is_cached() {
            return AssetId::new();
        }

        if let Some(id) = self
            .ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_info
            .get(info)
        {
            return *id;
        }

        let mut ids = self.ids.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have minted it between the two locks.
        if let Some(id) = ids.by_info.get(info) {
            return *id;
        }
        let id = AssetId::new();
        ids.by_info.insert(info.clone(), id);
        ids.by_id.insert(id, info.clone());
        log::trace!("Minted {} for {}", id, self.kind.describe(info));
        id
    }

    fn info_of(&self, id: AssetId) -> Option<K::Info> {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(&id)
            .cloned()
    }

    fn len(&self) -> usize {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_info
            .len()
    }
}

/// Maps info values to stable identifiers, one table per registered kind.
///
/// This is the only place identifiers are minted. It is owned by the
/// application's composition root and shared (behind an `Arc`) by the global
/// registry and every local registry, so the same info value always resolves
/// to the same identifier. Mappings are never removed.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use cairn_assets::{AssetKind, IdentityRegistry};
/// use cairn_core::Locality;
///
/// struct Text;
///
/// #[async_trait]
/// impl AssetKind for Text {
///     type Info = String;
///     type Value = String;
///     const LOCALITY: Locality = Locality::Global;
/// }
///
/// let identities = IdentityRegistry::new();
/// identities.register(Text).unwrap();
///
/// let a = identities.id_of::<Text>(&"a.txt".to_string()).unwrap();
/// let b = identities.id_of::<Text>(&"a.txt".to_string()).unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Default)]
pub struct IdentityRegistry {
    kinds: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl IdentityRegistry {
    /// Creates an empty registry with no kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset kind.
    ///
    /// # Errors
    /// Returns [`AssetError::AlreadyRegistered`] if `K` was registered before;
    /// the first registration stays in effect.
    pub fn register<K: AssetKind>(&self, kind: K) -> Result<()> {
        let mut kinds = self.kinds.write().unwrap_or_else(PoisonError::into_inner);
        if kinds.contains_key(&TypeId::of::<K>()) {
            return Err(AssetError::AlreadyRegistered {
                kind: kind_name::<K>(),
            });
        }
        kinds.insert(TypeId::of::<K>(), Arc::new(KindTable::new(kind)));
        log::info!(
            "IdentityRegistry: Registered kind {} ({})",
            kind_name::<K>(),
            K::LOCALITY
        );
        Ok(())
    }

    /// Returns `true` if `K` is registered.
    pub fn is_registered<K: AssetKind>(&self) -> bool {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<K>())
    }

    /// Returns the number of registered kinds.
    pub fn kind_count(&self) -> usize {
        self.kinds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns the registered instance of `K`.
    pub fn kind<K: AssetKind>(&self) -> Result<Arc<K>> {
        Ok(self.table::<K>()?.kind().clone())
    }

    /// Resolves `info` to its identifier, minting one on first sight.
    pub fn id_of<K: AssetKind>(&self, info: &K::Info) -> Result<AssetId> {
        Ok(self.table::<K>()?.resolve(info))
    }

    /// Maps an identifier back to the info value it was minted for.
    ///
    /// Returns `Ok(None)` for identifiers of another kind and for single-usage
    /// identifiers, which are never recorded.
    pub fn info_of<K: AssetKind>(&self, id: AssetId) -> Result<Option<K::Info>> {
        Ok(self.table::<K>()?.info_of(id))
    }

    /// Returns how many distinct info values of `K` have been seen.
    pub fn known_count<K: AssetKind>(&self) -> Result<usize> {
        Ok(self.table::<K>()?.len())
    }

    pub(crate) fn table<K: AssetKind>(&self) -> Result<Arc<KindTable<K>>> {
        let entry = self
            .kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<K>())
            .cloned()
            .ok_or(AssetError::NotRegistered {
                kind: kind_name::<K>(),
            })?;
        entry.downcast::<KindTable<K>>().map_err(|_| AssetError::NotRegistered {
            kind: kind_name::<K>(),
        })
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("kinds", &self.kind_count())
            .finish()
    }
}
