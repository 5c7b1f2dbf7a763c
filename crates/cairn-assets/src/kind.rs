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

//! The contract implemented by every asset kind.

use crate::context::LoadContext;
use anyhow::anyhow;
use async_trait::async_trait;
use cairn_core::{AssetInfo, Locality};
use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::Arc;

/// A loaded value, type-erased so the registry can store any kind.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// The outcome of a kind's synchronous load step.
#[derive(Debug)]
pub enum LoadStep<V> {
    /// The value is ready.
    Ready(V),
    /// This kind always loads asynchronously; continue with
    /// [`AssetKind::load_async`] on a worker.
    Async,
}

/// Describes how to turn an info value into a loaded value.
///
/// Kinds are registered once with the
/// [`IdentityRegistry`](crate::IdentityRegistry) and shared by every asset
/// of that kind. A kind may load secondary (dependency) assets through the
/// [`LoadContext`] it receives; the handles acquired there stay alive until
/// the asset unloads.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use cairn_assets::{AssetKind, LoadContext, LoadStep};
/// use cairn_core::Locality;
///
/// struct Text;
///
/// #[async_trait]
/// impl AssetKind for Text {
///     type Info = String;
///     type Value = String;
///     const LOCALITY: Locality = Locality::Global;
///
///     fn load(&self, path: &String, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<String>> {
///         let bytes = ctx.read_all(path)?;
///         Ok(LoadStep::Ready(String::from_utf8(bytes)?))
///     }
/// }
/// ```
#[async_trait]
pub trait AssetKind: Send + Sync + 'static {
    /// The identity of a load request.
    type Info: AssetInfo;
    /// The produced value.
    type Value: Send + Sync + 'static;
    /// The sharing scope of this kind.
    const LOCALITY: Locality;

    /// Whether the asset must wait for its secondary assets before it counts
    /// as loaded. Kinds that only keep secondary handles alive (or that wire a
    /// cyclic group themselves) return `false`.
    fn wait_for_secondary(&self) -> bool {
        true
    }

    /// The synchronous load step.
    ///
    /// Runs on the calling thread for [`LoadPriority::Synchronous`] requests
    /// and on a worker otherwise. Return [`LoadStep::Async`] to continue with
    /// [`load_async`](Self::load_async).
    ///
    /// [`LoadPriority::Synchronous`]: cairn_core::LoadPriority::Synchronous
    fn load(&self, _info: &Self::Info, _ctx: &mut LoadContext) -> anyhow::Result<LoadStep<Self::Value>> {
        Ok(LoadStep::Async)
    }

    /// The asynchronous load step, always run on a worker.
    async fn load_async(&self, info: &Self::Info, _ctx: &mut LoadContext) -> anyhow::Result<Self::Value> {
        Err(anyhow!(
            "`{}` has no asynchronous load step (requested {:?})",
            type_name::<Self>(),
            info
        ))
    }

    /// Releases kind-specific resources. Runs exactly once per loaded value.
    fn unload(&self, _value: Arc<Self::Value>) {}

    /// A human-readable description used in diagnostics and errors.
    fn describe(&self, info: &Self::Info) -> String {
        format!("{}({:?})", kind_name::<Self>(), info)
    }
}

/// The unqualified type name of a kind.
pub(crate) fn kind_name<K: ?Sized>() -> &'static str {
    let full = type_name::<K>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// The per-asset, type-erased view of a kind plus the info being loaded.
#[async_trait]
pub(crate) trait ErasedLoad: Send + Sync {
    fn kind_name(&self) -> &'static str;
    fn value_type(&self) -> &'static str;
    fn description(&self) -> String;
    fn wait_for_secondary(&self) -> bool;
    fn load(&self, ctx: &mut LoadContext) -> anyhow::Result<Option<ErasedValue>>;
    async fn load_async(&self, ctx: &mut LoadContext) -> anyhow::Result<ErasedValue>;
    fn unload(&self, value: ErasedValue);
}

pub(crate) struct KindLoader<K: AssetKind> {
    kind: Arc<K>,
    info: K::Info,
    _marker: PhantomData<fn() -> K>,
}

impl<K: AssetKind> KindLoader<K> {
    pub(crate) fn new(kind: Arc<K>, info: K::Info) -> Self {
        Self {
            kind,
            info,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<K: AssetKind> ErasedLoad for KindLoader<K> {
    fn kind_name(&self) -> &'static str {
        kind_name::<K>()
    }

    fn value_type(&self) -> &'static str {
        type_name::<K::Value>()
    }

    fn description(&self) -> String {
        self.kind.describe(&self.info)
    }

    fn wait_for_secondary(&self) -> bool {
        self.kind.wait_for_secondary()
    }

    fn load(&self, ctx: &mut LoadContext) -> anyhow::Result<Option<ErasedValue>> {
        match self.kind.load(&self.info, ctx)? {
            LoadStep::Ready(value) => Ok(Some(Arc::new(value))),
            LoadStep::Async => Ok(None),
        }
    }

    async fn load_async(&self, ctx: &mut LoadContext) -> anyhow::Result<ErasedValue> {
        let value = self.kind.load_async(&self.info, ctx).await?;
        Ok(Arc::new(value))
    }

    fn unload(&self, value: ErasedValue) {
        match value.downcast::<K::Value>() {
            Ok(value) => self.kind.unload(value),
            Err(_) => log::error!(
                "Unload of {} received a value that is not a `{}`",
                self.description(),
                type_name::<K::Value>()
            ),
        }
    }
}
