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

//! The asset registry: identifier map, load pipeline entry and owning-thread queues.

mod queue;
mod stats;

pub use stats::{AssetStats, StateSummary};

use crate::asset::{ApplyAction, Asset};
use crate::handle::{AssetHandle, UntypedHandle};
use crate::identity::IdentityRegistry;
use crate::kind::{kind_name, AssetKind, ErasedValue, KindLoader};
use crate::worker::{CancelSignal, CancelSource, WorkerPool};
use cairn_core::{
    AssetError, AssetId, AssetState, LoadPriority, RegistryConfig, ResourceProvider, Result,
};
use crossbeam_channel::RecvTimeoutError;
use queue::AssetQueue;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

static NEXT_LOCAL: AtomicU64 = AtomicU64::new(1);

/// Which registry an asset lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Scope {
    Global,
    Local(u64),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Local(n) => write!(f, "local#{n}"),
        }
    }
}

/// An asset to wait on, with the registry it lives in.
pub(crate) struct WaitTarget {
    registry: Arc<RegistryInner>,
    asset: Arc<Asset>,
}

impl WaitTarget {
    pub(crate) fn of(handle: &UntypedHandle) -> Option<Self> {
        let registry = handle.registry()?;
        let asset = registry.lookup(handle.id())?;
        Some(Self { registry, asset })
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.asset.state() == AssetState::Loaded
    }
}

/// The shared state behind a [`Registry`].
///
/// Background loads, handles (weakly) and load contexts all point here; the
/// facade only adds the worker pool and teardown on drop.
pub(crate) struct RegistryInner {
    scope: Scope,
    parent: Option<Arc<RegistryInner>>,
    identities: Arc<IdentityRegistry>,
    provider: Arc<dyn ResourceProvider>,
    assets: Mutex<HashMap<AssetId, Arc<Asset>>>,
    owner: ThreadId,
    cancel: CancelSource,
    runtime: Handle,
    apply_queue: AssetQueue,
    removal_queue: AssetQueue,
    config: RegistryConfig,
}

impl RegistryInner {
    fn new(
        scope: Scope,
        parent: Option<Arc<RegistryInner>>,
        identities: Arc<IdentityRegistry>,
        provider: Arc<dyn ResourceProvider>,
        runtime: Handle,
        config: RegistryConfig,
    ) -> Self {
        Self {
            scope,
            parent,
            identities,
            provider,
            assets: Mutex::new(HashMap::new()),
            owner: thread::current().id(),
            cancel: CancelSource::new(),
            runtime,
            apply_queue: AssetQueue::new("apply", config.apply_capacity(), config.enqueue_retry()),
            removal_queue: AssetQueue::new(
                "removal",
                config.removal_capacity(),
                config.enqueue_retry(),
            ),
            config,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<AssetId, Arc<Asset>>> {
        self.assets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn cancel_signal(&self) -> CancelSignal {
        self.cancel.signal()
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        WorkerPool::spawn(&self.runtime, future);
    }

    pub(crate) fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Checks that `operation` runs on the owning thread. A violation is a
    /// caller bug: it asserts in debug builds and is reported in release.
    pub(crate) fn ensure_owning_thread(&self, operation: &'static str) -> Result<()> {
        if self.is_owning_thread() {
            return Ok(());
        }
        log::error!(
            "Registry({}): `{}` called from {:?}, owning thread is {:?}",
            self.scope,
            operation,
            thread::current().id(),
            self.owner
        );
        debug_assert!(false, "`{operation}` called off the owning thread");
        Err(AssetError::ThreadViolation { operation })
    }

    pub(crate) fn lookup(&self, id: AssetId) -> Option<Arc<Asset>> {
        self.map().get(&id).cloned()
    }

    fn root(self: &Arc<Self>) -> Arc<Self> {
        match &self.parent {
            Some(parent) => parent.root(),
            None => self.clone(),
        }
    }

    /// Picks the registry that must hold assets of kind `K`.
    pub(crate) fn route<K: AssetKind>(self: &Arc<Self>) -> Result<Arc<Self>> {
        if !K::LOCALITY.is_local() {
            return Ok(self.root());
        }
        match self.scope {
            Scope::Global => Err(AssetError::WrongLocalityUse(format!(
                "{} is a {} kind and cannot be loaded through the global registry",
                kind_name::<K>(),
                K::LOCALITY
            ))),
            Scope::Local(_) => Ok(self.clone()),
        }
    }

    /// Returns `true` if assets of this registry may hold handles owned by
    /// `other`: its own, or those of any ancestor.
    pub(crate) fn can_reference(&self, other: &Arc<RegistryInner>) -> bool {
        if std::ptr::eq(self, Arc::as_ptr(other)) {
            return true;
        }
        self.parent
            .as_ref()
            .is_some_and(|parent| parent.can_reference(other))
    }

    /// Loads `info` in this registry, which must be the one [`route`](Self::route) picked.
    pub(crate) fn load_here<K: AssetKind>(
        self: &Arc<Self>,
        info: K::Info,
        priority: LoadPriority,
        action: Option<ApplyAction>,
    ) -> Result<UntypedHandle> {
        let table = self.identities.table::<K>()?;
        let id = table.resolve(&info);
        if self.cancel.signal().is_cancelled() {
            return Err(AssetError::Cancelled(id));
        }

        let (asset, created) = {
            let mut assets = self.map();
            match assets.get(&id) {
                Some(existing) if existing.add_ref() => (existing.clone(), false),
                _ => {
                    let loader = KindLoader::new(table.kind().clone(), info);
                    let asset = Asset::new(id, Box::new(loader), priority);
                    asset.add_ref();
                    // A released entry may still be waiting for removal; it is replaced.
                    assets.insert(id, asset.clone());
                    (asset, true)
                }
            }
        };

        if created {
            log::debug!(
                "Registry({}): Loading {} [{}] at {:?}",
                self.scope,
                asset.description(),
                id,
                priority
            );
            asset.start(self, priority);
        } else {
            asset.raise_priority(priority);
            if priority == LoadPriority::Synchronous && asset.state() == AssetState::Queued {
                asset.load_synchronously(self);
            }
        }

        if let Some(action) = action {
            asset.add_apply_action(self, action);
        }
        Ok(UntypedHandle::adopt(self, id))
    }

    /// Removes one reference from `id`. At zero the content is disposed on the
    /// calling thread and the map entry is queued for removal.
    pub(crate) fn release(&self, id: AssetId) {
        let Some(asset) = self.lookup(id) else {
            return;
        };
        if let Some(released) = asset.del_ref() {
            log::debug!(
                "Registry({}): Released last reference to {}",
                self.scope,
                asset.description()
            );
            asset.dispose_content(released);
            self.removal_queue
                .push(asset, self.is_owning_thread(), &self.cancel.signal());
        }
    }

    pub(crate) fn schedule_apply(&self, asset: Arc<Asset>) {
        self.apply_queue
            .push(asset, self.is_owning_thread(), &self.cancel.signal());
    }

    fn apply_assets(&self) -> Result<()> {
        self.ensure_owning_thread("Registry::apply_assets")?;

        let removals = self.removal_queue.drain();
        if !removals.is_empty() {
            let mut assets = self.map();
            for asset in &removals {
                let stale = assets
                    .get(&asset.id())
                    .is_some_and(|entry| Arc::ptr_eq(entry, asset) && entry.is_released());
                if stale {
                    assets.remove(&asset.id());
                }
            }
            log::trace!("Registry({}): Drained {} removal(s)", self.scope, removals.len());
        }
        drop(removals);

        for asset in self.apply_queue.drain() {
            asset.run_apply_actions();
        }
        Ok(())
    }

    /// Waits until every target is loaded, failing fast on the first error.
    pub(crate) async fn wait_for_all(runtime: &Handle, targets: Vec<WaitTarget>) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }

        let mut waits = JoinSet::new();
        for WaitTarget { registry, asset } in targets {
            asset.ensure_started(&registry);
            waits.spawn_on(asset.settled(), runtime);
        }

        while let Some(joined) = waits.join_next().await {
            let settled = joined.map_err(|e| {
                AssetError::load_failure("secondary asset wait", anyhow::Error::new(e))
            })?;
            if let Err(error) = settled {
                waits.abort_all();
                return Err(error);
            }
        }
        Ok(())
    }

    fn teardown(&self) {
        self.cancel.cancel();
        let assets: Vec<Arc<Asset>> = self.map().drain().map(|(_, asset)| asset).collect();
        log::info!(
            "Registry({}): Tearing down {} asset(s)",
            self.scope,
            assets.len()
        );
        for asset in assets {
            let released = asset.force_dispose();
            asset.dispose_content(released);
        }
        drop(self.removal_queue.drain());
        drop(self.apply_queue.drain());
    }
}

/// The asset registry.
///
/// Owns the identifier-to-asset map of one scope (the global scope, or one
/// local scope such as a level or a screen), issues handles, deduplicates
/// concurrent loads and runs load steps on the shared [`WorkerPool`].
///
/// The thread that creates a registry is its owning thread. Only that thread
/// may call [`apply_assets`](Self::apply_assets), which removes disposed
/// assets from the map and runs apply callbacks, and only that thread may
/// read loaded values through handles. Everything else may be called from
/// any thread.
///
/// Dropping the registry cancels in-flight loads and disposes every asset it
/// still holds, whatever their reference counts.
pub struct Registry {
    inner: Arc<RegistryInner>,
    pool: Arc<WorkerPool>,
}

impl Registry {
    /// Creates a global registry owned by the calling thread.
    pub fn new(
        identities: Arc<IdentityRegistry>,
        pool: Arc<WorkerPool>,
        provider: Arc<dyn ResourceProvider>,
        config: RegistryConfig,
    ) -> Self {
        let inner = RegistryInner::new(
            Scope::Global,
            None,
            identities,
            provider,
            pool.handle().clone(),
            config,
        );
        log::info!("Registry(global): Created.");
        Self {
            inner: Arc::new(inner),
            pool,
        }
    }

    /// Creates a local registry owned by the calling thread.
    ///
    /// It shares identities, provider, configuration and worker pool with the
    /// global registry it descends from. Loads of global kinds made through it
    /// are forwarded to that global registry.
    pub fn new_local(&self) -> Registry {
        let parent = self.inner.root();
        let scope = Scope::Local(NEXT_LOCAL.fetch_add(1, Ordering::Relaxed));
        let inner = RegistryInner::new(
            scope,
            Some(parent.clone()),
            parent.identities.clone(),
            parent.provider.clone(),
            parent.runtime.clone(),
            parent.config.clone(),
        );
        log::info!("Registry({scope}): Created.");
        Registry {
            inner: Arc::new(inner),
            pool: self.pool.clone(),
        }
    }

    /// Returns `true` for the global registry.
    pub fn is_global(&self) -> bool {
        self.inner.scope == Scope::Global
    }

    /// The identity registry shared by this registry family.
    pub fn identities(&self) -> &Arc<IdentityRegistry> {
        &self.inner.identities
    }

    /// The worker pool running load steps.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// The configuration this registry was created with.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// The cancellation signal raised when this registry is dropped.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.inner.cancel_signal()
    }

    /// Returns `true` on the thread that created this registry.
    pub fn is_owning_thread(&self) -> bool {
        self.inner.is_owning_thread()
    }

    /// Requests the asset described by `info`.
    ///
    /// Returns a new handle right away. If the asset is already live its
    /// reference count grows; otherwise it is created and starts loading
    /// according to `priority`. A [`LoadPriority::Synchronous`] request runs
    /// the kind's synchronous load step before returning.
    ///
    /// # Errors
    /// - [`AssetError::NotRegistered`] if `K` is unknown.
    /// - [`AssetError::WrongLocalityUse`] if a local kind is loaded through
    ///   the global registry.
    /// - [`AssetError::Cancelled`] if the target registry is tearing down.
    ///
    /// Load step failures are not reported here; they surface through the
    /// handle.
    pub fn load<K: AssetKind>(&self, info: K::Info, priority: LoadPriority) -> Result<AssetHandle<K::Value>> {
        let target = self.inner.route::<K>()?;
        Ok(target.load_here::<K>(info, priority, None)?.typed())
    }

    /// Like [`load`](Self::load), and runs `on_loaded` on the owning thread
    /// once the value is usable.
    ///
    /// If the asset is already loaded and this is the owning thread, the
    /// callback runs before this call returns. Otherwise it runs during a
    /// later [`apply_assets`](Self::apply_assets). If loading fails the
    /// callback never runs.
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
        let target = self.inner.route::<K>()?;
        let action = typed_action::<K::Value, F>(on_loaded);
        Ok(target.load_here::<K>(info, priority, Some(action))?.typed())
    }

    /// Attaches a one-shot callback to the asset behind `handle`, with the
    /// same timing rules as [`load_with`](Self::load_with).
    pub fn on_loaded<V, F>(&self, handle: &AssetHandle<V>, on_loaded: F) -> Result<()>
    where
        V: Send + Sync + 'static,
        F: FnOnce(Arc<V>) + Send + 'static,
    {
        let untyped = handle.as_untyped();
        let owner = untyped
            .registry()
            .ok_or(AssetError::UseAfterDispose(untyped.id()))?;
        self.check_reachable(&owner, untyped.id())?;
        let asset = owner
            .lookup(untyped.id())
            .ok_or(AssetError::UseAfterDispose(untyped.id()))?;
        asset.add_apply_action(&owner, typed_action::<V, F>(on_loaded));
        Ok(())
    }

    /// Disposes `handle`.
    ///
    /// # Errors
    /// [`AssetError::WrongLocalityUse`] if the handle belongs to a local
    /// registry other than this one. The handle is left untouched.
    pub fn unload<H: AsMut<UntypedHandle>>(&self, handle: &mut H) -> Result<()> {
        let handle = handle.as_mut();
        if let Some(owner) = handle.registry() {
            self.check_reachable(&owner, handle.id())?;
        }
        handle.dispose();
        Ok(())
    }

    fn check_reachable(&self, owner: &Arc<RegistryInner>, id: AssetId) -> Result<()> {
        if self.inner.can_reference(owner) {
            Ok(())
        } else {
            Err(AssetError::WrongLocalityUse(format!(
                "asset {} belongs to the {} registry, not to {}",
                id, owner.scope, self.inner.scope
            )))
        }
    }

    /// Drains the pending-removal queue, then the pending-apply queue.
    ///
    /// Call it regularly (once per frame) from the owning thread.
    ///
    /// # Errors
    /// [`AssetError::ThreadViolation`] off the owning thread.
    pub fn apply_assets(&self) -> Result<()> {
        self.inner.apply_assets()
    }

    /// The state of the asset `id`, if this registry holds it.
    pub fn state(&self, id: AssetId) -> Option<AssetState> {
        self.inner.lookup(id).map(|asset| asset.state())
    }

    /// The captured error of the asset `id`, if it failed.
    pub fn error(&self, id: AssetId) -> Option<AssetError> {
        self.inner.lookup(id).and_then(|asset| asset.error())
    }

    /// The number of map entries, including disposed ones not yet removed.
    pub fn len(&self) -> usize {
        self.inner.map().len()
    }

    /// Returns `true` if the map holds no entry.
    pub fn is_empty(&self) -> bool {
        self.inner.map().is_empty()
    }

    /// A snapshot of every asset in this registry, sorted by description.
    pub fn stats(&self) -> Vec<AssetStats> {
        let assets: Vec<Arc<Asset>> = self.inner.map().values().cloned().collect();
        let mut stats: Vec<AssetStats> = assets.iter().map(|asset| asset.snapshot()).collect();
        stats.sort_by(|a, b| a.description.cmp(&b.description));
        stats
    }

    /// Returns a future resolving once every handle's asset is loaded.
    ///
    /// The future is detached from `self` and may be awaited anywhere except on
    /// the owning thread of a registry whose loads need [`apply_assets`](Self::apply_assets)
    /// to progress. Handles that are already disposed are skipped.
    ///
    /// # Errors
    /// The first failure among the assets, or [`AssetError::Cancelled`] if
    /// the registry is dropped meanwhile.
    pub fn wait_for(&self, handles: &[&UntypedHandle]) -> impl Future<Output = Result<()>> + Send + 'static {
        let targets: Vec<WaitTarget> = handles.iter().filter_map(|h| WaitTarget::of(h)).collect();
        let runtime = self.inner.runtime.clone();
        let cancel = self.inner.cancel_signal();
        async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AssetError::Cancelled(AssetId::INVALID)),
                result = RegistryInner::wait_for_all(&runtime, targets) => result,
            }
        }
    }

    /// Blocks the calling thread until every handle's asset is loaded.
    ///
    /// On the owning thread the queues keep being drained while waiting, so
    /// apply callbacks run and background writers never stall on a full
    /// queue. Meant for tools and tests. Never call it from a load step.
    pub fn block_on_loaded(&self, handles: &[&UntypedHandle]) -> Result<()> {
        let wait = self.wait_for(handles);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.inner.spawn(async move {
            let _ = done_tx.send(wait.await);
        });

        let drain = self.is_owning_thread();
        loop {
            if drain {
                self.apply_assets()?;
            }
            match done_rx.recv_timeout(self.inner.config.enqueue_retry()) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AssetError::Cancelled(AssetId::INVALID))
                }
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("scope", &self.inner.scope)
            .field("assets", &self.len())
            .field("pending_apply", &self.inner.apply_queue.len())
            .field("pending_removal", &self.inner.removal_queue.len())
            .finish()
    }
}

fn typed_action<V, F>(on_loaded: F) -> ApplyAction
where
    V: Send + Sync + 'static,
    F: FnOnce(Arc<V>) + Send + 'static,
{
    Box::new(move |value: ErasedValue| match value.downcast::<V>() {
        Ok(value) => on_loaded(value),
        Err(_) => log::error!(
            "Apply callback expected a `{}` value",
            std::any::type_name::<V>()
        ),
    })
}
