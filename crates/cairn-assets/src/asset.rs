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

//! The per-identifier asset state machine.
//!
//! An [`Asset`] owns the loaded value, the reference count, the secondary
//! handles acquired while loading, the captured error and the pending apply
//! callbacks. All of them sit behind the asset's own lock, so unrelated assets
//! never contend with each other.
//!
//! Lock order is registry map first, asset second. Nothing that can reach
//! another lock (unload steps, dropping handles, apply callbacks) ever runs
//! while an asset lock is held.

use crate::context::LoadContext;
use crate::handle::UntypedHandle;
use crate::kind::{ErasedLoad, ErasedValue};
use crate::registry::{AssetStats, RegistryInner, WaitTarget};
use cairn_core::{AssetError, AssetId, AssetState, LoadPriority, Result};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// A one-shot callback run on the owning thread once the value is usable.
pub(crate) type ApplyAction = Box<dyn FnOnce(ErasedValue) + Send>;

/// What a dying asset hands back for release outside of its lock.
pub(crate) struct Released {
    value: Option<ErasedValue>,
    secondary: Vec<UntypedHandle>,
    actions: Vec<ApplyAction>,
}

struct AssetInner {
    state: AssetState,
    ref_count: u32,
    /// Set once the count dropped to zero; the asset never hands out new references after that.
    released: bool,
    priority: LoadPriority,
    value: Option<ErasedValue>,
    secondary: Vec<UntypedHandle>,
    error: Option<AssetError>,
    apply_actions: Vec<ApplyAction>,
    apply_scheduled: bool,
}

/// Where a background run of the load pipeline starts.
pub(crate) enum Stage {
    /// Run the synchronous step, then the asynchronous one if needed.
    Start,
    /// The synchronous step asked for the asynchronous one.
    LoadAsync(LoadContext),
    /// Content is stored; only the secondary wait is left.
    WaitSecondary(Vec<WaitTarget>),
}

pub(crate) struct Asset {
    id: AssetId,
    loader: Box<dyn ErasedLoad>,
    inner: Mutex<AssetInner>,
    state_tx: watch::Sender<AssetState>,
}

impl Asset {
    pub(crate) fn new(id: AssetId, loader: Box<dyn ErasedLoad>, priority: LoadPriority) -> Arc<Self> {
        let (state_tx, _) = watch::channel(AssetState::Queued);
        Arc::new(Self {
            id,
            loader,
            inner: Mutex::new(AssetInner {
                state: AssetState::Queued,
                ref_count: 0,
                released: false,
                priority,
                value: None,
                secondary: Vec::new(),
                error: None,
                apply_actions: Vec::new(),
                apply_scheduled: false,
            }),
            state_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, AssetInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut AssetInner, state: AssetState) {
        log::debug!("{} [{}]: {} -> {}", self.description(), self.id, inner.state, state);
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    pub(crate) fn id(&self) -> AssetId {
        self.id
    }

    pub(crate) fn description(&self) -> String {
        self.loader.description()
    }

    pub(crate) fn state(&self) -> AssetState {
        self.lock().state
    }

    pub(crate) fn is_released(&self) -> bool {
        self.lock().released
    }

    pub(crate) fn error(&self) -> Option<AssetError> {
        self.lock().error.clone()
    }

    pub(crate) fn snapshot(&self) -> AssetStats {
        let inner = self.lock();
        AssetStats {
            id: self.id,
            kind: self.loader.kind_name(),
            description: self.loader.description(),
            ref_count: inner.ref_count,
            state: inner.state,
            priority: inner.priority,
        }
    }

    // --- Reference counting ---

    /// Adds one reference. Returns `false` if the count already reached zero,
    /// in which case the caller must not treat this asset as alive.
    pub(crate) fn add_ref(&self) -> bool {
        let mut inner = self.lock();
        if inner.released {
            return false;
        }
        inner.ref_count += 1;
        log::trace!("{}: ref_count -> {}", self.id, inner.ref_count);
        true
    }

    /// Removes one reference. On the transition from one to zero the asset is
    /// disposed and its content is returned for release by the caller.
    pub(crate) fn del_ref(&self) -> Option<Released> {
        let mut inner = self.lock();
        if inner.ref_count == 0 {
            log::error!("{}: reference released more often than acquired", self.id);
            return None;
        }
        inner.ref_count -= 1;
        log::trace!("{}: ref_count -> {}", self.id, inner.ref_count);
        if inner.ref_count > 0 {
            return None;
        }

        inner.released = true;
        if inner.state != AssetState::Error {
            self.set_state(&mut inner, AssetState::Disposed);
        }
        Some(Self::take_content(&mut inner))
    }

    /// Disposes the asset regardless of its reference count (registry teardown).
    pub(crate) fn force_dispose(&self) -> Released {
        let mut inner = self.lock();
        inner.released = true;
        inner.ref_count = 0;
        if inner.state != AssetState::Disposed {
            self.set_state(&mut inner, AssetState::Disposed);
        }
        Self::take_content(&mut inner)
    }

    fn take_content(inner: &mut AssetInner) -> Released {
        Released {
            value: inner.value.take(),
            secondary: mem::take(&mut inner.secondary),
            actions: mem::take(&mut inner.apply_actions),
        }
    }

    /// Runs the kind's unload step and releases the secondary handles.
    /// Must be called without holding any lock.
    pub(crate) fn dispose_content(&self, released: Released) {
        let Released {
            value,
            secondary,
            actions,
        } = released;
        drop(actions);
        if let Some(value) = value {
            log::debug!("Unloading {}", self.description());
            self.loader.unload(value);
        }
        // Dropping the handles releases the secondary assets, which may cascade.
        drop(secondary);
    }

    pub(crate) fn raise_priority(&self, priority: LoadPriority) {
        let mut inner = self.lock();
        if priority.is_more_urgent_than(inner.priority) {
            inner.priority = priority;
        }
    }

    // --- Load pipeline ---

    /// Queued -> Loading. Returns `false` if the asset already left `Queued`.
    fn begin_loading(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != AssetState::Queued {
            return false;
        }
        self.set_state(&mut inner, AssetState::Loading);
        true
    }

    /// Starts loading according to `priority`.
    pub(crate) fn start(self: &Arc<Self>, registry: &Arc<RegistryInner>, priority: LoadPriority) {
        match priority {
            LoadPriority::Synchronous => self.load_synchronously(registry),
            LoadPriority::High | LoadPriority::Low => {
                registry.spawn(self.clone().run(registry.clone(), Stage::Start));
            }
        }
    }

    /// Makes sure a load is under way. Idempotent.
    pub(crate) fn ensure_started(self: &Arc<Self>, registry: &Arc<RegistryInner>) {
        if self.state() == AssetState::Queued {
            registry.spawn(self.clone().run(registry.clone(), Stage::Start));
        }
    }

    /// Runs the synchronous load step on the calling thread.
    ///
    /// Waiting for secondary assets and asynchronous-only kinds continue on a
    /// worker; nothing here blocks on another thread.
    pub(crate) fn load_synchronously(self: &Arc<Self>, registry: &Arc<RegistryInner>) {
        if !self.begin_loading() {
            return;
        }

        let mut ctx = LoadContext::new(registry.clone(), self.id);
        match self.loader.load(&mut ctx) {
            Err(error) => self.fail(self.load_error(error)),
            Ok(Some(value)) => {
                if let Some(targets) = self.store_content(registry, value, ctx.into_secondary()) {
                    registry.spawn(
                        self.clone()
                            .run(registry.clone(), Stage::WaitSecondary(targets)),
                    );
                }
            }
            Ok(None) => {
                log::warn!(
                    "{} only loads asynchronously; continuing in the background",
                    self.description()
                );
                self.lock().priority = LoadPriority::High;
                registry.spawn(self.clone().run(registry.clone(), Stage::LoadAsync(ctx)));
            }
        }
    }

    /// The background driver. Races the pipeline against the registry's
    /// cancellation signal and records any failure on the asset.
    pub(crate) async fn run(self: Arc<Self>, registry: Arc<RegistryInner>, stage: Stage) {
        if matches!(stage, Stage::Start) {
            // Best effort: a High load may be waiting on this one as a secondary.
            let low = self.lock().priority == LoadPriority::Low;
            if low {
                tokio::task::yield_now().await;
            }
            if !self.begin_loading() {
                return;
            }
        }

        let cancel = registry.cancel_signal();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AssetError::Cancelled(self.id)),
            result = self.advance(&registry, stage) => result,
        };
        if let Err(error) = result {
            self.fail(error);
        }
    }

    async fn advance(self: &Arc<Self>, registry: &Arc<RegistryInner>, stage: Stage) -> Result<()> {
        let targets = match stage {
            Stage::Start => {
                let mut ctx = LoadContext::new(registry.clone(), self.id);
                let value = match self.load_step(&mut ctx)? {
                    Some(value) => value,
                    None => self.load_step_async(&mut ctx).await?,
                };
                self.store_content(registry, value, ctx.into_secondary())
            }
            Stage::LoadAsync(mut ctx) => {
                let value = self.load_step_async(&mut ctx).await?;
                self.store_content(registry, value, ctx.into_secondary())
            }
            Stage::WaitSecondary(targets) => Some(targets),
        };

        if let Some(targets) = targets {
            RegistryInner::wait_for_all(registry.runtime(), targets).await?;
            self.finish_loaded(registry);
        }
        Ok(())
    }

    fn load_step(&self, ctx: &mut LoadContext) -> Result<Option<ErasedValue>> {
        self.loader.load(ctx).map_err(|error| self.load_error(error))
    }

    async fn load_step_async(&self, ctx: &mut LoadContext) -> Result<ErasedValue> {
        self.loader
            .load_async(ctx)
            .await
            .map_err(|error| self.load_error(error))
    }

    /// Registry errors raised inside a load step (a failed secondary, a
    /// locality violation) are kept as they are; anything else is wrapped.
    fn load_error(&self, error: anyhow::Error) -> AssetError {
        match error.downcast::<AssetError>() {
            Ok(error) => error,
            Err(error) => AssetError::load_failure(self.description(), error),
        }
    }

    /// Stores the result of the load step.
    ///
    /// Returns the secondary assets still to wait for when the kind requires
    /// it (state becomes `LoadingSecondary`); otherwise the asset is marked
    /// loaded right away and `None` is returned. If the asset was released
    /// while loading, the fresh result is unloaded immediately.
    fn store_content(
        self: &Arc<Self>,
        registry: &Arc<RegistryInner>,
        value: ErasedValue,
        secondary: Vec<UntypedHandle>,
    ) -> Option<Vec<WaitTarget>> {
        // Secondary states are read before taking this asset's lock.
        let targets: Vec<WaitTarget> = if self.loader.wait_for_secondary() {
            secondary
                .iter()
                .filter_map(WaitTarget::of)
                .filter(|target| !target.is_loaded())
                .collect()
        } else {
            Vec::new()
        };

        let mut inner = self.lock();
        if inner.state != AssetState::Loading {
            drop(inner);
            log::debug!(
                "{} was released while loading; unloading the finished result",
                self.description()
            );
            self.dispose_content(Released {
                value: Some(value),
                secondary,
                actions: Vec::new(),
            });
            return None;
        }

        inner.value = Some(value);
        inner.secondary = secondary;
        if targets.is_empty() {
            drop(inner);
            self.finish_loaded(registry);
            None
        } else {
            self.set_state(&mut inner, AssetState::LoadingSecondary);
            Some(targets)
        }
    }

    /// Loading/LoadingSecondary -> Loaded, scheduling pending apply callbacks.
    fn finish_loaded(self: &Arc<Self>, registry: &Arc<RegistryInner>) {
        let schedule = {
            let mut inner = self.lock();
            if !inner.state.is_loading() {
                return;
            }
            self.set_state(&mut inner, AssetState::Loaded);
            let schedule = !inner.apply_actions.is_empty() && !inner.apply_scheduled;
            if schedule {
                inner.apply_scheduled = true;
            }
            schedule
        };

        if schedule {
            registry.schedule_apply(self.clone());
        }
    }

    /// Any non-terminal state -> Error. The error is kept for every later
    /// reader; the produced value is unloaded and secondary handles released.
    pub(crate) fn fail(&self, error: AssetError) {
        let released = {
            let mut inner = self.lock();
            if inner.state.is_terminal() || inner.state == AssetState::Loaded {
                return;
            }
            inner.error = Some(error.clone());
            self.set_state(&mut inner, AssetState::Error);
            Self::take_content(&mut inner)
        };

        match &error {
            AssetError::Cancelled(_) => log::debug!("{} cancelled", self.description()),
            _ => log::error!("{error}"),
        }
        self.dispose_content(released);
    }

    // --- Values and apply callbacks ---

    /// Returns the value if loaded, `None` while loading, and the captured
    /// error or [`AssetError::UseAfterDispose`] for terminal states.
    pub(crate) fn value(&self) -> Result<Option<ErasedValue>> {
        let inner = self.lock();
        match inner.state {
            AssetState::Loaded => Ok(inner.value.clone()),
            AssetState::Error => Err(inner
                .error
                .clone()
                .unwrap_or(AssetError::UseAfterDispose(self.id))),
            AssetState::Disposed => Err(AssetError::UseAfterDispose(self.id)),
            AssetState::Queued | AssetState::Loading | AssetState::LoadingSecondary => Ok(None),
        }
    }

    /// Attaches a one-shot callback.
    ///
    /// Runs immediately if the asset is loaded, the caller is the owning
    /// thread and no earlier callback is still pending; otherwise it is
    /// queued and run by the owning thread in registration order. Callbacks
    /// attached to an asset that failed or was disposed are dropped.
    pub(crate) fn add_apply_action(self: &Arc<Self>, registry: &Arc<RegistryInner>, action: ApplyAction) {
        let on_owner = registry.is_owning_thread();
        let mut inner = self.lock();
        match inner.state {
            AssetState::Loaded if on_owner && inner.apply_actions.is_empty() => {
                let value = inner.value.clone();
                drop(inner);
                if let Some(value) = value {
                    action(value);
                }
            }
            AssetState::Loaded => {
                inner.apply_actions.push(action);
                if !inner.apply_scheduled {
                    inner.apply_scheduled = true;
                    drop(inner);
                    registry.schedule_apply(self.clone());
                }
            }
            AssetState::Error | AssetState::Disposed => {
                drop(inner);
                log::trace!("{}: dropping apply callback of a dead asset", self.id);
                drop(action);
            }
            AssetState::Queued | AssetState::Loading | AssetState::LoadingSecondary => {
                inner.apply_actions.push(action);
            }
        }
    }

    /// Runs every stored callback once. Owning thread only.
    pub(crate) fn run_apply_actions(&self) {
        let (actions, value) = {
            let mut inner = self.lock();
            inner.apply_scheduled = false;
            if inner.state != AssetState::Loaded {
                (mem::take(&mut inner.apply_actions), None)
            } else {
                (mem::take(&mut inner.apply_actions), inner.value.clone())
            }
        };

        let Some(value) = value else {
            drop(actions);
            return;
        };
        log::trace!("{}: running {} apply callback(s)", self.id, actions.len());
        for action in actions {
            action(value.clone());
        }
    }

    /// Resolves once the asset settled: `Ok` when loaded, the captured error
    /// on failure, [`AssetError::UseAfterDispose`] if it was disposed first.
    pub(crate) async fn settled(self: Arc<Self>) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let state = match rx.wait_for(|state| state.is_settled()).await {
            Ok(state) => *state,
            Err(_) => AssetState::Disposed,
        };
        match state {
            AssetState::Loaded => Ok(()),
            AssetState::Error => Err(self.error().unwrap_or(AssetError::Cancelled(self.id))),
            _ => Err(AssetError::UseAfterDispose(self.id)),
        }
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("kind", &self.loader.kind_name())
            .field("value", &self.loader.value_type())
            .field("state", &inner.state)
            .field("ref_count", &inner.ref_count)
            .finish()
    }
}
