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

//! Shared kinds and fixtures for the registry integration tests.

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use cairn_assets::{AssetKind, IdentityRegistry, LoadContext, LoadStep, Registry, UntypedHandle, WorkerPool};
use cairn_core::{Locality, MemoryProvider, RegistryConfig, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Load and unload counters shared between a kind and its test.
#[derive(Debug, Default)]
pub struct Counters {
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
}

impl Counters {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

/// Global text files read synchronously from the provider.
pub struct Text(pub Arc<Counters>);

impl AssetKind for Text {
    type Info = String;
    type Value = String;
    const LOCALITY: Locality = Locality::Global;

    fn load(&self, path: &String, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<String>> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        let bytes = ctx.read_all(path)?;
        Ok(LoadStep::Ready(String::from_utf8(bytes)?))
    }

    fn unload(&self, _value: Arc<String>) {
        self.0.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Global numbers loaded asynchronously once the gate lets them through.
pub struct Gated {
    pub counters: Arc<Counters>,
    pub gate: Arc<Semaphore>,
}

#[async_trait]
impl AssetKind for Gated {
    type Info = u32;
    type Value = u32;
    const LOCALITY: Locality = Locality::Global;

    async fn load_async(&self, info: &u32, _ctx: &mut LoadContext) -> anyhow::Result<u32> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await?;
        Ok(*info)
    }

    fn unload(&self, _value: Arc<u32>) {
        self.counters.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Global assets whose load always fails.
pub struct Broken(pub Arc<Counters>);

impl AssetKind for Broken {
    type Info = String;
    type Value = ();
    const LOCALITY: Locality = Locality::Global;

    fn load(&self, path: &String, _ctx: &mut LoadContext) -> anyhow::Result<LoadStep<()>> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("corrupt header in {path}"))
    }
}

/// Global bundles of text parts; parts named `bad*` fail to load.
///
/// The value is the number of parts. Waits for its parts unless `loose`.
pub struct Bundle {
    pub counters: Arc<Counters>,
    pub loose: bool,
}

impl AssetKind for Bundle {
    type Info = Vec<String>;
    type Value = usize;
    const LOCALITY: Locality = Locality::Global;

    fn wait_for_secondary(&self) -> bool {
        !self.loose
    }

    fn load(&self, parts: &Vec<String>, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<usize>> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        for part in parts {
            if part.starts_with("bad") {
                ctx.load_secondary::<Broken>(part.clone())?;
            } else {
                ctx.load_secondary::<Text>(part.clone())?;
            }
        }
        Ok(LoadStep::Ready(parts.len()))
    }

    fn unload(&self, _value: Arc<usize>) {
        self.counters.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Global assets that depend on gated numbers but do not wait for them.
pub struct Lazy(pub Arc<Counters>);

impl AssetKind for Lazy {
    type Info = u32;
    type Value = u32;
    const LOCALITY: Locality = Locality::Global;

    fn wait_for_secondary(&self) -> bool {
        false
    }

    fn load(&self, info: &u32, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<u32>> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        ctx.load_secondary::<Gated>(*info)?;
        Ok(LoadStep::Ready(*info))
    }
}

/// Context-scoped levels; each references its global title text.
pub struct Level(pub Arc<Counters>);

impl AssetKind for Level {
    type Info = String;
    type Value = String;
    const LOCALITY: Locality = Locality::Context;

    fn load(&self, name: &String, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<String>> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        ctx.load_secondary::<Text>(format!("{name}.title"))?;
        Ok(LoadStep::Ready(name.to_uppercase()))
    }

    fn unload(&self, _value: Arc<String>) {
        self.0.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Single-usage popups.
pub struct Popup(pub Arc<Counters>);

impl AssetKind for Popup {
    type Info = String;
    type Value = String;
    const LOCALITY: Locality = Locality::SingleUsage;

    fn load(&self, message: &String, _ctx: &mut LoadContext) -> anyhow::Result<LoadStep<String>> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        Ok(LoadStep::Ready(message.clone()))
    }
}

/// Global assets that try to adopt whatever handle the test parks in `slot`.
pub struct Adopter {
    pub slot: Mutex<Option<UntypedHandle>>,
}

impl AssetKind for Adopter {
    type Info = String;
    type Value = ();
    const LOCALITY: Locality = Locality::Global;

    fn load(&self, _info: &String, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<()>> {
        let parked = self
            .slot
            .lock()
            .map_err(|_| anyhow!("slot poisoned"))?
            .take();
        if let Some(handle) = parked {
            ctx.add_secondary(handle)?;
        }
        Ok(LoadStep::Ready(()))
    }
}

/// Global bundles that load their parts and wait for them inside the load
/// step. The value is the number of parts.
pub struct Waiter;

#[async_trait]
impl AssetKind for Waiter {
    type Info = Vec<String>;
    type Value = usize;
    const LOCALITY: Locality = Locality::Global;

    fn wait_for_secondary(&self) -> bool {
        false
    }

    async fn load_async(&self, parts: &Vec<String>, ctx: &mut LoadContext) -> anyhow::Result<usize> {
        for part in parts {
            if part.starts_with("bad") {
                ctx.load_secondary::<Broken>(part.clone())?;
            } else {
                ctx.load_secondary::<Text>(part.clone())?;
            }
        }
        ctx.wait_for_secondary().await?;
        Ok(ctx.secondary_count())
    }
}

/// Context assets that wait on whatever handle the test parks in `slot`.
pub struct Watcher {
    pub slot: Mutex<Option<UntypedHandle>>,
}

#[async_trait]
impl AssetKind for Watcher {
    type Info = String;
    type Value = ();
    const LOCALITY: Locality = Locality::Context;

    async fn load_async(&self, _info: &String, ctx: &mut LoadContext) -> anyhow::Result<()> {
        let parked = self
            .slot
            .lock()
            .map_err(|_| anyhow!("slot poisoned"))?
            .take();
        if let Some(handle) = parked {
            ctx.wait_for(&[&handle]).await?;
        }
        Ok(())
    }
}

/// A registry with every test kind registered, owned by the calling thread.
pub struct Fixture {
    pub registry: Registry,
    pub text: Arc<Counters>,
    pub gated: Arc<Counters>,
    pub gate: Arc<Semaphore>,
    pub broken: Arc<Counters>,
    pub bundle: Arc<Counters>,
    pub lazy: Arc<Counters>,
    pub level: Arc<Counters>,
    pub popup: Arc<Counters>,
    pub identities: Arc<IdentityRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig {
            worker_threads: Some(4),
            ..Default::default()
        })
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let text = Arc::new(Counters::default());
        let gated = Arc::new(Counters::default());
        let gate = Arc::new(Semaphore::new(0));
        let broken = Arc::new(Counters::default());
        let bundle = Arc::new(Counters::default());
        let lazy = Arc::new(Counters::default());
        let level = Arc::new(Counters::default());
        let popup = Arc::new(Counters::default());

        let identities = Arc::new(IdentityRegistry::new());
        identities.register(Text(text.clone())).unwrap();
        identities
            .register(Gated {
                counters: gated.clone(),
                gate: gate.clone(),
            })
            .unwrap();
        identities.register(Broken(broken.clone())).unwrap();
        identities
            .register(Bundle {
                counters: bundle.clone(),
                loose: false,
            })
            .unwrap();
        identities.register(Lazy(lazy.clone())).unwrap();
        identities.register(Level(level.clone())).unwrap();
        identities.register(Popup(popup.clone())).unwrap();
        identities
            .register(Adopter {
                slot: Mutex::new(None),
            })
            .unwrap();
        identities.register(Waiter).unwrap();
        identities
            .register(Watcher {
                slot: Mutex::new(None),
            })
            .unwrap();

        let provider = MemoryProvider::new()
            .with("a.txt", "alpha")
            .with("b.txt", "bravo")
            .with("c.txt", "charlie")
            .with("y.txt", "yankee")
            .with("intro.title", "Welcome")
            .with("castle.title", "The Castle");

        let pool = Arc::new(WorkerPool::new(&config).unwrap());
        let registry = Registry::new(identities.clone(), pool, Arc::new(provider), config);

        Self {
            registry,
            text,
            gated,
            gate,
            broken,
            bundle,
            lazy,
            level,
            popup,
            identities,
        }
    }

    /// Lets every gated load through.
    pub fn open_gate(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Parks `handle` for the next [`Adopter`] load.
    pub fn park_for_adopter(&self, handle: UntypedHandle) {
        let adopter = self.identities.kind::<Adopter>().unwrap();
        *adopter.slot.lock().unwrap() = Some(handle);
    }

    /// Parks `handle` for the next [`Watcher`] load.
    pub fn park_for_watcher(&self, handle: UntypedHandle) {
        let watcher = self.identities.kind::<Watcher>().unwrap();
        *watcher.slot.lock().unwrap() = Some(handle);
    }
}

/// Calls `apply` until `done` holds, failing the test after five seconds.
pub fn pump_until(apply: impl Fn() -> Result<()>, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        apply().unwrap();
        if done() {
            return;
        }
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Pumps `registry` until `done` holds.
pub fn pump(registry: &Registry, done: impl FnMut() -> bool) {
    pump_until(|| registry.apply_assets(), done);
}
