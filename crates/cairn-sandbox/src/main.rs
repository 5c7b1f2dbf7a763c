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

//! Frame-loop driver for the asset registry.
//!
//! Usage: `cairn-sandbox [ASSET_DIR] [CONFIG.ron]`. Without an asset
//! directory a small in-memory data set is used.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use cairn_assets::{
    AssetKind, AssetRouter, HandleScope, IdentityRegistry, LoadContext, LoadStep, Registry,
    StateSummary, WorkerPool,
};
use cairn_core::{
    FileSystemProvider, LoadPriority, Locality, MemoryProvider, RegistryConfig, ResourceProvider,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FRAMES: u32 = 120;
const LEVEL_SWITCH_FRAME: u32 = 60;
const LEVELS: [&str; 2] = ["meadow", "crypt"];

/// Plain text files, shared process-wide.
struct Text;

impl AssetKind for Text {
    type Info = String;
    type Value = String;
    const LOCALITY: Locality = Locality::Global;

    fn load(&self, path: &String, ctx: &mut LoadContext) -> anyhow::Result<LoadStep<String>> {
        let bytes = ctx.read_all(path).with_context(|| format!("reading {path}"))?;
        Ok(LoadStep::Ready(String::from_utf8(bytes)?))
    }

    fn describe(&self, path: &String) -> String {
        format!("Text({path})")
    }
}

/// A level atlas: a manifest listing the text pages it needs.
struct Atlas;

#[async_trait]
impl AssetKind for Atlas {
    type Info = String;
    type Value = Vec<String>;
    const LOCALITY: Locality = Locality::Context;

    async fn load_async(&self, level: &String, ctx: &mut LoadContext) -> anyhow::Result<Vec<String>> {
        let manifest = String::from_utf8(ctx.read_all(&format!("{level}/atlas.txt"))?)?;
        let pages: Vec<String> = manifest
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|page| format!("{level}/{page}"))
            .collect();
        for page in &pages {
            ctx.load_secondary::<Text>(page.clone())?;
        }
        Ok(pages)
    }

    fn unload(&self, pages: Arc<Vec<String>>) {
        log::info!("Atlas: Released {} page(s)", pages.len());
    }

    fn describe(&self, level: &String) -> String {
        format!("Atlas({level})")
    }
}

/// Transient notifications, never cached.
struct Toast;

impl AssetKind for Toast {
    type Info = String;
    type Value = String;
    const LOCALITY: Locality = Locality::SingleUsage;

    fn load(&self, message: &String, _ctx: &mut LoadContext) -> anyhow::Result<LoadStep<String>> {
        Ok(LoadStep::Ready(message.to_uppercase()))
    }
}

fn demo_provider() -> MemoryProvider {
    MemoryProvider::new()
        .with("ui/title.txt", "Cairn")
        .with("meadow/atlas.txt", "grass.txt\nflowers.txt\n")
        .with("meadow/grass.txt", "green")
        .with("meadow/flowers.txt", "yellow")
        .with("crypt/atlas.txt", "bones.txt\nmissing.txt\n")
        .with("crypt/bones.txt", "white")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let provider: Arc<dyn ResourceProvider> = match args.next() {
        Some(dir) => Arc::new(FileSystemProvider::new(dir)),
        None => Arc::new(demo_provider()),
    };
    let config = match args.next() {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            RegistryConfig::from_ron(&text)?
        }
        None => RegistryConfig::default(),
    };
    log::debug!("Registry configuration:\n{}", config.to_ron()?);

    let identities = Arc::new(IdentityRegistry::new());
    identities.register(Text)?;
    identities.register(Atlas)?;
    identities.register(Toast)?;

    let pool = Arc::new(WorkerPool::new(&config).context("starting the worker pool")?);
    let global = Registry::new(identities, pool, provider, config);
    let mut router = AssetRouter::new(global);

    let title = router.load_with::<Text, _>("ui/title.txt".into(), LoadPriority::Synchronous, |title| {
        log::info!("Title ready: {title}");
    })?;

    let mut level = 0;
    let mut atlas = router.load::<Atlas>(LEVELS[level].into(), LoadPriority::High)?;
    let mut announced = false;

    for frame in 0..FRAMES {
        router.apply_assets()?;

        if frame == LEVEL_SWITCH_FRAME {
            level = (level + 1) % LEVELS.len();
            log::info!("Switching to level '{}'", LEVELS[level]);
            router.unload(&mut atlas)?;
            router.reset_local();
            atlas = router.load::<Atlas>(LEVELS[level].into(), LoadPriority::High)?;
            announced = false;
        }

        if !announced && atlas.state().is_settled() {
            announced = true;
            match atlas.get() {
                Ok(pages) => log::info!("Level '{}' ready with pages {:?}", LEVELS[level], pages),
                Err(e) => log::warn!("Level '{}' failed: {e}", LEVELS[level]),
            }
        }

        {
            // Per-frame UI: the same toast and title are requested every frame.
            let mut ui = HandleScope::delayed(&router);
            let toast = ui.load_with_priority::<Toast>(format!("frame {frame}"), LoadPriority::Synchronous)?;
            let heading = ui.adopt(title.clone());
            if frame % 30 == 0 {
                if let (Ok(text), Ok(heading)) = (ui.get(toast), ui.get(heading)) {
                    log::info!("{heading}: {text}");
                }
            }
            ui.dispose(toast);
            ui.dispose(heading);
        }

        if frame % 30 == 0 {
            let stats = router.stats();
            log::info!("Frame {frame}: {}", StateSummary::of(&stats));
            for entry in &stats {
                log::debug!("  {entry}");
            }
        }

        thread::sleep(Duration::from_millis(16));
    }

    drop(atlas);
    drop(title);
    router.apply_assets()?;
    log::info!("Shutting down with {} asset(s) left", router.stats().len());
    Ok(())
}
