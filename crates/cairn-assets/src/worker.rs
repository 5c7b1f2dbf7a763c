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

//! The background worker pool and the registry cancellation signal.

use cairn_core::RegistryConfig;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::sync::watch;

/// The pool of worker threads running asset load steps.
///
/// One pool is usually shared by the global registry and every local
/// registry. Registries hold it through an `Arc`; the threads stop once the
/// last registry is gone.
///
/// The pool must be dropped from a plain thread (typically the owning
/// thread), never from inside a load step.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Starts a pool sized according to `config`.
    pub fn new(config: &RegistryConfig) -> io::Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name("cairn-loader");
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads.max(1));
        }
        let runtime = builder.build()?;
        let handle = runtime.handle().clone();
        log::info!(
            "WorkerPool: Started ({} threads)",
            config
                .worker_threads
                .map_or_else(|| "default".to_string(), |n| n.max(1).to_string())
        );
        Ok(Self {
            runtime: Some(runtime),
            handle,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs a future on the pool and returns immediately.
    pub(crate) fn spawn<F>(handle: &Handle, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(handle.spawn(future));
    }
}

/// Runs blocking work. On a pool worker the thread first hands its other
/// tasks over to the rest of the pool.
pub(crate) fn block_in_place<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(self.shutdown_timeout);
            log::info!("WorkerPool: Stopped.");
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// The raising side of a registry's cancellation signal.
#[derive(Debug)]
pub(crate) struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// The observing side of a registry's cancellation signal.
///
/// Raised once, at registry teardown. In-flight loads observe it and stop;
/// pending waits resolve with
/// [`AssetError::Cancelled`](cairn_core::AssetError::Cancelled).
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Returns `true` once the owning registry started tearing down.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised (or its registry is gone).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the source was dropped, which only happens at teardown.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
