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

//! Bounded hand-off queues drained by the owning thread.

use crate::asset::Asset;
use crate::worker::{block_in_place, CancelSignal};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A bounded queue of assets waiting for the owning thread.
///
/// Background writers block while the queue is full, re-checking the
/// cancellation signal every `retry` slice. The owning thread never blocks on
/// its own queue: when it finds the queue full it parks the entry in an
/// overflow list that the next drain picks up. Cancelled writers do the same,
/// so teardown never waits on a queue nobody drains anymore.
pub(crate) struct AssetQueue {
    name: &'static str,
    tx: Sender<Arc<Asset>>,
    rx: Receiver<Arc<Asset>>,
    overflow: Mutex<Vec<Arc<Asset>>>,
    capacity: usize,
    retry: Duration,
}

impl AssetQueue {
    pub(crate) fn new(name: &'static str, capacity: usize, retry: Duration) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            name,
            tx,
            rx,
            overflow: Mutex::new(Vec::new()),
            capacity,
            retry,
        }
    }

    /// Enqueues `asset`. `on_owner` tells whether the caller is the owning thread.
    pub(crate) fn push(&self, asset: Arc<Asset>, on_owner: bool, cancel: &CancelSignal) {
        if on_owner {
            match self.tx.try_send(asset) {
                Ok(()) => {}
                Err(TrySendError::Full(asset)) | Err(TrySendError::Disconnected(asset)) => {
                    log::warn!(
                        "AssetQueue({}): full ({} entries), parking {} until the next drain",
                        self.name,
                        self.capacity,
                        asset.id()
                    );
                    self.park(asset);
                }
            }
            return;
        }

        // A pool worker blocked here must not hold up the loads and waits
        // queued behind it on the same thread.
        block_in_place(|| {
            let mut pending = asset;
            loop {
                match self.tx.send_timeout(pending, self.retry) {
                    Ok(()) => return,
                    Err(SendTimeoutError::Timeout(asset)) if !cancel.is_cancelled() => {
                        log::trace!("AssetQueue({}): full, writer waiting", self.name);
                        pending = asset;
                    }
                    Err(SendTimeoutError::Timeout(asset))
                    | Err(SendTimeoutError::Disconnected(asset)) => {
                        self.park(asset);
                        return;
                    }
                }
            }
        })
    }

    fn park(&self, asset: Arc<Asset>) {
        self.overflow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(asset);
    }

    /// Takes everything queued so far, channel entries first.
    ///
    /// At most one capacity's worth is taken from the channel, so writers that
    /// refill it concurrently cannot keep the drain going forever.
    pub(crate) fn drain(&self) -> Vec<Arc<Asset>> {
        let mut drained: Vec<Arc<Asset>> = self.rx.try_iter().take(self.capacity).collect();
        let parked = mem::take(&mut *self.overflow.lock().unwrap_or_else(PoisonError::into_inner));
        drained.extend(parked);
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len() + self.overflow.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for AssetQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
