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

//! # Cairn Assets
//!
//! The asset registry runtime: deduplicated, reference-counted assets loaded
//! on a background worker pool and handed back to a single owning thread.
//!
//! - [`IdentityRegistry`] maps info values to stable identifiers.
//! - [`Registry`] owns the assets of one scope and runs their loads.
//! - [`AssetHandle`] is an owned reference to one asset.
//! - [`HandleScope`] batches and coalesces disposals for a unit of work.
//! - [`AssetRouter`] splits loads between a global and a local registry.

#![warn(missing_docs)]

mod asset;
mod context;
mod handle;
mod identity;
mod kind;
mod registry;
mod router;
mod scope;
mod worker;

pub use context::LoadContext;
pub use handle::{AssetHandle, UntypedHandle};
pub use identity::IdentityRegistry;
pub use kind::{AssetKind, LoadStep};
pub use registry::{AssetStats, Registry, StateSummary};
pub use router::AssetRouter;
pub use scope::{HandleScope, LoadAssets, ScopedHandle};
pub use worker::{CancelSignal, WorkerPool};
