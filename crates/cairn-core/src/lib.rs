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

//! # Cairn Core
//!
//! Foundational crate containing the types and contracts shared by every part
//! of the asset pipeline: identifiers, localities, load priorities, the asset
//! state vocabulary, the error taxonomy, registry configuration and the
//! byte-stream provider used by load steps.
//!
//! Nothing in this crate spawns threads or owns assets; the runtime lives in
//! `cairn-assets`.

#![warn(missing_docs)]

pub mod asset;
pub mod config;
pub mod error;
pub mod vfs;

pub use asset::{AssetId, AssetInfo, AssetState, LoadPriority, Locality};
pub use config::RegistryConfig;
pub use error::{AssetError, Result};
pub use vfs::{FileSystemProvider, MemoryProvider, NullProvider, ResourceProvider};
