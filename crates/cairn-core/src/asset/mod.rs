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

//! Provides the primitive vocabulary of Cairn's asset system.
//!
//! This module defines the "common language" for all asset-related operations.
//! It has no knowledge of how assets are loaded or stored; those concerns live
//! in the registry crate.
//!
//! The key components are:
//! - The [`AssetInfo`] trait: the immutable, hashable description of a load request.
//! - [`AssetId`]: the stable identifier minted once per distinct info value.
//! - [`Locality`], [`LoadPriority`] and [`AssetState`]: the small enums every
//!   layer of the pipeline agrees on.

mod id;
mod state;

pub use id::*;
pub use state::*;

use std::fmt::Debug;
use std::hash::Hash;

/// The immutable description of an asset to load, e.g. "texture at path X".
///
/// Two info values that compare equal describe the same logical asset and are
/// therefore mapped to the same [`AssetId`] (unless their kind is
/// [`Locality::SingleUsage`]).
///
/// The supertraits enforce the guarantees the registry relies on:
/// - `Eq` + `Hash`: the value is the deduplication key.
/// - `Clone`: the registry keeps its own copy next to the identifier.
/// - `Send` + `Sync` + `'static`: info values travel to worker threads.
///
/// Every type satisfying those bounds is an `AssetInfo`.
///
/// # Examples
///
/// ```
/// use cairn_core::asset::AssetInfo;
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct TextureInfo {
///     path: String,
///     mipmaps: bool,
/// }
///
/// fn assert_info<T: AssetInfo>() {}
/// assert_info::<TextureInfo>();
/// ```
pub trait AssetInfo: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> AssetInfo for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
