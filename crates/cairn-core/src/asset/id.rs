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

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An opaque, process-unique identifier for a logical asset.
///
/// Identifiers are minted by the identity registry the first time an info
/// value is seen and are never reused. The nil UUID is reserved for
/// [`AssetId::INVALID`], the identifier carried by invalid handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(Uuid);

impl AssetId {
    /// The identifier of the canonical invalid handle.
    pub const INVALID: AssetId = AssetId(Uuid::nil());

    /// Creates a new, random (version 4) `AssetId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns `true` if this is [`AssetId::INVALID`].
    pub fn is_invalid(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AssetId {
    /// Creates a new, random (version 4) `AssetId`.
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_unique_and_valid() {
        let a = AssetId::new();
        let b = AssetId::new();
        assert_ne!(a, b);
        assert!(!a.is_invalid());
    }

    #[test]
    fn invalid_id_is_nil() {
        assert!(AssetId::INVALID.is_invalid());
        assert_eq!(
            AssetId::INVALID.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
