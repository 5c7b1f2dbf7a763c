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

//! Defines the error taxonomy of the asset pipeline.
//!
//! Load failures are recovered at the asset boundary and re-raised only to
//! callers reading the failed asset. Thread and locality violations indicate a
//! broken caller and are reported, never downgraded.

use crate::asset::AssetId;
use std::sync::Arc;

/// A specialized `Result` type for asset operations.
pub type Result<T, E = AssetError> = std::result::Result<T, E>;

/// An error raised by the identity registry, an asset registry or a handle.
///
/// The type is `Clone` so that a captured load failure can be handed to every
/// reader of the failed asset with the same root cause.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssetError {
    /// An asset kind was used before being registered.
    #[error("asset kind `{kind}` is not registered")]
    NotRegistered {
        /// The type name of the kind.
        kind: &'static str,
    },

    /// An asset kind was registered twice.
    #[error("asset kind `{kind}` is already registered")]
    AlreadyRegistered {
        /// The type name of the kind.
        kind: &'static str,
    },

    /// No live asset exists for the identifier.
    #[error("no live asset with identifier {0}")]
    UnknownIdentifier(AssetId),

    /// A load or disposal crossed registry scopes in a forbidden direction.
    #[error("wrong locality use: {0}")]
    WrongLocalityUse(String),

    /// The kind's load step failed. The cause is shared between all readers.
    #[error("failed to load {description}: {cause:#}")]
    LoadFailure {
        /// The human-readable description of the failed asset.
        description: String,
        /// The root cause reported by the load step.
        cause: Arc<anyhow::Error>,
    },

    /// The asset or handle was used after it was disposed.
    #[error("asset {0} was used after being disposed")]
    UseAfterDispose(AssetId),

    /// An owning-thread-only operation ran on another thread.
    #[error("`{operation}` must be called from the registry's owning thread")]
    ThreadViolation {
        /// The name of the offending operation.
        operation: &'static str,
    },

    /// The load was aborted because its registry was torn down.
    #[error("loading asset {0} was cancelled")]
    Cancelled(AssetId),

    /// The asset exists but has not finished loading.
    #[error("asset {0} is not loaded yet")]
    NotReady(AssetId),

    /// A typed handle was narrowed to a value type the asset does not hold.
    #[error("asset {id} does not hold a value of type `{expected}`")]
    WrongValueType {
        /// The identifier of the asset.
        id: AssetId,
        /// The type name the caller asked for.
        expected: &'static str,
    },

    /// Registry configuration text could not be parsed.
    #[error("invalid registry configuration: {0}")]
    InvalidConfig(String),
}

impl AssetError {
    /// Wraps a load step failure for the asset described by `description`.
    pub fn load_failure(description: impl Into<String>, cause: anyhow::Error) -> Self {
        AssetError::LoadFailure {
            description: description.into(),
            cause: Arc::new(cause),
        }
    }

    /// Returns the shared root cause of a [`AssetError::LoadFailure`].
    pub fn cause(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            AssetError::LoadFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Returns `true` for errors that signal a programming mistake in the
    /// caller rather than an expected runtime condition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            AssetError::ThreadViolation { .. }
                | AssetError::WrongLocalityUse(_)
                | AssetError::NotRegistered { .. }
                | AssetError::AlreadyRegistered { .. }
        )
    }
}
