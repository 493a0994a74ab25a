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

//! Errors of the material system.

use std::fmt;

use prism_core::renderer::{ResourceError, ShaderError};

/// An error raised while building materials, passes or builtin resources.
#[derive(Debug)]
pub enum MaterialError {
    /// No effect is registered under the requested name.
    EffectNotFound(String),
    /// The technique index does not exist in the effect.
    TechniqueOutOfRange {
        /// The effect name.
        effect: String,
        /// The requested technique.
        index: usize,
        /// Number of techniques in the effect.
        count: usize,
    },
    /// A GPU resource could not be created or updated.
    Resource(ResourceError),
    /// A builtin asset is malformed.
    InvalidBuiltin(String),
    /// A shared lock was poisoned by a panicking thread.
    Poisoned(String),
}

impl fmt::Display for MaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialError::EffectNotFound(name) => write!(f, "Effect '{name}' is not registered"),
            MaterialError::TechniqueOutOfRange {
                effect,
                index,
                count,
            } => write!(
                f,
                "Technique {index} out of range for effect '{effect}' ({count} techniques)"
            ),
            MaterialError::Resource(err) => write!(f, "Material resource error: {err}"),
            MaterialError::InvalidBuiltin(msg) => write!(f, "Invalid builtin asset: {msg}"),
            MaterialError::Poisoned(what) => write!(f, "Failed to lock {what}: poisoned"),
        }
    }
}

impl std::error::Error for MaterialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaterialError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for MaterialError {
    fn from(err: ResourceError) -> Self {
        MaterialError::Resource(err)
    }
}

impl From<ShaderError> for MaterialError {
    fn from(err: ShaderError) -> Self {
        MaterialError::Resource(err.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_errors_keep_their_chain() {
        let err: MaterialError = ShaderError::UnknownProgram {
            name: "unlit".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Material resource error: Shader resource error: No shader template registered for program 'unlit'"
        );
        assert!(err.source().and_then(|e| e.source()).is_some());
    }
}
