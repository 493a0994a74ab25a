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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::pipeline::{PipelineStateId, ShaderId};
use std::fmt;

/// An error related to the preprocessing or compilation of a shader program.
#[derive(Debug)]
pub enum ShaderError {
    /// No template is registered under the requested program name.
    UnknownProgram {
        /// The program name.
        name: String,
    },
    /// The preprocessor rejected the source.
    PreprocessFailed {
        /// The program name.
        name: String,
        /// What went wrong.
        details: String,
    },
    /// The backend failed to compile the source.
    CompilationError {
        /// A descriptive label for the shader.
        label: String,
        /// Detailed error messages from the shader compiler.
        details: String,
    },
    /// The requested shader could not be found.
    NotFound {
        /// The id of the missing shader.
        id: ShaderId,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::UnknownProgram { name } => {
                write!(f, "No shader template registered for program '{name}'")
            }
            ShaderError::PreprocessFailed { name, details } => {
                write!(f, "Preprocessing failed for program '{name}': {details}")
            }
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader compilation failed for '{label}': {details}")
            }
            ShaderError::NotFound { id } => {
                write!(f, "Shader not found for ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation of a pipeline state object.
#[derive(Debug)]
pub enum PipelineError {
    /// The shader referenced by the pipeline state is invalid or missing.
    InvalidShader {
        /// The id of the shader.
        id: ShaderId,
    },
    /// The specified pipeline state id is not valid.
    InvalidPipelineState {
        /// The id of the pipeline state.
        id: PipelineStateId,
    },
    /// The vertex layout does not provide an attribute the shader reads.
    MissingVertexAttribute(String),
    /// The render pass referenced by the pipeline state does not exist.
    IncompatibleRenderPass(String),
    /// The backend failed to build the pipeline.
    CompilationFailed {
        /// A descriptive label for the pipeline, if available.
        label: Option<String>,
        /// Detailed error messages from the backend.
        details: String,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidShader { id } => {
                write!(f, "Invalid shader {id:?} for pipeline state")
            }
            PipelineError::InvalidPipelineState { id } => {
                write!(f, "Invalid pipeline state ID: {id:?}")
            }
            PipelineError::MissingVertexAttribute(name) => {
                write!(f, "Vertex layout is missing attribute '{name}'")
            }
            PipelineError::IncompatibleRenderPass(msg) => {
                write!(f, "Incompatible render pass: {msg}")
            }
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// The descriptor is malformed (zero size, mismatched counts, ...).
    InvalidDescriptor(String),
    /// The device does not support the requested format or feature.
    Unsupported(String),
    /// The descriptor exceeds a device limit.
    LimitExceeded {
        /// The limit name.
        limit: &'static str,
        /// The requested value.
        requested: u64,
        /// The device maximum.
        max: u64,
    },
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a resource out of its bounds.
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::InvalidDescriptor(msg) => {
                write!(f, "Invalid resource descriptor: {msg}")
            }
            ResourceError::Unsupported(msg) => write!(f, "Unsupported by device: {msg}"),
            ResourceError::LimitExceeded {
                limit,
                requested,
                max,
            } => write!(
                f,
                "Device limit '{limit}' exceeded: requested {requested}, max {max}"
            ),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => {
                write!(f, "Resource access out of bounds.")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error that can occur within the graphics device or render pipeline.
#[derive(Debug)]
pub enum RenderError {
    /// An operation was attempted before the device was initialized.
    NotInitialized,
    /// No rendering context could be obtained.
    InitializationFailed(String),
    /// A critical rendering operation failed.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The graphics device was lost.
    DeviceLost,
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NotInitialized => {
                write!(f, "The graphics device is not initialized.")
            }
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize graphics backend: {msg}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::DeviceLost => write!(
                f,
                "The graphics device was lost and needs to be reinitialized."
            ),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<ShaderError> for RenderError {
    fn from(err: ShaderError) -> Self {
        RenderError::ResourceError(err.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::UnknownProgram {
            name: "unlit".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "No shader template registered for program 'unlit'"
        );

        let err_comp = ShaderError::CompilationError {
            label: "unlit|USE_TEXTURE=1".to_string(),
            details: "Syntax error at line 5".to_string(),
        };
        assert_eq!(
            format!("{err_comp}"),
            "Shader compilation failed for 'unlit|USE_TEXTURE=1': Syntax error at line 5"
        );
    }

    #[test]
    fn limit_exceeded_display() {
        let err = ResourceError::LimitExceeded {
            limit: "max_texture_size",
            requested: 8192,
            max: 4096,
        };
        assert_eq!(
            format!("{err}"),
            "Device limit 'max_texture_size' exceeded: requested 8192, max 4096"
        );
    }

    #[test]
    fn render_error_display_wrapping_resource_error() {
        let res_err: ResourceError = ShaderError::NotFound { id: ShaderId(101) }.into();
        let render_err: RenderError = res_err.into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Shader resource error: Shader not found for ID: ShaderId(101)"
        );
        assert!(render_err.source().is_some());
        assert!(render_err.source().and_then(|e| e.source()).is_some());
    }
}
