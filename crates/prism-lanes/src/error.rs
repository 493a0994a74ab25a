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

//! Errors raised while building or running the render pipeline.

use prism_core::renderer::{RenderError, ResourceError};
use prism_data::MaterialError;
use thiserror::Error;

/// An error raised by a stage, a flow or the pipeline.
#[derive(Error, Debug)]
pub enum StageError {
    /// The device exposes no main window to render into.
    #[error("The device has no main window render pass")]
    MissingWindow,
    /// `render` was called before `initialize` or after `destroy`.
    #[error("'{0}' is not ready")]
    NotReady(String),
    /// The material system has no builtin resources.
    #[error("Builtin resources are not registered")]
    MissingBuiltins,
    /// A GPU resource could not be created or updated.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
    /// The device failed to submit or present.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    /// A material could not be built or locked.
    #[error("Material error: {0}")]
    Material(#[from] MaterialError),
}
