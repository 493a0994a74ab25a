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

//! The GFX contracts of the Prism renderer.
//!
//! This module defines what a graphics backend must provide: descriptor types, the
//! recorded command model, capability queries and the [`GraphicsDevice`] trait. Concrete
//! backends live in `prism-infra`; materials and the render pipeline only ever talk to
//! `dyn GraphicsDevice`.

pub mod api;
pub mod error;
pub mod traits;

pub use self::api::command::*;
pub use self::api::core::*;
pub use self::api::pipeline::*;
pub use self::api::resource::*;
pub use self::api::util::*;
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::traits::{GraphicsDevice, WindowTarget};
