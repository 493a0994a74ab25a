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

//! Parsed asset data consumed by the renderer.
//!
//! Loading is not the renderer's concern: assets arrive here already deserialized
//! (`serde`) and are shared behind `Arc`.

mod effect;

pub use effect::*;

/// A marker trait for types that can be shared as loaded assets.
///
/// `Send + Sync + 'static` lets a loaded asset be handed to the renderer from any thread.
///
/// # Examples
///
/// ```
/// use prism_core::asset::Asset;
///
/// struct Mesh;
/// impl Asset for Mesh {}
/// ```
pub trait Asset: Send + Sync + 'static {}
