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

//! # Prism Infra
//!
//! Concrete implementations of the [`prism_core::renderer::GraphicsDevice`] contract.
//!
//! - [`graphics::headless`]: a CPU-side reference backend. It validates every descriptor
//!   against a configurable adapter profile, stores texel data in memory and replays
//!   recorded command buffers, which makes it the backend of choice for tests, benches
//!   and offscreen tools.
//! - `graphics::wgpu` (cargo feature `wgpu`): replays recorded command buffers onto `wgpu`.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::headless::{HeadlessAdapter, HeadlessDevice};
#[cfg(feature = "wgpu")]
pub use graphics::wgpu::WgpuDevice;
