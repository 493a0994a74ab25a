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

//! Configuration handed to `GraphicsDevice::initialize`.

use crate::platform::PrismWindowHandle;
use crate::renderer::api::util::TextureFormat;
use std::fmt;

/// Device initialization parameters.
#[derive(Clone)]
pub struct DeviceInfo {
    /// Native window to bind the main surface to. Offscreen backends ignore it.
    pub window: Option<PrismWindowHandle>,
    /// Initial width of the main window in pixels.
    pub width: u32,
    /// Initial height of the main window in pixels.
    pub height: u32,
    /// Preferred color format of the main window.
    pub color_format: TextureFormat,
    /// Depth/stencil format of the main window.
    pub depth_stencil_format: TextureFormat,
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
    /// Enable backend validation where available.
    pub debug: bool,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            window: None,
            width: 1280,
            height: 720,
            color_format: TextureFormat::Rgba8Unorm,
            depth_stencil_format: TextureFormat::Depth24PlusStencil8,
            vsync: true,
            debug: false,
        }
    }
}

impl fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("window", &self.window.is_some())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("color_format", &self.color_format)
            .field("depth_stencil_format", &self.depth_stencil_format)
            .field("vsync", &self.vsync)
            .field("debug", &self.debug)
            .finish()
    }
}
