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

//! Adapter profiles for the headless backend.

use prism_core::renderer::{
    DeviceCaps, DeviceFeatures, DeviceLimits, GraphicsAdapterInfo, GraphicsBackendType,
    RendererDeviceType,
};

/// What the headless device pretends to run on.
///
/// The profile decides which features and limits `initialize` reports, so the same test
/// can exercise both a desktop-class device and a constrained one.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessAdapter {
    /// Reported adapter name.
    pub name: String,
    /// Reported device type.
    pub device_type: RendererDeviceType,
    /// Capabilities established at initialization.
    pub caps: DeviceCaps,
    /// When `false`, no rendering context can be obtained and `initialize` fails.
    pub context_available: bool,
}

impl HeadlessAdapter {
    /// A desktop-class profile: float targets, BC compression, MSAA, MRT.
    pub fn desktop() -> Self {
        Self {
            name: "Headless Desktop".to_string(),
            device_type: RendererDeviceType::DiscreteGpu,
            caps: DeviceCaps {
                features: DeviceFeatures::COLOR_FLOAT
                    | DeviceFeatures::COLOR_HALF_FLOAT
                    | DeviceFeatures::TEXTURE_FLOAT
                    | DeviceFeatures::TEXTURE_HALF_FLOAT
                    | DeviceFeatures::TEXTURE_FLOAT_LINEAR
                    | DeviceFeatures::FORMAT_D24S8
                    | DeviceFeatures::FORMAT_BC
                    | DeviceFeatures::MSAA
                    | DeviceFeatures::ELEMENT_INDEX_UINT
                    | DeviceFeatures::INSTANCED_ARRAYS
                    | DeviceFeatures::MULTIPLE_RENDER_TARGETS
                    | DeviceFeatures::BLEND_MINMAX,
                limits: DeviceLimits {
                    max_texture_size: 8192,
                    max_cube_map_texture_size: 4096,
                    max_color_attachments: 8,
                    ..DeviceLimits::default()
                },
                clip_space_min_z: 0.0,
                screen_space_sign_y: 1.0,
            },
            context_available: true,
        }
    }

    /// A constrained mobile-class profile: no float textures, ETC/ASTC compression,
    /// eight texture units and 16-bit indices only.
    pub fn mobile() -> Self {
        Self {
            name: "Headless Mobile".to_string(),
            device_type: RendererDeviceType::IntegratedGpu,
            caps: DeviceCaps {
                features: DeviceFeatures::FORMAT_ETC1
                    | DeviceFeatures::FORMAT_ETC2
                    | DeviceFeatures::FORMAT_ASTC
                    | DeviceFeatures::FORMAT_D24S8,
                limits: DeviceLimits {
                    max_vertex_attributes: 8,
                    max_vertex_uniform_vectors: 128,
                    max_fragment_uniform_vectors: 64,
                    max_texture_units: 8,
                    max_vertex_texture_units: 0,
                    max_uniform_buffer_bindings: 12,
                    max_uniform_block_size: 4096,
                    max_texture_size: 2048,
                    max_cube_map_texture_size: 1024,
                    max_color_attachments: 1,
                    ubo_offset_alignment: 256,
                },
                clip_space_min_z: -1.0,
                screen_space_sign_y: 1.0,
            },
            context_available: true,
        }
    }

    /// A profile on which no context can be created.
    pub fn unavailable() -> Self {
        Self {
            name: "Headless (no context)".to_string(),
            context_available: false,
            ..Self::desktop()
        }
    }

    /// Adapter information reported by the device.
    pub fn info(&self) -> GraphicsAdapterInfo {
        GraphicsAdapterInfo {
            name: self.name.clone(),
            backend_type: GraphicsBackendType::Headless,
            device_type: self.device_type,
        }
    }
}

impl Default for HeadlessAdapter {
    fn default() -> Self {
        Self::desktop()
    }
}
