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

//! The capability query surface of a device.
//!
//! Capabilities are negotiated once during `initialize` and never change afterwards.
//! Factories validate descriptors against them, and the program library derives shader
//! defines from them.

use crate::prism_bitflags;
use crate::renderer::api::util::{SampleCount, TextureFormat};

prism_bitflags! {
    /// Optional features a device may expose.
    pub struct DeviceFeatures: u32 {
        /// 32-bit float color attachments.
        const COLOR_FLOAT = 1 << 0;
        /// 16-bit float color attachments.
        const COLOR_HALF_FLOAT = 1 << 1;
        /// 32-bit float sampled textures.
        const TEXTURE_FLOAT = 1 << 2;
        /// 16-bit float sampled textures.
        const TEXTURE_HALF_FLOAT = 1 << 3;
        /// Linear filtering of 32-bit float textures.
        const TEXTURE_FLOAT_LINEAR = 1 << 4;
        /// Combined 24-bit depth and 8-bit stencil.
        const FORMAT_D24S8 = 1 << 5;
        /// ETC1 compressed textures.
        const FORMAT_ETC1 = 1 << 6;
        /// ETC2 compressed textures.
        const FORMAT_ETC2 = 1 << 7;
        /// ASTC compressed textures.
        const FORMAT_ASTC = 1 << 8;
        /// PVRTC compressed textures.
        const FORMAT_PVRTC = 1 << 9;
        /// BC (S3TC) compressed textures.
        const FORMAT_BC = 1 << 10;
        /// Multisampled render targets.
        const MSAA = 1 << 11;
        /// 32-bit index buffers.
        const ELEMENT_INDEX_UINT = 1 << 12;
        /// Instanced drawing.
        const INSTANCED_ARRAYS = 1 << 13;
        /// More than one color attachment per framebuffer.
        const MULTIPLE_RENDER_TARGETS = 1 << 14;
        /// Min/max blend operations.
        const BLEND_MINMAX = 1 << 15;
    }
}

/// Numeric limits of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum vertex attributes per input assembler.
    pub max_vertex_attributes: u32,
    /// Maximum vec4 uniforms available to the vertex stage.
    pub max_vertex_uniform_vectors: u32,
    /// Maximum vec4 uniforms available to the fragment stage.
    pub max_fragment_uniform_vectors: u32,
    /// Maximum sampled textures bound at once.
    pub max_texture_units: u32,
    /// Maximum sampled textures visible to the vertex stage.
    pub max_vertex_texture_units: u32,
    /// Maximum uniform buffer bindings.
    pub max_uniform_buffer_bindings: u32,
    /// Maximum size of one uniform block, in bytes.
    pub max_uniform_block_size: u32,
    /// Maximum width/height of a 2D texture.
    pub max_texture_size: u32,
    /// Maximum width/height of a cube map face.
    pub max_cube_map_texture_size: u32,
    /// Maximum color attachments per framebuffer.
    pub max_color_attachments: u32,
    /// Required alignment of dynamic uniform offsets.
    pub ubo_offset_alignment: u32,
}

impl Default for DeviceLimits {
    /// Conservative limits every backend is expected to meet.
    fn default() -> Self {
        Self {
            max_vertex_attributes: 16,
            max_vertex_uniform_vectors: 256,
            max_fragment_uniform_vectors: 224,
            max_texture_units: 16,
            max_vertex_texture_units: 16,
            max_uniform_buffer_bindings: 24,
            max_uniform_block_size: 16384,
            max_texture_size: 4096,
            max_cube_map_texture_size: 2048,
            max_color_attachments: 4,
            ubo_offset_alignment: 256,
        }
    }
}

/// Everything a device reports about itself after initialization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCaps {
    /// Optional features.
    pub features: DeviceFeatures,
    /// Numeric limits.
    pub limits: DeviceLimits,
    /// Minimum clip-space depth, `-1` for GL-style and `0` for zero-to-one backends.
    pub clip_space_min_z: f32,
    /// `1` when screen space y points up, `-1` otherwise.
    pub screen_space_sign_y: f32,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            features: DeviceFeatures::ELEMENT_INDEX_UINT | DeviceFeatures::INSTANCED_ARRAYS,
            limits: DeviceLimits::default(),
            clip_space_min_z: 0.0,
            screen_space_sign_y: 1.0,
        }
    }
}

impl DeviceCaps {
    /// Returns `true` if `format` can be used for textures on a device with these caps.
    pub fn supports_format(&self, format: TextureFormat) -> bool {
        use TextureFormat::*;
        let f = self.features;
        match format {
            Rgba16Float | R16Float => f.contains(DeviceFeatures::TEXTURE_HALF_FLOAT),
            Rgba32Float | R32Float => f.contains(DeviceFeatures::TEXTURE_FLOAT),
            Depth24PlusStencil8 => f.contains(DeviceFeatures::FORMAT_D24S8),
            Etc1Rgb8 => f.contains(DeviceFeatures::FORMAT_ETC1),
            Etc2Rgba8 => f.contains(DeviceFeatures::FORMAT_ETC2),
            Astc4x4 => f.contains(DeviceFeatures::FORMAT_ASTC),
            PvrtcRgba4 => f.contains(DeviceFeatures::FORMAT_PVRTC),
            Bc1Rgba | Bc3Rgba => f.contains(DeviceFeatures::FORMAT_BC),
            _ => true,
        }
    }

    /// Returns `true` if `format` can be rendered to.
    pub fn supports_attachment(&self, format: TextureFormat) -> bool {
        let info = format.info();
        if info.is_compressed {
            return false;
        }
        match format {
            TextureFormat::Rgba16Float | TextureFormat::R16Float => {
                self.features.contains(DeviceFeatures::COLOR_HALF_FLOAT)
            }
            TextureFormat::Rgba32Float | TextureFormat::R32Float => {
                self.features.contains(DeviceFeatures::COLOR_FLOAT)
            }
            _ => self.supports_format(format),
        }
    }

    /// Returns `true` if `samples` is usable for attachments.
    pub fn supports_samples(&self, samples: SampleCount) -> bool {
        samples == SampleCount::X1 || self.features.contains(DeviceFeatures::MSAA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_caps_reject_optional_formats() {
        let caps = DeviceCaps::default();
        assert!(caps.supports_format(TextureFormat::Rgba8Unorm));
        assert!(!caps.supports_format(TextureFormat::Astc4x4));
        assert!(!caps.supports_attachment(TextureFormat::Rgba16Float));
        assert!(!caps.supports_samples(SampleCount::X4));
    }

    #[test]
    fn compressed_formats_are_never_attachments() {
        let mut caps = DeviceCaps::default();
        caps.features.insert(DeviceFeatures::FORMAT_ETC2);
        assert!(caps.supports_format(TextureFormat::Etc2Rgba8));
        assert!(!caps.supports_attachment(TextureFormat::Etc2Rgba8));
    }
}
