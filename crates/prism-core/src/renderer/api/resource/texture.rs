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

//! Texture, texture view and sampler descriptors, plus the transfer region types.

use crate::math::{Extent3D, Origin3D};
use crate::renderer::api::util::{
    AddressMode, CompareFunction, Filter, SampleCount, TextureFormat, TextureUsage,
};

/// An opaque handle to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// An opaque handle to a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub usize);

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// A 2D texture.
    #[default]
    Tex2D,
    /// A cube map with six faces stored as array layers.
    Cube,
    /// An array of 2D textures.
    Tex2DArray,
    /// A 3D texture.
    Tex3D,
}

/// Describes a texture to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    /// A debug label.
    pub label: Option<String>,
    /// Dimensionality.
    pub ty: TextureType,
    /// Allowed usages.
    pub usage: TextureUsage,
    /// Texel format.
    pub format: TextureFormat,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth for 3D textures, layer count otherwise (6 for cube maps).
    pub depth_or_layers: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Samples per texel.
    pub samples: SampleCount,
}

impl TextureInfo {
    /// A single-level sampled 2D texture.
    pub fn sampled_2d(label: &str, format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            label: Some(label.to_string()),
            ty: TextureType::Tex2D,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            format,
            width,
            height,
            depth_or_layers: 1,
            mip_levels: 1,
            samples: SampleCount::X1,
        }
    }

    /// A 2D render target.
    pub fn attachment(label: &str, format: TextureFormat, width: u32, height: u32) -> Self {
        let usage = if format.is_depth_stencil() {
            TextureUsage::DEPTH_STENCIL_ATTACHMENT
        } else {
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED | TextureUsage::TRANSFER_SRC
        };
        Self {
            label: Some(label.to_string()),
            ty: TextureType::Tex2D,
            usage,
            format,
            width,
            height,
            depth_or_layers: 1,
            mip_levels: 1,
            samples: SampleCount::X1,
        }
    }

    /// Number of array layers (1 for 3D textures).
    pub fn layer_count(&self) -> u32 {
        match self.ty {
            TextureType::Tex3D => 1,
            _ => self.depth_or_layers.max(1),
        }
    }

    /// Size of mip `level` along each axis, never below one texel.
    pub fn mip_extent(&self, level: u32) -> Extent3D {
        let depth = match self.ty {
            TextureType::Tex3D => (self.depth_or_layers >> level).max(1),
            _ => 1,
        };
        Extent3D {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth_or_array_layers: depth,
        }
    }
}

/// Describes a view onto a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureViewInfo {
    /// The viewed texture.
    pub texture: TextureId,
    /// How the view is interpreted.
    pub ty: TextureType,
    /// View format; must match the texture format.
    pub format: TextureFormat,
    /// First visible mip level.
    pub base_level: u32,
    /// Number of visible mip levels.
    pub level_count: u32,
    /// First visible array layer.
    pub base_layer: u32,
    /// Number of visible array layers.
    pub layer_count: u32,
}

impl TextureViewInfo {
    /// A view covering every level and layer of a texture.
    pub fn whole(texture: TextureId, info: &TextureInfo) -> Self {
        Self {
            texture,
            ty: info.ty,
            format: info.format,
            base_level: 0,
            level_count: info.mip_levels,
            base_layer: 0,
            layer_count: info.layer_count(),
        }
    }
}

/// Describes a sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerInfo {
    /// Minification filter.
    pub min_filter: Filter,
    /// Magnification filter.
    pub mag_filter: Filter,
    /// Mip filter. `Filter::None` disables mipmapping.
    pub mip_filter: Filter,
    /// U addressing.
    pub address_u: AddressMode,
    /// V addressing.
    pub address_v: AddressMode,
    /// W addressing.
    pub address_w: AddressMode,
    /// Maximum anisotropy, 1 disables it.
    pub max_anisotropy: u16,
    /// Comparison function for shadow samplers.
    pub compare: Option<CompareFunction>,
    /// Minimum LOD.
    pub min_lod: f32,
    /// Maximum LOD.
    pub max_lod: f32,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::None,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            max_anisotropy: 1,
            compare: None,
            min_lod: 0.0,
            max_lod: 1000.0,
        }
    }
}

/// The mip level and array layers touched by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSubresource {
    /// Mip level.
    pub mip_level: u32,
    /// First array layer.
    pub base_array_layer: u32,
    /// Number of array layers.
    pub layer_count: u32,
}

impl Default for TextureSubresource {
    fn default() -> Self {
        Self {
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

/// One region of a buffer ↔ texture transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferTextureCopy {
    /// Byte offset into the buffer.
    pub buffer_offset: u64,
    /// Row length in texels, 0 for tightly packed rows.
    pub buffer_stride: u32,
    /// Image height in rows, 0 for tightly packed images.
    pub buffer_image_height: u32,
    /// Texel offset into the texture.
    pub texture_offset: Origin3D,
    /// Extent of the region.
    pub texture_extent: Extent3D,
    /// Mip level and layers.
    pub texture_subresource: TextureSubresource,
}

/// A decoded RGBA8 image used by `copy_tex_images_to_texture`.
#[derive(Debug, Clone, Copy)]
pub struct TexImage<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 pixels.
    pub pixels: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_extent_never_drops_below_one() {
        let info = TextureInfo::sampled_2d("t", TextureFormat::Rgba8Unorm, 8, 2);
        assert_eq!(info.mip_extent(2), Extent3D::new_2d(2, 1));
        assert_eq!(info.mip_extent(5), Extent3D::new_2d(1, 1));
    }

    #[test]
    fn depth_attachments_are_not_sampled() {
        let info = TextureInfo::attachment("d", TextureFormat::Depth24Plus, 4, 4);
        assert!(info.usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT));
        assert!(!info.usage.contains(TextureUsage::SAMPLED));
    }
}
