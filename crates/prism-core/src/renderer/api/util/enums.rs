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

//! Generic rendering enums.

use serde::{Deserialize, Serialize};

/// Specifies the data type of indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFormat {
    /// Indices are 16-bit unsigned integers.
    #[default]
    Uint16,
    /// Indices are 32-bit unsigned integers.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size(&self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// The number of samples per pixel for multisample anti-aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleCount {
    /// 1 sample per pixel (MSAA disabled).
    #[default]
    X1,
    /// 2 samples per pixel.
    X2,
    /// 4 samples per pixel.
    X4,
    /// 8 samples per pixel.
    X8,
}

impl SampleCount {
    /// The sample count as an integer.
    pub const fn count(&self) -> u32 {
        match self {
            SampleCount::X1 => 1,
            SampleCount::X2 => 2,
            SampleCount::X4 => 4,
            SampleCount::X8 => 8,
        }
    }
}

/// Block layout of a [`TextureFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Bytes per block (per texel for uncompressed formats).
    pub block_size: u32,
    /// Block width in texels.
    pub block_width: u32,
    /// Block height in texels.
    pub block_height: u32,
    /// The format carries a depth aspect.
    pub has_depth: bool,
    /// The format carries a stencil aspect.
    pub has_stencil: bool,
    /// The format stores floating point texels.
    pub is_float: bool,
    /// The format is block compressed.
    pub is_compressed: bool,
}

impl FormatInfo {
    const fn color(block_size: u32) -> Self {
        Self {
            block_size,
            block_width: 1,
            block_height: 1,
            has_depth: false,
            has_stencil: false,
            is_float: false,
            is_compressed: false,
        }
    }

    const fn float(block_size: u32) -> Self {
        let mut info = Self::color(block_size);
        info.is_float = true;
        info
    }

    const fn depth(block_size: u32, has_stencil: bool) -> Self {
        let mut info = Self::color(block_size);
        info.has_depth = true;
        info.has_stencil = has_stencil;
        info
    }

    const fn compressed(block_size: u32, block_width: u32, block_height: u32) -> Self {
        Self {
            block_size,
            block_width,
            block_height,
            has_depth: false,
            has_stencil: false,
            is_float: false,
            is_compressed: true,
        }
    }
}

/// Defines the memory format of texels in a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    /// One 8-bit unsigned normalized component.
    R8Unorm,
    /// Two 8-bit unsigned normalized components.
    Rg8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA).
    Rgba8Unorm,
    /// RGBA8 in the sRGB color space.
    Rgba8UnormSrgb,
    /// BGRA8, the usual swapchain format.
    Bgra8Unorm,
    /// BGRA8 in the sRGB color space.
    Bgra8UnormSrgb,
    /// One 16-bit float component.
    R16Float,
    /// Four 16-bit float components, the usual HDR target.
    Rgba16Float,
    /// One 32-bit float component.
    R32Float,
    /// Four 32-bit float components.
    Rgba32Float,
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth.
    Depth24Plus,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit float depth.
    Depth32Float,
    /// ETC1 RGB, 4x4 blocks.
    Etc1Rgb8,
    /// ETC2 RGBA, 4x4 blocks.
    Etc2Rgba8,
    /// ASTC 4x4 blocks.
    Astc4x4,
    /// PVRTC 4 bits per pixel RGBA.
    PvrtcRgba4,
    /// BC1 (DXT1), 4x4 blocks.
    Bc1Rgba,
    /// BC3 (DXT5), 4x4 blocks.
    Bc3Rgba,
}

impl TextureFormat {
    /// Returns the block layout of the format.
    pub const fn info(&self) -> FormatInfo {
        match self {
            TextureFormat::R8Unorm => FormatInfo::color(1),
            TextureFormat::Rg8Unorm => FormatInfo::color(2),
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb => FormatInfo::color(4),
            TextureFormat::R16Float => FormatInfo::float(2),
            TextureFormat::Rgba16Float => FormatInfo::float(8),
            TextureFormat::R32Float => FormatInfo::float(4),
            TextureFormat::Rgba32Float => FormatInfo::float(16),
            TextureFormat::Depth16Unorm => FormatInfo::depth(2, false),
            TextureFormat::Depth24Plus => FormatInfo::depth(4, false),
            TextureFormat::Depth24PlusStencil8 => FormatInfo::depth(4, true),
            TextureFormat::Depth32Float => FormatInfo::depth(4, false),
            TextureFormat::Etc1Rgb8 | TextureFormat::Bc1Rgba => FormatInfo::compressed(8, 4, 4),
            TextureFormat::Etc2Rgba8 | TextureFormat::Astc4x4 | TextureFormat::Bc3Rgba => {
                FormatInfo::compressed(16, 4, 4)
            }
            TextureFormat::PvrtcRgba4 => FormatInfo::compressed(8, 4, 4),
        }
    }

    /// Returns `true` for depth and depth-stencil formats.
    pub const fn is_depth_stencil(&self) -> bool {
        self.info().has_depth
    }

    /// Number of bytes of one tightly packed row of `width` texels.
    pub const fn row_size(&self, width: u32) -> u32 {
        let info = self.info();
        width.div_ceil(info.block_width) * info.block_size
    }

    /// Number of bytes of a tightly packed `width` x `height` image.
    pub const fn surface_size(&self, width: u32, height: u32) -> u32 {
        let info = self.info();
        self.row_size(width) * height.div_ceil(info.block_height)
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// No filtering (only meaningful for mip filters).
    None,
    /// Nearest texel.
    Point,
    /// Bilinear.
    #[default]
    Linear,
}

/// Texture coordinate addressing outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    /// Repeat the texture.
    #[default]
    Wrap,
    /// Repeat the texture, mirrored.
    Mirror,
    /// Clamp to the edge texel.
    Clamp,
    /// Use the border color.
    Border,
}

/// A comparison function for depth, stencil and sampler comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if new < old.
    #[default]
    Less,
    /// Passes if new == old.
    Equal,
    /// Passes if new <= old.
    LessEqual,
    /// Passes if new > old.
    Greater,
    /// Passes if new != old.
    NotEqual,
    /// Passes if new >= old.
    GreaterEqual,
    /// Always passes.
    Always,
}

/// A backend-agnostic representation of a graphics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GraphicsBackendType {
    /// The CPU-side reference backend.
    Headless,
    /// Vulkan API.
    Vulkan,
    /// Apple's Metal API.
    Metal,
    /// Microsoft's DirectX 12 API.
    Dx12,
    /// OpenGL or OpenGL ES.
    OpenGL,
    /// WebGPU in a browser.
    WebGpu,
    /// An unknown backend.
    #[default]
    Unknown,
}

/// The physical type of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RendererDeviceType {
    /// A GPU integrated into the CPU.
    IntegratedGpu,
    /// A discrete, dedicated GPU.
    DiscreteGpu,
    /// A virtualized GPU.
    VirtualGpu,
    /// A software renderer running on the CPU.
    Cpu,
    /// Unknown.
    #[default]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_size_accounts_for_blocks() {
        assert_eq!(TextureFormat::Rgba8Unorm.surface_size(2, 2), 16);
        assert_eq!(TextureFormat::Rgba16Float.row_size(3), 24);
        // A 5x5 ETC2 image covers 2x2 blocks of 16 bytes.
        assert_eq!(TextureFormat::Etc2Rgba8.surface_size(5, 5), 64);
    }

    #[test]
    fn depth_formats_are_flagged() {
        assert!(TextureFormat::Depth24PlusStencil8.is_depth_stencil());
        assert!(TextureFormat::Depth24PlusStencil8.info().has_stencil);
        assert!(!TextureFormat::Rgba8Unorm.is_depth_stencil());
    }
}
