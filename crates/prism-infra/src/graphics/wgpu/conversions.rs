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

//! Translation of Prism descriptors into their wgpu counterparts.

use prism_core::math::{Extent3D, LinearRgba, Origin3D};
use prism_core::renderer::{
    AddressMode, BlendFactor, BlendOp, BlendState, BufferUsage, ColorWrites, CompareFunction,
    CullMode, DepthStencilState, Filter, IndexFormat, PolygonMode, PrimitiveMode, SampleCount,
    StencilFace, StencilOp, TextureFormat, TextureType, TextureUsage, VertexFormat,
};

/// Converts engine types into wgpu types.
///
/// A local trait keeps the `.into_wgpu()` syntax without running into the orphan rules.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it.
    fn into_wgpu(self) -> T;
}

// --- Dimensions ---

impl IntoWgpu<wgpu::Extent3d> for Extent3D {
    fn into_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth_or_array_layers,
        }
    }
}

impl IntoWgpu<wgpu::Origin3d> for Origin3D {
    fn into_wgpu(self) -> wgpu::Origin3d {
        wgpu::Origin3d {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }
}

impl IntoWgpu<wgpu::Color> for LinearRgba {
    fn into_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: f64::from(self.r),
            g: f64::from(self.g),
            b: f64::from(self.b),
            a: f64::from(self.a),
        }
    }
}

// --- Textures and samplers ---

/// The wgpu format of `format`, `None` for formats wgpu cannot express (PVRTC).
pub fn texture_format(format: TextureFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::{AstcBlock, AstcChannel};
    Some(match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        // ETC2 decoders accept ETC1 data unchanged.
        TextureFormat::Etc1Rgb8 => wgpu::TextureFormat::Etc2Rgb8Unorm,
        TextureFormat::Etc2Rgba8 => wgpu::TextureFormat::Etc2Rgba8Unorm,
        TextureFormat::Astc4x4 => wgpu::TextureFormat::Astc {
            block: AstcBlock::B4x4,
            channel: AstcChannel::Unorm,
        },
        TextureFormat::Bc1Rgba => wgpu::TextureFormat::Bc1RgbaUnorm,
        TextureFormat::Bc3Rgba => wgpu::TextureFormat::Bc3RgbaUnorm,
        TextureFormat::PvrtcRgba4 => return None,
    })
}

/// The engine format of a surface format, if the engine knows it.
pub fn surface_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    Some(match format {
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
        _ => return None,
    })
}

impl IntoWgpu<wgpu::TextureDimension> for TextureType {
    fn into_wgpu(self) -> wgpu::TextureDimension {
        match self {
            TextureType::Tex3D => wgpu::TextureDimension::D3,
            TextureType::Tex2D | TextureType::Cube | TextureType::Tex2DArray => {
                wgpu::TextureDimension::D2
            }
        }
    }
}

impl IntoWgpu<wgpu::TextureViewDimension> for TextureType {
    fn into_wgpu(self) -> wgpu::TextureViewDimension {
        match self {
            TextureType::Tex2D => wgpu::TextureViewDimension::D2,
            TextureType::Cube => wgpu::TextureViewDimension::Cube,
            TextureType::Tex2DArray => wgpu::TextureViewDimension::D2Array,
            TextureType::Tex3D => wgpu::TextureViewDimension::D3,
        }
    }
}

impl IntoWgpu<wgpu::TextureUsages> for TextureUsage {
    fn into_wgpu(self) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::empty();
        if self.contains(TextureUsage::TRANSFER_SRC) {
            usages |= wgpu::TextureUsages::COPY_SRC;
        }
        if self.contains(TextureUsage::TRANSFER_DST) {
            usages |= wgpu::TextureUsages::COPY_DST;
        }
        if self.contains(TextureUsage::SAMPLED) {
            usages |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.intersects(TextureUsage::COLOR_ATTACHMENT | TextureUsage::DEPTH_STENCIL_ATTACHMENT)
        {
            usages |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        usages
    }
}

impl IntoWgpu<wgpu::BufferUsages> for BufferUsage {
    fn into_wgpu(self) -> wgpu::BufferUsages {
        let mut usages = wgpu::BufferUsages::COPY_DST;
        if self.contains(BufferUsage::TRANSFER_SRC) {
            usages |= wgpu::BufferUsages::COPY_SRC;
        }
        if self.contains(BufferUsage::INDEX) {
            usages |= wgpu::BufferUsages::INDEX;
        }
        if self.contains(BufferUsage::VERTEX) {
            usages |= wgpu::BufferUsages::VERTEX;
        }
        if self.contains(BufferUsage::UNIFORM) {
            usages |= wgpu::BufferUsages::UNIFORM;
        }
        if self.contains(BufferUsage::INDIRECT) {
            usages |= wgpu::BufferUsages::INDIRECT;
        }
        usages
    }
}

impl IntoWgpu<u32> for SampleCount {
    fn into_wgpu(self) -> u32 {
        self.count()
    }
}

impl IntoWgpu<wgpu::FilterMode> for Filter {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            Filter::Linear => wgpu::FilterMode::Linear,
            Filter::None | Filter::Point => wgpu::FilterMode::Nearest,
        }
    }
}

impl IntoWgpu<wgpu::MipmapFilterMode> for Filter {
    fn into_wgpu(self) -> wgpu::MipmapFilterMode {
        match self {
            Filter::Linear => wgpu::MipmapFilterMode::Linear,
            Filter::None | Filter::Point => wgpu::MipmapFilterMode::Nearest,
        }
    }
}

impl IntoWgpu<wgpu::AddressMode> for AddressMode {
    fn into_wgpu(self) -> wgpu::AddressMode {
        match self {
            AddressMode::Wrap => wgpu::AddressMode::Repeat,
            AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
            AddressMode::Border => wgpu::AddressMode::ClampToBorder,
        }
    }
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunction {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

// --- Pipeline state ---

impl IntoWgpu<wgpu::PrimitiveTopology> for PrimitiveMode {
    fn into_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            PrimitiveMode::PointList => wgpu::PrimitiveTopology::PointList,
            PrimitiveMode::LineList => wgpu::PrimitiveTopology::LineList,
            PrimitiveMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            PrimitiveMode::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

impl IntoWgpu<Option<wgpu::Face>> for CullMode {
    fn into_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }
}

impl IntoWgpu<wgpu::PolygonMode> for PolygonMode {
    fn into_wgpu(self) -> wgpu::PolygonMode {
        match self {
            PolygonMode::Fill => wgpu::PolygonMode::Fill,
            PolygonMode::Line => wgpu::PolygonMode::Line,
            PolygonMode::Point => wgpu::PolygonMode::Point,
        }
    }
}

impl IntoWgpu<wgpu::StencilOperation> for StencilOp {
    fn into_wgpu(self) -> wgpu::StencilOperation {
        match self {
            StencilOp::Keep => wgpu::StencilOperation::Keep,
            StencilOp::Zero => wgpu::StencilOperation::Zero,
            StencilOp::Replace => wgpu::StencilOperation::Replace,
            StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
            StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
            StencilOp::Invert => wgpu::StencilOperation::Invert,
            StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
            StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
        }
    }
}

impl IntoWgpu<wgpu::StencilFaceState> for StencilFace {
    fn into_wgpu(self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.compare.into_wgpu(),
            fail_op: self.fail_op.into_wgpu(),
            depth_fail_op: self.depth_fail_op.into_wgpu(),
            pass_op: self.pass_op.into_wgpu(),
        }
    }
}

/// The depth/stencil state of a pipeline rendering into `format`.
pub fn depth_stencil_state(
    state: &DepthStencilState,
    format: wgpu::TextureFormat,
    depth_bias: f32,
    depth_bias_slope: f32,
) -> wgpu::DepthStencilState {
    let (front, back, read_mask, write_mask) = if state.stencil_test {
        (
            state.stencil_front.into_wgpu(),
            state.stencil_back.into_wgpu(),
            state.stencil_front.read_mask,
            state.stencil_front.write_mask,
        )
    } else {
        (
            wgpu::StencilFaceState::IGNORE,
            wgpu::StencilFaceState::IGNORE,
            0,
            0,
        )
    };
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: state.depth_test && state.depth_write,
        depth_compare: if state.depth_test {
            state.depth_func.into_wgpu()
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState {
            front,
            back,
            read_mask,
            write_mask,
        },
        bias: wgpu::DepthBiasState {
            constant: depth_bias as i32,
            slope_scale: depth_bias_slope,
            clamp: 0.0,
        },
    }
}

impl IntoWgpu<wgpu::BlendFactor> for BlendFactor {
    fn into_wgpu(self) -> wgpu::BlendFactor {
        match self {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
            BlendFactor::SrcColor => wgpu::BlendFactor::Src,
            BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
            BlendFactor::DstColor => wgpu::BlendFactor::Dst,
            BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
            BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        }
    }
}

impl IntoWgpu<wgpu::BlendOperation> for BlendOp {
    fn into_wgpu(self) -> wgpu::BlendOperation {
        match self {
            BlendOp::Add => wgpu::BlendOperation::Add,
            BlendOp::Subtract => wgpu::BlendOperation::Subtract,
            BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendOp::Min => wgpu::BlendOperation::Min,
            BlendOp::Max => wgpu::BlendOperation::Max,
        }
    }
}

impl IntoWgpu<wgpu::ColorWrites> for ColorWrites {
    fn into_wgpu(self) -> wgpu::ColorWrites {
        wgpu::ColorWrites::from_bits_truncate(u32::from(self.bits()))
    }
}

/// One color target state per color attachment format. Targets missing from `blend`
/// reuse its last entry.
pub fn color_targets(
    blend: &BlendState,
    formats: &[wgpu::TextureFormat],
) -> Vec<Option<wgpu::ColorTargetState>> {
    formats
        .iter()
        .enumerate()
        .map(|(i, format)| {
            let target = blend.targets.get(i).or(blend.targets.last());
            Some(match target {
                Some(t) => wgpu::ColorTargetState {
                    format: *format,
                    blend: t.blend.then(|| wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: t.src.into_wgpu(),
                            dst_factor: t.dst.into_wgpu(),
                            operation: t.op.into_wgpu(),
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: t.src_alpha.into_wgpu(),
                            dst_factor: t.dst_alpha.into_wgpu(),
                            operation: t.op_alpha.into_wgpu(),
                        },
                    }),
                    write_mask: t.write_mask.into_wgpu(),
                },
                None => wgpu::ColorTargetState::from(*format),
            })
        })
        .collect()
}

// --- Vertex input ---

impl IntoWgpu<wgpu::VertexFormat> for VertexFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
            VertexFormat::Uint16x4 => wgpu::VertexFormat::Uint16x4,
        }
    }
}

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_formats_map_or_refuse() {
        assert_eq!(
            texture_format(TextureFormat::Rgba8UnormSrgb),
            Some(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(
            texture_format(TextureFormat::Etc1Rgb8),
            Some(wgpu::TextureFormat::Etc2Rgb8Unorm)
        );
        assert_eq!(texture_format(TextureFormat::PvrtcRgba4), None);
    }

    #[test]
    fn disabled_depth_test_always_passes() {
        let state = DepthStencilState {
            depth_test: false,
            ..DepthStencilState::default()
        };
        let ds = depth_stencil_state(&state, wgpu::TextureFormat::Depth24Plus, 0.0, 0.0);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::Always);
        assert!(!ds.depth_write_enabled);
    }

    #[test]
    fn cull_none_disables_culling() {
        let face: Option<wgpu::Face> = CullMode::None.into_wgpu();
        assert_eq!(face, None);
    }
}
