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

//! Fixed-function state: rasterizer, depth/stencil, blend, and the pipeline state
//! object that bakes them together with a shader.
//!
//! Every state struct is `serde`-deserializable so effects can carry defaults and
//! overrides, and exposes `hash_into` so passes can fold it into their identity hash.

use serde::{Deserialize, Serialize};

use super::input::VertexAttribute;
use super::layout::BindingLayoutId;
use super::shader::ShaderId;
use crate::math::LinearRgba;
use crate::renderer::api::command::RenderPassId;
use crate::renderer::api::util::{ColorWrites, CompareFunction, DynamicStateFlags};
use crate::utils::HashWriter;

/// An opaque handle to a pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineStateId(pub usize);

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveMode {
    /// Points.
    PointList,
    /// Independent lines.
    LineList,
    /// Connected lines.
    LineStrip,
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Connected triangles.
    TriangleStrip,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

/// Polygon rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    /// Filled polygons.
    #[default]
    Fill,
    /// Wireframe.
    Line,
    /// Vertices only.
    Point,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerState {
    /// Face culling.
    pub cull_mode: CullMode,
    /// Polygon mode.
    pub polygon_mode: PolygonMode,
    /// Counter-clockwise winding is front facing when `false`.
    pub is_front_face_cw: bool,
    /// Constant depth bias.
    pub depth_bias: f32,
    /// Slope-scaled depth bias.
    pub depth_bias_slope: f32,
    /// Clip fragments outside the depth range.
    pub depth_clip: bool,
    /// Line width for line primitives.
    pub line_width: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            polygon_mode: PolygonMode::Fill,
            is_front_face_cw: false,
            depth_bias: 0.0,
            depth_bias_slope: 0.0,
            depth_clip: true,
            line_width: 1.0,
        }
    }
}

impl RasterizerState {
    /// Folds the state into a pass hash.
    pub fn hash_into(&self, w: &mut HashWriter) {
        w.write_u32(self.cull_mode as u32)
            .write_u32(self.polygon_mode as u32)
            .write_bool(self.is_front_face_cw)
            .write_f32(self.depth_bias)
            .write_f32(self.depth_bias_slope)
            .write_bool(self.depth_clip)
            .write_f32(self.line_width);
    }
}

/// A stencil operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StencilOp {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set to zero.
    Zero,
    /// Set to the reference value.
    Replace,
    /// Increment and clamp.
    IncrementClamp,
    /// Decrement and clamp.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
    /// Increment and wrap.
    IncrementWrap,
    /// Decrement and wrap.
    DecrementWrap,
}

/// Stencil test for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilFace {
    /// Comparison against the stencil buffer.
    pub compare: CompareFunction,
    /// Operation when the stencil test fails.
    pub fail_op: StencilOp,
    /// Operation when stencil passes and depth fails.
    pub depth_fail_op: StencilOp,
    /// Operation when both pass.
    pub pass_op: StencilOp,
    /// Read mask.
    pub read_mask: u32,
    /// Write mask.
    pub write_mask: u32,
    /// Reference value.
    pub reference: u32,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            read_mask: 0xff,
            write_mask: 0xff,
            reference: 1,
        }
    }
}

impl StencilFace {
    fn hash_into(&self, w: &mut HashWriter) {
        w.write_u32(self.compare as u32)
            .write_u32(self.fail_op as u32)
            .write_u32(self.depth_fail_op as u32)
            .write_u32(self.pass_op as u32)
            .write_u32(self.read_mask)
            .write_u32(self.write_mask)
            .write_u32(self.reference);
    }
}

/// Depth and stencil test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStencilState {
    /// Enable the depth test.
    pub depth_test: bool,
    /// Enable depth writes.
    pub depth_write: bool,
    /// Depth comparison.
    pub depth_func: CompareFunction,
    /// Enable the stencil test.
    pub stencil_test: bool,
    /// Front face stencil state.
    pub stencil_front: StencilFace,
    /// Back face stencil state.
    pub stencil_back: StencilFace,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::Less,
            stencil_test: false,
            stencil_front: StencilFace::default(),
            stencil_back: StencilFace::default(),
        }
    }
}

impl DepthStencilState {
    /// Folds the state into a pass hash.
    pub fn hash_into(&self, w: &mut HashWriter) {
        w.write_bool(self.depth_test)
            .write_bool(self.depth_write)
            .write_u32(self.depth_func as u32)
            .write_bool(self.stencil_test);
        self.stencil_front.hash_into(w);
        self.stencil_back.hash_into(w);
    }
}

/// A blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendFactor {
    /// 0.
    Zero,
    /// 1.
    One,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// 1 - destination alpha.
    OneMinusDstAlpha,
    /// Source color.
    SrcColor,
    /// 1 - source color.
    OneMinusSrcColor,
    /// Destination color.
    DstColor,
    /// 1 - destination color.
    OneMinusDstColor,
    /// Blend constant.
    ConstantColor,
}

/// A blend equation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendOp {
    /// src + dst.
    #[default]
    Add,
    /// src - dst.
    Subtract,
    /// dst - src.
    ReverseSubtract,
    /// min(src, dst).
    Min,
    /// max(src, dst).
    Max,
}

/// Blending for one color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendTarget {
    /// Enable blending.
    pub blend: bool,
    /// Color source factor.
    pub src: BlendFactor,
    /// Color destination factor.
    pub dst: BlendFactor,
    /// Color operator.
    pub op: BlendOp,
    /// Alpha source factor.
    pub src_alpha: BlendFactor,
    /// Alpha destination factor.
    pub dst_alpha: BlendFactor,
    /// Alpha operator.
    pub op_alpha: BlendOp,
    /// Channel write mask.
    pub write_mask: ColorWrites,
}

impl Default for BlendTarget {
    fn default() -> Self {
        Self {
            blend: false,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            op_alpha: BlendOp::Add,
            write_mask: ColorWrites::ALL,
        }
    }
}

impl BlendTarget {
    /// Straight alpha blending (`src_alpha, 1 - src_alpha`).
    pub fn alpha_blend() -> Self {
        Self {
            blend: true,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Self::default()
        }
    }
}

/// Blend state for all color targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendState {
    /// Alpha to coverage.
    pub alpha_to_coverage: bool,
    /// One entry per color target.
    pub targets: Vec<BlendTarget>,
    /// Blend constant.
    #[serde(skip)]
    pub blend_color: LinearRgba,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            alpha_to_coverage: false,
            targets: vec![BlendTarget::default()],
            blend_color: LinearRgba::TRANSPARENT,
        }
    }
}

impl BlendState {
    /// Returns `true` if the first target blends.
    pub fn is_blending(&self) -> bool {
        self.targets.first().is_some_and(|t| t.blend)
    }

    /// Folds the state into a pass hash.
    pub fn hash_into(&self, w: &mut HashWriter) {
        w.write_bool(self.alpha_to_coverage)
            .write_u32(self.targets.len() as u32);
        for t in &self.targets {
            w.write_bool(t.blend)
                .write_u32(t.src as u32)
                .write_u32(t.dst as u32)
                .write_u32(t.op as u32)
                .write_u32(t.src_alpha as u32)
                .write_u32(t.dst_alpha as u32)
                .write_u32(t.op_alpha as u32)
                .write_u32(u32::from(t.write_mask.bits()));
        }
        for c in [
            self.blend_color.r,
            self.blend_color.g,
            self.blend_color.b,
            self.blend_color.a,
        ] {
            w.write_f32(c);
        }
    }
}

/// Describes a pipeline state object.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStateInfo {
    /// The compiled program.
    pub shader: ShaderId,
    /// Topology.
    pub primitive: PrimitiveMode,
    /// Rasterizer state.
    pub rasterizer: RasterizerState,
    /// Depth/stencil state.
    pub depth_stencil: DepthStencilState,
    /// Blend state.
    pub blend: BlendState,
    /// States set while recording.
    pub dynamic_states: DynamicStateFlags,
    /// Vertex layout the state is compatible with.
    pub input_layout: Vec<VertexAttribute>,
    /// Vertex stride matching `input_layout`.
    pub vertex_stride: u32,
    /// Binding layouts by set index (global, pass, local).
    pub binding_layouts: Vec<BindingLayoutId>,
    /// Render pass the state is compatible with.
    pub render_pass: RenderPassId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let state: DepthStencilState =
            serde_json::from_str(r#"{ "depth_write": false }"#).unwrap();
        assert!(state.depth_test);
        assert!(!state.depth_write);
        assert_eq!(state.depth_func, CompareFunction::Less);
    }

    #[test]
    fn blend_hash_changes_with_targets() {
        let opaque = BlendState::default();
        let transparent = BlendState {
            targets: vec![BlendTarget::alpha_blend()],
            ..BlendState::default()
        };
        assert!(!opaque.is_blending());
        assert!(transparent.is_blending());

        let mut a = HashWriter::new();
        opaque.hash_into(&mut a);
        let mut b = HashWriter::new();
        transparent.hash_into(&mut b);
        assert_ne!(a.finish(0), b.finish(0));
    }
}
