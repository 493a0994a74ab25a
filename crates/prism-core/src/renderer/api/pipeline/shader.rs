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

//! Shader descriptors and the reflection data (uniform blocks, samplers, attributes)
//! a pass builds its bindings from.

use serde::{Deserialize, Serialize};

use super::input::VertexFormat;

/// An opaque handle to a compiled shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub usize);

/// A programmable stage of the graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStageKind {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// Source code of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    /// The stage.
    pub stage: ShaderStageKind,
    /// Preprocessed source code.
    pub source: String,
}

/// The type of a uniform or sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniformType {
    /// `float`.
    Float,
    /// `vec2`.
    Float2,
    /// `vec3`.
    Float3,
    /// `vec4`.
    Float4,
    /// `int`.
    Int,
    /// `ivec2`.
    Int2,
    /// `ivec4`.
    Int4,
    /// `mat4`.
    Mat4,
    /// `sampler2D`.
    #[serde(rename = "sampler2d")]
    Sampler2D,
    /// `samplerCube`.
    #[serde(rename = "sampler_cube")]
    SamplerCube,
}

impl UniformType {
    /// Size in bytes of one element inside a uniform block (std140).
    pub const fn size(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Float2 | UniformType::Int2 => 8,
            UniformType::Float3 => 12,
            UniformType::Float4 | UniformType::Int4 => 16,
            UniformType::Mat4 => 64,
            UniformType::Sampler2D | UniformType::SamplerCube => 0,
        }
    }

    /// Base alignment of one element inside a uniform block (std140).
    pub const fn alignment(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Float2 | UniformType::Int2 => 8,
            _ => 16,
        }
    }

    /// Returns `true` for sampler types.
    pub const fn is_sampler(&self) -> bool {
        matches!(self, UniformType::Sampler2D | UniformType::SamplerCube)
    }
}

fn one() -> u32 {
    1
}

/// One member of a uniform block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uniform {
    /// Member name.
    pub name: String,
    /// Member type.
    #[serde(rename = "type")]
    pub ty: UniformType,
    /// Array length, 1 for non-arrays.
    #[serde(default = "one")]
    pub count: u32,
}

/// A uniform block bound to one binding slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniformBlock {
    /// Block name.
    pub name: String,
    /// Binding slot.
    pub binding: u32,
    /// Members in declaration order.
    pub members: Vec<Uniform>,
}

impl UniformBlock {
    /// Byte offsets of each member under std140 rules.
    pub fn member_offsets(&self) -> Vec<u32> {
        let mut offset: u32 = 0;
        self.members
            .iter()
            .map(|m| {
                let align = if m.count > 1 { 16 } else { m.ty.alignment() };
                offset = offset.next_multiple_of(align);
                let this = offset;
                offset += Self::member_size(m);
                this
            })
            .collect()
    }

    /// Total size of the block in bytes, padded to 16.
    pub fn size(&self) -> u32 {
        let offsets = self.member_offsets();
        let end = offsets
            .iter()
            .zip(&self.members)
            .map(|(o, m)| o + Self::member_size(m))
            .max()
            .unwrap_or(0);
        end.next_multiple_of(16)
    }

    /// Array element stride of a member: its size, rounded to 16 for arrays.
    pub fn element_stride(member: &Uniform) -> u32 {
        if member.count > 1 {
            member.ty.size().next_multiple_of(16)
        } else {
            member.ty.size()
        }
    }

    fn member_size(m: &Uniform) -> u32 {
        Self::element_stride(m) * m.count.max(1)
    }
}

/// A combined texture/sampler binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniformSampler {
    /// Sampler name.
    pub name: String,
    /// Binding slot.
    pub binding: u32,
    /// `Sampler2D` or `SamplerCube`.
    #[serde(rename = "type")]
    pub ty: UniformType,
    /// Array length.
    #[serde(default = "one")]
    pub count: u32,
}

/// A vertex input declared by the vertex stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderAttribute {
    /// Attribute name (`a_position`, ...).
    pub name: String,
    /// Data format.
    pub format: VertexFormat,
    /// Shader location.
    pub location: u32,
}

/// Describes a shader program to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInfo {
    /// Program name, including the variant key.
    pub name: String,
    /// Stage sources.
    pub stages: Vec<ShaderStage>,
    /// Vertex inputs.
    pub attributes: Vec<ShaderAttribute>,
    /// Uniform blocks.
    pub blocks: Vec<UniformBlock>,
    /// Samplers.
    pub samplers: Vec<UniformSampler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, ty: UniformType, count: u32) -> Uniform {
        Uniform {
            name: name.to_string(),
            ty,
            count,
        }
    }

    #[test]
    fn std140_offsets() {
        let block = UniformBlock {
            name: "Constants".into(),
            binding: 0,
            members: vec![
                member("tiling", UniformType::Float2, 1),
                member("alpha", UniformType::Float, 1),
                member("color", UniformType::Float4, 1),
                member("weights", UniformType::Float, 3),
                member("world", UniformType::Mat4, 1),
            ],
        };
        assert_eq!(block.member_offsets(), vec![0, 8, 16, 32, 80]);
        assert_eq!(block.size(), 144);
    }

    #[test]
    fn empty_block_has_zero_size() {
        let block = UniformBlock {
            name: "Empty".into(),
            binding: 0,
            members: vec![],
        };
        assert_eq!(block.size(), 0);
    }
}
