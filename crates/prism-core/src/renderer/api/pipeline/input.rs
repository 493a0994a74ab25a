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

//! Vertex input description: formats, attributes and input assemblers.

use serde::{Deserialize, Serialize};

use crate::renderer::api::resource::BufferId;
use crate::renderer::api::util::IndexFormat;
use crate::utils::HashWriter;

/// An opaque handle to an input assembler (vertex/index buffer bindings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputAssemblerId(pub usize);

/// The memory format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexFormat {
    /// One `f32`.
    Float32,
    /// Two `f32`.
    Float32x2,
    /// Three `f32`.
    Float32x3,
    /// Four `f32`.
    Float32x4,
    /// Four normalized `u8`.
    Unorm8x4,
    /// Four `u16`.
    Uint16x4,
}

impl VertexFormat {
    /// Size in bytes.
    pub const fn size(&self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 | VertexFormat::Uint16x4 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One attribute inside an interleaved vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute name, matched against shader attributes.
    pub name: String,
    /// Data format.
    pub format: VertexFormat,
    /// Byte offset inside one vertex.
    pub offset: u32,
}

/// Position attribute name used by batching and the builtin effects.
pub const ATTR_POSITION: &str = "a_position";

/// Describes the vertex/index buffers a draw reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAssemblerInfo {
    /// Attributes of the interleaved vertex buffer.
    pub attributes: Vec<VertexAttribute>,
    /// The vertex buffer.
    pub vertex_buffer: BufferId,
    /// Bytes per vertex.
    pub vertex_stride: u32,
    /// Optional index buffer.
    pub index_buffer: Option<BufferId>,
    /// Format of the indices.
    pub index_format: IndexFormat,
    /// Number of vertices.
    pub vertex_count: u32,
    /// Number of indices, 0 for non-indexed draws.
    pub index_count: u32,
    /// Instances per draw.
    pub instance_count: u32,
}

impl InputAssemblerInfo {
    /// Hashes the vertex layout only, which is what pipeline state compatibility
    /// depends on.
    pub fn layout_hash(&self) -> u32 {
        let mut w = HashWriter::new();
        w.write_u32(self.vertex_stride);
        for attr in &self.attributes {
            w.write_str(&attr.name)
                .write_u32(attr.format as u32)
                .write_u32(attr.offset);
        }
        w.finish(0)
    }

    /// Finds an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
