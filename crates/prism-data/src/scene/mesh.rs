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

//! CPU-side geometry.

use prism_core::math::{Mat4, Vec3};
use prism_core::renderer::{VertexAttribute, VertexFormat, ATTR_POSITION};

/// Texture coordinate attribute name used by the builtin effects.
pub const ATTR_UV: &str = "a_uv";

/// Interleaved vertices and 16-bit indices.
///
/// The vertex bytes are kept after upload so dynamic batching can re-transform them.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Layout of one vertex.
    pub attributes: Vec<VertexAttribute>,
    /// Bytes per vertex.
    pub stride: u32,
    /// Interleaved vertex data.
    pub vertices: Vec<u8>,
    /// Triangle list indices, empty for non-indexed meshes.
    pub indices: Vec<u16>,
}

fn position_uv_layout() -> (Vec<VertexAttribute>, u32) {
    (
        vec![
            VertexAttribute {
                name: ATTR_POSITION.to_string(),
                format: VertexFormat::Float32x3,
                offset: 0,
            },
            VertexAttribute {
                name: ATTR_UV.to_string(),
                format: VertexFormat::Float32x2,
                offset: 12,
            },
        ],
        20,
    )
}

impl Mesh {
    /// Builds a position + uv mesh.
    pub fn from_positions_uvs(positions: &[[f32; 3]], uvs: &[[f32; 2]], indices: &[u16]) -> Self {
        let (attributes, stride) = position_uv_layout();
        let mut vertices = Vec::with_capacity(positions.len() * stride as usize);
        for (i, p) in positions.iter().enumerate() {
            let uv = uvs.get(i).copied().unwrap_or_default();
            vertices.extend_from_slice(bytemuck::cast_slice(p));
            vertices.extend_from_slice(bytemuck::cast_slice(&uv));
        }
        Self {
            attributes,
            stride,
            vertices,
            indices: indices.to_vec(),
        }
    }

    /// A `size` by `size` quad in the XY plane, centered on the origin.
    pub fn quad(size: f32) -> Self {
        let h = size * 0.5;
        Self::from_positions_uvs(
            &[[-h, -h, 0.0], [h, -h, 0.0], [h, h, 0.0], [-h, h, 0.0]],
            &[[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
            &[0, 1, 2, 0, 2, 3],
        )
    }

    /// The quad covering clip space, for post-processing.
    pub fn fullscreen_quad() -> Self {
        Self::quad(2.0)
    }

    /// A single non-indexed triangle.
    pub fn triangle() -> Self {
        Self::from_positions_uvs(
            &[[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.0, 0.5, 0.0]],
            &[[0.0, 1.0], [1.0, 1.0], [0.5, 0.0]],
            &[],
        )
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> u32 {
        if self.stride == 0 {
            return 0;
        }
        (self.vertices.len() / self.stride as usize) as u32
    }

    /// Number of indices.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// The attribute named `name`.
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Byte offset of a `Float32x3` position, if the mesh has one.
    fn position_offset(&self) -> Option<usize> {
        if self.stride < 12 {
            return None;
        }
        self.attribute(ATTR_POSITION)
            .filter(|a| a.format == VertexFormat::Float32x3 && a.offset + 12 <= self.stride)
            .map(|a| a.offset as usize)
    }

    /// The object-space positions.
    pub fn positions(&self) -> Vec<Vec3> {
        let Some(offset) = self.position_offset() else {
            return Vec::new();
        };
        self.vertices
            .chunks_exact(self.stride as usize)
            .map(|v| {
                let p: [f32; 3] = bytemuck::pod_read_unaligned(&v[offset..offset + 12]);
                Vec3::new(p[0], p[1], p[2])
            })
            .collect()
    }

    /// A copy of the vertex bytes with positions transformed by `world`. `None` when
    /// the mesh has no `Float32x3` position.
    pub fn transformed_vertices(&self, world: &Mat4) -> Option<Vec<u8>> {
        let offset = self.position_offset()?;
        let mut out = self.vertices.clone();
        for v in out.chunks_exact_mut(self.stride as usize) {
            let p: [f32; 3] = bytemuck::pod_read_unaligned(&v[offset..offset + 12]);
            let t = world.transform_point(Vec3::new(p[0], p[1], p[2]));
            v[offset..offset + 12].copy_from_slice(bytemuck::cast_slice(&[t.x, t.y, t.z]));
        }
        Some(out)
    }

    /// Object-space center of the vertices.
    pub fn center(&self) -> Vec3 {
        let positions = self.positions();
        if positions.is_empty() {
            return Vec3::ZERO;
        }
        let sum = positions.iter().fold(Vec3::ZERO, |acc, p| acc + *p);
        sum * (1.0 / positions.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quad_layout() {
        let quad = Mesh::quad(2.0);
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(quad.vertices.len(), 80);
        assert_eq!(quad.positions()[2], Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn transform_moves_positions_only() {
        let tri = Mesh::triangle();
        let moved = tri
            .transformed_vertices(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        let moved = Mesh {
            vertices: moved,
            ..tri.clone()
        };
        let p = moved.positions()[0];
        assert_relative_eq!(p.x, 0.5);
        assert_relative_eq!(p.y, 1.5);
        assert_relative_eq!(p.z, 3.0);
        // uv untouched
        assert_eq!(&moved.vertices[12..20], &tri.vertices[12..20]);
    }

    #[test]
    fn center_of_quad_is_origin() {
        let c = Mesh::quad(4.0).center();
        assert_relative_eq!(c.x, 0.0);
        assert_relative_eq!(c.y, 0.0);
    }
}
