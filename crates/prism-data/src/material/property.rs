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

//! Material property values.

use prism_core::math::{LinearRgba, Mat4, Vec4};
use prism_core::renderer::{SamplerId, TextureViewId, UniformType};

/// A texture as seen by a material: a view, an optional sampler and the size of the
/// underlying image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    /// The view to bind, `None` while the image is not uploaded.
    pub view: Option<TextureViewId>,
    /// The sampler to bind. `None` keeps the slot's current sampler.
    pub sampler: Option<SamplerId>,
    /// Width of the image.
    pub width: u32,
    /// Height of the image.
    pub height: u32,
}

impl TextureHandle {
    /// A handle on an uploaded view.
    pub const fn new(view: TextureViewId, width: u32, height: u32) -> Self {
        Self {
            view: Some(view),
            sampler: None,
            width,
            height,
        }
    }

    /// Returns `self` sampled with `sampler`.
    pub const fn with_sampler(mut self, sampler: SamplerId) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// A texture can only be bound once it has a view and a non-empty size.
    pub const fn is_complete(&self) -> bool {
        self.view.is_some() && self.width > 0 && self.height > 0
    }
}

/// The value of a material property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// `float` or `int`.
    Scalar(f32),
    /// `vec2` to `vec4`, unused components ignored.
    Vector(Vec4),
    /// `mat4`.
    Matrix(Mat4),
    /// A sampler binding.
    Texture(TextureHandle),
    /// One value per array element.
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    /// The float components of a numeric value, `None` for textures and arrays.
    pub fn components(&self) -> Option<Vec<f32>> {
        match self {
            PropertyValue::Scalar(v) => Some(vec![*v]),
            PropertyValue::Vector(v) => Some(v.to_array().to_vec()),
            PropertyValue::Matrix(m) => Some(m.to_cols_array().to_vec()),
            PropertyValue::Texture(_) | PropertyValue::Array(_) => None,
        }
    }

    /// Builds the value of one `ty` element from raw components, zero-filling what is
    /// missing.
    pub fn from_components(ty: UniformType, values: &[f32]) -> Self {
        let at = |i: usize| values.get(i).copied().unwrap_or(0.0);
        match ty {
            UniformType::Float | UniformType::Int => PropertyValue::Scalar(at(0)),
            UniformType::Mat4 => {
                let col = |c: usize| {
                    Vec4::new(at(c * 4), at(c * 4 + 1), at(c * 4 + 2), at(c * 4 + 3))
                };
                PropertyValue::Matrix(Mat4::from_cols(col(0), col(1), col(2), col(3)))
            }
            _ => PropertyValue::Vector(Vec4::new(at(0), at(1), at(2), at(3))),
        }
    }

    /// The texture of a texture value.
    pub fn as_texture(&self) -> Option<&TextureHandle> {
        match self {
            PropertyValue::Texture(t) => Some(t),
            _ => None,
        }
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        PropertyValue::Scalar(value)
    }
}

impl From<Vec4> for PropertyValue {
    fn from(value: Vec4) -> Self {
        PropertyValue::Vector(value)
    }
}

impl From<LinearRgba> for PropertyValue {
    fn from(value: LinearRgba) -> Self {
        PropertyValue::Vector(value.to_vec4())
    }
}

impl From<Mat4> for PropertyValue {
    fn from(value: Mat4) -> Self {
        PropertyValue::Matrix(value)
    }
}

impl From<TextureHandle> for PropertyValue {
    fn from(value: TextureHandle) -> Self {
        PropertyValue::Texture(value)
    }
}

/// Number of scalar components of one element of `ty`.
pub(crate) const fn component_count(ty: UniformType) -> usize {
    match ty {
        UniformType::Float | UniformType::Int => 1,
        UniformType::Float2 | UniformType::Int2 => 2,
        UniformType::Float3 => 3,
        UniformType::Float4 | UniformType::Int4 => 4,
        UniformType::Mat4 => 16,
        UniformType::Sampler2D | UniformType::SamplerCube => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_textures_are_detected() {
        let view = TextureViewId(1);
        assert!(TextureHandle::new(view, 4, 4).is_complete());
        assert!(!TextureHandle::new(view, 0, 4).is_complete());
        let pending = TextureHandle {
            view: None,
            sampler: None,
            width: 4,
            height: 4,
        };
        assert!(!pending.is_complete());
    }

    #[test]
    fn components_round_out_by_type() {
        let value = PropertyValue::from_components(UniformType::Float3, &[1.0, 2.0]);
        assert_eq!(value, PropertyValue::Vector(Vec4::new(1.0, 2.0, 0.0, 0.0)));
        let identity: Vec<f32> = Mat4::IDENTITY.to_cols_array().to_vec();
        assert_eq!(
            PropertyValue::from_components(UniformType::Mat4, &identity),
            PropertyValue::Matrix(Mat4::IDENTITY)
        );
        let white = PropertyValue::from(LinearRgba::WHITE);
        assert_eq!(white.components().map(|c| c.len()), Some(4));
        assert!(PropertyValue::Array(vec![]).components().is_none());
    }
}
