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

//! Binding layouts: the set of resources bound to the slots of a shader.

use crate::renderer::api::pipeline::shader::{UniformBlock, UniformSampler};
use crate::renderer::api::resource::{BufferId, SamplerId, TextureViewId};

/// An opaque handle to a binding layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingLayoutId(pub usize);

/// What kind of resource a binding slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A uniform buffer.
    UniformBuffer,
    /// A combined texture view and sampler.
    SampledTexture,
}

/// The resources currently bound to one slot.
///
/// A sampled-texture unit without a texture view is bound to the device's null
/// texture at update time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingUnit {
    /// Binding slot.
    pub binding: u32,
    /// Slot type.
    pub ty: BindingType,
    /// Bound buffer, for uniform buffer slots.
    pub buffer: Option<BufferId>,
    /// Bound texture view, for sampled texture slots.
    pub texture_view: Option<TextureViewId>,
    /// Bound sampler, for sampled texture slots.
    pub sampler: Option<SamplerId>,
}

impl BindingUnit {
    /// An empty uniform buffer slot.
    pub const fn uniform_buffer(binding: u32) -> Self {
        Self {
            binding,
            ty: BindingType::UniformBuffer,
            buffer: None,
            texture_view: None,
            sampler: None,
        }
    }

    /// An empty sampled texture slot.
    pub const fn sampled_texture(binding: u32) -> Self {
        Self {
            binding,
            ty: BindingType::SampledTexture,
            buffer: None,
            texture_view: None,
            sampler: None,
        }
    }
}

/// Describes a binding layout to create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindingLayoutInfo {
    /// A debug label.
    pub label: Option<String>,
    /// One unit per binding slot.
    pub units: Vec<BindingUnit>,
}

impl BindingLayoutInfo {
    /// Builds an empty layout from shader reflection data, one unit per block and per
    /// sampler array element.
    pub fn from_reflection(
        label: &str,
        blocks: &[UniformBlock],
        samplers: &[UniformSampler],
    ) -> Self {
        let mut units: Vec<BindingUnit> = blocks
            .iter()
            .map(|b| BindingUnit::uniform_buffer(b.binding))
            .collect();
        for sampler in samplers {
            for i in 0..sampler.count.max(1) {
                units.push(BindingUnit::sampled_texture(sampler.binding + i));
            }
        }
        units.sort_by_key(|u| u.binding);
        Self {
            label: Some(label.to_string()),
            units,
        }
    }

    /// Number of sampled texture slots.
    pub fn sampler_count(&self) -> u32 {
        self.units
            .iter()
            .filter(|u| u.ty == BindingType::SampledTexture)
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::pipeline::shader::UniformType;

    #[test]
    fn reflection_expands_sampler_arrays() {
        let blocks = [UniformBlock {
            name: "Constants".into(),
            binding: 0,
            members: vec![],
        }];
        let samplers = [UniformSampler {
            name: "shadowMaps".into(),
            binding: 1,
            ty: UniformType::Sampler2D,
            count: 2,
        }];
        let info = BindingLayoutInfo::from_reflection("test", &blocks, &samplers);
        let bindings: Vec<u32> = info.units.iter().map(|u| u.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2]);
        assert_eq!(info.sampler_count(), 2);
    }
}
