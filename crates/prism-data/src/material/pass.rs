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

//! A single pass: one program variant, its fixed-function state and the resources
//! bound to its binding set.
//!
//! Writes are staged on the CPU. [`Pass::update`] flushes them to the device and
//! recomputes the pass hash, which identifies the configuration for sorting and
//! batching: two passes with the same program variant, states, bound resources and
//! uniform contents hash the same.

use std::sync::Arc;

use ahash::AHashMap;
use prism_core::asset::{
    BatchingScheme, DefineMap, PassStates, PassTemplate, PropertyDefault, DEFAULT_PRIORITY,
};
use prism_core::renderer::{
    BindingLayoutId, BindingLayoutInfo, BindingType, BindingUnit, BlendState, BufferId,
    BufferInfo, DepthStencilState, DynamicStateFlags, GraphicsDevice, InputAssemblerInfo,
    PipelineStateInfo, PrimitiveMode, RasterizerState, RenderPassId, SamplerId, ShaderId,
    TextureType, TextureViewId, UniformBlock, UniformType,
};
use prism_core::utils::HashWriter;

use super::property::{component_count, PropertyValue, TextureHandle};
use crate::error::MaterialError;
use crate::program::Program;
use crate::system::MaterialSystem;

/// Binding set of per-frame data (camera, exposure).
pub const SET_GLOBAL: u32 = 0;
/// Binding set of per-pass data (material properties).
pub const SET_PASS: u32 = 1;
/// Binding set of per-model data (world matrix).
pub const SET_LOCAL: u32 = 2;

/// Resolves a property name to where its data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Uniform buffer member or sampled texture.
    pub binding_type: BindingType,
    /// Binding slot of the block or of the first sampler element.
    pub binding: u32,
    /// Byte offset inside the block. Zero for samplers.
    pub offset: u32,
    /// Element type.
    pub ty: UniformType,
    /// Array length, 1 for non-arrays.
    pub count: u32,
}

impl Handle {
    /// Distance in bytes between array elements.
    pub fn stride(&self) -> u32 {
        if self.count > 1 {
            self.ty.size().next_multiple_of(16)
        } else {
            self.ty.size()
        }
    }
}

/// What a pass needs to be built.
#[derive(Debug, Clone, Copy)]
pub struct PassInfo<'a> {
    /// The template in the technique.
    pub template: &'a PassTemplate,
    /// Position of the template in its technique.
    pub index: usize,
    /// Active defines, template defines included.
    pub defines: &'a DefineMap,
    /// State overrides applied over the template states.
    pub states: &'a PassStates,
}

/// Outcome of writing a named property into a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyWrite {
    Applied,
    /// The name exists but the value does not fit or the texture is incomplete.
    Rejected,
    Unknown,
}

#[derive(Debug)]
struct UniformStorage {
    binding: u32,
    buffer: BufferId,
    data: Vec<u8>,
    dirty: bool,
}

#[derive(Debug, Clone, Copy)]
struct SamplerSlot {
    binding: u32,
    ty: UniformType,
    view: Option<TextureViewId>,
    sampler: Option<SamplerId>,
}

/// A compiled pass with its GPU-side bindings.
#[derive(Debug)]
pub struct Pass {
    device: Arc<dyn GraphicsDevice>,
    program: Arc<Program>,
    index: usize,
    defines: DefineMap,
    phase_name: String,
    phase: u32,
    priority: u32,
    primitive: PrimitiveMode,
    rasterizer: RasterizerState,
    depth_stencil: DepthStencilState,
    blend: BlendState,
    batching: BatchingScheme,
    handles: AHashMap<String, Handle>,
    uniforms: Vec<UniformStorage>,
    samplers: Vec<SamplerSlot>,
    binding_layout: BindingLayoutId,
    bindings_dirty: bool,
    hash: u32,
    destroyed: bool,
}

impl Pass {
    /// Compiles the program variant, creates the binding layout and uniform buffers,
    /// resolves the fixed-function state and uploads the property defaults.
    ///
    /// ## Errors
    /// Program lookup, compilation or resource creation failures. Nothing created by
    /// the failed call is leaked.
    pub fn new(system: &MaterialSystem, info: &PassInfo<'_>) -> Result<Self, MaterialError> {
        let template = info.template;
        let program = system.get_program(&template.program, info.defines)?;
        let states = template.states.merged(info.states);
        let device = Arc::clone(system.device());

        let layout_info =
            BindingLayoutInfo::from_reflection(&program.key, &program.blocks, &program.samplers);
        let binding_layout = device.create_binding_layout(&layout_info)?;

        let mut handles = AHashMap::new();
        for block in &program.blocks {
            for (member, offset) in block.members.iter().zip(block.member_offsets()) {
                handles.insert(
                    member.name.clone(),
                    Handle {
                        binding_type: BindingType::UniformBuffer,
                        binding: block.binding,
                        offset,
                        ty: member.ty,
                        count: member.count.max(1),
                    },
                );
            }
        }
        let default_sampler = system.default_sampler();
        let mut samplers = Vec::new();
        for sampler in &program.samplers {
            handles.insert(
                sampler.name.clone(),
                Handle {
                    binding_type: BindingType::SampledTexture,
                    binding: sampler.binding,
                    offset: 0,
                    ty: sampler.ty,
                    count: sampler.count.max(1),
                },
            );
            for i in 0..sampler.count.max(1) {
                samplers.push(SamplerSlot {
                    binding: sampler.binding + i,
                    ty: sampler.ty,
                    view: None,
                    sampler: default_sampler,
                });
            }
        }

        let mut pass = Self {
            device,
            index: info.index,
            defines: info.defines.clone(),
            phase_name: template.phase.clone(),
            phase: system.phase(&template.phase),
            priority: states.priority.unwrap_or(DEFAULT_PRIORITY),
            primitive: states.primitive.unwrap_or_default(),
            rasterizer: states.rasterizer.unwrap_or_default(),
            depth_stencil: states.depth_stencil.unwrap_or_default(),
            blend: states.blend.unwrap_or_default(),
            batching: template.batching,
            handles,
            uniforms: Vec::with_capacity(program.blocks.len()),
            samplers,
            binding_layout,
            bindings_dirty: true,
            hash: 0,
            destroyed: false,
            program,
        };

        if let Err(e) = pass.create_uniform_buffers() {
            pass.destroy();
            return Err(e);
        }
        pass.apply_defaults(system, template);
        if let Err(e) = pass.update() {
            pass.destroy();
            return Err(e);
        }
        Ok(pass)
    }

    fn create_uniform_buffers(&mut self) -> Result<(), MaterialError> {
        let blocks: Vec<UniformBlock> = self.program.blocks.clone();
        for block in &blocks {
            let size = block.size().max(16);
            let label = format!("{}:{}", self.program.key, block.name);
            let buffer = self
                .device
                .create_buffer(&BufferInfo::uniform(&label, u64::from(size)))?;
            self.uniforms.push(UniformStorage {
                binding: block.binding,
                buffer,
                data: vec![0; size as usize],
                dirty: true,
            });
        }
        Ok(())
    }

    fn apply_defaults(&mut self, system: &MaterialSystem, template: &PassTemplate) {
        for (name, default) in &template.properties {
            let Some(handle) = self.handles.get(name).copied() else {
                log::debug!(
                    "Pass: default for '{name}' has no match in program '{}'",
                    self.program.name
                );
                continue;
            };
            let applied = match default {
                PropertyDefault::Number(v) => self.write_element(&handle, 0, &[*v]),
                PropertyDefault::Numbers(values) => {
                    let n = component_count(handle.ty).max(1);
                    values
                        .chunks(n)
                        .take(handle.count as usize)
                        .enumerate()
                        .all(|(i, chunk)| self.write_element(&handle, i as u32, chunk))
                }
                PropertyDefault::Texture(texture) => match system.builtin_texture(texture) {
                    Some(t) => self.bind_texture(&handle, 0, &t),
                    None => {
                        log::warn!("Pass: unknown builtin texture '{texture}' for '{name}'");
                        false
                    }
                },
            };
            if !applied {
                log::warn!(
                    "Pass: default of '{name}' does not fit program '{}'",
                    self.program.name
                );
            }
        }
    }

    // --- Handles and staged writes ---

    /// The handle of property `name`.
    pub fn get_handle(&self, name: &str) -> Option<Handle> {
        self.handles.get(name).copied()
    }

    /// Writes one element of `ty` at element index `element` of `handle`.
    fn write_element(&mut self, handle: &Handle, element: u32, components: &[f32]) -> bool {
        if handle.binding_type != BindingType::UniformBuffer {
            return false;
        }
        let Some(storage) = self
            .uniforms
            .iter_mut()
            .find(|u| u.binding == handle.binding)
        else {
            return false;
        };
        if !write_components(&mut storage.data, handle, element, components) {
            return false;
        }
        storage.dirty = true;
        true
    }

    /// Stages a uniform value. Returns `false` if `handle` is not a uniform or the
    /// value is not numeric.
    pub fn set_uniform(&mut self, handle: Handle, value: &PropertyValue) -> bool {
        match value.components() {
            Some(components) => self.write_element(&handle, 0, &components),
            None => false,
        }
    }

    /// Stages one value per array element, extra values are ignored. Nothing is
    /// staged unless every element fits.
    pub fn set_uniform_array(&mut self, handle: Handle, values: &[PropertyValue]) -> bool {
        if handle.binding_type != BindingType::UniformBuffer {
            return false;
        }
        let Some(rows) = values
            .iter()
            .take(handle.count as usize)
            .map(PropertyValue::components)
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };
        let Some(storage) = self
            .uniforms
            .iter_mut()
            .find(|u| u.binding == handle.binding)
        else {
            return false;
        };
        let mut scratch = storage.data.clone();
        let fits = rows
            .iter()
            .enumerate()
            .all(|(i, row)| write_components(&mut scratch, &handle, i as u32, row));
        if fits {
            storage.data = scratch;
            storage.dirty = true;
        }
        fits
    }

    /// Stages a texture view for sampler slot `binding`.
    pub fn bind_texture_view(&mut self, binding: u32, view: TextureViewId) -> bool {
        match self.samplers.iter_mut().find(|s| s.binding == binding) {
            Some(slot) => {
                slot.view = Some(view);
                self.bindings_dirty = true;
                true
            }
            None => false,
        }
    }

    /// Stages a sampler for sampler slot `binding`.
    pub fn bind_sampler(&mut self, binding: u32, sampler: SamplerId) -> bool {
        match self.samplers.iter_mut().find(|s| s.binding == binding) {
            Some(slot) => {
                slot.sampler = Some(sampler);
                self.bindings_dirty = true;
                true
            }
            None => false,
        }
    }

    /// Binds `texture` to element `element` of a sampler handle. Incomplete textures
    /// are rejected.
    pub fn bind_texture(&mut self, handle: &Handle, element: u32, texture: &TextureHandle) -> bool {
        if handle.binding_type != BindingType::SampledTexture || element >= handle.count {
            return false;
        }
        let Some(view) = texture.view.filter(|_| texture.is_complete()) else {
            return false;
        };
        let binding = handle.binding + element;
        if !self.bind_texture_view(binding, view) {
            return false;
        }
        if let Some(sampler) = texture.sampler {
            self.bind_sampler(binding, sampler);
        }
        true
    }

    /// Binds one texture per sampler element. Nothing is bound unless every item is
    /// a complete texture with a matching slot.
    fn bind_texture_array(&mut self, handle: &Handle, items: &[PropertyValue]) -> bool {
        let Some(textures) = items
            .iter()
            .take(handle.count as usize)
            .map(PropertyValue::as_texture)
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };
        let bindable = textures.iter().enumerate().all(|(i, t)| {
            let binding = handle.binding + i as u32;
            t.is_complete()
                && t.view.is_some()
                && self.samplers.iter().any(|s| s.binding == binding)
        });
        bindable
            && textures
                .iter()
                .enumerate()
                .all(|(i, t)| self.bind_texture(handle, i as u32, t))
    }

    pub(crate) fn apply_property(&mut self, name: &str, value: &PropertyValue) -> PropertyWrite {
        let Some(handle) = self.get_handle(name) else {
            return PropertyWrite::Unknown;
        };
        let applied = match (handle.binding_type, value) {
            (BindingType::SampledTexture, PropertyValue::Texture(t)) => {
                self.bind_texture(&handle, 0, t)
            }
            (BindingType::SampledTexture, PropertyValue::Array(items)) => {
                self.bind_texture_array(&handle, items)
            }
            (BindingType::SampledTexture, _) => false,
            (BindingType::UniformBuffer, PropertyValue::Array(items)) => {
                self.set_uniform_array(handle, items)
            }
            (BindingType::UniformBuffer, value) => self.set_uniform(handle, value),
        };
        if applied {
            PropertyWrite::Applied
        } else {
            PropertyWrite::Rejected
        }
    }

    // --- Flush ---

    /// Uploads staged uniform data, rebinds changed resources and recomputes the hash.
    pub fn update(&mut self) -> Result<(), MaterialError> {
        if self.destroyed {
            return Ok(());
        }
        for storage in self.uniforms.iter_mut().filter(|u| u.dirty) {
            self.device
                .update_buffer(storage.buffer, 0, &storage.data)?;
            storage.dirty = false;
        }
        if self.bindings_dirty {
            let units = self.binding_units();
            self.device
                .update_binding_layout(self.binding_layout, &units)?;
            self.bindings_dirty = false;
        }
        self.hash = self.compute_hash();
        Ok(())
    }

    fn binding_units(&self) -> Vec<BindingUnit> {
        let mut units: Vec<BindingUnit> = self
            .uniforms
            .iter()
            .map(|u| BindingUnit {
                buffer: Some(u.buffer),
                ..BindingUnit::uniform_buffer(u.binding)
            })
            .collect();
        for slot in &self.samplers {
            let fallback = match slot.ty {
                UniformType::SamplerCube => self.device.null_texture_view(TextureType::Cube),
                _ => self.device.null_texture_view(TextureType::Tex2D),
            };
            units.push(BindingUnit {
                texture_view: slot.view.or(fallback),
                sampler: slot.sampler,
                ..BindingUnit::sampled_texture(slot.binding)
            });
        }
        units
    }

    fn compute_hash(&self) -> u32 {
        let mut w = HashWriter::new();
        w.write_str(&self.program.key)
            .write_u64(self.program.shader.0 as u64)
            .write_u32(self.primitive as u32)
            .write_u32(self.priority)
            .write_u32(self.phase);
        self.rasterizer.hash_into(&mut w);
        self.depth_stencil.hash_into(&mut w);
        self.blend.hash_into(&mut w);
        for slot in &self.samplers {
            w.write_u32(slot.binding)
                .write_u64(slot.view.map_or(u64::MAX, |v| v.0 as u64))
                .write_u64(slot.sampler.map_or(u64::MAX, |s| s.0 as u64));
        }
        for storage in &self.uniforms {
            w.write_u32(storage.binding).write_bytes(&storage.data);
        }
        w.finish(0)
    }

    // --- Queries ---

    /// The configuration hash, valid after the last [`Pass::update`].
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// The program variant.
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The compiled shader.
    pub fn shader(&self) -> ShaderId {
        self.program.shader
    }

    /// Position of the pass template in its technique.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Active defines.
    pub fn defines(&self) -> &DefineMap {
        &self.defines
    }

    /// Phase name.
    pub fn phase_name(&self) -> &str {
        &self.phase_name
    }

    /// Phase bit.
    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Sort priority, lower draws first.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Batching scheme.
    pub fn batching(&self) -> BatchingScheme {
        self.batching
    }

    /// Topology.
    pub fn primitive(&self) -> PrimitiveMode {
        self.primitive
    }

    /// Rasterizer state.
    pub fn rasterizer(&self) -> &RasterizerState {
        &self.rasterizer
    }

    /// Depth/stencil state.
    pub fn depth_stencil(&self) -> &DepthStencilState {
        &self.depth_stencil
    }

    /// Blend state.
    pub fn blend(&self) -> &BlendState {
        &self.blend
    }

    /// A pass is transparent when its first target blends.
    pub fn is_transparent(&self) -> bool {
        self.blend.is_blending()
    }

    /// The layout of the pass binding set.
    pub fn binding_layout(&self) -> BindingLayoutId {
        self.binding_layout
    }

    /// Staged contents of the uniform block at `binding`.
    pub fn uniform_data(&self, binding: u32) -> Option<&[u8]> {
        self.uniforms
            .iter()
            .find(|u| u.binding == binding)
            .map(|u| u.data.as_slice())
    }

    /// The view staged for sampler slot `binding`, `None` when the null texture is used.
    pub fn texture_view(&self, binding: u32) -> Option<TextureViewId> {
        self.samplers
            .iter()
            .find(|s| s.binding == binding)
            .and_then(|s| s.view)
    }

    /// The pipeline state descriptor for drawing `input_assembler` with this pass.
    pub fn pipeline_state_info(
        &self,
        input_assembler: &InputAssemblerInfo,
        render_pass: RenderPassId,
        global_layout: BindingLayoutId,
        local_layout: BindingLayoutId,
    ) -> PipelineStateInfo {
        PipelineStateInfo {
            shader: self.program.shader,
            primitive: self.primitive,
            rasterizer: self.rasterizer,
            depth_stencil: self.depth_stencil,
            blend: self.blend.clone(),
            dynamic_states: DynamicStateFlags::VIEWPORT | DynamicStateFlags::SCISSOR,
            input_layout: input_assembler.attributes.clone(),
            vertex_stride: input_assembler.vertex_stride,
            binding_layouts: vec![global_layout, self.binding_layout, local_layout],
            render_pass,
        }
    }

    /// Releases the uniform buffers and the binding layout. The program variant belongs
    /// to the program library. Calling it twice is harmless.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for storage in self.uniforms.drain(..) {
            self.device.destroy_buffer(storage.buffer);
        }
        self.device.destroy_binding_layout(self.binding_layout);
    }

    /// Returns `true` once [`Pass::destroy`] ran.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for Pass {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Encodes `components` as element `element` of `handle` into `data`. Fails without
/// writing when the element or any component falls outside the block.
fn write_components(data: &mut [u8], handle: &Handle, element: u32, components: &[f32]) -> bool {
    if element >= handle.count {
        return false;
    }
    let n = component_count(handle.ty).min(components.len());
    let start = (handle.offset + element * handle.stride()) as usize;
    let Some(dst) = data.get_mut(start..start + n * 4) else {
        return false;
    };
    let is_int = matches!(
        handle.ty,
        UniformType::Int | UniformType::Int2 | UniformType::Int4
    );
    for (chunk, c) in dst.chunks_exact_mut(4).zip(&components[..n]) {
        if is_int {
            chunk.copy_from_slice(bytemuck::bytes_of(&(*c as i32)));
        } else {
            chunk.copy_from_slice(bytemuck::bytes_of(c));
        }
    }
    true
}
