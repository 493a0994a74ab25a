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

//! Models: a world transform, a local uniform block and a list of sub-models.

use std::sync::Arc;

use prism_core::asset::BatchingScheme;
use prism_core::math::{Mat4, Vec3};
use prism_core::renderer::{
    BindingLayoutId, BindingLayoutInfo, BindingUnit, BufferId, BufferInfo, CommandBufferInfo,
    CommandBufferLevel, CommandPackage, DrawInfo, GraphicsDevice, IndexFormat, InputAssemblerId,
    InputAssemblerInfo, PipelineStateId, RenderPassId, ResourceError, Uniform, UniformBlock,
    UniformType,
};

use super::mesh::Mesh;
use super::view::VISIBILITY_DEFAULT;
use crate::error::MaterialError;
use crate::material::{Material, MaterialInstance, SharedMaterial, SET_GLOBAL, SET_LOCAL, SET_PASS};

/// The layout of the per-model block of binding set 2.
pub fn local_block() -> UniformBlock {
    UniformBlock {
        name: "Local".to_string(),
        binding: 0,
        members: vec![Uniform {
            name: "world".to_string(),
            ty: UniformType::Mat4,
            count: 1,
        }],
    }
}

/// A uniform buffer holding one world matrix and the layout binding it.
#[derive(Debug)]
pub struct LocalBinding {
    device: Arc<dyn GraphicsDevice>,
    buffer: BufferId,
    layout: BindingLayoutId,
    destroyed: bool,
}

impl LocalBinding {
    /// Creates the buffer and layout, initialized to `world`.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        label: &str,
        world: &Mat4,
    ) -> Result<Self, ResourceError> {
        let block = local_block();
        let buffer = device.create_buffer(&BufferInfo::uniform(label, u64::from(block.size())))?;
        let info = BindingLayoutInfo::from_reflection(label, &[block], &[]);
        let layout = match device.create_binding_layout(&info) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_buffer(buffer);
                return Err(e);
            }
        };
        let binding = Self {
            device,
            buffer,
            layout,
            destroyed: false,
        };
        let unit = BindingUnit {
            buffer: Some(buffer),
            ..BindingUnit::uniform_buffer(0)
        };
        binding.device.update_binding_layout(layout, &[unit])?;
        binding.write(world)?;
        Ok(binding)
    }

    /// Uploads `world`.
    pub fn write(&self, world: &Mat4) -> Result<(), ResourceError> {
        self.device
            .update_buffer(self.buffer, 0, bytemuck::bytes_of(world))
    }

    /// The layout to bind at set 2.
    pub fn layout(&self) -> BindingLayoutId {
        self.layout
    }

    /// Releases the buffer and layout.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.device.destroy_binding_layout(self.layout);
        self.device.destroy_buffer(self.buffer);
    }
}

impl Drop for LocalBinding {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// The material of a sub-model.
#[derive(Debug)]
pub enum MaterialSlot {
    /// A material shared with other sub-models.
    Shared(SharedMaterial),
    /// A private copy owned by this sub-model.
    Instance(Box<MaterialInstance>),
}

impl MaterialSlot {
    /// Runs `f` on the material, read-locking it if shared.
    pub fn with<R>(&self, f: impl FnOnce(&Material) -> R) -> Result<R, MaterialError> {
        match self {
            MaterialSlot::Shared(shared) => {
                let material = shared
                    .read()
                    .map_err(|_| MaterialError::Poisoned("shared material".to_string()))?;
                Ok(f(&material))
            }
            MaterialSlot::Instance(instance) => Ok(f(instance)),
        }
    }

    /// The shared material, or the parent of the instance.
    pub fn shared(&self) -> Option<SharedMaterial> {
        match self {
            MaterialSlot::Shared(shared) => Some(Arc::clone(shared)),
            MaterialSlot::Instance(instance) => instance.parent(),
        }
    }
}

/// What the render queues need to know about one pass of a sub-model, captured when
/// the sub-model is prepared.
#[derive(Debug, Clone)]
pub struct PassSnapshot {
    /// Index of the pass in the material.
    pub pass_index: usize,
    /// Phase bit.
    pub phase: u32,
    /// Sort priority.
    pub priority: u32,
    /// Pass hash.
    pub hash: u32,
    /// Blending on target 0.
    pub transparent: bool,
    /// Batching scheme.
    pub batching: BatchingScheme,
    /// The pipeline state created for this sub-model's vertex layout.
    pub pipeline_state: PipelineStateId,
    /// The pass binding layout.
    pub pass_layout: BindingLayoutId,
    /// Pre-recorded draw: pipeline state, binding sets, input assembler, draw.
    pub package: CommandPackage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PreparedKey {
    render_pass: RenderPassId,
    global_layout: BindingLayoutId,
    local_layout: BindingLayoutId,
    hash: u32,
    generation: u64,
}

/// One mesh drawn with one material.
#[derive(Debug)]
pub struct SubModel {
    device: Arc<dyn GraphicsDevice>,
    mesh: Mesh,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    input_assembler: InputAssemblerId,
    input_assembler_info: InputAssemblerInfo,
    material: MaterialSlot,
    prepared: Vec<PreparedSet>,
    dirty: bool,
    destroyed: bool,
}

#[derive(Debug)]
struct PreparedSet {
    key: PreparedKey,
    passes: Vec<PassSnapshot>,
}

impl SubModel {
    /// Uploads `mesh` and creates its input assembler.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        mesh: Mesh,
        material: MaterialSlot,
    ) -> Result<Self, ResourceError> {
        let vertex_buffer = device.create_buffer(&BufferInfo::vertex(
            "sub-model-vertices",
            mesh.vertices.len() as u64,
            mesh.stride,
        ))?;
        let release = |device: &dyn GraphicsDevice, index: Option<BufferId>| {
            if let Some(index) = index {
                device.destroy_buffer(index);
            }
            device.destroy_buffer(vertex_buffer);
        };
        if let Err(e) = device.update_buffer(vertex_buffer, 0, &mesh.vertices) {
            release(device.as_ref(), None);
            return Err(e);
        }

        let index_buffer = if mesh.indices.is_empty() {
            None
        } else {
            let bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
            let created = device
                .create_buffer(&BufferInfo::index("sub-model-indices", bytes.len() as u64, 2))
                .and_then(|id| match device.update_buffer(id, 0, bytes) {
                    Ok(()) => Ok(id),
                    Err(e) => {
                        device.destroy_buffer(id);
                        Err(e)
                    }
                });
            match created {
                Ok(id) => Some(id),
                Err(e) => {
                    release(device.as_ref(), None);
                    return Err(e);
                }
            }
        };

        let input_assembler_info = InputAssemblerInfo {
            attributes: mesh.attributes.clone(),
            vertex_buffer,
            vertex_stride: mesh.stride,
            index_buffer,
            index_format: IndexFormat::Uint16,
            vertex_count: mesh.vertex_count(),
            index_count: mesh.index_count(),
            instance_count: 1,
        };
        let input_assembler = match device.create_input_assembler(&input_assembler_info) {
            Ok(ia) => ia,
            Err(e) => {
                release(device.as_ref(), index_buffer);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            mesh,
            vertex_buffer,
            index_buffer,
            input_assembler,
            input_assembler_info,
            material,
            prepared: Vec::new(),
            dirty: true,
            destroyed: false,
        })
    }

    /// The CPU copy of the geometry.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// The input assembler.
    pub fn input_assembler(&self) -> InputAssemblerId {
        self.input_assembler
    }

    /// The input assembler descriptor.
    pub fn input_assembler_info(&self) -> &InputAssemblerInfo {
        &self.input_assembler_info
    }

    /// The material slot.
    pub fn material(&self) -> &MaterialSlot {
        &self.material
    }

    /// The material instance, when the slot holds one.
    pub fn instance_mut(&mut self) -> Option<&mut MaterialInstance> {
        match &mut self.material {
            MaterialSlot::Instance(instance) => Some(instance),
            MaterialSlot::Shared(_) => None,
        }
    }

    /// Replaces the material. The pass snapshots are rebuilt on the next prepare.
    pub fn set_material(&mut self, material: MaterialSlot) {
        self.material = material;
        self.dirty = true;
    }

    /// Forces the pass snapshots to be rebuilt on the next prepare.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns `true` when the snapshots are stale.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The snapshots of the material passes prepared for `render_pass`, empty when
    /// the sub-model was not prepared for it.
    pub fn passes_for(&self, render_pass: RenderPassId) -> &[PassSnapshot] {
        self.prepared
            .iter()
            .find(|set| set.key.render_pass == render_pass)
            .map_or(&[], |set| set.passes.as_slice())
    }

    /// Rebuilds the pipeline states and pre-recorded draws of `render_pass` when the
    /// material or the layouts changed since they were built. Each render pass keeps
    /// its own set.
    pub fn prepare(
        &mut self,
        render_pass: RenderPassId,
        global_layout: BindingLayoutId,
        local_layout: BindingLayoutId,
    ) -> Result<(), MaterialError> {
        let (hash, generation) = match self.material.with(|m| (m.hash(), m.generation())) {
            Ok(state) => state,
            Err(e) => {
                self.release_passes();
                return Err(e);
            }
        };
        let key = PreparedKey {
            render_pass,
            global_layout,
            local_layout,
            hash,
            generation,
        };
        if self.dirty {
            self.release_passes();
            self.dirty = false;
        }
        // Sets built from an older material reference destroyed pass layouts.
        let device = Arc::clone(&self.device);
        self.prepared.retain(|set| {
            let current = set.key.hash == hash && set.key.generation == generation;
            if !current {
                for snapshot in &set.passes {
                    device.destroy_pipeline_state(snapshot.pipeline_state);
                }
            }
            current
        });
        let existing = self
            .prepared
            .iter()
            .position(|set| set.key.render_pass == render_pass);
        if let Some(i) = existing {
            if self.prepared[i].key == key {
                return Ok(());
            }
            let stale = self.prepared.swap_remove(i);
            for snapshot in stale.passes {
                self.device.destroy_pipeline_state(snapshot.pipeline_state);
            }
        }

        let ia = self.input_assembler;
        let ia_info = &self.input_assembler_info;
        let result = self.material.with(|material| {
            let mut snapshots: Vec<PassSnapshot> = Vec::with_capacity(material.pass_count());
            for (pass_index, pass) in material.passes().iter().enumerate() {
                let info =
                    pass.pipeline_state_info(ia_info, render_pass, global_layout, local_layout);
                let pipeline_state = match device.create_pipeline_state(&info) {
                    Ok(pso) => pso,
                    Err(e) => {
                        for s in &snapshots {
                            device.destroy_pipeline_state(s.pipeline_state);
                        }
                        return Err(MaterialError::from(e));
                    }
                };
                let package = match record_draw(
                    device.as_ref(),
                    pipeline_state,
                    global_layout,
                    pass.binding_layout(),
                    local_layout,
                    ia,
                    ia_info,
                ) {
                    Ok(package) => package,
                    Err(e) => {
                        device.destroy_pipeline_state(pipeline_state);
                        for s in &snapshots {
                            device.destroy_pipeline_state(s.pipeline_state);
                        }
                        return Err(e.into());
                    }
                };
                snapshots.push(PassSnapshot {
                    pass_index,
                    phase: pass.phase(),
                    priority: pass.priority(),
                    hash: pass.hash(),
                    transparent: pass.is_transparent(),
                    batching: pass.batching(),
                    pipeline_state,
                    pass_layout: pass.binding_layout(),
                    package,
                });
            }
            Ok(snapshots)
        })?;

        match result {
            Ok(passes) => {
                self.prepared.push(PreparedSet { key, passes });
                Ok(())
            }
            Err(e) => {
                log::error!("SubModel: failed to prepare passes: {e}");
                Err(e)
            }
        }
    }

    fn release_passes(&mut self) {
        for set in self.prepared.drain(..) {
            for snapshot in set.passes {
                self.device.destroy_pipeline_state(snapshot.pipeline_state);
            }
        }
    }

    /// Releases GPU resources. A material instance is destroyed with it; a shared
    /// material is not.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.release_passes();
        self.device.destroy_input_assembler(self.input_assembler);
        if let Some(index) = self.index_buffer {
            self.device.destroy_buffer(index);
        }
        self.device.destroy_buffer(self.vertex_buffer);
        if let MaterialSlot::Instance(instance) = &mut self.material {
            instance.destroy();
        }
    }
}

impl Drop for SubModel {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Records the draw of one input assembler into a secondary package.
#[allow(clippy::too_many_arguments)]
pub fn record_draw(
    device: &dyn GraphicsDevice,
    pipeline_state: PipelineStateId,
    global_layout: BindingLayoutId,
    pass_layout: BindingLayoutId,
    local_layout: BindingLayoutId,
    input_assembler: InputAssemblerId,
    input_assembler_info: &InputAssemblerInfo,
) -> Result<CommandPackage, ResourceError> {
    let mut cmd = device.create_command_buffer(&CommandBufferInfo {
        label: Some("sub-model-draw".to_string()),
        level: CommandBufferLevel::Secondary,
    })?;
    cmd.begin();
    cmd.bind_pipeline_state(pipeline_state);
    cmd.bind_binding_layout(SET_GLOBAL, global_layout);
    cmd.bind_binding_layout(SET_PASS, pass_layout);
    cmd.bind_binding_layout(SET_LOCAL, local_layout);
    cmd.bind_input_assembler(input_assembler);
    cmd.draw(DrawInfo::from_input_assembler(input_assembler_info));
    cmd.end();
    let package = cmd.package();
    device.destroy_command_buffer(cmd.id());
    Ok(package)
}

/// A renderable: sub-models sharing one world transform.
#[derive(Debug)]
pub struct Model {
    device: Arc<dyn GraphicsDevice>,
    name: String,
    /// Disabled models are not collected.
    pub enabled: bool,
    /// Visibility bits, matched against the view's mask.
    pub visibility: u32,
    /// Whether the model projects a planar shadow.
    pub cast_shadow: bool,
    /// Whether passes with [`BatchingScheme::Dynamic`] may be merged.
    pub dynamic_batching: bool,
    world: Mat4,
    local: LocalBinding,
    local_dirty: bool,
    sub_models: Vec<SubModel>,
}

impl Model {
    /// An enabled, visible model without sub-models.
    pub fn new(device: Arc<dyn GraphicsDevice>, name: &str) -> Result<Self, ResourceError> {
        let local = LocalBinding::new(Arc::clone(&device), name, &Mat4::IDENTITY)?;
        Ok(Self {
            device,
            name: name.to_string(),
            enabled: true,
            visibility: VISIBILITY_DEFAULT,
            cast_shadow: false,
            dynamic_batching: false,
            world: Mat4::IDENTITY,
            local,
            local_dirty: false,
            sub_models: Vec::new(),
        })
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a sub-model drawing `mesh` with `material`. Returns its index.
    pub fn add_sub_model(
        &mut self,
        mesh: Mesh,
        material: MaterialSlot,
    ) -> Result<usize, ResourceError> {
        let sub_model = SubModel::new(Arc::clone(&self.device), mesh, material)?;
        self.sub_models.push(sub_model);
        Ok(self.sub_models.len() - 1)
    }

    /// Adds a sub-model using a shared material.
    pub fn add_shared(
        &mut self,
        mesh: Mesh,
        material: &SharedMaterial,
    ) -> Result<usize, ResourceError> {
        self.add_sub_model(mesh, MaterialSlot::Shared(Arc::clone(material)))
    }

    /// The sub-models.
    pub fn sub_models(&self) -> &[SubModel] {
        &self.sub_models
    }

    /// Sub-model `index`.
    pub fn sub_model(&self, index: usize) -> Option<&SubModel> {
        self.sub_models.get(index)
    }

    /// Mutable sub-model `index`.
    pub fn sub_model_mut(&mut self, index: usize) -> Option<&mut SubModel> {
        self.sub_models.get_mut(index)
    }

    /// The world transform.
    pub fn world(&self) -> &Mat4 {
        &self.world
    }

    /// Sets the world transform, uploaded on the next prepare.
    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
        self.local_dirty = true;
    }

    /// The world-space origin of the model.
    pub fn world_position(&self) -> Vec3 {
        self.world.translation()
    }

    /// The layout bound at set 2.
    pub fn local_layout(&self) -> BindingLayoutId {
        self.local.layout()
    }

    /// Uploads the world matrix if it changed and prepares every sub-model for
    /// `render_pass`. A failing sub-model is logged and left without passes; the
    /// others are still prepared and the first error is returned.
    pub fn prepare(
        &mut self,
        render_pass: RenderPassId,
        global_layout: BindingLayoutId,
    ) -> Result<(), MaterialError> {
        if self.local_dirty {
            self.local.write(&self.world)?;
            self.local_dirty = false;
        }
        let local_layout = self.local.layout();
        let mut first_error = None;
        for (i, sub_model) in self.sub_models.iter_mut().enumerate() {
            if let Err(e) = sub_model.prepare(render_pass, global_layout, local_layout) {
                log::warn!("Model '{}': sub-model {i} not prepared: {e}", self.name);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Releases the sub-models and the local binding.
    pub fn destroy(&mut self) {
        for sub_model in &mut self.sub_models {
            sub_model.destroy();
        }
        self.local.destroy();
    }
}

