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

//! Dynamic batching: sub-models sharing a pass are pre-transformed on the CPU and
//! drawn with a single call.

use std::sync::Arc;

use ahash::AHashMap;
use prism_core::math::Mat4;
use prism_core::renderer::{
    BindingLayoutId, BufferId, BufferInfo, CommandBuffer, DrawInfo, GraphicsDevice, IndexFormat,
    InputAssemblerId, InputAssemblerInfo, PipelineStateId, ResourceError, VertexAttribute,
};
use prism_data::material::{SET_GLOBAL, SET_LOCAL, SET_PASS};
use prism_data::scene::{LocalBinding, PassSnapshot, SubModel};

/// Identifies a batch: the pass hash and the vertex layout hash.
pub type BatchKey = (u32, u32);

#[derive(Debug)]
struct GpuBatch {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    input_assembler: InputAssemblerId,
    vertex_capacity: u64,
    index_capacity: u64,
    index_format: IndexFormat,
}

/// The merged geometry of every sub-model drawn with one pass this frame.
#[derive(Debug)]
pub struct BatchedBuffer {
    device: Arc<dyn GraphicsDevice>,
    key: BatchKey,
    attributes: Vec<VertexAttribute>,
    stride: u32,
    pipeline_state: PipelineStateId,
    pass_layout: BindingLayoutId,
    local: LocalBinding,
    vertices: Vec<u8>,
    indices: Vec<u32>,
    vertex_count: u32,
    merged: usize,
    gpu: Option<GpuBatch>,
}

impl BatchedBuffer {
    fn new(
        device: Arc<dyn GraphicsDevice>,
        key: BatchKey,
        sub_model: &SubModel,
        snapshot: &PassSnapshot,
    ) -> Result<Self, ResourceError> {
        let local = LocalBinding::new(Arc::clone(&device), "batch-local", &Mat4::IDENTITY)?;
        let info = sub_model.input_assembler_info();
        Ok(Self {
            device,
            key,
            attributes: info.attributes.clone(),
            stride: info.vertex_stride,
            pipeline_state: snapshot.pipeline_state,
            pass_layout: snapshot.pass_layout,
            local,
            vertices: Vec::new(),
            indices: Vec::new(),
            vertex_count: 0,
            merged: 0,
            gpu: None,
        })
    }

    /// The batch key.
    pub fn key(&self) -> BatchKey {
        self.key
    }

    /// Appends the geometry of `sub_model` transformed by `world`. Returns `false` when
    /// the mesh has no position attribute to transform.
    pub fn merge(&mut self, sub_model: &SubModel, snapshot: &PassSnapshot, world: &Mat4) -> bool {
        let mesh = sub_model.mesh();
        let Some(vertices) = mesh.transformed_vertices(world) else {
            log::warn!("BatchedBuffer: mesh without a float3 position cannot be batched");
            return false;
        };
        let base = self.vertex_count;
        let count = mesh.vertex_count();
        if mesh.indices.is_empty() {
            self.indices.extend((0..count).map(|i| base + i));
        } else {
            self.indices
                .extend(mesh.indices.iter().map(|&i| base + u32::from(i)));
        }
        self.vertices.extend_from_slice(&vertices);
        self.vertex_count += count;
        self.pipeline_state = snapshot.pipeline_state;
        self.pass_layout = snapshot.pass_layout;
        self.merged += 1;
        true
    }

    /// Number of sub-models merged since the last clear.
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Number of merged vertices.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of merged indices.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    fn index_format(&self) -> IndexFormat {
        if self.vertex_count <= u32::from(u16::MAX) + 1 {
            IndexFormat::Uint16
        } else {
            IndexFormat::Uint32
        }
    }

    fn index_bytes(&self, format: IndexFormat) -> Vec<u8> {
        match format {
            IndexFormat::Uint16 => {
                let narrow: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexFormat::Uint32 => bytemuck::cast_slice(&self.indices).to_vec(),
        }
    }

    fn input_assembler_info(
        &self,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        index_format: IndexFormat,
    ) -> InputAssemblerInfo {
        InputAssemblerInfo {
            attributes: self.attributes.clone(),
            vertex_buffer,
            vertex_stride: self.stride,
            index_buffer: Some(index_buffer),
            index_format,
            vertex_count: self.vertex_count,
            index_count: self.index_count(),
            instance_count: 1,
        }
    }

    fn release_gpu(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            self.device.destroy_input_assembler(gpu.input_assembler);
            self.device.destroy_buffer(gpu.index_buffer);
            self.device.destroy_buffer(gpu.vertex_buffer);
        }
    }

    fn allocate(
        &mut self,
        vertex_bytes: u64,
        index_bytes: u64,
        format: IndexFormat,
    ) -> Result<(), ResourceError> {
        self.release_gpu();
        let vertex_capacity = vertex_bytes.next_power_of_two();
        let index_capacity = index_bytes.next_power_of_two();
        let stride = match format {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        };
        let vertex_buffer = self.device.create_buffer(&BufferInfo::vertex(
            "batch-vertices",
            vertex_capacity,
            self.stride,
        ))?;
        let index_buffer = match self.device.create_buffer(&BufferInfo::index(
            "batch-indices",
            index_capacity,
            stride,
        )) {
            Ok(id) => id,
            Err(e) => {
                self.device.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };
        let info = self.input_assembler_info(vertex_buffer, index_buffer, format);
        let input_assembler = match self.device.create_input_assembler(&info) {
            Ok(id) => id,
            Err(e) => {
                self.device.destroy_buffer(index_buffer);
                self.device.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };
        self.gpu = Some(GpuBatch {
            vertex_buffer,
            index_buffer,
            input_assembler,
            vertex_capacity,
            index_capacity,
            index_format: format,
        });
        Ok(())
    }

    /// Writes the merged geometry to the GPU, growing the buffers when needed.
    pub fn upload(&mut self) -> Result<(), ResourceError> {
        if self.merged == 0 {
            return Ok(());
        }
        let format = self.index_format();
        let index_bytes = self.index_bytes(format);
        let vertex_len = self.vertices.len() as u64;
        let index_len = index_bytes.len() as u64;
        let fits = self.gpu.as_ref().is_some_and(|gpu| {
            gpu.index_format == format
                && gpu.vertex_capacity >= vertex_len
                && gpu.index_capacity >= index_len
        });
        if !fits {
            self.allocate(vertex_len, index_len, format)?;
        }
        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        self.device
            .update_buffer(gpu.vertex_buffer, 0, &self.vertices)?;
        self.device.update_buffer(gpu.index_buffer, 0, &index_bytes)
    }

    /// Records the merged draw. Nothing is recorded before the first upload.
    pub fn record(&self, cmd: &mut CommandBuffer, global_layout: BindingLayoutId) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        if self.merged == 0 {
            return;
        }
        cmd.bind_pipeline_state(self.pipeline_state);
        cmd.bind_binding_layout(SET_GLOBAL, global_layout);
        cmd.bind_binding_layout(SET_PASS, self.pass_layout);
        cmd.bind_binding_layout(SET_LOCAL, self.local.layout());
        cmd.bind_input_assembler(gpu.input_assembler);
        cmd.draw(DrawInfo {
            vertex_count: self.vertex_count,
            first_vertex: 0,
            index_count: self.index_count(),
            first_index: 0,
            instance_count: 1,
        });
    }

    /// Forgets the merged geometry, keeping the GPU buffers for the next frame.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.vertex_count = 0;
        self.merged = 0;
    }

    /// Releases the GPU buffers and the identity local binding.
    pub fn destroy(&mut self) {
        self.release_gpu();
        self.local.destroy();
    }
}

impl Drop for BatchedBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Batches of the current frame, drawn in the order they were first merged into.
#[derive(Debug)]
pub struct BatchedQueue {
    device: Arc<dyn GraphicsDevice>,
    batches: Vec<BatchedBuffer>,
    lookup: AHashMap<BatchKey, usize>,
    order: Vec<usize>,
}

impl BatchedQueue {
    /// An empty queue.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            batches: Vec::new(),
            lookup: AHashMap::new(),
            order: Vec::new(),
        }
    }

    /// Merges `sub_model` drawn with `snapshot` at `world`. Blended passes are refused
    /// and must go through the transparent queue.
    pub fn merge(
        &mut self,
        sub_model: &SubModel,
        snapshot: &PassSnapshot,
        world: &Mat4,
    ) -> Result<bool, ResourceError> {
        if snapshot.transparent {
            return Ok(false);
        }
        let key = (
            snapshot.hash,
            sub_model.input_assembler_info().layout_hash(),
        );
        let index = match self.lookup.get(&key) {
            Some(&index) => index,
            None => {
                let batch =
                    BatchedBuffer::new(Arc::clone(&self.device), key, sub_model, snapshot)?;
                self.batches.push(batch);
                let index = self.batches.len() - 1;
                self.lookup.insert(key, index);
                index
            }
        };
        let batch = &mut self.batches[index];
        let first = batch.merged() == 0;
        if !batch.merge(sub_model, snapshot, world) {
            return Ok(false);
        }
        if first {
            self.order.push(index);
        }
        Ok(true)
    }

    /// Uploads every batch used this frame.
    pub fn upload(&mut self) -> Result<(), ResourceError> {
        for &index in &self.order {
            self.batches[index].upload()?;
        }
        Ok(())
    }

    /// Records one draw per batch, in first-merge order.
    pub fn record(&self, cmd: &mut CommandBuffer, global_layout: BindingLayoutId) {
        for &index in &self.order {
            self.batches[index].record(cmd, global_layout);
        }
    }

    /// The batches used this frame, in draw order.
    pub fn batches(&self) -> impl Iterator<Item = &BatchedBuffer> {
        self.order.iter().map(|&i| &self.batches[i])
    }

    /// Number of draws the queue records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when nothing was merged.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Starts a new frame. Batches left unused during the previous frame are released.
    pub fn clear(&mut self) {
        let before = self.batches.len();
        self.batches.retain(|b| b.merged() > 0);
        if self.batches.len() != before {
            log::debug!(
                "BatchedQueue: released {} idle batches",
                before - self.batches.len()
            );
            self.lookup = self
                .batches
                .iter()
                .enumerate()
                .map(|(i, b)| (b.key(), i))
                .collect();
        }
        for batch in &mut self.batches {
            batch.clear();
        }
        self.order.clear();
    }

    /// Releases every batch.
    pub fn destroy(&mut self) {
        self.batches.clear();
        self.lookup.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use approx::assert_relative_eq;
    use prism_core::math::{LinearRgba, Rect};
    use prism_core::renderer::{ClearFlags, CommandBufferId, CommandBufferInfo};
    use prism_data::builtin::EFFECT_UNLIT;
    use prism_data::scene::{Mesh, Model};

    fn merge_all(queue: &mut BatchedQueue, fx: &Fixture, models: &[Model]) -> Vec<bool> {
        models
            .iter()
            .map(|model| {
                let sub_model = &model.sub_models()[0];
                let snapshot = &sub_model.passes_for(fx.render_pass)[0];
                queue.merge(sub_model, snapshot, model.world()).unwrap()
            })
            .collect()
    }

    #[test]
    fn same_pass_merges_into_one_draw() {
        let fx = Fixture::new();
        let material = fx.material(EFFECT_UNLIT, 0);
        let models: Vec<Model> = (0..3)
            .map(|i| fx.model(&material, Mesh::quad(1.0), i as f32))
            .collect();

        let mut queue = BatchedQueue::new(Arc::clone(&fx.device));
        assert_eq!(merge_all(&mut queue, &fx, &models), [true, true, true]);
        assert_eq!(queue.len(), 1);
        let batch = queue.batches().next().unwrap();
        assert_eq!(batch.merged(), 3);
        assert_eq!(batch.vertex_count(), 12);
        assert_eq!(batch.index_count(), 18);

        queue.upload().unwrap();
        let mut cmd = CommandBuffer::new(CommandBufferId(0), &CommandBufferInfo::default());
        let window = fx.device.main_window().unwrap();
        cmd.begin();
        cmd.begin_render_pass(
            window.framebuffer,
            window.render_pass,
            Rect::new(0, 0, window.width, window.height),
            ClearFlags::EMPTY,
            &[],
            1.0,
            0,
        );
        queue.record(&mut cmd, fx.global_layout);
        cmd.end_render_pass();
        cmd.end();
        assert_eq!(cmd.stats().draw_calls, 1);
        assert_eq!(cmd.stats().triangles, 6);
    }

    #[test]
    fn insertion_order_only_changes_the_draw_order() {
        let fx = Fixture::new();
        let plain = fx.material(EFFECT_UNLIT, 0);
        let red = fx.material(EFFECT_UNLIT, 0);
        assert!(red.write().unwrap().set_property(
            "mainColor",
            LinearRgba::rgb(1.0, 0.0, 0.0).into(),
            None
        ));
        let mut models: Vec<Model> = (0..4)
            .map(|i| {
                let material = if i % 2 == 0 { &plain } else { &red };
                fx.model(material, Mesh::quad(1.0), i as f32)
            })
            .collect();

        let draws = |models: &[Model]| {
            let mut queue = BatchedQueue::new(Arc::clone(&fx.device));
            merge_all(&mut queue, &fx, models);
            let merged: Vec<usize> = queue.batches().map(BatchedBuffer::merged).collect();
            let first_x: f32 = queue
                .batches()
                .next()
                .map(|b| bytemuck::pod_read_unaligned(&b.vertices[0..4]))
                .unwrap();
            (queue.len(), merged, first_x)
        };

        let (len, merged, first_x) = draws(&models);
        assert_eq!((len, merged), (2, vec![2, 2]));
        assert_relative_eq!(first_x, -0.5);

        models.reverse();
        let (len, merged, first_x) = draws(&models);
        assert_eq!((len, merged), (2, vec![2, 2]));
        // the red quad at x = 3 now opens the first batch
        assert_relative_eq!(first_x, 2.5);
    }

    #[test]
    fn merged_vertices_are_in_world_space() {
        let fx = Fixture::new();
        let material = fx.material(EFFECT_UNLIT, 0);
        let models = [
            fx.model(&material, Mesh::quad(1.0), 0.0),
            fx.model(&material, Mesh::quad(1.0), 10.0),
        ];
        let mut queue = BatchedQueue::new(Arc::clone(&fx.device));
        merge_all(&mut queue, &fx, &models);
        let batch = queue.batches().next().unwrap();
        let stride = batch.stride as usize;
        let x0: f32 = bytemuck::pod_read_unaligned(&batch.vertices[0..4]);
        let x4: f32 = bytemuck::pod_read_unaligned(&batch.vertices[4 * stride..4 * stride + 4]);
        assert_relative_eq!(x0, -0.5);
        assert_relative_eq!(x4, 9.5);
        // second quad indices are offset by the first quad's vertices
        assert_eq!(batch.indices[6..], [4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn non_indexed_meshes_get_sequential_indices() {
        let fx = Fixture::new();
        let material = fx.material(EFFECT_UNLIT, 0);
        let models = [
            fx.model(&material, Mesh::triangle(), 0.0),
            fx.model(&material, Mesh::triangle(), 1.0),
        ];
        let mut queue = BatchedQueue::new(Arc::clone(&fx.device));
        merge_all(&mut queue, &fx, &models);
        let batch = queue.batches().next().unwrap();
        assert_eq!(batch.indices, [0, 1, 2, 3, 4, 5]);
        assert_eq!(batch.index_format(), IndexFormat::Uint16);
    }

    #[test]
    fn transparent_passes_are_refused() {
        let fx = Fixture::new();
        let material = fx.material(EFFECT_UNLIT, 1);
        let models = [fx.model(&material, Mesh::quad(1.0), 0.0)];
        let mut queue = BatchedQueue::new(Arc::clone(&fx.device));
        assert_eq!(merge_all(&mut queue, &fx, &models), [false]);
        assert!(queue.is_empty());
    }

    #[test]
    fn idle_batches_are_released_after_a_frame() {
        let fx = Fixture::new();
        let material = fx.material(EFFECT_UNLIT, 0);
        let models = [fx.model(&material, Mesh::quad(1.0), 0.0)];
        let mut queue = BatchedQueue::new(Arc::clone(&fx.device));
        merge_all(&mut queue, &fx, &models);
        queue.upload().unwrap();

        // used last frame: kept, but emptied
        queue.clear();
        assert_eq!(queue.batches.len(), 1);
        assert!(queue.is_empty());

        // idle for a frame: released
        queue.clear();
        assert!(queue.batches.is_empty());
        assert!(queue.lookup.is_empty());
    }
}
