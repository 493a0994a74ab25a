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

//! The wgpu [`GraphicsDevice`] implementation.
//!
//! Stage sources are WGSL with a `main` entry point. A binding unit `b` maps to wgpu
//! binding `2 * b`, and the sampler of a sampled texture sits at `2 * b + 1`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex, MutexGuard};

use ahash::AHashMap;
use prism_core::math::{Extent3D, LinearRgba, Rect};
use prism_core::renderer::{
    BindingLayoutId, BindingLayoutInfo, BindingType, BindingUnit, BufferId, BufferInfo,
    BufferTextureCopy, ClearFlags, CommandBuffer, CommandBufferId, CommandBufferInfo,
    CommandBufferLevel, CommandPackage, CommandStats, DeviceCaps, DeviceInfo, Filter, FrameStats,
    FramebufferId, FramebufferInfo, GfxCommand, GraphicsAdapterInfo, GraphicsBackendType,
    GraphicsDevice, InputAssemblerId, InputAssemblerInfo, LoadOp, PipelineError,
    PipelineStateId, PipelineStateInfo, RenderError, RenderPassId, RenderPassInfo,
    RendererDeviceType, ResourceError, SamplerId, SamplerInfo, ShaderError, ShaderId,
    ShaderInfo, ShaderStageKind, StoreOp, TextureFormat, TextureId, TextureInfo,
    TextureSubresource, TextureType, TextureUsage, TextureViewId, TextureViewInfo, WindowTarget,
};

use super::context::{adapter_info, WgpuContext};
use super::conversions::{color_targets, depth_stencil_state, surface_format, texture_format, IntoWgpu};

#[derive(Debug)]
struct BufferEntry {
    buffer: wgpu::Buffer,
    info: BufferInfo,
}

#[derive(Debug)]
struct TextureEntry {
    texture: wgpu::Texture,
    info: TextureInfo,
    /// Whole-texture view used when the texture is a framebuffer attachment.
    attachment_view: wgpu::TextureView,
}

#[derive(Debug)]
struct ShaderEntry {
    info: ShaderInfo,
    modules: Vec<(ShaderStageKind, wgpu::ShaderModule)>,
}

#[derive(Debug)]
struct BindingLayoutEntry {
    layout: wgpu::BindGroupLayout,
    units: Vec<BindingUnit>,
    /// Rebuilt lazily after every update.
    group: Option<wgpu::BindGroup>,
}

#[derive(Debug)]
struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
}

/// Every object created through the device, keyed by id.
#[derive(Debug, Default)]
struct WgpuResources {
    buffers: AHashMap<usize, BufferEntry>,
    textures: AHashMap<usize, TextureEntry>,
    views: AHashMap<usize, wgpu::TextureView>,
    samplers: AHashMap<usize, wgpu::Sampler>,
    shaders: AHashMap<usize, ShaderEntry>,
    binding_layouts: AHashMap<usize, BindingLayoutEntry>,
    pipelines: AHashMap<usize, PipelineEntry>,
    input_assemblers: AHashMap<usize, InputAssemblerInfo>,
    render_passes: AHashMap<usize, RenderPassInfo>,
    framebuffers: AHashMap<usize, FramebufferInfo>,
}

impl WgpuResources {
    fn len(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.views.len()
            + self.samplers.len()
            + self.shaders.len()
            + self.binding_layouts.len()
            + self.pipelines.len()
            + self.input_assemblers.len()
            + self.render_passes.len()
            + self.framebuffers.len()
    }
}

#[derive(Debug)]
struct NullTexture {
    ty: TextureType,
    texture: TextureId,
    view: TextureViewId,
}

/// State that only exists between `initialize` and `destroy`.
#[derive(Debug)]
struct WgpuState {
    context: WgpuContext,
    caps: DeviceCaps,
    window: Option<WindowTarget>,
    null_textures: Vec<NullTexture>,
    default_sampler: wgpu::Sampler,
    /// Packages referenced by this frame's submissions.
    retained: Vec<CommandPackage>,
    pending: CommandStats,
    pending_buffers: u32,
    stats: FrameStats,
}

/// A [`GraphicsDevice`] backed by wgpu.
#[derive(Debug)]
pub struct WgpuDevice {
    instance: wgpu::Instance,
    state: Mutex<Option<WgpuState>>,
    resources: Mutex<WgpuResources>,
    next_id: AtomicUsize,
    next_command_buffer_id: AtomicU64,
}

impl Default for WgpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl WgpuDevice {
    /// Creates an uninitialized device.
    pub fn new() -> Self {
        Self {
            instance: wgpu::Instance::new(&wgpu::InstanceDescriptor::default()),
            state: Mutex::new(None),
            resources: Mutex::new(WgpuResources::default()),
            next_id: AtomicUsize::new(0),
            next_command_buffer_id: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Option<WgpuState>>, ResourceError> {
        self.state
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("Failed to lock WgpuState: {e}")))
    }

    fn lock_resources(&self) -> Result<MutexGuard<'_, WgpuResources>, ResourceError> {
        self.resources
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("Failed to lock WgpuResources: {e}")))
    }

    /// Cloned device and queue handles. The state lock is released on return.
    fn gpu(&self) -> Result<(wgpu::Device, wgpu::Queue, DeviceCaps), ResourceError> {
        let state = self.lock_state()?;
        let state = state
            .as_ref()
            .ok_or_else(|| ResourceError::BackendError("WgpuDevice is not initialized".into()))?;
        Ok((
            state.context.device.clone(),
            state.context.queue.clone(),
            state.caps,
        ))
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn wgpu_format(format: TextureFormat) -> Result<wgpu::TextureFormat, ResourceError> {
        texture_format(format)
            .ok_or_else(|| ResourceError::Unsupported(format!("{format:?} on wgpu")))
    }

    // --- Initialization helpers ---

    fn create_null_texture(&self, ty: TextureType) -> Result<NullTexture, ResourceError> {
        let layers = if ty == TextureType::Cube { 6 } else { 1 };
        let info = TextureInfo {
            ty,
            depth_or_layers: layers,
            ..TextureInfo::sampled_2d("null", TextureFormat::Rgba8Unorm, 2, 2)
        };
        let texture = self.create_texture(&info)?;
        let pixels = [0u8, 0, 0, 255].repeat(4 * layers as usize);
        let region = BufferTextureCopy {
            texture_extent: Extent3D::new_2d(2, 2),
            texture_subresource: TextureSubresource {
                mip_level: 0,
                base_array_layer: 0,
                layer_count: layers,
            },
            ..BufferTextureCopy::default()
        };
        self.copy_buffers_to_texture(&[&pixels], texture, &[region])?;
        let view = self.create_texture_view(&TextureViewInfo::whole(texture, &info))?;
        Ok(NullTexture { ty, texture, view })
    }

    fn create_window_attachments(
        &self,
        render_pass: RenderPassId,
        width: u32,
        height: u32,
        color_format: TextureFormat,
        depth_stencil_format: Option<TextureFormat>,
    ) -> Result<WindowTarget, ResourceError> {
        let mut color_info =
            TextureInfo::attachment("main-window-color", color_format, width, height);
        color_info.usage |= TextureUsage::TRANSFER_SRC;
        let color_texture = self.create_texture(&color_info)?;
        let depth_stencil_texture = match depth_stencil_format {
            Some(format) => Some(self.create_texture(&TextureInfo::attachment(
                "main-window-depth",
                format,
                width,
                height,
            ))?),
            None => None,
        };
        let framebuffer = self.create_framebuffer(&FramebufferInfo {
            render_pass,
            color_textures: vec![color_texture],
            depth_stencil_texture,
        })?;
        Ok(WindowTarget {
            render_pass,
            framebuffer,
            color_texture,
            depth_stencil_texture,
            width,
            height,
            color_format,
            depth_stencil_format,
        })
    }

    fn destroy_window_attachments(&self, window: &WindowTarget) {
        self.destroy_framebuffer(window.framebuffer);
        self.destroy_texture(window.color_texture);
        if let Some(depth) = window.depth_stencil_texture {
            self.destroy_texture(depth);
        }
    }

    fn try_initialize(&self, info: &DeviceInfo, surface: Option<TextureFormat>) -> Result<(), ResourceError> {
        let (_, _, caps) = self.gpu()?;
        let null_2d = self.create_null_texture(TextureType::Tex2D)?;
        let null_cube = self.create_null_texture(TextureType::Cube)?;

        let color_format = surface.unwrap_or(info.color_format);
        let depth_format = if caps.supports_format(info.depth_stencil_format) {
            info.depth_stencil_format
        } else {
            TextureFormat::Depth24Plus
        };
        let render_pass = self.create_render_pass(&RenderPassInfo::simple(
            color_format,
            Some(depth_format),
            LoadOp::Clear,
        ))?;
        let window = self.create_window_attachments(
            render_pass,
            info.width.max(1),
            info.height.max(1),
            color_format,
            Some(depth_format),
        )?;

        if let Some(state) = self.lock_state()?.as_mut() {
            state.null_textures = vec![null_2d, null_cube];
            state.window = Some(window);
        }
        Ok(())
    }

    // --- Replay helpers ---

    fn bind_group(
        res: &mut WgpuResources,
        device: &wgpu::Device,
        default_sampler: &wgpu::Sampler,
        id: BindingLayoutId,
    ) -> Option<wgpu::BindGroup> {
        let entry = res.binding_layouts.get(&id.0)?;
        if let Some(group) = &entry.group {
            return Some(group.clone());
        }

        let mut entries = Vec::with_capacity(entry.units.len() * 2);
        for unit in &entry.units {
            match unit.ty {
                BindingType::UniformBuffer => {
                    let buffer = &res.buffers.get(&unit.buffer?.0)?.buffer;
                    entries.push(wgpu::BindGroupEntry {
                        binding: unit.binding * 2,
                        resource: buffer.as_entire_binding(),
                    });
                }
                BindingType::SampledTexture => {
                    let view = res.views.get(&unit.texture_view?.0)?;
                    let sampler = unit
                        .sampler
                        .and_then(|s| res.samplers.get(&s.0))
                        .unwrap_or(default_sampler);
                    entries.push(wgpu::BindGroupEntry {
                        binding: unit.binding * 2,
                        resource: wgpu::BindingResource::TextureView(view),
                    });
                    entries.push(wgpu::BindGroupEntry {
                        binding: unit.binding * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    });
                }
            }
        }
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Prism Bind Group"),
            layout: &entry.layout,
            entries: &entries,
        });
        if let Some(entry) = res.binding_layouts.get_mut(&id.0) {
            entry.group = Some(group.clone());
        }
        Some(group)
    }

    #[allow(clippy::too_many_arguments)]
    fn begin_pass(
        res: &WgpuResources,
        encoder: &mut wgpu::CommandEncoder,
        framebuffer: FramebufferId,
        render_pass: RenderPassId,
        flags: ClearFlags,
        colors: &[LinearRgba],
        depth: f32,
        stencil: u32,
    ) -> Option<wgpu::RenderPass<'static>> {
        let fb = res.framebuffers.get(&framebuffer.0)?;
        let pass = res.render_passes.get(&render_pass.0)?;

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = fb
            .color_textures
            .iter()
            .zip(&pass.color_attachments)
            .enumerate()
            .map(|(i, (texture, attachment))| {
                let view = &res.textures.get(&texture.0)?.attachment_view;
                let clear = colors.get(i).or(colors.last()).copied().unwrap_or_default();
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: load_op(attachment.load_op, flags.contains(ClearFlags::COLOR), clear.into_wgpu()),
                        store: store_op(attachment.store_op),
                    },
                })
            })
            .collect();

        let depth_stencil_attachment = match (fb.depth_stencil_texture, pass.depth_stencil_attachment) {
            (Some(texture), Some(attachment)) => {
                let view = &res.textures.get(&texture.0)?.attachment_view;
                let info = attachment.format.info();
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: info.has_depth.then(|| wgpu::Operations {
                        load: load_op(attachment.depth_load_op, flags.contains(ClearFlags::DEPTH), depth),
                        store: store_op(attachment.depth_store_op),
                    }),
                    stencil_ops: info.has_stencil.then(|| wgpu::Operations {
                        load: load_op(attachment.stencil_load_op, flags.contains(ClearFlags::STENCIL), stencil),
                        store: store_op(attachment.stencil_store_op),
                    }),
                })
            }
            _ => None,
        };

        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Prism Render Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        Some(pass.forget_lifetime())
    }

    fn replay(
        res: &mut WgpuResources,
        device: &wgpu::Device,
        default_sampler: &wgpu::Sampler,
        encoder: &mut wgpu::CommandEncoder,
        id: CommandBufferId,
        commands: &[GfxCommand],
    ) {
        let mut pass: Option<wgpu::RenderPass<'static>> = None;
        let mut indexed = false;
        for command in commands {
            match command {
                GfxCommand::BeginRenderPass {
                    framebuffer,
                    render_pass,
                    clear_flags,
                    clear_colors,
                    depth,
                    stencil,
                    render_area,
                } => {
                    drop(pass.take());
                    pass = Self::begin_pass(
                        res,
                        encoder,
                        *framebuffer,
                        *render_pass,
                        *clear_flags,
                        clear_colors,
                        *depth,
                        *stencil,
                    );
                    if let Some(p) = pass.as_mut() {
                        set_scissor(p, *render_area);
                    } else {
                        log::warn!("WgpuDevice: {id:?} begins a pass on unknown {framebuffer:?}");
                    }
                }
                GfxCommand::EndRenderPass => pass = None,
                GfxCommand::Execute(_) => {}
                other => {
                    let Some(p) = pass.as_mut() else {
                        log::warn!("WgpuDevice: {id:?} records {other:?} outside a render pass");
                        continue;
                    };
                    match other {
                        GfxCommand::BindPipelineState(pso) => match res.pipelines.get(&pso.0) {
                            Some(entry) => p.set_pipeline(&entry.pipeline),
                            None => log::warn!("WgpuDevice: {id:?} binds unknown {pso:?}"),
                        },
                        GfxCommand::BindBindingLayout { set, layout } => {
                            match Self::bind_group(res, device, default_sampler, *layout) {
                                Some(group) => p.set_bind_group(*set, &group, &[]),
                                None => log::warn!(
                                    "WgpuDevice: {layout:?} has unbound or unknown resources"
                                ),
                            }
                        }
                        GfxCommand::BindInputAssembler(ia) => {
                            let Some(info) = res.input_assemblers.get(&ia.0) else {
                                log::warn!("WgpuDevice: {id:?} binds unknown {ia:?}");
                                continue;
                            };
                            if let Some(vb) = res.buffers.get(&info.vertex_buffer.0) {
                                p.set_vertex_buffer(0, vb.buffer.slice(..));
                            }
                            indexed = false;
                            if let Some(ib) = info.index_buffer.and_then(|b| res.buffers.get(&b.0)) {
                                p.set_index_buffer(ib.buffer.slice(..), info.index_format.into_wgpu());
                                indexed = true;
                            }
                        }
                        GfxCommand::SetViewport(v) => p.set_viewport(
                            v.left as f32,
                            v.top as f32,
                            v.width as f32,
                            v.height as f32,
                            v.min_depth,
                            v.max_depth,
                        ),
                        GfxCommand::SetScissor(rect) => set_scissor(p, *rect),
                        GfxCommand::Draw(draw) => {
                            let instances = 0..draw.instance_count.max(1);
                            if indexed && draw.index_count > 0 {
                                p.draw_indexed(
                                    draw.first_index..draw.first_index + draw.index_count,
                                    0,
                                    instances,
                                );
                            } else {
                                p.draw(
                                    draw.first_vertex..draw.first_vertex + draw.vertex_count,
                                    instances,
                                );
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn load_op<V>(op: LoadOp, clear_requested: bool, value: V) -> wgpu::LoadOp<V> {
    match op {
        LoadOp::Clear if clear_requested => wgpu::LoadOp::Clear(value),
        LoadOp::Clear | LoadOp::Load | LoadOp::Discard => wgpu::LoadOp::Load,
    }
}

fn store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::Discard => wgpu::StoreOp::Discard,
    }
}

fn set_scissor(pass: &mut wgpu::RenderPass<'static>, rect: Rect) {
    pass.set_scissor_rect(rect.x.max(0) as u32, rect.y.max(0) as u32, rect.width, rect.height);
}

fn texel_copy_extent(info: &TextureInfo, region: &BufferTextureCopy) -> wgpu::Extent3d {
    let mut extent: wgpu::Extent3d = region.texture_extent.into_wgpu();
    if info.ty != TextureType::Tex3D {
        extent.depth_or_array_layers = region.texture_subresource.layer_count.max(1);
    }
    extent
}

fn texel_copy_origin(info: &TextureInfo, region: &BufferTextureCopy) -> wgpu::Origin3d {
    let mut origin: wgpu::Origin3d = region.texture_offset.into_wgpu();
    if info.ty != TextureType::Tex3D {
        origin.z = region.texture_subresource.base_array_layer;
    }
    origin
}

fn texel_copy_layout(info: &TextureInfo, region: &BufferTextureCopy) -> wgpu::TexelCopyBufferLayout {
    let format = info.format.info();
    let row_texels = if region.buffer_stride > 0 {
        region.buffer_stride
    } else {
        region.texture_extent.width
    };
    let rows = if region.buffer_image_height > 0 {
        region.buffer_image_height
    } else {
        region.texture_extent.height
    };
    wgpu::TexelCopyBufferLayout {
        offset: region.buffer_offset,
        bytes_per_row: Some(info.format.row_size(row_texels)),
        rows_per_image: Some(rows.div_ceil(format.block_height)),
    }
}

impl GraphicsDevice for WgpuDevice {
    fn initialize(&self, info: &DeviceInfo) -> Result<(), RenderError> {
        if self.is_initialized() {
            log::warn!("WgpuDevice: initialize called twice, ignoring");
            return Ok(());
        }
        let context = pollster::block_on(WgpuContext::new(&self.instance, info.window.clone(), info))?;
        let surface = context
            .surface
            .as_ref()
            .and_then(|s| surface_format(s.config.format));
        let default_sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Prism Default Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let caps = context.caps();
        *self.lock_state()? = Some(WgpuState {
            context,
            caps,
            window: None,
            null_textures: Vec::new(),
            default_sampler,
            retained: Vec::new(),
            pending: CommandStats::default(),
            pending_buffers: 0,
            stats: FrameStats::default(),
        });

        if let Err(e) = self.try_initialize(info, surface) {
            log::error!("WgpuDevice: initialization failed: {e}");
            self.destroy();
            return Err(RenderError::InitializationFailed(e.to_string()));
        }
        log::info!("WgpuDevice: initialized ({}x{})", info.width, info.height);
        Ok(())
    }

    fn destroy(&self) {
        let Ok(mut guard) = self.state.lock() else {
            log::error!("WgpuDevice: state mutex poisoned during destroy");
            return;
        };
        let Some(mut state) = guard.take() else {
            return;
        };
        drop(guard);

        for null in state.null_textures.drain(..) {
            self.destroy_texture_view(null.view);
            self.destroy_texture(null.texture);
        }
        if let Some(window) = state.window.take() {
            self.destroy_window_attachments(&window);
            self.destroy_render_pass(window.render_pass);
        }
        state.retained.clear();
        if let Err(e) = state.context.device.poll(wgpu::PollType::Wait) {
            log::warn!("WgpuDevice: failed to drain the queue: {e:?}");
        }
        let leaked = self.lock_resources().map_or(0, |res| res.len());
        if leaked > 0 {
            log::warn!("WgpuDevice: destroyed with {leaked} resources still alive");
        }
        drop(state);
        log::info!("WgpuDevice: destroyed");
    }

    fn is_initialized(&self) -> bool {
        self.lock_state().is_ok_and(|state| state.is_some())
    }

    fn resize(&self, width: u32, height: u32) {
        let Some(window) = self.main_window() else {
            return;
        };
        if (window.width, window.height) == (width, height) || width == 0 || height == 0 {
            return;
        }
        self.destroy_window_attachments(&window);
        match self.create_window_attachments(
            window.render_pass,
            width,
            height,
            window.color_format,
            window.depth_stencil_format,
        ) {
            Ok(target) => {
                if let Ok(mut state) = self.lock_state() {
                    if let Some(state) = state.as_mut() {
                        state.context.resize(width, height);
                        state.window = Some(target);
                    }
                }
                log::info!("WgpuDevice: resized to {width}x{height}");
            }
            Err(e) => log::error!("WgpuDevice: failed to resize main window: {e}"),
        }
    }

    fn adapter_info(&self) -> GraphicsAdapterInfo {
        match self.lock_state() {
            Ok(state) => match state.as_ref() {
                Some(state) => adapter_info(&state.context.adapter),
                None => GraphicsAdapterInfo {
                    name: "uninitialized".into(),
                    backend_type: GraphicsBackendType::Unknown,
                    device_type: RendererDeviceType::Unknown,
                },
            },
            Err(_) => GraphicsAdapterInfo {
                name: "unavailable".into(),
                backend_type: GraphicsBackendType::Unknown,
                device_type: RendererDeviceType::Unknown,
            },
        }
    }

    fn capabilities(&self) -> DeviceCaps {
        self.gpu().map(|(_, _, caps)| caps).unwrap_or_default()
    }

    fn null_texture_view(&self, ty: TextureType) -> Option<TextureViewId> {
        let state = self.lock_state().ok()?;
        state
            .as_ref()?
            .null_textures
            .iter()
            .find(|n| n.ty == ty)
            .map(|n| n.view)
    }

    fn main_window(&self) -> Option<WindowTarget> {
        self.lock_state().ok()?.as_ref()?.window
    }

    // --- Buffers ---

    fn create_buffer(&self, info: &BufferInfo) -> Result<BufferId, ResourceError> {
        let (device, _, _) = self.gpu()?;
        if info.size == 0 {
            return Err(ResourceError::InvalidDescriptor("zero-sized buffer".into()));
        }
        let size = info.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: info.label.as_deref(),
            size,
            usage: info.usage.into_wgpu(),
            mapped_at_creation: false,
        });
        let id = self.next_id();
        self.lock_resources()?.buffers.insert(
            id,
            BufferEntry {
                buffer,
                info: info.clone(),
            },
        );
        log::debug!("WgpuDevice: created buffer {:?} ({} bytes) as {id}", info.label, info.size);
        Ok(BufferId(id))
    }

    fn update_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let (_, queue, _) = self.gpu()?;
        let res = self.lock_resources()?;
        let entry = res.buffers.get(&id.0).ok_or(ResourceError::NotFound)?;
        if offset + data.len() as u64 > entry.info.size {
            return Err(ResourceError::OutOfBounds);
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            queue.write_buffer(&entry.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(
                (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize,
                0,
            );
            queue.write_buffer(&entry.buffer, offset, &padded);
        }
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) {
        if let Ok(mut res) = self.lock_resources() {
            if let Some(entry) = res.buffers.remove(&id.0) {
                entry.buffer.destroy();
            }
        }
    }

    // --- Textures and samplers ---

    fn create_texture(&self, info: &TextureInfo) -> Result<TextureId, ResourceError> {
        let (device, _, caps) = self.gpu()?;
        if info.width == 0 || info.height == 0 {
            return Err(ResourceError::InvalidDescriptor("zero-sized texture".into()));
        }
        if !caps.supports_format(info.format) {
            return Err(ResourceError::Unsupported(format!("{:?} textures", info.format)));
        }
        let largest = info.width.max(info.height);
        if largest > caps.limits.max_texture_size {
            return Err(ResourceError::LimitExceeded {
                limit: "max_texture_size",
                requested: u64::from(largest),
                max: u64::from(caps.limits.max_texture_size),
            });
        }
        let format = Self::wgpu_format(info.format)?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: info.label.as_deref(),
            size: wgpu::Extent3d {
                width: info.width,
                height: info.height,
                depth_or_array_layers: info.depth_or_layers.max(1),
            },
            mip_level_count: info.mip_levels.max(1),
            sample_count: info.samples.into_wgpu(),
            dimension: info.ty.into_wgpu(),
            format,
            usage: info.usage.into_wgpu(),
            view_formats: &[],
        });
        let attachment_view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            mip_level_count: Some(1),
            array_layer_count: Some(1),
            ..Default::default()
        });
        let id = self.next_id();
        self.lock_resources()?.textures.insert(
            id,
            TextureEntry {
                texture,
                info: info.clone(),
                attachment_view,
            },
        );
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) {
        if let Ok(mut res) = self.lock_resources() {
            if let Some(entry) = res.textures.remove(&id.0) {
                entry.texture.destroy();
            }
        }
    }

    fn create_texture_view(&self, info: &TextureViewInfo) -> Result<TextureViewId, ResourceError> {
        let format = Self::wgpu_format(info.format)?;
        let mut res = self.lock_resources()?;
        let entry = res.textures.get(&info.texture.0).ok_or(ResourceError::NotFound)?;
        if info.base_level + info.level_count > entry.info.mip_levels
            || info.base_layer + info.layer_count > entry.info.layer_count()
        {
            return Err(ResourceError::OutOfBounds);
        }
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: entry.info.label.as_deref(),
            format: Some(format),
            dimension: Some(info.ty.into_wgpu()),
            base_mip_level: info.base_level,
            mip_level_count: Some(info.level_count),
            base_array_layer: info.base_layer,
            array_layer_count: Some(info.layer_count),
            ..Default::default()
        });
        let id = self.next_id();
        res.views.insert(id, view);
        Ok(TextureViewId(id))
    }

    fn destroy_texture_view(&self, id: TextureViewId) {
        if let Ok(mut res) = self.lock_resources() {
            res.views.remove(&id.0);
        }
    }

    fn create_sampler(&self, info: &SamplerInfo) -> Result<SamplerId, ResourceError> {
        let (device, _, _) = self.gpu()?;
        if info.max_anisotropy == 0 || info.min_lod > info.max_lod {
            return Err(ResourceError::InvalidDescriptor(
                "sampler anisotropy or lod range".into(),
            ));
        }
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Prism Sampler"),
            address_mode_u: info.address_u.into_wgpu(),
            address_mode_v: info.address_v.into_wgpu(),
            address_mode_w: info.address_w.into_wgpu(),
            mag_filter: info.mag_filter.into_wgpu(),
            min_filter: info.min_filter.into_wgpu(),
            mipmap_filter: info.mip_filter.into_wgpu(),
            lod_min_clamp: info.min_lod,
            lod_max_clamp: info.max_lod,
            compare: info.compare.map(IntoWgpu::into_wgpu),
            anisotropy_clamp: info.max_anisotropy,
            border_color: None,
        });
        let id = self.next_id();
        self.lock_resources()?.samplers.insert(id, sampler);
        Ok(SamplerId(id))
    }

    fn destroy_sampler(&self, id: SamplerId) {
        if let Ok(mut res) = self.lock_resources() {
            res.samplers.remove(&id.0);
        }
    }

    // --- Pipeline objects ---

    fn create_shader(&self, info: &ShaderInfo) -> Result<ShaderId, ResourceError> {
        let (device, _, _) = self.gpu()?;
        if info.stages.is_empty() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "shader '{}' has no stages",
                info.name
            )));
        }
        let mut modules = Vec::with_capacity(info.stages.len());
        for stage in &info.stages {
            if stage.source.lines().any(|l| l.trim_start().starts_with("#if")) {
                return Err(ShaderError::CompilationError {
                    label: info.name.clone(),
                    details: format!("{:?} stage has unresolved preprocessor directives", stage.stage),
                }
                .into());
            }
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&info.name),
                source: wgpu::ShaderSource::Wgsl(stage.source.as_str().into()),
            });
            modules.push((stage.stage, module));
        }
        let id = self.next_id();
        self.lock_resources()?.shaders.insert(
            id,
            ShaderEntry {
                info: info.clone(),
                modules,
            },
        );
        log::debug!("WgpuDevice: compiled shader '{}' as {id}", info.name);
        Ok(ShaderId(id))
    }

    fn destroy_shader(&self, id: ShaderId) {
        if let Ok(mut res) = self.lock_resources() {
            res.shaders.remove(&id.0);
        }
    }

    fn create_binding_layout(
        &self,
        info: &BindingLayoutInfo,
    ) -> Result<BindingLayoutId, ResourceError> {
        let (device, _, _) = self.gpu()?;
        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let mut entries = Vec::with_capacity(info.units.len() * 2);
        for unit in &info.units {
            match unit.ty {
                BindingType::UniformBuffer => entries.push(wgpu::BindGroupLayoutEntry {
                    binding: unit.binding * 2,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }),
                BindingType::SampledTexture => {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: unit.binding * 2,
                        visibility,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    });
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: unit.binding * 2 + 1,
                        visibility,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    });
                }
            }
        }
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: info.label.as_deref(),
            entries: &entries,
        });
        let id = self.next_id();
        self.lock_resources()?.binding_layouts.insert(
            id,
            BindingLayoutEntry {
                layout,
                units: info.units.clone(),
                group: None,
            },
        );
        Ok(BindingLayoutId(id))
    }

    fn update_binding_layout(
        &self,
        id: BindingLayoutId,
        units: &[BindingUnit],
    ) -> Result<(), ResourceError> {
        let null_view = self.null_texture_view(TextureType::Tex2D);
        let mut res = self.lock_resources()?;
        for unit in units {
            let known = match unit.ty {
                BindingType::UniformBuffer => unit.buffer.is_none_or(|b| res.buffers.contains_key(&b.0)),
                BindingType::SampledTexture => {
                    unit.texture_view.is_none_or(|v| res.views.contains_key(&v.0))
                }
            };
            if !known {
                return Err(ResourceError::InvalidHandle);
            }
        }
        let entry = res
            .binding_layouts
            .get_mut(&id.0)
            .ok_or(ResourceError::NotFound)?;
        for unit in units {
            let slot = entry
                .units
                .iter_mut()
                .find(|u| u.binding == unit.binding && u.ty == unit.ty)
                .ok_or_else(|| {
                    ResourceError::InvalidDescriptor(format!(
                        "binding {} is not part of layout {id:?}",
                        unit.binding
                    ))
                })?;
            *slot = *unit;
            if slot.ty == BindingType::SampledTexture && slot.texture_view.is_none() {
                slot.texture_view = null_view;
            }
        }
        entry.group = None;
        Ok(())
    }

    fn destroy_binding_layout(&self, id: BindingLayoutId) {
        if let Ok(mut res) = self.lock_resources() {
            res.binding_layouts.remove(&id.0);
        }
    }

    fn create_pipeline_state(
        &self,
        info: &PipelineStateInfo,
    ) -> Result<PipelineStateId, ResourceError> {
        let (device, _, _) = self.gpu()?;
        let mut res = self.lock_resources()?;
        let shader = res
            .shaders
            .get(&info.shader.0)
            .ok_or(PipelineError::InvalidShader { id: info.shader })?;
        let pass = res.render_passes.get(&info.render_pass.0).ok_or_else(|| {
            PipelineError::IncompatibleRenderPass(format!("{:?} does not exist", info.render_pass))
        })?;

        let mut attributes = Vec::with_capacity(shader.info.attributes.len());
        for attr in &shader.info.attributes {
            let input = info
                .input_layout
                .iter()
                .find(|v| v.name == attr.name)
                .ok_or_else(|| PipelineError::MissingVertexAttribute(attr.name.clone()))?;
            attributes.push(wgpu::VertexAttribute {
                format: input.format.into_wgpu(),
                offset: u64::from(input.offset),
                shader_location: attr.location,
            });
        }
        let layouts = info
            .binding_layouts
            .iter()
            .map(|l| res.binding_layouts.get(&l.0).map(|e| &e.layout))
            .collect::<Option<Vec<_>>>()
            .ok_or(ResourceError::InvalidHandle)?;

        let color_formats = pass
            .color_attachments
            .iter()
            .map(|a| Self::wgpu_format(a.format))
            .collect::<Result<Vec<_>, _>>()?;
        let samples = pass
            .color_attachments
            .first()
            .map_or(1, |a| a.samples.into_wgpu());
        let depth_stencil = match &pass.depth_stencil_attachment {
            Some(ds) => Some(depth_stencil_state(
                &info.depth_stencil,
                Self::wgpu_format(ds.format)?,
                info.rasterizer.depth_bias,
                info.rasterizer.depth_bias_slope,
            )),
            None => None,
        };
        let targets = color_targets(&info.blend, &color_formats);

        let module = |kind: ShaderStageKind| {
            shader
                .modules
                .iter()
                .find(|(stage, _)| *stage == kind)
                .map(|(_, m)| m)
        };
        let vertex_module = module(ShaderStageKind::Vertex).ok_or_else(|| {
            PipelineError::CompilationFailed {
                label: Some(shader.info.name.clone()),
                details: "no vertex stage".into(),
            }
        })?;

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&shader.info.name),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: u64::from(info.vertex_stride),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&shader.info.name),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some("main"),
                buffers: if attributes.is_empty() { &[] } else { &vertex_buffers },
                compilation_options: Default::default(),
            },
            fragment: module(ShaderStageKind::Fragment).map(|m| wgpu::FragmentState {
                module: m,
                entry_point: Some("main"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: info.primitive.into_wgpu(),
                front_face: if info.rasterizer.is_front_face_cw {
                    wgpu::FrontFace::Cw
                } else {
                    wgpu::FrontFace::Ccw
                },
                cull_mode: info.rasterizer.cull_mode.into_wgpu(),
                polygon_mode: info.rasterizer.polygon_mode.into_wgpu(),
                unclipped_depth: !info.rasterizer.depth_clip,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: samples,
                mask: !0,
                alpha_to_coverage_enabled: info.blend.alpha_to_coverage,
            },
            multiview: None,
            cache: None,
        });

        let id = self.next_id();
        res.pipelines.insert(id, PipelineEntry { pipeline });
        Ok(PipelineStateId(id))
    }

    fn destroy_pipeline_state(&self, id: PipelineStateId) {
        if let Ok(mut res) = self.lock_resources() {
            res.pipelines.remove(&id.0);
        }
    }

    fn create_input_assembler(
        &self,
        info: &InputAssemblerInfo,
    ) -> Result<InputAssemblerId, ResourceError> {
        let mut res = self.lock_resources()?;
        if !res.buffers.contains_key(&info.vertex_buffer.0)
            || info
                .index_buffer
                .is_some_and(|b| !res.buffers.contains_key(&b.0))
        {
            return Err(ResourceError::InvalidHandle);
        }
        let id = self.next_id();
        res.input_assemblers.insert(id, info.clone());
        Ok(InputAssemblerId(id))
    }

    fn destroy_input_assembler(&self, id: InputAssemblerId) {
        if let Ok(mut res) = self.lock_resources() {
            res.input_assemblers.remove(&id.0);
        }
    }

    // --- Passes and framebuffers ---

    fn create_render_pass(&self, info: &RenderPassInfo) -> Result<RenderPassId, ResourceError> {
        let (_, _, caps) = self.gpu()?;
        if info.color_attachments.len() as u32 > caps.limits.max_color_attachments {
            return Err(ResourceError::LimitExceeded {
                limit: "max_color_attachments",
                requested: info.color_attachments.len() as u64,
                max: u64::from(caps.limits.max_color_attachments),
            });
        }
        for attachment in &info.color_attachments {
            Self::wgpu_format(attachment.format)?;
        }
        let id = self.next_id();
        self.lock_resources()?.render_passes.insert(id, info.clone());
        Ok(RenderPassId(id))
    }

    fn destroy_render_pass(&self, id: RenderPassId) {
        if let Ok(mut res) = self.lock_resources() {
            res.render_passes.remove(&id.0);
        }
    }

    fn create_framebuffer(&self, info: &FramebufferInfo) -> Result<FramebufferId, ResourceError> {
        let mut res = self.lock_resources()?;
        let pass = res
            .render_passes
            .get(&info.render_pass.0)
            .ok_or(ResourceError::InvalidHandle)?;
        if info.color_textures.len() != pass.color_attachments.len() {
            return Err(ResourceError::InvalidDescriptor(
                "framebuffer attachments do not match the render pass".into(),
            ));
        }
        let all_known = info
            .color_textures
            .iter()
            .chain(info.depth_stencil_texture.iter())
            .all(|t| res.textures.contains_key(&t.0));
        if !all_known {
            return Err(ResourceError::InvalidHandle);
        }
        let id = self.next_id();
        res.framebuffers.insert(id, info.clone());
        Ok(FramebufferId(id))
    }

    fn destroy_framebuffer(&self, id: FramebufferId) {
        if let Ok(mut res) = self.lock_resources() {
            res.framebuffers.remove(&id.0);
        }
    }

    // --- Commands ---

    fn create_command_buffer(
        &self,
        info: &CommandBufferInfo,
    ) -> Result<CommandBuffer, ResourceError> {
        let id = CommandBufferId(self.next_command_buffer_id.fetch_add(1, Ordering::Relaxed));
        Ok(CommandBuffer::new(id, info))
    }

    fn destroy_command_buffer(&self, id: CommandBufferId) {
        log::trace!("WgpuDevice: released {id:?}");
    }

    // --- Transfers ---

    fn copy_buffers_to_texture(
        &self,
        buffers: &[&[u8]],
        texture: TextureId,
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError> {
        let (_, queue, _) = self.gpu()?;
        let res = self.lock_resources()?;
        let entry = res.textures.get(&texture.0).ok_or(ResourceError::NotFound)?;
        let mut copied = 0;
        for (i, region) in regions.iter().enumerate() {
            let Some(src) = buffers.get(i) else {
                log::error!("WgpuDevice: copy region {i} to {texture:?} has no source");
                continue;
            };
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &entry.texture,
                    mip_level: region.texture_subresource.mip_level,
                    origin: texel_copy_origin(&entry.info, region),
                    aspect: wgpu::TextureAspect::All,
                },
                src,
                texel_copy_layout(&entry.info, region),
                texel_copy_extent(&entry.info, region),
            );
            copied += 1;
        }
        Ok(copied)
    }

    fn copy_framebuffer_to_buffer(
        &self,
        framebuffer: FramebufferId,
        buffer: &mut [u8],
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError> {
        let (device, queue, _) = self.gpu()?;
        let res = self.lock_resources()?;
        let fb = res.framebuffers.get(&framebuffer.0).ok_or(ResourceError::NotFound)?;
        let texture_id = fb.color_textures.first().ok_or(ResourceError::InvalidHandle)?;
        let entry = res.textures.get(&texture_id.0).ok_or(ResourceError::NotFound)?;

        let mut copied = 0;
        for (i, region) in regions.iter().enumerate() {
            let extent = region.texture_extent;
            let row_bytes = entry.info.format.row_size(extent.width);
            let padded_row = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Prism Read-back"),
                size: u64::from(padded_row) * u64::from(extent.height),
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Prism Read-back Encoder"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &entry.texture,
                    mip_level: region.texture_subresource.mip_level,
                    origin: region.texture_offset.into_wgpu(),
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(extent.height),
                    },
                },
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: 1,
                },
            );
            queue.submit(Some(encoder.finish()));

            let slice = staging.slice(..);
            let (tx, rx) = mpsc::channel();
            slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            if let Err(e) = device.poll(wgpu::PollType::Wait) {
                log::error!("WgpuDevice: read-back poll failed: {e:?}");
                continue;
            }
            match rx.recv() {
                Ok(Ok(())) => {}
                other => {
                    log::error!("WgpuDevice: read-back region {i} failed to map: {other:?}");
                    continue;
                }
            }

            let stride = if region.buffer_stride > 0 {
                entry.info.format.row_size(region.buffer_stride)
            } else {
                row_bytes
            } as usize;
            let needed = region.buffer_offset as usize
                + stride * (extent.height as usize).saturating_sub(1)
                + row_bytes as usize;
            if buffer.len() < needed {
                log::error!("WgpuDevice: read-back region {i} overflows the destination");
                staging.unmap();
                continue;
            }
            {
                let mapped = slice.get_mapped_range();
                for row in 0..extent.height as usize {
                    let from = row * padded_row as usize;
                    let to = region.buffer_offset as usize + row * stride;
                    buffer[to..to + row_bytes as usize]
                        .copy_from_slice(&mapped[from..from + row_bytes as usize]);
                }
            }
            staging.unmap();
            copied += 1;
        }
        Ok(copied)
    }

    fn blit_framebuffer(
        &self,
        src: FramebufferId,
        dst: FramebufferId,
        src_rect: Rect,
        dst_rect: Rect,
        filter: Filter,
    ) -> Result<(), ResourceError> {
        if (src_rect.width, src_rect.height) != (dst_rect.width, dst_rect.height) {
            return Err(ResourceError::Unsupported(format!(
                "scaled blits ({filter:?}) on wgpu"
            )));
        }
        let (device, queue, _) = self.gpu()?;
        let res = self.lock_resources()?;
        let texture = |fb: FramebufferId| {
            res.framebuffers
                .get(&fb.0)
                .and_then(|f| f.color_textures.first())
                .and_then(|t| res.textures.get(&t.0))
                .ok_or(ResourceError::InvalidHandle)
        };
        let (from, to) = (texture(src)?, texture(dst)?);
        if from.info.format != to.info.format {
            return Err(ResourceError::InvalidDescriptor(
                "blit between different formats".into(),
            ));
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Prism Blit Encoder"),
        });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &from.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: src_rect.x.max(0) as u32,
                    y: src_rect.y.max(0) as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &to.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: dst_rect.x.max(0) as u32,
                    y: dst_rect.y.max(0) as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: src_rect.width,
                height: src_rect.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));
        Ok(())
    }

    // --- Frame ---

    fn submit(&self, command_buffers: &[&CommandBuffer]) -> Result<(), RenderError> {
        let (device, queue, _) = self.gpu()?;
        let default_sampler = {
            let state = self.lock_state()?;
            state
                .as_ref()
                .ok_or(RenderError::NotInitialized)?
                .default_sampler
                .clone()
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Prism Frame Encoder"),
        });
        let mut packages = Vec::new();
        let mut stats = Vec::with_capacity(command_buffers.len());
        {
            let mut res = self.lock_resources()?;
            for cmd in command_buffers {
                if cmd.level() == CommandBufferLevel::Secondary {
                    log::warn!("WgpuDevice: secondary {:?} cannot be submitted directly", cmd.id());
                    continue;
                }
                let mut flat = Vec::with_capacity(cmd.commands().len());
                flatten(cmd.commands(), &mut flat, &mut packages);
                Self::replay(&mut res, &device, &default_sampler, &mut encoder, cmd.id(), &flat);
                stats.push(cmd.stats());
            }
        }
        queue.submit(Some(encoder.finish()));

        let mut state = self.lock_state()?;
        let state = state.as_mut().ok_or(RenderError::NotInitialized)?;
        state.retained.extend(packages);
        for s in &stats {
            state.pending.accumulate(s);
            state.pending_buffers += 1;
        }
        Ok(())
    }

    fn present(&self) -> Result<(), RenderError> {
        let (device, queue, _) = self.gpu()?;
        let mut state = self.lock_state()?;
        let state = state.as_mut().ok_or(RenderError::NotInitialized)?;

        if let (Some(surface), Some(window)) = (&state.context.surface, state.window) {
            match surface.surface.get_current_texture() {
                Ok(frame) => {
                    let res = self.lock_resources()?;
                    if let Some(color) = res.textures.get(&window.color_texture.0) {
                        let mut encoder =
                            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                                label: Some("Prism Present Encoder"),
                            });
                        encoder.copy_texture_to_texture(
                            color.texture.as_image_copy(),
                            frame.texture.as_image_copy(),
                            wgpu::Extent3d {
                                width: window.width.min(frame.texture.width()),
                                height: window.height.min(frame.texture.height()),
                                depth_or_array_layers: 1,
                            },
                        );
                        queue.submit(Some(encoder.finish()));
                    }
                    frame.present();
                }
                Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                    log::warn!("WgpuDevice: surface {e:?}, reconfiguring");
                    surface.surface.configure(&device, &surface.config);
                }
                Err(e) => {
                    log::error!("WgpuDevice: failed to acquire the surface texture: {e:?}");
                    return Err(RenderError::RenderingFailed);
                }
            }
        }

        state.stats = FrameStats {
            frame_number: state.stats.frame_number + 1,
            draw_calls: state.pending.draw_calls,
            instances: state.pending.instances,
            triangles: state.pending.triangles,
            command_buffers: state.pending_buffers,
        };
        state.pending = CommandStats::default();
        state.pending_buffers = 0;
        state.retained.clear();
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        self.lock_state()
            .ok()
            .and_then(|state| state.as_ref().map(|s| s.stats))
            .unwrap_or_default()
    }
}

fn flatten(commands: &[GfxCommand], out: &mut Vec<GfxCommand>, packages: &mut Vec<CommandPackage>) {
    for command in commands {
        match command {
            GfxCommand::Execute(package) => {
                packages.push(package.clone());
                flatten(package.commands(), out, packages);
            }
            other => out.push(other.clone()),
        }
    }
}
