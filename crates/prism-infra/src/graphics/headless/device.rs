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

//! The headless [`GraphicsDevice`] implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use prism_core::math::{Extent3D, LinearRgba, Rect};
use prism_core::renderer::{
    BindingLayoutId, BindingLayoutInfo, BindingType, BindingUnit, BufferId, BufferInfo,
    BufferTextureCopy, BufferUsage, ClearFlags, CommandBuffer, CommandBufferId,
    CommandBufferInfo, CommandBufferLevel, DeviceCaps, DeviceFeatures, DeviceInfo, Filter,
    FrameStats, FramebufferId, FramebufferInfo, GfxCommand, GraphicsAdapterInfo,
    GraphicsDevice, IndexFormat, InputAssemblerId, InputAssemblerInfo, LoadOp, PipelineError,
    PipelineStateId, PipelineStateInfo, RenderError, RenderPassId, RenderPassInfo,
    ResourceError, SamplerId, SamplerInfo, ShaderError, ShaderId, ShaderInfo,
    TextureFormat, TextureId, TextureInfo, TextureSubresource, TextureType, TextureUsage,
    TextureViewId, TextureViewInfo, WindowTarget,
};

use super::adapter::HeadlessAdapter;
use super::pool::ResourcePool;
use super::queue::{flatten_commands, CommandAllocator, HeadlessQueue};
use super::storage::{encode_color, encode_depth_stencil, TextureStorage};

/// Opaque black, the content of the null textures.
const NULL_TEXEL: [u8; 4] = [0, 0, 0, 255];
const NULL_TEXTURE_SIZE: u32 = 2;

#[derive(Debug)]
struct BufferEntry {
    info: BufferInfo,
    data: Vec<u8>,
}

#[derive(Debug)]
struct BindingLayoutEntry {
    info: BindingLayoutInfo,
    units: Vec<BindingUnit>,
}

#[derive(Debug, Clone)]
struct FramebufferEntry {
    info: FramebufferInfo,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy)]
struct NullTexture {
    ty: TextureType,
    texture: TextureId,
    view: TextureViewId,
}

/// Everything that only exists between `initialize` and `destroy`.
#[derive(Debug)]
struct HeadlessContext {
    caps: DeviceCaps,
    window: Option<WindowTarget>,
    null_textures: Vec<NullTexture>,
    allocator: CommandAllocator,
    queue: HeadlessQueue,
}

/// A CPU-side graphics device.
///
/// Descriptors are validated against the [`HeadlessAdapter`] profile, texel data lives in
/// memory, and submitted command buffers are replayed: render passes clear their
/// attachments, draws are counted. Nothing is rasterized.
#[derive(Debug)]
pub struct HeadlessDevice {
    adapter: HeadlessAdapter,
    context: Mutex<Option<HeadlessContext>>,
    buffers: ResourcePool<BufferEntry>,
    textures: ResourcePool<TextureStorage>,
    texture_views: ResourcePool<TextureViewInfo>,
    samplers: ResourcePool<SamplerInfo>,
    shaders: ResourcePool<ShaderInfo>,
    binding_layouts: ResourcePool<BindingLayoutEntry>,
    pipeline_states: ResourcePool<PipelineStateInfo>,
    input_assemblers: ResourcePool<InputAssemblerInfo>,
    render_passes: ResourcePool<RenderPassInfo>,
    framebuffers: ResourcePool<FramebufferEntry>,
    next_command_buffer_id: AtomicU64,
    teardown_log: Mutex<Vec<&'static str>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessAdapter::default())
    }
}

impl HeadlessDevice {
    /// Creates an uninitialized device running on `adapter`.
    pub fn new(adapter: HeadlessAdapter) -> Self {
        Self {
            adapter,
            context: Mutex::new(None),
            buffers: ResourcePool::new("buffer"),
            textures: ResourcePool::new("texture"),
            texture_views: ResourcePool::new("texture view"),
            samplers: ResourcePool::new("sampler"),
            shaders: ResourcePool::new("shader"),
            binding_layouts: ResourcePool::new("binding layout"),
            pipeline_states: ResourcePool::new("pipeline state"),
            input_assemblers: ResourcePool::new("input assembler"),
            render_passes: ResourcePool::new("render pass"),
            framebuffers: ResourcePool::new("framebuffer"),
            next_command_buffer_id: AtomicU64::new(0),
            teardown_log: Mutex::new(Vec::new()),
        }
    }

    /// The adapter profile.
    pub fn adapter(&self) -> &HeadlessAdapter {
        &self.adapter
    }

    fn lock_context(&self) -> Result<MutexGuard<'_, Option<HeadlessContext>>, ResourceError> {
        self.context.lock().map_err(|e| {
            ResourceError::BackendError(format!("Failed to lock HeadlessContext: {e}"))
        })
    }

    fn caps(&self) -> Result<DeviceCaps, ResourceError> {
        self.lock_context()?
            .as_ref()
            .map(|ctx| ctx.caps)
            .ok_or_else(|| ResourceError::BackendError("HeadlessDevice is not initialized".into()))
    }

    /// Number of live resources of every kind, the device's own included.
    pub fn live_resource_count(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.texture_views.len()
            + self.samplers.len()
            + self.shaders.len()
            + self.binding_layouts.len()
            + self.pipeline_states.len()
            + self.input_assemblers.len()
            + self.render_passes.len()
            + self.framebuffers.len()
    }

    /// The order in which the last `destroy` released the device's own objects.
    pub fn teardown_log(&self) -> Vec<&'static str> {
        self.teardown_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// The flattened commands of the last presented frame.
    pub fn last_frame_commands(&self) -> Vec<GfxCommand> {
        self.lock_context()
            .ok()
            .and_then(|ctx| ctx.as_ref().map(|c| c.queue.last_frame_log().to_vec()))
            .unwrap_or_default()
    }

    /// Packages kept alive by the command allocator for the current frame.
    pub fn retained_package_count(&self) -> usize {
        self.lock_context()
            .ok()
            .and_then(|ctx| ctx.as_ref().map(|c| c.allocator.len()))
            .unwrap_or(0)
    }

    /// A copy of a buffer's contents.
    pub fn read_buffer(&self, id: BufferId) -> Option<Vec<u8>> {
        self.buffers.with(id.0, |b| b.data.clone()).ok()
    }

    /// The resources currently bound to a binding layout.
    pub fn binding_units(&self, id: BindingLayoutId) -> Option<Vec<BindingUnit>> {
        self.binding_layouts.with(id.0, |l| l.units.clone()).ok()
    }

    /// The descriptor a pipeline state was created from.
    pub fn pipeline_state_info(&self, id: PipelineStateId) -> Option<PipelineStateInfo> {
        self.pipeline_states.get_cloned(id.0).ok()
    }

    /// The texture a view looks into.
    pub fn texture_of_view(&self, id: TextureViewId) -> Option<TextureId> {
        self.texture_views.with(id.0, |v| v.texture).ok()
    }

    /// Width and height of a framebuffer's attachments.
    pub fn framebuffer_size(&self, id: FramebufferId) -> Option<(u32, u32)> {
        self.framebuffers.with(id.0, |fb| (fb.width, fb.height)).ok()
    }

    /// A copy of one mip level of a texture, every layer included.
    pub fn texture_level(&self, id: TextureId, level: u32) -> Option<Vec<u8>> {
        self.textures
            .with(id.0, |t| t.level_data(level).map(<[u8]>::to_vec))
            .ok()
            .flatten()
    }

    /// The texel at `(x, y)` of level 0, layer 0.
    pub fn read_texel(&self, id: TextureId, x: u32, y: u32) -> Option<Vec<u8>> {
        self.textures
            .with(id.0, |t| t.texel(x, y).map(<[u8]>::to_vec))
            .ok()
            .flatten()
    }

    /// Bytes of texel memory held by all live textures.
    pub fn texture_memory(&self) -> usize {
        self.textures.sum(TextureStorage::byte_size)
    }

    /// The descriptor of a texture.
    pub fn texture_info(&self, id: TextureId) -> Option<TextureInfo> {
        self.textures.with(id.0, |t| t.info.clone()).ok()
    }

    // --- Initialization helpers ---

    fn create_null_texture(&self, ty: TextureType) -> Result<NullTexture, ResourceError> {
        let layers = if ty == TextureType::Cube { 6 } else { 1 };
        let info = TextureInfo {
            label: Some(format!("null-{ty:?}")),
            ty,
            depth_or_layers: layers,
            ..TextureInfo::sampled_2d(
                "null",
                TextureFormat::Rgba8Unorm,
                NULL_TEXTURE_SIZE,
                NULL_TEXTURE_SIZE,
            )
        };
        let texture = self.create_texture(&info)?;
        let texels = (NULL_TEXTURE_SIZE * NULL_TEXTURE_SIZE * layers) as usize;
        let pixels: Vec<u8> = NULL_TEXEL.repeat(texels);
        let region = BufferTextureCopy {
            texture_extent: Extent3D::new_2d(NULL_TEXTURE_SIZE, NULL_TEXTURE_SIZE),
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
        let color_texture = self.create_texture(&TextureInfo::attachment(
            "main-window-color",
            color_format,
            width,
            height,
        ))?;
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

    fn create_main_window(
        &self,
        info: &DeviceInfo,
        caps: &DeviceCaps,
    ) -> Result<WindowTarget, ResourceError> {
        let color_format = if caps.supports_attachment(info.color_format) {
            info.color_format
        } else {
            log::warn!(
                "HeadlessDevice: window color format {:?} unsupported, falling back to Rgba8Unorm",
                info.color_format
            );
            TextureFormat::Rgba8Unorm
        };
        let depth_stencil_format = if caps.supports_format(info.depth_stencil_format) {
            info.depth_stencil_format
        } else {
            log::warn!(
                "HeadlessDevice: window depth format {:?} unsupported, falling back to Depth24Plus",
                info.depth_stencil_format
            );
            TextureFormat::Depth24Plus
        };
        let render_pass = self.create_render_pass(&RenderPassInfo::simple(
            color_format,
            Some(depth_stencil_format),
            LoadOp::Clear,
        ))?;
        self.create_window_attachments(
            render_pass,
            info.width.max(1),
            info.height.max(1),
            color_format,
            Some(depth_stencil_format),
        )
    }

    fn destroy_window_attachments(&self, window: &WindowTarget) {
        self.destroy_framebuffer(window.framebuffer);
        self.destroy_texture(window.color_texture);
        if let Some(depth) = window.depth_stencil_texture {
            self.destroy_texture(depth);
        }
    }

    fn try_initialize(&self, info: &DeviceInfo) -> Result<(), ResourceError> {
        let caps = self.caps()?;
        let null_2d = self.create_null_texture(TextureType::Tex2D)?;
        let null_cube = self.create_null_texture(TextureType::Cube)?;
        let window = self.create_main_window(info, &caps)?;
        if let Some(ctx) = self.lock_context()?.as_mut() {
            ctx.null_textures = vec![null_2d, null_cube];
            ctx.window = Some(window);
        }
        Ok(())
    }

    // --- Replay helpers ---

    fn first_color_texture(&self, framebuffer: FramebufferId) -> Result<TextureId, ResourceError> {
        self.framebuffers
            .with(framebuffer.0, |fb| fb.info.color_textures.first().copied())?
            .ok_or_else(|| {
                ResourceError::InvalidDescriptor(format!(
                    "framebuffer {framebuffer:?} has no color attachment"
                ))
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn clear_attachments(
        &self,
        framebuffer: FramebufferId,
        render_pass: RenderPassId,
        area: Rect,
        flags: ClearFlags,
        colors: &[LinearRgba],
        depth: f32,
        stencil: u32,
    ) {
        let Ok(fb) = self.framebuffers.get_cloned(framebuffer.0) else {
            log::warn!("HeadlessDevice: render pass begun on unknown framebuffer {framebuffer:?}");
            return;
        };
        let Ok(pass) = self.render_passes.get_cloned(render_pass.0) else {
            log::warn!("HeadlessDevice: render pass {render_pass:?} is unknown");
            return;
        };

        if flags.contains(ClearFlags::COLOR) {
            for (i, (texture, attachment)) in fb
                .info
                .color_textures
                .iter()
                .zip(&pass.color_attachments)
                .enumerate()
            {
                if attachment.load_op != LoadOp::Clear {
                    continue;
                }
                let color = colors
                    .get(i)
                    .or(colors.last())
                    .copied()
                    .unwrap_or(LinearRgba::BLACK);
                if let Some(texel) = encode_color(attachment.format, color) {
                    let _ = self.textures.with_mut(texture.0, |t| t.fill(area, &texel));
                }
            }
        }

        if flags.intersects(ClearFlags::DEPTH_STENCIL) {
            if let (Some(texture), Some(attachment)) =
                (fb.info.depth_stencil_texture, pass.depth_stencil_attachment)
            {
                if attachment.depth_load_op == LoadOp::Clear {
                    if let Some(texel) = encode_depth_stencil(attachment.format, depth, stencil) {
                        let _ = self.textures.with_mut(texture.0, |t| t.fill(area, &texel));
                    }
                }
            }
        }
    }

    fn replay(&self, id: CommandBufferId, commands: &[GfxCommand]) {
        let mut bound_pso = None;
        for command in commands {
            match command {
                GfxCommand::BeginRenderPass {
                    framebuffer,
                    render_pass,
                    render_area,
                    clear_flags,
                    clear_colors,
                    depth,
                    stencil,
                } => self.clear_attachments(
                    *framebuffer,
                    *render_pass,
                    *render_area,
                    *clear_flags,
                    clear_colors,
                    *depth,
                    *stencil,
                ),
                GfxCommand::BindPipelineState(pso) => {
                    if !self.pipeline_states.contains(pso.0) {
                        log::warn!("HeadlessDevice: {id:?} binds unknown pipeline state {pso:?}");
                    }
                    bound_pso = Some(*pso);
                }
                GfxCommand::Draw(_) if bound_pso.is_none() => {
                    log::warn!("HeadlessDevice: {id:?} draws without a pipeline state");
                }
                _ => {}
            }
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn initialize(&self, info: &DeviceInfo) -> Result<(), RenderError> {
        {
            let mut ctx = self.lock_context()?;
            if ctx.is_some() {
                log::warn!("HeadlessDevice: initialize called twice, ignoring");
                return Ok(());
            }
            if !self.adapter.context_available {
                log::error!(
                    "HeadlessDevice: no rendering context available on '{}'",
                    self.adapter.name
                );
                return Err(RenderError::InitializationFailed(format!(
                    "no rendering context available on '{}'",
                    self.adapter.name
                )));
            }
            *ctx = Some(HeadlessContext {
                caps: self.adapter.caps,
                window: None,
                null_textures: Vec::new(),
                allocator: CommandAllocator::default(),
                queue: HeadlessQueue::default(),
            });
        }

        if let Err(e) = self.try_initialize(info) {
            log::error!("HeadlessDevice: initialization failed: {e}");
            self.destroy();
            return Err(RenderError::InitializationFailed(e.to_string()));
        }

        log::info!(
            "HeadlessDevice: initialized on '{}' ({}x{})",
            self.adapter.name,
            info.width,
            info.height
        );
        Ok(())
    }

    fn destroy(&self) {
        let mut guard = match self.context.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::error!("HeadlessDevice: context mutex poisoned during destroy: {e}");
                return;
            }
        };
        let Some(mut ctx) = guard.take() else {
            return;
        };
        let mut steps = Vec::with_capacity(5);

        for null in ctx.null_textures.drain(..) {
            self.destroy_texture_view(null.view);
            self.destroy_texture(null.texture);
        }
        steps.push("null_textures");

        if let Some(window) = ctx.window.take() {
            self.destroy_window_attachments(&window);
            self.destroy_render_pass(window.render_pass);
        }
        steps.push("main_window");

        ctx.allocator.reset();
        steps.push("command_allocator");

        drop(ctx.queue);
        steps.push("queue");

        drop(guard);
        steps.push("context");

        let leaked = self.live_resource_count();
        if leaked > 0 {
            log::warn!("HeadlessDevice: destroyed with {leaked} resources still alive");
        }
        if let Ok(mut log) = self.teardown_log.lock() {
            *log = steps;
        }
        log::info!("HeadlessDevice: destroyed");
    }

    fn is_initialized(&self) -> bool {
        self.lock_context().is_ok_and(|ctx| ctx.is_some())
    }

    fn resize(&self, width: u32, height: u32) {
        let Some(window) = self.main_window() else {
            return;
        };
        if (window.width, window.height) == (width, height) || width == 0 || height == 0 {
            return;
        }
        self.destroy_window_attachments(&window);
        let resized = self.create_window_attachments(
            window.render_pass,
            width,
            height,
            window.color_format,
            window.depth_stencil_format,
        );
        match resized {
            Ok(target) => {
                if let Ok(mut ctx) = self.lock_context() {
                    if let Some(ctx) = ctx.as_mut() {
                        ctx.window = Some(target);
                    }
                }
                log::debug!("HeadlessDevice: main window resized to {width}x{height}");
            }
            Err(e) => log::error!("HeadlessDevice: failed to resize main window: {e}"),
        }
    }

    fn adapter_info(&self) -> GraphicsAdapterInfo {
        self.adapter.info()
    }

    fn capabilities(&self) -> DeviceCaps {
        self.caps().unwrap_or(self.adapter.caps)
    }

    fn null_texture_view(&self, ty: TextureType) -> Option<TextureViewId> {
        let ctx = self.lock_context().ok()?;
        ctx.as_ref()?
            .null_textures
            .iter()
            .find(|n| n.ty == ty)
            .map(|n| n.view)
    }

    fn main_window(&self) -> Option<WindowTarget> {
        self.lock_context().ok()?.as_ref()?.window
    }

    // --- Buffers ---

    fn create_buffer(&self, info: &BufferInfo) -> Result<BufferId, ResourceError> {
        let caps = self.caps()?;
        if info.size == 0 {
            log::error!("HeadlessDevice: buffer {:?} has zero size", info.label);
            return Err(ResourceError::InvalidDescriptor("zero-sized buffer".into()));
        }
        let max_block = u64::from(caps.limits.max_uniform_block_size);
        if info.usage.contains(BufferUsage::UNIFORM) && info.size > max_block {
            log::error!(
                "HeadlessDevice: uniform buffer {:?} of {} bytes exceeds the block limit",
                info.label,
                info.size
            );
            return Err(ResourceError::LimitExceeded {
                limit: "max_uniform_block_size",
                requested: info.size,
                max: max_block,
            });
        }
        let id = self.buffers.insert(BufferEntry {
            info: info.clone(),
            data: vec![0; info.size as usize],
        })?;
        Ok(BufferId(id))
    }

    fn update_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.buffers.with_mut(id.0, |entry| {
            let start = offset as usize;
            let end = start + data.len();
            if end as u64 > entry.info.size {
                log::warn!(
                    "HeadlessDevice: write of {} bytes at {offset} overflows buffer {id:?}",
                    data.len()
                );
                return Err(ResourceError::OutOfBounds);
            }
            entry.data[start..end].copy_from_slice(data);
            Ok(())
        })?
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.buffers.remove(id.0);
    }

    // --- Textures and samplers ---

    fn create_texture(&self, info: &TextureInfo) -> Result<TextureId, ResourceError> {
        let caps = self.caps()?;
        let fail = |e: ResourceError| {
            log::error!("HeadlessDevice: cannot create texture {:?}: {e}", info.label);
            Err(e)
        };
        if info.width == 0 || info.height == 0 {
            return fail(ResourceError::InvalidDescriptor("zero-sized texture".into()));
        }
        if !caps.supports_format(info.format) {
            return fail(ResourceError::Unsupported(format!("{:?} textures", info.format)));
        }
        let attachment = TextureUsage::COLOR_ATTACHMENT | TextureUsage::DEPTH_STENCIL_ATTACHMENT;
        if info.usage.intersects(attachment) && !caps.supports_attachment(info.format) {
            return fail(ResourceError::Unsupported(format!(
                "{:?} attachments",
                info.format
            )));
        }
        if !caps.supports_samples(info.samples) {
            return fail(ResourceError::Unsupported(format!("{:?}", info.samples)));
        }
        let (limit, max) = if info.ty == TextureType::Cube {
            ("max_cube_map_texture_size", caps.limits.max_cube_map_texture_size)
        } else {
            ("max_texture_size", caps.limits.max_texture_size)
        };
        let largest = info.width.max(info.height);
        if largest > max {
            return fail(ResourceError::LimitExceeded {
                limit,
                requested: u64::from(largest),
                max: u64::from(max),
            });
        }
        let full_chain = u32::BITS - largest.leading_zeros();
        if info.mip_levels == 0 || info.mip_levels > full_chain {
            return fail(ResourceError::InvalidDescriptor(format!(
                "{} mip levels for a {}x{} texture",
                info.mip_levels, info.width, info.height
            )));
        }
        if info.ty == TextureType::Cube && (info.width != info.height || info.depth_or_layers != 6)
        {
            return fail(ResourceError::InvalidDescriptor(
                "cube maps need square faces and 6 layers".into(),
            ));
        }
        let id = self.textures.insert(TextureStorage::new(info.clone()))?;
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) {
        self.textures.remove(id.0);
    }

    fn create_texture_view(&self, info: &TextureViewInfo) -> Result<TextureViewId, ResourceError> {
        let texture = self.textures.with(info.texture.0, |t| t.info.clone()).map_err(|e| {
            log::error!("HeadlessDevice: view of unknown texture {:?}", info.texture);
            e
        })?;
        if info.format != texture.format {
            return Err(ResourceError::InvalidDescriptor(format!(
                "view format {:?} differs from texture format {:?}",
                info.format, texture.format
            )));
        }
        if info.level_count == 0
            || info.base_level + info.level_count > texture.mip_levels
            || info.layer_count == 0
            || info.base_layer + info.layer_count > texture.layer_count()
        {
            log::error!("HeadlessDevice: view range out of bounds for {:?}", info.texture);
            return Err(ResourceError::OutOfBounds);
        }
        let id = self.texture_views.insert(info.clone())?;
        Ok(TextureViewId(id))
    }

    fn destroy_texture_view(&self, id: TextureViewId) {
        self.texture_views.remove(id.0);
    }

    fn create_sampler(&self, info: &SamplerInfo) -> Result<SamplerId, ResourceError> {
        if info.max_anisotropy == 0 || info.min_lod > info.max_lod {
            log::error!("HeadlessDevice: invalid sampler {info:?}");
            return Err(ResourceError::InvalidDescriptor(
                "sampler anisotropy or lod range".into(),
            ));
        }
        let id = self.samplers.insert(*info)?;
        Ok(SamplerId(id))
    }

    fn destroy_sampler(&self, id: SamplerId) {
        self.samplers.remove(id.0);
    }

    // --- Pipeline objects ---

    fn create_shader(&self, info: &ShaderInfo) -> Result<ShaderId, ResourceError> {
        let caps = self.caps()?;
        let limits = caps.limits;
        if info.stages.is_empty() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "shader '{}' has no stages",
                info.name
            )));
        }
        for stage in &info.stages {
            let unresolved = stage
                .source
                .lines()
                .map(str::trim_start)
                .find(|line| {
                    ["#if", "#elif", "#else", "#endif"]
                        .iter()
                        .any(|d| line.starts_with(d))
                });
            if let Some(line) = unresolved {
                log::error!("HeadlessDevice: shader '{}' failed to compile", info.name);
                return Err(ShaderError::CompilationError {
                    label: info.name.clone(),
                    details: format!("{:?} stage: unresolved directive '{line}'", stage.stage),
                }
                .into());
            }
        }
        let samplers: u32 = info.samplers.iter().map(|s| s.count.max(1)).sum();
        if samplers > limits.max_texture_units {
            return Err(ResourceError::LimitExceeded {
                limit: "max_texture_units",
                requested: u64::from(samplers),
                max: u64::from(limits.max_texture_units),
            });
        }
        if info.blocks.len() as u32 > limits.max_uniform_buffer_bindings {
            return Err(ResourceError::LimitExceeded {
                limit: "max_uniform_buffer_bindings",
                requested: info.blocks.len() as u64,
                max: u64::from(limits.max_uniform_buffer_bindings),
            });
        }
        if let Some(block) = info
            .blocks
            .iter()
            .find(|b| b.size() > limits.max_uniform_block_size)
        {
            return Err(ResourceError::LimitExceeded {
                limit: "max_uniform_block_size",
                requested: u64::from(block.size()),
                max: u64::from(limits.max_uniform_block_size),
            });
        }
        if info.attributes.len() as u32 > limits.max_vertex_attributes {
            return Err(ResourceError::LimitExceeded {
                limit: "max_vertex_attributes",
                requested: info.attributes.len() as u64,
                max: u64::from(limits.max_vertex_attributes),
            });
        }
        let id = self.shaders.insert(info.clone())?;
        log::debug!("HeadlessDevice: compiled shader '{}' as {id}", info.name);
        Ok(ShaderId(id))
    }

    fn destroy_shader(&self, id: ShaderId) {
        self.shaders.remove(id.0);
    }

    fn create_binding_layout(
        &self,
        info: &BindingLayoutInfo,
    ) -> Result<BindingLayoutId, ResourceError> {
        let caps = self.caps()?;
        let samplers = info.sampler_count();
        if samplers > caps.limits.max_texture_units {
            return Err(ResourceError::LimitExceeded {
                limit: "max_texture_units",
                requested: u64::from(samplers),
                max: u64::from(caps.limits.max_texture_units),
            });
        }
        let mut bindings: Vec<u32> = info.units.iter().map(|u| u.binding).collect();
        bindings.sort_unstable();
        bindings.dedup();
        if bindings.len() != info.units.len() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "duplicate bindings in layout {:?}",
                info.label
            )));
        }
        let id = self.binding_layouts.insert(BindingLayoutEntry {
            info: info.clone(),
            units: info.units.clone(),
        })?;
        Ok(BindingLayoutId(id))
    }

    fn update_binding_layout(
        &self,
        id: BindingLayoutId,
        units: &[BindingUnit],
    ) -> Result<(), ResourceError> {
        let null_view = self.null_texture_view(TextureType::Tex2D);
        let mut resolved = Vec::with_capacity(units.len());
        for unit in units {
            let mut unit = *unit;
            match unit.ty {
                BindingType::UniformBuffer => {
                    if let Some(buffer) = unit.buffer {
                        if !self.buffers.contains(buffer.0) {
                            log::warn!("HeadlessDevice: layout {id:?} binds unknown {buffer:?}");
                            return Err(ResourceError::InvalidHandle);
                        }
                    }
                }
                BindingType::SampledTexture => match unit.texture_view {
                    Some(view) if !self.texture_views.contains(view.0) => {
                        log::warn!("HeadlessDevice: layout {id:?} binds unknown {view:?}");
                        return Err(ResourceError::InvalidHandle);
                    }
                    Some(_) => {}
                    None => unit.texture_view = null_view,
                },
            }
            resolved.push(unit);
        }

        self.binding_layouts.with_mut(id.0, |entry| {
            for unit in &resolved {
                let declared = entry
                    .info
                    .units
                    .iter()
                    .any(|u| u.binding == unit.binding && u.ty == unit.ty);
                if !declared {
                    return Err(ResourceError::InvalidDescriptor(format!(
                        "binding {} ({:?}) is not part of layout {:?}",
                        unit.binding, unit.ty, entry.info.label
                    )));
                }
            }
            for unit in resolved {
                if let Some(slot) = entry.units.iter_mut().find(|u| u.binding == unit.binding) {
                    *slot = unit;
                }
            }
            Ok(())
        })?
    }

    fn destroy_binding_layout(&self, id: BindingLayoutId) {
        self.binding_layouts.remove(id.0);
    }

    fn create_pipeline_state(
        &self,
        info: &PipelineStateInfo,
    ) -> Result<PipelineStateId, ResourceError> {
        let shader = self
            .shaders
            .get_cloned(info.shader.0)
            .map_err(|_| PipelineError::InvalidShader { id: info.shader })?;
        if !self.render_passes.contains(info.render_pass.0) {
            return Err(PipelineError::IncompatibleRenderPass(format!(
                "{:?} does not exist",
                info.render_pass
            ))
            .into());
        }
        if let Some(missing) = shader
            .attributes
            .iter()
            .find(|a| !info.input_layout.iter().any(|v| v.name == a.name))
        {
            log::error!(
                "HeadlessDevice: pipeline for '{}' lacks vertex attribute '{}'",
                shader.name,
                missing.name
            );
            return Err(PipelineError::MissingVertexAttribute(missing.name.clone()).into());
        }
        if let Some(layout) = info
            .binding_layouts
            .iter()
            .find(|l| !self.binding_layouts.contains(l.0))
        {
            log::error!("HeadlessDevice: pipeline references unknown {layout:?}");
            return Err(ResourceError::InvalidHandle);
        }
        let id = self.pipeline_states.insert(info.clone())?;
        Ok(PipelineStateId(id))
    }

    fn destroy_pipeline_state(&self, id: PipelineStateId) {
        self.pipeline_states.remove(id.0);
    }

    fn create_input_assembler(
        &self,
        info: &InputAssemblerInfo,
    ) -> Result<InputAssemblerId, ResourceError> {
        let caps = self.caps()?;
        if info.vertex_stride == 0 {
            return Err(ResourceError::InvalidDescriptor("zero vertex stride".into()));
        }
        if info.attributes.len() as u32 > caps.limits.max_vertex_attributes {
            return Err(ResourceError::LimitExceeded {
                limit: "max_vertex_attributes",
                requested: info.attributes.len() as u64,
                max: u64::from(caps.limits.max_vertex_attributes),
            });
        }
        if !self.buffers.contains(info.vertex_buffer.0) {
            log::error!("HeadlessDevice: input assembler uses unknown {:?}", info.vertex_buffer);
            return Err(ResourceError::InvalidHandle);
        }
        if let Some(index_buffer) = info.index_buffer {
            if !self.buffers.contains(index_buffer.0) {
                log::error!("HeadlessDevice: input assembler uses unknown {index_buffer:?}");
                return Err(ResourceError::InvalidHandle);
            }
            if info.index_format == IndexFormat::Uint32
                && !caps.features.contains(DeviceFeatures::ELEMENT_INDEX_UINT)
            {
                return Err(ResourceError::Unsupported("32-bit indices".into()));
            }
        }
        if info.instance_count > 1 && !caps.features.contains(DeviceFeatures::INSTANCED_ARRAYS) {
            return Err(ResourceError::Unsupported("instanced drawing".into()));
        }
        let id = self.input_assemblers.insert(info.clone())?;
        Ok(InputAssemblerId(id))
    }

    fn destroy_input_assembler(&self, id: InputAssemblerId) {
        self.input_assemblers.remove(id.0);
    }

    // --- Passes and framebuffers ---

    fn create_render_pass(&self, info: &RenderPassInfo) -> Result<RenderPassId, ResourceError> {
        let caps = self.caps()?;
        let colors = info.color_attachments.len() as u32;
        if colors == 0 && info.depth_stencil_attachment.is_none() {
            return Err(ResourceError::InvalidDescriptor(
                "render pass without attachments".into(),
            ));
        }
        if colors > caps.limits.max_color_attachments {
            return Err(ResourceError::LimitExceeded {
                limit: "max_color_attachments",
                requested: u64::from(colors),
                max: u64::from(caps.limits.max_color_attachments),
            });
        }
        if colors > 1 && !caps.features.contains(DeviceFeatures::MULTIPLE_RENDER_TARGETS) {
            return Err(ResourceError::Unsupported("multiple render targets".into()));
        }
        for attachment in &info.color_attachments {
            if !caps.supports_attachment(attachment.format) || attachment.format.is_depth_stencil()
            {
                return Err(ResourceError::Unsupported(format!(
                    "{:?} color attachments",
                    attachment.format
                )));
            }
            if !caps.supports_samples(attachment.samples) {
                return Err(ResourceError::Unsupported(format!("{:?}", attachment.samples)));
            }
        }
        if let Some(ds) = &info.depth_stencil_attachment {
            if !ds.format.is_depth_stencil() || !caps.supports_format(ds.format) {
                return Err(ResourceError::Unsupported(format!(
                    "{:?} depth attachments",
                    ds.format
                )));
            }
        }
        let id = self.render_passes.insert(info.clone())?;
        Ok(RenderPassId(id))
    }

    fn destroy_render_pass(&self, id: RenderPassId) {
        self.render_passes.remove(id.0);
    }

    fn create_framebuffer(&self, info: &FramebufferInfo) -> Result<FramebufferId, ResourceError> {
        let pass = self.render_passes.get_cloned(info.render_pass.0).map_err(|_| {
            log::error!("HeadlessDevice: framebuffer for unknown {:?}", info.render_pass);
            ResourceError::InvalidHandle
        })?;
        if info.color_textures.len() != pass.color_attachments.len()
            || info.depth_stencil_texture.is_some() != pass.depth_stencil_attachment.is_some()
        {
            return Err(ResourceError::InvalidDescriptor(
                "framebuffer attachments do not match the render pass".into(),
            ));
        }

        let mut size = None;
        let expected = info
            .color_textures
            .iter()
            .zip(pass.color_attachments.iter().map(|a| a.format))
            .chain(
                info.depth_stencil_texture
                    .iter()
                    .zip(pass.depth_stencil_attachment.iter().map(|a| a.format)),
            );
        for (texture, format) in expected {
            let (tex_format, width, height) = self
                .textures
                .with(texture.0, |t| (t.info.format, t.info.width, t.info.height))
                .map_err(|_| ResourceError::InvalidHandle)?;
            if tex_format != format {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "attachment {texture:?} is {tex_format:?}, the pass expects {format:?}"
                )));
            }
            match size {
                None => size = Some((width, height)),
                Some(s) if s != (width, height) => {
                    return Err(ResourceError::InvalidDescriptor(
                        "framebuffer attachments differ in size".into(),
                    ))
                }
                Some(_) => {}
            }
        }
        let (width, height) = size.unwrap_or((0, 0));
        let id = self.framebuffers.insert(FramebufferEntry {
            info: info.clone(),
            width,
            height,
        })?;
        Ok(FramebufferId(id))
    }

    fn destroy_framebuffer(&self, id: FramebufferId) {
        self.framebuffers.remove(id.0);
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
        log::trace!("HeadlessDevice: released {id:?}");
    }

    // --- Transfers ---

    fn copy_buffers_to_texture(
        &self,
        buffers: &[&[u8]],
        texture: TextureId,
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError> {
        if !self.textures.contains(texture.0) {
            return Err(ResourceError::NotFound);
        }
        let mut copied = 0;
        for (i, region) in regions.iter().enumerate() {
            let Some(src) = buffers.get(i) else {
                log::error!("HeadlessDevice: copy region {i} to {texture:?} has no source");
                continue;
            };
            match self.textures.with_mut(texture.0, |t| t.write_region(src, region)) {
                Ok(Ok(())) => copied += 1,
                Ok(Err(e)) | Err(e) => {
                    log::error!("HeadlessDevice: copy region {i} to {texture:?} failed: {e}")
                }
            }
        }
        Ok(copied)
    }

    fn copy_framebuffer_to_buffer(
        &self,
        framebuffer: FramebufferId,
        buffer: &mut [u8],
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError> {
        let texture = self.first_color_texture(framebuffer)?;
        let mut copied = 0;
        for (i, region) in regions.iter().enumerate() {
            match self.textures.with(texture.0, |t| t.read_region(buffer, region)) {
                Ok(Ok(())) => copied += 1,
                Ok(Err(e)) | Err(e) => {
                    log::error!("HeadlessDevice: read-back region {i} of {framebuffer:?} failed: {e}")
                }
            }
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
        let src_texture = self.first_color_texture(src)?;
        let dst_texture = self.first_color_texture(dst)?;
        let source = self.textures.get_cloned(src_texture.0)?;
        log::trace!("HeadlessDevice: blit {src:?} -> {dst:?} ({filter:?} sampled as nearest)");
        self.textures
            .with_mut(dst_texture.0, |t| t.blit_from(&source, src_rect, dst_rect))?
    }

    // --- Frame ---

    fn submit(&self, command_buffers: &[&CommandBuffer]) -> Result<(), RenderError> {
        for cmd in command_buffers {
            if cmd.level() == CommandBufferLevel::Secondary {
                log::warn!(
                    "HeadlessDevice: secondary {:?} cannot be submitted directly",
                    cmd.id()
                );
                continue;
            }
            if cmd.is_in_render_pass() {
                log::warn!("HeadlessDevice: {:?} submitted with an open render pass", cmd.id());
            }

            let mut flat = Vec::with_capacity(cmd.commands().len());
            let mut packages = Vec::new();
            flatten_commands(cmd.commands(), &mut flat, &mut |p| packages.push(p.clone()));
            self.replay(cmd.id(), &flat);

            let mut ctx = self.lock_context()?;
            let ctx = ctx.as_mut().ok_or(RenderError::NotInitialized)?;
            for package in &packages {
                ctx.allocator.retain(package);
            }
            ctx.queue.record(cmd.stats(), flat);
        }
        Ok(())
    }

    fn present(&self) -> Result<(), RenderError> {
        let mut ctx = self.lock_context()?;
        let ctx = ctx.as_mut().ok_or(RenderError::NotInitialized)?;
        let stats = ctx.queue.flush();
        ctx.allocator.reset();
        log::trace!(
            "HeadlessDevice: frame {} presented, {} draw calls",
            stats.frame_number,
            stats.draw_calls
        );
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        self.lock_context()
            .ok()
            .and_then(|ctx| ctx.as_ref().map(|c| c.queue.stats()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> HeadlessDevice {
        let device = HeadlessDevice::default();
        device.initialize(&DeviceInfo::default()).unwrap();
        device
    }

    #[test]
    fn initialize_creates_window_and_null_textures() {
        let device = device();
        let window = device.main_window().unwrap();
        assert_eq!((window.width, window.height), (1280, 720));
        assert!(device.null_texture_view(TextureType::Tex2D).is_some());
        assert!(device.null_texture_view(TextureType::Cube).is_some());
        assert!(device.null_texture_view(TextureType::Tex3D).is_none());
    }

    #[test]
    fn missing_context_creates_nothing() {
        let device = HeadlessDevice::new(HeadlessAdapter::unavailable());
        let result = device.initialize(&DeviceInfo::default());
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
        assert!(!device.is_initialized());
        assert_eq!(device.live_resource_count(), 0);
    }

    #[test]
    fn factories_validate_against_caps() {
        let device = HeadlessDevice::new(HeadlessAdapter::mobile());
        device.initialize(&DeviceInfo::default()).unwrap();
        let float = TextureInfo::sampled_2d("f", TextureFormat::Rgba32Float, 4, 4);
        assert!(matches!(
            device.create_texture(&float),
            Err(ResourceError::Unsupported(_))
        ));
        let huge = TextureInfo::sampled_2d("h", TextureFormat::Rgba8Unorm, 4096, 4);
        assert!(matches!(
            device.create_texture(&huge),
            Err(ResourceError::LimitExceeded { max: 2048, .. })
        ));
        let etc = TextureInfo::sampled_2d("e", TextureFormat::Etc2Rgba8, 64, 64);
        assert!(device.create_texture(&etc).is_ok());
    }

    #[test]
    fn destroying_unknown_ids_is_a_no_op() {
        let device = device();
        let before = device.live_resource_count();
        device.destroy_buffer(BufferId(999));
        device.destroy_texture(TextureId(999));
        device.destroy_pipeline_state(PipelineStateId(999));
        assert_eq!(device.live_resource_count(), before);
    }

    #[test]
    fn destroy_releases_in_order_and_is_idempotent() {
        let device = device();
        device.destroy();
        assert_eq!(
            device.teardown_log(),
            vec!["null_textures", "main_window", "command_allocator", "queue", "context"]
        );
        assert_eq!(device.live_resource_count(), 0);
        device.destroy();
        assert!(!device.is_initialized());
    }

    #[test]
    fn resize_only_acts_on_change() {
        let device = device();
        let before = device.main_window().unwrap();
        device.resize(1280, 720);
        assert_eq!(device.main_window().unwrap(), before);
        device.resize(640, 480);
        let after = device.main_window().unwrap();
        assert_eq!((after.width, after.height), (640, 480));
        assert_eq!(after.render_pass, before.render_pass);
        assert_ne!(after.framebuffer, before.framebuffer);
    }

    #[test]
    fn uniform_buffer_writes_are_bounds_checked() {
        let device = device();
        let buffer = device.create_buffer(&BufferInfo::uniform("u", 16)).unwrap();
        device.update_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&device.read_buffer(buffer).unwrap()[4..8], &[1, 2, 3, 4]);
        assert!(matches!(
            device.update_buffer(buffer, 14, &[0; 4]),
            Err(ResourceError::OutOfBounds)
        ));
    }
}
