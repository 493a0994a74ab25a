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

use crate::math::Rect;
use crate::renderer::api::command::{
    CommandBuffer, CommandBufferId, CommandBufferInfo, FramebufferId, FramebufferInfo,
    RenderPassId, RenderPassInfo,
};
use crate::renderer::api::core::{DeviceCaps, DeviceInfo, FrameStats, GraphicsAdapterInfo};
use crate::renderer::api::pipeline::{
    BindingLayoutId, BindingLayoutInfo, BindingUnit, InputAssemblerId, InputAssemblerInfo,
    PipelineStateId, PipelineStateInfo, ShaderId, ShaderInfo,
};
use crate::renderer::api::resource::{
    BufferId, BufferInfo, BufferTextureCopy, SamplerId, SamplerInfo, TexImage, TextureId,
    TextureInfo, TextureType, TextureViewId, TextureViewInfo,
};
use crate::renderer::api::util::{Filter, TextureFormat};
use crate::renderer::error::{RenderError, ResourceError};
use std::fmt::Debug;

/// The render target of the device's main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTarget {
    /// Render pass compatible with the window framebuffer.
    pub render_pass: RenderPassId,
    /// The window framebuffer.
    pub framebuffer: FramebufferId,
    /// Color attachment of the framebuffer.
    pub color_texture: TextureId,
    /// Depth/stencil attachment of the framebuffer.
    pub depth_stencil_texture: Option<TextureId>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color format.
    pub color_format: TextureFormat,
    /// Depth/stencil format.
    pub depth_stencil_format: Option<TextureFormat>,
}

/// A trait representing a graphics device, the factory for all GPU resources.
///
/// Every method takes `&self`; implementations keep their state behind interior
/// mutability so the device can be shared as `Arc<dyn GraphicsDevice>`. Destroying an
/// unknown or already destroyed id is a no-op.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    // --- Lifecycle ---

    /// Negotiates a rendering context, queries capabilities and creates the main window
    /// and the null textures.
    /// ## Errors
    /// * `RenderError::InitializationFailed` - If no context can be obtained. No resource
    ///   is created in that case.
    fn initialize(&self, info: &DeviceInfo) -> Result<(), RenderError>;

    /// Releases the null textures, the main window, the command allocator, the queue and
    /// the context, in that order. Calling it twice is harmless.
    fn destroy(&self);

    /// Returns `true` between a successful `initialize` and `destroy`.
    fn is_initialized(&self) -> bool;

    /// Resizes the main window. Does nothing unless the size actually changes.
    fn resize(&self, width: u32, height: u32);

    // --- Queries ---

    /// Information about the adapter the device runs on.
    fn adapter_info(&self) -> GraphicsAdapterInfo;

    /// Features and limits established at initialization.
    fn capabilities(&self) -> DeviceCaps;

    /// Returns `true` if textures of `format` can be created.
    fn supports_format(&self, format: TextureFormat) -> bool {
        self.capabilities().supports_format(format)
    }

    /// The fallback view bound to sampler slots without a texture.
    fn null_texture_view(&self, ty: TextureType) -> Option<TextureViewId>;

    /// The main window target, once initialized.
    fn main_window(&self) -> Option<WindowTarget>;

    // --- Buffers ---

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `info` - The buffer configuration.
    /// ## Returns
    /// The id of the created buffer or an error if the descriptor is invalid.
    fn create_buffer(&self, info: &BufferInfo) -> Result<BufferId, ResourceError>;

    /// Writes `data` into a buffer at `offset`.
    fn update_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId);

    // --- Textures and samplers ---

    /// Creates a new GPU texture.
    /// ## Errors
    /// * `ResourceError::Unsupported` - The format is not supported.
    /// * `ResourceError::LimitExceeded` - The size exceeds `max_texture_size`.
    fn create_texture(&self, info: &TextureInfo) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    fn destroy_texture(&self, id: TextureId);

    /// Creates a view into a texture.
    fn create_texture_view(&self, info: &TextureViewInfo) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId);

    /// Creates a sampler.
    fn create_sampler(&self, info: &SamplerInfo) -> Result<SamplerId, ResourceError>;

    /// Destroys a sampler.
    fn destroy_sampler(&self, id: SamplerId);

    // --- Pipeline objects ---

    /// Compiles a shader program.
    fn create_shader(&self, info: &ShaderInfo) -> Result<ShaderId, ResourceError>;

    /// Destroys a shader program.
    fn destroy_shader(&self, id: ShaderId);

    /// Creates a binding layout.
    fn create_binding_layout(
        &self,
        info: &BindingLayoutInfo,
    ) -> Result<BindingLayoutId, ResourceError>;

    /// Replaces the resources bound to a layout. Sampled slots without a texture view
    /// are bound to the null texture.
    fn update_binding_layout(
        &self,
        id: BindingLayoutId,
        units: &[BindingUnit],
    ) -> Result<(), ResourceError>;

    /// Destroys a binding layout.
    fn destroy_binding_layout(&self, id: BindingLayoutId);

    /// Creates a pipeline state object.
    fn create_pipeline_state(
        &self,
        info: &PipelineStateInfo,
    ) -> Result<PipelineStateId, ResourceError>;

    /// Destroys a pipeline state object.
    fn destroy_pipeline_state(&self, id: PipelineStateId);

    /// Creates an input assembler.
    fn create_input_assembler(
        &self,
        info: &InputAssemblerInfo,
    ) -> Result<InputAssemblerId, ResourceError>;

    /// Destroys an input assembler.
    fn destroy_input_assembler(&self, id: InputAssemblerId);

    // --- Passes and framebuffers ---

    /// Creates a render pass.
    fn create_render_pass(&self, info: &RenderPassInfo) -> Result<RenderPassId, ResourceError>;

    /// Destroys a render pass.
    fn destroy_render_pass(&self, id: RenderPassId);

    /// Creates a framebuffer.
    fn create_framebuffer(&self, info: &FramebufferInfo) -> Result<FramebufferId, ResourceError>;

    /// Destroys a framebuffer.
    fn destroy_framebuffer(&self, id: FramebufferId);

    // --- Commands ---

    /// Creates an empty command buffer.
    fn create_command_buffer(&self, info: &CommandBufferInfo)
        -> Result<CommandBuffer, ResourceError>;

    /// Releases a command buffer id.
    fn destroy_command_buffer(&self, id: CommandBufferId);

    // --- Transfers ---

    /// Uploads one source slice per region into a texture.
    ///
    /// Regions are processed in order. A region that fails its bounds check is logged
    /// and skipped; later regions still run. Returns the number of regions copied.
    fn copy_buffers_to_texture(
        &self,
        buffers: &[&[u8]],
        texture: TextureId,
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError>;

    /// Uploads decoded images into a texture, one image per region.
    fn copy_tex_images_to_texture(
        &self,
        images: &[TexImage<'_>],
        texture: TextureId,
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError> {
        let buffers: Vec<&[u8]> = images.iter().map(|img| img.pixels).collect();
        self.copy_buffers_to_texture(&buffers, texture, regions)
    }

    /// Reads back the first color attachment of a framebuffer into `buffer`.
    fn copy_framebuffer_to_buffer(
        &self,
        framebuffer: FramebufferId,
        buffer: &mut [u8],
        regions: &[BufferTextureCopy],
    ) -> Result<usize, ResourceError>;

    /// Copies a rectangle of `src`'s first color attachment into `dst`, scaling with
    /// `filter`. Used to resolve multisampled targets.
    fn blit_framebuffer(
        &self,
        src: FramebufferId,
        dst: FramebufferId,
        src_rect: Rect,
        dst_rect: Rect,
        filter: Filter,
    ) -> Result<(), ResourceError>;

    // --- Frame ---

    /// Executes recorded command buffers in order and accumulates draw statistics.
    fn submit(&self, command_buffers: &[&CommandBuffer]) -> Result<(), RenderError>;

    /// Ends the frame: publishes the accumulated statistics to `frame_stats` and resets
    /// the per-frame command allocator.
    fn present(&self) -> Result<(), RenderError>;

    /// Statistics of the last presented frame.
    fn frame_stats(&self) -> FrameStats;
}
