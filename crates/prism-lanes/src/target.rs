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

//! Framebuffers the stages render into.

use std::sync::Arc;

use prism_core::renderer::{
    FramebufferId, FramebufferInfo, GraphicsDevice, LoadOp, RenderPassId, RenderPassInfo,
    ResourceError, SampleCount, TextureFormat, TextureId, TextureInfo, TextureViewId,
    TextureViewInfo, WindowTarget,
};
use prism_data::material::TextureHandle;

/// A render pass with a compatible framebuffer. Offscreen targets own their
/// attachments; the window target borrows the device's.
#[derive(Debug)]
pub struct RenderTarget {
    owner: Option<Arc<dyn GraphicsDevice>>,
    render_pass: RenderPassId,
    framebuffer: FramebufferId,
    color_texture: TextureId,
    color_view: Option<TextureViewId>,
    depth_stencil_texture: Option<TextureId>,
    width: u32,
    height: u32,
    color_format: TextureFormat,
    depth_stencil_format: Option<TextureFormat>,
    samples: SampleCount,
}

impl RenderTarget {
    /// Wraps the device's main window.
    pub fn window(window: &WindowTarget) -> Self {
        Self {
            owner: None,
            render_pass: window.render_pass,
            framebuffer: window.framebuffer,
            color_texture: window.color_texture,
            color_view: None,
            depth_stencil_texture: window.depth_stencil_texture,
            width: window.width,
            height: window.height,
            color_format: window.color_format,
            depth_stencil_format: window.depth_stencil_format,
            samples: SampleCount::X1,
        }
    }

    /// Creates a color target with an optional depth/stencil attachment. Single-sample
    /// targets get a view so later stages can sample them.
    #[allow(clippy::too_many_arguments)]
    pub fn offscreen(
        device: Arc<dyn GraphicsDevice>,
        label: &str,
        color_format: TextureFormat,
        depth_stencil_format: Option<TextureFormat>,
        width: u32,
        height: u32,
        samples: SampleCount,
    ) -> Result<Self, ResourceError> {
        let mut textures = Vec::new();
        let result = Self::create_attachments(
            device.as_ref(),
            label,
            color_format,
            depth_stencil_format,
            width,
            height,
            samples,
            &mut textures,
        );
        match result {
            Ok((render_pass, framebuffer, color_view)) => Ok(Self {
                owner: Some(device),
                render_pass,
                framebuffer,
                color_texture: textures[0],
                color_view,
                depth_stencil_texture: textures.get(1).copied(),
                width,
                height,
                color_format,
                depth_stencil_format,
                samples,
            }),
            Err(e) => {
                log::error!("RenderTarget: cannot create '{label}': {e}");
                for texture in textures {
                    device.destroy_texture(texture);
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_attachments(
        device: &dyn GraphicsDevice,
        label: &str,
        color_format: TextureFormat,
        depth_stencil_format: Option<TextureFormat>,
        width: u32,
        height: u32,
        samples: SampleCount,
        textures: &mut Vec<TextureId>,
    ) -> Result<(RenderPassId, FramebufferId, Option<TextureViewId>), ResourceError> {
        let color_info = TextureInfo {
            samples,
            ..TextureInfo::attachment(label, color_format, width, height)
        };
        textures.push(device.create_texture(&color_info)?);
        if let Some(format) = depth_stencil_format {
            let info = TextureInfo {
                samples,
                ..TextureInfo::attachment(label, format, width, height)
            };
            textures.push(device.create_texture(&info)?);
        }

        let mut pass_info =
            RenderPassInfo::simple(color_format, depth_stencil_format, LoadOp::Clear);
        for attachment in &mut pass_info.color_attachments {
            attachment.samples = samples;
        }
        if let Some(ds) = &mut pass_info.depth_stencil_attachment {
            ds.samples = samples;
        }
        let render_pass = device.create_render_pass(&pass_info)?;
        let framebuffer = match device.create_framebuffer(&FramebufferInfo {
            render_pass,
            color_textures: vec![textures[0]],
            depth_stencil_texture: textures.get(1).copied(),
        }) {
            Ok(fb) => fb,
            Err(e) => {
                device.destroy_render_pass(render_pass);
                return Err(e);
            }
        };
        if samples != SampleCount::X1 {
            return Ok((render_pass, framebuffer, None));
        }
        match device.create_texture_view(&TextureViewInfo::whole(textures[0], &color_info)) {
            Ok(view) => Ok((render_pass, framebuffer, Some(view))),
            Err(e) => {
                device.destroy_framebuffer(framebuffer);
                device.destroy_render_pass(render_pass);
                Err(e)
            }
        }
    }

    /// The render pass pipeline states must be built against.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }

    /// The framebuffer.
    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    /// The color attachment.
    pub fn color_texture(&self) -> TextureId {
        self.color_texture
    }

    /// A sampleable view of the color attachment, single-sample offscreen targets only.
    pub fn color_view(&self) -> Option<TextureViewId> {
        self.color_view
    }

    /// The depth/stencil attachment.
    pub fn depth_stencil_texture(&self) -> Option<TextureId> {
        self.depth_stencil_texture
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color format.
    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    /// Depth/stencil format.
    pub fn depth_stencil_format(&self) -> Option<TextureFormat> {
        self.depth_stencil_format
    }

    /// Samples per pixel.
    pub fn samples(&self) -> SampleCount {
        self.samples
    }

    /// Returns `true` when the target owns its attachments.
    pub fn is_offscreen(&self) -> bool {
        self.owner.is_some()
    }

    /// The color attachment as a material texture.
    pub fn texture_handle(&self) -> Option<TextureHandle> {
        self.color_view
            .map(|view| TextureHandle::new(view, self.width, self.height))
    }

    /// Releases owned attachments. Window targets are left alone.
    pub fn destroy(&mut self) {
        let Some(device) = self.owner.take() else {
            return;
        };
        if let Some(view) = self.color_view.take() {
            device.destroy_texture_view(view);
        }
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_render_pass(self.render_pass);
        if let Some(depth) = self.depth_stencil_texture {
            device.destroy_texture(depth);
        }
        device.destroy_texture(self.color_texture);
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn offscreen_target_can_be_sampled() {
        let fx = Fixture::new();
        let mut target = RenderTarget::offscreen(
            Arc::clone(&fx.device),
            "scene",
            TextureFormat::Rgba16Float,
            Some(TextureFormat::Depth24PlusStencil8),
            320,
            200,
            SampleCount::X1,
        )
        .unwrap();
        assert!(target.is_offscreen());
        let handle = target.texture_handle().unwrap();
        assert_eq!((handle.width, handle.height), (320, 200));

        target.destroy();
        target.destroy();
        assert!(!target.is_offscreen());
    }

    #[test]
    fn multisampled_target_has_no_view() {
        let fx = Fixture::new();
        let target = RenderTarget::offscreen(
            Arc::clone(&fx.device),
            "msaa",
            TextureFormat::Rgba8Unorm,
            Some(TextureFormat::Depth24PlusStencil8),
            64,
            64,
            SampleCount::X4,
        )
        .unwrap();
        assert_eq!(target.samples(), SampleCount::X4);
        assert!(target.texture_handle().is_none());
    }

    #[test]
    fn window_targets_are_borrowed() {
        let fx = Fixture::new();
        let window = fx.device.main_window().unwrap();
        let mut target = RenderTarget::window(&window);
        assert!(!target.is_offscreen());
        target.destroy();
        // the window attachments are still alive
        assert_eq!(fx.device.main_window().unwrap(), window);
    }
}
