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

use std::sync::Arc;

use prism_core::math::{LinearRgba, Mat4, Vec4};
use prism_core::renderer::{
    ClearFlags, CommandBuffer, CommandBufferInfo, CommandBufferLevel, GraphicsDevice,
    TextureViewId, Viewport,
};
use prism_data::material::PropertyValue;
use prism_data::scene::{LocalBinding, MaterialSlot, Mesh, RenderScene, RenderView, SubModel};
use prism_data::MaterialError;

use super::{ensure_ready, RenderStage, StageState};
use crate::error::StageError;
use crate::pipeline::PipelineContext;

/// Resolves the offscreen scene target into the window with the builtin tone-map
/// material. Does nothing when post-processing is off.
#[derive(Debug)]
pub struct ToneMapStage {
    name: String,
    priority: u32,
    state: StageState,
    device: Option<Arc<dyn GraphicsDevice>>,
    command_buffer: Option<CommandBuffer>,
    quad: Option<SubModel>,
    local: Option<LocalBinding>,
    bound_view: Option<TextureViewId>,
}

impl Default for ToneMapStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneMapStage {
    /// An uninitialized stage.
    pub fn new() -> Self {
        Self {
            name: "tonemap".to_string(),
            priority: 0,
            state: StageState::Uninitialized,
            device: None,
            command_buffer: None,
            quad: None,
            local: None,
            bound_view: None,
        }
    }

    /// Sets the order of the stage in its flow.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    fn bind_input(&mut self, ctx: &PipelineContext, view: &RenderView) -> Result<bool, StageError> {
        let Some(offscreen) = ctx.offscreen() else {
            return Ok(false);
        };
        let Some(mut handle) = offscreen.texture_handle() else {
            log::warn!("ToneMapStage: scene target cannot be sampled");
            return Ok(false);
        };
        let builtins = ctx.system().builtins().ok_or(StageError::MissingBuiltins)?;
        let mut material = builtins
            .tonemap_material()
            .write()
            .map_err(|_| MaterialError::Poisoned("tonemap material".to_string()))?;
        if self.bound_view != handle.view {
            let view = handle.view;
            if let Some(sampler) = ctx.system().default_sampler() {
                handle = handle.with_sampler(sampler);
            }
            material.set_property("inputTexture", PropertyValue::Texture(handle), None);
            self.bound_view = view;
        }
        material.set_property(
            "toneParams",
            Vec4::new(view.exposure, 0.0, 0.0, 0.0).into(),
            None,
        );
        Ok(true)
    }
}

impl RenderStage for ToneMapStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn initialize(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        match self.state {
            StageState::Ready => return Ok(()),
            StageState::Destroyed => return Err(StageError::NotReady(self.name.clone())),
            StageState::Uninitialized => {}
        }
        let device = Arc::clone(ctx.device());
        let builtins = ctx.system().builtins().ok_or(StageError::MissingBuiltins)?;
        let material = Arc::clone(builtins.tonemap_material());
        self.quad = Some(SubModel::new(
            Arc::clone(&device),
            Mesh::fullscreen_quad(),
            MaterialSlot::Shared(material),
        )?);
        self.local = Some(LocalBinding::new(
            Arc::clone(&device),
            "tonemap-local",
            &Mat4::IDENTITY,
        )?);
        self.command_buffer = Some(device.create_command_buffer(&CommandBufferInfo {
            label: Some(self.name.clone()),
            level: CommandBufferLevel::Primary,
        })?);
        self.device = Some(device);
        self.state = StageState::Ready;
        Ok(())
    }

    fn render(
        &mut self,
        ctx: &PipelineContext,
        _scene: &mut RenderScene,
        view: &RenderView,
    ) -> Result<(), StageError> {
        ensure_ready(&*self)?;
        if !self.bind_input(ctx, view)? {
            return Ok(());
        }
        let window = ctx.window();
        let (Some(quad), Some(local), Some(cmd)) = (
            self.quad.as_mut(),
            self.local.as_ref(),
            self.command_buffer.as_mut(),
        ) else {
            return Err(StageError::NotReady(self.name.clone()));
        };
        quad.prepare(window.render_pass(), ctx.global_layout(), local.layout())?;
        let passes = quad.passes_for(window.render_pass());

        let area = ctx.window_area(view);
        cmd.begin();
        cmd.begin_render_pass(
            window.framebuffer(),
            window.render_pass(),
            area,
            ClearFlags::ALL,
            &[LinearRgba::BLACK],
            1.0,
            0,
        );
        cmd.set_viewport(Viewport::from_rect(area));
        cmd.set_scissor(area);
        for pass in passes {
            cmd.execute(std::slice::from_ref(&pass.package));
        }
        cmd.end_render_pass();
        cmd.end();
        ctx.device().submit(&[&*cmd])?;
        Ok(())
    }

    fn resize(&mut self, _ctx: &PipelineContext) -> Result<(), StageError> {
        self.bound_view = None;
        Ok(())
    }

    fn destroy(&mut self) {
        if self.state == StageState::Destroyed {
            return;
        }
        self.quad = None;
        self.local = None;
        self.bound_view = None;
        if let (Some(device), Some(cmd)) = (self.device.take(), self.command_buffer.take()) {
            device.destroy_command_buffer(cmd.id());
        }
        self.state = StageState::Destroyed;
    }
}
