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

use prism_core::math::LinearRgba;
use prism_core::renderer::{
    ClearFlags, CommandBuffer, CommandBufferInfo, CommandBufferLevel, GraphicsDevice, LoadOp,
    RenderPassId, RenderPassInfo, Viewport,
};
use prism_data::scene::{RenderObject, RenderScene, RenderView};

use super::{ensure_ready, RenderStage, StageState};
use crate::error::StageError;
use crate::pipeline::PipelineContext;
use crate::queue::{QueueEntry, RenderQueue, RenderQueueDesc};

/// Phase drawn by [`UiStage`].
pub const PHASE_UI: &str = "ui";

/// Draws the passes of the `ui` phase over the window, keeping its color.
#[derive(Debug)]
pub struct UiStage {
    name: String,
    priority: u32,
    state: StageState,
    device: Option<Arc<dyn GraphicsDevice>>,
    command_buffer: Option<CommandBuffer>,
    render_pass: Option<RenderPassId>,
    phases: u32,
    opaque: RenderQueue,
    transparent: RenderQueue,
}

impl Default for UiStage {
    fn default() -> Self {
        Self::new()
    }
}

impl UiStage {
    /// An uninitialized stage.
    pub fn new() -> Self {
        Self {
            name: "ui".to_string(),
            priority: 0,
            state: StageState::Uninitialized,
            device: None,
            command_buffer: None,
            render_pass: None,
            phases: 0,
            opaque: RenderQueue::new(RenderQueueDesc::opaque(0)),
            transparent: RenderQueue::new(RenderQueueDesc::transparent(0)),
        }
    }

    /// Sets the order of the stage in its flow.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Number of draws queued for the last rendered view.
    pub fn queued(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    fn has_ui_pass(&self, scene: &RenderScene, object: &RenderObject) -> bool {
        let Some(model) = scene.get(object.model) else {
            return false;
        };
        model.sub_models().iter().any(|sm| {
            sm.material()
                .with(|m| m.passes().iter().any(|p| p.phase() & self.phases != 0))
                .unwrap_or(false)
        })
    }
}

impl RenderStage for UiStage {
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
        let window = ctx.window();
        let render_pass = device.create_render_pass(&RenderPassInfo::simple(
            window.color_format(),
            window.depth_stencil_format(),
            LoadOp::Load,
        ))?;
        let command_buffer = match device.create_command_buffer(&CommandBufferInfo {
            label: Some(self.name.clone()),
            level: CommandBufferLevel::Primary,
        }) {
            Ok(cmd) => cmd,
            Err(e) => {
                device.destroy_render_pass(render_pass);
                return Err(e.into());
            }
        };
        self.phases = ctx.system().phase_mask([PHASE_UI]);
        self.opaque = RenderQueue::new(RenderQueueDesc::opaque(self.phases));
        self.transparent = RenderQueue::new(RenderQueueDesc::transparent(self.phases));
        self.render_pass = Some(render_pass);
        self.command_buffer = Some(command_buffer);
        self.device = Some(device);
        self.state = StageState::Ready;
        Ok(())
    }

    fn render(
        &mut self,
        ctx: &PipelineContext,
        scene: &mut RenderScene,
        view: &RenderView,
    ) -> Result<(), StageError> {
        ensure_ready(&*self)?;
        let Some(render_pass) = self.render_pass else {
            return Err(StageError::NotReady(self.name.clone()));
        };
        let objects: Vec<RenderObject> = scene
            .collect(view)
            .into_iter()
            .filter(|object| self.has_ui_pass(scene, object))
            .collect();
        self.opaque.clear();
        self.transparent.clear();
        if objects.is_empty() {
            return Ok(());
        }
        scene.prepare(&objects, render_pass, ctx.global_layout());

        for object in &objects {
            let Some(model) = scene.get(object.model) else {
                continue;
            };
            for (index, sub_model) in model.sub_models().iter().enumerate() {
                for snapshot in sub_model.passes_for(render_pass) {
                    let entry = QueueEntry::from_snapshot(*object, index, snapshot);
                    if entry.transparent {
                        self.transparent.insert(entry);
                    } else {
                        self.opaque.insert(entry);
                    }
                }
            }
        }
        if self.opaque.is_empty() && self.transparent.is_empty() {
            return Ok(());
        }
        self.opaque.sort();
        self.transparent.sort();

        let window = ctx.window();
        let area = ctx.window_area(view);
        let Some(cmd) = self.command_buffer.as_mut() else {
            return Err(StageError::NotReady(self.name.clone()));
        };
        cmd.begin();
        cmd.begin_render_pass(
            window.framebuffer(),
            render_pass,
            area,
            ClearFlags::DEPTH_STENCIL,
            &[LinearRgba::BLACK],
            1.0,
            0,
        );
        cmd.set_viewport(Viewport::from_rect(area));
        cmd.set_scissor(area);
        self.opaque.record(cmd);
        self.transparent.record(cmd);
        cmd.end_render_pass();
        cmd.end();
        ctx.device().submit(&[&*cmd])?;
        Ok(())
    }

    fn resize(&mut self, _ctx: &PipelineContext) -> Result<(), StageError> {
        Ok(())
    }

    fn destroy(&mut self) {
        if self.state == StageState::Destroyed {
            return;
        }
        self.opaque.clear();
        self.transparent.clear();
        if let Some(device) = self.device.take() {
            if let Some(render_pass) = self.render_pass.take() {
                device.destroy_render_pass(render_pass);
            }
            if let Some(cmd) = self.command_buffer.take() {
                device.destroy_command_buffer(cmd.id());
            }
        }
        self.state = StageState::Destroyed;
    }
}
