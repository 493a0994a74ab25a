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

//! Draws the scene: opaque queue, dynamic batches, planar shadows, then the
//! transparent queue, all in one render pass.

use std::sync::Arc;

use prism_core::asset::BatchingScheme;
use prism_core::math::Rect;
use prism_core::renderer::{
    CommandBuffer, CommandBufferInfo, CommandBufferLevel, Filter, GraphicsDevice, RenderPassId,
    SampleCount, Viewport,
};
use prism_data::material::{PHASE_DEFAULT, PHASE_FORWARD_ADD};
use prism_data::scene::{RenderObject, RenderScene, RenderView};

use super::{ensure_ready, RenderStage, StageState};
use crate::batch::BatchedQueue;
use crate::error::StageError;
use crate::pipeline::PipelineContext;
use crate::queue::{QueueEntry, RenderQueue, RenderQueueDesc};
use crate::shadow::PlanarShadowQueue;
use crate::target::RenderTarget;

/// The main scene stage.
#[derive(Debug)]
pub struct ForwardStage {
    name: String,
    priority: u32,
    state: StageState,
    device: Option<Arc<dyn GraphicsDevice>>,
    command_buffer: Option<CommandBuffer>,
    opaque: RenderQueue,
    transparent: RenderQueue,
    batched: Option<BatchedQueue>,
    shadows: Option<PlanarShadowQueue>,
    msaa: Option<RenderTarget>,
}

impl Default for ForwardStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardStage {
    /// An uninitialized stage.
    pub fn new() -> Self {
        Self {
            name: "forward".to_string(),
            priority: 0,
            state: StageState::Uninitialized,
            device: None,
            command_buffer: None,
            opaque: RenderQueue::new(RenderQueueDesc::opaque(0)),
            transparent: RenderQueue::new(RenderQueueDesc::transparent(0)),
            batched: None,
            shadows: None,
            msaa: None,
        }
    }

    /// Sets the order of the stage in its flow.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// The opaque queue of the last rendered view.
    pub fn opaque_queue(&self) -> &RenderQueue {
        &self.opaque
    }

    /// The transparent queue of the last rendered view.
    pub fn transparent_queue(&self) -> &RenderQueue {
        &self.transparent
    }

    /// The multisampled target, when MSAA is active.
    pub fn msaa_target(&self) -> Option<&RenderTarget> {
        self.msaa.as_ref()
    }

    fn create_msaa(ctx: &PipelineContext) -> Result<Option<RenderTarget>, StageError> {
        let samples = ctx.settings().effective_msaa(&ctx.device().capabilities());
        if samples == SampleCount::X1 {
            return Ok(None);
        }
        let target = ctx.scene_target();
        let msaa = RenderTarget::offscreen(
            Arc::clone(ctx.device()),
            "forward-msaa",
            target.color_format(),
            target.depth_stencil_format(),
            target.width(),
            target.height(),
            samples,
        )?;
        log::debug!("ForwardStage: {samples:?} target {}x{}", msaa.width(), msaa.height());
        Ok(Some(msaa))
    }

    fn classify(
        &mut self,
        scene: &RenderScene,
        objects: &[RenderObject],
        render_pass: RenderPassId,
    ) -> Result<(), StageError> {
        for object in objects {
            let Some(model) = scene.get(object.model) else {
                continue;
            };
            for (index, sub_model) in model.sub_models().iter().enumerate() {
                for snapshot in sub_model.passes_for(render_pass) {
                    let batchable = model.dynamic_batching
                        && snapshot.batching == BatchingScheme::Dynamic
                        && !snapshot.transparent
                        && self.opaque.accepts(snapshot.phase, false);
                    if batchable {
                        if let Some(batched) = self.batched.as_mut() {
                            if batched.merge(sub_model, snapshot, model.world())? {
                                continue;
                            }
                        }
                    }
                    let entry = QueueEntry::from_snapshot(*object, index, snapshot);
                    if entry.transparent {
                        self.transparent.insert(entry);
                    } else {
                        self.opaque.insert(entry);
                    }
                }
            }
        }
        Ok(())
    }
}

impl RenderStage for ForwardStage {
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
        let phases = ctx.system().phase_mask([PHASE_DEFAULT, PHASE_FORWARD_ADD]);
        self.opaque = RenderQueue::new(RenderQueueDesc::opaque(phases));
        self.transparent = RenderQueue::new(RenderQueueDesc::transparent(phases));
        self.msaa = Self::create_msaa(ctx)?;
        self.command_buffer = Some(device.create_command_buffer(&CommandBufferInfo {
            label: Some(self.name.clone()),
            level: CommandBufferLevel::Primary,
        })?);
        self.batched = Some(BatchedQueue::new(Arc::clone(&device)));
        self.shadows = Some(PlanarShadowQueue::new(Arc::clone(&device)));
        self.device = Some(device);
        self.state = StageState::Ready;
        log::debug!("ForwardStage: ready, phase mask {phases:#x}");
        Ok(())
    }

    fn render(
        &mut self,
        ctx: &PipelineContext,
        scene: &mut RenderScene,
        view: &RenderView,
    ) -> Result<(), StageError> {
        ensure_ready(&*self)?;
        let target = ctx.scene_target();
        let (framebuffer, render_pass) = match &self.msaa {
            Some(msaa) => (msaa.framebuffer(), msaa.render_pass()),
            None => (target.framebuffer(), target.render_pass()),
        };

        let objects = scene.collect(view);
        scene.prepare(&objects, render_pass, ctx.global_layout());

        self.opaque.clear();
        self.transparent.clear();
        if let Some(batched) = self.batched.as_mut() {
            batched.clear();
        }
        self.classify(scene, &objects, render_pass)?;
        self.opaque.sort();
        self.transparent.sort();
        if let Some(batched) = self.batched.as_mut() {
            batched.upload()?;
        }

        let settings = ctx.settings();
        if let Some(shadows) = self.shadows.as_mut() {
            if settings.shadows.enabled && view.sees(settings.shadows.visibility) {
                shadows.gather(
                    ctx.system(),
                    &settings.shadows,
                    scene,
                    &objects,
                    render_pass,
                    ctx.global_layout(),
                )?;
            } else {
                shadows.clear();
            }
        }

        let area = ctx.scene_area(view);
        let clear_color = settings.resolve_clear_color(view);
        let Some(cmd) = self.command_buffer.as_mut() else {
            return Err(StageError::NotReady(self.name.clone()));
        };
        cmd.begin();
        cmd.begin_render_pass(
            framebuffer,
            render_pass,
            area,
            view.clear_flags,
            &[clear_color],
            view.clear_depth,
            view.clear_stencil,
        );
        cmd.set_viewport(Viewport::from_rect(area));
        cmd.set_scissor(area);
        self.opaque.record(cmd);
        if let Some(batched) = &self.batched {
            batched.record(cmd, ctx.global_layout());
        }
        if let Some(shadows) = &self.shadows {
            shadows.record(cmd);
        }
        self.transparent.record(cmd);
        cmd.end_render_pass();
        cmd.end();
        ctx.device().submit(&[&*cmd])?;

        if let Some(msaa) = &self.msaa {
            let full = Rect::new(0, 0, target.width(), target.height());
            ctx.device().blit_framebuffer(
                msaa.framebuffer(),
                target.framebuffer(),
                full,
                full,
                Filter::Linear,
            )?;
        }
        log::trace!(
            "ForwardStage: view '{}' {} opaque, {} transparent",
            view.name,
            self.opaque.len(),
            self.transparent.len()
        );
        Ok(())
    }

    fn resize(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        if self.state != StageState::Ready {
            return Ok(());
        }
        self.msaa = None;
        self.msaa = Self::create_msaa(ctx)?;
        Ok(())
    }

    fn destroy(&mut self) {
        if self.state == StageState::Destroyed {
            return;
        }
        self.opaque.clear();
        self.transparent.clear();
        if let Some(mut batched) = self.batched.take() {
            batched.destroy();
        }
        if let Some(mut shadows) = self.shadows.take() {
            shadows.destroy();
        }
        self.msaa = None;
        if let (Some(device), Some(cmd)) = (self.device.take(), self.command_buffer.take()) {
            device.destroy_command_buffer(cmd.id());
        }
        self.state = StageState::Destroyed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use prism_data::builtin::EFFECT_UNLIT;
    use prism_data::scene::Mesh;

    #[test]
    fn transparent_passes_skip_the_batches() {
        let fx = Fixture::new();
        let mut effect = (*fx.system.find_effect(EFFECT_UNLIT).unwrap()).clone();
        effect.name = "batched-unlit".to_string();
        for technique in &mut effect.techniques {
            for pass in &mut technique.passes {
                pass.batching = BatchingScheme::Dynamic;
            }
        }
        fx.system.register_effect(Arc::new(effect));
        let solid = fx.material("batched-unlit", 0);
        let glass = fx.material("batched-unlit", 1);

        let mut scene = RenderScene::new();
        for (i, material) in [&solid, &glass, &solid, &glass].into_iter().enumerate() {
            let mut model = fx.model(material, Mesh::quad(1.0), i as f32);
            model.dynamic_batching = true;
            scene.add_model(model);
        }
        let objects = scene.collect(&RenderView::new("main"));

        let phases = fx.system.phase_mask([PHASE_DEFAULT, PHASE_FORWARD_ADD]);
        let mut stage = ForwardStage::new();
        stage.opaque = RenderQueue::new(RenderQueueDesc::opaque(phases));
        stage.transparent = RenderQueue::new(RenderQueueDesc::transparent(phases));
        stage.batched = Some(BatchedQueue::new(Arc::clone(&fx.device)));
        stage.classify(&scene, &objects, fx.render_pass).unwrap();

        assert!(stage.opaque_queue().is_empty());
        assert_eq!(stage.transparent_queue().len(), 2);
        let batched = stage.batched.as_ref().unwrap();
        assert_eq!(batched.len(), 1);
        assert_eq!(batched.batches().next().unwrap().merged(), 2);
    }
}
