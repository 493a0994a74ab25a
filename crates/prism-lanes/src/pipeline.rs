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

//! The frame pipeline: an ordered list of flows sharing one [`PipelineContext`].

use std::sync::Arc;

use prism_core::math::Rect;
use prism_core::renderer::{
    BindingLayoutId, BindingLayoutInfo, BindingUnit, BufferId, BufferInfo, FrameStats,
    GraphicsDevice, ResourceError, SampleCount,
};
use prism_data::scene::{global_block, RenderScene, RenderView};
use prism_data::MaterialSystem;

use crate::error::StageError;
use crate::flow::RenderFlow;
use crate::settings::PipelineSettings;
use crate::stage::{ForwardStage, ToneMapStage, UiStage};
use crate::target::RenderTarget;

/// Priority of the flow drawing the scene.
pub const FLOW_FORWARD: u32 = 0;
/// Priority of the post-process flow.
pub const FLOW_POST_PROCESS: u32 = 100;
/// Priority of the UI flow.
pub const FLOW_UI: u32 = 200;

/// What every stage of a pipeline shares: the device, the material system, the
/// settings, the render targets and the global uniform binding.
#[derive(Debug)]
pub struct PipelineContext {
    device: Arc<dyn GraphicsDevice>,
    system: Arc<MaterialSystem>,
    settings: PipelineSettings,
    window: RenderTarget,
    offscreen: Option<RenderTarget>,
    global_buffer: BufferId,
    global_layout: BindingLayoutId,
}

impl PipelineContext {
    fn new(
        device: Arc<dyn GraphicsDevice>,
        system: Arc<MaterialSystem>,
        settings: PipelineSettings,
    ) -> Result<Self, StageError> {
        let window = device.main_window().ok_or_else(|| {
            log::error!("RenderPipeline: device has no main window");
            StageError::MissingWindow
        })?;
        let block = global_block();
        let global_buffer =
            device.create_buffer(&BufferInfo::uniform("global", u64::from(block.size())))?;
        let info = BindingLayoutInfo::from_reflection("global", &[block], &[]);
        let global_layout = match device.create_binding_layout(&info) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_buffer(global_buffer);
                return Err(e.into());
            }
        };
        let mut ctx = Self {
            device,
            system,
            settings,
            window: RenderTarget::window(&window),
            offscreen: None,
            global_buffer,
            global_layout,
        };
        let unit = BindingUnit {
            buffer: Some(global_buffer),
            ..BindingUnit::uniform_buffer(0)
        };
        ctx.device.update_binding_layout(global_layout, &[unit])?;
        ctx.offscreen = ctx.create_offscreen()?;
        Ok(ctx)
    }

    fn create_offscreen(&self) -> Result<Option<RenderTarget>, ResourceError> {
        if !self.settings.post_process {
            return Ok(None);
        }
        let caps = self.device.capabilities();
        let scale = self.settings.effective_shading_scale();
        let width = ((self.window.width() as f32 * scale).round() as u32).max(1);
        let height = ((self.window.height() as f32 * scale).round() as u32).max(1);
        let format = self
            .settings
            .scene_format(&caps, self.window.color_format());
        RenderTarget::offscreen(
            Arc::clone(&self.device),
            "scene",
            format,
            self.window.depth_stencil_format(),
            width,
            height,
            SampleCount::X1,
        )
        .map(Some)
    }

    fn refresh_targets(&mut self) -> Result<(), StageError> {
        let window = self
            .device
            .main_window()
            .ok_or(StageError::MissingWindow)?;
        self.window = RenderTarget::window(&window);
        self.offscreen = None;
        self.offscreen = self.create_offscreen()?;
        Ok(())
    }

    /// The graphics device.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// The material system.
    pub fn system(&self) -> &Arc<MaterialSystem> {
        &self.system
    }

    /// The settings the targets were built with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The device's main window.
    pub fn window(&self) -> &RenderTarget {
        &self.window
    }

    /// The offscreen scene target, present when post-processing is on.
    pub fn offscreen(&self) -> Option<&RenderTarget> {
        self.offscreen.as_ref()
    }

    /// Where the scene is drawn: the offscreen target, or the window.
    pub fn scene_target(&self) -> &RenderTarget {
        self.offscreen.as_ref().unwrap_or(&self.window)
    }

    /// The binding layout of set 0.
    pub fn global_layout(&self) -> BindingLayoutId {
        self.global_layout
    }

    /// The pixel area `view` covers on the scene target.
    pub fn scene_area(&self, view: &RenderView) -> Rect {
        let target = self.scene_target();
        view.render_area(target.width(), target.height(), 1.0)
    }

    /// The pixel area `view` covers on the window.
    pub fn window_area(&self, view: &RenderView) -> Rect {
        view.render_area(self.window.width(), self.window.height(), 1.0)
    }

    /// Uploads the global uniforms of `view`.
    pub fn write_globals(&self, view: &RenderView) -> Result<(), ResourceError> {
        let scale = if self.offscreen.is_some() {
            self.settings.effective_shading_scale()
        } else {
            1.0
        };
        let uniforms = view.global_uniforms(scale);
        self.device
            .update_buffer(self.global_buffer, 0, bytemuck::bytes_of(&uniforms))
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        if let Some(mut offscreen) = self.offscreen.take() {
            offscreen.destroy();
        }
        self.device.destroy_binding_layout(self.global_layout);
        self.device.destroy_buffer(self.global_buffer);
    }
}

/// Flows run in ascending priority, each running its stages for every view.
#[derive(Debug)]
pub struct RenderPipeline {
    settings: PipelineSettings,
    flows: Vec<RenderFlow>,
    context: Option<PipelineContext>,
}

impl RenderPipeline {
    /// A pipeline without flows.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            flows: Vec::new(),
            context: None,
        }
    }

    /// The forward pipeline: scene, tone mapping (when post-processing is on) and UI.
    pub fn forward(settings: PipelineSettings) -> Self {
        let mut pipeline = Self::new(settings);
        pipeline.flows = vec![
            RenderFlow::new("forward", FLOW_FORWARD).with_stage(ForwardStage::new()),
            RenderFlow::new("post-process", FLOW_POST_PROCESS).with_stage(ToneMapStage::new()),
            RenderFlow::new("ui", FLOW_UI).with_stage(UiStage::new()),
        ];
        pipeline
    }

    /// Adds a flow after the flows of lower or equal priority. A flow added to an
    /// initialized pipeline is initialized immediately.
    pub fn add_flow(&mut self, mut flow: RenderFlow) -> Result<(), StageError> {
        if let Some(ctx) = &self.context {
            flow.initialize(ctx)?;
        }
        let at = self
            .flows
            .partition_point(|f| f.priority() <= flow.priority());
        self.flows.insert(at, flow);
        Ok(())
    }

    /// Builds the shared context and initializes every flow. Fails without a main
    /// window; a failing flow tears down the ones already initialized.
    pub fn initialize(
        &mut self,
        device: Arc<dyn GraphicsDevice>,
        system: Arc<MaterialSystem>,
    ) -> Result<(), StageError> {
        if self.context.is_some() {
            log::warn!("RenderPipeline: already initialized");
            return Ok(());
        }
        self.flows.sort_by_key(RenderFlow::priority);
        let ctx = PipelineContext::new(device, system, self.settings.clone())?;
        let mut failure = None;
        for flow in &mut self.flows {
            if let Err(e) = flow.initialize(&ctx) {
                log::error!("RenderPipeline: flow '{}' failed to initialize: {e}", flow.name());
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            for flow in &mut self.flows {
                flow.destroy();
            }
            return Err(e);
        }
        log::info!("RenderPipeline: initialized {} flows", self.flows.len());
        self.context = Some(ctx);
        Ok(())
    }

    /// Returns `true` once `initialize` succeeded.
    pub fn is_ready(&self) -> bool {
        self.context.is_some()
    }

    /// Renders every enabled view, in ascending view priority, then presents.
    /// Returns the statistics of the presented frame.
    pub fn render(
        &mut self,
        scene: &mut RenderScene,
        views: &[RenderView],
    ) -> Result<FrameStats, StageError> {
        let ctx = self
            .context
            .as_ref()
            .ok_or_else(|| StageError::NotReady("RenderPipeline".to_string()))?;
        let mut views: Vec<&RenderView> = views.iter().filter(|v| v.enabled).collect();
        views.sort_by_key(|v| v.priority);
        for view in views {
            ctx.write_globals(view)?;
            for flow in &mut self.flows {
                flow.render(ctx, scene, view)?;
            }
        }
        ctx.device.present()?;
        Ok(ctx.device.frame_stats())
    }

    /// Resizes the main window and the targets depending on it.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), StageError> {
        let Some(ctx) = self.context.as_mut() else {
            return Ok(());
        };
        ctx.device.resize(width, height);
        ctx.refresh_targets()?;
        for flow in &mut self.flows {
            flow.resize(ctx)?;
        }
        Ok(())
    }

    /// Replaces the settings and rebuilds every flow.
    pub fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), StageError> {
        self.settings = settings;
        let Some(ctx) = self.context.as_mut() else {
            return Ok(());
        };
        ctx.settings = self.settings.clone();
        ctx.refresh_targets()?;
        for flow in &mut self.flows {
            flow.rebuild(ctx)?;
        }
        Ok(())
    }

    /// The current settings.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The flows, in execution order.
    pub fn flows(&self) -> &[RenderFlow] {
        &self.flows
    }

    /// The flow named `name`.
    pub fn flow(&self, name: &str) -> Option<&RenderFlow> {
        self.flows.iter().find(|f| f.name() == name)
    }

    /// The shared context, once initialized.
    pub fn context(&self) -> Option<&PipelineContext> {
        self.context.as_ref()
    }

    /// Destroys every flow and releases the shared context. Calling it twice is
    /// harmless.
    pub fn destroy(&mut self) {
        for flow in &mut self.flows {
            flow.destroy();
        }
        if self.context.take().is_some() {
            log::debug!("RenderPipeline: destroyed");
        }
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
