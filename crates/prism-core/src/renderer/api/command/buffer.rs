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

//! Backend-agnostic command recording.
//!
//! A [`CommandBuffer`] records [`GfxCommand`]s into a plain list. Backends replay the
//! list at `submit` time. Secondary buffers are frozen into cheaply clonable
//! [`CommandPackage`]s that primary buffers splice in with [`CommandBuffer::execute`].

use std::sync::Arc;

use super::pass::{FramebufferId, RenderPassId};
use crate::math::{LinearRgba, Rect};
use crate::renderer::api::pipeline::{
    BindingLayoutId, InputAssemblerId, InputAssemblerInfo, PipelineStateId,
};
use crate::renderer::api::util::ClearFlags;

/// An opaque handle to a command buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Whether a buffer is submitted directly or executed from another buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandBufferLevel {
    /// Submitted to the device.
    #[default]
    Primary,
    /// Executed inside a primary buffer's render pass.
    Secondary,
}

/// Describes a command buffer to create.
#[derive(Debug, Clone, Default)]
pub struct CommandBufferInfo {
    /// A debug label.
    pub label: Option<String>,
    /// Buffer level.
    pub level: CommandBufferLevel,
}

/// A viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
    /// Near depth.
    pub min_depth: f32,
    /// Far depth.
    pub max_depth: f32,
}

impl Viewport {
    /// A full-depth viewport covering `rect`.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            left: rect.x,
            top: rect.y,
            width: rect.width,
            height: rect.height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Parameters of one draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawInfo {
    /// Vertices to draw for non-indexed draws.
    pub vertex_count: u32,
    /// First vertex.
    pub first_vertex: u32,
    /// Indices to draw, 0 for non-indexed draws.
    pub index_count: u32,
    /// First index.
    pub first_index: u32,
    /// Instances to draw.
    pub instance_count: u32,
}

impl DrawInfo {
    /// Draws the whole of an input assembler.
    pub fn from_input_assembler(info: &InputAssemblerInfo) -> Self {
        Self {
            vertex_count: info.vertex_count,
            first_vertex: 0,
            index_count: info.index_count,
            first_index: 0,
            instance_count: info.instance_count.max(1),
        }
    }

    /// Triangles produced by this draw, assuming a triangle list.
    pub fn triangles(&self) -> u64 {
        let elements = if self.index_count > 0 {
            self.index_count
        } else {
            self.vertex_count
        };
        u64::from(elements / 3) * u64::from(self.instance_count)
    }
}

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum GfxCommand {
    /// Starts a render pass.
    BeginRenderPass {
        /// Target framebuffer.
        framebuffer: FramebufferId,
        /// Render pass the framebuffer is compatible with.
        render_pass: RenderPassId,
        /// Area affected by rendering and clears.
        render_area: Rect,
        /// Which attachments to clear.
        clear_flags: ClearFlags,
        /// Clear color per color attachment.
        clear_colors: Vec<LinearRgba>,
        /// Depth clear value.
        depth: f32,
        /// Stencil clear value.
        stencil: u32,
    },
    /// Ends the current render pass.
    EndRenderPass,
    /// Binds a pipeline state object.
    BindPipelineState(PipelineStateId),
    /// Binds a binding layout at a set index.
    BindBindingLayout {
        /// Set index.
        set: u32,
        /// The layout.
        layout: BindingLayoutId,
    },
    /// Binds vertex and index buffers.
    BindInputAssembler(InputAssemblerId),
    /// Sets the viewport.
    SetViewport(Viewport),
    /// Sets the scissor rectangle.
    SetScissor(Rect),
    /// Issues a draw.
    Draw(DrawInfo),
    /// Replays a secondary package.
    Execute(CommandPackage),
}

/// Draw statistics gathered while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandStats {
    /// Draw calls.
    pub draw_calls: u32,
    /// Instances.
    pub instances: u32,
    /// Triangles.
    pub triangles: u64,
}

impl CommandStats {
    fn add_draw(&mut self, draw: &DrawInfo) {
        self.draw_calls += 1;
        self.instances += draw.instance_count;
        self.triangles += draw.triangles();
    }

    /// Adds another set of statistics.
    pub fn accumulate(&mut self, other: &CommandStats) {
        self.draw_calls += other.draw_calls;
        self.instances += other.instances;
        self.triangles += other.triangles;
    }
}

/// A frozen, shareable list of commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPackage {
    commands: Arc<[GfxCommand]>,
    stats: CommandStats,
}

impl CommandPackage {
    /// The recorded commands.
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    /// Statistics of the recorded commands, including nested packages.
    pub fn stats(&self) -> CommandStats {
        self.stats
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Records commands for later submission.
#[derive(Debug)]
pub struct CommandBuffer {
    id: CommandBufferId,
    label: Option<String>,
    level: CommandBufferLevel,
    commands: Vec<GfxCommand>,
    in_render_pass: bool,
    stats: CommandStats,
}

impl CommandBuffer {
    /// Creates an empty buffer. Devices call this from `create_command_buffer`.
    pub fn new(id: CommandBufferId, info: &CommandBufferInfo) -> Self {
        Self {
            id,
            label: info.label.clone(),
            level: info.level,
            commands: Vec::new(),
            in_render_pass: false,
            stats: CommandStats::default(),
        }
    }

    /// The buffer id.
    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    /// The debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The buffer level.
    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Discards everything recorded and starts a new recording.
    pub fn begin(&mut self) {
        self.commands.clear();
        self.in_render_pass = false;
        self.stats = CommandStats::default();
    }

    /// Finishes recording. An open render pass is closed.
    pub fn end(&mut self) {
        if self.in_render_pass {
            log::warn!(
                "CommandBuffer {:?}: render pass left open at end of recording",
                self.id
            );
            self.end_render_pass();
        }
    }

    /// Starts a render pass.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_render_pass(
        &mut self,
        framebuffer: FramebufferId,
        render_pass: RenderPassId,
        render_area: Rect,
        clear_flags: ClearFlags,
        clear_colors: &[LinearRgba],
        depth: f32,
        stencil: u32,
    ) {
        if self.in_render_pass {
            log::warn!(
                "CommandBuffer {:?}: nested render pass, closing the previous one",
                self.id
            );
            self.end_render_pass();
        }
        self.commands.push(GfxCommand::BeginRenderPass {
            framebuffer,
            render_pass,
            render_area,
            clear_flags,
            clear_colors: clear_colors.to_vec(),
            depth,
            stencil,
        });
        self.in_render_pass = true;
    }

    /// Ends the current render pass.
    pub fn end_render_pass(&mut self) {
        if !self.in_render_pass {
            return;
        }
        self.commands.push(GfxCommand::EndRenderPass);
        self.in_render_pass = false;
    }

    /// Returns `true` between `begin_render_pass` and `end_render_pass`.
    pub fn is_in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    /// Binds a pipeline state object.
    pub fn bind_pipeline_state(&mut self, pso: PipelineStateId) {
        self.commands.push(GfxCommand::BindPipelineState(pso));
    }

    /// Binds a binding layout at `set`.
    pub fn bind_binding_layout(&mut self, set: u32, layout: BindingLayoutId) {
        self.commands
            .push(GfxCommand::BindBindingLayout { set, layout });
    }

    /// Binds vertex and index buffers.
    pub fn bind_input_assembler(&mut self, ia: InputAssemblerId) {
        self.commands.push(GfxCommand::BindInputAssembler(ia));
    }

    /// Sets the viewport.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(GfxCommand::SetViewport(viewport));
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor(&mut self, rect: Rect) {
        self.commands.push(GfxCommand::SetScissor(rect));
    }

    fn can_draw(&self) -> bool {
        self.in_render_pass || self.level == CommandBufferLevel::Secondary
    }

    /// Records a draw. Primary buffers ignore draws outside a render pass.
    pub fn draw(&mut self, draw: DrawInfo) {
        if !self.can_draw() {
            log::warn!(
                "CommandBuffer {:?}: draw outside of a render pass ignored",
                self.id
            );
            return;
        }
        self.stats.add_draw(&draw);
        self.commands.push(GfxCommand::Draw(draw));
    }

    /// Splices secondary packages into this buffer.
    pub fn execute(&mut self, packages: &[CommandPackage]) {
        if !self.can_draw() {
            log::warn!(
                "CommandBuffer {:?}: execute outside of a render pass ignored",
                self.id
            );
            return;
        }
        for package in packages.iter().filter(|p| !p.is_empty()) {
            self.stats.accumulate(&package.stats);
            self.commands.push(GfxCommand::Execute(package.clone()));
        }
    }

    /// The recorded commands.
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    /// Statistics of everything recorded so far.
    pub fn stats(&self) -> CommandStats {
        self.stats
    }

    /// Freezes the current recording into a package.
    pub fn package(&self) -> CommandPackage {
        CommandPackage {
            commands: Arc::from(self.commands.as_slice()),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary() -> CommandBuffer {
        CommandBuffer::new(CommandBufferId(1), &CommandBufferInfo::default())
    }

    fn secondary() -> CommandBuffer {
        CommandBuffer::new(
            CommandBufferId(2),
            &CommandBufferInfo {
                label: Some("secondary".into()),
                level: CommandBufferLevel::Secondary,
            },
        )
    }

    fn indexed(index_count: u32, instance_count: u32) -> DrawInfo {
        DrawInfo {
            index_count,
            instance_count,
            ..DrawInfo::default()
        }
    }

    #[test]
    fn primary_ignores_draws_outside_render_pass() {
        let mut cmd = primary();
        cmd.begin();
        cmd.draw(indexed(6, 1));
        assert!(cmd.commands().is_empty());
        assert_eq!(cmd.stats().draw_calls, 0);
    }

    #[test]
    fn draw_counts_triangles_per_instance() {
        let mut cmd = primary();
        cmd.begin();
        cmd.begin_render_pass(
            FramebufferId(0),
            RenderPassId(0),
            Rect::new(0, 0, 4, 4),
            ClearFlags::ALL,
            &[LinearRgba::BLACK],
            1.0,
            0,
        );
        cmd.draw(indexed(36, 2));
        cmd.draw(DrawInfo {
            vertex_count: 3,
            instance_count: 1,
            ..DrawInfo::default()
        });
        cmd.end();
        let stats = cmd.stats();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.instances, 3);
        assert_eq!(stats.triangles, 25);
        assert_eq!(cmd.commands().last(), Some(&GfxCommand::EndRenderPass));
    }

    #[test]
    fn executed_packages_carry_their_stats() {
        let mut sub = secondary();
        sub.begin();
        sub.bind_pipeline_state(PipelineStateId(3));
        sub.draw(indexed(6, 1));
        let package = sub.package();
        assert_eq!(package.len(), 2);

        let mut cmd = primary();
        cmd.begin();
        cmd.begin_render_pass(
            FramebufferId(0),
            RenderPassId(0),
            Rect::new(0, 0, 4, 4),
            ClearFlags::COLOR,
            &[LinearRgba::BLACK],
            1.0,
            0,
        );
        cmd.execute(&[package.clone(), package]);
        cmd.end_render_pass();
        assert_eq!(cmd.stats().draw_calls, 2);
        assert_eq!(cmd.stats().triangles, 4);
    }
}
