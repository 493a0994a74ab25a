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

//! Render stages: the unit of work of a flow, each recording and submitting its own
//! command buffer.

mod forward;
mod tonemap;
mod ui;

pub use self::forward::ForwardStage;
pub use self::tonemap::ToneMapStage;
pub use self::ui::{UiStage, PHASE_UI};

use prism_data::scene::{RenderScene, RenderView};

use crate::error::StageError;
use crate::pipeline::PipelineContext;

/// Lifecycle of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    /// Created, `initialize` not called yet.
    #[default]
    Uninitialized,
    /// Resources are live; the stage can render.
    Ready,
    /// Resources were released; the stage cannot be used again.
    Destroyed,
}

/// A step of a [`RenderFlow`](crate::RenderFlow).
///
/// Stages render one view at a time into the target the [`PipelineContext`] hands
/// them. `resize` and `rebuild` keep a ready stage ready.
pub trait RenderStage: Send + Sync + std::fmt::Debug {
    /// A human-readable identifier, used in logs.
    fn name(&self) -> &str;

    /// Stages of a flow run in ascending priority.
    fn priority(&self) -> u32;

    /// The current lifecycle state.
    fn state(&self) -> StageState;

    /// Creates the stage's command buffer, queues and targets.
    fn initialize(&mut self, ctx: &PipelineContext) -> Result<(), StageError>;

    /// Records and submits the stage's work for `view`.
    fn render(
        &mut self,
        ctx: &PipelineContext,
        scene: &mut RenderScene,
        view: &RenderView,
    ) -> Result<(), StageError>;

    /// Recreates size-dependent resources after the window changed size.
    fn resize(&mut self, ctx: &PipelineContext) -> Result<(), StageError>;

    /// Recreates resources after the pipeline settings changed.
    fn rebuild(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        self.resize(ctx)
    }

    /// Releases everything. Calling it twice is harmless.
    fn destroy(&mut self);
}

pub(crate) fn ensure_ready(stage: &dyn RenderStage) -> Result<(), StageError> {
    match stage.state() {
        StageState::Ready => Ok(()),
        _ => Err(StageError::NotReady(stage.name().to_string())),
    }
}
