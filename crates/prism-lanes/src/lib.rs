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

//! # Prism Lanes
//!
//! The frame side of the renderer. Per view, stages collect the scene's objects, sort
//! their pre-recorded draws into render queues, merge batchable draws, project planar
//! shadows and submit one command buffer each.
//!
//! A [`RenderPipeline`] owns ordered [`RenderFlow`]s of [`RenderStage`]s and the
//! [`PipelineContext`] they share: the device, the material system, the window and
//! offscreen targets and the global uniform binding.

#![warn(missing_docs)]

pub mod batch;
pub mod error;
pub mod flow;
pub mod pipeline;
pub mod queue;
pub mod settings;
pub mod shadow;
pub mod stage;
pub mod target;

#[cfg(test)]
mod testing;

pub use self::batch::{BatchedBuffer, BatchedQueue};
pub use self::error::StageError;
pub use self::flow::RenderFlow;
pub use self::pipeline::{PipelineContext, RenderPipeline};
pub use self::queue::{QueueEntry, RenderQueue, RenderQueueDesc, SortMode};
pub use self::settings::{PipelineSettings, ShadowSettings};
pub use self::shadow::PlanarShadowQueue;
pub use self::stage::{ForwardStage, RenderStage, StageState, ToneMapStage, UiStage};
pub use self::target::RenderTarget;
