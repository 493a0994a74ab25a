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

//! Flows: named, ordered groups of stages.

use prism_data::scene::{RenderScene, RenderView};

use crate::error::StageError;
use crate::pipeline::PipelineContext;
use crate::stage::RenderStage;

/// A named group of stages run in ascending stage priority.
#[derive(Debug)]
pub struct RenderFlow {
    name: String,
    priority: u32,
    stages: Vec<Box<dyn RenderStage>>,
}

impl RenderFlow {
    /// An empty flow.
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            stages: Vec::new(),
        }
    }

    /// Builder form of [`add_stage`](Self::add_stage).
    pub fn with_stage(mut self, stage: impl RenderStage + 'static) -> Self {
        self.add_stage(Box::new(stage));
        self
    }

    /// Inserts `stage` after the stages of lower or equal priority.
    pub fn add_stage(&mut self, stage: Box<dyn RenderStage>) {
        let at = self
            .stages
            .partition_point(|s| s.priority() <= stage.priority());
        self.stages.insert(at, stage);
    }

    /// The flow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flows of a pipeline run in ascending priority.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// The stages, in execution order.
    pub fn stages(&self) -> &[Box<dyn RenderStage>] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` for a flow without stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Initializes every stage, stopping at the first failure.
    pub fn initialize(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        for stage in &mut self.stages {
            stage.initialize(ctx).inspect_err(|e| {
                log::error!("RenderFlow '{}': stage '{}' failed: {e}", self.name, stage.name());
            })?;
        }
        Ok(())
    }

    /// Renders `view` through every stage.
    pub fn render(
        &mut self,
        ctx: &PipelineContext,
        scene: &mut RenderScene,
        view: &RenderView,
    ) -> Result<(), StageError> {
        for stage in &mut self.stages {
            stage.render(ctx, scene, view)?;
        }
        Ok(())
    }

    /// Forwards a window resize to every stage.
    pub fn resize(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        for stage in &mut self.stages {
            stage.resize(ctx)?;
        }
        Ok(())
    }

    /// Forwards a settings change to every stage.
    pub fn rebuild(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        for stage in &mut self.stages {
            stage.rebuild(ctx)?;
        }
        Ok(())
    }

    /// Destroys every stage.
    pub fn destroy(&mut self) {
        for stage in &mut self.stages {
            stage.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageState;

    #[derive(Debug)]
    struct Named(&'static str, u32);

    impl RenderStage for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn priority(&self) -> u32 {
            self.1
        }
        fn state(&self) -> StageState {
            StageState::Uninitialized
        }
        fn initialize(&mut self, _ctx: &PipelineContext) -> Result<(), StageError> {
            Ok(())
        }
        fn render(
            &mut self,
            _ctx: &PipelineContext,
            _scene: &mut RenderScene,
            _view: &RenderView,
        ) -> Result<(), StageError> {
            Ok(())
        }
        fn resize(&mut self, _ctx: &PipelineContext) -> Result<(), StageError> {
            Ok(())
        }
        fn destroy(&mut self) {}
    }

    #[test]
    fn stages_run_in_priority_order() {
        let flow = RenderFlow::new("test", 0)
            .with_stage(Named("late", 10))
            .with_stage(Named("early", 0))
            .with_stage(Named("middle", 5))
            .with_stage(Named("middle-2", 5));
        let names: Vec<&str> = flow.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["early", "middle", "middle-2", "late"]);
    }

    #[test]
    fn empty_flow() {
        let flow = RenderFlow::new("empty", 3);
        assert!(flow.is_empty());
        assert_eq!(flow.priority(), 3);
        assert_eq!(flow.name(), "empty");
    }
}
