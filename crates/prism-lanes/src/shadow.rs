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

//! Planar shadows: shadow-casting models drawn again with the builtin planar-shadow
//! material, flattened onto a plane along the light direction.

use std::sync::Arc;

use ahash::AHashMap;
use prism_core::renderer::{
    BindingLayoutId, CommandBuffer, CommandPackage, GraphicsDevice, PipelineStateId, RenderPassId,
};
use prism_data::material::PropertyValue;
use prism_data::scene::{record_draw, RenderObject, RenderScene};
use prism_data::MaterialSystem;

use crate::error::StageError;
use crate::settings::ShadowSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ShadowKey {
    layout_hash: u32,
    render_pass: RenderPassId,
}

/// The shadow draws of one view.
#[derive(Debug)]
pub struct PlanarShadowQueue {
    device: Arc<dyn GraphicsDevice>,
    pipelines: AHashMap<ShadowKey, PipelineStateId>,
    generation: Option<u64>,
    packages: Vec<CommandPackage>,
}

impl PlanarShadowQueue {
    /// An empty queue.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            pipelines: AHashMap::new(),
            generation: None,
            packages: Vec::new(),
        }
    }

    fn release_pipelines(&mut self) {
        for (_, pso) in self.pipelines.drain() {
            self.device.destroy_pipeline_state(pso);
        }
    }

    /// Records a shadow draw for every sub-model of every shadow-casting model in
    /// `objects`. Does nothing when shadows are disabled.
    pub fn gather(
        &mut self,
        system: &MaterialSystem,
        settings: &ShadowSettings,
        scene: &RenderScene,
        objects: &[RenderObject],
        render_pass: RenderPassId,
        global_layout: BindingLayoutId,
    ) -> Result<(), StageError> {
        self.packages.clear();
        if !settings.enabled {
            return Ok(());
        }
        let builtins = system.builtins().ok_or(StageError::MissingBuiltins)?;
        let mut material = builtins
            .planar_shadow_material()
            .write()
            .map_err(|_| prism_data::MaterialError::Poisoned("planar shadow material".into()))?;
        material.set_property(
            "lightPlaneProj",
            PropertyValue::Matrix(settings.plane_projection()),
            None,
        );
        material.set_property("shadowColor", settings.color.into(), None);

        if self.generation != Some(material.generation()) {
            self.release_pipelines();
            self.generation = Some(material.generation());
        }
        let Some(pass) = material.pass(0) else {
            log::warn!("PlanarShadowQueue: planar shadow material has no pass");
            return Ok(());
        };

        for object in objects {
            let Some(model) = scene.get(object.model).filter(|m| m.cast_shadow) else {
                continue;
            };
            for sub_model in model.sub_models() {
                let ia_info = sub_model.input_assembler_info();
                let key = ShadowKey {
                    layout_hash: ia_info.layout_hash(),
                    render_pass,
                };
                let pso = match self.pipelines.get(&key) {
                    Some(&pso) => pso,
                    None => {
                        let info = pass.pipeline_state_info(
                            ia_info,
                            render_pass,
                            global_layout,
                            model.local_layout(),
                        );
                        let pso = self.device.create_pipeline_state(&info)?;
                        self.pipelines.insert(key, pso);
                        pso
                    }
                };
                let package = record_draw(
                    self.device.as_ref(),
                    pso,
                    global_layout,
                    pass.binding_layout(),
                    model.local_layout(),
                    sub_model.input_assembler(),
                    ia_info,
                )?;
                self.packages.push(package);
            }
        }
        Ok(())
    }

    /// Drops the draws of the previous view.
    pub fn clear(&mut self) {
        self.packages.clear();
    }

    /// Number of recorded shadow draws.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns `true` when no shadow is drawn.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Splices the shadow draws into `cmd`.
    pub fn record(&self, cmd: &mut CommandBuffer) {
        if !self.packages.is_empty() {
            cmd.execute(&self.packages);
        }
    }

    /// Releases the cached pipeline states.
    pub fn destroy(&mut self) {
        self.packages.clear();
        self.release_pipelines();
        self.generation = None;
    }
}

impl Drop for PlanarShadowQueue {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use prism_data::builtin::EFFECT_UNLIT;
    use prism_data::scene::{Mesh, RenderView};

    fn scene(fx: &Fixture) -> RenderScene {
        let material = fx.material(EFFECT_UNLIT, 0);
        let mut scene = RenderScene::new();
        let mut caster = fx.model(&material, Mesh::quad(1.0), 0.0);
        caster.cast_shadow = true;
        scene.add_model(caster);
        scene.add_model(fx.model(&material, Mesh::quad(1.0), 2.0));
        scene
    }

    #[test]
    fn disabled_shadows_record_nothing() {
        let fx = Fixture::new();
        let scene = scene(&fx);
        let objects = scene.collect(&RenderView::new("main"));
        let mut queue = PlanarShadowQueue::new(Arc::clone(&fx.device));
        queue
            .gather(
                &fx.system,
                &ShadowSettings::default(),
                &scene,
                &objects,
                fx.render_pass,
                fx.global_layout,
            )
            .unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn only_casters_get_a_shadow_draw() {
        let fx = Fixture::new();
        let scene = scene(&fx);
        let objects = scene.collect(&RenderView::new("main"));
        let settings = ShadowSettings {
            enabled: true,
            ..Default::default()
        };
        let mut queue = PlanarShadowQueue::new(Arc::clone(&fx.device));
        for _ in 0..2 {
            queue
                .gather(
                    &fx.system,
                    &settings,
                    &scene,
                    &objects,
                    fx.render_pass,
                    fx.global_layout,
                )
                .unwrap();
            assert_eq!(queue.len(), 1);
        }
        // same vertex layout and render pass: one pipeline state
        assert_eq!(queue.pipelines.len(), 1);

        queue.destroy();
        assert!(queue.is_empty());
        assert!(queue.pipelines.is_empty());
    }
}
