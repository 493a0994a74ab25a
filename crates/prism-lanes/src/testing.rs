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

//! Headless fixtures shared by the unit tests.

use std::sync::Arc;

use prism_core::math::{Mat4, Vec3};
use prism_core::renderer::{
    BindingLayoutId, BindingLayoutInfo, DeviceInfo, GraphicsDevice, RenderPassId,
};
use prism_data::material::{Material, MaterialInfo, SharedMaterial};
use prism_data::scene::{global_block, Mesh, Model};
use prism_data::MaterialSystem;
use prism_infra::{HeadlessAdapter, HeadlessDevice};

pub(crate) struct Fixture {
    pub device: Arc<dyn GraphicsDevice>,
    pub system: Arc<MaterialSystem>,
    pub render_pass: RenderPassId,
    pub global_layout: BindingLayoutId,
}

impl Fixture {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let device: Arc<dyn GraphicsDevice> =
            Arc::new(HeadlessDevice::new(HeadlessAdapter::desktop()));
        device.initialize(&DeviceInfo::default()).unwrap();
        let system = MaterialSystem::with_builtins(Arc::clone(&device)).unwrap();
        let render_pass = device.main_window().unwrap().render_pass;
        let global_layout = device
            .create_binding_layout(&BindingLayoutInfo::from_reflection(
                "global",
                &[global_block()],
                &[],
            ))
            .unwrap();
        Self {
            device,
            system,
            render_pass,
            global_layout,
        }
    }

    /// A shared material of `effect` using technique `technique`.
    pub fn material(&self, effect: &str, technique: usize) -> SharedMaterial {
        let mut material = Material::new(Arc::clone(&self.system));
        material
            .initialize(&MaterialInfo {
                technique,
                ..MaterialInfo::named(effect)
            })
            .unwrap();
        material.into_shared()
    }

    /// A model holding `mesh` at `x`, prepared for the window render pass.
    pub fn model(&self, material: &SharedMaterial, mesh: Mesh, x: f32) -> Model {
        let mut model = Model::new(Arc::clone(&self.device), "model").unwrap();
        model.add_shared(mesh, material).unwrap();
        model.set_world(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)));
        model
            .prepare(self.render_pass, self.global_layout)
            .unwrap();
        model
    }
}
