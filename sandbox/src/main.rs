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

//! Renders a few frames of a small scene on the headless backend and logs the
//! statistics of each one.

use std::sync::Arc;

use anyhow::Context;
use prism_core::math::{LinearRgba, Mat4, Vec3};
use prism_core::renderer::{DeviceInfo, GraphicsDevice};
use prism_data::builtin::EFFECT_UNLIT;
use prism_data::material::{Material, MaterialInfo};
use prism_data::scene::{Mesh, Model, RenderScene};
use prism_data::MaterialSystem;
use prism_infra::{HeadlessAdapter, HeadlessDevice};
use prism_lanes::{PipelineSettings, RenderPipeline};

const FRAMES: u32 = 3;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let device = Arc::new(HeadlessDevice::new(HeadlessAdapter::desktop()));
    device
        .initialize(&DeviceInfo::default())
        .context("initializing the headless device")?;
    let system =
        MaterialSystem::with_builtins(device.clone()).context("creating builtin resources")?;

    let mut floor = Material::new(Arc::clone(&system));
    floor.initialize(&MaterialInfo::named(EFFECT_UNLIT))?;
    floor.set_property("mainColor", LinearRgba::rgb(0.4, 0.4, 0.45).into(), None);
    let floor = floor.into_shared();

    let mut glass = Material::new(Arc::clone(&system));
    glass.initialize(&MaterialInfo {
        technique: 1,
        ..MaterialInfo::named(EFFECT_UNLIT)
    })?;
    glass.set_property("mainColor", LinearRgba::new(0.2, 0.6, 1.0, 0.5).into(), None);
    let glass = glass.into_shared();

    let mut scene = RenderScene::new();
    let mut ground = Model::new(device.clone(), "ground")?;
    ground.add_shared(Mesh::quad(10.0), &floor)?;
    ground.set_world(Mat4::from_translation(Vec3::new(0.0, -1.0, -6.0)));
    scene.add_model(ground);
    for i in 0..3 {
        let mut model = Model::new(device.clone(), &format!("pane-{i}"))?;
        model.add_shared(Mesh::quad(1.0), &glass)?;
        model.set_world(Mat4::from_translation(Vec3::new(i as f32 - 1.0, 0.0, -4.0 - i as f32)));
        model.cast_shadow = true;
        scene.add_model(model);
    }

    let mut settings = PipelineSettings {
        hdr: true,
        post_process: true,
        ..Default::default()
    };
    settings.shadows.enabled = true;
    let mut view = settings.view("main");
    view.look_at(Vec3::new(0.0, 1.0, 2.0), Vec3::new(0.0, 0.0, -5.0), Vec3::Y)
        .perspective(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);

    let mut pipeline = RenderPipeline::forward(settings);
    pipeline
        .initialize(device.clone(), Arc::clone(&system))
        .context("initializing the render pipeline")?;

    for _ in 0..FRAMES {
        let stats = pipeline.render(&mut scene, std::slice::from_ref(&view))?;
        log::info!(
            "frame {}: {} draw calls, {} triangles, {} command buffers",
            stats.frame_number,
            stats.draw_calls,
            stats.triangles,
            stats.command_buffers
        );
    }

    pipeline.destroy();
    drop(scene);
    drop((floor, glass));
    system.teardown();
    device.destroy();
    Ok(())
}
