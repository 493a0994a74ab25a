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

use prism_core::asset::{BatchingScheme, EffectAsset};
use prism_core::math::{Mat4, Vec3};
use prism_core::renderer::{
    DeviceInfo, GraphicsDevice, SampleCount, VertexAttribute, VertexFormat, ATTR_POSITION,
};
use prism_data::builtin::EFFECT_UNLIT;
use prism_data::material::{Material, MaterialInfo, SharedMaterial};
use prism_data::scene::{Mesh, Model, RenderScene, RenderView};
use prism_data::MaterialSystem;
use prism_infra::{HeadlessAdapter, HeadlessDevice};
use prism_lanes::{PipelineSettings, RenderFlow, RenderPipeline, StageError, UiStage};

fn init() -> (Arc<HeadlessDevice>, Arc<MaterialSystem>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Arc::new(HeadlessDevice::new(HeadlessAdapter::desktop()));
    device
        .initialize(&DeviceInfo::default())
        .expect("headless device should initialize");
    let system = MaterialSystem::with_builtins(device.clone()).expect("builtins");
    (device, system)
}

/// Registers a copy of the unlit effect named `name`, edited by `edit`.
fn register_unlit_variant(
    system: &Arc<MaterialSystem>,
    name: &str,
    edit: impl FnOnce(&mut EffectAsset),
) {
    let mut effect = (*system.find_effect(EFFECT_UNLIT).expect("unlit effect")).clone();
    effect.name = name.to_string();
    edit(&mut effect);
    system.register_effect(Arc::new(effect));
}

fn material(system: &Arc<MaterialSystem>, effect: &str) -> SharedMaterial {
    let mut material = Material::new(Arc::clone(system));
    material
        .initialize(&MaterialInfo::named(effect))
        .expect("material");
    material.into_shared()
}

fn add_quad(
    scene: &mut RenderScene,
    device: &Arc<HeadlessDevice>,
    material: &SharedMaterial,
    x: f32,
    configure: impl FnOnce(&mut Model),
) {
    let mut model = Model::new(device.clone(), "quad").expect("model");
    model
        .add_shared(Mesh::quad(1.0), material)
        .expect("sub-model");
    model.set_world(Mat4::from_translation(Vec3::new(x, 0.0, -5.0)));
    configure(&mut model);
    scene.add_model(model);
}

fn pipeline(
    device: &Arc<HeadlessDevice>,
    system: &Arc<MaterialSystem>,
    settings: PipelineSettings,
) -> RenderPipeline {
    let mut pipeline = RenderPipeline::forward(settings);
    pipeline
        .initialize(device.clone(), Arc::clone(system))
        .expect("pipeline");
    pipeline
}

#[test]
fn forward_frame_draws_each_queued_pass_once() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &unlit, 0.0, |_| {});

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.triangles, 2);
    // forward only: the UI stage has nothing to draw
    assert_eq!(stats.command_buffers, 1);
    assert_eq!(stats.frame_number, 1);
}

#[test]
fn merged_draws_become_one_draw_call() {
    let (device, system) = init();
    register_unlit_variant(&system, "test-batched", |effect| {
        effect.techniques[0].passes[0].batching = BatchingScheme::Dynamic;
    });
    let batched = material(&system, "test-batched");
    let mut scene = RenderScene::new();
    for i in 0..4 {
        add_quad(&mut scene, &device, &batched, i as f32, |m| {
            m.dynamic_batching = true;
        });
    }

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.triangles, 8);

    // a second frame reuses the batch buffers
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn models_without_dynamic_batching_draw_separately() {
    let (device, system) = init();
    register_unlit_variant(&system, "test-batched-off", |effect| {
        effect.techniques[0].passes[0].batching = BatchingScheme::Dynamic;
    });
    let batched = material(&system, "test-batched-off");
    let mut scene = RenderScene::new();
    for i in 0..3 {
        add_quad(&mut scene, &device, &batched, i as f32, |_| {});
    }

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 3);
}

#[test]
fn batchable_transparent_passes_are_drawn_one_by_one() {
    let (device, system) = init();
    register_unlit_variant(&system, "test-batched-glass", |effect| {
        effect.techniques[1].passes[0].batching = BatchingScheme::Dynamic;
    });
    let mut glass = Material::new(Arc::clone(&system));
    glass
        .initialize(&MaterialInfo {
            technique: 1,
            ..MaterialInfo::named("test-batched-glass")
        })
        .expect("material");
    assert!(glass.passes()[0].is_transparent());
    let glass = glass.into_shared();
    let mut scene = RenderScene::new();
    for i in 0..3 {
        add_quad(&mut scene, &device, &glass, i as f32, |m| {
            m.dynamic_batching = true;
        });
    }

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(stats.triangles, 6);
}

#[test]
fn a_failing_sub_model_does_not_hide_its_siblings() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    // the unlit shader also reads a_uv, so this mesh cannot get a pipeline state
    let positions: [[f32; 3]; 4] = [
        [-0.5, -0.5, 0.0],
        [0.5, -0.5, 0.0],
        [0.5, 0.5, 0.0],
        [-0.5, 0.5, 0.0],
    ];
    let position_only = Mesh {
        attributes: vec![VertexAttribute {
            name: ATTR_POSITION.to_string(),
            format: VertexFormat::Float32x3,
            offset: 0,
        }],
        stride: 12,
        vertices: bytemuck::cast_slice(&positions).to_vec(),
        indices: vec![0, 1, 2, 0, 2, 3],
    };

    let mut model = Model::new(device.clone(), "mixed").expect("model");
    model.add_shared(position_only, &unlit).expect("sub-model");
    model.add_shared(Mesh::quad(1.0), &unlit).expect("sub-model");
    model.set_world(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
    let mut scene = RenderScene::new();
    scene.add_model(model);

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.triangles, 2);

    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn shadow_casters_add_a_planar_shadow_draw() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &unlit, 0.0, |m| m.cast_shadow = true);
    add_quad(&mut scene, &device, &unlit, 2.0, |_| {});

    let mut settings = PipelineSettings::default();
    settings.shadows.enabled = true;
    let mut pipeline = pipeline(&device, &system, settings);
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 3);

    // views outside the shadow visibility mask skip the shadows
    let mut settings = pipeline.settings().clone();
    settings.shadows.visibility = 1 << 7;
    pipeline.set_settings(settings).expect("settings");
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn post_process_adds_a_tonemap_pass() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &unlit, 0.0, |_| {});

    let settings = PipelineSettings {
        post_process: true,
        hdr: true,
        shading_scale: 0.5,
        ..Default::default()
    };
    let mut pipeline = pipeline(&device, &system, settings);
    let ctx = pipeline.context().expect("context");
    let offscreen = ctx.offscreen().expect("offscreen target");
    assert_eq!((offscreen.width(), offscreen.height()), (640, 360));
    assert!(offscreen.texture_handle().is_some());

    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.command_buffers, 2);
}

#[test]
fn msaa_renders_through_a_multisampled_target() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &unlit, 0.0, |_| {});

    let settings = PipelineSettings {
        msaa: SampleCount::X4,
        ..Default::default()
    };
    let mut pipeline = pipeline(&device, &system, settings);
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn ui_passes_draw_in_the_ui_flow_only() {
    let (device, system) = init();
    register_unlit_variant(&system, "test-ui", |effect| {
        effect.techniques[0].passes[0].phase = "ui".to_string();
    });
    let ui = material(&system, "test-ui");
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &ui, 0.0, |_| {});
    add_quad(&mut scene, &device, &unlit, 1.0, |_| {});

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.command_buffers, 2);
}

#[test]
fn views_render_in_priority_order_and_disabled_views_are_skipped() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &unlit, 0.0, |_| {});

    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    let mut hidden = RenderView::new("hidden");
    hidden.enabled = false;
    let mut overlay = RenderView::new("overlay");
    overlay.priority = 1;
    let stats = pipeline
        .render(&mut scene, &[overlay, RenderView::new("main"), hidden])
        .expect("frame");
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.command_buffers, 2);
}

#[test]
fn initialize_fails_without_a_main_window() {
    let (_device, system) = init();
    let uninitialized = Arc::new(HeadlessDevice::new(HeadlessAdapter::desktop()));
    assert!(uninitialized.main_window().is_none());

    let mut pipeline = RenderPipeline::forward(PipelineSettings::default());
    let err = pipeline
        .initialize(uninitialized, system)
        .expect_err("no window");
    assert!(matches!(err, StageError::MissingWindow));
    assert!(!pipeline.is_ready());
}

#[test]
fn render_before_initialize_is_an_error() {
    let mut pipeline = RenderPipeline::forward(PipelineSettings::default());
    let mut scene = RenderScene::new();
    let err = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect_err("not ready");
    assert!(matches!(err, StageError::NotReady(_)));
}

#[test]
fn resize_follows_the_window() {
    let (device, system) = init();
    let unlit = material(&system, EFFECT_UNLIT);
    let mut scene = RenderScene::new();
    add_quad(&mut scene, &device, &unlit, 0.0, |_| {});

    let settings = PipelineSettings {
        post_process: true,
        ..Default::default()
    };
    let mut pipeline = pipeline(&device, &system, settings);
    pipeline.resize(640, 480).expect("resize");
    let ctx = pipeline.context().expect("context");
    assert_eq!((ctx.window().width(), ctx.window().height()), (640, 480));
    let offscreen = ctx.offscreen().expect("offscreen target");
    assert_eq!((offscreen.width(), offscreen.height()), (640, 480));

    let stats = pipeline
        .render(&mut scene, &[RenderView::new("main")])
        .expect("frame");
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn settings_change_rebuilds_the_targets() {
    let (device, system) = init();
    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    assert!(pipeline.context().and_then(|c| c.offscreen()).is_none());

    pipeline
        .set_settings(PipelineSettings {
            post_process: true,
            ..Default::default()
        })
        .expect("settings");
    assert!(pipeline.context().and_then(|c| c.offscreen()).is_some());
}

#[test]
fn flows_added_later_are_initialized_and_ordered() {
    let (device, system) = init();
    let mut pipeline = pipeline(&device, &system, PipelineSettings::default());
    pipeline
        .add_flow(RenderFlow::new("overlay", 150).with_stage(UiStage::new()))
        .expect("flow");
    let names: Vec<&str> = pipeline.flows().iter().map(|f| f.name()).collect();
    assert_eq!(names, ["forward", "post-process", "overlay", "ui"]);
    let overlay = pipeline.flow("overlay").expect("overlay flow");
    assert_eq!(overlay.stages()[0].state(), prism_lanes::StageState::Ready);

    pipeline.destroy();
    assert!(!pipeline.is_ready());
    assert_eq!(
        pipeline.flows()[0].stages()[0].state(),
        prism_lanes::StageState::Destroyed
    );
}
