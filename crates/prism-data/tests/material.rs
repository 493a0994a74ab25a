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

use prism_core::asset::{DefineMap, EffectAsset, MacroValue, PassStates};
use prism_core::math::{LinearRgba, Vec4};
use prism_core::renderer::{DeviceInfo, GraphicsDevice, TextureViewId};
use prism_data::builtin::{EFFECT_MISSING, EFFECT_UNLIT};
use prism_data::material::{
    Material, MaterialInfo, PassOverrides, PropertyValue, TextureHandle, PHASE_SHADOW_CASTER,
};
use prism_data::scene::{MaterialSlot, Mesh, Model, RenderScene, RenderView};
use prism_data::{MaterialError, MaterialSystem};
use prism_infra::{HeadlessAdapter, HeadlessDevice};

fn init() -> (Arc<HeadlessDevice>, Arc<MaterialSystem>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Arc::new(HeadlessDevice::new(HeadlessAdapter::desktop()));
    device
        .initialize(&DeviceInfo::default())
        .expect("headless device should initialize");
    let system = MaterialSystem::with_builtins(device.clone()).expect("builtins");
    (device, system)
}

fn unlit(system: &Arc<MaterialSystem>, info: MaterialInfo) -> Material {
    let mut material = Material::new(Arc::clone(system));
    material.initialize(&info).expect("unlit material");
    material
}

fn defines(pairs: &[(&str, bool)]) -> DefineMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), MacroValue::Bool(*v)))
        .collect()
}

fn red() -> PropertyValue {
    LinearRgba::rgb(1.0, 0.0, 0.0).into()
}

#[test]
fn pass_count_follows_enabled_technique_passes() {
    let (_device, system) = init();
    let mut material = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    assert_eq!(material.pass_count(), 1);

    material
        .recompile_shaders(&defines(&[("CAST_SHADOW", true)]), None)
        .unwrap();
    assert_eq!(material.pass_count(), 2);
    assert_eq!(material.passes()[1].phase_name(), PHASE_SHADOW_CASTER);

    assert!(material.set_property("mainColor", red(), None));
    assert_eq!(material.pass_count(), 2);

    let mut copy = Material::new(Arc::clone(&system));
    copy.copy_from(&material).unwrap();
    assert_eq!(copy.pass_count(), 2);

    material.set_technique(1).unwrap();
    assert_eq!(material.pass_count(), 1);
    assert!(material.passes()[0].is_transparent());

    let switched_off = unlit(
        &system,
        MaterialInfo {
            effect_name: Some(EFFECT_UNLIT.into()),
            defines: PassOverrides::Each(vec![DefineMap::new(), defines(&[("CAST_SHADOW", false)])]),
            ..MaterialInfo::default()
        },
    );
    assert_eq!(switched_off.pass_count(), 1);
}

#[test]
fn material_hash_is_deterministic_and_sensitive() {
    let (_device, system) = init();
    let a = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    let b = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    assert_eq!(a.hash(), b.hash());
    let base = a.hash();

    let mut with_property = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    with_property.set_property("mainColor", red(), None);
    assert_ne!(with_property.hash(), base);

    let mut with_define = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    with_define
        .recompile_shaders(&defines(&[("USE_TEXTURE", true)]), None)
        .unwrap();
    assert_ne!(with_define.hash(), base);

    let mut with_states = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    with_states
        .override_pipeline_states(
            &PassStates {
                priority: Some(7),
                ..PassStates::default()
            },
            None,
        )
        .unwrap();
    assert_ne!(with_states.hash(), base);
    assert_eq!(with_states.passes()[0].priority(), 7);

    let mut with_technique = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    with_technique.set_technique(1).unwrap();
    assert_ne!(with_technique.hash(), base);

    let other_effect = unlit(&system, MaterialInfo::named(EFFECT_MISSING));
    assert_ne!(other_effect.hash(), base);
}

#[test]
fn copy_from_preserves_properties() {
    let (_device, system) = init();
    let mut a = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    let color = PropertyValue::Vector(Vec4::new(0.1, 0.2, 0.3, 0.4));
    assert!(a.set_property("mainColor", color.clone(), None));

    let mut b = Material::new(Arc::clone(&system));
    b.copy_from(&a).unwrap();
    assert_eq!(b.get_property("mainColor", None), Some(&color));
    assert_eq!(b.get_property("mainColor", None), a.get_property("mainColor", None));
    assert_eq!(b.hash(), a.hash());
    assert_eq!(
        b.passes()[0].uniform_data(0),
        a.passes()[0].uniform_data(0)
    );
}

#[test]
fn unknown_property_is_ignored() {
    let (_device, system) = init();
    let mut material = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    let hash = material.hash();
    assert!(!material.set_property("doesNotExist", PropertyValue::Scalar(1.0), None));
    assert_eq!(material.get_property("doesNotExist", None), None);
    assert_eq!(material.hash(), hash);

    assert!(!material.set_property("mainColor", red(), Some(5)));
    assert_eq!(material.get_property("mainColor", None), None);
}

#[test]
fn unknown_technique_keeps_the_material() {
    let (_device, system) = init();
    let mut material = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    let (hash, generation) = (material.hash(), material.generation());

    let err = material.set_technique(99).unwrap_err();
    assert!(matches!(
        err,
        MaterialError::TechniqueOutOfRange {
            index: 99,
            count: 2,
            ..
        }
    ));
    assert_eq!(material.pass_count(), 1);
    assert_eq!(material.technique_index(), 0);
    assert_eq!(material.hash(), hash);
    assert_eq!(material.generation(), generation);
}

#[test]
fn incomplete_textures_are_rejected() {
    let (_device, system) = init();
    let mut material = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    let incomplete = TextureHandle {
        view: Some(TextureViewId(9999)),
        sampler: None,
        width: 0,
        height: 4,
    };
    assert!(!material.set_property("mainTexture", incomplete.into(), None));

    let white = system.builtin_texture("white").unwrap();
    assert!(material.set_property("mainTexture", white.into(), None));
    assert_eq!(material.passes()[0].texture_view(1), white.view);
}

#[test]
fn null_effect_uses_missing_passes() {
    let (_device, system) = init();
    let material = unlit(&system, MaterialInfo::default());
    let builtins = system.builtins().unwrap();
    let missing = builtins.missing_material().read().unwrap();

    assert_eq!(material.pass_count(), missing.pass_count());
    for (a, b) in material.passes().iter().zip(missing.passes()) {
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.program().key, b.program().key);
    }
    assert_eq!(material.effect_name().as_deref(), Some(EFFECT_MISSING));
}

#[test]
fn unknown_effect_name_fails() {
    let (_device, system) = init();
    let mut material = Material::new(Arc::clone(&system));
    let err = material
        .initialize(&MaterialInfo::named("nope"))
        .unwrap_err();
    assert!(matches!(err, MaterialError::EffectNotFound(name) if name == "nope"));

    let err = material
        .initialize(&MaterialInfo {
            effect_name: Some(EFFECT_UNLIT.into()),
            technique: 9,
            ..MaterialInfo::default()
        })
        .unwrap_err();
    assert!(matches!(err, MaterialError::TechniqueOutOfRange { index: 9, count: 2, .. }));
    assert_eq!(material.pass_count(), 0);
}

#[test]
fn variants_are_shared_between_materials() {
    let (_device, system) = init();
    let _a = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    let before = system.variant_count();
    let _b = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
    assert_eq!(system.variant_count(), before);

    let _c = unlit(
        &system,
        MaterialInfo {
            effect_name: Some(EFFECT_UNLIT.into()),
            defines: PassOverrides::All(defines(&[("USE_TEXTURE", true)])),
            ..MaterialInfo::default()
        },
    );
    assert_eq!(system.variant_count(), before + 1);
}

#[test]
fn effects_load_from_json() {
    let (_device, system) = init();
    let effect: EffectAsset = serde_json::from_value(serde_json::json!({
        "name": "flat",
        "techniques": [{ "passes": [{ "program": "flat", "priority": 10 }] }],
        "shaders": [{
            "name": "flat",
            "vert": "@vertex fn main() {}",
            "frag": "@fragment fn main() {}",
            "blocks": [{ "name": "Flat", "binding": 0, "members": [{ "name": "tint", "type": "float4" }] }]
        }]
    }))
    .unwrap();
    let mut material = Material::new(Arc::clone(&system));
    material
        .initialize(&MaterialInfo::with_effect(Arc::new(effect)))
        .unwrap();
    assert_eq!(material.passes()[0].priority(), 10);
    assert!(system.find_effect("flat").is_some());
    assert!(material.set_property("tint", PropertyValue::Vector(Vec4::ONE), None));
}

#[test]
fn rejected_arrays_stage_nothing() {
    let (_device, system) = init();
    let effect: EffectAsset = serde_json::from_value(serde_json::json!({
        "name": "layered",
        "techniques": [{ "passes": [{ "program": "layered" }] }],
        "shaders": [{
            "name": "layered",
            "vert": "@vertex fn main() {}",
            "frag": "@fragment fn main() {}",
            "blocks": [{
                "name": "Layers",
                "binding": 0,
                "members": [
                    { "name": "weights", "type": "float4", "count": 3 },
                    { "name": "tint", "type": "float4" }
                ]
            }],
            "samplers": [{ "name": "layers", "binding": 1, "type": "sampler2d", "count": 2 }]
        }]
    }))
    .unwrap();
    let mut material = Material::new(Arc::clone(&system));
    material
        .initialize(&MaterialInfo::with_effect(Arc::new(effect)))
        .unwrap();
    let white = system.builtin_texture("white").unwrap();
    let staged = material.passes()[0].uniform_data(0).unwrap().to_vec();
    let views = (
        material.passes()[0].texture_view(1),
        material.passes()[0].texture_view(2),
    );

    let mixed = PropertyValue::Array(vec![PropertyValue::Vector(Vec4::ONE), white.into()]);
    assert!(!material.set_property("weights", mixed, None));
    assert_eq!(material.passes()[0].uniform_data(0).unwrap(), staged.as_slice());

    let incomplete = TextureHandle {
        view: Some(TextureViewId(9999)),
        sampler: None,
        width: 0,
        height: 4,
    };
    let textures = PropertyValue::Array(vec![white.into(), incomplete.into()]);
    assert!(!material.set_property("layers", textures, None));
    assert_eq!(material.passes()[0].texture_view(1), views.0);
    assert_eq!(material.passes()[0].texture_view(2), views.1);

    // a later flush carries only the accepted write
    let mut reference = Material::new(Arc::clone(&system));
    reference.copy_from(&material).unwrap();
    assert!(material.set_property("tint", red(), None));
    assert!(reference.set_property("tint", red(), None));
    assert_eq!(material.hash(), reference.hash());
    assert_eq!(material.get_property("weights", None), None);

    let weights = PropertyValue::Array(vec![
        PropertyValue::Vector(Vec4::ONE),
        PropertyValue::Scalar(2.0),
    ]);
    assert!(material.set_property("weights", weights, None));
    let data = material.passes()[0].uniform_data(0).unwrap();
    let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&data[..48]);
    assert_eq!(&floats[..4], &[1.0, 1.0, 1.0, 1.0]);
    assert_eq!(floats[4], 2.0);
    assert_eq!(&floats[8..12], &[0.0; 4]);
}

#[test]
fn instances_diverge_and_notify_their_owner() {
    let (device, system) = init();
    let parent = unlit(&system, MaterialInfo::named(EFFECT_UNLIT)).into_shared();
    let parent_hash = parent.read().unwrap().hash();

    let mut scene = RenderScene::new();
    let mut model = Model::new(device.clone(), "quad").unwrap();
    model
        .add_sub_model(Mesh::quad(1.0), MaterialSlot::Shared(parent.clone()))
        .unwrap();
    let handle = scene.add_model(model);
    assert!(scene.instantiate_material(handle, 0).unwrap());

    let sub_model = scene.get_mut(handle).unwrap().sub_model_mut(0).unwrap();
    let instance = sub_model.instance_mut().unwrap();
    assert!(instance.set_property("mainColor", red(), None));
    assert_eq!(scene.process_material_events(), 1);

    let parent_guard = parent.read().unwrap();
    assert_eq!(parent_guard.hash(), parent_hash);
    assert_eq!(parent_guard.get_property("mainColor", None), None);
    drop(parent_guard);

    let instance = scene
        .get_mut(handle)
        .unwrap()
        .sub_model_mut(0)
        .unwrap()
        .instance_mut()
        .unwrap();
    instance.set_notify(false);
    instance.set_property("mainColor", PropertyValue::Scalar(0.5), None);
    assert_eq!(scene.process_material_events(), 0);

    scene.remove_model(handle);
    assert_eq!(parent.read().unwrap().pass_count(), 1);
}

#[test]
fn collect_filters_by_visibility_and_enabled() {
    let (device, system) = init();
    let material = unlit(&system, MaterialInfo::named(EFFECT_UNLIT)).into_shared();
    let mut scene = RenderScene::new();
    let mut handles = Vec::new();
    for (i, visibility) in [1u32, 2, 1].into_iter().enumerate() {
        let mut model = Model::new(device.clone(), &format!("m{i}")).unwrap();
        model.visibility = visibility;
        model.add_shared(Mesh::triangle(), &material).unwrap();
        handles.push(scene.add_model(model));
    }
    scene.get_mut(handles[2]).unwrap().enabled = false;

    let view = RenderView::new("main");
    let objects = scene.collect(&view);
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].model, handles[0]);

    let removed = scene.remove_model(handles[0]).unwrap();
    drop(removed);
    assert!(scene.get(handles[0]).is_none());
    let reused = scene.add_model(Model::new(device.clone(), "again").unwrap());
    assert_eq!(reused.index(), handles[0].index());
    assert_ne!(reused, handles[0]);
}

#[test]
fn teardown_releases_every_resource() {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Arc::new(HeadlessDevice::new(HeadlessAdapter::desktop()));
    device.initialize(&DeviceInfo::default()).unwrap();
    let baseline = device.live_resource_count();

    let system = MaterialSystem::with_builtins(device.clone()).unwrap();
    {
        let mut material = unlit(&system, MaterialInfo::named(EFFECT_UNLIT));
        material.set_property("mainColor", red(), None);
        assert!(device.live_resource_count() > baseline);
        material.destroy();
        material.destroy();
    }
    system.teardown();
    system.teardown();
    assert_eq!(device.live_resource_count(), baseline);
    assert!(system.builtin_texture("white").is_none());
}
