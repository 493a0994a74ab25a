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

//! Builtin resources: default textures, the default sampler, the builtin effects and
//! the materials the render pipeline uses internally.
//!
//! Builtin shaders are WGSL and follow the binding convention of every Prism program:
//! set 0 holds the global block (`view_proj`, `camera_pos`, `params`), set 1 the pass
//! resources and set 2 the local block (`world`). A uniform block or texture declared
//! at binding `b` lives at WGSL binding `2 * b`; the sampler of a texture at `2 * b + 1`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use ahash::AHashMap;
use prism_core::asset::EffectAsset;
use prism_core::math::Extent3D;
use prism_core::renderer::{
    BufferTextureCopy, GraphicsDevice, SamplerId, SamplerInfo, TextureFormat, TextureId,
    TextureInfo, TextureViewId, TextureViewInfo,
};
use serde_json::json;

use crate::error::MaterialError;
use crate::material::{Material, MaterialInfo, SharedMaterial, TextureHandle};
use crate::system::MaterialSystem;

/// Name of the effect used by materials without one.
pub const EFFECT_MISSING: &str = "builtin-missing";
/// Name of the unlit effect.
pub const EFFECT_UNLIT: &str = "builtin-unlit";
/// Name of the planar shadow effect.
pub const EFFECT_PLANAR_SHADOW: &str = "builtin-planar-shadow";
/// Name of the tone mapping effect.
pub const EFFECT_TONEMAP: &str = "builtin-tonemap";

/// Names of the builtin textures.
pub const BUILTIN_TEXTURES: [&str; 4] = ["white", "black", "grey", "normal"];

const TEXTURE_SIZE: u32 = 2;

const GLOBAL_WGSL: &str = "struct Global {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
    params: vec4<f32>,
};
@group(0) @binding(0) var<uniform> global: Global;
struct Local {
    world: mat4x4<f32>,
};
@group(2) @binding(0) var<uniform> local: Local;
";

const MISSING_VERT: &str = "@vertex
fn main(@location(0) a_position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return global.view_proj * local.world * vec4<f32>(a_position, 1.0);
}
";

const MISSING_FRAG: &str = "@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 1.0, 1.0);
}
";

const UNLIT_VERT: &str = "struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};
@vertex
fn main(@location(0) a_position: vec3<f32>, @location(1) a_uv: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = global.view_proj * local.world * vec4<f32>(a_position, 1.0);
    out.uv = a_uv;
    return out;
}
";

const UNLIT_FRAG: &str = "struct Unlit {
    mainColor: vec4<f32>,
};
@group(1) @binding(0) var<uniform> unlit: Unlit;
#if USE_TEXTURE
@group(1) @binding(2) var mainTexture: texture_2d<f32>;
@group(1) @binding(3) var mainSampler: sampler;
#endif
@fragment
fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    var color = unlit.mainColor;
#if USE_TEXTURE
    color = color * textureSample(mainTexture, mainSampler, uv);
#endif
    return color;
}
";

const PLANAR_SHADOW_VERT: &str = "struct PlanarShadow {
    lightPlaneProj: mat4x4<f32>,
    shadowColor: vec4<f32>,
};
@group(1) @binding(0) var<uniform> shadow: PlanarShadow;
@vertex
fn main(@location(0) a_position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let world = local.world * vec4<f32>(a_position, 1.0);
    let projected = shadow.lightPlaneProj * world;
    return global.view_proj * vec4<f32>(projected.xyz / projected.w, 1.0);
}
";

const PLANAR_SHADOW_FRAG: &str = "struct PlanarShadow {
    lightPlaneProj: mat4x4<f32>,
    shadowColor: vec4<f32>,
};
@group(1) @binding(0) var<uniform> shadow: PlanarShadow;
@fragment
fn main() -> @location(0) vec4<f32> {
    return shadow.shadowColor;
}
";

const TONEMAP_VERT: &str = "struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};
@vertex
fn main(@location(0) a_position: vec3<f32>, @location(1) a_uv: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = vec4<f32>(a_position.xy, 0.0, 1.0);
    out.uv = a_uv;
    return out;
}
";

const TONEMAP_FRAG: &str = "struct ToneMap {
    toneParams: vec4<f32>,
};
@group(1) @binding(0) var<uniform> tonemap: ToneMap;
@group(1) @binding(2) var inputTexture: texture_2d<f32>;
@group(1) @binding(3) var inputSampler: sampler;
fn aces(x: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return clamp((x * (a * x + b)) / (x * (c * x + d) + e), vec3<f32>(0.0), vec3<f32>(1.0));
}
@fragment
fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let hdr = textureSample(inputTexture, inputSampler, uv);
#if PRISM_TONEMAP_ACES
    return vec4<f32>(aces(hdr.rgb * tonemap.toneParams.x), hdr.a);
#else
    return vec4<f32>(hdr.rgb * tonemap.toneParams.x, hdr.a);
#endif
}
";

fn with_globals(source: &str) -> String {
    format!("{GLOBAL_WGSL}{source}")
}

fn position_attribute() -> serde_json::Value {
    json!({ "name": "a_position", "format": "float32x3", "location": 0 })
}

fn uv_attribute() -> serde_json::Value {
    json!({ "name": "a_uv", "format": "float32x2", "location": 1 })
}

fn parse_effect(value: serde_json::Value) -> Result<Arc<EffectAsset>, MaterialError> {
    serde_json::from_value::<EffectAsset>(value)
        .map(Arc::new)
        .map_err(|e| MaterialError::InvalidBuiltin(e.to_string()))
}

/// The effects shipped with the renderer.
pub fn builtin_effects() -> Result<Vec<Arc<EffectAsset>>, MaterialError> {
    let missing = json!({
        "name": EFFECT_MISSING,
        "techniques": [{ "name": "opaque", "passes": [{ "program": EFFECT_MISSING }] }],
        "shaders": [{
            "name": EFFECT_MISSING,
            "vert": with_globals(MISSING_VERT),
            "frag": MISSING_FRAG,
            "attributes": [position_attribute()]
        }]
    });

    let unlit = json!({
        "name": EFFECT_UNLIT,
        "techniques": [
            {
                "name": "opaque",
                "passes": [
                    { "program": EFFECT_UNLIT, "properties": { "mainColor": [1.0, 1.0, 1.0, 1.0] } },
                    {
                        "program": EFFECT_UNLIT,
                        "phase": "shadow-caster",
                        "switch": "CAST_SHADOW",
                        "rasterizer": { "cull_mode": "front" }
                    }
                ]
            },
            {
                "name": "transparent",
                "passes": [{
                    "program": EFFECT_UNLIT,
                    "depth_stencil": { "depth_write": false },
                    "blend": { "targets": [{
                        "blend": true,
                        "src": "src_alpha",
                        "dst": "one_minus_src_alpha",
                        "src_alpha": "one",
                        "dst_alpha": "one_minus_src_alpha"
                    }] },
                    "properties": { "mainColor": [1.0, 1.0, 1.0, 1.0] }
                }]
            }
        ],
        "shaders": [{
            "name": EFFECT_UNLIT,
            "vert": with_globals(UNLIT_VERT),
            "frag": UNLIT_FRAG,
            "attributes": [position_attribute(), uv_attribute()],
            "blocks": [{
                "name": "Unlit",
                "binding": 0,
                "members": [{ "name": "mainColor", "type": "float4" }]
            }],
            "samplers": [{ "name": "mainTexture", "binding": 1, "type": "sampler2d" }],
            "defines": ["USE_TEXTURE"]
        }]
    });

    let planar_shadow = json!({
        "name": EFFECT_PLANAR_SHADOW,
        "techniques": [{
            "name": "planar-shadow",
            "passes": [{
                "program": EFFECT_PLANAR_SHADOW,
                "phase": "planar-shadow",
                "priority": 200,
                "depth_stencil": { "depth_write": false, "depth_func": "less_equal" },
                "blend": { "targets": [{
                    "blend": true,
                    "src": "src_alpha",
                    "dst": "one_minus_src_alpha",
                    "src_alpha": "one",
                    "dst_alpha": "one_minus_src_alpha"
                }] },
                "properties": { "shadowColor": [0.0, 0.0, 0.0, 0.3] }
            }]
        }],
        "shaders": [{
            "name": EFFECT_PLANAR_SHADOW,
            "vert": with_globals(PLANAR_SHADOW_VERT),
            "frag": PLANAR_SHADOW_FRAG,
            "attributes": [position_attribute()],
            "blocks": [{
                "name": "PlanarShadow",
                "binding": 0,
                "members": [
                    { "name": "lightPlaneProj", "type": "mat4" },
                    { "name": "shadowColor", "type": "float4" }
                ]
            }]
        }]
    });

    let tonemap = json!({
        "name": EFFECT_TONEMAP,
        "techniques": [{
            "name": "post-process",
            "passes": [{
                "program": EFFECT_TONEMAP,
                "phase": "post-process",
                "defines": { "PRISM_TONEMAP_ACES": true },
                "depth_stencil": { "depth_test": false, "depth_write": false },
                "rasterizer": { "cull_mode": "none" },
                "properties": { "toneParams": [1.0, 0.0, 0.0, 0.0] }
            }]
        }],
        "shaders": [{
            "name": EFFECT_TONEMAP,
            "vert": TONEMAP_VERT,
            "frag": TONEMAP_FRAG,
            "attributes": [position_attribute(), uv_attribute()],
            "blocks": [{
                "name": "ToneMap",
                "binding": 0,
                "members": [{ "name": "toneParams", "type": "float4" }]
            }],
            "samplers": [{ "name": "inputTexture", "binding": 1, "type": "sampler2d" }],
            "defines": ["PRISM_TONEMAP_ACES"]
        }]
    });

    [missing, unlit, planar_shadow, tonemap]
        .into_iter()
        .map(parse_effect)
        .collect()
}

fn texture_pixels(name: &str) -> [u8; 4] {
    match name {
        "white" => [255, 255, 255, 255],
        "black" => [0, 0, 0, 255],
        "grey" => [128, 128, 128, 255],
        // Tangent-space up.
        _ => [128, 128, 255, 255],
    }
}

#[derive(Debug, Clone, Copy)]
struct BuiltinTexture {
    texture: TextureId,
    view: TextureViewId,
}

/// The resources every material system owns once
/// [`MaterialSystem::register_builtins`] ran.
pub struct BuiltinResources {
    device: Arc<dyn GraphicsDevice>,
    textures: AHashMap<String, BuiltinTexture>,
    sampler: SamplerId,
    effects: AHashMap<String, Arc<EffectAsset>>,
    missing_effect: Arc<EffectAsset>,
    missing_material: SharedMaterial,
    planar_shadow_material: SharedMaterial,
    tonemap_material: SharedMaterial,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for BuiltinResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinResources")
            .field("textures", &self.textures.len())
            .field("sampler", &self.sampler)
            .field("effects", &self.effects.len())
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BuiltinResources {
    /// Creates every builtin on the system's device. Nothing is left allocated on
    /// failure.
    pub(crate) fn create(system: &Arc<MaterialSystem>) -> Result<Self, MaterialError> {
        let device = Arc::clone(system.device());
        let effects = builtin_effects()?;
        for effect in &effects {
            system.register_effect(Arc::clone(effect));
        }
        let effects: AHashMap<String, Arc<EffectAsset>> = effects
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        let effect = |name: &str| {
            effects
                .get(name)
                .cloned()
                .ok_or_else(|| MaterialError::InvalidBuiltin(format!("effect '{name}' missing")))
        };
        let missing_effect = effect(EFFECT_MISSING)?;

        let mut textures = AHashMap::new();
        if let Err(e) = Self::create_textures(device.as_ref(), &mut textures) {
            Self::release(device.as_ref(), &textures, None);
            return Err(e);
        }
        let sampler = match device.create_sampler(&SamplerInfo::default()) {
            Ok(sampler) => sampler,
            Err(e) => {
                Self::release(device.as_ref(), &textures, None);
                return Err(e.into());
            }
        };

        let build = |name: &str| -> Result<SharedMaterial, MaterialError> {
            let mut material = Material::new(Arc::clone(system));
            material.initialize(&MaterialInfo::with_effect(effect(name)?))?;
            Ok(material.into_shared())
        };
        let materials = build(EFFECT_MISSING).and_then(|missing| {
            Ok((missing, build(EFFECT_PLANAR_SHADOW)?, build(EFFECT_TONEMAP)?))
        });
        let (missing_material, planar_shadow_material, tonemap_material) = match materials {
            Ok(materials) => materials,
            Err(e) => {
                log::error!("BuiltinResources: failed to build builtin materials: {e}");
                Self::release(device.as_ref(), &textures, Some(sampler));
                return Err(e);
            }
        };

        log::debug!(
            "BuiltinResources: created {} textures and {} effects",
            textures.len(),
            effects.len()
        );
        Ok(Self {
            device,
            textures,
            sampler,
            effects,
            missing_effect,
            missing_material,
            planar_shadow_material,
            tonemap_material,
            destroyed: AtomicBool::new(false),
        })
    }

    fn create_textures(
        device: &dyn GraphicsDevice,
        out: &mut AHashMap<String, BuiltinTexture>,
    ) -> Result<(), MaterialError> {
        for name in BUILTIN_TEXTURES {
            let info = TextureInfo::sampled_2d(
                &format!("builtin-{name}"),
                TextureFormat::Rgba8Unorm,
                TEXTURE_SIZE,
                TEXTURE_SIZE,
            );
            let texture = device.create_texture(&info)?;
            let view = match device.create_texture_view(&TextureViewInfo::whole(texture, &info)) {
                Ok(view) => view,
                Err(e) => {
                    device.destroy_texture(texture);
                    return Err(e.into());
                }
            };
            out.insert(name.to_string(), BuiltinTexture { texture, view });

            let pixels: Vec<u8> = texture_pixels(name)
                .into_iter()
                .cycle()
                .take((TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize)
                .collect();
            let region = BufferTextureCopy {
                texture_extent: Extent3D::new_2d(TEXTURE_SIZE, TEXTURE_SIZE),
                ..BufferTextureCopy::default()
            };
            device.copy_buffers_to_texture(&[&pixels], texture, &[region])?;
        }
        Ok(())
    }

    fn release(
        device: &dyn GraphicsDevice,
        textures: &AHashMap<String, BuiltinTexture>,
        sampler: Option<SamplerId>,
    ) {
        for t in textures.values() {
            device.destroy_texture_view(t.view);
            device.destroy_texture(t.texture);
        }
        if let Some(sampler) = sampler {
            device.destroy_sampler(sampler);
        }
    }

    /// The builtin texture `name`, sampled with the default sampler.
    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.textures.get(name).map(|t| {
            TextureHandle::new(t.view, TEXTURE_SIZE, TEXTURE_SIZE).with_sampler(self.sampler)
        })
    }

    /// The default sampler.
    pub fn default_sampler(&self) -> SamplerId {
        self.sampler
    }

    /// The builtin effect `name`.
    pub fn effect(&self, name: &str) -> Option<&Arc<EffectAsset>> {
        self.effects.get(name)
    }

    /// The effect standing in for a missing one.
    pub fn missing_effect(&self) -> &Arc<EffectAsset> {
        &self.missing_effect
    }

    /// The material drawn with the missing effect.
    pub fn missing_material(&self) -> &SharedMaterial {
        &self.missing_material
    }

    /// The material projecting planar shadows.
    pub fn planar_shadow_material(&self) -> &SharedMaterial {
        &self.planar_shadow_material
    }

    /// The tone mapping material.
    pub fn tonemap_material(&self) -> &SharedMaterial {
        &self.tonemap_material
    }

    /// Returns `true` once [`BuiltinResources::destroy`] ran.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Releases the builtin materials, textures and sampler. Only the first call does
    /// anything.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for material in [
            &self.missing_material,
            &self.planar_shadow_material,
            &self.tonemap_material,
        ] {
            material
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .destroy();
        }
        Self::release(self.device.as_ref(), &self.textures, Some(self.sampler));
        log::debug!("BuiltinResources: destroyed");
    }
}

impl Drop for BuiltinResources {
    fn drop(&mut self) {
        self.destroy();
    }
}
