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

//! The program library: shader templates and their compiled variants.
//!
//! Effects register their [`ShaderTemplate`]s here. A pass asks for a program by name
//! and active defines; the library resolves the conditional blocks of the sources,
//! compiles the result once on the device and caches it under a variant key made of the
//! program name and the sorted values of the defines the template declares.

mod preprocess;

pub use self::preprocess::{evaluate, preprocess};

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;
use prism_core::asset::{DefineMap, EffectAsset, MacroValue, ShaderTemplate};
use prism_core::renderer::{
    DeviceCaps, DeviceFeatures, GraphicsDevice, ResourceError, ShaderAttribute, ShaderError,
    ShaderId, ShaderInfo, ShaderStage, ShaderStageKind, UniformBlock, UniformSampler,
};

/// Set when float textures can be sampled.
pub const DEFINE_FLOAT_TEXTURE: &str = "PRISM_DEVICE_SUPPORT_FLOAT_TEXTURE";
/// Number of vec4 uniforms available to the vertex stage.
pub const DEFINE_MAX_VERTEX_UNIFORM_VECTORS: &str = "PRISM_DEVICE_MAX_VERTEX_UNIFORM_VECTORS";
/// Number of vec4 uniforms available to the fragment stage.
pub const DEFINE_MAX_FRAGMENT_UNIFORM_VECTORS: &str =
    "PRISM_DEVICE_MAX_FRAGMENT_UNIFORM_VECTORS";
/// Set when skinning joints are stored in a float texture instead of uniforms.
pub const DEFINE_JOINTS_IN_TEXTURE: &str = "PRISM_JOINTS_IN_TEXTURE";
/// The near plane of clip space, `0` or `-1`.
pub const DEFINE_CLIP_SPACE_MIN_Z: &str = "PRISM_CLIP_SPACE_MIN_Z";

/// A compiled shader variant with the reflection data passes need.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Program name.
    pub name: String,
    /// Variant key, `name|DEFINE=value|...`.
    pub key: String,
    /// The compiled shader.
    pub shader: ShaderId,
    /// Vertex inputs.
    pub attributes: Vec<ShaderAttribute>,
    /// Uniform blocks of the pass binding set.
    pub blocks: Vec<UniformBlock>,
    /// Sampler slots of the pass binding set.
    pub samplers: Vec<UniformSampler>,
}

/// Derives the defines every variant is compiled with from the device capabilities.
pub fn device_defines(caps: &DeviceCaps) -> DefineMap {
    let float_textures = caps.features.contains(DeviceFeatures::TEXTURE_FLOAT);
    let mut defines = DefineMap::new();
    defines.insert(DEFINE_FLOAT_TEXTURE.into(), MacroValue::Bool(float_textures));
    defines.insert(
        DEFINE_MAX_VERTEX_UNIFORM_VECTORS.into(),
        MacroValue::Int(i64::from(caps.limits.max_vertex_uniform_vectors)),
    );
    defines.insert(
        DEFINE_MAX_FRAGMENT_UNIFORM_VECTORS.into(),
        MacroValue::Int(i64::from(caps.limits.max_fragment_uniform_vectors)),
    );
    defines.insert(
        DEFINE_JOINTS_IN_TEXTURE.into(),
        MacroValue::Bool(float_textures && caps.limits.max_vertex_texture_units > 0),
    );
    defines.insert(
        DEFINE_CLIP_SPACE_MIN_Z.into(),
        MacroValue::Int(caps.clip_space_min_z as i64),
    );
    defines
}

/// Registry of shader templates and cache of their compiled variants.
#[derive(Debug)]
pub struct ProgramLib {
    device: Arc<dyn GraphicsDevice>,
    templates: AHashMap<String, ShaderTemplate>,
    variants: AHashMap<String, Arc<Program>>,
    device_defines: DefineMap,
}

impl ProgramLib {
    /// Creates an empty library. Device defines are derived from the current
    /// capabilities, so the device should be initialized first.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        let device_defines = device_defines(&device.capabilities());
        Self {
            device,
            templates: AHashMap::new(),
            variants: AHashMap::new(),
            device_defines,
        }
    }

    /// The defines derived from the device.
    pub fn device_defines(&self) -> &DefineMap {
        &self.device_defines
    }

    /// Registers a template. Re-registering a changed template drops its cached variants.
    pub fn register(&mut self, template: &ShaderTemplate) {
        if let Some(existing) = self.templates.get(&template.name) {
            if existing == template {
                return;
            }
            log::debug!(
                "ProgramLib: template '{}' changed, dropping its variants",
                template.name
            );
            self.drop_variants_of(&template.name);
        }
        self.templates
            .insert(template.name.clone(), template.clone());
    }

    /// Registers every shader template of `effect`.
    pub fn register_effect(&mut self, effect: &EffectAsset) {
        for template in &effect.shaders {
            self.register(template);
        }
    }

    /// The template registered under `name`.
    pub fn template(&self, name: &str) -> Option<&ShaderTemplate> {
        self.templates.get(name)
    }

    /// The variant key of program `name` under `defines`, or `None` for an unknown
    /// program. Only the defines the template declares take part in the key.
    pub fn variant_key(&self, name: &str, defines: &DefineMap) -> Option<String> {
        let template = self.templates.get(name)?;
        let declared: BTreeSet<&str> = template.defines.iter().map(String::as_str).collect();
        let mut key = name.to_string();
        for define in declared {
            if let Some(value) = defines.get(define) {
                key.push('|');
                key.push_str(define);
                key.push('=');
                key.push_str(&value.to_string());
            }
        }
        Some(key)
    }

    /// Returns the variant of `name` for `defines`, compiling it on first use.
    ///
    /// ## Errors
    /// * `ShaderError::UnknownProgram` - No template is registered under `name`.
    /// * `ShaderError::PreprocessFailed` - A source has malformed directives.
    /// * Any error of `GraphicsDevice::create_shader`.
    pub fn get_program(
        &mut self,
        name: &str,
        defines: &DefineMap,
    ) -> Result<Arc<Program>, ResourceError> {
        let key = self
            .variant_key(name, defines)
            .ok_or_else(|| ShaderError::UnknownProgram {
                name: name.to_string(),
            })?;
        if let Some(program) = self.variants.get(&key) {
            return Ok(Arc::clone(program));
        }

        let template = self
            .templates
            .get(name)
            .ok_or_else(|| ShaderError::UnknownProgram {
                name: name.to_string(),
            })?;
        let mut active = self.device_defines.clone();
        for define in &template.defines {
            if let Some(value) = defines.get(define) {
                active.insert(define.clone(), value.clone());
            }
        }
        let resolve = |source: &str| {
            preprocess(source, &active).map_err(|details| ShaderError::PreprocessFailed {
                name: name.to_string(),
                details,
            })
        };
        let info = ShaderInfo {
            name: key.clone(),
            stages: vec![
                ShaderStage {
                    stage: ShaderStageKind::Vertex,
                    source: resolve(&template.vert)?,
                },
                ShaderStage {
                    stage: ShaderStageKind::Fragment,
                    source: resolve(&template.frag)?,
                },
            ],
            attributes: template.attributes.clone(),
            blocks: template.blocks.clone(),
            samplers: template.samplers.clone(),
        };
        let shader = self.device.create_shader(&info).inspect_err(|e| {
            log::error!("ProgramLib: failed to compile variant '{key}': {e}");
        })?;
        log::debug!("ProgramLib: compiled variant '{key}'");

        let program = Arc::new(Program {
            name: name.to_string(),
            key: key.clone(),
            shader,
            attributes: info.attributes,
            blocks: info.blocks,
            samplers: info.samplers,
        });
        self.variants.insert(key, Arc::clone(&program));
        Ok(program)
    }

    /// Number of compiled variants.
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    fn drop_variants_of(&mut self, name: &str) {
        let device = &self.device;
        self.variants.retain(|_, program| {
            let keep = program.name != name;
            if !keep {
                device.destroy_shader(program.shader);
            }
            keep
        });
    }

    /// Destroys every compiled variant. Templates stay registered.
    pub fn destroy(&mut self) {
        for (_, program) in self.variants.drain() {
            self.device.destroy_shader(program.shader);
        }
    }
}

impl Drop for ProgramLib {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::DeviceInfo;
    use prism_infra::{HeadlessAdapter, HeadlessDevice};

    fn template() -> ShaderTemplate {
        ShaderTemplate {
            name: "unlit".into(),
            vert: "void main() {}".into(),
            frag: "#if USE_TEXTURE\nsample();\n#else\ncolor();\n#endif".into(),
            attributes: vec![],
            blocks: vec![],
            samplers: vec![],
            defines: vec!["USE_TEXTURE".into()],
        }
    }

    fn library(adapter: HeadlessAdapter) -> (Arc<HeadlessDevice>, ProgramLib) {
        let device = Arc::new(HeadlessDevice::new(adapter));
        device.initialize(&DeviceInfo::default()).unwrap();
        let lib = ProgramLib::new(device.clone());
        (device, lib)
    }

    #[test]
    fn variants_are_cached_by_declared_defines() {
        let (_device, mut lib) = library(HeadlessAdapter::desktop());
        lib.register(&template());

        let mut defines = DefineMap::new();
        defines.insert("USE_TEXTURE".into(), MacroValue::Bool(true));
        defines.insert("UNRELATED".into(), MacroValue::Int(3));
        let a = lib.get_program("unlit", &defines).unwrap();
        assert_eq!(a.key, "unlit|USE_TEXTURE=1");

        defines.remove("UNRELATED");
        let b = lib.get_program("unlit", &defines).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let plain = lib.get_program("unlit", &DefineMap::new()).unwrap();
        assert_eq!(plain.key, "unlit");
        assert_ne!(plain.shader, a.shader);
        assert_eq!(lib.variant_count(), 2);
    }

    #[test]
    fn unknown_programs_are_reported() {
        let (_device, mut lib) = library(HeadlessAdapter::desktop());
        let err = lib.get_program("missing", &DefineMap::new()).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Shader(ShaderError::UnknownProgram { .. })
        ));
    }

    #[test]
    fn malformed_sources_fail_preprocessing() {
        let (_device, mut lib) = library(HeadlessAdapter::desktop());
        let mut broken = template();
        broken.frag = "#if USE_TEXTURE\nsample();".into();
        lib.register(&broken);
        let err = lib.get_program("unlit", &DefineMap::new()).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Shader(ShaderError::PreprocessFailed { .. })
        ));
    }

    #[test]
    fn device_defines_follow_capabilities() {
        let (_device, desktop) = library(HeadlessAdapter::desktop());
        assert_eq!(
            desktop.device_defines().get(DEFINE_FLOAT_TEXTURE),
            Some(&MacroValue::Bool(true))
        );
        let (_device, mobile) = library(HeadlessAdapter::mobile());
        assert_eq!(
            mobile.device_defines().get(DEFINE_FLOAT_TEXTURE),
            Some(&MacroValue::Bool(false))
        );
        assert_eq!(
            mobile.device_defines().get(DEFINE_JOINTS_IN_TEXTURE),
            Some(&MacroValue::Bool(false))
        );
        assert_eq!(
            mobile.device_defines().get(DEFINE_CLIP_SPACE_MIN_Z),
            Some(&MacroValue::Int(-1))
        );
    }

    #[test]
    fn destroy_releases_every_variant() {
        let (device, mut lib) = library(HeadlessAdapter::desktop());
        lib.register(&template());
        let before = device.live_resource_count();
        lib.get_program("unlit", &DefineMap::new()).unwrap();
        assert_eq!(device.live_resource_count(), before + 1);
        lib.destroy();
        assert_eq!(lib.variant_count(), 0);
        assert_eq!(device.live_resource_count(), before);
    }

    #[test]
    fn changed_templates_drop_stale_variants() {
        let (_device, mut lib) = library(HeadlessAdapter::desktop());
        lib.register(&template());
        lib.get_program("unlit", &DefineMap::new()).unwrap();
        lib.register(&template());
        assert_eq!(lib.variant_count(), 1);

        let mut changed = template();
        changed.vert = "void main() { gl_Position = vec4(0.0); }".into();
        lib.register(&changed);
        assert_eq!(lib.variant_count(), 0);
    }
}
