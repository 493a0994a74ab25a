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

//! Effect definitions: techniques, pass templates and shader templates.
//!
//! An effect is immutable once parsed. Materials reference it through an `Arc` and pick
//! one technique by index.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Asset;
use crate::renderer::api::pipeline::{
    BlendState, DepthStencilState, PrimitiveMode, RasterizerState, ShaderAttribute,
    UniformBlock, UniformSampler,
};

/// Priority of a pass when its template does not set one.
pub const DEFAULT_PRIORITY: u32 = 128;

/// Phase of a pass when its template does not set one.
pub const DEFAULT_PHASE: &str = "default";

/// The value of a preprocessor define.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MacroValue {
    /// A boolean switch, emitted as `1` or `0`.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A raw token.
    Str(String),
}

impl MacroValue {
    /// Truthiness as seen by `#if`: `false`, `0` and the empty string are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            MacroValue::Bool(b) => *b,
            MacroValue::Int(i) => *i != 0,
            MacroValue::Str(s) => !s.is_empty() && s != "0" && s != "false",
        }
    }

    /// Integer value as seen by `#if`.
    pub fn as_int(&self) -> i64 {
        match self {
            MacroValue::Bool(b) => i64::from(*b),
            MacroValue::Int(i) => *i,
            MacroValue::Str(s) => s.parse().unwrap_or(i64::from(self.is_truthy())),
        }
    }
}

impl fmt::Display for MacroValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroValue::Bool(b) => write!(f, "{}", u8::from(*b)),
            MacroValue::Int(i) => write!(f, "{i}"),
            MacroValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MacroValue {
    fn from(value: bool) -> Self {
        MacroValue::Bool(value)
    }
}

impl From<i64> for MacroValue {
    fn from(value: i64) -> Self {
        MacroValue::Int(value)
    }
}

/// Preprocessor defines, ordered by name so variant keys are stable.
pub type DefineMap = BTreeMap<String, MacroValue>;

/// How sub-models using a pass may be merged into fewer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchingScheme {
    /// Every sub-model is drawn on its own.
    #[default]
    None,
    /// Vertices are pre-transformed on the CPU and merged per pass.
    Dynamic,
}

/// Fixed-function state overrides. `None` fields keep the value underneath.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PassStates {
    /// Sort priority, lower draws first.
    pub priority: Option<u32>,
    /// Topology.
    pub primitive: Option<PrimitiveMode>,
    /// Rasterizer state.
    pub rasterizer: Option<RasterizerState>,
    /// Depth/stencil state.
    pub depth_stencil: Option<DepthStencilState>,
    /// Blend state.
    pub blend: Option<BlendState>,
}

impl PassStates {
    /// Returns `self` with every field set in `overrides` replaced.
    pub fn merged(&self, overrides: &PassStates) -> PassStates {
        PassStates {
            priority: overrides.priority.or(self.priority),
            primitive: overrides.primitive.or(self.primitive),
            rasterizer: overrides.rasterizer.or(self.rasterizer),
            depth_stencil: overrides.depth_stencil.or(self.depth_stencil),
            blend: overrides.blend.clone().or_else(|| self.blend.clone()),
        }
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == PassStates::default()
    }
}

/// The default value of a material property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyDefault {
    /// A scalar.
    Number(f32),
    /// Vector, matrix or array components.
    Numbers(Vec<f32>),
    /// The name of a builtin texture (`"white"`, `"black"`, `"grey"`, `"normal"`).
    Texture(String),
}

fn default_phase() -> String {
    DEFAULT_PHASE.to_string()
}

/// One pass of a technique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassTemplate {
    /// Shader program name, resolved through the program library.
    pub program: String,
    /// Phase name, mapped to a bit by the phase registry.
    #[serde(default = "default_phase")]
    pub phase: String,
    /// The pass is only built when this define is truthy.
    #[serde(default)]
    pub switch: Option<String>,
    /// Defines applied before the material's own.
    #[serde(default)]
    pub defines: DefineMap,
    /// Fixed-function defaults.
    #[serde(flatten)]
    pub states: PassStates,
    /// Default values of the pass properties.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefault>,
    /// Batching scheme.
    #[serde(default)]
    pub batching: BatchingScheme,
}

impl PassTemplate {
    /// A template with only a program name set.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            phase: default_phase(),
            switch: None,
            defines: DefineMap::new(),
            states: PassStates::default(),
            properties: BTreeMap::new(),
            batching: BatchingScheme::None,
        }
    }
}

/// An ordered list of passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueInfo {
    /// Optional name, e.g. `"opaque"` or `"transparent"`.
    #[serde(default)]
    pub name: Option<String>,
    /// The passes, in draw order.
    pub passes: Vec<PassTemplate>,
}

/// Shader source plus its reflection data.
///
/// Sources may contain `#if`/`#ifdef`/`#ifndef`/`#elif`/`#else`/`#endif` blocks that
/// the program library resolves per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderTemplate {
    /// Program name referenced by pass templates.
    pub name: String,
    /// Vertex stage source.
    pub vert: String,
    /// Fragment stage source.
    pub frag: String,
    /// Vertex inputs.
    #[serde(default)]
    pub attributes: Vec<ShaderAttribute>,
    /// Uniform blocks of the pass binding set.
    #[serde(default)]
    pub blocks: Vec<UniformBlock>,
    /// Sampler slots of the pass binding set.
    #[serde(default)]
    pub samplers: Vec<UniformSampler>,
    /// Names of the defines the sources test. Only these take part in the variant key.
    #[serde(default)]
    pub defines: Vec<String>,
}

/// A parsed effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectAsset {
    /// Unique name, used to resolve effects by name.
    pub name: String,
    /// Techniques, selected by index.
    pub techniques: Vec<TechniqueInfo>,
    /// Programs the passes reference.
    #[serde(default)]
    pub shaders: Vec<ShaderTemplate>,
}

impl EffectAsset {
    /// The technique at `index`.
    pub fn technique(&self, index: usize) -> Option<&TechniqueInfo> {
        self.techniques.get(index)
    }

    /// The shader template named `program`.
    pub fn shader(&self, program: &str) -> Option<&ShaderTemplate> {
        self.shaders.iter().find(|s| s.name == program)
    }
}

impl Asset for EffectAsset {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::pipeline::UniformType;

    const UNLIT: &str = r##"{
        "name": "unlit",
        "techniques": [{
            "name": "opaque",
            "passes": [
                { "program": "unlit", "properties": { "mainColor": [1, 1, 1, 1], "mainTexture": "white" } },
                { "program": "unlit", "phase": "shadow-caster", "switch": "CAST_SHADOW", "priority": 64,
                  "depth_stencil": { "depth_write": false } }
            ]
        }],
        "shaders": [{
            "name": "unlit",
            "vert": "void main() {}",
            "frag": "#if USE_TEXTURE\nsample();\n#endif",
            "blocks": [{ "name": "Unlit", "binding": 0, "members": [{ "name": "mainColor", "type": "float4" }] }],
            "samplers": [{ "name": "mainTexture", "binding": 1, "type": "sampler2d" }],
            "defines": ["USE_TEXTURE"]
        }]
    }"##;

    #[test]
    fn effect_parses_from_json() {
        let effect: EffectAsset = serde_json::from_str(UNLIT).unwrap();
        let technique = effect.technique(0).unwrap();
        assert_eq!(technique.passes.len(), 2);

        let first = &technique.passes[0];
        assert_eq!(first.phase, DEFAULT_PHASE);
        assert_eq!(first.states.priority, None);
        assert_eq!(
            first.properties.get("mainColor"),
            Some(&PropertyDefault::Numbers(vec![1.0, 1.0, 1.0, 1.0]))
        );
        assert_eq!(
            first.properties.get("mainTexture"),
            Some(&PropertyDefault::Texture("white".into()))
        );

        let second = &technique.passes[1];
        assert_eq!(second.switch.as_deref(), Some("CAST_SHADOW"));
        assert_eq!(second.states.priority, Some(64));
        assert!(second.states.depth_stencil.is_some_and(|ds| !ds.depth_write));

        let shader = effect.shader("unlit").unwrap();
        assert_eq!(shader.samplers[0].ty, UniformType::Sampler2D);
        assert_eq!(shader.defines, vec!["USE_TEXTURE".to_string()]);
    }

    #[test]
    fn merged_states_prefer_overrides() {
        let base = PassStates {
            priority: Some(10),
            primitive: Some(PrimitiveMode::LineList),
            ..PassStates::default()
        };
        let overrides = PassStates {
            priority: Some(20),
            ..PassStates::default()
        };
        let merged = base.merged(&overrides);
        assert_eq!(merged.priority, Some(20));
        assert_eq!(merged.primitive, Some(PrimitiveMode::LineList));
        assert!(PassStates::default().is_empty());
    }

    #[test]
    fn macro_values_render_like_the_preprocessor() {
        assert_eq!(MacroValue::Bool(true).to_string(), "1");
        assert_eq!(MacroValue::Int(0).to_string(), "0");
        assert!(!MacroValue::Str("0".into()).is_truthy());
        assert_eq!(MacroValue::Str("3".into()).as_int(), 3);
    }
}
