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

//! Materials: an effect, a technique and the passes built from them.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use prism_core::asset::{DefineMap, EffectAsset, MacroValue, PassStates};
use prism_core::utils::murmurhash2_32_gc;

use super::pass::{Pass, PassInfo, PropertyWrite};
use super::property::PropertyValue;
use crate::error::MaterialError;
use crate::system::MaterialSystem;

/// Seed of the material hash.
pub const MATERIAL_HASH_SEED: u32 = 666;

/// A material shared by many renderables.
pub type SharedMaterial = Arc<RwLock<Material>>;

/// Per-pass overrides given either once for every pass or pass by pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOverrides<T> {
    /// The same value for every pass.
    All(T),
    /// One value per pass of the technique. Missing entries use the default.
    Each(Vec<T>),
}

impl<T> Default for PassOverrides<T> {
    fn default() -> Self {
        PassOverrides::Each(Vec::new())
    }
}

impl<T: Clone + Default> PassOverrides<T> {
    /// Expands the overrides to exactly `count` entries.
    pub fn normalize(&self, count: usize) -> Vec<T> {
        match self {
            PassOverrides::All(value) => vec![value.clone(); count],
            PassOverrides::Each(values) => {
                let mut out: Vec<T> = values.iter().take(count).cloned().collect();
                out.resize(count, T::default());
                out
            }
        }
    }
}

/// How to initialize a material.
#[derive(Debug, Clone, Default)]
pub struct MaterialInfo {
    /// The effect to use. Takes precedence over `effect_name`.
    pub effect: Option<Arc<EffectAsset>>,
    /// Name of a registered effect.
    pub effect_name: Option<String>,
    /// Technique index.
    pub technique: usize,
    /// Define overrides.
    pub defines: PassOverrides<DefineMap>,
    /// Fixed-function state overrides.
    pub states: PassOverrides<PassStates>,
}

impl MaterialInfo {
    /// Technique 0 of `effect`, without overrides.
    pub fn with_effect(effect: Arc<EffectAsset>) -> Self {
        Self {
            effect: Some(effect),
            ..Self::default()
        }
    }

    /// Technique 0 of the effect registered as `name`.
    pub fn named(name: &str) -> Self {
        Self {
            effect_name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

/// An ordered set of passes built from one technique of an effect.
///
/// The pass list always matches the technique passes whose `switch` define is truthy:
/// every mutating call that can change it rebuilds the passes. Property values are kept
/// per technique pass and re-applied on rebuild. A material without an effect uses the
/// builtin missing effect.
#[derive(Debug)]
pub struct Material {
    system: Arc<MaterialSystem>,
    effect: Option<Arc<EffectAsset>>,
    technique: usize,
    defines: Vec<DefineMap>,
    states: Vec<PassStates>,
    properties: Vec<BTreeMap<String, PropertyValue>>,
    passes: Vec<Pass>,
    hash: u32,
    generation: u64,
}

impl Material {
    /// An empty material. Call [`Material::initialize`] to build its passes.
    pub fn new(system: Arc<MaterialSystem>) -> Self {
        Self {
            system,
            effect: None,
            technique: 0,
            defines: Vec::new(),
            states: Vec::new(),
            properties: Vec::new(),
            passes: Vec::new(),
            hash: murmurhash2_32_gc(&[], MATERIAL_HASH_SEED),
            generation: 0,
        }
    }

    /// Wraps the material for sharing.
    pub fn into_shared(self) -> SharedMaterial {
        Arc::new(RwLock::new(self))
    }

    /// Resolves the effect, normalizes the overrides and builds the passes. Property
    /// values set before are discarded.
    ///
    /// ## Errors
    /// * `MaterialError::EffectNotFound` - `effect_name` is not registered.
    /// * Any pass build error.
    pub fn initialize(&mut self, info: &MaterialInfo) -> Result<(), MaterialError> {
        let effect = match (&info.effect, &info.effect_name) {
            (Some(effect), _) => {
                self.system.register_effect(Arc::clone(effect));
                Some(Arc::clone(effect))
            }
            (None, Some(name)) => Some(self.system.find_effect(name).ok_or_else(|| {
                log::error!("Material: effect '{name}' is not registered");
                MaterialError::EffectNotFound(name.clone())
            })?),
            (None, None) => None,
        };
        self.effect = effect;
        self.technique = info.technique;
        let count = self.technique_pass_count();
        self.defines = info.defines.normalize(count);
        self.states = info.states.normalize(count);
        self.properties = vec![BTreeMap::new(); count];
        self.rebuild()
    }

    /// The effect actually built from: the material's own or the missing effect.
    fn resolved_effect(&self) -> Option<Arc<EffectAsset>> {
        self.effect
            .clone()
            .or_else(|| self.system.missing_effect())
    }

    fn technique_pass_count(&self) -> usize {
        self.resolved_effect()
            .and_then(|e| e.technique(self.technique).map(|t| t.passes.len()))
            .unwrap_or(0)
    }

    /// Grows the per-pass vectors to cover the current technique. Entries beyond it are
    /// kept for when a longer technique is selected again.
    fn fit_overrides(&mut self) {
        let count = self.technique_pass_count();
        if self.defines.len() < count {
            self.defines.resize(count, DefineMap::new());
        }
        if self.states.len() < count {
            self.states.resize(count, PassStates::default());
        }
        if self.properties.len() < count {
            self.properties.resize(count, BTreeMap::new());
        }
    }

    fn rebuild(&mut self) -> Result<(), MaterialError> {
        self.passes.clear();
        self.generation += 1;
        let result = self.build_passes();
        if result.is_err() {
            self.passes.clear();
        }
        self.hash = self.compute_hash();
        result
    }

    fn build_passes(&mut self) -> Result<(), MaterialError> {
        let Some(effect) = self.resolved_effect() else {
            log::warn!("Material: no effect and no missing-effect builtin, no pass built");
            return Ok(());
        };
        let technique =
            effect
                .technique(self.technique)
                .ok_or_else(|| MaterialError::TechniqueOutOfRange {
                    effect: effect.name.clone(),
                    index: self.technique,
                    count: effect.techniques.len(),
                })?;

        for (index, template) in technique.passes.iter().enumerate() {
            let mut defines = template.defines.clone();
            if let Some(overrides) = self.defines.get(index) {
                defines.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if let Some(switch) = &template.switch {
                if !defines.get(switch).is_some_and(MacroValue::is_truthy) {
                    continue;
                }
            }
            let states = self.states.get(index).cloned().unwrap_or_default();
            let info = PassInfo {
                template,
                index,
                defines: &defines,
                states: &states,
            };
            let mut pass = Pass::new(&self.system, &info).inspect_err(|e| {
                log::error!(
                    "Material: pass {index} of effect '{}' failed to build: {e}",
                    effect.name
                );
            })?;
            if let Some(properties) = self.properties.get(index) {
                for (name, value) in properties {
                    pass.apply_property(name, value);
                }
                pass.update()?;
            }
            self.passes.push(pass);
        }
        Ok(())
    }

    fn compute_hash(&self) -> u32 {
        let concat: String = self.passes.iter().map(|p| p.hash().to_string()).collect();
        murmurhash2_32_gc(concat.as_bytes(), MATERIAL_HASH_SEED)
    }

    fn refresh_hash(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Maps an active pass index to the technique pass it was built from.
    fn technique_index_of(&self, pass_idx: Option<usize>) -> Result<Option<usize>, ()> {
        match pass_idx {
            None => Ok(None),
            Some(i) => match self.passes.get(i) {
                Some(pass) => Ok(Some(pass.index())),
                None => {
                    log::warn!(
                        "Material: pass index {i} out of range ({} passes)",
                        self.passes.len()
                    );
                    Err(())
                }
            },
        }
    }

    // --- Properties ---

    /// Sets a property on every pass that declares it, or only on pass `pass_idx`.
    ///
    /// Returns `true` if at least one pass accepted the value. Unknown names are logged
    /// and change nothing. Texture values are only bound once complete.
    pub fn set_property(
        &mut self,
        name: &str,
        value: PropertyValue,
        pass_idx: Option<usize>,
    ) -> bool {
        let targets: Vec<usize> = match pass_idx {
            Some(i) if i < self.passes.len() => vec![i],
            Some(i) => {
                log::warn!(
                    "Material: pass index {i} out of range ({} passes)",
                    self.passes.len()
                );
                return false;
            }
            None => (0..self.passes.len()).collect(),
        };

        let mut known = false;
        let mut applied = false;
        for i in targets {
            let pass = &mut self.passes[i];
            match pass.apply_property(name, &value) {
                PropertyWrite::Applied => {
                    known = true;
                    applied = true;
                    let index = pass.index();
                    if let Err(e) = pass.update() {
                        log::error!("Material: failed to flush pass {i}: {e}");
                    }
                    if self.properties.len() <= index {
                        self.properties.resize(index + 1, BTreeMap::new());
                    }
                    self.properties[index].insert(name.to_string(), value.clone());
                }
                PropertyWrite::Rejected => known = true,
                PropertyWrite::Unknown => {}
            }
        }

        if !known {
            log::warn!("Material: illegal property name '{name}'");
        }
        if applied {
            self.refresh_hash();
        }
        applied
    }

    /// The value last set for `name`, on pass `pass_idx` or on the first pass that has
    /// one.
    pub fn get_property(&self, name: &str, pass_idx: Option<usize>) -> Option<&PropertyValue> {
        match pass_idx {
            Some(i) => {
                let index = self.passes.get(i)?.index();
                self.properties.get(index)?.get(name)
            }
            None => self
                .passes
                .iter()
                .find_map(|p| self.properties.get(p.index())?.get(name)),
        }
    }

    // --- Rebuilding mutations ---

    /// Merges `defines` into the overrides of every pass or of pass `pass_idx`, then
    /// rebuilds.
    pub fn recompile_shaders(
        &mut self,
        defines: &DefineMap,
        pass_idx: Option<usize>,
    ) -> Result<(), MaterialError> {
        let Ok(target) = self.technique_index_of(pass_idx) else {
            return Ok(());
        };
        self.fit_overrides();
        for (index, overrides) in self.defines.iter_mut().enumerate() {
            if target.is_none_or(|t| t == index) {
                overrides.extend(defines.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        self.rebuild()
    }

    /// Merges `states` into the overrides of every pass or of pass `pass_idx`, then
    /// rebuilds.
    pub fn override_pipeline_states(
        &mut self,
        states: &PassStates,
        pass_idx: Option<usize>,
    ) -> Result<(), MaterialError> {
        let Ok(target) = self.technique_index_of(pass_idx) else {
            return Ok(());
        };
        self.fit_overrides();
        for (index, overrides) in self.states.iter_mut().enumerate() {
            if target.is_none_or(|t| t == index) {
                *overrides = overrides.merged(states);
            }
        }
        self.rebuild()
    }

    /// Switches to another technique of the same effect, keeping overrides and
    /// properties by pass position.
    /// An index the effect does not have is logged and leaves the material untouched.
    pub fn set_technique(&mut self, index: usize) -> Result<(), MaterialError> {
        if let Some(effect) = self.resolved_effect() {
            if effect.technique(index).is_none() {
                log::warn!(
                    "Material: effect '{}' has no technique {index}, keeping {}",
                    effect.name,
                    self.technique
                );
                return Err(MaterialError::TechniqueOutOfRange {
                    effect: effect.name.clone(),
                    index,
                    count: effect.techniques.len(),
                });
            }
        }
        self.technique = index;
        self.fit_overrides();
        self.rebuild()
    }

    /// Copies effect, technique, overrides and properties of `source`, then rebuilds.
    pub fn copy_from(&mut self, source: &Material) -> Result<(), MaterialError> {
        self.effect = source.effect.clone();
        self.technique = source.technique;
        self.defines = source.defines.clone();
        self.states = source.states.clone();
        self.properties = source.properties.clone();
        self.rebuild()
    }

    /// Releases every pass. Calling it twice is harmless.
    pub fn destroy(&mut self) {
        if self.passes.is_empty() {
            return;
        }
        for pass in &mut self.passes {
            pass.destroy();
        }
        self.passes.clear();
        self.refresh_hash();
    }

    // --- Queries ---

    /// The material system the material was created with.
    pub fn system(&self) -> &Arc<MaterialSystem> {
        &self.system
    }

    /// The effect, `None` when the missing effect is used.
    pub fn effect(&self) -> Option<&Arc<EffectAsset>> {
        self.effect.as_ref()
    }

    /// Name of the effect the passes were built from.
    pub fn effect_name(&self) -> Option<String> {
        self.resolved_effect().map(|e| e.name.clone())
    }

    /// The technique index.
    pub fn technique_index(&self) -> usize {
        self.technique
    }

    /// The passes, in technique order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Pass `index`.
    pub fn pass(&self, index: usize) -> Option<&Pass> {
        self.passes.get(index)
    }

    /// Mutable pass `index`, for direct uniform and binding writes. Call
    /// [`Material::update_hash`] after flushing it.
    pub fn pass_mut(&mut self, index: usize) -> Option<&mut Pass> {
        self.passes.get_mut(index)
    }

    /// Recomputes the material hash from the pass hashes.
    pub fn update_hash(&mut self) {
        self.refresh_hash();
    }

    /// Number of passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// `murmurhash2_32_gc` of the decimal pass hashes, seed 666.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Incremented by every rebuild, so dependants know to recreate pipeline states.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The define overrides of technique pass `index`.
    pub fn pass_defines(&self, index: usize) -> Option<&DefineMap> {
        self.defines.get(index)
    }

    /// The state overrides of technique pass `index`.
    pub fn pass_states(&self, index: usize) -> Option<&PassStates> {
        self.states.get(index)
    }
}
