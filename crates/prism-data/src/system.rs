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

//! The material system: the shared state every material and pass is built against.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ahash::AHashMap;
use prism_core::asset::{DefineMap, EffectAsset};
use prism_core::renderer::{DeviceCaps, GraphicsDevice, SamplerId};

use crate::builtin::BuiltinResources;
use crate::error::MaterialError;
use crate::material::{PhaseRegistry, TextureHandle};
use crate::program::{Program, ProgramLib};

/// Owns the program library, the phase registry, the registered effects and the builtin
/// resources of one device.
///
/// Shared as `Arc<MaterialSystem>`. Builtin materials hold the system too, so
/// [`MaterialSystem::teardown`] must be called to release them.
pub struct MaterialSystem {
    device: Arc<dyn GraphicsDevice>,
    programs: Mutex<ProgramLib>,
    phases: RwLock<PhaseRegistry>,
    effects: RwLock<AHashMap<String, Arc<EffectAsset>>>,
    builtins: RwLock<Option<Arc<BuiltinResources>>>,
}

impl std::fmt::Debug for MaterialSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialSystem")
            .field("effects", &self.effect_names())
            .field("variants", &self.variant_count())
            .finish_non_exhaustive()
    }
}

impl MaterialSystem {
    /// A system for `device`, without builtins.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            programs: Mutex::new(ProgramLib::new(Arc::clone(&device))),
            device,
            phases: RwLock::new(PhaseRegistry::default()),
            effects: RwLock::new(AHashMap::new()),
            builtins: RwLock::new(None),
        }
    }

    /// Creates the system and its builtin resources.
    pub fn with_builtins(device: Arc<dyn GraphicsDevice>) -> Result<Arc<Self>, MaterialError> {
        let system = Arc::new(Self::new(device));
        system.register_builtins()?;
        Ok(system)
    }

    /// The device everything is created on.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Capabilities of the device.
    pub fn capabilities(&self) -> DeviceCaps {
        self.device.capabilities()
    }

    // --- Effects and programs ---

    /// Registers `effect` and its shader templates. Re-registering a name replaces it.
    pub fn register_effect(&self, effect: Arc<EffectAsset>) {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register_effect(&effect);
        let mut effects = self.effects.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = effects.get(&effect.name) {
            if Arc::ptr_eq(previous, &effect) {
                return;
            }
            log::debug!("MaterialSystem: replacing effect '{}'", effect.name);
        }
        effects.insert(effect.name.clone(), effect);
    }

    /// The effect registered under `name`.
    pub fn find_effect(&self, name: &str) -> Option<Arc<EffectAsset>> {
        self.effects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of every registered effect, sorted.
    pub fn effect_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .effects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// The compiled variant of program `name` for `defines`.
    pub fn get_program(
        &self,
        name: &str,
        defines: &DefineMap,
    ) -> Result<Arc<Program>, MaterialError> {
        let mut programs = self
            .programs
            .lock()
            .map_err(|_| MaterialError::Poisoned("program library".to_string()))?;
        Ok(programs.get_program(name, defines)?)
    }

    /// Number of compiled program variants.
    pub fn variant_count(&self) -> usize {
        self.programs
            .lock()
            .map(|p| p.variant_count())
            .unwrap_or_default()
    }

    /// The defines derived from the device capabilities.
    pub fn device_defines(&self) -> DefineMap {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .device_defines()
            .clone()
    }

    // --- Phases ---

    /// The bit of phase `name`, registering it on first use.
    pub fn phase(&self, name: &str) -> u32 {
        if let Some(bit) = self
            .phases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return bit;
        }
        self.phases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_register(name)
    }

    /// The combined bits of `names`.
    pub fn phase_mask<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> u32 {
        self.phases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .mask(names)
    }

    // --- Builtins ---

    /// Creates the builtin textures, sampler, effects and materials.
    ///
    /// Does nothing when they already exist.
    pub fn register_builtins(self: &Arc<Self>) -> Result<(), MaterialError> {
        if self.builtins().is_some() {
            return Ok(());
        }
        let builtins = Arc::new(BuiltinResources::create(self)?);
        *self
            .builtins
            .write()
            .map_err(|_| MaterialError::Poisoned("builtin resources".to_string()))? =
            Some(builtins);
        log::info!("MaterialSystem: builtin resources registered");
        Ok(())
    }

    /// The builtin resources, once registered.
    pub fn builtins(&self) -> Option<Arc<BuiltinResources>> {
        self.builtins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The builtin texture `name` (`white`, `black`, `grey` or `normal`).
    pub fn builtin_texture(&self, name: &str) -> Option<TextureHandle> {
        self.builtins()?.texture(name)
    }

    /// The sampler bound when a material gives none.
    pub fn default_sampler(&self) -> Option<SamplerId> {
        self.builtins().map(|b| b.default_sampler())
    }

    /// The effect used by materials without one.
    pub fn missing_effect(&self) -> Option<Arc<EffectAsset>> {
        self.builtins().map(|b| Arc::clone(b.missing_effect()))
    }

    /// Releases the builtin resources and every compiled program.
    ///
    /// Builtin materials keep the system alive; this breaks that cycle. Materials
    /// created afterwards fall back to having no missing effect.
    pub fn teardown(&self) {
        let builtins = self
            .builtins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(builtins) = builtins {
            builtins.destroy();
        }
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .destroy();
        log::info!("MaterialSystem: torn down");
    }
}
