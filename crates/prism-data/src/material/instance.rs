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

//! Per-renderable material copies.

use std::ops::Deref;
use std::sync::{Arc, RwLock, Weak};

use crossbeam_channel::Sender;
use prism_core::asset::{DefineMap, PassStates};

use super::base::{Material, SharedMaterial};
use super::property::PropertyValue;
use crate::error::MaterialError;
use crate::scene::ModelHandle;

/// Sent to the scene when an instance's compiled state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialEvent {
    /// The model owning the instance.
    pub model: ModelHandle,
    /// The sub-model slot of the instance.
    pub sub_model: usize,
    /// The new material hash.
    pub hash: u32,
    /// The new material generation.
    pub generation: u64,
}

/// Where an instance reports changes.
#[derive(Debug, Clone)]
pub struct MaterialOwner {
    /// The owning model.
    pub model: ModelHandle,
    /// The sub-model slot.
    pub sub_model: usize,
    /// The scene's event channel.
    pub events: Sender<MaterialEvent>,
}

/// A material seeded from a shared parent and owned by one sub-model.
///
/// Reads go through `Deref<Target = Material>`. Mutations go through the instance so
/// the owner hears about them.
#[derive(Debug)]
pub struct MaterialInstance {
    material: Material,
    parent: Weak<RwLock<Material>>,
    owner: Option<MaterialOwner>,
    notify: bool,
}

impl MaterialInstance {
    /// Copies `parent` into a new material.
    pub fn new(parent: &SharedMaterial) -> Result<Self, MaterialError> {
        let source = parent
            .read()
            .map_err(|_| MaterialError::Poisoned("parent material".to_string()))?;
        let mut material = Material::new(Arc::clone(source.system()));
        material.copy_from(&source)?;
        Ok(Self {
            material,
            parent: Arc::downgrade(parent),
            owner: None,
            notify: true,
        })
    }

    /// The parent, while it is alive.
    pub fn parent(&self) -> Option<SharedMaterial> {
        self.parent.upgrade()
    }

    /// The owner receiving change events.
    pub fn owner(&self) -> Option<&MaterialOwner> {
        self.owner.as_ref()
    }

    /// Sets the owner receiving change events.
    pub fn set_owner(&mut self, owner: Option<MaterialOwner>) {
        self.owner = owner;
    }

    /// Enables or disables change events.
    pub fn set_notify(&mut self, notify: bool) {
        self.notify = notify;
    }

    /// See [`Material::set_property`].
    pub fn set_property(
        &mut self,
        name: &str,
        value: PropertyValue,
        pass_idx: Option<usize>,
    ) -> bool {
        let before = self.state();
        let applied = self.material.set_property(name, value, pass_idx);
        self.notify_if_changed(before);
        applied
    }

    /// See [`Material::recompile_shaders`].
    pub fn recompile_shaders(
        &mut self,
        defines: &DefineMap,
        pass_idx: Option<usize>,
    ) -> Result<(), MaterialError> {
        let before = self.state();
        let result = self.material.recompile_shaders(defines, pass_idx);
        self.notify_if_changed(before);
        result
    }

    /// See [`Material::override_pipeline_states`].
    pub fn override_pipeline_states(
        &mut self,
        states: &PassStates,
        pass_idx: Option<usize>,
    ) -> Result<(), MaterialError> {
        let before = self.state();
        let result = self.material.override_pipeline_states(states, pass_idx);
        self.notify_if_changed(before);
        result
    }

    /// See [`Material::set_technique`].
    pub fn set_technique(&mut self, index: usize) -> Result<(), MaterialError> {
        let before = self.state();
        let result = self.material.set_technique(index);
        self.notify_if_changed(before);
        result
    }

    /// Copies the parent again, dropping local changes.
    pub fn reset(&mut self) -> Result<(), MaterialError> {
        let Some(parent) = self.parent() else {
            log::warn!("MaterialInstance: parent is gone, nothing to reset from");
            return Ok(());
        };
        let before = self.state();
        let result = {
            let source = parent
                .read()
                .map_err(|_| MaterialError::Poisoned("parent material".to_string()))?;
            self.material.copy_from(&source)
        };
        self.notify_if_changed(before);
        result
    }

    /// Releases the instance's passes. The parent is untouched.
    pub fn destroy(&mut self) {
        self.material.destroy();
    }

    fn state(&self) -> (u32, u64) {
        (self.material.hash(), self.material.generation())
    }

    fn notify_if_changed(&self, before: (u32, u64)) {
        let (hash, generation) = self.state();
        if !self.notify || before == (hash, generation) {
            return;
        }
        let Some(owner) = &self.owner else {
            return;
        };
        let event = MaterialEvent {
            model: owner.model,
            sub_model: owner.sub_model,
            hash,
            generation,
        };
        if owner.events.send(event).is_err() {
            log::debug!("MaterialInstance: owner scene is gone, event dropped");
        }
    }
}

impl Deref for MaterialInstance {
    type Target = Material;

    fn deref(&self) -> &Material {
        &self.material
    }
}
