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

//! The arena of models the pipeline renders.

use crossbeam_channel::{Receiver, Sender};
use prism_core::renderer::{BindingLayoutId, RenderPassId};

use super::model::{MaterialSlot, Model};
use super::view::RenderView;
use crate::error::MaterialError;
use crate::material::{MaterialEvent, MaterialInstance, MaterialOwner};

/// A generational index into a [`RenderScene`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle {
    index: u32,
    generation: u32,
}

impl ModelHandle {
    /// The slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation of the slot when the handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A model visible from a view, with its distance along the view direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    /// The model.
    pub model: ModelHandle,
    /// View-space depth of the model origin.
    pub depth: f32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    model: Option<Model>,
}

/// Owns the models and routes material instance notifications back to them.
#[derive(Debug)]
pub struct RenderScene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
    events_tx: Sender<MaterialEvent>,
    events_rx: Receiver<MaterialEvent>,
}

impl Default for RenderScene {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScene {
    /// An empty scene.
    pub fn new() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            events_tx,
            events_rx,
        }
    }

    /// Adds `model`, reusing a free slot when there is one.
    pub fn add_model(&mut self, model: Model) -> ModelHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.model = Some(model);
            return ModelHandle {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            model: Some(model),
        });
        ModelHandle {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Removes the model behind `handle`. Stale handles return `None`.
    pub fn remove_model(&mut self, handle: ModelHandle) -> Option<Model> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let model = slot.model.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(model)
    }

    /// The model behind `handle`.
    pub fn get(&self, handle: ModelHandle) -> Option<&Model> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.model.as_ref())
    }

    /// The mutable model behind `handle`.
    pub fn get_mut(&mut self, handle: ModelHandle) -> Option<&mut Model> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.model.as_mut())
    }

    /// Number of live models.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the scene has no model.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live models with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ModelHandle, &Model)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.model.as_ref().map(|m| {
                (
                    ModelHandle {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    m,
                )
            })
        })
    }

    /// Enabled models sharing a visibility bit with `view`, in slot order.
    pub fn collect(&self, view: &RenderView) -> Vec<RenderObject> {
        self.iter()
            .filter(|(_, m)| m.enabled && view.sees(m.visibility))
            .map(|(handle, m)| RenderObject {
                model: handle,
                depth: view.depth_of(m.world_position()),
            })
            .collect()
    }

    /// An owner routing events of sub-model `sub_model` of `model` to this scene.
    pub fn material_owner(&self, model: ModelHandle, sub_model: usize) -> MaterialOwner {
        MaterialOwner {
            model,
            sub_model,
            events: self.events_tx.clone(),
        }
    }

    /// Replaces the shared material of a sub-model with a private instance of it.
    /// Returns `false` when the handle, the index or the parent is invalid.
    pub fn instantiate_material(
        &mut self,
        model: ModelHandle,
        sub_model: usize,
    ) -> Result<bool, MaterialError> {
        let owner = self.material_owner(model, sub_model);
        let Some(slot) = self
            .get_mut(model)
            .and_then(|m| m.sub_model_mut(sub_model))
        else {
            log::warn!("RenderScene: no sub-model {sub_model} on {model:?}");
            return Ok(false);
        };
        if matches!(slot.material(), MaterialSlot::Instance(_)) {
            return Ok(true);
        }
        let Some(parent) = slot.material().shared() else {
            return Ok(false);
        };
        let mut instance = MaterialInstance::new(&parent)?;
        instance.set_owner(Some(owner));
        slot.set_material(MaterialSlot::Instance(Box::new(instance)));
        Ok(true)
    }

    /// Drains material instance notifications, marking the affected sub-models stale.
    /// Returns the number of events applied.
    pub fn process_material_events(&mut self) -> usize {
        let events: Vec<MaterialEvent> = self.events_rx.try_iter().collect();
        let mut applied = 0;
        for event in events {
            match self
                .get_mut(event.model)
                .and_then(|m| m.sub_model_mut(event.sub_model))
            {
                Some(sub_model) => {
                    sub_model.mark_dirty();
                    applied += 1;
                }
                None => log::debug!("RenderScene: dropping event for stale {:?}", event.model),
            }
        }
        applied
    }

    /// Applies pending notifications and prepares the models of `objects` for
    /// `render_pass`. A model that fails is logged and skipped.
    pub fn prepare(
        &mut self,
        objects: &[RenderObject],
        render_pass: RenderPassId,
        global_layout: BindingLayoutId,
    ) {
        self.process_material_events();
        for object in objects {
            let Some(model) = self.get_mut(object.model) else {
                continue;
            };
            if let Err(e) = model.prepare(render_pass, global_layout) {
                log::error!("RenderScene: model '{}' not prepared: {e}", model.name());
            }
        }
    }
}
