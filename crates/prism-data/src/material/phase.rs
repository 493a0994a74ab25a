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

//! Phase names and their bits.
//!
//! Every pass belongs to one phase. Render queues select passes with a mask of phase
//! bits, so the registry hands out one bit per distinct name.

use ahash::AHashMap;

/// The phase of ordinary forward passes.
pub const PHASE_DEFAULT: &str = "default";
/// Additive per-light forward passes.
pub const PHASE_FORWARD_ADD: &str = "forward-add";
/// Passes rendering into shadow maps.
pub const PHASE_SHADOW_CASTER: &str = "shadow-caster";

/// Maps phase names to single-bit masks.
#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    phases: AHashMap<String, u32>,
    next_bit: u32,
}

impl Default for PhaseRegistry {
    fn default() -> Self {
        let mut registry = Self {
            phases: AHashMap::new(),
            next_bit: 0,
        };
        for name in [PHASE_DEFAULT, PHASE_FORWARD_ADD, PHASE_SHADOW_CASTER] {
            registry.get_or_register(name);
        }
        registry
    }
}

impl PhaseRegistry {
    /// The bit of `name`, if it was registered.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.phases.get(name).copied()
    }

    /// The bit of `name`, registering it with the next free bit if needed.
    ///
    /// Once all 32 bits are taken, new names map to `0` and match no queue.
    pub fn get_or_register(&mut self, name: &str) -> u32 {
        if let Some(bit) = self.phases.get(name) {
            return *bit;
        }
        if self.next_bit >= u32::BITS {
            log::warn!("PhaseRegistry: no bit left for phase '{name}'");
            return 0;
        }
        let bit = 1 << self.next_bit;
        self.next_bit += 1;
        self.phases.insert(name.to_string(), bit);
        log::debug!("PhaseRegistry: phase '{name}' uses bit {bit:#x}");
        bit
    }

    /// The union of the bits of `names`. Unknown names are registered.
    pub fn mask<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> u32 {
        names
            .into_iter()
            .fold(0, |mask, name| mask | self.get_or_register(name))
    }

    /// Number of registered phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Returns `true` if no phase is registered.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_phases_take_the_first_bits() {
        let registry = PhaseRegistry::default();
        assert_eq!(registry.get(PHASE_DEFAULT), Some(1));
        assert_eq!(registry.get(PHASE_FORWARD_ADD), Some(2));
        assert_eq!(registry.get(PHASE_SHADOW_CASTER), Some(4));
    }

    #[test]
    fn new_names_get_the_next_free_bit() {
        let mut registry = PhaseRegistry::default();
        assert_eq!(registry.get_or_register("ui"), 8);
        assert_eq!(registry.get_or_register("ui"), 8);
        assert_eq!(registry.mask(["default", "ui"]), 9);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn exhausted_registry_maps_to_zero() {
        let mut registry = PhaseRegistry::default();
        for i in 0..29 {
            assert_ne!(registry.get_or_register(&format!("phase-{i}")), 0);
        }
        assert_eq!(registry.get_or_register("one-too-many"), 0);
        assert_eq!(registry.get("one-too-many"), None);
    }
}
