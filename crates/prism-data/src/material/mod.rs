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

//! Materials, their passes and the values bound to them.

mod base;
mod instance;
pub mod pass;
mod phase;
mod property;

pub use self::base::{Material, MaterialInfo, PassOverrides, SharedMaterial, MATERIAL_HASH_SEED};
pub use self::instance::{MaterialEvent, MaterialInstance, MaterialOwner};
pub use self::pass::{Handle, Pass, PassInfo, SET_GLOBAL, SET_LOCAL, SET_PASS};
pub use self::phase::{PhaseRegistry, PHASE_DEFAULT, PHASE_FORWARD_ADD, PHASE_SHADOW_CASTER};
pub use self::property::{PropertyValue, TextureHandle};
