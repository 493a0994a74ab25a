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

//! Scene data consumed by the render pipeline: models, meshes and views.

mod mesh;
mod model;
mod render_scene;
mod view;

pub use self::mesh::{Mesh, ATTR_UV};
pub use self::model::{
    local_block, record_draw, LocalBinding, MaterialSlot, Model, PassSnapshot, SubModel,
};
pub use self::render_scene::{ModelHandle, RenderObject, RenderScene};
pub use self::view::{global_block, GlobalUniforms, NormalizedRect, RenderView, VISIBILITY_DEFAULT};
