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

//! # Prism Data
//!
//! Everything the render pipeline reads per frame that is not a GPU contract: the
//! program library compiling shader variants, materials and their passes, the builtin
//! resources, and the scene arena of models and views.
//!
//! All of it is built against a [`MaterialSystem`], which owns the shared state for one
//! `GraphicsDevice`.

#![warn(missing_docs)]

pub mod builtin;
pub mod error;
pub mod material;
pub mod program;
pub mod scene;
pub mod system;

pub use self::error::MaterialError;
pub use self::system::MaterialSystem;
