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

//! Render passes and framebuffers.

use crate::renderer::api::resource::TextureId;
use crate::renderer::api::util::{SampleCount, TextureFormat};

/// An opaque handle to a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassId(pub usize);

/// An opaque handle to a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub usize);

/// What happens to an attachment when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Keep the previous contents.
    Load,
    /// Clear to the value given at `begin_render_pass`.
    #[default]
    Clear,
    /// Contents are undefined.
    Discard,
}

/// What happens to an attachment when a render pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Keep the rendered contents.
    #[default]
    Store,
    /// Contents may be discarded.
    Discard,
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachment {
    /// Texel format.
    pub format: TextureFormat,
    /// Samples per texel.
    pub samples: SampleCount,
    /// Load operation.
    pub load_op: LoadOp,
    /// Store operation.
    pub store_op: StoreOp,
}

/// The depth/stencil attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilAttachment {
    /// Texel format.
    pub format: TextureFormat,
    /// Samples per texel.
    pub samples: SampleCount,
    /// Depth load operation.
    pub depth_load_op: LoadOp,
    /// Depth store operation.
    pub depth_store_op: StoreOp,
    /// Stencil load operation.
    pub stencil_load_op: LoadOp,
    /// Stencil store operation.
    pub stencil_store_op: StoreOp,
}

/// Describes a render pass to create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPassInfo {
    /// Color attachments.
    pub color_attachments: Vec<ColorAttachment>,
    /// Optional depth/stencil attachment.
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

impl RenderPassInfo {
    /// A single-sample pass with one color and one depth/stencil attachment.
    pub fn simple(color: TextureFormat, depth_stencil: Option<TextureFormat>, load: LoadOp) -> Self {
        Self {
            color_attachments: vec![ColorAttachment {
                format: color,
                samples: SampleCount::X1,
                load_op: load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: depth_stencil.map(|format| DepthStencilAttachment {
                format,
                samples: SampleCount::X1,
                depth_load_op: LoadOp::Clear,
                depth_store_op: StoreOp::Store,
                stencil_load_op: LoadOp::Clear,
                stencil_store_op: StoreOp::Store,
            }),
        }
    }
}

/// Describes a framebuffer to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferInfo {
    /// The render pass the framebuffer is compatible with.
    pub render_pass: RenderPassId,
    /// Color textures, one per color attachment.
    pub color_textures: Vec<TextureId>,
    /// Depth/stencil texture.
    pub depth_stencil_texture: Option<TextureId>,
}
