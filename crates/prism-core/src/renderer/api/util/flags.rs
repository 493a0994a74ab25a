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

//! Bitmask types used by resource descriptors and command recording.

use crate::prism_bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

prism_bitflags! {
    /// How a buffer will be used.
    pub struct BufferUsage: u32 {
        /// Source of a copy.
        const TRANSFER_SRC = 1 << 0;
        /// Destination of a copy or update.
        const TRANSFER_DST = 1 << 1;
        /// Index buffer.
        const INDEX = 1 << 2;
        /// Vertex buffer.
        const VERTEX = 1 << 3;
        /// Uniform buffer.
        const UNIFORM = 1 << 4;
        /// Indirect draw arguments.
        const INDIRECT = 1 << 5;
    }
}

prism_bitflags! {
    /// How a texture will be used.
    pub struct TextureUsage: u32 {
        /// Source of a copy.
        const TRANSFER_SRC = 1 << 0;
        /// Destination of a copy.
        const TRANSFER_DST = 1 << 1;
        /// Sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Color attachment of a framebuffer.
        const COLOR_ATTACHMENT = 1 << 3;
        /// Depth/stencil attachment of a framebuffer.
        const DEPTH_STENCIL_ATTACHMENT = 1 << 4;
    }
}

prism_bitflags! {
    /// Which attachments a render pass clears when it begins.
    pub struct ClearFlags: u32 {
        /// Clear the color attachments.
        const COLOR = 1 << 0;
        /// Clear the depth aspect.
        const DEPTH = 1 << 1;
        /// Clear the stencil aspect.
        const STENCIL = 1 << 2;
        /// Clear depth and stencil.
        const DEPTH_STENCIL = Self::DEPTH.bits() | Self::STENCIL.bits();
        /// Clear everything.
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

prism_bitflags! {
    /// Enables writes to individual color channels.
    pub struct ColorWrites: u8 {
        /// Red channel.
        const R = 0b0001;
        /// Green channel.
        const G = 0b0010;
        /// Blue channel.
        const B = 0b0100;
        /// Alpha channel.
        const A = 0b1000;
        /// All channels.
        const ALL = 0b1111;
    }
}

impl Serialize for ColorWrites {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for ColorWrites {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(ColorWrites::from_bits_truncate)
    }
}

prism_bitflags! {
    /// Pipeline states that are set while recording instead of baked into the state object.
    pub struct DynamicStateFlags: u32 {
        /// Viewport rectangle.
        const VIEWPORT = 1 << 0;
        /// Scissor rectangle.
        const SCISSOR = 1 << 1;
        /// Line width.
        const LINE_WIDTH = 1 << 2;
        /// Depth bias.
        const DEPTH_BIAS = 1 << 3;
        /// Blend constants.
        const BLEND_CONSTANTS = 1 << 4;
        /// Stencil reference.
        const STENCIL_REFERENCE = 1 << 5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_writes_serialize_as_bits() {
        let json = serde_json::to_string(&(ColorWrites::R | ColorWrites::A)).unwrap();
        assert_eq!(json, "9");
        let back: ColorWrites = serde_json::from_str("15").unwrap();
        assert_eq!(back, ColorWrites::ALL);
    }

    #[test]
    fn clear_all_covers_every_aspect() {
        assert!(ClearFlags::ALL.contains(ClearFlags::COLOR | ClearFlags::DEPTH_STENCIL));
    }
}
