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

//! Integer extents, origins and rectangles.
//!
//! These describe texture sizes, copy regions, viewports and scissors in pixels.

/// A two-dimensional extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    /// The width.
    pub width: u32,
    /// The height.
    pub height: u32,
}

/// A three-dimensional extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    /// The width.
    pub width: u32,
    /// The height.
    pub height: u32,
    /// The depth, or number of array layers for layered textures.
    pub depth_or_array_layers: u32,
}

impl Extent3D {
    /// A 2D extent with a single layer.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }
}

impl Default for Extent3D {
    fn default() -> Self {
        Self::new_2d(1, 1)
    }
}

/// A three-dimensional origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin3D {
    /// The x-coordinate.
    pub x: u32,
    /// The y-coordinate.
    pub y: u32,
    /// The z-coordinate.
    pub z: u32,
}

/// An axis-aligned pixel rectangle with a signed origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the rectangle covers no pixel.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extent_is_one_texel() {
        assert_eq!(Extent3D::default(), Extent3D::new_2d(1, 1));
    }

    #[test]
    fn empty_rect() {
        assert!(Rect::new(0, 0, 0, 4).is_empty());
        assert!(!Rect::new(-2, 0, 1, 1).is_empty());
    }
}
