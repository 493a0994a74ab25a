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

//! Cameras as the pipeline sees them.

use prism_core::math::{LinearRgba, Mat4, Rect, Vec3, Vec4};
use prism_core::renderer::{ClearFlags, Uniform, UniformBlock, UniformType};

/// Visibility bit every model and view starts with.
pub const VISIBILITY_DEFAULT: u32 = 1;

/// A viewport in normalized window coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    /// Left edge, 0 to 1.
    pub x: f32,
    /// Top edge, 0 to 1.
    pub y: f32,
    /// Width, 0 to 1.
    pub width: f32,
    /// Height, 0 to 1.
    pub height: f32,
}

impl NormalizedRect {
    /// The whole window.
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };
}

impl Default for NormalizedRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// The uniform data of binding set 0.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GlobalUniforms {
    /// Projection times view.
    pub view_proj: Mat4,
    /// Camera position, `w` unused.
    pub camera_pos: Vec4,
    /// `x` exposure, `y` shading scale, `z` and `w` unused.
    pub params: Vec4,
}

/// The layout of [`GlobalUniforms`].
pub fn global_block() -> UniformBlock {
    UniformBlock {
        name: "Global".to_string(),
        binding: 0,
        members: vec![
            Uniform {
                name: "view_proj".to_string(),
                ty: UniformType::Mat4,
                count: 1,
            },
            Uniform {
                name: "camera_pos".to_string(),
                ty: UniformType::Float4,
                count: 1,
            },
            Uniform {
                name: "params".to_string(),
                ty: UniformType::Float4,
                count: 1,
            },
        ],
    }
}

/// One camera rendered by the pipeline each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderView {
    /// Debug name.
    pub name: String,
    /// Disabled views are skipped.
    pub enabled: bool,
    /// Views render in ascending priority.
    pub priority: i32,
    /// Area of the window covered.
    pub viewport: NormalizedRect,
    /// Attachments cleared when the view begins.
    pub clear_flags: ClearFlags,
    /// Clear color, linear.
    pub clear_color: LinearRgba,
    /// Clear depth.
    pub clear_depth: f32,
    /// Clear stencil.
    pub clear_stencil: u32,
    /// Only models sharing a bit are drawn.
    pub visibility: u32,
    /// Exposure applied to the clear color and by tone mapping.
    pub exposure: f32,
    /// World-space camera position.
    pub camera_position: Vec3,
    /// World-space camera direction, normalized.
    pub camera_forward: Vec3,
    /// World to view.
    pub view: Mat4,
    /// View to clip.
    pub projection: Mat4,
}

impl RenderView {
    /// A view at the origin looking down `-Z`, with an identity projection.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            priority: 0,
            viewport: NormalizedRect::FULL,
            clear_flags: ClearFlags::ALL,
            clear_color: LinearRgba::new(0.2, 0.2, 0.2, 1.0),
            clear_depth: 1.0,
            clear_stencil: 0,
            visibility: VISIBILITY_DEFAULT,
            exposure: 1.0,
            camera_position: Vec3::ZERO,
            camera_forward: Vec3::NEG_Z,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }

    /// Places the camera at `eye` looking at `target`. A degenerate basis leaves the
    /// view unchanged.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) -> &mut Self {
        match Mat4::look_at_rh(eye, target, up) {
            Some(view) => {
                self.view = view;
                self.camera_position = eye;
                self.camera_forward = (target - eye).normalize();
            }
            None => log::warn!("RenderView: degenerate look_at for '{}'", self.name),
        }
        self
    }

    /// Sets a right-handed perspective projection with a `[0, 1]` depth range.
    pub fn perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) -> &mut Self {
        self.projection = Mat4::perspective_rh_zo(fov_y, aspect, near, far);
        self
    }

    /// Projection times view.
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Distance of `point` along the camera direction.
    pub fn depth_of(&self, point: Vec3) -> f32 {
        (point - self.camera_position).dot(self.camera_forward)
    }

    /// Returns `true` if a model with `visibility` is drawn by this view.
    pub fn sees(&self, visibility: u32) -> bool {
        self.visibility & visibility != 0
    }

    /// The pixel rectangle of the viewport on a `width` by `height` target, scaled by
    /// `shading_scale`.
    pub fn render_area(&self, width: u32, height: u32, shading_scale: f32) -> Rect {
        let w = width as f32 * shading_scale;
        let h = height as f32 * shading_scale;
        Rect::new(
            (self.viewport.x * w) as i32,
            (self.viewport.y * h) as i32,
            (self.viewport.width * w) as u32,
            (self.viewport.height * h) as u32,
        )
    }

    /// The global uniforms of this view.
    pub fn global_uniforms(&self, shading_scale: f32) -> GlobalUniforms {
        GlobalUniforms {
            view_proj: self.view_proj(),
            camera_pos: self.camera_position.extend(1.0),
            params: Vec4::new(self.exposure, shading_scale, 0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn global_block_matches_uniform_struct() {
        assert_eq!(
            global_block().size() as usize,
            std::mem::size_of::<GlobalUniforms>()
        );
    }

    #[test]
    fn depth_grows_along_forward() {
        let mut view = RenderView::new("main");
        view.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        assert_relative_eq!(view.depth_of(Vec3::ZERO), 10.0, epsilon = 1e-4);
        assert_relative_eq!(view.depth_of(Vec3::new(0.0, 0.0, -5.0)), 15.0, epsilon = 1e-4);
    }

    #[test]
    fn render_area_scales_the_viewport() {
        let mut view = RenderView::new("half");
        view.viewport = NormalizedRect {
            x: 0.5,
            y: 0.0,
            width: 0.5,
            height: 1.0,
        };
        assert_eq!(view.render_area(800, 600, 1.0), Rect::new(400, 0, 400, 600));
        assert_eq!(view.render_area(800, 600, 0.5), Rect::new(200, 0, 200, 300));
    }

    #[test]
    fn visibility_is_a_mask() {
        let mut view = RenderView::new("ui");
        view.visibility = 0b10;
        assert!(view.sees(0b11));
        assert!(!view.sees(0b01));
    }
}
