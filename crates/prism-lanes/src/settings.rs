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

//! Pipeline configuration.

use prism_core::math::{LinearRgba, Mat4, Vec3, Vec4};
use prism_core::renderer::{ClearFlags, DeviceCaps, SampleCount, TextureFormat};
use prism_data::scene::{RenderView, VISIBILITY_DEFAULT};

const MIN_SHADING_SCALE: f32 = 0.1;
const MAX_SHADING_SCALE: f32 = 4.0;

/// Planar shadow configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    /// Whether shadows are drawn at all.
    pub enabled: bool,
    /// Normal of the receiving plane.
    pub normal: Vec3,
    /// Signed distance of the plane from the origin along `normal`.
    pub distance: f32,
    /// Direction the light travels in.
    pub light_direction: Vec3,
    /// Shadow color, alpha blended over the scene.
    pub color: LinearRgba,
    /// Shadows are drawn only for views sharing a bit with this mask.
    pub visibility: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            normal: Vec3::Y,
            distance: 0.0,
            light_direction: Vec3::new(0.0, -1.0, 0.0),
            color: LinearRgba::new(0.0, 0.0, 0.0, 0.3),
            visibility: VISIBILITY_DEFAULT,
        }
    }
}

impl ShadowSettings {
    /// The matrix flattening world points onto the shadow plane along the light
    /// direction. A light parallel to the plane yields the identity.
    pub fn plane_projection(&self) -> Mat4 {
        let n = self.normal.normalize();
        let l = self.light_direction.normalize();
        let k = n.dot(l);
        if k.abs() < prism_core::math::EPSILON {
            log::warn!("ShadowSettings: light is parallel to the shadow plane");
            return Mat4::IDENTITY;
        }
        let n = [n.x, n.y, n.z];
        let l = [l.x, l.y, l.z];
        let column = |j: usize| {
            let c = |i: usize| f32::from(u8::from(i == j)) - l[i] * n[j] / k;
            Vec4::new(c(0), c(1), c(2), 0.0)
        };
        let d = self.distance / k;
        Mat4::from_cols(
            column(0),
            column(1),
            column(2),
            Vec4::new(l[0] * d, l[1] * d, l[2] * d, 1.0),
        )
    }
}

/// Settings shared by every flow of a [`RenderPipeline`](crate::RenderPipeline).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Render the scene into a half-float target when the device supports it.
    pub hdr: bool,
    /// Resolution of the offscreen scene target relative to the window.
    pub shading_scale: f32,
    /// Render the scene offscreen and tone map it into the window.
    pub post_process: bool,
    /// Samples per pixel of the scene pass.
    pub msaa: SampleCount,
    /// Planar shadows.
    pub shadows: ShadowSettings,
    /// Clear color of views made by [`PipelineSettings::view`].
    pub clear_color: LinearRgba,
    /// Clear depth of views made by [`PipelineSettings::view`].
    pub clear_depth: f32,
    /// Clear stencil of views made by [`PipelineSettings::view`].
    pub clear_stencil: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            hdr: false,
            shading_scale: 1.0,
            post_process: false,
            msaa: SampleCount::X1,
            shadows: ShadowSettings::default(),
            clear_color: LinearRgba::new(0.2, 0.2, 0.2, 1.0),
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

impl PipelineSettings {
    /// The shading scale, clamped to a usable range. Non-finite values fall back to 1.
    pub fn effective_shading_scale(&self) -> f32 {
        if self.shading_scale.is_finite() {
            self.shading_scale.clamp(MIN_SHADING_SCALE, MAX_SHADING_SCALE)
        } else {
            1.0
        }
    }

    /// The color format of the offscreen scene target.
    pub fn scene_format(&self, caps: &DeviceCaps, window_format: TextureFormat) -> TextureFormat {
        if !self.hdr {
            return window_format;
        }
        if caps.supports_attachment(TextureFormat::Rgba16Float) {
            TextureFormat::Rgba16Float
        } else {
            log::warn!("PipelineSettings: half-float targets unsupported, HDR disabled");
            window_format
        }
    }

    /// The sample count the device can honor.
    pub fn effective_msaa(&self, caps: &DeviceCaps) -> SampleCount {
        if caps.supports_samples(self.msaa) {
            self.msaa
        } else {
            log::warn!("PipelineSettings: {:?} unsupported, MSAA disabled", self.msaa);
            SampleCount::X1
        }
    }

    /// The clear color of `view` as written to the target: scaled by exposure in HDR.
    pub fn resolve_clear_color(&self, view: &RenderView) -> LinearRgba {
        if self.hdr {
            view.clear_color.scale_rgb(view.exposure)
        } else {
            view.clear_color
        }
    }

    /// A full-window view using the configured clear values.
    pub fn view(&self, name: &str) -> RenderView {
        let mut view = RenderView::new(name);
        view.clear_flags = ClearFlags::ALL;
        view.clear_color = self.clear_color;
        view.clear_depth = self.clear_depth;
        view.clear_stencil = self.clear_stencil;
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use prism_core::renderer::DeviceFeatures;

    #[test]
    fn straight_down_light_drops_points_onto_the_plane() {
        let shadows = ShadowSettings::default();
        let p = shadows
            .plane_projection()
            .transform_point(Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn slanted_light_shifts_the_shadow() {
        let shadows = ShadowSettings {
            light_direction: Vec3::new(1.0, -1.0, 0.0),
            ..ShadowSettings::default()
        };
        let p = shadows
            .plane_projection()
            .transform_point(Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn raised_plane_keeps_points_on_it() {
        let shadows = ShadowSettings {
            distance: 2.0,
            ..ShadowSettings::default()
        };
        let p = shadows
            .plane_projection()
            .transform_point(Vec3::new(3.0, 7.0, -1.0));
        assert_relative_eq!(p.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn parallel_light_is_identity() {
        let shadows = ShadowSettings {
            light_direction: Vec3::new(1.0, 0.0, 0.0),
            ..ShadowSettings::default()
        };
        assert_eq!(shadows.plane_projection(), Mat4::IDENTITY);
    }

    #[test]
    fn hdr_falls_back_without_half_float_targets() {
        let settings = PipelineSettings {
            hdr: true,
            ..PipelineSettings::default()
        };
        let mut caps = DeviceCaps::default();
        assert_eq!(
            settings.scene_format(&caps, TextureFormat::Rgba8Unorm),
            TextureFormat::Rgba8Unorm
        );
        caps.features.insert(DeviceFeatures::COLOR_HALF_FLOAT);
        caps.features.insert(DeviceFeatures::TEXTURE_HALF_FLOAT);
        assert_eq!(
            settings.scene_format(&caps, TextureFormat::Rgba8Unorm),
            TextureFormat::Rgba16Float
        );
    }

    #[test]
    fn msaa_needs_the_feature() {
        let settings = PipelineSettings {
            msaa: SampleCount::X4,
            ..PipelineSettings::default()
        };
        let mut caps = DeviceCaps::default();
        assert_eq!(settings.effective_msaa(&caps), SampleCount::X1);
        caps.features.insert(DeviceFeatures::MSAA);
        assert_eq!(settings.effective_msaa(&caps), SampleCount::X4);
    }

    #[test]
    fn hdr_clear_color_is_exposed() {
        let settings = PipelineSettings {
            hdr: true,
            ..PipelineSettings::default()
        };
        let mut view = settings.view("main");
        view.clear_color = LinearRgba::new(0.5, 0.25, 0.1, 1.0);
        view.exposure = 2.0;
        let c = settings.resolve_clear_color(&view);
        assert_relative_eq!(c.r, 1.0);
        assert_relative_eq!(c.g, 0.5);
        assert_relative_eq!(c.a, 1.0);
    }

    #[test]
    fn shading_scale_is_clamped() {
        let mut settings = PipelineSettings {
            shading_scale: 100.0,
            ..PipelineSettings::default()
        };
        assert_relative_eq!(settings.effective_shading_scale(), MAX_SHADING_SCALE);
        settings.shading_scale = f32::NAN;
        assert_relative_eq!(settings.effective_shading_scale(), 1.0);
    }
}
