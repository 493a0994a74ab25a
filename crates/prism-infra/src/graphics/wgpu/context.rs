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

use prism_core::platform::PrismWindowHandle;
use prism_core::renderer::{
    DeviceCaps, DeviceFeatures, DeviceInfo, DeviceLimits, GraphicsAdapterInfo,
    GraphicsBackendType, RenderError, RendererDeviceType,
};

/// The presentable surface of the main window.
#[derive(Debug)]
pub(crate) struct WgpuSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

/// Core wgpu state objects of an initialized device.
#[derive(Debug)]
pub(crate) struct WgpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: Option<WgpuSurface>,
}

impl WgpuContext {
    /// Selects an adapter, creates the logical device and configures the window surface
    /// when a window handle is given.
    pub async fn new(
        instance: &wgpu::Instance,
        window: Option<PrismWindowHandle>,
        info: &DeviceInfo,
    ) -> Result<Self, RenderError> {
        log::info!("WgpuContext: initializing...");

        let surface = match window {
            Some(window) => Some(instance.create_surface(window).map_err(|e| {
                RenderError::InitializationFailed(format!("Failed to create surface: {e}"))
            })?),
            None => None,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::InitializationFailed(format!("No suitable adapter: {e}")))?;
        let adapter_info = adapter.get_info();
        log::info!(
            "WgpuContext: using adapter \"{}\" (backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let wanted = wgpu::Features::TEXTURE_COMPRESSION_BC
            | wgpu::Features::TEXTURE_COMPRESSION_ETC2
            | wgpu::Features::TEXTURE_COMPRESSION_ASTC
            | wgpu::Features::POLYGON_MODE_LINE
            | wgpu::Features::FLOAT32_FILTERABLE;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Prism Logical Device"),
                required_features: adapter.features() & wanted,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
            })
            .await
            .map_err(|e| {
                RenderError::InitializationFailed(format!("Failed to create logical device: {e}"))
            })?;

        device.on_uncaptured_error(Box::new(|e| {
            log::error!("WgpuContext: uncaptured error: {e:?}");
        }));

        let surface = match surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&adapter);
                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|f| f.is_srgb())
                    .or_else(|| caps.formats.first().copied())
                    .ok_or_else(|| {
                        RenderError::InitializationFailed("Surface exposes no formats".into())
                    })?;
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
                    format,
                    width: info.width.max(1),
                    height: info.height.max(1),
                    present_mode: if info.vsync {
                        wgpu::PresentMode::Fifo
                    } else {
                        wgpu::PresentMode::AutoNoVsync
                    },
                    alpha_mode: caps
                        .alpha_modes
                        .first()
                        .copied()
                        .unwrap_or(wgpu::CompositeAlphaMode::Auto),
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                surface.configure(&device, &config);
                Some(WgpuSurface { surface, config })
            }
            None => None,
        };

        Ok(Self {
            adapter,
            device,
            queue,
            surface,
        })
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(surface) = self.surface.as_mut() {
            surface.config.width = width;
            surface.config.height = height;
            surface.surface.configure(&self.device, &surface.config);
        }
    }

    /// Translates the adapter's capabilities into engine caps.
    pub fn caps(&self) -> DeviceCaps {
        let wgpu_features = self.device.features();
        let wgpu_limits = self.device.limits();

        let mut features = DeviceFeatures::COLOR_HALF_FLOAT
            | DeviceFeatures::TEXTURE_HALF_FLOAT
            | DeviceFeatures::TEXTURE_FLOAT
            | DeviceFeatures::COLOR_FLOAT
            | DeviceFeatures::FORMAT_D24S8
            | DeviceFeatures::MSAA
            | DeviceFeatures::ELEMENT_INDEX_UINT
            | DeviceFeatures::INSTANCED_ARRAYS
            | DeviceFeatures::MULTIPLE_RENDER_TARGETS
            | DeviceFeatures::BLEND_MINMAX;
        features.set(
            DeviceFeatures::TEXTURE_FLOAT_LINEAR,
            wgpu_features.contains(wgpu::Features::FLOAT32_FILTERABLE),
        );
        features.set(
            DeviceFeatures::FORMAT_BC,
            wgpu_features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC),
        );
        let etc2 = wgpu_features.contains(wgpu::Features::TEXTURE_COMPRESSION_ETC2);
        features.set(DeviceFeatures::FORMAT_ETC1, etc2);
        features.set(DeviceFeatures::FORMAT_ETC2, etc2);
        features.set(
            DeviceFeatures::FORMAT_ASTC,
            wgpu_features.contains(wgpu::Features::TEXTURE_COMPRESSION_ASTC),
        );

        DeviceCaps {
            features,
            limits: DeviceLimits {
                max_vertex_attributes: wgpu_limits.max_vertex_attributes,
                max_texture_units: wgpu_limits
                    .max_sampled_textures_per_shader_stage
                    .min(wgpu_limits.max_samplers_per_shader_stage),
                max_vertex_texture_units: wgpu_limits.max_sampled_textures_per_shader_stage,
                max_uniform_buffer_bindings: wgpu_limits.max_uniform_buffers_per_shader_stage,
                max_uniform_block_size: wgpu_limits.max_uniform_buffer_binding_size as u32,
                max_texture_size: wgpu_limits.max_texture_dimension_2d,
                max_cube_map_texture_size: wgpu_limits.max_texture_dimension_2d,
                max_color_attachments: wgpu_limits.max_color_attachments,
                ubo_offset_alignment: wgpu_limits.min_uniform_buffer_offset_alignment,
                ..DeviceLimits::default()
            },
            // wgpu normalizes depth to [0, 1] on every backend.
            clip_space_min_z: 0.0,
            screen_space_sign_y: 1.0,
        }
    }
}

/// Describes a wgpu adapter in engine terms.
pub(crate) fn adapter_info(adapter: &wgpu::Adapter) -> GraphicsAdapterInfo {
    let info = adapter.get_info();
    GraphicsAdapterInfo {
        name: info.name,
        backend_type: match info.backend {
            wgpu::Backend::Vulkan => GraphicsBackendType::Vulkan,
            wgpu::Backend::Metal => GraphicsBackendType::Metal,
            wgpu::Backend::Dx12 => GraphicsBackendType::Dx12,
            wgpu::Backend::Gl => GraphicsBackendType::OpenGL,
            wgpu::Backend::BrowserWebGpu => GraphicsBackendType::WebGpu,
            _ => GraphicsBackendType::Unknown,
        },
        device_type: match info.device_type {
            wgpu::DeviceType::IntegratedGpu => RendererDeviceType::IntegratedGpu,
            wgpu::DeviceType::DiscreteGpu => RendererDeviceType::DiscreteGpu,
            wgpu::DeviceType::VirtualGpu => RendererDeviceType::VirtualGpu,
            wgpu::DeviceType::Cpu => RendererDeviceType::Cpu,
            wgpu::DeviceType::Other => RendererDeviceType::Unknown,
        },
    }
}
