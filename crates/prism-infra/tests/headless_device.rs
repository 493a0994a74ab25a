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

use prism_core::math::{Extent3D, LinearRgba, Origin3D, Rect};
use prism_core::renderer::{
    BindingLayoutInfo, BindingUnit, BlendState, BufferInfo, BufferTextureCopy, ClearFlags,
    CommandBufferInfo, CommandBufferLevel, DepthStencilState, DeviceInfo, DrawInfo,
    DynamicStateFlags, Filter, FramebufferInfo, GfxCommand, GraphicsDevice, InputAssemblerInfo,
    PipelineError, PipelineStateInfo, PrimitiveMode, RasterizerState, ResourceError,
    ShaderAttribute, ShaderError, ShaderInfo, ShaderStage, ShaderStageKind, TexImage,
    TextureFormat, TextureInfo, TextureType, TextureViewInfo, UniformSampler, UniformType, VertexAttribute, VertexFormat, ATTR_POSITION,
};
use prism_infra::{HeadlessAdapter, HeadlessDevice};

fn init() -> HeadlessDevice {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = HeadlessDevice::new(HeadlessAdapter::desktop());
    device
        .initialize(&DeviceInfo {
            width: 64,
            height: 32,
            ..DeviceInfo::default()
        })
        .expect("headless device should initialize");
    device
}

fn shader(name: &str, source: &str) -> ShaderInfo {
    ShaderInfo {
        name: name.to_string(),
        stages: vec![
            ShaderStage {
                stage: ShaderStageKind::Vertex,
                source: source.to_string(),
            },
            ShaderStage {
                stage: ShaderStageKind::Fragment,
                source: "void main() {}".to_string(),
            },
        ],
        attributes: vec![ShaderAttribute {
            name: ATTR_POSITION.to_string(),
            format: VertexFormat::Float32x3,
            location: 0,
        }],
        blocks: vec![],
        samplers: vec![UniformSampler {
            name: "mainTexture".into(),
            binding: 0,
            ty: UniformType::Sampler2D,
            count: 1,
        }],
    }
}

fn pipeline_info(
    device: &HeadlessDevice,
    input_layout: Vec<VertexAttribute>,
) -> Result<PipelineStateInfo, ResourceError> {
    let shader = device.create_shader(&shader("unlit", "void main() {}"))?;
    let window = device.main_window().ok_or(ResourceError::NotFound)?;
    Ok(PipelineStateInfo {
        shader,
        primitive: PrimitiveMode::TriangleList,
        rasterizer: RasterizerState::default(),
        depth_stencil: DepthStencilState::default(),
        blend: BlendState::default(),
        dynamic_states: DynamicStateFlags::VIEWPORT | DynamicStateFlags::SCISSOR,
        input_layout,
        vertex_stride: 12,
        binding_layouts: vec![],
        render_pass: window.render_pass,
    })
}

fn position_layout() -> Vec<VertexAttribute> {
    vec![VertexAttribute {
        name: ATTR_POSITION.to_string(),
        format: VertexFormat::Float32x3,
        offset: 0,
    }]
}

#[test]
fn failed_region_does_not_abort_the_batch() {
    let device = init();
    let texture = device
        .create_texture(&TextureInfo::sampled_2d("atlas", TextureFormat::Rgba8Unorm, 4, 4))
        .unwrap();
    let red = [255u8, 0, 0, 255].repeat(4);
    let regions = [
        BufferTextureCopy {
            texture_extent: Extent3D::new_2d(2, 2),
            ..BufferTextureCopy::default()
        },
        // Runs past the right edge.
        BufferTextureCopy {
            texture_offset: Origin3D { x: 3, y: 0, z: 0 },
            texture_extent: Extent3D::new_2d(2, 2),
            ..BufferTextureCopy::default()
        },
        BufferTextureCopy {
            texture_offset: Origin3D { x: 2, y: 2, z: 0 },
            texture_extent: Extent3D::new_2d(2, 2),
            ..BufferTextureCopy::default()
        },
    ];
    let copied = device
        .copy_buffers_to_texture(&[&red, &red, &red], texture, &regions)
        .unwrap();
    assert_eq!(copied, 2);
    assert_eq!(device.read_texel(texture, 0, 0), Some(vec![255, 0, 0, 255]));
    assert_eq!(device.read_texel(texture, 3, 3), Some(vec![255, 0, 0, 255]));
    assert_eq!(device.read_texel(texture, 3, 0), Some(vec![0, 0, 0, 0]));
}

#[test]
fn tex_images_upload_like_buffers() {
    let device = init();
    let texture = device
        .create_texture(&TextureInfo::sampled_2d("icons", TextureFormat::Rgba8Unorm, 4, 2))
        .unwrap();
    let green = [0u8, 255, 0, 255].repeat(4);
    let blue = [0u8, 0, 255, 255].repeat(4);
    let images = [
        TexImage {
            width: 2,
            height: 2,
            pixels: &green,
        },
        TexImage {
            width: 2,
            height: 2,
            pixels: &blue,
        },
    ];
    let regions = [
        BufferTextureCopy {
            texture_extent: Extent3D::new_2d(2, 2),
            ..BufferTextureCopy::default()
        },
        BufferTextureCopy {
            texture_offset: Origin3D { x: 2, y: 0, z: 0 },
            texture_extent: Extent3D::new_2d(2, 2),
            ..BufferTextureCopy::default()
        },
    ];
    let copied = device
        .copy_tex_images_to_texture(&images, texture, &regions)
        .unwrap();
    assert_eq!(copied, 2);
    assert_eq!(device.read_texel(texture, 1, 1), Some(vec![0, 255, 0, 255]));
    assert_eq!(device.read_texel(texture, 2, 0), Some(vec![0, 0, 255, 255]));
}

#[test]
fn unbound_textures_fall_back_to_the_null_texture() {
    let device = init();
    let layout = device
        .create_binding_layout(&BindingLayoutInfo {
            label: Some("material".into()),
            units: vec![BindingUnit::uniform_buffer(0), BindingUnit::sampled_texture(1)],
        })
        .unwrap();
    device
        .update_binding_layout(layout, &[BindingUnit::sampled_texture(1)])
        .unwrap();
    let units = device.binding_units(layout).unwrap();
    assert_eq!(
        units[1].texture_view,
        device.null_texture_view(TextureType::Tex2D)
    );

    let null_texture = device
        .texture_of_view(units[1].texture_view.unwrap())
        .unwrap();
    assert_eq!(device.read_texel(null_texture, 1, 1), Some(vec![0, 0, 0, 255]));
}

#[test]
fn binding_an_undeclared_slot_fails() {
    let device = init();
    let layout = device
        .create_binding_layout(&BindingLayoutInfo {
            label: None,
            units: vec![BindingUnit::uniform_buffer(0)],
        })
        .unwrap();
    let result = device.update_binding_layout(layout, &[BindingUnit::sampled_texture(3)]);
    assert!(matches!(result, Err(ResourceError::InvalidDescriptor(_))));
}

#[test]
fn unresolved_directives_fail_compilation() {
    let device = init();
    let result = device.create_shader(&shader(
        "broken",
        "#if USE_SKINNING\nvoid main() {}\n#endif",
    ));
    assert!(matches!(
        result,
        Err(ResourceError::Shader(ShaderError::CompilationError { .. }))
    ));
}

#[test]
fn pipeline_requires_every_shader_attribute() {
    let device = init();
    let info = pipeline_info(&device, vec![]).unwrap();
    assert!(matches!(
        device.create_pipeline_state(&info),
        Err(ResourceError::Pipeline(PipelineError::MissingVertexAttribute(name))) if name == ATTR_POSITION
    ));
    let info = pipeline_info(&device, position_layout()).unwrap();
    assert!(device.create_pipeline_state(&info).is_ok());
}

#[test]
fn a_frame_clears_draws_and_reports_stats() {
    let device = init();
    let window = device.main_window().unwrap();
    let pso = device
        .create_pipeline_state(&pipeline_info(&device, position_layout()).unwrap())
        .unwrap();
    let vertices = device
        .create_buffer(&BufferInfo::vertex("triangle", 36, 12))
        .unwrap();
    let ia = device
        .create_input_assembler(&InputAssemblerInfo {
            attributes: position_layout(),
            vertex_buffer: vertices,
            vertex_stride: 12,
            index_buffer: None,
            index_format: Default::default(),
            vertex_count: 3,
            index_count: 0,
            instance_count: 1,
        })
        .unwrap();

    let mut secondary = device
        .create_command_buffer(&CommandBufferInfo {
            label: Some("ui".into()),
            level: CommandBufferLevel::Secondary,
        })
        .unwrap();
    secondary.begin();
    secondary.bind_pipeline_state(pso);
    secondary.bind_input_assembler(ia);
    secondary.draw(DrawInfo {
        vertex_count: 3,
        instance_count: 1,
        ..DrawInfo::default()
    });
    secondary.end();

    let mut cmd = device
        .create_command_buffer(&CommandBufferInfo::default())
        .unwrap();
    cmd.begin();
    cmd.begin_render_pass(
        window.framebuffer,
        window.render_pass,
        Rect::new(0, 0, 64, 32),
        ClearFlags::ALL,
        &[LinearRgba::new(0.0, 0.0, 1.0, 1.0)],
        1.0,
        0,
    );
    cmd.execute(&[secondary.package()]);
    cmd.end_render_pass();
    cmd.end();

    device.submit(&[&cmd]).unwrap();
    assert_eq!(device.retained_package_count(), 1);
    device.present().unwrap();
    assert_eq!(device.retained_package_count(), 0);

    let stats = device.frame_stats();
    assert_eq!(stats.frame_number, 1);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.triangles, 1);
    assert_eq!(stats.command_buffers, 1);
    assert!(device
        .last_frame_commands()
        .iter()
        .any(|c| matches!(c, GfxCommand::Draw(_))));

    let mut pixels = vec![0u8; 64 * 32 * 4];
    let read = device
        .copy_framebuffer_to_buffer(
            window.framebuffer,
            &mut pixels,
            &[BufferTextureCopy {
                texture_extent: Extent3D::new_2d(64, 32),
                ..BufferTextureCopy::default()
            }],
        )
        .unwrap();
    assert_eq!(read, 1);
    assert_eq!(&pixels[..4], &[0, 0, 255, 255]);
}

#[test]
fn blit_scales_between_framebuffers() {
    let device = init();
    let window = device.main_window().unwrap();
    let small = device
        .create_texture(&TextureInfo::attachment("small", TextureFormat::Rgba8Unorm, 8, 8))
        .unwrap();
    let depth = device
        .create_texture(&TextureInfo::attachment(
            "small-depth",
            TextureFormat::Depth24PlusStencil8,
            8,
            8,
        ))
        .unwrap();
    let fb = device
        .create_framebuffer(&FramebufferInfo {
            render_pass: window.render_pass,
            color_textures: vec![small],
            depth_stencil_texture: Some(depth),
        })
        .unwrap();

    let green = [0u8, 255, 0, 255].repeat(64);
    device
        .copy_buffers_to_texture(
            &[&green],
            small,
            &[BufferTextureCopy {
                texture_extent: Extent3D::new_2d(8, 8),
                ..BufferTextureCopy::default()
            }],
        )
        .unwrap();
    device
        .blit_framebuffer(
            fb,
            window.framebuffer,
            Rect::new(0, 0, 8, 8),
            Rect::new(0, 0, 64, 32),
            Filter::Linear,
        )
        .unwrap();
    assert_eq!(
        device.read_texel(window.color_texture, 63, 31),
        Some(vec![0, 255, 0, 255])
    );
}

#[test]
fn textures_respect_the_view_range() {
    let device = init();
    let info = TextureInfo {
        mip_levels: 3,
        ..TextureInfo::sampled_2d("mips", TextureFormat::Rgba8Unorm, 4, 4)
    };
    let texture = device.create_texture(&info).unwrap();
    let mut view = TextureViewInfo::whole(texture, &info);
    assert!(device.create_texture_view(&view).is_ok());
    view.level_count = 4;
    assert!(matches!(
        device.create_texture_view(&view),
        Err(ResourceError::OutOfBounds)
    ));
    assert_eq!(device.texture_level(texture, 2).map(|l| l.len()), Some(4));
}

#[test]
fn present_requires_initialization() {
    let device = HeadlessDevice::default();
    assert!(device.present().is_err());
    assert_eq!(device.frame_stats().frame_number, 0);
}
