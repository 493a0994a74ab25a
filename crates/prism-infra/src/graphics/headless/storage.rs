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

//! CPU-side texel storage and the region arithmetic of transfers.

use prism_core::math::{LinearRgba, Rect};
use prism_core::renderer::{
    BufferTextureCopy, ResourceError, TextureFormat, TextureInfo, TextureType,
};

/// Texel data of one texture, one tightly packed byte vector per mip level holding every
/// layer (or depth slice) of that level back to back.
#[derive(Debug, Clone)]
pub(crate) struct TextureStorage {
    pub(crate) info: TextureInfo,
    levels: Vec<Vec<u8>>,
}

/// Where one copy region lands, in blocks and bytes.
#[derive(Debug)]
struct RegionLayout {
    level: usize,
    first_slice: u32,
    slice_count: u32,
    block_x: u32,
    block_y: u32,
    blocks_h: u32,
    row_bytes: usize,
    buffer_row_pitch: usize,
    buffer_slice_pitch: usize,
    level_row_pitch: usize,
    level_slice_size: usize,
    block_size: usize,
}

impl RegionLayout {
    fn buffer_bytes(&self, buffer_offset: u64) -> usize {
        buffer_offset as usize
            + (self.slice_count as usize - 1) * self.buffer_slice_pitch
            + (self.blocks_h as usize - 1) * self.buffer_row_pitch
            + self.row_bytes
    }

    fn level_offset(&self, slice: u32, row: u32) -> usize {
        (self.first_slice + slice) as usize * self.level_slice_size
            + (self.block_y + row) as usize * self.level_row_pitch
            + self.block_x as usize * self.block_size
    }
}

impl TextureStorage {
    pub(crate) fn new(info: TextureInfo) -> Self {
        let levels = (0..info.mip_levels.max(1))
            .map(|level| {
                let extent = info.mip_extent(level);
                let slices = Self::slice_count(&info, level);
                info.format.surface_size(extent.width, extent.height) as usize * slices as usize
            })
            .map(|size| vec![0u8; size])
            .collect();
        Self { info, levels }
    }

    fn slice_count(info: &TextureInfo, level: u32) -> u32 {
        match info.ty {
            TextureType::Tex3D => info.mip_extent(level).depth_or_array_layers,
            _ => info.layer_count(),
        }
    }

    /// Bytes of one mip level, every slice included.
    pub(crate) fn level_data(&self, level: u32) -> Option<&[u8]> {
        self.levels.get(level as usize).map(Vec::as_slice)
    }

    /// Total bytes held.
    pub(crate) fn byte_size(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    fn layout(&self, region: &BufferTextureCopy) -> Result<RegionLayout, ResourceError> {
        let info = &self.info;
        let sub = region.texture_subresource;
        if sub.mip_level >= info.mip_levels.max(1) {
            return Err(ResourceError::OutOfBounds);
        }
        let mip = info.mip_extent(sub.mip_level);
        let extent = region.texture_extent;
        let offset = region.texture_offset;
        if extent.width == 0 || extent.height == 0 {
            return Err(ResourceError::InvalidDescriptor(
                "empty copy extent".to_string(),
            ));
        }
        if offset.x + extent.width > mip.width || offset.y + extent.height > mip.height {
            return Err(ResourceError::OutOfBounds);
        }

        let (first_slice, slice_count) = match info.ty {
            TextureType::Tex3D => (offset.z, extent.depth_or_array_layers.max(1)),
            _ => (sub.base_array_layer, sub.layer_count.max(1)),
        };
        if first_slice + slice_count > Self::slice_count(info, sub.mip_level) {
            return Err(ResourceError::OutOfBounds);
        }

        let format = info.format.info();
        if offset.x % format.block_width != 0 || offset.y % format.block_height != 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "copy offset ({}, {}) is not aligned to {}x{} blocks",
                offset.x, offset.y, format.block_width, format.block_height
            )));
        }

        let buffer_width = if region.buffer_stride > 0 {
            region.buffer_stride
        } else {
            extent.width
        };
        let buffer_height = if region.buffer_image_height > 0 {
            region.buffer_image_height
        } else {
            extent.height
        };
        let buffer_row_pitch = info.format.row_size(buffer_width) as usize;
        let blocks_h = extent.height.div_ceil(format.block_height);

        Ok(RegionLayout {
            level: sub.mip_level as usize,
            first_slice,
            slice_count,
            block_x: offset.x / format.block_width,
            block_y: offset.y / format.block_height,
            blocks_h,
            row_bytes: info.format.row_size(extent.width) as usize,
            buffer_row_pitch,
            buffer_slice_pitch: buffer_row_pitch
                * buffer_height.div_ceil(format.block_height) as usize,
            level_row_pitch: info.format.row_size(mip.width) as usize,
            level_slice_size: info.format.surface_size(mip.width, mip.height) as usize,
            block_size: format.block_size as usize,
        })
    }

    /// Copies `src` into the region described by `region`.
    pub(crate) fn write_region(
        &mut self,
        src: &[u8],
        region: &BufferTextureCopy,
    ) -> Result<(), ResourceError> {
        let layout = self.layout(region)?;
        if src.len() < layout.buffer_bytes(region.buffer_offset) {
            return Err(ResourceError::OutOfBounds);
        }
        let level = &mut self.levels[layout.level];
        for slice in 0..layout.slice_count {
            for row in 0..layout.blocks_h {
                let from = region.buffer_offset as usize
                    + slice as usize * layout.buffer_slice_pitch
                    + row as usize * layout.buffer_row_pitch;
                let to = layout.level_offset(slice, row);
                level[to..to + layout.row_bytes].copy_from_slice(&src[from..from + layout.row_bytes]);
            }
        }
        Ok(())
    }

    /// Copies the region described by `region` into `dst`.
    pub(crate) fn read_region(
        &self,
        dst: &mut [u8],
        region: &BufferTextureCopy,
    ) -> Result<(), ResourceError> {
        let layout = self.layout(region)?;
        if dst.len() < layout.buffer_bytes(region.buffer_offset) {
            return Err(ResourceError::OutOfBounds);
        }
        let level = &self.levels[layout.level];
        for slice in 0..layout.slice_count {
            for row in 0..layout.blocks_h {
                let to = region.buffer_offset as usize
                    + slice as usize * layout.buffer_slice_pitch
                    + row as usize * layout.buffer_row_pitch;
                let from = layout.level_offset(slice, row);
                dst[to..to + layout.row_bytes].copy_from_slice(&level[from..from + layout.row_bytes]);
            }
        }
        Ok(())
    }

    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = (i64::from(rect.x) + i64::from(rect.width)).clamp(0, i64::from(self.info.width)) as u32;
        let y1 = (i64::from(rect.y) + i64::from(rect.height)).clamp(0, i64::from(self.info.height)) as u32;
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    /// Writes `texel` into every texel of `rect` on the first slice of level 0. `rect` is
    /// clipped to the texture.
    pub(crate) fn fill(&mut self, rect: Rect, texel: &[u8]) {
        let format = self.info.format.info();
        if format.is_compressed || texel.len() != format.block_size as usize {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let pitch = self.info.format.row_size(self.info.width) as usize;
        let level = &mut self.levels[0];
        for y in y0..y1 {
            for x in x0..x1 {
                let at = y as usize * pitch + x as usize * texel.len();
                level[at..at + texel.len()].copy_from_slice(texel);
            }
        }
    }

    /// The texel at (`x`, `y`) on the first slice of level 0.
    pub(crate) fn texel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let format = self.info.format.info();
        if format.is_compressed || x >= self.info.width || y >= self.info.height {
            return None;
        }
        let size = format.block_size as usize;
        let at = y as usize * self.info.format.row_size(self.info.width) as usize + x as usize * size;
        self.levels[0].get(at..at + size)
    }

    /// Scales `src_rect` of `src` into `dst_rect` of `self`, nearest texel.
    pub(crate) fn blit_from(
        &mut self,
        src: &TextureStorage,
        src_rect: Rect,
        dst_rect: Rect,
    ) -> Result<(), ResourceError> {
        if src.info.format != self.info.format {
            return Err(ResourceError::InvalidDescriptor(format!(
                "blit between {:?} and {:?}",
                src.info.format, self.info.format
            )));
        }
        if src_rect.is_empty() || dst_rect.is_empty() {
            return Ok(());
        }
        let Some((x0, y0, x1, y1)) = self.clip(dst_rect) else {
            return Ok(());
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let u = (f64::from(x) - f64::from(dst_rect.x) + 0.5) / f64::from(dst_rect.width);
                let v = (f64::from(y) - f64::from(dst_rect.y) + 0.5) / f64::from(dst_rect.height);
                let sx = f64::from(src_rect.x) + u * f64::from(src_rect.width);
                let sy = f64::from(src_rect.y) + v * f64::from(src_rect.height);
                if sx < 0.0 || sy < 0.0 {
                    continue;
                }
                let Some(texel) = src.texel(sx as u32, sy as u32) else {
                    continue;
                };
                let texel = texel.to_vec();
                self.fill(Rect::new(x as i32, y as i32, 1, 1), &texel);
            }
        }
        Ok(())
    }
}

/// Encodes a clear color in `format`. Formats the headless backend does not clear yield
/// `None`.
pub(crate) fn encode_color(format: TextureFormat, color: LinearRgba) -> Option<Vec<u8>> {
    let rgba = color.to_rgba8();
    let srgb = color.to_srgb().to_rgba8();
    match format {
        TextureFormat::R8Unorm => Some(vec![rgba[0]]),
        TextureFormat::Rg8Unorm => Some(vec![rgba[0], rgba[1]]),
        TextureFormat::Rgba8Unorm => Some(rgba.to_vec()),
        TextureFormat::Rgba8UnormSrgb => Some(srgb.to_vec()),
        TextureFormat::Bgra8Unorm => Some(vec![rgba[2], rgba[1], rgba[0], rgba[3]]),
        TextureFormat::Bgra8UnormSrgb => Some(vec![srgb[2], srgb[1], srgb[0], srgb[3]]),
        TextureFormat::R32Float => Some(color.r.to_le_bytes().to_vec()),
        TextureFormat::Rgba32Float => {
            Some(bytemuck::cast_slice(&[color.r, color.g, color.b, color.a]).to_vec())
        }
        _ => None,
    }
}

/// Encodes a depth/stencil clear value in `format`.
pub(crate) fn encode_depth_stencil(format: TextureFormat, depth: f32, stencil: u32) -> Option<Vec<u8>> {
    let depth = depth.clamp(0.0, 1.0);
    match format {
        TextureFormat::Depth16Unorm => Some(((depth * 65535.0) as u16).to_le_bytes().to_vec()),
        TextureFormat::Depth24Plus | TextureFormat::Depth32Float => {
            Some(depth.to_le_bytes().to_vec())
        }
        TextureFormat::Depth24PlusStencil8 => {
            let packed = ((depth * 16_777_215.0) as u32) | ((stencil & 0xff) << 24);
            Some(packed.to_le_bytes().to_vec())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::math::{Extent3D, Origin3D};
    use prism_core::renderer::TextureSubresource;

    fn rgba8(width: u32, height: u32) -> TextureStorage {
        TextureStorage::new(TextureInfo::sampled_2d(
            "t",
            TextureFormat::Rgba8Unorm,
            width,
            height,
        ))
    }

    fn region(x: u32, y: u32, width: u32, height: u32) -> BufferTextureCopy {
        BufferTextureCopy {
            texture_offset: Origin3D { x, y, z: 0 },
            texture_extent: Extent3D::new_2d(width, height),
            ..BufferTextureCopy::default()
        }
    }

    #[test]
    fn write_then_read_sub_region() {
        let mut tex = rgba8(4, 4);
        let pixels: Vec<u8> = (0..16).collect();
        tex.write_region(&pixels, &region(2, 1, 2, 2)).unwrap();
        assert_eq!(tex.texel(2, 1), Some(&[0u8, 1, 2, 3][..]));
        assert_eq!(tex.texel(3, 2), Some(&[12u8, 13, 14, 15][..]));
        assert_eq!(tex.texel(0, 0), Some(&[0u8, 0, 0, 0][..]));

        let mut back = vec![0u8; 16];
        tex.read_region(&mut back, &region(2, 1, 2, 2)).unwrap();
        assert_eq!(back, pixels);
    }

    #[test]
    fn out_of_bounds_regions_are_rejected() {
        let mut tex = rgba8(4, 4);
        let pixels = vec![0u8; 64];
        assert!(matches!(
            tex.write_region(&pixels, &region(3, 0, 2, 1)),
            Err(ResourceError::OutOfBounds)
        ));
        assert!(matches!(
            tex.write_region(&pixels[..4], &region(0, 0, 2, 1)),
            Err(ResourceError::OutOfBounds)
        ));
        let bad_mip = BufferTextureCopy {
            texture_subresource: TextureSubresource {
                mip_level: 1,
                ..TextureSubresource::default()
            },
            ..region(0, 0, 1, 1)
        };
        assert!(tex.write_region(&pixels, &bad_mip).is_err());
    }

    #[test]
    fn compressed_offsets_must_be_block_aligned() {
        let mut tex = TextureStorage::new(TextureInfo::sampled_2d("bc", TextureFormat::Bc1Rgba, 8, 8));
        let blocks = vec![0u8; 8];
        assert!(tex.write_region(&blocks, &region(4, 4, 4, 4)).is_ok());
        assert!(matches!(
            tex.write_region(&blocks, &region(2, 0, 4, 4)),
            Err(ResourceError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn fill_clips_to_the_texture() {
        let mut tex = rgba8(2, 2);
        tex.fill(Rect::new(1, -1, 5, 2), &[9, 9, 9, 9]);
        assert_eq!(tex.texel(1, 0), Some(&[9u8, 9, 9, 9][..]));
        assert_eq!(tex.texel(0, 0), Some(&[0u8, 0, 0, 0][..]));
        assert_eq!(tex.texel(1, 1), Some(&[0u8, 0, 0, 0][..]));
    }

    #[test]
    fn blit_downscales_nearest() {
        let mut src = rgba8(2, 2);
        src.fill(Rect::new(0, 0, 2, 2), &[255, 0, 0, 255]);
        let mut dst = rgba8(1, 1);
        dst.blit_from(&src, Rect::new(0, 0, 2, 2), Rect::new(0, 0, 1, 1))
            .unwrap();
        assert_eq!(dst.texel(0, 0), Some(&[255u8, 0, 0, 255][..]));
    }

    #[test]
    fn clear_colors_follow_the_format() {
        let red = LinearRgba::new(1.0, 0.0, 0.0, 1.0);
        assert_eq!(
            encode_color(TextureFormat::Bgra8Unorm, red),
            Some(vec![0, 0, 255, 255])
        );
        assert_eq!(encode_color(TextureFormat::Rgba16Float, red), None);
        assert_eq!(
            encode_depth_stencil(TextureFormat::Depth32Float, 1.0, 0),
            Some(1.0f32.to_le_bytes().to_vec())
        );
    }
}
