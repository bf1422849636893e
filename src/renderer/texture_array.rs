use anyhow::{ensure, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::scene::TextureDesc;
use crate::vulkan::{Context, Image, ImageBarrier, ImageView, Sampler};

const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const BYTES_PER_PIXEL: usize = 4;

/// Extent used when an array carries no authored texture at all.
const FALLBACK_EXTENT: (u32, u32) = (16, 16);

/// All textures sharing one array must agree on their extent, the per layer
/// byte stride depends on it.
pub fn validate_dimensions(textures: &[&TextureDesc]) -> Result<(u32, u32)> {
    let Some(first) = textures.first() else {
        return Ok(FALLBACK_EXTENT);
    };

    for texture in &textures[1..] {
        ensure!(
            (texture.width, texture.height) == (first.width, first.height),
            "Texture array dimension mismatch: {}x{} vs {}x{}",
            texture.width,
            texture.height,
            first.width,
            first.height
        );
    }

    Ok((first.width, first.height))
}

pub fn layer_size_bytes(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Device local layered image holding slot 0 as an all-zero placeholder and
/// one layer per registered texture, plus its linear sampler.
pub struct TextureArray {
    pub image: Image,
    pub view: ImageView,
    pub sampler: Sampler,
    pub extent: (u32, u32),
    pub layer_count: u32,
}

impl TextureArray {
    /// Array of all material textures. Shader visible indices are layer
    /// numbers, so a registered texture resolves to its position plus one.
    pub fn material_array(context: &Context, textures: &[TextureDesc]) -> Result<Self> {
        let refs = textures.iter().collect::<Vec<_>>();
        Self::create(context, &refs)
    }

    /// Skybox array. A missing skybox becomes a small solid black layer so
    /// the miss shader can sample unconditionally.
    pub fn skybox_array(context: &Context, skybox: Option<&TextureDesc>) -> Result<Self> {
        let black = TextureDesc {
            width: FALLBACK_EXTENT.0,
            height: FALLBACK_EXTENT.1,
            pixels: vec![0; layer_size_bytes(FALLBACK_EXTENT.0, FALLBACK_EXTENT.1)],
        };
        Self::create(context, &[skybox.unwrap_or(&black)])
    }

    fn create(context: &Context, textures: &[&TextureDesc]) -> Result<Self> {
        let (width, height) = validate_dimensions(textures)?;
        let layer_count = textures.len() as u32 + 1;
        let layer_size = layer_size_bytes(width, height);

        log::trace!("Texture array: {layer_count} layers of {width}x{height}");

        // slot 0 stays zeroed as the "no texture" placeholder
        let mut pixel_data = vec![0u8; layer_size * layer_count as usize];
        for (position, texture) in textures.iter().enumerate() {
            let offset = (position + 1) * layer_size;
            pixel_data[offset..offset + layer_size].copy_from_slice(&texture.pixels);
        }

        let staging_buffer = context.create_buffer(
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            pixel_data.len() as vk::DeviceSize,
        )?;
        staging_buffer.copy_data_to_buffer(&pixel_data)?;

        let image = context.create_layered_image(
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            MemoryLocation::GpuOnly,
            FORMAT,
            width,
            height,
            layer_count,
        )?;

        let regions = (0..layer_count)
            .map(|layer| {
                vk::BufferImageCopy::default()
                    .buffer_offset(layer as vk::DeviceSize * layer_size as vk::DeviceSize)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: layer,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    })
            })
            .collect::<Vec<_>>();

        context.execute_one_time_commands(|cmd_buffer| {
            cmd_buffer.pipeline_image_barriers(&[ImageBarrier {
                image: &image,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_access_mask: vk::AccessFlags2::NONE,
                dst_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                src_stage_mask: vk::PipelineStageFlags2::NONE,
                dst_stage_mask: vk::PipelineStageFlags2::TRANSFER,
            }]);

            cmd_buffer.copy_buffer_to_image(
                &staging_buffer,
                &image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );

            cmd_buffer.pipeline_image_barriers(&[ImageBarrier {
                image: &image,
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                src_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                dst_access_mask: vk::AccessFlags2::SHADER_READ,
                src_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                dst_stage_mask: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            }]);
        })?;

        let view = image.create_image_view()?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(8.0);
        let sampler = context.create_sampler(&sampler_info)?;

        Ok(Self {
            image,
            view,
            sampler,
            extent: (width, height),
            layer_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            pixels: vec![0xab; layer_size_bytes(width, height)],
        }
    }

    #[test]
    fn dimensions_must_agree_within_one_array() {
        let a = texture(8, 8);
        let b = texture(8, 8);
        let c = texture(4, 8);

        assert_eq!(validate_dimensions(&[&a, &b]).unwrap(), (8, 8));
        assert!(validate_dimensions(&[&a, &c]).is_err());
    }

    #[test]
    fn empty_array_falls_back_to_16x16() {
        assert_eq!(validate_dimensions(&[]).unwrap(), (16, 16));
    }

    #[test]
    fn layer_stride_is_rgba8() {
        assert_eq!(layer_size_bytes(16, 16), 1024);
        assert_eq!(layer_size_bytes(640, 480), 640 * 480 * 4);
    }
}
