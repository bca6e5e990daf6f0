//! Sampled textures

use ash::{vk, Device};

use crate::assets::ImageData;
use crate::render::vulkan::image::{mip_level_count, Image, ImageDesc};
use crate::render::vulkan::{Buffer, CommandPool, VulkanError, VulkanResult};

/// Texel format of uploaded textures, matching the RGBA8 decoder output
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, linear mip blending over `mip_levels`
    pub fn new(device: Device, mip_levels: u32) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(16.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        let sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Get sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Device-local texture ready for sampling in the fragment shader
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Upload `data` through a staging buffer
    ///
    /// With `generate_mips` the full chain is blitted on the GPU, provided the
    /// format supports linear blits; otherwise a single level is used.
    pub fn from_image_data(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        format_properties: vk::FormatProperties,
        data: &ImageData,
        generate_mips: bool,
        command_pool: &CommandPool,
        queue: vk::Queue,
    ) -> VulkanResult<Self> {
        let linear_blit = format_properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR);
        if generate_mips && !linear_blit {
            log::warn!("{:?} does not support linear blits, skipping mipmaps", TEXTURE_FORMAT);
        }
        let mip_levels = if generate_mips && linear_blit {
            mip_level_count(data.width, data.height)
        } else {
            1
        };

        let staging = Buffer::with_data(
            device.clone(),
            memory_properties,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &data.data,
        )?;

        let image = Image::new(
            device.clone(),
            memory_properties,
            ImageDesc {
                extent: vk::Extent2D {
                    width: data.width,
                    height: data.height,
                },
                format: TEXTURE_FORMAT,
                mip_levels,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        let commands = command_pool.begin_single_time(queue)?;
        image.transition_layout(
            &commands,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        commands.submit_and_wait()?;

        let commands = command_pool.begin_single_time(queue)?;
        image.copy_from_buffer(&commands, &staging);
        commands.submit_and_wait()?;

        let commands = command_pool.begin_single_time(queue)?;
        if mip_levels > 1 {
            image.generate_mipmaps(&commands)?;
        } else {
            image.transition_layout(
                &commands,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
        }
        commands.submit_and_wait()?;

        log::info!(
            "Texture uploaded: {}x{}, {} mip level(s)",
            data.width,
            data.height,
            mip_levels
        );

        let sampler = Sampler::new(device, mip_levels)?;

        Ok(Self { image, sampler })
    }

    /// Descriptor info for a combined image sampler binding
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}
