//! Device images: owning wrapper, layout transitions, mip generation, depth buffer
//!
//! Images have to be walked through their layouts with explicit barriers
//! before use. The supported walks are
//! `UNDEFINED -> TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL` for textures
//! and `UNDEFINED -> DEPTH_STENCIL_ATTACHMENT_OPTIMAL` for depth buffers.

use ash::{vk, Device};

use crate::config::DepthFormat;
use crate::render::vulkan::buffer::allocate_memory;
use crate::render::vulkan::{Buffer, CommandPool, SingleTimeCommands, VulkanError, VulkanResult};

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// Access masks and pipeline stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Writes that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage the barrier waits on
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits on the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier recipe for `old -> new`
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<TransitionMasks> {
    use vk::ImageLayout as L;

    match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        }),
        _ => Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Parameters for a 2D device-local image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Size of the base level
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Usage bits
    pub usage: vk::ImageUsageFlags,
    /// Aspect covered by the view and by barriers
    pub aspect: vk::ImageAspectFlags,
}

/// Image, its memory and a view over every mip level, released together
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
}

impl Image {
    /// Create the image, bind device-local memory and create its view
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        desc: ImageDesc,
    ) -> VulkanResult<Self> {
        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match allocate_memory(
            &device,
            memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let mut this = Self {
            device,
            image,
            memory,
            view: vk::ImageView::null(),
            desc,
        };

        unsafe {
            this.device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(this.subresource_range(0, desc.mip_levels));

        this.view = unsafe {
            this.device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(this)
    }

    fn subresource_range(&self, base_mip_level: u32, level_count: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.desc.aspect,
            base_mip_level,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn barrier(
        &self,
        commands: &SingleTimeCommands<'_>,
        range: vk::ImageSubresourceRange,
        (old, new): (vk::ImageLayout, vk::ImageLayout),
        masks: TransitionMasks,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(range)
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        unsafe {
            commands.device().cmd_pipeline_barrier(
                commands.command_buffer(),
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
    }

    /// Record a transition of every mip level from `old` to `new`
    pub fn transition_layout(
        &self,
        commands: &SingleTimeCommands<'_>,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = transition_masks(old, new)?;
        log::debug!("Transitioning image {:?} from {:?} to {:?}", self.image, old, new);
        self.barrier(commands, self.subresource_range(0, self.desc.mip_levels), (old, new), masks);
        Ok(())
    }

    /// Record a copy of tightly packed texels from `buffer` into mip level 0
    pub fn copy_from_buffer(&self, commands: &SingleTimeCommands<'_>, buffer: &Buffer) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: self.desc.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: self.desc.extent.width,
                height: self.desc.extent.height,
                depth: 1,
            });

        unsafe {
            commands.device().cmd_copy_buffer_to_image(
                commands.command_buffer(),
                buffer.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
            );
        }
    }

    /// Record blits that fill levels `1..mip_levels` from level 0
    ///
    /// Every level must be in `TRANSFER_DST_OPTIMAL` with level 0 already
    /// written. On completion every level is `SHADER_READ_ONLY_OPTIMAL`.
    pub fn generate_mipmaps(&self, commands: &SingleTimeCommands<'_>) -> VulkanResult<()> {
        let device = commands.device();
        let command_buffer = commands.command_buffer();

        let mut mip_width = self.desc.extent.width as i32;
        let mut mip_height = self.desc.extent.height as i32;

        for level in 1..self.desc.mip_levels {
            let source = self.subresource_range(level - 1, 1);

            self.barrier(
                commands,
                source,
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                TransitionMasks {
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access: vk::AccessFlags::TRANSFER_READ,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::TRANSFER,
                },
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);

            let blit = vk::ImageBlit::builder()
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
                ])
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.desc.aspect,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: next_width, y: next_height, z: 1 },
                ])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.desc.aspect,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            unsafe {
                device.cmd_blit_image(
                    command_buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit.build()],
                    vk::Filter::LINEAR,
                );
            }

            self.barrier(
                commands,
                source,
                (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                TransitionMasks {
                    src_access: vk::AccessFlags::TRANSFER_READ,
                    dst_access: vk::AccessFlags::SHADER_READ,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                },
            );

            mip_width = next_width;
            mip_height = next_height;
        }

        // The last level was only ever a blit destination
        let last = self.desc.mip_levels.saturating_sub(1);
        let layouts = (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let masks = transition_masks(layouts.0, layouts.1)?;
        self.barrier(commands, self.subresource_range(last, 1), layouts, masks);
        Ok(())
    }

    /// View over all mip levels
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Depth attachment sized to the swapchain
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Create the depth image and move it into `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`
    ///
    /// `format_properties` are the device's properties for `format`; optimal
    /// tiling must support depth/stencil attachments.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        format_properties: vk::FormatProperties,
        format: DepthFormat,
        extent: vk::Extent2D,
        command_pool: &CommandPool,
        queue: vk::Queue,
    ) -> VulkanResult<Self> {
        if !format_properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            return Err(VulkanError::InitializationFailed(format!(
                "Depth format {:?} cannot be used as an attachment with optimal tiling",
                format.to_vk()
            )));
        }

        let image = Image::new(
            device,
            memory_properties,
            ImageDesc {
                extent,
                format: format.to_vk(),
                mip_levels: 1,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: format.aspect_mask(),
            },
        )?;

        let commands = command_pool.begin_single_time(queue)?;
        image.transition_layout(
            &commands,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;
        commands.submit_and_wait()?;

        log::debug!("Depth buffer {:?} {}x{}", format, extent.width, extent.height);

        Ok(Self { image })
    }

    /// View used as the framebuffer's depth attachment
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(512, 256), 10);
        assert_eq!(mip_level_count(300, 1000), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_texture_upload_transitions() {
        let to_dst = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_read = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_depth_transition() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert!(masks
            .dst_access
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(masks
            .dst_stage
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn test_out_of_order_transition_rejected() {
        let result = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(VulkanError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            })
        ));
        assert!(transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_err());
    }
}
