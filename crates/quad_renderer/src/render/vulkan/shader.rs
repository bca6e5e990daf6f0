//! Shader modules and the graphics pipeline

use std::ffi::CStr;
use std::path::Path;

use ash::{vk, Device};

use crate::config::ShaderConfig;
use crate::render::scene::Vertex;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Reject code that cannot be a SPIR-V module before handing it to the driver
pub fn validate_spirv(words: &[u32]) -> Result<(), String> {
    match words.first() {
        None => Err("file is empty".to_string()),
        Some(&SPIRV_MAGIC) if words.len() >= 5 => Ok(()),
        Some(&SPIRV_MAGIC) => Err("truncated SPIR-V header".to_string()),
        Some(other) => Err(format!("bad magic number {other:#010x}")),
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn from_words(device: Device, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let load_error = |reason: String| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason,
        };

        let mut file = std::fs::File::open(path).map_err(|e| load_error(e.to_string()))?;
        let words = ash::util::read_spv(&mut file).map_err(|e| load_error(e.to_string()))?;
        validate_spirv(&words).map_err(load_error)?;

        log::debug!("Loaded shader {} ({} words)", path.display(), words.len());
        Self::from_words(device, &words)
    }

    /// Stage description with a `main` entry point
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Vertex and fragment shader pair
pub struct ShaderSet {
    /// Vertex stage
    pub vertex: ShaderModule,
    /// Fragment stage
    pub fragment: ShaderModule,
}

impl ShaderSet {
    /// Load both stages, failing before any pipeline is built if either is unusable
    pub fn load(device: &Device, config: &ShaderConfig) -> VulkanResult<Self> {
        let vertex = ShaderModule::from_file(device.clone(), config.vertex_path())?;
        let fragment = ShaderModule::from_file(device.clone(), config.fragment_path())?;
        Ok(Self { vertex, fragment })
    }
}

/// Fixed-function state that differs between program variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Depth test (LESS) and depth writes
    pub depth_test: bool,
    /// Faces to discard
    pub cull_mode: vk::CullModeFlags,
    /// Winding considered front facing
    pub front_face: vk::FrontFace,
}

impl PipelineSettings {
    /// Settings for the textured quads
    pub fn quads(depth_test: bool) -> Self {
        Self {
            depth_test,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
        }
    }

    /// Depth/stencil state for these settings
    pub fn depth_stencil_state(&self) -> vk::PipelineDepthStencilStateCreateInfo {
        vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .build()
    }
}

/// Graphics pipeline and its layout with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build the quad pipeline with a viewport and scissor fixed to `extent`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        shaders: &ShaderSet,
        set_layout: vk::DescriptorSetLayout,
        extent: vk::Extent2D,
        settings: PipelineSettings,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            shaders.vertex.stage_info(vk::ShaderStageFlags::VERTEX),
            shaders.fragment.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(settings.cull_mode)
            .front_face(settings.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = settings.depth_stencil_state();

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);
        if settings.depth_test {
            pipeline_info = pipeline_info.depth_stencil_state(&depth_stencil);
        }

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        log::debug!(
            "Graphics pipeline created for {}x{} (depth test: {})",
            extent.width,
            extent.height,
            settings.depth_test
        );

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_spirv() {
        assert!(validate_spirv(&[]).is_err());
        assert!(validate_spirv(&[SPIRV_MAGIC, 0x0001_0000]).is_err());
        assert!(validate_spirv(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]).is_ok());

        let err = validate_spirv(&[0xdead_beef, 0, 0, 0, 0]).unwrap_err();
        assert!(err.contains("0xdeadbeef"), "{err}");
    }

    #[test]
    fn test_quad_pipeline_settings() {
        let flat = PipelineSettings::quads(false);
        assert_eq!(flat.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(flat.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(flat.depth_stencil_state().depth_test_enable, vk::FALSE);

        let depth = PipelineSettings::quads(true).depth_stencil_state();
        assert_eq!(depth.depth_test_enable, vk::TRUE);
        assert_eq!(depth.depth_write_enable, vk::TRUE);
        assert_eq!(depth.depth_compare_op, vk::CompareOp::LESS);
    }
}
