//! Application configuration
//!
//! Every tunable that the renderer reads lives here. The value is built once
//! at startup and passed down by reference; nothing mutates it afterwards.

use std::path::{Path, PathBuf};

use ash::vk;
use serde::{Deserialize, Serialize};

use super::Config;

/// Which incremental program is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    /// One textured quad, single mip level
    TexturedQuad,
    /// One textured quad with a GPU generated mip chain
    MipmappedQuad,
    /// Two overlapping quads with mipmaps and depth testing
    DepthQuads,
}

impl Variant {
    /// Feature switches this variant turns on
    pub fn features(self) -> RenderFeatures {
        match self {
            Self::TexturedQuad => RenderFeatures { mipmaps: false, depth: false },
            Self::MipmappedQuad => RenderFeatures { mipmaps: true, depth: false },
            Self::DepthQuads => RenderFeatures { mipmaps: true, depth: true },
        }
    }

    /// Window title used by default for this variant
    pub fn title(self) -> &'static str {
        match self {
            Self::TexturedQuad => "Vulkan Texturing",
            Self::MipmappedQuad => "Vulkan Mipmapping",
            Self::DepthQuads => "Vulkan Depth Buffering",
        }
    }
}

/// Optional rendering features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFeatures {
    /// Generate a full mip chain for the texture
    pub mipmaps: bool,
    /// Attach a depth buffer and enable depth testing
    pub depth: bool,
}

impl Default for RenderFeatures {
    fn default() -> Self {
        Variant::DepthQuads.features()
    }
}

/// Presentation mode preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentMode {
    /// No vsync, may tear
    Immediate,
    /// Triple buffered vsync
    Mailbox,
    /// Strict vsync, always supported
    Fifo,
    /// Vsync that tears when a frame is late
    FifoRelaxed,
}

impl PresentMode {
    /// Vulkan enum value
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// Swapchain color format preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    /// `B8G8R8A8_SRGB`
    Bgra8Srgb,
    /// `R8G8B8A8_SRGB`
    Rgba8Srgb,
    /// `B8G8R8A8_UNORM`
    Bgra8Unorm,
    /// `R8G8B8A8_UNORM`
    Rgba8Unorm,
}

impl ColorFormat {
    /// Vulkan enum value
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }

    /// Preferred surface format, always paired with the sRGB non-linear color space
    pub fn surface_format(self) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: self.to_vk(),
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }
}

/// Depth attachment format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthFormat {
    /// `D16_UNORM`
    D16Unorm,
    /// `D24_UNORM_S8_UINT`
    D24UnormS8Uint,
    /// `D32_SFLOAT`
    D32Sfloat,
    /// `D32_SFLOAT_S8_UINT`
    D32SfloatS8Uint,
}

impl DepthFormat {
    /// Vulkan enum value
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::D16Unorm => vk::Format::D16_UNORM,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Self::D32Sfloat => vk::Format::D32_SFLOAT,
            Self::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    /// Whether the format carries a stencil component
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32SfloatS8Uint)
    }

    /// Aspect flags for views and barriers over this format
    pub fn aspect_mask(self) -> vk::ImageAspectFlags {
        if self.has_stencil() {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    }
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Initial client width in pixels
    pub width: u32,
    /// Initial client height in pixels
    pub height: u32,
    /// Title bar text
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: Variant::DepthQuads.title().to_string(),
        }
    }
}

impl WindowConfig {
    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Precompiled SPIR-V shader locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Vertex shader file name
    pub vertex: String,
    /// Fragment shader file name
    pub fragment: String,
    /// Directories probed in order before falling back to the working directory
    pub search_dirs: Vec<String>,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: "tri.vert.spv".to_string(),
            fragment: "tri.frag.spv".to_string(),
            search_dirs: vec![
                "target/shaders".to_string(),
                "shaders".to_string(),
                "../target/shaders".to_string(),
            ],
        }
    }
}

impl ShaderConfig {
    /// Resolve the vertex shader path
    pub fn vertex_path(&self) -> PathBuf {
        self.resolve(&self.vertex)
    }

    /// Resolve the fragment shader path
    pub fn fragment_path(&self) -> PathBuf {
        self.resolve(&self.fragment)
    }

    fn resolve(&self, file_name: &str) -> PathBuf {
        self.search_dirs
            .iter()
            .map(|dir| Path::new(dir).join(file_name))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(file_name))
    }
}

/// Top level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Engine name reported to the driver
    pub engine_name: String,
    /// Window parameters
    pub window: WindowConfig,
    /// Preferred presentation mode, FIFO is used when unavailable
    pub present_mode: PresentMode,
    /// Preferred swapchain format
    pub surface_format: ColorFormat,
    /// Depth buffer format, used only when depth is enabled
    pub depth_format: DepthFormat,
    /// Request `VK_LAYER_KHRONOS_validation` and a debug messenger
    pub validation: bool,
    /// Physical device index, skips the interactive prompt when set
    pub gpu_index: Option<usize>,
    /// Pause after each presented frame, in milliseconds
    pub frame_delay_ms: u64,
    /// Texture image file
    pub texture_path: String,
    /// Shader binaries
    pub shaders: ShaderConfig,
    /// Optional rendering features
    pub features: RenderFeatures,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "VulkanTest".to_string(),
            engine_name: "VulkanTestEngine".to_string(),
            window: WindowConfig::default(),
            present_mode: PresentMode::FifoRelaxed,
            surface_format: ColorFormat::Bgra8Srgb,
            depth_format: DepthFormat::D24UnormS8Uint,
            validation: true,
            gpu_index: None,
            frame_delay_ms: 100,
            texture_path: "vulkan.tga".to_string(),
            shaders: ShaderConfig::default(),
            features: RenderFeatures::default(),
        }
    }
}

impl Config for AppConfig {}

impl AppConfig {
    /// Defaults for one of the three programs
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            window: WindowConfig {
                title: variant.title().to_string(),
                ..WindowConfig::default()
            },
            features: variant.features(),
            ..Self::default()
        }
    }

    /// Load `path` if it exists and force the variant's feature set onto it
    pub fn load_for_variant(path: &str, variant: Variant) -> Result<Self, super::ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.features = variant.features();
        if config.window.title == WindowConfig::default().title {
            config.window.title = variant.title().to_string();
        }
        Ok(config)
    }

    /// Delay inserted after each frame
    pub fn frame_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_constants() {
        let config = AppConfig::default();
        assert_eq!(config.app_name, "VulkanTest");
        assert_eq!(config.engine_name, "VulkanTestEngine");
        assert_eq!((config.window.width, config.window.height), (1280, 720));
        assert_eq!(config.present_mode.to_vk(), vk::PresentModeKHR::FIFO_RELAXED);
        assert_eq!(config.surface_format.to_vk(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.depth_format.to_vk(), vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(config.frame_delay_ms, 100);
    }

    #[test]
    fn test_variant_features() {
        assert_eq!(
            Variant::TexturedQuad.features(),
            RenderFeatures { mipmaps: false, depth: false }
        );
        assert_eq!(
            Variant::MipmappedQuad.features(),
            RenderFeatures { mipmaps: true, depth: false }
        );
        assert_eq!(
            Variant::DepthQuads.features(),
            RenderFeatures { mipmaps: true, depth: true }
        );
        assert_eq!(AppConfig::for_variant(Variant::TexturedQuad).window.title, "Vulkan Texturing");
    }

    #[test]
    fn test_depth_format_aspects() {
        assert!(DepthFormat::D24UnormS8Uint.has_stencil());
        assert!(!DepthFormat::D32Sfloat.has_stencil());
        assert_eq!(
            DepthFormat::D24UnormS8Uint.aspect_mask(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(DepthFormat::D16Unorm.aspect_mask(), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = "frame_delay_ms = 16\ngpu_index = 1\n\n[window]\nwidth = 800\nheight = 600\ntitle = \"small\"\n";
        let config = AppConfig::parse("quads.toml", text).unwrap();
        assert_eq!(config.frame_delay_ms, 16);
        assert_eq!(config.gpu_index, Some(1));
        assert_eq!(config.window.width, 800);
        assert_eq!(config.app_name, "VulkanTest");
        assert_eq!(config.present_mode, PresentMode::FifoRelaxed);
    }

    #[test]
    fn test_ron_round_trip() {
        let original = AppConfig::for_variant(Variant::MipmappedQuad);
        let text = ron::ser::to_string(&original).unwrap();
        let parsed = AppConfig::parse("quads.ron", &text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = AppConfig::parse("quads.json", "{}");
        assert!(matches!(result, Err(super::super::ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = AppConfig::load_or_default("no/such/dir/quads.toml").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_for_variant_without_file() {
        for variant in [Variant::TexturedQuad, Variant::MipmappedQuad, Variant::DepthQuads] {
            let config = AppConfig::load_for_variant("no/such/dir/quads.toml", variant).unwrap();
            assert_eq!(config.window.title, variant.title());
            assert_eq!(config.features, variant.features());
            assert_eq!(config, AppConfig::for_variant(variant));
        }
    }

    #[test]
    fn test_load_for_variant_forces_features_keeps_custom_title() {
        let path = std::env::temp_dir().join(format!("quads_variant_{}.toml", std::process::id()));
        let text = "[window]\nwidth = 640\nheight = 480\ntitle = \"custom\"\n\n[features]\nmipmaps = false\ndepth = false\n";
        std::fs::write(&path, text).unwrap();

        let loaded = AppConfig::load_for_variant(path.to_str().unwrap(), Variant::DepthQuads);
        std::fs::remove_file(&path).unwrap();
        let config = loaded.unwrap();

        assert_eq!(config.window.title, "custom");
        assert_eq!(config.window.width, 640);
        assert_eq!(config.features, RenderFeatures { mipmaps: true, depth: true });
    }

    #[test]
    fn test_shader_paths_fall_back_to_file_name() {
        let shaders = ShaderConfig {
            search_dirs: vec!["definitely/not/a/dir".to_string()],
            ..ShaderConfig::default()
        };
        assert_eq!(shaders.vertex_path(), PathBuf::from("tri.vert.spv"));
        assert_eq!(shaders.fragment_path(), PathBuf::from("tri.frag.spv"));
    }
}
