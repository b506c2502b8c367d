use std::fmt;
use std::rc::Rc;

/// Rewrites texture URLs before they reach the loader.
pub type UrlTransform = Rc<dyn Fn(&str) -> String>;

/// Engine construction options.
#[derive(Clone)]
pub struct EngineOptions {
    /// Use `KHR_parallel_shader_compile` when the context offers it.
    pub parallel_shader_compile: bool,
    /// `highp` float precision in shaders, `mediump` otherwise.
    pub use_high_precision: bool,
    /// Drawing-buffer pixels per client pixel divisor (2.0 renders at half size).
    pub hardware_scaling_level: f32,
    /// Replace textures that failed to load with a checker placeholder.
    pub use_fallback_texture: bool,
    /// Rescale every NPOT image, even when the context supports NPOT.
    pub force_pot_textures: bool,
    pub texture_url_transform: Option<UrlTransform>,
    /// Extra implicit define visible to every shader.
    pub platform_name: Option<String>,
    pub max_include_depth: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallel_shader_compile: true,
            use_high_precision: true,
            hardware_scaling_level: 1.0,
            use_fallback_texture: true,
            force_pot_textures: false,
            texture_url_transform: None,
            platform_name: None,
            max_include_depth: 16,
        }
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("parallel_shader_compile", &self.parallel_shader_compile)
            .field("use_high_precision", &self.use_high_precision)
            .field("hardware_scaling_level", &self.hardware_scaling_level)
            .field("use_fallback_texture", &self.use_fallback_texture)
            .field("force_pot_textures", &self.force_pot_textures)
            .field("texture_url_transform", &self.texture_url_transform.is_some())
            .field("platform_name", &self.platform_name)
            .field("max_include_depth", &self.max_include_depth)
            .finish()
    }
}
