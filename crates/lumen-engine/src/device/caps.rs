use super::driver::{DriverInfo, GraphicsDriver, Limit};

/// What the current context can do.
///
/// Probed once at engine creation and again after every context restore.
/// Read-only for everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    /// 1 for GLES2/WebGL1-class contexts, 2 for GLES3/WebGL2-class.
    pub version: u32,

    // limits
    pub max_texture_size: u32,
    pub max_cube_map_texture_size: u32,
    pub max_render_texture_size: u32,
    pub max_texture_image_units: u32,
    pub max_combined_texture_image_units: u32,
    pub max_vertex_texture_image_units: u32,
    pub max_vertex_attribs: u32,
    pub max_varying_vectors: u32,
    pub max_fragment_uniform_vectors: u32,
    pub max_vertex_uniform_vectors: u32,
    pub max_samples: u32,
    pub max_draw_buffers: u32,
    pub max_3d_texture_size: u32,
    pub max_array_texture_layers: u32,
    /// Zero when anisotropic filtering is unavailable.
    pub max_anisotropy: f32,

    // features
    pub uint_indices: bool,
    pub instanced_arrays: bool,
    pub vertex_array_object: bool,
    pub standard_derivatives: bool,
    pub texture_lod: bool,
    pub texture_float: bool,
    pub texture_float_linear: bool,
    pub texture_float_render: bool,
    pub texture_half_float: bool,
    pub texture_half_float_linear: bool,
    pub texture_half_float_render: bool,
    pub draw_buffers: bool,
    pub depth_texture: bool,
    pub npot_textures: bool,
    pub texture_3d: bool,
    pub texture_2d_array: bool,
    pub blit_framebuffer: bool,
    pub multisampled_render_targets: bool,
    pub parallel_shader_compile: bool,
    pub multiview: bool,

    pub vendor: String,
    pub renderer: String,
}

fn has(info: &DriverInfo, name: &str) -> bool {
    info.has_extension(name) || info.has_extension(&format!("GL_{}", name))
}

fn limit<D: GraphicsDriver>(driver: &D, l: Limit) -> u32 {
    driver.limit(l).max(0) as u32
}

impl Capabilities {
    pub fn probe<D: GraphicsDriver>(driver: &D) -> Self {
        let info = driver.info();
        let v2 = info.version >= 2;

        let anisotropic = has(&info, "EXT_texture_filter_anisotropic");
        let texture_float = v2 || has(&info, "OES_texture_float");
        let texture_half_float = v2 || has(&info, "OES_texture_half_float");
        let max_samples = if v2 { limit(driver, Limit::MaxSamples) } else { 1 };

        let caps = Self {
            version: info.version,

            max_texture_size: limit(driver, Limit::MaxTextureSize),
            max_cube_map_texture_size: limit(driver, Limit::MaxCubeMapTextureSize),
            max_render_texture_size: limit(driver, Limit::MaxRenderbufferSize),
            max_texture_image_units: limit(driver, Limit::MaxTextureImageUnits),
            max_combined_texture_image_units: limit(driver, Limit::MaxCombinedTextureImageUnits),
            max_vertex_texture_image_units: limit(driver, Limit::MaxVertexTextureImageUnits),
            max_vertex_attribs: limit(driver, Limit::MaxVertexAttribs),
            max_varying_vectors: limit(driver, Limit::MaxVaryingVectors),
            max_fragment_uniform_vectors: limit(driver, Limit::MaxFragmentUniformVectors),
            max_vertex_uniform_vectors: limit(driver, Limit::MaxVertexUniformVectors),
            max_samples,
            max_draw_buffers: if v2 || has(&info, "WEBGL_draw_buffers") {
                limit(driver, Limit::MaxDrawBuffers).max(1)
            } else {
                1
            },
            max_3d_texture_size: if v2 { limit(driver, Limit::Max3DTextureSize) } else { 0 },
            max_array_texture_layers: if v2 { limit(driver, Limit::MaxArrayTextureLayers) } else { 0 },
            max_anisotropy: if anisotropic {
                driver.limit(Limit::MaxTextureMaxAnisotropy).max(1) as f32
            } else {
                0.0
            },

            uint_indices: v2 || has(&info, "OES_element_index_uint"),
            instanced_arrays: v2 || has(&info, "ANGLE_instanced_arrays"),
            vertex_array_object: v2 || has(&info, "OES_vertex_array_object"),
            standard_derivatives: v2 || has(&info, "OES_standard_derivatives"),
            texture_lod: v2 || has(&info, "EXT_shader_texture_lod"),
            texture_float,
            texture_float_linear: texture_float && has(&info, "OES_texture_float_linear"),
            texture_float_render: texture_float
                && (if v2 {
                    has(&info, "EXT_color_buffer_float")
                } else {
                    has(&info, "WEBGL_color_buffer_float")
                }),
            texture_half_float,
            texture_half_float_linear: v2 || (texture_half_float && has(&info, "OES_texture_half_float_linear")),
            texture_half_float_render: texture_half_float
                && (has(&info, "EXT_color_buffer_half_float") || has(&info, "EXT_color_buffer_float")),
            draw_buffers: v2 || has(&info, "WEBGL_draw_buffers"),
            depth_texture: v2 || has(&info, "WEBGL_depth_texture"),
            npot_textures: v2,
            texture_3d: v2,
            texture_2d_array: v2,
            blit_framebuffer: v2,
            multisampled_render_targets: max_samples > 1,
            parallel_shader_compile: has(&info, "KHR_parallel_shader_compile"),
            multiview: v2 && has(&info, "OVR_multiview2"),

            vendor: info.vendor,
            renderer: info.renderer,
        };

        log::debug!(
            "capabilities: v{} max_texture={} units={} uint_indices={} npot={} parallel_compile={}",
            caps.version,
            caps.max_texture_size,
            caps.max_texture_image_units,
            caps.uint_indices,
            caps.npot_textures,
            caps.parallel_shader_compile
        );

        caps
    }

    /// Clamps a texture dimension to `max_texture_size`.
    pub fn clamp_texture_size(&self, size: u32) -> u32 {
        size.min(self.max_texture_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessConfig, HeadlessDriver};

    #[test]
    fn version_two_implies_core_features() {
        let driver = HeadlessDriver::new(HeadlessConfig::default());
        let caps = Capabilities::probe(&driver);
        assert_eq!(caps.version, 2);
        assert!(caps.uint_indices && caps.instanced_arrays && caps.vertex_array_object);
        assert!(caps.npot_textures && caps.blit_framebuffer && caps.texture_3d);
        assert!(caps.max_samples > 1 && caps.multisampled_render_targets);
    }

    #[test]
    fn version_one_depends_on_extensions() {
        let driver = HeadlessDriver::new(HeadlessConfig {
            version: 1,
            extensions: vec!["OES_element_index_uint".into(), "GL_OES_texture_float".into()],
            ..HeadlessConfig::default()
        });
        let caps = Capabilities::probe(&driver);
        assert!(caps.uint_indices);
        assert!(caps.texture_float);
        assert!(!caps.texture_float_linear);
        assert!(!caps.instanced_arrays);
        assert!(!caps.npot_textures);
        assert!(!caps.blit_framebuffer);
        assert_eq!(caps.max_samples, 1);
        assert_eq!(caps.max_anisotropy, 0.0);
    }

    #[test]
    fn anisotropy_reported_when_extension_present() {
        let driver = HeadlessDriver::new(HeadlessConfig {
            extensions: vec!["EXT_texture_filter_anisotropic".into()],
            ..HeadlessConfig::default()
        });
        assert_eq!(Capabilities::probe(&driver).max_anisotropy, 16.0);
    }
}
