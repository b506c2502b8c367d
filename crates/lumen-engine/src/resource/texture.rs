use crate::device::{CompareFunc, GraphicsDriver, TextureFormat, TextureTarget, Wrap};

use super::sampling::SamplingMode;
use super::slots::slot_handle;

slot_handle!(
    /// Engine-side texture handle. Identity is handle equality.
    TextureHandle
);

// ── Creation parameters ───────────────────────────────────────────────────

/// Per-texture creation options shared by the image and raw constructors.
///
/// `invert_y` flips rows on upload; it is off by default.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureOptions {
    pub generate_mipmaps: bool,
    pub invert_y: bool,
    pub sampling_mode: SamplingMode,
    pub format: TextureFormat,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            invert_y: false,
            sampling_mode: SamplingMode::Trilinear,
            format: TextureFormat::Rgba,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetOptions {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub generate_mipmaps: bool,
    pub sampling_mode: SamplingMode,
    /// MSAA sample count; 1 disables multisampling.
    pub samples: u32,
    /// Also create and attach a depth-stencil texture.
    pub depth_stencil: bool,
    pub is_cube: bool,
}

impl Default for RenderTargetOptions {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            format: TextureFormat::Rgba,
            generate_mipmaps: false,
            sampling_mode: SamplingMode::Trilinear,
            samples: 1,
            depth_stencil: true,
            is_cube: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilOptions {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Enables hardware depth comparison (shadow samplers).
    pub comparison: Option<CompareFunc>,
    pub is_cube: bool,
}

impl Default for DepthStencilOptions {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            format: TextureFormat::Depth24Stencil8,
            comparison: None,
            is_cube: false,
        }
    }
}

/// Everything needed to recreate a texture after a context loss.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    Url {
        url: String,
        /// Set when a URL transform rewrote the requested URL.
        original_url: Option<String>,
    },
    Encoded {
        bytes: Vec<u8>,
        mime: Option<String>,
    },
    Raw {
        data: Option<Vec<u8>>,
    },
    RawCube {
        faces: Option<Vec<Vec<u8>>>,
    },
    Raw3D {
        data: Option<Vec<u8>>,
    },
    Raw2DArray {
        data: Option<Vec<u8>>,
    },
    RenderTarget(RenderTargetOptions),
    DepthStencil(DepthStencilOptions),
    /// Checker placeholder uploaded in place of a failed load.
    Fallback,
}

impl TextureSource {
    pub fn kind(&self) -> &'static str {
        match self {
            TextureSource::Url { .. } => "url",
            TextureSource::Encoded { .. } => "encoded",
            TextureSource::Raw { .. } => "raw",
            TextureSource::RawCube { .. } => "raw-cube",
            TextureSource::Raw3D { .. } => "raw-3d",
            TextureSource::Raw2DArray { .. } => "raw-2d-array",
            TextureSource::RenderTarget(_) => "render-target",
            TextureSource::DepthStencil(_) => "depth-stencil",
            TextureSource::Fallback => "fallback",
        }
    }
}

// ── Entry ─────────────────────────────────────────────────────────────────

/// Multisampled storage resolved into the texture on unbind.
pub(crate) struct MsaaTargets<D: GraphicsDriver> {
    pub framebuffer: D::Framebuffer,
    pub color: D::Renderbuffer,
    pub depth: Option<D::Renderbuffer>,
}

/// Render-target attachments owned by a texture.
pub(crate) struct Framebuffers<D: GraphicsDriver> {
    pub framebuffer: D::Framebuffer,
    /// Depth storage when the context has no depth textures.
    pub depth_renderbuffer: Option<D::Renderbuffer>,
    pub msaa: Option<MsaaTargets<D>>,
}

impl<D: GraphicsDriver> Framebuffers<D> {
    /// Framebuffer draws go to: the multisampled one when present.
    pub fn draw_target(&self) -> D::Framebuffer {
        self.msaa.as_ref().map_or(self.framebuffer, |m| m.framebuffer)
    }
}

pub(crate) struct TextureEntry<D: GraphicsDriver> {
    pub texture: Option<D::Texture>,
    pub source: TextureSource,
    pub label: String,
    pub target: TextureTarget,
    pub format: TextureFormat,

    /// Storage size (after any power-of-two rescale).
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Requested logical size.
    pub base_width: u32,
    pub base_height: u32,
    pub base_depth: u32,

    pub generate_mipmaps: bool,
    pub invert_y: bool,

    pub sampling_mode: SamplingMode,
    pub wrap: [Wrap; 3],
    pub anisotropy: u32,
    pub comparison: Option<CompareFunc>,
    /// Values last written to the driver; `None` forces a write.
    pub applied_sampling: Option<SamplingMode>,
    pub applied_wrap: [Option<Wrap>; 3],
    pub applied_anisotropy: Option<u32>,

    pub is_ready: bool,
    pub load_error: Option<String>,
    pub references: u32,

    pub lod_textures: Vec<TextureHandle>,
    pub irradiance: Option<TextureHandle>,
    pub depth_stencil: Option<TextureHandle>,
    pub framebuffers: Option<Framebuffers<D>>,
    pub samples: u32,
}

impl<D: GraphicsDriver> TextureEntry<D> {
    pub fn new(source: TextureSource, label: impl Into<String>, target: TextureTarget, format: TextureFormat) -> Self {
        Self {
            texture: None,
            source,
            label: label.into(),
            target,
            format,
            width: 0,
            height: 0,
            depth: 1,
            base_width: 0,
            base_height: 0,
            base_depth: 1,
            generate_mipmaps: false,
            invert_y: false,
            sampling_mode: SamplingMode::Trilinear,
            wrap: [Wrap::Repeat; 3],
            anisotropy: 4,
            comparison: None,
            applied_sampling: None,
            applied_wrap: [None; 3],
            applied_anisotropy: None,
            is_ready: false,
            load_error: None,
            references: 1,
            lod_textures: Vec::new(),
            irradiance: None,
            depth_stencil: None,
            framebuffers: None,
            samples: 1,
        }
    }

    /// Fresh entry with the same recipe and settings, without driver objects.
    /// Used to replay the recipe after a context restore.
    pub fn rebuild_template(&self) -> Self {
        let mut entry = Self::new(self.source.clone(), self.label.clone(), self.target, self.format);
        entry.set_sizes((self.width, self.height, self.depth), (self.base_width, self.base_height, self.base_depth));
        entry.generate_mipmaps = self.generate_mipmaps;
        entry.invert_y = self.invert_y;
        entry.sampling_mode = self.sampling_mode;
        entry.wrap = self.wrap;
        entry.anisotropy = self.anisotropy;
        entry.comparison = self.comparison;
        entry.depth_stencil = self.depth_stencil;
        entry.samples = self.samples;
        entry
    }

    pub fn set_sizes(&mut self, storage: (u32, u32, u32), base: (u32, u32, u32)) {
        (self.width, self.height, self.depth) = storage;
        (self.base_width, self.base_height, self.base_depth) = base;
    }

    /// Forgets everything written to the driver for this texture.
    pub fn invalidate_applied(&mut self) {
        self.applied_sampling = None;
        self.applied_wrap = [None; 3];
        self.applied_anisotropy = None;
    }

    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            label: self.label.clone(),
            kind: self.source.kind(),
            target: self.target,
            format: self.format,
            width: self.width,
            height: self.height,
            depth: self.depth,
            base_width: self.base_width,
            base_height: self.base_height,
            base_depth: self.base_depth,
            sampling_mode: self.sampling_mode,
            wrap: self.wrap,
            anisotropy: self.anisotropy,
            generate_mipmaps: self.generate_mipmaps,
            is_ready: self.is_ready,
            load_error: self.load_error.clone(),
            references: self.references,
            samples: self.samples,
            is_render_target: self.framebuffers.is_some(),
        }
    }
}

/// Read-only snapshot of a texture entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub label: String,
    pub kind: &'static str,
    pub target: TextureTarget,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub base_depth: u32,
    pub sampling_mode: SamplingMode,
    pub wrap: [Wrap; 3],
    pub anisotropy: u32,
    pub generate_mipmaps: bool,
    pub is_ready: bool,
    pub load_error: Option<String>,
    pub references: u32,
    pub samples: u32,
    pub is_render_target: bool,
}

/// 8x8 magenta/black checker used when a load fails and fallbacks are enabled.
pub fn checker_pixels(size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / 4) + (y / 4)) % 2 == 0;
            out.extend_from_slice(if on { &[255, 0, 255, 255] } else { &[0, 0, 0, 255] });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_has_two_colors() {
        let px = checker_pixels(8);
        assert_eq!(px.len(), 8 * 8 * 4);
        assert_eq!(&px[0..4], &[255, 0, 255, 255]);
        assert_eq!(&px[16..20], &[0, 0, 0, 255]);
    }

    #[test]
    fn source_kinds() {
        assert_eq!(TextureSource::Raw { data: None }.kind(), "raw");
        assert_eq!(TextureSource::RenderTarget(RenderTargetOptions::default()).kind(), "render-target");
    }
}
