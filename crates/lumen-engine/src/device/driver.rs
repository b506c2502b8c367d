//! The driver seam.
//!
//! [`GraphicsDriver`] is a GL-ES-shaped command interface with typed enums in
//! place of raw integers. The engine never talks to a graphics API directly;
//! everything goes through an implementation of this trait.

use std::fmt::Debug;
use std::hash::Hash;

use crate::coords::Color4;

pub use lumen_shader::ShaderStage;

// ── State enums ───────────────────────────────────────────────────────────

/// Server-side toggles (`glEnable` / `glDisable`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    CullFace,
    StencilTest,
    Blend,
    PolygonOffsetFill,
    ScissorTest,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Face {
    Front,
    #[default]
    Back,
    FrontAndBack,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    Cw,
    #[default]
    Ccw,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Incr,
    IncrWrap,
    Decr,
    DecrWrap,
    Invert,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

// ── Textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    CubeMap,
    Texture3D,
    Texture2DArray,
}

/// Destination of a texel upload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Texture2D,
    /// Cube face `0..6` in +X, -X, +Y, -Y, +Z, -Z order.
    CubeFace(u8),
    Texture3D,
    Texture2DArray,
}

impl ImageTarget {
    pub fn texture_target(self) -> TextureTarget {
        match self {
            ImageTarget::Texture2D => TextureTarget::Texture2D,
            ImageTarget::CubeFace(_) => TextureTarget::CubeMap,
            ImageTarget::Texture3D => TextureTarget::Texture3D,
            ImageTarget::Texture2DArray => TextureTarget::Texture2DArray,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    Alpha,
    Luminance,
    LuminanceAlpha,
    Red,
    Rg,
    Rgb,
    #[default]
    Rgba,
    RgbaHalfFloat,
    RgbaFloat,
    Depth16,
    Depth24Stencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Bytes per texel of tightly packed upload data.
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Alpha | TextureFormat::Luminance | TextureFormat::Red => 1,
            TextureFormat::LuminanceAlpha | TextureFormat::Rg | TextureFormat::Depth16 => 2,
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba | TextureFormat::Depth24Stencil8 | TextureFormat::Depth32Float => 4,
            TextureFormat::RgbaHalfFloat => 8,
            TextureFormat::RgbaFloat => 16,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            TextureFormat::Alpha
            | TextureFormat::Luminance
            | TextureFormat::Red
            | TextureFormat::Depth16
            | TextureFormat::Depth32Float => 1,
            TextureFormat::LuminanceAlpha | TextureFormat::Rg | TextureFormat::Depth24Stencil8 => 2,
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba | TextureFormat::RgbaHalfFloat | TextureFormat::RgbaFloat => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16 | TextureFormat::Depth24Stencil8 | TextureFormat::Depth32Float
        )
    }

    pub fn has_stencil(self) -> bool {
        self == TextureFormat::Depth24Stencil8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Wrap {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// A single sampler parameter write.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TexParam {
    MinFilter(Filter),
    MagFilter(Filter),
    WrapS(Wrap),
    WrapT(Wrap),
    WrapR(Wrap),
    MaxAnisotropy(f32),
    /// Depth comparison for shadow samplers; `None` disables it.
    Compare(Option<CompareFunc>),
}

// ── Buffers & drawing ─────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum AttribType {
    #[default]
    Float,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
}

impl AttribType {
    pub fn size_bytes(self) -> usize {
        match self {
            AttribType::UnsignedByte => 1,
            AttribType::Short | AttribType::UnsignedShort => 2,
            AttribType::Float | AttribType::Int => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    U16,
    U32,
}

impl IndexType {
    pub fn size_bytes(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    Draw,
    Read,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color(u8),
    Depth,
    DepthStencil,
}

/// Uniform payload for `set_uniform`.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    FloatArray(Vec<f32>),
}

// ── Context queries ───────────────────────────────────────────────────────

/// Integer limits queried once per context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Limit {
    MaxTextureSize,
    MaxCubeMapTextureSize,
    MaxRenderbufferSize,
    MaxTextureImageUnits,
    MaxCombinedTextureImageUnits,
    MaxVertexTextureImageUnits,
    MaxVertexAttribs,
    MaxVaryingVectors,
    MaxFragmentUniformVectors,
    MaxVertexUniformVectors,
    MaxSamples,
    MaxDrawBuffers,
    Max3DTextureSize,
    MaxArrayTextureLayers,
    MaxTextureMaxAnisotropy,
}

/// Static description of the context behind a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// 1 for GLES2/WebGL1-class contexts, 2 for GLES3/WebGL2-class.
    pub version: u32,
    pub vendor: String,
    pub renderer: String,
    pub extensions: Vec<String>,
}

impl DriverInfo {
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────

/// Graphics-API command interface used by the engine.
///
/// Object handles are opaque associated types. Creation calls may fail (the
/// context may be lost or out of memory); everything else is fire-and-forget
/// like the underlying API, with queries for compile/link status.
pub trait GraphicsDriver {
    type Texture: Copy + Eq + Hash + Debug;
    type Buffer: Copy + Eq + Hash + Debug;
    type Shader: Copy + Eq + Debug;
    type Program: Copy + Eq + Hash + Debug;
    type UniformLocation: Clone + Debug;
    type Framebuffer: Copy + Eq + Debug;
    type Renderbuffer: Copy + Eq + Debug;
    type VertexArray: Copy + Eq + Debug;

    // context
    fn info(&self) -> DriverInfo;
    fn limit(&self, limit: Limit) -> i32;
    fn is_context_lost(&self) -> bool;
    /// Current drawing-buffer size in device pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);
    fn set_drawing_buffer_size(&mut self, width: u32, height: u32);
    /// Size of the host surface in layout pixels, with the device pixel ratio.
    fn client_size(&self) -> (u32, u32, f32);
    fn begin_frame(&mut self) {}
    fn end_frame(&mut self) {}

    // fixed-function state
    fn set_capability(&mut self, cap: Capability, enabled: bool);
    fn depth_func(&mut self, func: CompareFunc);
    fn depth_mask(&mut self, write: bool);
    fn cull_face(&mut self, face: Face);
    fn front_face(&mut self, front: FrontFace);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn stencil_mask(&mut self, mask: u32);
    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32);
    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp);
    fn blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation);
    fn blend_color(&mut self, color: Color4);
    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear(&mut self, color: Option<Color4>, depth: Option<f32>, stencil: Option<i32>);

    // textures
    fn create_texture(&mut self) -> Result<Self::Texture, String>;
    fn delete_texture(&mut self, texture: Self::Texture);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<Self::Texture>);
    /// Allocates storage for one image of the bound texture, optionally with data.
    #[allow(clippy::too_many_arguments)]
    fn tex_image(
        &mut self,
        target: ImageTarget,
        level: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
        depth: u32,
        data: Option<&[u8]>,
    );
    fn tex_parameter(&mut self, target: TextureTarget, param: TexParam);
    fn generate_mipmap(&mut self, target: TextureTarget);

    // buffers
    fn create_buffer(&mut self) -> Result<Self::Buffer, String>;
    fn delete_buffer(&mut self, buffer: Self::Buffer);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<Self::Buffer>);
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    /// Allocates `size` zeroed bytes.
    fn buffer_storage(&mut self, target: BufferTarget, size: usize, usage: BufferUsage);
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: AttribType,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn enable_vertex_attrib(&mut self, index: u32, enabled: bool);
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);
    fn create_vertex_array(&mut self) -> Result<Self::VertexArray, String>;
    fn bind_vertex_array(&mut self, vao: Option<Self::VertexArray>);
    fn delete_vertex_array(&mut self, vao: Self::VertexArray);

    // shaders & programs
    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, String>;
    fn compile_shader(&mut self, shader: Self::Shader, source: &str);
    fn shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&mut self, shader: Self::Shader);
    fn create_program(&mut self) -> Result<Self::Program, String>;
    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn link_program(&mut self, program: Self::Program);
    fn program_link_status(&self, program: Self::Program) -> bool;
    /// Non-blocking completion query (`COMPLETION_STATUS_KHR`).
    ///
    /// Drivers without parallel compilation report `true`.
    fn program_completion_status(&mut self, program: Self::Program) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&mut self, program: Self::Program);
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;
    fn use_program(&mut self, program: Option<Self::Program>);
    fn set_uniform(&mut self, location: &Self::UniformLocation, value: &UniformValue);

    // framebuffers
    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);
    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<Self::Framebuffer>);
    fn framebuffer_texture(
        &mut self,
        attachment: Attachment,
        target: ImageTarget,
        texture: Option<Self::Texture>,
        level: u32,
    );
    fn create_renderbuffer(&mut self) -> Result<Self::Renderbuffer, String>;
    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer);
    fn renderbuffer_storage(
        &mut self,
        renderbuffer: Self::Renderbuffer,
        format: TextureFormat,
        samples: u32,
        width: u32,
        height: u32,
    );
    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: Option<Self::Renderbuffer>);
    /// Copies the read framebuffer's color into the draw framebuffer.
    fn blit_framebuffer(&mut self, src: (u32, u32), dst: (u32, u32), linear: bool);

    // drawing
    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, index_type: IndexType, offset: usize, instances: u32);
    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32);
}
