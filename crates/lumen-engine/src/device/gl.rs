//! OpenGL / GLES / WebGL2 backend over `glow`.
//!
//! Every `glow` call is `unsafe`: the context handed to [`GlDriver::new`]
//! must stay current on the calling thread for the driver's lifetime.

use std::cell::Cell;

use glow::HasContext;

use crate::coords::Color4;

use super::driver::*;

const TEXTURE_MAX_ANISOTROPY_EXT: u32 = 0x84FE;
const MAX_TEXTURE_MAX_ANISOTROPY_EXT: u32 = 0x84FF;
const CONTEXT_LOST: u32 = 0x0507;
const HALF_FLOAT_OES: u32 = 0x8D61;

type Gl = glow::Context;

/// Context-loss flag. GL reports `CONTEXT_LOST` from one `get_error` call
/// only, so the flag stays set until the host reports the restore.
#[derive(Debug, Default)]
struct LossLatch {
    lost: Cell<bool>,
}

impl LossLatch {
    /// Folds one `get_error` result into the flag.
    fn observe(&self, error: u32) -> bool {
        if error == CONTEXT_LOST {
            self.lost.set(true);
        }
        self.lost.get()
    }

    fn is_set(&self) -> bool {
        self.lost.get()
    }

    fn set(&self) {
        self.lost.set(true);
    }

    fn clear(&self) {
        self.lost.set(false);
    }
}

/// [`GraphicsDriver`] over a `glow` context owned by the host.
///
/// The host owns the surface: `set_drawing_buffer_size` records the size the
/// engine wants and the host resizes its swap chain from
/// [`drawing_buffer_size`](GraphicsDriver::drawing_buffer_size).
pub struct GlDriver {
    gl: Gl,
    version: u32,
    drawing_buffer: (u32, u32),
    client: (u32, u32, f32),
    loss: LossLatch,
}

impl GlDriver {
    pub fn new(gl: Gl, client_width: u32, client_height: u32, device_pixel_ratio: f32) -> Self {
        let v = gl.version();
        let version = if v.major >= 3 || v.vendor_info.contains("WebGL 2") { 2 } else { 1 };
        log::info!("gl driver: {}.{} {} (engine version {})", v.major, v.minor, v.vendor_info, version);
        Self {
            gl,
            version,
            drawing_buffer: (client_width, client_height),
            client: (client_width, client_height, device_pixel_ratio),
            loss: LossLatch::default(),
        }
    }

    /// Called by the host when its surface changes size.
    pub fn set_client_size(&mut self, width: u32, height: u32, device_pixel_ratio: f32) {
        self.client = (width, height, device_pixel_ratio);
    }

    /// Host saw the context go away (e.g. `webglcontextlost`).
    pub fn mark_context_lost(&self) {
        self.loss.set();
    }

    /// Host has a working context again (e.g. `webglcontextrestored`). The
    /// engine rebuilds its resources on the next frame.
    pub fn mark_context_restored(&self) {
        self.loss.clear();
    }

    pub fn context(&self) -> &Gl {
        &self.gl
    }

    pub fn into_context(self) -> Gl {
        self.gl
    }

    fn v2(&self) -> bool {
        self.version >= 2
    }

    fn draw_framebuffer_target(&self) -> u32 {
        if self.v2() { glow::DRAW_FRAMEBUFFER } else { glow::FRAMEBUFFER }
    }

    /// `(internal format, format, type)` for uploads.
    fn texel_format(&self, format: TextureFormat) -> (i32, u32, u32) {
        let v2 = self.v2();
        let (internal, external, ty) = match format {
            TextureFormat::Alpha => (glow::ALPHA, glow::ALPHA, glow::UNSIGNED_BYTE),
            TextureFormat::Luminance => (glow::LUMINANCE, glow::LUMINANCE, glow::UNSIGNED_BYTE),
            TextureFormat::LuminanceAlpha => (glow::LUMINANCE_ALPHA, glow::LUMINANCE_ALPHA, glow::UNSIGNED_BYTE),
            TextureFormat::Red => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
            TextureFormat::Rg => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
            TextureFormat::Rgb => (if v2 { glow::RGB8 } else { glow::RGB }, glow::RGB, glow::UNSIGNED_BYTE),
            TextureFormat::Rgba => (if v2 { glow::RGBA8 } else { glow::RGBA }, glow::RGBA, glow::UNSIGNED_BYTE),
            TextureFormat::RgbaHalfFloat => {
                if v2 {
                    (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT)
                } else {
                    (glow::RGBA, glow::RGBA, HALF_FLOAT_OES)
                }
            }
            TextureFormat::RgbaFloat => (if v2 { glow::RGBA32F } else { glow::RGBA }, glow::RGBA, glow::FLOAT),
            TextureFormat::Depth16 => (glow::DEPTH_COMPONENT16, glow::DEPTH_COMPONENT, glow::UNSIGNED_SHORT),
            TextureFormat::Depth24Stencil8 => (glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL, glow::UNSIGNED_INT_24_8),
            TextureFormat::Depth32Float => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        };
        (internal as i32, external, ty)
    }
}

// ── Enum mapping ──────────────────────────────────────────────────────────

fn capability(cap: Capability) -> u32 {
    match cap {
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::CullFace => glow::CULL_FACE,
        Capability::StencilTest => glow::STENCIL_TEST,
        Capability::Blend => glow::BLEND,
        Capability::PolygonOffsetFill => glow::POLYGON_OFFSET_FILL,
        Capability::ScissorTest => glow::SCISSOR_TEST,
    }
}

fn compare(func: CompareFunc) -> u32 {
    match func {
        CompareFunc::Never => glow::NEVER,
        CompareFunc::Less => glow::LESS,
        CompareFunc::Equal => glow::EQUAL,
        CompareFunc::LessEqual => glow::LEQUAL,
        CompareFunc::Greater => glow::GREATER,
        CompareFunc::NotEqual => glow::NOTEQUAL,
        CompareFunc::GreaterEqual => glow::GEQUAL,
        CompareFunc::Always => glow::ALWAYS,
    }
}

fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => glow::KEEP,
        StencilOp::Zero => glow::ZERO,
        StencilOp::Replace => glow::REPLACE,
        StencilOp::Incr => glow::INCR,
        StencilOp::IncrWrap => glow::INCR_WRAP,
        StencilOp::Decr => glow::DECR,
        StencilOp::DecrWrap => glow::DECR_WRAP,
        StencilOp::Invert => glow::INVERT,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => glow::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => glow::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => glow::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => glow::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => glow::SRC_ALPHA_SATURATE,
    }
}

fn blend_equation(equation: BlendEquation) -> u32 {
    match equation {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendEquation::Min => glow::MIN,
        BlendEquation::Max => glow::MAX,
    }
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
        TextureTarget::Texture3D => glow::TEXTURE_3D,
        TextureTarget::Texture2DArray => glow::TEXTURE_2D_ARRAY,
    }
}

fn image_target(target: ImageTarget) -> u32 {
    match target {
        ImageTarget::Texture2D => glow::TEXTURE_2D,
        ImageTarget::CubeFace(face) => glow::TEXTURE_CUBE_MAP_POSITIVE_X + face.min(5) as u32,
        ImageTarget::Texture3D => glow::TEXTURE_3D,
        ImageTarget::Texture2DArray => glow::TEXTURE_2D_ARRAY,
    }
}

fn filter(filter: Filter) -> i32 {
    (match filter {
        Filter::Nearest => glow::NEAREST,
        Filter::Linear => glow::LINEAR,
        Filter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        Filter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        Filter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        Filter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn wrap(wrap: Wrap) -> i32 {
    (match wrap {
        Wrap::Repeat => glow::REPEAT,
        Wrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        Wrap::MirroredRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
    }
}

fn attrib_type(ty: AttribType) -> u32 {
    match ty {
        AttribType::Float => glow::FLOAT,
        AttribType::UnsignedByte => glow::UNSIGNED_BYTE,
        AttribType::Short => glow::SHORT,
        AttribType::UnsignedShort => glow::UNSIGNED_SHORT,
        AttribType::Int => glow::INT,
    }
}

fn primitive(mode: PrimitiveMode) -> u32 {
    match mode {
        PrimitiveMode::Points => glow::POINTS,
        PrimitiveMode::Lines => glow::LINES,
        PrimitiveMode::LineLoop => glow::LINE_LOOP,
        PrimitiveMode::LineStrip => glow::LINE_STRIP,
        PrimitiveMode::Triangles => glow::TRIANGLES,
        PrimitiveMode::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveMode::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn index_type(ty: IndexType) -> u32 {
    match ty {
        IndexType::U16 => glow::UNSIGNED_SHORT,
        IndexType::U32 => glow::UNSIGNED_INT,
    }
}

fn attachment(attachment: Attachment) -> u32 {
    match attachment {
        Attachment::Color(i) => glow::COLOR_ATTACHMENT0 + i as u32,
        Attachment::Depth => glow::DEPTH_ATTACHMENT,
        Attachment::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
    }
}

fn shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn limit_param(limit: Limit) -> u32 {
    match limit {
        Limit::MaxTextureSize => glow::MAX_TEXTURE_SIZE,
        Limit::MaxCubeMapTextureSize => glow::MAX_CUBE_MAP_TEXTURE_SIZE,
        Limit::MaxRenderbufferSize => glow::MAX_RENDERBUFFER_SIZE,
        Limit::MaxTextureImageUnits => glow::MAX_TEXTURE_IMAGE_UNITS,
        Limit::MaxCombinedTextureImageUnits => glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS,
        Limit::MaxVertexTextureImageUnits => glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS,
        Limit::MaxVertexAttribs => glow::MAX_VERTEX_ATTRIBS,
        Limit::MaxVaryingVectors => glow::MAX_VARYING_VECTORS,
        Limit::MaxFragmentUniformVectors => glow::MAX_FRAGMENT_UNIFORM_VECTORS,
        Limit::MaxVertexUniformVectors => glow::MAX_VERTEX_UNIFORM_VECTORS,
        Limit::MaxSamples => glow::MAX_SAMPLES,
        Limit::MaxDrawBuffers => glow::MAX_DRAW_BUFFERS,
        Limit::Max3DTextureSize => glow::MAX_3D_TEXTURE_SIZE,
        Limit::MaxArrayTextureLayers => glow::MAX_ARRAY_TEXTURE_LAYERS,
        Limit::MaxTextureMaxAnisotropy => MAX_TEXTURE_MAX_ANISOTROPY_EXT,
    }
}

// ── Driver ────────────────────────────────────────────────────────────────

impl GraphicsDriver for GlDriver {
    type Texture = <Gl as HasContext>::Texture;
    type Buffer = <Gl as HasContext>::Buffer;
    type Shader = <Gl as HasContext>::Shader;
    type Program = <Gl as HasContext>::Program;
    type UniformLocation = <Gl as HasContext>::UniformLocation;
    type Framebuffer = <Gl as HasContext>::Framebuffer;
    type Renderbuffer = <Gl as HasContext>::Renderbuffer;
    type VertexArray = <Gl as HasContext>::VertexArray;

    fn info(&self) -> DriverInfo {
        unsafe {
            DriverInfo {
                version: self.version,
                vendor: self.gl.get_parameter_string(glow::VENDOR),
                renderer: self.gl.get_parameter_string(glow::RENDERER),
                extensions: self.gl.supported_extensions().iter().cloned().collect(),
            }
        }
    }

    fn limit(&self, limit: Limit) -> i32 {
        unsafe {
            match limit {
                Limit::MaxTextureMaxAnisotropy => self.gl.get_parameter_f32(limit_param(limit)) as i32,
                Limit::MaxSamples | Limit::MaxDrawBuffers | Limit::Max3DTextureSize | Limit::MaxArrayTextureLayers
                    if !self.v2() =>
                {
                    1
                }
                _ => self.gl.get_parameter_i32(limit_param(limit)),
            }
        }
    }

    fn is_context_lost(&self) -> bool {
        if self.loss.is_set() {
            return true;
        }
        let error = unsafe { self.gl.get_error() };
        self.loss.observe(error)
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.drawing_buffer
    }

    fn set_drawing_buffer_size(&mut self, width: u32, height: u32) {
        self.drawing_buffer = (width, height);
    }

    fn client_size(&self) -> (u32, u32, f32) {
        self.client
    }

    // ── Fixed-function state ──────────────────────────────────────────────

    fn set_capability(&mut self, cap: Capability, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(capability(cap));
            } else {
                self.gl.disable(capability(cap));
            }
        }
    }

    fn depth_func(&mut self, func: CompareFunc) {
        unsafe { self.gl.depth_func(compare(func)) }
    }

    fn depth_mask(&mut self, write: bool) {
        unsafe { self.gl.depth_mask(write) }
    }

    fn cull_face(&mut self, face: Face) {
        let face = match face {
            Face::Front => glow::FRONT,
            Face::Back => glow::BACK,
            Face::FrontAndBack => glow::FRONT_AND_BACK,
        };
        unsafe { self.gl.cull_face(face) }
    }

    fn front_face(&mut self, front: FrontFace) {
        let front = match front {
            FrontFace::Cw => glow::CW,
            FrontFace::Ccw => glow::CCW,
        };
        unsafe { self.gl.front_face(front) }
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }

    fn stencil_mask(&mut self, mask: u32) {
        unsafe { self.gl.stencil_mask(mask) }
    }

    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32) {
        unsafe { self.gl.stencil_func(compare(func), reference, mask) }
    }

    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        unsafe { self.gl.stencil_op(stencil_op(fail), stencil_op(depth_fail), stencil_op(pass)) }
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        unsafe {
            self.gl.blend_func_separate(
                blend_factor(src_rgb),
                blend_factor(dst_rgb),
                blend_factor(src_alpha),
                blend_factor(dst_alpha),
            )
        }
    }

    fn blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        unsafe { self.gl.blend_equation_separate(blend_equation(rgb), blend_equation(alpha)) }
    }

    fn blend_color(&mut self, color: Color4) {
        unsafe { self.gl.blend_color(color.r, color.g, color.b, color.a) }
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        unsafe { self.gl.color_mask(r, g, b, a) }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear(&mut self, color: Option<Color4>, depth: Option<f32>, stencil: Option<i32>) {
        let mut mask = 0;
        unsafe {
            if let Some(c) = color {
                self.gl.clear_color(c.r, c.g, c.b, c.a);
                mask |= glow::COLOR_BUFFER_BIT;
            }
            if let Some(d) = depth {
                self.gl.clear_depth_f32(d);
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            if let Some(s) = stencil {
                self.gl.clear_stencil(s);
                mask |= glow::STENCIL_BUFFER_BIT;
            }
            if mask != 0 {
                self.gl.clear(mask);
            }
        }
    }

    // ── Textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<Self::Texture, String> {
        unsafe { self.gl.create_texture() }
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<Self::Texture>) {
        unsafe { self.gl.bind_texture(texture_target(target), texture) }
    }

    fn tex_image(
        &mut self,
        target: ImageTarget,
        level: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
        depth: u32,
        data: Option<&[u8]>,
    ) {
        let (internal, external, ty) = self.texel_format(format);
        unsafe {
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            match target {
                ImageTarget::Texture3D | ImageTarget::Texture2DArray => self.gl.tex_image_3d(
                    image_target(target),
                    level as i32,
                    internal,
                    width as i32,
                    height as i32,
                    depth as i32,
                    0,
                    external,
                    ty,
                    data,
                ),
                _ => self.gl.tex_image_2d(
                    image_target(target),
                    level as i32,
                    internal,
                    width as i32,
                    height as i32,
                    0,
                    external,
                    ty,
                    data,
                ),
            }
        }
    }

    fn tex_parameter(&mut self, target: TextureTarget, param: TexParam) {
        let target = texture_target(target);
        unsafe {
            match param {
                TexParam::MinFilter(f) => self.gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, filter(f)),
                TexParam::MagFilter(f) => self.gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, filter(f)),
                TexParam::WrapS(w) => self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap(w)),
                TexParam::WrapT(w) => self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap(w)),
                TexParam::WrapR(w) => self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap(w)),
                TexParam::MaxAnisotropy(level) => {
                    self.gl.tex_parameter_f32(target, TEXTURE_MAX_ANISOTROPY_EXT, level)
                }
                TexParam::Compare(Some(func)) => {
                    self.gl.tex_parameter_i32(
                        target,
                        glow::TEXTURE_COMPARE_MODE,
                        glow::COMPARE_REF_TO_TEXTURE as i32,
                    );
                    self.gl.tex_parameter_i32(target, glow::TEXTURE_COMPARE_FUNC, compare(func) as i32);
                }
                TexParam::Compare(None) => {
                    self.gl.tex_parameter_i32(target, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32)
                }
            }
        }
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        unsafe { self.gl.generate_mipmap(texture_target(target)) }
    }

    // ── Buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self) -> Result<Self::Buffer, String> {
        unsafe { self.gl.create_buffer() }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(buffer_target(target), buffer) }
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe { self.gl.buffer_data_u8_slice(buffer_target(target), data, buffer_usage(usage)) }
    }

    fn buffer_storage(&mut self, target: BufferTarget, size: usize, usage: BufferUsage) {
        unsafe { self.gl.buffer_data_size(buffer_target(target), size as i32, buffer_usage(usage)) }
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(buffer_target(target), offset as i32, data) }
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: AttribType,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, attrib_type(ty), normalized, stride, offset)
        }
    }

    fn enable_vertex_attrib(&mut self, index: u32, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable_vertex_attrib_array(index);
            } else {
                self.gl.disable_vertex_attrib_array(index);
            }
        }
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(index, divisor) }
    }

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray, String> {
        unsafe { self.gl.create_vertex_array() }
    }

    fn bind_vertex_array(&mut self, vao: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vao) }
    }

    fn delete_vertex_array(&mut self, vao: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vao) }
    }

    // ── Shaders & programs ────────────────────────────────────────────────

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, String> {
        unsafe { self.gl.create_shader(shader_type(stage)) }
    }

    fn compile_shader(&mut self, shader: Self::Shader, source: &str) {
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
        }
    }

    fn shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { self.gl.get_shader_compile_status(shader) }
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.gl.get_shader_info_log(shader) }
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&mut self) -> Result<Self::Program, String> {
        unsafe { self.gl.create_program() }
    }

    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn link_program(&mut self, program: Self::Program) {
        unsafe { self.gl.link_program(program) }
    }

    fn program_link_status(&self, program: Self::Program) -> bool {
        unsafe { self.gl.get_program_link_status(program) }
    }

    fn program_completion_status(&mut self, program: Self::Program) -> bool {
        unsafe { self.gl.get_program_completion_status(program) }
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.gl.get_program_info_log(program) }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn use_program(&mut self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn set_uniform(&mut self, location: &Self::UniformLocation, value: &UniformValue) {
        let location = Some(location);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(location, *v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(location, *v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32_slice(location, v),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32_slice(location, v),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32_slice(location, v),
                UniformValue::Mat3(m) => self.gl.uniform_matrix_3_f32_slice(location, false, m),
                UniformValue::Mat4(m) => self.gl.uniform_matrix_4_f32_slice(location, false, m),
                UniformValue::FloatArray(v) => self.gl.uniform_1_f32_slice(location, v),
            }
        }
    }

    // ── Framebuffers ──────────────────────────────────────────────────────

    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer, String> {
        unsafe { self.gl.create_framebuffer() }
    }

    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<Self::Framebuffer>) {
        let target = match target {
            FramebufferTarget::Draw => self.draw_framebuffer_target(),
            FramebufferTarget::Read => glow::READ_FRAMEBUFFER,
        };
        unsafe { self.gl.bind_framebuffer(target, framebuffer) }
    }

    fn framebuffer_texture(
        &mut self,
        attach: Attachment,
        target: ImageTarget,
        texture: Option<Self::Texture>,
        level: u32,
    ) {
        let fb = self.draw_framebuffer_target();
        unsafe {
            match target {
                ImageTarget::Texture3D | ImageTarget::Texture2DArray => {
                    self.gl
                        .framebuffer_texture_layer(fb, attachment(attach), texture, level as i32, 0)
                }
                _ => self.gl.framebuffer_texture_2d(
                    fb,
                    attachment(attach),
                    image_target(target),
                    texture,
                    level as i32,
                ),
            }
        }
    }

    fn create_renderbuffer(&mut self) -> Result<Self::Renderbuffer, String> {
        unsafe { self.gl.create_renderbuffer() }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer) }
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: Self::Renderbuffer,
        format: TextureFormat,
        samples: u32,
        width: u32,
        height: u32,
    ) {
        let (internal, _, _) = self.texel_format(format);
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            if samples > 1 && self.v2() {
                self.gl.renderbuffer_storage_multisample(
                    glow::RENDERBUFFER,
                    samples as i32,
                    internal as u32,
                    width as i32,
                    height as i32,
                );
            } else {
                self.gl
                    .renderbuffer_storage(glow::RENDERBUFFER, internal as u32, width as i32, height as i32);
            }
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
    }

    fn framebuffer_renderbuffer(&mut self, attach: Attachment, renderbuffer: Option<Self::Renderbuffer>) {
        let fb = self.draw_framebuffer_target();
        unsafe {
            self.gl
                .framebuffer_renderbuffer(fb, attachment(attach), glow::RENDERBUFFER, renderbuffer)
        }
    }

    fn blit_framebuffer(&mut self, src: (u32, u32), dst: (u32, u32), linear: bool) {
        let filter = if linear { glow::LINEAR } else { glow::NEAREST };
        unsafe {
            self.gl.blit_framebuffer(
                0,
                0,
                src.0 as i32,
                src.1 as i32,
                0,
                0,
                dst.0 as i32,
                dst.1 as i32,
                glow::COLOR_BUFFER_BIT,
                filter,
            )
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────

    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, ty: IndexType, offset: usize, instances: u32) {
        unsafe {
            if instances > 1 {
                self.gl.draw_elements_instanced(
                    primitive(mode),
                    count as i32,
                    index_type(ty),
                    offset as i32,
                    instances as i32,
                );
            } else {
                self.gl
                    .draw_elements(primitive(mode), count as i32, index_type(ty), offset as i32);
            }
        }
    }

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32) {
        unsafe {
            if instances > 1 {
                self.gl
                    .draw_arrays_instanced(primitive(mode), first as i32, count as i32, instances as i32);
            } else {
                self.gl.draw_arrays(primitive(mode), first as i32, count as i32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_stays_latched_after_the_error_clears() {
        let latch = LossLatch::default();
        assert!(!latch.observe(glow::NO_ERROR));
        assert!(latch.observe(CONTEXT_LOST));
        assert!(latch.observe(glow::NO_ERROR));
        assert!(latch.is_set());

        latch.clear();
        assert!(!latch.observe(glow::INVALID_ENUM));
    }

    #[test]
    fn host_can_report_loss() {
        let latch = LossLatch::default();
        latch.set();
        assert!(latch.observe(glow::NO_ERROR));
    }
}
