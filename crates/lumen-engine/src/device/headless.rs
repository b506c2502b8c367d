//! In-memory reference driver.
//!
//! `HeadlessDriver` keeps GL-like object tables and bindings without touching a
//! GPU. It is used by the test-suite and by tools that need the engine's
//! bookkeeping without a window:
//!
//! - every state-changing call is appended to a call log,
//! - compile/link is simulated (attribute/uniform discovery, `#error`
//!   failures, unused uniforms reported as optimized away),
//! - parallel compilation is simulated by a number of completion polls,
//! - context loss invalidates every object,
//! - each draw is digested by *content* (sources, texels, buffer bytes,
//!   render state), so frames rendered before and after a context loss can be
//!   compared even though every object id changed.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use crate::coords::Color4;

use super::driver::*;

// ── Config ────────────────────────────────────────────────────────────────

/// Configuration of the simulated context.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// 1 (WebGL1-class) or 2 (WebGL2-class).
    pub version: u32,
    pub vendor: String,
    pub renderer: String,
    pub extensions: Vec<String>,
    /// Overrides for the default limit table.
    pub limits: Vec<(Limit, i32)>,
    /// Completion polls before a program reports ready when
    /// `KHR_parallel_shader_compile` is listed.
    pub parallel_compile_polls: u32,
    pub drawing_buffer_size: (u32, u32),
    /// Host surface size in layout pixels.
    pub client_size: (u32, u32),
    pub device_pixel_ratio: f32,
    pub record_calls: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            version: 2,
            vendor: "lumen".to_string(),
            renderer: "headless".to_string(),
            extensions: Vec::new(),
            limits: Vec::new(),
            parallel_compile_polls: 2,
            drawing_buffer_size: (800, 600),
            client_size: (800, 600),
            device_pixel_ratio: 1.0,
            record_calls: true,
        }
    }
}

fn default_limit(limit: Limit, version: u32) -> i32 {
    match limit {
        Limit::MaxTextureSize | Limit::MaxCubeMapTextureSize | Limit::MaxRenderbufferSize => 4096,
        Limit::MaxTextureImageUnits | Limit::MaxVertexTextureImageUnits | Limit::MaxVertexAttribs => 16,
        Limit::MaxCombinedTextureImageUnits => 32,
        Limit::MaxVaryingVectors => 15,
        Limit::MaxFragmentUniformVectors => 224,
        Limit::MaxVertexUniformVectors => 256,
        Limit::MaxSamples => if version >= 2 { 4 } else { 1 },
        Limit::MaxDrawBuffers => 8,
        Limit::Max3DTextureSize => 2048,
        Limit::MaxArrayTextureLayers => 256,
        Limit::MaxTextureMaxAnisotropy => 16,
    }
}

// ── Objects ───────────────────────────────────────────────────────────────

/// Handle type for every headless object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeadlessId(u32);

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessUniform {
    program: HeadlessId,
    name: String,
}

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: &'static str,
    pub args: String,
}

#[derive(Debug, Default)]
struct TextureObject {
    target: Option<TextureTarget>,
    /// `(image target, level)` -> `(format, w, h, d, content hash)`.
    images: BTreeMap<String, (TextureFormat, u32, u32, u32, u64)>,
    params: BTreeMap<&'static str, String>,
}

impl TextureObject {
    fn content_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        format!("{:?}", self.target).hash(&mut h);
        for (key, (format, w, h_, d, content)) in &self.images {
            (key, format!("{:?}", format), w, h_, d, content).hash(&mut h);
        }
        self.params.hash(&mut h);
        h.finish()
    }
}

#[derive(Debug, Default)]
struct BufferObject {
    data: Vec<u8>,
}

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramObject {
    shaders: Vec<HeadlessId>,
    linked: bool,
    log: String,
    attributes: Vec<String>,
    uniforms: Vec<String>,
    sources: String,
    pending_polls: u32,
    uniform_values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct AttribState {
    buffer: Option<HeadlessId>,
    size: i32,
    ty: AttribType,
    normalized: bool,
    stride: i32,
    offset: i32,
    enabled: bool,
    divisor: u32,
}

#[derive(Debug, Clone, Default)]
struct VertexState {
    element_buffer: Option<HeadlessId>,
    attribs: BTreeMap<u32, AttribState>,
}

#[derive(Debug)]
enum Object {
    Texture(TextureObject),
    Buffer(BufferObject),
    Shader(ShaderObject),
    Program(ProgramObject),
    Framebuffer,
    Renderbuffer,
    VertexArray(VertexState),
}

/// Fixed-function state, debug-formatted into draw digests.
#[derive(Debug, Clone, PartialEq)]
struct RenderState {
    enabled: BTreeMap<String, bool>,
    depth_func: CompareFunc,
    depth_mask: bool,
    cull_face: Face,
    front_face: FrontFace,
    polygon_offset: (f32, f32),
    stencil_mask: u32,
    stencil_func: (CompareFunc, i32, u32),
    stencil_op: (StencilOp, StencilOp, StencilOp),
    blend_func: (BlendFactor, BlendFactor, BlendFactor, BlendFactor),
    blend_equation: (BlendEquation, BlendEquation),
    blend_color: Color4,
    color_mask: (bool, bool, bool, bool),
    viewport: (i32, i32, i32, i32),
}

impl RenderState {
    fn new(drawing_buffer: (u32, u32)) -> Self {
        Self {
            enabled: BTreeMap::new(),
            depth_func: CompareFunc::Less,
            depth_mask: true,
            cull_face: Face::Back,
            front_face: FrontFace::Ccw,
            polygon_offset: (0.0, 0.0),
            stencil_mask: u32::MAX,
            stencil_func: (CompareFunc::Always, 0, u32::MAX),
            stencil_op: (StencilOp::Keep, StencilOp::Keep, StencilOp::Keep),
            blend_func: (BlendFactor::One, BlendFactor::Zero, BlendFactor::One, BlendFactor::Zero),
            blend_equation: (BlendEquation::Add, BlendEquation::Add),
            blend_color: Color4::TRANSPARENT,
            color_mask: (true, true, true, true),
            viewport: (0, 0, drawing_buffer.0 as i32, drawing_buffer.1 as i32),
        }
    }
}

// ── Driver ────────────────────────────────────────────────────────────────

pub struct HeadlessDriver {
    config: HeadlessConfig,
    lost: bool,
    next_id: u32,
    objects: HashMap<HeadlessId, Object>,

    drawing_buffer: (u32, u32),
    state: RenderState,
    active_unit: u32,
    bound_textures: BTreeMap<(u32, String), HeadlessId>,
    array_buffer: Option<HeadlessId>,
    default_vertex_state: VertexState,
    bound_vao: Option<HeadlessId>,
    current_program: Option<HeadlessId>,
    draw_framebuffer: Option<HeadlessId>,
    read_framebuffer: Option<HeadlessId>,

    calls: Vec<Call>,
    frame_digests: Vec<u64>,
    last_frame_digest: Option<u64>,
    draw_calls: u64,
}

impl HeadlessDriver {
    pub fn new(config: HeadlessConfig) -> Self {
        let drawing_buffer = config.drawing_buffer_size;
        Self {
            config,
            lost: false,
            next_id: 1,
            objects: HashMap::new(),
            drawing_buffer,
            state: RenderState::new(drawing_buffer),
            active_unit: 0,
            bound_textures: BTreeMap::new(),
            array_buffer: None,
            default_vertex_state: VertexState::default(),
            bound_vao: None,
            current_program: None,
            draw_framebuffer: None,
            read_framebuffer: None,
            calls: Vec::new(),
            frame_digests: Vec::new(),
            last_frame_digest: None,
            draw_calls: 0,
        }
    }

    // ── Test & tooling hooks ──────────────────────────────────────────────

    /// Simulates `WEBGL_lose_context.loseContext()`: every object is gone.
    pub fn lose_context(&mut self) {
        self.lost = true;
        self.objects.clear();
        self.reset_bindings();
        self.record("lose_context", String::new());
    }

    /// Simulates the context coming back with fresh default state.
    pub fn restore_context(&mut self) {
        self.lost = false;
        self.reset_bindings();
        self.record("restore_context", String::new());
    }

    pub fn set_client_size(&mut self, width: u32, height: u32, device_pixel_ratio: f32) {
        self.config.client_size = (width, height);
        self.config.device_pixel_ratio = device_pixel_ratio;
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of logged calls named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| c.name == name).count()
    }

    /// Digest of the draws and clears of the last completed frame.
    pub fn last_frame_digest(&self) -> Option<u64> {
        self.last_frame_digest
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Number of live objects of every kind.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn live_textures(&self) -> usize {
        self.objects.values().filter(|o| matches!(o, Object::Texture(_))).count()
    }

    pub fn live_buffers(&self) -> usize {
        self.objects.values().filter(|o| matches!(o, Object::Buffer(_))).count()
    }

    pub fn live_programs(&self) -> usize {
        self.objects.values().filter(|o| matches!(o, Object::Program(_))).count()
    }

    /// Size of the image at level 0 of `texture`, if it has one.
    pub fn texture_storage_size(&self, texture: HeadlessId) -> Option<(u32, u32)> {
        match self.objects.get(&texture) {
            Some(Object::Texture(t)) => t
                .images
                .values()
                .next()
                .map(|(_, w, h, _, _)| (*w, *h)),
            _ => None,
        }
    }

    /// Last value written to uniform `name` of `program`, debug-formatted.
    pub fn uniform_value(&self, program: HeadlessId, name: &str) -> Option<&str> {
        match self.objects.get(&program) {
            Some(Object::Program(p)) => p.uniform_values.get(name).map(String::as_str),
            _ => None,
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn reset_bindings(&mut self) {
        self.state = RenderState::new(self.drawing_buffer);
        self.active_unit = 0;
        self.bound_textures.clear();
        self.array_buffer = None;
        self.default_vertex_state = VertexState::default();
        self.bound_vao = None;
        self.current_program = None;
        self.draw_framebuffer = None;
        self.read_framebuffer = None;
    }

    fn record(&mut self, name: &'static str, args: String) {
        if self.config.record_calls {
            self.calls.push(Call { name, args });
        }
    }

    fn alloc(&mut self, object: Object) -> Result<HeadlessId, String> {
        if self.lost {
            return Err("context lost".to_string());
        }
        let id = HeadlessId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, object);
        Ok(id)
    }

    fn alive(&self, id: Option<HeadlessId>) -> Option<HeadlessId> {
        id.filter(|id| self.objects.contains_key(id))
    }

    fn vertex_state_mut(&mut self) -> &mut VertexState {
        if let Some(vao) = self.bound_vao {
            if let Some(Object::VertexArray(vs)) = self.objects.get_mut(&vao) {
                return vs;
            }
        }
        &mut self.default_vertex_state
    }

    fn vertex_state(&self) -> &VertexState {
        if let Some(vao) = self.bound_vao {
            if let Some(Object::VertexArray(vs)) = self.objects.get(&vao) {
                return vs;
            }
        }
        &self.default_vertex_state
    }

    fn bound_texture(&self, target: TextureTarget) -> Option<HeadlessId> {
        self.bound_textures
            .get(&(self.active_unit, format!("{:?}", target)))
            .copied()
            .filter(|id| self.objects.contains_key(id))
    }

    fn bound_buffer(&self, target: BufferTarget) -> Option<HeadlessId> {
        let id = match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.vertex_state().element_buffer,
        };
        self.alive(id)
    }

    fn buffer_hash(&self, id: Option<HeadlessId>) -> u64 {
        let mut h = DefaultHasher::new();
        if let Some(Object::Buffer(b)) = id.and_then(|id| self.objects.get(&id)) {
            b.data.hash(&mut h);
        }
        h.finish()
    }

    fn draw_digest(&self, call: String) -> u64 {
        let mut h = DefaultHasher::new();
        call.hash(&mut h);
        format!("{:?}", self.state).hash(&mut h);

        if let Some(Object::Program(p)) = self.current_program.and_then(|id| self.objects.get(&id)) {
            p.sources.hash(&mut h);
            p.uniform_values.hash(&mut h);
        }

        for ((unit, target), id) in &self.bound_textures {
            if let Some(Object::Texture(t)) = self.objects.get(id) {
                (unit, target, t.content_hash()).hash(&mut h);
            }
        }

        let vs = self.vertex_state();
        self.buffer_hash(vs.element_buffer).hash(&mut h);
        for (index, a) in vs.attribs.iter().filter(|(_, a)| a.enabled) {
            (index, self.buffer_hash(a.buffer), a.size, format!("{:?}", a.ty)).hash(&mut h);
            (a.normalized, a.stride, a.offset, a.divisor).hash(&mut h);
        }

        h.finish()
    }

    fn link(&mut self, program: HeadlessId) {
        let shader_ids = match self.objects.get(&program) {
            Some(Object::Program(p)) => p.shaders.clone(),
            _ => return,
        };

        let mut vertex = None;
        let mut fragment = None;
        for id in shader_ids {
            if let Some(Object::Shader(s)) = self.objects.get(&id) {
                match s.stage {
                    ShaderStage::Vertex => vertex = Some((s.compiled, s.source.clone())),
                    ShaderStage::Fragment => fragment = Some((s.compiled, s.source.clone())),
                }
            }
        }

        let polls = if self.config.extensions.iter().any(|e| e.ends_with("KHR_parallel_shader_compile")) {
            self.config.parallel_compile_polls
        } else {
            0
        };

        let Some(Object::Program(p)) = self.objects.get_mut(&program) else {
            return;
        };
        p.pending_polls = polls;
        p.uniform_values.clear();

        match (vertex, fragment) {
            (Some((true, vs)), Some((true, fs))) => {
                p.attributes = declared_names(&vs, &["attribute", "in"]);
                let combined = format!("{}\n{}", vs, fs);
                let mut uniforms = declared_names(&vs, &["uniform"]);
                for name in declared_names(&fs, &["uniform"]) {
                    if !uniforms.contains(&name) {
                        uniforms.push(name);
                    }
                }
                p.uniforms = uniforms.into_iter().filter(|u| is_used(&combined, u)).collect();
                p.sources = combined;
                p.linked = true;
                p.log.clear();
            }
            _ => {
                p.linked = false;
                p.log = "ERROR: one or more attached shaders not successfully compiled".to_string();
            }
        }
    }
}

// ── Source analysis ───────────────────────────────────────────────────────

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Names declared by lines starting with one of `qualifiers` (`uniform vec4 color;`).
fn declared_names(src: &str, qualifiers: &[&str]) -> Vec<String> {
    let mut names = Vec::new();
    for line in src.lines() {
        let mut words = line.trim().split_whitespace();
        let Some(first) = words.next() else { continue };
        if !qualifiers.contains(&first) {
            continue;
        }
        let Some(last) = line.trim().trim_end_matches(';').split_whitespace().last() else {
            continue;
        };
        let name: String = last.chars().take_while(|c| is_ident(*c)).collect();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// True when `name` appears as an identifier outside its declaration lines.
fn is_used(src: &str, name: &str) -> bool {
    src.lines()
        .filter(|l| !l.trim_start().starts_with("uniform "))
        .any(|line| {
            line.match_indices(name).any(|(i, _)| {
                let before = line[..i].chars().next_back();
                let after = line[i + name.len()..].chars().next();
                !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
            })
        })
}

fn compile(source: &str) -> (bool, String) {
    for (i, line) in source.lines().enumerate() {
        if let Some(rest) = line.trim().strip_prefix("#error") {
            return (false, format!("ERROR: 0:{}: '#error' : {}", i + 1, rest.trim()));
        }
    }
    if !source.contains("main") {
        return (false, "ERROR: 0:1: '' : missing main()".to_string());
    }
    (true, String::new())
}

// ── Trait impl ────────────────────────────────────────────────────────────

impl GraphicsDriver for HeadlessDriver {
    type Texture = HeadlessId;
    type Buffer = HeadlessId;
    type Shader = HeadlessId;
    type Program = HeadlessId;
    type UniformLocation = HeadlessUniform;
    type Framebuffer = HeadlessId;
    type Renderbuffer = HeadlessId;
    type VertexArray = HeadlessId;

    fn info(&self) -> DriverInfo {
        DriverInfo {
            version: self.config.version,
            vendor: self.config.vendor.clone(),
            renderer: self.config.renderer.clone(),
            extensions: self.config.extensions.clone(),
        }
    }

    fn limit(&self, limit: Limit) -> i32 {
        self.config
            .limits
            .iter()
            .find(|(l, _)| *l == limit)
            .map_or_else(|| default_limit(limit, self.config.version), |(_, v)| *v)
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.drawing_buffer
    }

    fn set_drawing_buffer_size(&mut self, width: u32, height: u32) {
        self.drawing_buffer = (width, height);
        self.record("set_drawing_buffer_size", format!("{}x{}", width, height));
    }

    fn client_size(&self) -> (u32, u32, f32) {
        let (w, h) = self.config.client_size;
        (w, h, self.config.device_pixel_ratio)
    }

    fn begin_frame(&mut self) {
        self.frame_digests.clear();
    }

    fn end_frame(&mut self) {
        let mut h = DefaultHasher::new();
        self.frame_digests.hash(&mut h);
        self.last_frame_digest = Some(h.finish());
    }

    fn set_capability(&mut self, cap: Capability, enabled: bool) {
        self.record("set_capability", format!("{:?}={}", cap, enabled));
        self.state.enabled.insert(format!("{:?}", cap), enabled);
    }

    fn depth_func(&mut self, func: CompareFunc) {
        self.record("depth_func", format!("{:?}", func));
        self.state.depth_func = func;
    }

    fn depth_mask(&mut self, write: bool) {
        self.record("depth_mask", format!("{}", write));
        self.state.depth_mask = write;
    }

    fn cull_face(&mut self, face: Face) {
        self.record("cull_face", format!("{:?}", face));
        self.state.cull_face = face;
    }

    fn front_face(&mut self, front: FrontFace) {
        self.record("front_face", format!("{:?}", front));
        self.state.front_face = front;
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record("polygon_offset", format!("{} {}", factor, units));
        self.state.polygon_offset = (factor, units);
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record("stencil_mask", format!("{:#x}", mask));
        self.state.stencil_mask = mask;
    }

    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32) {
        self.record("stencil_func", format!("{:?} {} {:#x}", func, reference, mask));
        self.state.stencil_func = (func, reference, mask);
    }

    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.record("stencil_op", format!("{:?} {:?} {:?}", fail, depth_fail, pass));
        self.state.stencil_op = (fail, depth_fail, pass);
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.record(
            "blend_func_separate",
            format!("{:?} {:?} {:?} {:?}", src_rgb, dst_rgb, src_alpha, dst_alpha),
        );
        self.state.blend_func = (src_rgb, dst_rgb, src_alpha, dst_alpha);
    }

    fn blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        self.record("blend_equation_separate", format!("{:?} {:?}", rgb, alpha));
        self.state.blend_equation = (rgb, alpha);
    }

    fn blend_color(&mut self, color: Color4) {
        self.record("blend_color", format!("{:?}", color));
        self.state.blend_color = color;
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.record("color_mask", format!("{} {} {} {}", r, g, b, a));
        self.state.color_mask = (r, g, b, a);
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record("viewport", format!("{} {} {} {}", x, y, width, height));
        self.state.viewport = (x, y, width, height);
    }

    fn clear(&mut self, color: Option<Color4>, depth: Option<f32>, stencil: Option<i32>) {
        let args = format!("{:?} {:?} {:?}", color, depth, stencil);
        self.record("clear", args.clone());
        if self.lost {
            return;
        }
        let mut h = DefaultHasher::new();
        ("clear", args, format!("{:?}", self.state.viewport)).hash(&mut h);
        self.frame_digests.push(h.finish());
    }

    // textures

    fn create_texture(&mut self) -> Result<HeadlessId, String> {
        self.record("create_texture", String::new());
        self.alloc(Object::Texture(TextureObject::default()))
    }

    fn delete_texture(&mut self, texture: HeadlessId) {
        self.record("delete_texture", format!("{:?}", texture));
        if let Some(Object::Texture(_)) = self.objects.get(&texture) {
            self.objects.remove(&texture);
            self.bound_textures.retain(|_, id| *id != texture);
        }
    }

    fn active_texture(&mut self, unit: u32) {
        self.record("active_texture", format!("{}", unit));
        self.active_unit = unit;
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<HeadlessId>) {
        self.record("bind_texture", format!("{} {:?} {:?}", self.active_unit, target, texture));
        let key = (self.active_unit, format!("{:?}", target));
        match self.alive(texture) {
            Some(id) => {
                if let Some(Object::Texture(t)) = self.objects.get_mut(&id) {
                    t.target.get_or_insert(target);
                }
                self.bound_textures.insert(key, id);
            }
            None => {
                self.bound_textures.remove(&key);
            }
        }
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
        self.record("tex_image", format!("{:?} {} {:?} {}x{}x{}", target, level, format, width, height, depth));
        let Some(id) = self.bound_texture(target.texture_target()) else { return };
        let mut h = DefaultHasher::new();
        data.hash(&mut h);
        if let Some(Object::Texture(t)) = self.objects.get_mut(&id) {
            t.images.insert(
                format!("{:?}/{}", target, level),
                (format, width, height, depth, h.finish()),
            );
        }
    }

    fn tex_parameter(&mut self, target: TextureTarget, param: TexParam) {
        self.record("tex_parameter", format!("{:?} {:?}", target, param));
        let Some(id) = self.bound_texture(target) else { return };
        let key = match param {
            TexParam::MinFilter(_) => "min_filter",
            TexParam::MagFilter(_) => "mag_filter",
            TexParam::WrapS(_) => "wrap_s",
            TexParam::WrapT(_) => "wrap_t",
            TexParam::WrapR(_) => "wrap_r",
            TexParam::MaxAnisotropy(_) => "anisotropy",
            TexParam::Compare(_) => "compare",
        };
        if let Some(Object::Texture(t)) = self.objects.get_mut(&id) {
            t.params.insert(key, format!("{:?}", param));
        }
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        self.record("generate_mipmap", format!("{:?}", target));
    }

    // buffers

    fn create_buffer(&mut self) -> Result<HeadlessId, String> {
        self.record("create_buffer", String::new());
        self.alloc(Object::Buffer(BufferObject::default()))
    }

    fn delete_buffer(&mut self, buffer: HeadlessId) {
        self.record("delete_buffer", format!("{:?}", buffer));
        if let Some(Object::Buffer(_)) = self.objects.get(&buffer) {
            self.objects.remove(&buffer);
        }
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<HeadlessId>) {
        self.record("bind_buffer", format!("{:?} {:?}", target, buffer));
        let buffer = self.alive(buffer);
        match target {
            BufferTarget::Array => self.array_buffer = buffer,
            BufferTarget::ElementArray => self.vertex_state_mut().element_buffer = buffer,
        }
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.record("buffer_data", format!("{:?} {} bytes {:?}", target, data.len(), usage));
        let Some(id) = self.bound_buffer(target) else { return };
        if let Some(Object::Buffer(b)) = self.objects.get_mut(&id) {
            b.data = data.to_vec();
        }
    }

    fn buffer_storage(&mut self, target: BufferTarget, size: usize, usage: BufferUsage) {
        self.record("buffer_storage", format!("{:?} {} bytes {:?}", target, size, usage));
        let Some(id) = self.bound_buffer(target) else { return };
        if let Some(Object::Buffer(b)) = self.objects.get_mut(&id) {
            b.data = vec![0; size];
        }
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        self.record("buffer_sub_data", format!("{:?} +{} {} bytes", target, offset, data.len()));
        let Some(id) = self.bound_buffer(target) else { return };
        if let Some(Object::Buffer(b)) = self.objects.get_mut(&id) {
            let end = offset + data.len();
            if b.data.len() < end {
                b.data.resize(end, 0);
            }
            b.data[offset..end].copy_from_slice(data);
        }
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
        self.record(
            "vertex_attrib_pointer",
            format!("{} {} {:?} {} {} {}", index, size, ty, normalized, stride, offset),
        );
        let buffer = self.alive(self.array_buffer);
        let a = self.vertex_state_mut().attribs.entry(index).or_default();
        a.buffer = buffer;
        a.size = size;
        a.ty = ty;
        a.normalized = normalized;
        a.stride = stride;
        a.offset = offset;
    }

    fn enable_vertex_attrib(&mut self, index: u32, enabled: bool) {
        self.record("enable_vertex_attrib", format!("{} {}", index, enabled));
        self.vertex_state_mut().attribs.entry(index).or_default().enabled = enabled;
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record("vertex_attrib_divisor", format!("{} {}", index, divisor));
        self.vertex_state_mut().attribs.entry(index).or_default().divisor = divisor;
    }

    fn create_vertex_array(&mut self) -> Result<HeadlessId, String> {
        self.record("create_vertex_array", String::new());
        self.alloc(Object::VertexArray(VertexState::default()))
    }

    fn bind_vertex_array(&mut self, vao: Option<HeadlessId>) {
        self.record("bind_vertex_array", format!("{:?}", vao));
        self.bound_vao = self.alive(vao);
    }

    fn delete_vertex_array(&mut self, vao: HeadlessId) {
        self.record("delete_vertex_array", format!("{:?}", vao));
        if let Some(Object::VertexArray(_)) = self.objects.get(&vao) {
            self.objects.remove(&vao);
            if self.bound_vao == Some(vao) {
                self.bound_vao = None;
            }
        }
    }

    // shaders & programs

    fn create_shader(&mut self, stage: ShaderStage) -> Result<HeadlessId, String> {
        self.record("create_shader", format!("{:?}", stage));
        self.alloc(Object::Shader(ShaderObject {
            stage,
            source: String::new(),
            compiled: false,
            log: String::new(),
        }))
    }

    fn compile_shader(&mut self, shader: HeadlessId, source: &str) {
        self.record("compile_shader", format!("{:?}", shader));
        if let Some(Object::Shader(s)) = self.objects.get_mut(&shader) {
            let (ok, log) = compile(source);
            s.source = source.to_string();
            s.compiled = ok;
            s.log = log;
        }
    }

    fn shader_compile_status(&self, shader: HeadlessId) -> bool {
        matches!(self.objects.get(&shader), Some(Object::Shader(s)) if s.compiled)
    }

    fn shader_info_log(&self, shader: HeadlessId) -> String {
        match self.objects.get(&shader) {
            Some(Object::Shader(s)) => s.log.clone(),
            _ => String::new(),
        }
    }

    fn delete_shader(&mut self, shader: HeadlessId) {
        self.record("delete_shader", format!("{:?}", shader));
        if let Some(Object::Shader(_)) = self.objects.get(&shader) {
            self.objects.remove(&shader);
        }
    }

    fn create_program(&mut self) -> Result<HeadlessId, String> {
        self.record("create_program", String::new());
        self.alloc(Object::Program(ProgramObject::default()))
    }

    fn attach_shader(&mut self, program: HeadlessId, shader: HeadlessId) {
        self.record("attach_shader", format!("{:?} {:?}", program, shader));
        if let Some(Object::Program(p)) = self.objects.get_mut(&program) {
            p.shaders.push(shader);
        }
    }

    fn link_program(&mut self, program: HeadlessId) {
        self.record("link_program", format!("{:?}", program));
        self.link(program);
    }

    fn program_link_status(&self, program: HeadlessId) -> bool {
        matches!(self.objects.get(&program), Some(Object::Program(p)) if p.linked)
    }

    fn program_completion_status(&mut self, program: HeadlessId) -> bool {
        match self.objects.get_mut(&program) {
            Some(Object::Program(p)) if p.pending_polls > 0 => {
                p.pending_polls -= 1;
                false
            }
            _ => true,
        }
    }

    fn program_info_log(&self, program: HeadlessId) -> String {
        match self.objects.get(&program) {
            Some(Object::Program(p)) => p.log.clone(),
            _ => String::new(),
        }
    }

    fn delete_program(&mut self, program: HeadlessId) {
        self.record("delete_program", format!("{:?}", program));
        if let Some(Object::Program(_)) = self.objects.get(&program) {
            self.objects.remove(&program);
            if self.current_program == Some(program) {
                self.current_program = None;
            }
        }
    }

    fn attrib_location(&self, program: HeadlessId, name: &str) -> Option<u32> {
        match self.objects.get(&program) {
            Some(Object::Program(p)) if p.linked => {
                p.attributes.iter().position(|a| a == name).map(|i| i as u32)
            }
            _ => None,
        }
    }

    fn uniform_location(&self, program: HeadlessId, name: &str) -> Option<HeadlessUniform> {
        match self.objects.get(&program) {
            Some(Object::Program(p)) if p.linked && p.uniforms.iter().any(|u| u == name) => {
                Some(HeadlessUniform { program, name: name.to_string() })
            }
            _ => None,
        }
    }

    fn use_program(&mut self, program: Option<HeadlessId>) {
        self.record("use_program", format!("{:?}", program));
        self.current_program = self.alive(program);
    }

    fn set_uniform(&mut self, location: &HeadlessUniform, value: &UniformValue) {
        self.record("set_uniform", format!("{} {:?}", location.name, value));
        if let Some(Object::Program(p)) = self.objects.get_mut(&location.program) {
            p.uniform_values.insert(location.name.clone(), format!("{:?}", value));
        }
    }

    // framebuffers

    fn create_framebuffer(&mut self) -> Result<HeadlessId, String> {
        self.record("create_framebuffer", String::new());
        self.alloc(Object::Framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: HeadlessId) {
        self.record("delete_framebuffer", format!("{:?}", framebuffer));
        if let Some(Object::Framebuffer) = self.objects.get(&framebuffer) {
            self.objects.remove(&framebuffer);
        }
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<HeadlessId>) {
        self.record("bind_framebuffer", format!("{:?} {:?}", target, framebuffer));
        let fb = self.alive(framebuffer);
        match target {
            FramebufferTarget::Draw => self.draw_framebuffer = fb,
            FramebufferTarget::Read => self.read_framebuffer = fb,
        }
    }

    fn framebuffer_texture(
        &mut self,
        attachment: Attachment,
        target: ImageTarget,
        texture: Option<HeadlessId>,
        level: u32,
    ) {
        self.record("framebuffer_texture", format!("{:?} {:?} {:?} {}", attachment, target, texture, level));
    }

    fn create_renderbuffer(&mut self) -> Result<HeadlessId, String> {
        self.record("create_renderbuffer", String::new());
        self.alloc(Object::Renderbuffer)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: HeadlessId) {
        self.record("delete_renderbuffer", format!("{:?}", renderbuffer));
        if let Some(Object::Renderbuffer) = self.objects.get(&renderbuffer) {
            self.objects.remove(&renderbuffer);
        }
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: HeadlessId,
        format: TextureFormat,
        samples: u32,
        width: u32,
        height: u32,
    ) {
        self.record(
            "renderbuffer_storage",
            format!("{:?} {:?} x{} {}x{}", renderbuffer, format, samples, width, height),
        );
    }

    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: Option<HeadlessId>) {
        self.record("framebuffer_renderbuffer", format!("{:?} {:?}", attachment, renderbuffer));
    }

    fn blit_framebuffer(&mut self, src: (u32, u32), dst: (u32, u32), linear: bool) {
        self.record("blit_framebuffer", format!("{:?} -> {:?} linear={}", src, dst, linear));
    }

    // drawing

    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, index_type: IndexType, offset: usize, instances: u32) {
        let args = format!("{:?} {} {:?} +{} x{}", mode, count, index_type, offset, instances);
        self.record("draw_elements", args.clone());
        if self.lost {
            return;
        }
        self.draw_calls += 1;
        let digest = self.draw_digest(args);
        self.frame_digests.push(digest);
    }

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32) {
        let args = format!("{:?} {} {} x{}", mode, first, count, instances);
        self.record("draw_arrays", args.clone());
        if self.lost {
            return;
        }
        self.draw_calls += 1;
        let digest = self.draw_digest(args);
        self.frame_digests.push(digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec3 position;\nattribute vec2 uv;\nuniform mat4 world;\nuniform float unused;\nvoid main() { gl_Position = world * vec4(position, 1.0); }";
    const FS: &str = "uniform sampler2D diffuse;\nvoid main() { gl_FragColor = texture2D(diffuse, vec2(0.0)); }";

    fn linked(driver: &mut HeadlessDriver, vs: &str, fs: &str) -> HeadlessId {
        let v = driver.create_shader(ShaderStage::Vertex).unwrap();
        driver.compile_shader(v, vs);
        let f = driver.create_shader(ShaderStage::Fragment).unwrap();
        driver.compile_shader(f, fs);
        let p = driver.create_program().unwrap();
        driver.attach_shader(p, v);
        driver.attach_shader(p, f);
        driver.link_program(p);
        p
    }

    #[test]
    fn link_discovers_attributes_and_active_uniforms() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let p = linked(&mut d, VS, FS);
        assert!(d.program_link_status(p));
        assert_eq!(d.attrib_location(p, "position"), Some(0));
        assert_eq!(d.attrib_location(p, "uv"), Some(1));
        assert!(d.uniform_location(p, "world").is_some());
        assert!(d.uniform_location(p, "diffuse").is_some());
        assert!(d.uniform_location(p, "unused").is_none());
    }

    #[test]
    fn error_directive_fails_compile_with_line() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let s = d.create_shader(ShaderStage::Fragment).unwrap();
        d.compile_shader(s, "void main() {}\n#error nope");
        assert!(!d.shader_compile_status(s));
        assert_eq!(d.shader_info_log(s), "ERROR: 0:2: '#error' : nope");
    }

    #[test]
    fn parallel_compile_needs_polls() {
        let mut d = HeadlessDriver::new(HeadlessConfig {
            extensions: vec!["KHR_parallel_shader_compile".into()],
            parallel_compile_polls: 2,
            ..HeadlessConfig::default()
        });
        let p = linked(&mut d, VS, FS);
        assert!(!d.program_completion_status(p));
        assert!(!d.program_completion_status(p));
        assert!(d.program_completion_status(p));
    }

    #[test]
    fn context_loss_invalidates_objects() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let t = d.create_texture().unwrap();
        d.lose_context();
        assert!(d.is_context_lost());
        assert_eq!(d.live_objects(), 0);
        assert!(d.create_buffer().is_err());
        d.restore_context();
        assert!(!d.is_context_lost());
        let t2 = d.create_texture().unwrap();
        assert_ne!(t, t2);
    }

    #[test]
    fn digest_depends_on_content_not_ids() {
        fn frame(d: &mut HeadlessDriver) -> u64 {
            let p = linked(d, VS, FS);
            d.use_program(Some(p));
            let b = d.create_buffer().unwrap();
            d.bind_buffer(BufferTarget::Array, Some(b));
            d.buffer_data(BufferTarget::Array, &[1, 2, 3, 4], BufferUsage::Static);
            d.vertex_attrib_pointer(0, 3, AttribType::Float, false, 12, 0);
            d.enable_vertex_attrib(0, true);
            d.begin_frame();
            d.draw_arrays(PrimitiveMode::Triangles, 0, 3, 1);
            d.end_frame();
            d.last_frame_digest().unwrap()
        }

        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let first = frame(&mut d);
        d.lose_context();
        d.restore_context();
        assert_eq!(frame(&mut d), first);
    }

    #[test]
    fn buffer_sub_data_patches_bytes() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let b = d.create_buffer().unwrap();
        d.bind_buffer(BufferTarget::Array, Some(b));
        d.buffer_storage(BufferTarget::Array, 4, BufferUsage::Dynamic);
        d.buffer_sub_data(BufferTarget::Array, 2, &[9, 9]);
        let Some(Object::Buffer(obj)) = d.objects.get(&b) else { panic!("buffer missing") };
        assert_eq!(obj.data, vec![0, 0, 9, 9]);
    }
}
