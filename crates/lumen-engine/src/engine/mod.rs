//! The rendering engine facade.
//!
//! `Engine<D>` owns one driver and everything mirrored from it: capabilities,
//! state trackers, binding caches, the resource registries, the program cache
//! and the shader store. The API is split by concern across the submodules:
//!
//! - `frame`: render loop, frame boundaries, draw submission
//! - `context`: context loss and the rebuild after restore
//! - `textures` / `buffers` / `programs`: resource APIs
//! - `states`: fixed-function state helpers
//! - `viewport`: viewport and drawing-buffer sizing

mod buffers;
mod context;
mod frame;
mod programs;
mod states;
mod textures;
mod viewport;

use std::collections::{BTreeSet, HashMap};

use lumen_shader::{IncludeResolver, Preprocessor, ShaderStage, ShaderStore};

use crate::core::{EngineOptions, Observable};
use crate::device::{BufferTarget, Capabilities, GraphicsDriver, IndexType, TextureTarget};
use crate::pipeline::program::ProgramEntry;
use crate::pipeline::{ProgramCache, ProgramHandle};
use crate::resource::buffer::{AttribPointer, BufferEntry, VertexArrayEntry};
use crate::resource::slots::Slots;
use crate::resource::texture::TextureEntry;
use crate::resource::{ImageLoader, NoDecoder, TextureDecoder, TextureHandle, VertexArrayHandle};
use crate::state::{AlphaMode, AlphaState, DepthCullingState, StencilState, ViewportCache};
use crate::time::{FrameClock, FrameTime};

pub use frame::RenderCallback;
pub use textures::{TextureErrorCallback, TextureLoadCallback};

/// Payload of `Engine::on_compile_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrorEvent {
    pub program: ProgramHandle,
    pub message: String,
}

/// URL load waiting on the image loader.
pub(crate) struct PendingLoad {
    pub texture: TextureHandle,
    pub url: String,
    pub retried: bool,
    pub on_load: Option<TextureLoadCallback>,
    pub on_error: Option<TextureErrorCallback>,
}

/// State-caching front end over a [`GraphicsDriver`].
pub struct Engine<D: GraphicsDriver> {
    driver: D,
    options: EngineOptions,
    caps: Capabilities,

    // trackers
    depth: DepthCullingState,
    stencil: StencilState,
    alpha: AlphaState,
    alpha_mode: AlphaMode,
    viewport: ViewportCache,
    color_write: bool,
    color_write_dirty: bool,

    // registries
    textures: Slots<TextureEntry<D>>,
    buffers: Slots<BufferEntry<D>>,
    vertex_arrays: Slots<VertexArrayEntry<D>>,
    programs: Slots<ProgramEntry<D>>,
    program_cache: ProgramCache,
    preprocessor: Preprocessor,

    // binding caches; a missing entry means "unknown"
    active_unit: Option<u32>,
    /// `Some(None)` records a unit known to be empty.
    bound_textures: HashMap<u32, Option<(TextureTarget, D::Texture)>>,
    bound_buffers: HashMap<BufferTarget, Option<D::Buffer>>,
    attrib_pointers: HashMap<u32, AttribPointer<D::Buffer>>,
    enabled_attribs: BTreeSet<u32>,
    attrib_divisors: HashMap<u32, u32>,
    bound_vao: Option<VertexArrayHandle>,
    current_program: Option<D::Program>,
    current_index_type: Option<IndexType>,
    current_render_target: Option<TextureHandle>,

    // loading
    image_loader: Option<Box<dyn ImageLoader>>,
    decoder: Box<dyn TextureDecoder>,
    pending_loads: Vec<PendingLoad>,

    // loop
    clock: FrameClock,
    frame_time: Option<FrameTime>,
    render_loop: Vec<RenderCallback<D>>,
    render_loop_stopped: bool,
    context_lost: bool,

    pub on_context_lost: Observable<()>,
    pub on_context_restored: Observable<()>,
    pub on_texture_loaded: Observable<TextureHandle>,
    pub on_compile_error: Observable<CompileErrorEvent>,
    pub on_begin_frame: Observable<FrameTime>,
    pub on_end_frame: Observable<FrameTime>,
    /// Drawing-buffer size after a change.
    pub on_resize: Observable<(u32, u32)>,
}

impl<D: GraphicsDriver> Engine<D> {
    /// Probes the context, resets every tracker and sizes the drawing buffer.
    pub fn new(driver: D, options: EngineOptions) -> Self {
        let caps = Capabilities::probe(&driver);
        log::info!(
            "engine: {} {} (version {}), max texture {}, {} units",
            caps.vendor,
            caps.renderer,
            caps.version,
            caps.max_texture_size,
            caps.max_combined_texture_image_units
        );

        let mut engine = Self {
            driver,
            options,
            caps,
            depth: DepthCullingState::new(),
            stencil: StencilState::new(),
            alpha: AlphaState::new(),
            alpha_mode: AlphaMode::Disable,
            viewport: ViewportCache::new(),
            color_write: true,
            color_write_dirty: true,
            textures: Slots::new(),
            buffers: Slots::new(),
            vertex_arrays: Slots::new(),
            programs: Slots::new(),
            program_cache: ProgramCache::default(),
            preprocessor: Preprocessor::new(),
            active_unit: None,
            bound_textures: HashMap::new(),
            bound_buffers: HashMap::new(),
            attrib_pointers: HashMap::new(),
            enabled_attribs: BTreeSet::new(),
            attrib_divisors: HashMap::new(),
            bound_vao: None,
            current_program: None,
            current_index_type: None,
            current_render_target: None,
            image_loader: None,
            decoder: Box::new(NoDecoder),
            pending_loads: Vec::new(),
            clock: FrameClock::new(),
            frame_time: None,
            render_loop: Vec::new(),
            render_loop_stopped: false,
            context_lost: false,
            on_context_lost: Observable::new(),
            on_context_restored: Observable::new(),
            on_texture_loaded: Observable::new(),
            on_compile_error: Observable::new(),
            on_begin_frame: Observable::new(),
            on_end_frame: Observable::new(),
            on_resize: Observable::new(),
        };
        engine.wipe_caches(true);
        engine.resize();
        engine
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Direct driver access. Calls made here bypass the engine's caches;
    /// follow them with [`wipe_caches`](Self::wipe_caches).
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    // ── Shader store ──────────────────────────────────────────────────────

    pub fn shader_store(&self) -> &ShaderStore {
        self.preprocessor.store()
    }

    pub fn shader_store_mut(&mut self) -> &mut ShaderStore {
        self.preprocessor.store_mut()
    }

    pub fn register_shader(&mut self, name: &str, stage: ShaderStage, code: &str) {
        self.preprocessor.store_mut().register_shader(name, stage, code);
    }

    pub fn register_include(&mut self, name: &str, code: &str) {
        self.preprocessor.store_mut().register_include(name, code);
    }

    /// Fallback source for includes missing from the store.
    pub fn set_include_resolver(&mut self, resolver: impl IncludeResolver + 'static) {
        self.preprocessor.set_include_resolver(resolver);
    }

    // ── Loaders ───────────────────────────────────────────────────────────

    pub fn set_image_loader(&mut self, loader: impl ImageLoader + 'static) {
        self.image_loader = Some(Box::new(loader));
    }

    pub fn set_texture_decoder(&mut self, decoder: impl TextureDecoder + 'static) {
        self.decoder = Box::new(decoder);
    }

    // ── Caches ────────────────────────────────────────────────────────────

    /// Forgets cached driver bindings.
    ///
    /// Always resets the viewport, vertex and index buffer bindings. With
    /// `bruteforce` the current program, texture bindings and every state
    /// tracker are reset too, so the next draw rewrites all of them.
    pub fn wipe_caches(&mut self, bruteforce: bool) {
        self.viewport.reset();
        self.bound_buffers.clear();
        self.attrib_pointers.clear();
        self.enabled_attribs.clear();
        self.attrib_divisors.clear();
        self.bound_vao = None;
        self.current_index_type = None;

        if bruteforce {
            self.current_program = None;
            self.active_unit = None;
            self.bound_textures.clear();
            self.depth.reset();
            self.stencil.reset();
            self.alpha.reset();
            self.alpha_mode = AlphaMode::Disable;
            self.color_write = true;
            self.color_write_dirty = true;
        }
    }

    /// Releases every resource and hands the driver back.
    pub fn dispose(mut self) -> D {
        self.stop_render_loop();
        self.pending_loads.clear();

        for id in self.programs.ids() {
            self.release_program(ProgramHandle(id));
        }
        for id in self.vertex_arrays.ids() {
            self.release_vertex_array_object(VertexArrayHandle(id));
        }
        for id in self.buffers.ids() {
            self.destroy_buffer(crate::resource::BufferHandle(id));
        }
        for id in self.textures.ids() {
            self.destroy_texture(TextureHandle(id));
        }

        self.on_context_lost.clear();
        self.on_context_restored.clear();
        self.on_texture_loaded.clear();
        self.on_compile_error.clear();
        self.on_begin_frame.clear();
        self.on_end_frame.clear();
        self.on_resize.clear();
        log::debug!("engine disposed");
        self.driver
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::device::{HeadlessConfig, HeadlessDriver};

    use super::*;

    pub fn engine() -> Engine<HeadlessDriver> {
        engine_with(HeadlessConfig::default(), EngineOptions::default())
    }

    pub fn engine_with(config: HeadlessConfig, options: EngineOptions) -> Engine<HeadlessDriver> {
        Engine::new(HeadlessDriver::new(config), options)
    }

    pub const VS: &str = "attribute vec3 position;\nattribute vec2 uv;\nuniform mat4 world;\nvarying vec2 vUV;\nvoid main() {\n    vUV = uv;\n    gl_Position = world * vec4(position, 1.0);\n}";
    pub const FS: &str = "uniform sampler2D albedo;\nuniform vec4 tint;\nvarying vec2 vUV;\nvoid main() {\n    gl_FragColor = texture2D(albedo, vUV) * tint;\n}";
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::device::HeadlessDriver;

    #[test]
    fn new_engine_probes_and_starts_clean() {
        let e = engine();
        assert_eq!(e.caps().version, 2);
        assert_eq!(e.texture_count(), 0);
        assert!(!e.is_context_lost());
    }

    #[test]
    fn dispose_releases_driver_objects() {
        let mut e = engine();
        e.create_vertex_buffer(&[0u8; 12]).unwrap();
        e.create_raw_texture(Some(&[255u8; 16]), 2, 2, Default::default()).unwrap();
        let d: HeadlessDriver = e.dispose();
        assert_eq!(d.live_objects(), 0);
    }
}
