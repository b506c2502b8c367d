use std::collections::HashMap;

use lumen_shader::{ProcessingOptions, ShaderStage};

use crate::device::{GraphicsDriver, UniformValue};
use crate::error::{EngineError, Result};
use crate::pipeline::compiler;
use crate::pipeline::diagnostics::FailureReport;
use crate::pipeline::program::{ProgramEntry, ProgramState};
use crate::pipeline::{ProgramDescriptor, ProgramHandle, ProgramInfo, ShaderSource, assemble, program_key};
use crate::resource::TextureHandle;

use super::{CompileErrorEvent, Engine};

impl<D: GraphicsDriver> Engine<D> {
    // ── Creation ──────────────────────────────────────────────────────────

    /// Returns the program for the descriptor's sources and defines,
    /// compiling it on first request.
    ///
    /// A repeated request returns the cached handle: its `on_compiled` runs
    /// now when the program is ready and is queued while it compiles. With
    /// parallel compilation the program becomes ready during a later
    /// [`frame`](Self::frame). A program that fails after every fallback is
    /// still returned; its error callbacks have fired and
    /// [`program_info`](Self::program_info) carries the message.
    /// Preprocessing errors are returned instead and leave nothing cached.
    pub fn create_program(&mut self, descriptor: ProgramDescriptor) -> Result<ProgramHandle> {
        let key = program_key(&descriptor.vertex, &descriptor.fragment, &descriptor.defines);

        if let Some(handle) = self.program_cache.get(&key) {
            if let Some(entry) = self.programs.get_mut(handle.0) {
                match &entry.state {
                    ProgramState::Ready => {
                        if let Some(callback) = descriptor.on_compiled {
                            callback(handle);
                        }
                    }
                    ProgramState::Compiling => {
                        entry.on_compiled.extend(descriptor.on_compiled);
                        entry.on_error.extend(descriptor.on_error);
                    }
                    ProgramState::Failed(message) => {
                        if let Some(callback) = descriptor.on_error {
                            callback(handle, message);
                        }
                    }
                }
                return Ok(handle);
            }
            self.program_cache.remove(&key);
        }

        let raw_vertex = self.resolve_source(&descriptor.vertex, ShaderStage::Vertex)?;
        let raw_fragment = self.resolve_source(&descriptor.fragment, ShaderStage::Fragment)?;

        let entry = ProgramEntry::new(key.clone(), raw_vertex, raw_fragment, descriptor);
        let handle = ProgramHandle(self.programs.insert(entry));
        self.program_cache.insert(key, handle);

        match self.build_program(handle) {
            Ok(()) => {}
            Err(err @ EngineError::Preprocess { .. }) => {
                // Callbacks still hear about it; the handle never escapes.
                self.fail_program(handle, err.to_string());
                self.release_program(handle);
                return Err(err);
            }
            Err(err) => {
                self.release_program(handle);
                return Err(err);
            }
        }

        if !self.parallel_compile() {
            self.finalize_program(handle);
        }
        Ok(handle)
    }

    fn resolve_source(&self, source: &ShaderSource, stage: ShaderStage) -> Result<String> {
        match source {
            ShaderSource::Raw { code, .. } => Ok(code.clone()),
            ShaderSource::Named(name) => self
                .preprocessor
                .store()
                .shader(name, stage)
                .map(str::to_string)
                .ok_or_else(|| EngineError::MissingShader(name.clone(), stage.as_str())),
        }
    }

    fn parallel_compile(&self) -> bool {
        self.options.parallel_shader_compile && self.caps.parallel_shader_compile
    }

    fn platform_name(&self) -> String {
        match &self.options.platform_name {
            Some(name) => name.clone(),
            None if self.caps.version >= 2 => "WEBGL2".to_string(),
            None => "WEBGL1".to_string(),
        }
    }

    fn processing_options(
        &self,
        stage: ShaderStage,
        defines: &[String],
        index_parameters: &HashMap<String, u32>,
    ) -> ProcessingOptions {
        ProcessingOptions {
            defines: defines.to_vec(),
            index_parameters: index_parameters.clone(),
            stage,
            version: self.caps.version,
            platform_name: self.platform_name(),
            use_high_precision: self.options.use_high_precision,
            inject_precision: true,
            convert_to_gles3: true,
            max_include_depth: self.options.max_include_depth as usize,
        }
    }

    /// Preprocesses both stages with the entry's current defines and submits
    /// them. The link result is read later by `finalize_program`.
    fn build_program(&mut self, handle: ProgramHandle) -> Result<()> {
        let entry = self.programs.get(handle.0).ok_or(EngineError::InvalidHandle("program"))?;
        let vertex_options = self.processing_options(ShaderStage::Vertex, &entry.defines, &entry.index_parameters);
        let fragment_options = self.processing_options(ShaderStage::Fragment, &entry.defines, &entry.index_parameters);
        let (raw_vertex, raw_fragment) = (entry.raw_vertex.clone(), entry.raw_fragment.clone());
        let (vertex_name, fragment_name) = (entry.vertex.label().to_string(), entry.fragment.label().to_string());
        let defines = entry.defines.clone();

        let vertex_code = self
            .preprocessor
            .process(&raw_vertex, &vertex_options)
            .map_err(|source| EngineError::Preprocess { name: vertex_name.clone(), source })?;
        let fragment_code = self
            .preprocessor
            .process(&raw_fragment, &fragment_options)
            .map_err(|source| EngineError::Preprocess { name: fragment_name.clone(), source })?;

        let version = self.caps.version;
        let vertex_text = assemble(version, &defines, ShaderStage::Vertex, &vertex_name, &vertex_code);
        let fragment_text = assemble(version, &defines, ShaderStage::Fragment, &fragment_name, &fragment_code);

        let submitted = compiler::submit(&mut self.driver, &vertex_text, &fragment_text)?;

        let entry = self.programs.get_mut(handle.0).ok_or(EngineError::InvalidHandle("program"))?;
        entry.vertex_text = vertex_text;
        entry.fragment_text = fragment_text;
        entry.program = Some(submitted.program);
        entry.submitted = Some(submitted);
        entry.reflection = None;
        entry.state = ProgramState::Compiling;
        entry.uniform_cache.clear();
        Ok(())
    }

    /// Reads the link result of a submitted program: reflects it on success,
    /// walks the fallback chain on failure.
    fn finalize_program(&mut self, handle: ProgramHandle) {
        let Some(entry) = self.programs.get_mut(handle.0) else { return };
        let Some(submitted) = entry.submitted.take() else { return };

        match compiler::link_result(&self.driver, &submitted) {
            Ok(()) => {
                compiler::release_shaders(&mut self.driver, &submitted);
                let reflection = compiler::reflect(
                    &mut self.driver,
                    submitted.program,
                    &entry.attributes,
                    &entry.uniforms,
                    &entry.samplers,
                );
                self.current_program = Some(submitted.program);

                entry.reflection = Some(reflection);
                entry.state = ProgramState::Ready;
                entry.uniform_cache.clear();
                entry.on_error.clear();
                let callbacks = std::mem::take(&mut entry.on_compiled);
                log::debug!("program {} ready", entry.label());

                for callback in callbacks {
                    callback(handle);
                }
            }
            Err(message) => {
                compiler::release(&mut self.driver, submitted);
                if self.current_program == entry.program {
                    self.current_program = None;
                }
                entry.program = None;

                if let Some(chain) = entry.fallbacks.as_mut().filter(|c| c.has_more_fallbacks()) {
                    let reduced = chain.reduce(&entry.defines);
                    log::warn!("program {} failed to compile, trying fallback: {}", entry.label(), message);
                    entry.defines = reduced;

                    match self.build_program(handle) {
                        Ok(()) if !self.parallel_compile() => self.finalize_program(handle),
                        Ok(()) => {}
                        Err(err) => self.fail_program(handle, err.to_string()),
                    }
                    return;
                }

                self.fail_program(handle, message);
            }
        }
    }

    /// Final failure: logs the report, fires error callbacks and notifies
    /// `on_compile_error`.
    fn fail_program(&mut self, handle: ProgramHandle, message: String) {
        let Some(entry) = self.programs.get_mut(handle.0) else { return };

        FailureReport {
            label: &entry.label(),
            message: &message,
            defines: &entry.defines,
            attributes: &entry.attributes,
            uniforms: &entry.uniforms,
            vertex: &entry.vertex_text,
            fragment: &entry.fragment_text,
        }
        .log();

        entry.state = ProgramState::Failed(message.clone());
        entry.program = None;
        entry.reflection = None;
        entry.on_compiled.clear();
        let callbacks = std::mem::take(&mut entry.on_error);

        for callback in callbacks {
            callback(handle, &message);
        }
        self.on_compile_error.notify(&CompileErrorEvent { program: handle, message });
    }

    /// Polls every program still linking. Called once per frame.
    pub(crate) fn poll_programs(&mut self) {
        let pending: Vec<ProgramHandle> = self
            .programs
            .iter()
            .filter(|(_, e)| e.submitted.is_some())
            .map(|(id, _)| ProgramHandle(id))
            .collect();

        for handle in pending {
            self.poll_program(handle);
        }
    }

    fn poll_program(&mut self, handle: ProgramHandle) {
        let Some(program) = self
            .programs
            .get(handle.0)
            .and_then(|e| e.submitted.as_ref())
            .map(|s| s.program)
        else {
            return;
        };
        if self.driver.program_completion_status(program) {
            self.finalize_program(handle);
        }
    }

    /// Rebuilds every program from its raw sources after a context restore.
    pub(super) fn rebuild_programs(&mut self) {
        for id in self.programs.ids() {
            let handle = ProgramHandle(id);
            let Some(entry) = self.programs.get_mut(id) else { continue };

            // driver objects died with the old context
            entry.submitted = None;
            entry.program = None;
            entry.reflection = None;
            entry.uniform_cache.clear();
            if matches!(entry.state, ProgramState::Failed(_)) {
                continue;
            }

            match self.build_program(handle) {
                Ok(()) if !self.parallel_compile() => self.finalize_program(handle),
                Ok(()) => {}
                Err(err) => self.fail_program(handle, err.to_string()),
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Polls the program once when it is still linking.
    pub fn is_program_ready(&mut self, handle: ProgramHandle) -> bool {
        self.poll_program(handle);
        self.programs
            .get(handle.0)
            .is_some_and(|e| e.state == ProgramState::Ready)
    }

    /// Runs `callback` now when the program is ready, or once it becomes
    /// ready. Dropped for programs that failed.
    pub fn execute_when_compiled(
        &mut self,
        handle: ProgramHandle,
        callback: impl FnOnce(ProgramHandle) + 'static,
    ) -> Result<()> {
        let entry = self.programs.get_mut(handle.0).ok_or(EngineError::InvalidHandle("program"))?;
        match entry.state {
            ProgramState::Ready => callback(handle),
            ProgramState::Compiling => entry.on_compiled.push(Box::new(callback)),
            ProgramState::Failed(_) => log::debug!("program {} failed, callback dropped", entry.label()),
        }
        Ok(())
    }

    pub fn program_info(&self, handle: ProgramHandle) -> Option<ProgramInfo> {
        self.programs.get(handle.0).map(|e| e.info())
    }

    /// Driver program of a ready entry; `None` while it compiles.
    fn ready_program(&self, handle: ProgramHandle) -> Result<Option<D::Program>> {
        let entry = self.programs.get(handle.0).ok_or(EngineError::InvalidHandle("program"))?;
        match (&entry.state, entry.program) {
            (ProgramState::Ready, Some(program)) => Ok(Some(program)),
            (ProgramState::Failed(message), _) => Err(EngineError::Compile(message.clone())),
            _ => Ok(None),
        }
    }

    // ── Binding ───────────────────────────────────────────────────────────

    /// Makes the program current. Returns `false` when it already was, or
    /// when it is still compiling.
    pub fn enable_program(&mut self, handle: ProgramHandle) -> Result<bool> {
        let Some(program) = self.ready_program(handle)? else {
            return Ok(false);
        };
        if self.current_program == Some(program) {
            return Ok(false);
        }
        self.driver.use_program(Some(program));
        self.current_program = Some(program);
        Ok(true)
    }

    /// Writes a uniform of a ready program, switching the current program
    /// when needed. Values equal to the last write are skipped, as are
    /// uniforms the driver optimized away. Returns `true` on a driver write.
    pub fn set_uniform(&mut self, handle: ProgramHandle, name: &str, value: UniformValue) -> Result<bool> {
        let Some(program) = self.ready_program(handle)? else {
            return Ok(false);
        };
        let entry = self.programs.get_mut(handle.0).ok_or(EngineError::InvalidHandle("program"))?;
        if entry.uniform_cache.get(name) == Some(&value) {
            return Ok(false);
        }
        let Some(location) = entry.reflection.as_ref().and_then(|r| r.uniforms.get(name)) else {
            return Ok(false);
        };

        if self.current_program != Some(program) {
            self.driver.use_program(Some(program));
            self.current_program = Some(program);
        }
        self.driver.set_uniform(location, &value);
        entry.uniform_cache.insert(name.to_string(), value);
        Ok(true)
    }

    /// Binds `texture` to the unit of sampler `sampler`. Samplers the driver
    /// optimized away are ignored.
    pub fn set_texture(
        &mut self,
        handle: ProgramHandle,
        sampler: &str,
        texture: Option<TextureHandle>,
    ) -> Result<bool> {
        if self.ready_program(handle)?.is_none() {
            return Ok(false);
        }
        let unit = self
            .programs
            .get(handle.0)
            .and_then(|e| e.reflection.as_ref())
            .and_then(|r| r.sampler_unit(sampler));
        match unit {
            Some(unit) => self.bind_texture_unit(unit, texture, false),
            None => Ok(false),
        }
    }

    // ── Release ───────────────────────────────────────────────────────────

    /// Deletes the driver program and evicts the cache key. Stale handles
    /// are ignored.
    pub fn release_program(&mut self, handle: ProgramHandle) {
        let Some(entry) = self.programs.remove(handle.0) else { return };
        if self.program_cache.get(&entry.key) == Some(handle) {
            self.program_cache.remove(&entry.key);
        }
        if entry.program.is_some() && self.current_program == entry.program {
            self.current_program = None;
        }
        match (entry.submitted, entry.program) {
            (Some(submitted), _) => compiler::release(&mut self.driver, submitted),
            (None, Some(program)) => self.driver.delete_program(program),
            (None, None) => {}
        }
    }

    pub fn release_all_programs(&mut self) {
        for id in self.programs.ids() {
            self.release_program(ProgramHandle(id));
        }
        self.program_cache.clear();
    }

    pub fn cached_program_count(&self) -> usize {
        self.program_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::device::HeadlessConfig;
    use crate::engine::test_support::*;
    use crate::pipeline::EffectFallbacks;

    fn descriptor() -> ProgramDescriptor {
        ProgramDescriptor::new(ShaderSource::raw("mesh", VS), ShaderSource::raw("mesh", FS))
            .attributes(&["position", "uv"])
            .uniforms(&["world", "tint"])
            .samplers(&["albedo"])
    }

    #[test]
    fn one_program_per_key() {
        let mut e = engine();
        let a = e.create_program(descriptor()).unwrap();

        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let b = e.create_program(descriptor().on_compiled(move |_| f.set(true))).unwrap();

        assert_eq!(a, b);
        assert!(fired.get());
        assert_eq!(e.program_count(), 1);
        assert_eq!(e.cached_program_count(), 1);
        assert_eq!(e.driver().live_programs(), 1);

        let c = e.create_program(descriptor().defines(&["FOG"])).unwrap();
        assert_ne!(a, c);
        assert_eq!(e.driver().live_programs(), 2);
    }

    #[test]
    fn reflection_drops_inactive_samplers() {
        let mut e = engine();
        let fs = "uniform sampler2D unused;\nuniform sampler2D albedo;\nvarying vec2 vUV;\nvoid main() {\n    gl_FragColor = texture2D(albedo, vUV);\n}";
        let p = e
            .create_program(
                ProgramDescriptor::new(ShaderSource::raw("a", VS), ShaderSource::raw("a", fs))
                    .attributes(&["position", "uv", "normal"])
                    .samplers(&["unused", "albedo"]),
            )
            .unwrap();
        let info = e.program_info(p).unwrap();
        assert!(info.is_ready);
        assert_eq!(info.samplers, vec!["albedo"]);
        assert_eq!(info.attribute_locations, vec![Some(0), Some(1), None]);
        assert!(info.vertex_text.starts_with("#version 300 es\n"));
        assert!(info.vertex_text.contains("#define SHADER_NAME vertex:a"));
    }

    #[test]
    fn fallbacks_reduce_until_it_compiles() {
        let mut e = engine();
        let fs = "#ifdef BROKEN\n#error broken feature\n#endif\nvoid main() {\n    gl_FragColor = vec4(1.0);\n}";
        let mut fallbacks = EffectFallbacks::new();
        fallbacks.add_fallback(0, "BROKEN");

        let p = e
            .create_program(
                ProgramDescriptor::new(ShaderSource::raw("fx", VS), ShaderSource::raw("fx", fs))
                    .defines(&["BROKEN", "KEEP"])
                    .fallbacks(fallbacks),
            )
            .unwrap();

        let info = e.program_info(p).unwrap();
        assert!(info.is_ready);
        assert_eq!(info.defines, vec!["KEEP"]);
        assert!(e.is_program_ready(p));
    }

    #[test]
    fn exhausted_fallbacks_report_once() {
        let mut e = engine();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(Cell::new(0));

        let ev = events.clone();
        e.on_compile_error.add(move |_, _| ev.set(ev.get() + 1));

        let errs = errors.clone();
        let fs = "#error always\nvoid main() {}";
        let p = e
            .create_program(
                ProgramDescriptor::new(ShaderSource::raw("bad", VS), ShaderSource::raw("bad", fs))
                    .on_error(move |_, msg| errs.borrow_mut().push(msg.to_string())),
            )
            .unwrap();

        assert_eq!(events.get(), 1);
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].starts_with("FRAGMENT SHADER ERROR: 0:"));
        assert!(!e.is_program_ready(p));
        assert!(matches!(e.enable_program(p), Err(EngineError::Compile(_))));
    }

    #[test]
    fn parallel_compile_is_polled_by_frames() {
        let config = HeadlessConfig {
            extensions: vec!["KHR_parallel_shader_compile".into()],
            parallel_compile_polls: 2,
            ..HeadlessConfig::default()
        };
        let mut e = engine_with(config, Default::default());
        assert!(e.caps().parallel_shader_compile);

        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let p = e.create_program(descriptor().on_compiled(move |_| c.set(c.get() + 1))).unwrap();
        assert!(!e.program_info(p).unwrap().is_ready);

        let c = count.clone();
        e.execute_when_compiled(p, move |_| c.set(c.get() + 10)).unwrap();

        e.frame();
        e.frame();
        assert!(!e.program_info(p).unwrap().is_ready);
        e.frame();
        assert!(e.program_info(p).unwrap().is_ready);
        assert_eq!(count.get(), 11);

        e.frame();
        assert_eq!(count.get(), 11);
    }

    #[test]
    fn uniform_writes_are_cached() {
        let mut e = engine();
        let p = e.create_program(descriptor()).unwrap();
        e.driver_mut().clear_calls();

        let tint = UniformValue::Vec4([1.0, 0.5, 0.5, 1.0]);
        assert!(e.set_uniform(p, "tint", tint.clone()).unwrap());
        assert!(!e.set_uniform(p, "tint", tint).unwrap());
        assert!(!e.set_uniform(p, "missing", UniformValue::Float(1.0)).unwrap());
        assert_eq!(e.driver().count("set_uniform"), 1);
        assert_eq!(e.driver().count("use_program"), 0);
    }

    #[test]
    fn named_sources_come_from_the_store() {
        let mut e = engine();
        assert!(matches!(
            e.create_program(ProgramDescriptor::named("pbr")),
            Err(EngineError::MissingShader(_, "vertex"))
        ));

        e.register_include("lighting", "uniform vec4 tint;");
        e.register_shader("pbr", ShaderStage::Vertex, VS);
        e.register_shader(
            "pbr",
            ShaderStage::Fragment,
            "#include<lighting>\nvoid main() {\n    gl_FragColor = tint;\n}",
        );
        let p = e.create_program(ProgramDescriptor::named("pbr").uniforms(&["tint"])).unwrap();
        let info = e.program_info(p).unwrap();
        assert!(info.is_ready);
        assert!(info.fragment_text.contains("uniform vec4 tint;"));
    }

    #[test]
    fn preprocess_errors_are_returned() {
        let mut e = engine();
        let fs = "#ifdef A\nvoid main() {}";
        let result = e.create_program(ProgramDescriptor::new(ShaderSource::raw("x", VS), ShaderSource::raw("x", fs)));
        assert!(matches!(result, Err(EngineError::Preprocess { .. })));
    }

    #[test]
    fn failed_preprocess_leaves_nothing_cached() {
        let mut e = engine();
        let errors = Rc::new(Cell::new(0));
        let seen = errors.clone();
        e.on_compile_error.add(move |_, _| seen.set(seen.get() + 1));
        let fs = "#ifdef A\nvoid main() {}";
        let request = || ProgramDescriptor::new(ShaderSource::raw("x", VS), ShaderSource::raw("x", fs));

        assert!(e.create_program(request()).is_err());
        assert_eq!(e.program_count(), 0);
        assert_eq!(e.cached_program_count(), 0);

        assert!(e.create_program(request()).is_err());
        assert_eq!(e.program_count(), 0);
        assert_eq!(errors.get(), 2);
    }

    #[test]
    fn release_evicts_the_key() {
        let mut e = engine();
        let a = e.create_program(descriptor()).unwrap();
        e.release_program(a);
        assert_eq!(e.driver().live_programs(), 0);
        assert!(e.program_info(a).is_none());
        e.release_program(a);

        let b = e.create_program(descriptor()).unwrap();
        assert_ne!(a, b);
        assert_eq!(e.cached_program_count(), 1);
    }
}
