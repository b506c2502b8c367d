use std::collections::HashMap;
use std::fmt;

use crate::device::{GraphicsDriver, UniformValue};
use crate::resource::slots::slot_handle;

use super::compiler::{Reflection, Submitted};
use super::fallbacks::FallbackChain;

slot_handle!(
    /// Engine-side handle of a compiled (or compiling) program.
    ProgramHandle
);

pub type CompiledCallback = Box<dyn FnOnce(ProgramHandle)>;
pub type ErrorCallback = Box<dyn FnOnce(ProgramHandle, &str)>;

/// Where a shader stage's template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// Looked up in the engine's shader store.
    Named(String),
    /// Inline code; `label` is used for `SHADER_NAME` and logs.
    Raw { label: String, code: String },
}

impl ShaderSource {
    pub fn named(name: impl Into<String>) -> Self {
        ShaderSource::Named(name.into())
    }

    pub fn raw(label: impl Into<String>, code: impl Into<String>) -> Self {
        ShaderSource::Raw { label: label.into(), code: code.into() }
    }

    /// Part of the program cache key.
    pub fn identity(&self) -> &str {
        match self {
            ShaderSource::Named(name) => name,
            ShaderSource::Raw { code, .. } => code,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ShaderSource::Named(name) => name,
            ShaderSource::Raw { label, .. } => label,
        }
    }
}

/// Everything needed to build one program.
pub struct ProgramDescriptor {
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
    pub samplers: Vec<String>,
    pub defines: Vec<String>,
    pub index_parameters: HashMap<String, u32>,
    pub fallbacks: Option<Box<dyn FallbackChain>>,
    pub on_compiled: Option<CompiledCallback>,
    pub on_error: Option<ErrorCallback>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ProgramDescriptor {
    pub fn new(vertex: ShaderSource, fragment: ShaderSource) -> Self {
        Self {
            vertex,
            fragment,
            attributes: Vec::new(),
            uniforms: Vec::new(),
            samplers: Vec::new(),
            defines: Vec::new(),
            index_parameters: HashMap::new(),
            fallbacks: None,
            on_compiled: None,
            on_error: None,
        }
    }

    /// Both stages from the shader store under the same name.
    pub fn named(name: &str) -> Self {
        Self::new(ShaderSource::named(name), ShaderSource::named(name))
    }

    pub fn attributes(mut self, names: &[&str]) -> Self {
        self.attributes = owned(names);
        self
    }

    pub fn uniforms(mut self, names: &[&str]) -> Self {
        self.uniforms = owned(names);
        self
    }

    pub fn samplers(mut self, names: &[&str]) -> Self {
        self.samplers = owned(names);
        self
    }

    pub fn defines(mut self, defines: &[&str]) -> Self {
        self.defines = owned(defines);
        self
    }

    pub fn index_parameter(mut self, name: impl Into<String>, value: u32) -> Self {
        self.index_parameters.insert(name.into(), value);
        self
    }

    pub fn fallbacks(mut self, chain: impl FallbackChain + 'static) -> Self {
        self.fallbacks = Some(Box::new(chain));
        self
    }

    pub fn on_compiled(mut self, f: impl FnOnce(ProgramHandle) + 'static) -> Self {
        self.on_compiled = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(ProgramHandle, &str) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for ProgramDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramDescriptor")
            .field("vertex", &self.vertex.label())
            .field("fragment", &self.fragment.label())
            .field("attributes", &self.attributes)
            .field("uniforms", &self.uniforms)
            .field("samplers", &self.samplers)
            .field("defines", &self.defines)
            .finish()
    }
}

// ── Entry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProgramState {
    Compiling,
    Ready,
    Failed(String),
}

pub(crate) struct ProgramEntry<D: GraphicsDriver> {
    pub key: String,
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    /// Templates before preprocessing, replayed on rebuild.
    pub raw_vertex: String,
    pub raw_fragment: String,
    /// Final texts of the last submission.
    pub vertex_text: String,
    pub fragment_text: String,
    /// Current defines; shrinks as fallbacks are applied.
    pub defines: Vec<String>,
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
    pub samplers: Vec<String>,
    pub index_parameters: HashMap<String, u32>,
    pub fallbacks: Option<Box<dyn FallbackChain>>,

    pub submitted: Option<Submitted<D>>,
    pub program: Option<D::Program>,
    pub reflection: Option<Reflection<D>>,
    pub state: ProgramState,

    pub on_compiled: Vec<CompiledCallback>,
    pub on_error: Vec<ErrorCallback>,
    /// Last value written per uniform name.
    pub uniform_cache: HashMap<String, UniformValue>,
}

impl<D: GraphicsDriver> ProgramEntry<D> {
    pub fn new(key: String, raw_vertex: String, raw_fragment: String, descriptor: ProgramDescriptor) -> Self {
        Self {
            key,
            vertex: descriptor.vertex,
            fragment: descriptor.fragment,
            raw_vertex,
            raw_fragment,
            vertex_text: String::new(),
            fragment_text: String::new(),
            defines: descriptor.defines,
            attributes: descriptor.attributes,
            uniforms: descriptor.uniforms,
            samplers: descriptor.samplers,
            index_parameters: descriptor.index_parameters,
            fallbacks: descriptor.fallbacks,
            submitted: None,
            program: None,
            reflection: None,
            state: ProgramState::Compiling,
            on_compiled: descriptor.on_compiled.into_iter().collect(),
            on_error: descriptor.on_error.into_iter().collect(),
            uniform_cache: HashMap::new(),
        }
    }

    /// `name` for single-name programs, `vertex/fragment` otherwise.
    pub fn label(&self) -> String {
        let (v, f) = (self.vertex.label(), self.fragment.label());
        if v == f { v.to_string() } else { format!("{}/{}", v, f) }
    }

    pub fn info(&self) -> ProgramInfo {
        let (attribute_locations, samplers) = match &self.reflection {
            Some(r) => (r.attribute_locations.clone(), r.samplers.clone()),
            None => (Vec::new(), Vec::new()),
        };
        ProgramInfo {
            key: self.key.clone(),
            vertex: self.vertex.label().to_string(),
            fragment: self.fragment.label().to_string(),
            defines: self.defines.clone(),
            attributes: self.attributes.clone(),
            attribute_locations,
            samplers,
            is_ready: self.state == ProgramState::Ready,
            error: match &self.state {
                ProgramState::Failed(msg) => Some(msg.clone()),
                _ => None,
            },
            vertex_text: self.vertex_text.clone(),
            fragment_text: self.fragment_text.clone(),
        }
    }
}

/// Read-only snapshot of a program entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInfo {
    pub key: String,
    pub vertex: String,
    pub fragment: String,
    pub defines: Vec<String>,
    pub attributes: Vec<String>,
    /// Location per requested attribute; `None` when inactive.
    pub attribute_locations: Vec<Option<u32>>,
    /// Active samplers; the index is the texture unit.
    pub samplers: Vec<String>,
    pub is_ready: bool,
    pub error: Option<String>,
    pub vertex_text: String,
    pub fragment_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sources_are_keyed_by_code() {
        let a = ShaderSource::raw("quad", "void main(){}");
        assert_eq!(a.identity(), "void main(){}");
        assert_eq!(a.label(), "quad");
        assert_eq!(ShaderSource::named("pbr").identity(), "pbr");
    }

    #[test]
    fn builder_collects_lists() {
        let d = ProgramDescriptor::named("pbr")
            .attributes(&["position", "normal"])
            .samplers(&["albedo"])
            .defines(&["FOG"])
            .index_parameter("maxLights", 4);
        assert_eq!(d.attributes, vec!["position", "normal"]);
        assert_eq!(d.index_parameters["maxLights"], 4);
        assert!(d.on_compiled.is_none());
    }
}
