use std::collections::HashMap;

use crate::convert;
use crate::defines::Defines;
use crate::error::ShaderError;
use crate::include::{expand_includes, IncludeResolver};
use crate::tree::ConditionalTree;

// ── Options ───────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// Inputs of one preprocessing pass.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    /// Ordered `"NAME"` / `"NAME VALUE"` entries; the last duplicate wins.
    pub defines: Vec<String>,
    /// Named upper bounds for `#include<x>[0..name]` ranges.
    pub index_parameters: HashMap<String, u32>,
    pub stage: ShaderStage,
    /// Target context version: 1 (GLSL ES 1.00) or 2 (GLSL ES 3.00).
    pub version: u32,
    /// Added as an implicit define (e.g. `WEBGL2`) when non-empty.
    pub platform_name: String,
    pub use_high_precision: bool,
    /// Prepend a `precision <p> float;` header when the source has none.
    pub inject_precision: bool,
    /// Run the GLSL ES 1.00 -> 3.00 rewrite when `version >= 2`.
    pub convert_to_gles3: bool,
    pub max_include_depth: usize,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            defines: Vec::new(),
            index_parameters: HashMap::new(),
            stage: ShaderStage::Vertex,
            version: 2,
            platform_name: String::new(),
            use_high_precision: true,
            inject_precision: true,
            convert_to_gles3: true,
            max_include_depth: 16,
        }
    }
}

impl ProcessingOptions {
    pub fn glsl_version(&self) -> u32 {
        if self.version >= 2 { 300 } else { 100 }
    }
}

// ── Store ─────────────────────────────────────────────────────────────────

/// Named shader sources and include bodies.
#[derive(Debug, Clone, Default)]
pub struct ShaderStore {
    shaders: HashMap<(String, ShaderStage), String>,
    includes: HashMap<String, String>,
}

impl ShaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_shader(&mut self, name: impl Into<String>, stage: ShaderStage, code: impl Into<String>) {
        self.shaders.insert((name.into(), stage), code.into());
    }

    pub fn shader(&self, name: &str, stage: ShaderStage) -> Option<&str> {
        self.shaders.get(&(name.to_string(), stage)).map(String::as_str)
    }

    pub fn register_include(&mut self, name: impl Into<String>, code: impl Into<String>) {
        self.includes.insert(name.into(), code.into());
    }

    pub fn include(&self, name: &str) -> Option<&str> {
        self.includes.get(name).map(String::as_str)
    }
}

// ── Preprocessor ──────────────────────────────────────────────────────────

/// Turns shader templates into compilable GLSL.
///
/// Pass order: include expansion, precision header, conditional evaluation,
/// then the optional GLSL ES 3.00 rewrite. Conditional trees are cached by
/// their include-expanded text, so repeated variants of one template only pay
/// for evaluation.
#[derive(Default)]
pub struct Preprocessor {
    store: ShaderStore,
    resolver: Option<Box<dyn IncludeResolver>>,
    trees: HashMap<String, ConditionalTree>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: ShaderStore) -> Self {
        Self { store, ..Self::default() }
    }

    pub fn store(&self) -> &ShaderStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ShaderStore {
        &mut self.store
    }

    /// Installs the fallback used for includes missing from the store.
    pub fn set_include_resolver(&mut self, resolver: impl IncludeResolver + 'static) {
        self.resolver = Some(Box::new(resolver));
    }

    pub fn clear_tree_cache(&mut self) {
        self.trees.clear();
    }

    pub fn cached_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn process(&mut self, raw: &str, options: &ProcessingOptions) -> Result<String, ShaderError> {
        let expanded = expand_includes(
            raw,
            &mut self.store.includes,
            self.resolver.as_deref_mut().map(|r| r as &mut dyn IncludeResolver),
            &options.index_parameters,
            options.max_include_depth,
        )?;

        let mut defines = implicit_defines(options);
        for entry in &options.defines {
            defines.insert_line(entry);
        }

        // Error lines refer to the expanded source, so the tree sees it
        // before any header is added.
        if !self.trees.contains_key(&expanded) {
            let tree = ConditionalTree::parse(&expanded)?;
            self.trees.insert(expanded.clone(), tree);
        }
        let evaluated = self.trees[&expanded].evaluate(&mut defines);

        let output = if options.inject_precision {
            apply_precision(&evaluated, options.use_high_precision)
        } else {
            evaluated
        };

        if options.convert_to_gles3 && options.version >= 2 {
            Ok(convert::to_gles3(&output, options.stage))
        } else {
            Ok(output)
        }
    }
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("store", &self.store)
            .field("has_resolver", &self.resolver.is_some())
            .field("cached_trees", &self.trees.len())
            .finish()
    }
}

fn implicit_defines(options: &ProcessingOptions) -> Defines {
    let mut defines = Defines::new();
    defines.insert("GL_ES", "true");
    defines.insert("__VERSION__", options.glsl_version().to_string());
    if !options.platform_name.is_empty() {
        defines.insert(options.platform_name.clone(), "true");
    }
    defines
}

/// Ensures a float precision statement exists and matches the requested precision.
pub fn apply_precision(src: &str, high: bool) -> String {
    let has_any = ["highp", "mediump", "lowp"]
        .iter()
        .any(|p| src.contains(&format!("precision {} float", p)));

    if !has_any {
        let p = if high { "highp" } else { "mediump" };
        return format!("precision {} float;\n{}", p, src);
    }
    if !high {
        return src.replace("precision highp float", "precision mediump float");
    }
    src.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShaderErrorKind;

    fn plain() -> ProcessingOptions {
        ProcessingOptions {
            inject_precision: false,
            convert_to_gles3: false,
            ..Default::default()
        }
    }

    #[test]
    fn precision_injection_is_idempotent() {
        let once = apply_precision("void main(){}", true);
        assert_eq!(once, "precision highp float;\nvoid main(){}");
        assert_eq!(apply_precision(&once, true), once);
        assert_eq!(apply_precision(&once, false), "precision mediump float;\nvoid main(){}");
        assert_eq!(apply_precision("precision lowp float;", true), "precision lowp float;");
    }

    #[test]
    fn implicit_defines_are_visible() {
        let mut pp = Preprocessor::new();
        let opts = ProcessingOptions { platform_name: "WEBGL2".into(), ..plain() };
        let src = "#if defined(GL_ES) && __VERSION__ >= 300\nes3\n#endif\n#ifdef WEBGL2\nwgl\n#endif";
        assert_eq!(pp.process(src, &opts).unwrap(), "es3\nwgl\n");

        let opts = ProcessingOptions { version: 1, ..plain() };
        assert_eq!(pp.process(src, &opts).unwrap(), "");
    }

    #[test]
    fn error_lines_ignore_the_precision_header() {
        let mut pp = Preprocessor::new();
        let opts = ProcessingOptions { inject_precision: true, ..plain() };
        let err = pp.process("#ifdef A\nvoid main() {}", &opts).unwrap_err();
        assert_eq!(err.kind, ShaderErrorKind::Directive);
        assert_eq!(err.line, 2);
        assert!(err.message.contains("opened at line 1"), "{}", err.message);
    }

    #[test]
    fn trees_are_cached_per_expanded_source() {
        let mut pp = Preprocessor::new();
        let src = "#ifdef A\na\n#endif";
        pp.process(src, &ProcessingOptions { defines: vec!["A".into()], ..plain() }).unwrap();
        pp.process(src, &plain()).unwrap();
        assert_eq!(pp.cached_trees(), 1);
    }

    #[test]
    fn resolver_fills_store() {
        let mut pp = Preprocessor::new();
        pp.set_include_resolver(|name: &str| (name == "common").then(|| "float c;".to_string()));
        assert_eq!(pp.process("#include<common>", &plain()).unwrap(), "float c;\n");
        assert_eq!(pp.store().include("common"), Some("float c;"));
    }

    #[test]
    fn full_pass_for_version_three() {
        let mut pp = Preprocessor::new();
        let opts = ProcessingOptions {
            stage: ShaderStage::Fragment,
            defines: vec!["TINT".into()],
            ..Default::default()
        };
        let src = "varying vec2 vUV;\nvoid main() {\n#ifdef TINT\ngl_FragColor = vec4(1.0);\n#endif\n}";
        assert_eq!(
            pp.process(src, &opts).unwrap(),
            "precision highp float;\nin vec2 vUV;\nlayout(location = 0) out vec4 glFragColor;\nvoid main() {\nglFragColor = vec4(1.0);\n}\n"
        );
    }
}
