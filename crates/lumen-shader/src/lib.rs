//! Conditional-compilation preprocessor for GLSL shader templates.
//!
//! This crate is intentionally dependency-free so it can be consumed by
//! shader tooling (linters, offline variant builders) without pulling in any
//! engine or GPU code.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`defines`] | `Defines` map, define-line helpers |
//! | [`error`] | `ShaderError`, `ShaderErrorKind` |
//! | [`expr`] | `#if` expression tree |
//! | [`lexer`] | expression `Lexer`, `Token` |
//! | [`processor`] | `Preprocessor`, `ProcessingOptions`, `ShaderStore` |
//!
//! # Quick start
//!
//! ```rust
//! use lumen_shader::{Preprocessor, ProcessingOptions};
//!
//! let mut pp = Preprocessor::new();
//! pp.store_mut().register_include("fog", "uniform float fogDensity;");
//!
//! let opts = ProcessingOptions {
//!     defines: vec!["FOG".into()],
//!     inject_precision: false,
//!     ..Default::default()
//! };
//! let src = "#ifdef FOG\n#include<fog>\n#endif\nvoid main() {}";
//! let out = pp.process(src, &opts).unwrap();
//! assert_eq!(out, "uniform float fogDensity;\nvoid main() {}\n");
//! ```

pub mod convert;
pub mod defines;
pub mod error;
pub mod expr;
mod include;
pub mod lexer;
pub mod processor;
mod tree;

pub use defines::{to_define_line, Defines};
pub use error::{ShaderError, ShaderErrorKind};
pub use expr::Expr;
pub use include::IncludeResolver;
pub use processor::{apply_precision, Preprocessor, ProcessingOptions, ShaderStage, ShaderStore};
pub use tree::ConditionalTree;

#[cfg(test)]
mod process_tests {
    use super::*;

    fn opts(defines: &[&str]) -> ProcessingOptions {
        ProcessingOptions {
            defines: defines.iter().map(|d| d.to_string()).collect(),
            inject_precision: false,
            convert_to_gles3: false,
            ..Default::default()
        }
    }

    fn run(src: &str, defines: &[&str]) -> String {
        Preprocessor::new().process(src, &opts(defines)).unwrap()
    }

    #[test] fn ifdef_taken() { assert_eq!(run("#ifdef FOO\nA\n#else\nB\n#endif", &["FOO"]), "A\n"); }
    #[test] fn ifdef_not_taken() { assert_eq!(run("#ifdef FOO\nA\n#else\nB\n#endif", &[]), "B\n"); }

    #[test]
    fn deterministic_output() {
        let src = "#include<common>\n#if defined(A) && !defined(B)\nx\n#endif\ny";
        let mut pp = Preprocessor::new();
        pp.store_mut().register_include("common", "#define C\n#ifdef C\nc\n#endif");
        let first = pp.process(src, &opts(&["A"])).unwrap();
        let second = pp.process(src, &opts(&["A"])).unwrap();
        let fresh = {
            let mut other = Preprocessor::new();
            other.store_mut().register_include("common", "#define C\n#ifdef C\nc\n#endif");
            other.process(src, &opts(&["A"])).unwrap()
        };
        assert_eq!(first, second);
        assert_eq!(first, fresh);
        assert_eq!(first, "#define C\nc\nx\ny\n");
    }

    #[test]
    fn boolean_expressions() {
        let src = "#if defined(A) && (defined(B) || !defined(C))\nyes\n#endif";
        assert_eq!(run(src, &["A", "B"]), "yes\n");
        assert_eq!(run(src, &["A"]), "yes\n");
        assert_eq!(run(src, &["A", "C"]), "");
        assert_eq!(run(src, &["B"]), "");
        assert_eq!(run(src, &["A", "B", "C"]), "yes\n");
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let src = "#if defined(A) || defined(B) && defined(C)\nyes\n#endif";
        assert_eq!(run(src, &["A"]), "yes\n");
        assert_eq!(run(src, &["B"]), "");
        assert_eq!(run(src, &["B", "C"]), "yes\n");
    }

    #[test]
    fn numeric_comparisons() {
        let src = "#if NUM_BONE_INFLUENCERS > 4\nextra\n#endif\n#if NUM_SAMPLES == 16\nsixteen\n#endif";
        assert_eq!(run(src, &["NUM_BONE_INFLUENCERS 8", "NUM_SAMPLES 16"]), "extra\nsixteen\n");
        assert_eq!(run(src, &["NUM_BONE_INFLUENCERS 4", "NUM_SAMPLES 8"]), "");
    }

    #[test]
    fn include_expansion_is_idempotent() {
        let mut pp = Preprocessor::new();
        pp.store_mut().register_include("inc", "float a;\n#ifdef X\nfloat x;\n#endif");
        let o = opts(&["X"]);
        let once = pp.process("#include<inc>\nvoid main(){}", &o).unwrap();
        let twice = pp.process(&once, &o).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn define_order_matters() {
        let before = "#define LATE\n#ifdef LATE\nyes\n#endif";
        let after = "#ifdef LATE\nyes\n#endif\n#define LATE";
        assert_eq!(run(before, &[]), "#define LATE\nyes\n");
        assert_eq!(run(after, &[]), "#define LATE\n");
    }

    #[test]
    fn malformed_inputs_are_errors() {
        let mut pp = Preprocessor::new();
        let o = opts(&[]);
        let err = pp.process("a\n#if (A && B\nx\n#endif", &o).unwrap_err();
        assert_eq!(err.kind, ShaderErrorKind::Expression);
        assert_eq!(err.line, 2);

        let err = pp.process("#ifdef A\nx", &o).unwrap_err();
        assert_eq!(err.kind, ShaderErrorKind::Directive);

        let err = pp.process("#include<missing>", &o).unwrap_err();
        assert_eq!(err.kind, ShaderErrorKind::Include);
    }

    #[test]
    fn precision_header_only_once() {
        let mut pp = Preprocessor::new();
        let o = ProcessingOptions { stage: ShaderStage::Fragment, ..opts(&[]) };
        let o = ProcessingOptions { inject_precision: true, ..o };
        let out = pp.process("void main(){}", &o).unwrap();
        assert_eq!(out, "precision highp float;\nvoid main(){}\n");
        assert_eq!(pp.process(&out, &o).unwrap(), out);
    }
}
