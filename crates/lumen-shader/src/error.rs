use std::fmt;

/// Category of a preprocessing failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShaderErrorKind {
    /// A `#if` / `#elif` expression could not be parsed.
    Expression,
    /// Conditional directives are unbalanced (`#else` without `#if`, missing `#endif`, …).
    Directive,
    /// An `#include` directive is malformed, unresolvable, or nests too deeply.
    Include,
}

/// A preprocessing error.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderError {
    pub kind: ShaderErrorKind,
    pub message: String,
    /// 1-based line number in the include-expanded source.
    pub line: usize,
}

impl ShaderError {
    pub(crate) fn new(kind: ShaderErrorKind, msg: impl Into<String>, line: usize) -> Self {
        Self { kind, message: msg.into(), line }
    }

    pub(crate) fn expression(msg: impl Into<String>, line: usize) -> Self {
        Self::new(ShaderErrorKind::Expression, msg, line)
    }

    pub(crate) fn directive(msg: impl Into<String>, line: usize) -> Self {
        Self::new(ShaderErrorKind::Directive, msg, line)
    }

    pub(crate) fn include(msg: impl Into<String>, line: usize) -> Self {
        Self::new(ShaderErrorKind::Include, msg, line)
    }
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader preprocess error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ShaderError {}
