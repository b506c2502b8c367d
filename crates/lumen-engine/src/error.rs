use lumen_shader::ShaderError;
use thiserror::Error;

/// Errors returned by engine operations.
///
/// Compile failures are recovered through fallbacks first and only surface
/// here (and through the error callbacks) once every fallback is exhausted.
/// Context loss is a state transition, never an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The driver refused to create an object.
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    /// A handle that is stale or was never issued by this engine.
    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    #[error("shader preprocessing failed for {name}: {source}")]
    Preprocess {
        name: String,
        #[source]
        source: ShaderError,
    },

    /// Compilation or linking failed after all fallbacks.
    #[error("{0}")]
    Compile(String),

    #[error("no shader source named {0:?} for stage {1}")]
    MissingShader(String, &'static str),

    /// A texture could not be loaded or decoded.
    #[error("texture load failed for {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    pub(crate) fn creation(what: &'static str, reason: impl Into<String>) -> Self {
        EngineError::ResourceCreation { what, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
