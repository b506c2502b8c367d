//! Pipeline compiler.
//!
//! Program descriptors, the program cache, fallback chains and compile
//! diagnostics. The engine drives these from `Engine::create_program` and
//! from its per-frame compile polling.

mod cache;
pub(crate) mod compiler;
pub mod diagnostics;
mod fallbacks;
pub(crate) mod program;

pub use cache::program_key;
pub(crate) use cache::ProgramCache;
pub use compiler::assemble;
pub use fallbacks::{EffectFallbacks, FallbackChain};
pub use program::{CompiledCallback, ErrorCallback, ProgramDescriptor, ProgramHandle, ProgramInfo, ShaderSource};
