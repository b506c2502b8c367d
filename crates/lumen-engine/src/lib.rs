//! Lumen engine crate.
//!
//! State-caching front end over a GL-ES-shaped graphics driver: redundant
//! state changes are filtered out, shader programs are preprocessed and
//! cached by source and defines, and every resource keeps the recipe needed
//! to rebuild it after a context loss.

pub mod coords;
pub mod core;
pub mod device;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod resource;
pub mod state;
pub mod time;

pub use engine::{CompileErrorEvent, Engine, RenderCallback, TextureErrorCallback, TextureLoadCallback};
pub use error::{EngineError, Result};
