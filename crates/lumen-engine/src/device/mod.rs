//! Driver seam and context capabilities.
//!
//! This module is responsible for:
//! - the `GraphicsDriver` trait every backend implements
//! - probing `Capabilities` from a driver
//! - the in-memory `HeadlessDriver` used by tests and tools
//! - the `glow`-backed `GlDriver` (feature `gl`)

mod caps;
mod driver;
#[cfg(feature = "gl")]
mod gl;
mod headless;

pub use caps::Capabilities;
pub use driver::*;
#[cfg(feature = "gl")]
pub use gl::GlDriver;
pub use headless::{Call, HeadlessConfig, HeadlessDriver, HeadlessId, HeadlessUniform};
