//! Fixed-function state trackers.
//!
//! Each tracker mirrors one group of driver state. Setters only flag a field
//! dirty when the value actually changes; `apply` flushes dirty fields in a
//! fixed order and clears the flags. `reset` restores defaults and marks
//! everything dirty, which is how a fresh or restored context is resynced.

mod alpha;
mod depth;
mod stencil;
mod viewport;

pub use alpha::{AlphaMode, AlphaState};
pub use depth::DepthCullingState;
pub use stencil::StencilState;
pub use viewport::ViewportCache;
