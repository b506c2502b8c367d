//! Coordinate and color types shared across the engine.
//!
//! Viewports follow GL conventions: origin bottom-left, +Y up, in
//! drawing-buffer pixels. Normalized viewports are fractions of the current
//! render target.

mod color;
mod rect;
mod viewport;

pub use color::Color4;
pub use rect::NormalizedRect;
pub use viewport::PixelRect;
