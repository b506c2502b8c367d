//! Time subsystem.
//!
//! The engine ticks one `FrameClock` in `begin_frame`; render-loop callbacks
//! receive the resulting `FrameTime`.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
