//! Resource registry building blocks.
//!
//! Handles, entries and the pure helpers (sampling presets, index
//! normalization, POT rescale) used by the engine's texture and buffer APIs.

pub(crate) mod buffer;
pub mod loader;
pub mod resample;
pub mod sampling;
pub mod slots;
pub(crate) mod texture;

pub use buffer::{
    BufferHandle, BufferInfo, BufferKind, IndexData, NormalizedIndices, VertexArrayHandle, VertexAttribute,
    normalize_indices,
};
pub use loader::{DecodeError, ImageData, ImageLoader, MemoryImageLoader, NoDecoder, TextureDecoder};
pub use sampling::{SamplingMode, effective_anisotropy};
pub use slots::{SlotId, Slots};
pub use texture::{
    DepthStencilOptions, RenderTargetOptions, TextureHandle, TextureInfo, TextureOptions, TextureSource,
};
