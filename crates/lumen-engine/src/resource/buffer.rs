use crate::device::{AttribType, BufferTarget, BufferUsage, GraphicsDriver, IndexType};

use super::slots::slot_handle;

slot_handle!(
    /// Engine-side vertex or index buffer handle.
    BufferHandle
);

slot_handle!(
    /// Recorded vertex array object.
    VertexArrayHandle
);

// ── Index normalization ───────────────────────────────────────────────────

/// Index data as handed to `create_index_buffer`.
#[derive(Debug, Clone, Copy)]
pub enum IndexData<'a> {
    /// Untyped list; width is chosen from the largest value.
    Values(&'a [u32]),
    U16(&'a [u16]),
    /// Explicit 32-bit input stays 32-bit when the context allows it.
    U32(&'a [u32]),
}

impl IndexData<'_> {
    pub fn len(&self) -> usize {
        match self {
            IndexData::Values(v) | IndexData::U32(v) => v.len(),
            IndexData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of [`normalize_indices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIndices {
    pub bytes: Vec<u8>,
    pub index_type: IndexType,
    pub count: u32,
    /// Some value did not fit into 16 bits and was truncated.
    pub truncated: bool,
}

/// Picks the index width and packs the indices.
///
/// 16-bit is used unless some index is at least 65535 (the primitive-restart
/// value) and the context supports 32-bit indices. Without 32-bit support,
/// values above 65535 wrap.
pub fn normalize_indices(data: IndexData<'_>, uint_supported: bool) -> NormalizedIndices {
    let count = data.len() as u32;
    match data {
        IndexData::U16(v) => NormalizedIndices {
            bytes: bytemuck::cast_slice(v).to_vec(),
            index_type: IndexType::U16,
            count,
            truncated: false,
        },
        IndexData::U32(v) if uint_supported => NormalizedIndices {
            bytes: bytemuck::cast_slice(v).to_vec(),
            index_type: IndexType::U32,
            count,
            truncated: false,
        },
        IndexData::Values(v) if uint_supported && v.iter().any(|&i| i >= 65535) => NormalizedIndices {
            bytes: bytemuck::cast_slice(v).to_vec(),
            index_type: IndexType::U32,
            count,
            truncated: false,
        },
        IndexData::U32(v) | IndexData::Values(v) => {
            let truncated = v.iter().any(|&i| i > u16::MAX as u32);
            let narrow: Vec<u16> = v.iter().map(|&i| i as u16).collect();
            NormalizedIndices {
                bytes: bytemuck::cast_slice(&narrow).to_vec(),
                index_type: IndexType::U16,
                count,
                truncated,
            }
        }
    }
}

// ── Entries ───────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index(IndexType),
}

impl BufferKind {
    pub fn target(self) -> BufferTarget {
        match self {
            BufferKind::Vertex => BufferTarget::Array,
            BufferKind::Index(_) => BufferTarget::ElementArray,
        }
    }
}

pub(crate) struct BufferEntry<D: GraphicsDriver> {
    pub buffer: Option<D::Buffer>,
    pub kind: BufferKind,
    pub usage: BufferUsage,
    /// CPU copy of the contents, replayed after a context restore.
    pub data: Vec<u8>,
    pub references: u32,
}

impl<D: GraphicsDriver> BufferEntry<D> {
    pub fn new(kind: BufferKind, usage: BufferUsage, data: Vec<u8>) -> Self {
        Self { buffer: None, kind, usage, data, references: 1 }
    }

    pub fn info(&self) -> BufferInfo {
        BufferInfo {
            kind: self.kind,
            usage: self.usage,
            capacity: self.data.len(),
            references: self.references,
        }
    }

    /// Element count for index buffers.
    pub fn index_count(&self) -> u32 {
        match self.kind {
            BufferKind::Index(ty) => (self.data.len() / ty.size_bytes()) as u32,
            BufferKind::Vertex => 0,
        }
    }

    /// Patches the CPU copy, growing it when the write runs past the end.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(bytes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    pub kind: BufferKind,
    pub usage: BufferUsage,
    pub capacity: usize,
    pub references: u32,
}

/// Where a program attribute reads its data from.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    /// Shader attribute name.
    pub name: String,
    pub buffer: BufferHandle,
    /// Component count (1..=4).
    pub size: i32,
    pub ty: AttribType,
    pub normalized: bool,
    /// Byte stride; 0 means tightly packed.
    pub stride: i32,
    pub offset: i32,
    /// Instance divisor; 0 advances per vertex.
    pub divisor: u32,
}

impl VertexAttribute {
    pub fn new(name: impl Into<String>, buffer: BufferHandle, size: i32) -> Self {
        Self {
            name: name.into(),
            buffer,
            size,
            ty: AttribType::Float,
            normalized: false,
            stride: 0,
            offset: 0,
            divisor: 0,
        }
    }

    pub fn with_layout(mut self, stride: i32, offset: i32) -> Self {
        self.stride = stride;
        self.offset = offset;
        self
    }

    pub fn with_type(mut self, ty: AttribType, normalized: bool) -> Self {
        self.ty = ty;
        self.normalized = normalized;
        self
    }

    pub fn instanced(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }
}

/// Pointer state last written for one attribute location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AttribPointer<B> {
    pub buffer: B,
    pub size: i32,
    pub ty: AttribType,
    pub normalized: bool,
    pub stride: i32,
    pub offset: i32,
}

pub(crate) struct VertexArrayEntry<D: GraphicsDriver> {
    pub vao: Option<D::VertexArray>,
    pub attributes: Vec<VertexAttribute>,
    pub index_buffer: Option<BufferHandle>,
    /// Attribute names in location order, captured from the program.
    pub locations: Vec<(String, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_pack_to_u16() {
        let n = normalize_indices(IndexData::Values(&[0, 1, 2, 65534]), true);
        assert_eq!(n.index_type, IndexType::U16);
        assert_eq!(n.bytes.len(), 8);
        assert_eq!(n.count, 4);
    }

    #[test]
    fn restart_value_promotes_to_u32() {
        let n = normalize_indices(IndexData::Values(&[0, 65535]), true);
        assert_eq!(n.index_type, IndexType::U32);
        assert_eq!(n.bytes.len(), 8);
    }

    #[test]
    fn explicit_u32_stays_wide_when_supported() {
        let n = normalize_indices(IndexData::U32(&[0, 1, 2]), true);
        assert_eq!(n.index_type, IndexType::U32);
    }

    #[test]
    fn no_uint_support_truncates() {
        let n = normalize_indices(IndexData::Values(&[1, 65536 + 7]), false);
        assert_eq!(n.index_type, IndexType::U16);
        assert!(n.truncated);
        let narrow: Vec<u16> = bytemuck::pod_collect_to_vec(&n.bytes);
        assert_eq!(narrow, vec![1, 7]);

        let n = normalize_indices(IndexData::U32(&[0, 65535]), false);
        assert_eq!(n.index_type, IndexType::U16);
        assert!(!n.truncated);
    }

    #[test]
    fn patch_grows_copy() {
        let mut e: BufferEntry<crate::device::HeadlessDriver> =
            BufferEntry::new(BufferKind::Vertex, BufferUsage::Dynamic, vec![0; 4]);
        e.patch(2, &[9, 9, 9, 9]);
        assert_eq!(e.data, vec![0, 0, 9, 9, 9, 9]);
    }
}
