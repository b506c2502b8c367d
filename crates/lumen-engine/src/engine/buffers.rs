use std::collections::BTreeSet;

use bytemuck::Pod;

use crate::device::{BufferTarget, BufferUsage, GraphicsDriver, IndexType};
use crate::error::{EngineError, Result};
use crate::pipeline::ProgramHandle;
use crate::resource::buffer::{AttribPointer, BufferEntry, VertexArrayEntry};
use crate::resource::{
    BufferHandle, BufferInfo, BufferKind, IndexData, VertexArrayHandle, VertexAttribute, normalize_indices,
};

use super::Engine;

impl<D: GraphicsDriver> Engine<D> {
    fn buffer_entry(&self, handle: BufferHandle) -> Result<&BufferEntry<D>> {
        self.buffers.get(handle.0).ok_or(EngineError::InvalidHandle("buffer"))
    }

    fn buffer_object(&self, handle: BufferHandle) -> Result<D::Buffer> {
        self.buffer_entry(handle)?.buffer.ok_or(EngineError::InvalidHandle("buffer"))
    }

    // ── Creation ──────────────────────────────────────────────────────────

    pub fn create_vertex_buffer<T: Pod>(&mut self, data: &[T]) -> Result<BufferHandle> {
        self.create_buffer_entry(BufferKind::Vertex, BufferUsage::Static, bytemuck::cast_slice(data).to_vec())
    }

    /// Vertex buffer meant for [`update_dynamic_vertex_buffer`](Self::update_dynamic_vertex_buffer).
    pub fn create_dynamic_vertex_buffer<T: Pod>(&mut self, data: &[T]) -> Result<BufferHandle> {
        self.create_buffer_entry(BufferKind::Vertex, BufferUsage::Dynamic, bytemuck::cast_slice(data).to_vec())
    }

    /// Index buffer with the narrowest index type that fits; see
    /// [`normalize_indices`].
    pub fn create_index_buffer(&mut self, indices: IndexData<'_>, updatable: bool) -> Result<BufferHandle> {
        let normalized = normalize_indices(indices, self.caps.uint_indices);
        if normalized.truncated {
            log::warn!(
                "{} indices exceed 65535 but 32-bit indices are unsupported; values were truncated",
                normalized.count
            );
        }
        let usage = if updatable { BufferUsage::Dynamic } else { BufferUsage::Static };
        self.create_buffer_entry(BufferKind::Index(normalized.index_type), usage, normalized.bytes)
    }

    fn create_buffer_entry(&mut self, kind: BufferKind, usage: BufferUsage, data: Vec<u8>) -> Result<BufferHandle> {
        let handle = BufferHandle(self.buffers.insert(BufferEntry::new(kind, usage, data)));
        if let Err(err) = self.realize_buffer(handle) {
            self.destroy_buffer(handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// Creates the driver buffer and uploads the CPU copy.
    fn realize_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let buffer = self
            .driver
            .create_buffer()
            .map_err(|reason| EngineError::creation("buffer", reason))?;
        let entry = self.buffers.get_mut(handle.0).ok_or(EngineError::InvalidHandle("buffer"))?;
        entry.buffer = Some(buffer);
        let (target, usage) = (entry.kind.target(), entry.usage);

        self.bind_buffer(target, Some(buffer));
        if let Some(entry) = self.buffers.get(handle.0) {
            self.driver.buffer_data(target, &entry.data, usage);
        }
        Ok(())
    }

    // ── Updates ───────────────────────────────────────────────────────────

    /// Writes `data` at `byte_offset` (0 when `None`). Writes past the end
    /// grow the buffer.
    pub fn update_dynamic_vertex_buffer<T: Pod>(
        &mut self,
        handle: BufferHandle,
        data: &[T],
        byte_offset: Option<usize>,
    ) -> Result<()> {
        if self.buffer_entry(handle)?.kind != BufferKind::Vertex {
            return Err(EngineError::InvalidArgument("not a vertex buffer".to_string()));
        }
        self.write_buffer(handle, byte_offset.unwrap_or(0), bytemuck::cast_slice(data))
    }

    /// Writes indices at `byte_offset`, packed to the buffer's index type.
    pub fn update_dynamic_index_buffer(
        &mut self,
        handle: BufferHandle,
        indices: IndexData<'_>,
        byte_offset: usize,
    ) -> Result<()> {
        let BufferKind::Index(index_type) = self.buffer_entry(handle)?.kind else {
            return Err(EngineError::InvalidArgument("not an index buffer".to_string()));
        };
        let bytes = pack_indices(indices, index_type);
        self.write_buffer(handle, byte_offset, &bytes)
    }

    fn write_buffer(&mut self, handle: BufferHandle, offset: usize, bytes: &[u8]) -> Result<()> {
        let entry = self.buffers.get_mut(handle.0).ok_or(EngineError::InvalidHandle("buffer"))?;
        let buffer = entry.buffer.ok_or(EngineError::InvalidHandle("buffer"))?;
        if entry.usage != BufferUsage::Dynamic {
            log::debug!("updating a static buffer");
        }
        let grows = offset + bytes.len() > entry.data.len();
        entry.patch(offset, bytes);
        let (target, usage) = (entry.kind.target(), entry.usage);

        self.bind_buffer(target, Some(buffer));
        if grows {
            if let Some(entry) = self.buffers.get(handle.0) {
                self.driver.buffer_data(target, &entry.data, usage);
            }
        } else {
            self.driver.buffer_sub_data(target, offset, bytes);
        }
        Ok(())
    }

    // ── Lifetime ──────────────────────────────────────────────────────────

    pub fn increment_buffer_references(&mut self, handle: BufferHandle) -> Result<u32> {
        let entry = self.buffers.get_mut(handle.0).ok_or(EngineError::InvalidHandle("buffer"))?;
        entry.references += 1;
        Ok(entry.references)
    }

    /// Drops one reference; the last one deletes the buffer. Stale handles
    /// are ignored.
    pub fn release_buffer(&mut self, handle: BufferHandle) {
        let Some(entry) = self.buffers.get_mut(handle.0) else { return };
        entry.references = entry.references.saturating_sub(1);
        if entry.references == 0 {
            self.destroy_buffer(handle);
        }
    }

    pub(super) fn destroy_buffer(&mut self, handle: BufferHandle) {
        let Some(entry) = self.buffers.remove(handle.0) else { return };
        let Some(buffer) = entry.buffer else { return };
        for bound in self.bound_buffers.values_mut() {
            if *bound == Some(buffer) {
                *bound = None;
            }
        }
        self.attrib_pointers.retain(|_, pointer| pointer.buffer != buffer);
        self.driver.delete_buffer(buffer);
    }

    pub fn buffer_info(&self, handle: BufferHandle) -> Option<BufferInfo> {
        self.buffers.get(handle.0).map(|e| e.info())
    }

    /// Number of indices held by an index buffer.
    pub fn index_count(&self, handle: BufferHandle) -> Option<u32> {
        self.buffers.get(handle.0).map(|e| e.index_count())
    }

    // ── Binding ───────────────────────────────────────────────────────────

    /// Cached buffer bind. Binding an element buffer first unbinds any
    /// vertex array object so its recorded state is left alone.
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<D::Buffer>) -> bool {
        if target == BufferTarget::ElementArray {
            self.unbind_vertex_array();
        }
        if self.bound_buffers.get(&target) == Some(&buffer) {
            return false;
        }
        self.driver.bind_buffer(target, buffer);
        self.bound_buffers.insert(target, buffer);
        true
    }

    fn unbind_vertex_array(&mut self) {
        if self.bound_vao.take().is_some() {
            self.driver.bind_vertex_array(None);
            // the element binding belongs to the vertex array
            self.bound_buffers.remove(&BufferTarget::ElementArray);
            self.current_index_type = None;
        }
    }

    /// Attribute locations of `attributes` in a ready program; `None` while
    /// it compiles.
    fn attribute_locations(
        &self,
        program: ProgramHandle,
        attributes: &[VertexAttribute],
    ) -> Result<Option<Vec<Option<u32>>>> {
        let entry = self.programs.get(program.0).ok_or(EngineError::InvalidHandle("program"))?;
        let Some(reflection) = entry.reflection.as_ref() else {
            return Ok(None);
        };
        let locations = attributes
            .iter()
            .map(|attribute| {
                entry
                    .attributes
                    .iter()
                    .position(|name| *name == attribute.name)
                    .and_then(|i| reflection.attribute_locations.get(i).copied().flatten())
            })
            .collect();
        Ok(Some(locations))
    }

    /// Points the program's attributes at their buffers and binds the index
    /// buffer.
    ///
    /// Locations come from `program`'s reflection; without a program the
    /// attributes take locations in order. Pointer, enable and divisor writes
    /// are skipped when the cache already matches, and locations left over
    /// from the previous call are disabled. Nothing happens while the
    /// program compiles.
    pub fn bind_buffers(
        &mut self,
        attributes: &[VertexAttribute],
        index_buffer: Option<BufferHandle>,
        program: Option<ProgramHandle>,
    ) -> Result<()> {
        self.unbind_vertex_array();

        let locations = match program {
            Some(program) => match self.attribute_locations(program, attributes)? {
                Some(locations) => locations,
                None => return Ok(()),
            },
            None => (0..attributes.len() as u32).map(Some).collect(),
        };

        let mut used = BTreeSet::new();
        for (attribute, location) in attributes.iter().zip(locations) {
            let Some(location) = location else { continue };
            let buffer = self.buffer_object(attribute.buffer)?;

            let pointer = AttribPointer {
                buffer,
                size: attribute.size,
                ty: attribute.ty,
                normalized: attribute.normalized,
                stride: attribute.stride,
                offset: attribute.offset,
            };
            if self.attrib_pointers.get(&location) != Some(&pointer) {
                self.bind_buffer(BufferTarget::Array, Some(buffer));
                self.driver.vertex_attrib_pointer(
                    location,
                    pointer.size,
                    pointer.ty,
                    pointer.normalized,
                    pointer.stride,
                    pointer.offset,
                );
                self.attrib_pointers.insert(location, pointer);
            }
            if self.enabled_attribs.insert(location) {
                self.driver.enable_vertex_attrib(location, true);
            }
            self.set_divisor(location, attribute.divisor);
            used.insert(location);
        }

        let stale: Vec<u32> = self.enabled_attribs.difference(&used).copied().collect();
        for location in stale {
            self.driver.enable_vertex_attrib(location, false);
            self.enabled_attribs.remove(&location);
            self.set_divisor(location, 0);
        }

        if let Some(index_buffer) = index_buffer {
            let entry = self.buffer_entry(index_buffer)?;
            let BufferKind::Index(index_type) = entry.kind else {
                return Err(EngineError::InvalidArgument("not an index buffer".to_string()));
            };
            let buffer = entry.buffer.ok_or(EngineError::InvalidHandle("buffer"))?;
            self.bind_buffer(BufferTarget::ElementArray, Some(buffer));
            self.current_index_type = Some(index_type);
        }
        Ok(())
    }

    fn set_divisor(&mut self, location: u32, divisor: u32) {
        let current = self.attrib_divisors.get(&location).copied().unwrap_or(0);
        if current == divisor {
            return;
        }
        if !self.caps.instanced_arrays {
            log::warn!("attribute {} has divisor {} but instancing is unsupported", location, divisor);
            return;
        }
        self.driver.vertex_attrib_divisor(location, divisor);
        self.attrib_divisors.insert(location, divisor);
    }

    // ── Vertex array objects ──────────────────────────────────────────────

    /// Records attribute pointers and the index buffer into a vertex array
    /// object. The program must be compiled.
    pub fn record_vertex_array_object(
        &mut self,
        attributes: &[VertexAttribute],
        index_buffer: Option<BufferHandle>,
        program: ProgramHandle,
    ) -> Result<VertexArrayHandle> {
        if !self.caps.vertex_array_object {
            return Err(EngineError::Unsupported("vertex array objects".to_string()));
        }
        let Some(locations) = self.attribute_locations(program, attributes)? else {
            return Err(EngineError::InvalidArgument("program is not compiled yet".to_string()));
        };
        if let Some(index_buffer) = index_buffer {
            if !matches!(self.buffer_entry(index_buffer)?.kind, BufferKind::Index(_)) {
                return Err(EngineError::InvalidArgument("not an index buffer".to_string()));
            }
        }
        let locations = attributes
            .iter()
            .zip(locations)
            .filter_map(|(a, l)| l.map(|l| (a.name.clone(), l)))
            .collect();

        let entry = VertexArrayEntry { vao: None, attributes: attributes.to_vec(), index_buffer, locations };
        let handle = VertexArrayHandle(self.vertex_arrays.insert(entry));
        if let Err(err) = self.populate_vertex_array(handle) {
            self.release_vertex_array_object(handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// Creates the driver vertex array and replays the recorded bindings
    /// into it. Leaves it bound.
    fn populate_vertex_array(&mut self, handle: VertexArrayHandle) -> Result<()> {
        let vao = self
            .driver
            .create_vertex_array()
            .map_err(|reason| EngineError::creation("vertex array", reason))?;
        let entry = self
            .vertex_arrays
            .get_mut(handle.0)
            .ok_or(EngineError::InvalidHandle("vertex array"))?;
        entry.vao = Some(vao);
        let attributes = entry.attributes.clone();
        let locations = entry.locations.clone();
        let index_buffer = entry.index_buffer;

        self.unbind_vertex_array();
        self.driver.bind_vertex_array(Some(vao));
        self.bound_vao = Some(handle);

        for attribute in &attributes {
            let Some((_, location)) = locations.iter().find(|(name, _)| *name == attribute.name) else {
                continue;
            };
            let buffer = self.buffer_object(attribute.buffer)?;
            self.bind_buffer(BufferTarget::Array, Some(buffer));
            self.driver.vertex_attrib_pointer(
                *location,
                attribute.size,
                attribute.ty,
                attribute.normalized,
                attribute.stride,
                attribute.offset,
            );
            self.driver.enable_vertex_attrib(*location, true);
            if attribute.divisor > 0 && self.caps.instanced_arrays {
                self.driver.vertex_attrib_divisor(*location, attribute.divisor);
            }
        }

        self.current_index_type = None;
        if let Some(index_buffer) = index_buffer {
            let entry = self.buffer_entry(index_buffer)?;
            let buffer = entry.buffer.ok_or(EngineError::InvalidHandle("buffer"))?;
            let kind = entry.kind;
            self.driver.bind_buffer(BufferTarget::ElementArray, Some(buffer));
            if let BufferKind::Index(index_type) = kind {
                self.current_index_type = Some(index_type);
            }
        }
        Ok(())
    }

    /// Binds a recorded vertex array. Returns `false` when already bound.
    pub fn bind_vertex_array_object(&mut self, handle: VertexArrayHandle) -> Result<bool> {
        if self.bound_vao == Some(handle) {
            return Ok(false);
        }
        let entry = self.vertex_arrays.get(handle.0).ok_or(EngineError::InvalidHandle("vertex array"))?;
        let vao = entry.vao.ok_or(EngineError::InvalidHandle("vertex array"))?;
        let index_type = entry
            .index_buffer
            .and_then(|h| self.buffers.get(h.0))
            .and_then(|b| match b.kind {
                BufferKind::Index(ty) => Some(ty),
                BufferKind::Vertex => None,
            });

        self.driver.bind_vertex_array(Some(vao));
        self.bound_vao = Some(handle);
        self.bound_buffers.remove(&BufferTarget::ElementArray);
        self.current_index_type = index_type;
        Ok(true)
    }

    pub fn release_vertex_array_object(&mut self, handle: VertexArrayHandle) {
        let Some(entry) = self.vertex_arrays.remove(handle.0) else { return };
        if self.bound_vao == Some(handle) {
            self.unbind_vertex_array();
        }
        if let Some(vao) = entry.vao {
            self.driver.delete_vertex_array(vao);
        }
    }

    // ── Context restore ───────────────────────────────────────────────────

    pub(super) fn rebuild_buffers(&mut self) {
        for id in self.buffers.ids() {
            if let Some(entry) = self.buffers.get_mut(id) {
                entry.buffer = None;
            }
            if let Err(err) = self.realize_buffer(BufferHandle(id)) {
                log::error!("failed to rebuild buffer: {}", err);
            }
        }
    }

    pub(super) fn rebuild_vertex_arrays(&mut self) {
        for id in self.vertex_arrays.ids() {
            if let Some(entry) = self.vertex_arrays.get_mut(id) {
                entry.vao = None;
            }
            if let Err(err) = self.populate_vertex_array(VertexArrayHandle(id)) {
                log::error!("failed to rebuild vertex array: {}", err);
            }
        }
        self.unbind_vertex_array();
    }
}

fn pack_indices(indices: IndexData<'_>, index_type: IndexType) -> Vec<u8> {
    match (indices, index_type) {
        (IndexData::U16(v), IndexType::U16) => bytemuck::cast_slice(v).to_vec(),
        (IndexData::U16(v), IndexType::U32) => {
            let wide: Vec<u32> = v.iter().map(|&i| i as u32).collect();
            bytemuck::cast_slice(&wide).to_vec()
        }
        (IndexData::Values(v) | IndexData::U32(v), IndexType::U32) => bytemuck::cast_slice(v).to_vec(),
        (IndexData::Values(v) | IndexData::U32(v), IndexType::U16) => {
            let narrow: Vec<u16> = v.iter().map(|&i| i as u16).collect();
            bytemuck::cast_slice(&narrow).to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineOptions;
    use crate::device::{HeadlessConfig, PrimitiveMode};
    use crate::engine::test_support::*;
    use crate::pipeline::{ProgramDescriptor, ShaderSource};

    fn program<D: GraphicsDriver>(e: &mut Engine<D>) -> ProgramHandle {
        let descriptor = ProgramDescriptor::new(ShaderSource::raw("mesh", VS), ShaderSource::raw("mesh", FS))
            .attributes(&["position", "uv"])
            .uniforms(&["world", "tint"])
            .samplers(&["albedo"]);
        e.create_program(descriptor).unwrap()
    }

    fn layout(vb: BufferHandle) -> Vec<VertexAttribute> {
        vec![
            VertexAttribute::new("position", vb, 3).with_layout(20, 0),
            VertexAttribute::new("uv", vb, 2).with_layout(20, 12),
        ]
    }

    #[test]
    fn attribute_writes_are_cached() {
        let mut e = engine();
        let p = program(&mut e);
        let vb = e.create_vertex_buffer(&[0f32; 15]).unwrap();
        let attrs = layout(vb);
        e.driver_mut().clear_calls();

        e.bind_buffers(&attrs, None, Some(p)).unwrap();
        assert_eq!(e.driver().count("vertex_attrib_pointer"), 2);
        assert_eq!(e.driver().count("enable_vertex_attrib"), 2);

        e.bind_buffers(&attrs, None, Some(p)).unwrap();
        assert_eq!(e.driver().count("vertex_attrib_pointer"), 2);
        assert_eq!(e.driver().count("enable_vertex_attrib"), 2);

        e.bind_buffers(&attrs[..1], None, Some(p)).unwrap();
        assert_eq!(e.driver().count("enable_vertex_attrib"), 3);
        assert_eq!(e.driver().calls().last().unwrap().args, "1 false");
    }

    #[test]
    fn index_width_follows_values_and_caps() {
        let mut e = engine();
        let wide = e.create_index_buffer(IndexData::Values(&[0, 1, 65535]), false).unwrap();
        assert_eq!(e.buffer_info(wide).unwrap().kind, BufferKind::Index(IndexType::U32));
        assert_eq!(e.index_count(wide), Some(3));

        let mut v1 = engine_with(HeadlessConfig { version: 1, ..Default::default() }, EngineOptions::default());
        let narrow = v1.create_index_buffer(IndexData::Values(&[0, 1, 65535]), false).unwrap();
        assert_eq!(v1.buffer_info(narrow).unwrap().kind, BufferKind::Index(IndexType::U16));
        assert_eq!(v1.buffer_info(narrow).unwrap().capacity, 6);
    }

    #[test]
    fn dynamic_updates_grow_when_needed() {
        let mut e = engine();
        let vb = e.create_dynamic_vertex_buffer(&[0u8; 8]).unwrap();
        e.driver_mut().clear_calls();

        e.update_dynamic_vertex_buffer(vb, &[1u8; 4], Some(4)).unwrap();
        assert_eq!(e.driver().count("buffer_sub_data"), 1);
        assert_eq!(e.driver().count("buffer_data"), 0);

        e.update_dynamic_vertex_buffer(vb, &[1u8; 8], Some(4)).unwrap();
        assert_eq!(e.driver().count("buffer_data"), 1);
        assert_eq!(e.buffer_info(vb).unwrap().capacity, 12);

        let ib = e.create_index_buffer(IndexData::U16(&[0, 1, 2]), true).unwrap();
        e.update_dynamic_index_buffer(ib, IndexData::Values(&[5, 6]), 2).unwrap();
        assert_eq!(e.index_count(ib), Some(3));
        assert!(e.update_dynamic_index_buffer(vb, IndexData::Values(&[1]), 0).is_err());
    }

    #[test]
    fn released_buffers_leave_the_caches() {
        let mut e = engine();
        let vb = e.create_vertex_buffer(&[0f32; 3]).unwrap();
        e.bind_buffers(&[VertexAttribute::new("position", vb, 3)], None, None).unwrap();
        assert_eq!(e.increment_buffer_references(vb).unwrap(), 2);
        e.release_buffer(vb);
        e.release_buffer(vb);
        assert_eq!(e.driver().live_buffers(), 0);
        assert!(e.attrib_pointers.is_empty());

        let other = e.create_vertex_buffer(&[0f32; 3]).unwrap();
        e.driver_mut().clear_calls();
        e.bind_buffers(&[VertexAttribute::new("position", other, 3)], None, None).unwrap();
        assert_eq!(e.driver().count("vertex_attrib_pointer"), 1);
    }

    #[test]
    fn vertex_array_objects_carry_their_index_type() {
        let mut e = engine();
        let p = program(&mut e);
        let vb = e.create_vertex_buffer(&[0f32; 15]).unwrap();
        let ib = e.create_index_buffer(IndexData::U16(&[0, 1, 2]), false).unwrap();
        let vao = e.record_vertex_array_object(&layout(vb), Some(ib), p).unwrap();

        assert!(!e.bind_vertex_array_object(vao).unwrap());
        e.draw_elements(PrimitiveMode::Triangles, 0, 3, 1);
        assert_eq!(e.driver().calls().last().unwrap().args, "Triangles 3 U16 +0 x1");

        e.bind_buffers(&layout(vb), None, Some(p)).unwrap();
        assert!(e.bind_vertex_array_object(vao).unwrap());

        e.release_vertex_array_object(vao);
        assert_eq!(e.driver().count("delete_vertex_array"), 1);
    }

    #[test]
    fn vertex_arrays_need_support() {
        let mut e = engine_with(HeadlessConfig { version: 1, ..Default::default() }, EngineOptions::default());
        let p = program(&mut e);
        let vb = e.create_vertex_buffer(&[0f32; 15]).unwrap();
        let err = e.record_vertex_array_object(&layout(vb), None, p).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }
}
