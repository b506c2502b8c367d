use crate::device::{Capabilities, GraphicsDriver};

use super::Engine;

impl<D: GraphicsDriver> Engine<D> {
    /// Marks the context lost. Resources stay registered; their driver
    /// objects are recreated once the context comes back.
    pub(super) fn handle_context_lost(&mut self) {
        self.context_lost = true;
        log::warn!("graphics context lost");
        self.on_context_lost.notify(&());
    }

    /// Rebuilds every driver object after a restore, in dependency order:
    /// programs, buffers, textures, then vertex arrays. The depth and
    /// stencil switches the application set survive the rebuild.
    pub(super) fn handle_context_restored(&mut self) {
        if self.driver.is_context_lost() {
            return;
        }

        let depth_test = self.depth.depth_test();
        let depth_func = self.depth.depth_func();
        let depth_write = self.depth.depth_mask();
        let stencil_test = self.stencil.test();

        self.caps = Capabilities::probe(&self.driver);
        self.wipe_caches(true);
        self.current_render_target = None;

        self.rebuild_programs();
        self.rebuild_buffers();
        self.rebuild_textures();
        self.rebuild_vertex_arrays();

        self.depth.set_depth_test(depth_test);
        self.depth.set_depth_func(depth_func);
        self.depth.set_depth_mask(depth_write);
        self.stencil.set_test(stencil_test);

        self.context_lost = false;
        self.clock.reset();
        log::warn!("graphics context restored");
        self.on_context_restored.notify(&());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::coords::{Color4, NormalizedRect};
    use crate::device::{CompareFunc, PrimitiveMode, UniformValue};
    use crate::engine::test_support::*;
    use crate::pipeline::{ProgramDescriptor, ShaderSource};
    use crate::resource::{
        ImageData, IndexData, MemoryImageLoader, RenderTargetOptions, TextureOptions, VertexAttribute,
    };

    const IDENTITY: [f32; 16] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];

    #[test]
    fn restored_context_renders_the_same_frame() {
        let mut e = engine();
        let p = e
            .create_program(
                ProgramDescriptor::new(ShaderSource::raw("mesh", VS), ShaderSource::raw("mesh", FS))
                    .attributes(&["position", "uv"])
                    .uniforms(&["world", "tint"])
                    .samplers(&["albedo"]),
            )
            .unwrap();
        let pixels: Vec<u8> = (0..16).collect();
        let tex = e.create_raw_texture(Some(&pixels), 2, 2, TextureOptions::default()).unwrap();
        let vb = e.create_vertex_buffer(&[0f32; 15]).unwrap();
        let ib = e.create_index_buffer(IndexData::Values(&[0, 1, 2]), false).unwrap();
        let attrs = vec![
            VertexAttribute::new("position", vb, 3).with_layout(20, 0),
            VertexAttribute::new("uv", vb, 2).with_layout(20, 12),
        ];

        e.run_render_loop(move |e, _| {
            e.set_viewport(NormalizedRect::FULL, None, None);
            e.enable_program(p).unwrap();
            e.set_uniform(p, "world", UniformValue::Mat4(IDENTITY)).unwrap();
            e.set_uniform(p, "tint", UniformValue::Vec4([1.0, 0.5, 0.5, 1.0])).unwrap();
            e.set_texture(p, "albedo", Some(tex)).unwrap();
            e.bind_buffers(&attrs, Some(ib), Some(p)).unwrap();
            e.clear(Some(Color4::BLACK), true, true, false);
            e.draw_elements(PrimitiveMode::Triangles, 0, 3, 1);
        });

        assert!(e.frame());
        let before = e.driver().last_frame_digest();
        assert!(before.is_some());

        e.driver_mut().lose_context();
        assert!(!e.frame());
        assert!(e.is_context_lost());

        e.driver_mut().restore_context();
        assert!(e.frame());
        assert!(!e.is_context_lost());
        assert_eq!(e.driver().last_frame_digest(), before);
        assert_eq!(e.driver().live_textures(), 1);
        assert_eq!(e.driver().live_buffers(), 2);
        assert_eq!(e.driver().live_programs(), 1);
    }

    #[test]
    fn restore_keeps_depth_settings_and_notifies() {
        let mut e = engine();
        let events = Rc::new(Cell::new(0));
        let (lost, restored) = (events.clone(), events.clone());
        e.on_context_lost.add(move |_, _| lost.set(lost.get() + 1));
        e.on_context_restored.add(move |_, _| restored.set(restored.get() + 10));
        e.set_depth_function(CompareFunc::Greater);
        e.set_depth_write(false);

        e.driver_mut().lose_context();
        e.frame();
        e.frame();
        assert_eq!(events.get(), 1);

        e.driver_mut().restore_context();
        e.frame();
        assert_eq!(events.get(), 11);
        assert_eq!(e.depth_function(), CompareFunc::Greater);
        assert!(!e.depth_write());
    }

    #[test]
    fn render_targets_and_url_textures_come_back() {
        let mut e = engine();
        let mut loader = MemoryImageLoader::new();
        loader.insert("a.png", ImageData::solid(4, 4, [1, 2, 3, 255]));
        e.set_image_loader(loader);
        let url = e.create_texture_from_url("a.png", TextureOptions::default(), None, None).unwrap();
        let rt = e
            .create_render_target_texture(RenderTargetOptions { width: 32, height: 16, ..Default::default() })
            .unwrap();

        e.driver_mut().lose_context();
        e.frame();
        e.driver_mut().restore_context();
        e.frame();

        assert!(e.is_texture_ready(url));
        assert_eq!(e.texture_size(url), Some((4, 4)));
        assert_eq!(e.pending_texture_loads(), 0);
        assert!(e.texture_info(rt).unwrap().is_render_target);
        e.bind_framebuffer(rt, None).unwrap();
        assert_eq!(e.render_width(), 32);
        e.restore_default_framebuffer();
    }
}
