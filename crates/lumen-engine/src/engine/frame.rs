use crate::coords::Color4;
use crate::device::{GraphicsDriver, PrimitiveMode};
use crate::time::FrameTime;

use super::Engine;

/// Repeating per-frame callback registered with [`Engine::run_render_loop`].
pub type RenderCallback<D> = Box<dyn FnMut(&mut Engine<D>, &FrameTime)>;

impl<D: GraphicsDriver> Engine<D> {
    // ── Render loop ───────────────────────────────────────────────────────

    /// Registers a callback run once per [`frame`](Self::frame).
    pub fn run_render_loop(&mut self, callback: impl FnMut(&mut Engine<D>, &FrameTime) + 'static) {
        self.render_loop.push(Box::new(callback));
    }

    /// Drops every registered callback, including the one currently running.
    pub fn stop_render_loop(&mut self) {
        self.render_loop.clear();
        self.render_loop_stopped = true;
    }

    pub fn has_render_loop(&self) -> bool {
        !self.render_loop.is_empty()
    }

    /// The host's animation-frame entry point.
    ///
    /// Detects context loss and restore, polls pending compilations and
    /// texture loads, then runs `begin_frame`, the render-loop callbacks and
    /// `end_frame`. Returns `true` when a frame was rendered.
    pub fn frame(&mut self) -> bool {
        if self.driver.is_context_lost() {
            if !self.context_lost {
                self.handle_context_lost();
            }
            return false;
        }
        if self.context_lost {
            self.handle_context_restored();
        }

        self.poll_programs();
        self.poll_texture_loads();

        if self.render_loop.is_empty() {
            return false;
        }

        let time = self.begin_frame();

        self.render_loop_stopped = false;
        let mut callbacks = std::mem::take(&mut self.render_loop);
        for callback in callbacks.iter_mut() {
            callback(self, &time);
            if self.render_loop_stopped {
                break;
            }
        }
        if !self.render_loop_stopped {
            // callbacks registered while running go after the existing ones
            callbacks.append(&mut self.render_loop);
            self.render_loop = callbacks;
        }

        self.end_frame();
        true
    }

    // ── Frame boundaries ──────────────────────────────────────────────────

    pub fn begin_frame(&mut self) -> FrameTime {
        let time = self.clock.tick();
        self.frame_time = Some(time);
        self.driver.begin_frame();
        self.on_begin_frame.notify(&time);
        time
    }

    pub fn end_frame(&mut self) {
        self.driver.end_frame();
        if let Some(time) = self.frame_time {
            self.on_end_frame.notify(&time);
        }
    }

    /// Seconds since the previous frame, zero before the first one.
    pub fn delta_time(&self) -> f32 {
        self.frame_time.map_or(0.0, |t| t.dt)
    }

    pub fn fps(&self) -> f32 {
        self.clock.fps()
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count()
    }

    // ── Draw submission ───────────────────────────────────────────────────

    /// Flushes every dirty state tracker to the driver.
    pub fn apply_states(&mut self) {
        self.depth.apply(&mut self.driver);
        self.stencil.apply(&mut self.driver);
        self.alpha.apply(&mut self.driver);
        if self.color_write_dirty {
            let w = self.color_write;
            self.driver.color_mask(w, w, w, w);
            self.color_write_dirty = false;
        }
    }

    /// Draws `index_count` indices of the bound index buffer starting at
    /// element `index_start`.
    pub fn draw_elements(&mut self, mode: PrimitiveMode, index_start: u32, index_count: u32, instances: u32) {
        self.apply_states();
        let index_type = self.current_index_type.unwrap_or_default();
        let offset = index_start as usize * index_type.size_bytes();
        let instances = self.instance_count(instances);
        self.driver.draw_elements(mode, index_count, index_type, offset, instances);
    }

    pub fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32) {
        self.apply_states();
        let instances = self.instance_count(instances);
        self.driver.draw_arrays(mode, first, count, instances);
    }

    fn instance_count(&self, requested: u32) -> u32 {
        if requested > 1 && !self.caps.instanced_arrays {
            log::warn!("instanced drawing is not supported, drawing a single instance");
            return 1;
        }
        requested.max(1)
    }

    /// Clears the bound framebuffer. Depth clears to 1.0, stencil to 0.
    pub fn clear(&mut self, color: Option<Color4>, back_buffer: bool, depth: bool, stencil: bool) {
        self.apply_states();
        let color = if back_buffer { Some(color.unwrap_or(Color4::TRANSPARENT)) } else { None };
        self.driver.clear(color, depth.then_some(1.0), stencil.then_some(0));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::device::{CompareFunc, PrimitiveMode};
    use crate::engine::test_support::*;

    #[test]
    fn frame_without_callbacks_renders_nothing() {
        let mut e = engine();
        assert!(!e.frame());
        assert_eq!(e.frame_count(), 0);
    }

    #[test]
    fn render_loop_runs_each_frame_until_stopped() {
        let mut e = engine();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        e.run_render_loop(move |engine, _| {
            r.set(r.get() + 1);
            if r.get() == 3 {
                engine.stop_render_loop();
            }
        });
        for _ in 0..5 {
            e.frame();
        }
        assert_eq!(runs.get(), 3);
        assert!(!e.has_render_loop());
    }

    #[test]
    fn frame_observables_fire_in_order() {
        let mut e = engine();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());
        e.on_begin_frame.add(move |_, _| a.borrow_mut().push("begin"));
        e.on_end_frame.add(move |_, _| b.borrow_mut().push("end"));
        let c = order.clone();
        e.run_render_loop(move |_, _| c.borrow_mut().push("render"));
        e.frame();
        assert_eq!(*order.borrow(), vec!["begin", "render", "end"]);
    }

    #[test]
    fn unchanged_state_is_not_rewritten() {
        let mut e = engine();
        e.apply_states();
        e.driver_mut().clear_calls();

        e.set_depth_function(CompareFunc::LessEqual);
        e.set_depth_buffer(true);
        e.draw_arrays(PrimitiveMode::Triangles, 0, 3, 1);
        assert_eq!(e.driver().count("depth_func"), 0);
        assert_eq!(e.driver().count("set_capability"), 0);

        e.set_depth_function(CompareFunc::Greater);
        e.draw_arrays(PrimitiveMode::Triangles, 0, 3, 1);
        e.draw_arrays(PrimitiveMode::Triangles, 0, 3, 1);
        assert_eq!(e.driver().count("depth_func"), 1);
    }

    #[test]
    fn draw_elements_offsets_by_index_size() {
        let mut e = engine();
        let ib = e.create_index_buffer(crate::resource::IndexData::Values(&[0, 70000, 2]), false).unwrap();
        e.bind_buffers(&[], Some(ib), None).unwrap();
        e.draw_elements(PrimitiveMode::Triangles, 1, 2, 1);
        let last = e.driver().calls().last().unwrap().clone();
        assert_eq!(last.name, "draw_elements");
        assert_eq!(last.args, "Triangles 2 U32 +4 x1");
    }
}
