use crate::coords::{NormalizedRect, PixelRect};
use crate::device::GraphicsDriver;

use super::Engine;

impl<D: GraphicsDriver> Engine<D> {
    /// Width of what is currently rendered to: the bound render target, or
    /// the drawing buffer.
    pub fn render_width(&self) -> u32 {
        self.render_size().0
    }

    pub fn render_height(&self) -> u32 {
        self.render_size().1
    }

    fn render_size(&self) -> (u32, u32) {
        self.current_render_target
            .and_then(|h| self.textures.get(h.0))
            .map(|e| (e.width, e.height))
            .unwrap_or_else(|| self.driver.drawing_buffer_size())
    }

    /// Sets the viewport from a normalized rectangle.
    ///
    /// `required_width` / `required_height` override the render size. Returns
    /// `true` when the driver viewport changed.
    pub fn set_viewport(
        &mut self,
        viewport: NormalizedRect,
        required_width: Option<u32>,
        required_height: Option<u32>,
    ) -> bool {
        let width = required_width.unwrap_or_else(|| self.render_width());
        let height = required_height.unwrap_or_else(|| self.render_height());
        let rect = viewport.to_pixels(width, height);
        self.viewport.set(&mut self.driver, rect)
    }

    pub fn current_viewport(&self) -> Option<PixelRect> {
        self.viewport.current()
    }

    pub fn hardware_scaling_level(&self) -> f32 {
        self.options.hardware_scaling_level
    }

    pub fn set_hardware_scaling_level(&mut self, level: f32) {
        self.options.hardware_scaling_level = level;
        self.resize();
    }

    /// Resizes the drawing buffer to the host's client size times the device
    /// pixel ratio, divided by the hardware scaling level.
    ///
    /// Returns `true` when the drawing buffer changed.
    pub fn resize(&mut self) -> bool {
        let (client_w, client_h, ratio) = self.driver.client_size();
        let level = self.options.hardware_scaling_level;
        let level = if level > 0.0 && level.is_finite() { level } else { 1.0 };
        let ratio = if ratio > 0.0 && ratio.is_finite() { ratio } else { 1.0 };

        let width = (client_w as f32 * ratio / level).floor() as u32;
        let height = (client_h as f32 * ratio / level).floor() as u32;
        self.set_size(width.max(1), height.max(1))
    }

    /// Forces the drawing-buffer size. Returns `false` when it already matched.
    pub fn set_size(&mut self, width: u32, height: u32) -> bool {
        if self.driver.drawing_buffer_size() == (width, height) {
            return false;
        }
        self.driver.set_drawing_buffer_size(width, height);
        log::debug!("drawing buffer resized to {}x{}", width, height);
        self.on_resize.notify(&(width, height));
        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::coords::{NormalizedRect, PixelRect};
    use crate::engine::test_support::*;

    #[test]
    fn viewport_is_cached() {
        let mut e = engine();
        assert!(e.set_viewport(NormalizedRect::FULL, None, None));
        assert!(!e.set_viewport(NormalizedRect::FULL, None, None));
        assert_eq!(e.current_viewport(), Some(PixelRect::new(0, 0, 800, 600)));
        assert_eq!(e.driver().count("viewport"), 1);

        assert!(e.set_viewport(NormalizedRect::new(0.5, 0.0, 0.5, 1.0), Some(100), Some(50)));
        assert_eq!(e.current_viewport(), Some(PixelRect::new(50, 0, 50, 50)));
    }

    #[test]
    fn resize_follows_client_size_and_scaling() {
        let mut e = engine();
        let seen = Rc::new(Cell::new((0, 0)));
        let s = seen.clone();
        e.on_resize.add(move |size, _| s.set(*size));

        e.driver_mut().set_client_size(400, 300, 2.0);
        assert!(!e.resize());

        e.driver_mut().set_client_size(500, 400, 1.0);
        assert!(e.resize());
        assert_eq!(seen.get(), (500, 400));

        e.set_hardware_scaling_level(2.0);
        assert_eq!((e.render_width(), e.render_height()), (250, 200));
        assert_eq!(seen.get(), (250, 200));
    }
}
