use super::PixelRect;

/// Viewport rectangle in fractions of the render target (`0..=1`, bottom-left origin).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for NormalizedRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl NormalizedRect {
    /// The whole render target.
    pub const FULL: NormalizedRect = NormalizedRect::new(0.0, 0.0, 1.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Scales to integer pixels for a `target_width` x `target_height` target.
    ///
    /// Origins are floored and sizes rounded, so adjacent split-screen
    /// viewports do not leave gaps.
    pub fn to_pixels(self, target_width: u32, target_height: u32) -> PixelRect {
        let tw = target_width as f32;
        let th = target_height as f32;
        PixelRect::new(
            (self.x * tw).floor() as i32,
            (self.y * th).floor() as i32,
            (self.width * tw).round() as i32,
            (self.height * th).round() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_covers_target() {
        assert_eq!(NormalizedRect::FULL.to_pixels(800, 600), PixelRect::new(0, 0, 800, 600));
    }

    #[test]
    fn split_screen_halves() {
        let left = NormalizedRect::new(0.0, 0.0, 0.5, 1.0).to_pixels(801, 600);
        let right = NormalizedRect::new(0.5, 0.0, 0.5, 1.0).to_pixels(801, 600);
        assert_eq!(left, PixelRect::new(0, 0, 401, 600));
        assert_eq!(right.x, 400);
    }

    #[test]
    fn default_is_full() {
        assert_eq!(NormalizedRect::default(), NormalizedRect::FULL);
    }
}
