use crate::coords::PixelRect;
use crate::device::GraphicsDriver;

/// Last viewport written to the driver.
///
/// Unlike the other trackers the viewport is written eagerly: `set` issues the
/// driver call immediately when the rectangle differs from the cached one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewportCache {
    cached: Option<PixelRect>,
}

impl ViewportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<PixelRect> {
        self.cached
    }

    /// Returns `true` when a driver call was issued.
    pub fn set<D: GraphicsDriver>(&mut self, driver: &mut D, rect: PixelRect) -> bool {
        if self.cached == Some(rect) {
            return false;
        }
        driver.viewport(rect.x, rect.y, rect.width, rect.height);
        self.cached = Some(rect);
        true
    }

    /// Forgets the cached value so the next `set` always reaches the driver.
    pub fn reset(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessConfig, HeadlessDriver};

    #[test]
    fn identical_viewport_is_skipped() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let mut v = ViewportCache::new();
        let r = PixelRect::new(0, 0, 100, 50);
        assert!(v.set(&mut d, r));
        assert!(!v.set(&mut d, r));
        assert_eq!(d.count("viewport"), 1);

        v.reset();
        assert!(v.set(&mut d, r));
        assert_eq!(d.count("viewport"), 2);
    }
}
