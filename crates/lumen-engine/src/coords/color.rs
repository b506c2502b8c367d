/// Straight-alpha RGBA color with `f32` components in `[0, 1]`.
///
/// Used for clear colors and blend constants, which the driver consumes as-is.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const TRANSPARENT: Color4 = Color4::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color4 = Color4::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color4 = Color4::new(1.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a color from sRGB bytes (`0..=255`), no linearization.
    #[inline]
    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Quantizes to bytes, clamping out-of-range components.
    pub fn to_u8(self) -> [u8; 4] {
        self.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        assert_eq!(Color4::from_u8(255, 128, 0, 255).to_u8(), [255, 128, 0, 255]);
    }

    #[test]
    fn quantization_clamps() {
        assert_eq!(Color4::new(2.0, -1.0, 0.5, 1.0).to_u8(), [255, 0, 128, 255]);
    }
}
