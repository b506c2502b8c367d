use crate::coords::Color4;
use crate::device::{BlendEquation, BlendFactor, Capability, GraphicsDriver};

/// Named blend configurations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Disable,
    Add,
    Combine,
    Subtract,
    Multiply,
    Maximized,
    OneOne,
    Premultiplied,
    PremultipliedPorterDuff,
    Interpolate,
    Screen,
}

impl AlphaMode {
    /// `(src_rgb, dst_rgb, src_alpha, dst_alpha)`, or `None` when blending is off.
    pub fn blend_factors(self) -> Option<[BlendFactor; 4]> {
        use BlendFactor::*;
        Some(match self {
            AlphaMode::Disable => return None,
            AlphaMode::Add => [SrcAlpha, One, Zero, One],
            AlphaMode::Combine => [SrcAlpha, OneMinusSrcAlpha, One, One],
            AlphaMode::Subtract => [Zero, OneMinusSrcColor, One, One],
            AlphaMode::Multiply => [DstColor, Zero, One, One],
            AlphaMode::Maximized => [SrcAlpha, OneMinusSrcColor, One, One],
            AlphaMode::OneOne => [One, One, Zero, One],
            AlphaMode::Premultiplied => [One, OneMinusSrcAlpha, One, One],
            AlphaMode::PremultipliedPorterDuff => [One, OneMinusSrcAlpha, One, OneMinusSrcAlpha],
            AlphaMode::Interpolate => [ConstantColor, OneMinusConstantColor, ConstantAlpha, OneMinusConstantAlpha],
            AlphaMode::Screen => [One, OneMinusSrcColor, One, OneMinusSrcAlpha],
        })
    }
}

/// Blend toggle, factors, equations and constant color.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaState {
    blend: bool,
    factors: [BlendFactor; 4],
    equations: [BlendEquation; 2],
    constants: Color4,

    blend_dirty: bool,
    factors_dirty: bool,
    equations_dirty: bool,
    constants_dirty: bool,
}

impl Default for AlphaState {
    fn default() -> Self {
        Self {
            blend: false,
            factors: [BlendFactor::One, BlendFactor::Zero, BlendFactor::One, BlendFactor::Zero],
            equations: [BlendEquation::Add, BlendEquation::Add],
            constants: Color4::TRANSPARENT,
            blend_dirty: true,
            factors_dirty: true,
            equations_dirty: true,
            constants_dirty: true,
        }
    }
}

impl AlphaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_dirty(&self) -> bool {
        self.blend_dirty || self.factors_dirty || self.equations_dirty || self.constants_dirty
    }

    pub fn blend(&self) -> bool {
        self.blend
    }

    pub fn set_blend(&mut self, enabled: bool) {
        if self.blend != enabled {
            self.blend = enabled;
            self.blend_dirty = true;
        }
    }

    pub fn factors(&self) -> [BlendFactor; 4] {
        self.factors
    }

    pub fn set_factors(&mut self, factors: [BlendFactor; 4]) {
        if self.factors != factors {
            self.factors = factors;
            self.factors_dirty = true;
        }
    }

    pub fn equations(&self) -> [BlendEquation; 2] {
        self.equations
    }

    pub fn set_equations(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        if self.equations != [rgb, alpha] {
            self.equations = [rgb, alpha];
            self.equations_dirty = true;
        }
    }

    pub fn constants(&self) -> Color4 {
        self.constants
    }

    pub fn set_constants(&mut self, color: Color4) {
        if self.constants != color {
            self.constants = color;
            self.constants_dirty = true;
        }
    }

    /// Applies a preset: toggles blending and sets its factors.
    pub fn set_mode(&mut self, mode: AlphaMode) {
        match mode.blend_factors() {
            Some(factors) => {
                self.set_factors(factors);
                self.set_blend(true);
            }
            None => self.set_blend(false),
        }
    }

    pub fn apply<D: GraphicsDriver>(&mut self, driver: &mut D) {
        if !self.is_dirty() {
            return;
        }

        if self.blend_dirty {
            driver.set_capability(Capability::Blend, self.blend);
            self.blend_dirty = false;
        }

        if self.factors_dirty {
            let [src_rgb, dst_rgb, src_a, dst_a] = self.factors;
            driver.blend_func_separate(src_rgb, dst_rgb, src_a, dst_a);
            self.factors_dirty = false;
        }

        if self.equations_dirty {
            driver.blend_equation_separate(self.equations[0], self.equations[1]);
            self.equations_dirty = false;
        }

        if self.constants_dirty {
            driver.blend_color(self.constants);
            self.constants_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessConfig, HeadlessDriver};

    #[test]
    fn mode_switch_writes_factors_once() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let mut s = AlphaState::new();
        s.apply(&mut d);
        d.clear_calls();

        s.set_mode(AlphaMode::Combine);
        s.set_mode(AlphaMode::Combine);
        s.apply(&mut d);
        assert_eq!(d.count("set_capability"), 1);
        assert_eq!(d.count("blend_func_separate"), 1);
        assert_eq!(d.count("blend_equation_separate"), 0);
    }

    #[test]
    fn disable_keeps_factors() {
        let mut s = AlphaState::new();
        s.set_mode(AlphaMode::Add);
        s.set_mode(AlphaMode::Disable);
        assert!(!s.blend());
        assert_eq!(s.factors(), AlphaMode::Add.blend_factors().unwrap());
    }

    #[test]
    fn interpolate_uses_constants() {
        let f = AlphaMode::Interpolate.blend_factors().unwrap();
        assert_eq!(f[0], BlendFactor::ConstantColor);
        assert_eq!(f[3], BlendFactor::OneMinusConstantAlpha);
    }
}
