use crate::device::Filter;

/// Texture sampling presets.
///
/// Names read `<min>_<mag>_<mip>`: `LinearNearestMipLinear` minifies
/// linearly, magnifies with nearest and blends between mip levels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum SamplingMode {
    /// Nearest mag, nearest min, linear mip.
    Nearest,
    /// Linear mag/min, nearest mip.
    Bilinear,
    /// Linear mag/min, linear mip.
    #[default]
    Trilinear,
    NearestNearestMipNearest,
    LinearNearestMipNearest,
    LinearNearestMipLinear,
    LinearNearest,
    NearestNearest,
    NearestLinearMipNearest,
    NearestLinearMipLinear,
    NearestLinear,
    LinearLinear,
}

impl SamplingMode {
    /// `(min, mag)` filters for a texture with or without mipmaps.
    pub fn filters(self, has_mipmaps: bool) -> (Filter, Filter) {
        use Filter::*;
        let (min_mip, min_plain, mag) = match self {
            SamplingMode::Nearest => (NearestMipmapLinear, Nearest, Nearest),
            SamplingMode::Bilinear => (LinearMipmapNearest, Linear, Linear),
            SamplingMode::Trilinear => (LinearMipmapLinear, Linear, Linear),
            SamplingMode::NearestNearestMipNearest => (NearestMipmapNearest, Nearest, Nearest),
            SamplingMode::LinearNearestMipNearest => (LinearMipmapNearest, Linear, Nearest),
            SamplingMode::LinearNearestMipLinear => (LinearMipmapLinear, Linear, Nearest),
            SamplingMode::LinearNearest => (Linear, Linear, Nearest),
            SamplingMode::NearestNearest => (Nearest, Nearest, Nearest),
            SamplingMode::NearestLinearMipNearest => (NearestMipmapNearest, Nearest, Linear),
            SamplingMode::NearestLinearMipLinear => (NearestMipmapLinear, Nearest, Linear),
            SamplingMode::NearestLinear => (Nearest, Nearest, Linear),
            SamplingMode::LinearLinear => (Linear, Linear, Linear),
        };
        (if has_mipmaps { min_mip } else { min_plain }, mag)
    }

    /// Anisotropic filtering only makes sense for fully linear modes.
    pub fn allows_anisotropy(self) -> bool {
        matches!(self, SamplingMode::Bilinear | SamplingMode::Trilinear | SamplingMode::LinearLinear)
    }
}

/// Anisotropy level actually written for `requested` under `mode`.
///
/// Forced to 1 for non-linear modes, clamped to the context maximum (zero
/// meaning "unsupported", which also yields 1).
pub fn effective_anisotropy(mode: SamplingMode, requested: u32, max: f32) -> u32 {
    if !mode.allows_anisotropy() || max < 1.0 {
        return 1;
    }
    requested.clamp(1, max as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trilinear_without_mips_drops_mip_filter() {
        assert_eq!(SamplingMode::Trilinear.filters(true), (Filter::LinearMipmapLinear, Filter::Linear));
        assert_eq!(SamplingMode::Trilinear.filters(false), (Filter::Linear, Filter::Linear));
    }

    #[test]
    fn nearest_linear_mix() {
        assert_eq!(SamplingMode::NearestLinear.filters(true), (Filter::Nearest, Filter::Linear));
        assert_eq!(SamplingMode::LinearNearestMipLinear.filters(true), (Filter::LinearMipmapLinear, Filter::Nearest));
    }

    #[test]
    fn anisotropy_rules() {
        assert_eq!(effective_anisotropy(SamplingMode::Nearest, 8, 16.0), 1);
        assert_eq!(effective_anisotropy(SamplingMode::Trilinear, 8, 16.0), 8);
        assert_eq!(effective_anisotropy(SamplingMode::Trilinear, 64, 16.0), 16);
        assert_eq!(effective_anisotropy(SamplingMode::Bilinear, 4, 0.0), 1);
    }
}
