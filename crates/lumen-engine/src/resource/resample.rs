//! Power-of-two rescaling for contexts without NPOT texture support.

pub fn is_pot(value: u32) -> bool {
    value != 0 && value.is_power_of_two()
}

fn floor_pot(value: u32) -> u32 {
    if value == 0 { 0 } else { 1 << (31 - value.leading_zeros()) }
}

/// Nearest power of two to `value` (ties go up), clamped to `max`.
pub fn nearest_pot(value: u32, max: u32) -> u32 {
    if value <= 1 {
        return 1;
    }
    let floor = floor_pot(value);
    let ceil = if floor == value { value } else { floor.saturating_mul(2) };
    let pot = if ceil - value > value - floor { floor } else { ceil };
    pot.min(floor_pot(max.max(1)))
}

/// Bilinear resample of tightly packed 8-bit texels.
///
/// `channels` is the number of bytes per texel. Returns `None` when `src`
/// is too short for the given dimensions.
pub fn resample_bilinear(
    src: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    dst_width: u32,
    dst_height: u32,
) -> Option<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);
    if w == 0 || h == 0 || channels == 0 || src.len() < w * h * channels {
        return None;
    }
    if (w, h) == (dw, dh) {
        return Some(src[..w * h * channels].to_vec());
    }

    let mut out = vec![0u8; dw * dh * channels];
    let sx = w as f32 / dw as f32;
    let sy = h as f32 / dh as f32;

    for y in 0..dh {
        // Sample at texel centers.
        let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (h - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let ty = fy - y0 as f32;

        for x in 0..dw {
            let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (w - 1) as f32);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let tx = fx - x0 as f32;

            for c in 0..channels {
                let p = |xx: usize, yy: usize| src[(yy * w + xx) * channels + c] as f32;
                let top = p(x0, y0) * (1.0 - tx) + p(x1, y0) * tx;
                let bottom = p(x0, y1) * (1.0 - tx) + p(x1, y1) * tx;
                let v = top * (1.0 - ty) + bottom * ty;
                out[(y * dw + x) * channels + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Some(out)
}

/// Reverses row order in place (bottom-up uploads).
pub fn flip_rows(pixels: &mut [u8], width: u32, height: u32, bytes_per_texel: usize) {
    let row = width as usize * bytes_per_texel;
    let h = height as usize;
    if row == 0 || pixels.len() < row * h {
        return;
    }
    for y in 0..h / 2 {
        let (top, bottom) = pixels.split_at_mut((h - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_pot_rounding() {
        assert_eq!(nearest_pot(1, 4096), 1);
        assert_eq!(nearest_pot(100, 4096), 128);
        assert_eq!(nearest_pot(90, 4096), 64);
        assert_eq!(nearest_pot(96, 4096), 128);
        assert_eq!(nearest_pot(256, 4096), 256);
        assert_eq!(nearest_pot(5000, 4096), 4096);
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let src = vec![200u8; 3 * 3 * 4];
        let out = resample_bilinear(&src, 3, 3, 4, 4, 4).unwrap();
        assert_eq!(out.len(), 4 * 4 * 4);
        assert!(out.iter().all(|&b| b == 200));
    }

    #[test]
    fn gradient_is_interpolated() {
        let src = [0u8, 255];
        let out = resample_bilinear(&src, 2, 1, 1, 4, 1).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[3], 255);
        assert!(out[1] > 0 && out[1] < out[2] && out[2] < 255);
    }

    #[test]
    fn flip_swaps_rows() {
        let mut px = vec![1, 1, 2, 2, 3, 3];
        flip_rows(&mut px, 1, 3, 2);
        assert_eq!(px, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(resample_bilinear(&[0, 0], 2, 2, 1, 4, 4).is_none());
    }
}
