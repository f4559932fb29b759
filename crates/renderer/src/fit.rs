//! Scaling policy shared by the texture cache and the per-frame uniforms.
//!
//! The content texture is rasterised with a cover-fit: the source image is
//! enlarged (or shrunk) just enough to cover the output, keeping its aspect
//! ratio. The fragment stage then receives the complementary factor that maps
//! the viewport back into normalised texture coordinates, so any overflow is
//! cropped in the composite rather than in the texture.

/// Smallest aspect-preserving size that covers `output`.
///
/// One axis matches the output exactly; the other overflows by whatever the
/// aspect mismatch demands. Both arguments are clamped to at least one pixel.
pub fn cover_fit(output: (u32, u32), image: (u32, u32)) -> (u32, u32) {
    let (out_w, out_h) = (f64::from(output.0.max(1)), f64::from(output.1.max(1)));
    let (img_w, img_h) = (f64::from(image.0.max(1)), f64::from(image.1.max(1)));
    let scale = (out_w / img_w).max(out_h / img_h);
    let width = out_w.max((scale * img_w).round());
    let height = out_h.max((scale * img_h).round());
    (width as u32, height as u32)
}

/// Fraction of the texture visible through a viewport of size `output`.
pub fn input_scale(output: (u32, u32), texture: (u32, u32)) -> [f32; 2] {
    let (out_w, out_h) = (output.0.max(1) as f32, output.1.max(1) as f32);
    let (tex_w, tex_h) = (texture.0.max(1) as f32, texture.1.max(1) as f32);
    let s = (tex_w / out_w).min(tex_h / out_h);
    [s * out_w / tex_w, s * out_h / tex_h]
}

/// Size of one texel in normalised texture coordinates.
pub fn input_step(texture: (u32, u32)) -> [f32; 2] {
    [1.0 / texture.0.max(1) as f32, 1.0 / texture.1.max(1) as f32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_cover_needs_no_margin() {
        assert_eq!(cover_fit((800, 600), (1600, 1200)), (800, 600));
    }

    #[test]
    fn wide_output_overflows_vertically() {
        assert_eq!(cover_fit((1920, 1080), (1024, 768)), (1920, 1440));
    }

    #[test]
    fn tall_output_overflows_horizontally() {
        assert_eq!(cover_fit((600, 1000), (400, 300)), (1333, 1000));
    }

    #[test]
    fn cover_fit_always_covers_and_keeps_aspect() {
        let images = [(1, 1), (3, 7), (640, 480), (1024, 768), (1920, 1080), (97, 1301)];
        for &(img_w, img_h) in &images {
            for out_w in (1..2000).step_by(173) {
                for out_h in (1..2000).step_by(131) {
                    let (w, h) = cover_fit((out_w, out_h), (img_w, img_h));
                    assert!(w >= out_w, "{w} < {out_w} for image {img_w}x{img_h}");
                    assert!(h >= out_h, "{h} < {out_h} for image {img_w}x{img_h}");
                    let lhs = u64::from(w) * u64::from(img_h);
                    let rhs = u64::from(h) * u64::from(img_w);
                    let tolerance = u64::from(img_w.max(img_h));
                    assert!(
                        lhs.abs_diff(rhs) <= tolerance,
                        "aspect drift for {out_w}x{out_h} over {img_w}x{img_h}: {w}x{h}"
                    );
                }
            }
        }
    }

    #[test]
    fn input_scale_is_one_for_exact_cover() {
        assert_eq!(input_scale((800, 600), (800, 600)), [1.0, 1.0]);
    }

    #[test]
    fn input_scale_crops_overflowing_axis() {
        let [x, y] = input_scale((1920, 1080), (1920, 1440));
        assert!((x - 1.0).abs() < 1e-6);
        assert!((y - 0.75).abs() < 1e-6);
    }

    #[test]
    fn input_scale_against_placeholder() {
        let [x, y] = input_scale((800, 600), (1, 1));
        assert!((x - 1.0).abs() < 1e-6);
        assert!((y - 0.75).abs() < 1e-6);
    }

    #[test]
    fn input_step_inverts_size() {
        assert_eq!(input_step((4, 8)), [0.25, 0.125]);
    }
}
