use sift_core::Plane;
use crate::error::{ScaleSpaceError, ScaleResult};

/// Resampling and smoothing operations used to build octaves
pub struct ImagePyramid;

impl ImagePyramid {
    /// Allocate a zeroed plane, reporting allocation failure instead of aborting
    pub fn alloc_plane(width: usize, height: usize) -> ScaleResult<Plane> {
        let len = width
            .checked_mul(height)
            .ok_or(ScaleSpaceError::DimensionOverflow { width, height })?;
        let mut plane = Vec::new();
        plane
            .try_reserve_exact(len)
            .map_err(|_| ScaleSpaceError::AllocationFailed {
                bytes: len.saturating_mul(std::mem::size_of::<f32>()),
            })?;
        plane.resize(len, 0.0);
        Ok(plane)
    }

    /// Double the resolution with linear interpolation.
    ///
    /// Odd output samples average their two neighbours; the last row and
    /// column are replicated.
    pub fn upsample(src: &[f32], width: usize, height: usize) -> ScaleResult<Plane> {
        let (w2, h2) = (width * 2, height * 2);
        let mut rows = Self::alloc_plane(w2, height)?;
        for y in 0..height {
            let src_row = &src[y * width..(y + 1) * width];
            let dst_row = &mut rows[y * w2..(y + 1) * w2];
            for x in 0..width {
                let a = src_row[x];
                let b = src_row[(x + 1).min(width - 1)];
                dst_row[2 * x] = a;
                dst_row[2 * x + 1] = 0.5 * (a + b);
            }
        }

        let mut dst = Self::alloc_plane(w2, h2)?;
        for y in 0..height {
            let next = (y + 1).min(height - 1);
            for x in 0..w2 {
                let a = rows[y * w2 + x];
                let b = rows[next * w2 + x];
                dst[2 * y * w2 + x] = a;
                dst[(2 * y + 1) * w2 + x] = 0.5 * (a + b);
            }
        }
        Ok(dst)
    }

    /// Keep every `factor`-th sample in both directions
    pub fn decimate(src: &[f32], width: usize, height: usize, factor: usize) -> ScaleResult<(Plane, usize, usize)> {
        let (dw, dh) = (width / factor, height / factor);
        let mut dst = Self::alloc_plane(dw, dh)?;
        for y in 0..dh {
            let src_row = &src[y * factor * width..];
            for x in 0..dw {
                dst[y * dw + x] = src_row[x * factor];
            }
        }
        Ok((dst, dw, dh))
    }

    /// Separable Gaussian smoothing of `src` into `dst`.
    ///
    /// Borders are extended by continuity. A non-positive `sigma` copies.
    pub fn smooth(src: &[f32], dst: &mut [f32], width: usize, height: usize, sigma: f64) -> ScaleResult<()> {
        if sigma <= 0.0 {
            dst.copy_from_slice(src);
            return Ok(());
        }
        let kernel = gaussian_kernel(sigma);
        let radius = (kernel.len() / 2) as isize;
        let mut temp = Self::alloc_plane(width, height)?;

        for y in 0..height {
            let row = &src[y * width..(y + 1) * width];
            for x in 0..width {
                let mut acc = 0.0f32;
                for (k, &tap) in kernel.iter().enumerate() {
                    let xx = (x as isize + k as isize - radius).clamp(0, width as isize - 1) as usize;
                    acc += tap * row[xx];
                }
                temp[y * width + x] = acc;
            }
        }

        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0f32;
                for (k, &tap) in kernel.iter().enumerate() {
                    let yy = (y as isize + k as isize - radius).clamp(0, height as isize - 1) as usize;
                    acc += tap * temp[yy * width + x];
                }
                dst[y * width + x] = acc;
            }
        }
        Ok(())
    }
}

/// Normalized taps, half-width `ceil(4 sigma)`
fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (4.0 * sigma).ceil().max(1.0) as usize;
    let mut taps: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = (i as f64 - radius as f64) / sigma;
            (-0.5 * d * d).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps.into_iter().map(|t| t as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_upsample_doubles_and_interpolates() {
        let src = vec![0.0, 2.0, 4.0, 6.0];
        let dst = ImagePyramid::upsample(&src, 2, 2).unwrap();
        assert_eq!(dst.len(), 16);
        // first row: 0, 1, 2, 2
        assert_eq!(&dst[0..4], &[0.0, 1.0, 2.0, 2.0]);
        // interpolated second row halfway to 4, 5, 6, 6
        assert_eq!(&dst[4..8], &[2.0, 3.0, 4.0, 4.0]);
        // replicated last row
        assert_eq!(&dst[8..12], &dst[12..16]);
    }

    #[test]
    fn test_decimate() {
        let src: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let (dst, w, h) = ImagePyramid::decimate(&src, 4, 4, 2).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(dst, vec![0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn test_decimate_odd_size_floors() {
        let src = vec![1.0; 5 * 3];
        let (_, w, h) = ImagePyramid::decimate(&src, 5, 3, 2).unwrap();
        assert_eq!((w, h), (2, 1));
    }

    #[test]
    fn test_smooth_keeps_constant_image_flat() {
        let src = vec![100.0f32; 9 * 7];
        let mut dst = vec![0.0f32; 9 * 7];
        ImagePyramid::smooth(&src, &mut dst, 9, 7, 1.6).unwrap();
        let first = dst[0];
        assert!(dst.iter().all(|&v| v == first));
        assert!((first - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_smooth_preserves_mass_of_centered_impulse() {
        let (w, h) = (21, 21);
        let mut src = vec![0.0f32; w * h];
        src[10 * w + 10] = 1.0;
        let mut dst = vec![0.0f32; w * h];
        ImagePyramid::smooth(&src, &mut dst, w, h, 1.0).unwrap();
        let total: f32 = dst.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(dst[10 * w + 10] > dst[10 * w + 11]);
    }

    #[test]
    fn test_zero_sigma_copies() {
        let src = vec![1.0, 2.0, 3.0];
        let mut dst = vec![0.0; 3];
        ImagePyramid::smooth(&src, &mut dst, 3, 1, 0.0).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_kernel_is_normalized() {
        let k = gaussian_kernel(2.0);
        assert_eq!(k.len(), 17);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_upsample_then_decimate_is_identity(w in 1usize..10, h in 1usize..10, seed in any::<u32>()) {
            let src: Vec<f32> = (0..w * h)
                .map(|i| ((seed as usize ^ i.wrapping_mul(2_654_435_761)) % 256) as f32)
                .collect();
            let up = ImagePyramid::upsample(&src, w, h).unwrap();
            let (down, dw, dh) = ImagePyramid::decimate(&up, 2 * w, 2 * h, 2).unwrap();
            prop_assert_eq!((dw, dh), (w, h));
            prop_assert_eq!(down, src);
        }

        #[test]
        fn prop_smoothing_stays_within_input_range(w in 1usize..12, h in 1usize..12, sigma in 0.3f64..3.0, seed in any::<u32>()) {
            let src: Vec<f32> = (0..w * h)
                .map(|i| ((seed as usize ^ i.wrapping_mul(40_503)) % 256) as f32)
                .collect();
            let mut dst = vec![0.0f32; w * h];
            ImagePyramid::smooth(&src, &mut dst, w, h, sigma).unwrap();
            let lo = src.iter().cloned().fold(f32::INFINITY, f32::min);
            let hi = src.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            prop_assert!(dst.iter().all(|&v| v >= lo - 0.01 && v <= hi + 0.01));
        }
    }
}
