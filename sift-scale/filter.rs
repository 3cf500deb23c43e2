use sift_core::{Keypoint, Octave, Plane, ScaleGeometry, SiftParams};
use crate::error::{ScaleSpaceError, ScaleResult};
use crate::extrema;
use crate::pyramid::ImagePyramid;
use crate::types::OctaveStep;

/// Smallest octave side on which extrema can still be located
pub const MIN_OCTAVE_SIZE: usize = 3;

/// Gaussian scale-space filter walking one image octave by octave.
///
/// The filter holds a single octave at a time: `process_first_octave`
/// builds the first one from the input samples and every call to
/// `process_next_octave` replaces it with the next, coarser one.
#[derive(Debug, Clone)]
pub struct ScaleSpaceFilter {
    params: SiftParams,
    geometry: ScaleGeometry,
    width: usize,
    height: usize,
    octave: Option<Octave>,
    keypoints: Vec<Keypoint>,
}

impl ScaleSpaceFilter {
    pub fn new(width: usize, height: usize, params: &SiftParams) -> ScaleResult<Self> {
        params.validate()?;
        width
            .checked_mul(height)
            .ok_or(ScaleSpaceError::DimensionOverflow { width, height })?;
        let geometry = ScaleGeometry::new(params, width, height);
        log::debug!(
            "scale space for {}x{}: {} octaves from {}, {} levels",
            width,
            height,
            geometry.octaves,
            geometry.first_octave,
            geometry.levels
        );
        Ok(Self {
            params: params.clone(),
            geometry,
            width,
            height,
            octave: None,
            keypoints: Vec::new(),
        })
    }

    /// Build the first octave from row-major input samples
    pub fn process_first_octave(&mut self, image: &[f32]) -> ScaleResult<OctaveStep> {
        let expected_len = self.width * self.height;
        if image.len() != expected_len {
            return Err(ScaleSpaceError::InvalidImageData {
                expected_len,
                actual_len: image.len(),
            });
        }
        self.octave = None;
        self.keypoints.clear();
        if self.geometry.octaves <= 0 || self.width == 0 || self.height == 0 {
            return Ok(OctaveStep::Exhausted);
        }

        let o_min = self.geometry.first_octave;
        let (base, w, h) = if o_min < 0 {
            let (mut base, mut w, mut h) = (image.to_vec(), self.width, self.height);
            for _ in 0..-o_min {
                let (w2, h2) = w
                    .checked_mul(2)
                    .zip(h.checked_mul(2))
                    .ok_or(ScaleSpaceError::DimensionOverflow { width: w, height: h })?;
                base = ImagePyramid::upsample(&base, w, h)?;
                w = w2;
                h = h2;
            }
            (base, w, h)
        } else if o_min > 0 {
            // a factor beyond the address width leaves nothing to sample
            let Some(factor) = 1usize.checked_shl(o_min as u32) else {
                log::debug!("first octave {} decimates the image away", o_min);
                return Ok(OctaveStep::Exhausted);
            };
            ImagePyramid::decimate(image, self.width, self.height, factor)?
        } else {
            (image.to_vec(), self.width, self.height)
        };
        if w < MIN_OCTAVE_SIZE || h < MIN_OCTAVE_SIZE {
            log::debug!("first octave {}x{} is too small", w, h);
            return Ok(OctaveStep::Exhausted);
        }

        let g = &self.geometry;
        let sa = g.sigma_0 * g.sigma_k.powi(g.s_min);
        let sb = g.sigma_n * 2f64.powi(-o_min);
        let octave = self.build_octave(o_min, base, w, h, sa, sb)?;
        self.octave = Some(octave);
        Ok(OctaveStep::Ready)
    }

    /// Replace the current octave with the next coarser one
    pub fn process_next_octave(&mut self) -> ScaleResult<OctaveStep> {
        let Some(prev) = self.octave.as_ref() else {
            return Ok(OctaveStep::Exhausted);
        };
        if prev.index >= self.geometry.last_octave() {
            return Ok(OctaveStep::Exhausted);
        }
        let g = self.geometry;
        let s_best = (g.s_min + g.levels).min(g.s_max);
        let (base, w, h) = ImagePyramid::decimate(prev.level(s_best), prev.width, prev.height, 2)?;
        if w < MIN_OCTAVE_SIZE || h < MIN_OCTAVE_SIZE {
            log::debug!("octave {} would be {}x{}, stopping", prev.index + 1, w, h);
            return Ok(OctaveStep::Exhausted);
        }
        let index = prev.index + 1;
        let sa = g.sigma_0 * g.sigma_k.powi(g.s_min);
        let sb = g.sigma_0 * g.sigma_k.powi(s_best - g.levels);

        self.keypoints.clear();
        let octave = self.build_octave(index, base, w, h, sa, sb)?;
        self.octave = Some(octave);
        Ok(OctaveStep::Ready)
    }

    /// Smooth `base` (at scale `sb`) to level `s_min` (scale `sa`) and derive
    /// the remaining levels incrementally.
    fn build_octave(&self, index: i32, base: Plane, w: usize, h: usize, sa: f64, sb: f64) -> ScaleResult<Octave> {
        let g = &self.geometry;
        let mut planes: Vec<Plane> = Vec::with_capacity(g.planes_per_octave());

        let mut first = ImagePyramid::alloc_plane(w, h)?;
        if sa > sb {
            ImagePyramid::smooth(&base, &mut first, w, h, (sa * sa - sb * sb).sqrt())?;
        } else {
            first.copy_from_slice(&base);
        }
        planes.push(first);

        for s in g.s_min + 1..=g.s_max {
            let sd = g.dsigma_0 * g.sigma_k.powi(s);
            let mut next = ImagePyramid::alloc_plane(w, h)?;
            let prev = planes.last().map(Vec::as_slice).unwrap_or(&[]);
            ImagePyramid::smooth(prev, &mut next, w, h, sd)?;
            planes.push(next);
        }
        log::debug!("octave {}: {}x{}", index, w, h);
        Ok(Octave::new(index, w, h, g.s_min, planes))
    }

    /// Run extrema detection on the current octave
    pub fn detect(&mut self) -> ScaleResult<&[Keypoint]> {
        self.keypoints = match &self.octave {
            Some(octave) => extrema::detect_octave(
                octave,
                &self.geometry,
                self.params.peak_thresh,
                self.params.edge_thresh,
            )?,
            None => Vec::new(),
        };
        Ok(&self.keypoints)
    }

    /// Keypoints found by the last call to `detect`
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Map a frame given in input-image coordinates to the octave and level
    /// where it would have been detected.
    pub fn keypoint_from_frame(&self, x: f64, y: f64, sigma: f64) -> Keypoint {
        let g = &self.geometry;
        let phi = ((sigma + f64::EPSILON) / g.sigma_0).log2();
        let o = (phi - (g.s_min as f64 + 0.5) / g.levels as f64).floor() as i32;
        let o = o.min(g.last_octave()).max(g.first_octave);
        let s = g.levels as f64 * (phi - o as f64);
        let step = 2f64.powi(o);
        Keypoint {
            o,
            ix: (x / step + 0.5) as i32,
            iy: (y / step + 0.5) as i32,
            is: (s + 0.5) as i32,
            x: x as f32,
            y: y as f32,
            s: s as f32,
            sigma: sigma as f32,
        }
    }

    pub fn octave(&self) -> Option<&Octave> {
        self.octave.as_ref()
    }

    pub fn geometry(&self) -> &ScaleGeometry {
        &self.geometry
    }

    pub fn params(&self) -> &SiftParams {
        &self.params
    }

    /// Input image dimensions
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_image(w: usize, h: usize, cx: f32, cy: f32, radius: f32) -> Vec<f32> {
        let mut img = vec![20.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                img[y * w + x] += 200.0 * (-d2 / (2.0 * radius * radius)).exp();
            }
        }
        img
    }

    fn sensitive_params() -> SiftParams {
        SiftParams {
            peak_thresh: 0.0,
            edge_thresh: 10.0,
            ..SiftParams::default()
        }
    }

    #[test]
    fn test_rejects_wrong_buffer_length() {
        let mut filter = ScaleSpaceFilter::new(8, 8, &SiftParams::default()).unwrap();
        let result = filter.process_first_octave(&[0.0; 10]);
        assert!(matches!(
            result,
            Err(ScaleSpaceError::InvalidImageData { expected_len: 64, actual_len: 10 })
        ));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let params = SiftParams { levels: 0, ..SiftParams::default() };
        assert!(matches!(
            ScaleSpaceFilter::new(8, 8, &params),
            Err(ScaleSpaceError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_octave_walk_sizes() {
        let mut filter = ScaleSpaceFilter::new(32, 32, &SiftParams::default()).unwrap();
        let img = vec![0.0; 32 * 32];
        let mut sizes = Vec::new();
        let mut step = filter.process_first_octave(&img).unwrap();
        while step.is_ready() {
            let octave = filter.octave().unwrap();
            sizes.push((octave.index, octave.width, octave.height));
            step = filter.process_next_octave().unwrap();
        }
        assert_eq!(sizes, vec![(-1, 64, 64), (0, 32, 32), (1, 16, 16)]);
    }

    #[test]
    fn test_tiny_image_has_no_octave() {
        let params = SiftParams { first_octave: 0, ..SiftParams::default() };
        let mut filter = ScaleSpaceFilter::new(2, 2, &params).unwrap();
        let step = filter.process_first_octave(&[1.0; 4]).unwrap();
        assert_eq!(step, OctaveStep::Exhausted);
        assert!(filter.octave().is_none());
        assert_eq!(filter.process_next_octave().unwrap(), OctaveStep::Exhausted);
    }

    #[test]
    fn test_out_of_range_params_are_rejected() {
        for params in [
            SiftParams { first_octave: 64, ..SiftParams::default() },
            SiftParams { first_octave: i32::MIN, ..SiftParams::default() },
            SiftParams { levels: 3_000_000_000, ..SiftParams::default() },
            SiftParams { first_octave: 1, octaves: Some(i32::MAX as u32), ..SiftParams::default() },
        ] {
            assert!(matches!(
                ScaleSpaceFilter::new(16, 16, &params),
                Err(ScaleSpaceError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn test_large_first_octave_exhausts_small_image() {
        let params = SiftParams { first_octave: 31, ..SiftParams::default() };
        let mut filter = ScaleSpaceFilter::new(16, 16, &params).unwrap();
        assert_eq!(filter.process_first_octave(&[1.0; 256]).unwrap(), OctaveStep::Exhausted);
    }

    #[test]
    fn test_zero_octaves_requested() {
        let params = SiftParams { octaves: Some(0), ..SiftParams::default() };
        let mut filter = ScaleSpaceFilter::new(16, 16, &params).unwrap();
        assert_eq!(filter.process_first_octave(&vec![0.0; 256]).unwrap(), OctaveStep::Exhausted);
    }

    #[test]
    fn test_flat_image_yields_no_keypoints() {
        let mut filter = ScaleSpaceFilter::new(16, 16, &sensitive_params()).unwrap();
        let img = vec![128.0; 16 * 16];
        let mut step = filter.process_first_octave(&img).unwrap();
        while step.is_ready() {
            assert!(filter.detect().unwrap().is_empty());
            step = filter.process_next_octave().unwrap();
        }
    }

    #[test]
    fn test_blob_is_detected() {
        let (w, h) = (64, 64);
        let img = blob_image(w, h, 32.0, 32.0, 4.0);
        let mut filter = ScaleSpaceFilter::new(w, h, &sensitive_params()).unwrap();
        let mut all = Vec::new();
        let mut step = filter.process_first_octave(&img).unwrap();
        while step.is_ready() {
            all.extend_from_slice(filter.detect().unwrap());
            step = filter.process_next_octave().unwrap();
        }
        assert!(!all.is_empty());
        for kp in &all {
            assert!(kp.x.is_finite() && kp.y.is_finite() && kp.sigma > 0.0);
            assert!(kp.x >= 0.0 && kp.x <= w as f32);
            assert!(kp.y >= 0.0 && kp.y <= h as f32);
        }
    }

    #[test]
    fn test_keypoint_from_frame_roundtrips_octave() {
        let filter = ScaleSpaceFilter::new(64, 64, &SiftParams::default()).unwrap();
        let g = *filter.geometry();
        // a frame at the nominal scale of octave 0, level 1
        let sigma = g.sigma_0 * 2f64.powf(1.0 / g.levels as f64);
        let kp = filter.keypoint_from_frame(10.0, 20.0, sigma);
        assert_eq!(kp.o, 0);
        assert_eq!(kp.is, 1);
        assert_eq!((kp.ix, kp.iy), (10, 20));
        assert_eq!(kp.sigma as f64, sigma as f32 as f64);
    }

    #[test]
    fn test_keypoint_from_frame_clamps_octave() {
        let filter = ScaleSpaceFilter::new(64, 64, &SiftParams::default()).unwrap();
        let small = filter.keypoint_from_frame(0.0, 0.0, 0.01);
        assert_eq!(small.o, filter.geometry().first_octave);
        let large = filter.keypoint_from_frame(0.0, 0.0, 1.0e6);
        assert_eq!(large.o, filter.geometry().last_octave());
    }
}
