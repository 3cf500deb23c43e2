use sift_core::{Descriptor, Keypoint, Octave, DESCRIPTOR_LEN, MAX_ORIENTATIONS};
use std::f64::consts::PI;

/// Orientation histogram bins
const ORIENTATION_BINS: usize = 36;
/// Gaussian window of the orientation histogram, in keypoint scales
const ORIENTATION_WINDOW: f64 = 1.5;
/// Spatial bins per side of the descriptor grid
const NBP: i32 = 4;
/// Orientation bins per spatial bin
const NBO: i32 = 8;
/// Width of one spatial bin, in keypoint scales
const MAGNIF: f64 = 3.0;

/// Gradient magnitude and angle of one octave level
struct GradientPlane {
    magnitude: Vec<f32>,
    angle: Vec<f32>,
}

/// Computes dominant orientations and descriptors on the octave currently
/// held by the scale-space filter.
///
/// Gradients are computed lazily and cached until the octave changes.
#[derive(Default)]
pub struct Describer {
    cached_octave: Option<i32>,
    s_min: i32,
    gradients: Vec<GradientPlane>,
}

impl Describer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget cached gradients; required when the same describer is reused
    /// on a new image.
    pub fn reset(&mut self) {
        self.cached_octave = None;
        self.gradients.clear();
    }

    fn update_gradients(&mut self, octave: &Octave) {
        if self.cached_octave == Some(octave.index) {
            return;
        }
        let (w, h) = (octave.width, octave.height);
        // gradients are needed on the levels where keypoints can live
        let (lo, hi) = (octave.s_min + 1, octave.s_max() - 2);
        self.s_min = lo;
        self.gradients = (lo..=hi).map(|s| gradient(octave.level(s), w, h)).collect();
        self.cached_octave = Some(octave.index);
        log::trace!("gradients cached for octave {}", octave.index);
    }

    fn gradient_at(&self, x: usize, y: usize, s: i32, width: usize) -> (f64, f64) {
        let plane = &self.gradients[(s - self.s_min) as usize];
        let i = y * width + x;
        (plane.magnitude[i] as f64, plane.angle[i] as f64)
    }

    /// Up to four dominant gradient orientations around `kp`, in radians.
    ///
    /// Keypoints outside the octave, or on a level without gradients, have
    /// none.
    pub fn orientations(&mut self, octave: &Octave, kp: &Keypoint) -> Vec<f64> {
        let (w, h) = (octave.width as i32, octave.height as i32);
        let step = octave.step();
        let x = kp.x as f64 / step;
        let y = kp.y as f64 / step;
        let sigma = kp.sigma as f64 / step;
        let (xi, yi, si) = ((x + 0.5) as i32, (y + 0.5) as i32, kp.is);

        if xi < 0 || xi > w - 1 || yi < 0 || yi > h - 1 || si < octave.s_min + 1 || si > octave.s_max() - 2 {
            return Vec::new();
        }
        self.update_gradients(octave);

        let sigmaw = ORIENTATION_WINDOW * sigma;
        let radius = (3.0 * sigmaw).floor().max(1.0) as i32;
        let mut hist = [0.0f64; ORIENTATION_BINS];
        let nbins = ORIENTATION_BINS as f64;

        for ys in (-radius).max(-yi)..=radius.min(h - 1 - yi) {
            for xs in (-radius).max(-xi)..=radius.min(w - 1 - xi) {
                let dx = (xi + xs) as f64 - x;
                let dy = (yi + ys) as f64 - y;
                let r2 = dx * dx + dy * dy;
                if r2 >= (radius * radius) as f64 + 0.6 {
                    continue;
                }
                let weight = (-r2 / (2.0 * sigmaw * sigmaw)).exp();
                let (modulus, angle) = self.gradient_at((xi + xs) as usize, (yi + ys) as usize, si, octave.width);

                let fbin = nbins * angle / (2.0 * PI);
                let bin = (fbin - 0.5).floor();
                let rbin = fbin - bin - 0.5;
                let bin = bin as i32;
                let lo = (bin + ORIENTATION_BINS as i32).rem_euclid(ORIENTATION_BINS as i32) as usize;
                let hi = (bin + 1).rem_euclid(ORIENTATION_BINS as i32) as usize;
                hist[lo] += (1.0 - rbin) * modulus * weight;
                hist[hi] += rbin * modulus * weight;
            }
        }

        for _ in 0..6 {
            let prev = hist;
            for i in 0..ORIENTATION_BINS {
                let left = prev[(i + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
                let right = prev[(i + 1) % ORIENTATION_BINS];
                hist[i] = (left + prev[i] + right) / 3.0;
            }
        }

        let max = hist.iter().cloned().fold(0.0, f64::max);
        let mut angles = Vec::with_capacity(MAX_ORIENTATIONS);
        for i in 0..ORIENTATION_BINS {
            let h0 = hist[i];
            let hm = hist[(i + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
            let hp = hist[(i + 1) % ORIENTATION_BINS];
            if h0 > 0.8 * max && h0 > hm && h0 > hp {
                let di = -0.5 * (hp - hm) / (hp + hm - 2.0 * h0);
                angles.push(2.0 * PI * (i as f64 + di + 0.5) / nbins);
                if angles.len() == MAX_ORIENTATIONS {
                    break;
                }
            }
        }
        angles
    }

    /// 128-element descriptor of `kp` rotated to `angle`.
    ///
    /// The descriptor is L2-normalized, clamped at 0.2 and renormalized.
    /// Keypoints outside the usable range get an all-zero descriptor.
    pub fn descriptor(&mut self, octave: &Octave, kp: &Keypoint, angle: f64) -> Descriptor {
        let mut descr = [0.0f32; DESCRIPTOR_LEN];
        let (w, h) = (octave.width as i32, octave.height as i32);
        let step = octave.step();
        let x = kp.x as f64 / step;
        let y = kp.y as f64 / step;
        let sigma = kp.sigma as f64 / step;
        let (xi, yi, si) = ((x + 0.5) as i32, (y + 0.5) as i32, kp.is);

        if xi < 0 || xi > w - 1 || yi < 0 || yi > h - 1 || si < octave.s_min + 1 || si > octave.s_max() - 2 {
            return descr;
        }
        self.update_gradients(octave);

        let (st0, ct0) = angle.sin_cos();
        let sbp = MAGNIF * sigma;
        let radius = (2f64.sqrt() * sbp * (NBP + 1) as f64 / 2.0 + 0.5).floor() as i32;
        let window = NBP as f64 / 2.0;
        let half = NBP / 2;

        for dyi in (-radius).max(1 - yi)..=radius.min(h - 2 - yi) {
            for dxi in (-radius).max(1 - xi)..=radius.min(w - 2 - xi) {
                let (modulus, grad_angle) =
                    self.gradient_at((xi + dxi) as usize, (yi + dyi) as usize, si, octave.width);
                let theta = (grad_angle - angle).rem_euclid(2.0 * PI);

                let dx = (xi + dxi) as f64 - x;
                let dy = (yi + dyi) as f64 - y;
                let nx = (ct0 * dx + st0 * dy) / sbp;
                let ny = (-st0 * dx + ct0 * dy) / sbp;
                let nt = NBO as f64 * theta / (2.0 * PI);

                let win = (-(nx * nx + ny * ny) / (2.0 * window * window)).exp();

                let binx = (nx - 0.5).floor();
                let biny = (ny - 0.5).floor();
                let bint = nt.floor();
                let rbinx = nx - (binx + 0.5);
                let rbiny = ny - (biny + 0.5);
                let rbint = nt - bint;
                let (binx, biny, bint) = (binx as i32, biny as i32, bint as i32);

                for dbinx in 0..2 {
                    for dbiny in 0..2 {
                        for dbint in 0..2 {
                            let bx = binx + dbinx;
                            let by = biny + dbiny;
                            if bx < -half || bx >= half || by < -half || by >= half {
                                continue;
                            }
                            let bt = (bint + dbint).rem_euclid(NBO);
                            let weight = win
                                * modulus
                                * (1.0 - dbinx as f64 - rbinx).abs()
                                * (1.0 - dbiny as f64 - rbiny).abs()
                                * (1.0 - dbint as f64 - rbint).abs();
                            let idx = ((by + half) * NBP * NBO + (bx + half) * NBO + bt) as usize;
                            descr[idx] += weight as f32;
                        }
                    }
                }
            }
        }

        normalize(&mut descr);
        for v in descr.iter_mut() {
            *v = v.min(0.2);
        }
        normalize(&mut descr);
        descr
    }
}

/// Central differences inside, one-sided differences on the border.
/// Angles are in `[0, 2π)`.
fn gradient(level: &[f32], width: usize, height: usize) -> GradientPlane {
    let mut magnitude = vec![0.0f32; width * height];
    let mut angle = vec![0.0f32; width * height];
    let at = |x: usize, y: usize| level[y * width + x] as f64;

    for y in 0..height {
        for x in 0..width {
            let gx = if width < 2 {
                0.0
            } else if x == 0 {
                at(1, y) - at(0, y)
            } else if x == width - 1 {
                at(x, y) - at(x - 1, y)
            } else {
                0.5 * (at(x + 1, y) - at(x - 1, y))
            };
            let gy = if height < 2 {
                0.0
            } else if y == 0 {
                at(x, 1) - at(x, 0)
            } else if y == height - 1 {
                at(x, y) - at(x, y - 1)
            } else {
                0.5 * (at(x, y + 1) - at(x, y - 1))
            };
            let i = y * width + x;
            magnitude[i] = (gx * gx + gy * gy).sqrt() as f32;
            angle[i] = gy.atan2(gx).rem_euclid(2.0 * PI) as f32;
        }
    }
    GradientPlane { magnitude, angle }
}

fn normalize(descr: &mut Descriptor) {
    let norm = descr.iter().map(|v| v * v).sum::<f32>().sqrt();
    for v in descr.iter_mut() {
        *v /= norm + f32::EPSILON;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::SiftParams;
    use sift_scale::ScaleSpaceFilter;

    fn ramp_octave(w: usize, h: usize) -> Octave {
        // intensity grows along +x on every level
        let plane: Vec<f32> = (0..w * h).map(|i| (i % w) as f32 * 4.0).collect();
        Octave::new(0, w, h, -1, vec![plane; 6])
    }

    fn keypoint_at(x: f32, y: f32, sigma: f32, is: i32) -> Keypoint {
        Keypoint { o: 0, ix: x as i32, iy: y as i32, is, x, y, s: is as f32, sigma }
    }

    #[test]
    fn test_gradient_of_ramp_points_along_x() {
        let g = gradient(&[0.0, 1.0, 2.0, 0.0, 1.0, 2.0], 3, 2);
        assert!(g.magnitude.iter().all(|&m| (m - 1.0).abs() < 1e-6));
        assert!(g.angle.iter().all(|&a| a.abs() < 1e-6));
    }

    #[test]
    fn test_diagonal_ramp_has_single_orientation() {
        let (w, h) = (32, 32);
        let plane: Vec<f32> = (0..w * h).map(|i| ((i % w) + (i / w)) as f32 * 4.0).collect();
        let octave = Octave::new(0, w, h, -1, vec![plane; 6]);
        let mut describer = Describer::new();
        let angles = describer.orientations(&octave, &keypoint_at(16.0, 16.0, 2.0, 1));
        assert_eq!(angles.len(), 1);
        assert!((angles[0] - PI / 4.0).abs() < 2.0 * PI / ORIENTATION_BINS as f64, "angle {}", angles[0]);
    }

    #[test]
    fn test_flat_region_has_no_orientation() {
        let octave = Octave::new(0, 16, 16, -1, vec![vec![9.0; 256]; 6]);
        let mut describer = Describer::new();
        assert!(describer.orientations(&octave, &keypoint_at(8.0, 8.0, 2.0, 0)).is_empty());
    }

    #[test]
    fn test_out_of_range_keypoint() {
        let octave = ramp_octave(16, 16);
        let mut describer = Describer::new();
        let far = keypoint_at(100.0, 8.0, 2.0, 1);
        assert!(describer.orientations(&octave, &far).is_empty());
        assert!(describer.descriptor(&octave, &far, 0.0).iter().all(|&v| v == 0.0));
        // level without gradients
        let bad_level = keypoint_at(8.0, 8.0, 2.0, 3);
        assert!(describer.orientations(&octave, &bad_level).is_empty());
    }

    #[test]
    fn test_descriptor_is_normalized_and_clamped() {
        let octave = ramp_octave(40, 40);
        let mut describer = Describer::new();
        let d = describer.descriptor(&octave, &keypoint_at(20.0, 20.0, 2.0, 1), 0.0);
        let norm: f32 = d.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm {}", norm);
        assert!(d.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // every gradient points along the keypoint's own orientation
        let off_axis: f32 = d.iter().enumerate().filter(|(i, _)| i % 8 != 0 && i % 8 != 1 && i % 8 != 7).map(|(_, v)| v).sum();
        assert!(off_axis < 1e-3, "off-axis energy {}", off_axis);
    }

    #[test]
    fn test_descriptor_of_flat_region_is_zero() {
        let octave = Octave::new(0, 16, 16, -1, vec![vec![3.0; 256]; 6]);
        let mut describer = Describer::new();
        let d = describer.descriptor(&octave, &keypoint_at(8.0, 8.0, 1.5, 1), 0.3);
        assert!(d.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_on_filter_octave() {
        let (w, h) = (48, 48);
        let mut img = vec![0.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let d2 = (x as f32 - 24.0).powi(2) + (y as f32 - 24.0).powi(2);
                img[y * w + x] = 200.0 * (-d2 / 18.0).exp();
            }
        }
        let params = SiftParams { peak_thresh: 0.0, edge_thresh: 10.0, ..SiftParams::default() };
        let mut filter = ScaleSpaceFilter::new(w, h, &params).unwrap();
        let mut describer = Describer::new();
        let mut step = filter.process_first_octave(&img).unwrap();
        while step.is_ready() {
            let keypoints = filter.detect().unwrap().to_vec();
            let octave = filter.octave().unwrap();
            for kp in &keypoints {
                let angles = describer.orientations(octave, kp);
                assert!(angles.len() <= MAX_ORIENTATIONS);
                for a in angles {
                    assert!(a.is_finite());
                    let d = describer.descriptor(octave, kp, a);
                    assert!(d.iter().all(|v| v.is_finite() && *v >= 0.0));
                }
            }
            step = filter.process_next_octave().unwrap();
        }
    }
}
