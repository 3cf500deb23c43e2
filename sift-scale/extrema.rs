use sift_core::{Keypoint, Octave, Plane, ScaleGeometry};
use crate::error::ScaleResult;
use crate::pyramid::ImagePyramid;
use crate::types::Extremum;

/// Maximum number of sub-pixel relocation steps per extremum
const MAX_REFINE_ITERATIONS: usize = 5;

/// Difference-of-Gaussians stack of one octave, levels `s_min..s_max`
pub(crate) struct DogStack {
    width: usize,
    height: usize,
    s_min: i32,
    planes: Vec<Plane>,
}

impl DogStack {
    pub fn new(octave: &Octave) -> ScaleResult<Self> {
        let (w, h) = (octave.width, octave.height);
        let mut planes = Vec::with_capacity((octave.s_max() - octave.s_min) as usize);
        for s in octave.s_min..octave.s_max() {
            let mut dog = ImagePyramid::alloc_plane(w, h)?;
            let (lo, hi) = (octave.level(s), octave.level(s + 1));
            for ((d, &a), &b) in dog.iter_mut().zip(lo).zip(hi) {
                *d = b - a;
            }
            planes.push(dog);
        }
        Ok(Self { width: w, height: h, s_min: octave.s_min, planes })
    }

    #[inline]
    fn at(&self, x: usize, y: usize, s: i32) -> f32 {
        self.planes[(s - self.s_min) as usize][y * self.width + x]
    }

    fn s_max(&self) -> i32 {
        self.s_min + self.planes.len() as i32 - 1
    }

    /// Strict 26-neighbour extrema whose magnitude reaches `threshold`.
    ///
    /// Results are in scan order: level, then row, then column.
    pub fn local_extrema(&self, threshold: f32) -> Vec<Extremum> {
        let mut found = Vec::new();
        if self.width < 3 || self.height < 3 {
            return found;
        }
        for s in self.s_min + 1..self.s_max() {
            for y in 1..self.height - 1 {
                for x in 1..self.width - 1 {
                    let v = self.at(x, y, s);
                    let is_max = v >= threshold && self.neighbours(x, y, s).all(|n| n < v);
                    let is_min = !is_max && v <= -threshold && self.neighbours(x, y, s).all(|n| n > v);
                    if is_max || is_min {
                        found.push(Extremum { x, y, s });
                    }
                }
            }
        }
        found
    }

    fn neighbours(&self, x: usize, y: usize, s: i32) -> impl Iterator<Item = f32> + '_ {
        (-1i32..=1).flat_map(move |ds| {
            (-1isize..=1).flat_map(move |dy| {
                (-1isize..=1).filter_map(move |dx| {
                    if ds == 0 && dy == 0 && dx == 0 {
                        return None;
                    }
                    let xx = (x as isize + dx) as usize;
                    let yy = (y as isize + dy) as usize;
                    Some(self.at(xx, yy, s + ds))
                })
            })
        })
    }

    /// First derivatives and Hessian by central differences at an interior sample
    fn derivatives(&self, x: usize, y: usize, s: i32) -> ([f64; 3], [[f64; 3]; 3]) {
        let at = |dx: isize, dy: isize, ds: i32| {
            self.at((x as isize + dx) as usize, (y as isize + dy) as usize, s + ds) as f64
        };
        let v = at(0, 0, 0);
        let dx = 0.5 * (at(1, 0, 0) - at(-1, 0, 0));
        let dy = 0.5 * (at(0, 1, 0) - at(0, -1, 0));
        let ds = 0.5 * (at(0, 0, 1) - at(0, 0, -1));
        let dxx = at(1, 0, 0) + at(-1, 0, 0) - 2.0 * v;
        let dyy = at(0, 1, 0) + at(0, -1, 0) - 2.0 * v;
        let dss = at(0, 0, 1) + at(0, 0, -1) - 2.0 * v;
        let dxy = 0.25 * (at(1, 1, 0) + at(-1, -1, 0) - at(-1, 1, 0) - at(1, -1, 0));
        let dxs = 0.25 * (at(1, 0, 1) + at(-1, 0, -1) - at(-1, 0, 1) - at(1, 0, -1));
        let dys = 0.25 * (at(0, 1, 1) + at(0, -1, -1) - at(0, -1, 1) - at(0, 1, -1));
        (
            [dx, dy, ds],
            [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]],
        )
    }

    /// Fit a quadratic around the extremum, moving it at most
    /// `MAX_REFINE_ITERATIONS` times, and keep it if it is strong enough and
    /// not on an edge.
    pub fn refine(
        &self,
        extremum: Extremum,
        octave: &Octave,
        geometry: &ScaleGeometry,
        peak_thresh: f64,
        edge_thresh: f64,
    ) -> Option<Keypoint> {
        let (w, h) = (self.width, self.height);
        let Extremum { mut x, mut y, s } = extremum;
        let mut grad = [0.0; 3];
        let mut hess = [[0.0; 3]; 3];
        let mut b = [0.0; 3];

        for _ in 0..MAX_REFINE_ITERATIONS {
            (grad, hess) = self.derivatives(x, y, s);
            b = solve3(hess, [-grad[0], -grad[1], -grad[2]]).unwrap_or([0.0; 3]);

            let mut step_x = 0isize;
            let mut step_y = 0isize;
            if b[0] > 0.6 && x < w - 2 {
                step_x += 1;
            }
            if b[0] < -0.6 && x > 1 {
                step_x -= 1;
            }
            if b[1] > 0.6 && y < h - 2 {
                step_y += 1;
            }
            if b[1] < -0.6 && y > 1 {
                step_y -= 1;
            }
            if step_x == 0 && step_y == 0 {
                break;
            }
            x = (x as isize + step_x) as usize;
            y = (y as isize + step_y) as usize;
        }

        let value = self.at(x, y, s) as f64 + 0.5 * (grad[0] * b[0] + grad[1] * b[1] + grad[2] * b[2]);
        let (dxx, dyy, dxy) = (hess[0][0], hess[1][1], hess[0][1]);
        let score = (dxx + dyy) * (dxx + dyy) / (dxx * dyy - dxy * dxy);

        let xn = x as f64 + b[0];
        let yn = y as f64 + b[1];
        let sn = s as f64 + b[2];

        let accepted = value.abs() >= peak_thresh
            && score < (edge_thresh + 1.0) * (edge_thresh + 1.0) / edge_thresh
            && score >= 0.0
            && b.iter().all(|v| v.abs() < 1.5)
            && xn >= 0.0
            && xn <= (w - 1) as f64
            && yn >= 0.0
            && yn <= (h - 1) as f64
            && sn >= geometry.s_min as f64
            && sn <= geometry.s_max as f64;
        if !accepted {
            return None;
        }

        let step = octave.step();
        Some(Keypoint {
            o: octave.index,
            ix: x as i32,
            iy: y as i32,
            is: s,
            x: (step * xn) as f32,
            y: (step * yn) as f32,
            s: sn as f32,
            sigma: (geometry.sigma_0 * 2f64.powf(sn / geometry.levels as f64) * step) as f32,
        })
    }
}

/// Detect and refine the keypoints of one octave
pub(crate) fn detect_octave(
    octave: &Octave,
    geometry: &ScaleGeometry,
    peak_thresh: f64,
    edge_thresh: f64,
) -> ScaleResult<Vec<Keypoint>> {
    let dog = DogStack::new(octave)?;
    let candidates = dog.local_extrema((0.8 * peak_thresh) as f32);
    log::trace!(
        "octave {}: {} extrema before refinement",
        octave.index,
        candidates.len()
    );
    Ok(candidates
        .into_iter()
        .filter_map(|e| dog.refine(e, octave, geometry, peak_thresh, edge_thresh))
        .collect())
}

/// Gaussian elimination with partial pivoting; `None` when singular
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..3 {
            let f = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
