mod params;

pub use params::{ParamsError, SiftParams, MAX_LEVELS, MAX_OCTAVES, MIN_FIRST_OCTAVE};

/// 4x4 spatial bins times 8 orientation bins
pub const DESCRIPTOR_LEN: usize = 128;

/// Upper bound on dominant orientations reported for one keypoint
pub const MAX_ORIENTATIONS: usize = 4;

/// Orientation-normalized gradient histogram of a keypoint
pub type Descriptor = [f32; DESCRIPTOR_LEN];

/// Row-major float plane of one scale-space level
pub type Plane = Vec<f32>;

/// Scale-space keypoint.
///
/// `x`, `y` and `sigma` are expressed in input-image pixels; `ix`, `iy` and
/// `is` are the integer coordinates of the extremum inside octave `o`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub o: i32,
    pub ix: i32,
    pub iy: i32,
    pub is: i32,
    pub x: f32,
    pub y: f32,
    pub s: f32,
    pub sigma: f32,
}

/// Sampling constants shared by the detector and the descriptor stages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleGeometry {
    /// Levels per octave (S)
    pub levels: i32,
    /// Index of the first level stored per octave
    pub s_min: i32,
    /// Index of the last level stored per octave
    pub s_max: i32,
    pub first_octave: i32,
    /// Number of octaves, already resolved from the image size when automatic
    pub octaves: i32,
    /// Nominal smoothing of the input image
    pub sigma_n: f64,
    pub sigma_0: f64,
    pub sigma_k: f64,
    pub dsigma_0: f64,
}

impl ScaleGeometry {
    pub fn new(params: &SiftParams, width: usize, height: usize) -> Self {
        let levels = i32::try_from(params.levels).unwrap_or(i32::MAX);
        let first_octave = params.first_octave;
        let octaves = match params.octaves {
            Some(o) => i32::try_from(o).unwrap_or(i32::MAX),
            None => auto_octaves(width, height, first_octave),
        };
        let sigma_k = 2f64.powf(1.0 / levels as f64);
        let sigma_0 = 1.6 * sigma_k;
        Self {
            levels,
            s_min: -1,
            s_max: levels.saturating_add(1),
            first_octave,
            octaves,
            sigma_n: 0.5,
            sigma_0,
            sigma_k,
            dsigma_0: sigma_0 * (1.0 - 1.0 / (sigma_k * sigma_k)).sqrt(),
        }
    }

    /// Index of the last octave the filter may visit
    pub fn last_octave(&self) -> i32 {
        self.first_octave.saturating_add(self.octaves).saturating_sub(1)
    }

    /// Number of planes stored per octave (`s_min..=s_max`)
    pub fn planes_per_octave(&self) -> usize {
        (self.s_max as i64 - self.s_min as i64 + 1).max(0) as usize
    }
}

fn auto_octaves(width: usize, height: usize, first_octave: i32) -> i32 {
    let min_dim = width.min(height);
    if min_dim == 0 {
        return 0;
    }
    let log2 = (min_dim as f64).log2().floor() as i32;
    log2.saturating_sub(first_octave).saturating_sub(3).max(1)
}

/// Gaussian levels of one octave, `s_min..=s_max`
#[derive(Debug, Clone)]
pub struct Octave {
    pub index: i32,
    pub width: usize,
    pub height: usize,
    pub s_min: i32,
    planes: Vec<Plane>,
}

impl Octave {
    pub fn new(index: i32, width: usize, height: usize, s_min: i32, planes: Vec<Plane>) -> Self {
        debug_assert!(planes.iter().all(|p| p.len() == width * height));
        Self { index, width, height, s_min, planes }
    }

    /// Level `s` of the octave; panics if `s` is outside `s_min..=s_max`
    pub fn level(&self, s: i32) -> &[f32] {
        &self.planes[(s - self.s_min) as usize]
    }

    pub fn level_mut(&mut self, s: i32) -> &mut [f32] {
        let i = (s - self.s_min) as usize;
        &mut self.planes[i]
    }

    pub fn s_max(&self) -> i32 {
        self.s_min + self.planes.len() as i32 - 1
    }

    /// Pixel pitch of this octave in input-image pixels
    pub fn step(&self) -> f64 {
        2f64.powi(self.index)
    }
}
