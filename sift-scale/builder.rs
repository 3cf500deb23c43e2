use sift_core::SiftParams;
use crate::error::ScaleResult;
use crate::filter::ScaleSpaceFilter;

/// Builder for creating a `ScaleSpaceFilter`
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    params: SiftParams,
    width: usize,
    height: usize,
}

impl FilterBuilder {
    /// Create a new builder with the driver's default parameters
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            params: SiftParams::default(),
            width,
            height,
        }
    }

    /// Create a builder from existing parameters
    pub fn from_params(params: SiftParams, width: usize, height: usize) -> Self {
        Self { params, width, height }
    }

    /// Set the number of octaves (`None` derives it from the image size)
    pub fn octaves(mut self, octaves: Option<u32>) -> Self {
        self.params.octaves = octaves;
        self
    }

    /// Set the number of levels per octave
    pub fn levels(mut self, levels: u32) -> Self {
        self.params.levels = levels;
        self
    }

    /// Set the index of the first octave
    pub fn first_octave(mut self, first_octave: i32) -> Self {
        self.params.first_octave = first_octave;
        self
    }

    /// Set the minimum DoG magnitude of a keypoint
    pub fn peak_thresh(mut self, thresh: f64) -> Self {
        self.params.peak_thresh = thresh;
        self
    }

    /// Set the maximum principal curvature ratio of a keypoint
    pub fn edge_thresh(mut self, thresh: f64) -> Self {
        self.params.edge_thresh = thresh;
        self
    }

    /// Build the `ScaleSpaceFilter`
    pub fn build(self) -> ScaleResult<ScaleSpaceFilter> {
        ScaleSpaceFilter::new(self.width, self.height, &self.params)
    }

    /// Generate a summary of the builder's configuration
    pub fn summary(&self) -> String {
        format!("FilterBuilder: {}x{}, {}", self.width, self.height, self.params.summary())
    }

    pub fn params(&self) -> &SiftParams {
        &self.params
    }
}
