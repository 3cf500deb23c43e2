use crate::error::SiftResult;
use sift_core::{Descriptor, Keypoint, Octave, SiftParams, DESCRIPTOR_LEN};
use sift_describe::Describer;
use sift_scale::{FilterBuilder, OctaveStep, ScaleSpaceFilter};

/// Scale-space feature extractor as seen by the pipeline.
///
/// The engine holds one octave at a time; `detect`, `orientations` and
/// `descriptor` all work on the current one.
pub trait FeatureEngine {
    fn process_first_octave(&mut self, samples: &[f32]) -> SiftResult<OctaveStep>;
    fn process_next_octave(&mut self) -> SiftResult<OctaveStep>;
    fn octave(&self) -> Option<&Octave>;
    /// Levels per octave
    fn levels(&self) -> i32;
    fn detect(&mut self) -> SiftResult<Vec<Keypoint>>;
    /// Zero to four dominant orientations of `kp`
    fn orientations(&mut self, kp: &Keypoint) -> Vec<f64>;
    fn descriptor(&mut self, kp: &Keypoint, angle: f64) -> Descriptor;
    fn keypoint_from_frame(&self, x: f64, y: f64, sigma: f64) -> Keypoint;
}

/// Gaussian scale-space detector combined with the gradient-histogram describer
pub struct SiftEngine {
    filter: ScaleSpaceFilter,
    describer: Describer,
}

impl SiftEngine {
    pub fn new(params: &SiftParams, width: usize, height: usize) -> SiftResult<Self> {
        let filter = FilterBuilder::from_params(params.clone(), width, height).build()?;
        Ok(Self { filter, describer: Describer::new() })
    }

    pub fn filter(&self) -> &ScaleSpaceFilter {
        &self.filter
    }
}

impl FeatureEngine for SiftEngine {
    fn process_first_octave(&mut self, samples: &[f32]) -> SiftResult<OctaveStep> {
        self.describer.reset();
        Ok(self.filter.process_first_octave(samples)?)
    }

    fn process_next_octave(&mut self) -> SiftResult<OctaveStep> {
        Ok(self.filter.process_next_octave()?)
    }

    fn octave(&self) -> Option<&Octave> {
        self.filter.octave()
    }

    fn levels(&self) -> i32 {
        self.filter.geometry().levels
    }

    fn detect(&mut self) -> SiftResult<Vec<Keypoint>> {
        Ok(self.filter.detect()?.to_vec())
    }

    fn orientations(&mut self, kp: &Keypoint) -> Vec<f64> {
        match self.filter.octave() {
            Some(octave) => self.describer.orientations(octave, kp),
            None => Vec::new(),
        }
    }

    fn descriptor(&mut self, kp: &Keypoint, angle: f64) -> Descriptor {
        match self.filter.octave() {
            Some(octave) => self.describer.descriptor(octave, kp, angle),
            None => [0.0; DESCRIPTOR_LEN],
        }
    }

    fn keypoint_from_frame(&self, x: f64, y: f64, sigma: f64) -> Keypoint {
        self.filter.keypoint_from_frame(x, y, sigma)
    }
}
