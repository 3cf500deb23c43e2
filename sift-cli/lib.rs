//! Batch SIFT driver.
//!
//! Images are decoded, run through the scale-space engine octave by octave,
//! and every oriented keypoint is written to the configured output sinks.

pub mod batch;
pub mod engine;
pub mod error;
pub mod format;
pub mod naming;
pub mod options;
pub mod pgm;
pub mod pipeline;
pub mod sink;
pub mod snapshot;

pub use batch::{BatchDriver, BatchReport};
pub use engine::{FeatureEngine, SiftEngine};
pub use error::{SiftError, SiftResult};
pub use options::{Cli, Config, SinkSet};
pub use pgm::RasterImage;
pub use pipeline::{ImageSummary, Pipeline};
pub use sink::{Frame, OpenMode, OutputSink, Protocol, SinkConfig};

pub use sift_core::{self, Descriptor, Keypoint, Octave, SiftParams};
pub use sift_scale::OctaveStep;
