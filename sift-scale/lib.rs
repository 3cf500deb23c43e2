//! Gaussian scale space and difference-of-Gaussians keypoint detection.
//!
//! The filter is driven octave by octave:
//!
//! ```
//! use sift_core::SiftParams;
//! use sift_scale::{OctaveStep, ScaleSpaceFilter};
//!
//! let image = vec![0.0f32; 32 * 32];
//! let mut filter = ScaleSpaceFilter::new(32, 32, &SiftParams::default()).unwrap();
//! let mut step = filter.process_first_octave(&image).unwrap();
//! while step == OctaveStep::Ready {
//!     let keypoints = filter.detect().unwrap();
//!     assert!(keypoints.is_empty());
//!     step = filter.process_next_octave().unwrap();
//! }
//! ```

pub mod builder;
pub mod error;
mod extrema;
pub mod filter;
pub mod pyramid;
pub mod types;

pub use builder::FilterBuilder;
pub use error::{ScaleResult, ScaleSpaceError};
pub use filter::{ScaleSpaceFilter, MIN_OCTAVE_SIZE};
pub use pyramid::ImagePyramid;
pub use types::OctaveStep;
