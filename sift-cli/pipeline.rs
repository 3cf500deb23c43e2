//! Per-image processing: decode, walk the octaves, emit records.

use crate::engine::{FeatureEngine, SiftEngine};
use crate::error::{SiftError, SiftResult};
use crate::options::Config;
use crate::pgm;
use crate::sink::{Frame, OpenMode, OutputSink};
use crate::snapshot::snapshot;
use sift_core::{Keypoint, SiftParams};
use std::fs::File;
use std::path::Path;

/// Counters of one processed image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageSummary {
    pub octaves: usize,
    pub keypoints: usize,
    /// Oriented descriptors emitted
    pub records: usize,
}

/// The sinks of one image, fresh copies of the configured ones
struct ImageSinks {
    frames: OutputSink,
    descriptors: OutputSink,
    meta: OutputSink,
    gss: OutputSink,
    read_frames: OutputSink,
}

impl ImageSinks {
    fn new(config: &Config) -> Self {
        let sinks = &config.sinks;
        Self {
            frames: OutputSink::new(sinks.frames.clone()),
            descriptors: OutputSink::new(sinks.descriptors.clone()),
            meta: OutputSink::new(sinks.meta.clone()),
            gss: OutputSink::new(sinks.gss.clone()),
            read_frames: OutputSink::new(sinks.read_frames.clone()),
        }
    }

    /// Close every sink, reporting the first failure
    fn close_all(&mut self) -> SiftResult<()> {
        let results = [
            self.frames.close(),
            self.descriptors.close(),
            self.meta.close(),
            self.gss.close(),
            self.read_frames.close(),
        ];
        results.into_iter().collect()
    }

    /// Emit one oriented record to the frames and descriptors sinks
    fn emit(&mut self, frame: &Frame, descr: &sift_core::Descriptor) -> SiftResult<()> {
        self.frames.write_frame(frame)?;
        self.descriptors.write_descriptor(descr)
    }
}

/// Runs the feature pipeline on single images
pub struct Pipeline<'a> {
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Process `input` with the scale-space engine, naming outputs after `base`
    pub fn process_image(&self, input: &Path, base: &str) -> SiftResult<ImageSummary> {
        self.process_image_with(input, base, SiftEngine::new)
    }

    /// Process `input` with an engine built by `make_engine` from the run
    /// parameters and the image size.
    ///
    /// Every sink is closed before returning, on success and on failure.
    pub fn process_image_with<E, F>(&self, input: &Path, base: &str, make_engine: F) -> SiftResult<ImageSummary>
    where
        E: FeatureEngine,
        F: FnOnce(&SiftParams, usize, usize) -> SiftResult<E>,
    {
        let mut sinks = ImageSinks::new(self.config);
        let result = self.run(input, base, &mut sinks, make_engine);
        let closed = sinks.close_all();
        let summary = result?;
        closed?;
        Ok(summary)
    }

    fn run<E, F>(&self, input: &Path, base: &str, sinks: &mut ImageSinks, make_engine: F) -> SiftResult<ImageSummary>
    where
        E: FeatureEngine,
        F: FnOnce(&SiftParams, usize, usize) -> SiftResult<E>,
    {
        let file = File::open(input)
            .map_err(|e| SiftError::io(format!("could not open '{}' for reading", input.display()), e))?;

        sinks.descriptors.open(base, OpenMode::Write)?;
        sinks.frames.open(base, OpenMode::Write)?;
        sinks.meta.open(base, OpenMode::Write)?;
        for sink in [&sinks.descriptors, &sinks.frames, &sinks.meta] {
            if let Some(path) = sink.path() {
                log::debug!("writing '{}'", path.display());
            }
        }

        let image = pgm::decode_luma(file)?;
        log::info!("image is {} by {} pixels", image.width, image.height);
        let (width, height) = (image.width, image.height);
        let samples = image.widen()?;
        drop(image);

        let frames = if sinks.read_frames.is_active() {
            sinks.read_frames.open(base, OpenMode::Read)?;
            let frames = sinks.read_frames.read_frames()?;
            sinks.read_frames.close()?;
            log::debug!("read {} frames", frames.len());
            Some(frames)
        } else {
            None
        };

        let mut engine = make_engine(&self.config.params, width, height)?;
        let mut summary = ImageSummary::default();
        let mut step = engine.process_first_octave(&samples)?;
        drop(samples);

        while step.is_ready() {
            summary.octaves += 1;
            if let Some(octave) = engine.octave() {
                log::debug!("octave {}: {}x{}", octave.index, octave.width, octave.height);
            }
            snapshot(&engine, &mut sinks.gss, base)?;

            match &frames {
                Some(frames) => self.emit_frames(&mut engine, frames, sinks, &mut summary)?,
                None => self.emit_detected(&mut engine, sinks, &mut summary)?,
            }
            step = engine.process_next_octave()?;
        }

        let descriptors = sinks.descriptors.path().map(Path::to_path_buf);
        let frames_path = sinks.frames.path().map(Path::to_path_buf);
        sinks
            .meta
            .write_meta(input, descriptors.as_deref(), frames_path.as_deref())?;

        log::info!(
            "'{}': {} keypoints, {} descriptors over {} octaves",
            input.display(),
            summary.keypoints,
            summary.records,
            summary.octaves
        );
        Ok(summary)
    }

    /// Detect on the current octave and describe every orientation.
    ///
    /// Frame records repeat the location and scale of the first keypoint of
    /// the octave, with the angle of the record being written.
    fn emit_detected<E: FeatureEngine>(
        &self,
        engine: &mut E,
        sinks: &mut ImageSinks,
        summary: &mut ImageSummary,
    ) -> SiftResult<()> {
        let keypoints = engine.detect()?;
        log::debug!("{} keypoints", keypoints.len());
        let Some(first) = keypoints.first().copied() else {
            return Ok(());
        };
        summary.keypoints += keypoints.len();
        for kp in &keypoints {
            for angle in engine.orientations(kp) {
                let descr = engine.descriptor(kp, angle);
                sinks.emit(&frame_of(&first, angle), &descr)?;
                summary.records += 1;
            }
        }
        Ok(())
    }

    /// Describe externally supplied frames that fall in the current octave
    fn emit_frames<E: FeatureEngine>(
        &self,
        engine: &mut E,
        frames: &[Frame],
        sinks: &mut ImageSinks,
        summary: &mut ImageSummary,
    ) -> SiftResult<()> {
        let Some(current) = engine.octave().map(|o| o.index) else {
            return Ok(());
        };
        for frame in frames {
            let kp = engine.keypoint_from_frame(frame.x, frame.y, frame.sigma);
            if kp.o != current {
                continue;
            }
            summary.keypoints += 1;
            let angles = if self.config.force_orientations {
                engine.orientations(&kp)
            } else {
                vec![frame.angle]
            };
            for angle in angles {
                let descr = engine.descriptor(&kp, angle);
                sinks.emit(&Frame { angle, ..*frame }, &descr)?;
                summary.records += 1;
            }
        }
        Ok(())
    }
}

fn frame_of(kp: &Keypoint, angle: f64) -> Frame {
    Frame {
        x: kp.x as f64,
        y: kp.y as f64,
        sigma: kp.sigma as f64,
        angle,
    }
}
