use crate::error::{SiftError, SiftResult};
use crate::sink::{Protocol, SinkConfig};
use clap::{ArgAction, Parser};
use sift_core::SiftParams;
use std::path::PathBuf;

/// Extract SIFT frames and descriptors from PGM images
#[derive(Debug, Parser)]
#[command(name = "sift", version, about)]
pub struct Cli {
    /// Input images
    #[arg(required = true, value_name = "IMAGE")]
    pub inputs: Vec<PathBuf>,

    /// Be verbose; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Number of octaves (automatic when omitted)
    #[arg(short = 'O', long, value_name = "N")]
    pub octaves: Option<u32>,

    /// Levels per octave
    #[arg(short = 'S', long, value_name = "N")]
    pub levels: Option<u32>,

    /// Index of the first octave
    #[arg(long, value_name = "N")]
    pub first_octave: Option<u32>,

    /// Edge rejection threshold
    #[arg(long = "edges-tresh", value_name = "T", value_parser = non_negative)]
    pub edges_tresh: Option<f64>,

    /// Peak selection threshold
    #[arg(long = "peaks-tresh", value_name = "T", value_parser = non_negative)]
    pub peaks_tresh: Option<f64>,

    /// Write frames [default: %.frame]
    #[arg(long, value_name = "SPEC", num_args = 0..=1, require_equals = true)]
    pub frames: Option<Option<String>>,

    /// Write descriptors [default: %.descr]
    #[arg(long, value_name = "SPEC", num_args = 0..=1, require_equals = true)]
    pub descriptors: Option<Option<String>>,

    /// Write a meta file, ASCII only [default: %.meta]
    #[arg(long, value_name = "SPEC", num_args = 0..=1, require_equals = true)]
    pub meta: Option<Option<String>>,

    /// Save the Gaussian scale space levels [default: %.pgm]
    #[arg(long, value_name = "SPEC", num_args = 0..=1, require_equals = true)]
    pub gss: Option<Option<String>>,

    /// Describe frames read from a file instead of detecting them
    #[arg(long, value_name = "SPEC", require_equals = true)]
    pub read_frames: Option<String>,

    /// Compute orientations of read frames instead of using theirs
    #[arg(long, value_name = "SPEC", num_args = 0..=1, require_equals = true)]
    pub orientations: Option<Option<String>>,
}

fn non_negative(arg: &str) -> Result<f64, String> {
    match arg.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("'{}' is not a non-negative number", arg)),
    }
}

/// Sink configurations of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSet {
    pub frames: SinkConfig,
    pub descriptors: SinkConfig,
    pub meta: SinkConfig,
    pub gss: SinkConfig,
    pub read_frames: SinkConfig,
}

impl Default for SinkSet {
    fn default() -> Self {
        Self {
            frames: SinkConfig::frames(),
            descriptors: SinkConfig::descriptors(),
            meta: SinkConfig::meta(),
            gss: SinkConfig::gss(),
            read_frames: SinkConfig::read_frames(),
        }
    }
}

/// Immutable run configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub verbosity: u8,
    pub params: SiftParams,
    pub sinks: SinkSet,
    /// Recompute orientations of frames given with `--read-frames`
    pub force_orientations: bool,
}

impl Config {
    /// Parse command-line arguments; clap errors carry help and version requests
    pub fn try_parse_from<I, T>(args: I) -> Result<SiftResult<Self>, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::try_parse_from(args).map(Config::try_from)
    }

    pub fn log_summary(&self) {
        log::debug!("parameters: {}", self.params.summary());
        let sinks = &self.sinks;
        log::debug!("frames      : {}", sinks.frames);
        log::debug!("descriptors : {}", sinks.descriptors);
        log::debug!("meta        : {}", sinks.meta);
        log::debug!("gss         : {}", sinks.gss);
        log::debug!("read frames : {}", sinks.read_frames);
    }
}

impl TryFrom<Cli> for Config {
    type Error = SiftError;

    fn try_from(cli: Cli) -> SiftResult<Self> {
        let defaults = SiftParams::default();
        let params = SiftParams {
            octaves: cli.octaves,
            levels: cli.levels.unwrap_or(defaults.levels),
            first_octave: match cli.first_octave {
                Some(o) => i32::try_from(o)
                    .map_err(|_| SiftError::Config(format!("invalid first octave: {}", o)))?,
                None => defaults.first_octave,
            },
            peak_thresh: cli.peaks_tresh.unwrap_or(defaults.peak_thresh),
            edge_thresh: cli.edges_tresh.unwrap_or(defaults.edge_thresh),
        };
        params.validate().map_err(|e| SiftError::Config(e.to_string()))?;

        let apply = |config: SinkConfig, arg: Option<Option<String>>| match arg {
            Some(spec) => config.parse(spec.as_deref()),
            None => Ok(config),
        };
        let sinks = SinkSet {
            frames: apply(SinkConfig::frames(), cli.frames)?,
            descriptors: apply(SinkConfig::descriptors(), cli.descriptors)?,
            meta: apply(SinkConfig::meta(), cli.meta)?,
            gss: apply(SinkConfig::gss(), cli.gss)?,
            read_frames: apply(SinkConfig::read_frames(), cli.read_frames.map(Some))?,
        };
        if sinks.meta.protocol != Protocol::Ascii {
            return Err(SiftError::Config("meta file supports only ASCII protocol".into()));
        }

        Ok(Self {
            inputs: cli.inputs,
            verbosity: cli.verbose,
            params,
            sinks,
            force_orientations: cli.orientations.is_some(),
        })
    }
}
