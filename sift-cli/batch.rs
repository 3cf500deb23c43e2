use crate::error::SiftError;
use crate::naming::base_name;
use crate::options::Config;
use crate::pipeline::{ImageSummary, Pipeline};
use std::path::PathBuf;

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(PathBuf, ImageSummary)>,
    pub failed: Vec<(PathBuf, SiftError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Process exit status: 0 iff every image succeeded
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Processes every input of a run, one image at a time
pub struct BatchDriver {
    config: Config,
}

impl BatchDriver {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the pipeline on every input; a failed image does not stop the batch
    pub fn run(&self) -> BatchReport {
        let pipeline = Pipeline::new(&self.config);
        let mut report = BatchReport::default();
        for input in &self.config.inputs {
            log::info!("processing '{}'", input.display());
            let result = base_name(input).and_then(|base| {
                log::debug!("basename is '{}'", base);
                pipeline.process_image(input, &base)
            });
            match result {
                Ok(summary) => report.succeeded.push((input.clone(), summary)),
                Err(e) => {
                    log::error!("'{}': {}", input.display(), e);
                    report.failed.push((input.clone(), e));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_reflects_failures() {
        let mut report = BatchReport::default();
        assert_eq!(report.exit_code(), 0);
        report
            .failed
            .push((PathBuf::from("x.pgm"), SiftError::Format("bad".into())));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_missing_input_is_reported() {
        let config = Config {
            inputs: vec![PathBuf::from("/nonexistent/dir/none.pgm")],
            ..Config::default()
        };
        let report = BatchDriver::new(config).run();
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, SiftError::Io { .. }));
    }
}
