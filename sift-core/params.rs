use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest accepted number of levels per octave
pub const MAX_LEVELS: u32 = 256;
/// Octave indices and counts must stay below this
pub const MAX_OCTAVES: u32 = 32;
/// Lowest first octave; each step below zero doubles the image size
pub const MIN_FIRST_OCTAVE: i32 = -8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("invalid number of levels per octave: {0} (must be between 1 and 256)")]
    InvalidLevels(u32),
    #[error("invalid number of octaves: {0} (must be below 32)")]
    InvalidOctaves(u32),
    #[error("invalid first octave: {0} (must be between -8 and 31)")]
    InvalidFirstOctave(i32),
    #[error("invalid {name} threshold: {value} (must be a finite non-negative number)")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Scale-space parameters of one run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SiftParams {
    /// Number of octaves; `None` derives it from the image size
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub octaves: Option<u32>,
    /// Levels per octave
    pub levels: u32,
    /// Index of the first octave; -1 doubles the input resolution
    pub first_octave: i32,
    pub peak_thresh: f64,
    pub edge_thresh: f64,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            octaves: None,
            levels: 3,
            first_octave: -1,
            peak_thresh: 2.0,
            edge_thresh: 2.0,
        }
    }
}

impl SiftParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.levels == 0 || self.levels > MAX_LEVELS {
            return Err(ParamsError::InvalidLevels(self.levels));
        }
        if let Some(octaves) = self.octaves.filter(|&o| o >= MAX_OCTAVES) {
            return Err(ParamsError::InvalidOctaves(octaves));
        }
        if self.first_octave < MIN_FIRST_OCTAVE || self.first_octave >= MAX_OCTAVES as i32 {
            return Err(ParamsError::InvalidFirstOctave(self.first_octave));
        }
        for (name, value) in [("peak", self.peak_thresh), ("edge", self.edge_thresh)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParamsError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        let octaves = self
            .octaves
            .map(|o| o.to_string())
            .unwrap_or_else(|| "auto".to_string());
        format!(
            "octaves={}, levels={}, first_octave={}, peak_thresh={}, edge_thresh={}",
            octaves, self.levels, self.first_octave, self.peak_thresh, self.edge_thresh
        )
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let params: Self = toml::from_str(toml_str)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a `.json` or `.toml` file, chosen by extension
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }
}
