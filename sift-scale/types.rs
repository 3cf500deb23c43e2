/// Outcome of advancing the filter to an octave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OctaveStep {
    /// The octave has been computed and can be queried
    Ready,
    /// No further octave exists for this image and these parameters
    Exhausted,
}

impl OctaveStep {
    pub fn is_ready(self) -> bool {
        self == OctaveStep::Ready
    }
}

/// Integer-coordinate DoG extremum before refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extremum {
    pub x: usize,
    pub y: usize,
    pub s: i32,
}
