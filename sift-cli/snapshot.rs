use crate::engine::FeatureEngine;
use crate::error::{SiftError, SiftResult};
use crate::naming::sibling_name;
use crate::pgm::RasterImage;
use crate::sink::{OpenMode, OutputSink};

/// Write levels `0..S` of the engine's current octave as 8-bit PGM files.
///
/// Each level is saved under `<base>_<octave>_<level>` run through the sink
/// pattern. Returns the number of files written.
pub fn snapshot<E: FeatureEngine + ?Sized>(engine: &E, sink: &mut OutputSink, base: &str) -> SiftResult<usize> {
    if !sink.is_active() {
        return Ok(0);
    }
    let Some(octave) = engine.octave() else {
        return Ok(0);
    };
    let len = octave.width * octave.height;
    let mut written = 0;
    for s in 0..engine.levels() {
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| SiftError::Alloc(format!("snapshot buffer of {} bytes", len)))?;
        // truncate, then wrap modulo 256
        pixels.extend(octave.level(s).iter().map(|&v| (v as i32) as u8));
        let image = RasterImage::new(octave.width, octave.height, 255, pixels)?;

        let name = sibling_name(base, &format!("_{:02}_{:03}", octave.index, s))?;
        sink.open(&name, OpenMode::Write)?;
        sink.write_pgm(&image)?;
        if let Some(path) = sink.path() {
            log::info!("saved gss level to '{}'", path.display());
        }
        sink.close()?;
        written += 1;
    }
    Ok(written)
}
