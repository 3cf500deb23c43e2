//! Grayscale raster codec.
//!
//! PGM files (`P2` ASCII and `P5` raw, 8-bit) are parsed here; any other
//! format the `image` crate understands is decoded by it and reduced to luma.

use crate::error::{SiftError, SiftResult};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// 8-bit grayscale image, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: usize,
    pub height: usize,
    pub max_value: u8,
    pub samples: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: usize, height: usize, max_value: u8, samples: Vec<u8>) -> SiftResult<Self> {
        if max_value == 0 {
            return Err(SiftError::Format("maximum value must be positive".into()));
        }
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| SiftError::Format(format!("image size {}x{} overflows", width, height)))?;
        if samples.len() != expected {
            return Err(SiftError::Format(format!(
                "expected {} samples, got {}",
                expected,
                samples.len()
            )));
        }
        Ok(Self { width, height, max_value, samples })
    }

    /// Lossless conversion to the float working buffer
    pub fn widen(&self) -> SiftResult<Vec<f32>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(self.samples.len()).map_err(|_| {
            SiftError::Alloc(format!("working buffer of {} samples", self.samples.len()))
        })?;
        buffer.extend(self.samples.iter().map(|&v| v as f32));
        Ok(buffer)
    }
}

/// Cursor over a PGM header
struct HeaderReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    /// Skip whitespace and `#` comments
    fn skip_blanks(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b'#' {
                while let Some(&c) = self.bytes.get(self.pos) {
                    self.pos += 1;
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn number(&mut self, what: &str) -> SiftResult<usize> {
        self.skip_blanks();
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(SiftError::Format(format!("PGM header: missing {}", what)));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SiftError::Format(format!("PGM header: {} out of range", what)))
    }
}

/// Decode a `P2` or `P5` image
pub fn decode<R: Read>(mut reader: R) -> SiftResult<RasterImage> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| SiftError::io("could not read image", e))?;
    decode_bytes(&bytes)
}

fn decode_bytes(bytes: &[u8]) -> SiftResult<RasterImage> {
    let raw = match bytes.get(..2) {
        Some(b"P5") => true,
        Some(b"P2") => false,
        _ => return Err(SiftError::Format("not a PGM file".into())),
    };
    let mut header = HeaderReader { bytes, pos: 2 };
    let width = header.number("width")?;
    let height = header.number("height")?;
    let max_value = header.number("maximum value")?;
    if max_value == 0 || max_value > 255 {
        return Err(SiftError::Format(format!(
            "unsupported maximum value {}",
            max_value
        )));
    }
    let len = width
        .checked_mul(height)
        .ok_or_else(|| SiftError::Format(format!("image size {}x{} overflows", width, height)))?;

    let samples = if raw {
        // exactly one whitespace byte separates the header from the pixels
        match bytes.get(header.pos) {
            Some(b) if b.is_ascii_whitespace() => header.pos += 1,
            _ => return Err(SiftError::Format("PGM header: missing separator".into())),
        }
        let body = &bytes[header.pos..];
        if body.len() < len {
            return Err(SiftError::Format(format!(
                "PGM body has {} of {} samples",
                body.len(),
                len
            )));
        }
        body[..len].to_vec()
    } else {
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(len)
            .map_err(|_| SiftError::Alloc(format!("{} samples", len)))?;
        for i in 0..len {
            let v = header.number("sample").map_err(|_| {
                SiftError::Format(format!("PGM body has {} of {} samples", i, len))
            })?;
            if v > max_value {
                return Err(SiftError::Format(format!(
                    "sample {} exceeds maximum value {}",
                    v, max_value
                )));
            }
            samples.push(v as u8);
        }
        samples
    };
    RasterImage::new(width, height, max_value as u8, samples)
}

/// Write `image` as a raw `P5` file
pub fn encode<W: Write>(mut writer: W, image: &RasterImage) -> SiftResult<()> {
    write!(writer, "P5\n{} {}\n{}\n", image.width, image.height, image.max_value)
        .and_then(|_| writer.write_all(&image.samples))
        .map_err(|e| SiftError::io("could not write PGM", e))
}

/// Decode any supported format into an 8-bit luma image
pub fn decode_luma<R: Read>(mut reader: R) -> SiftResult<RasterImage> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| SiftError::io("could not read image", e))?;
    if bytes.starts_with(b"P2") || bytes.starts_with(b"P5") {
        return decode_bytes(&bytes);
    }
    let luma = image::load_from_memory(&bytes)
        .map_err(|e| SiftError::Format(e.to_string()))?
        .to_luma8();
    let (width, height) = (luma.width() as usize, luma.height() as usize);
    log::debug!("decoded {}x{} image through the image crate", width, height);
    RasterImage::new(width, height, 255, luma.into_raw())
}

/// Open `path` and decode it with [`decode_luma`]
pub fn load_luma<P: AsRef<Path>>(path: P) -> SiftResult<RasterImage> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| SiftError::io(format!("could not open '{}' for reading", path.display()), e))?;
    decode_luma(file)
}
