//! Output sinks: independently toggleable, pattern-named output files.

use crate::error::{SiftError, SiftResult};
use crate::format::fmt_g;
use crate::naming::{expand_pattern, path_text, MAX_PATH_LEN};
use crate::pgm::{self, RasterImage};
use sift_core::Descriptor;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Wire format of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// `%g` fields separated by spaces, one record per line
    #[default]
    Ascii,
    /// As `Ascii`, with each line prefixed by its field count
    AsciiFramed,
    BinaryLe,
    BinaryBe,
}

impl Protocol {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ascii" => Some(Protocol::Ascii),
            "ascii-framed" => Some(Protocol::AsciiFramed),
            "bin-le" => Some(Protocol::BinaryLe),
            "bin-be" | "bin" => Some(Protocol::BinaryBe),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Protocol::Ascii => "ascii",
            Protocol::AsciiFramed => "ascii-framed",
            Protocol::BinaryLe => "bin-le",
            Protocol::BinaryBe => "bin-be",
        }
    }

    fn f64_bytes(self, v: f64) -> [u8; 8] {
        match self {
            Protocol::BinaryLe => v.to_le_bytes(),
            _ => v.to_be_bytes(),
        }
    }

    fn f32_bytes(self, v: f32) -> [u8; 4] {
        match self {
            Protocol::BinaryLe => v.to_le_bytes(),
            _ => v.to_be_bytes(),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parsed sink option: whether the sink is active, its name pattern and protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub active: bool,
    pub pattern: String,
    pub protocol: Protocol,
}

impl SinkConfig {
    pub fn new(active: bool, pattern: &str) -> Self {
        Self { active, pattern: pattern.to_string(), protocol: Protocol::Ascii }
    }

    pub fn frames() -> Self {
        Self::new(true, "%.frame")
    }

    pub fn descriptors() -> Self {
        Self::new(false, "%.descr")
    }

    pub fn meta() -> Self {
        Self::new(false, "%.meta")
    }

    pub fn gss() -> Self {
        Self::new(false, "%.pgm")
    }

    pub fn read_frames() -> Self {
        Self::new(false, "%.frame")
    }

    /// Apply a command-line occurrence of the sink's option.
    ///
    /// The option activates the sink; its argument `[<protocol>://][pattern]`
    /// may change the protocol and, when not empty, the pattern.
    pub fn parse(mut self, arg: Option<&str>) -> SiftResult<Self> {
        self.active = true;
        let Some(arg) = arg else {
            return Ok(self);
        };
        let pattern = match arg.split_once("://") {
            Some((tag, rest)) => {
                self.protocol = Protocol::from_tag(tag)
                    .ok_or_else(|| SiftError::Config(format!("unknown protocol '{}'", tag)))?;
                rest
            }
            None => arg,
        };
        if pattern.len() >= MAX_PATH_LEN {
            return Err(SiftError::Config(format!(
                "pattern of {} bytes is too long",
                pattern.len()
            )));
        }
        if !pattern.is_empty() {
            self.pattern = pattern.to_string();
        }
        Ok(self)
    }
}

impl fmt::Display for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} pattern={:<10} protocol={:<6}",
            self.active as u8, self.pattern, self.protocol
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Frame record: location, scale and orientation in input-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    pub angle: f64,
}

impl Frame {
    const FIELDS: usize = 4;

    fn from_fields(fields: &[f64]) -> Self {
        Self { x: fields[0], y: fields[1], sigma: fields[2], angle: fields[3] }
    }
}

enum Handle {
    Writer(BufWriter<File>),
    Reader(BufReader<File>),
}

/// One output channel of the driver.
///
/// An inactive sink is never opened, written or reported. The handle is
/// released by `close` or, failing that, on drop.
pub struct OutputSink {
    config: SinkConfig,
    path: Option<PathBuf>,
    handle: Option<Handle>,
}

impl OutputSink {
    pub fn new(config: SinkConfig) -> Self {
        Self { config, path: None, handle: None }
    }

    pub fn is_active(&self) -> bool {
        self.config.active
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    /// Resolved name of the last file opened
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Resolve the pattern against `base` and open the file
    pub fn open(&mut self, base: &str, mode: OpenMode) -> SiftResult<()> {
        if !self.config.active {
            return Ok(());
        }
        self.close()?;
        let path = PathBuf::from(expand_pattern(&self.config.pattern, base)?);
        let handle = match mode {
            OpenMode::Write => File::create(&path)
                .map(|f| Handle::Writer(BufWriter::new(f)))
                .map_err(|e| SiftError::io(format!("could not open '{}' for writing", path.display()), e))?,
            OpenMode::Read => File::open(&path)
                .map(|f| Handle::Reader(BufReader::new(f)))
                .map_err(|e| SiftError::io(format!("could not open '{}' for reading", path.display()), e))?,
        };
        self.path = Some(path);
        self.handle = Some(handle);
        Ok(())
    }

    fn display_path(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.config.pattern.clone())
    }

    /// Writer of an open active sink; `None` for an inactive one
    fn writer(&mut self) -> SiftResult<Option<&mut BufWriter<File>>> {
        if !self.config.active {
            return Ok(None);
        }
        let name = self.display_path();
        match self.handle.as_mut() {
            Some(Handle::Writer(w)) => Ok(Some(w)),
            _ => Err(SiftError::io(
                format!("'{}' is not open for writing", name),
                std::io::ErrorKind::NotConnected.into(),
            )),
        }
    }

    fn emit(&mut self, bytes: &[u8]) -> SiftResult<()> {
        let name = self.display_path();
        if let Some(w) = self.writer()? {
            w.write_all(bytes)
                .map_err(|e| SiftError::io(format!("could not write '{}'", name), e))?;
        }
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &Frame) -> SiftResult<()> {
        if !self.config.active {
            return Ok(());
        }
        let fields = [frame.x, frame.y, frame.sigma, frame.angle];
        let bytes = match self.config.protocol {
            Protocol::Ascii | Protocol::AsciiFramed => {
                let mut line = self.ascii_prefix(Frame::FIELDS);
                let text: Vec<String> = fields.iter().map(|&v| fmt_g(v)).collect();
                line.push_str(&text.join(" "));
                line.push('\n');
                line.into_bytes()
            }
            protocol => fields.iter().flat_map(|&v| protocol.f64_bytes(v)).collect(),
        };
        self.emit(&bytes)
    }

    pub fn write_descriptor(&mut self, descr: &Descriptor) -> SiftResult<()> {
        if !self.config.active {
            return Ok(());
        }
        let bytes = match self.config.protocol {
            Protocol::Ascii | Protocol::AsciiFramed => {
                let mut line = self.ascii_prefix(descr.len());
                for &v in descr.iter() {
                    line.push_str(&fmt_g(v as f64));
                    line.push(' ');
                }
                line.push('\n');
                line.into_bytes()
            }
            protocol => descr.iter().flat_map(|&v| protocol.f32_bytes(v)).collect(),
        };
        self.emit(&bytes)
    }

    fn ascii_prefix(&self, count: usize) -> String {
        match self.config.protocol {
            Protocol::AsciiFramed => format!("{} ", count),
            _ => String::new(),
        }
    }

    /// Write the meta block naming the input and the active outputs
    pub fn write_meta(&mut self, input: &Path, descriptors: Option<&Path>, frames: Option<&Path>) -> SiftResult<()> {
        if !self.config.active {
            return Ok(());
        }
        let mut block = String::from("<sift\n");
        block.push_str(&format!("  input       = '{}'\n", path_text(input)?));
        if let Some(path) = descriptors {
            block.push_str(&format!("  descriptors = '{}'\n", path_text(path)?));
        }
        if let Some(path) = frames {
            block.push_str(&format!("  frames      = '{}'\n", path_text(path)?));
        }
        block.push_str(">\n");
        self.emit(block.as_bytes())
    }

    /// Write one PGM image; the protocol does not apply
    pub fn write_pgm(&mut self, image: &RasterImage) -> SiftResult<()> {
        match self.writer()? {
            Some(w) => pgm::encode(w, image),
            None => Ok(()),
        }
    }

    /// Read every remaining frame of a sink opened for reading
    pub fn read_frames(&mut self) -> SiftResult<Vec<Frame>> {
        if !self.config.active {
            return Ok(Vec::new());
        }
        let name = self.display_path();
        let protocol = self.config.protocol;
        let reader = match self.handle.as_mut() {
            Some(Handle::Reader(r)) => r,
            _ => {
                return Err(SiftError::io(
                    format!("'{}' is not open for reading", name),
                    std::io::ErrorKind::NotConnected.into(),
                ))
            }
        };
        match protocol {
            Protocol::Ascii | Protocol::AsciiFramed => read_ascii_frames(reader, protocol, &name),
            _ => read_binary_frames(reader, protocol, &name),
        }
    }

    /// Flush and release the handle; closing twice is a no-op
    pub fn close(&mut self) -> SiftResult<()> {
        match self.handle.take() {
            Some(Handle::Writer(mut w)) => w
                .flush()
                .map_err(|e| SiftError::io(format!("could not write '{}'", self.display_path()), e)),
            _ => Ok(()),
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("{}", e);
        }
    }
}

fn read_ascii_frames<R: BufRead>(reader: R, protocol: Protocol, name: &str) -> SiftResult<Vec<Frame>> {
    let mut frames = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SiftError::io(format!("could not read '{}'", name), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let bad = || SiftError::Format(format!("{}:{}: expected a frame", name, n + 1));
        let mut fields = line
            .split_whitespace()
            .map(|t| t.parse::<f64>().map_err(|_| bad()))
            .collect::<SiftResult<Vec<f64>>>()?;
        if protocol == Protocol::AsciiFramed {
            if fields.first() != Some(&(Frame::FIELDS as f64)) {
                return Err(bad());
            }
            fields.remove(0);
        }
        if fields.len() != Frame::FIELDS {
            return Err(bad());
        }
        frames.push(Frame::from_fields(&fields));
    }
    Ok(frames)
}

fn read_binary_frames<R: Read>(mut reader: R, protocol: Protocol, name: &str) -> SiftResult<Vec<Frame>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| SiftError::io(format!("could not read '{}'", name), e))?;
    let record = Frame::FIELDS * 8;
    if bytes.len() % record != 0 {
        return Err(SiftError::Format(format!(
            "{}: {} bytes is not a whole number of frames",
            name,
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(record)
        .map(|chunk| {
            let mut fields = [0.0f64; Frame::FIELDS];
            for (field, raw) in fields.iter_mut().zip(chunk.chunks_exact(8)) {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                *field = match protocol {
                    Protocol::BinaryLe => f64::from_le_bytes(buf),
                    _ => f64::from_be_bytes(buf),
                };
            }
            Frame::from_fields(&fields)
        })
        .collect())
}
