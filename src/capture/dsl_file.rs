//! DSL file source
//!
//! Provides `DslCapture` - a reader for DSLogic .dsl capture files that yields a
//! change-only [`BusSample`] stream for the lines named in a [`ChannelMap`].
//!
//! A .dsl file is a ZIP archive holding a `header` text file and one entry per
//! probe and block (`L-<probe>/<block>`), each a bit-packed run of samples,
//! least significant bit first.

use crate::runtime::sample::{BusSample, Line};
use crate::{DslError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Header information from a DSL file
#[derive(Debug, Clone)]
pub struct DslHeader {
    /// Total number of probes/channels
    pub total_probes: usize,
    /// Sample rate as a string (e.g., "50 MHz")
    pub samplerate: String,
    /// Sample rate in Hz
    pub samplerate_hz: f64,
    /// Sample period in seconds (1 / sample_rate)
    pub sample_period: f64,
    /// Total number of samples captured
    pub total_samples: u64,
    /// Total number of data blocks
    pub total_blocks: u64,
    /// Samples per block (calculated)
    pub samples_per_block: u64,
    /// Probe names indexed by probe number (0-based)
    pub probe_names: Vec<String>,
}

impl DslHeader {
    /// Nanoseconds between two samples, never zero
    pub fn timestamp_step(&self) -> u64 {
        ((1_000_000_000.0 / self.samplerate_hz) as u64).max(1)
    }
}

/// Which capture probe drives which bus line
///
/// CS and CLK are required. Unmapped data lines read low.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    probes: Vec<(Line, usize)>,
}

impl ChannelMap {
    pub fn new(cs: usize, clk: usize) -> Self {
        Self {
            probes: vec![(Line::Cs, cs), (Line::Clk, clk)],
        }
    }

    /// Map a probe onto a line, replacing an earlier mapping of that line
    pub fn with(mut self, line: Line, probe: usize) -> Self {
        self.probes.retain(|(l, _)| *l != line);
        self.probes.push((line, probe));
        self
    }

    /// Map a probe onto a line if one is given
    pub fn with_optional(self, line: Line, probe: Option<usize>) -> Self {
        match probe {
            Some(probe) => self.with(line, probe),
            None => self,
        }
    }

    pub fn probe(&self, line: Line) -> Option<usize> {
        self.probes.iter().find(|(l, _)| *l == line).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Line, usize)> + '_ {
        self.probes.iter().copied()
    }
}

/// Reader for a DSLogic .dsl capture
pub struct DslCapture<R> {
    archive: ZipArchive<R>,
    header: DslHeader,
    max_samples: Option<u64>,
}

impl DslCapture<File> {
    /// Open a capture from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening capture {}", path.display());
        Self::from_reader(File::open(path)?)
    }
}

impl<R: Read + Seek> DslCapture<R> {
    /// Read a capture from any seekable source
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let header = Self::parse_header(&mut archive)?;

        info!(
            "Capture: {} probes, {} samples at {}",
            header.total_probes, header.total_samples, header.samplerate
        );

        Ok(Self {
            archive,
            header,
            max_samples: None,
        })
    }

    fn parse_header(archive: &mut ZipArchive<R>) -> Result<DslHeader> {
        let mut header_file = archive
            .by_name("header")
            .map_err(|e| DslError::ParseHeader(format!("Cannot find header file: {}", e)))?;

        let mut header_content = String::new();
        header_file.read_to_string(&mut header_content)?;
        drop(header_file);

        let mut total_probes: Option<usize> = None;
        let mut samplerate: Option<String> = None;
        let mut total_samples: Option<u64> = None;
        let mut total_blocks: Option<u64> = None;
        let mut probe_names_map: HashMap<usize, String> = HashMap::new();

        for line in header_content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(value) = line.strip_prefix("total probes = ") {
                total_probes = value.parse().ok();
            } else if let Some(value) = line.strip_prefix("samplerate = ") {
                samplerate = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("total samples = ") {
                total_samples = value.parse().ok();
            } else if let Some(value) = line.strip_prefix("total blocks = ") {
                total_blocks = value.parse().ok();
            } else if let Some((probe_part, name)) = line.split_once(" = ")
                && let Some(num_str) = probe_part.strip_prefix("probe")
                && let Ok(probe_num) = num_str.parse::<usize>()
            {
                probe_names_map.insert(probe_num, name.to_string());
            }
        }

        let total_probes =
            total_probes.ok_or_else(|| DslError::MissingField("total probes".to_string()))?;
        let samplerate =
            samplerate.ok_or_else(|| DslError::MissingField("samplerate".to_string()))?;
        let total_samples =
            total_samples.ok_or_else(|| DslError::MissingField("total samples".to_string()))?;
        let total_blocks =
            total_blocks.ok_or_else(|| DslError::MissingField("total blocks".to_string()))?;

        let samplerate_hz = Self::parse_sample_rate(&samplerate)
            .ok_or_else(|| DslError::ParseHeader(format!("Invalid sample rate: {}", samplerate)))?;

        // Blocks are fixed-size except the last one
        let samples_per_block = {
            let mut file = archive
                .by_name("L-0/0")
                .map_err(|_| DslError::ParseHeader("Could not read first block".to_string()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            (buf.len() * 8) as u64
        };
        if samples_per_block == 0 {
            return Err(DslError::ParseHeader("First block is empty".to_string()));
        }

        debug!(
            "File has {} samples across {} blocks ({} samples/block standard size)",
            total_samples, total_blocks, samples_per_block
        );

        let probe_names = (0..total_probes)
            .map(|i| {
                probe_names_map
                    .get(&i)
                    .cloned()
                    .unwrap_or_else(|| format!("Probe{}", i))
            })
            .collect();

        Ok(DslHeader {
            total_probes,
            samplerate,
            samplerate_hz,
            sample_period: 1.0 / samplerate_hz,
            total_samples,
            total_blocks,
            samples_per_block,
            probe_names,
        })
    }

    pub fn header(&self) -> &DslHeader {
        &self.header
    }

    pub fn total_samples(&self) -> u64 {
        self.header.total_samples
    }

    pub fn samplerate_hz(&self) -> f64 {
        self.header.samplerate_hz
    }

    /// Capture length in seconds
    pub fn capture_duration(&self) -> f64 {
        self.header.total_samples as f64 * self.header.sample_period
    }

    /// Stop the sample stream after `max_samples` samples
    pub fn with_max_samples(mut self, max_samples: Option<u64>) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Turn the capture into a bus sample stream.
    ///
    /// Only samples where at least one mapped line changes are yielded, plus
    /// the very first sample. Timestamps are in nanoseconds from capture start.
    pub fn into_samples(self, map: ChannelMap) -> Result<DslSamples<R>> {
        for (line, probe) in map.iter() {
            if probe >= self.header.total_probes {
                debug!("{} mapped to missing probe {}", line, probe);
                return Err(DslError::InvalidProbe(probe));
            }
            debug!(
                "{} <- probe {} ({})",
                line, probe, self.header.probe_names[probe]
            );
        }

        let total_samples = self
            .max_samples
            .unwrap_or(self.header.total_samples)
            .min(self.header.total_samples);

        Ok(DslSamples {
            archive: self.archive,
            step: self.header.timestamp_step(),
            header: self.header,
            map,
            total_samples,
            position: 0,
            block_num: None,
            block_data: HashMap::new(),
            last: None,
            emitted: 0,
            error: None,
        })
    }

    /// Parse a DSLogic sample rate such as "50 MHz"
    fn parse_sample_rate(samplerate: &str) -> Option<f64> {
        let mut parts = samplerate.split_whitespace();
        let value = parts.next()?.parse::<f64>().ok()?;
        let multiplier = match parts.next()? {
            "GHz" => 1_000_000_000.0,
            "MHz" => 1_000_000.0,
            "KHz" | "kHz" => 1_000.0,
            "Hz" => 1.0,
            _ => return None,
        };
        Some(value * multiplier)
    }
}

fn load_block<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    probe: usize,
    block_num: u64,
) -> Result<Arc<[u8]>> {
    let block_name = format!("L-{}/{}", probe, block_num);
    let mut file = archive
        .by_name(&block_name)
        .map_err(|_| DslError::InvalidBlock(block_num))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(Arc::from(data))
}

/// Extract a single bit from a byte array at the given bit index
#[inline]
fn get_bit(data: &[u8], bit_index: usize) -> bool {
    data.get(bit_index / 8)
        .is_some_and(|byte| (byte >> (bit_index % 8)) & 1 == 1)
}

/// Change-only [`BusSample`] stream over a capture
///
/// Ends at the last sample, or early if a block cannot be read. In that case
/// the read error is kept and can be fetched with [`DslSamples::take_error`].
pub struct DslSamples<R> {
    archive: ZipArchive<R>,
    header: DslHeader,
    map: ChannelMap,
    step: u64,
    total_samples: u64,
    position: u64,
    block_num: Option<u64>,
    /// Current block per mapped probe
    block_data: HashMap<usize, Arc<[u8]>>,
    last: Option<u8>,
    emitted: u64,
    error: Option<DslError>,
}

impl<R: Read + Seek> DslSamples<R> {
    /// The error that ended the stream early, if any
    pub fn error(&self) -> Option<&DslError> {
        self.error.as_ref()
    }

    /// Take the error that ended the stream early, if any
    pub fn take_error(&mut self) -> Option<DslError> {
        self.error.take()
    }

    fn fail(&mut self, position: u64, error: DslError) {
        warn!(
            "Capture truncated at sample {} of {}: {}",
            position, self.total_samples, error
        );
        self.position = self.total_samples;
        self.emitted = 0;
        self.error = Some(error);
    }

    fn load(&mut self, block_num: u64) -> Result<()> {
        self.block_data.clear();
        for (_, probe) in self.map.iter() {
            if !self.block_data.contains_key(&probe) {
                let data = load_block(&mut self.archive, probe, block_num)?;
                self.block_data.insert(probe, data);
            }
        }
        self.block_num = Some(block_num);
        Ok(())
    }

    fn lines_at(&self, sample_in_block: usize) -> u8 {
        self.map.iter().fold(0u8, |lines, (line, probe)| {
            let high = self
                .block_data
                .get(&probe)
                .is_some_and(|data| get_bit(data, sample_in_block));
            if high { lines | line.mask() } else { lines }
        })
    }
}

impl<R: Read + Seek> Iterator for DslSamples<R> {
    type Item = BusSample;

    fn next(&mut self) -> Option<BusSample> {
        while self.position < self.total_samples {
            let position = self.position;
            self.position += 1;

            let block_num = position / self.header.samples_per_block;
            if self.block_num != Some(block_num) {
                if block_num >= self.header.total_blocks {
                    self.fail(position, DslError::InvalidBlock(block_num));
                    return None;
                }
                if let Err(e) = self.load(block_num) {
                    self.fail(position, e);
                    return None;
                }
            }

            let sample_in_block = (position % self.header.samples_per_block) as usize;
            let lines = self.lines_at(sample_in_block);
            if self.last == Some(lines) {
                continue;
            }

            self.last = Some(lines);
            self.emitted += 1;
            return Some(BusSample::new(position * self.step, lines));
        }

        if self.emitted > 0 {
            info!(
                "Capture finished: {} samples read, {} changes",
                self.total_samples, self.emitted
            );
            self.emitted = 0;
        }
        None
    }
}
