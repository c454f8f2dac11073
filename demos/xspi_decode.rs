//! Example: xSPI flash decoding
//!
//! Decodes serial flash traffic from a DSL file and prints the commands.
//!
//! Usage:
//!   cargo run --release --example xspi_decode -- \
//!       --file flash.dsl \
//!       --cs 0 --clk 1 --d0 2 --d1 3 --d2 4 --d3 5
//!
//! Only reads from 0x10000 up, with byte values and CSV output:
//!   cargo run --release --example xspi_decode -- \
//!       --file flash.dsl \
//!       --cs 0 --clk 1 --d0 2 --d1 3 \
//!       --min-address 0x10000 --bytes \
//!       --csv-output flash.csv

use clap::Parser;
use crossbeam_channel::bounded;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::thread;
use tracing::{debug, info};
use xspi::{
    BitOrder, ChannelMap, CsPolarity, DecodeError, DecodeEvent, DecodeResult, DecoderConfig,
    DslCapture, DslError, FlashDecoder, Line, SpiMode,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to DSL file
    #[arg(short, long)]
    file: String,

    /// Chip select channel
    #[arg(long)]
    cs: usize,

    /// Clock channel
    #[arg(long)]
    clk: usize,

    /// MOSI / IO0 channel
    #[arg(long)]
    d0: Option<usize>,

    /// MISO / IO1 channel
    #[arg(long)]
    d1: Option<usize>,

    /// IO2 channel
    #[arg(long)]
    d2: Option<usize>,

    /// IO3 channel
    #[arg(long)]
    d3: Option<usize>,

    /// CS polarity (active-low, active-high)
    #[arg(long, default_value = "active-low")]
    cs_polarity: CsPolarity,

    /// Clock polarity
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    cpol: u8,

    /// Clock phase
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    cpha: u8,

    /// Bit order (msb-first, lsb-first)
    #[arg(long, default_value = "msb-first")]
    bit_order: BitOrder,

    /// Number of address bytes (1-4)
    #[arg(long, default_value_t = 3)]
    address_bytes: u8,

    /// Minimum address to annotate (hex)
    #[arg(long, value_parser = parse_hex, default_value = "0")]
    min_address: u32,

    /// Maximum address to annotate (hex)
    #[arg(long, value_parser = parse_hex, default_value = "ffffffff")]
    max_address: u32,

    /// Also print every decoded byte
    #[arg(long)]
    bytes: bool,

    /// Number of samples to read (0 = all)
    #[arg(short, long, default_value = "0")]
    n: u64,

    /// CSV output file path (optional)
    #[arg(long)]
    csv_output: Option<String>,
}

fn parse_hex(s: &str) -> Result<u32, std::num::ParseIntError> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16)
}

/// Writes annotations to a CSV file
struct CsvWriter {
    writer: BufWriter<File>,
    count: usize,
}

impl CsvWriter {
    fn new(path: &str) -> Result<Self, std::io::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "Id,Start[ns],End[ns],Class,Message")?;
        Ok(Self { writer, count: 0 })
    }

    fn write(&mut self, event: &DecodeEvent) -> Result<(), std::io::Error> {
        if let DecodeEvent::Annotation(a) = event {
            self.count += 1;
            writeln!(
                self.writer,
                "{},{},{},{},\"{}\"",
                self.count, a.span.start, a.span.end, a.class, a.message
            )?;
        }
        Ok(())
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Pick the error to report once all threads are done.
///
/// A printer failure shows up in the decoder as a disconnected sink, so the
/// printer's own error comes first, then a truncated capture.
fn settle<T>(
    result: DecodeResult<T>,
    capture_error: Option<DslError>,
    printed: Result<usize, std::io::Error>,
) -> Result<(T, usize), Box<dyn std::error::Error>> {
    let annotations = printed?;
    if let Some(e) = capture_error {
        return Err(e.into());
    }
    Ok((result?, annotations))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== xSPI Flash Decode Example ===");
    info!("File: {}", args.file);
    info!(
        "Bus: CS={}, CLK={}, D0={:?}, D1={:?}, D2={:?}, D3={:?}",
        args.cs, args.clk, args.d0, args.d1, args.d2, args.d3
    );

    let config = DecoderConfig::default()
        .with_cs_polarity(args.cs_polarity)
        .with_mode(SpiMode::from_cpol_cpha(args.cpol == 1, args.cpha == 1))
        .with_bit_order(args.bit_order)
        .with_address_bytes(args.address_bytes)
        .with_address_range(args.min_address, args.max_address);
    let mut decoder = FlashDecoder::new(config)?;

    let map = ChannelMap::new(args.cs, args.clk)
        .with_optional(Line::D0, args.d0)
        .with_optional(Line::D1, args.d1)
        .with_optional(Line::D2, args.d2)
        .with_optional(Line::D3, args.d3);
    let max_samples = (args.n > 0).then_some(args.n);
    let capture = DslCapture::open(&args.file)?.with_max_samples(max_samples);
    info!(
        "Capture spans {:.3} ms ({} samples at {} Hz)",
        capture.capture_duration() * 1e3,
        capture.total_samples(),
        capture.samplerate_hz()
    );
    let mut samples = capture.into_samples(map)?;

    let mut csv = args.csv_output.as_deref().map(CsvWriter::new).transpose()?;
    let show_bytes = args.bytes;

    // Source thread -> decoder -> printer thread
    let (sample_tx, sample_rx) = bounded(100_000);
    let (event_tx, event_rx) = bounded::<DecodeEvent>(10_000);

    let source = thread::spawn(move || {
        for sample in samples.by_ref() {
            if sample_tx.send(sample).is_err() {
                debug!("Decoder stopped, source shutting down");
                break;
            }
        }
        samples.take_error()
    });

    let printer = thread::spawn(move || -> Result<usize, std::io::Error> {
        let mut count = 0;
        for event in event_rx {
            match &event {
                DecodeEvent::Bytes(b) if show_bytes => {
                    info!(
                        "  [{}..{}] MOSI={} MISO={}",
                        b.span.start,
                        b.span.end,
                        b.mosi_hex(),
                        b.miso_hex()
                    );
                }
                DecodeEvent::Bytes(_) => {}
                DecodeEvent::Annotation(a) => {
                    count += 1;
                    info!("[{}..{}] {}: {}", a.span.start, a.span.end, a.class, a.message);
                }
            }
            if let Some(csv) = csv.as_mut() {
                csv.write(&event)?;
            }
        }
        Ok(count)
    });

    let mut sink = event_tx;
    let result = decoder.run(sample_rx, &mut sink);
    drop(sink);

    let capture_error = source.join().map_err(|_| "source thread panicked")?;
    let printed = printer.join().map_err(|_| "printer thread panicked")?;
    let (summary, annotations) = settle(result, capture_error, printed)?;

    info!(
        "Done: {} transactions, {} bytes, {} annotations printed, {} filtered, {} errors",
        summary.transactions, summary.bytes, annotations, summary.filtered, summary.errors
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    fn csv_failure() -> Result<usize, Error> {
        Err(Error::new(ErrorKind::StorageFull, "disk full"))
    }

    #[test]
    fn test_printer_error_wins_over_disconnected_sink() {
        let result: DecodeResult<()> = Err(DecodeError::SinkDisconnected);
        let err = settle(result, None, csv_failure()).unwrap_err();
        let io = err.downcast_ref::<Error>().unwrap();
        assert_eq!(io.kind(), ErrorKind::StorageFull);
    }

    #[test]
    fn test_truncated_capture_is_an_error() {
        let err = settle(Ok(3), Some(DslError::InvalidBlock(1)), Ok(2)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DslError>(),
            Some(DslError::InvalidBlock(1))
        ));
    }

    #[test]
    fn test_clean_run() {
        let (summary, annotations) = settle(Ok(7), None, Ok(2)).unwrap();
        assert_eq!((summary, annotations), (7, 2));
    }

    #[test]
    fn test_decoder_error_without_printer_error() {
        let result: DecodeResult<()> = Err(DecodeError::SinkDisconnected);
        let err = settle(result, None, Ok(0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::SinkDisconnected)
        ));
    }
}
