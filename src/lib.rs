//! xSPI flash bus decoder
//!
//! This library decodes logic-level captures of a serial flash bus (chip
//! select, clock and up to four data lines) into flash transactions: the
//! command issued, the address range touched and the bytes seen on each lane.
//!
//! # Architecture
//!
//! - **EdgeWaiter**: forward-only cursor that finds the next sample matching an edge condition
//! - **LaneAssembler**: builds single-lane words and quad bytes from sampled lines
//! - **FlashDecoder**: per-transaction state machine, command table and address tracking
//! - **Emitter**: sink for byte and annotation events (`Vec`, crossbeam channel, closure)
//! - **DslCapture**: streams samples from DSLogic .dsl files
//!
//! # Example
//!
//! ```no_run
//! use xspi::{ChannelMap, DecoderConfig, DslCapture, FlashDecoder, Line};
//!
//! let capture = DslCapture::open("flash.dsl")?;
//! let samples = capture.into_samples(ChannelMap::new(0, 1).with(Line::D0, 2).with(Line::D1, 3))?;
//!
//! let mut decoder = FlashDecoder::new(DecoderConfig::default())?;
//! let mut events = Vec::new();
//! decoder.run(samples, &mut events)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod capture;
pub mod decoders;
pub mod runtime;

// Re-export decoder types
pub use decoders::{
    AddressWidth, Annotation, AnnotationClass, BitOrder, ByteEvent, CsPolarity, DecodeEvent,
    DecodeSummary, DecoderConfig, FlashDecoder, SpiMode, decode,
};

// Re-export runtime components
pub use runtime::{
    BusSample, ConfigError, DecodeError, DecodeResult, EdgeWaiter, Emitter, FnEmitter, Line,
};

pub use capture::{ChannelMap, DslCapture};

#[derive(Error, Debug)]
pub enum DslError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Header parsing error: {0}")]
    ParseHeader(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid probe number: {0}")]
    InvalidProbe(usize),

    #[error("Invalid block number: {0}")]
    InvalidBlock(u64),
}

pub type Result<T> = std::result::Result<T, DslError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::dsl_file::tests::capture_archive;
    use crate::decoders::testing::BusBuilder;

    #[test]
    fn test_decode_from_capture() {
        let bus = BusBuilder::new()
            .select()
            .bytes(&[0x06])
            .deselect()
            .select()
            .bytes(&[0x03, 0x00, 0x10, 0x00, 0x11, 0x22])
            .deselect()
            .build();

        // One capture sample per bus sample: CS, CLK, D0, D1 on probes 0-3
        let probes: Vec<Vec<bool>> = [Line::Cs, Line::Clk, Line::D0, Line::D1]
            .iter()
            .map(|&line| bus.iter().map(|s| s.get(line)).collect())
            .collect();
        let archive = capture_archive("100 MHz", 64, &probes);

        let map = ChannelMap::new(0, 1).with(Line::D0, 2).with(Line::D1, 3);
        let samples = DslCapture::from_reader(archive)
            .unwrap()
            .into_samples(map)
            .unwrap();

        let events = decode(DecoderConfig::default(), samples).unwrap();
        let messages: Vec<&str> = events
            .iter()
            .filter_map(DecodeEvent::as_annotation)
            .filter(|a| a.class.id() >= 5)
            .map(|a| a.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec!["Write Enable", "Read 0x001000 - 0x001001 (2 data bytes)"]
        );
    }
}
