//! Serial flash protocol decoder
//!
//! Bytes are assembled by [`LaneAssembler`], grouped per chip-select window
//! into a [`Transaction`] and classified by the command table.

pub mod commands;
pub mod lanes;
pub mod session;
pub mod transaction;
pub mod types;
pub mod xspi_flash;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types
pub use types::{
    Annotation, AnnotationClass, BitOrder, ByteEvent, CsPolarity, DecodeEvent, Span, SpiMode,
};

pub use commands::{CommandDescriptor, CommandKind, Interpretation, interpret, lookup};
pub use lanes::LaneAssembler;
pub use session::{AddressWidth, Continuation, DecoderConfig, Session};
pub use transaction::Transaction;
pub use xspi_flash::{DecodeSummary, FlashDecoder, decode};
