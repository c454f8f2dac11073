//! Capture file sources
//!
//! Readers that turn logic analyzer captures into [`BusSample`](crate::runtime::BusSample)
//! streams for the decoders.

pub mod dsl_file;

pub use dsl_file::{ChannelMap, DslCapture, DslHeader, DslSamples};
