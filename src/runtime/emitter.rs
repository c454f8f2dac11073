//! Sinks for decoded events
//!
//! A decoder pushes [`DecodeEvent`]s into an [`Emitter`] in capture order.
//! Collecting into a `Vec` suits tests and batch tools; a crossbeam
//! `Sender` hands events to a consumer thread.

use super::errors::DecodeResult;
use crate::decoders::types::DecodeEvent;
use crossbeam_channel::Sender;

/// Receiver of decoded byte and annotation events
pub trait Emitter {
    fn emit(&mut self, event: DecodeEvent) -> DecodeResult;
}

impl Emitter for Vec<DecodeEvent> {
    fn emit(&mut self, event: DecodeEvent) -> DecodeResult {
        self.push(event);
        Ok(())
    }
}

/// Fails with `SinkDisconnected` once the receiving side is dropped.
impl Emitter for Sender<DecodeEvent> {
    fn emit(&mut self, event: DecodeEvent) -> DecodeResult {
        self.send(event)?;
        Ok(())
    }
}

/// Adapter turning a closure into an [`Emitter`]
pub struct FnEmitter<F>(pub F);

impl<F: FnMut(DecodeEvent)> Emitter for FnEmitter<F> {
    fn emit(&mut self, event: DecodeEvent) -> DecodeResult {
        (self.0)(event);
        Ok(())
    }
}
