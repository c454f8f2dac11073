//! xSPI flash decoder
//!
//! Pulls [`BusSample`]s through an [`EdgeWaiter`] one edge at a time and
//! reconstructs flash transactions:
//!
//!   1. Wait for CS to go active and open a [`Transaction`]
//!   2. Wait for either CS going inactive or a CLK sampling edge
//!   3. Feed each sampling edge to the transaction, emitting bytes as they complete
//!   4. At CS inactive, interpret the transaction and emit its annotations
//!
//! A CS deassert and a sampling edge on the same sample close the
//! transaction without sampling the edge.

use super::commands::{Interpretation, interpret};
use super::lanes::LaneAssembler;
use super::session::{DecoderConfig, Session};
use super::transaction::Transaction;
use super::types::{Annotation, AnnotationClass, DecodeEvent, Span};
use crate::runtime::emitter::Emitter;
use crate::runtime::errors::{ConfigError, DecodeResult};
use crate::runtime::sample::{BusSample, Line};
use crate::runtime::waiter::{Condition, EdgeWaiter};
use tracing::{debug, info};

/// Counters for a decode run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Transactions with at least one byte on the bus
    pub transactions: u64,
    /// Chip-select windows without a single byte
    pub skipped: u64,
    pub bytes: u64,
    pub annotations: u64,
    /// Data commands outside the address filter
    pub filtered: u64,
    pub errors: u64,
    /// Transactions decoded from a carried command
    pub continued: u64,
}

/// Decoder for serial flash traffic on single and quad lanes
pub struct FlashDecoder {
    session: Session,
    lanes: LaneAssembler,
    summary: DecodeSummary,
}

impl FlashDecoder {
    pub fn new(config: DecoderConfig) -> Result<Self, ConfigError> {
        let session = Session::new(config)?;
        Ok(Self {
            lanes: LaneAssembler::new(config.bit_order, config.word_size),
            session,
            summary: DecodeSummary::default(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Counters accumulated over all runs
    pub fn summary(&self) -> DecodeSummary {
        self.summary
    }

    /// Decode a sample stream until it is exhausted.
    ///
    /// The session (address width, continuation) survives across calls, so
    /// a capture split into several streams can be decoded piecewise. A
    /// transaction still open when the stream ends is dropped.
    pub fn run<S, E>(&mut self, samples: S, emitter: &mut E) -> DecodeResult<DecodeSummary>
    where
        S: IntoIterator<Item = BusSample>,
        E: Emitter + ?Sized,
    {
        let config = *self.session.config();
        let assert = [Condition::new(Line::Cs, config.cs_polarity.assert_edge())];
        let deassert = [Condition::new(Line::Cs, config.cs_polarity.deassert_edge())];
        let clock = [Condition::new(Line::Clk, config.mode.sampling_edge())];

        let before = self.summary;
        let mut waiter = EdgeWaiter::new(samples);

        'transactions: while let Some(selected) = waiter.wait(&[&assert]) {
            let mut tx = self.begin(selected.sample.timestamp);

            loop {
                let Some(hit) = waiter.wait(&[&deassert, &clock]) else {
                    debug!(
                        "Capture ended inside transaction at t={} ({} bytes dropped)",
                        tx.start,
                        tx.clocked_bytes()
                    );
                    break 'transactions;
                };

                if hit.matched(0) {
                    tx.finish(hit.sample.timestamp);
                    self.finish(tx, emitter)?;
                    continue 'transactions;
                }

                if let Some(bytes) = tx.clock(&mut self.lanes, &hit.sample) {
                    self.summary.bytes += 1;
                    emitter.emit(DecodeEvent::Bytes(bytes))?;
                }
            }
        }

        self.lanes.discard();

        let run = DecodeSummary {
            transactions: self.summary.transactions - before.transactions,
            skipped: self.summary.skipped - before.skipped,
            bytes: self.summary.bytes - before.bytes,
            annotations: self.summary.annotations - before.annotations,
            filtered: self.summary.filtered - before.filtered,
            errors: self.summary.errors - before.errors,
            continued: self.summary.continued - before.continued,
        };
        info!(
            "Decoded {} transactions, {} bytes from {} samples ({} filtered, {} errors)",
            run.transactions,
            run.bytes,
            waiter.consumed(),
            run.filtered,
            run.errors
        );
        Ok(run)
    }

    fn begin(&mut self, timestamp: u64) -> Transaction {
        let carry = self.session.continuation();
        match carry {
            Some(c) => debug!(
                "CS active at t={}, continuing 0x{:02X} at clock {}",
                timestamp, c.command, c.quad_start
            ),
            None => debug!("CS active at t={}", timestamp),
        }
        Transaction::begin(timestamp, carry)
    }

    fn finish<E: Emitter + ?Sized>(&mut self, tx: Transaction, emitter: &mut E) -> DecodeResult {
        self.lanes.discard();

        if tx.is_degenerate() {
            debug!("CS window {}..{} without bytes, skipped", tx.start, tx.end);
            self.summary.skipped += 1;
            return Ok(());
        }

        debug_assert_eq!(tx.mosi.len(), tx.miso.len());
        self.summary.transactions += 1;
        debug!(
            "Transaction #{}: t={}..{}, {} MOSI bytes",
            self.summary.transactions,
            tx.start,
            tx.end,
            tx.mosi.len()
        );

        self.session.set_continuation(tx.continuation());

        let annotation = match interpret(&tx, &mut self.session) {
            Interpretation::Annotated(annotation) => annotation,
            Interpretation::Filtered { .. } => {
                self.summary.filtered += 1;
                return Ok(());
            }
        };

        let span = Span::new(tx.start, tx.end);
        if tx.continued {
            self.summary.continued += 1;
            if let Some(command) = tx.command {
                self.annotate(
                    emitter,
                    Annotation::new(
                        AnnotationClass::Warning,
                        span,
                        format!("Continuous read (0x{:02X})", command),
                    ),
                )?;
            }
        }

        self.annotate(
            emitter,
            Annotation::new(AnnotationClass::MisoTransfer, span, hex_join(&tx.miso)),
        )?;
        self.annotate(
            emitter,
            Annotation::new(AnnotationClass::MosiTransfer, span, hex_join(&tx.mosi)),
        )?;

        if annotation.class == AnnotationClass::Error {
            self.summary.errors += 1;
        }
        debug!("{}: {}", annotation.class, annotation.message);
        self.annotate(emitter, annotation)
    }

    fn annotate<E: Emitter + ?Sized>(&mut self, emitter: &mut E, annotation: Annotation) -> DecodeResult {
        self.summary.annotations += 1;
        emitter.emit(DecodeEvent::Annotation(annotation))
    }
}

/// Space-separated two-digit hex
fn hex_join(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a whole sample stream into a list of events
pub fn decode<S>(config: DecoderConfig, samples: S) -> DecodeResult<Vec<DecodeEvent>>
where
    S: IntoIterator<Item = BusSample>,
{
    let mut decoder = FlashDecoder::new(config)?;
    let mut events = Vec::new();
    decoder.run(samples, &mut events)?;
    Ok(events)
}
