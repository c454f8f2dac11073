//! One chip-select window and its clock-by-clock state machine
//!
//! Clock positions count sampling edges from the start of the window. The
//! opcode completes at position 7. Quad-capable opcodes switch the bus to
//! quad nibbles from position 8 on; the byte completing at `quad_start + 7`
//! carries the continuation signature in its high nibble, and the bytes
//! completing in the following `dummy_clocks` positions are turnaround
//! bytes driven by the flash.
//!
//! A transaction continued from the previous window starts at position 8
//! with the carried opcode already in place.

use super::commands::lookup;
use super::lanes::LaneAssembler;
use super::session::Continuation;
use super::types::{ByteEvent, Span};
use crate::runtime::sample::{BusSample, Line};
use tracing::{debug, trace};

/// High nibble that keeps a quad read in continuous mode
const CONTINUATION_NIBBLE: u8 = 0xA0;

/// Position of the last opcode bit
const OPCODE_END: u32 = 7;

/// First position after the opcode
const QUAD_START: u32 = 8;

#[derive(Debug, Clone)]
pub struct Transaction {
    pub start: u64,
    pub end: u64,
    pub mosi: Vec<u8>,
    pub miso: Vec<u8>,
    pub command: Option<u8>,
    /// Clock position where quad assembly begins
    pub quad_start: Option<u32>,
    pub dummy_clocks: u32,
    /// Opcode was carried over from the previous window
    pub continued: bool,

    /// Next clock position
    clock: u32,
    /// Outcome of the continuation signature check, once it ran
    signature: Option<bool>,
    /// Bytes actually clocked on the bus
    clocked: usize,
}

impl Transaction {
    /// Open a transaction at chip-select assertion
    pub fn begin(start: u64, carry: Option<Continuation>) -> Self {
        let mut tx = Self {
            start,
            end: start,
            mosi: Vec::new(),
            miso: Vec::new(),
            command: None,
            quad_start: None,
            dummy_clocks: 0,
            continued: false,
            clock: 0,
            signature: None,
            clocked: 0,
        };

        if let Some(carry) = carry {
            tx.mosi.push(carry.command);
            tx.miso.push(0);
            tx.command = Some(carry.command);
            tx.quad_start = Some(carry.quad_start);
            tx.dummy_clocks = carry.dummy_clocks;
            tx.continued = true;
            tx.clock = carry.quad_start;
        }

        tx
    }

    /// Handle one sampling edge. Returns the byte completed on this edge.
    pub fn clock(&mut self, lanes: &mut LaneAssembler, sample: &BusSample) -> Option<ByteEvent> {
        let position = self.clock;
        self.clock += 1;

        if self.is_quad_at(position) {
            self.clock_quad(position, lanes, sample)
        } else {
            self.clock_single(position, lanes, sample)
        }
    }

    fn clock_single(
        &mut self,
        position: u32,
        lanes: &mut LaneAssembler,
        sample: &BusSample,
    ) -> Option<ByteEvent> {
        let word = lanes.push_bits(sample.get(Line::D0), sample.get(Line::D1), sample.timestamp)?;
        // Word size is always 8 here
        let (mosi, miso) = (word.mosi as u8, word.miso as u8);

        if position == OPCODE_END {
            self.command = Some(mosi);
            if let Some(descriptor) = lookup(mosi)
                && let Some(dummy) = descriptor.dummy_clocks
            {
                debug!(
                    "{} (0x{:02X}): {} lanes from clock {}, {} dummy clocks",
                    descriptor.name(),
                    mosi,
                    descriptor.lanes(),
                    QUAD_START,
                    dummy
                );
                self.quad_start = Some(QUAD_START);
                self.dummy_clocks = dummy;
            }
        }

        Some(self.push(word.span, mosi, miso))
    }

    fn clock_quad(
        &mut self,
        position: u32,
        lanes: &mut LaneAssembler,
        sample: &BusSample,
    ) -> Option<ByteEvent> {
        let byte = lanes.push_nibble(sample.quad_nibble(), sample.timestamp)?;

        if position == self.check_position() && self.dummy_clocks > 0 {
            let armed = byte.value & 0xF0 == CONTINUATION_NIBBLE;
            trace!(
                "Continuation signature 0x{:02X} at clock {}: {}",
                byte.value,
                position,
                if armed { "armed" } else { "disarmed" }
            );
            self.signature = Some(armed);
        }

        let event = if self.in_dummy_window(position) {
            self.push(byte.span, 0, byte.value)
        } else {
            self.push(byte.span, byte.value, 0)
        };
        Some(event)
    }

    fn push(&mut self, span: Span, mosi: u8, miso: u8) -> ByteEvent {
        self.mosi.push(mosi);
        self.miso.push(miso);
        self.clocked += 1;
        ByteEvent { span, miso, mosi }
    }

    fn is_quad_at(&self, position: u32) -> bool {
        self.quad_start.is_some_and(|q| position >= q)
    }

    /// Position of the byte carrying the continuation signature
    fn check_position(&self) -> u32 {
        self.quad_start.unwrap_or(QUAD_START) + 7
    }

    /// Whether a byte completing at `position` is a turnaround byte
    pub fn in_dummy_window(&self, position: u32) -> bool {
        let check = self.check_position();
        self.quad_start.is_some() && check < position && position <= check + self.dummy_clocks
    }

    /// Close the transaction at chip-select deassertion
    pub fn finish(&mut self, end: u64) {
        self.end = end;
    }

    /// Next clock position
    pub fn position(&self) -> u32 {
        self.clock
    }

    /// No byte was clocked on the bus in this window
    pub fn is_degenerate(&self) -> bool {
        self.clocked == 0
    }

    /// Bytes clocked on the bus, excluding a carried opcode
    pub fn clocked_bytes(&self) -> usize {
        self.clocked
    }

    /// Continuation to carry into the next window.
    ///
    /// Requires a matching signature and a dummy window that fully elapsed.
    pub fn continuation(&self) -> Option<Continuation> {
        let quad_start = self.quad_start?;
        let command = self.command?;
        let elapsed = self.clock > self.check_position() + self.dummy_clocks;
        (self.signature == Some(true) && elapsed).then_some(Continuation {
            command,
            quad_start,
            dummy_clocks: self.dummy_clocks,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_bytes(start: u64, end: u64, mosi: &[u8]) -> Self {
        let mut tx = Self::begin(start, None);
        tx.mosi = mosi.to_vec();
        tx.miso = vec![0; mosi.len()];
        tx.command = mosi.first().copied();
        tx.clocked = mosi.len();
        tx.end = end;
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::types::BitOrder;

    fn single(tx: &mut Transaction, lanes: &mut LaneAssembler, mosi: u8, t: &mut u64) -> Option<ByteEvent> {
        let mut out = None;
        for i in (0..8).rev() {
            let lines = if (mosi >> i) & 1 == 1 { Line::D0.mask() } else { 0 };
            out = tx.clock(lanes, &BusSample::new(*t, lines));
            *t += 2;
        }
        out
    }

    fn quad(tx: &mut Transaction, lanes: &mut LaneAssembler, byte: u8, t: &mut u64) -> Option<ByteEvent> {
        tx.clock(lanes, &BusSample::new(*t, (byte >> 4) << 2));
        *t += 2;
        let out = tx.clock(lanes, &BusSample::new(*t, (byte & 0x0F) << 2));
        *t += 2;
        out
    }

    #[test]
    fn test_single_lane_command() {
        let mut lanes = LaneAssembler::new(BitOrder::MsbFirst, 8);
        let mut tx = Transaction::begin(0, None);
        let mut t = 10;

        let event = single(&mut tx, &mut lanes, 0x03, &mut t).unwrap();
        assert_eq!(event.mosi, 0x03);
        assert_eq!(event.span.start, 10);
        assert_eq!(tx.command, Some(0x03));
        assert_eq!(tx.quad_start, None);
        assert_eq!(tx.position(), 8);
    }

    #[test]
    fn test_quad_switch_and_dummy_window() {
        let mut lanes = LaneAssembler::new(BitOrder::MsbFirst, 8);
        let mut tx = Transaction::begin(0, None);
        let mut t = 10;

        single(&mut tx, &mut lanes, 0xEB, &mut t);
        assert_eq!(tx.quad_start, Some(8));
        assert_eq!(tx.dummy_clocks, 4);

        for byte in [0x00, 0x10, 0x00] {
            assert_eq!(quad(&mut tx, &mut lanes, byte, &mut t).unwrap().mosi, byte);
        }
        // Mode byte completes at position 15
        let mode = quad(&mut tx, &mut lanes, 0xA5, &mut t).unwrap();
        assert_eq!((mode.mosi, mode.miso), (0xA5, 0));

        // Turnaround bytes land on MISO
        for _ in 0..2 {
            let dummy = quad(&mut tx, &mut lanes, 0xFF, &mut t).unwrap();
            assert_eq!((dummy.mosi, dummy.miso), (0, 0xFF));
        }
        assert!(tx.continuation().is_some());

        let data = quad(&mut tx, &mut lanes, 0x42, &mut t).unwrap();
        assert_eq!((data.mosi, data.miso), (0x42, 0));
        assert_eq!(tx.mosi, vec![0xEB, 0x00, 0x10, 0x00, 0xA5, 0, 0, 0x42]);
    }

    #[test]
    fn test_continuation_needs_elapsed_window() {
        let mut lanes = LaneAssembler::new(BitOrder::MsbFirst, 8);
        let mut tx = Transaction::begin(0, None);
        let mut t = 0;

        single(&mut tx, &mut lanes, 0xEB, &mut t);
        for byte in [0x00, 0x00, 0x00, 0xA0] {
            quad(&mut tx, &mut lanes, byte, &mut t);
        }
        // One of two dummy bytes
        quad(&mut tx, &mut lanes, 0x00, &mut t);
        assert!(tx.continuation().is_none());
    }

    #[test]
    fn test_wrong_signature_disarms() {
        let mut lanes = LaneAssembler::new(BitOrder::MsbFirst, 8);
        let mut tx = Transaction::begin(0, None);
        let mut t = 0;

        single(&mut tx, &mut lanes, 0xEB, &mut t);
        for byte in [0x00, 0x00, 0x00, 0xF0, 0x00, 0x00, 0x11] {
            quad(&mut tx, &mut lanes, byte, &mut t);
        }
        assert!(tx.continuation().is_none());
    }

    #[test]
    fn test_continued_transaction_starts_in_quad() {
        let carry = Continuation {
            command: 0xEB,
            quad_start: 8,
            dummy_clocks: 4,
        };
        let mut lanes = LaneAssembler::new(BitOrder::MsbFirst, 8);
        let mut tx = Transaction::begin(5, Some(carry));
        assert!(tx.continued);
        assert_eq!(tx.position(), 8);
        assert_eq!(tx.mosi, vec![0xEB]);
        assert!(tx.is_degenerate());

        let mut t = 10;
        let first = quad(&mut tx, &mut lanes, 0x12, &mut t).unwrap();
        assert_eq!(first.mosi, 0x12);
        assert_eq!(tx.clocked_bytes(), 1);
    }
}
