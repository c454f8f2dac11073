//! Lane assembler: clocked bits and nibbles into words
//!
//! Single-lane transfers shift one MOSI and one MISO bit per sampling edge
//! into two accumulators. Quad transfers take a 4-bit nibble per edge and
//! complete a byte every second edge, high nibble first.

use super::types::{BitOrder, Span};
use tracing::{debug, trace};

/// A completed single-lane word on both MOSI and MISO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub mosi: u32,
    pub miso: u32,
    pub span: Span,
}

/// A completed quad byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadByte {
    pub value: u8,
    pub span: Span,
}

/// Accumulates sampled lanes into words
#[derive(Debug, Clone)]
pub struct LaneAssembler {
    bit_order: BitOrder,
    word_size: u32,

    mosi: u32,
    miso: u32,
    bits: u32,

    quad: u8,
    nibbles: u8,

    /// Timestamp of the first edge of the word in progress
    word_start: Option<u64>,
}

impl LaneAssembler {
    /// Create an assembler for `word_size`-bit single-lane words (1-32).
    pub fn new(bit_order: BitOrder, word_size: u32) -> Self {
        debug_assert!((1..=32).contains(&word_size));
        Self {
            bit_order,
            word_size,
            mosi: 0,
            miso: 0,
            bits: 0,
            quad: 0,
            nibbles: 0,
            word_start: None,
        }
    }

    /// Shift in one bit per lane. Returns the word once `word_size` bits are in.
    pub fn push_bits(&mut self, mosi: bool, miso: bool, timestamp: u64) -> Option<Word> {
        let start = *self.word_start.get_or_insert(timestamp);

        match self.bit_order {
            BitOrder::MsbFirst => {
                self.mosi = (self.mosi << 1) | u32::from(mosi);
                self.miso = (self.miso << 1) | u32::from(miso);
            }
            BitOrder::LsbFirst => {
                self.mosi |= u32::from(mosi) << self.bits;
                self.miso |= u32::from(miso) << self.bits;
            }
        }
        self.bits += 1;

        trace!(
            "bit {}: MOSI={} MISO={} at t={}",
            self.bits - 1,
            u8::from(mosi),
            u8::from(miso),
            timestamp
        );

        if self.bits < self.word_size {
            return None;
        }

        let word = Word {
            mosi: self.mosi,
            miso: self.miso,
            span: Span::new(start, timestamp),
        };
        self.clear();
        Some(word)
    }

    /// Shift in one quad nibble. Returns the byte on every second nibble.
    pub fn push_nibble(&mut self, nibble: u8, timestamp: u64) -> Option<QuadByte> {
        let start = *self.word_start.get_or_insert(timestamp);

        self.quad = (self.quad << 4) | (nibble & 0x0F);
        self.nibbles += 1;

        trace!("nibble {}: {:X} at t={}", self.nibbles - 1, nibble & 0x0F, timestamp);

        if self.nibbles < 2 {
            return None;
        }

        let byte = QuadByte {
            value: self.quad,
            span: Span::new(start, timestamp),
        };
        self.clear();
        Some(byte)
    }

    /// Whether a word is partially assembled
    pub fn has_partial(&self) -> bool {
        self.bits > 0 || self.nibbles > 0
    }

    /// Drop any partially assembled word
    pub fn discard(&mut self) {
        if self.has_partial() {
            debug!(
                "Discarding partial word: {}/{} bits, {}/2 nibbles",
                self.bits, self.word_size, self.nibbles
            );
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.mosi = 0;
        self.miso = 0;
        self.bits = 0;
        self.quad = 0;
        self.nibbles = 0;
        self.word_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_byte(asm: &mut LaneAssembler, mosi: u8, miso: u8, t0: u64) -> Option<Word> {
        let mut out = None;
        for i in 0..8 {
            let shift = 7 - i;
            out = asm.push_bits((mosi >> shift) & 1 == 1, (miso >> shift) & 1 == 1, t0 + i as u64);
        }
        out
    }

    #[test]
    fn test_msb_first_byte() {
        let mut asm = LaneAssembler::new(BitOrder::MsbFirst, 8);
        let word = push_byte(&mut asm, 0x9F, 0x3C, 100).unwrap();
        assert_eq!(word.mosi, 0x9F);
        assert_eq!(word.miso, 0x3C);
        assert_eq!(word.span, Span::new(100, 107));
        assert!(!asm.has_partial());
    }

    #[test]
    fn test_lsb_first_reverses_bits() {
        let mut asm = LaneAssembler::new(BitOrder::LsbFirst, 8);
        // Pushed MSB first on the wire, interpreted LSB first
        let word = push_byte(&mut asm, 0b1000_0000, 0b0000_0110, 0).unwrap();
        assert_eq!(word.mosi, 0b0000_0001);
        assert_eq!(word.miso, 0b0110_0000);
    }

    #[test]
    fn test_word_completes_only_on_last_bit() {
        let mut asm = LaneAssembler::new(BitOrder::MsbFirst, 8);
        for i in 0..7 {
            assert!(asm.push_bits(true, false, i).is_none());
        }
        assert!(asm.has_partial());
        assert!(asm.push_bits(true, false, 7).is_some());
    }

    #[test]
    fn test_sixteen_bit_words() {
        let mut asm = LaneAssembler::new(BitOrder::MsbFirst, 16);
        let mut word = None;
        for i in 0..16u64 {
            word = asm.push_bits(i % 2 == 0, i >= 8, i);
        }
        let word = word.unwrap();
        assert_eq!(word.mosi, 0xAAAA);
        assert_eq!(word.miso, 0x00FF);
    }

    #[test]
    fn test_quad_high_nibble_first() {
        let mut asm = LaneAssembler::new(BitOrder::MsbFirst, 8);
        assert!(asm.push_nibble(0xA, 10).is_none());
        let byte = asm.push_nibble(0x5, 12).unwrap();
        assert_eq!(byte.value, 0xA5);
        assert_eq!(byte.span, Span::new(10, 12));
    }

    #[test]
    fn test_quad_ignores_bit_order() {
        let mut asm = LaneAssembler::new(BitOrder::LsbFirst, 8);
        asm.push_nibble(0x1, 0);
        assert_eq!(asm.push_nibble(0x2, 1).unwrap().value, 0x12);
    }

    #[test]
    fn test_discard_partial() {
        let mut asm = LaneAssembler::new(BitOrder::MsbFirst, 8);
        for i in 0..5 {
            asm.push_bits(true, true, i);
        }
        asm.discard();
        assert!(!asm.has_partial());

        // A fresh byte is not polluted by the discarded bits
        let word = push_byte(&mut asm, 0x01, 0x00, 50).unwrap();
        assert_eq!(word.mosi, 0x01);
        assert_eq!(word.span.start, 50);
    }
}
