//! Core data types for bus samples

use std::fmt;

/// A logic line of the serial flash bus
///
/// The data lines are named by their quad I/O index. In single-lane
/// transfers D0 carries MOSI (IO0/DI) and D1 carries MISO (IO1/DO).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Line {
    /// Chip select
    Cs = 0,
    /// Serial clock
    Clk = 1,
    /// MOSI / IO0
    D0 = 2,
    /// MISO / IO1
    D1 = 3,
    /// IO2 (WP# in single-lane mode)
    D2 = 4,
    /// IO3 (HOLD# in single-lane mode)
    D3 = 5,
}

impl Line {
    /// All lines in bit order
    pub const ALL: [Line; 6] = [Line::Cs, Line::Clk, Line::D0, Line::D1, Line::D2, Line::D3];

    /// Bit mask of this line inside [`BusSample::lines`]
    #[inline]
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }

    /// Short display name
    pub const fn name(self) -> &'static str {
        match self {
            Line::Cs => "CS#",
            Line::Clk => "CLK",
            Line::D0 => "D0",
            Line::D1 => "D1",
            Line::D2 => "D2",
            Line::D3 => "D3",
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of every bus line at one instant
///
/// Sources may deliver every sample of a capture or only the samples where
/// some line changed. Edge detection only compares consecutive samples, so
/// both forms decode identically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusSample {
    /// Monotonically increasing timestamp (nanoseconds for DSL captures)
    pub timestamp: u64,
    /// Line levels, one bit per [`Line::mask`]
    pub lines: u8,
}

impl BusSample {
    /// Create a new sample from a packed line mask
    pub fn new(timestamp: u64, lines: u8) -> Self {
        Self { timestamp, lines }
    }

    /// Level of a single line
    #[inline]
    pub fn get(&self, line: Line) -> bool {
        self.lines & line.mask() != 0
    }

    /// Set the level of a single line
    #[inline]
    pub fn set(&mut self, line: Line, value: bool) {
        if value {
            self.lines |= line.mask();
        } else {
            self.lines &= !line.mask();
        }
    }

    /// Builder form of [`BusSample::set`]
    pub fn with(mut self, line: Line, value: bool) -> Self {
        self.set(line, value);
        self
    }

    /// The four data lines packed as `D3 D2 D1 D0`, high bit first.
    #[inline]
    pub fn quad_nibble(&self) -> u8 {
        (self.lines >> Line::D0 as u8) & 0x0F
    }
}

impl fmt::Display for BusSample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BusSample[t={}, CS={}, CLK={}, D={:04b}]",
            self.timestamp,
            u8::from(self.get(Line::Cs)),
            u8::from(self.get(Line::Clk)),
            self.quad_nibble()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_masks_are_distinct() {
        let combined = Line::ALL.iter().fold(0u8, |acc, line| {
            assert_eq!(acc & line.mask(), 0, "{} overlaps", line);
            acc | line.mask()
        });
        assert_eq!(combined, 0b0011_1111);
    }

    #[test]
    fn test_set_and_get() {
        let mut sample = BusSample::new(10, 0);
        sample.set(Line::Clk, true);
        sample.set(Line::D2, true);
        assert!(sample.get(Line::Clk));
        assert!(sample.get(Line::D2));
        assert!(!sample.get(Line::Cs));

        sample.set(Line::Clk, false);
        assert!(!sample.get(Line::Clk));
        assert!(sample.get(Line::D2));
    }

    #[test]
    fn test_quad_nibble_packing() {
        let sample = BusSample::default()
            .with(Line::Cs, true)
            .with(Line::D3, true)
            .with(Line::D0, true);
        assert_eq!(sample.quad_nibble(), 0b1001);

        let sample = BusSample::default().with(Line::D1, true).with(Line::D2, true);
        assert_eq!(sample.quad_nibble(), 0b0110);
    }

    #[test]
    fn test_display() {
        let sample = BusSample::new(42, 0).with(Line::Cs, true).with(Line::D1, true);
        assert_eq!(sample.to_string(), "BusSample[t=42, CS=1, CLK=0, D=0010]");
    }
}
