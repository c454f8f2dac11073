//! Synthetic bus waveforms for decoder tests

use super::session::DecoderConfig;
use super::types::{BitOrder, CsPolarity, SpiMode};
use crate::runtime::sample::{BusSample, Line};

const STEP: u64 = 10;

/// Builds a sample stream one bus action at a time.
///
/// Every data bit takes two samples: data and clock set to the level before
/// the sampling edge, then the sampling edge itself.
pub(crate) struct BusBuilder {
    samples: Vec<BusSample>,
    current: BusSample,
    mode: SpiMode,
    cs_polarity: CsPolarity,
    bit_order: BitOrder,
}

impl BusBuilder {
    pub fn new() -> Self {
        Self::for_config(&DecoderConfig::default())
    }

    pub fn for_config(config: &DecoderConfig) -> Self {
        let current = BusSample::new(0, 0)
            .with(Line::Cs, !config.cs_polarity.active_level())
            .with(Line::Clk, config.mode.idle_high());
        Self {
            samples: vec![current],
            current,
            mode: config.mode,
            cs_polarity: config.cs_polarity,
            bit_order: config.bit_order,
        }
    }

    fn push(&mut self) {
        self.current.timestamp += STEP;
        self.samples.push(self.current);
    }

    /// Clock level right before the sampling edge
    fn before_edge(&self) -> bool {
        !self.mode.samples_on_rising()
    }

    fn clock_lines(&mut self, data: u8) {
        for line in [Line::D0, Line::D1, Line::D2, Line::D3] {
            self.current.set(line, data & (1 << (line as u8 - Line::D0 as u8)) != 0);
        }
        self.current.set(Line::Clk, self.before_edge());
        self.push();
        self.current.set(Line::Clk, !self.before_edge());
        self.push();
    }

    /// Timestamp of the last sample so far
    pub fn now(&self) -> u64 {
        self.current.timestamp
    }

    pub fn select(&mut self) -> &mut Self {
        self.current.set(Line::Cs, self.cs_polarity.active_level());
        self.push();
        self
    }

    pub fn deselect(&mut self) -> &mut Self {
        if self.current.get(Line::Clk) != self.mode.idle_high() {
            self.current.set(Line::Clk, self.mode.idle_high());
            self.push();
        }
        self.current.set(Line::Cs, !self.cs_polarity.active_level());
        self.push();
        self
    }

    /// Deassert CS on the very sample that carries a sampling edge
    pub fn deselect_on_edge(&mut self) -> &mut Self {
        self.current.set(Line::Clk, self.before_edge());
        self.push();
        self.current.set(Line::Clk, !self.before_edge());
        self.current.set(Line::Cs, !self.cs_polarity.active_level());
        self.push();
        self
    }

    /// Single-lane bits, MOSI on D0 and MISO on D1
    pub fn bits(&mut self, bits: &[(bool, bool)]) -> &mut Self {
        for &(mosi, miso) in bits {
            self.clock_lines(u8::from(mosi) | (u8::from(miso) << 1));
        }
        self
    }

    /// Single-lane bytes with the given MOSI and MISO values
    pub fn exchange(&mut self, mosi: u8, miso: u8) -> &mut Self {
        let bits: Vec<(bool, bool)> = (0..8)
            .map(|i| {
                let shift = match self.bit_order {
                    BitOrder::MsbFirst => 7 - i,
                    BitOrder::LsbFirst => i,
                };
                ((mosi >> shift) & 1 == 1, (miso >> shift) & 1 == 1)
            })
            .collect();
        self.bits(&bits)
    }

    /// Single-lane MOSI bytes, MISO held low
    pub fn bytes(&mut self, mosi: &[u8]) -> &mut Self {
        for &byte in mosi {
            self.exchange(byte, 0);
        }
        self
    }

    /// Quad bytes, high nibble first
    pub fn quad(&mut self, bytes: &[u8]) -> &mut Self {
        for &byte in bytes {
            self.clock_lines(byte >> 4);
            self.clock_lines(byte & 0x0F);
        }
        self
    }

    pub fn build(&self) -> Vec<BusSample> {
        self.samples.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_levels() {
        let config = DecoderConfig::default()
            .with_mode(SpiMode::Mode2)
            .with_cs_polarity(CsPolarity::ActiveHigh);
        let samples = BusBuilder::for_config(&config).build();
        assert!(samples[0].get(Line::Clk));
        assert!(!samples[0].get(Line::Cs));
    }

    #[test]
    fn test_byte_takes_two_samples_per_bit() {
        let samples = BusBuilder::new().select().bytes(&[0x80]).build();
        // baseline, select, 16 bit samples
        assert_eq!(samples.len(), 18);
        assert!(samples[2].get(Line::D0));
        assert!(!samples[4].get(Line::D0));
        assert!(samples[3].get(Line::Clk));
    }
}
