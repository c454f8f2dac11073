//! Decoder configuration and per-decode session state

use super::types::{BitOrder, CsPolarity, SpiMode};
use crate::runtime::errors::ConfigError;
use tracing::debug;

/// Number of address bytes following a data command (1-4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressWidth(u8);

impl AddressWidth {
    /// 3-byte (24-bit) addressing
    pub const THREE: AddressWidth = AddressWidth(3);
    /// 4-byte (32-bit) addressing
    pub const FOUR: AddressWidth = AddressWidth(4);

    pub const fn bytes(&self) -> usize {
        self.0 as usize
    }

    /// Hex digits used to render an address of this width
    pub const fn digits(&self) -> usize {
        2 * self.0 as usize
    }
}

impl TryFrom<u8> for AddressWidth {
    type Error = ConfigError;

    fn try_from(bytes: u8) -> Result<Self, Self::Error> {
        if (1..=4).contains(&bytes) {
            Ok(AddressWidth(bytes))
        } else {
            Err(ConfigError::AddressBytes(bytes))
        }
    }
}

impl Default for AddressWidth {
    fn default() -> Self {
        AddressWidth::THREE
    }
}

/// Decoder options, fixed for the length of a decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub cs_polarity: CsPolarity,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
    /// Bits per single-lane word
    pub word_size: u32,
    /// Initial address width in bytes
    pub address_bytes: u8,
    /// Lowest data-command start address to annotate
    pub min_address: u32,
    /// Highest data-command start address to annotate
    pub max_address: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            cs_polarity: CsPolarity::ActiveLow,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
            word_size: 8,
            address_bytes: 3,
            min_address: 0,
            max_address: u32::MAX,
        }
    }
}

impl DecoderConfig {
    pub fn with_cs_polarity(mut self, cs_polarity: CsPolarity) -> Self {
        self.cs_polarity = cs_polarity;
        self
    }

    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn with_word_size(mut self, word_size: u32) -> Self {
        self.word_size = word_size;
        self
    }

    pub fn with_address_bytes(mut self, address_bytes: u8) -> Self {
        self.address_bytes = address_bytes;
        self
    }

    /// Only annotate data commands starting inside `min..=max`
    pub fn with_address_range(mut self, min: u32, max: u32) -> Self {
        self.min_address = min;
        self.max_address = max;
        self
    }

    /// Check all options
    ///
    /// Flash commands, addresses and payloads are byte-aligned, so the only
    /// accepted word size is 8.
    pub fn validate(&self) -> Result<(), ConfigError> {
        AddressWidth::try_from(self.address_bytes)?;
        if self.word_size != 8 {
            return Err(ConfigError::WordSize(self.word_size));
        }
        if self.min_address > self.max_address {
            return Err(ConfigError::AddressRange {
                min: self.min_address,
                max: self.max_address,
            });
        }
        Ok(())
    }
}

/// Command state carried into the next chip-select cycle in continuous-read mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    pub command: u8,
    /// Clock position where quad transfer starts
    pub quad_start: u32,
    pub dummy_clocks: u32,
}

/// State that lives for a whole decode and spans transactions
#[derive(Debug, Clone)]
pub struct Session {
    config: DecoderConfig,
    address_width: AddressWidth,
    continuation: Option<Continuation>,
}

impl Session {
    pub fn new(config: DecoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let address_width = AddressWidth::try_from(config.address_bytes)?;
        Ok(Self {
            config,
            address_width,
            continuation: None,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn address_width(&self) -> AddressWidth {
        self.address_width
    }

    /// Switch address width for all later transactions
    pub fn set_address_width(&mut self, width: AddressWidth) {
        if width != self.address_width {
            debug!(
                "Address width {} -> {} bytes",
                self.address_width.bytes(),
                width.bytes()
            );
        }
        self.address_width = width;
    }

    /// Whether a data command at `address` should be annotated
    pub fn in_range(&self, address: u64) -> bool {
        (u64::from(self.config.min_address)..=u64::from(self.config.max_address)).contains(&address)
    }

    /// Render an address zero-padded to the current width
    pub fn format_address(&self, address: u64) -> String {
        format!("{:0width$x}", address, width = self.address_width.digits())
    }

    pub fn continuation(&self) -> Option<Continuation> {
        self.continuation
    }

    pub(crate) fn set_continuation(&mut self, continuation: Option<Continuation>) {
        if continuation != self.continuation {
            match continuation {
                Some(c) => debug!("Continuous read armed for command 0x{:02X}", c.command),
                None => debug!("Continuous read cleared"),
            }
        }
        self.continuation = continuation;
    }
}
