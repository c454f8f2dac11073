//! Common decoder types and enums

use crate::runtime::errors::ConfigError;
use crate::runtime::waiter::Edge;
use std::fmt;
use std::str::FromStr;

/// Start and end timestamp of a decoded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }
}

/// SPI clock polarity and phase modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0: Clock idle low, sample on rising edge
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1: Clock idle low, sample on falling edge
    Mode1,
    /// CPOL=1, CPHA=0: Clock idle high, sample on falling edge
    Mode2,
    /// CPOL=1, CPHA=1: Clock idle high, sample on rising edge
    Mode3,
}

impl SpiMode {
    pub fn from_cpol_cpha(cpol: bool, cpha: bool) -> Self {
        match (cpol, cpha) {
            (false, false) => SpiMode::Mode0,
            (false, true) => SpiMode::Mode1,
            (true, false) => SpiMode::Mode2,
            (true, true) => SpiMode::Mode3,
        }
    }

    /// Whether the mode samples on the rising CLK edge
    pub fn samples_on_rising(&self) -> bool {
        matches!(self, SpiMode::Mode0 | SpiMode::Mode3)
    }

    /// Clock level while the bus is idle
    pub fn idle_high(&self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// CLK transition on which data lines are sampled
    pub fn sampling_edge(&self) -> Edge {
        if self.samples_on_rising() {
            Edge::Rising
        } else {
            Edge::Falling
        }
    }
}

/// Chip select polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsPolarity {
    /// LOW = selected (standard for serial flash)
    #[default]
    ActiveLow,
    /// HIGH = selected
    ActiveHigh,
}

impl CsPolarity {
    /// CS transition that opens a transaction
    pub fn assert_edge(&self) -> Edge {
        match self {
            CsPolarity::ActiveLow => Edge::Falling,
            CsPolarity::ActiveHigh => Edge::Rising,
        }
    }

    /// CS transition that closes a transaction
    pub fn deassert_edge(&self) -> Edge {
        match self {
            CsPolarity::ActiveLow => Edge::Rising,
            CsPolarity::ActiveHigh => Edge::Falling,
        }
    }

    /// Line level meaning "selected"
    pub fn active_level(&self) -> bool {
        matches!(self, CsPolarity::ActiveHigh)
    }
}

impl FromStr for CsPolarity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active-low" => Ok(CsPolarity::ActiveLow),
            "active-high" => Ok(CsPolarity::ActiveHigh),
            _ => Err(ConfigError::UnknownOption {
                option: "CS polarity",
                value: s.to_string(),
            }),
        }
    }
}

/// Bit order of single-lane words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

impl FromStr for BitOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msb-first" => Ok(BitOrder::MsbFirst),
            "lsb-first" => Ok(BitOrder::LsbFirst),
            _ => Err(ConfigError::UnknownOption {
                option: "bit order",
                value: s.to_string(),
            }),
        }
    }
}

/// Annotation classes, numbered as the host annotation table expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationClass {
    MisoData = 0,
    MosiData = 1,
    Warning = 2,
    MisoTransfer = 3,
    MosiTransfer = 4,
    ControlCommand = 5,
    DataCommand = 6,
    Error = 7,
}

impl AnnotationClass {
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnnotationClass::MisoData => "miso-data",
            AnnotationClass::MosiData => "mosi-data",
            AnnotationClass::Warning => "warning",
            AnnotationClass::MisoTransfer => "miso-transfer",
            AnnotationClass::MosiTransfer => "mosi-transfer",
            AnnotationClass::ControlCommand => "control-command",
            AnnotationClass::DataCommand => "data-command",
            AnnotationClass::Error => "xspi-error",
        }
    }
}

impl fmt::Display for AnnotationClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text annotation covering a span of the capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub class: AnnotationClass,
    pub span: Span,
    pub message: String,
}

impl Annotation {
    pub fn new(class: AnnotationClass, span: Span, message: impl Into<String>) -> Self {
        Self {
            class,
            span,
            message: message.into(),
        }
    }
}

/// One assembled byte on each of the MISO and MOSI sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteEvent {
    pub span: Span,
    pub miso: u8,
    pub mosi: u8,
}

impl ByteEvent {
    pub fn miso_hex(&self) -> String {
        format!("{:02X}", self.miso)
    }

    pub fn mosi_hex(&self) -> String {
        format!("{:02X}", self.mosi)
    }

    /// Per-byte MISO-data and MOSI-data annotations
    pub fn annotations(&self) -> [Annotation; 2] {
        [
            Annotation::new(AnnotationClass::MisoData, self.span, self.miso_hex()),
            Annotation::new(AnnotationClass::MosiData, self.span, self.mosi_hex()),
        ]
    }
}

/// Everything a decoder hands to its [`Emitter`](crate::runtime::Emitter)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Bytes(ByteEvent),
    Annotation(Annotation),
}

impl DecodeEvent {
    pub fn as_annotation(&self) -> Option<&Annotation> {
        match self {
            DecodeEvent::Annotation(a) => Some(a),
            DecodeEvent::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&ByteEvent> {
        match self {
            DecodeEvent::Bytes(b) => Some(b),
            DecodeEvent::Annotation(_) => None,
        }
    }

    pub fn start(&self) -> u64 {
        match self {
            DecodeEvent::Bytes(b) => b.span.start,
            DecodeEvent::Annotation(a) => a.span.start,
        }
    }
}
