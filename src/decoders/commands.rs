//! Flash command table and transaction interpreter
//!
//! Every opcode the decoder knows is listed once in [`COMMANDS`] and
//! indexed into a 256-entry table on first use. Opcodes missing from the
//! table are reported as unknown control commands.

use super::session::{AddressWidth, Session};
use super::transaction::Transaction;
use super::types::{Annotation, AnnotationClass, Span};
use lazy_static::lazy_static;
use tracing::debug;

/// Opcodes recognised by the decoder
pub mod opcodes {
    /// Write Status Register 1
    pub const WRSR: u8 = 0x01;
    /// Page Program
    pub const PP: u8 = 0x02;
    /// Read Data
    pub const READ: u8 = 0x03;
    /// Write Disable
    pub const WRDI: u8 = 0x04;
    /// Read Status Register 1
    pub const RDSR: u8 = 0x05;
    /// Write Enable
    pub const WREN: u8 = 0x06;
    /// Fast Read, one dummy byte after the address
    pub const FAST_READ: u8 = 0x0B;
    /// Quad Page Program
    pub const QPP: u8 = 0x32;
    /// Read Status Register 2
    pub const RDSR2: u8 = 0x35;
    /// Read SFDP Mode
    pub const RDSFDP_MODE: u8 = 0x5A;
    /// Read SFDP
    pub const RDSFDP: u8 = 0x5B;
    /// Quad Output Fast Read (1-1-4)
    pub const QOR: u8 = 0x6B;
    /// Program Suspend
    pub const PGM_SUSPEND: u8 = 0x75;
    /// Read JEDEC ID (alternate)
    pub const RDID_ALT: u8 = 0x9E;
    /// Read JEDEC ID
    pub const RDID: u8 = 0x9F;
    /// Release Power-down / Device ID
    pub const RES: u8 = 0xAB;
    /// Enter 4-byte address mode
    pub const EN4B: u8 = 0xB7;
    /// Quad Word Read
    pub const QWR: u8 = 0xE7;
    /// Exit 4-byte address mode
    pub const EX4B: u8 = 0xE9;
    /// Quad I/O Read (1-4-4)
    pub const QIOR: u8 = 0xEB;
}

/// What a command does to the bus and the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Command followed by an address and a payload
    Data {
        name: &'static str,
        /// Bytes between address and payload (dummy or mode bytes)
        overhead: usize,
        /// Data lanes the device uses for the payload
        lanes: u8,
    },
    /// Command without an address
    Control { name: &'static str },
    /// Control command that switches the session address width
    AddressToggle {
        name: &'static str,
        width: AddressWidth,
    },
}

/// Static description of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub opcode: u8,
    pub kind: CommandKind,
    /// Dummy clocks after the mode byte, for commands that switch the bus
    /// to quad transfers right after the opcode
    pub dummy_clocks: Option<u32>,
}

impl CommandDescriptor {
    const fn data(opcode: u8, name: &'static str, overhead: usize, lanes: u8) -> Self {
        Self {
            opcode,
            kind: CommandKind::Data {
                name,
                overhead,
                lanes,
            },
            dummy_clocks: None,
        }
    }

    const fn quad(opcode: u8, name: &'static str, overhead: usize, dummy_clocks: u32) -> Self {
        Self {
            opcode,
            kind: CommandKind::Data {
                name,
                overhead,
                lanes: 4,
            },
            dummy_clocks: Some(dummy_clocks),
        }
    }

    const fn control(opcode: u8, name: &'static str) -> Self {
        Self {
            opcode,
            kind: CommandKind::Control { name },
            dummy_clocks: None,
        }
    }

    const fn toggle(opcode: u8, name: &'static str, width: AddressWidth) -> Self {
        Self {
            opcode,
            kind: CommandKind::AddressToggle { name, width },
            dummy_clocks: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            CommandKind::Data { name, .. }
            | CommandKind::Control { name }
            | CommandKind::AddressToggle { name, .. } => name,
        }
    }

    /// Data lanes carrying the payload; commands without one use a single lane
    pub fn lanes(&self) -> u8 {
        match self.kind {
            CommandKind::Data { lanes, .. } => lanes,
            _ => 1,
        }
    }

    /// Whether the decoder assembles quad nibbles after this opcode
    pub fn switches_to_quad(&self) -> bool {
        self.dummy_clocks.is_some()
    }
}

use opcodes::*;

/// All known commands
pub const COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor::data(READ, "Read", 0, 1),
    CommandDescriptor::data(FAST_READ, "Fast Read", 1, 1),
    CommandDescriptor::data(RDSFDP, "Read SFDP", 0, 1),
    CommandDescriptor::quad(QOR, "Quad-Output Fast Read", 0, 8),
    CommandDescriptor::data(RDID_ALT, "Read JEDEC ID", 0, 1),
    CommandDescriptor::data(RDID, "Read JEDEC ID", 0, 1),
    CommandDescriptor::quad(QWR, "Quad Word Read", 0, 2),
    CommandDescriptor::quad(QIOR, "Quad Read", 2, 4),
    CommandDescriptor::data(PP, "Page Program", 0, 1),
    CommandDescriptor::data(QPP, "Quad Page Program", 0, 4),
    CommandDescriptor::control(WRSR, "Write Status Register 1"),
    CommandDescriptor::control(WREN, "Write Enable"),
    CommandDescriptor::control(WRDI, "Write Disable"),
    CommandDescriptor::control(RDSR, "Read Status Register"),
    CommandDescriptor::control(RDSR2, "Read Status Register 2"),
    CommandDescriptor::control(RDSFDP_MODE, "Read SFDP Mode"),
    CommandDescriptor::control(PGM_SUSPEND, "Program Suspend"),
    CommandDescriptor::control(RES, "Release Power-down / Device ID"),
    CommandDescriptor::toggle(EN4B, "Enable 4 Byte Address", AddressWidth::FOUR),
    CommandDescriptor::toggle(EX4B, "Exit 4 Byte Address", AddressWidth::THREE),
];

lazy_static! {
    /// Opcode-indexed view of [`COMMANDS`]
    pub static ref COMMAND_TABLE: [Option<CommandDescriptor>; 256] = {
        let mut table = [None; 256];
        for descriptor in COMMANDS {
            table[usize::from(descriptor.opcode)] = Some(*descriptor);
        }
        table
    };
}

/// Look up the descriptor for an opcode
pub fn lookup(opcode: u8) -> Option<&'static CommandDescriptor> {
    COMMAND_TABLE[usize::from(opcode)].as_ref()
}

/// Message used for data commands too short to carry an address
pub const TRUNCATED_MESSAGE: &str = "Error!";

/// Outcome of interpreting one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// Command, control or error annotation for the transaction
    Annotated(Annotation),
    /// Data command whose start address is outside the session filter
    Filtered { address: u64 },
}

impl Interpretation {
    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            Interpretation::Annotated(annotation) => Some(annotation),
            Interpretation::Filtered { .. } => None,
        }
    }
}

/// Classify a completed transaction and build its annotation.
///
/// Address-width toggles update `session` after their annotation is built.
/// The transaction must hold at least one MOSI byte.
pub fn interpret(tx: &Transaction, session: &mut Session) -> Interpretation {
    let span = Span::new(tx.start, tx.end);
    let Some(&opcode) = tx.mosi.first() else {
        return Interpretation::Annotated(Annotation::new(
            AnnotationClass::Error,
            span,
            TRUNCATED_MESSAGE,
        ));
    };

    let Some(descriptor) = lookup(opcode) else {
        debug!("Unknown command 0x{:02X}", opcode);
        return Interpretation::Annotated(Annotation::new(
            AnnotationClass::ControlCommand,
            span,
            format!("0x{:X}", opcode),
        ));
    };

    match descriptor.kind {
        CommandKind::Data { name, overhead, .. } => interpret_data(tx, session, span, name, overhead),
        CommandKind::Control { name } => {
            Interpretation::Annotated(Annotation::new(AnnotationClass::ControlCommand, span, name))
        }
        CommandKind::AddressToggle { name, width } => {
            let annotation = Annotation::new(AnnotationClass::ControlCommand, span, name);
            session.set_address_width(width);
            Interpretation::Annotated(annotation)
        }
    }
}

fn interpret_data(
    tx: &Transaction,
    session: &Session,
    span: Span,
    name: &str,
    overhead: usize,
) -> Interpretation {
    let width = session.address_width().bytes();
    let Some(address_bytes) = tx.mosi.get(1..=width) else {
        debug!(
            "{} truncated: {} MOSI bytes, need {}",
            name,
            tx.mosi.len(),
            1 + width
        );
        return Interpretation::Annotated(Annotation::new(
            AnnotationClass::Error,
            span,
            TRUNCATED_MESSAGE,
        ));
    };

    let address = address_bytes
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));

    if !session.in_range(address) {
        debug!("{} at 0x{:X} outside address filter", name, address);
        return Interpretation::Filtered { address };
    }

    let non_data = 1 + overhead;
    let data_bytes = tx.mosi.len().saturating_sub(width + non_data);
    let end = address + (data_bytes as u64).saturating_sub(1);

    Interpretation::Annotated(Annotation::new(
        AnnotationClass::DataCommand,
        span,
        format!(
            "{} 0x{} - 0x{} ({} data bytes)",
            name,
            session.format_address(address),
            session.format_address(end),
            data_bytes
        ),
    ))
}
