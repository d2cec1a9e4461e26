//! Scalar types shared by the header, PDU bodies, and status mapping.

/// USB/IP wire protocol version this crate speaks (0x0111, i.e. 1.1.1).
pub const USBIP_VERSION: u16 = 0x0111;

/// Size in bytes of the basic header common to every PDU.
pub const BASIC_HEADER_SIZE: usize = 20;

/// Size in bytes of a command-specific union (always zero-padded to this width).
pub const COMMAND_UNION_SIZE: usize = 28;

/// Total size in bytes of a fixed PDU header (basic header + command union).
pub const HEADER_SIZE: usize = BASIC_HEADER_SIZE + COMMAND_UNION_SIZE;

/// Size in bytes of one isochronous packet descriptor on the wire.
pub const ISO_PACKET_DESC_SIZE: usize = 16;

/// Transfer direction as carried in the basic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out = 0,
    In = 1,
}

impl Direction {
    pub fn from_u32(value: u32) -> Self {
        if value == 0 { Direction::Out } else { Direction::In }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// USB transfer type, matching libusb's `LIBUSB_TRANSFER_TYPE_*` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl TransferType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TransferType::Control),
            1 => Some(TransferType::Isochronous),
            2 => Some(TransferType::Bulk),
            3 => Some(TransferType::Interrupt),
            _ => None,
        }
    }
}

/// The command code carried in the basic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Nop,
    CmdSubmit,
    CmdUnlink,
    RetSubmit,
    RetUnlink,
}

impl Command {
    pub const NOP: u32 = 0x0000;
    pub const CMD_SUBMIT: u32 = 0x0001;
    pub const CMD_UNLINK: u32 = 0x0002;
    pub const RET_SUBMIT: u32 = 0x0003;
    pub const RET_UNLINK: u32 = 0x0004;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            Self::NOP => Some(Command::Nop),
            Self::CMD_SUBMIT => Some(Command::CmdSubmit),
            Self::CMD_UNLINK => Some(Command::CmdUnlink),
            Self::RET_SUBMIT => Some(Command::RetSubmit),
            Self::RET_UNLINK => Some(Command::RetUnlink),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Command::Nop => Self::NOP,
            Command::CmdSubmit => Self::CMD_SUBMIT,
            Command::CmdUnlink => Self::CMD_UNLINK,
            Command::RetSubmit => Self::RET_SUBMIT,
            Command::RetUnlink => Self::RET_UNLINK,
        }
    }
}
