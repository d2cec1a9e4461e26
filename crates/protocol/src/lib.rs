//! USB/IP wire protocol (version 0x0111).
//!
//! This crate is the leaf dependency of the stub engine: it defines the
//! fixed-size PDU header and command bodies, isochronous packet-descriptor
//! packing, and the USB-outcome-to-wire-status mapping. It knows nothing
//! about sockets, queues, or the USB library — only byte layout.
//!
//! ```
//! use protocol::{Pdu, encode, decode_bytes};
//!
//! let bytes = vec![0u8; protocol::HEADER_SIZE]; // all-zero => NOP
//! assert_eq!(decode_bytes(&bytes).unwrap(), Pdu::Nop);
//! ```

pub mod error;
pub mod frame;
pub mod header;
pub mod iso;
pub mod pdu;
pub mod status;
pub mod types;

pub use error::{Result, WireError};
pub use frame::{Pdu, decode, decode_bytes, encode};
pub use header::BasicHeader;
pub use iso::IsoPacketDescriptor;
pub use pdu::{CmdSubmit, CmdUnlink, RetSubmit, RetUnlink};
pub use status::UsbOutcome;
pub use types::{
    BASIC_HEADER_SIZE, COMMAND_UNION_SIZE, Command, Direction, HEADER_SIZE, ISO_PACKET_DESC_SIZE,
    TransferType, USBIP_VERSION,
};
