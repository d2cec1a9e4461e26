//! The 20-byte basic header common to every USB/IP PDU.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Result, WireError};
use crate::types::{BASIC_HEADER_SIZE, Command};

/// `{command, seqnum, devid, direction, ep}`, all network-order u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    pub command: u32,
    pub seqnum: u32,
    pub devid: u32,
    pub direction: u32,
    pub ep: u32,
}

impl BasicHeader {
    pub const SIZE: usize = BASIC_HEADER_SIZE;

    pub fn new(command: Command, seqnum: u32, devid: u32, direction: u32, ep: u32) -> Self {
        Self {
            command: command.as_u32(),
            seqnum,
            devid,
            direction,
            ep,
        }
    }

    pub fn command(&self) -> Result<Command> {
        Command::from_u32(self.command).ok_or(WireError::UnknownCommand { command: self.command })
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let command = reader.read_u32::<BigEndian>()?;
        let seqnum = reader.read_u32::<BigEndian>()?;
        let devid = reader.read_u32::<BigEndian>()?;
        let direction = reader.read_u32::<BigEndian>()?;
        let ep = reader.read_u32::<BigEndian>()?;
        Ok(Self { command, seqnum, devid, direction, ep })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.command)?;
        writer.write_u32::<BigEndian>(self.seqnum)?;
        writer.write_u32::<BigEndian>(self.devid)?;
        writer.write_u32::<BigEndian>(self.direction)?;
        writer.write_u32::<BigEndian>(self.ep)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips() {
        let header = BasicHeader::new(Command::CmdSubmit, 7, 0x0001_0002, 1, 3);
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), BasicHeader::SIZE);

        let decoded = BasicHeader::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.command().unwrap(), Command::CmdSubmit);
    }

    #[test]
    fn unknown_command_errors() {
        let header = BasicHeader { command: 0xff, seqnum: 0, devid: 0, direction: 0, ep: 0 };
        assert!(matches!(header.command(), Err(WireError::UnknownCommand { command: 0xff })));
    }
}
