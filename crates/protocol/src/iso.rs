//! Isochronous packet descriptor packing.
//!
//! On the wire, each descriptor is `{offset, length, actual_length, status}`,
//! all u32/i32 in network order. The trailer carries one descriptor per
//! packet, in the same order the client submitted them.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::Result;
use crate::status::UsbOutcome;
use crate::types::ISO_PACKET_DESC_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoPacketDescriptor {
    pub offset: u32,
    pub length: u32,
    pub actual_length: u32,
    pub status: i32,
}

impl IsoPacketDescriptor {
    pub const SIZE: usize = ISO_PACKET_DESC_SIZE;

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let offset = reader.read_u32::<BigEndian>()?;
        let length = reader.read_u32::<BigEndian>()?;
        let actual_length = reader.read_u32::<BigEndian>()?;
        let status = reader.read_i32::<BigEndian>()?;
        Ok(Self { offset, length, actual_length, status })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.offset)?;
        writer.write_u32::<BigEndian>(self.length)?;
        writer.write_u32::<BigEndian>(self.actual_length)?;
        writer.write_i32::<BigEndian>(self.status)?;
        Ok(())
    }

    /// Build the outgoing trailer for a batch of completed ISO packets.
    /// `offset` accumulates the *padded* per-packet length, matching the
    /// host-side buffer layout (padding is skipped only in the data segments,
    /// not in the descriptor's own `offset` bookkeeping).
    pub fn pack_trailer(packets: &[(u32, u32, UsbOutcome)]) -> Vec<Self> {
        let mut out = Vec::with_capacity(packets.len());
        let mut offset = 0u32;
        for &(length, actual_length, outcome) in packets {
            out.push(Self {
                offset,
                length,
                actual_length,
                status: outcome.to_wire_status(),
            });
            offset += length;
        }
        out
    }

    pub fn read_trailer<R: Read>(reader: &mut R, count: usize) -> Result<Vec<Self>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(Self::read_from(reader)?);
        }
        Ok(out)
    }

    pub fn write_trailer<W: Write>(writer: &mut W, descriptors: &[Self]) -> Result<()> {
        for d in descriptors {
            d.write_to(writer)?;
        }
        Ok(())
    }
}
