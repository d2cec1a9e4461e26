//! USB/IP control-protocol handshake: `OP_REQ_DEVLIST` / `OP_REQ_IMPORT` up
//! to and including `OP_REP_IMPORT`.
//!
//! Grounded directly on `usbip_network.h`'s `struct op_common` /
//! `struct usbip_usb_device` / `struct usbip_usb_interface` layouts and
//! `usbipd_requests.c`'s `recv_request_devlist`/`recv_request_attach`. This
//! module is deliberately thin: it owns no queueing or concurrency state,
//! only the wire framing needed to get from "TCP connection accepted" to
//! "device claimed, socket handed to the core engine".

use std::io::{self, Read, Write};
use std::net::TcpStream;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::usb::device::{EndpointInfo, EndpointTable};

const USBIP_VERSION: u16 = protocol::USBIP_VERSION;

const OP_REQUEST: u16 = 0x80 << 8;
const OP_REPLY: u16 = 0x00 << 8;
const OP_IMPORT: u16 = 0x03;
const OP_DEVLIST: u16 = 0x05;
const OP_REQ_IMPORT: u16 = OP_REQUEST | OP_IMPORT;
const OP_REP_IMPORT: u16 = OP_REPLY | OP_IMPORT;
const OP_REQ_DEVLIST: u16 = OP_REQUEST | OP_DEVLIST;
const OP_REP_DEVLIST: u16 = OP_REPLY | OP_DEVLIST;

const ST_OK: u32 = 0x00;
const ST_NA: u32 = 0x01;

const SYSFS_PATH_MAX: usize = 256;
const SYSFS_BUS_ID_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported USB/IP control version {0:#06x}")]
    UnsupportedVersion(u16),
    #[error("unknown op-code {0:#06x}")]
    UnknownOpCode(u16),
    #[error("requested busid {0:?} is not exported by this server")]
    DeviceNotFound(String),
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

type Result<T> = std::result::Result<T, HandshakeError>;

fn read_op_common<R: Read>(reader: &mut R) -> Result<(u16, u16, u32)> {
    let version = reader.read_u16::<BigEndian>()?;
    let code = reader.read_u16::<BigEndian>()?;
    let status = reader.read_u32::<BigEndian>()?;
    if version != USBIP_VERSION {
        return Err(HandshakeError::UnsupportedVersion(version));
    }
    Ok((version, code, status))
}

fn write_op_common<W: Write>(writer: &mut W, code: u16, status: u32) -> Result<()> {
    writer.write_u16::<BigEndian>(USBIP_VERSION)?;
    writer.write_u16::<BigEndian>(code)?;
    writer.write_u32::<BigEndian>(status)?;
    Ok(())
}

/// One device as advertised over the control protocol: the fixed-width
/// `path`/`busid` strings plus the descriptor fields `PACK_OP_IMPORT_REPLY`
/// byte-swaps on the wire.
pub struct ExportableDevice {
    pub busid: String,
    pub path: String,
    pub bus_number: u8,
    pub device_address: u8,
    pub speed: u32,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: u16,
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    pub configuration_value: u8,
    pub num_configurations: u8,
    pub interfaces: Vec<ExportableInterface>,
}

#[derive(Clone, Copy)]
pub struct ExportableInterface {
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub number: u8,
}

impl ExportableDevice {
    fn num_interfaces(&self) -> u8 {
        self.interfaces.len() as u8
    }

    fn write_usbip_usb_device<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_fixed_str(writer, &self.path, SYSFS_PATH_MAX)?;
        write_fixed_str(writer, &self.busid, SYSFS_BUS_ID_SIZE)?;
        writer.write_u32::<BigEndian>(self.bus_number as u32)?;
        writer.write_u32::<BigEndian>(self.device_address as u32)?;
        writer.write_u32::<BigEndian>(self.speed)?;
        writer.write_u16::<BigEndian>(self.vendor_id)?;
        writer.write_u16::<BigEndian>(self.product_id)?;
        writer.write_u16::<BigEndian>(self.device_version)?;
        writer.write_u8(self.device_class)?;
        writer.write_u8(self.device_sub_class)?;
        writer.write_u8(self.device_protocol)?;
        writer.write_u8(self.configuration_value)?;
        writer.write_u8(self.num_configurations)?;
        writer.write_u8(self.num_interfaces())?;
        Ok(())
    }

    fn write_usbip_usb_interfaces<W: Write>(&self, writer: &mut W) -> Result<()> {
        for iface in &self.interfaces {
            writer.write_u8(iface.class)?;
            writer.write_u8(iface.sub_class)?;
            writer.write_u8(iface.protocol)?;
            writer.write_u8(iface.number)?;
        }
        Ok(())
    }
}

fn write_fixed_str<W: Write>(writer: &mut W, s: &str, width: usize) -> io::Result<()> {
    let mut buf = vec![0u8; width];
    let bytes = s.as_bytes();
    let n = bytes.len().min(width.saturating_sub(1));
    buf[..n].copy_from_slice(&bytes[..n]);
    writer.write_all(&buf)
}

/// Enumerate every device this server is willing to export, applying the
/// configured VID:PID filters. Devices that fail to read (permission
/// errors, mid-enumeration unplug) are skipped rather than aborting the
/// whole listing, matching `usbip_refresh_device_list`'s best-effort scan.
pub fn enumerate_exportable(
    context: &rusb::Context,
    filters: &crate::config::DeviceFilters,
) -> Result<Vec<ExportableDevice>> {
    let mut out = Vec::new();
    for device in context.devices()?.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        if !filters.allows(descriptor.vendor_id(), descriptor.product_id()) {
            continue;
        }
        let interfaces = match device.active_config_descriptor() {
            Ok(config) => config
                .interfaces()
                .filter_map(|i| i.descriptors().next())
                .map(|d| ExportableInterface {
                    class: d.class_code(),
                    sub_class: d.sub_class_code(),
                    protocol: d.protocol_code(),
                    number: d.interface_number(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        let configuration_value = device
            .active_config_descriptor()
            .map(|c| c.number())
            .unwrap_or(0);
        out.push(ExportableDevice {
            busid: busid_of(&device),
            path: format!("/sys/bus/usb/devices/{}", busid_of(&device)),
            bus_number: device.bus_number(),
            device_address: device.address(),
            speed: speed_code(device.speed()),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            device_version: bcd_device_version(descriptor.device_version()),
            device_class: descriptor.class_code(),
            device_sub_class: descriptor.sub_class_code(),
            device_protocol: descriptor.protocol_code(),
            configuration_value,
            num_configurations: descriptor.num_configurations(),
            interfaces,
        });
    }
    Ok(out)
}

fn busid_of(device: &rusb::Device<rusb::Context>) -> String {
    format!("{}-{}", device.bus_number(), device.address())
}

fn speed_code(speed: rusb::Speed) -> u32 {
    // Mirrors `enum usb_device_speed` from linux/usb/ch9.h.
    match speed {
        rusb::Speed::Low => 1,
        rusb::Speed::Full => 2,
        rusb::Speed::High => 3,
        rusb::Speed::Super => 5,
        rusb::Speed::SuperPlus => 6,
        _ => 0,
    }
}

/// Packs a `rusb::Version` (major.minor.sub_minor) into the packed BCD
/// `bcdDevice` field `usbip_usb_device` carries on the wire.
fn bcd_device_version(v: rusb::Version) -> u16 {
    ((v.major() as u16) << 8) | ((v.minor() as u16) << 4) | v.sub_minor() as u16
}

/// Serve a single `OP_REQ_DEVLIST` request on an already-connected socket.
pub fn serve_devlist<S: Read + Write>(
    stream: &mut S,
    context: &rusb::Context,
    filters: &crate::config::DeviceFilters,
) -> Result<()> {
    let devices = enumerate_exportable(context, filters)?;
    write_op_common(stream, OP_REP_DEVLIST, ST_OK)?;
    stream.write_u32::<BigEndian>(devices.len() as u32)?;
    for device in &devices {
        device.write_usbip_usb_device(stream)?;
        device.write_usbip_usb_interfaces(stream)?;
    }
    Ok(())
}

/// Serve a single `OP_REQ_IMPORT` request, claiming the requested device and
/// building the endpoint table the core engine needs. Returns the opened
/// handle, device id, and endpoint table on success; the caller constructs
/// the `StubDevice` and hands the socket to `engine::spawn`.
pub fn serve_import<S: Read + Write>(
    stream: &mut S,
    context: &rusb::Context,
    filters: &crate::config::DeviceFilters,
) -> Result<(rusb::DeviceHandle<rusb::Context>, u32, EndpointTable)> {
    let mut busid_buf = [0u8; SYSFS_BUS_ID_SIZE];
    stream.read_exact(&mut busid_buf)?;
    let busid = read_fixed_str(&busid_buf);

    let found = context
        .devices()?
        .iter()
        .find(|d| busid_of(d) == busid && device_matches_filters(d, filters));

    let Some(device) = found else {
        write_op_common(stream, OP_REP_IMPORT, ST_NA)?;
        return Err(HandshakeError::DeviceNotFound(busid));
    };

    let descriptor = device.device_descriptor()?;
    let handle = device.open()?;
    let endpoints = build_endpoint_table(&device)?;

    let exportable = ExportableDevice {
        busid: busid.clone(),
        path: format!("/sys/bus/usb/devices/{busid}"),
        bus_number: device.bus_number(),
        device_address: device.address(),
        speed: speed_code(device.speed()),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        device_version: bcd_device_version(descriptor.device_version()),
        device_class: descriptor.class_code(),
        device_sub_class: descriptor.sub_class_code(),
        device_protocol: descriptor.protocol_code(),
        configuration_value: device
            .active_config_descriptor()
            .map(|c| c.number())
            .unwrap_or(0),
        num_configurations: descriptor.num_configurations(),
        interfaces: Vec::new(),
    };

    for iface in exportable_interface_numbers(&device) {
        // Interfaces are claimed up-front so the session can drive any
        // endpoint on any of them without a further SET_INTERFACE round-trip.
        let _ = handle.claim_interface(iface);
    }

    write_op_common(stream, OP_REP_IMPORT, ST_OK)?;
    exportable.write_usbip_usb_device(stream)?;

    let devid = (device.bus_number() as u32) << 16 | device.address() as u32;
    Ok((handle, devid, endpoints))
}

fn device_matches_filters(device: &rusb::Device<rusb::Context>, filters: &crate::config::DeviceFilters) -> bool {
    match device.device_descriptor() {
        Ok(d) => filters.allows(d.vendor_id(), d.product_id()),
        Err(_) => false,
    }
}

fn exportable_interface_numbers(device: &rusb::Device<rusb::Context>) -> Vec<u8> {
    device
        .active_config_descriptor()
        .map(|config| {
            config
                .interfaces()
                .filter_map(|i| i.descriptors().next())
                .map(|d| d.interface_number())
                .collect()
        })
        .unwrap_or_default()
}

fn build_endpoint_table(device: &rusb::Device<rusb::Context>) -> Result<EndpointTable> {
    let mut endpoints = Vec::new();
    if let Ok(config) = device.active_config_descriptor() {
        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                for ep in descriptor.endpoint_descriptors() {
                    endpoints.push(EndpointInfo {
                        number: ep.number(),
                        direction: match ep.direction() {
                            rusb::Direction::In => protocol::Direction::In,
                            rusb::Direction::Out => protocol::Direction::Out,
                        },
                        transfer_type: match ep.transfer_type() {
                            rusb::TransferType::Control => protocol::TransferType::Control,
                            rusb::TransferType::Isochronous => protocol::TransferType::Isochronous,
                            rusb::TransferType::Bulk => protocol::TransferType::Bulk,
                            rusb::TransferType::Interrupt => protocol::TransferType::Interrupt,
                        },
                        max_packet_size: ep.max_packet_size(),
                    });
                }
            }
        }
    }
    Ok(EndpointTable::new(endpoints))
}

fn read_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Drive the control-protocol handshake on one freshly-accepted connection
/// until either an `OP_REQ_IMPORT` succeeds (returning the claimed device
/// for the caller to hand off to the core engine) or the peer disconnects
/// after a devlist query (or several) without importing anything.
pub fn negotiate(
    stream: &mut TcpStream,
    context: &rusb::Context,
    filters: &crate::config::DeviceFilters,
) -> Result<Option<(rusb::DeviceHandle<rusb::Context>, u32, EndpointTable)>> {
    loop {
        let (_version, code, _status) = match read_op_common(stream) {
            Ok(v) => v,
            Err(HandshakeError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match code {
            OP_REQ_DEVLIST => serve_devlist(stream, context, filters)?,
            OP_REQ_IMPORT => return Ok(Some(serve_import(stream, context, filters)?)),
            other => return Err(HandshakeError::UnknownOpCode(other)),
        }
    }
}
