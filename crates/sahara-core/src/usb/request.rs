//! Control request (SETUP packet) model.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("SETUP packet too short: expected 8, got {0}")]
    TooShort(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// bmRequestType bitfield.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RequestType(pub u8);

impl RequestType {
    pub const VENDOR_OUT: RequestType = RequestType(0x40);
    pub const VENDOR_IN: RequestType = RequestType(0xC0);

    pub fn direction(&self) -> Direction {
        if self.0 & 0x80 != 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        }
    }

    pub fn kind(&self) -> RequestKind {
        match (self.0 >> 5) & 0x03 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.0 & 0x1F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

impl fmt::Debug for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RequestType(0x{:02X} {:?}/{:?}/{:?})",
            self.0,
            self.direction(),
            self.kind(),
            self.recipient()
        )
    }
}

/// A control request as delivered on endpoint 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: RequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// wLength: the most the host will accept in the data stage.
    pub length: u16,
}

impl ControlRequest {
    pub const SETUP_SIZE: usize = 8;

    pub fn new(request_type: RequestType, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// Decode an 8-byte SETUP packet.
    pub fn parse(setup: &[u8]) -> Result<Self, RequestError> {
        if setup.len() < Self::SETUP_SIZE {
            return Err(RequestError::TooShort(setup.len()));
        }
        let mut cursor = Cursor::new(setup);
        Ok(Self {
            request_type: RequestType(cursor.read_u8()?),
            request: cursor.read_u8()?,
            value: cursor.read_u16::<LittleEndian>()?,
            index: cursor.read_u16::<LittleEndian>()?,
            length: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vendor_in() {
        let req = ControlRequest::parse(&[0xC0, 0x0A, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(req.request, 0x0A);
        assert_eq!(req.index, 1);
        assert_eq!(req.length, 1);
        assert_eq!(req.request_type.direction(), Direction::DeviceToHost);
        assert_eq!(req.request_type.kind(), RequestKind::Vendor);
        assert_eq!(req.request_type.recipient(), Recipient::Device);
    }

    #[test]
    fn test_parse_little_endian_value() {
        let req = ControlRequest::parse(&[0x40, 0x01, 0x03, 0x02, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(req.value, 0x0203);
        assert_eq!(req.request_type.direction(), Direction::HostToDevice);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            ControlRequest::parse(&[0x40, 0x01]),
            Err(RequestError::TooShort(2))
        ));
    }

    #[test]
    fn test_interface_class_request() {
        assert_eq!(RequestType(0x21).kind(), RequestKind::Class);
        assert_eq!(RequestType(0x21).recipient(), Recipient::Interface);
    }
}
