//! Binary descriptor encoders (USB 2.0 ch. 9, USB 3.0 §9.6.2).
//!
//! These are plain serializers: callers keep lengths inside the field widths.

use byteorder::{ByteOrder, LittleEndian};

/// bDescriptorType values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfiguration = 0x07,
    InterfacePower = 0x08,
    Bos = 0x0F,
    DeviceCapability = 0x10,
    Hid = 0x21,
    Report = 0x22,
    CsInterface = 0x24,
    CsEndpoint = 0x25,
    Hub = 0x29,
}

/// One device capability block inside a BOS descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapability {
    pub capability_type: u8,
    pub data: Vec<u8>,
}

impl DeviceCapability {
    /// USB 2.0 Extension capability type.
    pub const USB2_EXTENSION: u8 = 0x02;

    pub fn new(capability_type: u8, data: Vec<u8>) -> Self {
        Self {
            capability_type,
            data,
        }
    }

    /// USB 2.0 Extension with the given bmAttributes (e.g. LPM support bits).
    pub fn usb2_extension(attributes: u32) -> Self {
        let mut data = vec![0u8; 4];
        LittleEndian::write_u32(&mut data, attributes);
        Self::new(Self::USB2_EXTENSION, data)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.data.len());
        out.push((3 + self.data.len()) as u8);
        out.push(DescriptorType::DeviceCapability as u8);
        out.push(self.capability_type);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Binary Object Store: 5-byte header followed by each capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryObjectStore {
    pub capabilities: Vec<DeviceCapability>,
}

impl BinaryObjectStore {
    pub const HEADER_SIZE: usize = 5;

    pub fn new(capabilities: Vec<DeviceCapability>) -> Self {
        Self { capabilities }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let body: Vec<u8> = self
            .capabilities
            .iter()
            .flat_map(DeviceCapability::to_bytes)
            .collect();
        let total_len = ((body.len() + Self::HEADER_SIZE) & 0xFFFF) as u16;

        let mut out = vec![0u8; Self::HEADER_SIZE];
        out[0] = Self::HEADER_SIZE as u8;
        out[1] = DescriptorType::Bos as u8;
        LittleEndian::write_u16(&mut out[2..4], total_len);
        out[4] = self.capabilities.len() as u8;
        out.extend_from_slice(&body);
        out
    }
}

/// Class-specific endpoint descriptor (e.g. USB Audio): 2-byte header plus opaque config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSpecificEndpoint {
    pub cs_config: Vec<u8>,
}

impl ClassSpecificEndpoint {
    pub fn new(cs_config: Vec<u8>) -> Self {
        Self { cs_config }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.cs_config.len() + 2);
        out.push(((self.cs_config.len() + 2) & 0xFF) as u8);
        out.push(DescriptorType::CsEndpoint as u8);
        out.extend_from_slice(&self.cs_config);
        out
    }
}

/// Standard endpoint descriptor (7 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint number with the direction bit (0x80 = IN).
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    pub const SIZE: usize = 7;
    pub const DIR_IN: u8 = 0x80;
    pub const TRANSFER_BULK: u8 = 0x02;

    pub fn bulk_in(number: u8, max_packet_size: u16) -> Self {
        Self {
            address: Self::DIR_IN | (number & 0x0F),
            attributes: Self::TRANSFER_BULK,
            max_packet_size,
            interval: 0,
        }
    }

    pub fn bulk_out(number: u8, max_packet_size: u16) -> Self {
        Self {
            address: number & 0x0F,
            attributes: Self::TRANSFER_BULK,
            max_packet_size,
            interval: 0,
        }
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn is_in(&self) -> bool {
        self.address & Self::DIR_IN != 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        out[0] = Self::SIZE as u8;
        out[1] = DescriptorType::Endpoint as u8;
        out[2] = self.address;
        out[3] = self.attributes;
        LittleEndian::write_u16(&mut out[4..6], self.max_packet_size);
        out[6] = self.interval;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bos() {
        assert_eq!(BinaryObjectStore::default().to_bytes(), [5, 0x0F, 5, 0, 0]);
    }

    #[test]
    fn test_bos_with_capabilities() {
        let bos = BinaryObjectStore::new(vec![
            DeviceCapability::usb2_extension(0x0000_0006),
            DeviceCapability::new(0x03, vec![0xAA, 0xBB]),
        ]);
        let bytes = bos.to_bytes();
        assert_eq!(bytes.len(), 5 + 7 + 5);
        assert_eq!(&bytes[..5], &[5, 0x0F, 17, 0, 2]);
        assert_eq!(&bytes[5..12], &[7, 0x10, 0x02, 0x06, 0, 0, 0]);
        assert_eq!(&bytes[12..], &[5, 0x10, 0x03, 0xAA, 0xBB]);
    }

    #[test]
    fn test_cs_endpoint() {
        let cs = ClassSpecificEndpoint::new(vec![0x01, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(cs.to_bytes(), [7, 0x25, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_bulk_endpoints() {
        let ep_in = EndpointDescriptor::bulk_in(3, 0x200);
        assert!(ep_in.is_in());
        assert_eq!(ep_in.number(), 3);
        assert_eq!(ep_in.to_bytes(), [7, 0x05, 0x83, 0x02, 0x00, 0x02, 0]);
        let ep_out = EndpointDescriptor::bulk_out(1, 0x200);
        assert!(!ep_out.is_in());
        assert_eq!(ep_out.to_bytes()[2], 0x01);
    }
}
