//! The emulated QDLoader 9008 device: descriptors, endpoint 0 and bulk routing.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::engine::SaharaEngine;
use crate::error::SaharaError;
use crate::events::{SaharaObserver, TracingObserver};
use crate::image::ImageSink;
use crate::protocol::constants::*;
use crate::transport::{BulkFunction, DeviceTransport};
use crate::usb::{
    BinaryObjectStore, ControlDispatcher, ControlRequest, ControlResponse, DescriptorType,
    DeviceCapability, Direction, EndpointDescriptor, HandlerTable, RequestError, RequestKind,
    VendorHandlers,
};

const REQ_GET_DESCRIPTOR: u8 = 0x06;
const REQ_SET_CONFIGURATION: u8 = 0x09;
const REQ_SET_INTERFACE: u8 = 0x0B;

const LANGID_EN_US: u16 = 0x0409;
const CONFIG_ATTR_SELF_POWERED: u8 = 0xC0;

/// Static USB identity of the emulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_rev: u16,
    pub max_packet_size_ep0: u8,
    pub manufacturer: String,
    pub product: String,
    pub configuration: String,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl DeviceProfile {
    pub const DEVICE_DESCRIPTOR_SIZE: usize = 18;
    const CONFIG_HEADER_SIZE: usize = 9;
    const INTERFACE_SIZE: usize = 9;

    /// Qualcomm HS-USB QDLoader 9008.
    pub fn qdloader() -> Self {
        Self {
            vendor_id: QUALCOMM_VENDOR_ID,
            product_id: QDLOADER_PRODUCT_ID,
            device_rev: QDLOADER_DEVICE_REV,
            max_packet_size_ep0: 0x40,
            manufacturer: "Qualcomm CDMA Technologies MSM".to_string(),
            product: "QHUSB__BULK".to_string(),
            configuration: "Sahara".to_string(),
            interface_class: 0xFF,
            interface_subclass: 0xFF,
            interface_protocol: 0xFF,
            endpoints: vec![
                EndpointDescriptor::bulk_out(BULK_OUT_ENDPOINT, MAX_PKT_SIZE as u16),
                EndpointDescriptor::bulk_in(BULK_IN_ENDPOINT, MAX_PKT_SIZE as u16),
            ],
        }
    }

    pub fn device_descriptor(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::DEVICE_DESCRIPTOR_SIZE];
        out[0] = Self::DEVICE_DESCRIPTOR_SIZE as u8;
        out[1] = DescriptorType::Device as u8;
        LittleEndian::write_u16(&mut out[2..4], 0x0200);
        // class/subclass/protocol are per interface
        out[7] = self.max_packet_size_ep0;
        LittleEndian::write_u16(&mut out[8..10], self.vendor_id);
        LittleEndian::write_u16(&mut out[10..12], self.product_id);
        LittleEndian::write_u16(&mut out[12..14], self.device_rev);
        out[14] = 1; // iManufacturer
        out[15] = 2; // iProduct
        out[16] = 0; // no serial string
        out[17] = 1;
        out
    }

    /// Configuration, interface and endpoint descriptors in one block.
    pub fn configuration_descriptor(&self) -> Vec<u8> {
        let total = Self::CONFIG_HEADER_SIZE
            + Self::INTERFACE_SIZE
            + self.endpoints.len() * EndpointDescriptor::SIZE;

        let mut out = vec![0u8; Self::CONFIG_HEADER_SIZE];
        out[0] = Self::CONFIG_HEADER_SIZE as u8;
        out[1] = DescriptorType::Configuration as u8;
        LittleEndian::write_u16(&mut out[2..4], total as u16);
        out[4] = 1; // bNumInterfaces
        out[5] = 1; // bConfigurationValue
        out[6] = 3; // iConfiguration
        out[7] = CONFIG_ATTR_SELF_POWERED;
        out[8] = 0;

        out.extend_from_slice(&[
            Self::INTERFACE_SIZE as u8,
            DescriptorType::Interface as u8,
            0,
            0,
            self.endpoints.len() as u8,
            self.interface_class,
            self.interface_subclass,
            self.interface_protocol,
            0,
        ]);
        for ep in &self.endpoints {
            out.extend_from_slice(&ep.to_bytes());
        }
        out
    }

    /// String descriptor `index`; index 0 is the language table.
    pub fn string_descriptor(&self, index: u8) -> Option<Vec<u8>> {
        let text = match index {
            0 => {
                let mut out = vec![4, DescriptorType::String as u8, 0, 0];
                LittleEndian::write_u16(&mut out[2..4], LANGID_EN_US);
                return Some(out);
            }
            1 => &self.manufacturer,
            2 => &self.product,
            3 => &self.configuration,
            _ => return None,
        };

        let units: Vec<u16> = text.encode_utf16().collect();
        let mut out = vec![0u8; 2 + units.len() * 2];
        out[0] = out.len() as u8;
        out[1] = DescriptorType::String as u8;
        LittleEndian::write_u16_into(&units, &mut out[2..]);
        Some(out)
    }

    /// BOS with a single USB 2.0 extension block (no LPM).
    pub fn bos_descriptor(&self) -> Vec<u8> {
        BinaryObjectStore::new(vec![DeviceCapability::usb2_extension(0)]).to_bytes()
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::qdloader()
    }
}

/// Vendor state of the Sahara device. It answers no vendor requests.
#[derive(Debug, Default)]
pub struct SaharaVendor;

impl VendorHandlers for SaharaVendor {
    const NAME: &'static str = "SaharaVendor";

    fn handler_table() -> HandlerTable<Self> {
        HandlerTable::empty()
    }
}

/// Complete emulated device: endpoint 0 plus the Sahara bulk function.
pub struct SaharaDevice<T: DeviceTransport, S: ImageSink, O: SaharaObserver = TracingObserver> {
    profile: DeviceProfile,
    control: ControlDispatcher<SaharaVendor>,
    engine: SaharaEngine<T, S, O>,
}

impl<T: DeviceTransport, S: ImageSink, O: SaharaObserver + 'static> SaharaDevice<T, S, O> {
    pub fn new(engine: SaharaEngine<T, S, O>) -> Self {
        Self::with_profile(DeviceProfile::qdloader(), engine)
    }

    pub fn with_profile(profile: DeviceProfile, engine: SaharaEngine<T, S, O>) -> Self {
        Self {
            profile,
            control: ControlDispatcher::new(SaharaVendor),
            engine,
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn engine(&self) -> &SaharaEngine<T, S, O> {
        &self.engine
    }

    /// Decode a raw SETUP packet and answer it.
    pub fn handle_setup(&mut self, setup: &[u8]) -> Result<ControlResponse, RequestError> {
        let request = ControlRequest::parse(setup)?;
        Ok(self.handle_control(&request))
    }

    pub fn handle_control(&mut self, request: &ControlRequest) -> ControlResponse {
        match request.request_type.kind() {
            RequestKind::Vendor => self.control.dispatch(request),
            RequestKind::Standard => match request.request {
                REQ_GET_DESCRIPTOR if request.request_type.direction() == Direction::DeviceToHost => {
                    self.get_descriptor(request)
                }
                REQ_SET_CONFIGURATION | REQ_SET_INTERFACE => ControlResponse::Data(Vec::new()),
                _ => ControlResponse::Stall,
            },
            _ => {
                debug!(request = ?request, "Class request on a vendor-specific device");
                ControlResponse::Stall
            }
        }
    }

    fn get_descriptor(&self, request: &ControlRequest) -> ControlResponse {
        let kind = (request.value >> 8) as u8;
        let index = request.value as u8;
        let descriptor = match kind {
            k if k == DescriptorType::Device as u8 => Some(self.profile.device_descriptor()),
            k if k == DescriptorType::Configuration as u8 => {
                Some(self.profile.configuration_descriptor())
            }
            k if k == DescriptorType::String as u8 => self.profile.string_descriptor(index),
            k if k == DescriptorType::Bos as u8 => Some(self.profile.bos_descriptor()),
            _ => None,
        };

        match descriptor {
            Some(mut data) => {
                data.truncate(request.length as usize);
                ControlResponse::Data(data)
            }
            None => {
                debug!(kind, index, "Descriptor not available");
                ControlResponse::Stall
            }
        }
    }
}

impl<T: DeviceTransport, S: ImageSink, O: SaharaObserver + 'static> BulkFunction
    for SaharaDevice<T, S, O>
{
    type Error = SaharaError;

    fn on_bulk_out(&mut self, data: &[u8]) -> Result<(), SaharaError> {
        self.engine.on_bulk_out(data)
    }

    fn on_bulk_in_ready(&mut self) -> Result<(), SaharaError> {
        self.engine.on_bulk_in_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::NullObserver;
    use crate::identity::DeviceIdentity;
    use crate::image::MemorySink;
    use crate::transport::MockTransport;
    use crate::usb::RequestType;

    fn device() -> (SaharaDevice<MockTransport, MemorySink, NullObserver>, MockTransport) {
        let transport = MockTransport::new();
        let engine = SaharaEngine::with_observer(
            transport.clone(),
            MemorySink::new(),
            DeviceIdentity::default(),
            Arc::new(NullObserver),
        );
        (SaharaDevice::new(engine), transport)
    }

    fn get_descriptor(kind: u8, index: u8, length: u16) -> [u8; 8] {
        let mut setup = [0x80, REQ_GET_DESCRIPTOR, index, kind, 0, 0, 0, 0];
        LittleEndian::write_u16(&mut setup[6..8], length);
        setup
    }

    #[test]
    fn test_device_descriptor_ids() {
        let d = DeviceProfile::qdloader().device_descriptor();
        assert_eq!(d.len(), 18);
        assert_eq!(&d[8..14], &[0xC6, 0x05, 0x08, 0x90, 0x00, 0x01]);
    }

    #[test]
    fn test_configuration_descriptor() {
        let c = DeviceProfile::qdloader().configuration_descriptor();
        assert_eq!(c.len(), 9 + 9 + 7 + 7);
        assert_eq!(LittleEndian::read_u16(&c[2..4]) as usize, c.len());
        // interface: vendor specific, two endpoints
        assert_eq!(&c[9..18], &[9, 4, 0, 0, 2, 0xFF, 0xFF, 0xFF, 0]);
        assert_eq!(&c[18..25], &[7, 5, 0x01, 0x02, 0x00, 0x02, 0]);
        assert_eq!(&c[25..32], &[7, 5, 0x83, 0x02, 0x00, 0x02, 0]);
    }

    #[test]
    fn test_string_descriptors() {
        let p = DeviceProfile::qdloader();
        assert_eq!(p.string_descriptor(0).unwrap(), [4, 3, 0x09, 0x04]);
        let product = p.string_descriptor(2).unwrap();
        assert_eq!(product[0] as usize, 2 + 2 * "QHUSB__BULK".len());
        assert_eq!(&product[2..6], &[b'Q', 0, b'H', 0]);
        assert!(p.string_descriptor(9).is_none());
    }

    #[test]
    fn test_get_descriptor_truncates() {
        let (mut dev, _) = device();
        let rsp = dev.handle_setup(&get_descriptor(1, 0, 8)).unwrap();
        assert_eq!(
            rsp,
            ControlResponse::Data(DeviceProfile::qdloader().device_descriptor()[..8].to_vec())
        );
    }

    #[test]
    fn test_bos_descriptor() {
        let (mut dev, _) = device();
        let rsp = dev.handle_setup(&get_descriptor(0x0F, 0, 0xFF)).unwrap();
        assert_eq!(
            rsp,
            ControlResponse::Data(vec![5, 0x0F, 12, 0, 1, 7, 0x10, 0x02, 0, 0, 0, 0])
        );
    }

    #[test]
    fn test_vendor_requests_stall() {
        let (mut dev, _) = device();
        for code in [0x00, 0x05, 0x0A, 0x90] {
            let req = ControlRequest::new(RequestType::VENDOR_IN, code, 0, 0, 2);
            assert_eq!(dev.handle_control(&req), ControlResponse::Stall);
        }
    }

    #[test]
    fn test_short_setup_rejected() {
        let (mut dev, _) = device();
        assert!(matches!(
            dev.handle_setup(&[0x80, 0x06]),
            Err(RequestError::TooShort(2))
        ));
    }

    #[test]
    fn test_bulk_routed_to_engine() {
        let (mut dev, transport) = device();
        dev.on_bulk_in_ready().unwrap();
        let sends = transport.get_sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].endpoint, BULK_IN_ENDPOINT);
        assert_eq!(dev.engine().session().hello_count, 1);
    }
}
