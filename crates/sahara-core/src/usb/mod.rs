//! USB device-side plumbing: control requests, vendor dispatch and descriptors.

pub mod descriptors;
pub mod dispatch;
pub mod ftdi;
pub mod request;

pub use descriptors::{
    BinaryObjectStore, ClassSpecificEndpoint, DescriptorType, DeviceCapability, EndpointDescriptor,
};
pub use dispatch::{ControlDispatcher, ControlResponse, Handler, HandlerTable, VendorHandlers};
pub use ftdi::FtdiVendor;
pub use request::{ControlRequest, Direction, Recipient, RequestError, RequestKind, RequestType};
