//! Transport layer module.

pub mod mock;
pub mod traits;

pub use mock::{MockTransport, SentPacket};
pub use traits::{BulkFunction, DeviceTransport, TransportError};
