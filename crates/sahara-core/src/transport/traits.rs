//! Device-side USB transport abstraction.
//!
//! The emulator never touches real hardware itself. A gadget/FunctionFS or
//! USB/IP backend delivers host traffic through [`BulkFunction`] and carries
//! replies out through [`DeviceTransport`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Host disconnected")]
    Disconnected,
}

/// Outbound half: queue a payload on an IN endpoint.
///
/// Implementations must not reorder payloads. The engine sends at most one
/// payload per callback and waits for the next `on_bulk_in_ready`.
pub trait DeviceTransport: Send + Sync {
    /// Transmit `data` on IN endpoint `endpoint`.
    fn send(&self, endpoint: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Check if the host is still attached. The engine sends nothing while
    /// this is false.
    fn is_connected(&self) -> bool;
}

/// Inbound half: a USB function driven by transport callbacks.
///
/// Callbacks are serialized by the caller; implementations do no locking.
pub trait BulkFunction {
    type Error;

    /// A host-to-device payload arrived on the bulk OUT endpoint.
    fn on_bulk_out(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// The bulk IN endpoint can take a new payload.
    fn on_bulk_in_ready(&mut self) -> Result<(), Self::Error>;
}
