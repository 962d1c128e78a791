//! Table-driven control request dispatch.
//!
//! Each emulated device owns a vendor state struct and a table mapping
//! bRequest codes to methods on it. The table is fixed at construction, so
//! every state mutation goes through a named handler.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::request::{ControlRequest, Direction};

/// A vendor request handler: a method on the device's vendor state.
pub type Handler<S> = fn(&mut S, &ControlRequest) -> Vec<u8>;

/// Outcome of a control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    /// Data stage payload (empty for a zero-length status stage).
    Data(Vec<u8>),
    /// Request not supported; the transport must STALL endpoint 0.
    Stall,
}

/// Immutable request-code -> handler mapping.
pub struct HandlerTable<S> {
    handlers: HashMap<u8, Handler<S>>,
}

impl<S> HandlerTable<S> {
    pub fn new(entries: &[(u8, Handler<S>)]) -> Self {
        Self {
            handlers: entries.iter().copied().collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn get(&self, request: u8) -> Option<Handler<S>> {
        self.handlers.get(&request).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Vendor state that knows its own handler table.
pub trait VendorHandlers: Sized {
    /// Human-readable name for logs.
    const NAME: &'static str;

    fn handler_table() -> HandlerTable<Self>;
}

/// Owns a vendor state and routes requests to it.
pub struct ControlDispatcher<S> {
    state: S,
    table: HandlerTable<S>,
}

impl<S: VendorHandlers> ControlDispatcher<S> {
    pub fn new(state: S) -> Self {
        let table = S::handler_table();
        debug!(vendor = S::NAME, handlers = table.len(), "Vendor table installed");
        Self { state, table }
    }
}

impl<S> ControlDispatcher<S> {
    pub fn with_table(state: S, table: HandlerTable<S>) -> Self {
        Self { state, table }
    }

    /// Run the handler for `request`, or STALL when none is registered.
    ///
    /// IN data is cut to wLength; a device may never send more than the host asked for.
    pub fn dispatch(&mut self, request: &ControlRequest) -> ControlResponse {
        let Some(handler) = self.table.get(request.request) else {
            warn!(
                request = %format!("0x{:02X}", request.request),
                value = %format!("0x{:04X}", request.value),
                "No handler for control request, stalling"
            );
            return ControlResponse::Stall;
        };

        let mut reply = handler(&mut self.state, request);
        if request.request_type.direction() == Direction::DeviceToHost {
            reply.truncate(request.length as usize);
        }
        debug!(
            request = %format!("0x{:02X}", request.request),
            reply_len = reply.len(),
            "Control request handled"
        );
        ControlResponse::Data(reply)
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}
