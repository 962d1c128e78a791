//! Sahara engine - drives one session from bulk transport callbacks.

use std::sync::Arc;

use tracing::{info, instrument, trace};

use crate::error::SaharaError;
use crate::events::{
    PacketDirection, SaharaEvent, SaharaObserver, SaharaPhase, TracingObserver,
};
use crate::identity::DeviceIdentity;
use crate::image::ImageSink;
use crate::protocol::Command;
use crate::protocol::constants::BULK_IN_ENDPOINT;
use crate::state::handlers::{
    HandlerContext, Step, Transition, handle_handshake_packet, handle_in_ready,
    handle_transfer_block,
};
use crate::state::machine::Session;
use crate::transport::{BulkFunction, DeviceTransport, TransportError};

/// Sahara protocol engine for one emulated device.
///
/// Owns the session; the transport delivers host traffic through
/// [`BulkFunction`] and every reply leaves on [`BULK_IN_ENDPOINT`].
pub struct SaharaEngine<T: DeviceTransport, S: ImageSink, O: SaharaObserver = TracingObserver> {
    transport: T,
    sink: S,
    observer: Arc<O>,
    identity: DeviceIdentity,
    session: Session,
}

impl<T: DeviceTransport, S: ImageSink> SaharaEngine<T, S, TracingObserver> {
    /// Create an engine with the default tracing observer.
    pub fn new(transport: T, sink: S, identity: DeviceIdentity) -> Self {
        Self::with_observer(transport, sink, identity, Arc::new(TracingObserver))
    }
}

impl<T: DeviceTransport, S: ImageSink, O: SaharaObserver + 'static> SaharaEngine<T, S, O> {
    /// Create an engine with a custom observer.
    pub fn with_observer(transport: T, sink: S, identity: DeviceIdentity, observer: Arc<O>) -> Self {
        info!(hw_id = %hex::encode_upper(identity.hw_id), "Sahara engine ready");
        Self {
            transport,
            sink,
            observer,
            identity,
            session: Session::new(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> SaharaPhase {
        self.session.phase.kind()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn emit(&self, event: SaharaEvent) {
        self.observer.on_event(&event);
    }

    fn context(&mut self) -> HandlerContext<'_> {
        HandlerContext {
            identity: &self.identity,
            session: &mut self.session,
            observer: self.observer.as_ref(),
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), SaharaError> {
        if !self.transport.is_connected() {
            return Err(TransportError::Disconnected.into());
        }
        self.transport.send(BULK_IN_ENDPOINT, data)?;
        let packet_type = Command::peek(data)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "Data".to_string());
        self.emit(SaharaEvent::Packet {
            direction: PacketDirection::Tx,
            packet_type,
            length: data.len(),
        });
        Ok(())
    }

    fn process(&mut self, data: &[u8]) -> Result<(), SaharaError> {
        let step = if self.session.phase.is_transfer() {
            let Some(block) = self.session.reassembly.push(data)? else {
                return Ok(());
            };
            trace!(len = block.len(), "Block complete");
            handle_transfer_block(&mut self.context(), &block)?
        } else {
            handle_handshake_packet(&mut self.context(), data)?
        };
        self.apply(step)
    }

    fn apply(&mut self, step: Step) -> Result<(), SaharaError> {
        if let Some(reply) = &step.reply {
            self.send(reply)?;
        }

        match step.transition {
            Transition::Stay => {}
            Transition::Goto(next) => {
                let from = self.session.goto(next);
                if from.kind() != next.kind() {
                    self.emit(SaharaEvent::PhaseChanged {
                        from: from.kind(),
                        to: next.kind(),
                    });
                }
            }
            Transition::Complete { total } => self.complete(total)?,
            Transition::Reset => self.reset_session(),
        }
        Ok(())
    }

    /// Hand the finished image to the sink and start over.
    ///
    /// The session is reset before persisting, so a sink failure leaves the
    /// engine ready for a new host.
    fn complete(&mut self, total: u64) -> Result<(), SaharaError> {
        let mut image = std::mem::take(&mut self.session.image);
        image.truncate(total as usize);
        self.reset_session();

        let name = self.identity.loader_file_name();
        match self.sink.persist(&name, &image) {
            Ok(path) => {
                info!(path = %path.display(), length = image.len(), "Loader extracted");
                self.emit(SaharaEvent::ImageSaved {
                    path,
                    length: image.len() as u64,
                });
                Ok(())
            }
            Err(source) => {
                self.emit(SaharaEvent::Error {
                    message: format!("Failed to store {name}: {source}"),
                });
                Err(SaharaError::Persist { name, source })
            }
        }
    }

    fn reset_session(&mut self) {
        let from = self.session.phase.kind();
        self.session.reset();
        if from != SaharaPhase::Handshake {
            self.emit(SaharaEvent::PhaseChanged {
                from,
                to: SaharaPhase::Handshake,
            });
        }
    }

    fn fail(&mut self, error: &SaharaError) {
        match error {
            SaharaError::ReassemblyOverflow { .. } => {
                self.emit(SaharaEvent::ProtocolViolation {
                    message: error.to_string(),
                });
            }
            // Already reported by `complete`.
            SaharaError::Persist { .. } => {}
            _ => self.emit(SaharaEvent::Error {
                message: error.to_string(),
            }),
        }
        self.reset_session();
    }
}

impl<T: DeviceTransport, S: ImageSink, O: SaharaObserver + 'static> BulkFunction
    for SaharaEngine<T, S, O>
{
    type Error = SaharaError;

    #[instrument(skip(self, data), fields(len = data.len(), phase = %self.session.phase.kind()))]
    fn on_bulk_out(&mut self, data: &[u8]) -> Result<(), SaharaError> {
        if data.is_empty() {
            trace!("Ignoring zero-length packet");
            return Ok(());
        }

        let packet_type = if self.session.phase.is_transfer() {
            "Image".to_string()
        } else {
            Command::peek(data)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        };
        self.emit(SaharaEvent::Packet {
            direction: PacketDirection::Rx,
            packet_type,
            length: data.len(),
        });

        let result = self.process(data);
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    #[instrument(skip(self))]
    fn on_bulk_in_ready(&mut self) -> Result<(), SaharaError> {
        let step = handle_in_ready(&mut self.context());
        let result = self.apply(step);
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }
}
