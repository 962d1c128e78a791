//! Packet handlers - per-phase dispatch for inbound Sahara traffic.
//!
//! This module is split into submodules by functionality:
//! - `handshake`: HELLO exchange, mode switches, DONE and RESET
//! - `execute`: command-mode identity reads
//! - `transfer`: header, program header scan and image streaming
//!
//! Handlers only mutate the session's counters and buffers. Phase changes
//! and replies come back to the engine as a [`Step`].

mod execute;
mod handshake;
mod transfer;

use tracing::{debug, warn};

use crate::error::SaharaError;
use crate::events::{LogLevel, SaharaEvent, SaharaObserver};
use crate::identity::DeviceIdentity;
use crate::protocol::constants::*;
use crate::protocol::{Command, ReadData};
use crate::state::machine::{Phase, Session};

use execute::{handle_execute_data, handle_execute_request};
use handshake::{greet, handle_done_request, handle_hello_response, handle_reset_request, handle_switch_mode};
use transfer::{handle_image_header, handle_program_headers, handle_stream_block};

/// What the engine should do with the session after a reply goes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keep the current phase.
    Stay,
    /// Enter a new phase.
    Goto(Phase),
    /// All `total` bytes are in; persist and start over.
    Complete { total: u64 },
    /// Host asked for a reset; drop everything.
    Reset,
}

/// Handler outcome: at most one reply plus a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub reply: Option<Vec<u8>>,
    pub transition: Transition,
}

impl Step {
    /// No reply, no phase change.
    pub fn none() -> Self {
        Self {
            reply: None,
            transition: Transition::Stay,
        }
    }

    pub fn reply(bytes: Vec<u8>) -> Self {
        Self {
            reply: Some(bytes),
            transition: Transition::Stay,
        }
    }

    pub fn then(mut self, transition: Transition) -> Self {
        self.transition = transition;
        self
    }

    pub fn goto(self, phase: Phase) -> Self {
        self.then(Transition::Goto(phase))
    }
}

/// Handler context containing everything a packet may touch.
pub struct HandlerContext<'a> {
    pub identity: &'a DeviceIdentity,
    pub session: &'a mut Session,
    pub observer: &'a dyn SaharaObserver,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn emit(&self, event: SaharaEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(SaharaEvent::Log {
            level,
            message: message.into(),
        });
    }
}

type CommandHandler = fn(&mut HandlerContext<'_>, &[u8]) -> Result<Step, SaharaError>;

/// Opcodes understood while no transfer is running.
const HANDSHAKE_HANDLERS: &[(Command, CommandHandler)] = &[
    (Command::SwitchMode, handle_switch_mode),
    (Command::HelloResponse, handle_hello_response),
    (Command::ExecuteRequest, handle_execute_request),
    (Command::ExecuteData, handle_execute_data),
    (Command::DoneRequest, handle_done_request),
    (Command::ResetRequest, handle_reset_request),
];

fn lookup(command: Command) -> Option<CommandHandler> {
    HANDSHAKE_HANDLERS
        .iter()
        .find(|(code, _)| *code == command)
        .map(|(_, handler)| *handler)
}

/// The bulk IN endpoint is free: open with HELLO if it is still owed.
pub fn handle_in_ready(ctx: &mut HandlerContext<'_>) -> Step {
    if ctx.session.hello_count == 0 {
        greet(ctx)
    } else {
        Step::none()
    }
}

/// Handle one packet received in the handshake phase.
pub fn handle_handshake_packet(
    ctx: &mut HandlerContext<'_>,
    packet: &[u8],
) -> Result<Step, SaharaError> {
    // Legacy DLOAD probe is answered before anything else, HELLO owed or not.
    if packet.first() == Some(&LEGACY_DLOAD_REQUEST) {
        ctx.log(LogLevel::Info, "Legacy download request, sending ACK");
        return Ok(Step::reply(LEGACY_DLOAD_ACK.to_vec()));
    }

    // The first packet only tells us a host is there.
    if ctx.session.hello_count == 0 {
        return Ok(greet(ctx));
    }

    let Some(command) = Command::peek(packet) else {
        warn!(len = packet.len(), "Unknown Sahara opcode");
        ctx.log(LogLevel::Warn, "Unknown Sahara opcode, ignoring");
        return Ok(Step::none());
    };

    let Some(handler) = lookup(command) else {
        if command.is_memory_debug() {
            warn!(command = %command, "Memory debug is not supported");
        } else {
            warn!(command = %command, "Unexpected command during handshake");
        }
        ctx.log(LogLevel::Warn, format!("Ignoring {command}"));
        return Ok(Step::none());
    };

    debug!(command = %command, len = packet.len(), "Handling packet");
    match handler(ctx, packet) {
        Err(SaharaError::Packet(e)) => {
            warn!(command = %command, error = %e, "Dropping malformed packet");
            ctx.log(LogLevel::Warn, format!("Dropped malformed {command}: {e}"));
            Ok(Step::none())
        }
        other => other,
    }
}

/// Handle one fully reassembled block in a transfer phase.
pub fn handle_transfer_block(
    ctx: &mut HandlerContext<'_>,
    block: &[u8],
) -> Result<Step, SaharaError> {
    match ctx.session.phase {
        Phase::TransferInit => handle_image_header(ctx, block),
        Phase::FormatScan { phdr_offset } => handle_program_headers(ctx, block, phdr_offset),
        Phase::Streaming { total, remaining } => handle_stream_block(ctx, block, total, remaining),
        Phase::Handshake => {
            warn!(len = block.len(), "Image block outside of a transfer");
            Ok(Step::none())
        }
    }
}

/// Queue a READ_DATA for `len` bytes at `offset` and arm reassembly for it.
fn request_block(session: &mut Session, offset: u64, len: usize) -> Result<Step, SaharaError> {
    let wire_offset =
        u32::try_from(offset).map_err(|_| crate::image::ImageError::TooLarge(offset))?;
    session.current_offset = offset;
    session.reassembly.expect(len);
    debug!(
        offset = %format!("0x{:X}", offset),
        len = %format!("0x{:X}", len),
        "READ_DATA"
    );
    Ok(Step::reply(ReadData::new(wire_offset, len as u32).to_bytes()))
}
