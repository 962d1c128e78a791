//! Handshake handlers (HELLO_RSP, SWITCH_MODE, DONE, RESET).

use tracing::{info, warn};

use super::{HandlerContext, Step, Transition, request_block};
use crate::error::SaharaError;
use crate::events::{LogLevel, SaharaEvent};
use crate::protocol::constants::*;
use crate::protocol::packet::{cmd_ready, done_response, reset_response};
use crate::protocol::{Hello, HelloResponse, Mode, SwitchMode};
use crate::state::machine::Phase;

/// Send the standard HELLO and count it.
pub(super) fn greet(ctx: &mut HandlerContext<'_>) -> Step {
    ctx.session.hello_count += 1;
    ctx.emit(SaharaEvent::HelloSent {
        count: ctx.session.hello_count,
    });
    Step::reply(Hello::new(Mode::ImageTxPending).to_bytes())
}

pub(super) fn handle_switch_mode(
    ctx: &mut HandlerContext<'_>,
    packet: &[u8],
) -> Result<Step, SaharaError> {
    let request = SwitchMode::from_bytes(packet)?;
    match Mode::from_u32(request.mode) {
        Some(Mode::ImageTxComplete) => {
            info!("SWITCH_MODE to IMAGE_TX_COMPLETE");
            Ok(Step::reply(Hello::new(Mode::ImageTxComplete).to_bytes()))
        }
        Some(Mode::Command) => {
            info!("SWITCH_MODE to COMMAND, re-sending HELLO");
            Ok(Step::reply(Hello::new(Mode::ImageTxPending).to_bytes()))
        }
        _ => {
            ctx.log(
                LogLevel::Info,
                format!("SWITCH_MODE to mode {} ignored", request.mode),
            );
            Ok(Step::none())
        }
    }
}

pub(super) fn handle_hello_response(
    ctx: &mut HandlerContext<'_>,
    packet: &[u8],
) -> Result<Step, SaharaError> {
    let response = HelloResponse::from_bytes(packet)?;
    ctx.session.hello_count += 1;

    match Mode::from_u32(response.mode) {
        Some(Mode::Command) => {
            info!("Host selected command mode");
            Ok(Step::reply(cmd_ready()))
        }
        Some(Mode::ImageTxPending | Mode::ImageTxComplete) => {
            info!(mode = response.mode, "Host is sending a loader");
            ctx.session.image.clear();
            let step = request_block(ctx.session, 0, IMAGE_HEADER_READ_LEN)?;
            Ok(step.goto(Phase::TransferInit))
        }
        _ => {
            warn!(mode = response.mode, "HELLO_RSP with unsupported mode");
            Ok(Step::none())
        }
    }
}

pub(super) fn handle_done_request(
    ctx: &mut HandlerContext<'_>,
    _packet: &[u8],
) -> Result<Step, SaharaError> {
    ctx.log(LogLevel::Info, "DONE_REQ, image transfer complete");
    Ok(Step::reply(done_response(Mode::ImageTxComplete.code())))
}

pub(super) fn handle_reset_request(
    ctx: &mut HandlerContext<'_>,
    _packet: &[u8],
) -> Result<Step, SaharaError> {
    ctx.log(LogLevel::Info, "RESET_REQ, restarting session");
    Ok(Step::reply(reset_response()).then(Transition::Reset))
}
