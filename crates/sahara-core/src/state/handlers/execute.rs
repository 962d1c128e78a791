//! Command-mode executables: identity readout.

use tracing::{debug, warn};

use super::{HandlerContext, Step};
use crate::error::SaharaError;
use crate::events::SaharaEvent;
use crate::protocol::{Command, ExecCommand, Execute, ExecuteResponse};

pub(super) fn handle_execute_request(
    ctx: &mut HandlerContext<'_>,
    packet: &[u8],
) -> Result<Step, SaharaError> {
    let request = Execute::from_bytes(packet, Command::ExecuteRequest)?;
    let Some(command) = ExecCommand::from_u32(request.command) else {
        return Ok(unsupported(ctx, request.command));
    };

    let response = ExecuteResponse::for_command(command);
    debug!(command = %command, data_len = response.data_len, "EXECUTE_RSP");
    Ok(Step::reply(response.to_bytes()))
}

pub(super) fn handle_execute_data(
    ctx: &mut HandlerContext<'_>,
    packet: &[u8],
) -> Result<Step, SaharaError> {
    let request = Execute::from_bytes(packet, Command::ExecuteData)?;
    let Some(command) = ExecCommand::from_u32(request.command) else {
        return Ok(unsupported(ctx, request.command));
    };

    debug!(command = %command, "Sending identity data");
    Ok(Step::reply(ctx.identity.execute_data(command)))
}

// No reply: an invented size would leave the host reading garbage.
fn unsupported(ctx: &HandlerContext<'_>, command: u32) -> Step {
    warn!(command = %format!("0x{:X}", command), "Unsupported execute command");
    ctx.emit(SaharaEvent::UnsupportedCommand { command });
    Step::none()
}
