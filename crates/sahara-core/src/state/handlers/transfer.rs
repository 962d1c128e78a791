//! Loader transfer handlers: header, ELF program headers, streaming.

use tracing::info;

use super::{HandlerContext, Step, Transition, request_block};
use crate::error::SaharaError;
use crate::events::SaharaEvent;
use crate::image::{ImageFormat, elf_image_length, elf_phdr_offset, raw_image_length};
use crate::protocol::EndTransfer;
use crate::protocol::constants::*;
use crate::state::machine::Phase;

/// First 0x50 bytes: decide the format.
pub(super) fn handle_image_header(
    ctx: &mut HandlerContext<'_>,
    block: &[u8],
) -> Result<Step, SaharaError> {
    ctx.session.image.extend_from_slice(block);
    let format = ImageFormat::detect(block);
    ctx.emit(SaharaEvent::ImageDetected { format });

    match format {
        ImageFormat::Elf => {
            let phdr_offset = elf_phdr_offset(block)?;
            info!(phdr_offset = %format!("0x{:X}", phdr_offset), "ELF loader");
            let step = request_block(ctx.session, IMAGE_HEADER_READ_LEN as u64, IMAGE_CHUNK_LEN)?;
            Ok(step.goto(Phase::FormatScan { phdr_offset }))
        }
        ImageFormat::Raw => {
            let total = raw_image_length(block)?;
            begin_streaming(ctx, total)
        }
    }
}

/// Block at 0x50 is in: the program header table can be walked.
pub(super) fn handle_program_headers(
    ctx: &mut HandlerContext<'_>,
    block: &[u8],
    phdr_offset: usize,
) -> Result<Step, SaharaError> {
    ctx.session.image.extend_from_slice(block);
    let total = elf_image_length(&ctx.session.image, phdr_offset)?;
    begin_streaming(ctx, total)
}

pub(super) fn handle_stream_block(
    ctx: &mut HandlerContext<'_>,
    block: &[u8],
    total: u64,
    remaining: u64,
) -> Result<Step, SaharaError> {
    ctx.session.image.extend_from_slice(block);
    let remaining = remaining.saturating_sub(block.len() as u64);
    ctx.emit(SaharaEvent::Progress {
        current: total - remaining,
        total,
    });

    if remaining == 0 {
        return Ok(finish(total));
    }

    let offset = ctx.session.current_offset + block.len() as u64;
    let step = request_block(ctx.session, offset, next_chunk(remaining))?;
    Ok(step.goto(Phase::Streaming { total, remaining }))
}

fn begin_streaming(ctx: &mut HandlerContext<'_>, total: u64) -> Result<Step, SaharaError> {
    ctx.emit(SaharaEvent::ImageLength { total });

    let received = ctx.session.image.len() as u64;
    let remaining = total.saturating_sub(received);
    if remaining == 0 {
        return Ok(finish(total));
    }

    let step = request_block(ctx.session, received, next_chunk(remaining))?;
    Ok(step.goto(Phase::Streaming { total, remaining }))
}

fn next_chunk(remaining: u64) -> usize {
    remaining.min(IMAGE_CHUNK_LEN as u64) as usize
}

fn finish(total: u64) -> Step {
    Step::reply(EndTransfer::success().to_bytes()).then(Transition::Complete { total })
}
