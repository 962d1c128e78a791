//! In-process flashing host for driving the engine without hardware.
//!
//! `LoopbackHost` plays the PC side of a Sahara exchange: it either feeds a
//! loader image in answer to READ_DATA, or walks command mode and reads the
//! identity back. [`run_loopback`] pumps packets between it and any
//! [`BulkFunction`] wired to a [`MockTransport`].

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::error::SaharaError;
use crate::identity::DeviceIdentity;
use crate::protocol::constants::*;
use crate::protocol::packet::done_request;
use crate::protocol::{
    Command, ExecCommand, Execute, ExecuteResponse, HelloResponse, Mode, PacketError, ReadData,
};
use crate::transport::{BulkFunction, MockTransport};

/// Upper bound on pump rounds before a session is declared stuck.
pub const DEFAULT_ROUND_LIMIT: usize = 100_000;

#[derive(Error, Debug)]
pub enum LoopbackError {
    #[error("Device error: {0}")]
    Device(#[from] SaharaError),

    #[error("Malformed device packet: {0}")]
    Packet(#[from] PacketError),

    #[error("Unexpected {got} while {state}")]
    Unexpected { state: &'static str, got: String },

    #[error("EXECUTE_RSP for 0x{actual:X}, asked for 0x{expected:X}")]
    WrongExecutable { expected: u32, actual: u32 },

    #[error("Device went quiet after {rounds} rounds")]
    Stalled { rounds: usize },

    #[error("Session did not finish within {0} rounds")]
    RoundLimit(usize),
}

/// What the host wants from the device.
#[derive(Debug, Clone)]
pub enum HostMode {
    /// Upload this loader.
    Image(Vec<u8>),
    /// Read every identity field in command mode.
    Identify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    AwaitHello,
    Uploading,
    AwaitDone,
    AwaitCmdReady,
    AwaitExecResponse(usize),
    AwaitExecData(usize, usize),
    Finished,
}

impl HostState {
    fn describe(&self) -> &'static str {
        match self {
            HostState::AwaitHello => "waiting for HELLO",
            HostState::Uploading => "uploading",
            HostState::AwaitDone => "waiting for DONE_RSP",
            HostState::AwaitCmdReady => "waiting for CMD_READY",
            HostState::AwaitExecResponse(_) => "waiting for EXECUTE_RSP",
            HostState::AwaitExecData(..) => "waiting for EXECUTE_DATA",
            HostState::Finished => "finished",
        }
    }
}

fn describe_packet(packet: &[u8]) -> String {
    match Command::peek(packet) {
        Some(command) => command.to_string(),
        None => format!("{} raw bytes", packet.len()),
    }
}

/// Scripted host side of a Sahara session.
#[derive(Debug)]
pub struct LoopbackHost {
    mode: HostMode,
    state: HostState,
    max_packet_size: usize,
    bytes_served: u64,
    exec_data: Vec<(ExecCommand, Vec<u8>)>,
}

impl LoopbackHost {
    pub fn new(mode: HostMode) -> Self {
        Self {
            mode,
            state: HostState::AwaitHello,
            max_packet_size: MAX_PKT_SIZE,
            bytes_served: 0,
            exec_data: Vec::new(),
        }
    }

    pub fn upload(image: Vec<u8>) -> Self {
        Self::new(HostMode::Image(image))
    }

    pub fn identify() -> Self {
        Self::new(HostMode::Identify)
    }

    /// Split READ_DATA answers into bulk packets of at most `size` bytes.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.max(1);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.state == HostState::Finished
    }

    /// Image bytes handed to the device so far.
    pub fn bytes_served(&self) -> u64 {
        self.bytes_served
    }

    /// Identity as read in command mode, once every field is in.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        let find = |cmd: ExecCommand| {
            self.exec_data
                .iter()
                .find(|(c, _)| *c == cmd)
                .map(|(_, data)| data.as_slice())
        };

        // Repeated fields: the first copy is authoritative.
        let hash: [u8; 32] = find(ExecCommand::OemPkHashRead)?.get(..32)?.try_into().ok()?;
        let hw_id: [u8; 8] = find(ExecCommand::MsmHwIdRead)?.get(..8)?.try_into().ok()?;
        let serial: [u8; 4] = find(ExecCommand::SerialNumRead)?.get(..4)?.try_into().ok()?;
        let sbl: [u8; 4] = find(ExecCommand::GetSoftwareVersionSbl)?
            .get(..4)?
            .try_into()
            .ok()?;

        Some(DeviceIdentity::new(
            hash,
            hw_id,
            u32::from_le_bytes(serial),
            u32::from_le_bytes(sbl),
        ))
    }

    /// Raw EXECUTE_DATA replies in the order they arrived.
    pub fn execute_replies(&self) -> &[(ExecCommand, Vec<u8>)] {
        &self.exec_data
    }

    /// React to one device packet, returning the bulk packets to send back.
    pub fn on_device_packet(&mut self, packet: &[u8]) -> Result<Vec<Vec<u8>>, LoopbackError> {
        // EXECUTE_DATA replies carry no header.
        if let HostState::AwaitExecData(index, len) = self.state {
            return self.on_exec_data(index, len, packet);
        }

        let command = Command::peek(packet);
        match (self.state, command) {
            (HostState::AwaitHello, Some(Command::Hello)) => {
                let mode = match self.mode {
                    HostMode::Image(_) => {
                        self.state = HostState::Uploading;
                        Mode::ImageTxPending
                    }
                    HostMode::Identify => {
                        self.state = HostState::AwaitCmdReady;
                        Mode::Command
                    }
                };
                Ok(vec![HelloResponse::new(mode).to_bytes()])
            }
            (HostState::Uploading, Some(Command::ReadData)) => self.on_read_data(packet),
            (HostState::Uploading, Some(Command::EndTransfer)) => {
                info!(bytes = self.bytes_served, "Device reports end of transfer");
                self.state = HostState::AwaitDone;
                Ok(vec![done_request()])
            }
            // The device re-greets once a transfer completes.
            (HostState::AwaitDone, Some(Command::Hello)) => Ok(Vec::new()),
            (HostState::AwaitDone, Some(Command::DoneResponse)) => {
                self.state = HostState::Finished;
                Ok(Vec::new())
            }
            (HostState::AwaitCmdReady, Some(Command::CmdReady)) => Ok(self.request_exec(0)),
            (HostState::AwaitExecResponse(index), Some(Command::ExecuteResponse)) => {
                let rsp = ExecuteResponse::from_bytes(packet)?;
                let expected = ExecCommand::ALL[index];
                if rsp.command != expected.code() {
                    return Err(LoopbackError::WrongExecutable {
                        expected: expected.code(),
                        actual: rsp.command,
                    });
                }
                self.state = HostState::AwaitExecData(index, rsp.data_len as usize);
                Ok(vec![Execute::data(expected)])
            }
            (state, _) => Err(LoopbackError::Unexpected {
                state: state.describe(),
                got: describe_packet(packet),
            }),
        }
    }

    fn on_read_data(&mut self, packet: &[u8]) -> Result<Vec<Vec<u8>>, LoopbackError> {
        let HostMode::Image(image) = &self.mode else {
            return Err(LoopbackError::Unexpected {
                state: self.state.describe(),
                got: "READ_DATA".to_string(),
            });
        };

        let req = ReadData::from_bytes(packet)?;
        let start = req.offset as usize;
        let len = req.length as usize;
        debug!(
            offset = %format!("0x{:X}", start),
            len = %format!("0x{:X}", len),
            "Serving READ_DATA"
        );

        let mut block = image
            .get(start..image.len().min(start + len))
            .unwrap_or_default()
            .to_vec();
        if block.len() < len {
            warn!(
                offset = %format!("0x{:X}", start),
                missing = len - block.len(),
                "READ_DATA past end of image, padding"
            );
            block.resize(len, 0);
        }

        self.bytes_served += block.len() as u64;
        Ok(block
            .chunks(self.max_packet_size)
            .map(<[u8]>::to_vec)
            .collect())
    }

    fn request_exec(&mut self, index: usize) -> Vec<Vec<u8>> {
        self.state = HostState::AwaitExecResponse(index);
        vec![Execute::request(ExecCommand::ALL[index])]
    }

    fn on_exec_data(
        &mut self,
        index: usize,
        len: usize,
        packet: &[u8],
    ) -> Result<Vec<Vec<u8>>, LoopbackError> {
        let command = ExecCommand::ALL[index];
        if packet.len() != len {
            return Err(LoopbackError::Unexpected {
                state: self.state.describe(),
                got: format!("{} bytes for {} (announced {})", packet.len(), command, len),
            });
        }
        self.exec_data.push((command, packet.to_vec()));

        if index + 1 < ExecCommand::ALL.len() {
            Ok(self.request_exec(index + 1))
        } else {
            self.state = HostState::Finished;
            Ok(Vec::new())
        }
    }
}

/// Drive `device` and `host` against each other until the host is done.
///
/// Each round offers the IN endpoint to the device first, then delivers
/// whatever the device sent and feeds the host's answers back.
#[instrument(skip_all)]
pub fn run_loopback<D>(
    device: &mut D,
    transport: &MockTransport,
    host: &mut LoopbackHost,
    round_limit: usize,
) -> Result<usize, LoopbackError>
where
    D: BulkFunction<Error = SaharaError>,
{
    for round in 1..=round_limit {
        device.on_bulk_in_ready()?;

        let sent = transport.take_sends();
        let mut replies = Vec::new();
        for packet in &sent {
            replies.extend(host.on_device_packet(&packet.data)?);
        }

        if host.is_finished() {
            info!(rounds = round, "Loopback session finished");
            return Ok(round);
        }
        if sent.is_empty() && replies.is_empty() {
            return Err(LoopbackError::Stalled { rounds: round });
        }

        for reply in &replies {
            device.on_bulk_out(reply)?;
        }
    }
    Err(LoopbackError::RoundLimit(round_limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use byteorder::{ByteOrder, LittleEndian};

    use crate::device::SaharaDevice;
    use crate::engine::SaharaEngine;
    use crate::events::NullObserver;
    use crate::image::MemorySink;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new(
            [0x5A; 32],
            [0x04, 0x00, 0x01, 0x00, 0xE1, 0x00, 0x7B, 0x00],
            0x0167_8739,
            7,
        )
    }

    fn device() -> (
        SaharaDevice<MockTransport, MemorySink, NullObserver>,
        MockTransport,
        MemorySink,
    ) {
        let transport = MockTransport::new();
        let sink = MemorySink::new();
        let engine = SaharaEngine::with_observer(
            transport.clone(),
            sink.clone(),
            identity(),
            Arc::new(NullObserver),
        );
        (SaharaDevice::new(engine), transport, sink)
    }

    #[test]
    fn test_upload_raw_loader() {
        let (mut dev, transport, sink) = device();
        let mut image: Vec<u8> = (0..0x1A3C).map(|i| (i ^ 0x5C) as u8).collect();
        let len = image.len() as u32;
        LittleEndian::write_u32(&mut image[0x1C..0x20], len);

        let mut host = LoopbackHost::upload(image.clone()).with_max_packet_size(0x40);
        run_loopback(&mut dev, &transport, &mut host, DEFAULT_ROUND_LIMIT).unwrap();

        assert!(host.is_finished());
        assert_eq!(host.bytes_served(), image.len() as u64);
        let images = sink.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, "04000100E1007B00.bin");
        assert_eq!(images[0].1, image);
    }

    #[test]
    fn test_upload_short_elf_pads_scan_block() {
        let (mut dev, transport, sink) = device();
        // Single segment ending before the 0x1050 scan block does.
        let mut image = vec![0u8; 0x800];
        image[..4].copy_from_slice(b"\x7FELF");
        LittleEndian::write_u32(&mut image[0x20..0x24], 0x40);
        LittleEndian::write_u64(&mut image[0x48..0x50], 0x100);
        LittleEndian::write_u64(&mut image[0x60..0x68], 0x700);
        image[0x100..].fill(0xEE);

        let mut host = LoopbackHost::upload(image.clone());
        run_loopback(&mut dev, &transport, &mut host, DEFAULT_ROUND_LIMIT).unwrap();

        assert_eq!(sink.images()[0].1, image);
    }

    #[test]
    fn test_identify_reads_back_identity() {
        let (mut dev, transport, sink) = device();
        let mut host = LoopbackHost::identify();
        run_loopback(&mut dev, &transport, &mut host, DEFAULT_ROUND_LIMIT).unwrap();

        assert_eq!(host.identity().unwrap(), identity());
        let replies = host.execute_replies();
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[1].1, identity().hw_id.repeat(3));
        assert!(sink.images().is_empty());
    }

    #[test]
    fn test_greeting_is_consumed_by_finished_host() {
        let (mut dev, transport, sink) = device();
        let mut image = vec![0x11u8; 0x300];
        LittleEndian::write_u32(&mut image[0x1C..0x20], 0x300);

        let mut host = LoopbackHost::upload(image.clone());
        run_loopback(&mut dev, &transport, &mut host, DEFAULT_ROUND_LIMIT).unwrap();
        assert_eq!(sink.images().len(), 1);

        // The post-transfer HELLO went to the first host; a second one waits forever.
        let mut late = LoopbackHost::upload(image);
        let err = run_loopback(&mut dev, &transport, &mut late, DEFAULT_ROUND_LIMIT).unwrap_err();
        assert!(matches!(err, LoopbackError::Stalled { rounds: 1 }));
    }

    #[test]
    fn test_round_limit() {
        let (mut dev, transport, _) = device();
        let mut image = vec![0u8; 0x5000];
        LittleEndian::write_u32(&mut image[0x1C..0x20], 0x5000);
        let mut host = LoopbackHost::upload(image);
        let err = run_loopback(&mut dev, &transport, &mut host, 2).unwrap_err();
        assert!(matches!(err, LoopbackError::RoundLimit(2)));
    }

    #[test]
    fn test_unexpected_packet() {
        let mut host = LoopbackHost::identify();
        let err = host.on_device_packet(&[0x0B, 0, 0, 0, 0x08, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            LoopbackError::Unexpected {
                state: "waiting for HELLO",
                ..
            }
        ));
    }
}
