//! Fixed-layout Sahara packets.
//!
//! All fields are little-endian u32 words. The second word of every packet is
//! its total length in bytes.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::command::{Command, ExecCommand, Mode};
use super::constants::*;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Unexpected command: expected 0x{expected:X}, got 0x{actual:X}")]
    UnexpectedCommand { expected: u32, actual: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn encode_words(words: &[u32]) -> Vec<u8> {
    let mut buf = vec![0u8; words.len() * 4];
    LittleEndian::write_u32_into(words, &mut buf);
    buf
}

/// Check minimum length and command word, returning a cursor past the header.
fn open_packet(data: &[u8], command: Command, min_len: usize) -> Result<Cursor<&[u8]>, PacketError> {
    if data.len() < min_len {
        return Err(PacketError::BufferTooSmall {
            expected: min_len,
            actual: data.len(),
        });
    }
    let mut cursor = Cursor::new(data);
    let actual = cursor.read_u32::<LittleEndian>()?;
    if actual != command.code() {
        return Err(PacketError::UnexpectedCommand {
            expected: command.code(),
            actual,
        });
    }
    // Declared length is informational; hosts are inconsistent about it.
    let _len = cursor.read_u32::<LittleEndian>()?;
    Ok(cursor)
}

/// HELLO (48 bytes / 0x30), device -> host.
///
/// The device opens the conversation with this packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub version: u32,
    pub version_compatible: u32,
    pub max_cmd_len: u32,
    pub mode: u32,
}

impl Hello {
    pub const SIZE: usize = 0x30;

    pub fn new(mode: Mode) -> Self {
        Self {
            version: SAHARA_VERSION,
            version_compatible: SAHARA_VERSION_COMPATIBLE,
            max_cmd_len: SAHARA_MAX_CMD_PACKET_LEN,
            mode: mode.code(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_words(&[
            SAHARA_HELLO_REQ,
            Self::SIZE as u32,
            self.version,
            self.version_compatible,
            self.max_cmd_len,
            self.mode,
            0,
            0,
            0,
            0,
            0,
            0,
        ])
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, Command::Hello, 24)?;
        Ok(Self {
            version: cursor.read_u32::<LittleEndian>()?,
            version_compatible: cursor.read_u32::<LittleEndian>()?,
            max_cmd_len: cursor.read_u32::<LittleEndian>()?,
            mode: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// HELLO_RSP (48 bytes), host -> device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloResponse {
    pub version: u32,
    pub version_compatible: u32,
    pub status: u32,
    pub mode: u32,
}

impl HelloResponse {
    pub const SIZE: usize = 0x30;
    /// Only the first six words are interpreted.
    pub const MIN_SIZE: usize = 24;

    pub fn new(mode: Mode) -> Self {
        Self {
            version: SAHARA_VERSION,
            version_compatible: SAHARA_VERSION_COMPATIBLE,
            status: 0,
            mode: mode.code(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_words(&[
            SAHARA_HELLO_RSP,
            Self::SIZE as u32,
            self.version,
            self.version_compatible,
            self.status,
            self.mode,
            0,
            0,
            0,
            0,
            0,
            0,
        ])
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, Command::HelloResponse, Self::MIN_SIZE)?;
        Ok(Self {
            version: cursor.read_u32::<LittleEndian>()?,
            version_compatible: cursor.read_u32::<LittleEndian>()?,
            status: cursor.read_u32::<LittleEndian>()?,
            mode: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// READ_DATA (20 bytes), device -> host: "send me `length` bytes at `offset`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadData {
    pub image_id: u32,
    pub offset: u32,
    pub length: u32,
}

impl ReadData {
    pub const SIZE: usize = 0x14;

    pub fn new(offset: u32, length: u32) -> Self {
        Self {
            image_id: SAHARA_IMAGE_ID_PROGRAMMER,
            offset,
            length,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_words(&[
            SAHARA_READ_DATA,
            Self::SIZE as u32,
            self.image_id,
            self.offset,
            self.length,
        ])
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, Command::ReadData, Self::SIZE)?;
        Ok(Self {
            image_id: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            length: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// END_TRANSFER (16 bytes), device -> host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndTransfer {
    pub image_id: u32,
    pub status: u32,
}

impl EndTransfer {
    pub const SIZE: usize = 0x10;

    pub fn success() -> Self {
        Self {
            image_id: SAHARA_IMAGE_ID_PROGRAMMER,
            status: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_words(&[
            SAHARA_END_TRANSFER,
            Self::SIZE as u32,
            self.image_id,
            self.status,
        ])
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, Command::EndTransfer, Self::SIZE)?;
        Ok(Self {
            image_id: cursor.read_u32::<LittleEndian>()?,
            status: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// CMD_READY (8 bytes), device -> host.
pub fn cmd_ready() -> Vec<u8> {
    encode_words(&[SAHARA_CMD_READY, 0x8])
}

/// DONE_REQ (8 bytes), host -> device.
pub fn done_request() -> Vec<u8> {
    encode_words(&[SAHARA_DONE_REQ, 0x8])
}

/// DONE_RSP (12 bytes), device -> host.
pub fn done_response(image_tx_status: u32) -> Vec<u8> {
    encode_words(&[SAHARA_DONE_RSP, 0xC, image_tx_status])
}

/// RESET_REQ (8 bytes), host -> device.
pub fn reset_request() -> Vec<u8> {
    encode_words(&[SAHARA_RESET_REQ, 0x8])
}

/// RESET_RSP (8 bytes), device -> host.
pub fn reset_response() -> Vec<u8> {
    encode_words(&[SAHARA_RESET_RSP, 0x8])
}

/// SWITCH_MODE (12 bytes), host -> device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchMode {
    pub mode: u32,
}

impl SwitchMode {
    pub const SIZE: usize = 0xC;

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_words(&[SAHARA_SWITCH_MODE, Self::SIZE as u32, self.mode])
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, Command::SwitchMode, Self::SIZE)?;
        Ok(Self {
            mode: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// EXECUTE_REQ and EXECUTE_DATA share one layout (12 bytes), host -> device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execute {
    pub command: u32,
}

impl Execute {
    pub const SIZE: usize = 0xC;

    pub fn request(command: ExecCommand) -> Vec<u8> {
        encode_words(&[SAHARA_EXECUTE_REQ, Self::SIZE as u32, command.code()])
    }

    pub fn data(command: ExecCommand) -> Vec<u8> {
        encode_words(&[SAHARA_EXECUTE_DATA, Self::SIZE as u32, command.code()])
    }

    /// Parse either EXECUTE_REQ or EXECUTE_DATA, as selected by `kind`.
    pub fn from_bytes(data: &[u8], kind: Command) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, kind, Self::SIZE)?;
        Ok(Self {
            command: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// EXECUTE_RSP (16 bytes), device -> host: announces the EXECUTE_DATA size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResponse {
    pub command: u32,
    pub data_len: u32,
}

impl ExecuteResponse {
    pub const SIZE: usize = 0x10;

    pub fn for_command(command: ExecCommand) -> Self {
        Self {
            command: command.code(),
            data_len: command.response_len(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_words(&[
            SAHARA_EXECUTE_RSP,
            Self::SIZE as u32,
            self.command,
            self.data_len,
        ])
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = open_packet(data, Command::ExecuteResponse, Self::SIZE)?;
        Ok(Self {
            command: cursor.read_u32::<LittleEndian>()?,
            data_len: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_wire_bytes() {
        let expected: [u8; 48] = [
            0x01, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(Hello::new(Mode::ImageTxPending).to_bytes(), expected);
    }

    #[test]
    fn test_read_data_layout() {
        let bytes = ReadData::new(0x50, 0x1000).to_bytes();
        assert_eq!(bytes.len(), ReadData::SIZE);
        assert_eq!(
            bytes,
            [
                0x03, 0, 0, 0, 0x14, 0, 0, 0, 0x0D, 0, 0, 0, 0x50, 0, 0, 0, 0x00, 0x10, 0, 0
            ]
        );
        let parsed = ReadData::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.offset, 0x50);
        assert_eq!(parsed.length, 0x1000);
    }

    #[test]
    fn test_hello_response_mode_at_word_five() {
        let mut bytes = HelloResponse::new(Mode::Command).to_bytes();
        assert_eq!(&bytes[20..24], &[3, 0, 0, 0]);
        bytes.truncate(HelloResponse::MIN_SIZE);
        assert_eq!(HelloResponse::from_bytes(&bytes).unwrap().mode, 3);
    }

    #[test]
    fn test_short_packet_rejected() {
        let err = SwitchMode::from_bytes(&[0x0C, 0, 0, 0, 0x0C, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            PacketError::BufferTooSmall {
                expected: 12,
                actual: 8
            }
        ));
    }

    #[test]
    fn test_wrong_command_rejected() {
        let bytes = Execute::request(ExecCommand::SerialNumRead);
        let err = Execute::from_bytes(&bytes, Command::ExecuteData).unwrap_err();
        assert!(matches!(
            err,
            PacketError::UnexpectedCommand {
                expected: 0x0F,
                actual: 0x0D
            }
        ));
    }

    #[test]
    fn test_small_control_packets() {
        assert_eq!(cmd_ready(), [0x0B, 0, 0, 0, 0x08, 0, 0, 0]);
        assert_eq!(done_response(1), [0x06, 0, 0, 0, 0x0C, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(reset_response(), [0x08, 0, 0, 0, 0x08, 0, 0, 0]);
        assert_eq!(
            EndTransfer::success().to_bytes(),
            [0x04, 0, 0, 0, 0x10, 0, 0, 0, 0x0D, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
