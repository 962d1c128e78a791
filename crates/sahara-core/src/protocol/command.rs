//! Sahara command codes.
//!
//! Every Sahara packet starts with a little-endian u32 command word followed
//! by the total packet length. This module maps the command word to a typed
//! value so handlers can be looked up without magic numbers.

use std::fmt;

use super::constants::*;

/// Parsed Sahara command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Hello,
    HelloResponse,
    ReadData,
    EndTransfer,
    DoneRequest,
    DoneResponse,
    ResetRequest,
    ResetResponse,
    MemoryDebug,
    MemoryRead,
    CmdReady,
    SwitchMode,
    ExecuteRequest,
    ExecuteResponse,
    ExecuteData,
    MemoryDebug64,
    MemoryRead64,
    MemoryReadData64,
}

impl Command {
    /// Map a raw command word to a known command.
    pub fn from_u32(value: u32) -> Option<Self> {
        let cmd = match value {
            SAHARA_HELLO_REQ => Self::Hello,
            SAHARA_HELLO_RSP => Self::HelloResponse,
            SAHARA_READ_DATA => Self::ReadData,
            SAHARA_END_TRANSFER => Self::EndTransfer,
            SAHARA_DONE_REQ => Self::DoneRequest,
            SAHARA_DONE_RSP => Self::DoneResponse,
            SAHARA_RESET_REQ => Self::ResetRequest,
            SAHARA_RESET_RSP => Self::ResetResponse,
            SAHARA_MEMORY_DEBUG => Self::MemoryDebug,
            SAHARA_MEMORY_READ => Self::MemoryRead,
            SAHARA_CMD_READY => Self::CmdReady,
            SAHARA_SWITCH_MODE => Self::SwitchMode,
            SAHARA_EXECUTE_REQ => Self::ExecuteRequest,
            SAHARA_EXECUTE_RSP => Self::ExecuteResponse,
            SAHARA_EXECUTE_DATA => Self::ExecuteData,
            SAHARA_64BIT_MEMORY_DEBUG => Self::MemoryDebug64,
            SAHARA_64BIT_MEMORY_READ => Self::MemoryRead64,
            SAHARA_64BIT_MEMORY_READ_DATA => Self::MemoryReadData64,
            _ => return None,
        };
        Some(cmd)
    }

    /// Read the command word from the start of a packet.
    ///
    /// Returns `None` for packets shorter than one word or with an unknown code.
    pub fn peek(packet: &[u8]) -> Option<Self> {
        let word: [u8; 4] = packet.get(..4)?.try_into().ok()?;
        Self::from_u32(u32::from_le_bytes(word))
    }

    /// Raw command word.
    pub fn code(&self) -> u32 {
        match self {
            Self::Hello => SAHARA_HELLO_REQ,
            Self::HelloResponse => SAHARA_HELLO_RSP,
            Self::ReadData => SAHARA_READ_DATA,
            Self::EndTransfer => SAHARA_END_TRANSFER,
            Self::DoneRequest => SAHARA_DONE_REQ,
            Self::DoneResponse => SAHARA_DONE_RSP,
            Self::ResetRequest => SAHARA_RESET_REQ,
            Self::ResetResponse => SAHARA_RESET_RSP,
            Self::MemoryDebug => SAHARA_MEMORY_DEBUG,
            Self::MemoryRead => SAHARA_MEMORY_READ,
            Self::CmdReady => SAHARA_CMD_READY,
            Self::SwitchMode => SAHARA_SWITCH_MODE,
            Self::ExecuteRequest => SAHARA_EXECUTE_REQ,
            Self::ExecuteResponse => SAHARA_EXECUTE_RSP,
            Self::ExecuteData => SAHARA_EXECUTE_DATA,
            Self::MemoryDebug64 => SAHARA_64BIT_MEMORY_DEBUG,
            Self::MemoryRead64 => SAHARA_64BIT_MEMORY_READ,
            Self::MemoryReadData64 => SAHARA_64BIT_MEMORY_READ_DATA,
        }
    }

    /// Memory-debug family (0x9, 0xA, 0x10..=0x12), which this device does not speak.
    pub fn is_memory_debug(&self) -> bool {
        matches!(
            self,
            Self::MemoryDebug
                | Self::MemoryRead
                | Self::MemoryDebug64
                | Self::MemoryRead64
                | Self::MemoryReadData64
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hello => "HELLO",
            Self::HelloResponse => "HELLO_RSP",
            Self::ReadData => "READ_DATA",
            Self::EndTransfer => "END_TRANSFER",
            Self::DoneRequest => "DONE_REQ",
            Self::DoneResponse => "DONE_RSP",
            Self::ResetRequest => "RESET_REQ",
            Self::ResetResponse => "RESET_RSP",
            Self::MemoryDebug => "MEMORY_DEBUG",
            Self::MemoryRead => "MEMORY_READ",
            Self::CmdReady => "CMD_READY",
            Self::SwitchMode => "SWITCH_MODE",
            Self::ExecuteRequest => "EXECUTE_REQ",
            Self::ExecuteResponse => "EXECUTE_RSP",
            Self::ExecuteData => "EXECUTE_DATA",
            Self::MemoryDebug64 => "64BIT_MEMORY_DEBUG",
            Self::MemoryRead64 => "64BIT_MEMORY_READ",
            Self::MemoryReadData64 => "64BIT_MEMORY_READ_DATA",
        };
        write!(f, "{name}")
    }
}

/// Sahara operating mode, carried in HELLO / HELLO_RSP / SWITCH_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ImageTxPending,
    ImageTxComplete,
    MemoryDebug,
    Command,
}

impl Mode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            SAHARA_MODE_IMAGE_TX_PENDING => Some(Self::ImageTxPending),
            SAHARA_MODE_IMAGE_TX_COMPLETE => Some(Self::ImageTxComplete),
            SAHARA_MODE_MEMORY_DEBUG => Some(Self::MemoryDebug),
            SAHARA_MODE_COMMAND => Some(Self::Command),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::ImageTxPending => SAHARA_MODE_IMAGE_TX_PENDING,
            Self::ImageTxComplete => SAHARA_MODE_IMAGE_TX_COMPLETE,
            Self::MemoryDebug => SAHARA_MODE_MEMORY_DEBUG,
            Self::Command => SAHARA_MODE_COMMAND,
        }
    }
}

/// Command-mode executable selected by EXECUTE_REQ / EXECUTE_DATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecCommand {
    SerialNumRead,
    MsmHwIdRead,
    OemPkHashRead,
    GetSoftwareVersionSbl,
}

impl ExecCommand {
    /// Every executable the device answers, in the order a host usually asks.
    pub const ALL: [ExecCommand; 4] = [
        Self::SerialNumRead,
        Self::MsmHwIdRead,
        Self::OemPkHashRead,
        Self::GetSoftwareVersionSbl,
    ];

    /// Returns `None` for NOP, DLOAD switches, debug data and unknown ids.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            SAHARA_EXEC_CMD_SERIAL_NUM_READ => Some(Self::SerialNumRead),
            SAHARA_EXEC_CMD_MSM_HW_ID_READ => Some(Self::MsmHwIdRead),
            SAHARA_EXEC_CMD_OEM_PK_HASH_READ => Some(Self::OemPkHashRead),
            SAHARA_EXEC_CMD_GET_SOFTWARE_VERSION_SBL => Some(Self::GetSoftwareVersionSbl),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::SerialNumRead => SAHARA_EXEC_CMD_SERIAL_NUM_READ,
            Self::MsmHwIdRead => SAHARA_EXEC_CMD_MSM_HW_ID_READ,
            Self::OemPkHashRead => SAHARA_EXEC_CMD_OEM_PK_HASH_READ,
            Self::GetSoftwareVersionSbl => SAHARA_EXEC_CMD_GET_SOFTWARE_VERSION_SBL,
        }
    }

    /// Size of the EXECUTE_DATA reply announced in EXECUTE_RSP.
    ///
    /// HW ID and OEM hash are sent three times back to back.
    pub fn response_len(&self) -> u32 {
        match self {
            Self::SerialNumRead => 4,
            Self::MsmHwIdRead => 0x18,
            Self::OemPkHashRead => 0x60,
            Self::GetSoftwareVersionSbl => 4,
        }
    }
}

impl fmt::Display for ExecCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialNumRead => write!(f, "SERIAL_NUM_READ"),
            Self::MsmHwIdRead => write!(f, "MSM_HW_ID_READ"),
            Self::OemPkHashRead => write!(f, "OEM_PK_HASH_READ"),
            Self::GetSoftwareVersionSbl => write!(f, "GET_SOFTWARE_VERSION_SBL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_reads_le_word() {
        let packet = [0x0D, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00];
        assert_eq!(Command::peek(&packet), Some(Command::ExecuteRequest));
        assert_eq!(Command::peek(&packet[..3]), None);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(Command::from_u32(0x13), None);
        assert_eq!(Command::from_u32(0), None);
    }

    #[test]
    fn test_memory_debug_family() {
        for code in [0x09, 0x0A, 0x10, 0x11, 0x12] {
            assert!(Command::from_u32(code).unwrap().is_memory_debug());
        }
        assert!(!Command::SwitchMode.is_memory_debug());
    }

    #[test]
    fn test_exec_response_sizes() {
        assert_eq!(ExecCommand::SerialNumRead.response_len(), 4);
        assert_eq!(ExecCommand::MsmHwIdRead.response_len(), 0x18);
        assert_eq!(ExecCommand::OemPkHashRead.response_len(), 0x60);
        assert_eq!(ExecCommand::GetSoftwareVersionSbl.response_len(), 4);
        assert_eq!(ExecCommand::from_u32(SAHARA_EXEC_CMD_NOP), None);
        assert_eq!(ExecCommand::from_u32(SAHARA_EXEC_CMD_READ_DEBUG_DATA), None);
    }
}
