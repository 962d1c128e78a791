//! Device identity presented to the host in Sahara command mode.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::protocol::ExecCommand;

/// How many times HW ID and OEM hash are repeated in EXECUTE_DATA.
///
/// Real PBL firmware answers with three back-to-back copies; hosts such as
/// QFIL only look at the first one but reject replies of the wrong length.
pub const IDENTITY_REPEAT: usize = 3;

/// Immutable identity of the emulated SoC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// SHA-256 of the OEM public key.
    #[serde(with = "hex")]
    pub oem_pk_hash: [u8; 32],
    /// MSM hardware ID, in wire order.
    #[serde(with = "hex")]
    pub hw_id: [u8; 8],
    pub serial: u32,
    pub sbl_version: u32,
}

impl DeviceIdentity {
    pub fn new(oem_pk_hash: [u8; 32], hw_id: [u8; 8], serial: u32, sbl_version: u32) -> Self {
        Self {
            oem_pk_hash,
            hw_id,
            serial,
            sbl_version,
        }
    }

    /// Name of the extracted loader file: uppercase hex of the HW ID plus `.bin`.
    pub fn loader_file_name(&self) -> String {
        format!("{}.bin", hex::encode_upper(self.hw_id))
    }

    /// EXECUTE_DATA payload for an executable.
    pub fn execute_data(&self, command: ExecCommand) -> Vec<u8> {
        match command {
            ExecCommand::SerialNumRead => le_word(self.serial),
            ExecCommand::MsmHwIdRead => self.hw_id.repeat(IDENTITY_REPEAT),
            ExecCommand::OemPkHashRead => self.oem_pk_hash.repeat(IDENTITY_REPEAT),
            ExecCommand::GetSoftwareVersionSbl => le_word(self.sbl_version),
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new([0; 32], [0; 8], 0, 0)
    }
}

fn le_word(value: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceIdentity {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        DeviceIdentity::new(
            hash,
            [0xB9, 0x3D, 0x70, 0x2A, 0xE1, 0xF0, 0x05, 0x00],
            0x8D3E01ED,
            2,
        )
    }

    #[test]
    fn test_reply_lengths_match_announced_sizes() {
        let id = sample();
        for cmd in ExecCommand::ALL {
            assert_eq!(id.execute_data(cmd).len(), cmd.response_len() as usize);
        }
    }

    #[test]
    fn test_hw_id_and_hash_tripled() {
        let id = sample();
        let hw = id.execute_data(ExecCommand::MsmHwIdRead);
        for chunk in hw.chunks(8) {
            assert_eq!(chunk, id.hw_id);
        }
        let hash = id.execute_data(ExecCommand::OemPkHashRead);
        for chunk in hash.chunks(32) {
            assert_eq!(chunk, id.oem_pk_hash);
        }
    }

    #[test]
    fn test_scalars_little_endian() {
        let id = sample();
        assert_eq!(
            id.execute_data(ExecCommand::SerialNumRead),
            [0xED, 0x01, 0x3E, 0x8D]
        );
        assert_eq!(
            id.execute_data(ExecCommand::GetSoftwareVersionSbl),
            [2, 0, 0, 0]
        );
    }

    #[test]
    fn test_loader_file_name() {
        assert_eq!(sample().loader_file_name(), "B93D702AE1F00500.bin");
    }
}
