//! Protocol constants for Qualcomm Sahara (v2) as spoken by QDLoader 9008.

// ============================================================================
// Device Identification
// ============================================================================

/// Qualcomm Inc. Vendor ID
pub const QUALCOMM_VENDOR_ID: u16 = 0x05C6;

/// QDLoader 9008 (Emergency Download) Product ID
pub const QDLOADER_PRODUCT_ID: u16 = 0x9008;

/// bcdDevice reported in EDL mode
pub const QDLOADER_DEVICE_REV: u16 = 0x0100;

// ============================================================================
// Endpoints
// ============================================================================

/// Bulk OUT endpoint (host -> device)
pub const BULK_OUT_ENDPOINT: u8 = 1;

/// Bulk IN endpoint (device -> host)
pub const BULK_IN_ENDPOINT: u8 = 3;

pub const MAX_PKT_SIZE: usize = 0x200; // 512 bytes

// ============================================================================
// Sahara Commands (first u32 of every packet)
// ============================================================================

pub const SAHARA_HELLO_REQ: u32 = 0x01;
pub const SAHARA_HELLO_RSP: u32 = 0x02;
pub const SAHARA_READ_DATA: u32 = 0x03;
pub const SAHARA_END_TRANSFER: u32 = 0x04;
pub const SAHARA_DONE_REQ: u32 = 0x05;
pub const SAHARA_DONE_RSP: u32 = 0x06;
pub const SAHARA_RESET_REQ: u32 = 0x07;
pub const SAHARA_RESET_RSP: u32 = 0x08;
pub const SAHARA_MEMORY_DEBUG: u32 = 0x09;
pub const SAHARA_MEMORY_READ: u32 = 0x0A;
pub const SAHARA_CMD_READY: u32 = 0x0B;
pub const SAHARA_SWITCH_MODE: u32 = 0x0C;
pub const SAHARA_EXECUTE_REQ: u32 = 0x0D;
pub const SAHARA_EXECUTE_RSP: u32 = 0x0E;
pub const SAHARA_EXECUTE_DATA: u32 = 0x0F;
pub const SAHARA_64BIT_MEMORY_DEBUG: u32 = 0x10;
pub const SAHARA_64BIT_MEMORY_READ: u32 = 0x11;
pub const SAHARA_64BIT_MEMORY_READ_DATA: u32 = 0x12;

// ============================================================================
// Modes
// ============================================================================

pub const SAHARA_MODE_IMAGE_TX_PENDING: u32 = 0x0;
pub const SAHARA_MODE_IMAGE_TX_COMPLETE: u32 = 0x1;
pub const SAHARA_MODE_MEMORY_DEBUG: u32 = 0x2;
pub const SAHARA_MODE_COMMAND: u32 = 0x3;

// ============================================================================
// Command-mode executables (EXECUTE_REQ / EXECUTE_DATA)
// ============================================================================

pub const SAHARA_EXEC_CMD_NOP: u32 = 0x00;
pub const SAHARA_EXEC_CMD_SERIAL_NUM_READ: u32 = 0x01;
pub const SAHARA_EXEC_CMD_MSM_HW_ID_READ: u32 = 0x02;
pub const SAHARA_EXEC_CMD_OEM_PK_HASH_READ: u32 = 0x03;
pub const SAHARA_EXEC_CMD_SWITCH_TO_DMSS_DLOAD: u32 = 0x04;
pub const SAHARA_EXEC_CMD_SWITCH_TO_STREAM_DLOAD: u32 = 0x05;
pub const SAHARA_EXEC_CMD_READ_DEBUG_DATA: u32 = 0x06;
pub const SAHARA_EXEC_CMD_GET_SOFTWARE_VERSION_SBL: u32 = 0x07;

// ============================================================================
// Hello parameters
// ============================================================================

pub const SAHARA_VERSION: u32 = 2;
pub const SAHARA_VERSION_COMPATIBLE: u32 = 1;

/// Maximum command packet length advertised in HELLO.
pub const SAHARA_MAX_CMD_PACKET_LEN: u32 = 0x400;

/// Image ID used in READ_DATA / END_TRANSFER (0xD: programmer / firehose).
pub const SAHARA_IMAGE_ID_PROGRAMMER: u32 = 0x0D;

/// Legacy DLOAD/HDLC download request, sent by old flashing tools as a probe.
pub const LEGACY_DLOAD_REQUEST: u8 = 0x3A;

/// Canned HDLC acknowledgment for the legacy probe.
pub const LEGACY_DLOAD_ACK: [u8; 5] = [0x7E, 0x02, 0x6A, 0xD3, 0x7E];

// ============================================================================
// Image transfer
// ============================================================================

/// First block requested from the host (image header).
pub const IMAGE_HEADER_READ_LEN: usize = 0x50;

/// Chunk size for every subsequent READ_DATA.
pub const IMAGE_CHUNK_LEN: usize = 0x1000;

/// Offset of the image length field in a raw (non-ELF) loader header.
pub const RAW_IMAGE_LENGTH_OFFSET: usize = 0x1C;

/// `\x7FELF` read as a little-endian u32.
pub const ELF_MAGIC: u32 = 0x464C_457F;

/// Offset of `e_phoff` in an ELF64 header.
pub const ELF_PHOFF_OFFSET: usize = 0x20;

/// Size of one ELF64 program header entry.
pub const ELF_PHDR_ENTRY_SIZE: usize = 0x38;

/// Offset of `p_offset` inside a program header entry.
pub const ELF_PHDR_OFFSET_FIELD: usize = 0x08;

/// Offset of `p_filesz` inside a program header entry.
pub const ELF_PHDR_FILESZ_FIELD: usize = 0x20;
