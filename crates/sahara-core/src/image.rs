//! Loader image format detection, length calculation and persistence.
//!
//! Two loader layouts are seen in the wild:
//! - Legacy MBN/raw: the total image length sits at +0x1C of the header.
//! - ELF64 (Firehose programmers): the length is the furthest byte covered
//!   by any program header segment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::protocol::constants::*;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Header too short: expected {expected}, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },
    #[error("Program headers at 0x{offset:X} lie outside the {available} buffered bytes")]
    PhdrOutOfRange { offset: usize, available: usize },
    #[error("No program header describes any file data")]
    EmptyProgramHeaders,
    #[error("Image length 0x{0:X} exceeds the 32-bit READ_DATA range")]
    TooLarge(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loader container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Raw,
    Elf,
}

impl ImageFormat {
    /// Inspect the first four bytes for the ELF magic.
    pub fn detect(header: &[u8]) -> Self {
        match header.get(..4) {
            Some(magic) if LittleEndian::read_u32(magic) == ELF_MAGIC => Self::Elf,
            _ => Self::Raw,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Raw => write!(f, "QC raw loader"),
            ImageFormat::Elf => write!(f, "ELF loader"),
        }
    }
}

fn read_u32_at(header: &[u8], offset: usize) -> Result<u32, ImageError> {
    header
        .get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or(ImageError::HeaderTooShort {
            expected: offset + 4,
            actual: header.len(),
        })
}

/// Declared total length of a raw loader.
pub fn raw_image_length(header: &[u8]) -> Result<u64, ImageError> {
    read_u32_at(header, RAW_IMAGE_LENGTH_OFFSET).map(u64::from)
}

/// Program header table offset (low 32 bits of `e_phoff`).
pub fn elf_phdr_offset(header: &[u8]) -> Result<usize, ImageError> {
    read_u32_at(header, ELF_PHOFF_OFFSET).map(|v| v as usize)
}

/// Walk the program header table in `image` and return the furthest
/// `p_offset + p_filesz`.
///
/// The walk stops at the first entry with both fields zero, or when the
/// buffered bytes run out.
pub fn elf_image_length(image: &[u8], phdr_offset: usize) -> Result<u64, ImageError> {
    let table = image
        .get(phdr_offset..)
        .filter(|t| t.len() >= ELF_PHDR_ENTRY_SIZE)
        .ok_or(ImageError::PhdrOutOfRange {
            offset: phdr_offset,
            available: image.len(),
        })?;

    let mut total = 0u64;
    let mut terminated = false;
    for entry in table.chunks_exact(ELF_PHDR_ENTRY_SIZE) {
        let offset = LittleEndian::read_u64(&entry[ELF_PHDR_OFFSET_FIELD..]);
        let size = LittleEndian::read_u64(&entry[ELF_PHDR_FILESZ_FIELD..]);
        if offset == 0 && size == 0 {
            terminated = true;
            break;
        }
        total = total.max(offset.saturating_add(size));
    }
    if !terminated {
        tracing::warn!(
            phdr_offset = %format!("0x{:X}", phdr_offset),
            "Program header table ran past the buffered block"
        );
    }

    if total == 0 {
        return Err(ImageError::EmptyProgramHeaders);
    }
    if total > u64::from(u32::MAX) {
        return Err(ImageError::TooLarge(total));
    }
    Ok(total)
}

/// Destination for extracted images.
pub trait ImageSink {
    /// Store `data` under `name`, returning where it went.
    fn persist(&mut self, name: &str, data: &[u8]) -> Result<PathBuf, ImageError>;
}

/// Writes images as files in a directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for FileSink {
    fn persist(&mut self, name: &str, data: &[u8]) -> Result<PathBuf, ImageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, data)?;
        Ok(path)
    }
}

/// Keeps images in memory; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    images: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored images, oldest first.
    pub fn images(&self) -> Vec<(String, Vec<u8>)> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ImageSink for MemorySink {
    fn persist(&mut self, name: &str, data: &[u8]) -> Result<PathBuf, ImageError> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), data.to_vec()));
        Ok(PathBuf::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phdr(offset: u64, size: u64) -> [u8; ELF_PHDR_ENTRY_SIZE] {
        let mut e = [0u8; ELF_PHDR_ENTRY_SIZE];
        LittleEndian::write_u64(&mut e[ELF_PHDR_OFFSET_FIELD..], offset);
        LittleEndian::write_u64(&mut e[ELF_PHDR_FILESZ_FIELD..], size);
        e
    }

    fn table_at(phoff: usize, entries: &[[u8; ELF_PHDR_ENTRY_SIZE]], len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        for (i, e) in entries.iter().enumerate() {
            let at = phoff + i * ELF_PHDR_ENTRY_SIZE;
            buf[at..at + ELF_PHDR_ENTRY_SIZE].copy_from_slice(e);
        }
        buf
    }

    #[test]
    fn test_detect() {
        assert_eq!(ImageFormat::detect(b"\x7FELF\x02\x01"), ImageFormat::Elf);
        assert_eq!(ImageFormat::detect(&[0u8; 0x50]), ImageFormat::Raw);
        assert_eq!(ImageFormat::detect(b"\x7FEL"), ImageFormat::Raw);
    }

    #[test]
    fn test_raw_length_field() {
        let mut header = vec![0u8; 0x50];
        header[0x1C..0x20].copy_from_slice(&0x2345u32.to_le_bytes());
        assert_eq!(raw_image_length(&header).unwrap(), 0x2345);
        assert!(matches!(
            raw_image_length(&header[..0x10]),
            Err(ImageError::HeaderTooShort { expected: 0x20, .. })
        ));
    }

    #[test]
    fn test_phdr_offset_field() {
        let mut header = vec![0u8; 0x50];
        header[0x20..0x24].copy_from_slice(&0x40u32.to_le_bytes());
        assert_eq!(elf_phdr_offset(&header).unwrap(), 0x40);
    }

    #[test]
    fn test_single_segment_with_sentinel() {
        let buf = table_at(0x40, &[phdr(0x1000, 0x2000), phdr(0, 0)], 0x1050);
        assert_eq!(elf_image_length(&buf, 0x40).unwrap(), 0x3000);
    }

    #[test]
    fn test_takes_maximum_extent() {
        let buf = table_at(
            0x40,
            &[phdr(0x3000, 0x800), phdr(0x1000, 0x100), phdr(0, 0)],
            0x1050,
        );
        assert_eq!(elf_image_length(&buf, 0x40).unwrap(), 0x3800);
    }

    #[test]
    fn test_offset_only_entry_is_not_sentinel() {
        let buf = table_at(0x40, &[phdr(0, 0x1000), phdr(0, 0)], 0x1050);
        assert_eq!(elf_image_length(&buf, 0x40).unwrap(), 0x1000);
    }

    #[test]
    fn test_table_outside_buffer() {
        let buf = vec![0u8; 0x1050];
        assert!(matches!(
            elf_image_length(&buf, 0x2000),
            Err(ImageError::PhdrOutOfRange { .. })
        ));
    }

    #[test]
    fn test_all_sentinel_rejected() {
        let buf = vec![0u8; 0x1050];
        assert!(matches!(
            elf_image_length(&buf, 0x40),
            Err(ImageError::EmptyProgramHeaders)
        ));
    }

    #[test]
    fn test_file_sink_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("out"));
        let path = sink.persist("AABB.bin", &[1, 2, 3]).unwrap();
        assert_eq!(path, dir.path().join("out").join("AABB.bin"));
        assert_eq!(std::fs::read(path).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_memory_sink_shared() {
        let sink = MemorySink::new();
        let mut other = sink.clone();
        other.persist("x.bin", &[9]).unwrap();
        assert_eq!(sink.images(), vec![("x.bin".to_string(), vec![9])]);
    }
}
