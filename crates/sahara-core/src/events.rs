//! Event system for UI decoupling.
//!
//! Frontends subscribe to engine events without reaching into the session.

use std::fmt;
use std::path::PathBuf;

use crate::image::ImageFormat;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Sahara session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaharaPhase {
    /// Hello exchange and command mode.
    Handshake,
    /// Waiting for the first 0x50 bytes of the image.
    TransferInit,
    /// Waiting for the block holding the ELF program headers.
    FormatScan,
    /// Pulling the rest of the image chunk by chunk.
    Streaming,
}

impl fmt::Display for SaharaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaharaPhase::Handshake => write!(f, "Handshake"),
            SaharaPhase::TransferInit => write!(f, "Transfer Init"),
            SaharaPhase::FormatScan => write!(f, "Format Scan"),
            SaharaPhase::Streaming => write!(f, "Streaming"),
        }
    }
}

/// Events emitted by the Sahara engine.
#[derive(Debug, Clone)]
pub enum SaharaEvent {
    /// Device-initiated HELLO went out.
    HelloSent { count: u32 },
    /// Phase changed.
    PhaseChanged { from: SaharaPhase, to: SaharaPhase },
    /// Image format recognised from the first block.
    ImageDetected { format: ImageFormat },
    /// Total image length is known.
    ImageLength { total: u64 },
    /// Progress update for the download.
    Progress { current: u64, total: u64 },
    /// Extracted image written out.
    ImageSaved { path: PathBuf, length: u64 },
    /// EXECUTE_REQ/EXECUTE_DATA for an executable we do not implement.
    UnsupportedCommand { command: u32 },
    /// Host broke the protocol; session was reset.
    ProtocolViolation { message: String },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Bulk packet sent/received.
    Packet {
        direction: PacketDirection,
        packet_type: String,
        length: usize,
    },
    /// Error surfaced to the operator.
    Error { message: String },
}

/// Bulk packet direction, from the device's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Device -> Host
    Rx, // Host -> Device
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving Sahara events.
pub trait SaharaObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SaharaEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SaharaObserver for NullObserver {
    fn on_event(&self, _event: &SaharaEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SaharaObserver for TracingObserver {
    fn on_event(&self, event: &SaharaEvent) {
        match event {
            SaharaEvent::HelloSent { count } => {
                tracing::debug!(count, "HELLO sent");
            }
            SaharaEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            SaharaEvent::ImageDetected { format } => {
                tracing::info!(format = %format, "Loader format detected");
            }
            SaharaEvent::ImageLength { total } => {
                tracing::info!(total = %format!("0x{:X}", total), "Loader length");
            }
            SaharaEvent::Progress { current, total } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(progress = %format!("{}%", pct), "Progress");
            }
            SaharaEvent::ImageSaved { path, length } => {
                tracing::info!(path = %path.display(), length, "Loader stored");
            }
            SaharaEvent::UnsupportedCommand { command } => {
                tracing::warn!(command = %format!("0x{:X}", command), "Unsupported executable");
            }
            SaharaEvent::ProtocolViolation { message } => {
                tracing::error!("Protocol violation: {}", message);
            }
            SaharaEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            SaharaEvent::Packet {
                direction,
                packet_type,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    type_ = %packet_type,
                    len = length,
                    "Bulk packet"
                );
            }
            SaharaEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
        }
    }
}
