//! Sahara-Core: Qualcomm EDL (QDLoader 9008) device emulation in Rust.
//!
//! This crate plays the *device* side of the Sahara download protocol so a
//! flashing tool can be pointed at software instead of a phone. It answers
//! identity queries in command mode and pulls a loader image from the host
//! chunk by chunk, then stores it under the device's HW ID.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Sahara opcodes, constants and fixed-layout packets
//! - **USB**: control requests, vendor handler tables and descriptor encoders
//! - **Transport**: device-side bulk abstraction (callbacks in, sends out) and a mock
//! - **State**: session phases, reassembly and per-opcode handlers
//! - **Image**: raw/ELF loader detection, length scan and persistence sinks
//! - **Events**: observer pattern for UI decoupling
//! - **Engine**: ties the above together behind [`BulkFunction`]
//! - **Host**: a scripted flashing host for in-process runs
//!
//! # Example
//!
//! ```no_run
//! use sahara_core::{
//!     DEFAULT_ROUND_LIMIT, EmulatorConfig, FileSink, LoopbackHost, MockTransport, SaharaDevice,
//!     SaharaEngine, run_loopback,
//! };
//!
//! let config = EmulatorConfig::load_from_file("emulator.toml").expect("config");
//! let transport = MockTransport::new();
//! let engine = SaharaEngine::new(
//!     transport.clone(),
//!     FileSink::new(&config.output_dir),
//!     config.identity.clone(),
//! );
//! let mut device = SaharaDevice::new(engine);
//!
//! let loader = std::fs::read("prog_firehose.elf").expect("loader");
//! let mut host = LoopbackHost::upload(loader);
//! run_loopback(&mut device, &transport, &mut host, DEFAULT_ROUND_LIMIT).expect("Sahara failed");
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod identity;
pub mod image;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod usb;

// Re-exports for convenience
pub use config::EmulatorConfig;
pub use device::{DeviceProfile, SaharaDevice, SaharaVendor};
pub use engine::SaharaEngine;
pub use error::SaharaError;
pub use events::{LogLevel, NullObserver, SaharaEvent, SaharaObserver, SaharaPhase, TracingObserver};
pub use host::{DEFAULT_ROUND_LIMIT, HostMode, LoopbackError, LoopbackHost, run_loopback};
pub use identity::DeviceIdentity;
pub use image::{FileSink, ImageError, ImageFormat, ImageSink, MemorySink};
pub use protocol::{Command, ExecCommand, Mode};
pub use transport::{BulkFunction, DeviceTransport, MockTransport, TransportError};
pub use usb::{ControlDispatcher, ControlRequest, ControlResponse, FtdiVendor};
