//! Engine-level error type.

use thiserror::Error;

use crate::image::ImageError;
use crate::protocol::PacketError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SaharaError {
    #[error("Malformed packet: {0}")]
    Packet(#[from] PacketError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Reassembly overflow: block is {expected} bytes, host sent {actual}")]
    ReassemblyOverflow { expected: usize, actual: usize },

    #[error("Failed to persist {name}: {source}")]
    Persist {
        name: String,
        #[source]
        source: ImageError,
    },
}
