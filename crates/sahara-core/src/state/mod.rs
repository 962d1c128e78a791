//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{
    HandlerContext, Step, Transition, handle_handshake_packet, handle_in_ready,
    handle_transfer_block,
};
pub use machine::{Phase, Reassembly, Session};
