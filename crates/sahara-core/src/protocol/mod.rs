//! Protocol module - Sahara wire definitions.

pub mod command;
pub mod constants;
pub mod packet;

pub use command::{Command, ExecCommand, Mode};
pub use constants::*;
pub use packet::{
    EndTransfer, Execute, ExecuteResponse, Hello, HelloResponse, PacketError, ReadData, SwitchMode,
};
