//! Slave-mode control of the external MPlayer process.
//!
//! Architecture:
//! - `process.rs` - player binary detection, FIFO setup, slave-mode spawn
//! - `linebuf.rs` - bounded pending buffer reassembling answer lines
//! - `protocol.rs` - command encoding and typed answer parsers
//! - `ipc.rs` - command/stdout pipe pair with the read/flush primitives
//! - `overlay.rs` - fire-and-forget OSD blit channel
//! - `client.rs` - session lifecycle and the serialized query coordinator
//! - `poller.rs` - periodic position/progress sampling task

mod client;
mod ipc;
mod linebuf;
mod overlay;
mod poller;
mod process;
mod protocol;

pub use client::{PlayerExit, SlaveClient, SlaveError};
pub use ipc::{IpcError, SlaveIpc};
pub use overlay::{OverlayChannel, OverlayError, OverlayFormat, OverlayFrame};
pub use poller::{spawn_status_poller, PlayerStatus};
pub use process::{create_fifos, find_player, spawn_player, PipePaths, ProcessError};
pub use protocol::{
  parse_float_answer, parse_int_answer, parse_string_answer, AudioSettings, SeekMode,
  SlaveCommand, VideoSettings, VolumeMode,
};
