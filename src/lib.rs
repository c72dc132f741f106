//! Control layer for a touchscreen media shell that delegates playback to
//! an external MPlayer run in slave mode.
//!
//! The player's only interface is three named pipes: commands in, overlay
//! blits in, answer lines out. This crate owns the process lifecycle, the
//! command/answer protocol and the serialization discipline that lets the
//! shell's input handling and its status poller share that single channel
//! without misattributing answers. Skin rendering, input dispatch and the
//! resume file format live in the shell; they talk to this crate through
//! [`SlaveClient`] and [`ResumeStore`].

pub mod config;
pub mod mplayer;
pub mod resume;

pub use config::PlayerConfig;
pub use mplayer::{
  spawn_status_poller, AudioSettings, OverlayChannel, OverlayFormat, OverlayFrame, PipePaths,
  PlayerExit, PlayerStatus, SeekMode, SlaveClient, SlaveCommand, SlaveError, VideoSettings,
  VolumeMode,
};
pub use resume::ResumeStore;
