//! High-level slave-session client.
//!
//! Owns the session state and the one lock every query round trip runs
//! under. The player answers strictly in the order commands arrive on the
//! single channel, so the whole send-then-read-answer exchange must be one
//! atomic unit per caller; anything finer-grained would let concurrent
//! callers misattribute answers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use super::ipc::{IpcError, SlaveIpc};
use super::overlay::{OverlayChannel, OverlayError, OverlayFrame};
use super::process::{self, PipePaths, ProcessError};
use super::protocol::{
  parse_float_answer, parse_int_answer, parse_string_answer, AudioSettings, SeekMode,
  SlaveCommand, VideoSettings, VolumeMode,
};
use crate::config::PlayerConfig;
use crate::resume::ResumeStore;

/// Per-attempt wait for one answer line.
const ANSWER_TIMEOUT: Duration = Duration::from_millis(100);
/// Retry budget for numeric answers.
const NUMERIC_ATTEMPTS: u32 = 5;
/// Retry budget for string answers, which often see unrelated lines first.
const STRING_ATTEMPTS: u32 = 30;

#[derive(Error, Debug)]
pub enum SlaveError {
  #[error("process error: {0}")]
  Process(#[from] ProcessError),
  #[error("ipc error: {0}")]
  Ipc(#[from] IpcError),
  #[error("overlay error: {0}")]
  Overlay(#[from] OverlayError),
  #[error("session not initialized")]
  NotConnected,
  #[error("player exited")]
  Exited,
  #[error("no matching answer within retry budget")]
  NoAnswer,
}

/// Player-exit notification from the watcher task.
#[derive(Debug, Clone)]
pub struct PlayerExit {
  /// Exit code, when the player terminated normally.
  pub code: Option<i32>,
}

/// What is currently loaded.
#[derive(Debug, Clone)]
struct Playback {
  target: String,
  resumable: bool,
}

/// Client for one slave-player session.
///
/// Cheap to clone; all clones share the same session. The shell's input
/// handling, its status poller and the lifecycle owner each hold one.
#[derive(Clone)]
pub struct SlaveClient {
  config: Arc<Mutex<PlayerConfig>>,
  /// Command pipe + stdout pipe + pending buffer: the shared triple of the
  /// session, guarded by the single round-trip lock.
  conn: Arc<AsyncMutex<Option<SlaveIpc>>>,
  overlay: Arc<AsyncMutex<Option<OverlayChannel>>>,
  running: Arc<AtomicBool>,
  paused: Arc<AtomicBool>,
  playback: Arc<Mutex<Option<Playback>>>,
  player_pid: Arc<Mutex<Option<u32>>>,
  resume_store: Arc<Mutex<Option<Arc<dyn ResumeStore>>>>,
  exit_tx: async_channel::Sender<PlayerExit>,
  exit_rx: Receiver<PlayerExit>,
}

impl SlaveClient {
  pub fn new(config: PlayerConfig) -> Self {
    let (exit_tx, exit_rx) = async_channel::unbounded();
    Self {
      config: Arc::new(Mutex::new(config)),
      conn: Arc::new(AsyncMutex::new(None)),
      overlay: Arc::new(AsyncMutex::new(None)),
      running: Arc::new(AtomicBool::new(false)),
      paused: Arc::new(AtomicBool::new(false)),
      playback: Arc::new(Mutex::new(None)),
      player_pid: Arc::new(Mutex::new(None)),
      resume_store: Arc::new(Mutex::new(None)),
      exit_tx,
      exit_rx,
    }
  }

  /// Replace the configuration (takes effect on the next `init`/`start`).
  pub fn set_config(&self, config: PlayerConfig) {
    *self.config.lock() = config;
  }

  /// Install the resume collaborator used by [`SlaveClient::quit`].
  pub fn set_resume_store(&self, store: Arc<dyn ResumeStore>) {
    *self.resume_store.lock() = Some(store);
  }

  fn pipe_paths(&self) -> PipePaths {
    PipePaths::in_dir(&self.config.lock().pipe_dir)
  }

  /// Recreate the session pipes and reset the session flags.
  ///
  /// Any previous pipes are discarded; stale peers must reopen. `running`
  /// is set before the player is launched: "not yet started" must never
  /// read as "already dead", and only the exit watcher may clear it.
  pub async fn init(&self) -> Result<(), SlaveError> {
    let paths = self.pipe_paths();
    process::create_fifos(&paths)?;
    *self.conn.lock().await = Some(SlaveIpc::open(&paths)?);
    *self.overlay.lock().await = Some(OverlayChannel::open(&paths)?);
    self.paused.store(false, Ordering::Relaxed);
    self.running.store(true, Ordering::Relaxed);
    log::info!("session initialized under {:?}", paths.command.parent());
    Ok(())
  }

  /// Initialize the session and launch the player for `target`.
  ///
  /// Returns as soon as the player is spawned. Its lifetime is owned by a
  /// watcher task that waits for the exit, clears `running` and emits a
  /// [`PlayerExit`] on the exit channel.
  pub async fn start(&self, target: &str, resumable: bool) -> Result<(), SlaveError> {
    self.init().await?;

    let (player_path, extra_args, paths) = {
      let cfg = self.config.lock();
      (
        cfg.player_path.as_ref().map(PathBuf::from),
        cfg.player_args.clone(),
        PipePaths::in_dir(&cfg.pipe_dir),
      )
    };
    let mut child = process::spawn_player(player_path.as_ref(), &extra_args, &paths, target)?;
    *self.player_pid.lock() = child.id();
    *self.playback.lock() = Some(Playback {
      target: target.to_string(),
      resumable,
    });

    let running = self.running.clone();
    let pid_slot = self.player_pid.clone();
    let exit_tx = self.exit_tx.clone();
    tokio::spawn(async move {
      let status = child.wait().await;
      running.store(false, Ordering::Relaxed);
      *pid_slot.lock() = None;
      match &status {
        Ok(s) => log::info!("player exited: {}", s),
        Err(e) => log::error!("waiting on player failed: {}", e),
      }
      let code = status.ok().and_then(|s| s.code());
      let _ = exit_tx.send(PlayerExit { code }).await;
    });

    Ok(())
  }

  /// Advisory: false only once the player process has been seen to exit.
  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Relaxed)
  }

  /// Advisory mirror of the player's pause state.
  pub fn is_paused(&self) -> bool {
    self.paused.load(Ordering::Relaxed)
  }

  /// Exit notifications; one message per player lifetime.
  pub fn exit_events(&self) -> Receiver<PlayerExit> {
    self.exit_rx.clone()
  }

  /// One full round trip under the session lock: send the command, then
  /// retry reading and parsing until the parser accepts a line or the
  /// budget is spent. A timeout or a wrong-prefix line means "no answer
  /// yet" and retries; buffer overflow, EOF and I/O failures do not.
  async fn query<T>(
    &self,
    cmd: SlaveCommand,
    parse: impl Fn(&str) -> Option<T>,
    max_attempts: u32,
  ) -> Result<T, SlaveError> {
    let mut guard = self.conn.lock().await;
    let ipc = guard.as_mut().ok_or(SlaveError::NotConnected)?;

    ipc.send(&cmd, self.is_paused()).await?;

    let mut last = SlaveError::NoAnswer;
    for _ in 0..max_attempts {
      // A player that died mid-retry must not be waited on further.
      if !self.is_running() {
        return Err(SlaveError::Exited);
      }
      match ipc.read_line(ANSWER_TIMEOUT).await {
        Ok(line) => match parse(&line) {
          Some(value) => return Ok(value),
          None => {
            log::debug!("answer {:?} does not match {:?}", line, cmd.text());
            last = SlaveError::NoAnswer;
          }
        },
        Err(IpcError::Timeout) => last = SlaveError::NoAnswer,
        Err(e) => return Err(SlaveError::Ipc(e)),
      }
    }
    Err(last)
  }

  /// Fire-and-forget command under the session lock.
  async fn send_command(&self, cmd: SlaveCommand) -> Result<(), SlaveError> {
    let mut guard = self.conn.lock().await;
    let ipc = guard.as_mut().ok_or(SlaveError::NotConnected)?;
    ipc.send(&cmd, self.is_paused()).await?;
    Ok(())
  }

  /// Discard buffered and currently-readable stdout bytes.
  ///
  /// Call before a fresh query when an earlier query may have been
  /// abandoned mid-stream; its late answer would otherwise desynchronize
  /// the channel.
  pub async fn flush(&self) -> Result<(), SlaveError> {
    let mut guard = self.conn.lock().await;
    let ipc = guard.as_mut().ok_or(SlaveError::NotConnected)?;
    ipc.flush_pending().await?;
    Ok(())
  }

  /// Toggle pause. The raw command is never `pausing`-prefixed; the local
  /// flag mirrors the player's state but the two are not updated
  /// atomically.
  pub async fn pause(&self) -> Result<(), SlaveError> {
    {
      let mut guard = self.conn.lock().await;
      let ipc = guard.as_mut().ok_or(SlaveError::NotConnected)?;
      ipc.send(&SlaveCommand::pause(), false).await?;
    }
    let was = self.paused.fetch_xor(true, Ordering::Relaxed);
    log::info!("pause toggled: {} -> {}", was, !was);
    Ok(())
  }

  pub async fn seek(&self, amount: f64, mode: SeekMode) -> Result<(), SlaveError> {
    self.send_command(SlaveCommand::seek(amount, mode)).await
  }

  pub async fn set_volume(&self, value: f64, mode: VolumeMode) -> Result<(), SlaveError> {
    self.send_command(SlaveCommand::volume(value, mode)).await
  }

  pub async fn mute(&self) -> Result<(), SlaveError> {
    self.send_command(SlaveCommand::mute()).await
  }

  pub async fn osd(&self, level: i32) -> Result<(), SlaveError> {
    self.send_command(SlaveCommand::osd(level)).await
  }

  /// Current position in seconds.
  pub async fn get_time_pos(&self) -> Result<f64, SlaveError> {
    self
      .query(SlaveCommand::get_time_pos(), parse_float_answer, NUMERIC_ATTEMPTS)
      .await
  }

  /// Current position in percent.
  pub async fn get_percent_pos(&self) -> Result<i64, SlaveError> {
    self
      .query(SlaveCommand::get_percent_pos(), parse_int_answer, NUMERIC_ATTEMPTS)
      .await
  }

  /// Name of the playing file.
  pub async fn get_file_name(&self) -> Result<String, SlaveError> {
    self
      .query(
        SlaveCommand::get_file_name(),
        |line| parse_string_answer(line, "ANS_FILENAME='", true),
        STRING_ATTEMPTS,
      )
      .await
  }

  /// Artist metadata of the playing file.
  pub async fn get_meta_artist(&self) -> Result<String, SlaveError> {
    self
      .query(
        SlaveCommand::get_meta_artist(),
        |line| parse_string_answer(line, "ANS_META_ARTIST='", true),
        STRING_ATTEMPTS,
      )
      .await
  }

  /// Title metadata of the playing file.
  pub async fn get_meta_title(&self) -> Result<String, SlaveError> {
    self
      .query(
        SlaveCommand::get_meta_title(),
        |line| parse_string_answer(line, "ANS_META_TITLE='", true),
        STRING_ATTEMPTS,
      )
      .await
  }

  /// Read the video settings as four independent queries.
  ///
  /// Every field is attempted even after a failure; a partial read reports
  /// as a failed batch carrying the first error. There is no atomicity
  /// across the four properties.
  pub async fn video_settings(&self) -> Result<VideoSettings, SlaveError> {
    let brightness = self
      .query(SlaveCommand::get_property("brightness"), parse_int_answer, NUMERIC_ATTEMPTS)
      .await;
    let contrast = self
      .query(SlaveCommand::get_property("contrast"), parse_int_answer, NUMERIC_ATTEMPTS)
      .await;
    let audio_delay = self
      .query(SlaveCommand::get_property("audio_delay"), parse_float_answer, NUMERIC_ATTEMPTS)
      .await;
    let volume = self
      .query(SlaveCommand::get_property("volume"), parse_float_answer, NUMERIC_ATTEMPTS)
      .await;

    match (brightness, contrast, audio_delay, volume) {
      (Ok(brightness), Ok(contrast), Ok(audio_delay), Ok(volume)) => Ok(VideoSettings {
        brightness: brightness as i32,
        contrast: contrast as i32,
        audio_delay,
        volume,
      }),
      (b, c, a, v) => Err(
        b.err()
          .or(c.err())
          .or_else(|| a.err())
          .or_else(|| v.err())
          .unwrap_or(SlaveError::NoAnswer),
      ),
    }
  }

  /// Apply video settings as four independent sends. No readback and no
  /// rollback: a failure mid-batch leaves the earlier fields applied.
  pub async fn set_video_settings(&self, settings: &VideoSettings) -> Result<(), SlaveError> {
    let mut first_err = None;
    for cmd in [
      SlaveCommand::set_property("brightness", settings.brightness),
      SlaveCommand::set_property("contrast", settings.contrast),
      SlaveCommand::set_property("audio_delay", settings.audio_delay),
      SlaveCommand::volume(settings.volume, VolumeMode::Absolute),
    ] {
      if let Err(e) = self.send_command(cmd).await {
        log::warn!("settings batch: {}", e);
        if first_err.is_none() {
          first_err = Some(e);
        }
      }
    }
    match first_err {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// Read the audio settings.
  pub async fn audio_settings(&self) -> Result<AudioSettings, SlaveError> {
    let volume = self
      .query(SlaveCommand::get_property("volume"), parse_float_answer, NUMERIC_ATTEMPTS)
      .await?;
    Ok(AudioSettings { volume })
  }

  /// Apply the audio settings.
  pub async fn set_audio_settings(&self, settings: &AudioSettings) -> Result<(), SlaveError> {
    self
      .send_command(SlaveCommand::volume(settings.volume, VolumeMode::Absolute))
      .await
  }

  /// Push one overlay blit.
  pub async fn blit(&self, frame: &OverlayFrame<'_>) -> Result<(), SlaveError> {
    let mut guard = self.overlay.lock().await;
    let chan = guard.as_mut().ok_or(SlaveError::NotConnected)?;
    chan.blit(frame).await?;
    Ok(())
  }

  /// Make the overlay visible.
  pub async fn show_overlay(&self) -> Result<(), SlaveError> {
    let mut guard = self.overlay.lock().await;
    let chan = guard.as_mut().ok_or(SlaveError::NotConnected)?;
    chan.show().await?;
    Ok(())
  }

  /// Hide the overlay.
  pub async fn hide_overlay(&self) -> Result<(), SlaveError> {
    let mut guard = self.overlay.lock().await;
    let chan = guard.as_mut().ok_or(SlaveError::NotConnected)?;
    chan.hide().await?;
    Ok(())
  }

  /// Ask the player to terminate.
  ///
  /// For a resumable playback the current position is read first and handed
  /// to the resume collaborator so the shell can continue later. Clears the
  /// pause flag.
  pub async fn quit(&self) -> Result<(), SlaveError> {
    let playback = self.playback.lock().clone();
    if let Some(pb) = playback.filter(|p| p.resumable) {
      if self.is_running() {
        let store = self.resume_store.lock().clone();
        if let Some(store) = store {
          match self.get_time_pos().await {
            Ok(pos) => store.save_position(&pb.target, pos),
            Err(e) => log::warn!("could not read position for resume: {}", e),
          }
        }
      }
    }

    {
      let mut guard = self.conn.lock().await;
      if let Some(ipc) = guard.as_mut() {
        if let Err(e) = ipc.send(&SlaveCommand::quit(), false).await {
          log::warn!("quit command failed: {}", e);
        }
      }
    }
    self.paused.store(false, Ordering::Relaxed);
    Ok(())
  }

  /// [`SlaveClient::quit`], then wait up to `grace` for the player to go
  /// away, kill it if it has not, and remove the session pipes.
  pub async fn shutdown(&self, grace: Duration) -> Result<(), SlaveError> {
    self.quit().await?;

    let deadline = tokio::time::Instant::now() + grace;
    while self.is_running() && tokio::time::Instant::now() < deadline {
      tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if self.is_running() {
      if let Some(pid) = *self.player_pid.lock() {
        log::warn!("player ignored quit, killing pid {}", pid);
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
      }
    }

    *self.conn.lock().await = None;
    *self.overlay.lock().await = None;
    process::cleanup_fifos(&self.pipe_paths());
    log::info!("session shut down");
    Ok(())
  }
}

#[cfg(test)]
impl SlaveClient {
  /// Session backed by an injected pipe pair, already marked running.
  pub(crate) async fn connected_to(ipc: SlaveIpc) -> Self {
    let client = Self::new(PlayerConfig::default());
    client.running.store(true, Ordering::Relaxed);
    *client.conn.lock().await = Some(ipc);
    client
  }

  /// Simulate the exit watcher observing the player's death.
  pub(crate) fn mark_exited(&self) {
    self.running.store(false, Ordering::Relaxed);
  }
}
