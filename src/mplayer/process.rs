//! Player binary detection, FIFO setup and slave-mode process spawning.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("player executable not found")]
  NotFound,
  #[error("failed to create named pipe {path}: {source}")]
  PipeCreation {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("failed to spawn player: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// The three well-known FIFO paths of a session.
///
/// Recreated on every `init()`; any previous pipes are discarded and stale
/// readers or writers must reopen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipePaths {
  /// Text commands into the player.
  pub command: PathBuf,
  /// Binary overlay blits and SHOW/HIDE directives.
  pub overlay: PathBuf,
  /// The player's stdout, carrying answer lines.
  pub stdout: PathBuf,
}

impl PipePaths {
  /// Well-known pipe names under `dir`.
  pub fn in_dir(dir: impl AsRef<Path>) -> Self {
    let dir = dir.as_ref();
    Self {
      command: dir.join("mpctl-cmd.fifo"),
      overlay: dir.join("mpctl-osd.fifo"),
      stdout: dir.join("mpctl-out.fifo"),
    }
  }
}

fn mkfifo(path: &Path) -> Result<(), ProcessError> {
  let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| ProcessError::PipeCreation {
    path: path.to_path_buf(),
    source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
  })?;
  let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
  if rc != 0 {
    return Err(ProcessError::PipeCreation {
      path: path.to_path_buf(),
      source: std::io::Error::last_os_error(),
    });
  }
  Ok(())
}

/// Delete and recreate the three session FIFOs.
pub fn create_fifos(paths: &PipePaths) -> Result<(), ProcessError> {
  for path in [&paths.command, &paths.overlay, &paths.stdout] {
    let _ = std::fs::remove_file(path);
    mkfifo(path)?;
  }
  log::info!("created session pipes under {:?}", paths.command.parent());
  Ok(())
}

/// Best-effort removal of the session FIFOs.
pub fn cleanup_fifos(paths: &PipePaths) {
  for path in [&paths.command, &paths.overlay, &paths.stdout] {
    let _ = std::fs::remove_file(path);
  }
}

/// Find the mplayer executable in PATH or common locations.
pub fn find_player() -> Option<PathBuf> {
  if let Ok(path) = which::which("mplayer") {
    return Some(path);
  }

  let common_paths = ["/usr/bin/mplayer", "/usr/local/bin/mplayer"];
  for path in common_paths {
    let p = PathBuf::from(path);
    if p.exists() {
      return Some(p);
    }
  }

  None
}

/// Spawn the player in slave mode against the session pipes.
///
/// The command pipe feeds `-input file=`, the overlay pipe feeds the bmovl
/// video filter, and stdout is redirected into the stdout FIFO so answer
/// lines arrive there. The child owns no terminal.
pub fn spawn_player(
  player_path: Option<&PathBuf>,
  extra_args: &[String],
  pipes: &PipePaths,
  target: &str,
) -> Result<Child, ProcessError> {
  let player_exe = player_path
    .cloned()
    .or_else(find_player)
    .ok_or(ProcessError::NotFound)?;

  log::info!("spawning player {:?} for {:?}", player_exe, target);
  if !extra_args.is_empty() {
    log::info!("extra player args: {:?}", extra_args);
  }

  // Opening the FIFO read-write never blocks waiting for a peer.
  let stdout_fifo = std::fs::OpenOptions::new()
    .read(true)
    .write(true)
    .open(&pipes.stdout)?;

  let mut cmd = Command::new(&player_exe);
  cmd
    .arg("-slave")
    .arg("-quiet")
    .arg("-input")
    .arg(format!("file={}", pipes.command.display()))
    .arg("-vf")
    .arg(format!("bmovl=0:0:{}", pipes.overlay.display()));

  for arg in extra_args {
    cmd.arg(arg);
  }
  cmd.arg(target);

  let child = cmd
    .stdin(Stdio::null())
    .stdout(Stdio::from(stdout_fifo))
    .stderr(Stdio::null())
    .spawn()?;

  Ok(child)
}
