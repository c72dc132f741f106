//! Pipe-level I/O for the slave session.
//!
//! Owns the command-pipe writer, the stdout-pipe reader and the pending
//! answer buffer. Callers never touch this directly; the client serializes
//! access behind the session mutex so concurrent round trips cannot
//! interleave.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::time::{self, Instant};

use super::linebuf::AnswerBuffer;
use super::process::PipePaths;
use super::protocol::SlaveCommand;

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("pipe I/O failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("no answer within timeout")]
  Timeout,
  #[error("answer line exceeded buffer capacity")]
  LineTooLong,
  #[error("pipe closed")]
  Disconnected,
}

type PipeReader = Box<dyn AsyncRead + Send + Unpin>;
type PipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Command pipe, stdout pipe and pending-line state of one session.
pub struct SlaveIpc {
  reader: PipeReader,
  writer: PipeWriter,
  pending: AnswerBuffer,
}

impl SlaveIpc {
  /// Wrap an arbitrary reader/writer pair. Tests inject mock pipes here.
  pub fn new(
    reader: impl AsyncRead + Send + Unpin + 'static,
    writer: impl AsyncWrite + Send + Unpin + 'static,
  ) -> Self {
    Self {
      reader: Box::new(reader),
      writer: Box::new(writer),
      pending: AnswerBuffer::new(),
    }
  }

  /// Open the session FIFOs.
  ///
  /// Both ends are opened read-write: a FIFO opened that way neither blocks
  /// waiting for a peer nor reports EOF when the peer is briefly absent,
  /// which is what the session needs across player restarts.
  pub fn open(paths: &PipePaths) -> Result<Self, IpcError> {
    let reader = pipe::OpenOptions::new()
      .read_write(true)
      .open_receiver(&paths.stdout)?;
    let writer = pipe::OpenOptions::new()
      .read_write(true)
      .open_sender(&paths.command)?;
    Ok(Self::new(reader, writer))
  }

  /// Write a command, applying the `pausing ` qualifier for pausable
  /// commands while `paused` holds.
  pub async fn send(&mut self, cmd: &SlaveCommand, paused: bool) -> Result<(), IpcError> {
    let wire = cmd.encode(paused);
    log::debug!("slave <- {:?}", wire.trim_end());
    self.writer.write_all(wire.as_bytes()).await?;
    self.writer.flush().await?;
    Ok(())
  }

  /// Write `text` verbatim to the command pipe.
  pub async fn send_raw(&mut self, text: &str) -> Result<(), IpcError> {
    self.writer.write_all(text.as_bytes()).await?;
    self.writer.flush().await?;
    Ok(())
  }

  /// Read one complete answer line, waiting at most `timeout` overall.
  ///
  /// A line already sitting in the pending buffer returns immediately with
  /// no I/O. Otherwise raw reads are appended until a full line appears;
  /// partial reads are kept for the next call, so no answer content is ever
  /// dropped. A full buffer with no newline is a protocol violation: the
  /// buffer is reset and the call fails.
  pub async fn read_line(&mut self, timeout: Duration) -> Result<String, IpcError> {
    let deadline = Instant::now() + timeout;

    loop {
      if let Some(line) = self.pending.take_line() {
        log::debug!("slave -> {:?}", line);
        return Ok(line);
      }
      if self.pending.is_full() {
        log::warn!("answer line overflowed pending buffer, resetting");
        self.pending.clear();
        return Err(IpcError::LineTooLong);
      }

      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return Err(IpcError::Timeout);
      }

      let read = time::timeout(remaining, self.reader.read(self.pending.spare_mut())).await;
      match read {
        Err(_) => return Err(IpcError::Timeout),
        Ok(Err(e)) => return Err(IpcError::Io(e)),
        Ok(Ok(0)) => return Err(IpcError::Disconnected),
        Ok(Ok(n)) => self.pending.commit(n),
      }
    }
  }

  /// Drain and discard everything currently readable, without blocking.
  ///
  /// Used before a fresh query to throw away answers to earlier abandoned
  /// queries that would otherwise desynchronize the stream.
  pub async fn flush_pending(&mut self) -> Result<(), IpcError> {
    self.pending.clear();

    let mut scratch = [0u8; 256];
    loop {
      match time::timeout(Duration::ZERO, self.reader.read(&mut scratch)).await {
        Err(_) => return Ok(()),
        Ok(Ok(0)) => return Ok(()),
        Ok(Ok(n)) => log::debug!("flushed {} stale bytes", n),
        Ok(Err(e)) => return Err(IpcError::Io(e)),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mplayer::linebuf::ANSWER_BUFFER_CAPACITY;
  use tokio::io::duplex;

  const SHORT: Duration = Duration::from_millis(50);

  fn ipc_over_duplex() -> (SlaveIpc, tokio::io::DuplexStream, tokio::io::DuplexStream) {
    let (stdout_theirs, stdout_ours) = duplex(4096);
    let (cmd_ours, cmd_theirs) = duplex(4096);
    (SlaveIpc::new(stdout_ours, cmd_ours), stdout_theirs, cmd_theirs)
  }

  #[tokio::test]
  async fn test_send_applies_pause_qualifier() {
    let (mut ipc, _stdout, mut cmd) = ipc_over_duplex();

    ipc.send(&SlaveCommand::mute(), true).await.unwrap();
    ipc.send(&SlaveCommand::mute(), false).await.unwrap();
    ipc.send_raw("quit\n").await.unwrap();
    drop(ipc);

    let mut written = String::new();
    cmd.read_to_string(&mut written).await.unwrap();
    assert_eq!(written, "pausing mute\nmute\nquit\n");
  }

  #[tokio::test]
  async fn test_read_line_reassembles_split_writes() {
    let (mut ipc, mut stdout, _cmd) = ipc_over_duplex();

    stdout.write_all(b"ANS_volume").await.unwrap();
    // Fragment only: times out, but the bytes stay buffered.
    assert!(matches!(ipc.read_line(SHORT).await, Err(IpcError::Timeout)));

    stdout.write_all(b"=42\n").await.unwrap();
    assert_eq!(ipc.read_line(SHORT).await.unwrap(), "ANS_volume=42");
  }

  #[tokio::test]
  async fn test_read_line_returns_queued_lines_in_order() {
    let (mut ipc, mut stdout, _cmd) = ipc_over_duplex();

    stdout.write_all(b"ANS_volume=1\nANS_volume=2\n").await.unwrap();
    assert_eq!(ipc.read_line(SHORT).await.unwrap(), "ANS_volume=1");
    assert_eq!(ipc.read_line(SHORT).await.unwrap(), "ANS_volume=2");
  }

  #[tokio::test]
  async fn test_read_line_times_out_on_silence() {
    let (mut ipc, _stdout, _cmd) = ipc_over_duplex();
    let started = Instant::now();
    assert!(matches!(ipc.read_line(SHORT).await, Err(IpcError::Timeout)));
    assert!(started.elapsed() >= SHORT);
  }

  #[tokio::test]
  async fn test_read_line_detects_closed_pipe() {
    let (mut ipc, stdout, _cmd) = ipc_over_duplex();
    drop(stdout);
    assert!(matches!(ipc.read_line(SHORT).await, Err(IpcError::Disconnected)));
  }

  #[tokio::test]
  async fn test_overlong_line_is_a_protocol_error() {
    let (mut ipc, mut stdout, _cmd) = ipc_over_duplex();

    stdout.write_all(&vec![b'x'; ANSWER_BUFFER_CAPACITY]).await.unwrap();
    assert!(matches!(ipc.read_line(SHORT).await, Err(IpcError::LineTooLong)));

    // State was reset; the channel is usable again.
    stdout.write_all(b"ANS_volume=9\n").await.unwrap();
    assert_eq!(ipc.read_line(SHORT).await.unwrap(), "ANS_volume=9");
  }

  #[tokio::test]
  async fn test_flush_discards_stale_answers() {
    let (mut ipc, mut stdout, _cmd) = ipc_over_duplex();

    stdout.write_all(b"ANS_old=1\nANS_old=2\nfragm").await.unwrap();
    // Let the stale bytes land in the duplex before draining.
    tokio::task::yield_now().await;
    ipc.flush_pending().await.unwrap();

    stdout.write_all(b"ANS_fresh=3\n").await.unwrap();
    assert_eq!(ipc.read_line(SHORT).await.unwrap(), "ANS_fresh=3");
  }
}
