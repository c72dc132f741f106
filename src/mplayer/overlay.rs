//! Fire-and-forget overlay channel.
//!
//! Sibling of the command channel on its own pipe: raw bitmap blits for the
//! skin UI plus the textual `SHOW`/`HIDE` directives. No replies ever come
//! back, so this channel never participates in the query round trip.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;

use super::process::PipePaths;

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("pipe I/O failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("payload is {actual} bytes, header describes {expected}")]
  PayloadSize { expected: usize, actual: usize },
}

/// Pixel format of an overlay blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayFormat {
  Rgba32,
  Rgb24,
  Rgb565,
}

impl OverlayFormat {
  pub fn bytes_per_pixel(self) -> usize {
    match self {
      OverlayFormat::Rgba32 => 4,
      OverlayFormat::Rgb24 => 3,
      OverlayFormat::Rgb565 => 2,
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      OverlayFormat::Rgba32 => "RGBA32",
      OverlayFormat::Rgb24 => "RGB24",
      OverlayFormat::Rgb565 => "RGB565",
    }
  }
}

/// One overlay blit: placement header plus raw pixel payload.
#[derive(Debug, Clone)]
pub struct OverlayFrame<'a> {
  pub format: OverlayFormat,
  pub width: u32,
  pub height: u32,
  pub x: u32,
  pub y: u32,
  pub colorkey: u32,
  pub pixels: &'a [u8],
}

/// Writer half of the overlay pipe.
pub struct OverlayChannel {
  writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl OverlayChannel {
  pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
    Self {
      writer: Box::new(writer),
    }
  }

  /// Open the overlay FIFO for writing.
  pub fn open(paths: &PipePaths) -> Result<Self, OverlayError> {
    let writer = pipe::OpenOptions::new()
      .read_write(true)
      .open_sender(&paths.overlay)?;
    Ok(Self::new(writer))
  }

  /// Push one blit: `<FORMAT> <w> <h> <x> <y> <colorkey>\n` followed by
  /// exactly `w*h*bytes_per_pixel` raw bytes. The payload length is checked
  /// before anything hits the pipe, so a bad frame cannot desynchronize the
  /// sub-protocol.
  pub async fn blit(&mut self, frame: &OverlayFrame<'_>) -> Result<(), OverlayError> {
    let expected = frame.width as usize * frame.height as usize * frame.format.bytes_per_pixel();
    if frame.pixels.len() != expected {
      return Err(OverlayError::PayloadSize {
        expected,
        actual: frame.pixels.len(),
      });
    }

    let header = format!(
      "{} {} {} {} {} {}\n",
      frame.format.as_str(),
      frame.width,
      frame.height,
      frame.x,
      frame.y,
      frame.colorkey
    );
    self.writer.write_all(header.as_bytes()).await?;
    self.writer.write_all(frame.pixels).await?;
    self.writer.flush().await?;
    Ok(())
  }

  /// Make the overlay visible.
  pub async fn show(&mut self) -> Result<(), OverlayError> {
    self.writer.write_all(b"SHOW\n").await?;
    self.writer.flush().await?;
    Ok(())
  }

  /// Hide the overlay.
  pub async fn hide(&mut self) -> Result<(), OverlayError> {
    self.writer.write_all(b"HIDE\n").await?;
    self.writer.flush().await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{duplex, AsyncReadExt};

  #[tokio::test]
  async fn test_blit_writes_header_then_payload() {
    let (ours, mut theirs) = duplex(4096);
    let mut chan = OverlayChannel::new(ours);

    let pixels = vec![0xAB; 2 * 2 * 4];
    chan
      .blit(&OverlayFrame {
        format: OverlayFormat::Rgba32,
        width: 2,
        height: 2,
        x: 10,
        y: 20,
        colorkey: 0,
        pixels: &pixels,
      })
      .await
      .unwrap();
    drop(chan);

    let mut written = Vec::new();
    theirs.read_to_end(&mut written).await.unwrap();
    let header_end = written.iter().position(|&b| b == b'\n').unwrap();
    assert_eq!(&written[..header_end], b"RGBA32 2 2 10 20 0");
    assert_eq!(&written[header_end + 1..], &pixels[..]);
  }

  #[tokio::test]
  async fn test_blit_rejects_mismatched_payload() {
    let (ours, mut theirs) = duplex(4096);
    let mut chan = OverlayChannel::new(ours);

    let err = chan
      .blit(&OverlayFrame {
        format: OverlayFormat::Rgb24,
        width: 4,
        height: 4,
        x: 0,
        y: 0,
        colorkey: 0,
        pixels: &[0; 7],
      })
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      OverlayError::PayloadSize {
        expected: 48,
        actual: 7
      }
    ));
    drop(chan);

    // Nothing reached the pipe.
    let mut written = Vec::new();
    theirs.read_to_end(&mut written).await.unwrap();
    assert!(written.is_empty());
  }

  #[tokio::test]
  async fn test_show_hide_directives() {
    let (ours, mut theirs) = duplex(4096);
    let mut chan = OverlayChannel::new(ours);

    chan.show().await.unwrap();
    chan.hide().await.unwrap();
    drop(chan);

    let mut written = String::new();
    theirs.read_to_string(&mut written).await.unwrap();
    assert_eq!(written, "SHOW\nHIDE\n");
  }
}
