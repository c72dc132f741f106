//! Pending-answer buffer for the slave stdout pipe.
//!
//! The player writes answer lines as it computes them, so a single raw read
//! may carry zero, one, or several complete lines, or only a fragment. The
//! buffer persists between reads: bytes below the cursor are unconsumed
//! input, and a partial line read now is still at the front on the next call.

/// Capacity of the pending buffer. A line that fills the buffer without a
/// terminating newline is a protocol violation.
pub const ANSWER_BUFFER_CAPACITY: usize = 2048;

/// Bounded reassembly buffer owned by the stdout reader.
pub struct AnswerBuffer {
  buf: Box<[u8; ANSWER_BUFFER_CAPACITY]>,
  len: usize,
}

impl AnswerBuffer {
  pub fn new() -> Self {
    Self {
      buf: Box::new([0; ANSWER_BUFFER_CAPACITY]),
      len: 0,
    }
  }

  /// True when no further bytes can be appended.
  pub fn is_full(&self) -> bool {
    self.len == ANSWER_BUFFER_CAPACITY
  }

  /// Unused tail of the buffer, for the next raw read to fill.
  pub fn spare_mut(&mut self) -> &mut [u8] {
    &mut self.buf[self.len..]
  }

  /// Record `n` bytes appended into `spare_mut()`.
  pub fn commit(&mut self, n: usize) {
    debug_assert!(self.len + n <= ANSWER_BUFFER_CAPACITY);
    self.len += n;
  }

  /// Extract the first complete line, if any, and compact the remainder to
  /// the front of the buffer. The terminator (and a preceding CR) is not
  /// part of the returned line.
  pub fn take_line(&mut self) -> Option<String> {
    let pos = self.buf[..self.len].iter().position(|&b| b == b'\n')?;

    let mut end = pos;
    if end > 0 && self.buf[end - 1] == b'\r' {
      end -= 1;
    }
    let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();

    // Keep everything after the newline as unconsumed input.
    self.buf.copy_within(pos + 1..self.len, 0);
    self.len -= pos + 1;

    Some(line)
  }

  /// Discard all pending bytes.
  pub fn clear(&mut self) {
    self.len = 0;
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

impl Default for AnswerBuffer {
  fn default() -> Self {
    Self::new()
  }
}
