//! MPlayer slave-mode text protocol.
//!
//! Commands are newline-terminated lines on the command pipe; answers come
//! back on the stdout pipe as `ANS_<PROPERTY>=<value>` lines, with string
//! payloads additionally quoted (`ANS_FILENAME='<name>'`).

use std::fmt::Display;

/// Seek mode suffix for the `seek` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
  Relative,
  Percent,
  Absolute,
}

impl SeekMode {
  fn as_arg(self) -> &'static str {
    match self {
      SeekMode::Relative => "0",
      SeekMode::Percent => "1",
      SeekMode::Absolute => "2",
    }
  }
}

/// Volume mode suffix for the `volume` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMode {
  Relative,
  Absolute,
}

impl VolumeMode {
  fn as_arg(self) -> &'static str {
    match self {
      VolumeMode::Relative => "0",
      VolumeMode::Absolute => "1",
    }
  }
}

/// A command line for the player's command pipe.
///
/// Pausable commands get the `pausing ` qualifier while the session is
/// paused, so that state queries do not resume playback as a side effect.
/// `pause` and `quit` are raw: qualifying them would change their meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveCommand {
  text: String,
  pausable: bool,
}

impl SlaveCommand {
  fn new(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      pausable: true,
    }
  }

  fn raw(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      pausable: false,
    }
  }

  /// Query a property (`ANS_<name>=<value>` answer).
  pub fn get_property(name: &str) -> Self {
    Self::new(format!("get_property {}", name))
  }

  /// Set a property, no answer expected.
  pub fn set_property(name: &str, value: impl Display) -> Self {
    Self::new(format!("set_property {} {}", name, value))
  }

  /// Seek by `amount` seconds (or percent) in the given mode.
  pub fn seek(amount: f64, mode: SeekMode) -> Self {
    Self::new(format!("seek {} {}", amount, mode.as_arg()))
  }

  /// Adjust volume in the given mode.
  pub fn volume(value: f64, mode: VolumeMode) -> Self {
    Self::new(format!("volume {} {}", value, mode.as_arg()))
  }

  /// Toggle mute.
  pub fn mute() -> Self {
    Self::new("mute")
  }

  /// Set the player's own OSD level.
  pub fn osd(level: i32) -> Self {
    Self::new(format!("osd {}", level))
  }

  /// Current position in seconds (`ANS_TIME_POSITION=<float>`).
  pub fn get_time_pos() -> Self {
    Self::new("get_time_pos")
  }

  /// Current position in percent (`ANS_PERCENT_POSITION=<int>`).
  pub fn get_percent_pos() -> Self {
    Self::new("get_percent_pos")
  }

  /// Name of the playing file (`ANS_FILENAME='<name>'`).
  pub fn get_file_name() -> Self {
    Self::new("get_file_name")
  }

  /// Artist metadata (`ANS_META_ARTIST='<artist>'`).
  pub fn get_meta_artist() -> Self {
    Self::new("get_meta_artist")
  }

  /// Title metadata (`ANS_META_TITLE='<title>'`).
  pub fn get_meta_title() -> Self {
    Self::new("get_meta_title")
  }

  /// Toggle pause. Raw: `pausing pause` would be a no-op.
  pub fn pause() -> Self {
    Self::raw("pause")
  }

  /// Terminate the player. Raw.
  pub fn quit() -> Self {
    Self::raw("quit")
  }

  /// Wire form of the command: qualifier, text, single `\n` terminator.
  pub fn encode(&self, paused: bool) -> String {
    if paused && self.pausable {
      format!("pausing {}\n", self.text)
    } else {
      format!("{}\n", self.text)
    }
  }

  /// Command text without terminator, for logging.
  pub fn text(&self) -> &str {
    &self.text
  }
}

/// Integer answer: the substring after the last `=`, parsed as a signed
/// integer. The last `=` is used so leading diagnostic noise on the same
/// line does not break extraction.
pub fn parse_int_answer(line: &str) -> Option<i64> {
  let idx = line.rfind('=')?;
  line[idx + 1..].trim().parse().ok()
}

/// Float answer, same shape as [`parse_int_answer`].
pub fn parse_float_answer(line: &str) -> Option<f64> {
  let idx = line.rfind('=')?;
  line[idx + 1..].trim().parse().ok()
}

/// String answer. The line must start with `expected_prefix`; the payload is
/// everything after it, with the final character stripped when
/// `trailing_quote` (quoted answers end in `'`). A line that parses but
/// lacks the prefix is a different answer, not a malformed one — the caller
/// keeps reading.
pub fn parse_string_answer(line: &str, expected_prefix: &str, trailing_quote: bool) -> Option<String> {
  let rest = line.strip_prefix(expected_prefix)?;
  if trailing_quote {
    if rest.is_empty() {
      return None;
    }
    let mut chars = rest.chars();
    chars.next_back();
    Some(chars.as_str().to_string())
  } else {
    Some(rest.to_string())
  }
}

/// Video-session settings, read and written as one property per command.
/// There is no atomicity across the batch: a failure mid-way leaves the
/// earlier fields applied or read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoSettings {
  pub brightness: i32,
  pub contrast: i32,
  pub audio_delay: f64,
  pub volume: f64,
}

/// Audio-session settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioSettings {
  pub volume: f64,
}
