//! Resume-position collaborator contract.
//!
//! The shell persists playback positions in its own format; the control
//! layer only needs a narrow seam to hand the final position to at quit
//! time and to ask for a starting offset.

/// Persistence seam for playback positions.
pub trait ResumeStore: Send + Sync {
  /// Remember `seconds` as the last position of `target`.
  fn save_position(&self, target: &str, seconds: f64);

  /// Last saved position for `target`, if any.
  fn load_position(&self, target: &str) -> Option<f64>;
}
