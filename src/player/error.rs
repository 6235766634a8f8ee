//! Player error types.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::process::{ExitInfo, ProcessError};

/// Errors surfaced by the supervisor and by operations.
///
/// `Clone` so one failed startup can be reported to every caller that was
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum PlayerError {
  #[error("Failed to start player: {0}")]
  Spawn(Arc<ProcessError>),

  #[error("Player exited unexpectedly ({0})")]
  Exited(ExitInfo),

  #[error("Player runtime error: {0}")]
  Runtime(String),

  #[error("Operation timed out after {}ms", .0.as_millis())]
  Timeout(Duration),

  #[error("Operation rejected: {0}")]
  Rejected(String),
}

impl From<ProcessError> for PlayerError {
  fn from(err: ProcessError) -> Self {
    PlayerError::Spawn(Arc::new(err))
  }
}

impl PlayerError {
  /// The exit status, if the player died.
  pub fn exit_info(&self) -> Option<ExitInfo> {
    match self {
      PlayerError::Exited(info) => Some(*info),
      _ => None,
    }
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, PlayerError::Timeout(_))
  }
}
