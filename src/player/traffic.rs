//! Observer hook for command and output traffic.

use std::sync::Arc;

use super::protocol::OutputStream;

/// One unit of traffic on the player's stdio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traffic<'a> {
  /// A command line written to stdin, without its newline.
  Sent(&'a str),
  /// An output line handed to a classifier.
  Received { stream: OutputStream, line: &'a str },
}

/// Side-channel observer. Never influences protocol behavior.
pub type Observer = Arc<dyn Fn(Traffic<'_>) + Send + Sync>;

/// Observer that forwards traffic to the `log` facade.
pub fn log_observer() -> Observer {
  Arc::new(|traffic: Traffic<'_>| match traffic {
    Traffic::Sent(line) => log::debug!("MPlayer <- {}", line),
    Traffic::Received { stream, line } => log::debug!("MPlayer {} -> {}", stream.as_str(), line),
  })
}
