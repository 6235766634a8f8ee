//! Classified request/response exchanges with the player.
//!
//! An operation subscribes to the player's merged output, emits its
//! command(s), and feeds each output line to a caller-supplied classifier
//! until the classifier settles the [`Verdict`], the player dies, or the
//! timeout fires. Whichever comes first wins; the subscription and timer are
//! released on every path when the operation future completes or is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::PlayerError;
use super::ipc::{PlayerProcess, ProcessEvent};
use super::protocol::{LineMode, LineSplitter, OutputStream};
use super::supervisor::ProcessSupervisor;
use super::traffic::{Observer, Traffic};

/// Default operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Convert a millisecond timeout where `0` means "no timeout".
pub fn timeout_from_millis(ms: u64) -> Option<Duration> {
  if ms == 0 {
    None
  } else {
    Some(Duration::from_millis(ms))
  }
}

/// Whether concurrent operations share the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
  /// One operation at a time holds the output stream; others queue in FIFO
  /// order. Queue time counts against each operation's timeout.
  #[default]
  Serialized,
  /// Every in-flight operation sees every line, including replies meant
  /// for another operation.
  Shared,
}

/// Settlement slot handed to the classifier. The first `resolve` or
/// `reject` wins; later calls are ignored.
#[derive(Debug)]
pub struct Verdict<T> {
  outcome: Option<Result<T, PlayerError>>,
}

impl<T> Verdict<T> {
  fn new() -> Self {
    Self { outcome: None }
  }

  pub fn resolve(&mut self, value: T) {
    if self.outcome.is_none() {
      self.outcome = Some(Ok(value));
    }
  }

  pub fn reject(&mut self, reason: impl Into<String>) {
    if self.outcome.is_none() {
      self.outcome = Some(Err(PlayerError::Rejected(reason.into())));
    }
  }

  pub fn is_settled(&self) -> bool {
    self.outcome.is_some()
  }

  fn take(&mut self) -> Option<Result<T, PlayerError>> {
    self.outcome.take()
  }
}

/// Passed to the emit callback to write commands to the process the
/// operation is listening on.
pub struct CommandSender<'a> {
  process: &'a PlayerProcess,
}

impl CommandSender<'_> {
  /// Send one command; tokens are joined with spaces.
  pub fn send<I, S>(&self, args: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.process.send_command(args);
  }
}

/// Runs operations against the supervisor's player.
#[derive(Clone)]
pub struct OperationExecutor {
  supervisor: ProcessSupervisor,
  isolation: Isolation,
  line_mode: LineMode,
  default_timeout: Option<Duration>,
  gate: Arc<tokio::sync::Mutex<()>>,
}

impl OperationExecutor {
  pub fn new(supervisor: ProcessSupervisor) -> Self {
    Self {
      supervisor,
      isolation: Isolation::default(),
      line_mode: LineMode::default(),
      default_timeout: Some(DEFAULT_TIMEOUT),
      gate: Arc::new(tokio::sync::Mutex::new(())),
    }
  }

  pub fn with_isolation(mut self, isolation: Isolation) -> Self {
    self.isolation = isolation;
    self
  }

  pub fn with_line_mode(mut self, line_mode: LineMode) -> Self {
    self.line_mode = line_mode;
    self
  }

  /// Timeout used by [`run`](Self::run). `None` disables it.
  pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.default_timeout = timeout;
    self
  }

  pub fn supervisor(&self) -> &ProcessSupervisor {
    &self.supervisor
  }

  /// Run an operation with the default timeout.
  pub async fn run<T, E, C>(&self, emit: E, classify: C) -> Result<T, PlayerError>
  where
    E: FnOnce(&CommandSender<'_>),
    C: FnMut(&str, &mut Verdict<T>),
  {
    self.run_with_timeout(emit, classify, self.default_timeout).await
  }

  /// Run an operation. The timer starts once the player is ready.
  pub async fn run_with_timeout<T, E, C>(
    &self,
    emit: E,
    classify: C,
    timeout: Option<Duration>,
  ) -> Result<T, PlayerError>
  where
    E: FnOnce(&CommandSender<'_>),
    C: FnMut(&str, &mut Verdict<T>),
  {
    let process = self.supervisor.ensure_ready().await?;
    let exchange = self.exchange(&process, emit, classify);

    match timeout {
      Some(limit) => match tokio::time::timeout(limit, exchange).await {
        Ok(result) => result,
        Err(_) => {
          log::warn!("MPlayer operation timed out after {:?}", limit);
          Err(PlayerError::Timeout(limit))
        }
      },
      None => exchange.await,
    }
  }

  async fn exchange<T, E, C>(
    &self,
    process: &PlayerProcess,
    emit: E,
    mut classify: C,
  ) -> Result<T, PlayerError>
  where
    E: FnOnce(&CommandSender<'_>),
    C: FnMut(&str, &mut Verdict<T>),
  {
    let _turn = match self.isolation {
      Isolation::Serialized => Some(self.gate.lock().await),
      Isolation::Shared => None,
    };

    // Listen first, then speak: no reply can arrive unobserved.
    let events = process.subscribe();
    emit(&CommandSender { process });

    let mut splitter = LineSplitter::new(self.line_mode);
    let mut verdict = Verdict::new();

    while let Some(event) = events.recv().await {
      match event {
        ProcessEvent::Output { stream, chunk } => {
          let lines = splitter.split(stream, &chunk);
          let settled = classify_lines(
            &lines,
            stream,
            process.observer(),
            &mut classify,
            &mut verdict,
          );
          if settled {
            if let Some(outcome) = verdict.take() {
              return outcome;
            }
          }
        }
        ProcessEvent::Terminated(termination) => return Err(termination.into_error()),
      }
    }

    Err(PlayerError::Runtime("player output closed".into()))
  }
}

/// Feed lines to the classifier in order, stopping at the first verdict.
/// Returns whether the verdict is settled.
fn classify_lines<T, C>(
  lines: &[String],
  stream: OutputStream,
  observer: &Observer,
  classify: &mut C,
  verdict: &mut Verdict<T>,
) -> bool
where
  C: FnMut(&str, &mut Verdict<T>),
{
  for line in lines {
    observer(Traffic::Received { stream, line });
    classify(line, verdict);
    if verdict.is_settled() {
      return true;
    }
  }
  false
}
