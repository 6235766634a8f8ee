//! High-level player client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::error::PlayerError;
use super::ipc::{PlayerProcess, ProcessEvent};
use super::operation::{CommandSender, OperationExecutor, Verdict};
use super::process::PlayerLauncher;
use super::supervisor::ProcessSupervisor;
use super::traffic::{log_observer, Observer};
use crate::config::PlayerConfig;

/// How long `quit` waits for the player to leave on its own.
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Supervisor plus executor, configured from a [`PlayerConfig`].
#[derive(Clone)]
pub struct PlayerClient {
  executor: OperationExecutor,
}

impl PlayerClient {
  /// MPlayer client that logs traffic through the `log` facade.
  pub fn new(config: &PlayerConfig) -> Self {
    Self::with_launcher(
      PlayerLauncher::mplayer(config.player_path()),
      config,
      log_observer(),
    )
  }

  /// Client for an arbitrary launcher and traffic observer.
  pub fn with_launcher(launcher: PlayerLauncher, config: &PlayerConfig, observer: Observer) -> Self {
    let supervisor = ProcessSupervisor::with_observer(launcher, observer);
    let executor = OperationExecutor::new(supervisor)
      .with_isolation(config.isolation)
      .with_line_mode(config.line_mode)
      .with_default_timeout(config.operation_timeout());
    Self { executor }
  }

  pub fn supervisor(&self) -> &ProcessSupervisor {
    self.executor.supervisor()
  }

  /// Update the player executable (takes effect on next start).
  pub fn set_player_path(&self, path: Option<PathBuf>) {
    self.supervisor().set_player_path(path);
  }

  pub async fn ensure_ready(&self) -> Result<Arc<PlayerProcess>, PlayerError> {
    self.supervisor().ensure_ready().await
  }

  /// Run an operation with the configured timeout.
  pub async fn run_operation<T, E, C>(&self, emit: E, classify: C) -> Result<T, PlayerError>
  where
    E: FnOnce(&CommandSender<'_>),
    C: FnMut(&str, &mut Verdict<T>),
  {
    self.executor.run(emit, classify).await
  }

  /// Run an operation with an explicit timeout (`None` waits forever).
  pub async fn run_operation_with_timeout<T, E, C>(
    &self,
    emit: E,
    classify: C,
    timeout: Option<Duration>,
  ) -> Result<T, PlayerError>
  where
    E: FnOnce(&CommandSender<'_>),
    C: FnMut(&str, &mut Verdict<T>),
  {
    self.executor.run_with_timeout(emit, classify, timeout).await
  }

  /// Send a command outside of any operation.
  pub fn execute<I, S>(&self, args: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.supervisor().execute(args);
  }

  /// Terminate the player.
  pub async fn shutdown(&self) -> Result<(), PlayerError> {
    self.supervisor().shutdown().await
  }

  /// Ask the player to quit, falling back to termination if it lingers.
  pub async fn quit(&self) -> Result<(), PlayerError> {
    let Some(process) = self.supervisor().current() else {
      return Ok(());
    };

    let events = process.subscribe();
    process.send_command(["quit"]);

    let exited = async {
      while let Some(event) = events.recv().await {
        if let ProcessEvent::Terminated(termination) = event {
          log::info!("MPlayer quit: {:?}", termination);
          return;
        }
      }
    };

    if tokio::time::timeout(QUIT_GRACE, exited).await.is_err() {
      log::warn!("MPlayer did not quit within {:?}, terminating", QUIT_GRACE);
      return self.shutdown().await;
    }
    Ok(())
  }
}
