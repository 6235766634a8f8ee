//! Player process lifecycle.
//!
//! The supervisor owns at most one player process. `ensure_ready` spawns one
//! on demand and waits for the startup banner, the exit watcher clears the
//! handle when the process goes away, and `shutdown` terminates it.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::error::PlayerError;
use super::ipc::{PlayerProcess, ProcessEvent, Termination};
use super::process::{spawn_player, PlayerLauncher, ProcessError};
use super::protocol::{LineMode, LineSplitter, READY_SIGNATURE};
use super::traffic::{log_observer, Observer, Traffic};

type StartFuture = Shared<BoxFuture<'static, Result<Arc<PlayerProcess>, PlayerError>>>;

struct SupervisorState {
  process: Option<Arc<PlayerProcess>>,
  ready: bool,
  /// In-flight startup, shared by every concurrent `ensure_ready` caller.
  starting: Option<StartFuture>,
  last_id: u64,
}

impl SupervisorState {
  fn ready_process(&self) -> Option<Arc<PlayerProcess>> {
    if !self.ready {
      return None;
    }
    self.process.as_ref().filter(|p| p.is_alive()).cloned()
  }
}

struct Inner {
  launcher: Mutex<PlayerLauncher>,
  observer: Observer,
  state: Mutex<SupervisorState>,
}

/// Owns the player process and guarantees a ready one on request.
#[derive(Clone)]
pub struct ProcessSupervisor {
  inner: Arc<Inner>,
}

impl ProcessSupervisor {
  /// Create a supervisor that reports traffic through the `log` facade.
  pub fn new(launcher: PlayerLauncher) -> Self {
    Self::with_observer(launcher, log_observer())
  }

  /// Create a supervisor with a custom traffic observer.
  pub fn with_observer(launcher: PlayerLauncher, observer: Observer) -> Self {
    Self {
      inner: Arc::new(Inner {
        launcher: Mutex::new(launcher),
        observer,
        state: Mutex::new(SupervisorState {
          process: None,
          ready: false,
          starting: None,
          last_id: 0,
        }),
      }),
    }
  }

  /// Update the player executable (takes effect on next start).
  pub fn set_player_path(&self, path: Option<PathBuf>) {
    self.inner.launcher.lock().set_program(path);
  }

  /// Return the ready process, spawning one if needed.
  ///
  /// There is no startup timeout: a player that never prints its banner
  /// keeps callers waiting until it exits or is shut down.
  pub async fn ensure_ready(&self) -> Result<Arc<PlayerProcess>, PlayerError> {
    let start = {
      let mut state = self.inner.state.lock();
      if let Some(process) = state.ready_process() {
        return Ok(process);
      }
      if let Some(start) = state.starting.clone() {
        start
      } else {
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.start().await });
        let start = async move {
          task.await.unwrap_or_else(|e| {
            Err(PlayerError::Runtime(format!("startup task failed: {}", e)))
          })
        }
        .boxed()
        .shared();
        state.starting = Some(start.clone());
        start
      }
    };

    start.await
  }

  /// Terminate the current process, if any.
  pub async fn shutdown(&self) -> Result<(), PlayerError> {
    self.inner.shutdown().await
  }

  /// Write one command line to the current process. No-op without one.
  pub fn execute<I, S>(&self, args: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    match self.current() {
      Some(process) => process.send_command(args),
      None => log::debug!("No MPlayer process, command dropped"),
    }
  }

  /// The current process handle, ready or not.
  pub fn current(&self) -> Option<Arc<PlayerProcess>> {
    self.inner.state.lock().process.clone()
  }

  pub fn is_running(&self) -> bool {
    self.current().is_some_and(|p| p.is_alive())
  }

  pub fn is_ready(&self) -> bool {
    self.inner.state.lock().ready_process().is_some()
  }

  /// Output listeners attached to the current process.
  pub fn listener_count(&self) -> usize {
    self.current().map_or(0, |p| p.listener_count())
  }
}

impl Inner {
  async fn start(self: Arc<Self>) -> Result<Arc<PlayerProcess>, PlayerError> {
    let result = self.launch().await;

    let stale = {
      let mut state = self.state.lock();
      state.starting = None;
      let process = result?;
      let current = state.process.as_ref().is_some_and(|p| p.id() == process.id());
      if current && process.is_alive() {
        state.ready = true;
        log::info!("MPlayer ready (pid: {:?})", process.pid());
        return Ok(process);
      }
      process
    };

    // Died or was shut down between the banner and now.
    Err(termination_of(&stale).await)
  }

  async fn launch(self: &Arc<Self>) -> Result<Arc<PlayerProcess>, PlayerError> {
    if let Err(e) = self.shutdown().await {
      log::warn!("Failed to stop previous MPlayer: {}", e);
    }

    let launcher = self.launcher.lock().clone();
    let child = spawn_player(&launcher)?;

    let id = {
      let mut state = self.state.lock();
      state.last_id += 1;
      state.last_id
    };
    let (process, io) = PlayerProcess::attach(id, child, self.observer.clone())?;

    {
      let mut state = self.state.lock();
      state.process = Some(process.clone());
      state.ready = false;
    }

    // Subscribe before any reader runs so the banner cannot be missed.
    let readiness = process.subscribe();
    let weak = Arc::downgrade(self);
    io.start(process.clone(), move |termination| {
      if let Some(inner) = weak.upgrade() {
        inner.on_exit(id, termination);
      }
    });

    let mut splitter = LineSplitter::new(LineMode::Chunked);
    while let Some(event) = readiness.recv().await {
      match event {
        ProcessEvent::Output { stream, chunk } => {
          for line in splitter.split(stream, &chunk) {
            (self.observer)(Traffic::Received {
              stream,
              line: &line,
            });
            if line.contains(READY_SIGNATURE) {
              return Ok(process);
            }
          }
        }
        ProcessEvent::Terminated(termination) => return Err(startup_error(termination)),
      }
    }

    Err(ProcessError::StartupFailed("output closed before startup banner".into()).into())
  }

  async fn shutdown(&self) -> Result<(), PlayerError> {
    let process = self.state.lock().process.clone();
    match process {
      Some(process) => process.terminate().await,
      None => Ok(()),
    }
  }

  fn on_exit(&self, id: u64, termination: &Termination) {
    {
      let mut state = self.state.lock();
      if state.process.as_ref().is_some_and(|p| p.id() == id) {
        state.process = None;
        state.ready = false;
      }
    }

    match termination {
      Termination::Exited(info) => log::info!("MPlayer exited ({})", info),
      Termination::Failed(msg) => log::error!("MPlayer failed: {}", msg),
    }
  }
}

impl Drop for Inner {
  fn drop(&mut self) {
    if let Some(process) = self.state.get_mut().process.take() {
      process.request_terminate();
    }
  }
}

fn startup_error(termination: Termination) -> PlayerError {
  match termination {
    Termination::Exited(info) => PlayerError::Exited(info),
    Termination::Failed(msg) => ProcessError::StartupFailed(msg).into(),
  }
}

async fn termination_of(process: &PlayerProcess) -> PlayerError {
  let events = process.subscribe();
  while let Some(event) = events.recv().await {
    if let ProcessEvent::Terminated(termination) = event {
      return termination.into_error();
    }
  }
  PlayerError::Runtime("player went away during startup".into())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn missing_player() -> ProcessSupervisor {
    ProcessSupervisor::new(PlayerLauncher::custom(
      "/nonexistent/mplayer-binary",
      Vec::<String>::new(),
    ))
  }

  #[tokio::test]
  async fn test_shutdown_without_process_is_noop() {
    let supervisor = missing_player();
    supervisor.shutdown().await.unwrap();
    supervisor.shutdown().await.unwrap();
    assert!(!supervisor.is_running());
    assert!(supervisor.current().is_none());
  }

  #[tokio::test]
  async fn test_execute_without_process_is_noop() {
    let supervisor = missing_player();
    supervisor.execute(["pause"]);
    assert!(supervisor.current().is_none());
  }

  #[tokio::test]
  async fn test_spawn_failure_surfaces_and_clears_startup() {
    let supervisor = missing_player();
    let err = supervisor.ensure_ready().await.unwrap_err();
    assert!(matches!(err, PlayerError::Spawn(_)), "got {:?}", err);
    assert!(!supervisor.is_ready());
    assert!(supervisor.inner.state.lock().starting.is_none());

    // A later call tries again rather than replaying the old failure.
    let err = supervisor.ensure_ready().await.unwrap_err();
    assert!(matches!(err, PlayerError::Spawn(_)));
  }
}
