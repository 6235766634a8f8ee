//! Stdio plumbing for the player process.
//!
//! One reader task per output pipe publishes raw chunks to every
//! subscriber, a writer task drains the command queue into stdin, and a
//! watcher task owns the child and publishes its termination.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::PlayerError;
use super::process::{send_terminate, ExitInfo, ProcessError};
use super::protocol::{format_command, OutputStream};
use super::traffic::{Observer, Traffic};

/// How long readers may keep delivering buffered output after the process
/// has exited.
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);

/// Grace period between SIGTERM and a hard kill.
const KILL_GRACE: Duration = Duration::from_secs(3);

const READ_BUFFER_SIZE: usize = 8192;

/// How the process went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
  Exited(ExitInfo),
  Failed(String),
}

impl Termination {
  pub fn into_error(self) -> PlayerError {
    match self {
      Termination::Exited(info) => PlayerError::Exited(info),
      Termination::Failed(msg) => PlayerError::Runtime(msg),
    }
  }
}

/// Event delivered to subscribers.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
  /// Raw bytes as read from the pipe; decoding is up to the line splitter.
  Output { stream: OutputStream, chunk: Arc<[u8]> },
  Terminated(Termination),
}

struct HubState {
  next_id: u64,
  subscribers: HashMap<u64, Sender<ProcessEvent>>,
  terminated: Option<Termination>,
}

/// Fan-out of process events to the currently attached listeners.
struct EventHub {
  state: Mutex<HubState>,
}

impl EventHub {
  fn new() -> Self {
    Self {
      state: Mutex::new(HubState {
        next_id: 0,
        subscribers: HashMap::new(),
        terminated: None,
      }),
    }
  }

  fn subscribe(self: &Arc<Self>) -> Subscription {
    let (tx, rx) = async_channel::unbounded();
    let mut state = self.state.lock();

    // Late subscribers still learn that the process is gone.
    if let Some(termination) = &state.terminated {
      let _ = tx.try_send(ProcessEvent::Terminated(termination.clone()));
      return Subscription {
        id: None,
        rx,
        hub: self.clone(),
      };
    }

    let id = state.next_id;
    state.next_id += 1;
    state.subscribers.insert(id, tx);
    Subscription {
      id: Some(id),
      rx,
      hub: self.clone(),
    }
  }

  fn publish(&self, event: ProcessEvent) {
    let state = self.state.lock();
    for tx in state.subscribers.values() {
      let _ = tx.try_send(event.clone());
    }
  }

  /// Deliver the final event and detach everyone.
  fn terminate(&self, termination: Termination) {
    let mut state = self.state.lock();
    if state.terminated.is_some() {
      return;
    }
    for (_, tx) in state.subscribers.drain() {
      let _ = tx.try_send(ProcessEvent::Terminated(termination.clone()));
    }
    state.terminated = Some(termination);
  }

  fn unsubscribe(&self, id: u64) {
    self.state.lock().subscribers.remove(&id);
  }

  fn listener_count(&self) -> usize {
    self.state.lock().subscribers.len()
  }

  fn is_terminated(&self) -> bool {
    self.state.lock().terminated.is_some()
  }
}

/// A live listener on the process's output. Dropping it detaches it.
pub struct Subscription {
  id: Option<u64>,
  rx: Receiver<ProcessEvent>,
  hub: Arc<EventHub>,
}

impl Subscription {
  /// Next event, or `None` once the process is gone and everything
  /// buffered has been read.
  pub async fn recv(&self) -> Option<ProcessEvent> {
    self.rx.recv().await.ok()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(id) = self.id.take() {
      self.hub.unsubscribe(id);
    }
  }
}

/// Writer channel message.
enum WriteMessage {
  Command(Vec<u8>),
  Close,
}

/// Handle to one spawned player process.
///
/// Cheap to share; the child itself is owned by the watcher task.
pub struct PlayerProcess {
  id: u64,
  pid: Option<u32>,
  hub: Arc<EventHub>,
  write_tx: Sender<WriteMessage>,
  kill: CancellationToken,
  fault: Mutex<Option<String>>,
  observer: Observer,
}

impl std::fmt::Debug for PlayerProcess {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PlayerProcess")
      .field("id", &self.id)
      .field("pid", &self.pid)
      .field("alive", &self.is_alive())
      .finish()
  }
}

/// Pipes and child not yet handed to their tasks.
pub(crate) struct PlayerIo {
  child: Child,
  stdin: ChildStdin,
  stdout: tokio::process::ChildStdout,
  stderr: tokio::process::ChildStderr,
  write_rx: Receiver<WriteMessage>,
}

impl PlayerProcess {
  /// Take ownership of the child's pipes. No task runs until
  /// [`PlayerIo::start`], so subscriptions made in between see all output.
  pub(crate) fn attach(
    id: u64,
    mut child: Child,
    observer: Observer,
  ) -> Result<(Arc<Self>, PlayerIo), ProcessError> {
    let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
    let stdout = child
      .stdout
      .take()
      .ok_or(ProcessError::MissingPipe("stdout"))?;
    let stderr = child
      .stderr
      .take()
      .ok_or(ProcessError::MissingPipe("stderr"))?;

    let (write_tx, write_rx) = async_channel::unbounded();

    let process = Arc::new(Self {
      id,
      pid: child.id(),
      hub: Arc::new(EventHub::new()),
      write_tx,
      kill: CancellationToken::new(),
      fault: Mutex::new(None),
      observer,
    });

    let io = PlayerIo {
      child,
      stdin,
      stdout,
      stderr,
      write_rx,
    };

    Ok((process, io))
  }

  /// Supervisor-assigned identity, unique per spawn.
  pub fn id(&self) -> u64 {
    self.id
  }

  /// OS process id.
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  pub fn is_alive(&self) -> bool {
    !self.hub.is_terminated()
  }

  /// Number of attached output listeners.
  pub fn listener_count(&self) -> usize {
    self.hub.listener_count()
  }

  pub(crate) fn subscribe(&self) -> Subscription {
    self.hub.subscribe()
  }

  /// Queue one command line for stdin.
  pub fn send_command<I, S>(&self, args: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let line = format_command(args);
    (self.observer)(Traffic::Sent(line.trim_end_matches('\n')));
    if self
      .write_tx
      .try_send(WriteMessage::Command(line.into_bytes()))
      .is_err()
    {
      log::warn!("MPlayer stdin closed, command dropped");
    }
  }

  pub(crate) fn observer(&self) -> &Observer {
    &self.observer
  }

  /// Request termination without waiting for it.
  pub(crate) fn request_terminate(&self) {
    self.kill.cancel();
  }

  /// Terminate and wait until the watcher reports the outcome.
  pub async fn terminate(&self) -> Result<(), PlayerError> {
    let events = self.subscribe();
    self.request_terminate();

    while let Some(event) = events.recv().await {
      if let ProcessEvent::Terminated(termination) = event {
        return match termination {
          Termination::Exited(info) => {
            log::info!("MPlayer shut down ({})", info);
            Ok(())
          }
          Termination::Failed(msg) => Err(PlayerError::Runtime(msg)),
        };
      }
    }
    Ok(())
  }

  /// Record a stream fault and bring the process down.
  fn fault(&self, msg: String) {
    {
      let mut fault = self.fault.lock();
      if fault.is_none() {
        *fault = Some(msg);
      }
    }
    self.kill.cancel();
  }
}

impl PlayerIo {
  /// Spawn reader, writer and watcher tasks. `on_exit` runs before the
  /// termination reaches subscribers.
  pub(crate) fn start<F>(self, process: Arc<PlayerProcess>, on_exit: F)
  where
    F: FnOnce(&Termination) + Send + 'static,
  {
    let PlayerIo {
      child,
      stdin,
      stdout,
      stderr,
      write_rx,
    } = self;

    let readers = vec![
      tokio::spawn(reader_loop(stdout, OutputStream::Stdout, process.clone())),
      tokio::spawn(reader_loop(stderr, OutputStream::Stderr, process.clone())),
    ];

    tokio::spawn(writer_loop(stdin, write_rx, process.clone()));
    tokio::spawn(watch_loop(child, process, readers, on_exit));
  }
}

async fn reader_loop<R: AsyncRead + Unpin>(
  mut reader: R,
  stream: OutputStream,
  process: Arc<PlayerProcess>,
) {
  let mut buf = vec![0u8; READ_BUFFER_SIZE];

  loop {
    match reader.read(&mut buf).await {
      Ok(0) => {
        log::debug!("MPlayer {} closed", stream.as_str());
        break;
      }
      Ok(n) => {
        let chunk: Arc<[u8]> = Arc::from(&buf[..n]);
        process.hub.publish(ProcessEvent::Output { stream, chunk });
      }
      Err(e) => {
        log::error!("MPlayer {} read error: {}", stream.as_str(), e);
        process.fault(format!("{} read error: {}", stream.as_str(), e));
        break;
      }
    }
  }
}

async fn writer_loop(
  mut stdin: ChildStdin,
  write_rx: Receiver<WriteMessage>,
  process: Arc<PlayerProcess>,
) {
  while let Ok(msg) = write_rx.recv().await {
    match msg {
      WriteMessage::Command(data) => {
        if let Err(e) = stdin.write_all(&data).await {
          log::error!("MPlayer stdin write error: {}", e);
          process.fault(format!("stdin write error: {}", e));
          break;
        }
        if let Err(e) = stdin.flush().await {
          log::error!("MPlayer stdin flush error: {}", e);
          process.fault(format!("stdin flush error: {}", e));
          break;
        }
      }
      WriteMessage::Close => break,
    }
  }
}

async fn watch_loop<F>(
  mut child: Child,
  process: Arc<PlayerProcess>,
  readers: Vec<JoinHandle<()>>,
  on_exit: F,
) where
  F: FnOnce(&Termination) + Send + 'static,
{
  let status = tokio::select! {
    status = child.wait() => status,
    _ = process.kill.cancelled() => {
      log::info!("Terminating MPlayer (pid: {:?})", process.pid);
      if let Err(e) = send_terminate(&mut child) {
        log::warn!("Failed to signal MPlayer, killing it: {}", e);
        let _ = child.start_kill();
      }
      match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
          log::warn!("MPlayer ignored SIGTERM for {:?}, killing it", KILL_GRACE);
          let _ = child.start_kill();
          child.wait().await
        }
      }
    }
  };

  // Faults raised after the child is gone (a write racing the exit) do not
  // mask the real exit status.
  let fault = process.fault.lock().take();

  let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
  if tokio::time::timeout(OUTPUT_DRAIN, join_all(readers)).await.is_err() {
    // A grandchild can keep the pipes open after the player is gone.
    log::debug!("MPlayer output still open after exit, dropping readers");
    for abort in aborts {
      abort.abort();
    }
  }

  let termination = match (fault, status) {
    (Some(msg), _) => Termination::Failed(msg),
    (None, Ok(status)) => Termination::Exited(status.into()),
    (None, Err(e)) => Termination::Failed(format!("wait failed: {}", e)),
  };

  log::info!("MPlayer process {} ended: {:?}", process.id, termination);

  let _ = process.write_tx.try_send(WriteMessage::Close);
  on_exit(&termination);
  process.hub.terminate(termination);
}
