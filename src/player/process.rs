//! MPlayer binary detection and process spawning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{Child, Command};

use super::protocol::STARTUP_ARGS;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("MPlayer {0} pipe unavailable")]
  MissingPipe(&'static str),
  #[error("MPlayer failed before becoming ready: {0}")]
  StartupFailed(String),
}

/// Executable and argument list used to start the player.
#[derive(Debug, Clone)]
pub struct PlayerLauncher {
  program: Option<PathBuf>,
  args: Vec<String>,
}

impl PlayerLauncher {
  /// MPlayer in slave mode with the fixed startup arguments.
  /// `None` auto-detects the executable at spawn time.
  pub fn mplayer(path: Option<PathBuf>) -> Self {
    Self {
      program: path,
      args: STARTUP_ARGS.iter().map(|arg| arg.to_string()).collect(),
    }
  }

  /// Any program speaking the slave protocol: it must print the readiness
  /// signature on startup and read commands line by line from stdin.
  pub fn custom<I, S>(program: impl Into<PathBuf>, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      program: Some(program.into()),
      args: args.into_iter().map(Into::into).collect(),
    }
  }

  /// Replace the executable (takes effect on next spawn).
  pub fn set_program(&mut self, path: Option<PathBuf>) {
    self.program = path;
  }

  pub fn program(&self) -> Option<&Path> {
    self.program.as_deref()
  }

  pub fn args(&self) -> &[String] {
    &self.args
  }
}

impl Default for PlayerLauncher {
  fn default() -> Self {
    Self::mplayer(None)
  }
}

/// Install locations probed when `mplayer` is not on `PATH`.
#[cfg(windows)]
const INSTALL_PATHS: &[&str] = &[
  r"C:\Program Files\MPlayer\mplayer.exe",
  r"C:\Program Files (x86)\MPlayer\mplayer.exe",
  r"C:\mplayer\mplayer.exe",
];
#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
  "/opt/homebrew/bin/mplayer",
  "/usr/local/bin/mplayer",
  "/opt/local/bin/mplayer",
];
#[cfg(all(unix, not(target_os = "macos")))]
const INSTALL_PATHS: &[&str] = &["/usr/bin/mplayer", "/usr/local/bin/mplayer"];
#[cfg(not(any(unix, windows)))]
const INSTALL_PATHS: &[&str] = &[];

/// Locate MPlayer: `PATH` lookup, then the platform's usual install paths.
pub fn find_player() -> Option<PathBuf> {
  which::which("mplayer").ok().or_else(|| {
    INSTALL_PATHS
      .iter()
      .map(PathBuf::from)
      .find(|candidate| candidate.is_file())
  })
}

/// Spawn the player with all three stdio streams piped.
pub fn spawn_player(launcher: &PlayerLauncher) -> Result<Child, ProcessError> {
  let exe = launcher
    .program
    .clone()
    .or_else(find_player)
    .ok_or(ProcessError::NotFound)?;

  log::info!("Spawning MPlayer: {:?} {:?}", exe, launcher.args);

  let child = Command::new(&exe)
    .args(&launcher.args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()?;

  Ok(child)
}

/// Ask the process to terminate.
#[cfg(unix)]
pub fn send_terminate(child: &mut Child) -> std::io::Result<()> {
  use nix::sys::signal::{kill, Signal};
  use nix::unistd::Pid;

  match child.id() {
    Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(std::io::Error::from),
    // Already reaped.
    None => Ok(()),
  }
}

#[cfg(not(unix))]
pub fn send_terminate(child: &mut Child) -> std::io::Result<()> {
  child.start_kill()
}

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
  pub code: Option<i32>,
  pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
  fn from(status: ExitStatus) -> Self {
    #[cfg(unix)]
    let signal = {
      use std::os::unix::process::ExitStatusExt;
      status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    Self {
      code: status.code(),
      signal,
    }
  }
}

impl fmt::Display for ExitInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.code, self.signal) {
      (Some(code), _) => write!(f, "exit code {}", code),
      (None, Some(signal)) => write!(f, "signal {}", signal),
      (None, None) => write!(f, "unknown exit status"),
    }
  }
}
