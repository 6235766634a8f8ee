//! MPlayer slave-mode module - spawns and drives an external MPlayer over stdio.
//!
//! Architecture:
//! - `process.rs` - MPlayer binary detection, spawning, and signalling
//! - `protocol.rs` - Startup arguments, command formatting, and line splitting
//! - `ipc.rs` - Stdio reader/writer tasks and output fan-out to subscribers
//! - `supervisor.rs` - Process lifecycle: readiness, exit tracking, shutdown
//! - `operation.rs` - Classified request/response operations with timeouts
//! - `client.rs` - Config-driven facade over supervisor and executor

mod client;
mod error;
mod ipc;
mod operation;
mod process;
mod protocol;
mod supervisor;
mod traffic;

pub use client::PlayerClient;
pub use error::PlayerError;
pub use ipc::{PlayerProcess, Termination};
pub use operation::{
  timeout_from_millis, CommandSender, Isolation, OperationExecutor, Verdict, DEFAULT_TIMEOUT,
};
pub use process::{find_player, ExitInfo, PlayerLauncher, ProcessError};
pub use protocol::{
  format_command, LineMode, LineSplitter, OutputStream, READY_SIGNATURE, STARTUP_ARGS,
};
pub use supervisor::ProcessSupervisor;
pub use traffic::{log_observer, Observer, Traffic};
