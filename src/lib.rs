//! Supervises a long-running MPlayer process in slave mode and runs
//! request/response operations over its stdin/stdout/stderr.
//!
//! Callers describe an operation as a command-emission callback plus a line
//! classifier; the crate spawns the player on demand, waits for its startup
//! banner, subscribes to its output, and settles each operation on the first
//! classifier verdict, timeout, or player exit.
//!
//! ```no_run
//! use mplayer_slave::{PlayerClient, PlayerConfig};
//!
//! # async fn demo() -> Result<(), mplayer_slave::PlayerError> {
//! let client = PlayerClient::new(&PlayerConfig::default());
//! let volume: u32 = client
//!   .run_operation(
//!     |tx| tx.send(["get_property", "volume"]),
//!     |line, verdict| {
//!       if let Some(value) = line.strip_prefix("ANS_volume=") {
//!         match value.trim().parse::<f64>() {
//!           Ok(v) => verdict.resolve(v as u32),
//!           Err(_) => verdict.reject(format!("bad volume: {}", value)),
//!         }
//!       }
//!     },
//!   )
//!   .await?;
//! println!("volume: {}", volume);
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod player;

pub use config::{ConfigError, PlayerConfig};
pub use player::*;
