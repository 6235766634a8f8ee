#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use mplayer_slave::{Observer, PlayerClient, PlayerConfig, PlayerLauncher, Traffic};
use parking_lot::Mutex;

/// Shell stand-in for `mplayer -slave`: prints a banner, then answers a
/// handful of commands read from stdin.
const FAKE_PLAYER: &str = r#"
sleep "${STARTUP_DELAY:-0}"
echo "Initializing audio/video outputs" >&2
echo "MPlayer 1.5-12.2.0 (C) 2000-2022 MPlayer Team"
while IFS= read -r cmd; do
  case "$cmd" in
    "get_property volume") echo "ANS_volume=42" ;;
    "burst") printf 'ANS_burst=1\nANS_burst=2\nANS_burst=3\n' ;;
    "warn") echo "warning: no audio device" >&2 ;;
    "late") (sleep 0.15; echo "ANS_late=1") & ;;
    "split") printf 'ANS_spl'; sleep 0.1; printf 'it=1\n' ;;
    "title") printf 'ANS_title=Bj\303'; sleep 0.1; printf '\266rk\n' ;;
    "crash") exit 3 ;;
    "quit") exit 0 ;;
    "echo "*) printf '%s\n' "${cmd#echo }" ;;
  esac
done
"#;

pub fn fake_launcher() -> PlayerLauncher {
  fake_launcher_with_delay("0")
}

/// Fake player that waits `seconds` before printing its banner.
pub fn fake_launcher_with_delay(seconds: &str) -> PlayerLauncher {
  let script = format!("STARTUP_DELAY={}\n{}", seconds, FAKE_PLAYER);
  PlayerLauncher::custom("sh", ["-c".to_string(), script])
}

pub fn quiet() -> Observer {
  Arc::new(|_: Traffic<'_>| {})
}

pub fn client(config: PlayerConfig) -> PlayerClient {
  PlayerClient::with_launcher(fake_launcher(), &config, quiet())
}

pub fn default_client() -> PlayerClient {
  client(PlayerConfig::default())
}

/// Observer that records traffic as `sent: ...` / `<stream>: ...` strings.
pub fn recording_observer() -> (Observer, Arc<Mutex<Vec<String>>>) {
  let log = Arc::new(Mutex::new(Vec::new()));
  let sink = log.clone();
  let observer: Observer = Arc::new(move |traffic: Traffic<'_>| {
    let entry = match traffic {
      Traffic::Sent(line) => format!("sent: {}", line),
      Traffic::Received { stream, line } => format!("{}: {}", stream.as_str(), line),
    };
    sink.lock().push(entry);
  });
  (observer, log)
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(5);
  while !cond() {
    assert!(Instant::now() < deadline, "condition not met in time");
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}
