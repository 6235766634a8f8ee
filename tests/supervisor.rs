#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{default_client, fake_launcher_with_delay, quiet, recording_observer, wait_until};
use mplayer_slave::{PlayerClient, PlayerConfig, PlayerError, PlayerLauncher, ProcessError};

#[tokio::test]
async fn test_ready_after_banner() {
  let (observer, log) = recording_observer();
  let client = PlayerClient::with_launcher(common::fake_launcher(), &PlayerConfig::default(), observer);

  let process = client.ensure_ready().await.unwrap();
  assert!(process.is_alive());
  assert!(process.pid().is_some());
  assert!(client.supervisor().is_ready());
  assert!(client.supervisor().is_running());

  let log = log.lock().clone();
  assert!(
    log.iter().any(|l| l.starts_with("stdout: MPlayer 1.5")),
    "banner not observed: {:?}",
    log
  );

  client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ensure_ready_is_idempotent() {
  let client = default_client();
  let first = client.ensure_ready().await.unwrap();
  let second = client.ensure_ready().await.unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(first.id(), second.id());
  assert_eq!(first.pid(), second.pid());

  client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overlapping_ensure_ready_share_one_spawn() {
  let client = PlayerClient::with_launcher(
    fake_launcher_with_delay("0.2"),
    &PlayerConfig::default(),
    quiet(),
  );

  let (a, b) = tokio::join!(client.ensure_ready(), client.ensure_ready());
  let (a, b) = (a.unwrap(), b.unwrap());
  assert!(Arc::ptr_eq(&a, &b));
  assert_eq!(a.id(), 1);

  client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_without_process_does_not_spawn() {
  let client = default_client();
  client.shutdown().await.unwrap();
  assert!(client.supervisor().current().is_none());
  assert!(!client.supervisor().is_running());
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_allows_respawn() {
  let client = default_client();
  let first = client.ensure_ready().await.unwrap();

  client.shutdown().await.unwrap();
  assert!(!first.is_alive());
  assert!(!client.supervisor().is_running());
  assert!(!client.supervisor().is_ready());
  client.shutdown().await.unwrap();

  let second = client.ensure_ready().await.unwrap();
  assert_ne!(first.id(), second.id());
  assert_ne!(first.pid(), second.pid());

  client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exit_before_banner_fails_startup() {
  let launcher = PlayerLauncher::custom("sh", ["-c", "echo booting; exit 7"]);
  let client = PlayerClient::with_launcher(launcher, &PlayerConfig::default(), quiet());

  match client.ensure_ready().await {
    Err(PlayerError::Exited(info)) => assert_eq!(info.code, Some(7)),
    other => panic!("Expected exit before ready, got {:?}", other),
  }
  assert!(client.supervisor().current().is_none());
}

#[tokio::test]
async fn test_missing_executable_is_spawn_failure() {
  let config = PlayerConfig {
    player_path: Some("/nonexistent/bin/mplayer".into()),
    ..PlayerConfig::default()
  };
  let client = PlayerClient::new(&config);

  match client.ensure_ready().await {
    Err(PlayerError::Spawn(err)) => assert!(matches!(*err, ProcessError::SpawnFailed(_))),
    other => panic!("Expected spawn failure, got {:?}", other),
  }
}

#[tokio::test]
async fn test_unexpected_exit_while_idle_clears_state() {
  let client = default_client();
  let first = client.ensure_ready().await.unwrap();

  client.execute(["crash"]);
  wait_until(|| !client.supervisor().is_running()).await;
  assert!(!first.is_alive());
  assert!(client.supervisor().current().is_none());

  let second = client.ensure_ready().await.unwrap();
  assert_ne!(first.id(), second.id());
  assert!(second.is_alive());

  client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_execute_joins_tokens_with_spaces() {
  let (observer, log) = recording_observer();
  let client = PlayerClient::with_launcher(common::fake_launcher(), &PlayerConfig::default(), observer);

  let line: String = client
    .run_operation(
      |_| client.execute(["echo", "hello", "world"]),
      |line, verdict| {
        if line.starts_with("hello") {
          verdict.resolve(line.to_string());
        }
      },
    )
    .await
    .unwrap();

  assert_eq!(line, "hello world");
  assert!(log.lock().iter().any(|l| l == "sent: echo hello world"));

  client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_quit_lets_player_exit() {
  let client = default_client();
  client.ensure_ready().await.unwrap();

  client.quit().await.unwrap();
  assert!(!client.supervisor().is_running());

  // Nothing left to quit.
  client.quit().await.unwrap();
}

#[tokio::test]
async fn test_readers_released_when_grandchild_holds_pipes() {
  // The background sleep inherits stdout and outlives the player itself.
  let launcher = PlayerLauncher::custom(
    "sh",
    ["-c", "sleep 10 & echo 'MPlayer 1.5 (C) 2000-2022 MPlayer Team'; exec sleep 10"],
  );
  let client = PlayerClient::with_launcher(launcher, &PlayerConfig::default(), quiet());
  let process = client.ensure_ready().await.unwrap();

  client.shutdown().await.unwrap();
  assert!(!process.is_alive());

  // Reader and writer tasks hold the handle until they finish.
  wait_until(|| Arc::strong_count(&process) == 1).await;
}

#[tokio::test]
async fn test_set_player_path_applies_on_next_spawn() {
  let client = default_client();
  client.ensure_ready().await.unwrap();
  client.shutdown().await.unwrap();

  client.set_player_path(Some("/nonexistent/bin/mplayer".into()));
  let err = tokio::time::timeout(Duration::from_secs(5), client.ensure_ready())
    .await
    .unwrap()
    .unwrap_err();
  assert!(matches!(err, PlayerError::Spawn(_)), "got {:?}", err);
}
