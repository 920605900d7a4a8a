//! End-to-end agent tests against a real coordinator on loopback TCP.
//!
//! The playback executable is a stub shell script, so these run on unix
//! only; the agent logic under test is identical everywhere.

#![cfg(unix)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::timeout;

use chorus_cd::Coordinator;
use chorus_common::proto::{BroadcastSubscriber, Command, CommandClient, Reply};
use chorus_common::TOPIC_NEW_SONG;
use chorus_pa::{Agent, OffsetHandle, PlayerCommand, RoundOutcome};

struct TestCoordinator {
    command: SocketAddr,
    broadcast: SocketAddr,
    root: tempfile::TempDir,
}

async fn start_coordinator() -> TestCoordinator {
    let root = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::bind(
        "127.0.0.1:0",
        "127.0.0.1:0",
        "127.0.0.1:0",
        root.path().to_path_buf(),
    )
    .await
    .unwrap();
    let handle = TestCoordinator {
        command: coordinator.command_addr().unwrap(),
        broadcast: coordinator.broadcast_addr().unwrap(),
        root,
    };
    tokio::spawn(coordinator.run());
    handle
}

fn fake_player(dir: &Path) -> PathBuf {
    let path = dir.join("fake-player");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn test_agent(c: &TestCoordinator, cache: &Path) -> (Agent, OffsetHandle) {
    let client = CommandClient::connect(&c.command.to_string()).await.unwrap();
    let offset = OffsetHandle::new();
    let player = PlayerCommand::new(fake_player(cache), vec![]);
    (
        Agent::new(client, offset.clone(), player, cache.to_path_buf()),
        offset,
    )
}

async fn publish(c: &TestCoordinator, name: &str, data: &[u8]) -> i64 {
    let mut client = CommandClient::connect(&c.command.to_string()).await.unwrap();
    let reply = client
        .request(&Command::Play {
            name: name.into(),
            data: data.to_vec(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Ok);
    match client.request(&Command::GetSong).await.unwrap() {
        Reply::CurrentSong { start_us, .. } => start_us,
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_sentinel_round_spawns_nothing() {
    let c = start_coordinator().await;
    let cache = tempfile::tempdir().unwrap();
    let (mut agent, _offset) = test_agent(&c, cache.path()).await;

    assert_eq!(agent.run_round().await.unwrap(), RoundOutcome::NoSong);
    assert!(agent.playback().is_none());
}

#[tokio::test]
async fn test_round_schedules_with_local_offset_applied() {
    let c = start_coordinator().await;
    let cache = tempfile::tempdir().unwrap();
    let (mut agent, offset) = test_agent(&c, cache.path()).await;

    // Estimator has concluded this agent runs 50us ahead of the reference.
    for _ in 0..5 {
        offset.push(50).await;
    }

    let start_us = publish(&c, "clip.wav", b"wav-bytes").await;
    match agent.run_round().await.unwrap() {
        RoundOutcome::Scheduled { local_start_us } => {
            assert_eq!(local_start_us, start_us + 50);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Exactly one child, and the cache copy is namespaced by our pid.
    assert!(agent.playback().is_some());
    let cached = agent.cache_path("clip.wav");
    assert_eq!(std::fs::read(&cached).unwrap(), b"wav-bytes");
    assert!(cached
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with(&format!("{}-", std::process::id())));
}

#[tokio::test]
async fn test_second_publish_preempts_first_child() {
    let c = start_coordinator().await;
    let cache = tempfile::tempdir().unwrap();
    let (mut agent, _offset) = test_agent(&c, cache.path()).await;

    publish(&c, "first.mp3", b"one").await;
    agent.run_round().await.unwrap();
    let first_pid = agent.playback().unwrap().id().unwrap();

    publish(&c, "second.mp3", b"two").await;
    agent.run_round().await.unwrap();
    let second_pid = agent.playback().unwrap().id().unwrap();

    assert_ne!(first_pid, second_pid);
    // The first child was killed and reaped before the second was spawned.
    #[cfg(target_os = "linux")]
    assert!(!Path::new(&format!("/proc/{}", first_pid)).exists());
}

#[tokio::test]
async fn test_fetch_failure_keeps_previous_playback() {
    let c = start_coordinator().await;
    let cache = tempfile::tempdir().unwrap();
    let (mut agent, _offset) = test_agent(&c, cache.path()).await;

    publish(&c, "keep.mp3", b"keep").await;
    agent.run_round().await.unwrap();
    let pid = agent.playback().unwrap().id().unwrap();

    // Publish again, then break the fetch by removing the canonical file.
    publish(&c, "gone.mp3", b"gone").await;
    std::fs::remove_file(c.root.path().join("gone.mp3")).unwrap();

    assert_eq!(agent.run_round().await.unwrap(), RoundOutcome::Skipped);
    assert_eq!(agent.playback().unwrap().id().unwrap(), pid);
}

#[tokio::test]
async fn test_broadcast_wakes_a_waiting_agent() {
    let c = start_coordinator().await;
    let mut subscriber = BroadcastSubscriber::connect(&c.broadcast.to_string(), TOPIC_NEW_SONG)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    publish(&c, "wake.mp3", b"x").await;

    let topic = timeout(Duration::from_secs(5), subscriber.next())
        .await
        .expect("broadcast should arrive")
        .unwrap();
    assert_eq!(topic, TOPIC_NEW_SONG);
}
