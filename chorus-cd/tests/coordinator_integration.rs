//! Integration tests for the coordinator daemon over loopback TCP.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use chorus_cd::Coordinator;
use chorus_common::proto::{
    read_message, write_message, BroadcastSubscriber, Command, CommandClient, Reply,
};
use chorus_common::{clock, time, LEAD_US, TOPIC_NEW_SONG};

struct TestCoordinator {
    clock: SocketAddr,
    command: SocketAddr,
    broadcast: SocketAddr,
    _root: tempfile::TempDir,
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
        clock: coordinator.clock_addr().unwrap(),
        command: coordinator.command_addr().unwrap(),
        broadcast: coordinator.broadcast_addr().unwrap(),
        _root: root,
    };
    tokio::spawn(coordinator.run());
    handle
}

async fn command_client(c: &TestCoordinator) -> CommandClient {
    CommandClient::connect(&c.command.to_string()).await.unwrap()
}

#[tokio::test]
async fn test_query_before_any_publish_returns_sentinel() {
    let c = start_coordinator().await;
    let mut client = command_client(&c).await;
    let reply = client.request(&Command::GetSong).await.unwrap();
    assert_eq!(
        reply,
        Reply::CurrentSong {
            name: String::new(),
            start_us: 0
        }
    );
}

#[tokio::test]
async fn test_publish_then_query_schedules_with_lead() {
    let c = start_coordinator().await;
    let mut client = command_client(&c).await;

    let before = time::now_us();
    let reply = client
        .request(&Command::Play {
            name: "a.mp3".into(),
            data: b"payload".to_vec(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Ok);

    match client.request(&Command::GetSong).await.unwrap() {
        Reply::CurrentSong { name, start_us } => {
            assert_eq!(name, "a.mp3");
            assert!(start_us >= before + LEAD_US);
            // Small positive epsilon for processing.
            assert!(start_us <= time::now_us() + LEAD_US);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_second_publish_fully_overwrites_first() {
    let c = start_coordinator().await;
    let mut client = command_client(&c).await;

    client
        .request(&Command::Play {
            name: "a.mp3".into(),
            data: b"first".to_vec(),
        })
        .await
        .unwrap();
    let first_start = match client.request(&Command::GetSong).await.unwrap() {
        Reply::CurrentSong { start_us, .. } => start_us,
        other => panic!("unexpected reply: {:?}", other),
    };

    client
        .request(&Command::Play {
            name: "b.mp3".into(),
            data: b"second".to_vec(),
        })
        .await
        .unwrap();
    match client.request(&Command::GetSong).await.unwrap() {
        Reply::CurrentSong { name, start_us } => {
            assert_eq!(name, "b.mp3");
            assert!(start_us >= first_start);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_round_trips_published_bytes() {
    let c = start_coordinator().await;
    let mut client = command_client(&c).await;

    let data: Vec<u8> = (0u16..2048).map(|v| (v % 251) as u8).collect();
    client
        .request(&Command::Play {
            name: "clip.wav".into(),
            data: data.clone(),
        })
        .await
        .unwrap();
    let reply = client
        .request(&Command::GetFile {
            name: "clip.wav".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::File { data });
}

#[tokio::test]
async fn test_fetch_unknown_file_replies_promptly() {
    let c = start_coordinator().await;
    let mut client = command_client(&c).await;
    let reply = timeout(
        Duration::from_secs(5),
        client.request(&Command::GetFile {
            name: "never-published.mp3".into(),
        }),
    )
    .await
    .expect("unknown-file fetch must not hang")
    .unwrap();
    assert_eq!(reply, Reply::UnknownFile);
}

#[tokio::test]
async fn test_wrong_arity_yields_bad_format_and_no_state_change() {
    let c = start_coordinator().await;
    let mut raw = TcpStream::connect(c.command).await.unwrap();

    // "play" with a missing payload frame.
    write_message(&mut raw, &[b"play", b"a.mp3"]).await.unwrap();
    let frames = read_message(&mut raw).await.unwrap();
    assert_eq!(frames, vec![b"bad format".to_vec()]);

    // "get song" with a stray extra frame.
    write_message(&mut raw, &[b"get song", b"extra"]).await.unwrap();
    let frames = read_message(&mut raw).await.unwrap();
    assert_eq!(frames, vec![b"bad format".to_vec()]);

    // State must still be the sentinel.
    let mut client = command_client(&c).await;
    assert_eq!(
        client.request(&Command::GetSong).await.unwrap(),
        Reply::CurrentSong {
            name: String::new(),
            start_us: 0
        }
    );
}

#[tokio::test]
async fn test_unknown_verb_still_gets_exactly_one_reply() {
    let c = start_coordinator().await;
    let mut raw = TcpStream::connect(c.command).await.unwrap();
    write_message(&mut raw, &[b"pause"]).await.unwrap();
    let frames = read_message(&mut raw).await.unwrap();
    assert_eq!(frames, vec![b"bad format".to_vec()]);

    // The connection stays usable in lockstep afterwards.
    write_message(&mut raw, &[b"get song"]).await.unwrap();
    let frames = read_message(&mut raw).await.unwrap();
    assert_eq!(frames[0], b"ok".to_vec());
}

#[tokio::test]
async fn test_subscriber_receives_new_song_notification() {
    let c = start_coordinator().await;
    let mut sub = BroadcastSubscriber::connect(&c.broadcast.to_string(), TOPIC_NEW_SONG)
        .await
        .unwrap();
    // Give the forwarder a moment to install the filter.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = command_client(&c).await;
    client
        .request(&Command::Play {
            name: "a.mp3".into(),
            data: b"x".to_vec(),
        })
        .await
        .unwrap();

    let topic = timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("notification should arrive")
        .unwrap();
    assert_eq!(topic, TOPIC_NEW_SONG);
}

#[tokio::test]
async fn test_slow_joiner_misses_earlier_notification() {
    let c = start_coordinator().await;
    let mut client = command_client(&c).await;
    client
        .request(&Command::Play {
            name: "a.mp3".into(),
            data: b"x".to_vec(),
        })
        .await
        .unwrap();

    // Subscribe only after the publish: the notification is gone for good.
    let mut sub = BroadcastSubscriber::connect(&c.broadcast.to_string(), TOPIC_NEW_SONG)
        .await
        .unwrap();
    assert!(timeout(Duration::from_millis(300), sub.next()).await.is_err());
}

#[tokio::test]
async fn test_non_matching_topic_filter_receives_nothing() {
    let c = start_coordinator().await;
    let mut sub = BroadcastSubscriber::connect(&c.broadcast.to_string(), "other topic")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = command_client(&c).await;
    client
        .request(&Command::Play {
            name: "a.mp3".into(),
            data: b"x".to_vec(),
        })
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(300), sub.next()).await.is_err());
}

#[tokio::test]
async fn test_clock_probe_returns_reference_reading() {
    let c = start_coordinator().await;
    let mut stream = TcpStream::connect(c.clock).await.unwrap();

    // Same machine, so the reference reading brackets between our own
    // before/after readings.
    for _ in 0..3 {
        let before = time::now_us();
        let reading = clock::probe(&mut stream).await.unwrap();
        let after = time::now_us();
        assert!(reading >= before && reading <= after);
    }
}
