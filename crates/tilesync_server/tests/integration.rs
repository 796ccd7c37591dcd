//! End-to-end tests for the sync server.

use std::sync::Arc;
use tilesync_core::TileCoord;
use tilesync_protocol::{
    DownloadRequest, SyncMessage, UploadRequest, UploadResult, UploadResultCode,
};
use tilesync_server::{ServerConfig, SyncServer};
use tilesync_storage::{FileTileStore, TileStore};
use tilesync_testkit::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

fn memory_server(config: ServerConfig) -> SyncServer {
    SyncServer::new(config, seeded_memory_store(&[])).unwrap()
}

fn upload(coord: &TileCoord, timestamp: i64) -> UploadRequest {
    UploadRequest::new(coord, timestamp, payload_for(coord, 32))
}

fn drain(rx: &mut UnboundedReceiver<SyncMessage>) -> Vec<SyncMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn connect_pair(server: &SyncServer) -> (Uuid, Uuid) {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    // Dropped receivers only matter once tick runs.
    server.connect(a, "alice").unwrap();
    server.connect(b, "bob").unwrap();
    (a, b)
}

#[test]
fn later_upload_first_rejects_earlier() {
    let server = memory_server(ServerConfig::default());
    let (a, b) = connect_pair(&server);
    let coord = tile(3, 4);
    let (early, late) = (recent_timestamp(1000), recent_timestamp(500));

    let first = server.handle_upload(b, &upload(&coord, late)).unwrap();
    let second = server.handle_upload(a, &upload(&coord, early)).unwrap();

    assert_eq!(first.code, UploadResultCode::Accepted);
    assert_eq!(second.code, UploadResultCode::RejectedOutdated);
    assert_eq!(server.registry().timestamp(&coord), Some(late));
    assert_eq!(server.store().read_metadata(&coord).unwrap().unwrap().timestamp, late);
}

#[test]
fn earlier_upload_first_is_superseded() {
    let server = memory_server(ServerConfig::default());
    let (a, b) = connect_pair(&server);
    let coord = tile(3, 4);
    let (early, late) = (recent_timestamp(1000), recent_timestamp(500));

    let first = server.handle_upload(a, &upload(&coord, early)).unwrap();
    let second = server.handle_upload(b, &upload(&coord, late)).unwrap();

    assert!(first.code.is_accepted());
    assert!(second.code.is_accepted());
    assert_eq!(server.registry().timestamp(&coord), Some(late));
    assert!(!server.registry().is_newer(&coord, early));
}

#[test]
fn concurrent_uploads_resolve_to_latest() {
    for _ in 0..20 {
        let server = memory_server(ServerConfig::default());
        let (a, b) = connect_pair(&server);
        let coord = tile(0, 0);
        let (early, late) = (recent_timestamp(1000), recent_timestamp(500));
        let uploads = [(a, early), (b, late)];

        let run = run_concurrently(2, |i| {
            let (player, ts) = uploads[i];
            server.handle_upload(player, &upload(&coord, ts)).unwrap()
        });

        let accepted = run.count(|r: &UploadResult| r.code.is_accepted());
        assert!(accepted >= 1);
        if accepted == 1 {
            // Only the later upload may win alone.
            assert!(run.results[1].code.is_accepted());
            assert_eq!(run.results[0].code, UploadResultCode::RejectedOutdated);
        }
        assert_eq!(server.registry().timestamp(&coord), Some(late));
        assert_eq!(server.store().read_metadata(&coord).unwrap().unwrap().timestamp, late);
    }
}

#[test]
fn equal_timestamps_accept_exactly_one() {
    let server = memory_server(ServerConfig::default());
    let players: Vec<_> = (0..8)
        .map(|i| {
            let id = Uuid::new_v4();
            server.connect(id, &format!("p{i}")).unwrap();
            id
        })
        .collect();
    let coord = tile(1, 1);
    let ts = recent_timestamp(2000);

    let run = run_concurrently(players.len(), |i| {
        server.handle_upload(players[i], &upload(&coord, ts)).unwrap()
    });

    assert_eq!(run.count(|r| r.code == UploadResultCode::Accepted), 1);
    assert_eq!(run.count(|r| r.code == UploadResultCode::RejectedOutdated), 7);
}

#[test]
fn upload_racing_connect_reaches_new_session() {
    for _ in 0..50 {
        let server = memory_server(ServerConfig::default());
        let uploader = Uuid::new_v4();
        server.connect(uploader, "alice").unwrap();
        let coord = tile(6, 6);
        let ts = recent_timestamp(100);

        let run = run_concurrently(2, |i| {
            if i == 0 {
                Some(server.connect(Uuid::new_v4(), "bob").unwrap())
            } else {
                let result = server.handle_upload(uploader, &upload(&coord, ts)).unwrap();
                assert!(result.code.is_accepted());
                None
            }
        });
        let mut rx = run.results.into_iter().flatten().next().unwrap();

        let mut seen = false;
        for _ in 0..5 {
            server.tick();
            seen |= drain(&mut rx).iter().any(|message| match message {
                SyncMessage::RegistryPage(page) => page
                    .entries
                    .iter()
                    .any(|entry| entry.coord == coord && entry.timestamp == ts),
                SyncMessage::RegistryUpdate(entry) => {
                    entry.coord == coord && entry.timestamp == ts
                }
                _ => false,
            });
        }
        assert!(seen, "new session never learned of the concurrent upload");
    }
}

#[test]
fn accepted_upload_reaches_other_sessions_only() {
    let server = memory_server(ServerConfig::default());
    let (uploader, watcher) = (Uuid::new_v4(), Uuid::new_v4());
    let mut uploader_rx = server.connect(uploader, "alice").unwrap();
    let mut watcher_rx = server.connect(watcher, "bob").unwrap();
    drain(&mut uploader_rx);
    drain(&mut watcher_rx);

    let coord = nether_tile(-2, 9);
    let ts = recent_timestamp(100);
    let answer = server
        .handle_message(uploader, SyncMessage::UploadRequest(upload(&coord, ts)))
        .unwrap();
    assert!(matches!(answer, Some(SyncMessage::UploadResult(r)) if r.code.is_accepted()));

    assert!(drain(&mut uploader_rx).is_empty());
    match drain(&mut watcher_rx).as_slice() {
        [SyncMessage::RegistryUpdate(entry)] => {
            assert_eq!(entry.coord, coord);
            assert_eq!(entry.timestamp, ts);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn frames_round_trip_through_server() {
    let server = memory_server(ServerConfig::default());
    let player = Uuid::new_v4();
    let _rx = server.connect(player, "alice").unwrap();

    let frame = SyncMessage::UploadRequest(upload(&tile(0, 0), recent_timestamp(10)))
        .encode()
        .unwrap();
    let answer = server.handle_frame(player, &frame).unwrap().unwrap();
    match SyncMessage::decode(&answer).unwrap() {
        SyncMessage::UploadResult(result) => assert!(result.code.is_accepted()),
        other => panic!("unexpected {other:?}"),
    }

    assert!(server.handle_frame(player, &[0xff, 0x00]).is_err());
    assert!(server.is_connected(player));
}

#[test]
fn downloads_are_served_on_tick() {
    let store = seeded_memory_store(&[
        (tile(0, 0), 1_400_000_000_000),
        (tile(0, 1), 1_400_000_000_001),
    ]);
    let server = SyncServer::new(ServerConfig::default(), store).unwrap();
    let player = Uuid::new_v4();
    let mut rx = server.connect(player, "alice").unwrap();

    server
        .handle_message(
            player,
            SyncMessage::DownloadRequest(DownloadRequest::new(vec![tile(0, 1), tile(7, 7)])),
        )
        .unwrap();
    server.tick();

    let tiles: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|m| match m {
            SyncMessage::TileData(data) => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0].coord, tile(0, 1));
    assert_eq!(tiles[0].payload, payload_for(&tile(0, 1), 16));
}

#[test]
fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let coord = tile(12, -3);
    let ts = recent_timestamp(5000);

    {
        let server = SyncServer::open(ServerConfig::default(), dir.path()).unwrap();
        let player = Uuid::new_v4();
        let _rx = server.connect(player, "alice").unwrap();
        let result = server.handle_upload(player, &upload(&coord, ts)).unwrap();
        assert!(result.code.is_accepted());
    }

    let server = SyncServer::open(ServerConfig::default(), dir.path()).unwrap();
    assert_eq!(server.registry().timestamp(&coord), Some(ts));
    let info = server.tile_info(&coord).unwrap().unwrap();
    assert_eq!(info.payload_size, 32);
}

#[test]
fn second_server_cannot_share_a_root() {
    let dir = tempfile::tempdir().unwrap();
    let _first = SyncServer::open(ServerConfig::default(), dir.path()).unwrap();
    assert!(SyncServer::open(ServerConfig::default(), dir.path()).is_err());
}

#[test]
fn registry_pages_cover_populated_store() {
    let test_store = scenarios::populated_store(5);
    let store: Arc<FileTileStore> = Arc::clone(&test_store.store);
    let server = SyncServer::new(
        ServerConfig::default().with_registry_batch_size(7),
        store as Arc<dyn TileStore>,
    )
    .unwrap();
    let mut rx = server.connect(Uuid::new_v4(), "alice").unwrap();

    let mut entries = 0;
    let mut last_seen = false;
    for _ in 0..10 {
        server.tick();
        for message in drain(&mut rx) {
            if let SyncMessage::RegistryPage(page) = message {
                assert_eq!(page.total_batches, 4);
                entries += page.entries.len();
                last_seen |= page.is_last_batch;
            }
        }
        if last_seen {
            break;
        }
    }
    assert_eq!(entries, 25);
    assert!(last_seen);
}
