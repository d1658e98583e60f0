//! Integration tests for the download engine.
//!
//! These tests drive full runs against mock HTTP servers and check the event
//! stream, the files on disk, and the engine's counters.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use playlist_downloader::download::{
    DownloadEngine, DownloadError, EngineConfig, EngineError, EngineEvent, EventReceiver,
    HttpClient, RunOutcome, TransferUnit,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Helper to create a mock server with GET file endpoints.
async fn setup_mock_files(files: &[(&str, Vec<u8>)]) -> MockServer {
    let mock_server = MockServer::start().await;
    for (path_str, content) in files {
        Mock::given(method("GET"))
            .and(path(*path_str))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
            .mount(&mock_server)
            .await;
    }
    mock_server
}

fn test_engine() -> DownloadEngine {
    DownloadEngine::new(
        HttpClient::new(),
        EngineConfig {
            cleanup_interval: Duration::from_millis(10),
            ..EngineConfig::default()
        },
    )
    .expect("default config is valid")
}

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn next_event(events: &mut EventReceiver) -> EngineEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an engine event")
        .expect("engine event channel closed")
}

/// Collects events until `Stopped`, inclusive.
async fn collect_run(events: &mut EventReceiver) -> Vec<EngineEvent> {
    let mut collected = Vec::new();
    loop {
        let event = next_event(events).await;
        let stopped = matches!(event, EngineEvent::Stopped { .. });
        collected.push(event);
        if stopped {
            return collected;
        }
    }
}

/// Skips events until one matches `pred`.
async fn wait_for(events: &mut EventReceiver, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn wait_until_exists(file: &Path) {
    for _ in 0..200 {
        if file.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} was never created", file.display());
}

/// How the raw HTTP server answers one path.
///
/// wiremock always announces the body length, so framing edge cases are
/// served by hand.
#[derive(Clone)]
struct RawRoute {
    /// Content-Length announced to HEAD, or `None` to answer 404.
    head_length: Option<u64>,
    /// Content-Length announced to GET, or `None` to send the body chunked.
    get_length: Option<u64>,
    body: Vec<u8>,
}

const RAW_NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

impl RawRoute {
    fn respond(&self, method: &str) -> Vec<u8> {
        let ok_with_length =
            |len: u64| format!("HTTP/1.1 200 OK\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n");
        if method == "HEAD" {
            return self
                .head_length
                .map_or_else(|| RAW_NOT_FOUND.to_vec(), |len| ok_with_length(len).into_bytes());
        }
        match self.get_length {
            Some(len) => {
                let mut out = ok_with_length(len).into_bytes();
                out.extend_from_slice(&self.body);
                out
            }
            None => {
                let mut out =
                    b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
                for chunk in self.body.chunks(1000) {
                    out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                    out.extend_from_slice(chunk);
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(b"0\r\n\r\n");
                out
            }
        }
    }
}

/// Serves `routes` over plain HTTP/1.1, one request per connection.
async fn spawn_raw_server(routes: Vec<(&'static str, RawRoute)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request).into_owned();
                let mut line = head.split_whitespace();
                let method = line.next().unwrap_or_default();
                let target = line.next().unwrap_or_default();
                let response = routes
                    .iter()
                    .find(|(p, _)| *p == target)
                    .map_or_else(|| RAW_NOT_FOUND.to_vec(), |(_, route)| route.respond(method));
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

fn progress_of(run: &[EngineEvent]) -> Vec<(u64, u64)> {
    run.iter()
        .filter_map(|e| match e {
            EngineEvent::ProgressChanged(p) => Some((p.total_transferred, p.total_size)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_single_unit_reports_chunked_progress_then_completes() {
    let content = body(10_000);
    let mock_server = setup_mock_files(&[("/clip.mp4", content.clone())]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("clip.mp4");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(&target, format!("{}/clip.mp4", mock_server.uri()))])
        .unwrap();
    engine.start().unwrap();

    let run = collect_run(&mut events).await;

    assert!(matches!(run.first(), Some(EngineEvent::Started)));
    let progress: Vec<u64> = run
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ProgressChanged(p) => Some(p.total_transferred),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![4096, 8192, 10_000]);

    let tail: Vec<&EngineEvent> = run
        .iter()
        .skip_while(|e| !matches!(e, EngineEvent::FileDownloadSucceeded(_)))
        .collect();
    assert_eq!(tail.len(), 4, "unexpected tail: {tail:?}");
    assert!(matches!(tail[1], EngineEvent::FileDownloadComplete(_)));
    assert!(matches!(tail[2], EngineEvent::Completed));
    assert!(matches!(
        tail[3],
        EngineEvent::Stopped {
            outcome: RunOutcome::Succeeded
        }
    ));

    assert!(!engine.is_busy());
    assert_eq!(engine.total_size(), 10_000);
    assert_eq!(engine.total_transferred(), 10_000);
    assert!((engine.total_percentage() - 100.0).abs() < f64::EPSILON);
    assert_eq!(engine.last_outcome(), Some(RunOutcome::Succeeded));
    assert!(engine.files()[0].finished);
    assert_eq!(std::fs::read(&target).unwrap(), content);
}

#[tokio::test]
async fn test_failed_probe_is_reconciled_from_stream_length() {
    let mock_server = setup_mock_files(&[("/clip.mp4", body(5000))]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(
            temp_dir.path().join("clip.mp4"),
            format!("{}/clip.mp4", mock_server.uri()),
        )])
        .unwrap();
    engine.start().unwrap();

    let run = collect_run(&mut events).await;
    let totals: Vec<u64> = run
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CalculatedTotalFileSize { total_size } => Some(*total_size),
            _ => None,
        })
        .collect();

    // HEAD is not mounted, so the probe answers 404 and the size is learned from the GET.
    assert_eq!(totals, vec![0, 5000]);
    assert_eq!(engine.files()[0].total_size, 5000);
    assert_eq!(engine.last_outcome(), Some(RunOutcome::Succeeded));
}

#[tokio::test]
async fn test_failed_unit_does_not_stop_the_batch() {
    let content = body(3000);
    let mock_server = setup_mock_files(&[("/second.mp4", content.clone())]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let second = temp_dir.path().join("second.mp4");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![
            TransferUnit::new(
                temp_dir.path().join("first.mp4"),
                format!("{}/missing.mp4", mock_server.uri()),
            ),
            TransferUnit::new(&second, format!("{}/second.mp4", mock_server.uri())),
        ])
        .unwrap();
    engine.start().unwrap();

    let run = collect_run(&mut events).await;

    let failed = run
        .iter()
        .find_map(|e| match e {
            EngineEvent::FileDownloadFailed { error, unit } => Some((error.clone(), unit.clone())),
            _ => None,
        })
        .expect("first unit should fail");
    assert!(matches!(*failed.0, DownloadError::HttpStatus { status: 404, .. }));
    assert!(failed.1.url.ends_with("/missing.mp4"));

    let succeeded = run
        .iter()
        .filter(|e| matches!(e, EngineEvent::FileDownloadSucceeded(_)))
        .count();
    let completes = run
        .iter()
        .filter(|e| matches!(e, EngineEvent::FileDownloadComplete(_)))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(completes, 2);
    assert!(run.iter().any(|e| matches!(e, EngineEvent::Completed)));
    assert!(matches!(
        run.last(),
        Some(EngineEvent::Stopped {
            outcome: RunOutcome::Failed
        })
    ));
    assert_eq!(std::fs::read(&second).unwrap(), content);
}

#[tokio::test]
async fn test_pause_holds_transfer_until_resume() {
    let mock_server = setup_mock_files(&[("/clip.mp4", body(20_000))]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("clip.mp4");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(&target, format!("{}/clip.mp4", mock_server.uri()))])
        .unwrap();
    engine.start().unwrap();
    engine.pause();

    assert!(engine.is_paused());
    assert!(engine.can_resume());
    assert!(!engine.can_pause());

    wait_until_exists(&target).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut held = Vec::new();
    while let Ok(event) = events.try_recv() {
        held.push(event);
    }
    assert!(held.iter().any(|e| matches!(e, EngineEvent::Paused)));
    assert!(
        !held.iter().any(|e| matches!(e, EngineEvent::ProgressChanged(_))),
        "no chunk may be written while paused: {held:?}"
    );
    assert_eq!(engine.total_transferred(), 0);
    assert!(engine.current_file().is_some());

    engine.resume();
    let run = collect_run(&mut events).await;

    let resumed_at = run
        .iter()
        .position(|e| matches!(e, EngineEvent::Resumed))
        .expect("resume should be reported");
    let first_chunk_at = run
        .iter()
        .position(|e| matches!(e, EngineEvent::ProgressChanged(_)))
        .expect("chunks should follow the resume");
    assert!(resumed_at < first_chunk_at);
    assert!(matches!(
        run.last(),
        Some(EngineEvent::Stopped {
            outcome: RunOutcome::Succeeded
        })
    ));
    assert_eq!(engine.total_transferred(), 20_000);
    assert!(!engine.is_paused());
}

#[tokio::test]
async fn test_stop_with_delete_removes_unfinished_files() {
    let mock_server = setup_mock_files(&[
        ("/clip_audio.mp4", body(8000)),
        ("/clip_video.mp4", body(8000)),
    ])
    .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let audio = temp_dir.path().join("nested").join("clip_audio.mp4");
    let video = temp_dir.path().join("nested").join("clip_video.mp4");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![
            TransferUnit::new(&audio, format!("{}/clip_audio.mp4", mock_server.uri())),
            TransferUnit::new(&video, format!("{}/clip_video.mp4", mock_server.uri())),
        ])
        .unwrap();
    engine.start().unwrap();
    engine.pause();
    wait_until_exists(&audio).await;

    engine.stop(true);
    engine.stop(true);

    let run = collect_run(&mut events).await;
    let canceled = run
        .iter()
        .filter(|e| matches!(e, EngineEvent::Canceled))
        .count();
    assert_eq!(canceled, 1);
    assert!(!run.iter().any(|e| matches!(e, EngineEvent::Completed)));
    assert!(!run.iter().any(|e| matches!(e, EngineEvent::FileDownloadSucceeded(_))));
    assert!(matches!(
        run.last(),
        Some(EngineEvent::Stopped {
            outcome: RunOutcome::Canceled
        })
    ));

    let abandoned = engine.wait_for_cleanup().await;
    assert!(abandoned.is_empty());
    assert!(!audio.exists());
    assert!(!video.exists());
    assert!(engine.was_canceled());
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn test_stop_without_delete_keeps_partial_file() {
    let mock_server = setup_mock_files(&[("/clip.mp4", body(8000))]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("clip.mp4");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(&target, format!("{}/clip.mp4", mock_server.uri()))])
        .unwrap();
    engine.start().unwrap();
    engine.pause();
    wait_until_exists(&target).await;

    engine.stop(false);
    wait_for(&mut events, |e| matches!(e, EngineEvent::Stopped { .. })).await;

    assert!(engine.wait_for_cleanup().await.is_empty());
    assert!(target.exists());
}

#[tokio::test]
async fn test_batch_is_locked_while_busy_and_reusable_after() {
    let mock_server = setup_mock_files(&[("/a.mp4", body(1000)), ("/b.mp4", body(2000))]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(
            temp_dir.path().join("a.mp4"),
            format!("{}/a.mp4", mock_server.uri()),
        )])
        .unwrap();
    engine.start().unwrap();

    let extra = TransferUnit::new(temp_dir.path().join("b.mp4"), format!("{}/b.mp4", mock_server.uri()));
    assert!(matches!(
        engine.add_files(vec![extra.clone()]),
        Err(EngineError::InvalidState { .. })
    ));
    assert!(matches!(engine.clear_files(), Err(EngineError::InvalidState { .. })));
    assert!(matches!(engine.start(), Err(EngineError::InvalidState { .. })));
    assert!(!engine.can_start());

    wait_for(&mut events, |e| matches!(e, EngineEvent::Stopped { .. })).await;

    engine.clear_files().unwrap();
    engine.add_files(vec![extra]).unwrap();
    assert!(engine.can_start());
    engine.start().unwrap();
    let run = collect_run(&mut events).await;

    assert!(matches!(
        run.last(),
        Some(EngineEvent::Stopped {
            outcome: RunOutcome::Succeeded
        })
    ));
    assert_eq!(engine.total_transferred(), 2000);
    assert_eq!(engine.files().len(), 1);
}

#[tokio::test]
async fn test_body_shorter_than_announced_fails_integrity() {
    let base = spawn_raw_server(vec![(
        "/short.mp4",
        RawRoute {
            head_length: Some(20_000),
            get_length: None,
            body: body(5000),
        },
    )])
    .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("short.mp4");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(&target, format!("{base}/short.mp4"))])
        .unwrap();
    engine.start().unwrap();
    let run = collect_run(&mut events).await;

    let error = run
        .iter()
        .find_map(|e| match e {
            EngineEvent::FileDownloadFailed { error, .. } => Some(Arc::clone(error)),
            _ => None,
        })
        .expect("truncated unit should fail");
    assert!(
        matches!(
            *error,
            DownloadError::Integrity {
                expected_bytes: 20_000,
                actual_bytes: 5000,
                ..
            }
        ),
        "unexpected error: {error}"
    );
    assert!(!run.iter().any(|e| matches!(e, EngineEvent::FileDownloadSucceeded(_))));
    assert!(matches!(
        run.last(),
        Some(EngineEvent::Stopped {
            outcome: RunOutcome::Failed
        })
    ));
    assert!(!engine.files()[0].finished);
    assert_eq!(engine.total_transferred(), 5000);
}

#[tokio::test]
async fn test_unknown_length_grows_total_as_bytes_arrive() {
    let content = body(10_000);
    let base = spawn_raw_server(vec![(
        "/live.ts",
        RawRoute {
            head_length: None,
            get_length: None,
            body: content.clone(),
        },
    )])
    .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("live.ts");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![TransferUnit::new(&target, format!("{base}/live.ts"))])
        .unwrap();
    engine.start().unwrap();
    let run = collect_run(&mut events).await;

    assert!(run
        .iter()
        .any(|e| matches!(e, EngineEvent::CalculatedTotalFileSize { total_size: 0 })));
    assert_eq!(
        progress_of(&run),
        vec![(4096, 4096), (8192, 8192), (10_000, 10_000)]
    );
    let unit_sizes: Vec<(u64, u64)> = run
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ProgressChanged(p) => Some((p.unit_transferred, p.unit_size)),
            _ => None,
        })
        .collect();
    assert!(unit_sizes.iter().all(|(done, size)| done == size), "{unit_sizes:?}");

    assert_eq!(engine.last_outcome(), Some(RunOutcome::Succeeded));
    assert_eq!(engine.total_size(), 10_000);
    assert_eq!(engine.files()[0].total_size, 10_000);
    assert!(engine.files()[0].finished);
    assert_eq!(std::fs::read(&target).unwrap(), content);
}

#[tokio::test]
async fn test_progress_stays_monotonic_and_bounded_across_reconciled_units() {
    let base = spawn_raw_server(vec![
        (
            "/known.mp4",
            RawRoute {
                head_length: Some(3000),
                get_length: Some(3000),
                body: body(3000),
            },
        ),
        (
            "/unprobed.mp4",
            RawRoute {
                head_length: None,
                get_length: Some(5000),
                body: body(5000),
            },
        ),
    ])
    .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let engine = test_engine();
    let mut events = engine.subscribe();
    engine
        .add_files(vec![
            TransferUnit::new(temp_dir.path().join("known.mp4"), format!("{base}/known.mp4")),
            TransferUnit::new(temp_dir.path().join("unprobed.mp4"), format!("{base}/unprobed.mp4")),
        ])
        .unwrap();
    engine.start().unwrap();
    let run = collect_run(&mut events).await;

    let totals: Vec<u64> = run
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CalculatedTotalFileSize { total_size } => Some(*total_size),
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![3000, 8000]);

    let progress = progress_of(&run);
    assert!(!progress.is_empty());
    assert!(
        progress.windows(2).all(|w| w[0].0 <= w[1].0),
        "transferred went backwards: {progress:?}"
    );
    assert!(
        progress.iter().all(|(done, total)| done <= total),
        "transferred exceeded total: {progress:?}"
    );
    assert_eq!(progress.last(), Some(&(8000, 8000)));
    assert_eq!(engine.last_outcome(), Some(RunOutcome::Succeeded));
}
