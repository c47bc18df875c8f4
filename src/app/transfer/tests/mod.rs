//! Transfer manager scenarios against a mock origin

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::app::client::{ClientConfig, PacedClient};
use crate::app::enumerator::{enumerate_tasks, DateRange, EnumeratorConfig};
use crate::app::ledger::{Ledger, LedgerConfig};
use crate::app::models::{TransferState, TransferStatus, TransferTask};

const MAX_RETRIES: u32 = 3;

struct Harness {
    server: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    fn base_url(&self) -> Url {
        Url::parse(&format!("{}/games/", self.server.uri())).unwrap()
    }

    fn tasks(&self, start: &str, end: &str) -> Vec<TransferTask> {
        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let range = DateRange::new(date(start), date(end)).unwrap();
        let config = EnumeratorConfig {
            base_url: self.base_url(),
            download_dir: self.dir.path().to_path_buf(),
            ..Default::default()
        };
        enumerate_tasks(&range, &config).unwrap()
    }

    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::in_download_dir(self.dir.path())
    }

    fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            download_dir: self.dir.path().to_path_buf(),
            max_retries: MAX_RETRIES,
            stall_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn manager(&self) -> TransferManager {
        self.manager_with(self.transfer_config())
    }

    /// Manager over the on-disk ledger, one transport attempt per pass
    fn manager_with(&self, config: TransferConfig) -> TransferManager {
        let client = PacedClient::new(ClientConfig {
            base_url: self.base_url(),
            min_delay: Duration::from_millis(1),
            max_attempts: 1,
            backoff_ceiling: 2,
            response_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap();
        let ledger = Ledger::load(self.ledger_config()).unwrap();
        TransferManager::new(config, ledger, client)
    }

    fn archive(&self, id: &str) -> std::path::PathBuf {
        self.dir.path().join(format!("{}sgfs.tar.bz2", id))
    }

    fn state(&self, id: &str) -> TransferState {
        Ledger::load(self.ledger_config())
            .unwrap()
            .get(id)
            .cloned()
            .unwrap()
    }

    async fn serve(&self, id: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/games/{}sgfs.tar.bz2", id)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap().len()
    }
}

fn seed_ledger(config: LedgerConfig, id: &str, state: TransferState) {
    let mut ledger = Ledger::load(config).unwrap();
    ledger.set(id, state).unwrap();
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

#[tokio::test]
async fn test_throttled_archive_fails_after_retry_budget() {
    let h = Harness::start().await;
    h.serve("2021-01-01", b"first archive").await;
    h.serve("2021-01-02", b"second archive").await;
    Mock::given(method("GET"))
        .and(path("/games/2021-01-03sgfs.tar.bz2"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&h.server)
        .await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-03")).await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 2);

    assert_eq!(h.state("2021-01-01").status, TransferStatus::Completed);
    assert_eq!(h.state("2021-01-02").status, TransferStatus::Completed);
    let failed = h.state("2021-01-03");
    assert_eq!(failed.status, TransferStatus::Failed);
    assert_eq!(failed.retry_count, MAX_RETRIES);
    assert!(failed.last_error.is_some());

    assert_eq!(fs::read(h.archive("2021-01-01")).unwrap(), b"first archive");
    assert_eq!(h.request_count().await, 5);
}

#[tokio::test]
async fn test_completed_run_sends_no_requests() {
    let h = Harness::start().await;
    h.serve("2021-01-01", b"aaaa").await;
    h.serve("2021-01-02", b"bbbbbb").await;

    let mut manager = h.manager();
    let first = manager.run(h.tasks("2021-01-01", "2021-01-02")).await.unwrap();
    assert_eq!(first.completed, 2);
    assert_eq!(first.bytes_transferred, 10);
    let sent = h.request_count().await;

    let mut manager = h.manager();
    let second = manager.run(h.tasks("2021-01-01", "2021-01-02")).await.unwrap();
    assert_eq!(second.already_complete, 2);
    assert_eq!(second.completed, 0);
    assert_eq!(second.requests_sent, 0);
    assert_eq!(h.request_count().await, sent);
}

#[tokio::test]
async fn test_full_file_with_known_total_needs_no_request() {
    let h = Harness::start().await;
    fs::write(h.archive("2021-01-01"), vec![7u8; 64]).unwrap();
    seed_ledger(
        h.ledger_config(),
        "2021-01-01",
        TransferState {
            status: TransferStatus::InProgress,
            bytes_downloaded: 32,
            total_bytes: Some(64),
            ..TransferState::pending()
        },
    );

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.requests_sent, 0);
    let state = h.state("2021-01-01");
    assert_eq!(state.status, TransferStatus::Completed);
    assert_eq!(state.bytes_downloaded, 64);
}

#[tokio::test]
async fn test_resume_requests_remaining_bytes() {
    let h = Harness::start().await;
    fs::write(h.archive("2021-01-01"), b"01234").unwrap();
    Mock::given(method("GET"))
        .and(path("/games/2021-01-01sgfs.tar.bz2"))
        .and(header("range", "bytes=5-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 5-9/10")
                .set_body_bytes(b"56789".to_vec()),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.bytes_transferred, 5);
    assert_eq!(fs::read(h.archive("2021-01-01")).unwrap(), b"0123456789");
    let state = h.state("2021-01-01");
    assert_eq!(state.total_bytes, Some(10));
    assert_eq!(state.bytes_downloaded, 10);
}

#[tokio::test]
async fn test_range_ignored_rewrites_file() {
    let h = Harness::start().await;
    fs::write(h.archive("2021-01-01"), b"stale").unwrap();
    h.serve("2021-01-01", b"fresh content").await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(fs::read(h.archive("2021-01-01")).unwrap(), b"fresh content");
}

#[tokio::test]
async fn test_oversized_partial_restarts_from_zero() {
    let h = Harness::start().await;
    fs::write(h.archive("2021-01-01"), vec![0u8; 20]).unwrap();
    seed_ledger(
        h.ledger_config(),
        "2021-01-01",
        TransferState {
            status: TransferStatus::InProgress,
            bytes_downloaded: 20,
            total_bytes: Some(8),
            ..TransferState::pending()
        },
    );
    h.serve("2021-01-01", b"12345678").await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(file_len(&h.archive("2021-01-01")), 8);
    assert_eq!(h.state("2021-01-01").retry_count, 0);

    let requests = h.server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("range"));
}

#[tokio::test]
async fn test_range_not_satisfiable_at_total_completes() {
    let h = Harness::start().await;
    fs::write(h.archive("2021-01-01"), b"0123456789").unwrap();
    Mock::given(method("GET"))
        .and(header("range", "bytes=10-"))
        .respond_with(ResponseTemplate::new(416).insert_header("Content-Range", "bytes */10"))
        .mount(&h.server)
        .await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.completed, 1);
    let state = h.state("2021-01-01");
    assert_eq!(state.status, TransferStatus::Completed);
    assert_eq!(state.total_bytes, Some(10));
}

#[tokio::test]
async fn test_zero_length_archive_completes() {
    let h = Harness::start().await;
    h.serve("2021-01-01", b"").await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert!(h.archive("2021-01-01").is_file());
    assert_eq!(file_len(&h.archive("2021-01-01")), 0);
    assert_eq!(h.state("2021-01-01").total_bytes, Some(0));
}

#[tokio::test]
async fn test_missing_archive_fails_immediately() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(h.request_count().await, 1);

    let state = h.state("2021-01-01");
    assert_eq!(state.status, TransferStatus::Failed);
    assert_eq!(state.retry_count, MAX_RETRIES);
    assert!(state.last_error.unwrap().contains("404"));
}

#[tokio::test]
async fn test_failed_skipped_unless_forced() {
    let h = Harness::start().await;
    h.serve("2021-01-01", b"now available").await;
    let mut failed = TransferState::pending();
    failed.record_permanent_failure("HTTP 404".to_string(), MAX_RETRIES);
    seed_ledger(h.ledger_config(), "2021-01-01", failed);

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();
    assert_eq!(summary.skipped_failed, 1);
    assert_eq!(h.request_count().await, 0);

    let mut manager = h.manager_with(TransferConfig {
        force_retry: true,
        ..h.transfer_config()
    });
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();
    assert_eq!(summary.completed, 1);
    let state = h.state("2021-01-01");
    assert_eq!(state.status, TransferStatus::Completed);
    assert_eq!(state.retry_count, 0);
}

#[tokio::test]
async fn test_completed_entry_with_missing_file_is_refetched() {
    let h = Harness::start().await;
    h.serve("2021-01-01", b"abc").await;
    let mut done = TransferState::pending();
    done.mark_completed(3);
    seed_ledger(h.ledger_config(), "2021-01-01", done);

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    assert_eq!(summary.already_complete, 0);
    assert_eq!(summary.completed, 1);
    assert_eq!(fs::read(h.archive("2021-01-01")).unwrap(), b"abc");
}

#[tokio::test]
async fn test_short_body_is_size_mismatch() {
    let h = Harness::start().await;
    fs::write(h.archive("2021-01-01"), b"01234").unwrap();
    // Claims ten bytes in total but sends only two after the offset
    Mock::given(method("GET"))
        .and(header("range", "bytes=5-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 5-9/10")
                .set_body_bytes(b"56".to_vec()),
        )
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    h.serve("2021-01-01", b"0123456789").await;

    let mut manager = h.manager();
    let summary = manager.run(h.tasks("2021-01-01", "2021-01-01")).await.unwrap();

    // Partial discarded, one retry consumed, second pass starts from zero
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(fs::read(h.archive("2021-01-01")).unwrap(), b"0123456789");
    assert_eq!(h.state("2021-01-01").retry_count, 1);
}

#[tokio::test]
async fn test_ledger_entries_outside_range_are_kept() {
    let h = Harness::start().await;
    h.serve("2021-01-02", b"x").await;
    let mut done = TransferState::pending();
    done.mark_completed(1);
    seed_ledger(h.ledger_config(), "2020-12-31", done.clone());

    let mut manager = h.manager();
    manager.run(h.tasks("2021-01-02", "2021-01-02")).await.unwrap();

    let ledger = manager.into_ledger();
    assert_eq!(ledger.get("2020-12-31"), Some(&done));
    assert_eq!(ledger.len(), 2);
}

/// Origin that drops the first connection halfway through the body and
/// honours `Range` on every later one
async fn spawn_truncating_origin(
    body: &'static [u8],
) -> (Url, tokio::task::JoinHandle<Vec<String>>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for connection in 0..2 {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let request = String::from_utf8_lossy(&raw).to_lowercase();
            let offset = request
                .lines()
                .find_map(|l| l.strip_prefix("range: bytes="))
                .and_then(|r| r.trim().trim_end_matches('-').parse::<usize>().ok())
                .unwrap_or(0);
            requests.push(request);

            if connection == 0 {
                // Promise the whole body, deliver half of it, hang up
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(&body[..body.len() / 2]).await.unwrap();
                socket.flush().await.unwrap();
            } else {
                let rest = &body[offset..];
                let head = if offset > 0 {
                    format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                        rest.len(),
                        offset,
                        body.len() - 1,
                        body.len()
                    )
                } else {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        rest.len()
                    )
                };
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(rest).await.unwrap();
                socket.flush().await.unwrap();
            }
            let _ = socket.shutdown().await;
        }
        requests
    });

    (Url::parse(&format!("http://{}/games/", addr)).unwrap(), handle)
}

#[tokio::test]
async fn test_broken_body_resumes_without_duplicated_bytes() {
    const BODY: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let dir = TempDir::new().unwrap();
    let (base_url, origin) = spawn_truncating_origin(BODY).await;

    let date = NaiveDate::parse_from_str("2021-01-01", "%Y-%m-%d").unwrap();
    let task = TransferTask::for_date(date, &base_url, dir.path()).unwrap();
    let destination = task.destination.clone();

    let client = PacedClient::new(ClientConfig {
        base_url,
        min_delay: Duration::from_millis(1),
        max_attempts: 1,
        backoff_ceiling: 2,
        response_timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .unwrap();
    let ledger = Ledger::load(LedgerConfig::in_download_dir(dir.path())).unwrap();
    let config = TransferConfig {
        download_dir: dir.path().to_path_buf(),
        max_retries: MAX_RETRIES,
        stall_timeout: Duration::from_secs(5),
        ..Default::default()
    };

    let mut manager = TransferManager::new(config, ledger, client);
    let summary = manager.run(vec![task]).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.retried, 1);
    assert_eq!(fs::read(&destination).unwrap(), BODY);

    let state = manager.ledger().get("2021-01-01").cloned().unwrap();
    assert_eq!(state.status, TransferStatus::Completed);
    assert_eq!(state.bytes_downloaded, BODY.len() as u64);
    assert_eq!(state.retry_count, 1);

    // Only the retry may ask for a range
    let requests = origin.await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].contains("range:"));
}
