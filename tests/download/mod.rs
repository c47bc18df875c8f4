//! Integration tests for complete download runs
//!
//! These tests drive the `download` command from a TOML configuration
//! file against a mock origin and then inspect the ledger and the files it
//! left behind, the way a user rerunning the tool would.

use std::fs;
use std::path::{Path, PathBuf};

use katago_fetcher::app::{Ledger, TransferState, TransferStatus};
use katago_fetcher::cli::{handle_download, DownloadArgs};
use katago_fetcher::config::AppConfig;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Origin {
    server: MockServer,
    dir: TempDir,
}

impl Origin {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    fn download_dir(&self) -> PathBuf {
        self.dir.path().join("games")
    }

    /// Write a config file pointing at the mock origin and load it back
    async fn config(&self, max_attempts: u32) -> AppConfig {
        let config_path = self.dir.path().join("katago-fetcher.toml");
        let content = format!(
            r#"
[client]
base_url = "{}/kata1/traininggames/"
min_delay = "5ms"
max_attempts = {}
backoff_ceiling = 2
response_timeout = "5s"

[transfer]
download_dir = '{}'
max_retries = 3
stall_timeout = "5s"

[range]
start_date = "2021-01-01"
end_date = "2021-01-03"

[logging]
file_logging = false
"#,
            self.server.uri(),
            max_attempts,
            self.download_dir().display()
        );
        fs::write(&config_path, content).unwrap();
        AppConfig::load(Some(config_path)).await.unwrap()
    }

    async fn serve(&self, id: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/kata1/traininggames/{}sgfs.tar.bz2", id)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    async fn throttle(&self, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/kata1/traininggames/{}sgfs.tar.bz2", id)))
            .respond_with(ResponseTemplate::new(429))
            .mount(&self.server)
            .await;
    }

    async fn requests(&self) -> usize {
        self.server.received_requests().await.unwrap().len()
    }

    async fn requested_paths(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect()
    }

    fn archive(&self, id: &str) -> PathBuf {
        self.download_dir().join(format!("{}sgfs.tar.bz2", id))
    }

    fn ledger(&self, config: &AppConfig) -> Ledger {
        Ledger::load(config.transfer.ledger_config()).unwrap()
    }
}

fn quiet_args() -> DownloadArgs {
    DownloadArgs {
        no_progress: true,
        ..Default::default()
    }
}

fn state(ledger: &Ledger, id: &str) -> TransferState {
    ledger.get(id).cloned().unwrap()
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[tokio::test]
async fn test_three_day_run_with_throttled_archive() {
    let origin = Origin::start().await;
    origin.serve("2021-01-01", b"games of the first day").await;
    origin.serve("2021-01-02", b"games of the second day").await;
    origin.throttle("2021-01-03").await;

    let config = origin.config(1).await;
    handle_download(config.clone(), quiet_args(), true)
        .await
        .unwrap();

    let ledger = origin.ledger(&config);
    assert_eq!(ledger.len(), 3);
    assert_eq!(state(&ledger, "2021-01-01").status, TransferStatus::Completed);
    assert_eq!(state(&ledger, "2021-01-02").status, TransferStatus::Completed);

    let failed = state(&ledger, "2021-01-03");
    assert_eq!(failed.status, TransferStatus::Failed);
    assert_eq!(failed.retry_count, 3);
    assert!(failed.last_error.unwrap().contains("throttling"));

    assert_eq!(read(&origin.archive("2021-01-02")), b"games of the second day");
    assert!(!origin.archive("2021-01-03").exists());

    // Rerunning over the same ledger touches nothing
    let sent = origin.requests().await;
    handle_download(config.clone(), quiet_args(), true)
        .await
        .unwrap();
    assert_eq!(origin.requests().await, sent);
}

#[tokio::test]
async fn test_interrupted_archive_resumes_from_partial_file() {
    let origin = Origin::start().await;
    origin.serve("2021-01-01", b"a").await;
    origin.serve("2021-01-03", b"c").await;
    Mock::given(method("GET"))
        .and(path("/kata1/traininggames/2021-01-02sgfs.tar.bz2"))
        .and(header("range", "bytes=6-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 6-13/14")
                .set_body_bytes(b"-resumed".to_vec()),
        )
        .mount(&origin.server)
        .await;

    let config = origin.config(1).await;

    // State left behind by a run that was killed mid-transfer
    fs::create_dir_all(origin.download_dir()).unwrap();
    fs::write(origin.archive("2021-01-02"), b"header").unwrap();
    let mut ledger = Ledger::new(config.transfer.ledger_config());
    let mut partial = TransferState::pending();
    partial.mark_in_progress();
    partial.bytes_downloaded = 4;
    partial.total_bytes = Some(14);
    ledger.set("2021-01-02", partial).unwrap();
    ledger.flush().unwrap();

    handle_download(config.clone(), quiet_args(), true)
        .await
        .unwrap();

    assert_eq!(read(&origin.archive("2021-01-02")), b"header-resumed");
    let resumed = state(&origin.ledger(&config), "2021-01-02");
    assert_eq!(resumed.status, TransferStatus::Completed);
    assert_eq!(resumed.bytes_downloaded, 14);
    assert_eq!(resumed.retry_count, 0);
}

#[tokio::test]
async fn test_transport_backoff_absorbs_short_throttling() {
    let origin = Origin::start().await;
    Mock::given(method("GET"))
        .and(path("/kata1/traininggames/2021-01-01sgfs.tar.bz2"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&origin.server)
        .await;
    origin.serve("2021-01-01", b"eventually").await;
    origin.serve("2021-01-02", b"b").await;
    origin.serve("2021-01-03", b"c").await;

    let config = origin.config(3).await;
    handle_download(config.clone(), quiet_args(), true)
        .await
        .unwrap();

    let ledger = origin.ledger(&config);
    let first = state(&ledger, "2021-01-01");
    assert_eq!(first.status, TransferStatus::Completed);
    assert_eq!(first.retry_count, 0);
    assert_eq!(ledger.counts().completed, 3);
    assert_eq!(origin.requests().await, 5);
}

#[tokio::test]
async fn test_only_listed_dates_are_requested() {
    let origin = Origin::start().await;
    Mock::given(method("GET"))
        .and(path("/kata1/traininggames/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><pre>
[1K] <a href="2021-01-01sgfs.tar.bz2">2021-01-01sgfs.tar.bz2</a>
[2K] <a href="2021-01-03sgfs.tar.bz2">2021-01-03sgfs.tar.bz2</a>
</pre></body></html>"#,
        ))
        .mount(&origin.server)
        .await;
    origin.serve("2021-01-01", b"first").await;
    origin.serve("2021-01-03", b"third").await;

    let config = origin.config(1).await;
    let args = DownloadArgs {
        only_listed: true,
        newest_first: true,
        ..quiet_args()
    };
    handle_download(config.clone(), args, true).await.unwrap();

    assert_eq!(
        origin.requested_paths().await,
        vec![
            "/kata1/traininggames/index.html",
            "/kata1/traininggames/2021-01-03sgfs.tar.bz2",
            "/kata1/traininggames/2021-01-01sgfs.tar.bz2",
        ]
    );

    let ledger = origin.ledger(&config);
    assert!(ledger.get("2021-01-02").is_none());
    assert_eq!(ledger.counts().completed, 2);
}

#[tokio::test]
async fn test_force_retry_recovers_failed_archive() {
    let origin = Origin::start().await;
    origin.serve("2021-01-01", b"a").await;
    origin.serve("2021-01-02", b"b").await;
    Mock::given(method("GET"))
        .and(path("/kata1/traininggames/2021-01-03sgfs.tar.bz2"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&origin.server)
        .await;
    origin.serve("2021-01-03", b"late upload").await;

    let config = origin.config(1).await;
    handle_download(config.clone(), quiet_args(), true)
        .await
        .unwrap();
    assert_eq!(
        state(&origin.ledger(&config), "2021-01-03").status,
        TransferStatus::Failed
    );

    let args = DownloadArgs {
        force_retry: true,
        ..quiet_args()
    };
    handle_download(config.clone(), args, true).await.unwrap();

    let recovered = state(&origin.ledger(&config), "2021-01-03");
    assert_eq!(recovered.status, TransferStatus::Completed);
    assert_eq!(recovered.retry_count, 0);
    assert_eq!(read(&origin.archive("2021-01-03")), b"late upload");
}
