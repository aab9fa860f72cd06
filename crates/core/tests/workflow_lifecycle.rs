//! Acquisition run integration tests.
//!
//! These tests drive the workflow coordinator against the mock library and
//! file-sharing services:
//! - Wanted items flowing through search, download and import
//! - Per-item failures not aborting the run
//! - Rejected files landing in quarantine
//! - Incrementing paging persisted across runs

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use bookhound_core::{
    config::{Config, PagingMode},
    fileshare::{PeerResponse, RemoteFile, TransferState},
    library::WantedSource,
    load_config_from_str,
    testing::{fixtures, MockFileShare, MockLibrary},
    RunSummary, WorkflowCoordinator,
};

const DUNE: &str = "Books\\Herbert\\Frank Herbert - Dune.epub";
const DISPOSSESSED: &str = "Books\\LeGuin\\Ursula Le Guin - The Dispossessed.mobi";

fn config(root: &Path) -> Config {
    let toml = format!(
        r#"
[library]
url = "http://readarr:8787"
api_key = "readarr-key"
download_dir = "/readarr/downloads"

[fileshare]
url = "http://slskd:5030"
api_key = "slskd-key"
download_dir = "{downloads}"

[search]
paging = "all"
settle_delay_ms = 0
state_poll_interval_ms = 0

[download]
poll_interval_ms = 0
enqueue_poll_interval_ms = 0

[import]
command_poll_interval_ms = 0

[retry]
base_delay_ms = 0
max_delay_ms = 0

[state]
data_dir = "{state}"
"#,
        downloads = root.join("downloads").display(),
        state = root.join("state").display(),
    );
    load_config_from_str(&toml).expect("Failed to parse test config")
}

/// Test helper wiring both mocks to a temporary download directory.
struct TestHarness {
    root: TempDir,
    library: Arc<MockLibrary>,
    share: Arc<MockFileShare>,
}

impl TestHarness {
    async fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let library = Arc::new(MockLibrary::new());
        library.add_author(fixtures::author(1, "Frank Herbert", 1)).await;
        library.add_author(fixtures::author(2, "Ursula Le Guin", 1)).await;
        library.add_profile(fixtures::ebook_profile(1)).await;

        let share = Arc::new(MockFileShare::new());
        share.set_delivery_dir(root.path().join("downloads")).await;
        share.set_initial_state(TransferState::Succeeded).await;

        Self {
            root,
            library,
            share,
        }
    }

    async fn offer(&self, query: &str, peer: &str, filename: &str, content: Vec<u8>) {
        self.share
            .set_search_results(
                query,
                vec![PeerResponse {
                    peer: peer.to_string(),
                    files: vec![RemoteFile::new(peer, filename, content.len() as u64)],
                }],
            )
            .await;
        self.share.set_file_content(filename, content).await;
    }

    fn coordinator(&self, config: Config) -> WorkflowCoordinator {
        WorkflowCoordinator::new(self.library.clone(), self.share.clone(), config)
    }

    fn downloads(&self) -> std::path::PathBuf {
        self.root.path().join("downloads")
    }
}

#[tokio::test]
async fn test_mixed_batch_run() {
    let h = TestHarness::new().await;
    h.library
        .set_wanted(
            WantedSource::Missing,
            vec![
                fixtures::wanted_item(1, "Dune", 1),
                fixtures::wanted_item(2, "Children of Dune", 1),
                fixtures::wanted_item(3, "The Dispossessed", 2),
            ],
        )
        .await;
    // The ISBN embedded in the MOBI belongs to another book
    h.library.add_isbn("9780061054884", 99).await;

    h.offer("Frank Herbert - Dune", "alice", DUNE, fixtures::epub_bytes(Some("Dune")))
        .await;
    h.offer(
        "Ursula Le Guin - The Dispossessed",
        "bob",
        DISPOSSESSED,
        fixtures::mobi_bytes(Some("978-0-06-105488-4")),
    )
    .await;

    let summary = h.coordinator(config(h.root.path())).run().await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            wanted: 3,
            enqueued: 2,
            downloaded: 2,
            imported: 1,
            rejected: 1,
            failed: 1,
        }
    );

    // Accepted file organized and imported
    assert!(h
        .downloads()
        .join("Frank Herbert")
        .join("Frank Herbert - Dune.epub")
        .is_file());
    let commands = h.library.submitted_commands().await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].name, "DownloadedBooksScan");
    assert_eq!(
        commands[0].path.as_deref(),
        Some("/readarr/downloads/Frank Herbert")
    );

    // Rejected file quarantined, its source directory cleaned up
    assert!(h
        .downloads()
        .join("failed_imports")
        .join("Ursula Le Guin")
        .join("Ursula Le Guin - The Dispossessed.mobi")
        .is_file());
    assert!(!h.downloads().join("LeGuin").exists());

    // Every search consumed and deleted, completed transfers cleared
    assert_eq!(
        h.share.searches().await,
        vec![
            "Frank Herbert - Dune",
            "Frank Herbert - Children of Dune",
            "Ursula Le Guin - The Dispossessed",
        ]
    );
    assert_eq!(h.share.deleted_searches().await.len(), 3);
    assert_eq!(h.share.remove_completed_calls().await, 1);

    // Failures stay monitored unless configured otherwise
    assert!(h.library.updates().await.is_empty());
}

#[tokio::test]
async fn test_incrementing_page_carries_over_between_runs() {
    let h = TestHarness::new().await;
    h.library
        .set_wanted(
            WantedSource::Missing,
            (1..=3)
                .map(|i| fixtures::wanted_item(i, &format!("Book {}", i), 1))
                .collect(),
        )
        .await;

    let mut config = config(h.root.path());
    config.search.paging = PagingMode::IncrementingPage;
    config.search.page_size = 2;
    let page_file = h.root.path().join("state").join(".current_page.txt");

    let first = h.coordinator(config.clone()).run().await.unwrap();
    assert_eq!(first.wanted, 2);
    assert_eq!(std::fs::read_to_string(&page_file).unwrap().trim(), "2");

    let second = h.coordinator(config.clone()).run().await.unwrap();
    assert_eq!(second.wanted, 1);
    assert_eq!(std::fs::read_to_string(&page_file).unwrap().trim(), "1");

    let pages: Vec<u32> = h
        .library
        .wanted_queries()
        .await
        .iter()
        .map(|q| q.page)
        .collect();
    assert_eq!(pages, vec![1, 2]);
}

#[tokio::test]
async fn test_failed_items_are_unmonitored_and_logged() {
    let h = TestHarness::new().await;
    h.library
        .set_wanted(
            WantedSource::Missing,
            vec![
                fixtures::wanted_item(1, "Dune", 1),
                fixtures::wanted_item(2, "Dune (Abridged Summary)", 1),
            ],
        )
        .await;
    h.offer("Frank Herbert - Dune", "alice", DUNE, fixtures::epub_bytes(Some("Dune")))
        .await;

    let mut config = config(h.root.path());
    config.search.remove_wanted_on_failure = true;
    config.search.title_blacklist = vec!["summary".to_string()];

    let summary = h.coordinator(config).run().await.unwrap();
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.failed, 1);

    // The blacklisted title never reached the file-sharing service
    assert_eq!(h.share.searches().await, vec!["Frank Herbert - Dune"]);

    let updates = h.library.updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, 2);
    assert!(!updates[0].monitored);

    let log = std::fs::read_to_string(h.root.path().join("state").join("failure_list.txt")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("Frank Herbert, Dune (Abridged Summary)"));
}
