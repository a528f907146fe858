//! Token-gated archive download and chunked loading against a mocked site

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::NaiveDate;
use encoding_rs::SHIFT_JIS;
use hojin_common::types::DateWindow;
use hojin_sync::bulk::{BulkSource, HttpArchiveFetcher};
use hojin_sync::catalog::{BulkRequest, BulkSpec, Catalog};
use hojin_sync::config::SyncConfig;
use hojin_sync::reconcile::{drop_unkeyed_rows, LandingLoad, MergeCounts, MergeTarget, ReconcileSink};
use hojin_sync::transform::FlatBatch;
use hojin_sync::{SyncError, SyncOrchestrator, SyncResult, SyncStatus, TableConfig};
use indexmap::IndexMap;
use serde_json::json;
use std::io::Write;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LANDING_HTML: &str = r#"
<html><body>
  <form method="post" action="index.html">
    <input type="hidden" name="session.token" value="tok-1">
    <input type="hidden" name="event" value="">
  </form>
</body></html>
"#;

fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn registry_csv() -> Vec<u8> {
    let text = "\
1,1000011000005,01,0,2025-09-01,2015-10-05,株式会社テスト\r\n\
2,1000011000013,01,0,2025-09-02,2015-10-05,合同会社サンプル\r\n\
3,,01,0,2025-09-03,2015-10-05,番号なし\r\n";
    SHIFT_JIS.encode(text).0.into_owned()
}

fn spec_for(server: &MockServer) -> BulkSpec {
    let mut extra_params = IndexMap::new();
    extra_params.insert("event".to_string(), "download".to_string());
    BulkSpec {
        request: BulkRequest::TokenGated {
            landing_url: format!("{}/download/zenken/", server.uri()),
            download_url: format!("{}/download/zenken/index.html", server.uri()),
            token_field: "session.token".to_string(),
            selector_field: "selDlFileNo".to_string(),
            selector: "42".to_string(),
            extra_params,
        },
        entry_suffix: ".csv".to_string(),
        encoding: "shift_jis".to_string(),
        columns: Some(
            [
                "sequence_number",
                "corporate_number",
                "process",
                "correct",
                "update_date",
                "change_date",
                "name",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        ),
    }
}

async fn mount_site(server: &MockServer, archive: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/download/zenken/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_HTML))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/download/zenken/index.html"))
        .and(body_string_contains("session.token=tok-1"))
        .and(body_string_contains("selDlFileNo=42"))
        .and(body_string_contains("event=download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(1)
        .mount(server)
        .await;
}

fn source(chunk_rows: usize) -> BulkSource {
    let config = SyncConfig::default().with_chunk_rows(chunk_rows);
    let fetcher = HttpArchiveFetcher::new(&config.bulk).unwrap();
    BulkSource::new(Arc::new(fetcher), config.bulk.chunk_rows)
}

#[tokio::test]
async fn test_token_handshake_and_bounded_chunks() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[("readme.pdf", b"%PDF".to_vec()), ("00_zenkoku_all_20250930.csv", registry_csv())]);
    mount_site(&server, archive).await;

    let mut reader = source(2).open(&spec_for(&server)).await.unwrap();

    let first = reader.next_chunk().unwrap().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["name"], json!("株式会社テスト"));
    assert_eq!(first[1]["corporate_number"], json!("1000011000013"));

    let second = reader.next_chunk().unwrap().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["corporate_number"], serde_json::Value::Null);

    assert!(reader.next_chunk().unwrap().is_none());
    assert_eq!(reader.rows_read(), 3);
}

#[tokio::test]
async fn test_archive_without_payload_is_fetch_error() {
    let server = MockServer::start().await;
    mount_site(&server, zip_bytes(&[("readme.txt", b"nothing here".to_vec())])).await;

    let err = source(10).open(&spec_for(&server)).await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(_)));
}

#[tokio::test]
async fn test_missing_token_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/zenken/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = source(10).open(&spec_for(&server)).await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(_)));
}

/// Records what an accumulating load receives
#[derive(Default)]
struct LoadLog {
    staged: Vec<usize>,
    finished: usize,
}

struct RecordingLoad {
    target: MergeTarget,
    log: Arc<Mutex<LoadLog>>,
    rows: u64,
    skipped: u64,
    fail_finish: bool,
}

#[async_trait]
impl LandingLoad for RecordingLoad {
    async fn stage(&mut self, mut batch: FlatBatch) -> hojin_sync::Result<u64> {
        let dropped = drop_unkeyed_rows(&mut batch, &self.target.primary_key);
        assert!(batch.has_column("update_date"));
        self.log.lock().unwrap().staged.push(batch.len());
        self.rows += batch.len() as u64;
        self.skipped += dropped;
        Ok(dropped)
    }

    async fn finish(self: Box<Self>) -> hojin_sync::Result<MergeCounts> {
        self.log.lock().unwrap().finished += 1;
        if self.fail_finish {
            return Err(SyncError::Write("merge rejected by destination".to_string()));
        }
        Ok(MergeCounts {
            inserted: self.rows,
            updated: 0,
            skipped: self.skipped,
        })
    }
}

struct RecordingSink {
    log: Arc<Mutex<LoadLog>>,
    fail_finish: bool,
}

#[async_trait]
impl ReconcileSink for RecordingSink {
    async fn merge_batch(&self, _target: &MergeTarget, _batch: FlatBatch) -> hojin_sync::Result<MergeCounts> {
        Err(SyncError::Write("bulk tables load through open_load".to_string()))
    }

    async fn open_load(&self, target: &MergeTarget) -> hojin_sync::Result<Box<dyn LandingLoad>> {
        Ok(Box::new(RecordingLoad {
            target: target.clone(),
            log: self.log.clone(),
            rows: 0,
            skipped: 0,
            fail_finish: self.fail_finish,
        }))
    }
}

fn registry_table(server: &MockServer) -> TableConfig {
    let mut table = Catalog::builtin()
        .unwrap()
        .get("corporate_registry_nta")
        .unwrap()
        .clone();
    if let hojin_sync::catalog::SourceSpec::Bulk(spec) = &mut table.source {
        spec.request = spec_for(server).request;
        spec.columns = spec_for(server).columns;
    }
    table
}

async fn run_registry(server: &MockServer, sink: RecordingSink) -> SyncResult {
    let window = DateWindow::trailing(32, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
    let table = registry_table(server);
    let report = SyncOrchestrator::new(Arc::new(sink), window)
        .with_bulk(source(2))
        .run(&[&table])
        .await;
    report.results.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_orchestrator_accumulates_chunks_into_one_load() {
    let server = MockServer::start().await;
    mount_site(&server, zip_bytes(&[("all.csv", registry_csv())])).await;

    let log = Arc::new(Mutex::new(LoadLog::default()));
    let sink = RecordingSink {
        log: log.clone(),
        fail_finish: false,
    };
    let result = run_registry(&server, sink).await;

    assert_eq!(result.status, SyncStatus::Ok, "cause: {:?}", result.cause);
    assert_eq!((result.inserted, result.skipped), (2, 1));

    let log = log.lock().unwrap();
    assert_eq!(log.staged, vec![2, 0]);
    assert_eq!(log.finished, 1);
}

#[tokio::test]
async fn test_failed_finish_reports_no_skips() {
    let server = MockServer::start().await;
    mount_site(&server, zip_bytes(&[("all.csv", registry_csv())])).await;

    let log = Arc::new(Mutex::new(LoadLog::default()));
    let sink = RecordingSink {
        log: log.clone(),
        fail_finish: true,
    };
    let result = run_registry(&server, sink).await;

    assert_eq!(result.status, SyncStatus::Error);
    assert!(result.cause.as_deref().unwrap().contains("merge rejected"));
    assert_eq!((result.inserted, result.updated, result.skipped), (0, 0, 0));
    assert_eq!(log.lock().unwrap().staged, vec![2, 0]);
}
