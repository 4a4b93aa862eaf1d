use gravity::config::Config;
use gravity::db::DbClient;
use gravity::engine::{FetchOutcome, Gravity, HttpListClient, OverrideKind, ResolverReload};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CountingReload {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ResolverReload for CountingReload {
    async fn reload(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    gravity: Gravity,
    db: Arc<DbClient>,
    reloads: Arc<AtomicUsize>,
    export_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(2))
}

fn harness_with_timeout(timeout: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let export_path = dir.path().join("gravity.list");

    let mut config = Config::default();
    config.export.path = export_path.display().to_string();
    config.network.hostname = Some("pi".to_string());
    config.updates.whitelist_source_hosts = false;

    let db = Arc::new(DbClient::open_in_memory().unwrap());
    db.initialize().unwrap();

    let client = HttpListClient::new("GravityTest/1.0", timeout).unwrap();
    let reloads = Arc::new(AtomicUsize::new(0));
    let reload = Arc::new(CountingReload {
        calls: reloads.clone(),
    });

    let gravity = Gravity::new(config, db.clone(), Arc::new(client), Some(reload)).unwrap();
    Harness {
        gravity,
        db,
        reloads,
        export_path,
        _dir: dir,
    }
}

async fn serve_list(server: &MockServer, route: &str, etag: &str, body: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", etag))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag)
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string() == verb)
        .count()
}

#[tokio::test]
async fn test_end_to_end_compile_and_export() {
    let server = MockServer::start().await;
    serve_list(&server, "/a", "\"a1\"", "# list A\n0.0.0.0 x.com\n0.0.0.0 y.com\n").await;
    serve_list(&server, "/b", "\"b1\"", "y.com\n\nz.com\n").await;

    let h = harness();
    h.gravity.sources().register(&format!("{}/a", server.uri())).unwrap();
    h.gravity.sources().register(&format!("{}/b", server.uri())).unwrap();
    h.gravity.overrides().add("y.com", OverrideKind::Whitelist).unwrap();
    h.gravity.overrides().add("z.com", OverrideKind::Blacklist).unwrap();

    let report = h.gravity.run().await.unwrap();
    assert_eq!(report.failures().count(), 0);
    assert_eq!(report.raw_total, 4);
    assert_eq!(report.compiled_len, 2);
    assert_eq!(h.db.load_compiled().unwrap(), vec!["x.com", "z.com"]);

    let exported = std::fs::read_to_string(&h.export_path).unwrap();
    assert_eq!(
        exported,
        "0.0.0.0 pi.hole\n0.0.0.0 pi\n0.0.0.0 x.com\n0.0.0.0 z.com\n"
    );
    assert_eq!(h.reloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unchanged_etag_skips_download() {
    let server = MockServer::start().await;
    serve_list(&server, "/hosts", "\"v1\"", "0.0.0.0 ads.example.com\n").await;

    let h = harness();
    let uri = format!("{}/hosts", server.uri());
    h.gravity.sources().register(&uri).unwrap();

    let first = h.gravity.run().await.unwrap();
    assert!(matches!(
        first.sources[0].outcome,
        FetchOutcome::Fetched { domains: 1, .. }
    ));
    // A never-fetched list is downloaded without probing.
    assert_eq!(count_requests(&server, "HEAD").await, 0);

    let second = h.gravity.run().await.unwrap();
    assert_eq!(second.sources[0].outcome, FetchOutcome::UpToDate);
    assert_eq!(count_requests(&server, "HEAD").await, 1);
    assert_eq!(count_requests(&server, "GET").await, 1);
    assert_eq!(second.compiled_len, 1);
}

#[tokio::test]
async fn test_changed_etag_replaces_domains() {
    let server = MockServer::start().await;
    serve_list(&server, "/hosts", "\"v1\"", "old.example.com\n").await;

    let h = harness();
    let uri = format!("{}/hosts", server.uri());
    h.gravity.sources().register(&uri).unwrap();
    h.gravity.run().await.unwrap();

    server.reset().await;
    serve_list(&server, "/hosts", "\"v2\"", "new.example.com\n").await;

    let report = h.gravity.run().await.unwrap();
    assert!(matches!(
        report.sources[0].outcome,
        FetchOutcome::Fetched { .. }
    ));
    assert_eq!(h.db.load_compiled().unwrap(), vec!["new.example.com"]);
    assert_eq!(
        h.gravity.sources().get(&uri).unwrap().etag.as_deref(),
        Some("\"v2\"")
    );
}

#[tokio::test]
async fn test_missing_freshness_headers_always_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a.com\n"))
        .mount(&server)
        .await;

    let h = harness();
    h.gravity
        .sources()
        .register(&format!("{}/plain", server.uri()))
        .unwrap();

    h.gravity.run().await.unwrap();
    h.gravity.run().await.unwrap();
    h.gravity.run().await.unwrap();
    assert_eq!(count_requests(&server, "GET").await, 3);
}

#[tokio::test]
async fn test_failed_source_keeps_last_known_domains() {
    let server = MockServer::start().await;
    serve_list(&server, "/a", "\"a1\"", "x.com\n").await;
    serve_list(&server, "/b", "\"b1\"", "z.com\n").await;

    let h = harness();
    h.gravity.sources().register(&format!("{}/a", server.uri())).unwrap();
    h.gravity.sources().register(&format!("{}/b", server.uri())).unwrap();
    h.gravity.run().await.unwrap();

    // B changes its tag but the download breaks.
    server.reset().await;
    serve_list(&server, "/a", "\"a1\"", "x.com\n").await;
    Mock::given(method("HEAD"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"b2\""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let report = h.gravity.run().await.unwrap();
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].uri.ends_with("/b"));
    assert_eq!(report.sources[0].outcome, FetchOutcome::UpToDate);

    assert_eq!(h.db.load_compiled().unwrap(), vec!["x.com", "z.com"]);
    let b = h
        .gravity
        .sources()
        .get(&format!("{}/b", server.uri()))
        .unwrap();
    assert_eq!(b.etag.as_deref(), Some("\"b1\""));
}

#[tokio::test]
async fn test_source_hosts_are_whitelisted() {
    let server = MockServer::start().await;
    serve_list(&server, "/hosts", "\"v1\"", "0.0.0.0 127.0.0.1\nads.com\n").await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.export.path = dir.path().join("gravity.list").display().to_string();
    config.network.hostname = Some("pi".to_string());

    let db = Arc::new(DbClient::open_in_memory().unwrap());
    db.initialize().unwrap();
    let client = HttpListClient::new("GravityTest/1.0", Duration::from_secs(2)).unwrap();
    let gravity = Gravity::new(config, db.clone(), Arc::new(client), None).unwrap();
    gravity
        .sources()
        .register(&format!("{}/hosts", server.uri()))
        .unwrap();

    gravity.run().await.unwrap();
    assert!(gravity
        .overrides()
        .contains("127.0.0.1", OverrideKind::Whitelist)
        .unwrap());
    assert_eq!(db.load_compiled().unwrap(), vec!["ads.com"]);
}

#[tokio::test]
async fn test_override_change_recompiles_without_network() {
    let server = MockServer::start().await;
    serve_list(&server, "/hosts", "\"v1\"", "a.com\nb.com\n").await;

    let h = harness();
    h.gravity
        .sources()
        .register(&format!("{}/hosts", server.uri()))
        .unwrap();
    h.gravity.run().await.unwrap();
    let requests = server.received_requests().await.unwrap().len();

    h.gravity.overrides().add("a.com", OverrideKind::Whitelist).unwrap();
    let compilation = h.gravity.apply_overrides().await.unwrap();

    assert_eq!(
        compilation.domains.into_iter().collect::<Vec<_>>(),
        vec!["b.com"]
    );
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
    assert_eq!(h.reloads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timed_out_source_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("a.com\n")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    serve_list(&server, "/fast", "\"f1\"", "b.com\n").await;

    let h = harness_with_timeout(Duration::from_millis(500));
    h.gravity
        .sources()
        .register(&format!("{}/slow", server.uri()))
        .unwrap();
    h.gravity
        .sources()
        .register(&format!("{}/fast", server.uri()))
        .unwrap();

    let report = h.gravity.run().await.unwrap();
    assert!(matches!(
        report.sources[0].outcome,
        FetchOutcome::Failed { .. }
    ));
    assert!(matches!(
        report.sources[1].outcome,
        FetchOutcome::Fetched { domains: 1, .. }
    ));
    assert_eq!(report.failures().count(), 1);
    assert_eq!(h.db.load_compiled().unwrap(), vec!["b.com"]);
}
