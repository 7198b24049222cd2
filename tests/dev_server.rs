// tests/dev_server.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use assetpipe::engine::BuildEvent;
use assetpipe::serve::{CLIENT_PATH, DevServer, DevServerConfig, EVENTS_PATH};
use assetpipe::types::ReloadKind;
use assetpipe_test_utils::{init_tracing, with_timeout};

struct Site {
    _dir: tempfile::TempDir,
    staging: PathBuf,
    source: PathBuf,
}

fn site() -> Site {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join(".tmp");
    let source = dir.path().join("app");
    write(&staging, "styles/main.css", "body{color:red}");
    write(&source, "index.html", "<html><body><h1>hi</h1></body></html>");
    write(&source, "styles/main.css", "/* shadowed by staging */");
    write(&source, "my page.html", "<html><body>spaced</body></html>");
    Site {
        _dir: dir,
        staging,
        source,
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

async fn start(site: &Site, live_reload: bool) -> (DevServer, broadcast::Sender<BuildEvent>) {
    let (events_tx, _) = broadcast::channel(16);
    let config = DevServerConfig::new(vec![site.staging.clone(), site.source.clone()], 0)
        .live_reload(live_reload);
    let server = DevServer::bind(config, events_tx.clone()).await.unwrap();
    (server, events_tx)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn html_gets_the_reload_client_injected() {
    init_tracing();
    let site = site();
    let (server, _events) = start(&site, true).await;

    let resp = client().get(format!("{}/", server.url())).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let ctype = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(ctype.starts_with("text/html"));
    let body = resp.text().await.unwrap();
    assert_eq!(
        body,
        format!(r#"<html><body><h1>hi</h1><script src="{CLIENT_PATH}"></script></body></html>"#)
    );

    let js = client().get(format!("{}{CLIENT_PATH}", server.url())).send().await.unwrap();
    assert_eq!(js.status(), 200);
    assert!(js.text().await.unwrap().contains("EventSource"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn first_root_wins_and_missing_files_are_404() {
    init_tracing();
    let site = site();
    let (server, _events) = start(&site, true).await;

    let css = client()
        .get(format!("{}/styles/main.css", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(css.status(), 200);
    assert!(css.headers()["content-type"].to_str().unwrap().starts_with("text/css"));
    assert_eq!(css.text().await.unwrap(), "body{color:red}");

    let missing = client().get(format!("{}/nope.js", server.url())).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn percent_encoded_paths_are_decoded() {
    init_tracing();
    let site = site();
    let (server, _events) = start(&site, true).await;

    let resp = client()
        .get(format!("{}/my%20page.html", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.starts_with("<html><body>spaced"));
    assert!(body.contains(CLIENT_PATH));

    let escape = client()
        .get(format!("{}/..%2F..%2Fetc%2Fpasswd", server.url()))
        .send()
        .await
        .unwrap();
    assert_ne!(escape.status(), 200);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn release_preview_serves_html_untouched() {
    init_tracing();
    let site = site();
    let (server, _events) = start(&site, false).await;

    let body = client()
        .get(format!("{}/index.html", server.url()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!body.contains(CLIENT_PATH));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn successful_builds_are_pushed_to_connected_browsers() {
    init_tracing();
    let site = site();
    let (server, events) = start(&site, true).await;

    let mut resp = client()
        .get(format!("{}{EVENTS_PATH}", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));

    // A failed build is logged, not forwarded.
    events
        .send(BuildEvent {
            run_id: 1,
            task: "scripts".into(),
            duration: Duration::ZERO,
            error: Some("bundler exited with code 1".into()),
            reload: ReloadKind::Scripts,
            outputs: Vec::new(),
        })
        .unwrap();
    events
        .send(BuildEvent {
            run_id: 1,
            task: "styles".into(),
            duration: Duration::from_millis(12),
            error: None,
            reload: ReloadKind::Styles,
            outputs: vec![site.staging.join("styles/main.css")],
        })
        .unwrap();

    let received = with_timeout(async {
        let mut buf = String::new();
        while !buf.contains("\n\n") {
            let chunk = resp.chunk().await.unwrap().expect("stream ended early");
            buf.push_str(&String::from_utf8_lossy(&chunk));
        }
        buf
    })
    .await;

    assert!(received.contains("event: reload"), "got {received:?}");
    assert!(received.contains(r#""kind":"styles""#));
    assert!(received.contains(r#""task":"styles""#));
    assert!(!received.contains("scripts"));

    drop(resp);
    timeout(Duration::from_secs(2), server.shutdown()).await.unwrap().unwrap();
}
