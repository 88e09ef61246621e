use std::time::Duration;

use feedme_core::{AppConfig, CacheBackend};
use feedme_server::App;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Feed</title>
    <link>http://example.com/</link>
    <description>d</description>
    <item>
      <title>First</title>
      <link>http://example.com/1</link>
      <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
    </item>
    <item>
      <title>Second</title>
      <link>http://example.com/2</link>
      <pubDate>Mon, 21 Oct 2024 08:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn cold_start_serves_imported_articles_and_shuts_down() {
    let feeds = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(FEED),
        )
        .mount(&feeds)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("source.csv");
    std::fs::write(
        &catalog,
        format!("fr,fr,Editor,news,{}/rss,logo.png\n", feeds.uri()),
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.store.database_path = dir.path().join("feedme.db");
    config.store.catalog_path = catalog;
    config.cache.backend = CacheBackend::Memory;
    config.server.views_dir = dir.path().join("views");
    config.server.assets_dir = dir.path().join("assets");

    let app = App::build(config).await.unwrap();
    let outcome = app.startup().await.unwrap();
    assert!(outcome.cold_start);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(app.serve(listener, shutdown.clone()));

    let response = reqwest::get(format!("http://{addr}/api/v1/articles"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let articles: Vec<Value> = response.json().await.unwrap();
    assert_eq!(articles.len(), 2);
    assert!(articles
        .iter()
        .all(|a| a["source"]["editor"] == "Editor" && a["pub_date"].is_string()));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feedme.json");
    std::fs::write(
        &path,
        r#"{ "cache": { "ttl_minutes": 5 }, "schedule": { "refresh_interval_minutes": 10 } }"#,
    )
    .unwrap();

    let config = AppConfig::load_from_file(&path).unwrap();
    assert!(config.validate().is_err());
}
