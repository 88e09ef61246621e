#![allow(dead_code)]

use std::path::{Path, PathBuf};

use feedme_core::{NewSource, Store};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub async fn temp_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("feedme.db"), 1).await.unwrap();
    (dir, store)
}

/// An RSS document with `count` items titled `"{prefix} {i}"`.
pub fn rss_feed(prefix: &str, count: usize) -> String {
    let items: String = (1..=count)
        .map(|i| {
            format!(
                "<item><title>{prefix} {i}</title><link>http://example.com/{prefix}/{i}</link>\
                 <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>{prefix}</title><link>http://example.com/</link><description>d</description>{items}</channel></rss>"#
    )
}

pub async fn mount_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

pub async fn mount_failure(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

pub fn source(url: impl Into<String>) -> NewSource {
    NewSource {
        country: "fr".into(),
        language: "fr".into(),
        editor: "Editor".into(),
        category: "news".into(),
        url: url.into(),
        logo: "logo.png".into(),
    }
}

/// Writes a catalog file whose rows point at `urls`.
pub fn write_catalog(dir: &Path, urls: &[String]) -> PathBuf {
    let rows: String = urls
        .iter()
        .map(|url| format!("fr,fr,Editor,news,{url},logo.png\n"))
        .collect();
    let path = dir.join("source.csv");
    std::fs::write(&path, rows).unwrap();
    path
}
