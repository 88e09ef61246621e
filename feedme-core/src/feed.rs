use chrono::{DateTime, Utc};
use reqwest::{redirect, Client, ClientBuilder};

use crate::config::IngestConfig;
use crate::error::FetchError;
use crate::models::{ArticleDraft, Source};

/// Builds the process-wide HTTP client used for every feed request.
pub fn build_http_client(config: &IngestConfig) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.clone())
        .build()
}

impl ArticleDraft {
    /// Normalizes an RSS item. Items without a title or a link cannot be
    /// stored and yield `None`; a missing or unparseable date becomes
    /// `fetched_at`.
    pub fn from_rss_item(item: &rss::Item, fetched_at: DateTime<Utc>) -> Option<Self> {
        let title = non_empty(item.title())?;
        let url = non_empty(item.link())?;
        let published_at = item
            .pub_date()
            .and_then(parse_date)
            .or_else(|| {
                item.dublin_core_ext()
                    .and_then(|dc| dc.dates().first().and_then(|d| parse_date(d)))
            })
            .unwrap_or(fetched_at);

        Some(Self {
            title,
            url,
            published_at,
        })
    }

    pub fn from_atom_entry(entry: &atom_syndication::Entry, fetched_at: DateTime<Utc>) -> Option<Self> {
        let title = non_empty(Some(entry.title().value.as_str()))?;
        let link = entry
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|link| link.href());
        let url = non_empty(link)?;
        let published_at = entry
            .published()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| entry.updated().with_timezone(&Utc));
        let published_at = if published_at.timestamp() == 0 {
            fetched_at
        } else {
            published_at
        };

        Some(Self {
            title,
            url,
            published_at,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(value.trim()))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses a feed document, trying RSS 2.0 first and Atom second.
pub fn parse_feed(body: &[u8], fetched_at: DateTime<Utc>) -> Result<Vec<ArticleDraft>, FetchError> {
    let rss_err = match rss::Channel::read_from(body) {
        Ok(channel) => {
            return Ok(channel
                .items()
                .iter()
                .filter_map(|item| ArticleDraft::from_rss_item(item, fetched_at))
                .collect());
        }
        Err(err) => err,
    };

    match atom_syndication::Feed::read_from(body) {
        Ok(feed) => Ok(feed
            .entries()
            .iter()
            .filter_map(|entry| ArticleDraft::from_atom_entry(entry, fetched_at))
            .collect()),
        Err(atom) => Err(FetchError::Parse { rss: rss_err, atom }),
    }
}

/// Fetches and parses one source's feed.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, source: &Source) -> Result<Vec<ArticleDraft>, FetchError> {
        let response = self
            .client
            .get(source.url.as_str())
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        parse_feed(&bytes, Utc::now())
    }
}
