use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A feed endpoint from the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub country: String,
    pub language: String,
    pub category: String,
    pub url: String,
    pub editor: String,
    pub logo: String,
}

/// A catalog row before it has been given an id by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSource {
    pub country: String,
    pub language: String,
    pub editor: String,
    pub category: String,
    pub url: String,
    pub logo: String,
}

/// A normalized feed item, not yet linked to a stored source.
#[derive(Clone, Debug, PartialEq)]
pub struct ArticleDraft {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

/// One element of a cached payload: an article with its source inlined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub pub_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub source_id: i64,
    pub source: Source,
}

/// Publication window served under its own cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Period {
    Today,
    Month,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Today, Period::Month];

    /// Parses the path segment used by the query API.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Period::Today),
            "month" => Some(Period::Month),
            _ => None,
        }
    }

    pub fn cache_key(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Month => "month",
        }
    }

    /// First instant (UTC) that belongs to the window containing `now`.
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        let first = match self {
            Period::Today => date,
            Period::Month => date.with_day(1).unwrap_or(date),
        };
        first.and_time(NaiveTime::MIN).and_utc()
    }
}
