use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use crate::error::CatalogError;
use crate::models::NewSource;
use crate::storage::Store;

/// Column order of the catalog file: country, language, editor, category,
/// url, logo. There is no header row.
const CATALOG_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogReport {
    pub rows: usize,
    pub added: usize,
}

/// Parses every row of a catalog. A single malformed row rejects the whole
/// catalog so that no partial source list is ever stored.
pub fn parse_catalog<R: Read>(reader: R) -> Result<Vec<NewSource>, CatalogError> {
    let mut rows = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut sources = Vec::new();
    for (index, record) in rows.records().enumerate() {
        let row = index + 1;
        let record = record?;
        if record.len() != CATALOG_COLUMNS {
            return Err(CatalogError::MalformedRow {
                row,
                reason: format!("expected {CATALOG_COLUMNS} columns, found {}", record.len()),
            });
        }
        let url = &record[4];
        if let Err(err) = url::Url::parse(url) {
            return Err(CatalogError::MalformedRow {
                row,
                reason: format!("invalid feed url {url:?}: {err}"),
            });
        }
        sources.push(NewSource {
            country: record[0].to_owned(),
            language: record[1].to_owned(),
            editor: record[2].to_owned(),
            category: record[3].to_owned(),
            url: url.to_owned(),
            logo: record[5].to_owned(),
        });
    }
    Ok(sources)
}

/// Loads the catalog at `path` into the store. Sources whose url is already
/// stored are left untouched; nothing is ever updated or deleted.
pub async fn load_catalog(store: &Store, path: &Path) -> Result<CatalogReport, CatalogError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let sources = parse_catalog(bytes.as_slice())?;

    let mut report = CatalogReport {
        rows: sources.len(),
        added: 0,
    };
    for source in &sources {
        if store.insert_source(source).await? {
            report.added += 1;
        } else {
            debug!(url = %source.url, "source already known");
        }
    }
    info!(path = %path.display(), rows = report.rows, added = report.added, "catalog loaded");
    Ok(report)
}
