//! External catalog import (Google Books volumes API shape).

use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::auth::middleware::CurrentUser;
use crate::books::publish_books;
use crate::db::books as queries;
use crate::db::models::{Book, NewBook};
use crate::db::with_conn;
use crate::error::AppError;
use crate::state::AppState;

/// Author recorded for catalog entries that list none.
const UNKNOWN_AUTHOR: &str = "Unknown";

/// HTTP client for the external book catalog.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

// --- Catalog response shape (only the fields we read) ---

#[derive(Debug, Default, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "volumeInfo", default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    published_date: Option<String>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

impl CatalogClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// Search the catalog. The whole lookup is bounded by the configured timeout.
    pub async fn search(&self, query: &str) -> Result<Vec<NewBook>, AppError> {
        let lookup = async {
            let resp = self
                .http
                .get(&self.url)
                .query(&[("q", query)])
                .send()
                .await
                .map_err(|e| AppError::Upstream(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(AppError::Upstream(format!("catalog returned {}", status)));
            }

            resp.json::<VolumesResponse>()
                .await
                .map_err(|e| AppError::Upstream(e.to_string()))
        };

        let volumes = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| AppError::Timeout)??;

        Ok(books_from_volumes(volumes))
    }
}

/// Parse a catalog publication date: `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
/// Partial dates resolve to the first day of the period.
pub fn parse_catalog_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    match raw.len() {
        10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok(),
        4 => NaiveDate::parse_from_str(&format!("{}-01-01", raw), "%Y-%m-%d").ok(),
        _ => None,
    }
}

fn books_from_volumes(volumes: VolumesResponse) -> Vec<NewBook> {
    volumes
        .items
        .into_iter()
        .filter_map(|volume| {
            let info = volume.volume_info;
            let title = info.title.trim().to_string();
            if title.is_empty() {
                return None;
            }

            let Some(published_date) = info.published_date.as_deref().and_then(parse_catalog_date)
            else {
                tracing::warn!(title = %title, "Skipping catalog entry without a usable date");
                return None;
            };

            let author = if info.authors.is_empty() {
                UNKNOWN_AUTHOR.to_string()
            } else {
                info.authors.join(", ")
            };

            let isbn = info
                .industry_identifiers
                .into_iter()
                .find(|id| id.kind == "ISBN_13")
                .map(|id| id.identifier)
                .unwrap_or_default();

            Some(NewBook {
                title,
                author,
                published_date,
                isbn,
                categories: info.categories.join(", "),
                rating: 0,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub query: String,
}

/// GET /api/import-books?query=…
/// Import matching catalog entries for the caller.
pub async fn import_from_catalog(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<ImportQuery>,
) -> Result<Json<Vec<Book>>, AppError> {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::bad_request("Query parameter is required"));
    }

    let found = state.catalog.search(&query).await.inspect_err(|e| {
        tracing::warn!(query = %query, error = %e, "Catalog lookup failed");
    })?;

    let user_id = user.user_id;
    let books = with_conn(&state.db, move |conn| {
        Ok(queries::insert_books(conn, user_id, found)?)
    })
    .await?;

    tracing::info!(user_id, query = %query, imported = books.len(), "Imported books from catalog");
    publish_books(&state.notifier, &books).await;

    Ok(Json(books))
}
