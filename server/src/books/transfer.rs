//! JSON export and CSV bulk import.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;

use crate::auth::middleware::CurrentUser;
use crate::books::crud::validate_book;
use crate::books::publish_books;
use crate::db::books as queries;
use crate::db::models::{Book, NewBook};
use crate::db::with_conn;
use crate::error::AppError;
use crate::state::AppState;

/// Columns per CSV row: title, author, (unused), published_date, isbn, categories, rating.
const CSV_COLUMNS: usize = 7;

/// Multipart field carrying the CSV upload.
const UPLOAD_FIELD: &str = "file";

/// GET /api/export-books
/// Download the caller's books as a JSON file.
pub async fn export_books(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Response, AppError> {
    let books = with_conn(&state.db, move |conn| {
        Ok(queries::list_books_for_user(conn, user.user_id)?)
    })
    .await?;

    let body = serde_json::to_vec_pretty(&books)
        .map_err(|e| AppError::internal(format!("export encoding failed: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, "attachment; filename=books.json"),
        ],
        body,
    )
        .into_response())
}

/// Parse a header-less CSV upload. Fails on the first bad row; rows are
/// numbered from 1 in error messages.
pub fn parse_csv(data: &[u8]) -> Result<Vec<NewBook>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut books = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record =
            record.map_err(|e| AppError::bad_request(format!("Row {}: {}", row, e)))?;
        let book = parse_row(&record)
            .and_then(validate_book)
            .map_err(|e| AppError::bad_request(format!("Row {}: {}", row, e)))?;
        books.push(book);
    }
    Ok(books)
}

fn parse_row(record: &csv::StringRecord) -> Result<NewBook, AppError> {
    if record.len() != CSV_COLUMNS {
        return Err(AppError::bad_request(format!(
            "expected {} columns, found {}",
            CSV_COLUMNS,
            record.len()
        )));
    }

    let field = |i: usize| record.get(i).unwrap_or_default().to_string();

    let published_date = NaiveDate::parse_from_str(&field(3), "%Y-%m-%d").map_err(|_| {
        AppError::bad_request(format!("invalid published date '{}'", field(3)))
    })?;

    let raw_rating = field(6);
    let rating = if raw_rating.is_empty() {
        0
    } else {
        raw_rating
            .parse::<i64>()
            .map_err(|_| AppError::bad_request(format!("invalid rating '{}'", raw_rating)))?
    };

    Ok(NewBook {
        title: field(0),
        author: field(1),
        published_date,
        isbn: field(4),
        categories: field(5),
        rating,
    })
}

/// POST /api/import-books
/// Import every row of an uploaded CSV, or none.
pub async fn import_from_csv(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<Vec<Book>>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            upload = Some(bytes);
            break;
        }
    }

    let Some(data) = upload else {
        return Err(AppError::bad_request("Missing 'file' upload"));
    };

    let parsed = parse_csv(&data).inspect_err(|e| {
        tracing::warn!(user_id = user.user_id, error = %e, "Rejected CSV import");
    })?;

    let user_id = user.user_id;
    let books = with_conn(&state.db, move |conn| {
        Ok(queries::insert_books(conn, user_id, parsed)?)
    })
    .await?;

    tracing::info!(user_id, imported = books.len(), "Imported books from CSV");
    publish_books(&state.notifier, &books).await;

    Ok(Json(books))
}
