use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::auth::middleware::CurrentUser;
use crate::db::books as queries;
use crate::db::models::{Book, NewBook};
use crate::db::with_conn;
use crate::error::AppError;
use crate::state::AppState;
use crate::ws::protocol::BookEvent;

/// Highest accepted rating; ratings run 0..=MAX_RATING.
pub const MAX_RATING: i64 = 5;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub categories: String,
    #[serde(default)]
    pub rating: i64,
}

impl From<BookRequest> for NewBook {
    fn from(req: BookRequest) -> Self {
        NewBook {
            title: req.title,
            author: req.author,
            published_date: req.published_date,
            isbn: req.isbn,
            categories: req.categories,
            rating: req.rating,
        }
    }
}

/// Trim text fields and check the invariants every stored book must hold.
pub fn validate_book(book: NewBook) -> Result<NewBook, AppError> {
    let book = NewBook {
        title: book.title.trim().to_string(),
        author: book.author.trim().to_string(),
        isbn: book.isbn.trim().to_string(),
        categories: book.categories.trim().to_string(),
        ..book
    };

    if book.title.is_empty() {
        return Err(AppError::bad_request("Title cannot be empty"));
    }
    if book.author.is_empty() {
        return Err(AppError::bad_request("Author cannot be empty"));
    }
    if !(0..=MAX_RATING).contains(&book.rating) {
        return Err(AppError::bad_request(format!(
            "Rating must be between 0 and {}",
            MAX_RATING
        )));
    }
    Ok(book)
}

// --- Handlers ---

/// GET /api/books
/// List the caller's books.
pub async fn list_books(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Book>>, AppError> {
    let books = with_conn(&state.db, move |conn| {
        Ok(queries::list_books_for_user(conn, user.user_id)?)
    })
    .await?;
    Ok(Json(books))
}

/// POST /api/books
/// Add a book and notify live clients.
pub async fn create_book(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let new_book = validate_book(req.into())?;

    let book = with_conn(&state.db, move |conn| {
        Ok(queries::insert_book(conn, user.user_id, new_book)?)
    })
    .await?;

    tracing::info!(book_id = book.id, user_id = book.user_id, "Book created");
    state.notifier.notify(BookEvent::from(&book)).await;

    Ok((StatusCode::CREATED, Json(book)))
}

/// PUT /api/books/{id}
/// Replace a book's fields and notify live clients.
pub async fn update_book(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(book_id): Path<i64>,
    Json(req): Json<BookRequest>,
) -> Result<Json<Book>, AppError> {
    let changes = validate_book(req.into())?;

    let book = with_conn(&state.db, move |conn| {
        queries::update_book_for_user(conn, book_id, user.user_id, changes)?
            .ok_or(AppError::NotFound)
    })
    .await?;

    tracing::info!(book_id = book.id, user_id = book.user_id, "Book updated");
    state.notifier.notify(BookEvent::from(&book)).await;

    Ok(Json(book))
}

/// DELETE /api/books/{id}
/// Remove a book and notify live clients with its last state.
pub async fn delete_book(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(book_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let book = with_conn(&state.db, move |conn| {
        queries::delete_book_for_user(conn, book_id, user.user_id)?.ok_or(AppError::NotFound)
    })
    .await?;

    tracing::info!(book_id = book.id, user_id = book.user_id, "Book deleted");
    state.notifier.notify(BookEvent::from(book)).await;

    Ok(StatusCode::OK)
}

/// POST /api/book
/// Publish a change event supplied by the caller as-is.
pub async fn publish_book(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(event): Json<BookEvent>,
) -> StatusCode {
    tracing::debug!(book_id = event.id, user_id = user.user_id, "External book event");
    state.notifier.notify(event).await;
    StatusCode::OK
}
