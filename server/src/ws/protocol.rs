//! JSON wire format for live book events.
//!
//! A frame carries exactly one [`BookEvent`]. All fields are required on
//! read, unknown fields are ignored, and every field is written.

use axum::extract::ws::Message;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::models::Book;

/// Immutable snapshot of a book at the moment it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEvent {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    pub isbn: String,
    pub categories: String,
    pub rating: i64,
    pub user_id: i64,
}

impl From<Book> for BookEvent {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            published_date: book.published_date,
            isbn: book.isbn,
            categories: book.categories,
            rating: book.rating,
            user_id: book.user_id,
        }
    }
}

impl From<&Book> for BookEvent {
    fn from(book: &Book) -> Self {
        book.clone().into()
    }
}

pub fn decode_event(payload: &[u8]) -> Result<BookEvent, serde_json::Error> {
    serde_json::from_slice(payload)
}

pub fn encode_event(event: &BookEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Build the text frame sent to every client for `event`.
pub fn event_frame(event: &BookEvent) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(encode_event(event)?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dune() -> BookEvent {
        BookEvent {
            id: 1,
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            published_date: NaiveDate::from_ymd_opt(1965, 6, 1).unwrap(),
            isbn: "9780441013593".to_string(),
            categories: "sci-fi".to_string(),
            rating: 5,
            user_id: 7,
        }
    }

    #[test]
    fn test_encode_emits_exact_shape() {
        let encoded = encode_event(&dune()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "title": "Dune",
                "author": "Herbert",
                "published_date": "1965-06-01",
                "isbn": "9780441013593",
                "categories": "sci-fi",
                "rating": 5,
                "user_id": 7
            })
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let payload = json!({
            "id": 1,
            "title": "Dune",
            "author": "Herbert",
            "published_date": "1965-06-01",
            "isbn": "9780441013593",
            "categories": "sci-fi",
            "rating": 5,
            "user_id": 7,
            "origin": "scanner"
        });
        let event = decode_event(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event, dune());
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(decode_event(b"not json at all").is_err());
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let payload = json!({ "id": 1, "title": "Dune" });
        assert!(decode_event(payload.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_date() {
        let mut payload = serde_json::to_value(dune()).unwrap();
        payload["published_date"] = json!("June 1965");
        assert!(decode_event(payload.to_string().as_bytes()).is_err());
    }
}
