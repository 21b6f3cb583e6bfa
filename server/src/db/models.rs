//! Database row types for the SQLite schema in migrations.rs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Login credentials read from the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Book owned by a single user. Serialized as-is by the JSON API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    pub isbn: String,
    pub categories: String,
    pub rating: i64,
    pub user_id: i64,
}

/// Book fields supplied by a caller, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    pub isbn: String,
    pub categories: String,
    pub rating: i64,
}

impl NewBook {
    pub fn into_book(self, id: i64, user_id: i64) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            published_date: self.published_date,
            isbn: self.isbn,
            categories: self.categories,
            rating: self.rating,
            user_id,
        }
    }
}
