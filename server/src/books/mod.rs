//! Book CRUD, import and export. Every committed mutation publishes a
//! live update through the shared [`Notifier`].

pub mod catalog;
pub mod crud;
pub mod transfer;

use crate::db::models::Book;
use crate::ws::broadcast::Notifier;
use crate::ws::protocol::BookEvent;

/// Publish one change event per book, in order.
pub(crate) async fn publish_books(notifier: &Notifier, books: &[Book]) {
    for book in books {
        notifier.notify(BookEvent::from(book)).await;
    }
}
