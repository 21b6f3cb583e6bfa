//! Book queries. Every read and write is scoped to the owning user.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Book, NewBook};

const BOOK_COLUMNS: &str =
    "id, title, author, published_date, isbn, categories, rating, user_id";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        published_date: row.get(3)?,
        isbn: row.get(4)?,
        categories: row.get(5)?,
        rating: row.get(6)?,
        user_id: row.get(7)?,
    })
}

/// Insert one book for `user_id` and return the stored row.
pub fn insert_book(conn: &Connection, user_id: i64, book: NewBook) -> rusqlite::Result<Book> {
    conn.execute(
        "INSERT INTO books (title, author, published_date, isbn, categories, rating, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            book.title,
            book.author,
            book.published_date,
            book.isbn,
            book.categories,
            book.rating,
            user_id
        ],
    )?;
    Ok(book.into_book(conn.last_insert_rowid(), user_id))
}

/// Insert a batch in one transaction. Either every book is stored or none is.
pub fn insert_books(
    conn: &mut Connection,
    user_id: i64,
    books: Vec<NewBook>,
) -> rusqlite::Result<Vec<Book>> {
    let tx = conn.transaction()?;
    let mut stored = Vec::with_capacity(books.len());
    for book in books {
        stored.push(insert_book(&tx, user_id, book)?);
    }
    tx.commit()?;
    Ok(stored)
}

pub fn list_books_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<Book>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM books WHERE user_id = ?1 ORDER BY id ASC",
        BOOK_COLUMNS
    ))?;
    let books = stmt
        .query_map([user_id], book_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(books)
}

pub fn get_book_for_user(
    conn: &Connection,
    id: i64,
    user_id: i64,
) -> rusqlite::Result<Option<Book>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM books WHERE id = ?1 AND user_id = ?2",
            BOOK_COLUMNS
        ),
        params![id, user_id],
        book_from_row,
    )
    .optional()
}

/// Replace all editable fields. Returns `None` if the book does not exist
/// or belongs to another user.
pub fn update_book_for_user(
    conn: &Connection,
    id: i64,
    user_id: i64,
    book: NewBook,
) -> rusqlite::Result<Option<Book>> {
    let rows = conn.execute(
        "UPDATE books SET title = ?1, author = ?2, published_date = ?3, isbn = ?4,
                categories = ?5, rating = ?6
         WHERE id = ?7 AND user_id = ?8",
        params![
            book.title,
            book.author,
            book.published_date,
            book.isbn,
            book.categories,
            book.rating,
            id,
            user_id
        ],
    )?;

    if rows == 0 {
        return Ok(None);
    }
    Ok(Some(book.into_book(id, user_id)))
}

/// Delete a book and return the row as it was just before deletion.
pub fn delete_book_for_user(
    conn: &mut Connection,
    id: i64,
    user_id: i64,
) -> rusqlite::Result<Option<Book>> {
    let tx = conn.transaction()?;
    let Some(book) = get_book_for_user(&tx, id, user_id)? else {
        return Ok(None);
    };
    tx.execute(
        "DELETE FROM books WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    tx.commit()?;
    Ok(Some(book))
}
