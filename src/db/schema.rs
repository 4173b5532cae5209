use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const BOOK_COLUMNS: &str = "id, title, description, price, cover";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        cover: row.get(4)?,
    })
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Config(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Config(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                price REAL NOT NULL,
                cover TEXT
            );
            "#,
        )?;

        Ok(())
    }

    /// List all books.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {BOOK_COLUMNS} FROM books"))?;

        let books = stmt
            .query_map([], book_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(books)
    }

    /// Get book by ID.
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        let book = conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                params![id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    /// Get the cover column of a book.
    ///
    /// The outer `None` means no such row; the inner one a row without cover.
    pub fn get_cover(&self, id: i64) -> Result<Option<Option<String>>> {
        let conn = self.conn.lock();
        let cover = conn
            .query_row(
                "SELECT cover FROM books WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(cover)
    }

    /// Insert a book, returning the assigned ID.
    pub fn insert_book(&self, book: &NewBook) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (title, description, cover, price) VALUES (?1, ?2, ?3, ?4)",
            params![book.title, book.description, book.cover, book.price],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Update a book. Returns false when no row matched.
    pub fn update_book(&self, id: i64, changes: &BookChanges) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = match changes.cover {
            Some(ref cover) => conn.execute(
                "UPDATE books SET title = ?1, description = ?2, price = ?3, cover = ?4
                 WHERE id = ?5",
                params![changes.title, changes.description, changes.price, cover, id],
            )?,
            None => conn.execute(
                "UPDATE books SET title = ?1, description = ?2, price = ?3 WHERE id = ?4",
                params![changes.title, changes.description, changes.price, id],
            )?,
        };
        Ok(rows > 0)
    }

    /// Delete a book, returning the cover of the deleted row.
    ///
    /// `None` when no row matched.
    pub fn delete_book(&self, id: i64) -> Result<Option<Option<String>>> {
        let conn = self.conn.lock();
        let cover = conn
            .query_row(
                "DELETE FROM books WHERE id = ?1 RETURNING cover",
                params![id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(cover)
    }

    /// All cover filenames currently referenced.
    pub fn list_covers(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT cover FROM books WHERE cover IS NOT NULL")?;

        let covers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(covers)
    }

    /// Run raw SQL against the store.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Number of stored books.
    pub fn count_books(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count)
    }
}
