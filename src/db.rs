mod schema;

pub use schema::Database;

use serde::{Deserialize, Serialize};

/// Book record as stored and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Primary key assigned by the store.
    pub id: i64,
    /// Book title.
    pub title: String,
    /// Book description.
    pub description: String,
    /// Price.
    pub price: f64,
    /// Cover filename inside the upload directory.
    pub cover: Option<String>,
}

/// Values for a new row.
#[derive(Debug, Clone)]
pub struct NewBook {
    /// Book title.
    pub title: String,
    /// Book description.
    pub description: String,
    /// Price.
    pub price: f64,
    /// Cover filename, already written to the upload directory.
    pub cover: String,
}

/// Values for an update. `cover` is only written when set.
#[derive(Debug, Clone)]
pub struct BookChanges {
    /// New title.
    pub title: String,
    /// New description.
    pub description: String,
    /// New price.
    pub price: f64,
    /// Replacement cover filename.
    pub cover: Option<String>,
}
