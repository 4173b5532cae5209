//! bookshelf-rs: a small CRUD server for a book catalog with cover uploads.
//!
//! Each book is a row in SQLite plus one cover image in a managed upload
//! directory. The [`catalog::BookCatalog`] service keeps the two in step:
//!
//! - covers are written before the row that names them is inserted
//! - a replaced cover is removed only after the new row state is committed
//! - a deleted row's cover is removed afterwards, best-effort
//!
//! Uploaded covers are served back as static files.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Book record service.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;
/// Upload directory and cover naming.
pub mod uploads;


pub use catalog::BookCatalog;
pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
