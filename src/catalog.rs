//! Book record service.
//!
//! Keeps each row and its cover file in step. The row is always committed
//! before any old file is removed, so a readable record never points at a
//! missing cover. File removal after a commit is best-effort: failures are
//! logged and the operation still succeeds, which can leave unreferenced
//! files behind (see [`BookCatalog::prune_orphans`]).
//!
//! No transaction spans the read-then-write steps of update and delete.

use crate::db::{Book, BookChanges, Database, NewBook};
use crate::error::{AppError, Result};
use crate::uploads::UploadDir;
use std::collections::HashSet;

/// Editable book fields.
#[derive(Debug, Clone)]
pub struct BookInput {
    /// Book title.
    pub title: String,
    /// Book description.
    pub description: String,
    /// Price.
    pub price: f64,
}

impl BookInput {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::Validation(format!(
                "price must be a non-negative number, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// An uploaded cover image.
#[derive(Debug, Clone)]
pub struct CoverUpload {
    /// Filename given by the client, used for its extension.
    pub file_name: Option<String>,
    /// File contents.
    pub data: Vec<u8>,
}

/// Create, read, update and delete books together with their covers.
#[derive(Clone)]
pub struct BookCatalog {
    db: Database,
    uploads: UploadDir,
}

impl BookCatalog {
    /// Build the service from an open store and upload directory.
    pub fn new(db: Database, uploads: UploadDir) -> Self {
        Self { db, uploads }
    }

    /// The store handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The upload directory.
    pub fn uploads(&self) -> &UploadDir {
        &self.uploads
    }

    /// All books, in no particular order.
    pub fn list(&self) -> Result<Vec<Book>> {
        self.db.list_books()
    }

    /// One book, or `None` when the ID is unknown.
    pub fn get(&self, id: i64) -> Result<Option<Book>> {
        self.db.get_book(id)
    }

    /// Write the cover, then insert the row. Returns the new ID.
    ///
    /// If the insert fails the freshly written cover is left behind.
    pub fn create(&self, input: BookInput, cover: CoverUpload) -> Result<i64> {
        input.validate()?;

        let cover_name = self.uploads.store(cover.file_name.as_deref(), &cover.data)?;

        let book = NewBook {
            title: input.title,
            description: input.description,
            price: input.price,
            cover: cover_name,
        };

        match self.db.insert_book(&book) {
            Ok(id) => {
                tracing::info!(id, cover = %book.cover, "Book added");
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(cover = %book.cover, "Insert failed, cover left orphaned");
                Err(e)
            }
        }
    }

    /// Replace the fields of a book and, when given, its cover.
    ///
    /// The old cover is removed only after the row update has committed.
    pub fn update(&self, id: i64, input: BookInput, cover: Option<CoverUpload>) -> Result<()> {
        input.validate()?;

        let old_cover = self
            .db
            .get_cover(id)?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let new_cover = match cover {
            Some(upload) => Some(
                self.uploads
                    .store(upload.file_name.as_deref(), &upload.data)?,
            ),
            None => None,
        };

        let changes = BookChanges {
            title: input.title,
            description: input.description,
            price: input.price,
            cover: new_cover.clone(),
        };

        let updated = match self.db.update_book(id, &changes) {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(ref name) = new_cover {
                    self.uploads.remove_best_effort(name);
                }
                return Err(e);
            }
        };

        if !updated {
            // Row vanished between the read and the update.
            if let Some(ref name) = new_cover {
                self.uploads.remove_best_effort(name);
            }
            return Err(AppError::NotFound(id.to_string()));
        }

        if let (Some(new), Some(old)) = (new_cover.as_deref(), old_cover.as_deref()) {
            if new != old {
                self.uploads.remove_best_effort(old);
            }
        }

        tracing::info!(id, cover = ?new_cover, "Book updated");
        Ok(())
    }

    /// Delete a book row, then its cover file.
    pub fn delete(&self, id: i64) -> Result<()> {
        if self.db.get_cover(id)?.is_none() {
            return Err(AppError::NotFound(id.to_string()));
        }

        let cover = self
            .db
            .delete_book(id)?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if let Some(ref name) = cover {
            self.uploads.remove_best_effort(name);
        }

        tracing::info!(id, cover = ?cover, "Book deleted");
        Ok(())
    }

    /// Files in the upload directory that no book refers to.
    pub fn find_orphans(&self) -> Result<Vec<String>> {
        let referenced: HashSet<String> = self.db.list_covers()?.into_iter().collect();

        Ok(self
            .uploads
            .list_files()?
            .into_iter()
            .filter(|name| !referenced.contains(name))
            .collect())
    }

    /// Remove files in the upload directory that no book refers to.
    ///
    /// A create in flight has its file on disk before its row, so this is
    /// meant to run while the server is stopped.
    pub fn prune_orphans(&self) -> Result<PruneReport> {
        let orphans = self.find_orphans()?;
        Ok(self.remove_orphans(orphans))
    }

    /// Remove the given files, sorting them by outcome.
    fn remove_orphans(&self, orphans: Vec<String>) -> PruneReport {
        let mut report = PruneReport::default();
        for name in orphans {
            if self.uploads.remove_best_effort(&name) {
                report.removed.push(name);
            } else {
                report.failed.push(name);
            }
        }
        report
    }
}

/// Outcome of [`BookCatalog::prune_orphans`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Files that were removed.
    pub removed: Vec<String>,
    /// Files that could not be removed; the reason is logged.
    pub failed: Vec<String>,
}
