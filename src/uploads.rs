//! Managed directory of uploaded cover images.

use crate::error::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Generates collision-resistant filenames for new covers.
pub trait CoverNamer: Send + Sync {
    /// Next filename, ending in `.ext` when an extension is given.
    fn next_name(&self, ext: Option<&str>) -> String;

    /// Account for names already present in the directory.
    fn observe_existing(&self, _names: &[String]) {}
}

fn with_ext(stem: String, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Millisecond timestamps, bumped so that no two names are equal.
#[derive(Debug, Default)]
pub struct TimestampNamer {
    last: AtomicI64,
}

impl TimestampNamer {
    /// Create a new namer.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

impl CoverNamer for TimestampNamer {
    fn next_name(&self, ext: Option<&str>) -> String {
        with_ext(self.next_stamp().to_string(), ext)
    }

    /// Continue past the highest numeric stem, so a clock that moved back
    /// does not retrace names already on disk.
    fn observe_existing(&self, names: &[String]) {
        let highest = names
            .iter()
            .filter_map(|name| name.split('.').next()?.parse::<i64>().ok())
            .max();
        if let Some(highest) = highest {
            self.last.fetch_max(highest, Ordering::SeqCst);
        }
    }
}

/// Deterministic `prefix-N` names.
#[derive(Debug)]
pub struct SequenceNamer {
    prefix: String,
    next: AtomicU64,
}

impl SequenceNamer {
    /// Start counting from 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl CoverNamer for SequenceNamer {
    fn next_name(&self, ext: Option<&str>) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        with_ext(format!("{}-{}", self.prefix, n), ext)
    }
}

/// Lower-cased extension of an uploaded filename, if it is plain alphanumeric.
pub fn extension_of(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 16 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a stored cover name stays inside the upload directory.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// The upload directory and its naming capability.
#[derive(Clone)]
pub struct UploadDir {
    dir: PathBuf,
    namer: Arc<dyn CoverNamer>,
}

impl UploadDir {
    /// Open the directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>, namer: Arc<dyn CoverNamer>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let uploads = Self { dir, namer };
        uploads.namer.observe_existing(&uploads.list_files()?);
        Ok(uploads)
    }

    /// Directory on disk.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a stored file.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Whether a stored file exists.
    pub fn exists(&self, name: &str) -> bool {
        is_safe_name(name) && self.path_of(name).is_file()
    }

    /// Write a new cover under a generated name and return that name.
    ///
    /// Never overwrites: an existing file with the generated name is an error.
    pub fn store(&self, original_name: Option<&str>, data: &[u8]) -> Result<String> {
        let ext = original_name.and_then(extension_of);
        let name = self.namer.next_name(ext.as_deref());

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_of(&name))?;
        file.write_all(data)?;
        file.sync_all()?;

        tracing::debug!(cover = %name, bytes = data.len(), "Stored cover");
        Ok(name)
    }

    /// Remove a stored file, logging instead of failing.
    ///
    /// Returns whether the file was removed.
    pub fn remove_best_effort(&self, name: &str) -> bool {
        if !is_safe_name(name) {
            tracing::warn!(cover = %name, "Refusing to remove cover outside upload directory");
            return false;
        }

        match std::fs::remove_file(self.path_of(name)) {
            Ok(()) => {
                tracing::debug!(cover = %name, "Removed cover");
                true
            }
            Err(e) => {
                tracing::warn!(cover = %name, error = %e, "Failed to remove cover");
                false
            }
        }
    }

    /// Names of all regular files in the directory.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of("Cover.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("weird.j p g"), None);
    }

    #[test]
    fn unsafe_names_are_detected() {
        assert!(is_safe_name("1700000000000.png"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("../etc/passwd"));
        assert!(!is_safe_name("a\\b"));
    }

    #[test]
    fn timestamp_names_never_repeat() {
        let namer = Arc::new(TimestampNamer::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let namer = namer.clone();
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| namer.next_name(Some("png")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(name.ends_with(".png"));
                assert!(seen.insert(name));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn timestamp_names_continue_past_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("9999999999999.jpg"), b"future").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"skip").unwrap();
        let uploads = UploadDir::new(tmp.path(), Arc::new(TimestampNamer::new())).unwrap();

        let name = uploads.store(Some("x.jpg"), b"new").unwrap();
        let stem: i64 = name.trim_end_matches(".jpg").parse().unwrap();
        assert!(stem > 9_999_999_999_999);
        assert_eq!(
            std::fs::read(tmp.path().join("9999999999999.jpg")).unwrap(),
            b"future"
        );
    }

    #[test]
    fn sequence_names_count_up() {
        let namer = SequenceNamer::new("cover");
        assert_eq!(namer.next_name(Some("jpg")), "cover-1.jpg");
        assert_eq!(namer.next_name(None), "cover-2");
    }

    #[test]
    fn store_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(tmp.path(), Arc::new(SequenceNamer::new("c"))).unwrap();

        let name = uploads.store(Some("front.PNG"), b"png-bytes").unwrap();
        assert_eq!(name, "c-1.png");
        assert!(uploads.exists(&name));
        assert_eq!(std::fs::read(uploads.path_of(&name)).unwrap(), b"png-bytes");
        assert_eq!(uploads.list_files().unwrap(), vec![name.clone()]);

        assert!(uploads.remove_best_effort(&name));
        assert!(!uploads.exists(&name));
        assert!(!uploads.remove_best_effort(&name));
    }

    #[test]
    fn store_does_not_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("c-1.jpg"), b"old").unwrap();
        let uploads = UploadDir::new(tmp.path(), Arc::new(SequenceNamer::new("c"))).unwrap();

        assert!(uploads.store(Some("x.jpg"), b"new").is_err());
        assert_eq!(std::fs::read(tmp.path().join("c-1.jpg")).unwrap(), b"old");
    }

    #[test]
    fn remove_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let inner = tmp.path().join("uploads");
        std::fs::write(tmp.path().join("keep.txt"), b"keep").unwrap();
        let uploads = UploadDir::new(&inner, Arc::new(SequenceNamer::new("c"))).unwrap();

        assert!(!uploads.remove_best_effort("../keep.txt"));
        assert!(tmp.path().join("keep.txt").exists());
    }
}
