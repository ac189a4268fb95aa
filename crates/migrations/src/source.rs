//! Discovery of migration identifiers

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MigrationError, MigrationResult};

/// Ordered, duplicate-free set of migration identifiers.
///
/// Ascending lexicographic order, which for timestamp-prefixed names is
/// chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSet {
    files: Vec<String>,
}

impl MigrationSet {
    /// Build a set from `(identifier, origin)` pairs. `origin` only feeds the
    /// duplicate error message.
    pub fn from_entries<I>(entries: I) -> MigrationResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut files = Vec::new();

        for (file, origin) in entries {
            if let Some(first) = seen.get(&file) {
                return Err(MigrationError::DuplicateIdentifier {
                    file,
                    first: first.clone(),
                    second: origin,
                });
            }
            seen.insert(file.clone(), origin);
            files.push(file);
        }

        files.sort();
        Ok(Self { files })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.files.iter()
    }

    pub fn contains(&self, file: &str) -> bool {
        self.files.binary_search_by(|f| f.as_str().cmp(file)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.files
    }
}

impl IntoIterator for MigrationSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Enumerates the migration identifiers known to the system.
///
/// Scanning is read-only; scanning an unchanged source twice yields the same
/// set.
pub trait MigrationSource: Send + Sync {
    fn scan(&self) -> MigrationResult<MigrationSet>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Migration files in one directory; the identifier is the file stem
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Identifiers paired with the file that defines them, sorted. A missing
    /// directory holds no migrations.
    pub fn scan_paths(&self) -> MigrationResult<Vec<(String, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<String, PathBuf> = HashMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || !self.matches_extension(&path) {
                continue;
            }

            let file = match path.file_stem() {
                Some(stem) if !stem.is_empty() => stem
                    .to_str()
                    .ok_or_else(|| MigrationError::InvalidFileName {
                        path: path.display().to_string(),
                    })?
                    .to_string(),
                _ => continue,
            };

            if let Some(first) = found.get(&file) {
                let (first, second) = ordered_pair(first, &path);
                return Err(MigrationError::DuplicateIdentifier {
                    file,
                    first,
                    second,
                });
            }
            found.insert(file, path);
        }

        let mut paths: Vec<(String, PathBuf)> = found.into_iter().collect();
        paths.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(paths)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

fn ordered_pair(a: &Path, b: &Path) -> (String, String) {
    let (a, b) = (a.display().to_string(), b.display().to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl MigrationSource for DirectorySource {
    fn scan(&self) -> MigrationResult<MigrationSet> {
        let entries = self
            .scan_paths()?
            .into_iter()
            .map(|(file, path)| (file, path.display().to_string()));
        MigrationSet::from_entries(entries)
    }

    fn describe(&self) -> String {
        format!("{}/*.{}", self.dir.display(), self.extension)
    }
}

/// Identifiers declared in code
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    files: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

impl MigrationSource for StaticSource {
    fn scan(&self) -> MigrationResult<MigrationSet> {
        MigrationSet::from_entries(
            self.files
                .iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), format!("entry #{}", i))),
        )
    }

    fn describe(&self) -> String {
        format!("{} declared migrations", self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_static_source_sorts_ascending() {
        let source = StaticSource::new(["002_add_email", "001_create_users", "010_index"]);
        let set = source.scan().unwrap();
        assert_eq!(
            set.as_slice(),
            ["001_create_users", "002_add_email", "010_index"]
        );
        assert!(set.contains("002_add_email"));
        assert!(!set.contains("003"));
    }

    #[test]
    fn test_static_source_rejects_duplicates() {
        let source = StaticSource::new(["001_a", "002_b", "001_a"]);
        match source.scan().unwrap_err() {
            MigrationError::DuplicateIdentifier { file, first, second } => {
                assert_eq!(file, "001_a");
                assert_eq!(first, "entry #0");
                assert_eq!(second, "entry #2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_source_lists_matching_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20240102_000000_add_email.sql"), "").unwrap();
        fs::write(dir.path().join("20240101_000000_create_users.sql"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let source = DirectorySource::new(dir.path(), "sql");
        let set = source.scan().unwrap();
        assert_eq!(
            set.as_slice(),
            ["20240101_000000_create_users", "20240102_000000_add_email"]
        );
        // scanning is repeatable and side-effect free
        assert_eq!(source.scan().unwrap(), set);
    }

    #[test]
    fn test_directory_source_rejects_same_stem() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_create_users.sql"), "").unwrap();
        fs::write(dir.path().join("001_create_users.SQL"), "").unwrap();

        let err = DirectorySource::new(dir.path(), "sql").scan().unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateIdentifier { ref file, .. } if file == "001_create_users"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_file_name_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_create_users.sql"), "").unwrap();
        let name = OsStr::from_bytes(b"002_bad\xff.sql");
        if fs::write(dir.path().join(name), "").is_err() {
            // filesystem refuses non-UTF-8 names
            return;
        }

        let err = DirectorySource::new(dir.path(), "sql").scan().unwrap_err();
        assert!(matches!(err, MigrationError::InvalidFileName { .. }));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path().join("absent"), "sql");
        assert!(source.scan().unwrap().is_empty());
    }
}
