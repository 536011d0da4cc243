//! Label → identity directory built from the dataset folder layout.
//!
//! Each registered person owns a folder `<label>_<name>` under the dataset
//! root. The integer label is what the recogniser reports; the folder name
//! maps it back to the id and name written to the attendance log.

use crate::types::Identity;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FolderNameError {
    #[error("missing '_' between label and name")]
    MissingSeparator,
    #[error("label is not an integer: {0:?}")]
    InvalidLabel(String),
    #[error("empty name")]
    EmptyName,
    #[error("not a directory")]
    NotADirectory,
}

/// A dataset entry that was left out of the directory, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFolder {
    pub name: String,
    pub reason: FolderNameError,
}

/// Parse a folder name of the form `<label>_<name>`.
///
/// The name is everything after the first `_`, so names may contain
/// underscores. The identity id is the decimal form of the label.
pub fn parse_folder_name(folder: &str) -> Result<(i32, Identity), FolderNameError> {
    let (label, name) = folder
        .split_once('_')
        .ok_or(FolderNameError::MissingSeparator)?;
    let label: i32 = label
        .parse()
        .map_err(|_| FolderNameError::InvalidLabel(label.to_string()))?;
    if name.trim().is_empty() {
        return Err(FolderNameError::EmptyName);
    }
    Ok((label, Identity::new(label.to_string(), name)))
}

/// One entry of the dataset root, parsed.
pub(crate) struct DatasetEntry {
    pub path: PathBuf,
    pub name: String,
    pub parsed: Result<(i32, Identity), FolderNameError>,
}

/// List the dataset root in lexical order, parsing every entry name.
///
/// A missing root yields no entries.
pub(crate) fn dataset_entries(root: &Path) -> io::Result<Vec<DatasetEntry>> {
    let reader = match std::fs::read_dir(root) {
        Ok(r) => r,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(root = %root.display(), "dataset root does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let parsed = if entry.file_type()?.is_dir() {
            parse_folder_name(&name)
        } else {
            Err(FolderNameError::NotADirectory)
        };
        entries.push(DatasetEntry {
            path: entry.path(),
            name,
            parsed,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Read-only mapping from recogniser label to identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityDirectory {
    labels: BTreeMap<i32, Identity>,
    skipped: Vec<SkippedFolder>,
}

impl IdentityDirectory {
    /// Scan `root` for identity folders.
    ///
    /// Malformed entries are recorded in [`skipped`](Self::skipped) and
    /// otherwise ignored. When two folders carry the same label, the one
    /// that sorts last wins.
    pub fn scan(root: &Path) -> io::Result<Self> {
        let mut directory = Self::default();
        for entry in dataset_entries(root)? {
            directory.insert(entry.name, entry.parsed);
        }
        tracing::info!(
            root = %root.display(),
            identities = directory.labels.len(),
            skipped = directory.skipped.len(),
            "identity directory built"
        );
        Ok(directory)
    }

    /// Build from bare folder names, in lexical order.
    pub fn from_folder_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();

        let mut directory = Self::default();
        for name in names {
            let parsed = parse_folder_name(&name);
            directory.insert(name, parsed);
        }
        directory
    }

    fn insert(&mut self, name: String, parsed: Result<(i32, Identity), FolderNameError>) {
        match parsed {
            Ok((label, identity)) => {
                if let Some(previous) = self.labels.insert(label, identity) {
                    tracing::warn!(
                        label,
                        previous = %previous.name,
                        folder = %name,
                        "duplicate label"
                    );
                }
            }
            Err(reason) => {
                tracing::debug!(folder = %name, %reason, "skipping dataset entry");
                self.skipped.push(SkippedFolder { name, reason });
            }
        }
    }

    pub fn resolve(&self, label: i32) -> Option<&Identity> {
        self.labels.get(&label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Entries in label order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Identity)> {
        self.labels.iter().map(|(label, identity)| (*label, identity))
    }

    pub fn skipped(&self) -> &[SkippedFolder] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_well_formed() {
        assert_eq!(
            parse_folder_name("7_Alice"),
            Ok((7, Identity::new("7", "Alice")))
        );
    }

    #[test]
    fn test_parse_name_with_underscore() {
        let (label, identity) = parse_folder_name("12_Mary_Ann").unwrap();
        assert_eq!(label, 12);
        assert_eq!(identity.name, "Mary_Ann");
    }

    #[test]
    fn test_parse_normalises_id() {
        let (_, identity) = parse_folder_name("007_Bond").unwrap();
        assert_eq!(identity.id, "7");
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_folder_name("bogus"), Err(FolderNameError::MissingSeparator));
        assert_eq!(
            parse_folder_name("x1_Bob"),
            Err(FolderNameError::InvalidLabel("x1".into()))
        );
        assert_eq!(parse_folder_name("3_"), Err(FolderNameError::EmptyName));
    }

    #[test]
    fn test_malformed_folder_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("7_Alice")).unwrap();
        fs::create_dir(dir.path().join("bogus")).unwrap();

        let directory = IdentityDirectory::scan(dir.path()).unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve(7), Some(&Identity::new("7", "Alice")));
        assert_eq!(directory.skipped().len(), 1);
        assert_eq!(directory.skipped()[0].name, "bogus");
    }

    #[test]
    fn test_plain_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1_notes.txt"), b"x").unwrap();

        let directory = IdentityDirectory::scan(dir.path()).unwrap();
        assert!(directory.is_empty());
        assert_eq!(directory.skipped()[0].reason, FolderNameError::NotADirectory);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["3_Bob", "1_Ann", "2_Cy", "junk"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let first = IdentityDirectory::scan(dir.path()).unwrap();
        let second = IdentityDirectory::scan(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|(l, _)| l).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_label_last_lexical_wins() {
        let directory = IdentityDirectory::from_folder_names(["5_Zed", "5_Amy"]);
        assert_eq!(directory.resolve(5).map(|i| i.name.as_str()), Some("Zed"));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let directory = IdentityDirectory::scan(&dir.path().join("nope")).unwrap();
        assert!(directory.is_empty());
    }
}
