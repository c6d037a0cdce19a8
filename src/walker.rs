use anyhow::{Context, Result};
use log::debug;
use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::models::SourceUnit;

/// A directory tree of source files with a single extension.
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    extension: String,
}

impl Corpus {
    pub fn new(root: impl AsRef<Path>, extension: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yields every matching file under the root.
    ///
    /// Entries are sorted by file name within each directory so repeated runs
    /// over an unchanged tree visit files in the same order.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| !e.file_type().is_dir())
            .filter(move |e| {
                e.path()
                    .extension()
                    .map_or(false, |ext| ext == self.extension.as_str())
            })
            .map(|e| e.into_path())
    }

    /// Lazily yields the contents of every readable file. Files that fail to
    /// read are skipped.
    pub fn units(&self) -> impl Iterator<Item = SourceUnit> + '_ {
        self.files().filter_map(|path| match read_unit(&path) {
            Ok(unit) => Some(unit),
            Err(err) => {
                debug!("{:#}", err);
                None
            }
        })
    }

    /// Feeds each source unit to `visit` until it breaks, returning the break
    /// value, or `None` once the corpus is exhausted.
    pub fn visit<B, F>(&self, mut visit: F) -> Option<B>
    where
        F: FnMut(&SourceUnit) -> ControlFlow<B>,
    {
        for unit in self.units() {
            if let ControlFlow::Break(found) = visit(&unit) {
                return Some(found);
            }
        }
        None
    }
}

fn read_unit(path: &Path) -> Result<SourceUnit> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Skipping unreadable source file: {:?}", path))?;
    Ok(SourceUnit {
        path: path.to_path_buf(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_files_filters_by_extension_and_recurses() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("api/v1")).unwrap();
        fs::write(dir.path().join("main.go"), "package main").unwrap();
        fs::write(dir.path().join("README.md"), "# readme").unwrap();
        fs::write(dir.path().join("api/v1/users.go"), "package v1").unwrap();

        let corpus = Corpus::new(dir.path(), "go");
        let mut names: Vec<String> = corpus
            .files()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();

        assert_eq!(names, vec!["main.go", "users.go"]);
    }

    #[test]
    fn test_units_skip_non_utf8_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.go"), "package a").unwrap();
        fs::write(dir.path().join("b.go"), b"\xff\xfe\x00\xc3").unwrap();

        let corpus = Corpus::new(dir.path(), "go");
        let units: Vec<SourceUnit> = corpus.units().collect();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "package a");
    }

    #[test]
    fn test_visit_stops_on_break() {
        let dir = tempdir().unwrap();
        for name in ["a.go", "b.go", "c.go"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let corpus = Corpus::new(dir.path(), "go");
        let mut seen = 0;
        let found = corpus.visit(|unit| {
            seen += 1;
            if unit.text == "b.go" {
                ControlFlow::Break(unit.path.clone())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(found, Some(dir.path().join("b.go")));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_visit_returns_none_when_exhausted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.go"), "package a").unwrap();

        let corpus = Corpus::new(dir.path(), "go");
        let found: Option<()> = corpus.visit(|_| ControlFlow::Continue(()));

        assert!(found.is_none());
    }
}
