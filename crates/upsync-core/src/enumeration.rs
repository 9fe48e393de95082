use eyre::{bail, eyre, Result};
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A regular file selected for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Where candidates come from: an explicit list of paths (used verbatim) or
/// a recursive walk of the scan root.
#[derive(Debug, Clone)]
pub enum CandidateSource {
    List(Vec<PathBuf>),
    Walk(PathBuf),
}

impl CandidateSource {
    /// Turn the source into a lazy, depth-first sequence of files. Only a
    /// missing walk root is reported here; everything else surfaces while
    /// iterating.
    pub fn into_files(self) -> Result<LocalFiles> {
        let inner = match self {
            CandidateSource::List(paths) => Inner::List(paths.into_iter()),
            CandidateSource::Walk(root) => {
                if !root.exists() {
                    bail!("enumeration root does not exist: {}", root.display());
                }
                let walker = WalkDir::new(&root).follow_links(false).into_iter();
                Inner::Walk { root, walker }
            }
        };
        Ok(LocalFiles { inner, done: false })
    }
}

enum Inner {
    List(std::vec::IntoIter<PathBuf>),
    Walk {
        root: PathBuf,
        walker: walkdir::IntoIter,
    },
}

/// Iterator over candidate files. Yields `Err` only for failures that must
/// stop the run; per-entry problems are logged and skipped.
pub struct LocalFiles {
    inner: Inner,
    done: bool,
}

impl Iterator for LocalFiles {
    type Item = Result<LocalFile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = match &mut self.inner {
            Inner::List(paths) => next_listed(paths).map(Ok),
            Inner::Walk { root, walker } => next_walked(root, walker),
        };
        if matches!(next, Some(Err(_))) {
            self.done = true;
        }
        next
    }
}

fn next_listed(paths: &mut std::vec::IntoIter<PathBuf>) -> Option<LocalFile> {
    for path in paths.by_ref() {
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(meta) => {
                return Some(LocalFile {
                    path,
                    size: meta.len(),
                })
            }
            Err(err) => {
                log::error!("failed to open file {:?}, {}", path.display(), err);
                continue;
            }
        }
    }
    None
}

fn next_walked(root: &Path, walker: &mut walkdir::IntoIter) -> Option<Result<LocalFile>> {
    for next in walker.by_ref() {
        let entry = match next {
            Ok(e) => e,
            Err(err) => {
                if err.depth() == 0 || !root.exists() {
                    return Some(Err(eyre!("failed to walk {}: {}", root.display(), err)));
                }
                log::warn!("skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };

        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        }

        // Regular files directly, symlinks only when they resolve to one.
        let metadata = if file_type.is_file() {
            entry.metadata().map_err(|err| err.to_string())
        } else if file_type.is_symlink() {
            fs::metadata(path).map_err(|err| err.to_string())
        } else {
            continue;
        };

        match metadata {
            Ok(meta) if meta.is_file() => {
                return Some(Ok(LocalFile {
                    path: path.to_path_buf(),
                    size: meta.len(),
                }))
            }
            Ok(_) => continue,
            Err(err) => {
                log::warn!("failed to stat {}: {}", path.display(), err);
                continue;
            }
        }
    }
    None
}
