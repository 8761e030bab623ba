//! The station playlist: every playable file under the source folder,
//! scanned once at startup and fixed for the lifetime of the process.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("source folder {0:?} does not exist")]
    MissingSource(PathBuf),
    #[error("source folder {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no playable files found in {0:?}")]
    Empty(PathBuf),
}

/// Ordered, non-empty list of tracks under `root`.
///
/// Each track has its relative path as found on disk, used to open it, and a
/// `/`-separated identifier for logs and JSON. Identifiers of names that are
/// not valid UTF-8 are lossy; the paths never are.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    paths: Vec<PathBuf>,
    tracks: Vec<String>,
}

impl Catalog {
    /// Walk `root` and collect files whose extension matches one of
    /// `extensions` (case-insensitive). Results are sorted by relative path
    /// so playback order does not depend on directory iteration order.
    pub fn scan(root: &Path, extensions: &[String], recursive: bool) -> Result<Self, CatalogError> {
        if !root.exists() {
            return Err(CatalogError::MissingSource(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(CatalogError::NotADirectory(root.to_path_buf()));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut paths = Vec::new();

        for entry in WalkDir::new(root).follow_links(true).max_depth(max_depth) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("catalog: skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                if rel.to_str().is_none() {
                    tracing::warn!(
                        "catalog: {:?} is not valid UTF-8, listed as {}",
                        rel,
                        track_id(rel)
                    );
                }
                paths.push(rel.to_path_buf());
            }
        }

        paths.sort();
        tracing::debug!("catalog: {} tracks under {:?}", paths.len(), root);
        Self::from_paths(root.to_path_buf(), paths)
    }

    /// Build a catalog from an explicit list of `/`-separated track identifiers.
    pub fn from_tracks(root: PathBuf, tracks: Vec<String>) -> Result<Self, CatalogError> {
        Self::from_paths(root, tracks.into_iter().map(PathBuf::from).collect())
    }

    fn from_paths(root: PathBuf, paths: Vec<PathBuf>) -> Result<Self, CatalogError> {
        if paths.is_empty() {
            return Err(CatalogError::Empty(root));
        }
        let tracks = paths.iter().map(|p| track_id(p)).collect();
        Ok(Self {
            root,
            paths,
            tracks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false for a constructed catalog; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.tracks.get(idx).map(String::as_str)
    }

    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    /// Absolute path of the track at `idx`.
    pub fn path_of(&self, idx: usize) -> Option<PathBuf> {
        self.paths.get(idx).map(|p| self.root.join(p))
    }
}

/// Components joined with `/` whatever the platform separator is.
fn track_id(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
