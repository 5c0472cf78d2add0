//! Glob expansion over the filesystem.
//!
//! Patterns use `globset` syntax, so `input/*.{gif,jpg,png,svg}` works as
//! written. The walk starts at the longest literal prefix of the pattern and
//! matches are returned sorted by path. Wildcards skip dotfiles and dot
//! directories unless a pattern segment itself starts with `.`.

use std::io;
use std::path::{Component, Path, PathBuf};
use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};
use crate::utils::{ConfigError, ConverterError, ConverterResult};

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// A compiled input pattern.
#[derive(Debug, Clone)]
pub struct InputPattern {
    pattern: String,
    matcher: GlobMatcher,
    root: PathBuf,
    max_depth: Option<usize>,
    include_hidden: bool,
}

impl InputPattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| ConfigError::invalid_glob(pattern, e))?
            .compile_matcher();

        let components: Vec<Component<'_>> = Path::new(pattern).components().collect();
        let literal_len = components
            .iter()
            .take_while(|c| !c.as_os_str().to_string_lossy().contains(GLOB_META))
            .count();
        let root: PathBuf = components[..literal_len].iter().collect();
        let rest = &components[literal_len..];
        let recursive = rest.iter().any(|c| c.as_os_str() == "**");
        let include_hidden = rest.iter().any(|c| c.as_os_str().to_string_lossy().starts_with('.'));

        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            root,
            max_depth: (!recursive).then_some(rest.len()),
            include_hidden,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Directory (or file) the walk starts from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        self.matcher.is_match(path)
    }

    /// Every file matching the pattern, sorted by path.
    ///
    /// A missing walk root yields an empty list.
    pub fn expand(&self) -> ConverterResult<Vec<PathBuf>> {
        let relative_to_cwd = self.root.as_os_str().is_empty();
        let walk_root = if relative_to_cwd { Path::new(".") } else { self.root.as_path() };

        let mut walker = WalkDir::new(walk_root).follow_links(true).sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let include_hidden = self.include_hidden;
        let walk = walker
            .into_iter()
            .filter_entry(move |entry| include_hidden || entry.depth() == 0 || !is_hidden(entry));

        let mut matches = Vec::new();
        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 && e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                    warn!("Nothing matches {}: {} does not exist", self.pattern, walk_root.display());
                    return Ok(Vec::new());
                }
                Err(e) => {
                    return Err(ConverterError::optimization(format!(
                        "Failed to scan {}: {}", walk_root.display(), e
                    )));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = if relative_to_cwd {
                entry.path().strip_prefix(".").unwrap_or(entry.path())
            } else {
                entry.path()
            };
            if self.matcher.is_match(path) {
                matches.push(path.to_path_buf());
            }
        }

        debug!("Pattern {} matched {} files", self.pattern, matches.len());
        Ok(matches)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Compiles and expands `pattern` in one go.
pub fn expand_glob(pattern: &str) -> ConverterResult<Vec<PathBuf>> {
    InputPattern::new(pattern)?.expand()
}
