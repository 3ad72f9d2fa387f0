//! Static bundle resolution.
//!
//! # Responsibilities
//! - Strip a root's mount prefix and map the remainder under its directory
//! - Refuse any path that escapes the bundle directory
//! - Fall back to the bundle's index file for unresolved paths (SPA routing)
//! - Fall through across all mounted roots for unrouted requests
//!
//! # Design Decisions
//! - Traversal is rejected twice: lexically (`..`, absolute prefixes) and
//!   after canonicalization (symlinks pointing outside the bundle)
//! - Dot-files are treated as absent
//! - All filesystem access goes through `tokio::fs`

use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::config::StaticRootConfig;

/// Index served for directory requests when a root configures none.
const DEFAULT_DIRECTORY_INDEX: &str = "index.html";

/// Error type for static resolution.
#[derive(Debug, thiserror::Error)]
pub enum StaticError {
    /// No file and no index fallback.
    #[error("no such file")]
    NotFound,
    /// The resolved path would leave the bundle directory.
    #[error("path escapes the bundle directory")]
    Forbidden,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The requested file exists.
    File(PathBuf),
    /// The requested file is missing; this is the bundle's index file.
    Fallback(PathBuf),
}

impl Resolution {
    pub fn path(&self) -> &Path {
        match self {
            Resolution::File(p) | Resolution::Fallback(p) => p,
        }
    }
}

/// A bundle directory mounted under a URL prefix.
#[derive(Debug, Clone)]
pub struct StaticRoot {
    name: String,
    mount_prefix: String,
    directory: PathBuf,
    index_file: Option<PathBuf>,
}

impl StaticRoot {
    pub fn new(
        name: impl Into<String>,
        mount_prefix: impl Into<String>,
        directory: impl Into<PathBuf>,
        index_file: Option<&str>,
    ) -> io::Result<Self> {
        let mount_prefix = mount_prefix.into();
        let mount_prefix = match mount_prefix.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };

        Ok(Self {
            name: name.into(),
            mount_prefix,
            directory: std::path::absolute(directory.into())?,
            index_file: index_file.map(PathBuf::from),
        })
    }

    pub fn from_config(config: &StaticRootConfig) -> io::Result<Self> {
        Self::new(
            config.name.clone(),
            config.mount_prefix.clone(),
            config.directory.clone(),
            config.index_file.as_deref(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn has_index(&self) -> bool {
        self.index_file.is_some()
    }

    /// Whether `request_path` lies under this root's mount, on a segment
    /// boundary (`/app` contains `/app` and `/app/x`, not `/application`).
    pub fn contains(&self, request_path: &str) -> bool {
        if self.mount_prefix == "/" {
            return true;
        }
        match request_path.strip_prefix(self.mount_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// The part of `request_path` below the mount. Paths outside the mount
    /// map to the bundle root.
    pub fn relative_path<'a>(&self, request_path: &'a str) -> &'a str {
        if self.mount_prefix == "/" {
            return request_path;
        }
        if self.contains(request_path) {
            &request_path[self.mount_prefix.len()..]
        } else {
            ""
        }
    }

    /// Resolve a mount-relative path, falling back to the index file.
    pub async fn resolve(&self, relative_path: &str) -> Result<Resolution, StaticError> {
        match self.lookup(relative_path).await? {
            Some(path) => Ok(Resolution::File(path)),
            None => self.resolve_index().await,
        }
    }

    /// Resolve the bundle's index file.
    pub async fn resolve_index(&self) -> Result<Resolution, StaticError> {
        let index = self.index_file.as_ref().ok_or(StaticError::NotFound)?;
        let candidate = self.directory.join(index);

        match self.existing_file(&candidate).await? {
            Some(path) => Ok(Resolution::Fallback(path)),
            None => Err(StaticError::NotFound),
        }
    }

    /// Find the file a mount-relative path names, without any fallback.
    pub async fn lookup(&self, relative_path: &str) -> Result<Option<PathBuf>, StaticError> {
        let Some(relative) = normalize(relative_path)? else {
            return Ok(None);
        };
        let candidate = self.directory.join(&relative);

        let meta = match tokio::fs::metadata(&candidate).await {
            Ok(meta) => meta,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            let index = self
                .index_file
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_DIRECTORY_INDEX));
            return self.existing_file(&candidate.join(index)).await;
        }

        self.existing_file(&candidate).await
    }

    /// Canonicalize `candidate` and confirm it is a regular file inside the
    /// bundle directory.
    async fn existing_file(&self, candidate: &Path) -> Result<Option<PathBuf>, StaticError> {
        let real = match tokio::fs::canonicalize(candidate).await {
            Ok(real) => real,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let root = tokio::fs::canonicalize(&self.directory).await?;

        if !real.starts_with(&root) {
            tracing::warn!(root = %self.name(), "Rejected path resolving outside bundle");
            return Err(StaticError::Forbidden);
        }

        match tokio::fs::metadata(&real).await {
            Ok(meta) if meta.is_file() => Ok(Some(real)),
            Ok(_) => Ok(None),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// All mounted roots, consulted in registration order.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    roots: Vec<StaticRoot>,
}

impl StaticResolver {
    pub fn new(roots: Vec<StaticRoot>) -> Self {
        Self { roots }
    }

    pub fn from_config(configs: &[StaticRootConfig]) -> io::Result<Self> {
        let roots = configs
            .iter()
            .map(StaticRoot::from_config)
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { roots })
    }

    /// Look up a root by name.
    pub fn root(&self, name: &str) -> Option<&StaticRoot> {
        self.roots.iter().find(|r| r.name == name)
    }

    pub fn roots(&self) -> &[StaticRoot] {
        &self.roots
    }

    /// Resolve a request path that no route claimed. The first mounted root
    /// holding the file wins; otherwise the first containing root with an
    /// index serves it; otherwise NotFound.
    pub async fn resolve(&self, request_path: &str) -> Result<Resolution, StaticError> {
        let mut fallback: Option<&StaticRoot> = None;

        for root in self.roots.iter().filter(|r| r.contains(request_path)) {
            if let Some(path) = root.lookup(root.relative_path(request_path)).await? {
                return Ok(Resolution::File(path));
            }
            if fallback.is_none() && root.has_index() {
                fallback = Some(root);
            }
        }

        match fallback {
            Some(root) => root.resolve_index().await,
            None => Err(StaticError::NotFound),
        }
    }
}

/// Turn a URL path into a relative filesystem path.
///
/// Returns `Ok(None)` for paths no bundle file can have (hidden entries,
/// invalid UTF-8, NUL bytes) and `Err(Forbidden)` for anything that could
/// climb out of the root.
fn normalize(relative_path: &str) -> Result<Option<PathBuf>, StaticError> {
    let Ok(decoded) = percent_decode_str(relative_path).decode_utf8() else {
        return Ok(None);
    };

    if decoded.contains('\0') {
        return Ok(None);
    }

    let mut normalized = PathBuf::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(StaticError::Forbidden),
            s if s.starts_with('.') => return Ok(None),
            s => {
                let mut components = Path::new(s).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(part)), None) => normalized.push(part),
                    _ => return Err(StaticError::Forbidden),
                }
            }
        }
    }

    Ok(Some(normalized))
}

fn is_missing(e: &io::Error) -> bool {
    // ENOTDIR: a parent component is a regular file.
    matches!(e.kind(), io::ErrorKind::NotFound) || e.raw_os_error() == Some(20)
}
