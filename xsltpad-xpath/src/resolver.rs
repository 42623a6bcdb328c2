//! Loading of external documents: stylesheet modules, `document()` targets
//! and schema includes.

use std::io;
use std::path::{Path, PathBuf};

/// A loaded external document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    /// The resolved location, used as the base for relative references
    /// made from this document.
    pub uri: String,
    pub text: String,
}

pub trait Resolver: Send + Sync {
    /// Load `href`, relative to `base` if given. `base` is the `uri` of the
    /// document that contains the reference.
    fn load(&self, href: &str, base: Option<&str>) -> io::Result<Loaded>;
}

/// Resolves references against the filesystem.
#[derive(Debug, Clone)]
pub struct FileResolver {
    base_dir: PathBuf,
}

impl FileResolver {
    /// References made without a base document are resolved against
    /// `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// A resolver for references made from the file at `path`.
    pub fn for_file(path: &Path) -> Self {
        Self::new(path.parent().map(Path::to_path_buf).unwrap_or_default())
    }

    fn path(&self, href: &str, base: Option<&str>) -> PathBuf {
        let href = href.strip_prefix("file://").unwrap_or(href);
        let href = Path::new(href);
        if href.is_absolute() {
            return href.to_path_buf();
        }
        let dir = match base {
            Some(base) => {
                let base = base.strip_prefix("file://").unwrap_or(base);
                Path::new(base)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.base_dir.clone())
            }
            None => self.base_dir.clone(),
        };
        dir.join(href)
    }
}

impl Resolver for FileResolver {
    fn load(&self, href: &str, base: Option<&str>) -> io::Result<Loaded> {
        let path = self.path(href, base);
        let text = std::fs::read_to_string(&path)?;
        Ok(Loaded {
            uri: path.to_string_lossy().into_owned(),
            text,
        })
    }
}

/// Refuses every reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl Resolver for NoResolver {
    fn load(&self, href: &str, _base: Option<&str>) -> io::Result<Loaded> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no resolver available to load {}", href),
        ))
    }
}
