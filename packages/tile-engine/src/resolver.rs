//! Mapping logical tile paths to files
//!
//! The loader only ever asks for paths relative to the sample's top folder
//! (`4/4/default.0.tif`). A resolver turns those into something openable;
//! [`LocalFileResolver`] serves a folder on local disk.

use std::path::{Path, PathBuf};

pub trait FileResolver: Send + Sync {
    /// Local path for `relative`, whether or not it exists
    fn resolve(&self, relative: &Path) -> PathBuf;

    fn exists(&self, relative: &Path) -> bool {
        self.resolve(relative).is_file()
    }
}

/// Resolves paths under a local top folder
#[derive(Debug, Clone)]
pub struct LocalFileResolver {
    root: PathBuf,
}

impl LocalFileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileResolver for LocalFileResolver {
    fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_under_root() {
        let resolver = LocalFileResolver::new("/data/sample");
        assert_eq!(
            resolver.resolve(Path::new("1/2/default.0.tif")),
            PathBuf::from("/data/sample/1/2/default.0.tif")
        );
        assert!(!resolver.exists(Path::new("definitely/not/here.tif")));
    }
}
