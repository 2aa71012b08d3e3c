//! Well-known package folder entries.

use std::path::Path;

/// Standard file and folder names inside a package folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagePath {
    /// The `node_modules` folder holding installed children
    NodeModules,
    /// The `package.json` manifest
    PackageJson,
    /// The hidden lockfile written after an install
    HiddenLockfile,
    /// The project lockfile
    PackageLock,
    /// The publishable lockfile, preferred over `package-lock.json`
    Shrinkwrap,
}

impl PackagePath {
    /// Get the string representation of the path, relative to a package folder.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeModules => "node_modules",
            Self::PackageJson => "package.json",
            Self::HiddenLockfile => "node_modules/.package-lock.json",
            Self::PackageLock => "package-lock.json",
            Self::Shrinkwrap => "npm-shrinkwrap.json",
        }
    }

    /// Join this entry onto a package folder.
    pub fn under(&self, dir: impl AsRef<Path>) -> std::path::PathBuf {
        dir.as_ref().join(self.as_str())
    }
}

impl AsRef<Path> for PackagePath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for PackagePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for PackagePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
