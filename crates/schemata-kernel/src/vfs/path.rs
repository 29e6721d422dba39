//! Virtual path scheme: `bpmsoft://<root>/<package>/<file>`.

use std::fmt;

use super::{VfsError, VfsResult};

/// URI scheme of the virtual filesystem.
pub const SCHEME: &str = "bpmsoft";

/// Suffix selecting a client module's stylesheet instead of its body.
pub const LESS_SUFFIX: &str = ".less";

/// A parsed virtual path, at most three segments deep.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsPath {
    root: String,
    package: Option<String>,
    file: Option<String>,
}

impl VfsPath {
    /// Parse either `bpmsoft://root/...` or `/root/...`.
    pub fn parse(raw: &str) -> VfsResult<Self> {
        let rest = match raw.strip_prefix(SCHEME).and_then(|r| r.strip_prefix(':')) {
            Some(after_scheme) => after_scheme.trim_start_matches('/'),
            None => raw
                .strip_prefix('/')
                .ok_or_else(|| VfsError::invalid_path(raw))?,
        };

        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let root = segments
            .next()
            .ok_or_else(|| VfsError::invalid_path(raw))?
            .to_string();
        let package = segments.next().map(str::to_string);
        let file = segments.next().map(str::to_string);
        if segments.next().is_some() {
            return Err(VfsError::invalid_path(raw));
        }
        Ok(Self { root, package, file })
    }

    pub fn root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            package: None,
            file: None,
        }
    }

    pub fn package(root: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            package: Some(package.into()),
            file: None,
        }
    }

    pub fn file(
        root: impl Into<String>,
        package: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            package: Some(package.into()),
            file: Some(file.into()),
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.package.is_none()
    }

    pub fn is_package(&self) -> bool {
        self.package.is_some() && self.file.is_none()
    }

    /// Whether this path addresses stylesheet content.
    pub fn is_less(&self) -> bool {
        self.file.as_deref().is_some_and(|f| f.ends_with(LESS_SUFFIX))
    }

    /// File name with any `.less` suffix removed.
    pub fn less_stem(&self) -> Option<&str> {
        self.file.as_deref().and_then(|f| f.strip_suffix(LESS_SUFFIX))
    }

    /// Full URI form.
    pub fn to_uri(&self) -> String {
        format!("{SCHEME}:/{self}")
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.root)?;
        if let Some(package) = &self.package {
            write!(f, "/{package}")?;
        }
        if let Some(file) = &self.file {
            write!(f, "/{file}")?;
        }
        Ok(())
    }
}
