//! Resource location resolution
//!
//! Schema locations found in `<import>`, `<include>` and `<redefine>` are
//! resolved against the base URI of the referencing document. Filesystem
//! paths are resolved lexically, URLs with RFC 3986 reference resolution.

use crate::error::Result;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Resource location - can be a URL, file path, or string identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, ftp, etc.)
    Url(Url),
    /// String identifier (for in-memory resources)
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn from_str(s: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                if let Ok(path) = url.to_file_path() {
                    return Ok(Location::Path(path));
                }
            } else if url.scheme().len() > 1 {
                // Single-letter schemes are Windows drive letters
                return Ok(Location::Url(url));
            }
        }

        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::String(s) => s.clone(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

/// Resolve `reference` against an optional base URI or path.
///
/// The result is the string used as the identity of a schema document when
/// deciding whether it has already been loaded.
pub fn resolve_location(base: Option<&str>, reference: &str) -> Result<String> {
    let reference = reference.trim();
    if let Ok(url) = Url::parse(reference) {
        if url.scheme().len() > 1 {
            return Ok(url.to_string());
        }
    }

    let Some(base) = base else {
        return Ok(normalize_path(Path::new(reference))
            .to_string_lossy()
            .into_owned());
    };

    if let Ok(base_url) = Url::parse(base) {
        if base_url.scheme().len() > 1 {
            return Ok(base_url.join(reference)?.to_string());
        }
    }

    let base_dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    let joined = base_dir.join(reference);
    Ok(normalize_path(&joined).to_string_lossy().into_owned())
}

/// Lexically remove `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::from_str("http://example.com/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::from_str("/tmp/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Path(_)));
        assert!(loc.is_file());
    }

    #[test]
    fn test_location_as_str() {
        let loc = Location::String("test".to_string());
        assert_eq!(loc.as_str(), "test");
    }

    #[test]
    fn test_resolve_relative_path() {
        let resolved = resolve_location(Some("/data/schemas/main.xsd"), "../common/types.xsd").unwrap();
        assert_eq!(resolved, "/data/common/types.xsd");
        let resolved = resolve_location(Some("/data/main.xsd"), "./inc.xsd").unwrap();
        assert_eq!(resolved, "/data/inc.xsd");
    }

    #[test]
    fn test_resolve_against_url() {
        let resolved =
            resolve_location(Some("http://example.com/a/b.xsd"), "c.xsd").unwrap();
        assert_eq!(resolved, "http://example.com/a/c.xsd");
    }

    #[test]
    fn test_resolve_absolute_reference() {
        let resolved = resolve_location(Some("/x/y.xsd"), "http://example.com/z.xsd").unwrap();
        assert_eq!(resolved, "http://example.com/z.xsd");
        assert_eq!(resolve_location(None, "a/./b.xsd").unwrap(), "a/b.xsd");
    }
}
