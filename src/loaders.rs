//! Resource loading utilities
//!
//! Schema documents are loaded from the filesystem or from an in-memory
//! registry of named sources. Registered sources take precedence, which lets
//! callers assemble multi-document schemas without touching the disk.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::collections::HashMap;
use std::fs;

/// Resource loader for schemas and documents
#[derive(Debug, Clone)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Whether to allow remote resources
    allow_remote: bool,
    /// In-memory documents keyed by their resolved location
    sources: HashMap<String, String>,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            allow_remote: false,
            sources: HashMap::new(),
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether to allow remote resources
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Register an in-memory document under a location
    pub fn with_source(mut self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.add_source(location, content);
        self
    }

    /// Register an in-memory document under a location
    pub fn add_source(&mut self, location: impl Into<String>, content: impl Into<String>) {
        self.sources.insert(location.into(), content.into());
    }

    /// Load a resolved location, consulting registered sources first
    pub fn load_str(&self, location: &str) -> Result<String> {
        if let Some(content) = self.sources.get(location) {
            self.limits.check_xml_size(content.len())?;
            return Ok(content.clone());
        }
        self.load(&Location::from_str(location)?)
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        match location {
            Location::Path(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
                })?;

                self.limits.check_xml_size(content.len())?;

                Ok(content)
            }
            Location::Url(url) => {
                if !self.allow_remote {
                    return Err(Error::Resource(format!(
                        "Remote resources are not allowed: {}",
                        url
                    )));
                }

                Err(Error::Resource(format!(
                    "No transport available for remote resource: {}",
                    url
                )))
            }
            Location::String(s) => {
                self.limits.check_xml_size(s.len())?;
                Ok(s.clone())
            }
        }
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<root>test</root>").unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let loader = Loader::new();
        let content = loader.load(&location).unwrap();

        assert!(content.contains("<root>test</root>"));
    }

    #[test]
    fn test_load_registered_source() {
        let loader = Loader::new().with_source("mem:a.xsd", "<schema/>");
        assert_eq!(loader.load_str("mem:a.xsd").unwrap(), "<schema/>");
        assert!(loader.load_str("/definitely/not/here.xsd").is_err());
    }

    #[test]
    fn test_remote_refused() {
        let loader = Loader::new();
        let err = loader.load_str("http://example.com/a.xsd").unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        let large_content = "x".repeat(11 * 1024 * 1024); // 11 MB
        write!(file, "{}", large_content).unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let loader = Loader::new().with_limits(Limits::strict());
        let result = loader.load(&location);

        // Strict limits (10 MB max) should reject 11MB file
        assert!(result.is_err());
    }
}
