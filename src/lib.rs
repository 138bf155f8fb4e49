//! # wxs
//!
//! An XML Schema 1.0 processor: it assembles schemas from one or more schema
//! documents, checks them against the schema component constraints and
//! validates instance documents against the result.
//!
//! ## Features
//!
//! - Multi-document schemas: `include`, `import`, `redefine` and chameleon
//!   includes, with cycle and duplicate detection
//! - Component fixup: reference resolution, circularity checks, derivation
//!   and restriction checks, attribute-use merging, substitution groups
//! - Content models compiled to deterministic automata, with Unique
//!   Particle Attribution checking
//! - Streaming instance validation from a parsed tree, a pull reader or SAX
//!   callbacks, with default value injection
//! - Identity constraints (`unique`, `key`, `keyref`) and ID/IDREF checking
//! - Structured diagnostics carrying the violated constraint name, file,
//!   line, column and node path
//! - Resource limits against hostile inputs
//!
//! ## Example
//!
//! ```rust,ignore
//! use wxs::Schema;
//!
//! let schema = Schema::parse_file("order.xsd")?;
//! let report = schema.validate_file("order.xml")?;
//! for diagnostic in &report.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! std::process::exit(report.code());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names, documents and resources
pub mod namespaces;
pub mod names;
pub mod locations;
pub mod loaders;
pub mod documents;

// Schema components and engines
pub mod validators;
pub mod automata;
pub mod xpath;

// Re-exports for convenience
pub use error::{Error, Result};
pub use limits::Limits;
pub use validators::{
    code_of, Diagnostic, ErrorCode, ParserOptions, Schema, SchemaParser, ValidationContext, ValidationOptions,
    ValidationReport,
};

/// Version of the wxs library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XSD 1.0 namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
