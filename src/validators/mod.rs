//! XML Schema validators
//!
//! Schema components, schema construction and instance validation.

// Component model
pub mod base;
pub mod builtins;
pub mod helpers;
pub mod values;
pub mod facets;
pub mod simple_types;
pub mod attributes;
pub mod wildcards;
pub mod particles;
pub mod groups;
pub mod complex_types;
pub mod elements;
pub mod identities;
pub mod globals;

// Construction
pub mod exceptions;
pub mod parsing;
pub mod builders;
pub mod fixup;
pub mod schemas;

// Instance validation
pub mod validation;
pub mod document_validation;
mod idc;

// Re-exports
pub use base::{Components, DerivationMethod, DerivationSet, ElementId, TypeDef, TypeId, TypeKind};
pub use builders::{Bucket, BucketKind, ParserOptions, SchemaParser};
pub use document_validation::{
    parse_sax, validate_pull, NodeType, PullReader, SaxHandler, ValidatingHandler, XmlPullReader,
};
pub use exceptions::{Diagnostic, DiagnosticCallback, Domain, ErrorCode, ErrorReporter, Level};
pub use idc::IdcNodeTable;
pub use schemas::{NamespaceView, Schema, SchemaSummary};
pub use validation::{code_of, Locator, Position, ValidationContext, ValidationOptions, ValidationReport};
pub use values::XsdValue;
