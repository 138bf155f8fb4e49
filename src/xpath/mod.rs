//! XPath Support for XML Schema
//!
//! This module provides the XPath subset used by identity constraints
//! (`xs:selector`, `xs:field`).
//!
//! ## Overview
//!
//! Expressions are compiled once at schema construction time by
//! [`IdentityXPathParser`] and evaluated in streaming fashion during
//! validation by [`PathMatcher`]: the validation engine pushes and pops
//! elements in document order and asks the matcher whether the current
//! element, or one of its attributes, is selected.
//!
//! ## Limitations
//!
//! Only the restricted grammar of XML Schema 1.0 identity constraints is
//! accepted: child steps, a leading `.//`, `|` unions and a final
//! attribute step for fields. Predicates and other axes are rejected.

mod parsers;
mod selectors;

pub use parsers::{IdcPath, IdentityXPathParser, NameTest, PathAlternative, XPathParseError};
pub use selectors::PathMatcher;
