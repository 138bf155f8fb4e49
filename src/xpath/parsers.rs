//! XPath parser for identity constraints
//!
//! `xs:selector` and `xs:field` use a restricted XPath subset:
//!
//! ```text
//! Selector  ::= Path ( '|' Path )*
//! Path      ::= ('.//')? Step ( '/' Step )*
//! Field     ::= FPath ( '|' FPath )*
//! FPath     ::= ('.//')? ( Step '/' )* ( Step | '@' NameTest )
//! Step      ::= '.' | NameTest
//! NameTest  ::= QName | '*' | NCName ':' '*'
//! ```
//!
//! `child::` and `attribute::` may be spelled out. Prefixes are resolved
//! with the namespace bindings in scope on the `xs:selector`/`xs:field`
//! element; an unprefixed name test always means "no namespace".

use std::fmt;

use crate::names::is_valid_ncname;
use crate::namespaces::{NamespaceContext, QName};

/// Node test of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(String),
    /// A QName
    Name(QName),
}

impl NameTest {
    /// Whether a node name passes the test
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(ns) => name.ns() == Some(ns.as_str()),
            NameTest::Name(expected) => expected == name,
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameTest::Any => f.write_str("*"),
            NameTest::Namespace(ns) => write!(f, "{{{}}}*", ns),
            NameTest::Name(name) => write!(f, "{}", name),
        }
    }
}

/// One `|` alternative of a compiled path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAlternative {
    /// Starts with `.//`
    pub descendant: bool,
    /// Child steps, self steps (`.`) removed
    pub steps: Vec<NameTest>,
    /// Final `@NameTest` of a field path
    pub attribute: Option<NameTest>,
}

impl PathAlternative {
    /// Whether the path selects the context node itself
    pub fn selects_context(&self) -> bool {
        self.steps.is_empty() && self.attribute.is_none()
    }
}

/// A compiled selector or field expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdcPath {
    /// The expression as written
    pub source: String,
    /// `|` alternatives
    pub alternatives: Vec<PathAlternative>,
}

impl IdcPath {
    /// Whether any alternative ends on an attribute
    pub fn selects_attributes(&self) -> bool {
        self.alternatives.iter().any(|a| a.attribute.is_some())
    }
}

impl fmt::Display for IdcPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// XPath parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XPathParseError {
    /// Unknown or forbidden axis
    UnknownAxis(String),
    /// Invalid syntax
    InvalidSyntax(String),
    /// Prefix without a namespace binding
    UnboundPrefix(String),
    /// Unexpected end of expression
    UnexpectedEnd,
}

impl fmt::Display for XPathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAxis(axis) => write!(f, "axis '{}' is not allowed here", axis),
            Self::InvalidSyntax(msg) => write!(f, "invalid XPath syntax: {}", msg),
            Self::UnboundPrefix(prefix) => write!(f, "prefix '{}' is not bound to a namespace", prefix),
            Self::UnexpectedEnd => write!(f, "unexpected end of XPath expression"),
        }
    }
}

impl std::error::Error for XPathParseError {}

/// Parser for identity constraint XPath (xs:selector, xs:field)
#[derive(Debug, Clone)]
pub struct IdentityXPathParser {
    /// Whether a final attribute step is allowed
    allow_attributes: bool,
}

impl Default for IdentityXPathParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityXPathParser {
    /// Create a new parser for selector expressions
    pub fn new() -> Self {
        Self {
            allow_attributes: false,
        }
    }

    /// Create a parser for field expressions (allows attributes)
    pub fn for_field() -> Self {
        Self {
            allow_attributes: true,
        }
    }

    /// Parse an identity constraint XPath expression
    pub fn parse(&self, xpath: &str, namespaces: &NamespaceContext) -> Result<IdcPath, XPathParseError> {
        let alternatives = xpath
            .split('|')
            .map(|alt| self.parse_alternative(alt, namespaces))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IdcPath {
            source: xpath.trim().to_string(),
            alternatives,
        })
    }

    fn parse_alternative(&self, text: &str, namespaces: &NamespaceContext) -> Result<PathAlternative, XPathParseError> {
        let mut rest = text.trim();
        if rest.is_empty() {
            return Err(XPathParseError::UnexpectedEnd);
        }

        let mut descendant = false;
        if let Some(after) = rest.strip_prefix(".//") {
            descendant = true;
            rest = after.trim_start();
        } else if rest.starts_with('/') {
            return Err(XPathParseError::InvalidSyntax(format!(
                "'{}': absolute paths are not allowed",
                text.trim()
            )));
        }

        let raw_steps: Vec<&str> = rest.split('/').map(str::trim).collect();
        let mut steps = Vec::new();
        let mut attribute = None;
        for (i, raw) in raw_steps.iter().enumerate() {
            let last = i + 1 == raw_steps.len();
            if raw.is_empty() {
                // `//` in the middle, or a trailing `/`
                return Err(XPathParseError::InvalidSyntax(format!(
                    "'{}': '//' is only allowed at the start",
                    text.trim()
                )));
            }
            if *raw == "." || *raw == "self::node()" {
                continue;
            }
            let (is_attribute, test) = if let Some(t) = raw.strip_prefix('@') {
                (true, t.trim())
            } else if let Some(t) = raw.strip_prefix("attribute::") {
                (true, t.trim())
            } else if let Some(t) = raw.strip_prefix("child::") {
                (false, t.trim())
            } else if let Some((axis, _)) = raw.split_once("::") {
                return Err(XPathParseError::UnknownAxis(axis.trim().to_string()));
            } else {
                (false, *raw)
            };

            let test = parse_name_test(test, namespaces)?;
            if is_attribute {
                if !self.allow_attributes {
                    return Err(XPathParseError::UnknownAxis("attribute".to_string()));
                }
                if !last {
                    return Err(XPathParseError::InvalidSyntax(format!(
                        "'{}': the attribute step must be the last one",
                        text.trim()
                    )));
                }
                attribute = Some(test);
            } else {
                steps.push(test);
            }
        }

        Ok(PathAlternative {
            descendant,
            steps,
            attribute,
        })
    }
}

fn parse_name_test(test: &str, namespaces: &NamespaceContext) -> Result<NameTest, XPathParseError> {
    if test == "*" {
        return Ok(NameTest::Any);
    }
    if test.contains('[') || test.contains('(') {
        return Err(XPathParseError::InvalidSyntax(format!(
            "'{}': predicates and node-type tests are not allowed",
            test
        )));
    }
    match test.split_once(':') {
        Some((prefix, "*")) => {
            let ns = lookup_prefix(prefix, namespaces)?;
            Ok(NameTest::Namespace(ns))
        }
        Some((prefix, local)) => {
            if !is_valid_ncname(local) {
                return Err(XPathParseError::InvalidSyntax(format!("'{}' is not a QName", test)));
            }
            let ns = lookup_prefix(prefix, namespaces)?;
            Ok(NameTest::Name(QName::namespaced(ns, local)))
        }
        None => {
            if !is_valid_ncname(test) {
                return Err(XPathParseError::InvalidSyntax(format!("'{}' is not a name test", test)));
            }
            Ok(NameTest::Name(QName::local(test)))
        }
    }
}

fn lookup_prefix(prefix: &str, namespaces: &NamespaceContext) -> Result<String, XPathParseError> {
    if !is_valid_ncname(prefix) {
        return Err(XPathParseError::InvalidSyntax(format!("'{}' is not a prefix", prefix)));
    }
    namespaces
        .get_namespace(prefix)
        .map(String::from)
        .ok_or_else(|| XPathParseError::UnboundPrefix(prefix.to_string()))
}
