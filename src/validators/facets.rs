//! XSD constraining facets
//!
//! This module implements XSD facets that constrain simple types: the
//! facet records produced by the parser, the per-value checks used during
//! validation, and translation of XSD regular expressions to the `regex`
//! crate dialect.

use crate::error::{Error, Result};
use crate::namespaces::NamespaceContext;
use regex::Regex;
use std::fmt;

use super::base::SourcePos;
use super::helpers::decimal_digits;
use super::values::{canonical, compare_values, values_equal, ValueOrder, XsdValue};

/// XSD length facet name
pub const XSD_LENGTH: &str = "length";
/// XSD minLength facet name
pub const XSD_MIN_LENGTH: &str = "minLength";
/// XSD maxLength facet name
pub const XSD_MAX_LENGTH: &str = "maxLength";
/// XSD pattern facet name
pub const XSD_PATTERN: &str = "pattern";
/// XSD enumeration facet name
pub const XSD_ENUMERATION: &str = "enumeration";
/// XSD whiteSpace facet name
pub const XSD_WHITE_SPACE: &str = "whiteSpace";
/// XSD maxInclusive facet name
pub const XSD_MAX_INCLUSIVE: &str = "maxInclusive";
/// XSD maxExclusive facet name
pub const XSD_MAX_EXCLUSIVE: &str = "maxExclusive";
/// XSD minInclusive facet name
pub const XSD_MIN_INCLUSIVE: &str = "minInclusive";
/// XSD minExclusive facet name
pub const XSD_MIN_EXCLUSIVE: &str = "minExclusive";
/// XSD totalDigits facet name
pub const XSD_TOTAL_DIGITS: &str = "totalDigits";
/// XSD fractionDigits facet name
pub const XSD_FRACTION_DIGITS: &str = "fractionDigits";

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WhiteSpace {
    /// Preserve all white space
    #[default]
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from string value
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            _ => Err(Error::Value(format!(
                "Invalid whiteSpace value: '{}'. Must be 'preserve', 'replace', or 'collapse'",
                s
            ))),
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => {
                let replaced = s.replace(['\t', '\n', '\r'], " ");
                let mut result = String::new();
                let mut prev_space = true; // Start with true to trim leading spaces

                for c in replaced.chars() {
                    if c == ' ' {
                        if !prev_space {
                            result.push(' ');
                            prev_space = true;
                        }
                    } else {
                        result.push(c);
                        prev_space = false;
                    }
                }

                result.trim_end().to_string()
            }
        }
    }

    /// Facet value as written in schemas
    pub fn as_str(&self) -> &'static str {
        match self {
            WhiteSpace::Preserve => "preserve",
            WhiteSpace::Replace => "replace",
            WhiteSpace::Collapse => "collapse",
        }
    }
}

/// Kinds of constraining facets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetKind {
    /// length
    Length,
    /// minLength
    MinLength,
    /// maxLength
    MaxLength,
    /// pattern
    Pattern,
    /// enumeration
    Enumeration,
    /// whiteSpace
    WhiteSpace,
    /// maxInclusive
    MaxInclusive,
    /// maxExclusive
    MaxExclusive,
    /// minInclusive
    MinInclusive,
    /// minExclusive
    MinExclusive,
    /// totalDigits
    TotalDigits,
    /// fractionDigits
    FractionDigits,
}

impl FacetKind {
    /// Element name of the facet in a schema document
    pub fn name(self) -> &'static str {
        match self {
            FacetKind::Length => XSD_LENGTH,
            FacetKind::MinLength => XSD_MIN_LENGTH,
            FacetKind::MaxLength => XSD_MAX_LENGTH,
            FacetKind::Pattern => XSD_PATTERN,
            FacetKind::Enumeration => XSD_ENUMERATION,
            FacetKind::WhiteSpace => XSD_WHITE_SPACE,
            FacetKind::MaxInclusive => XSD_MAX_INCLUSIVE,
            FacetKind::MaxExclusive => XSD_MAX_EXCLUSIVE,
            FacetKind::MinInclusive => XSD_MIN_INCLUSIVE,
            FacetKind::MinExclusive => XSD_MIN_EXCLUSIVE,
            FacetKind::TotalDigits => XSD_TOTAL_DIGITS,
            FacetKind::FractionDigits => XSD_FRACTION_DIGITS,
        }
    }

    /// Facet for a schema element local name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            XSD_LENGTH => FacetKind::Length,
            XSD_MIN_LENGTH => FacetKind::MinLength,
            XSD_MAX_LENGTH => FacetKind::MaxLength,
            XSD_PATTERN => FacetKind::Pattern,
            XSD_ENUMERATION => FacetKind::Enumeration,
            XSD_WHITE_SPACE => FacetKind::WhiteSpace,
            XSD_MAX_INCLUSIVE => FacetKind::MaxInclusive,
            XSD_MAX_EXCLUSIVE => FacetKind::MaxExclusive,
            XSD_MIN_INCLUSIVE => FacetKind::MinInclusive,
            XSD_MIN_EXCLUSIVE => FacetKind::MinExclusive,
            XSD_TOTAL_DIGITS => FacetKind::TotalDigits,
            XSD_FRACTION_DIGITS => FacetKind::FractionDigits,
            _ => return None,
        })
    }

    /// Name of the validation rule a violation of this facet breaks
    pub fn validity_constraint(self) -> &'static str {
        match self {
            FacetKind::Length => "cvc-length-valid",
            FacetKind::MinLength => "cvc-minLength-valid",
            FacetKind::MaxLength => "cvc-maxLength-valid",
            FacetKind::Pattern => "cvc-pattern-valid",
            FacetKind::Enumeration => "cvc-enumeration-valid",
            FacetKind::WhiteSpace => "cvc-facet-valid",
            FacetKind::MaxInclusive => "cvc-maxInclusive-valid",
            FacetKind::MaxExclusive => "cvc-maxExclusive-valid",
            FacetKind::MinInclusive => "cvc-minInclusive-valid",
            FacetKind::MinExclusive => "cvc-minExclusive-valid",
            FacetKind::TotalDigits => "cvc-totalDigits-valid",
            FacetKind::FractionDigits => "cvc-fractionDigits-valid",
        }
    }

    /// Facets whose value is a non-negative integer
    pub fn is_count(self) -> bool {
        matches!(
            self,
            FacetKind::Length
                | FacetKind::MinLength
                | FacetKind::MaxLength
                | FacetKind::TotalDigits
                | FacetKind::FractionDigits
        )
    }

    /// Facets whose value is a value of the base type
    pub fn is_bound(self) -> bool {
        matches!(
            self,
            FacetKind::MaxInclusive
                | FacetKind::MaxExclusive
                | FacetKind::MinInclusive
                | FacetKind::MinExclusive
        )
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A facet as written on one restriction step
#[derive(Debug, Clone)]
pub struct Facet {
    /// Facet kind
    pub kind: FacetKind,
    /// The `value` attribute
    pub lexical: String,
    /// `fixed="true"`
    pub fixed: bool,
    /// Parsed value for bounds and enumerations
    pub value: Option<XsdValue>,
    /// Parsed value for the length and digit facets
    pub count: Option<u64>,
    /// Parsed value for whiteSpace
    pub white_space: Option<WhiteSpace>,
    /// Compiled pattern
    pub pattern: Option<Regex>,
    /// Where the facet was written
    pub pos: SourcePos,
    /// In-scope namespaces, for QName-valued enumerations
    pub namespaces: NamespaceContext,
}

impl Facet {
    /// Unparsed facet
    pub fn new(kind: FacetKind, lexical: impl Into<String>) -> Self {
        Self {
            kind,
            lexical: lexical.into(),
            fixed: false,
            value: None,
            count: None,
            white_space: None,
            pattern: None,
            pos: SourcePos::default(),
            namespaces: NamespaceContext::new(),
        }
    }

    /// Check a value against a single-valued facet.
    ///
    /// Pattern and enumeration facets are checked per derivation step with
    /// [`check_patterns`] and [`check_enumerations`]; they pass here.
    pub fn check(&self, value: &XsdValue) -> std::result::Result<(), String> {
        match self.kind {
            FacetKind::Length | FacetKind::MinLength | FacetKind::MaxLength => {
                let (Some(len), Some(limit)) = (value.length(), self.count) else {
                    return Ok(());
                };
                let len = len as u64;
                let ok = match self.kind {
                    FacetKind::Length => len == limit,
                    FacetKind::MinLength => len >= limit,
                    _ => len <= limit,
                };
                if ok {
                    Ok(())
                } else {
                    Err(format!(
                        "the value has a length of {}; this differs from the allowed {} of {}",
                        len, self.kind, limit
                    ))
                }
            }
            FacetKind::TotalDigits | FacetKind::FractionDigits => {
                let (Some(d), Some(limit)) = (value.as_decimal(), self.count) else {
                    return Ok(());
                };
                let (total, fraction) = decimal_digits(d);
                let actual = if self.kind == FacetKind::TotalDigits {
                    total
                } else {
                    fraction
                };
                if actual as u64 <= limit {
                    Ok(())
                } else {
                    Err(format!(
                        "the value '{}' has more digits than are allowed ('{}' of {})",
                        canonical(value),
                        self.kind,
                        limit
                    ))
                }
            }
            FacetKind::MaxInclusive
            | FacetKind::MaxExclusive
            | FacetKind::MinInclusive
            | FacetKind::MinExclusive => {
                let Some(bound) = &self.value else {
                    return Ok(());
                };
                let order = compare_values(value, bound);
                let ok = match self.kind {
                    FacetKind::MaxInclusive => matches!(order, ValueOrder::Less | ValueOrder::Equal),
                    FacetKind::MaxExclusive => order == ValueOrder::Less,
                    FacetKind::MinInclusive => {
                        matches!(order, ValueOrder::Greater | ValueOrder::Equal)
                    }
                    _ => order == ValueOrder::Greater,
                };
                if ok {
                    Ok(())
                } else {
                    let relation = match self.kind {
                        FacetKind::MaxInclusive => "less than or equal to",
                        FacetKind::MaxExclusive => "less than",
                        FacetKind::MinInclusive => "greater than or equal to",
                        _ => "greater than",
                    };
                    Err(format!(
                        "the value '{}' must be {} '{}'",
                        canonical(value),
                        relation,
                        canonical(bound)
                    ))
                }
            }
            FacetKind::Pattern | FacetKind::Enumeration | FacetKind::WhiteSpace => Ok(()),
        }
    }
}

/// Patterns of one derivation step are alternatives: one match suffices
pub fn check_patterns<'a>(
    patterns: impl IntoIterator<Item = &'a Facet>,
    normalized: &str,
) -> std::result::Result<(), String> {
    let mut seen = Vec::new();
    for facet in patterns {
        match &facet.pattern {
            Some(re) if re.is_match(normalized) => return Ok(()),
            _ => seen.push(facet.lexical.as_str()),
        }
    }
    if seen.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "the value '{}' is not accepted by the pattern '{}'",
            normalized,
            seen.join("|")
        ))
    }
}

/// The value must equal one of the enumerations of one derivation step
pub fn check_enumerations<'a>(
    enumerations: impl IntoIterator<Item = &'a Facet>,
    value: &XsdValue,
) -> std::result::Result<(), String> {
    let mut allowed = Vec::new();
    for facet in enumerations {
        match &facet.value {
            Some(v) if values_equal(v, value) => return Ok(()),
            _ => allowed.push(format!("'{}'", facet.lexical)),
        }
    }
    if allowed.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "the value '{}' is not an element of the set {{{}}}",
            canonical(value),
            allowed.join(", ")
        ))
    }
}

// =============================================================================
// Regular expressions
// =============================================================================

const NAME_START_CLASS: &str = "A-Z_a-z:\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}\u{10000}-\u{EFFFF}";
const NAME_EXTRA_CLASS: &str = "\\-.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

/// Unicode blocks usable as `\p{IsBlock}`
const BLOCKS: &[(&str, &str)] = &[
    ("BasicLatin", "\u{0}-\u{7F}"),
    ("Latin-1Supplement", "\u{80}-\u{FF}"),
    ("LatinExtended-A", "\u{100}-\u{17F}"),
    ("LatinExtended-B", "\u{180}-\u{24F}"),
    ("IPAExtensions", "\u{250}-\u{2AF}"),
    ("Greek", "\u{370}-\u{3FF}"),
    ("Cyrillic", "\u{400}-\u{4FF}"),
    ("Hebrew", "\u{590}-\u{5FF}"),
    ("Arabic", "\u{600}-\u{6FF}"),
    ("Devanagari", "\u{900}-\u{97F}"),
    ("Thai", "\u{E00}-\u{E7F}"),
    ("GeneralPunctuation", "\u{2000}-\u{206F}"),
    ("CurrencySymbols", "\u{20A0}-\u{20CF}"),
    ("Hiragana", "\u{3040}-\u{309F}"),
    ("Katakana", "\u{30A0}-\u{30FF}"),
    ("CJKUnifiedIdeographs", "\u{4E00}-\u{9FFF}"),
    ("HangulSyllables", "\u{AC00}-\u{D7A3}"),
    ("HalfwidthandFullwidthForms", "\u{FF00}-\u{FFEF}"),
];

/// Compile an XSD regular expression
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    let translated = translate_pattern(pattern)?;
    Regex::new(&translated)
        .map_err(|e| Error::Value(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Translate an XSD regular expression into an anchored `regex` pattern
pub fn translate_pattern(pattern: &str) -> Result<String> {
    let invalid = |why: &str| Error::Value(format!("invalid pattern '{}': {}", pattern, why));
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 16);
    out.push_str("^(?:");

    let mut i = 0;
    let mut class_depth = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let next = *chars.get(i + 1).ok_or_else(|| invalid("trailing backslash"))?;
                i += 2;
                match next {
                    'i' | 'I' | 'c' | 'C' => {
                        let body = if next.eq_ignore_ascii_case(&'i') {
                            NAME_START_CLASS.to_string()
                        } else {
                            format!("{}{}", NAME_START_CLASS, NAME_EXTRA_CLASS)
                        };
                        let negated = next.is_ascii_uppercase();
                        if class_depth > 0 && !negated {
                            out.push_str(&body);
                        } else {
                            out.push_str(if negated { "[^" } else { "[" });
                            out.push_str(&body);
                            out.push(']');
                        }
                    }
                    'w' => out.push_str("[^\\p{P}\\p{Z}\\p{C}]"),
                    'W' => out.push_str("[\\p{P}\\p{Z}\\p{C}]"),
                    'd' => out.push_str("\\p{Nd}"),
                    'D' => out.push_str("\\P{Nd}"),
                    's' if class_depth > 0 => out.push_str(" \\t\\n\\r"),
                    's' => out.push_str("[ \\t\\n\\r]"),
                    'S' => out.push_str("[^ \\t\\n\\r]"),
                    'p' | 'P' => {
                        let end = chars[i..]
                            .iter()
                            .position(|c| *c == '}')
                            .ok_or_else(|| invalid("unterminated property"))?;
                        if chars.get(i) != Some(&'{') {
                            return Err(invalid("expected '{' after \\p"));
                        }
                        let name: String = chars[i + 1..i + end].iter().collect();
                        i += end + 1;
                        if let Some(block) = name.strip_prefix("Is") {
                            let range = BLOCKS
                                .iter()
                                .find(|(b, _)| *b == block)
                                .map(|(_, r)| *r)
                                .ok_or_else(|| invalid("unsupported block escape"))?;
                            out.push_str(if next == 'P' { "[^" } else { "[" });
                            out.push_str(range);
                            out.push(']');
                        } else {
                            out.push('\\');
                            out.push(next);
                            out.push('{');
                            out.push_str(&name);
                            out.push('}');
                        }
                    }
                    'n' | 'r' | 't' | '\\' | '|' | '.' | '-' | '^' | '?' | '*' | '+' | '{'
                    | '}' | '(' | ')' | '[' | ']' => {
                        out.push('\\');
                        out.push(next);
                    }
                    _ => return Err(invalid("unknown escape")),
                }
                continue;
            }
            '[' => {
                if class_depth > 0 {
                    // only legal as the subtrahend of a class subtraction
                    return Err(invalid("unexpected '['"));
                }
                class_depth += 1;
                out.push('[');
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
            }
            '-' if class_depth > 0 && chars.get(i + 1) == Some(&'[') => {
                // class subtraction: [a-z-[aeiou]]
                let end = find_class_end(&chars, i + 2).ok_or_else(|| invalid("unbalanced '['"))?;
                let inner: String = chars[i + 1..=end].iter().collect();
                let translated = translate_pattern(&inner)?;
                // strip the anchoring added by the recursive call
                let body = &translated[4..translated.len() - 2];
                out.push_str("--");
                out.push_str(body);
                i = end + 1;
                continue;
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '&' | '~' if class_depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            '^' | '$' if class_depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '.' if class_depth == 0 => out.push_str("[^\\n\\r]"),
            _ => out.push(c),
        }
        i += 1;
    }

    if class_depth > 0 {
        return Err(invalid("unterminated character class"));
    }
    out.push_str(")$");
    Ok(out)
}

fn find_class_end(chars: &[char], mut i: usize) -> Option<usize> {
    let mut depth = 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}
