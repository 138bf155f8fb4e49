//! XSD built-in types
//!
//! This module defines the built-in primitive and derived types for XML Schema.
//! These types form the foundation of XSD validation: every user-defined
//! simple type eventually restricts, lists or unions one of them.

use crate::namespaces::QName;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

use super::base::DerivationMethod;
use super::facets::{FacetKind, WhiteSpace};
use super::values::DateTimeKind;

// =============================================================================
// Type names
// =============================================================================

/// XSD anyType type name
pub const XSD_ANY_TYPE: &str = "anyType";
/// XSD anySimpleType type name
pub const XSD_ANY_SIMPLE_TYPE: &str = "anySimpleType";

/// XSD string type name
pub const XSD_STRING: &str = "string";
/// XSD normalizedString type name
pub const XSD_NORMALIZED_STRING: &str = "normalizedString";
/// XSD token type name
pub const XSD_TOKEN: &str = "token";
/// XSD language type name
pub const XSD_LANGUAGE: &str = "language";
/// XSD Name type name
pub const XSD_NAME: &str = "Name";
/// XSD NCName type name
pub const XSD_NCNAME: &str = "NCName";
/// XSD ID type name
pub const XSD_ID: &str = "ID";
/// XSD IDREF type name
pub const XSD_IDREF: &str = "IDREF";
/// XSD IDREFS type name
pub const XSD_IDREFS: &str = "IDREFS";
/// XSD ENTITY type name
pub const XSD_ENTITY: &str = "ENTITY";
/// XSD ENTITIES type name
pub const XSD_ENTITIES: &str = "ENTITIES";
/// XSD NMTOKEN type name
pub const XSD_NMTOKEN: &str = "NMTOKEN";
/// XSD NMTOKENS type name
pub const XSD_NMTOKENS: &str = "NMTOKENS";

/// XSD boolean type name
pub const XSD_BOOLEAN: &str = "boolean";

/// XSD decimal type name
pub const XSD_DECIMAL: &str = "decimal";
/// XSD integer type name
pub const XSD_INTEGER: &str = "integer";
/// XSD long type name
pub const XSD_LONG: &str = "long";
/// XSD int type name
pub const XSD_INT: &str = "int";
/// XSD short type name
pub const XSD_SHORT: &str = "short";
/// XSD byte type name
pub const XSD_BYTE: &str = "byte";
/// XSD nonNegativeInteger type name
pub const XSD_NON_NEGATIVE_INTEGER: &str = "nonNegativeInteger";
/// XSD positiveInteger type name
pub const XSD_POSITIVE_INTEGER: &str = "positiveInteger";
/// XSD unsignedLong type name
pub const XSD_UNSIGNED_LONG: &str = "unsignedLong";
/// XSD unsignedInt type name
pub const XSD_UNSIGNED_INT: &str = "unsignedInt";
/// XSD unsignedShort type name
pub const XSD_UNSIGNED_SHORT: &str = "unsignedShort";
/// XSD unsignedByte type name
pub const XSD_UNSIGNED_BYTE: &str = "unsignedByte";
/// XSD nonPositiveInteger type name
pub const XSD_NON_POSITIVE_INTEGER: &str = "nonPositiveInteger";
/// XSD negativeInteger type name
pub const XSD_NEGATIVE_INTEGER: &str = "negativeInteger";

/// XSD float type name
pub const XSD_FLOAT: &str = "float";
/// XSD double type name
pub const XSD_DOUBLE: &str = "double";

/// XSD duration type name
pub const XSD_DURATION: &str = "duration";
/// XSD dateTime type name
pub const XSD_DATETIME: &str = "dateTime";
/// XSD date type name
pub const XSD_DATE: &str = "date";
/// XSD time type name
pub const XSD_TIME: &str = "time";
/// XSD gYearMonth type name
pub const XSD_GYEAR_MONTH: &str = "gYearMonth";
/// XSD gYear type name
pub const XSD_GYEAR: &str = "gYear";
/// XSD gMonthDay type name
pub const XSD_GMONTH_DAY: &str = "gMonthDay";
/// XSD gDay type name
pub const XSD_GDAY: &str = "gDay";
/// XSD gMonth type name
pub const XSD_GMONTH: &str = "gMonth";

/// XSD hexBinary type name
pub const XSD_HEX_BINARY: &str = "hexBinary";
/// XSD base64Binary type name
pub const XSD_BASE64_BINARY: &str = "base64Binary";
/// XSD anyURI type name
pub const XSD_ANY_URI: &str = "anyURI";
/// XSD QName type name
pub const XSD_QNAME: &str = "QName";
/// XSD NOTATION type name
pub const XSD_NOTATION: &str = "NOTATION";

// =============================================================================
// Admitted facets
// =============================================================================

const STRING_FACETS: &[FacetKind] = &[
    FacetKind::Length,
    FacetKind::MinLength,
    FacetKind::MaxLength,
    FacetKind::Pattern,
    FacetKind::Enumeration,
    FacetKind::WhiteSpace,
];

const BOOLEAN_FACETS: &[FacetKind] = &[FacetKind::Pattern, FacetKind::WhiteSpace];

const ORDERED_FACETS: &[FacetKind] = &[
    FacetKind::Pattern,
    FacetKind::Enumeration,
    FacetKind::WhiteSpace,
    FacetKind::MaxInclusive,
    FacetKind::MaxExclusive,
    FacetKind::MinInclusive,
    FacetKind::MinExclusive,
];

const DECIMAL_FACETS: &[FacetKind] = &[
    FacetKind::TotalDigits,
    FacetKind::FractionDigits,
    FacetKind::Pattern,
    FacetKind::Enumeration,
    FacetKind::WhiteSpace,
    FacetKind::MaxInclusive,
    FacetKind::MaxExclusive,
    FacetKind::MinInclusive,
    FacetKind::MinExclusive,
];

/// Facets allowed on restrictions of list types
pub const LIST_FACETS: &[FacetKind] = STRING_FACETS;

/// Facets allowed on restrictions of union types
pub const UNION_FACETS: &[FacetKind] = &[FacetKind::Pattern, FacetKind::Enumeration];

// =============================================================================
// Built-in types
// =============================================================================

/// Primitive value space of a built-in type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Primitive {
    AnySimpleType,
    String,
    Boolean,
    Decimal,
    Float,
    Double,
    Duration,
    DateTime(DateTimeKind),
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
    Notation,
}

/// The XSD 1.0 built-in type definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BuiltinType {
    AnyType,
    AnySimpleType,
    // primitives
    String,
    Boolean,
    Decimal,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
    Notation,
    // derived
    NormalizedString,
    Token,
    Language,
    NmToken,
    NmTokens,
    Name,
    NCName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
}

lazy_static::lazy_static! {
    static ref BUILTIN_BY_NAME: HashMap<&'static str, BuiltinType> =
        BuiltinType::ALL.iter().map(|b| (b.name(), *b)).collect();
}

impl BuiltinType {
    /// Every built-in type, bases before derived types
    pub const ALL: [BuiltinType; 46] = [
        BuiltinType::AnyType,
        BuiltinType::AnySimpleType,
        BuiltinType::String,
        BuiltinType::Boolean,
        BuiltinType::Decimal,
        BuiltinType::Float,
        BuiltinType::Double,
        BuiltinType::Duration,
        BuiltinType::DateTime,
        BuiltinType::Time,
        BuiltinType::Date,
        BuiltinType::GYearMonth,
        BuiltinType::GYear,
        BuiltinType::GMonthDay,
        BuiltinType::GDay,
        BuiltinType::GMonth,
        BuiltinType::HexBinary,
        BuiltinType::Base64Binary,
        BuiltinType::AnyUri,
        BuiltinType::QName,
        BuiltinType::Notation,
        BuiltinType::NormalizedString,
        BuiltinType::Token,
        BuiltinType::Language,
        BuiltinType::NmToken,
        BuiltinType::NmTokens,
        BuiltinType::Name,
        BuiltinType::NCName,
        BuiltinType::Id,
        BuiltinType::IdRef,
        BuiltinType::IdRefs,
        BuiltinType::Entity,
        BuiltinType::Entities,
        BuiltinType::Integer,
        BuiltinType::NonPositiveInteger,
        BuiltinType::NegativeInteger,
        BuiltinType::Long,
        BuiltinType::Int,
        BuiltinType::Short,
        BuiltinType::Byte,
        BuiltinType::NonNegativeInteger,
        BuiltinType::UnsignedLong,
        BuiltinType::UnsignedInt,
        BuiltinType::UnsignedShort,
        BuiltinType::UnsignedByte,
        BuiltinType::PositiveInteger,
    ];

    /// Local name in the XSD namespace
    pub fn name(self) -> &'static str {
        match self {
            BuiltinType::AnyType => XSD_ANY_TYPE,
            BuiltinType::AnySimpleType => XSD_ANY_SIMPLE_TYPE,
            BuiltinType::String => XSD_STRING,
            BuiltinType::Boolean => XSD_BOOLEAN,
            BuiltinType::Decimal => XSD_DECIMAL,
            BuiltinType::Float => XSD_FLOAT,
            BuiltinType::Double => XSD_DOUBLE,
            BuiltinType::Duration => XSD_DURATION,
            BuiltinType::DateTime => XSD_DATETIME,
            BuiltinType::Time => XSD_TIME,
            BuiltinType::Date => XSD_DATE,
            BuiltinType::GYearMonth => XSD_GYEAR_MONTH,
            BuiltinType::GYear => XSD_GYEAR,
            BuiltinType::GMonthDay => XSD_GMONTH_DAY,
            BuiltinType::GDay => XSD_GDAY,
            BuiltinType::GMonth => XSD_GMONTH,
            BuiltinType::HexBinary => XSD_HEX_BINARY,
            BuiltinType::Base64Binary => XSD_BASE64_BINARY,
            BuiltinType::AnyUri => XSD_ANY_URI,
            BuiltinType::QName => XSD_QNAME,
            BuiltinType::Notation => XSD_NOTATION,
            BuiltinType::NormalizedString => XSD_NORMALIZED_STRING,
            BuiltinType::Token => XSD_TOKEN,
            BuiltinType::Language => XSD_LANGUAGE,
            BuiltinType::NmToken => XSD_NMTOKEN,
            BuiltinType::NmTokens => XSD_NMTOKENS,
            BuiltinType::Name => XSD_NAME,
            BuiltinType::NCName => XSD_NCNAME,
            BuiltinType::Id => XSD_ID,
            BuiltinType::IdRef => XSD_IDREF,
            BuiltinType::IdRefs => XSD_IDREFS,
            BuiltinType::Entity => XSD_ENTITY,
            BuiltinType::Entities => XSD_ENTITIES,
            BuiltinType::Integer => XSD_INTEGER,
            BuiltinType::NonPositiveInteger => XSD_NON_POSITIVE_INTEGER,
            BuiltinType::NegativeInteger => XSD_NEGATIVE_INTEGER,
            BuiltinType::Long => XSD_LONG,
            BuiltinType::Int => XSD_INT,
            BuiltinType::Short => XSD_SHORT,
            BuiltinType::Byte => XSD_BYTE,
            BuiltinType::NonNegativeInteger => XSD_NON_NEGATIVE_INTEGER,
            BuiltinType::UnsignedLong => XSD_UNSIGNED_LONG,
            BuiltinType::UnsignedInt => XSD_UNSIGNED_INT,
            BuiltinType::UnsignedShort => XSD_UNSIGNED_SHORT,
            BuiltinType::UnsignedByte => XSD_UNSIGNED_BYTE,
            BuiltinType::PositiveInteger => XSD_POSITIVE_INTEGER,
        }
    }

    /// Look up a built-in by its local name
    pub fn from_name(local_name: &str) -> Option<Self> {
        BUILTIN_BY_NAME.get(local_name).copied()
    }

    /// Qualified name in the XSD namespace
    pub fn qname(self) -> QName {
        QName::xsd(self.name())
    }

    /// Base type definition; `None` only for anyType
    pub fn base(self) -> Option<BuiltinType> {
        use BuiltinType::*;
        Some(match self {
            AnyType => return None,
            AnySimpleType => AnyType,
            String | Boolean | Decimal | Float | Double | Duration | DateTime | Time | Date
            | GYearMonth | GYear | GMonthDay | GDay | GMonth | HexBinary | Base64Binary
            | AnyUri | QName | Notation => AnySimpleType,
            NmTokens | IdRefs | Entities => AnySimpleType,
            NormalizedString => String,
            Token => NormalizedString,
            Language | NmToken | Name => Token,
            NCName => Name,
            Id | IdRef | Entity => NCName,
            Integer => Decimal,
            NonPositiveInteger | Long | NonNegativeInteger => Integer,
            NegativeInteger => NonPositiveInteger,
            Int => Long,
            Short => Int,
            Byte => Short,
            UnsignedLong | PositiveInteger => NonNegativeInteger,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
        })
    }

    /// How the type is derived from its base
    pub fn derivation(self) -> DerivationMethod {
        if self.list_item().is_some() {
            DerivationMethod::List
        } else {
            DerivationMethod::Restriction
        }
    }

    /// Item type of the built-in list types
    pub fn list_item(self) -> Option<BuiltinType> {
        match self {
            BuiltinType::NmTokens => Some(BuiltinType::NmToken),
            BuiltinType::IdRefs => Some(BuiltinType::IdRef),
            BuiltinType::Entities => Some(BuiltinType::Entity),
            _ => None,
        }
    }

    /// Whether this is one of the 19 primitive datatypes
    pub fn is_primitive(self) -> bool {
        self.base() == Some(BuiltinType::AnySimpleType) && self.list_item().is_none()
    }

    /// Primitive value space
    pub fn primitive(self) -> Primitive {
        use BuiltinType::*;
        match self {
            AnyType | AnySimpleType | NmTokens | IdRefs | Entities => Primitive::AnySimpleType,
            Boolean => Primitive::Boolean,
            Float => Primitive::Float,
            Double => Primitive::Double,
            Duration => Primitive::Duration,
            DateTime => Primitive::DateTime(DateTimeKind::DateTime),
            Time => Primitive::DateTime(DateTimeKind::Time),
            Date => Primitive::DateTime(DateTimeKind::Date),
            GYearMonth => Primitive::DateTime(DateTimeKind::GYearMonth),
            GYear => Primitive::DateTime(DateTimeKind::GYear),
            GMonthDay => Primitive::DateTime(DateTimeKind::GMonthDay),
            GDay => Primitive::DateTime(DateTimeKind::GDay),
            GMonth => Primitive::DateTime(DateTimeKind::GMonth),
            HexBinary => Primitive::HexBinary,
            Base64Binary => Primitive::Base64Binary,
            AnyUri => Primitive::AnyUri,
            QName => Primitive::QName,
            Notation => Primitive::Notation,
            Decimal | Integer | NonPositiveInteger | NegativeInteger | Long | Int | Short
            | Byte | NonNegativeInteger | UnsignedLong | UnsignedInt | UnsignedShort
            | UnsignedByte | PositiveInteger => Primitive::Decimal,
            String | NormalizedString | Token | Language | NmToken | Name | NCName | Id
            | IdRef | Entity => Primitive::String,
        }
    }

    /// Value of the whiteSpace facet
    pub fn white_space(self) -> WhiteSpace {
        match self {
            BuiltinType::AnyType | BuiltinType::AnySimpleType | BuiltinType::String => {
                WhiteSpace::Preserve
            }
            BuiltinType::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Facets that may restrict this type
    pub fn admitted_facets(self) -> &'static [FacetKind] {
        if self.list_item().is_some() {
            return LIST_FACETS;
        }
        match self.primitive() {
            Primitive::AnySimpleType => &[],
            Primitive::String
            | Primitive::HexBinary
            | Primitive::Base64Binary
            | Primitive::AnyUri
            | Primitive::QName
            | Primitive::Notation => STRING_FACETS,
            Primitive::Boolean => BOOLEAN_FACETS,
            Primitive::Decimal => DECIMAL_FACETS,
            Primitive::Float | Primitive::Double | Primitive::Duration | Primitive::DateTime(_) => {
                ORDERED_FACETS
            }
        }
    }

    /// Inclusive value range of the integer family
    pub fn integer_bounds(self) -> Option<(Option<Decimal>, Option<Decimal>)> {
        let d = Decimal::from;
        Some(match self {
            BuiltinType::Integer => (None, None),
            BuiltinType::NonPositiveInteger => (None, Some(d(0))),
            BuiltinType::NegativeInteger => (None, Some(d(-1))),
            BuiltinType::Long => (Some(d(i64::MIN)), Some(d(i64::MAX))),
            BuiltinType::Int => (Some(d(i32::MIN as i64)), Some(d(i32::MAX as i64))),
            BuiltinType::Short => (Some(d(i16::MIN as i64)), Some(d(i16::MAX as i64))),
            BuiltinType::Byte => (Some(d(i8::MIN as i64)), Some(d(i8::MAX as i64))),
            BuiltinType::NonNegativeInteger => (Some(d(0)), None),
            BuiltinType::UnsignedLong => (Some(d(0)), Some(Decimal::from(u64::MAX))),
            BuiltinType::UnsignedInt => (Some(d(0)), Some(d(u32::MAX as i64))),
            BuiltinType::UnsignedShort => (Some(d(0)), Some(d(u16::MAX as i64))),
            BuiltinType::UnsignedByte => (Some(d(0)), Some(d(u8::MAX as i64))),
            BuiltinType::PositiveInteger => (Some(d(1)), None),
            _ => return None,
        })
    }

    /// Whether `self` is `other` or derived from it through built-in bases
    pub fn is_derived_from(self, other: BuiltinType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.base();
        }
        false
    }

    /// ID or a type derived from it
    pub fn is_id(self) -> bool {
        self.is_derived_from(BuiltinType::Id)
    }

    /// IDREF, IDREFS or a type derived from them
    pub fn is_idref(self) -> bool {
        self.is_derived_from(BuiltinType::IdRef) || self == BuiltinType::IdRefs
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.name())
    }
}
