//! Declared member types and their classification.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::value::{Scalar, Value};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles")
});

/// Is `name` usable as a C# type or member name.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Boolean,
    String,
    DateTime,
    DateTimeOffset,
    TimeSpan,
    Guid,
    Point,
    Enum(String),
    /// `Nullable<T>` over a value type.
    Nullable(Box<DeclaredType>),
    /// A countable container with exactly one element type.
    Collection(Box<DeclaredType>),
    /// Any other complex type; walked as a plain data class.
    Object(String),
}

/// Static kind of a declared type, independent of any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Collection,
    Enum,
    Nullable,
    Scalar,
    Temporal,
    Identifier,
    Geometry,
    NestedObject,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Collection => "collection",
            TypeKind::Enum => "enum",
            TypeKind::Nullable => "nullable",
            TypeKind::Scalar => "scalar",
            TypeKind::Temporal => "temporal",
            TypeKind::Identifier => "identifier",
            TypeKind::Geometry => "geometry",
            TypeKind::NestedObject => "object",
        }
    }
}

/// How one member value is emitted, decided from its declared type and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Collection,
    Enum,
    /// Nullable with a value; printed with the underlying type's rule.
    NullableScalar,
    /// Nullable without a value; omitted.
    NullableAbsent,
    Scalar,
    Temporal,
    Identifier,
    Geometry,
    /// Equal to the type's zero value; omitted.
    DefaultValued,
    NestedObject,
}

impl Classification {
    pub fn is_omitted(self) -> bool {
        matches!(self, Classification::NullableAbsent | Classification::DefaultValued)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("empty type name")]
    Empty,
    #[error("`{0}` is not a valid type name")]
    Invalid(String),
    #[error("unsupported collection shape `{0}`: expected a single element type")]
    UnsupportedCollection(String),
    #[error("unsupported generic type `{0}`")]
    UnsupportedGeneric(String),
    #[error("`{0}` cannot be nullable twice")]
    NestedNullable(String),
}

const COLLECTION_HEADS: &[&str] = &[
    "List",
    "IList",
    "ICollection",
    "Collection",
    "IReadOnlyList",
    "IReadOnlyCollection",
    "HashSet",
    "ISet",
];

impl DeclaredType {
    pub fn nullable(inner: DeclaredType) -> Self {
        DeclaredType::Nullable(Box::new(inner))
    }

    pub fn collection(element: DeclaredType) -> Self {
        DeclaredType::Collection(Box::new(element))
    }

    pub fn object(name: impl Into<String>) -> Self {
        DeclaredType::Object(name.into())
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        DeclaredType::Enum(name.into())
    }

    /// Parse a C# type expression. `is_enum` decides whether a bare
    /// identifier names an enum or an object type.
    pub fn parse(src: &str, is_enum: &dyn Fn(&str) -> bool) -> Result<Self, TypeParseError> {
        let s = src.trim();
        if s.is_empty() {
            return Err(TypeParseError::Empty);
        }

        if let Some(inner) = s.strip_suffix('?') {
            return Self::parse(inner, is_enum)?.into_nullable(s);
        }
        if s.ends_with("[]") {
            return Err(TypeParseError::UnsupportedCollection(s.to_string()));
        }

        if let Some((head, args)) = split_generic(s) {
            let args = split_top_level(args);
            let head = head.trim();
            let is_collection = COLLECTION_HEADS.contains(&head);
            if args.len() != 1 {
                return Err(if is_collection || head.ends_with("Dictionary") {
                    TypeParseError::UnsupportedCollection(s.to_string())
                } else {
                    TypeParseError::UnsupportedGeneric(s.to_string())
                });
            }
            let arg = Self::parse(args[0], is_enum)?;
            return match head {
                "Nullable" => arg.into_nullable(s),
                _ if is_collection => Ok(DeclaredType::collection(arg)),
                _ => Err(TypeParseError::UnsupportedGeneric(s.to_string())),
            };
        }

        let ty = match s {
            "short" | "Int16" => DeclaredType::Int16,
            "int" | "Int32" => DeclaredType::Int32,
            "long" | "Int64" => DeclaredType::Int64,
            "float" | "Single" => DeclaredType::Single,
            "double" | "Double" => DeclaredType::Double,
            "decimal" | "Decimal" => DeclaredType::Decimal,
            "bool" | "Boolean" => DeclaredType::Boolean,
            "string" | "String" => DeclaredType::String,
            "DateTime" => DeclaredType::DateTime,
            "DateTimeOffset" => DeclaredType::DateTimeOffset,
            "TimeSpan" => DeclaredType::TimeSpan,
            "Guid" => DeclaredType::Guid,
            "Point" => DeclaredType::Point,
            _ if !is_identifier(s) => return Err(TypeParseError::Invalid(s.to_string())),
            _ if is_enum(s) => DeclaredType::Enum(s.to_string()),
            _ => DeclaredType::Object(s.to_string()),
        };
        Ok(ty)
    }

    /// `T?` on a reference type is only an annotation and collapses to `T`.
    fn into_nullable(self, src: &str) -> Result<Self, TypeParseError> {
        match self {
            DeclaredType::Nullable(_) => Err(TypeParseError::NestedNullable(src.to_string())),
            ty if ty.is_value_type() => Ok(DeclaredType::nullable(ty)),
            ty => Ok(ty),
        }
    }

    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            DeclaredType::String
                | DeclaredType::Point
                | DeclaredType::Collection(_)
                | DeclaredType::Object(_)
                | DeclaredType::Nullable(_)
        )
    }

    /// Strip one `Nullable<>` wrapper.
    pub fn underlying(&self) -> &DeclaredType {
        match self {
            DeclaredType::Nullable(inner) => inner,
            ty => ty,
        }
    }

    /// Name as written in emitted code, e.g. inside `new List<...>()`.
    pub fn name(&self) -> String {
        match self {
            DeclaredType::Int16 => "Int16".into(),
            DeclaredType::Int32 => "Int32".into(),
            DeclaredType::Int64 => "Int64".into(),
            DeclaredType::Single => "Single".into(),
            DeclaredType::Double => "Double".into(),
            DeclaredType::Decimal => "Decimal".into(),
            DeclaredType::Boolean => "Boolean".into(),
            DeclaredType::String => "String".into(),
            DeclaredType::DateTime => "DateTime".into(),
            DeclaredType::DateTimeOffset => "DateTimeOffset".into(),
            DeclaredType::TimeSpan => "TimeSpan".into(),
            DeclaredType::Guid => "Guid".into(),
            DeclaredType::Point => "Point".into(),
            DeclaredType::Enum(name) | DeclaredType::Object(name) => name.clone(),
            DeclaredType::Nullable(inner) => format!("{}?", inner.name()),
            DeclaredType::Collection(elem) => format!("List<{}>", elem.name()),
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            DeclaredType::Collection(_) => TypeKind::Collection,
            DeclaredType::Enum(_) => TypeKind::Enum,
            DeclaredType::Nullable(_) => TypeKind::Nullable,
            DeclaredType::Int16
            | DeclaredType::Int32
            | DeclaredType::Int64
            | DeclaredType::Single
            | DeclaredType::Double
            | DeclaredType::Decimal
            | DeclaredType::Boolean
            | DeclaredType::String => TypeKind::Scalar,
            DeclaredType::DateTime | DeclaredType::DateTimeOffset | DeclaredType::TimeSpan => {
                TypeKind::Temporal
            }
            DeclaredType::Guid => TypeKind::Identifier,
            DeclaredType::Point => TypeKind::Geometry,
            DeclaredType::Object(_) => TypeKind::NestedObject,
        }
    }

    /// Does `scalar` have the runtime shape this type declares.
    pub fn accepts_scalar(&self, scalar: &Scalar<'_>) -> bool {
        matches!(
            (self.underlying(), scalar),
            (DeclaredType::Int16, Scalar::Int16(_))
                | (DeclaredType::Int32, Scalar::Int32(_))
                | (DeclaredType::Int64, Scalar::Int64(_))
                | (DeclaredType::Single, Scalar::Single(_))
                | (DeclaredType::Double, Scalar::Double(_))
                | (DeclaredType::Decimal, Scalar::Decimal(_))
                | (DeclaredType::Boolean, Scalar::Boolean(_))
                | (DeclaredType::String, Scalar::String(_))
                | (DeclaredType::DateTime, Scalar::DateTime(_))
                | (DeclaredType::DateTimeOffset, Scalar::DateTimeOffset(_))
                | (DeclaredType::TimeSpan, Scalar::TimeSpan(_))
                | (DeclaredType::Guid, Scalar::Guid(_))
                | (DeclaredType::Point, Scalar::Point(_))
                | (DeclaredType::Enum(_), Scalar::Enum(_))
        )
    }

    /// Shallow shape check; collection items are checked as they are walked.
    /// Null fits everything except a bare enum, which has no null and whose
    /// zero value has no name to print.
    pub fn accepts(&self, value: &Value<'_>) -> bool {
        match value {
            Value::Null => !matches!(self, DeclaredType::Enum(_)),
            Value::Scalar(s) => self.accepts_scalar(s),
            Value::Collection(_) => matches!(self, DeclaredType::Collection(_)),
            Value::Object(_) => matches!(self.underlying(), DeclaredType::Object(_)),
        }
    }

    /// Pick the emission strategy for `value` held by a member of this type.
    /// Collections and enums are decided before the default check, so a null
    /// collection still renders and an enum at its zero value is kept.
    pub fn classify(&self, value: &Value<'_>) -> Classification {
        match self {
            DeclaredType::Collection(_) => Classification::Collection,
            DeclaredType::Enum(_) => Classification::Enum,
            DeclaredType::Nullable(_) if value.is_null() => Classification::NullableAbsent,
            DeclaredType::Nullable(_) => Classification::NullableScalar,
            _ if value.is_clr_default() => Classification::DefaultValued,
            ty => match ty.kind() {
                TypeKind::Temporal => Classification::Temporal,
                TypeKind::Identifier => Classification::Identifier,
                TypeKind::Geometry => Classification::Geometry,
                TypeKind::NestedObject => Classification::NestedObject,
                _ => Classification::Scalar,
            },
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// `List<A>` → `("List", "A")`.
fn split_generic(s: &str) -> Option<(&str, &str)> {
    let open = s.find('<')?;
    let inner = s.strip_suffix('>')?;
    Some((&s[..open], &inner[open + 1..]))
}

/// Split generic arguments on commas that are not nested in `<>`.
fn split_top_level(args: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in args.bytes().enumerate() {
        match b {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                out.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&args[start..]);
    out
}
