//! Runtime values read out of a [`Describe`] implementation.
//!
//! `Scalar` covers every leaf kind the literal rules know how to print. `Value`
//! adds the two recursive shapes: collections and nested objects.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::describe::Describe;

/// Three-coordinate geometric point. Missing coordinates are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    /// Planar point; `z` is NaN.
    pub fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: f64::NAN }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar<'a> {
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    Boolean(bool),
    String(Cow<'a, str>),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    TimeSpan(TimeDelta),
    Guid(Uuid),
    Point(Point),
    /// Symbolic variant name, never the numeric backing value.
    Enum(Cow<'a, str>),
}

impl<'a> Scalar<'a> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Int16(_) => "Int16",
            Scalar::Int32(_) => "Int32",
            Scalar::Int64(_) => "Int64",
            Scalar::Single(_) => "Single",
            Scalar::Double(_) => "Double",
            Scalar::Decimal(_) => "Decimal",
            Scalar::Boolean(_) => "Boolean",
            Scalar::String(_) => "String",
            Scalar::DateTime(_) => "DateTime",
            Scalar::DateTimeOffset(_) => "DateTimeOffset",
            Scalar::TimeSpan(_) => "TimeSpan",
            Scalar::Guid(_) => "Guid",
            Scalar::Point(_) => "Point",
            Scalar::Enum(_) => "enum",
        }
    }

    /// Borrow string payloads instead of cloning them.
    pub fn reborrow(&self) -> Scalar<'_> {
        match self {
            Scalar::String(s) => Scalar::String(Cow::Borrowed(s)),
            Scalar::Enum(s) => Scalar::Enum(Cow::Borrowed(s)),
            Scalar::Int16(v) => Scalar::Int16(*v),
            Scalar::Int32(v) => Scalar::Int32(*v),
            Scalar::Int64(v) => Scalar::Int64(*v),
            Scalar::Single(v) => Scalar::Single(*v),
            Scalar::Double(v) => Scalar::Double(*v),
            Scalar::Decimal(v) => Scalar::Decimal(*v),
            Scalar::Boolean(v) => Scalar::Boolean(*v),
            Scalar::DateTime(v) => Scalar::DateTime(*v),
            Scalar::DateTimeOffset(v) => Scalar::DateTimeOffset(*v),
            Scalar::TimeSpan(v) => Scalar::TimeSpan(*v),
            Scalar::Guid(v) => Scalar::Guid(*v),
            Scalar::Point(v) => Scalar::Point(*v),
        }
    }

    pub fn into_owned(self) -> Scalar<'static> {
        match self {
            Scalar::String(s) => Scalar::String(Cow::Owned(s.into_owned())),
            Scalar::Enum(s) => Scalar::Enum(Cow::Owned(s.into_owned())),
            Scalar::Int16(v) => Scalar::Int16(v),
            Scalar::Int32(v) => Scalar::Int32(v),
            Scalar::Int64(v) => Scalar::Int64(v),
            Scalar::Single(v) => Scalar::Single(v),
            Scalar::Double(v) => Scalar::Double(v),
            Scalar::Decimal(v) => Scalar::Decimal(v),
            Scalar::Boolean(v) => Scalar::Boolean(v),
            Scalar::DateTime(v) => Scalar::DateTime(v),
            Scalar::DateTimeOffset(v) => Scalar::DateTimeOffset(v),
            Scalar::TimeSpan(v) => Scalar::TimeSpan(v),
            Scalar::Guid(v) => Scalar::Guid(v),
            Scalar::Point(v) => Scalar::Point(v),
        }
    }

    /// True when the value equals the zero value of its CLR value type.
    ///
    /// Strings and points are reference types there, so they are never
    /// default while present. Enums are always emitted.
    pub fn is_clr_default(&self) -> bool {
        match self {
            Scalar::Int16(v) => *v == 0,
            Scalar::Int32(v) => *v == 0,
            Scalar::Int64(v) => *v == 0,
            Scalar::Single(v) => *v == 0.0,
            Scalar::Double(v) => *v == 0.0,
            Scalar::Decimal(v) => v.is_zero(),
            Scalar::Boolean(v) => !*v,
            Scalar::DateTime(v) => Some(*v) == clr_min_datetime(),
            // DateTimeOffset equality compares the UTC instant only.
            Scalar::DateTimeOffset(v) => Some(v.naive_utc()) == clr_min_datetime(),
            Scalar::TimeSpan(v) => v.is_zero(),
            Scalar::Guid(v) => v.is_nil(),
            Scalar::String(_) | Scalar::Point(_) | Scalar::Enum(_) => false,
        }
    }
}

/// `DateTime.MinValue`: 0001-01-01T00:00:00.
fn clr_min_datetime() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub enum Value<'a> {
    Null,
    Scalar(Scalar<'a>),
    Collection(Vec<Value<'a>>),
    Object(Box<dyn Describe + 'a>),
}

impl<'a> Value<'a> {
    pub fn object(object: impl Describe + 'a) -> Self {
        Value::Object(Box::new(object))
    }

    pub fn collection<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value<'a>>,
    {
        Value::Collection(items.into_iter().map(Into::into).collect())
    }

    pub fn variant(name: impl Into<Cow<'a, str>>) -> Self {
        Value::Scalar(Scalar::Enum(name.into()))
    }

    /// A view of this value borrowing from it; object identity is preserved.
    pub fn reborrow(&self) -> Value<'_> {
        match self {
            Value::Null => Value::Null,
            Value::Scalar(s) => Value::Scalar(s.reborrow()),
            Value::Collection(items) => Value::Collection(items.iter().map(Value::reborrow).collect()),
            Value::Object(obj) => Value::Object(Box::new(&**obj)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(s) => s.kind_name(),
            Value::Collection(_) => "collection",
            Value::Object(_) => "object",
        }
    }

    /// Null or a scalar at its type's zero value.
    pub fn is_clr_default(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Scalar(s) => s.is_clr_default(),
            Value::Collection(_) | Value::Object(_) => false,
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Scalar(s) => f.debug_tuple("Scalar").field(s).finish(),
            Value::Collection(items) => f.debug_tuple("Collection").field(items).finish(),
            Value::Object(obj) => f
                .debug_tuple("Object")
                .field(&obj.type_name())
                .finish(),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<$ty> for Scalar<'a> {
                fn from(v: $ty) -> Self { Scalar::$variant(v) }
            }
            impl<'a> From<$ty> for Value<'a> {
                fn from(v: $ty) -> Self { Value::Scalar(Scalar::$variant(v)) }
            }
        )*
    };
}

scalar_from! {
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    bool => Boolean,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => TimeSpan,
    Uuid => Guid,
    Point => Point,
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(v: &'a str) -> Self {
        Value::Scalar(Scalar::String(Cow::Borrowed(v)))
    }
}

impl<'a> From<String> for Value<'a> {
    fn from(v: String) -> Self {
        Value::Scalar(Scalar::String(Cow::Owned(v)))
    }
}

impl<'a> From<Scalar<'a>> for Value<'a> {
    fn from(v: Scalar<'a>) -> Self {
        Value::Scalar(v)
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
