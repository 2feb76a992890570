//! Literal text for leaf values.
//!
//! Each rule produces the value side of `Name = <value>`; the walker writes the
//! member name and separators.

use std::borrow::Cow;

use chrono::{Datelike, TimeDelta, Timelike};

use crate::types::DeclaredType;
use crate::value::{Point, Scalar};

/// .NET ticks are 100 ns.
pub const TICKS_PER_SECOND: i128 = 10_000_000;
const NANOS_PER_TICK: i128 = 100;

/// Knobs that change literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralStyle {
    /// Escape quotes, backslashes and control characters in strings.
    pub escape_strings: bool,
    /// Write enums as `Type.Variant` instead of the bare variant.
    pub qualify_enums: bool,
}

impl Default for LiteralStyle {
    fn default() -> Self {
        Self { escape_strings: true, qualify_enums: false }
    }
}

/// Append the literal for `scalar`; `ty` is the declared type, used for enum
/// qualification.
pub fn write_scalar(out: &mut String, ty: &DeclaredType, scalar: &Scalar<'_>, style: LiteralStyle) {
    match scalar {
        Scalar::Int16(v) => out.push_str(&v.to_string()),
        Scalar::Int32(v) => out.push_str(&v.to_string()),
        Scalar::Int64(v) => out.push_str(&v.to_string()),
        Scalar::Single(v) => out.push_str(&single_text(*v)),
        Scalar::Double(v) => out.push_str(&double_text(*v)),
        Scalar::Decimal(v) => {
            out.push_str(&v.to_string());
            out.push('m');
        }
        Scalar::Boolean(v) => out.push_str(if *v { "true" } else { "false" }),
        Scalar::DateTime(dt) => {
            out.push_str(&format!(
                "new DateTime({},{},{},{},{},{})",
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ));
        }
        Scalar::DateTimeOffset(dto) => {
            let offset_ticks = i128::from(dto.offset().local_minus_utc()) * TICKS_PER_SECOND;
            out.push_str(&format!(
                "new DateTimeOffset({},{},{},{},{},{}, TimeSpan.FromTicks({}))",
                dto.year(),
                dto.month(),
                dto.day(),
                dto.hour(),
                dto.minute(),
                dto.second(),
                offset_ticks
            ));
        }
        Scalar::TimeSpan(span) => {
            out.push_str(&format!("TimeSpan.FromTicks({})", ticks(*span)));
        }
        Scalar::Guid(id) => out.push_str(&format!("Guid.Parse(\"{}\")", id.hyphenated())),
        Scalar::String(s) => {
            out.push('"');
            if style.escape_strings {
                out.push_str(&escape_string(s));
            } else {
                out.push_str(s);
            }
            out.push('"');
        }
        Scalar::Point(p) => out.push_str(&point_text(p)),
        Scalar::Enum(variant) => {
            if let (true, DeclaredType::Enum(name)) = (style.qualify_enums, ty.underlying()) {
                out.push_str(name);
                out.push('.');
            }
            out.push_str(variant);
        }
    }
}

/// Whole ticks in `span`; sub-tick nanoseconds are dropped.
pub fn ticks(span: TimeDelta) -> i128 {
    i128::from(span.num_seconds()) * TICKS_PER_SECOND
        + i128::from(span.subsec_nanos()) / NANOS_PER_TICK
}

/// Shortest round-trip text. Magnitudes outside `[1e-4, 1e15)` use exponent
/// form (`1E+20`), so large values never read as an oversized integer.
pub fn double_text(v: f64) -> String {
    if v.is_nan() {
        "double.NaN".into()
    } else if v == f64::INFINITY {
        "double.PositiveInfinity".into()
    } else if v == f64::NEG_INFINITY {
        "double.NegativeInfinity".into()
    } else if v != 0.0 && !(1e-4..1e15).contains(&v.abs()) {
        exponent_form(&format!("{v:e}"))
    } else {
        v.to_string()
    }
}

/// Like [`double_text`] with the `f` suffix C# needs for a `float` literal.
pub fn single_text(v: f32) -> String {
    if v.is_nan() {
        "float.NaN".into()
    } else if v == f32::INFINITY {
        "float.PositiveInfinity".into()
    } else if v == f32::NEG_INFINITY {
        "float.NegativeInfinity".into()
    } else if v != 0.0 && !(1e-4..1e15).contains(&v.abs()) {
        format!("{}f", exponent_form(&format!("{v:e}")))
    } else {
        format!("{v}f")
    }
}

/// `1.5e-7` → `1.5E-07`, the layout .NET uses.
fn exponent_form(scientific: &str) -> String {
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}E{sign}{:02}", exponent.unsigned_abs())
}

fn point_text(p: &Point) -> String {
    format!("new Point({},{},{})", double_text(p.x), double_text(p.y), double_text(p.z))
}

/// Escape `raw` for a regular (non-verbatim) C# string literal.
pub fn escape_string(raw: &str) -> Cow<'_, str> {
    if !raw.chars().any(needs_escape) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if needs_escape(c) => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn needs_escape(c: char) -> bool {
    // U+0085, U+2028 and U+2029 end a line in C# source.
    matches!(c, '"' | '\\') || c.is_control() || matches!(c, '\u{2028}' | '\u{2029}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn text(ty: &DeclaredType, scalar: Scalar<'_>) -> String {
        let mut out = String::new();
        write_scalar(&mut out, ty, &scalar, LiteralStyle::default());
        out
    }

    #[test]
    fn numbers() {
        assert_eq!(text(&DeclaredType::Int16, Scalar::Int16(-3)), "-3");
        assert_eq!(text(&DeclaredType::Int64, Scalar::Int64(9_000_000_000)), "9000000000");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(1.5)), "1.5");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(2.0)), "2");
        assert_eq!(text(&DeclaredType::Single, Scalar::Single(0.25)), "0.25f");
        assert_eq!(text(&DeclaredType::Single, Scalar::Single(0.1)), "0.1f");
    }

    #[test]
    fn large_and_tiny_reals_use_exponent_form() {
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(1e20)), "1E+20");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(-2.5e15)), "-2.5E+15");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(1.5e-7)), "1.5E-07");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(1e300)), "1E+300");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(123456789012345.0)), "123456789012345");
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(0.0001)), "0.0001");
        assert_eq!(text(&DeclaredType::Single, Scalar::Single(3e20)), "3E+20f");
        assert_eq!(
            text(&DeclaredType::Point, Scalar::Point(Point::new(1e20, 0.0, 1.0))),
            "new Point(1E+20,0,1)"
        );
    }

    #[test]
    fn non_finite_floats_are_symbolic() {
        assert_eq!(text(&DeclaredType::Double, Scalar::Double(f64::NAN)), "double.NaN");
        assert_eq!(
            text(&DeclaredType::Double, Scalar::Double(f64::NEG_INFINITY)),
            "double.NegativeInfinity"
        );
        assert_eq!(text(&DeclaredType::Single, Scalar::Single(f32::NAN)), "float.NaN");
    }

    #[test]
    fn decimal_keeps_scale_and_suffix() {
        let d = Decimal::from_str("12.50").unwrap();
        assert_eq!(text(&DeclaredType::Decimal, Scalar::Decimal(d)), "12.50m");
    }

    #[test]
    fn booleans_are_lowercase() {
        assert_eq!(text(&DeclaredType::Boolean, Scalar::Boolean(true)), "true");
        assert_eq!(text(&DeclaredType::Boolean, Scalar::Boolean(false)), "false");
    }

    #[test]
    fn datetime_truncates_sub_seconds() {
        let dt = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_milli_opt(5, 6, 7, 890)
            .unwrap();
        assert_eq!(
            text(&DeclaredType::DateTime, Scalar::DateTime(dt)),
            "new DateTime(2021,3,4,5,6,7)"
        );
    }

    #[test]
    fn datetime_offset_keeps_local_fields_and_offset_ticks() {
        let offset = FixedOffset::east_opt(2 * 3600 + 30 * 60).unwrap();
        let dto = offset.with_ymd_and_hms(2020, 12, 31, 23, 59, 58).unwrap();
        assert_eq!(
            text(&DeclaredType::DateTimeOffset, Scalar::DateTimeOffset(dto)),
            "new DateTimeOffset(2020,12,31,23,59,58, TimeSpan.FromTicks(90000000000))"
        );
    }

    #[test]
    fn timespan_keeps_tick_precision() {
        let span = TimeDelta::seconds(90) + TimeDelta::nanoseconds(1_234_500);
        assert_eq!(
            text(&DeclaredType::TimeSpan, Scalar::TimeSpan(span)),
            "TimeSpan.FromTicks(900012345)"
        );
        assert_eq!(ticks(TimeDelta::milliseconds(-1)), -10_000);
    }

    #[test]
    fn guid_is_lowercase_hyphenated() {
        let id = uuid::Uuid::parse_str("ABCDEF00-1111-2222-3333-444455556666").unwrap();
        assert_eq!(
            text(&DeclaredType::Guid, Scalar::Guid(id)),
            r#"Guid.Parse("abcdef00-1111-2222-3333-444455556666")"#
        );
    }

    #[test]
    fn point_marks_missing_coordinates() {
        assert_eq!(
            text(&DeclaredType::Point, Scalar::Point(Point::xy(1.5, -2.0))),
            "new Point(1.5,-2,double.NaN)"
        );
    }

    #[test]
    fn strings_are_escaped_unless_raw() {
        let raw = "say \"hi\"\n\\ \u{1}";
        assert_eq!(
            text(&DeclaredType::String, Scalar::String(raw.into())),
            r#""say \"hi\"\n\\ \u0001""#
        );

        let mut out = String::new();
        let style = LiteralStyle { escape_strings: false, ..LiteralStyle::default() };
        write_scalar(&mut out, &DeclaredType::String, &Scalar::String("a\"b".into()), style);
        assert_eq!(out, "\"a\"b\"");
    }

    #[test]
    fn plain_strings_are_borrowed() {
        assert!(matches!(escape_string("plain text"), Cow::Borrowed(_)));
        assert_eq!(escape_string("line\u{2028}break"), "line\\u2028break");
    }

    #[test]
    fn enums_optionally_qualified() {
        let ty = DeclaredType::nullable(DeclaredType::enumeration("Status"));
        assert_eq!(text(&ty, Scalar::Enum("Active".into())), "Active");

        let mut out = String::new();
        let style = LiteralStyle { qualify_enums: true, ..LiteralStyle::default() };
        write_scalar(&mut out, &ty, &Scalar::Enum("Active".into()), style);
        assert_eq!(out, "Status.Active");
    }
}
