//! Per-type value readers and writers, ASCII and binary.
//!
//! Floats are written in shortest round-trip form with a fractional part
//! always present (`7.0`, not `7`). Multi-value fields holding exactly one
//! element are written bare; anything else goes in `[ a, b ]` brackets.
//! Names are written bare unless they would not read back as one token.

use crate::model::{FieldType, FieldValue};

use super::input::NAME_STOP;
use super::{FieldInput, FieldOutput};

// ============================================================================
// Reading
// ============================================================================

/// Read one value of type `ty`. `None` means premature end of input or an
/// unparsable payload; the caller posts the error.
pub fn read_value(input: &mut FieldInput, ty: FieldType) -> Option<FieldValue> {
    if input.is_binary() {
        return read_binary(input, ty);
    }
    if ty.is_multi() {
        return read_multi_ascii(input, ty);
    }
    read_single_ascii(input, ty)
}

fn parse_int(token: &str) -> Option<i64> {
    let (neg, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if neg { -magnitude } else { magnitude })
}

fn read_int(input: &mut FieldInput) -> Option<i64> {
    parse_int(&input.read_number_token()?)
}

fn read_f32(input: &mut FieldInput) -> Option<f32> {
    input.read_number_token()?.parse().ok()
}

fn read_f64(input: &mut FieldInput) -> Option<f64> {
    input.read_number_token()?.parse().ok()
}

fn read_floats<const N: usize>(input: &mut FieldInput) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    for slot in &mut out {
        *slot = read_f32(input)?;
    }
    Some(out)
}

fn read_single_ascii(input: &mut FieldInput, ty: FieldType) -> Option<FieldValue> {
    Some(match ty {
        FieldType::SFBool => {
            let token = input.read_name()?;
            match token.as_str() {
                "TRUE" | "true" | "1" => FieldValue::Bool(true),
                "FALSE" | "false" | "0" => FieldValue::Bool(false),
                _ => return None,
            }
        }
        FieldType::SFInt32 => FieldValue::Int32(i32::try_from(read_int(input)?).ok()?),
        FieldType::SFUInt32 => FieldValue::UInt32(u32::try_from(read_int(input)?).ok()?),
        FieldType::SFShort => FieldValue::Short(i16::try_from(read_int(input)?).ok()?),
        FieldType::SFUShort => FieldValue::UShort(u16::try_from(read_int(input)?).ok()?),
        FieldType::SFFloat => FieldValue::Float(read_f32(input)?),
        FieldType::SFDouble => FieldValue::Double(read_f64(input)?),
        FieldType::SFTime => FieldValue::Time(read_f64(input)?),
        FieldType::SFString => FieldValue::String(input.read_string()?),
        FieldType::SFName => FieldValue::Name(input.read_string()?),
        FieldType::SFVec2f => FieldValue::Vec2f(read_floats(input)?),
        FieldType::SFVec3f => FieldValue::Vec3f(read_floats(input)?),
        FieldType::SFVec4f => FieldValue::Vec4f(read_floats(input)?),
        FieldType::SFColor => FieldValue::Color(read_floats(input)?),
        FieldType::SFRotation => FieldValue::Rotation(read_floats(input)?),
        FieldType::SFTrigger => FieldValue::Trigger,
        multi => return read_multi_ascii(input, multi),
    })
}

fn read_multi_ascii(input: &mut FieldInput, ty: FieldType) -> Option<FieldValue> {
    let element = ty.element();
    let mut items = Vec::new();
    if input.peek_char()? == '[' {
        input.read_char();
        loop {
            match input.peek_char()? {
                ']' => {
                    input.read_char();
                    break;
                }
                ',' => {
                    input.read_char();
                }
                _ => items.push(read_single_ascii(input, element)?),
            }
        }
    } else {
        items.push(read_single_ascii(input, element)?);
    }
    collect_multi(ty, items)
}

/// Gather single values into the multi-value variant for `ty`.
pub fn collect_multi(ty: FieldType, items: Vec<FieldValue>) -> Option<FieldValue> {
    fn gather<T>(items: Vec<FieldValue>, f: impl Fn(FieldValue) -> Option<T>) -> Option<Vec<T>> {
        items.into_iter().map(f).collect()
    }
    Some(match ty {
        FieldType::MFInt32 => FieldValue::MInt32(gather(items, |v| match v {
            FieldValue::Int32(x) => Some(x),
            _ => None,
        })?),
        FieldType::MFFloat => FieldValue::MFloat(gather(items, |v| match v {
            FieldValue::Float(x) => Some(x),
            _ => None,
        })?),
        FieldType::MFString => FieldValue::MString(gather(items, |v| match v {
            FieldValue::String(x) => Some(x),
            _ => None,
        })?),
        FieldType::MFVec3f => FieldValue::MVec3f(gather(items, |v| match v {
            FieldValue::Vec3f(x) => Some(x),
            _ => None,
        })?),
        FieldType::MFColor => FieldValue::MColor(gather(items, |v| match v {
            FieldValue::Color(x) => Some(x),
            _ => None,
        })?),
        _ => return None,
    })
}

/// Split a multi-value into its single-value elements.
pub fn elements(value: &FieldValue) -> Vec<FieldValue> {
    match value {
        FieldValue::MInt32(v) => v.iter().copied().map(FieldValue::Int32).collect(),
        FieldValue::MFloat(v) => v.iter().copied().map(FieldValue::Float).collect(),
        FieldValue::MString(v) => v.iter().cloned().map(FieldValue::String).collect(),
        FieldValue::MVec3f(v) => v.iter().copied().map(FieldValue::Vec3f).collect(),
        FieldValue::MColor(v) => v.iter().copied().map(FieldValue::Color).collect(),
        single => vec![single.clone()],
    }
}

fn read_binary_floats<const N: usize>(input: &mut FieldInput) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    for slot in &mut out {
        *slot = input.read_f32()?;
    }
    Some(out)
}

fn read_binary(input: &mut FieldInput, ty: FieldType) -> Option<FieldValue> {
    if ty.is_multi() {
        let count = input.read_u32()?;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(read_binary(input, ty.element())?);
        }
        return collect_multi(ty, items);
    }
    Some(match ty {
        FieldType::SFBool => FieldValue::Bool(input.read_u32()? != 0),
        FieldType::SFInt32 => FieldValue::Int32(input.read_i32()?),
        FieldType::SFUInt32 => FieldValue::UInt32(input.read_u32()?),
        FieldType::SFShort => FieldValue::Short(i16::try_from(input.read_i32()?).ok()?),
        FieldType::SFUShort => FieldValue::UShort(u16::try_from(input.read_u32()?).ok()?),
        FieldType::SFFloat => FieldValue::Float(input.read_f32()?),
        FieldType::SFDouble => FieldValue::Double(input.read_f64()?),
        FieldType::SFTime => FieldValue::Time(input.read_f64()?),
        FieldType::SFString => FieldValue::String(input.read_binary_string()?),
        FieldType::SFName => FieldValue::Name(input.read_binary_string()?),
        FieldType::SFVec2f => FieldValue::Vec2f(read_binary_floats(input)?),
        FieldType::SFVec3f => FieldValue::Vec3f(read_binary_floats(input)?),
        FieldType::SFVec4f => FieldValue::Vec4f(read_binary_floats(input)?),
        FieldType::SFColor => FieldValue::Color(read_binary_floats(input)?),
        FieldType::SFRotation => FieldValue::Rotation(read_binary_floats(input)?),
        _ => FieldValue::Trigger,
    })
}

// ============================================================================
// Writing
// ============================================================================

/// Write `value` in the output's encoding.
pub fn write_value(out: &mut FieldOutput, value: &FieldValue) {
    if out.is_binary() {
        write_binary(out, value);
    } else {
        out.write_str(&format_value(value));
    }
}

/// ASCII form of a value, as `FieldGraph::get_string` returns it.
pub fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::MInt32(_)
        | FieldValue::MFloat(_)
        | FieldValue::MString(_)
        | FieldValue::MVec3f(_)
        | FieldValue::MColor(_) => {
            let items = elements(value);
            if items.len() == 1 {
                return format_single(&items[0]);
            }
            let inner: Vec<String> = items.iter().map(format_single).collect();
            if inner.is_empty() {
                "[ ]".to_owned()
            } else {
                format!("[ {} ]", inner.join(", "))
            }
        }
        single => format_single(single),
    }
}

fn join_floats(values: &[f32]) -> String {
    values.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>().join(" ")
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn is_bare_name(s: &str) -> bool {
    !s.is_empty() && !s.bytes().any(|b| b.is_ascii_whitespace() || b == b'\\' || NAME_STOP.contains(&b))
}

fn format_single(value: &FieldValue) -> String {
    match value {
        FieldValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_owned(),
        FieldValue::Int32(v) => v.to_string(),
        FieldValue::UInt32(v) => v.to_string(),
        FieldValue::Short(v) => v.to_string(),
        FieldValue::UShort(v) => v.to_string(),
        FieldValue::Float(v) => format!("{v:?}"),
        FieldValue::Double(v) | FieldValue::Time(v) => format!("{v:?}"),
        FieldValue::String(s) => quote(s),
        FieldValue::Name(s) if is_bare_name(s) => s.clone(),
        FieldValue::Name(s) => quote(s),
        FieldValue::Vec2f(v) => join_floats(v),
        FieldValue::Vec3f(v) | FieldValue::Color(v) => join_floats(v),
        FieldValue::Vec4f(v) | FieldValue::Rotation(v) => join_floats(v),
        FieldValue::Trigger => String::new(),
        multi => format_value(multi),
    }
}

fn write_binary(out: &mut FieldOutput, value: &FieldValue) {
    if value.field_type().is_multi() {
        let items = elements(value);
        out.write_u32(u32::try_from(items.len()).unwrap_or(u32::MAX));
        for item in &items {
            write_binary(out, item);
        }
        return;
    }
    match value {
        FieldValue::Bool(b) => out.write_u32(u32::from(*b)),
        FieldValue::Int32(v) => out.write_i32(*v),
        FieldValue::UInt32(v) => out.write_u32(*v),
        FieldValue::Short(v) => out.write_i32(i32::from(*v)),
        FieldValue::UShort(v) => out.write_u32(u32::from(*v)),
        FieldValue::Float(v) => out.write_f32(*v),
        FieldValue::Double(v) | FieldValue::Time(v) => out.write_f64(*v),
        FieldValue::String(s) | FieldValue::Name(s) => out.write_binary_string(s),
        FieldValue::Vec2f(v) => v.iter().for_each(|x| out.write_f32(*x)),
        FieldValue::Vec3f(v) | FieldValue::Color(v) => v.iter().for_each(|x| out.write_f32(*x)),
        FieldValue::Vec4f(v) | FieldValue::Rotation(v) => v.iter().for_each(|x| out.write_f32(*x)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(ty: FieldType, text: &str) -> Option<FieldValue> {
        read_value(&mut FieldInput::from_str(text), ty)
    }

    #[test]
    fn test_float_keeps_fraction() {
        assert_eq!(format_value(&FieldValue::Float(7.0)), "7.0");
        assert_eq!(format_value(&FieldValue::Float(3.5)), "3.5");
    }

    #[test]
    fn test_ints() {
        assert_eq!(parse(FieldType::SFInt32, "0x1F"), Some(FieldValue::Int32(31)));
        assert_eq!(parse(FieldType::SFInt32, "-12"), Some(FieldValue::Int32(-12)));
        assert_eq!(parse(FieldType::SFShort, "70000"), None);
        assert_eq!(parse(FieldType::SFUInt32, "-1"), None);
    }

    #[test]
    fn test_bool() {
        assert_eq!(parse(FieldType::SFBool, "TRUE"), Some(FieldValue::Bool(true)));
        assert_eq!(parse(FieldType::SFBool, "0"), Some(FieldValue::Bool(false)));
        assert_eq!(parse(FieldType::SFBool, "maybe"), None);
    }

    #[test]
    fn test_vectors() {
        assert_eq!(
            parse(FieldType::SFVec3f, "1 2.5 -3"),
            Some(FieldValue::Vec3f([1.0, 2.5, -3.0]))
        );
        assert_eq!(parse(FieldType::SFVec3f, "1 2"), None);
        assert_eq!(format_value(&FieldValue::Vec3f([1.0, 2.5, -3.0])), "1.0 2.5 -3.0");
    }

    #[test]
    fn test_multi_forms() {
        assert_eq!(parse(FieldType::MFFloat, "4"), Some(FieldValue::MFloat(vec![4.0])));
        assert_eq!(
            parse(FieldType::MFFloat, "[ 1, 2 3, ]"),
            Some(FieldValue::MFloat(vec![1.0, 2.0, 3.0]))
        );
        assert_eq!(parse(FieldType::MFFloat, "[ 1, 2"), None);
        assert_eq!(format_value(&FieldValue::MFloat(vec![])), "[ ]");
        assert_eq!(format_value(&FieldValue::MFloat(vec![1.0])), "1.0");
        assert_eq!(format_value(&FieldValue::MInt32(vec![1, 2])), "[ 1, 2 ]");
    }

    #[test]
    fn test_strings() {
        let v = FieldValue::String("a \"quoted\" word".into());
        let text = format_value(&v);
        assert_eq!(parse(FieldType::SFString, &text), Some(v));
        assert_eq!(parse(FieldType::SFString, "bare"), Some(FieldValue::String("bare".into())));
    }

    #[test]
    fn test_names_quoted_only_when_needed() {
        assert_eq!(format_value(&FieldValue::Name("Pivot".into())), "Pivot");
        for raw in ["two words", "", "a.b", "1.0 2.0 3.0", "x\"y"] {
            let v = FieldValue::Name(raw.into());
            let text = format_value(&v);
            assert!(text.starts_with('"'), "{text}");
            assert_eq!(parse(FieldType::SFName, &text), Some(v));
        }
        assert_eq!(parse(FieldType::SFName, "Pivot"), Some(FieldValue::Name("Pivot".into())));
    }

    #[test]
    fn test_binary_roundtrip_of_mixed_values() {
        let values = [
            FieldValue::Short(-4),
            FieldValue::Time(12.25),
            FieldValue::Name("abc".into()),
            FieldValue::Rotation([0.0, 1.0, 0.0, 1.5]),
            FieldValue::MString(vec!["x".into(), "yz".into()]),
        ];
        let mut out = FieldOutput::binary();
        for v in &values {
            write_value(&mut out, v);
        }
        let mut input = FieldInput::from_binary(out.into_bytes());
        for v in &values {
            assert_eq!(read_value(&mut input, v.field_type()).as_ref(), Some(v));
        }
        assert!(input.eof());
    }
}
