//! Field values, one variant per concrete [`FieldType`].

use serde::{Deserialize, Serialize};

use super::FieldType;

/// The value held by a field.
///
/// The variant always matches the owning field's [`FieldType`]; the graph
/// rejects assignments that would break that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Short(i16),
    UShort(u16),
    Float(f32),
    Double(f64),
    /// Seconds.
    Time(f64),
    String(String),
    Name(String),
    Vec2f([f32; 2]),
    Vec3f([f32; 3]),
    Vec4f([f32; 4]),
    Color([f32; 3]),
    /// Axis (x, y, z) and angle in radians.
    Rotation([f32; 4]),
    Trigger,
    MInt32(Vec<i32>),
    MFloat(Vec<f32>),
    MString(Vec<String>),
    MVec3f(Vec<[f32; 3]>),
    MColor(Vec<[f32; 3]>),
}

// ============================================================================
// Type mapping
// ============================================================================

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::SFBool,
            FieldValue::Int32(_) => FieldType::SFInt32,
            FieldValue::UInt32(_) => FieldType::SFUInt32,
            FieldValue::Short(_) => FieldType::SFShort,
            FieldValue::UShort(_) => FieldType::SFUShort,
            FieldValue::Float(_) => FieldType::SFFloat,
            FieldValue::Double(_) => FieldType::SFDouble,
            FieldValue::Time(_) => FieldType::SFTime,
            FieldValue::String(_) => FieldType::SFString,
            FieldValue::Name(_) => FieldType::SFName,
            FieldValue::Vec2f(_) => FieldType::SFVec2f,
            FieldValue::Vec3f(_) => FieldType::SFVec3f,
            FieldValue::Vec4f(_) => FieldType::SFVec4f,
            FieldValue::Color(_) => FieldType::SFColor,
            FieldValue::Rotation(_) => FieldType::SFRotation,
            FieldValue::Trigger => FieldType::SFTrigger,
            FieldValue::MInt32(_) => FieldType::MFInt32,
            FieldValue::MFloat(_) => FieldType::MFFloat,
            FieldValue::MString(_) => FieldType::MFString,
            FieldValue::MVec3f(_) => FieldType::MFVec3f,
            FieldValue::MColor(_) => FieldType::MFColor,
        }
    }

    /// The value a freshly constructed field of type `ty` holds.
    pub fn default_for(ty: FieldType) -> Self {
        match ty {
            FieldType::SFBool => FieldValue::Bool(false),
            FieldType::SFInt32 => FieldValue::Int32(0),
            FieldType::SFUInt32 => FieldValue::UInt32(0),
            FieldType::SFShort => FieldValue::Short(0),
            FieldType::SFUShort => FieldValue::UShort(0),
            FieldType::SFFloat => FieldValue::Float(0.0),
            FieldType::SFDouble => FieldValue::Double(0.0),
            FieldType::SFTime => FieldValue::Time(0.0),
            FieldType::SFString => FieldValue::String(String::new()),
            FieldType::SFName => FieldValue::Name(String::new()),
            FieldType::SFVec2f => FieldValue::Vec2f([0.0; 2]),
            FieldType::SFVec3f => FieldValue::Vec3f([0.0; 3]),
            FieldType::SFVec4f => FieldValue::Vec4f([0.0; 4]),
            FieldType::SFColor => FieldValue::Color([0.0; 3]),
            FieldType::SFRotation => FieldValue::Rotation([0.0, 0.0, 1.0, 0.0]),
            FieldType::SFTrigger => FieldValue::Trigger,
            FieldType::MFInt32 => FieldValue::MInt32(Vec::new()),
            FieldType::MFFloat => FieldValue::MFloat(Vec::new()),
            FieldType::MFString => FieldValue::MString(Vec::new()),
            FieldType::MFVec3f => FieldValue::MVec3f(Vec::new()),
            FieldType::MFColor => FieldValue::MColor(Vec::new()),
        }
    }
}

// ============================================================================
// Numeric access
// ============================================================================

impl FieldValue {
    /// Numeric scalars widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Int32(v) => Some(f64::from(*v)),
            FieldValue::UInt32(v) => Some(f64::from(*v)),
            FieldValue::Short(v) => Some(f64::from(*v)),
            FieldValue::UShort(v) => Some(f64::from(*v)),
            FieldValue::Float(v) => Some(f64::from(*v)),
            FieldValue::Double(v) | FieldValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// Build a numeric scalar of type `ty` from an f64. Integer targets
    /// truncate and saturate; `None` for non-numeric targets.
    pub fn from_f64(ty: FieldType, v: f64) -> Option<Self> {
        Some(match ty {
            FieldType::SFBool => FieldValue::Bool(v != 0.0),
            FieldType::SFInt32 => FieldValue::Int32(v as i32),
            FieldType::SFUInt32 => FieldValue::UInt32(v as u32),
            FieldType::SFShort => FieldValue::Short(v as i16),
            FieldType::SFUShort => FieldValue::UShort(v as u16),
            FieldType::SFFloat => FieldValue::Float(v as f32),
            FieldType::SFDouble => FieldValue::Double(v),
            FieldType::SFTime => FieldValue::Time(v),
            _ => return None,
        })
    }

    pub fn as_float(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Number of elements: 1 for single-value types.
    pub fn len(&self) -> usize {
        match self {
            FieldValue::MInt32(v) => v.len(),
            FieldValue::MFloat(v) => v.len(),
            FieldValue::MString(v) => v.len(),
            FieldValue::MVec3f(v) => v.len(),
            FieldValue::MColor(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for FieldValue { fn from(v: bool) -> Self { FieldValue::Bool(v) } }
impl From<i32> for FieldValue { fn from(v: i32) -> Self { FieldValue::Int32(v) } }
impl From<u32> for FieldValue { fn from(v: u32) -> Self { FieldValue::UInt32(v) } }
impl From<f32> for FieldValue { fn from(v: f32) -> Self { FieldValue::Float(v) } }
impl From<f64> for FieldValue { fn from(v: f64) -> Self { FieldValue::Double(v) } }
impl From<String> for FieldValue { fn from(v: String) -> Self { FieldValue::String(v) } }
impl From<&str> for FieldValue { fn from(v: &str) -> Self { FieldValue::String(v.to_owned()) } }
impl From<[f32; 3]> for FieldValue { fn from(v: [f32; 3]) -> Self { FieldValue::Vec3f(v) } }
impl From<Vec<f32>> for FieldValue { fn from(v: Vec<f32>) -> Self { FieldValue::MFloat(v) } }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_type() {
        for ty in FieldType::ALL {
            assert_eq!(FieldValue::default_for(ty).field_type(), ty);
        }
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(FieldValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(FieldValue::Short(-3).as_f64(), Some(-3.0));
        assert_eq!(FieldValue::Vec3f([1.0, 2.0, 3.0]).as_f64(), None);
    }

    #[test]
    fn test_from_f64_truncates() {
        assert_eq!(FieldValue::from_f64(FieldType::SFInt32, 2.9), Some(FieldValue::Int32(2)));
        assert_eq!(FieldValue::from_f64(FieldType::SFBool, 0.0), Some(FieldValue::Bool(false)));
        assert_eq!(FieldValue::from_f64(FieldType::SFString, 1.0), None);
    }
}
