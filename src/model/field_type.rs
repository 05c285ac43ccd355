//! Sealed runtime type tags for fields.
//!
//! Every concrete field kind is a [`FieldType`] variant; the abstract
//! classes above them are [`FieldClass`]. "Is-a" queries go through
//! [`FieldType::is_derived_from`] instead of any reflection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Abstract field classes. `Field` is the root of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldClass {
    Field,
    SField,
    MField,
}

impl FieldClass {
    pub fn name(self) -> &'static str {
        match self {
            FieldClass::Field => "Field",
            FieldClass::SField => "SField",
            FieldClass::MField => "MField",
        }
    }
}

/// Concrete field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    SFBool,
    SFInt32,
    SFUInt32,
    SFShort,
    SFUShort,
    SFFloat,
    SFDouble,
    SFTime,
    SFString,
    SFName,
    SFVec2f,
    SFVec3f,
    SFVec4f,
    SFColor,
    SFRotation,
    SFTrigger,
    MFInt32,
    MFFloat,
    MFString,
    MFVec3f,
    MFColor,
}

impl FieldType {
    pub const ALL: [FieldType; 21] = [
        FieldType::SFBool,
        FieldType::SFInt32,
        FieldType::SFUInt32,
        FieldType::SFShort,
        FieldType::SFUShort,
        FieldType::SFFloat,
        FieldType::SFDouble,
        FieldType::SFTime,
        FieldType::SFString,
        FieldType::SFName,
        FieldType::SFVec2f,
        FieldType::SFVec3f,
        FieldType::SFVec4f,
        FieldType::SFColor,
        FieldType::SFRotation,
        FieldType::SFTrigger,
        FieldType::MFInt32,
        FieldType::MFFloat,
        FieldType::MFString,
        FieldType::MFVec3f,
        FieldType::MFColor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldType::SFBool => "SFBool",
            FieldType::SFInt32 => "SFInt32",
            FieldType::SFUInt32 => "SFUInt32",
            FieldType::SFShort => "SFShort",
            FieldType::SFUShort => "SFUShort",
            FieldType::SFFloat => "SFFloat",
            FieldType::SFDouble => "SFDouble",
            FieldType::SFTime => "SFTime",
            FieldType::SFString => "SFString",
            FieldType::SFName => "SFName",
            FieldType::SFVec2f => "SFVec2f",
            FieldType::SFVec3f => "SFVec3f",
            FieldType::SFVec4f => "SFVec4f",
            FieldType::SFColor => "SFColor",
            FieldType::SFRotation => "SFRotation",
            FieldType::SFTrigger => "SFTrigger",
            FieldType::MFInt32 => "MFInt32",
            FieldType::MFFloat => "MFFloat",
            FieldType::MFString => "MFString",
            FieldType::MFVec3f => "MFVec3f",
            FieldType::MFColor => "MFColor",
        }
    }

    /// Direct parent class.
    pub fn parent(self) -> FieldClass {
        if self.is_multi() { FieldClass::MField } else { FieldClass::SField }
    }

    pub fn is_multi(self) -> bool {
        matches!(
            self,
            FieldType::MFInt32
                | FieldType::MFFloat
                | FieldType::MFString
                | FieldType::MFVec3f
                | FieldType::MFColor
        )
    }

    /// `SFBool` through `SFTime`: scalars that convert numerically.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::SFBool
                | FieldType::SFInt32
                | FieldType::SFUInt32
                | FieldType::SFShort
                | FieldType::SFUShort
                | FieldType::SFFloat
                | FieldType::SFDouble
                | FieldType::SFTime
        )
    }

    pub fn is_derived_from(self, class: FieldClass) -> bool {
        match class {
            FieldClass::Field => true,
            other => self.parent() == other,
        }
    }

    /// Single-value element type of a multi-value type, or the type itself.
    pub fn element(self) -> FieldType {
        match self {
            FieldType::MFInt32 => FieldType::SFInt32,
            FieldType::MFFloat => FieldType::SFFloat,
            FieldType::MFString => FieldType::SFString,
            FieldType::MFVec3f => FieldType::SFVec3f,
            FieldType::MFColor => FieldType::SFColor,
            other => other,
        }
    }

    /// Multi-value type holding elements of this single-value type.
    pub fn multi(self) -> Option<FieldType> {
        match self {
            FieldType::SFInt32 => Some(FieldType::MFInt32),
            FieldType::SFFloat => Some(FieldType::MFFloat),
            FieldType::SFString => Some(FieldType::MFString),
            FieldType::SFVec3f => Some(FieldType::MFVec3f),
            FieldType::SFColor => Some(FieldType::MFColor),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(FieldType::SFFloat.is_derived_from(FieldClass::Field));
        assert!(FieldType::SFFloat.is_derived_from(FieldClass::SField));
        assert!(!FieldType::SFFloat.is_derived_from(FieldClass::MField));
        assert!(FieldType::MFVec3f.is_derived_from(FieldClass::MField));
    }

    #[test]
    fn test_element_and_multi_agree() {
        for ty in FieldType::ALL {
            if let Some(multi) = ty.multi() {
                assert_eq!(multi.element(), ty);
            }
        }
    }
}
