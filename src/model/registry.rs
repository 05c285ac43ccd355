//! Field type registry: names, legacy aliases, "is-a" queries, instance
//! factories and the converter table.

use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;

use super::{FieldClass, FieldType, FieldValue};

/// A user-supplied conversion between two field types.
pub type ConvertFn = Rc<dyn Fn(&FieldValue) -> Option<FieldValue>>;

/// What a converter inserted between two types will run.
#[derive(Clone)]
pub enum Conversion {
    /// The generic convert-all rules.
    Builtin { from: FieldType, to: FieldType },
    Custom { from: FieldType, to: FieldType, func: ConvertFn },
}

impl Conversion {
    pub fn from_type(&self) -> FieldType {
        match self {
            Conversion::Builtin { from, .. } | Conversion::Custom { from, .. } => *from,
        }
    }

    pub fn to_type(&self) -> FieldType {
        match self {
            Conversion::Builtin { to, .. } | Conversion::Custom { to, .. } => *to,
        }
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Builtin { from, to } => write!(f, "Builtin({from} -> {to})"),
            Conversion::Custom { from, to, .. } => write!(f, "Custom({from} -> {to})"),
        }
    }
}

/// Registry of field types and the conversions between them.
pub struct TypeRegistry {
    by_name: HashMap<String, FieldType>,
    custom: HashMap<(FieldType, FieldType), ConvertFn>,
}

impl TypeRegistry {
    /// All concrete types plus the `SFLong`/`SFULong`/`MFLong` aliases.
    pub fn new() -> Self {
        let mut by_name: HashMap<String, FieldType> =
            FieldType::ALL.iter().map(|t| (t.name().to_owned(), *t)).collect();
        by_name.insert("SFLong".into(), FieldType::SFInt32);
        by_name.insert("SFULong".into(), FieldType::SFUInt32);
        by_name.insert("MFLong".into(), FieldType::MFInt32);
        Self { by_name, custom: HashMap::new() }
    }

    /// Resolve a type name, aliases included.
    pub fn lookup(&self, name: &str) -> Option<FieldType> {
        self.by_name.get(name).copied()
    }

    /// Register an extra name for an existing type.
    pub fn register_alias(&mut self, name: impl Into<String>, ty: FieldType) {
        self.by_name.insert(name.into(), ty);
    }

    /// Name-based "is-a" query; abstract class names are accepted as `parent`.
    pub fn is_derived_from(&self, name: &str, parent: &str) -> bool {
        let Some(ty) = self.lookup(name) else { return false };
        match parent {
            "Field" => ty.is_derived_from(FieldClass::Field),
            "SField" => ty.is_derived_from(FieldClass::SField),
            "MField" => ty.is_derived_from(FieldClass::MField),
            other => self.lookup(other) == Some(ty),
        }
    }

    /// Default-valued instance of the named type.
    pub fn create_instance(&self, name: &str) -> Option<FieldValue> {
        self.lookup(name).map(FieldValue::default_for)
    }

    /// Install a conversion, overriding the builtin rules for this pair.
    pub fn register_converter(
        &mut self,
        from: FieldType,
        to: FieldType,
        func: impl Fn(&FieldValue) -> Option<FieldValue> + 'static,
    ) {
        self.custom.insert((from, to), Rc::new(func));
    }

    /// The converter to insert between `from` and `to`, if any exists.
    pub fn converter(&self, from: FieldType, to: FieldType) -> Option<Conversion> {
        if let Some(func) = self.custom.get(&(from, to)) {
            return Some(Conversion::Custom { from, to, func: Rc::clone(func) });
        }
        builtin_convertible(from, to).then_some(Conversion::Builtin { from, to })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_name.len())
            .field("custom_converters", &self.custom.len())
            .finish()
    }
}

/// Pairs the convert-all engine can bridge.
pub fn builtin_convertible(from: FieldType, to: FieldType) -> bool {
    use FieldType::*;
    if from == to {
        return false;
    }
    if matches!(to, SFString | SFName | MFString | SFTrigger) || from == SFString {
        return true;
    }
    if from.is_numeric() && to.is_numeric() {
        return true;
    }
    if matches!((from, to), (SFVec3f, SFColor) | (SFColor, SFVec3f) | (MFVec3f, MFColor) | (MFColor, MFVec3f)) {
        return true;
    }
    if from.multi() == Some(to) || to.multi() == Some(from) {
        return true;
    }
    // Numeric single values widen into numeric multi-values and back.
    from.element().is_numeric() && to.element().is_numeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.lookup("SFLong"), Some(FieldType::SFInt32));
        assert_eq!(reg.lookup("MFLong"), Some(FieldType::MFInt32));
        assert_eq!(reg.lookup("SFNope"), None);
    }

    #[test]
    fn test_is_derived_from() {
        let reg = TypeRegistry::new();
        assert!(reg.is_derived_from("SFFloat", "Field"));
        assert!(reg.is_derived_from("SFLong", "SFInt32"));
        assert!(reg.is_derived_from("MFColor", "MField"));
        assert!(!reg.is_derived_from("MFColor", "SField"));
    }

    #[test]
    fn test_builtin_table() {
        use FieldType::*;
        assert!(builtin_convertible(SFFloat, SFInt32));
        assert!(builtin_convertible(SFVec3f, SFString));
        assert!(builtin_convertible(SFString, SFRotation));
        assert!(builtin_convertible(SFFloat, MFFloat));
        assert!(builtin_convertible(SFVec3f, SFColor));
        assert!(!builtin_convertible(SFVec3f, SFBool));
        assert!(!builtin_convertible(SFRotation, SFFloat));
        assert!(!builtin_convertible(SFFloat, SFFloat));
    }

    #[test]
    fn test_custom_converter_overrides() {
        let mut reg = TypeRegistry::new();
        assert!(reg.converter(FieldType::SFRotation, FieldType::SFFloat).is_none());
        reg.register_converter(FieldType::SFRotation, FieldType::SFFloat, |v| match v {
            FieldValue::Rotation(r) => Some(FieldValue::Float(r[3])),
            _ => None,
        });
        let conv = reg.converter(FieldType::SFRotation, FieldType::SFFloat);
        assert!(matches!(conv, Some(Conversion::Custom { .. })));
    }
}
