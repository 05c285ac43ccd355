//! # Field Graph
//!
//! The engine. A `FieldGraph` owns every field, container, output and
//! sensor and keys them by opaque id; connections are id lists kept on
//! both ends and only ever changed by the connect/disconnect routines.
//!
//! Change flows two ways:
//!
//! ```text
//! set_value ─▶ value_changed ─▶ notify (push: mark slaves dirty, tell owners/auditors)
//! get_value ─▶ evaluate      ─▶ pull from the last master (field, converter or engine)
//! ```
//!
//! Everything is single-threaded. Re-entrancy is handled with per-field
//! guard bits: `NOTIFIED` silently breaks notification cycles, while
//! re-entering `evaluate` on the same field is treated as a bug.

pub mod storage;
pub mod field;
pub mod container;
pub mod sensor;
pub mod connect;
pub mod notify;
pub mod evaluate;
pub mod persist;
pub mod converter;

use hashbrown::HashMap;

use crate::config::GraphConfig;
use crate::model::*;
use crate::{Error, Result};

pub use field::Field;
pub use storage::{Auditor, ConnectStorage, FieldStorage};
pub use container::{Container, ContainerFlavor, ContainerTemplate, Engine, EngineFactory, Output};
pub use converter::{convert_value, ConvertAll};
pub use sensor::{DataSensor, SensorCallback, SensorEvent, SensorTarget};
pub use notify::{NotifyList, NotifyRecord, NotifyKind};

// ============================================================================
// FieldGraph
// ============================================================================

/// Arena holding fields and everything they connect to.
pub struct FieldGraph {
    config: GraphConfig,
    registry: TypeRegistry,
    templates: HashMap<String, ContainerTemplate>,
    fields: HashMap<FieldId, Field>,
    containers: HashMap<ContainerId, Container>,
    outputs: HashMap<OutputId, Output>,
    sensors: HashMap<SensorId, DataSensor>,
    next_id: u64,
    /// Nesting depth of `start_notify` passes.
    notify_depth: u32,
    /// Sensors to fire when the outermost pass ends.
    pending_sensors: Vec<SensorId>,
}

impl FieldGraph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            registry: TypeRegistry::new(),
            templates: HashMap::new(),
            fields: HashMap::new(),
            containers: HashMap::new(),
            outputs: HashMap::new(),
            sensors: HashMap::new(),
            next_id: 1,
            notify_depth: 0,
            pending_sensors: Vec::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig { &self.config }

    pub fn registry(&self) -> &TypeRegistry { &self.registry }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry { &mut self.registry }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn field_count(&self) -> usize { self.fields.len() }

    pub fn container_count(&self) -> usize { self.containers.len() }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn field(&self, id: FieldId) -> Result<&Field> {
        self.fields.get(&id).ok_or_else(|| Error::NotFound(format!("field {id}")))
    }

    pub(crate) fn field_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.fields.get_mut(&id).ok_or_else(|| Error::NotFound(format!("field {id}")))
    }

    pub fn container(&self, id: ContainerId) -> Result<&Container> {
        self.containers.get(&id).ok_or_else(|| Error::NotFound(format!("container {id}")))
    }

    pub(crate) fn container_mut(&mut self, id: ContainerId) -> Result<&mut Container> {
        self.containers.get_mut(&id).ok_or_else(|| Error::NotFound(format!("container {id}")))
    }

    pub fn output(&self, id: OutputId) -> Result<&Output> {
        self.outputs.get(&id).ok_or_else(|| Error::NotFound(format!("output {id}")))
    }

    pub(crate) fn output_mut(&mut self, id: OutputId) -> Result<&mut Output> {
        self.outputs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("output {id}")))
    }

    pub fn sensor(&self, id: SensorId) -> Result<&DataSensor> {
        self.sensors.get(&id).ok_or_else(|| Error::NotFound(format!("sensor {id}")))
    }

    pub(crate) fn sensor_mut(&mut self, id: SensorId) -> Result<&mut DataSensor> {
        self.sensors.get_mut(&id).ok_or_else(|| Error::NotFound(format!("sensor {id}")))
    }

    pub fn contains_field(&self, id: FieldId) -> bool { self.fields.contains_key(&id) }

    pub fn contains_container(&self, id: ContainerId) -> bool { self.containers.contains_key(&id) }

    // ========================================================================
    // Field lifecycle
    // ========================================================================

    /// A detached field holding the default value for `ty`.
    pub fn create_field(&mut self, ty: FieldType) -> FieldId {
        let id = FieldId(self.alloc_id());
        self.fields.insert(id, Field::new(ty));
        id
    }

    /// Detached field created from a registered type name (aliases allowed).
    pub fn create_field_by_name(&mut self, type_name: &str) -> Result<FieldId> {
        let ty = self
            .registry
            .lookup(type_name)
            .ok_or_else(|| Error::NotFound(format!("field type {type_name}")))?;
        Ok(self.create_field(ty))
    }

    /// Attach `field` to `owner`. Attaching marks the value as default.
    pub fn set_owner(&mut self, field: FieldId, owner: Option<ContainerId>) -> Result<()> {
        let f = self.field_mut(field)?;
        f.storage.set_owner(owner);
        f.status.set(StatusFlags::DEFAULT);
        Ok(())
    }

    pub fn owner(&self, field: FieldId) -> Result<Option<ContainerId>> {
        Ok(self.field(field)?.owner())
    }

    /// Tear down and remove a field: sever its connections, tell sensors
    /// it is going away, then free its storage.
    pub fn destroy_field(&mut self, field: FieldId) -> Result<()> {
        self.teardown_field(field)?;
        let owner = self.fields.remove(&field).and_then(|f| f.owner());
        if let Some(c) = owner.and_then(|owner| self.containers.get_mut(&owner)) {
            c.fields.retain(|(_, f)| *f != field);
        }
        Ok(())
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Current value, evaluating pending connections first.
    pub fn get_value(&mut self, field: FieldId) -> Result<FieldValue> {
        self.evaluate(field)?;
        Ok(self.field(field)?.value.clone())
    }

    /// Assign a value. It must match the field's type.
    pub fn set_value(&mut self, field: FieldId, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        let f = self.field_mut(field)?;
        if value.field_type() != f.field_type {
            return Err(Error::TypeMismatch {
                expected: f.field_type.name().to_owned(),
                got: value.field_type().name().to_owned(),
            });
        }
        f.value = value;
        self.value_changed(field, true)
    }

    /// Type and value equality. Both sides are evaluated first.
    pub fn is_same(&mut self, a: FieldId, b: FieldId) -> Result<bool> {
        let va = self.get_value(a)?;
        let vb = self.get_value(b)?;
        Ok(va == vb)
    }

    /// Copy `src`'s value into `dst` (types must match).
    pub fn copy_from(&mut self, dst: FieldId, src: FieldId) -> Result<()> {
        let value = self.get_value(src)?;
        self.set_value(dst, value)
    }

    /// Runtime "is-a" query against the field's type.
    pub fn is_of_type(&self, field: FieldId, class: FieldClass) -> Result<bool> {
        Ok(self.field(field)?.field_type.is_derived_from(class))
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// Toggling the ignore flag counts as a change, but keeps the default flag.
    pub fn set_ignored(&mut self, field: FieldId, ignore: bool) -> Result<()> {
        if self.field_mut(field)?.status.change(StatusFlags::IGNORED, ignore) {
            self.value_changed(field, false)?;
        }
        Ok(())
    }

    pub fn is_ignored(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_ignored())
    }

    pub fn set_default(&mut self, field: FieldId, default: bool) -> Result<()> {
        self.field_mut(field)?.status.change(StatusFlags::DEFAULT, default);
        Ok(())
    }

    pub fn is_default(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_default())
    }

    /// Mark for re-evaluation without triggering it.
    pub fn set_dirty(&mut self, field: FieldId, dirty: bool) -> Result<()> {
        self.field_mut(field)?.status.change(StatusFlags::NEEDS_EVALUATION, dirty);
        Ok(())
    }

    pub fn is_dirty(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_dirty())
    }

    pub fn is_read_only(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_read_only())
    }

    pub fn is_destructing(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_destructing())
    }

    pub fn set_field_kind(&mut self, field: FieldId, kind: FieldKind) -> Result<()> {
        self.field_mut(field)?.status.set_kind(kind);
        Ok(())
    }

    pub fn field_kind(&self, field: FieldId) -> Result<FieldKind> {
        Ok(self.field(field)?.kind())
    }

    pub fn should_write(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.should_write())
    }
}

impl Default for FieldGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FieldGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldGraph")
            .field("fields", &self.fields.len())
            .field("containers", &self.containers.len())
            .field("outputs", &self.outputs.len())
            .field("sensors", &self.sensors.len())
            .field("notify_depth", &self.notify_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_field_is_default_and_compact() {
        let mut g = FieldGraph::new();
        let f = g.create_field(FieldType::SFFloat);
        let field = g.field(f).unwrap();
        assert!(field.is_default());
        assert!(!field.has_extended_storage());
        assert!(!field.should_write());
        assert_eq!(g.get_value(f).unwrap(), FieldValue::Float(0.0));
    }

    #[test]
    fn test_set_value_type_checked() {
        let mut g = FieldGraph::new();
        let f = g.create_field(FieldType::SFFloat);
        let err = g.set_value(f, FieldValue::Int32(3)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        g.set_value(f, 2.5f32).unwrap();
        assert!(!g.is_default(f).unwrap());
        assert!(g.should_write(f).unwrap());
    }

    #[test]
    fn test_ignored_keeps_default() {
        let mut g = FieldGraph::new();
        let f = g.create_field(FieldType::SFInt32);
        g.set_ignored(f, true).unwrap();
        assert!(g.is_default(f).unwrap());
        assert!(g.should_write(f).unwrap());
    }

    #[test]
    fn test_create_by_alias() {
        let mut g = FieldGraph::new();
        let f = g.create_field_by_name("SFLong").unwrap();
        assert_eq!(g.field(f).unwrap().field_type(), FieldType::SFInt32);
        assert!(g.create_field_by_name("SFBogus").is_err());
    }

    #[test]
    fn test_is_same_and_copy_from() {
        let mut g = FieldGraph::new();
        let a = g.create_field(FieldType::SFVec3f);
        let b = g.create_field(FieldType::SFVec3f);
        g.set_value(a, [1.0, 2.0, 3.0]).unwrap();
        assert!(!g.is_same(a, b).unwrap());
        g.copy_from(b, a).unwrap();
        assert!(g.is_same(a, b).unwrap());
        assert!(g.is_of_type(a, FieldClass::SField).unwrap());
    }

    #[test]
    fn test_missing_ids() {
        let mut g = FieldGraph::new();
        assert!(matches!(g.get_value(FieldId(99)), Err(Error::NotFound(_))));
    }
}
