//! The field entity as stored in the graph arena.

use crate::model::{ContainerId, FieldKind, FieldType, FieldValue, StatusFlags};

use super::storage::{ConnectStorage, FieldStorage};

/// One typed, observable property slot.
///
/// Values and flags are read through these accessors; anything that
/// changes connections or triggers notification goes through
/// [`FieldGraph`](super::FieldGraph).
#[derive(Debug)]
pub struct Field {
    pub(crate) field_type: FieldType,
    pub(crate) value: FieldValue,
    pub(crate) status: StatusFlags,
    pub(crate) storage: FieldStorage,
}

impl Field {
    pub(crate) fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            value: FieldValue::default_for(field_type),
            status: StatusFlags::new(),
            storage: FieldStorage::Compact { owner: None },
        }
    }

    pub fn field_type(&self) -> FieldType { self.field_type }

    /// The stored value, without evaluating pending connections.
    pub fn raw_value(&self) -> &FieldValue { &self.value }

    pub fn status(&self) -> StatusFlags { self.status }

    pub fn owner(&self) -> Option<ContainerId> { self.storage.owner() }

    pub fn kind(&self) -> FieldKind { self.status.kind() }

    pub fn is_default(&self) -> bool { self.status.get(StatusFlags::DEFAULT) }

    pub fn is_ignored(&self) -> bool { self.status.get(StatusFlags::IGNORED) }

    pub fn is_dirty(&self) -> bool { self.status.get(StatusFlags::NEEDS_EVALUATION) }

    pub fn is_read_only(&self) -> bool { self.status.get(StatusFlags::READ_ONLY) }

    pub fn is_destructing(&self) -> bool { self.status.get(StatusFlags::DESTRUCTING) }

    pub fn is_evaluating(&self) -> bool { self.status.get(StatusFlags::EVALUATING) }

    pub fn is_notify_enabled(&self) -> bool { self.status.get(StatusFlags::NOTIFY_ENABLED) }

    pub fn is_connection_enabled(&self) -> bool { self.status.get(StatusFlags::CONNECTIONS_ENABLED) }

    pub fn has_extended_storage(&self) -> bool {
        let flagged = self.status.get(StatusFlags::EXTENDED_STORAGE);
        debug_assert_eq!(flagged, self.storage.is_extended(), "storage flag out of sync");
        flagged
    }

    pub fn is_connected_from_field(&self) -> bool {
        self.ext().is_some_and(|ext| !ext.master_fields.is_empty())
    }

    pub fn is_connected_from_output(&self) -> bool {
        self.ext().is_some_and(|ext| !ext.master_outputs.is_empty())
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected_from_field() || self.is_connected_from_output()
    }

    /// Worth writing: changed from default, ignored, or connected.
    pub fn should_write(&self) -> bool {
        !self.is_default() || self.is_ignored() || self.is_connected()
    }

    pub(crate) fn ext(&self) -> Option<&ConnectStorage> {
        self.storage.extended()
    }

    pub(crate) fn ext_mut(&mut self) -> Option<&mut ConnectStorage> {
        self.storage.extended_mut()
    }

    pub(crate) fn extend_storage(&mut self) {
        if self.storage.extend() {
            self.status.set(StatusFlags::EXTENDED_STORAGE);
        }
    }
}
