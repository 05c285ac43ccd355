//! Push-side change propagation.
//!
//! A pass starts at one field and walks owner containers and auditors.
//! Each field carries a `NOTIFIED` bit for the duration of its visit, so
//! cyclic connection graphs terminate with every field visited at most
//! once per pass.

use smallvec::SmallVec;

use crate::model::{ContainerId, FieldId, StatusFlags};
use crate::Result;

use super::container::ContainerFlavor;
use super::storage::Auditor;
use super::FieldGraph;

// ============================================================================
// Notification path
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// A field was visited; `container` is its owner.
    Field,
    /// A container forwarded the pass.
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyRecord {
    pub kind: NotifyKind,
    pub field: Option<FieldId>,
    pub container: Option<ContainerId>,
}

/// Steps taken by one pass. Diagnostic only; cycles are broken by the
/// per-field guard bit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyList {
    records: Vec<NotifyRecord>,
}

impl NotifyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: NotifyRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn records(&self) -> &[NotifyRecord] { &self.records }

    pub fn first(&self) -> Option<&NotifyRecord> { self.records.first() }

    /// The most recently visited field.
    pub fn last_field(&self) -> Option<FieldId> {
        self.records.iter().rev().find_map(|r| r.field)
    }
}

// ============================================================================
// Passes
// ============================================================================

impl FieldGraph {
    /// Run a fresh pass from `field`, bracketed by the global begin/end
    /// hooks. Sensors fire when the outermost pass ends.
    pub fn start_notify(&mut self, field: FieldId) -> Result<()> {
        self.begin_notify();
        let mut list = NotifyList::new();
        let result = self.notify(field, &mut list);
        self.end_notify();
        result
    }

    pub fn begin_notify(&mut self) {
        self.notify_depth += 1;
    }

    pub fn end_notify(&mut self) {
        debug_assert!(self.notify_depth > 0, "end_notify without begin_notify");
        self.notify_depth = self.notify_depth.saturating_sub(1);
        if self.notify_depth == 0 {
            self.fire_pending_sensors();
        }
    }

    pub fn is_notifying(&self) -> bool {
        self.notify_depth > 0
    }

    /// Visit `field` as part of an ongoing pass.
    pub fn notify(&mut self, field: FieldId, list: &mut NotifyList) -> Result<()> {
        let f = self.field_mut(field)?;
        if f.status.get(StatusFlags::NOTIFIED) {
            return Ok(());
        }
        if !list.is_empty() {
            f.status.set(StatusFlags::NEEDS_EVALUATION);
        }
        if !f.is_notify_enabled() {
            return Ok(());
        }

        f.status.set(StatusFlags::NOTIFIED);
        let owner = f.owner();
        let auditors: SmallVec<[Auditor; 4]> =
            f.ext().map(|ext| ext.auditors.clone()).unwrap_or_default();
        tracing::trace!(field = %field, depth = list.len(), "notify");

        list.append(NotifyRecord { kind: NotifyKind::Field, field: Some(field), container: owner });
        let result = self.propagate(field, owner, &auditors, list);

        if let Ok(f) = self.field_mut(field) {
            f.status.clear(StatusFlags::NOTIFIED);
        }
        result
    }

    fn propagate(
        &mut self,
        field: FieldId,
        owner: Option<ContainerId>,
        auditors: &[Auditor],
        list: &NotifyList,
    ) -> Result<()> {
        if let Some(owner) = owner {
            self.notify_container(owner, &mut list.clone())?;
        }
        for auditor in auditors {
            match *auditor {
                Auditor::Field(slave) => self.notify_slave(slave, &mut list.clone())?,
                // The output's container hears through the owner channel.
                Auditor::Output(_) => {}
                Auditor::Container(container) => self.notify_container(container, &mut list.clone())?,
                Auditor::Sensor(sensor) => self.schedule_sensor(sensor, Some(field), list.len()),
            }
        }
        Ok(())
    }

    /// Slaves with disabled connections stay untouched.
    fn notify_slave(&mut self, slave: FieldId, list: &mut NotifyList) -> Result<()> {
        if !self.field(slave)?.is_connection_enabled() {
            return Ok(());
        }
        self.notify(slave, list)
    }

    /// Container side of a pass: nodes count and wake their sensors,
    /// engines and converters forward to every enabled output's slaves.
    pub(crate) fn notify_container(&mut self, id: ContainerId, list: &mut NotifyList) -> Result<()> {
        let Ok(c) = self.container_mut(id) else {
            return Ok(());
        };
        if c.notifying || c.destructing {
            return Ok(());
        }
        c.notifying = true;
        c.notify_count += 1;
        c.last_path_len = list.len();
        let sensors = c.sensors.clone();
        let flavor = c.flavor;
        let outputs: Vec<_> = c.outputs.iter().map(|(_, o)| *o).collect();

        let trigger = list.last_field();
        let path_len = list.len();
        list.append(NotifyRecord { kind: NotifyKind::Container, field: None, container: Some(id) });
        if flavor == ContainerFlavor::Node {
            for sensor in sensors {
                self.schedule_sensor(sensor, trigger, path_len);
            }
        }

        let result = self.notify_outputs(&outputs, list);
        if let Ok(c) = self.container_mut(id) {
            c.notifying = false;
        }
        result
    }

    fn notify_outputs(&mut self, outputs: &[crate::model::OutputId], list: &NotifyList) -> Result<()> {
        for output in outputs {
            let o = self.output(*output)?;
            if !o.enabled {
                continue;
            }
            let slaves = o.slaves.clone();
            for slave in slaves {
                self.notify_slave(slave, &mut list.clone())?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Change entry points
    // ========================================================================

    /// Called after every direct value mutation. Guarded by the read-only
    /// bit so a field being changed is not re-entered by engine writes.
    pub(crate) fn value_changed(&mut self, field: FieldId, reset_default: bool) -> Result<()> {
        let f = self.field_mut(field)?;
        if !f.status.change(StatusFlags::READ_ONLY, true) {
            return Ok(());
        }
        f.status.clear(StatusFlags::NEEDS_EVALUATION);
        if reset_default {
            f.status.clear(StatusFlags::DEFAULT);
        }
        let audience = f.owner().is_some() || f.storage.is_extended();
        let result = if audience { self.start_notify(field) } else { Ok(()) };
        if let Ok(f) = self.field_mut(field) {
            f.status.clear(StatusFlags::READ_ONLY);
        }
        result
    }

    /// Force a pass without changing the value. Fields nobody can hear
    /// are skipped.
    pub fn touch(&mut self, field: FieldId) -> Result<()> {
        let f = self.field(field)?;
        if f.owner().is_some() || f.storage.is_extended() {
            self.start_notify(field)?;
        }
        Ok(())
    }

    /// Toggle the field's own notification; returns the previous state.
    pub fn enable_notify(&mut self, field: FieldId, on: bool) -> Result<bool> {
        let f = self.field_mut(field)?;
        let old = f.is_notify_enabled();
        f.status.change(StatusFlags::NOTIFY_ENABLED, on);
        Ok(old)
    }

    pub fn is_notify_enabled(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_notify_enabled())
    }
}
