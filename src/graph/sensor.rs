//! Data sensors.
//!
//! A sensor watches a field or a node. Notifications received during a
//! pass are collapsed into one firing at the end of the outermost pass.
//! A sensor whose field is torn down gets a single `Dying` event and is
//! detached.

use std::fmt;

use crate::model::{ContainerId, FieldId, SensorId};
use crate::{Error, Result};

use super::storage::Auditor;
use super::FieldGraph;

/// What a sensor is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorTarget {
    Field(FieldId),
    Container(ContainerId),
}

/// Delivered to a sensor's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    /// The observed entity changed. `trigger` is the field closest to
    /// the sensor on the notification path.
    Changed { trigger: Option<FieldId>, path_len: usize },
    /// The observed entity is being destroyed.
    Dying,
}

pub type SensorCallback = Box<dyn FnMut(&SensorEvent)>;

pub struct DataSensor {
    target: Option<SensorTarget>,
    pending: Option<SensorEvent>,
    last_event: Option<SensorEvent>,
    fire_count: u64,
    callback: Option<SensorCallback>,
}

impl DataSensor {
    pub fn target(&self) -> Option<SensorTarget> { self.target }

    pub fn is_attached(&self) -> bool { self.target.is_some() }

    /// Number of times the sensor fired at the end of a notify pass.
    pub fn fire_count(&self) -> u64 { self.fire_count }

    pub fn last_event(&self) -> Option<&SensorEvent> { self.last_event.as_ref() }

    pub fn is_scheduled(&self) -> bool { self.pending.is_some() }
}

impl fmt::Debug for DataSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSensor")
            .field("target", &self.target)
            .field("pending", &self.pending)
            .field("fire_count", &self.fire_count)
            .finish()
    }
}

impl FieldGraph {
    /// Attach a sensor without a callback; inspect it via `fire_count`.
    pub fn attach_sensor(&mut self, target: SensorTarget) -> Result<SensorId> {
        self.attach_sensor_inner(target, None)
    }

    pub fn attach_sensor_with(
        &mut self,
        target: SensorTarget,
        callback: impl FnMut(&SensorEvent) + 'static,
    ) -> Result<SensorId> {
        self.attach_sensor_inner(target, Some(Box::new(callback)))
    }

    fn attach_sensor_inner(
        &mut self,
        target: SensorTarget,
        callback: Option<SensorCallback>,
    ) -> Result<SensorId> {
        let id = SensorId(self.alloc_id());
        match target {
            SensorTarget::Field(field) => self.add_auditor(field, Auditor::Sensor(id))?,
            SensorTarget::Container(container) => self.container_mut(container)?.sensors.push(id),
        }
        self.sensors.insert(
            id,
            DataSensor {
                target: Some(target),
                pending: None,
                last_event: None,
                fire_count: 0,
                callback,
            },
        );
        tracing::debug!(sensor = %id, ?target, "sensor attached");
        Ok(id)
    }

    /// Detach from the observed entity. The sensor itself stays around.
    pub fn detach_sensor(&mut self, id: SensorId) -> Result<()> {
        let Some(target) = self.sensor_mut(id)?.target.take() else {
            return Ok(());
        };
        match target {
            SensorTarget::Field(field) => {
                if self.contains_field(field) {
                    self.remove_auditor(field, Auditor::Sensor(id))?;
                }
            }
            SensorTarget::Container(container) => {
                if let Ok(c) = self.container_mut(container) {
                    c.sensors.retain(|s| *s != id);
                }
            }
        }
        Ok(())
    }

    /// Detach and drop a sensor.
    pub fn remove_sensor(&mut self, id: SensorId) -> Result<()> {
        self.detach_sensor(id)?;
        self.sensors.remove(&id);
        self.pending_sensors.retain(|s| *s != id);
        Ok(())
    }

    /// The observed entity is going away. The sensor is detached and its
    /// callback sees `Dying` right away.
    pub(crate) fn dying_reference(&mut self, id: SensorId) -> Result<()> {
        let sensor = self.sensor_mut(id)?;
        sensor.target = None;
        sensor.pending = None;
        sensor.last_event = Some(SensorEvent::Dying);
        if let Some(cb) = sensor.callback.as_mut() {
            cb(&SensorEvent::Dying);
        }
        tracing::debug!(sensor = %id, "sensor lost its target");
        Ok(())
    }

    /// Record a notification; firing waits for the end of the pass.
    pub(crate) fn schedule_sensor(&mut self, id: SensorId, trigger: Option<FieldId>, path_len: usize) {
        let Some(sensor) = self.sensors.get_mut(&id) else {
            tracing::error!(sensor = %id, "notification for unknown sensor");
            return;
        };
        if sensor.pending.is_none() {
            self.pending_sensors.push(id);
        }
        sensor.pending = Some(SensorEvent::Changed { trigger, path_len });
    }

    pub(crate) fn fire_pending_sensors(&mut self) {
        for id in std::mem::take(&mut self.pending_sensors) {
            let Some(sensor) = self.sensors.get_mut(&id) else { continue };
            let Some(event) = sensor.pending.take() else { continue };
            sensor.fire_count += 1;
            if let Some(cb) = sensor.callback.as_mut() {
                cb(&event);
            }
            tracing::trace!(sensor = %id, ?event, "sensor fired");
            sensor.last_event = Some(event);
        }
    }

    pub fn sensor_target(&self, id: SensorId) -> Result<SensorTarget> {
        self.sensor(id)?
            .target
            .ok_or_else(|| Error::NotFound(format!("target of sensor {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, FieldValue};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_field_sensor_fires_once_per_pass() {
        let mut g = FieldGraph::new();
        let node = g.create_node("Material");
        let f = g.add_field(node, "shininess", FieldType::SFFloat).unwrap();
        let s = g.attach_sensor(SensorTarget::Field(f)).unwrap();
        g.set_value(f, 0.5f32).unwrap();
        g.set_value(f, 0.7f32).unwrap();
        assert_eq!(g.sensor(s).unwrap().fire_count(), 2);
        assert!(!g.sensor(s).unwrap().is_scheduled());
    }

    #[test]
    fn test_node_sensor_sees_trigger() {
        let mut g = FieldGraph::new();
        let node = g.create_node("Material");
        let f = g.add_field(node, "shininess", FieldType::SFFloat).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        g.attach_sensor_with(SensorTarget::Container(node), move |e| sink.borrow_mut().push(e.clone()))
            .unwrap();
        g.set_value(f, FieldValue::Float(1.0)).unwrap();
        assert_eq!(
            seen.borrow().as_slice(),
            &[SensorEvent::Changed { trigger: Some(f), path_len: 1 }]
        );
    }

    #[test]
    fn test_dying_reference_on_destroy() {
        let mut g = FieldGraph::new();
        let f = g.create_field(FieldType::SFInt32);
        let s = g.attach_sensor(SensorTarget::Field(f)).unwrap();
        g.destroy_field(f).unwrap();
        let sensor = g.sensor(s).unwrap();
        assert!(!sensor.is_attached());
        assert_eq!(sensor.last_event(), Some(&SensorEvent::Dying));
    }

    #[test]
    fn test_detach_stops_firing() {
        let mut g = FieldGraph::new();
        let f = g.create_field(FieldType::SFInt32);
        let s = g.attach_sensor(SensorTarget::Field(f)).unwrap();
        g.detach_sensor(s).unwrap();
        g.set_value(f, 4).unwrap();
        assert_eq!(g.sensor(s).unwrap().fire_count(), 0);
        assert!(g.sensor_target(s).is_err());
    }
}
