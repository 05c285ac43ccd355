//! Pull-side lazy evaluation.
//!
//! Reading a dirty, connected field refreshes it from its most recently
//! appended master. Earlier masters are kept for `append` bookkeeping
//! but never consulted. Re-entering evaluation of a field that is
//! already evaluating is a bug, not a cycle.

use crate::model::*;
use crate::{Error, Result};

use super::FieldGraph;

enum Source {
    Field { master: FieldId, converter: Option<ContainerId> },
    Output { master: OutputId, converter: Option<ContainerId> },
}

impl FieldGraph {
    /// Bring `field` up to date with its master, if it is stale.
    pub fn evaluate(&mut self, field: FieldId) -> Result<()> {
        let f = self.field(field)?;
        if f.is_destructing() || !f.is_dirty() || !f.is_connected() {
            return Ok(());
        }
        assert!(!f.is_evaluating(), "re-entrant evaluation of field {field}");

        self.field_mut(field)?.status.set(StatusFlags::EVALUATING);
        let result = self.evaluate_connection(field);
        if let Ok(f) = self.field_mut(field) {
            f.status.clear(StatusFlags::EVALUATING);
            f.status.clear(StatusFlags::NEEDS_EVALUATION);
        }
        result
    }

    fn evaluate_connection(&mut self, field: FieldId) -> Result<()> {
        let source = {
            let ext = self
                .field(field)?
                .ext()
                .ok_or_else(|| Error::NotFound(format!("connection storage of field {field}")))?;
            if let Some(&master) = ext.master_fields.last() {
                Source::Field { master, converter: ext.find_converter(Endpoint::Field(master)) }
            } else if let Some(&master) = ext.master_outputs.last() {
                Source::Output { master, converter: ext.find_converter(Endpoint::Output(master)) }
            } else {
                return Ok(());
            }
        };
        tracing::trace!(%field, "evaluate");

        match source {
            Source::Field { master, converter } => {
                let m = self.field(master)?;
                // In a cycle the evaluating master already holds the value.
                if m.is_destructing() || m.is_evaluating() {
                    return Ok(());
                }
                match converter {
                    Some(converter) => self.evaluate_container(converter),
                    None => {
                        let value = self.get_value(master)?;
                        self.write_quietly(field, value)
                    }
                }
            }
            Source::Output { master, converter } => {
                let container = converter.unwrap_or(self.output(master)?.container);
                self.evaluate_container(container)
            }
        }
    }

    /// Store `value` with the field's own notification switched off; the
    /// master already drove notification.
    fn write_quietly(&mut self, field: FieldId, value: FieldValue) -> Result<()> {
        let old = self.enable_notify(field, false)?;
        self.field_mut(field)?.value = value;
        let result = self.value_changed(field, true);
        self.enable_notify(field, old)?;
        result
    }

    /// Run a container's engine and push each result into the enabled
    /// outputs' slaves. Read-only slaves (mid-change) are skipped.
    pub fn evaluate_container(&mut self, id: ContainerId) -> Result<()> {
        let c = self.container_mut(id)?;
        if c.evaluating || c.destructing {
            return Ok(());
        }
        c.evaluating = true;
        let result = self.run_engine(id);
        if let Ok(c) = self.container_mut(id) {
            c.evaluating = false;
        }
        result
    }

    fn run_engine(&mut self, id: ContainerId) -> Result<()> {
        let (inputs, outputs) = {
            let c = self.container(id)?;
            let inputs: Vec<FieldId> = c.fields.iter().map(|(_, f)| *f).collect();
            let outputs: Vec<OutputId> = c.outputs.iter().map(|(_, o)| *o).collect();
            (inputs, outputs)
        };
        let Some(mut engine) = self.container_mut(id)?.engine.take() else {
            return Ok(());
        };

        let mut values = Vec::with_capacity(inputs.len());
        let mut produced = Ok(Vec::new());
        for input in inputs {
            match self.get_value(input) {
                Ok(v) => values.push(v),
                Err(e) => {
                    produced = Err(e);
                    break;
                }
            }
        }
        if produced.is_ok() {
            produced = engine.evaluate(&values);
        }
        if let Ok(c) = self.container_mut(id) {
            c.engine = Some(engine);
        }

        let produced = produced.inspect_err(|e| {
            tracing::warn!(container = %id, error = %e, "engine evaluation failed");
        })?;
        if produced.len() != outputs.len() {
            tracing::warn!(
                container = %id,
                expected = outputs.len(),
                got = produced.len(),
                "engine output count mismatch"
            );
        }

        for (output, value) in outputs.into_iter().zip(produced) {
            let o = self.output_mut(output)?;
            o.last_value = Some(value.clone());
            if !o.enabled {
                continue;
            }
            for slave in o.slaves.clone() {
                self.write_output_value(slave, &value)?;
            }
        }
        Ok(())
    }

    fn write_output_value(&mut self, slave: FieldId, value: &FieldValue) -> Result<()> {
        let f = self.field(slave)?;
        if f.is_read_only() {
            return Ok(());
        }
        if f.field_type != value.field_type() {
            tracing::warn!(
                %slave,
                expected = %f.field_type,
                got = %value.field_type(),
                "engine produced a value of the wrong type"
            );
            return Ok(());
        }
        self.write_quietly(slave, value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_master_wins() {
        let mut g = FieldGraph::new();
        let m1 = g.create_field(FieldType::SFFloat);
        let m2 = g.create_field(FieldType::SFFloat);
        let s = g.create_field(FieldType::SFFloat);
        g.set_value(m1, 1.0f32).unwrap();
        g.set_value(m2, 2.0f32).unwrap();
        g.append_connection(s, m1, false).unwrap();
        g.append_connection(s, m2, false).unwrap();
        assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(2.0));
        assert!(!g.is_dirty(s).unwrap());
    }

    #[test]
    fn test_converted_value() {
        let mut g = FieldGraph::new();
        let m = g.create_field(FieldType::SFInt32);
        let s = g.create_field(FieldType::SFFloat);
        g.set_value(m, 7).unwrap();
        g.connect_from(s, m, false, false).unwrap();
        assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(7.0));
        g.set_value(m, -2).unwrap();
        assert!(g.is_dirty(s).unwrap());
        assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(-2.0));
    }

    #[test]
    fn test_engine_output_pull() {
        let mut g = FieldGraph::new();
        let e = g.create_engine("Sum", |inputs: &[FieldValue]| -> Result<Vec<FieldValue>> {
            let total: f32 = inputs.iter().filter_map(FieldValue::as_float).sum();
            Ok(vec![FieldValue::Float(total)])
        });
        let a = g.add_field(e, "a", FieldType::SFFloat).unwrap();
        let b = g.add_field(e, "b", FieldType::SFFloat).unwrap();
        let out = g.add_output(e, "sum", FieldType::SFFloat).unwrap();
        let s = g.create_field(FieldType::SFFloat);
        g.connect_from_output(s, out, false, false).unwrap();
        g.set_value(a, 1.5f32).unwrap();
        g.set_value(b, 2.0f32).unwrap();
        assert!(g.is_dirty(s).unwrap());
        assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(3.5));
        assert_eq!(g.output(out).unwrap().last_value(), Some(&FieldValue::Float(3.5)));
    }

    #[test]
    fn test_disabled_output_writes_nothing() {
        let mut g = FieldGraph::new();
        let e = g.create_engine("Const", |_: &[FieldValue]| -> Result<Vec<FieldValue>> {
            Ok(vec![FieldValue::Int32(9)])
        });
        let out = g.add_output(e, "value", FieldType::SFInt32).unwrap();
        let s = g.create_field(FieldType::SFInt32);
        g.connect_from_output(s, out, false, false).unwrap();
        g.enable_output(out, false).unwrap();
        assert_eq!(g.get_value(s).unwrap(), FieldValue::Int32(0));
    }

    #[test]
    fn test_engine_error_propagates() {
        let mut g = FieldGraph::new();
        let e = g.create_engine("Broken", |_: &[FieldValue]| -> Result<Vec<FieldValue>> {
            Err(Error::Engine("boom".into()))
        });
        let out = g.add_output(e, "value", FieldType::SFInt32).unwrap();
        let s = g.create_field(FieldType::SFInt32);
        g.connect_from_output(s, out, false, false).unwrap();
        assert!(matches!(g.get_value(s), Err(Error::Engine(_))));
        assert!(!g.container(e).unwrap().evaluating);
    }
}
