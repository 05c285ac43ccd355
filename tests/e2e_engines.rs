//! Engines, multiple masters, registered converters and the retired
//! interpolator calls.

use std::cell::Cell;
use std::rc::Rc;

use fieldgraph::{Error, FieldGraph, FieldType, FieldValue, Result};
use pretty_assertions::assert_eq;

#[test]
fn test_appended_masters_last_wins() {
    let mut g = FieldGraph::new();
    let m1 = g.create_field(FieldType::SFFloat);
    let m2 = g.create_field(FieldType::SFFloat);
    let s = g.create_field(FieldType::SFFloat);
    g.set_value(m1, 1.0f32).unwrap();
    g.set_value(m2, 2.0f32).unwrap();

    g.connect_from(s, m1, false, false).unwrap();
    g.append_connection(s, m2, false).unwrap();
    assert_eq!(g.num_connections(s).unwrap(), 2);
    assert_eq!(g.connections(s).unwrap(), vec![m1, m2]);
    assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(2.0));

    // A change on either master marks the slave dirty; the read still
    // comes from the last one.
    g.set_value(m1, 5.0f32).unwrap();
    assert!(g.is_dirty(s).unwrap());
    assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(2.0));

    g.disconnect_from(s, m2).unwrap();
    g.set_value(m1, 6.0f32).unwrap();
    assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(6.0));
}

#[test]
fn test_engine_runs_lazily_once_per_change() {
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let mut g = FieldGraph::new();
    let engine = g.create_engine("Sum", move |inputs: &[FieldValue]| -> Result<Vec<FieldValue>> {
        counter.set(counter.get() + 1);
        let total: f32 = inputs.iter().filter_map(FieldValue::as_float).sum();
        Ok(vec![FieldValue::Float(total)])
    });
    let a = g.add_field(engine, "a", FieldType::SFFloat).unwrap();
    let b = g.add_field(engine, "b", FieldType::SFFloat).unwrap();
    let out = g.add_output(engine, "sum", FieldType::SFFloat).unwrap();
    let s1 = g.create_field(FieldType::SFFloat);
    let s2 = g.create_field(FieldType::SFFloat);
    g.connect_from_output(s1, out, false, false).unwrap();
    g.connect_from_output(s2, out, false, false).unwrap();

    g.set_value(a, 1.0f32).unwrap();
    g.set_value(b, 2.5f32).unwrap();
    assert_eq!(runs.get(), 0);

    // One run feeds every slave of the output.
    assert_eq!(g.get_value(s1).unwrap(), FieldValue::Float(3.5));
    assert_eq!(g.get_value(s2).unwrap(), FieldValue::Float(3.5));
    assert_eq!(runs.get(), 1);
    assert_eq!(g.output(out).unwrap().last_value(), Some(&FieldValue::Float(3.5)));
}

#[test]
fn test_engine_chain_through_field() {
    let mut g = FieldGraph::new();
    let double = |inputs: &[FieldValue]| -> Result<Vec<FieldValue>> {
        let x = inputs.first().and_then(FieldValue::as_float).unwrap_or(0.0);
        Ok(vec![FieldValue::Float(x * 2.0)])
    };
    let e1 = g.create_engine("Double", double);
    let in1 = g.add_field(e1, "input", FieldType::SFFloat).unwrap();
    let out1 = g.add_output(e1, "output", FieldType::SFFloat).unwrap();
    let e2 = g.create_engine("Double", double);
    let in2 = g.add_field(e2, "input", FieldType::SFFloat).unwrap();
    let out2 = g.add_output(e2, "output", FieldType::SFFloat).unwrap();
    let s = g.create_field(FieldType::SFFloat);

    g.connect_from_output(in2, out1, false, false).unwrap();
    g.connect_from_output(s, out2, false, false).unwrap();
    g.set_value(in1, 1.5f32).unwrap();
    assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(6.0));

    g.set_value(in1, 0.25f32).unwrap();
    assert!(g.is_dirty(s).unwrap());
    assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(1.0));
    assert_eq!(g.get_value(in2).unwrap(), FieldValue::Float(0.5));
}

#[test]
fn test_failing_engine_surfaces_error() {
    let mut g = FieldGraph::new();
    let engine = g.create_engine("Broken", |_: &[FieldValue]| -> Result<Vec<FieldValue>> {
        Err(Error::Engine("sensor offline".into()))
    });
    let out = g.add_output(engine, "value", FieldType::SFInt32).unwrap();
    let s = g.create_field(FieldType::SFInt32);
    g.connect_from_output(s, out, false, false).unwrap();
    assert!(matches!(g.get_value(s), Err(Error::Engine(_))));
}

#[test]
fn test_registered_converter_overrides_builtin() {
    let mut g = FieldGraph::new();
    g.registry_mut().register_converter(FieldType::SFVec3f, FieldType::SFFloat, |v| match v {
        FieldValue::Vec3f([x, y, z]) => Some(FieldValue::Float((x * x + y * y + z * z).sqrt())),
        _ => None,
    });
    let m = g.create_field(FieldType::SFVec3f);
    let s = g.create_field(FieldType::SFFloat);
    g.set_value(m, [3.0f32, 4.0, 0.0]).unwrap();

    g.connect_from(s, m, false, false).unwrap();
    assert_eq!(g.converter_count(s).unwrap(), 1);
    assert_eq!(g.get_value(s).unwrap(), FieldValue::Float(5.0));
    assert_eq!(g.container_count(), 1);

    g.disconnect(s).unwrap();
    assert_eq!(g.container_count(), 0);
}

#[test]
fn test_type_alias_and_class_queries() {
    let mut g = FieldGraph::new();
    let f = g.create_field_by_name("SFLong").unwrap();
    assert_eq!(g.field(f).unwrap().field_type(), FieldType::SFInt32);
    assert!(g.is_of_type(f, fieldgraph::FieldClass::SField).unwrap());
    assert!(!g.is_of_type(f, fieldgraph::FieldClass::MField).unwrap());
    assert!(matches!(g.create_field_by_name("SFNope"), Err(Error::NotFound(_))));
    assert!(matches!(g.set_value(f, 1.0f32), Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_interpolator_calls_are_obsolete() {
    let mut g = FieldGraph::new();
    let f = g.create_field(FieldType::SFFloat);
    assert!(matches!(g.connect_from_interpolator(f, "fade"), Err(Error::Obsolete(_))));
    assert!(matches!(g.append_interpolator_connection(f, "fade"), Err(Error::Obsolete(_))));
    assert!(matches!(g.disconnect_interpolator(f, "fade"), Err(Error::Obsolete(_))));
    assert!(matches!(g.is_connected_from_interpolator(f), Err(Error::Obsolete(_))));
    assert!(!g.is_connected(f).unwrap());
}
