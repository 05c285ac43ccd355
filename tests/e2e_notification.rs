//! Push notification through cycles and rings, plus sensor batching.

use std::cell::RefCell;
use std::rc::Rc;

use fieldgraph::{FieldGraph, FieldId, FieldType, FieldValue, SensorEvent, SensorTarget, StatusFlags};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// `n` SFInt32 fields, each the only field of its own node.
fn seed_owned_fields(g: &mut FieldGraph, n: usize) -> Vec<FieldId> {
    (0..n)
        .map(|i| {
            let node = g.create_node("Holder");
            g.add_field(node, &format!("f{i}"), FieldType::SFInt32).unwrap()
        })
        .collect()
}

fn notify_counts(g: &FieldGraph, fields: &[FieldId]) -> Vec<u64> {
    fields
        .iter()
        .map(|f| {
            let owner = g.owner(*f).unwrap().unwrap();
            g.container(owner).unwrap().notify_count()
        })
        .collect()
}

#[test]
fn test_mutual_connection_terminates() {
    let mut g = FieldGraph::new();
    let f = seed_owned_fields(&mut g, 2);
    g.connect_from(f[0], f[1], false, false).unwrap();
    g.connect_from(f[1], f[0], false, false).unwrap();

    g.set_value(f[0], 9).unwrap();
    assert_eq!(g.get_value(f[1]).unwrap(), FieldValue::Int32(9));
    assert_eq!(g.get_value(f[0]).unwrap(), FieldValue::Int32(9));
    for id in &f {
        assert!(!g.field(*id).unwrap().status().get(StatusFlags::NOTIFIED));
    }
}

#[test]
fn test_disabled_notify_still_marks_dirty() {
    let mut g = FieldGraph::new();
    let f = seed_owned_fields(&mut g, 2);
    g.connect_from(f[1], f[0], false, false).unwrap();
    g.get_value(f[1]).unwrap();

    assert!(g.enable_notify(f[1], false).unwrap());
    let before = notify_counts(&g, &f);
    g.set_value(f[0], 4).unwrap();
    let after = notify_counts(&g, &f);

    assert!(g.is_dirty(f[1]).unwrap());
    assert_eq!(after[0], before[0] + 1);
    assert_eq!(after[1], before[1]);
    assert_eq!(g.get_value(f[1]).unwrap(), FieldValue::Int32(4));
}

#[test]
fn test_sensor_fires_once_per_batch() {
    let mut g = FieldGraph::new();
    let node = g.create_node("Transform");
    let a = g.add_field(node, "a", FieldType::SFFloat).unwrap();
    let b = g.add_field(node, "b", FieldType::SFFloat).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let sensor = g
        .attach_sensor_with(SensorTarget::Container(node), move |e| sink.borrow_mut().push(e.clone()))
        .unwrap();

    g.begin_notify();
    g.set_value(a, 1.0f32).unwrap();
    g.set_value(b, 2.0f32).unwrap();
    assert!(events.borrow().is_empty());
    g.end_notify();

    assert_eq!(g.sensor(sensor).unwrap().fire_count(), 1);
    assert_eq!(events.borrow().len(), 1);
    assert!(matches!(events.borrow()[0], SensorEvent::Changed { path_len: 1, .. }));
}

#[test]
fn test_field_sensor_sees_dying() {
    let mut g = FieldGraph::new();
    let f = g.create_field(FieldType::SFTime);
    let sensor = g.attach_sensor(SensorTarget::Field(f)).unwrap();
    g.set_value(f, FieldValue::Time(1.0)).unwrap();
    assert_eq!(g.sensor(sensor).unwrap().fire_count(), 1);

    g.destroy_field(f).unwrap();
    let s = g.sensor(sensor).unwrap();
    assert!(!s.is_attached());
    assert_eq!(s.last_event(), Some(&SensorEvent::Dying));
}

proptest! {
    /// One pass around a ring reaches every node exactly once.
    #[test]
    fn prop_ring_visits_each_node_once(n in 2usize..8, start in 0usize..8) {
        let mut g = FieldGraph::new();
        let f = seed_owned_fields(&mut g, n);
        for i in 0..n {
            g.connect_from(f[i], f[(i + 1) % n], false, false).unwrap();
        }
        let before = notify_counts(&g, &f);
        g.touch(f[start % n]).unwrap();
        let after = notify_counts(&g, &f);
        for i in 0..n {
            prop_assert_eq!(after[i], before[i] + 1);
        }
    }

    /// Arbitrary (possibly cyclic) wiring: passes terminate, guards are
    /// cleared afterwards and every field still reads a value.
    #[test]
    fn prop_random_wiring_terminates(
        n in 2usize..7,
        edges in prop::collection::vec((0usize..7, 0usize..7), 1..16),
        writes in prop::collection::vec((0usize..7, any::<i32>()), 1..6),
    ) {
        let mut g = FieldGraph::new();
        let f = seed_owned_fields(&mut g, n);
        for (s, m) in edges {
            let (s, m) = (s % n, m % n);
            if s != m {
                g.append_connection(f[s], f[m], false).unwrap();
            }
        }
        for (i, v) in writes {
            g.set_value(f[i % n], v).unwrap();
        }
        for id in &f {
            g.get_value(*id).unwrap();
            let status = g.field(*id).unwrap().status();
            prop_assert!(!status.get(StatusFlags::NOTIFIED));
            prop_assert!(!status.get(StatusFlags::EVALUATING));
        }
        prop_assert!(!g.is_notifying());
    }
}
