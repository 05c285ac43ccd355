//! Compact vs. extended per-field storage.
//!
//! Most fields never take part in a connection, so the default state is
//! just the owner back-reference. The first connection or auditor moves
//! the owner into a boxed [`ConnectStorage`] that also carries adjacency
//! lists and the converter map. A field never goes back to compact mode.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::model::{ContainerId, Endpoint, FieldId, OutputId, SensorId};

/// Something registered to hear about a field's changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Auditor {
    /// A slave field connected directly (types match).
    Field(FieldId),
    /// The output this field is a slave of; informed on teardown.
    Output(OutputId),
    /// Never legal in a field's list; containers hear through the owner.
    Container(ContainerId),
    Sensor(SensorId),
}

/// Connection bookkeeping, allocated on first use.
#[derive(Debug, Default)]
pub struct ConnectStorage {
    pub owner: Option<ContainerId>,
    pub master_fields: SmallVec<[FieldId; 2]>,
    pub master_outputs: SmallVec<[OutputId; 2]>,
    /// Reverse edges; not kept when the slave is a converter's input.
    pub slaves: SmallVec<[FieldId; 4]>,
    pub auditors: SmallVec<[Auditor; 4]>,
    converters: HashMap<Endpoint, ContainerId>,
}

impl ConnectStorage {
    fn new(owner: Option<ContainerId>) -> Self {
        Self { owner, ..Self::default() }
    }

    pub fn add_converter(&mut self, master: Endpoint, converter: ContainerId) {
        let previous = self.converters.insert(master, converter);
        assert!(previous.is_none(), "converter already recorded for {master:?}");
    }

    pub fn remove_converter(&mut self, master: Endpoint) {
        let removed = self.converters.remove(&master);
        assert!(removed.is_some(), "no converter recorded for {master:?}");
    }

    pub fn find_converter(&self, master: Endpoint) -> Option<ContainerId> {
        self.converters.get(&master).copied()
    }

    pub fn converter_count(&self) -> usize {
        self.converters.len()
    }

    /// True when every list and the converter map are empty.
    pub fn is_drained(&self) -> bool {
        self.master_fields.is_empty()
            && self.master_outputs.is_empty()
            && self.slaves.is_empty()
            && self.auditors.is_empty()
            && self.converters.is_empty()
    }
}

/// The field's owner slot, multiplexed with its connection storage.
#[derive(Debug)]
pub enum FieldStorage {
    Compact { owner: Option<ContainerId> },
    Extended(Box<ConnectStorage>),
}

impl FieldStorage {
    pub fn owner(&self) -> Option<ContainerId> {
        match self {
            FieldStorage::Compact { owner } => *owner,
            FieldStorage::Extended(ext) => ext.owner,
        }
    }

    pub fn set_owner(&mut self, id: Option<ContainerId>) {
        match self {
            FieldStorage::Compact { owner } => *owner = id,
            FieldStorage::Extended(ext) => ext.owner = id,
        }
    }

    /// Switch to extended mode; returns true if this call allocated.
    pub fn extend(&mut self) -> bool {
        match self {
            FieldStorage::Extended(_) => false,
            FieldStorage::Compact { owner } => {
                let owner = *owner;
                *self = FieldStorage::Extended(Box::new(ConnectStorage::new(owner)));
                true
            }
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, FieldStorage::Extended(_))
    }

    pub fn extended(&self) -> Option<&ConnectStorage> {
        match self {
            FieldStorage::Extended(ext) => Some(ext),
            FieldStorage::Compact { .. } => None,
        }
    }

    pub fn extended_mut(&mut self) -> Option<&mut ConnectStorage> {
        match self {
            FieldStorage::Extended(ext) => Some(ext),
            FieldStorage::Compact { .. } => None,
        }
    }
}

/// Remove the first occurrence of `item`; returns whether one was found.
pub fn remove_first<A>(list: &mut SmallVec<A>, item: &A::Item) -> bool
where
    A: smallvec::Array,
    A::Item: PartialEq,
{
    match list.iter().position(|x| x == item) {
        Some(idx) => {
            list.remove(idx);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_moves_owner() {
        let mut s = FieldStorage::Compact { owner: Some(ContainerId(3)) };
        assert!(s.extend());
        assert!(!s.extend());
        assert_eq!(s.owner(), Some(ContainerId(3)));
        assert!(s.extended().is_some_and(ConnectStorage::is_drained));
    }

    #[test]
    fn test_converter_map() {
        let mut ext = ConnectStorage::default();
        let m = Endpoint::Field(FieldId(1));
        ext.add_converter(m, ContainerId(9));
        assert_eq!(ext.find_converter(m), Some(ContainerId(9)));
        assert!(!ext.is_drained());
        ext.remove_converter(m);
        assert_eq!(ext.find_converter(m), None);
    }

    #[test]
    #[should_panic(expected = "no converter recorded")]
    fn test_removing_missing_converter_is_fatal() {
        let mut ext = ConnectStorage::default();
        ext.remove_converter(Endpoint::Output(OutputId(4)));
    }

    #[test]
    fn test_remove_first_only_removes_one() {
        let mut v: SmallVec<[FieldId; 2]> = SmallVec::new();
        v.push(FieldId(1));
        v.push(FieldId(2));
        v.push(FieldId(1));
        assert!(remove_first(&mut v, &FieldId(1)));
        assert_eq!(v.as_slice(), &[FieldId(2), FieldId(1)]);
        assert!(!remove_first(&mut v, &FieldId(5)));
    }
}
