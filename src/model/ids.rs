//! Opaque identifiers for everything that lives in a `FieldGraph`.

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(
    /// A field slot.
    FieldId
);
opaque_id!(
    /// A field container: node, engine or converter.
    ContainerId
);
opaque_id!(
    /// A computed output owned by an engine or converter container.
    OutputId
);
opaque_id!(
    /// A data sensor.
    SensorId
);

/// The master end of a connection. Used as the key of the converter map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Field(FieldId),
    Output(OutputId),
}

impl From<FieldId> for Endpoint {
    fn from(id: FieldId) -> Self { Endpoint::Field(id) }
}

impl From<OutputId> for Endpoint {
    fn from(id: OutputId) -> Self { Endpoint::Output(id) }
}
