//! # Field Model
//!
//! Plain data shared by every layer: identifiers, the sealed field type
//! tags, values, status bits and the type registry.
//!
//! Design rule: nothing here touches the graph or a stream. This module is
//! pure data.

pub mod ids;
pub mod field_type;
pub mod value;
pub mod status;
pub mod registry;

pub use ids::{FieldId, ContainerId, OutputId, SensorId, Endpoint};
pub use field_type::{FieldType, FieldClass};
pub use value::FieldValue;
pub use status::{StatusFlags, FieldKind};
pub use registry::{TypeRegistry, Conversion, ConvertFn, builtin_convertible};
