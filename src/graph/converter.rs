//! Type converters.
//!
//! A converter is a container of flavor `Converter` with one input field
//! of the master's type and one output of the slave's type. It is created
//! holding one reference, owned by the connection that inserted it.

use crate::io::{format_value, read_value, FieldInput};
use crate::io::codec::{collect_multi, elements};
use crate::model::*;
use crate::{Error, Result};

use super::container::{ContainerFlavor, Engine};
use super::FieldGraph;

const INPUT: &str = "input";
const OUTPUT: &str = "output";

/// Engine behind every converter container.
pub struct ConvertAll {
    conversion: Conversion,
}

impl ConvertAll {
    pub fn new(conversion: Conversion) -> Self {
        Self { conversion }
    }
}

impl Engine for ConvertAll {
    fn evaluate(&mut self, inputs: &[FieldValue]) -> Result<Vec<FieldValue>> {
        let input = inputs
            .first()
            .ok_or_else(|| Error::Engine("converter evaluated without input".into()))?;
        let converted = match &self.conversion {
            Conversion::Builtin { to, .. } => convert_value(input, *to),
            Conversion::Custom { from, to, func } => func(input).ok_or_else(|| {
                Error::Engine(format!("converter {from} -> {to} rejected {}", format_value(input)))
            })?,
        };
        Ok(vec![converted])
    }
}

/// Convert with the builtin rules. Anything that cannot be carried over
/// yields the default of `to`.
pub fn convert_value(value: &FieldValue, to: FieldType) -> FieldValue {
    let from = value.field_type();
    if from == to {
        return value.clone();
    }
    match to {
        FieldType::SFTrigger => return FieldValue::Trigger,
        FieldType::SFString => return FieldValue::String(text_of(value)),
        FieldType::SFName => return FieldValue::Name(text_of(value)),
        FieldType::MFString => {
            return FieldValue::MString(elements(value).iter().map(text_of).collect());
        }
        _ => {}
    }
    if let FieldValue::String(text) = value {
        let mut input = FieldInput::from_str(text);
        return read_value(&mut input, to).unwrap_or_else(|| FieldValue::default_for(to));
    }

    match (value, to) {
        (FieldValue::Vec3f(v), FieldType::SFColor) => return FieldValue::Color(*v),
        (FieldValue::Color(v), FieldType::SFVec3f) => return FieldValue::Vec3f(*v),
        (FieldValue::MVec3f(v), FieldType::MFColor) => return FieldValue::MColor(v.clone()),
        (FieldValue::MColor(v), FieldType::MFVec3f) => return FieldValue::MVec3f(v.clone()),
        _ => {}
    }
    if let Some(converted) = value.as_f64().and_then(|v| FieldValue::from_f64(to, v)) {
        return converted;
    }

    if to.is_multi() {
        let items = elements(value).iter().map(|e| convert_value(e, to.element())).collect();
        return collect_multi(to, items).unwrap_or_else(|| FieldValue::default_for(to));
    }
    match elements(value).first() {
        Some(first) if from.is_multi() => convert_value(first, to),
        _ => FieldValue::default_for(to),
    }
}

/// Strings keep their raw text; everything else uses the ASCII form.
fn text_of(value: &FieldValue) -> String {
    match value.as_str() {
        Some(s) => s.to_owned(),
        None => format_value(value),
    }
}

impl FieldGraph {
    /// New converter for `conversion`, holding one reference.
    pub(crate) fn create_converter(&mut self, conversion: Conversion) -> Result<ContainerId> {
        let type_name = match conversion {
            Conversion::Builtin { .. } => "ConvertAll",
            Conversion::Custom { .. } => "FieldConverter",
        };
        let (from, to) = (conversion.from_type(), conversion.to_type());
        let id = self.insert_container(type_name, ContainerFlavor::Converter);
        self.container_mut(id)?.engine = Some(Box::new(ConvertAll::new(conversion)));
        self.add_field(id, INPUT, from)?;
        self.add_output(id, OUTPUT, to)?;
        self.ref_container(id)?;
        tracing::debug!(converter = %id, %from, %to, "converter created");
        Ok(id)
    }

    pub(crate) fn converter_input(&self, converter: ContainerId) -> Result<FieldId> {
        self.field_by_name(converter, INPUT)
    }

    pub(crate) fn converter_output(&self, converter: ContainerId) -> Result<OutputId> {
        self.output_by_name(converter, OUTPUT)
    }
}
