//! Containers, computed outputs and engines.
//!
//! A container owns named fields and, for engines and converters, named
//! outputs. Containers are reference counted: a count dropping to zero
//! destroys the container. Output connections hold a reference on the
//! output's container.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::model::*;
use crate::{Error, Result};

use super::storage::{remove_first, Auditor};
use super::FieldGraph;

// ============================================================================
// Types
// ============================================================================

/// What kind of container this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFlavor {
    /// Scene-graph node. May still carry outputs ("node engine").
    Node,
    /// Computation engine with inputs (fields) and outputs.
    Engine,
    /// Auto-inserted type converter.
    Converter,
}

/// A computation run when one of its outputs is pulled.
///
/// `inputs` are the container's field values in declaration order; the
/// result must hold one value per output, in output order.
pub trait Engine {
    fn evaluate(&mut self, inputs: &[FieldValue]) -> Result<Vec<FieldValue>>;
}

impl<F> Engine for F
where
    F: FnMut(&[FieldValue]) -> Result<Vec<FieldValue>>,
{
    fn evaluate(&mut self, inputs: &[FieldValue]) -> Result<Vec<FieldValue>> {
        self(inputs)
    }
}

/// Factory for engines of a registered container type.
pub type EngineFactory = Rc<dyn Fn() -> Box<dyn Engine>>;

/// A field container.
pub struct Container {
    pub(crate) type_name: String,
    pub(crate) flavor: ContainerFlavor,
    pub(crate) name: Option<String>,
    pub(crate) fields: Vec<(String, FieldId)>,
    pub(crate) outputs: Vec<(String, OutputId)>,
    pub(crate) ref_count: u32,
    pub(crate) notify_count: u64,
    pub(crate) last_path_len: usize,
    pub(crate) notifying: bool,
    pub(crate) evaluating: bool,
    pub(crate) destructing: bool,
    pub(crate) sensors: SmallVec<[SensorId; 2]>,
    pub(crate) engine: Option<Box<dyn Engine>>,
}

impl Container {
    fn new(type_name: &str, flavor: ContainerFlavor) -> Self {
        Self {
            type_name: type_name.to_owned(),
            flavor,
            name: None,
            fields: Vec::new(),
            outputs: Vec::new(),
            ref_count: 0,
            notify_count: 0,
            last_path_len: 0,
            notifying: false,
            evaluating: false,
            destructing: false,
            sensors: SmallVec::new(),
            engine: None,
        }
    }

    pub fn type_name(&self) -> &str { &self.type_name }

    pub fn flavor(&self) -> ContainerFlavor { self.flavor }

    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    pub fn ref_count(&self) -> u32 { self.ref_count }

    /// Notifications received so far.
    pub fn notify_count(&self) -> u64 { self.notify_count }

    /// Length of the path the last notification arrived with.
    pub fn last_path_len(&self) -> usize { self.last_path_len }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldId)> {
        self.fields.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, OutputId)> {
        self.outputs.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn field_named(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn output_named(&self, name: &str) -> Option<OutputId> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn field_name(&self, field: FieldId) -> Option<&str> {
        self.fields.iter().find(|(_, id)| *id == field).map(|(n, _)| n.as_str())
    }

    pub fn output_name(&self, output: OutputId) -> Option<&str> {
        self.outputs.iter().find(|(_, id)| *id == output).map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("type_name", &self.type_name)
            .field("flavor", &self.flavor)
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("outputs", &self.outputs)
            .field("ref_count", &self.ref_count)
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}

/// A computed output, usable as a connection master.
#[derive(Debug)]
pub struct Output {
    pub(crate) container: ContainerId,
    pub(crate) value_type: FieldType,
    pub(crate) slaves: SmallVec<[FieldId; 4]>,
    pub(crate) enabled: bool,
    pub(crate) last_value: Option<FieldValue>,
}

impl Output {
    pub fn container(&self) -> ContainerId { self.container }

    pub fn value_type(&self) -> FieldType { self.value_type }

    pub fn is_enabled(&self) -> bool { self.enabled }

    /// Fields fed by this output.
    pub fn forward_connections(&self) -> &[FieldId] { &self.slaves }

    pub fn num_connections(&self) -> usize { self.slaves.len() }

    /// The value written by the most recent evaluation.
    pub fn last_value(&self) -> Option<&FieldValue> { self.last_value.as_ref() }
}

/// Blueprint for containers the reader can instantiate by type name.
#[derive(Clone)]
pub struct ContainerTemplate {
    pub type_name: String,
    pub flavor: ContainerFlavor,
    pub fields: Vec<(String, FieldValue)>,
    pub outputs: Vec<(String, FieldType)>,
    pub engine: Option<EngineFactory>,
}

impl ContainerTemplate {
    pub fn node(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            flavor: ContainerFlavor::Node,
            fields: Vec::new(),
            outputs: Vec::new(),
            engine: None,
        }
    }

    pub fn engine(
        type_name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Engine> + 'static,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            flavor: ContainerFlavor::Engine,
            fields: Vec::new(),
            outputs: Vec::new(),
            engine: Some(Rc::new(factory)),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, default: impl Into<FieldValue>) -> Self {
        self.fields.push((name.into(), default.into()));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.outputs.push((name.into(), ty));
        self
    }
}

impl fmt::Debug for ContainerTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerTemplate")
            .field("type_name", &self.type_name)
            .field("flavor", &self.flavor)
            .field("fields", &self.fields)
            .field("outputs", &self.outputs)
            .finish()
    }
}

// ============================================================================
// Container management
// ============================================================================

impl FieldGraph {
    pub(crate) fn insert_container(&mut self, type_name: &str, flavor: ContainerFlavor) -> ContainerId {
        let id = ContainerId(self.alloc_id());
        self.containers.insert(id, Container::new(type_name, flavor));
        id
    }

    /// A node container with no fields yet.
    pub fn create_node(&mut self, type_name: &str) -> ContainerId {
        self.insert_container(type_name, ContainerFlavor::Node)
    }

    /// An engine container driven by `engine`.
    pub fn create_engine(&mut self, type_name: &str, engine: impl Engine + 'static) -> ContainerId {
        let id = self.insert_container(type_name, ContainerFlavor::Engine);
        if let Some(c) = self.containers.get_mut(&id) {
            c.engine = Some(Box::new(engine));
        }
        id
    }

    /// Add a named field to `owner`; the field starts out default.
    pub fn add_field(&mut self, owner: ContainerId, name: &str, ty: FieldType) -> Result<FieldId> {
        if self.container(owner)?.field_named(name).is_some() {
            return Err(Error::Semantic(format!("duplicate field {name}")));
        }
        let id = self.create_field(ty);
        self.set_owner(id, Some(owner))?;
        self.container_mut(owner)?.fields.push((name.to_owned(), id));
        Ok(id)
    }

    /// Add a named output to an engine (or node engine).
    pub fn add_output(&mut self, owner: ContainerId, name: &str, ty: FieldType) -> Result<OutputId> {
        if self.container(owner)?.output_named(name).is_some() {
            return Err(Error::Semantic(format!("duplicate output {name}")));
        }
        let id = OutputId(self.alloc_id());
        self.outputs.insert(
            id,
            Output {
                container: owner,
                value_type: ty,
                slaves: SmallVec::new(),
                enabled: true,
                last_value: None,
            },
        );
        self.container_mut(owner)?.outputs.push((name.to_owned(), id));
        Ok(id)
    }

    pub fn set_container_name(&mut self, id: ContainerId, name: &str) -> Result<()> {
        self.container_mut(id)?.name = Some(name.to_owned());
        Ok(())
    }

    pub fn field_by_name(&self, owner: ContainerId, name: &str) -> Result<FieldId> {
        self.container(owner)?
            .field_named(name)
            .ok_or_else(|| Error::NotFound(format!("field {name}")))
    }

    pub fn output_by_name(&self, owner: ContainerId, name: &str) -> Result<OutputId> {
        self.container(owner)?
            .output_named(name)
            .ok_or_else(|| Error::NotFound(format!("output {name}")))
    }

    // ========================================================================
    // Reference counting
    // ========================================================================

    pub fn ref_container(&mut self, id: ContainerId) -> Result<()> {
        self.container_mut(id)?.ref_count += 1;
        Ok(())
    }

    /// Drop one reference; the container is destroyed when none remain.
    pub fn unref_container(&mut self, id: ContainerId) -> Result<()> {
        let c = self.container_mut(id)?;
        debug_assert!(c.ref_count > 0, "unref of container {id} with no references");
        c.ref_count = c.ref_count.saturating_sub(1);
        if c.ref_count == 0 && !c.destructing {
            self.destroy_container(id)?;
        }
        Ok(())
    }

    /// Tear down a container: its outputs' slaves are disconnected, its
    /// fields destroyed, and attached sensors told it is going away.
    pub fn destroy_container(&mut self, id: ContainerId) -> Result<()> {
        let c = self.container_mut(id)?;
        if c.destructing {
            return Ok(());
        }
        c.destructing = true;
        tracing::debug!(container = %id, type_name = %c.type_name, "destroying container");

        let outputs: Vec<OutputId> = c.outputs.iter().map(|(_, o)| *o).collect();
        for output in &outputs {
            while let Some(&slave) = self.output(*output)?.slaves.first() {
                let before = self.output(*output)?.slaves.len();
                self.disconnect_output(slave, *output)?;
                if self.output(*output)?.slaves.len() == before {
                    self.remove_output_connection(*output, slave)?;
                }
            }
        }

        let fields: Vec<FieldId> = self.container(id)?.fields.iter().map(|(_, f)| *f).collect();
        for field in fields {
            self.destroy_field(field)?;
        }
        for output in outputs {
            self.outputs.remove(&output);
        }

        let sensors = std::mem::take(&mut self.container_mut(id)?.sensors);
        for sensor in sensors {
            self.dying_reference(sensor)?;
        }
        self.containers.remove(&id);
        Ok(())
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Enable or disable an output. A disabled output neither notifies
    /// nor writes into its slaves.
    pub fn enable_output(&mut self, output: OutputId, on: bool) -> Result<()> {
        self.output_mut(output)?.enabled = on;
        Ok(())
    }

    /// Whether the output belongs to a node rather than a plain engine.
    pub fn is_node_output(&self, output: OutputId) -> Result<bool> {
        let container = self.output(output)?.container;
        Ok(self.container(container)?.flavor == ContainerFlavor::Node)
    }

    /// Register `field` as a dependent of `output`. The output becomes an
    /// auditor of the field and holds a reference on its container.
    pub(crate) fn add_output_connection(&mut self, output: OutputId, field: FieldId) -> Result<()> {
        let container = {
            let o = self.output_mut(output)?;
            o.slaves.push(field);
            o.container
        };
        self.add_auditor(field, Auditor::Output(output))?;
        self.ref_container(container)
    }

    pub(crate) fn remove_output_connection(&mut self, output: OutputId, field: FieldId) -> Result<()> {
        let container = {
            let o = self.output_mut(output)?;
            remove_first(&mut o.slaves, &field);
            o.container
        };
        self.remove_auditor(field, Auditor::Output(output))?;
        self.unref_container(container)
    }

    // ========================================================================
    // Templates
    // ========================================================================

    /// Make `template.type_name` instantiable, e.g. by the reader.
    pub fn register_container_type(&mut self, template: ContainerTemplate) {
        self.templates.insert(template.type_name.clone(), template);
    }

    pub fn is_container_type_registered(&self, type_name: &str) -> bool {
        self.templates.contains_key(type_name)
    }

    /// Create a container from a registered template.
    pub fn instantiate(&mut self, type_name: &str) -> Result<ContainerId> {
        let template = self
            .templates
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("container type {type_name}")))?;
        let id = self.insert_container(type_name, template.flavor);
        if let Some(factory) = &template.engine {
            self.container_mut(id)?.engine = Some(factory());
        }
        for (name, default) in template.fields {
            let field = self.add_field(id, &name, default.field_type())?;
            self.field_mut(field)?.value = default;
        }
        for (name, ty) in template.outputs {
            self.add_output(id, &name, ty)?;
        }
        Ok(id)
    }
}
