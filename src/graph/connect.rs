//! Connection establishment and teardown.
//!
//! Every edge is recorded on both ends: the slave lists its masters, the
//! master lists its slaves and auditors. The functions in this module are
//! the only place those lists change. When master and slave types differ
//! a converter container sits in between and the slave remembers it by
//! master endpoint.

use crate::model::*;
use crate::{Error, Result};

use super::container::ContainerFlavor;
use super::storage::{remove_first, Auditor};
use super::FieldGraph;

impl FieldGraph {
    // ========================================================================
    // Auditors
    // ========================================================================

    pub fn add_auditor(&mut self, field: FieldId, auditor: Auditor) -> Result<()> {
        let f = self.field_mut(field)?;
        f.extend_storage();
        if let Some(ext) = f.ext_mut() {
            ext.auditors.push(auditor);
        }
        Ok(())
    }

    pub fn remove_auditor(&mut self, field: FieldId, auditor: Auditor) -> Result<()> {
        let f = self.field_mut(field)?;
        assert!(f.has_extended_storage(), "auditor removed from compact field {field}");
        if let Some(ext) = f.ext_mut() {
            remove_first(&mut ext.auditors, &auditor);
        }
        Ok(())
    }

    pub fn auditors(&self, field: FieldId) -> Result<Vec<Auditor>> {
        Ok(self.field(field)?.ext().map(|ext| ext.auditors.to_vec()).unwrap_or_default())
    }

    // ========================================================================
    // Connecting
    // ========================================================================

    /// Make `slave` depend on `master`. Unless `append`, existing masters
    /// are dropped first. Differing types get a converter in between;
    /// without one the call fails and nothing changes. Appending a master
    /// the slave already has is a no-op.
    pub fn connect_from(&mut self, slave: FieldId, master: FieldId, not_notify: bool, append: bool) -> Result<()> {
        if slave == master {
            return Err(Error::Semantic(format!("field {slave} cannot be its own master")));
        }
        if append && self.field(slave)?.ext().is_some_and(|ext| ext.master_fields.contains(&master)) {
            tracing::debug!(%slave, %master, "already connected from field");
            return Ok(());
        }
        let slave_ty = self.field(slave)?.field_type;
        let master_ty = self.field(master)?.field_type;
        let conversion = self.conversion_for(master_ty, slave_ty)?;

        self.field_mut(slave)?.extend_storage();
        self.field_mut(master)?.extend_storage();
        if !append {
            self.disconnect(slave)?;
        }

        match conversion {
            None => self.add_auditor(master, Auditor::Field(slave))?,
            Some(conversion) => {
                let converter = self.create_converter(conversion)?;
                let input = self.converter_input(converter)?;
                let output = self.converter_output(converter)?;
                self.connect_from(input, master, not_notify, false)?;
                self.add_output_connection(output, slave)?;
                self.ext_mut(slave)?.add_converter(Endpoint::Field(master), converter);
            }
        }

        self.ext_mut(slave)?.master_fields.push(master);
        if !self.is_converter_field(slave)? {
            self.ext_mut(master)?.slaves.push(slave);
        }
        tracing::debug!(%slave, %master, append, "connected from field");

        self.connection_made(slave, not_notify)
    }

    /// Make `slave` depend on a computed output. Appending an output the
    /// slave already has is a no-op.
    pub fn connect_from_output(
        &mut self,
        slave: FieldId,
        master: OutputId,
        not_notify: bool,
        append: bool,
    ) -> Result<()> {
        if append && self.field(slave)?.ext().is_some_and(|ext| ext.master_outputs.contains(&master)) {
            tracing::debug!(%slave, %master, "already connected from output");
            return Ok(());
        }
        let slave_ty = self.field(slave)?.field_type;
        let (master_ty, engine) = {
            let o = self.output(master)?;
            (o.value_type, o.container)
        };
        let conversion = self.conversion_for(master_ty, slave_ty)?;

        self.field_mut(slave)?.extend_storage();

        // Re-pointing within the same engine must not let the disconnect
        // below release it.
        self.ref_container(engine)?;
        let linked = self.link_output(slave, master, conversion, not_notify, append);
        self.unref_container(engine)?;
        linked?;

        self.ext_mut(slave)?.master_outputs.push(master);
        tracing::debug!(%slave, %master, append, "connected from output");

        self.connection_made(slave, not_notify)
    }

    fn link_output(
        &mut self,
        slave: FieldId,
        master: OutputId,
        conversion: Option<Conversion>,
        not_notify: bool,
        append: bool,
    ) -> Result<()> {
        if !append {
            self.disconnect(slave)?;
        }
        match conversion {
            None => self.add_output_connection(master, slave),
            Some(conversion) => {
                let converter = self.create_converter(conversion)?;
                let input = self.converter_input(converter)?;
                let output = self.converter_output(converter)?;
                self.connect_from_output(input, master, not_notify, false)?;
                self.add_output_connection(output, slave)?;
                self.ext_mut(slave)?.add_converter(Endpoint::Output(master), converter);
                Ok(())
            }
        }
    }

    pub fn append_connection(&mut self, slave: FieldId, master: FieldId, not_notify: bool) -> Result<()> {
        self.connect_from(slave, master, not_notify, true)
    }

    pub fn append_output_connection(&mut self, slave: FieldId, master: OutputId, not_notify: bool) -> Result<()> {
        self.connect_from_output(slave, master, not_notify, true)
    }

    /// `None` when the types match, the converter to insert otherwise.
    fn conversion_for(&self, from: FieldType, to: FieldType) -> Result<Option<Conversion>> {
        if from == to {
            return Ok(None);
        }
        match self.registry.converter(from, to) {
            Some(conversion) => Ok(Some(conversion)),
            None => {
                tracing::warn!(%from, %to, "no converter");
                Err(Error::NoConverter { from: from.name().to_owned(), to: to.name().to_owned() })
            }
        }
    }

    fn connection_made(&mut self, slave: FieldId, not_notify: bool) -> Result<()> {
        let f = self.field_mut(slave)?;
        if not_notify || !f.is_connection_enabled() {
            return Ok(());
        }
        f.status.set(StatusFlags::NEEDS_EVALUATION);
        f.status.clear(StatusFlags::DEFAULT);
        self.start_notify(slave)
    }

    // ========================================================================
    // Disconnecting
    // ========================================================================

    /// Sever the link from `master`. Pending updates are pulled first.
    pub fn disconnect_from(&mut self, slave: FieldId, master: FieldId) -> Result<()> {
        if !self.field(slave)?.ext().is_some_and(|ext| ext.master_fields.contains(&master)) {
            return Ok(());
        }
        self.evaluate(slave)?;

        if !self.is_converter_field(slave)? {
            if let Some(ext) = self.field_mut(master)?.ext_mut() {
                remove_first(&mut ext.slaves, &slave);
            }
        }
        let converter = {
            let ext = self.ext_mut(slave)?;
            remove_first(&mut ext.master_fields, &master);
            ext.find_converter(Endpoint::Field(master))
        };

        match converter {
            Some(converter) => {
                let input = self.converter_input(converter)?;
                let output = self.converter_output(converter)?;
                self.disconnect_from(input, master)?;
                self.remove_output_connection(output, slave)?;
                self.ext_mut(slave)?.remove_converter(Endpoint::Field(master));
                self.unref_container(converter)?;
            }
            None => self.remove_auditor(master, Auditor::Field(slave))?,
        }
        tracing::debug!(%slave, %master, "disconnected from field");
        Ok(())
    }

    /// Sever the link from a computed output. A converter's input field
    /// forwards the request to the field behind the converter.
    pub fn disconnect_output(&mut self, slave: FieldId, master: OutputId) -> Result<()> {
        if let Some(converter) = self.converter_owner(slave)? {
            let output = self.converter_output(converter)?;
            let real = self.output(output)?.slaves.first().copied();
            if let Some(real) = real {
                self.disconnect_output(real, master)?;
            }
            return Ok(());
        }
        if !self.field(slave)?.ext().is_some_and(|ext| ext.master_outputs.contains(&master)) {
            return Ok(());
        }
        if self.output(master)?.enabled {
            self.evaluate(slave)?;
        }

        let converter = {
            let ext = self.ext_mut(slave)?;
            remove_first(&mut ext.master_outputs, &master);
            ext.find_converter(Endpoint::Output(master))
        };

        match converter {
            Some(converter) => {
                let input = self.converter_input(converter)?;
                let output = self.converter_output(converter)?;
                remove_first(&mut self.ext_mut(input)?.master_outputs, &master);
                self.remove_output_connection(master, input)?;
                self.remove_output_connection(output, slave)?;
                self.ext_mut(slave)?.remove_converter(Endpoint::Output(master));
                self.unref_container(converter)?;
            }
            None => self.remove_output_connection(master, slave)?,
        }
        tracing::debug!(%slave, %master, "disconnected from output");
        Ok(())
    }

    /// Drop every master connection. A no-op on unconnected fields.
    pub fn disconnect(&mut self, slave: FieldId) -> Result<()> {
        while let Some(master) = self.field(slave)?.ext().and_then(|ext| ext.master_fields.first().copied()) {
            self.disconnect_from(slave, master)?;
        }
        while let Some(master) = self.field(slave)?.ext().and_then(|ext| ext.master_outputs.first().copied()) {
            self.disconnect_output(slave, master)?;
        }
        debug_assert!(!self.field(slave)?.is_connected(), "field {slave} still connected");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_connected(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_connected())
    }

    pub fn is_connected_from_field(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_connected_from_field())
    }

    pub fn is_connected_from_output(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_connected_from_output())
    }

    /// Number of master fields.
    pub fn num_connections(&self, field: FieldId) -> Result<usize> {
        Ok(self.field(field)?.ext().map_or(0, |ext| ext.master_fields.len()))
    }

    /// Master fields in connection order.
    pub fn connections(&self, field: FieldId) -> Result<Vec<FieldId>> {
        Ok(self.field(field)?.ext().map(|ext| ext.master_fields.to_vec()).unwrap_or_default())
    }

    /// The most recently connected master field.
    pub fn connected_field(&self, field: FieldId) -> Result<Option<FieldId>> {
        Ok(self.field(field)?.ext().and_then(|ext| ext.master_fields.last().copied()))
    }

    pub fn connected_output(&self, field: FieldId) -> Result<Option<OutputId>> {
        Ok(self.field(field)?.ext().and_then(|ext| ext.master_outputs.last().copied()))
    }

    /// Slave fields connected directly or through a converter.
    pub fn forward_connections(&self, field: FieldId) -> Result<Vec<FieldId>> {
        Ok(self.field(field)?.ext().map(|ext| ext.slaves.to_vec()).unwrap_or_default())
    }

    /// Number of converters currently interposed in front of `field`.
    pub fn converter_count(&self, field: FieldId) -> Result<usize> {
        Ok(self.field(field)?.ext().map_or(0, |ext| ext.converter_count()))
    }

    /// While disabled, no value flows in from masters. Re-enabling marks
    /// the field dirty so the next read resynchronizes.
    pub fn enable_connection(&mut self, field: FieldId, on: bool) -> Result<()> {
        let f = self.field_mut(field)?;
        let was = f.is_connection_enabled();
        f.status.change(StatusFlags::CONNECTIONS_ENABLED, on);
        if !was && on {
            f.status.set(StatusFlags::NEEDS_EVALUATION);
        }
        Ok(())
    }

    pub fn is_connection_enabled(&self, field: FieldId) -> Result<bool> {
        Ok(self.field(field)?.is_connection_enabled())
    }

    /// Give `dst` the same (last) master as `src`, replacing its own.
    pub fn copy_connection(&mut self, dst: FieldId, src: FieldId) -> Result<()> {
        if let Some(master) = self.connected_field(src)? {
            self.connect_from(dst, master, false, false)
        } else if let Some(master) = self.connected_output(src)? {
            self.connect_from_output(dst, master, false, false)
        } else {
            Ok(())
        }
    }

    pub fn is_converter_field(&self, field: FieldId) -> Result<bool> {
        Ok(self.converter_owner(field)?.is_some())
    }

    fn converter_owner(&self, field: FieldId) -> Result<Option<ContainerId>> {
        let Some(owner) = self.field(field)?.owner() else {
            return Ok(None);
        };
        let is_converter = self
            .containers
            .get(&owner)
            .is_some_and(|c| c.flavor == ContainerFlavor::Converter);
        Ok(is_converter.then_some(owner))
    }

    fn ext_mut(&mut self, field: FieldId) -> Result<&mut super::ConnectStorage> {
        self.field_mut(field)?
            .ext_mut()
            .ok_or_else(|| Error::NotFound(format!("connection storage of field {field}")))
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Sever everything touching `field` ahead of its removal.
    pub(crate) fn teardown_field(&mut self, field: FieldId) -> Result<()> {
        self.field_mut(field)?.status.set(StatusFlags::DESTRUCTING);
        if !self.field(field)?.has_extended_storage() {
            return Ok(());
        }
        self.disconnect(field)?;

        while let Some(slave) = self.field(field)?.ext().and_then(|ext| ext.slaves.first().copied()) {
            let before = self.forward_connections(field)?.len();
            self.disconnect_from(slave, field)?;
            if let Some(ext) = self.field_mut(field)?.ext_mut() {
                if ext.slaves.len() == before {
                    tracing::error!(%field, %slave, "slave does not list its master at teardown");
                    debug_assert!(false, "slave {slave} of field {field} does not list it as master");
                    ext.slaves.remove(0);
                }
            }
        }

        while let Some(auditor) = self.field(field)?.ext().and_then(|ext| ext.auditors.first().copied()) {
            match auditor {
                Auditor::Output(output) => self.remove_output_connection(output, field)?,
                Auditor::Sensor(sensor) => {
                    self.remove_auditor(field, auditor)?;
                    self.dying_reference(sensor)?;
                }
                Auditor::Field(_) | Auditor::Container(_) => {
                    tracing::error!(%field, ?auditor, "illegal auditor left at teardown");
                    debug_assert!(false, "illegal auditor {auditor:?} on field {field} at teardown");
                    self.remove_auditor(field, auditor)?;
                }
            }
        }

        let drained = self.field(field)?.ext().is_none_or(|ext| ext.is_drained());
        debug_assert!(drained, "field {field} torn down with live connections");
        Ok(())
    }

    // ========================================================================
    // Obsolete interpolator API
    // ========================================================================

    pub fn connect_from_interpolator(&mut self, _field: FieldId, _interpolator: &str) -> Result<()> {
        Err(obsolete("connect_from_interpolator"))
    }

    pub fn append_interpolator_connection(&mut self, _field: FieldId, _interpolator: &str) -> Result<()> {
        Err(obsolete("append_interpolator_connection"))
    }

    pub fn disconnect_interpolator(&mut self, _field: FieldId, _interpolator: &str) -> Result<()> {
        Err(obsolete("disconnect_interpolator"))
    }

    pub fn is_connected_from_interpolator(&self, _field: FieldId) -> Result<bool> {
        Err(obsolete("is_connected_from_interpolator"))
    }
}

fn obsolete(call: &'static str) -> Error {
    tracing::warn!(call, "interpolator connections are obsolete");
    Error::Obsolete(call)
}
