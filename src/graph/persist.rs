//! Field and container persistence.
//!
//! ASCII field grammar: `name [value] [~] [= <container> . master]` where
//! `<container>` is `[DEF n] Type { fields }` or `USE n`. Binary fields
//! are `name value flags [<container> master]`.
//!
//! Writing is two passes. `Stage::CountRefs` counts references to every
//! container reachable through connections; `Stage::Write` then gives
//! multiply referenced containers a `DEF` name and writes `USE` for
//! repeats.

use std::cell::RefCell;

use crate::io::{read_value, write_value, FieldInput, FieldOutput, Stage};
use crate::model::*;
use crate::{Error, Result};

use super::FieldGraph;

/// Binary flag word bits.
pub const FLAG_IGNORED: u32 = 0x1;
pub const FLAG_CONNECTED: u32 = 0x2;
pub const FLAG_DEFAULT: u32 = 0x4;
pub const ALL_FILE_FLAGS: u32 = FLAG_IGNORED | FLAG_CONNECTED | FLAG_DEFAULT;

const IGNORED_CHAR: char = '~';
const CONNECTION_CHAR: char = '=';

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Current capacity of this thread's `get_string` buffer.
pub fn scratch_capacity() -> usize {
    SCRATCH.with(|cell| cell.borrow().capacity())
}

impl FieldGraph {
    // ========================================================================
    // String round-trip
    // ========================================================================

    /// Parse `text` as an ASCII value and assign it.
    pub fn set_string(&mut self, field: FieldId, text: &str) -> Result<()> {
        let ty = self.field(field)?.field_type;
        let mut input = FieldInput::from_str(text);
        let value = read_value(&mut input, ty)
            .ok_or_else(|| input.post_error(format!("couldn't parse {ty} value from \"{text}\"")))?;
        self.field_mut(field)?.value = value;
        self.value_changed(field, true)
    }

    /// ASCII form of the current value, evaluating first.
    pub fn get_string(&mut self, field: FieldId) -> Result<String> {
        let value = self.get_value(field)?;
        let start = self.config.scratch_start_size;
        let max = self.config.scratch_max_size;
        Ok(SCRATCH.with(|cell| {
            let mut buf = std::mem::take(&mut *cell.borrow_mut());
            if buf.capacity() < start {
                buf.reserve(start);
            }
            let mut out = FieldOutput::with_buffer(buf, false);
            write_value(&mut out, &value);
            let mut buf = out.into_bytes();
            let text = String::from_utf8_lossy(&buf).into_owned();
            if buf.capacity() >= max {
                buf = Vec::with_capacity(start);
            }
            *cell.borrow_mut() = buf;
            text
        }))
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Read the value part of field `name`. Fails on premature end of
    /// input or an unparsable payload; the caller aborts the surrounding
    /// read.
    pub fn read_field(&mut self, input: &mut FieldInput, field: FieldId, name: &str) -> Result<()> {
        let owner = self.owner(field)?;
        if input.check_is_reference(owner, name) {
            return Ok(());
        }
        let ty = {
            let f = self.field_mut(field)?;
            f.status.clear(StatusFlags::DEFAULT);
            f.status.clear(StatusFlags::NEEDS_EVALUATION);
            f.field_type
        };

        if input.is_binary() {
            return self.read_field_binary(input, field, name, ty);
        }

        let c = input.read_char().ok_or_else(|| input.post_error("premature end of file"))?;
        if c == IGNORED_CHAR {
            self.set_ignored(field, true)?;
        } else {
            input.put_back(c);
            // `name = Node.field` carries no value.
            if c != CONNECTION_CHAR {
                let value = read_value(input, ty)
                    .ok_or_else(|| input.post_error(format!("couldn't read value for field \"{name}\"")))?;
                self.store_read_value(field, value)?;
            }
            if let Some(c) = next_char(input) {
                if c == IGNORED_CHAR {
                    self.set_ignored(field, true)?;
                } else {
                    input.put_back(c);
                }
            }
        }
        if let Some(c) = next_char(input) {
            if c == CONNECTION_CHAR {
                self.read_connection(input, field)?;
            } else {
                input.put_back(c);
            }
        }
        Ok(())
    }

    fn read_field_binary(&mut self, input: &mut FieldInput, field: FieldId, name: &str, ty: FieldType) -> Result<()> {
        let value = read_value(input, ty)
            .ok_or_else(|| input.post_error(format!("couldn't read value for field \"{name}\"")))?;
        self.store_read_value(field, value)?;

        let flags = input.read_u32().ok_or_else(|| input.post_error("premature end of file"))?;
        if flags & FLAG_IGNORED != 0 {
            self.set_ignored(field, true)?;
        }
        if flags & FLAG_CONNECTED != 0 {
            self.read_connection(input, field)?;
        }
        if flags & FLAG_DEFAULT != 0 {
            self.set_default(field, true)?;
        }
        if flags & !ALL_FILE_FLAGS != 0 && self.config.warn_unknown_flags {
            tracing::warn!(field = name, flags = format_args!("{flags:#x}"), "unknown field flags");
        }
        Ok(())
    }

    fn store_read_value(&mut self, field: FieldId, value: FieldValue) -> Result<()> {
        self.field_mut(field)?.value = value;
        self.value_changed(field, true)
    }

    /// Read `<container> . master` and connect `field` to it. A failed
    /// connect is reported but does not fail the read.
    pub fn read_connection(&mut self, input: &mut FieldInput, field: FieldId) -> Result<()> {
        let container = self.read_container(input)?;
        if !input.is_binary() {
            match input.read_char() {
                Some('.') => {}
                Some(c) => return Err(input.post_error(format!("expected '.', got '{c}'"))),
                None => return Err(input.post_error("premature end of file")),
            }
        }
        let master_name = input.read_name().ok_or_else(|| input.post_error("premature end of file"))?;

        let c = self.container(container)?;
        let connected = if let Some(master) = c.field_named(&master_name) {
            self.connect_from(field, master, false, false)
        } else if let Some(master) = c.output_named(&master_name) {
            self.connect_from_output(field, master, false, false)
        } else {
            let type_name = c.type_name.clone();
            return Err(input.post_error(format!("no field or output \"{master_name}\" in \"{type_name}\"")));
        };
        if connected.is_err() {
            let _ = input.post_error(format!("couldn't connect to \"{master_name}\""));
        }
        Ok(())
    }

    /// Read one container: `USE name`, or `[DEF name] Type { fields }`.
    /// Types must be registered with `register_container_type`.
    pub fn read_container(&mut self, input: &mut FieldInput) -> Result<ContainerId> {
        let tag = input.read_name().ok_or_else(|| input.post_error("premature end of file"))?;
        if tag == "USE" {
            let name = input.read_name().ok_or_else(|| input.post_error("premature end of file"))?;
            return input
                .find_def(&name)
                .ok_or_else(|| input.post_error(format!("unknown reference \"{name}\"")));
        }
        let (def, type_name) = if tag == "DEF" {
            let def = input.read_name().ok_or_else(|| input.post_error("premature end of file"))?;
            let type_name = input.read_name().ok_or_else(|| input.post_error("premature end of file"))?;
            (Some(def), type_name)
        } else {
            (None, tag)
        };

        if !self.is_container_type_registered(&type_name) {
            return Err(input.post_error(format!("unknown container type \"{type_name}\"")));
        }
        let id = self.instantiate(&type_name)?;
        if let Some(def) = def {
            self.set_container_name(id, &def)?;
            input.add_def(def, id);
        }

        if input.is_binary() {
            let count = input.read_u32().ok_or_else(|| input.post_error("premature end of file"))?;
            for _ in 0..count {
                self.read_named_field(input, id, &type_name)?;
            }
            return Ok(id);
        }

        match input.read_char() {
            Some('{') => {}
            Some(c) => return Err(input.post_error(format!("expected '{{', got '{c}'"))),
            None => return Err(input.post_error("premature end of file")),
        }
        loop {
            match input.peek_char() {
                None => return Err(input.post_error("premature end of file")),
                Some('}') => {
                    input.read_char();
                    return Ok(id);
                }
                Some(_) => self.read_named_field(input, id, &type_name)?,
            }
        }
    }

    fn read_named_field(&mut self, input: &mut FieldInput, id: ContainerId, type_name: &str) -> Result<()> {
        let name = input.read_name().ok_or_else(|| input.post_error("expected field name"))?;
        let field = self
            .container(id)?
            .field_named(&name)
            .ok_or_else(|| input.post_error(format!("unknown field \"{name}\" in \"{type_name}\"")))?;
        self.read_field(input, field, &name)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write field `name`, or count its references in the first stage.
    pub fn write_field(&mut self, out: &mut FieldOutput, field: FieldId, name: &str) -> Result<()> {
        if out.stage() == Stage::CountRefs {
            return self.count_write_refs(out, field);
        }
        let connected = self.resolve_write_connection(field)?.is_some();
        let value = self.get_value(field)?;
        let f = self.field(field)?;
        let (default, ignored) = (f.is_default(), f.is_ignored());

        if !out.is_binary() {
            out.indent();
            out.write_str(name);
            if !default {
                out.write_char(' ');
                write_value(out, &value);
            }
            if ignored {
                out.write_char(' ');
                out.write_char(IGNORED_CHAR);
            }
            if connected {
                self.write_connection(out, field)?;
            }
            out.write_char('\n');
        } else {
            out.write_name(name);
            write_value(out, &value);
            let mut flags = 0;
            if ignored {
                flags |= FLAG_IGNORED;
            }
            if connected {
                flags |= FLAG_CONNECTED;
            }
            if default {
                flags |= FLAG_DEFAULT;
            }
            out.write_u32(flags);
            if connected {
                self.write_connection(out, field)?;
            }
        }
        Ok(())
    }

    /// First stage: forward the count to the master's container.
    pub fn count_write_refs(&mut self, out: &mut FieldOutput, field: FieldId) -> Result<()> {
        if let Some((container, _)) = self.resolve_write_connection(field)? {
            self.write_container(out, container)?;
        }
        Ok(())
    }

    /// The container and name of the master to write, if `field` is
    /// connected to something that lives in a container.
    pub fn resolve_write_connection(&self, field: FieldId) -> Result<Option<(ContainerId, String)>> {
        let f = self.field(field)?;
        let Some(ext) = f.ext() else { return Ok(None) };
        if let Some(&master) = ext.master_fields.last() {
            let Some(owner) = self.field(master)?.owner() else { return Ok(None) };
            let name = self
                .container(owner)?
                .field_name(master)
                .ok_or_else(|| Error::Write(format!("field {master} has no name in container {owner}")))?;
            return Ok(Some((owner, name.to_owned())));
        }
        if let Some(&master) = ext.master_outputs.last() {
            let owner = self.output(master)?.container;
            let name = self
                .container(owner)?
                .output_name(master)
                .ok_or_else(|| Error::Write(format!("output {master} has no name in container {owner}")))?;
            return Ok(Some((owner, name.to_owned())));
        }
        Ok(None)
    }

    pub fn write_connection(&mut self, out: &mut FieldOutput, field: FieldId) -> Result<()> {
        let Some((container, master_name)) = self.resolve_write_connection(field)? else {
            return Err(Error::Write(format!("field {field} has no connection to write")));
        };
        if !out.is_binary() {
            out.write_char(' ');
            out.write_char(CONNECTION_CHAR);
            out.write_char(' ');
        }
        self.write_container(out, container)?;
        if !out.is_binary() {
            out.write_char('\n');
            out.indent();
            out.write_str(". ");
        }
        out.write_name(&master_name);
        Ok(())
    }

    /// Write (or count) a container and its writable fields.
    pub fn write_container(&mut self, out: &mut FieldOutput, id: ContainerId) -> Result<()> {
        let (type_name, name, fields) = {
            let c = self.container(id)?;
            (c.type_name.clone(), c.name.clone(), c.fields.clone())
        };
        let fields: Vec<(String, FieldId)> = fields
            .into_iter()
            .filter(|(_, f)| self.field(*f).is_ok_and(|f| f.should_write()))
            .collect();

        if out.stage() == Stage::CountRefs {
            if out.add_write_ref(id) == 1 {
                for (field_name, field) in &fields {
                    self.write_field(out, *field, field_name)?;
                }
            }
            return Ok(());
        }

        if out.is_written(id) {
            let def = out.def_name(id, name.as_deref());
            out.write_name("USE");
            if !out.is_binary() {
                out.write_char(' ');
            }
            out.write_name(&def);
            return Ok(());
        }
        out.mark_written(id);
        if out.write_refs(id) > 1 || name.is_some() {
            let def = out.def_name(id, name.as_deref());
            out.write_name("DEF");
            if !out.is_binary() {
                out.write_char(' ');
            }
            out.write_name(&def);
            if !out.is_binary() {
                out.write_char(' ');
            }
        }
        out.write_name(&type_name);

        if out.is_binary() {
            out.write_u32(u32::try_from(fields.len()).map_err(|_| Error::Write("too many fields".into()))?);
            for (field_name, field) in &fields {
                self.write_field(out, *field, field_name)?;
            }
            return Ok(());
        }

        out.write_str(" {\n");
        out.inc_indent();
        for (field_name, field) in &fields {
            self.write_field(out, *field, field_name)?;
        }
        out.dec_indent();
        out.indent();
        out.write_char('}');
        Ok(())
    }

    // ========================================================================
    // Convenience
    // ========================================================================

    /// Run both write stages for `id` into a fresh buffer.
    pub fn export_container(&mut self, id: ContainerId, binary: bool) -> Result<Vec<u8>> {
        let mut out = if binary { FieldOutput::binary() } else { FieldOutput::ascii() };
        out.set_indent_width(self.config.indent_width);
        out.set_stage(Stage::CountRefs);
        self.write_container(&mut out, id)?;
        out.set_stage(Stage::Write);
        self.write_container(&mut out, id)?;
        if !binary {
            out.write_char('\n');
        }
        Ok(out.into_bytes())
    }

    /// Export straight into any writer.
    pub fn export_container_to(&mut self, id: ContainerId, binary: bool, mut writer: impl std::io::Write) -> Result<()> {
        let bytes = self.export_container(id, binary)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn export_container_ascii(&mut self, id: ContainerId) -> Result<String> {
        let bytes = self.export_container(id, false)?;
        String::from_utf8(bytes).map_err(|e| Error::Write(e.to_string()))
    }

    /// Read one container (and whatever it connects to) from `input`.
    pub fn import_container(&mut self, input: &mut FieldInput) -> Result<ContainerId> {
        let id = self.read_container(input)?;
        tracing::debug!(container = %id, "imported container");
        Ok(id)
    }
}

/// Next character, or `None` at end of input.
fn next_char(input: &mut FieldInput) -> Option<char> {
    if input.eof() {
        return None;
    }
    input.read_char()
}
