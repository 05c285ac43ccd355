//! Writer side of field persistence: `FieldOutput`.
//!
//! Writing a graph is two passes over the same output: `Stage::CountRefs`
//! only counts how often each container is referenced (so multiply
//! referenced ones get a `DEF` name), then `Stage::Write` emits bytes.

use hashbrown::{HashMap, HashSet};

use crate::model::ContainerId;

/// Which pass a write is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CountRefs,
    Write,
}

/// Stream writer for field values and connections.
#[derive(Debug)]
pub struct FieldOutput {
    buf: Vec<u8>,
    binary: bool,
    stage: Stage,
    indent_level: usize,
    indent_width: usize,
    write_refs: HashMap<ContainerId, u32>,
    written: HashSet<ContainerId>,
    names: HashMap<ContainerId, String>,
}

impl FieldOutput {
    pub fn ascii() -> Self {
        Self::with_buffer(Vec::new(), false)
    }

    pub fn binary() -> Self {
        Self::with_buffer(Vec::new(), true)
    }

    /// Write into caller-supplied storage. The buffer is cleared first and
    /// grows as needed; take it back with [`FieldOutput::into_bytes`].
    pub fn with_buffer(mut buf: Vec<u8>, binary: bool) -> Self {
        buf.clear();
        Self {
            buf,
            binary,
            stage: Stage::Write,
            indent_level: 0,
            indent_width: 2,
            write_refs: HashMap::new(),
            written: HashSet::new(),
            names: HashMap::new(),
        }
    }

    pub fn set_indent_width(&mut self, width: usize) {
        self.indent_width = width;
    }

    pub fn is_binary(&self) -> bool { self.binary }

    pub fn stage(&self) -> Stage { self.stage }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn as_bytes(&self) -> &[u8] { &self.buf }

    pub fn into_bytes(self) -> Vec<u8> { self.buf }

    /// Lossy: binary output is not meant to be viewed as text.
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    // ========================================================================
    // Reference bookkeeping
    // ========================================================================

    /// Count one more reference to `id`; returns the new count.
    pub fn add_write_ref(&mut self, id: ContainerId) -> u32 {
        let count = self.write_refs.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    pub fn write_refs(&self, id: ContainerId) -> u32 {
        self.write_refs.get(&id).copied().unwrap_or(0)
    }

    /// Mark `id` as written; returns false if it already was.
    pub fn mark_written(&mut self, id: ContainerId) -> bool {
        self.written.insert(id)
    }

    pub fn is_written(&self, id: ContainerId) -> bool {
        self.written.contains(&id)
    }

    /// Name used for `DEF`/`USE` of `id` within this output.
    pub fn def_name(&mut self, id: ContainerId, preferred: Option<&str>) -> String {
        self.names
            .entry(id)
            .or_insert_with(|| match preferred {
                Some(name) => name.to_owned(),
                None => format!("_{}", id.0),
            })
            .clone()
    }

    // ========================================================================
    // ASCII primitives
    // ========================================================================

    pub fn write_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_char(&mut self, c: char) {
        let mut tmp = [0u8; 4];
        self.buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
    }

    pub fn indent(&mut self) {
        if self.binary {
            return;
        }
        let n = self.indent_level * self.indent_width;
        self.buf.extend(std::iter::repeat_n(b' ', n));
    }

    pub fn inc_indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dec_indent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    // ========================================================================
    // Binary primitives
    // ========================================================================

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_binary_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.write_u32(u32::try_from(bytes.len()).unwrap_or(u32::MAX));
        self.buf.extend_from_slice(bytes);
        let pad = bytes.len().div_ceil(4) * 4 - bytes.len();
        self.buf.extend(std::iter::repeat_n(0u8, pad));
    }

    /// A name: bare text in ASCII, a length-prefixed string in binary.
    pub fn write_name(&mut self, name: &str) {
        if self.binary {
            self.write_binary_string(name);
        } else {
            self.write_str(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent() {
        let mut out = FieldOutput::ascii();
        out.inc_indent();
        out.indent();
        out.write_str("x");
        out.dec_indent();
        out.dec_indent();
        out.indent();
        out.write_char('y');
        assert_eq!(out.into_string(), "  xy");
    }

    #[test]
    fn test_reuses_caller_buffer() {
        let buf = Vec::with_capacity(64);
        let mut out = FieldOutput::with_buffer(buf, false);
        out.write_str("abc");
        let buf = out.into_bytes();
        assert_eq!(buf, b"abc");
        assert!(buf.capacity() >= 64);
    }

    #[test]
    fn test_binary_string_is_padded() {
        let mut out = FieldOutput::binary();
        out.write_binary_string("hello");
        assert_eq!(out.as_bytes().len(), 4 + 8);
    }

    #[test]
    fn test_write_refs() {
        let mut out = FieldOutput::ascii();
        let id = ContainerId(7);
        assert_eq!(out.write_refs(id), 0);
        assert_eq!(out.add_write_ref(id), 1);
        assert_eq!(out.add_write_ref(id), 2);
        assert!(out.mark_written(id));
        assert!(!out.mark_written(id));
    }
}
