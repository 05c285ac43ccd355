//! Reader side of field persistence: `FieldInput`.
//!
//! One type serves both encodings. ASCII mode is a character reader with
//! whitespace and `#` comment skipping plus one-character put-back; binary
//! mode reads big-endian 32-bit words. Read errors are posted here so the
//! caller gets both a log line and an `Error::Read` carrying the line.

use hashbrown::HashMap;

use crate::model::ContainerId;
use crate::Error;

/// Characters that terminate a name token.
pub(crate) const NAME_STOP: &[u8] = b"{}[],.~=\"#";
/// Characters that terminate a number token (`.` is part of a number).
const NUMBER_STOP: &[u8] = b"{}[],~=\"#";

/// A recorded `IS` reference: `field IS interfaceField` inside a prototype body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsReference {
    pub container: Option<ContainerId>,
    pub field: String,
    pub target: String,
}

/// Stream reader for field values and connections.
#[derive(Debug)]
pub struct FieldInput {
    data: Vec<u8>,
    pos: usize,
    line: usize,
    binary: bool,
    /// `DEF` names seen so far → container instances.
    defs: HashMap<String, ContainerId>,
    is_references: Vec<IsReference>,
    errors: Vec<String>,
}

impl FieldInput {
    /// ASCII reader over a string.
    pub fn from_str(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec(), false)
    }

    /// Binary reader over raw bytes.
    pub fn from_binary(bytes: Vec<u8>) -> Self {
        Self::new(bytes, true)
    }

    fn new(data: Vec<u8>, binary: bool) -> Self {
        Self {
            data,
            pos: 0,
            line: 1,
            binary,
            defs: HashMap::new(),
            is_references: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_binary(&self) -> bool { self.binary }

    pub fn line(&self) -> usize { self.line }

    /// Errors posted so far, oldest first.
    pub fn errors(&self) -> &[String] { &self.errors }

    pub fn is_references(&self) -> &[IsReference] { &self.is_references }

    // ========================================================================
    // Error reporting
    // ========================================================================

    /// Record a read error and return it for propagation.
    pub fn post_error(&mut self, message: impl Into<String>) -> Error {
        let message = message.into();
        tracing::warn!(line = self.line, "read error: {message}");
        self.errors.push(format!("line {}: {}", self.line, message));
        Error::Read { line: self.line, message }
    }

    // ========================================================================
    // DEF / USE
    // ========================================================================

    pub fn add_def(&mut self, name: impl Into<String>, id: ContainerId) {
        self.defs.insert(name.into(), id);
    }

    pub fn find_def(&self, name: &str) -> Option<ContainerId> {
        self.defs.get(name).copied()
    }

    // ========================================================================
    // ASCII primitives
    // ========================================================================

    fn skip_whitespace(&mut self) {
        if self.binary {
            return;
        }
        while let Some(&b) = self.data.get(self.pos) {
            match b {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b'#' => {
                    while let Some(&c) = self.data.get(self.pos) {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                c if c.is_ascii_whitespace() => self.pos += 1,
                _ => break,
            }
        }
    }

    /// True once only whitespace (ASCII) or nothing (binary) remains.
    pub fn eof(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.data.len()
    }

    /// Next non-whitespace character.
    pub fn read_char(&mut self) -> Option<char> {
        self.skip_whitespace();
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(char::from(b))
    }

    /// Undo the last `read_char`.
    pub fn put_back(&mut self, c: char) {
        debug_assert!(self.pos > 0, "put_back at start of input");
        debug_assert_eq!(self.data.get(self.pos - 1).copied(), u8::try_from(c).ok());
        self.pos -= 1;
    }

    pub fn peek_char(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.data.get(self.pos).map(|&b| char::from(b))
    }

    fn read_run(&mut self, stop: &[u8]) -> Option<String> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(&b) = self.data.get(self.pos) {
            if b.is_ascii_whitespace() || stop.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        String::from_utf8(self.data[start..self.pos].to_vec()).ok()
    }

    /// A bare identifier: field names, type names, DEF names.
    pub fn read_name(&mut self) -> Option<String> {
        if self.binary {
            return self.read_binary_string();
        }
        self.read_run(NAME_STOP)
    }

    /// A numeric literal as text.
    pub fn read_number_token(&mut self) -> Option<String> {
        self.read_run(NUMBER_STOP)
    }

    /// A double-quoted string with `\"` and `\\` escapes, or a bare word.
    pub fn read_string(&mut self) -> Option<String> {
        if self.binary {
            return self.read_binary_string();
        }
        if self.peek_char()? != '"' {
            return self.read_name();
        }
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            let b = *self.data.get(self.pos)?;
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let next = *self.data.get(self.pos)?;
                    self.pos += 1;
                    bytes.push(next);
                }
                b'\n' => {
                    self.line += 1;
                    bytes.push(b);
                }
                _ => bytes.push(b),
            }
        }
        String::from_utf8(bytes).ok()
    }

    /// Checks for `IS <name>` in place of a value. Returns true and records
    /// the reference if found; otherwise leaves the position untouched.
    pub fn check_is_reference(&mut self, container: Option<ContainerId>, field: &str) -> bool {
        if self.binary {
            return false;
        }
        let (pos, line) = (self.pos, self.line);
        if self.read_name().as_deref() == Some("IS") {
            if let Some(target) = self.read_name() {
                self.is_references.push(IsReference {
                    container,
                    field: field.to_owned(),
                    target,
                });
                return true;
            }
        }
        self.pos = pos;
        self.line = line;
        false
    }

    // ========================================================================
    // Binary primitives
    // ========================================================================

    fn read_word(&mut self) -> Option<[u8; 4]> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        bytes.try_into().ok()
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_word().map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.read_word().map(i32::from_be_bytes)
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_word().map(f32::from_be_bytes)
    }

    pub fn read_f64(&mut self) -> Option<f64> {
        let bytes = self.data.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        bytes.try_into().ok().map(f64::from_be_bytes)
    }

    /// u32 length, bytes, zero padding to the next word boundary.
    pub fn read_binary_string(&mut self) -> Option<String> {
        let len = usize::try_from(self.read_u32()?).ok()?;
        let padded = len.div_ceil(4) * 4;
        let bytes = self.data.get(self.pos..self.pos + len)?.to_vec();
        if self.pos + padded > self.data.len() {
            return None;
        }
        self.pos += padded;
        String::from_utf8(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_char_skips_whitespace_and_comments() {
        let mut input = FieldInput::from_str("  # comment\n  ~");
        assert_eq!(input.read_char(), Some('~'));
        assert_eq!(input.line(), 2);
        assert!(input.eof());
    }

    #[test]
    fn test_put_back() {
        let mut input = FieldInput::from_str(" =x");
        assert_eq!(input.read_char(), Some('='));
        input.put_back('=');
        assert_eq!(input.read_char(), Some('='));
        assert_eq!(input.read_name().as_deref(), Some("x"));
    }

    #[test]
    fn test_name_stops_at_dot() {
        let mut input = FieldInput::from_str("calc.out");
        assert_eq!(input.read_name().as_deref(), Some("calc"));
        assert_eq!(input.read_char(), Some('.'));
        assert_eq!(input.read_name().as_deref(), Some("out"));
    }

    #[test]
    fn test_number_keeps_dot() {
        let mut input = FieldInput::from_str("-3.5e2, 1");
        assert_eq!(input.read_number_token().as_deref(), Some("-3.5e2"));
        assert_eq!(input.read_char(), Some(','));
    }

    #[test]
    fn test_quoted_string_escapes() {
        let mut input = FieldInput::from_str(r#""say \"hi\" \\o/""#);
        assert_eq!(input.read_string().as_deref(), Some(r#"say "hi" \o/"#));
    }

    #[test]
    fn test_unterminated_string() {
        let mut input = FieldInput::from_str("\"open");
        assert_eq!(input.read_string(), None);
    }

    #[test]
    fn test_is_reference_restores_position() {
        let mut input = FieldInput::from_str("3.5");
        assert!(!input.check_is_reference(None, "f"));
        assert_eq!(input.read_number_token().as_deref(), Some("3.5"));

        let mut input = FieldInput::from_str("IS outer");
        assert!(input.check_is_reference(None, "f"));
        assert_eq!(input.is_references()[0].target, "outer");
    }

    #[test]
    fn test_binary_string_padding() {
        let mut bytes = 3u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc\0");
        bytes.extend_from_slice(&7u32.to_be_bytes());
        let mut input = FieldInput::from_binary(bytes);
        assert_eq!(input.read_binary_string().as_deref(), Some("abc"));
        assert_eq!(input.read_u32(), Some(7));
        assert!(input.eof());
    }

    #[test]
    fn test_post_error_records_line() {
        let mut input = FieldInput::from_str("\n\nx");
        input.read_char();
        let err = input.post_error("boom");
        assert!(matches!(err, Error::Read { line: 3, .. }));
        assert_eq!(input.errors().len(), 1);
    }
}
