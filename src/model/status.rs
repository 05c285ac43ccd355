//! Packed per-field status bits.
//!
//! The low three bits hold the field's [`FieldKind`]; the rest are single
//! flags. Two of them are recursion guards with different disciplines:
//! `NOTIFIED` silently cuts notification cycles, `EVALUATING` marks an
//! evaluation in progress and re-entering it is a bookkeeping bug.

use serde::{Deserialize, Serialize};

/// Role of a field inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldKind {
    #[default]
    Ordinary,
    EventIn,
    EventOut,
    Internal,
    Exposed,
}

impl FieldKind {
    fn bits(self) -> u16 {
        match self {
            FieldKind::Ordinary => 0,
            FieldKind::EventIn => 1,
            FieldKind::EventOut => 2,
            FieldKind::Internal => 3,
            FieldKind::Exposed => 4,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits {
            1 => FieldKind::EventIn,
            2 => FieldKind::EventOut,
            3 => FieldKind::Internal,
            4 => FieldKind::Exposed,
            _ => FieldKind::Ordinary,
        }
    }
}

/// The status word of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusFlags(u16);

impl StatusFlags {
    pub const KIND_MASK: u16 = 0x0007;
    pub const DEFAULT: u16 = 0x0008;
    pub const IGNORED: u16 = 0x0010;
    pub const EXTENDED_STORAGE: u16 = 0x0020;
    pub const CONNECTIONS_ENABLED: u16 = 0x0040;
    pub const NEEDS_EVALUATION: u16 = 0x0080;
    pub const READ_ONLY: u16 = 0x0100;
    pub const NOTIFY_ENABLED: u16 = 0x0200;
    pub const DESTRUCTING: u16 = 0x0400;
    pub const EVALUATING: u16 = 0x0800;
    pub const NOTIFIED: u16 = 0x1000;

    /// Fresh fields notify, hold their default value and accept connections.
    pub fn new() -> Self {
        Self(Self::NOTIFY_ENABLED | Self::DEFAULT | Self::CONNECTIONS_ENABLED)
    }

    pub fn get(self, bits: u16) -> bool {
        self.0 & bits != 0
    }

    pub fn set(&mut self, bits: u16) {
        self.0 |= bits;
    }

    pub fn clear(&mut self, bits: u16) {
        self.0 &= !bits;
    }

    /// Set or clear `bits`; returns true if the word actually changed.
    pub fn change(&mut self, bits: u16, on: bool) -> bool {
        let old = self.0;
        if on { self.0 |= bits } else { self.0 &= !bits }
        old != self.0
    }

    pub fn kind(self) -> FieldKind {
        FieldKind::from_bits(self.0 & Self::KIND_MASK)
    }

    pub fn set_kind(&mut self, kind: FieldKind) {
        self.0 = (self.0 & !Self::KIND_MASK) | kind.bits();
    }

    pub fn raw(self) -> u16 {
        self.0
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_flags() {
        let f = StatusFlags::new();
        assert!(f.get(StatusFlags::DEFAULT));
        assert!(f.get(StatusFlags::NOTIFY_ENABLED));
        assert!(f.get(StatusFlags::CONNECTIONS_ENABLED));
        assert!(!f.get(StatusFlags::NEEDS_EVALUATION));
        assert_eq!(f.kind(), FieldKind::Ordinary);
    }

    #[test]
    fn test_change_reports_transitions() {
        let mut f = StatusFlags::new();
        assert!(f.change(StatusFlags::IGNORED, true));
        assert!(!f.change(StatusFlags::IGNORED, true));
        assert!(f.change(StatusFlags::IGNORED, false));
    }

    #[test]
    fn test_kind_does_not_clobber_flags() {
        let mut f = StatusFlags::new();
        f.set(StatusFlags::IGNORED);
        f.set_kind(FieldKind::Exposed);
        assert_eq!(f.kind(), FieldKind::Exposed);
        assert!(f.get(StatusFlags::IGNORED));
        f.set_kind(FieldKind::EventIn);
        assert_eq!(f.kind(), FieldKind::EventIn);
        assert!(f.get(StatusFlags::DEFAULT));
    }
}
