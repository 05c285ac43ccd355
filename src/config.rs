//! Graph-wide tuning knobs.

use serde::Deserialize;

use crate::{Error, Result};

/// Configuration for a [`FieldGraph`](crate::FieldGraph).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Initial capacity of the per-thread `get_string` buffer.
    pub scratch_start_size: usize,
    /// Once the buffer has grown to this size it is released after use.
    pub scratch_max_size: usize,
    /// Spaces per indentation level in ASCII output.
    pub indent_width: usize,
    /// Log unknown bits in binary field flag words.
    pub warn_unknown_flags: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            scratch_start_size: 32,
            scratch_max_size: 1024,
            indent_width: 2,
            warn_unknown_flags: true,
        }
    }
}

impl GraphConfig {
    /// Parse from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.scratch_start_size > config.scratch_max_size {
            return Err(Error::Config(format!(
                "scratch_start_size {} exceeds scratch_max_size {}",
                config.scratch_start_size, config.scratch_max_size
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = GraphConfig::default();
        assert_eq!(c.scratch_start_size, 32);
        assert_eq!(c.scratch_max_size, 1024);
        assert_eq!(c.indent_width, 2);
        assert!(c.warn_unknown_flags);
    }

    #[test]
    fn test_partial_json() {
        let c = GraphConfig::from_json(r#"{ "indent_width": 4 }"#).unwrap();
        assert_eq!(c.indent_width, 4);
        assert_eq!(c.scratch_max_size, 1024);
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(GraphConfig::from_json("{"), Err(Error::Json(_))));
        assert!(matches!(
            GraphConfig::from_json(r#"{ "scratch_start_size": 2048 }"#),
            Err(Error::Config(_))
        ));
    }
}
