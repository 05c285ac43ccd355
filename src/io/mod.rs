//! # Stream collaborators
//!
//! Concrete reader/writer used by field persistence, plus the per-type
//! value codec. The field layer only ever talks to these through the
//! methods here, so another encoding can be swapped in behind them.

pub mod input;
pub mod output;
pub mod codec;

pub use input::{FieldInput, IsReference};
pub use output::{FieldOutput, Stage};
pub use codec::{read_value, write_value, format_value};
