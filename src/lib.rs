//! # fieldgraph: typed, observable field graphs
//!
//! The field engine of a retained-mode scene graph: typed property slots
//! ("fields") owned by nodes and engines, wired into a live dataflow
//! graph with push notification and pull evaluation.
//!
//! ## Design Principles
//!
//! 1. **Arena, not pointers**: `FieldGraph` owns every field, container,
//!    output and sensor; everything else holds ids
//! 2. **Both ends or neither**: connections are recorded on master and
//!    slave, changed only by the connect/disconnect routines
//! 3. **Compact until connected**: a field carries its owner only, until
//!    the first connection or auditor allocates extended storage
//! 4. **Two guard disciplines**: notification cycles are cut silently,
//!    re-entrant evaluation is a bug
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldgraph::{FieldGraph, FieldType};
//!
//! # fn example() -> fieldgraph::Result<()> {
//! let mut graph = FieldGraph::new();
//! let master = graph.create_field(FieldType::SFFloat);
//! let slave = graph.create_field(FieldType::SFFloat);
//!
//! graph.set_string(master, "3.5")?;
//! graph.connect_from(slave, master, false, false)?;
//! assert_eq!(graph.get_string(slave)?, "3.5");
//!
//! graph.set_string(master, "7.0")?;
//! assert_eq!(graph.get_string(slave)?, "7.0");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | `model` | ids, field types, values, status bits, type registry |
//! | `io` | ASCII/binary reader and writer, value codec |
//! | `graph` | the engine: connections, notify, evaluate, persistence |
//! | `config` | `GraphConfig` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod io;
pub mod graph;
pub mod config;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    FieldId, ContainerId, OutputId, SensorId, Endpoint,
    FieldType, FieldClass, FieldValue, StatusFlags, FieldKind,
    TypeRegistry, Conversion,
};

// ============================================================================
// Re-exports: Graph
// ============================================================================

pub use graph::{
    FieldGraph, Field, Auditor,
    Container, ContainerFlavor, ContainerTemplate, Engine, Output,
    DataSensor, SensorEvent, SensorTarget,
    NotifyList, NotifyRecord, NotifyKind,
};

// ============================================================================
// Re-exports: I/O and configuration
// ============================================================================

pub use io::{FieldInput, FieldOutput, Stage};
pub use config::GraphConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No converter from {from} to {to}")]
    NoConverter { from: String, to: String },

    #[error("Type error: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Semantic error: {0}")]
    Semantic(String),

    #[error("Read error at line {line}: {message}")]
    Read { line: usize, message: String },

    #[error("Write error: {0}")]
    Write(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Obsolete call: {0}")]
    Obsolete(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
