//! Metadata information regarding the registered entities and their relations.

pub mod database;
pub mod entities;
pub mod error;
pub mod graph;
pub mod registry;

// re-export without modules
pub use database::*;
pub use entities::*;
pub use error::Error;
pub use graph::{FieldNode, Node, RelationGraph};
pub use registry::{Registry, Relation};
