//! Metadata about the registered entities: their fields, relations and allow-lists,
//! the immutable registry snapshot built at startup, and the relation graph used to
//! validate and bound relation traversal.

pub mod metadata;
