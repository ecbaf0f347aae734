//! Translate the incoming QueryRequest to a Plan to be run by a storage provider.

pub mod describe;
pub mod error;
pub mod helpers;
pub mod mutation;
pub mod query;
