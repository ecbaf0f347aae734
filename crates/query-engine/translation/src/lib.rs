//! Translate client requests into authorized, provider-neutral queries.

pub mod ast;
pub mod request;
pub mod translation;
