//! Types and helpers for the predicate representation of a query.

pub mod ast;
pub mod display;
pub mod helpers;
