//! Provider-neutral query structures produced by translation and consumed by
//! storage providers: predicates grouped into filter passes, ordering, limits,
//! field selections and write operations.

pub mod predicate;
