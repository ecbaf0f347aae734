//! Translate a read request: filters, ordering, search, field selection and
//! aggregates, assembled with the base query and the permission predicate.

pub mod aggregates;
pub mod fields;
pub mod filtering;
pub mod root;
pub mod search;
pub mod sorting;
pub mod values;

pub use root::{
    Assembler, BaseQueryProvider, CustomQueryset, DefaultBaseQuery, EngineSettings, FieldAccess,
    PermissionProvider, Plan, ReadMode,
};
