//! Execute assembled queries against a storage provider and serialize the
//! results into the response payload.

pub mod error;
pub mod in_memory;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod serialize;

pub use error::{Error, RequestError};
pub use in_memory::InMemoryStore;
pub use pipeline::{process_request, Response};
pub use provider::StorageProvider;
pub use record::Record;
pub use serialize::ResponsePayload;
