//! Store - the backend contract the object model federates over.
//!
//! The engine binds each [`ObjectType`](crate::ObjectType) to exactly one
//! [`Store`]; a store may serve several types. Concrete, schema-specific
//! backends live with the application. [`InMemoryStore`] is provided for
//! testing and development.

mod error;
mod in_memory;
mod traits;

pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use traits::Store;
