//! Main docmap crate providing object-document mapping for typed records.
//!
//! This crate is the primary entry point for users of the docmap framework.
//! It re-exports the core types, the derive macros and the in-memory store.
//!
//! # Features
//!
//! - **Derived mappings** - `#[derive(Record)]` and `#[derive(MappedEnum)]` describe your types
//! - **Polymorphism** - Discriminators select the concrete type of stored documents
//! - **References** - Eager, lazy and auto-stored references between entities
//! - **Schema tolerance** - Aliases, lossless coercion and capture of unknown keys
//! - **Field encryption** and **custom type converters** through pluggable collaborators
//!
//! # Quick Start
//!
//! The derives expand to paths under `docmap_core`, so depend on `docmap-core`
//! next to `docmap`.
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Clone, Default, Record)]
//! pub struct Customer {
//!     #[record(id)]
//!     pub id: Option<String>,
//!     pub display_name: String,
//! }
//!
//! #[derive(Debug, Clone, Default, Record)]
//! #[record(collection = "orders")]
//! pub struct Order {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     #[record(reference(lazy, auto_store))]
//!     pub customer: Option<Ref<Customer>>,
//!     pub total: f64,
//! }
//!
//! fn main() -> MappingResult<()> {
//!     let store = InMemoryStore::builder().build();
//!
//!     let mut order = Order {
//!         id: None,
//!         customer: Some(Ref::new(Customer { id: None, display_name: "Ada".into() })),
//!         total: 12.5,
//!     };
//!     // The customer is stored first and the order keeps only its identity.
//!     let id = store.insert(&mut order)?;
//!
//!     let loaded: Order = store.find_by_id(id)?.expect("stored");
//!     let name = loaded.customer.unwrap().with(|c| c.display_name.clone())?;
//!     assert_eq!(name.as_deref(), Some("Ada"));
//!     Ok(())
//! }
//! ```
//!
//! # Without a store
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let mapper = DocumentMapper::default();
//! let document = mapper.serialize(&customer)?;   // { "display_name": "Ada" }
//! let json = document.to_json()?;
//! let customer: Customer = mapper.deserialize(&Document::from_json(json)?)?;
//! ```

pub mod prelude;

pub use docmap_core::{
    backend, convert, custom_field_value, document, enumeration, error, mapper, metadata, naming,
    record, reference, registry, value,
};
pub use docmap_macros::{MappedEnum, Record};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage.
pub mod memory {
    pub use docmap_memory::{InMemoryStore, InMemoryStoreBuilder};
}
