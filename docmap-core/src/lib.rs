//! Object-document mapping between typed records and schema-less BSON documents.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Records** ([`record`]) - The object-safe record trait and type declarations
//! - **Values** ([`value`]) - The field value model and the [`value::FieldValue`] conversions
//! - **Metadata** ([`metadata`]) - Validated, cached type descriptors and field lookups
//! - **Discriminators** ([`registry`]) - The two-way discriminator registry
//! - **Mapping** ([`mapper`]) - Record to document conversion and back
//! - **References** ([`reference`]) - Eager and lazy references between entities
//! - **Collaborators** ([`backend`]) - Reference resolution and field encryption seams
//! - **Converters** ([`convert`]) - Custom type converters
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Record)]
//! pub struct User {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     pub display_name: String,
//! }
//!
//! let mapper = DocumentMapper::default();
//! let document = mapper.serialize(&user)?;     // { "display_name": ... }
//! let user: User = mapper.deserialize(&document)?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod backend;
pub mod convert;
pub mod document;
pub mod enumeration;
pub mod error;
pub mod mapper;
pub mod metadata;
pub mod naming;
pub mod record;
pub mod reference;
pub mod registry;
pub mod value;

mod coerce;
mod deserialize;
mod serialize;

pub use bson;
pub use indexmap;
