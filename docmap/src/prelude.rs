//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The record traits and their derive macros
//! - The mapper, its builder and the metadata resolver
//! - References, values and collaborator traits
//! - Error types

pub use docmap_core::{
    backend::{ReferenceResolver, ValueEncryption},
    convert::{ConverterRegistry, TypeConverter},
    custom_field_value,
    document::{DISCRIMINATOR_KEY, DocumentJson, ID_KEY, ReferenceValue},
    enumeration::MappedEnum,
    error::{MappingError, MappingResult},
    mapper::{DocumentMapper, DocumentMapperBuilder},
    metadata::{FieldDescriptor, FieldMatch, Metadata, TypeDescriptor},
    record::{DirectiveKind, Record, RecordHandle, RecordType},
    reference::{LazyRef, Ref},
    value::{FieldValue, Value, ValueType},
};
pub use docmap_macros::{MappedEnum, Record};

pub use bson::{Bson, Document, doc, oid::ObjectId};
pub use docmap_core::indexmap::IndexMap;
