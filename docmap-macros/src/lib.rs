//! Procedural macros for the docmap project.
//!
//! Generated code refers to `::docmap_core`, so crates using the derives depend on
//! `docmap-core` (directly or next to the `docmap` facade).

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod enumeration;
mod record;

/// Derive macro for record types.
///
/// Implements `Record`, `RecordType` and `FieldValue` for a struct with named fields.
/// The struct must also implement `Debug`, `Clone` and `Default`.
///
/// # Example
///
/// ```ignore
/// use docmap::prelude::*;
///
/// #[derive(Debug, Clone, Default, Record)]
/// #[record(collection = "orders", polymorphic)]
/// pub struct Order {
///     #[record(id)]
///     pub id: Option<ObjectId>,
///     #[record(alias = "customerName")]
///     pub customer_name: String,
///     #[record(reference(lazy))]
///     pub customer: Option<Ref<Customer>>,
///     #[record(additional_data)]
///     pub extra: IndexMap<String, Value>,
/// }
/// ```
///
/// # Type attributes
///
/// - `#[record(embedded)]` - Stored only inside other records
/// - `#[record(collection = "name")]` - Collection name (default: snake_case type name)
/// - `#[record(discriminator = "name")]` - Discriminator (default: module path and type name)
/// - `#[record(polymorphic)]` - Always store the discriminator
/// - `#[record(translate_names = false)]` - Keep field names as written
///
/// # Field attributes
///
/// - `#[record(id)]` - The identity field, stored as `_id`
/// - `#[record(reference)]`, `#[record(reference(lazy, auto_store, name = "key"))]` -
///   Eager list, set and map references skip elements whose target is missing or
///   vetoed, so the loaded collection can be shorter than the stored one
/// - `#[record(alias = "key")]` - Extra key accepted on read (repeatable)
/// - `#[record(version)]`, `#[record(version(name = "key"))]`
/// - `#[record(additional_data)]`, `#[record(additional_data(read_only))]`
/// - `#[record(read_only)]`, `#[record(use_if_null)]`, `#[record(transient)]`
/// - `#[record(encrypted)]`, `#[record(encrypted(key = "name"))]`
/// - `#[record(rename = "key")]`, `#[record(translate = false)]`
/// - `#[record(flatten)]` - Inherit the fields of another record type
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive macro for unit-only enums stored by variant name.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, MappedEnum)]
/// #[record(discriminator = "Priority")]
/// pub enum Priority {
///     Low,
///     #[record(rename = "HIGH")]
///     High,
/// }
/// ```
#[proc_macro_derive(MappedEnum, attributes(record))]
pub fn derive_mapped_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    enumeration::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
