//! Collaborator traits implemented by the storage layer.
//!
//! The mapper never talks to a database itself. Loading and storing referenced
//! entities goes through a [`ReferenceResolver`], and field encryption goes through
//! a [`ValueEncryption`] provider. Both are handed to the mapper through
//! [`crate::mapper::DocumentMapperBuilder`].
//!
//! # Examples
//!
//! ```ignore
//! use docmap::backend::ReferenceResolver;
//!
//! let store = InMemoryStore::new(DocumentMapper::builder());
//! // The store hands itself to its own mapper as the resolver.
//! let order: Order = store.find_by_id("o1")?.expect("stored");
//! ```

use std::fmt::Debug;

use bson::Bson;

use crate::error::MappingResult;
use crate::record::{Record, RecordHandle};

/// Loads and stores referenced entities on behalf of the mapper.
///
/// # Thread Safety
///
/// Implementations are shared between lazy references living on different threads
/// and must be `Send + Sync`.
///
/// # Error Handling
///
/// An access-policy refusal must be reported as
/// [`crate::error::MappingError::AccessVetoed`]; the mapper absorbs it and leaves the
/// reference unresolved. Every other error propagates to the caller.
pub trait ReferenceResolver: Send + Sync {
    /// Loads the record of type `target` with the given identity.
    ///
    /// # Arguments
    ///
    /// * `target` - The declared or discriminated type of the referenced record
    /// * `id` - The identity, already coerced to the target's identity type
    /// * `collection` - The collection recorded with the reference, if any
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when no such record exists.
    fn fetch_by_id(
        &self,
        target: RecordHandle,
        id: &Bson,
        collection: Option<&str>,
    ) -> MappingResult<Option<Box<dyn Record>>>;

    /// Stores a record that does not have an identity yet and returns the assigned identity.
    fn store_if_absent(&self, record: &dyn Record) -> MappingResult<Bson>;
}

/// Encrypts and decrypts field values.
///
/// The mapper hands over the field's plaintext (the UTF-8 string for string fields,
/// the JSON rendering of the encoded value otherwise) and stores the ciphertext as
/// generic binary.
pub trait ValueEncryption: Send + Sync + Debug {
    fn encrypt(&self, key_name: &str, plaintext: &[u8]) -> MappingResult<Vec<u8>>;

    fn decrypt(&self, key_name: &str, ciphertext: &[u8]) -> MappingResult<Vec<u8>>;
}
