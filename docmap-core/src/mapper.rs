//! The document mapper.
//!
//! [`DocumentMapper`] converts records to documents and back. It owns the converter
//! registry and the collaborators (reference resolver, encryption provider), and
//! shares a [`Metadata`] instance for descriptors and discriminators.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let mapper = DocumentMapper::builder()
//!     .metadata(Arc::new(Metadata::new()))
//!     .converter::<Money, _>(MoneyConverter)
//!     .build();
//!
//! let document = mapper.serialize(&order)?;
//! let restored: Order = mapper.deserialize(&document)?;
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::backend::{ReferenceResolver, ValueEncryption};
use crate::convert::{ConverterRegistry, TypeConverter};
use crate::error::{MappingError, MappingResult};
use crate::metadata::{FieldDescriptor, Metadata};
use crate::record::{RecordHandle, RecordType};

/// Converts records to documents and back.
pub struct DocumentMapper {
    pub(crate) metadata: Arc<Metadata>,
    pub(crate) converters: ConverterRegistry,
    pub(crate) resolver: Option<Weak<dyn ReferenceResolver>>,
    pub(crate) encryption: Option<Arc<dyn ValueEncryption>>,
}

impl DocumentMapper {
    /// Creates a mapper without collaborators over the given metadata.
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self {
            metadata,
            converters: ConverterRegistry::new(),
            resolver: None,
            encryption: None,
        }
    }

    pub fn builder() -> DocumentMapperBuilder {
        DocumentMapperBuilder::default()
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn register_converter<T, C>(&mut self, converter: C)
    where
        T: Any + Send + Sync,
        C: TypeConverter<T> + 'static,
    {
        self.converters.register::<T, C>(converter);
    }

    pub fn deregister_converter<T: Any>(&mut self) -> bool {
        self.converters.deregister::<T>()
    }

    /// Sets the resolver used for references. The mapper does not keep it alive.
    pub fn set_reference_resolver(&mut self, resolver: Weak<dyn ReferenceResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn set_encryption(&mut self, encryption: Arc<dyn ValueEncryption>) {
        self.encryption = Some(encryption);
    }

    /// The stored key of a field of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::FieldNotFound`] for unknown names.
    pub fn resolve_external_name<T: RecordType>(&self, field: &str) -> MappingResult<String> {
        self.metadata.resolve_external_name(T::handle(), field)
    }

    pub fn resolve_field(
        &self,
        handle: RecordHandle,
        name: &str,
    ) -> MappingResult<Option<FieldDescriptor>> {
        self.metadata.resolve_field(handle, name)
    }

    /// Drops every cached descriptor and registration of the shared metadata.
    pub fn clear_metadata_cache(&self) {
        self.metadata.clear();
    }

    pub(crate) fn resolver_handle(&self) -> MappingResult<Weak<dyn ReferenceResolver>> {
        self.resolver.clone().ok_or(MappingError::NoReferenceResolver)
    }

    pub(crate) fn reference_resolver(&self) -> MappingResult<Arc<dyn ReferenceResolver>> {
        self.resolver
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(MappingError::NoReferenceResolver)
    }

    pub(crate) fn value_encryption(&self) -> MappingResult<&Arc<dyn ValueEncryption>> {
        self.encryption
            .as_ref()
            .ok_or_else(|| MappingError::Encryption("no encryption provider configured".into()))
    }
}

impl Default for DocumentMapper {
    fn default() -> Self {
        Self::new(Metadata::global())
    }
}

impl fmt::Debug for DocumentMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentMapper")
            .field("converters", &self.converters)
            .field("resolver", &self.resolver.is_some())
            .field("encryption", &self.encryption)
            .finish()
    }
}

/// Builder for [`DocumentMapper`].
///
/// Without an explicit [`DocumentMapperBuilder::metadata`] the mapper uses
/// [`Metadata::global`].
#[derive(Default)]
pub struct DocumentMapperBuilder {
    metadata: Option<Arc<Metadata>>,
    converters: ConverterRegistry,
    resolver: Option<Weak<dyn ReferenceResolver>>,
    encryption: Option<Arc<dyn ValueEncryption>>,
}

impl DocumentMapperBuilder {
    pub fn metadata(mut self, metadata: Arc<Metadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn reference_resolver(mut self, resolver: Weak<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn encryption(mut self, encryption: Arc<dyn ValueEncryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn converter<T, C>(mut self, converter: C) -> Self
    where
        T: Any + Send + Sync,
        C: TypeConverter<T> + 'static,
    {
        self.converters.register::<T, C>(converter);
        self
    }

    pub fn build(self) -> DocumentMapper {
        DocumentMapper {
            metadata: self.metadata.unwrap_or_else(Metadata::global),
            converters: self.converters,
            resolver: self.resolver,
            encryption: self.encryption,
        }
    }
}
