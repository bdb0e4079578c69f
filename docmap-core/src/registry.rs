//! The discriminator registry.
//!
//! Maps discriminator strings to record and enum types and back. It is filled when
//! types are described (or registered explicitly at startup) and consulted whenever a
//! document carries a `class_name`.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::enumeration::{EnumHandle, MappedEnum};
use crate::error::{MappingError, MappingResult};
use crate::record::{RecordHandle, RecordType, TypeKey};

/// A type registered under a discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Record(RecordHandle),
    Enum(EnumHandle),
}

impl Registered {
    pub fn key(&self) -> TypeKey {
        match self {
            Registered::Record(handle) => handle.key(),
            Registered::Enum(handle) => handle.key(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_discriminator: HashMap<String, Registered>,
    by_type: HashMap<TypeKey, String>,
}

/// Thread-safe two-way map between discriminators and types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `discriminator`.
    ///
    /// Registering the same type under the same discriminator again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::DuplicateDiscriminator`] if a different type already
    /// owns the discriminator.
    pub fn register(&self, discriminator: &str, entry: Registered) -> MappingResult<()> {
        if let Some(existing) = self.inner.read().by_discriminator.get(discriminator) {
            return check_same(discriminator, existing, &entry);
        }

        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_discriminator.get(discriminator) {
            return check_same(discriminator, existing, &entry);
        }
        trace!(discriminator, type_name = %entry.key(), "registering discriminator");
        inner
            .by_discriminator
            .insert(discriminator.to_string(), entry);
        inner.by_type.insert(entry.key(), discriminator.to_string());
        Ok(())
    }

    pub fn register_record<T: RecordType>(&self) -> MappingResult<()> {
        let discriminator = T::declaration().resolved_discriminator();
        self.register(&discriminator, Registered::Record(T::handle()))
    }

    pub fn register_enum<E: MappedEnum>(&self) -> MappingResult<()> {
        self.register_enum_handle(EnumHandle::of::<E>())
    }

    pub fn register_enum_handle(&self, handle: EnumHandle) -> MappingResult<()> {
        let discriminator = handle.declaration().resolved_discriminator();
        self.register(&discriminator, Registered::Enum(handle))
    }

    pub fn discriminator_for(&self, key: TypeKey) -> Option<String> {
        self.inner.read().by_type.get(&key).cloned()
    }

    pub fn type_for(&self, discriminator: &str) -> Option<Registered> {
        self.inner.read().by_discriminator.get(discriminator).copied()
    }

    /// Like [`TypeRegistry::type_for`], but an unknown discriminator is an error.
    pub fn resolve(&self, discriminator: &str) -> MappingResult<Registered> {
        self.type_for(discriminator)
            .ok_or_else(|| MappingError::UnknownDiscriminator(discriminator.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_discriminator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_discriminator.clear();
        inner.by_type.clear();
    }
}

fn check_same(discriminator: &str, existing: &Registered, entry: &Registered) -> MappingResult<()> {
    if existing.key() == entry.key() {
        Ok(())
    } else {
        Err(MappingError::DuplicateDiscriminator {
            discriminator: discriminator.to_string(),
            existing: existing.key().name().to_string(),
        })
    }
}
