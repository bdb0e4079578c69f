//! Enumerated values stored by variant name.
//!
//! A field whose declared type is exactly the enum stores the bare variant name.
//! Anywhere the type is not known from the declaration (heterogeneous lists, maps,
//! `Value` fields) the enum is written as `{ "class_name": ..., "name": ... }`.

use std::fmt;

use crate::error::{MappingError, MappingResult};
use crate::record::TypeKey;
use crate::value::FieldValue;

/// The declared shape of an enum type.
#[derive(Debug, Clone)]
pub struct EnumDeclaration {
    key: TypeKey,
    name: &'static str,
    discriminator: Option<&'static str>,
    variants: &'static [&'static str],
}

impl EnumDeclaration {
    pub fn new<E: MappedEnum>(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self {
            key: TypeKey::of::<E>(),
            name,
            discriminator: None,
            variants,
        }
    }

    pub fn discriminator(mut self, discriminator: &'static str) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn resolved_discriminator(&self) -> String {
        self.discriminator
            .map(str::to_string)
            .unwrap_or_else(|| self.key.name().to_string())
    }

    pub fn variants(&self) -> &'static [&'static str] {
        self.variants
    }

    fn variant(&self, name: &str) -> Option<&'static str> {
        self.variants.iter().copied().find(|variant| *variant == name)
    }
}

/// A unit-only enum the mapper stores by variant name.
///
/// Usually derived with `#[derive(MappedEnum)]`.
pub trait MappedEnum: FieldValue + Send + Sync + Sized + 'static {
    fn declaration() -> EnumDeclaration;

    /// The stored name of this variant.
    fn name(&self) -> &'static str;

    fn from_name(name: &str) -> Option<Self>;
}

/// A lazily evaluated pointer to an enum declaration.
#[derive(Clone, Copy)]
pub struct EnumHandle {
    key: TypeKey,
    declare: fn() -> EnumDeclaration,
}

impl EnumHandle {
    pub fn of<E: MappedEnum>() -> Self {
        Self {
            key: TypeKey::of::<E>(),
            declare: E::declaration,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn declaration(&self) -> EnumDeclaration {
        (self.declare)()
    }
}

impl PartialEq for EnumHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for EnumHandle {}

impl fmt::Debug for EnumHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumHandle({})", self.key.name())
    }
}

/// A type-erased enum variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    handle: EnumHandle,
    name: &'static str,
}

impl EnumValue {
    pub fn of<E: MappedEnum>(value: &E) -> Self {
        Self {
            handle: EnumHandle::of::<E>(),
            name: value.name(),
        }
    }

    /// Looks up a variant of the enum behind `handle` by its stored name.
    ///
    /// # Errors
    ///
    /// Returns a coercion error when the enum has no variant with that name.
    pub fn parse(handle: EnumHandle, name: &str) -> MappingResult<Self> {
        let declaration = handle.declaration();
        let variant = declaration
            .variant(name)
            .ok_or_else(|| MappingError::coercion(declaration.name(), format!("variant {name}")))?;
        Ok(Self {
            handle,
            name: variant,
        })
    }

    pub fn handle(&self) -> EnumHandle {
        self.handle
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn discriminator(&self) -> String {
        self.handle.declaration().resolved_discriminator()
    }

    /// Rebuilds the concrete enum value.
    ///
    /// # Errors
    ///
    /// Returns a coercion error if the value belongs to a different enum.
    pub fn to_enum<E: MappedEnum>(&self) -> MappingResult<E> {
        if self.handle.key() != TypeKey::of::<E>() {
            return Err(MappingError::coercion(
                TypeKey::of::<E>(),
                self.handle.key(),
            ));
        }
        E::from_name(self.name)
            .ok_or_else(|| MappingError::coercion(TypeKey::of::<E>(), format!("variant {}", self.name)))
    }
}
