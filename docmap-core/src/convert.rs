//! Custom type converters.
//!
//! Types declared with [`crate::custom_field_value!`] are stored through a
//! [`TypeConverter`] registered on the mapper. A custom value without a converter
//! fails with [`MappingError::MissingConverter`].

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use bson::Bson;

use crate::error::{MappingError, MappingResult};
use crate::record::TypeKey;
use crate::value::CustomValue;

/// Converts values of `T` to and from BSON.
pub trait TypeConverter<T>: Send + Sync {
    fn marshall(&self, value: &T) -> MappingResult<Bson>;

    fn unmarshall(&self, value: Bson) -> MappingResult<T>;
}

trait ErasedConverter: Send + Sync {
    fn marshall(&self, value: &CustomValue) -> MappingResult<Bson>;

    fn unmarshall(&self, value: Bson) -> MappingResult<CustomValue>;
}

struct Erased<T, C> {
    converter: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> ErasedConverter for Erased<T, C>
where
    T: Any + Send + Sync,
    C: TypeConverter<T>,
{
    fn marshall(&self, value: &CustomValue) -> MappingResult<Bson> {
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| MappingError::coercion(TypeKey::of::<T>(), value.key()))?;
        self.converter.marshall(value)
    }

    fn unmarshall(&self, value: Bson) -> MappingResult<CustomValue> {
        self.converter.unmarshall(value).map(CustomValue::new)
    }
}

/// Converters keyed by the Rust type they handle.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<TypeKey, Arc<dyn ErasedConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `converter` for `T`, replacing any earlier one.
    pub fn register<T, C>(&mut self, converter: C)
    where
        T: Any + Send + Sync,
        C: TypeConverter<T> + 'static,
    {
        self.converters.insert(
            TypeKey::of::<T>(),
            Arc::new(Erased {
                converter,
                _marker: PhantomData,
            }),
        );
    }

    /// Removes the converter for `T`, returning whether one was registered.
    pub fn deregister<T: Any>(&mut self) -> bool {
        self.converters.remove(&TypeKey::of::<T>()).is_some()
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.converters.contains_key(&key)
    }

    pub fn marshall(&self, value: &CustomValue) -> MappingResult<Bson> {
        self.converters
            .get(&value.key())
            .ok_or_else(|| MappingError::MissingConverter(value.key().name().to_string()))?
            .marshall(value)
    }

    pub fn unmarshall(&self, key: TypeKey, value: Bson) -> MappingResult<CustomValue> {
        self.converters
            .get(&key)
            .ok_or_else(|| MappingError::MissingConverter(key.name().to_string()))?
            .unmarshall(value)
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.converters.keys()).finish()
    }
}
