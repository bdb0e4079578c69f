//! References between entities.
//!
//! A field typed [`Ref<T>`] points at another entity. The entity itself is stored in
//! its own collection and only its identity is written into the referring document.
//! Eager references are loaded while the referring record is deserialized; lazy ones
//! hold a [`LazyProxy`] that loads on first access.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Record)]
//! pub struct Order {
//!     #[record(id)]
//!     pub id: Option<String>,
//!     #[record(reference(lazy))]
//!     pub customer: Option<Ref<Customer>>,
//! }
//!
//! let order: Order = mapper.deserialize(&document)?;
//! let customer = order.customer.as_ref().map(Ref::id);      // no fetch
//! let name = order.customer.unwrap().with(|c| c.name.clone())?; // fetches once
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, Weak};

use bson::Bson;
use tracing::debug;

use crate::backend::ReferenceResolver;
use crate::error::{MappingError, MappingResult};
use crate::record::{Record, RecordHandle, RecordType, TypeKey};
use crate::value::{FieldValue, Value, ValueType};

/// A deferred load of a referenced record.
///
/// Identity, target type and collection are available without loading. The first
/// successful [`LazyProxy::resolve`] is memoized; a vetoed or missing target is
/// memoized as `None`. Failures are not memoized, so a later call retries.
pub struct LazyProxy {
    target: RecordHandle,
    id: Bson,
    collection: Option<String>,
    resolver: Weak<dyn ReferenceResolver>,
    resolved: OnceLock<Option<Arc<dyn Record>>>,
}

impl LazyProxy {
    pub fn new(
        target: RecordHandle,
        id: Bson,
        collection: Option<String>,
        resolver: Weak<dyn ReferenceResolver>,
    ) -> Self {
        Self {
            target,
            id,
            collection,
            resolver,
            resolved: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &Bson {
        &self.id
    }

    pub fn target_type(&self) -> RecordHandle {
        self.target
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Loads the target, or returns the memoized result of an earlier load.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::NoReferenceResolver`] once the resolver has been dropped,
    /// and any non-veto error the resolver reports.
    pub fn resolve(&self) -> MappingResult<Option<Arc<dyn Record>>> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.clone());
        }

        let resolver = self
            .resolver
            .upgrade()
            .ok_or(MappingError::NoReferenceResolver)?;
        debug!(target_type = %self.target.key(), id = %self.id, "resolving lazy reference");

        let fetched: Option<Arc<dyn Record>> = match resolver.fetch_by_id(self.target, &self.id, self.collection()) {
            Ok(record) => record.map(Arc::from),
            Err(error) if error.is_veto() => {
                debug!(%error, "lazy reference vetoed");
                None
            }
            Err(error) => return Err(error),
        };

        // A concurrent resolution may have won; either result is equivalent.
        let _ = self.resolved.set(fetched);
        Ok(self.resolved.get().cloned().flatten())
    }
}

impl fmt::Debug for LazyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProxy")
            .field("target", &self.target.key())
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A reference in its type-erased form.
#[derive(Debug, Clone)]
pub enum RefTarget {
    Resolved(Arc<dyn Record>),
    Lazy(Arc<LazyProxy>),
}

/// A typed reference to another entity.
#[derive(Debug, Clone)]
pub enum Ref<T: RecordType> {
    /// The target is held in memory.
    Value(Arc<T>),
    /// The target loads on first access.
    Lazy(LazyRef<T>),
}

impl<T: RecordType> Ref<T> {
    pub fn new(value: T) -> Self {
        Ref::Value(Arc::new(value))
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            Ref::Value(_) => true,
            Ref::Lazy(lazy) => lazy.is_resolved(),
        }
    }

    pub fn target_type(&self) -> RecordHandle {
        match self {
            Ref::Value(_) => T::handle(),
            Ref::Lazy(lazy) => lazy.target_type(),
        }
    }

    /// The identity of the target, read without loading it.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory target's identity field cannot be read.
    pub fn id(&self) -> MappingResult<Option<Bson>> {
        match self {
            Ref::Lazy(lazy) => Ok(Some(lazy.id().clone())),
            Ref::Value(value) => {
                let Some(name) = T::declaration().identity_field_name() else {
                    return Ok(None);
                };
                match value.read_field(name)? {
                    Value::Scalar(Bson::Null) | Value::Null => Ok(None),
                    Value::Scalar(id) => Ok(Some(id)),
                    other => Err(MappingError::coercion("scalar identity", other.kind())),
                }
            }
        }
    }

    /// Returns the target, loading it if this is an unresolved lazy reference.
    pub fn fetch(&self) -> MappingResult<Option<Arc<T>>> {
        match self {
            Ref::Value(value) => Ok(Some(Arc::clone(value))),
            Ref::Lazy(lazy) => lazy.fetch(),
        }
    }

    /// Runs `f` against the target, loading it first if needed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> MappingResult<Option<R>> {
        Ok(self.fetch()?.map(|target| f(&target)))
    }

    pub fn as_lazy(&self) -> Option<&LazyRef<T>> {
        match self {
            Ref::Lazy(lazy) => Some(lazy),
            Ref::Value(_) => None,
        }
    }
}

impl<T: RecordType> From<T> for Ref<T> {
    fn from(value: T) -> Self {
        Ref::new(value)
    }
}

/// The typed view of a [`LazyProxy`].
pub struct LazyRef<T> {
    proxy: Arc<LazyProxy>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RecordType> LazyRef<T> {
    pub fn new(proxy: Arc<LazyProxy>) -> Self {
        Self {
            proxy,
            _marker: PhantomData,
        }
    }

    pub fn proxy(&self) -> &Arc<LazyProxy> {
        &self.proxy
    }

    pub fn id(&self) -> &Bson {
        self.proxy.id()
    }

    pub fn collection(&self) -> Option<&str> {
        self.proxy.collection()
    }

    pub fn target_type(&self) -> RecordHandle {
        self.proxy.target_type()
    }

    pub fn is_resolved(&self) -> bool {
        self.proxy.is_resolved()
    }

    pub fn fetch(&self) -> MappingResult<Option<Arc<T>>> {
        let Some(record) = self.proxy.resolve()? else {
            return Ok(None);
        };
        let actual = record.record_type().key();
        record
            .downcast_arc::<T>()
            .map(Some)
            .ok_or_else(|| MappingError::coercion(TypeKey::of::<T>(), actual))
    }
}

impl<T> Clone for LazyRef<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: Arc::clone(&self.proxy),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for LazyRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LazyRef").field(&self.proxy).finish()
    }
}

impl<T: RecordType> FieldValue for Ref<T> {
    fn value_type() -> ValueType {
        ValueType::Reference(T::handle())
    }

    fn to_value(&self) -> Value {
        Value::Reference(match self {
            Ref::Value(value) => RefTarget::Resolved(Arc::clone(value) as Arc<dyn Record>),
            Ref::Lazy(lazy) => RefTarget::Lazy(Arc::clone(&lazy.proxy)),
        })
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Reference(RefTarget::Resolved(record)) => {
                let actual = record.record_type().key();
                record
                    .downcast_arc::<T>()
                    .map(Ref::Value)
                    .ok_or_else(|| MappingError::coercion(TypeKey::of::<T>(), actual))
            }
            Value::Reference(RefTarget::Lazy(proxy)) => Ok(Ref::Lazy(LazyRef::new(proxy))),
            other @ Value::Record(_) => other.into_record::<T>().map(Ref::new),
            other => Err(MappingError::coercion(Self::value_type(), other.kind())),
        }
    }
}
