//! Record types and their declarations.
//!
//! A record is an application value with named fields that the mapper can read and
//! write generically through the object-safe [`Record`] trait. Its shape (fields,
//! directives, supertypes) is described by a [`TypeDeclaration`], which the
//! metadata resolver turns into a cached descriptor.
//!
//! Most types derive both traits:
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Record)]
//! #[record(collection = "orders")]
//! pub struct Order {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     pub customer_name: String,
//!     #[record(reference(lazy))]
//!     pub customer: Option<Ref<Customer>>,
//! }
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::MappingResult;
use crate::value::{FieldValue, Value, ValueType};

/// Identity of a Rust type, comparable and hashable, that remembers its name.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, as reported by [`std::any::type_name`].
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A lazily evaluated pointer to a record type's declaration.
///
/// Declarations refer to other record types (nested records, references,
/// supertypes) through handles so that self-referencing types can be declared.
#[derive(Clone, Copy)]
pub struct RecordHandle {
    key: TypeKey,
    declare: fn() -> TypeDeclaration,
}

impl RecordHandle {
    pub fn of<T: RecordType>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            declare: T::declaration,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn declaration(&self) -> TypeDeclaration {
        (self.declare)()
    }
}

impl PartialEq for RecordHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RecordHandle {}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordHandle({})", self.key.name)
    }
}

/// Object-safe access to the fields of a record.
///
/// Field names are the internal (in-memory) names. The derive macro implements this
/// trait together with [`RecordType`] and [`FieldValue`].
pub trait Record: Any + Send + Sync + fmt::Debug {
    /// Returns the handle of this record's concrete type.
    fn record_type(&self) -> RecordHandle;

    /// Returns `true` if the record, or a flattened supertype, has a field with this name.
    fn has_field(&self, name: &str) -> bool;

    /// Reads a field as a [`Value`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::MappingError::FieldNotFound`] for an undeclared name.
    fn read_field(&self, name: &str) -> MappingResult<Value>;

    /// Assigns a field from a [`Value`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::MappingError::FieldNotFound`] for an undeclared name and
    /// [`crate::error::MappingError::Coercion`] when the value does not fit the field.
    fn write_field(&mut self, name: &str, value: Value) -> MappingResult<()>;

    /// Clones the record into a new boxed `Record`.
    fn clone_record(&self) -> Box<dyn Record>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl dyn Record {
    /// Attempts to downcast a reference to a specific record type.
    pub fn downcast_ref<T: RecordType>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: RecordType>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Takes ownership of the concrete record, handing the box back on a type mismatch.
    pub fn downcast<T: RecordType>(self: Box<Self>) -> Result<Box<T>, Box<dyn Record>> {
        if self.as_any().is::<T>() {
            match self.into_any().downcast::<T>() {
                Ok(record) => Ok(record),
                Err(_) => unreachable!("type checked before downcast"),
            }
        } else {
            Err(self)
        }
    }

    pub fn downcast_arc<T: RecordType>(self: Arc<Self>) -> Option<Arc<T>> {
        self.into_any_arc().downcast::<T>().ok()
    }
}

impl Clone for Box<dyn Record> {
    fn clone(&self) -> Box<dyn Record> {
        self.clone_record()
    }
}

/// A concrete record type with a static declaration.
pub trait RecordType: Record + FieldValue + Default + Clone + Sized {
    /// Describes the fields, directives and supertypes of this type.
    fn declaration() -> TypeDeclaration;

    fn handle() -> RecordHandle {
        RecordHandle::of::<Self>()
    }
}

/// Whether a record is stored in its own collection or only inside other records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordKind {
    #[default]
    Entity,
    Embedded,
}

fn instantiate<T: RecordType>() -> Box<dyn Record> {
    Box::new(T::default())
}

/// The declared shape of a record type.
///
/// # Example
///
/// ```ignore
/// impl RecordType for Address {
///     fn declaration() -> TypeDeclaration {
///         TypeDeclaration::new::<Self>("Address")
///             .embedded()
///             .field(FieldDeclaration::of::<String>("street"))
///             .field(FieldDeclaration::of::<String>("zipCode").alias("zip"))
///     }
/// }
/// ```
#[derive(Clone)]
pub struct TypeDeclaration {
    key: TypeKey,
    name: &'static str,
    kind: RecordKind,
    collection: Option<String>,
    discriminator: Option<String>,
    polymorphic: bool,
    translate_names: bool,
    fields: Vec<FieldDeclaration>,
    supertypes: Vec<RecordHandle>,
    instantiate: fn() -> Box<dyn Record>,
}

impl TypeDeclaration {
    /// Starts the declaration of an entity type with the given short name.
    pub fn new<T: RecordType>(name: &'static str) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            name,
            kind: RecordKind::Entity,
            collection: None,
            discriminator: None,
            polymorphic: false,
            translate_names: true,
            fields: Vec::new(),
            supertypes: Vec::new(),
            instantiate: instantiate::<T>,
        }
    }

    pub fn embedded(mut self) -> Self {
        self.kind = RecordKind::Embedded;
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    pub fn translate_names(mut self, translate: bool) -> Self {
        self.translate_names = translate;
        self
    }

    pub fn field(mut self, field: FieldDeclaration) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a supertype whose fields this type inherits.
    ///
    /// The first supertype is the parent in the inheritance chain; later ones are
    /// walked after the whole chain, breadth-first.
    pub fn supertype(mut self, handle: RecordHandle) -> Self {
        self.supertypes.push(handle);
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// The explicit collection name, if one was declared.
    pub fn declared_collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// The discriminator: the declared one, or the fully qualified type name.
    pub fn resolved_discriminator(&self) -> String {
        self.discriminator
            .clone()
            .unwrap_or_else(|| self.key.name().to_string())
    }

    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    pub fn translates_names(&self) -> bool {
        self.translate_names
    }

    pub fn fields(&self) -> &[FieldDeclaration] {
        &self.fields
    }

    pub fn supertypes(&self) -> &[RecordHandle] {
        &self.supertypes
    }

    pub fn instantiate(&self) -> Box<dyn Record> {
        (self.instantiate)()
    }

    /// Finds the internal name of the identity field, searching supertypes too.
    pub fn identity_field_name(&self) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|field| field.directives.identity)
            .map(|field| field.name)
            .or_else(|| {
                self.supertypes
                    .iter()
                    .find_map(|handle| handle.declaration().identity_field_name())
            })
    }
}

impl fmt::Debug for TypeDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDeclaration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("collection", &self.collection)
            .field("discriminator", &self.discriminator)
            .field("polymorphic", &self.polymorphic)
            .field("fields", &self.fields)
            .field("supertypes", &self.supertypes)
            .finish()
    }
}

/// Settings of a field that points at another entity.
///
/// A single eager reference whose target is missing or vetoed is left unset. In a
/// list, set or map of eager references such elements are skipped, along with null
/// elements; the remaining elements keep their order and keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDirective {
    /// Defer loading until first access.
    pub lazy: bool,
    /// Store an unsaved target through the resolver during serialization.
    pub auto_store: bool,
    /// Overrides the stored key of the field.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDirective {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalDataDirective {
    /// Capture unknown keys on read but never write them back.
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedDirective {
    /// Key handed to the encryption provider; defaults to the type's discriminator.
    pub key_name: Option<String>,
}

/// Every directive a field can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directives {
    pub identity: bool,
    pub reference: Option<ReferenceDirective>,
    pub aliases: Vec<String>,
    pub version: Option<VersionDirective>,
    pub additional_data: Option<AdditionalDataDirective>,
    pub read_only: bool,
    pub use_if_null: bool,
    pub encrypted: Option<EncryptedDirective>,
    pub transient: bool,
    pub rename: Option<String>,
    pub translate: bool,
}

impl Default for Directives {
    fn default() -> Self {
        Self {
            identity: false,
            reference: None,
            aliases: Vec::new(),
            version: None,
            additional_data: None,
            read_only: false,
            use_if_null: false,
            encrypted: None,
            transient: false,
            rename: None,
            translate: true,
        }
    }
}

/// Directive kinds, used to select fields carrying a given directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Identity,
    Reference,
    Alias,
    Version,
    AdditionalData,
    ReadOnly,
    UseIfNull,
    Encrypted,
    Transient,
}

impl Directives {
    pub fn has(&self, kind: DirectiveKind) -> bool {
        match kind {
            DirectiveKind::Identity => self.identity,
            DirectiveKind::Reference => self.reference.is_some(),
            DirectiveKind::Alias => !self.aliases.is_empty(),
            DirectiveKind::Version => self.version.is_some(),
            DirectiveKind::AdditionalData => self.additional_data.is_some(),
            DirectiveKind::ReadOnly => self.read_only,
            DirectiveKind::UseIfNull => self.use_if_null,
            DirectiveKind::Encrypted => self.encrypted.is_some(),
            DirectiveKind::Transient => self.transient,
        }
    }
}

/// The declared shape of one field.
#[derive(Debug, Clone)]
pub struct FieldDeclaration {
    pub(crate) name: &'static str,
    pub(crate) value_type: ValueType,
    pub(crate) directives: Directives,
}

impl FieldDeclaration {
    pub fn new(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            directives: Directives::default(),
        }
    }

    /// Declares a field whose value type is taken from its Rust type.
    pub fn of<T: FieldValue>(name: &'static str) -> Self {
        Self::new(name, T::value_type())
    }

    pub fn identity(mut self) -> Self {
        self.directives.identity = true;
        self
    }

    pub fn reference(mut self, directive: ReferenceDirective) -> Self {
        self.directives.reference = Some(directive);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.directives.aliases.push(alias.into());
        self
    }

    pub fn version(mut self, name: Option<String>) -> Self {
        self.directives.version = Some(VersionDirective { name });
        self
    }

    pub fn additional_data(mut self, read_only: bool) -> Self {
        self.directives.additional_data = Some(AdditionalDataDirective { read_only });
        self
    }

    pub fn read_only(mut self) -> Self {
        self.directives.read_only = true;
        self
    }

    pub fn use_if_null(mut self) -> Self {
        self.directives.use_if_null = true;
        self
    }

    pub fn encrypted(mut self, key_name: Option<String>) -> Self {
        self.directives.encrypted = Some(EncryptedDirective { key_name });
        self
    }

    pub fn transient(mut self) -> Self {
        self.directives.transient = true;
        self
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.directives.rename = Some(name.into());
        self
    }

    pub fn translate(mut self, translate: bool) -> Self {
        self.directives.translate = translate;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn directives(&self) -> &Directives {
        &self.directives
    }
}
