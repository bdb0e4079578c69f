//! The metadata resolver.
//!
//! Turns a [`TypeDeclaration`] into a validated, immutable [`TypeDescriptor`]:
//! inherited fields linearized, external names computed, directives checked.
//! Descriptors and field lookups are cached per type and shared between threads.
//!
//! # Example
//!
//! ```ignore
//! let metadata = Metadata::global();
//! let descriptor = metadata.describe(Order::handle())?;
//! assert_eq!(descriptor.collection(), "orders");
//! assert_eq!(metadata.resolve_external_name(Order::handle(), "customerName")?, "customer_name");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::document::ID_KEY;
use crate::error::{MappingError, MappingResult};
use crate::naming;
use crate::record::{
    AdditionalDataDirective, DirectiveKind, Directives, EncryptedDirective, FieldDeclaration,
    Record, RecordHandle, RecordKind, ReferenceDirective, TypeDeclaration, TypeKey,
    VersionDirective,
};
use crate::registry::{Registered, TypeRegistry};
use crate::value::ValueType;

/// A resolved field of a record type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: &'static str,
    external_name: String,
    value_type: ValueType,
    directives: Directives,
    declared_in: TypeKey,
}

impl FieldDescriptor {
    fn resolve(field: &FieldDeclaration, translate_names: bool, declared_in: TypeKey) -> Self {
        let mut directives = field.directives.clone();
        if directives.reference.is_none() && field.value_type.reference_target().is_some() {
            directives.reference = Some(ReferenceDirective::default());
        }
        let external_name = external_name(field.name, &directives, translate_names);
        Self {
            name: field.name,
            external_name,
            value_type: field.value_type.clone(),
            directives,
            declared_in,
        }
    }

    /// The in-memory field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The key under which the field is stored.
    pub fn external_name(&self) -> &str {
        &self.external_name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// The type whose declaration contributed this field.
    pub fn declared_in(&self) -> TypeKey {
        self.declared_in
    }

    pub fn has(&self, kind: DirectiveKind) -> bool {
        self.directives.has(kind)
    }

    pub fn is_identity(&self) -> bool {
        self.directives.identity
    }

    pub fn is_transient(&self) -> bool {
        self.directives.transient
    }

    pub fn is_read_only(&self) -> bool {
        self.directives.read_only
    }

    pub fn use_if_null(&self) -> bool {
        self.directives.use_if_null
    }

    pub fn aliases(&self) -> &[String] {
        &self.directives.aliases
    }

    pub fn reference(&self) -> Option<&ReferenceDirective> {
        self.directives.reference.as_ref()
    }

    pub fn version(&self) -> Option<&VersionDirective> {
        self.directives.version.as_ref()
    }

    pub fn additional_data(&self) -> Option<&AdditionalDataDirective> {
        self.directives.additional_data.as_ref()
    }

    pub fn encrypted(&self) -> Option<&EncryptedDirective> {
        self.directives.encrypted.as_ref()
    }
}

fn external_name(name: &str, directives: &Directives, translate_names: bool) -> String {
    let overridden = directives
        .reference
        .as_ref()
        .and_then(|reference| reference.name.clone())
        .or_else(|| {
            directives
                .version
                .as_ref()
                .and_then(|version| version.name.clone())
        })
        .or_else(|| directives.rename.clone());
    if let Some(name) = overridden {
        return name;
    }
    if directives.identity {
        return ID_KEY.to_string();
    }
    if translate_names && directives.translate {
        return naming::to_external(name);
    }
    name.to_string()
}

/// The resolved shape of a record type.
#[derive(Debug)]
pub struct TypeDescriptor {
    handle: RecordHandle,
    name: &'static str,
    kind: RecordKind,
    collection: String,
    discriminator: String,
    polymorphic: bool,
    translate_names: bool,
    fields: Vec<FieldDescriptor>,
    identity: Option<usize>,
    additional_data: Option<usize>,
    claimed: HashSet<String>,
    declaration: TypeDeclaration,
}

impl TypeDescriptor {
    /// Linearizes and validates the declaration behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error for contradictory directives.
    pub fn build(handle: RecordHandle) -> MappingResult<Self> {
        let declaration = handle.declaration();
        let type_name = declaration.name();

        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        let mut polymorphic = declaration.is_polymorphic();
        let mut visited = HashSet::from([declaration.key()]);
        let mut interfaces = VecDeque::new();

        let mut collect = |current: &TypeDeclaration, fields: &mut Vec<FieldDescriptor>| {
            for field in current.fields() {
                if seen.insert(field.name()) {
                    fields.push(FieldDescriptor::resolve(
                        field,
                        declaration.translates_names(),
                        current.key(),
                    ));
                }
            }
        };

        // The parent chain first, then every other supertype breadth-first.
        collect(&declaration, &mut fields);
        let mut parent = {
            let mut supertypes = declaration.supertypes().iter();
            let parent = supertypes.next().copied();
            interfaces.extend(supertypes.copied());
            parent
        };
        while let Some(current) = parent.take() {
            if !visited.insert(current.key()) {
                break;
            }
            let current = current.declaration();
            polymorphic |= current.is_polymorphic();
            collect(&current, &mut fields);
            let mut supertypes = current.supertypes().iter();
            parent = supertypes.next().copied();
            interfaces.extend(supertypes.copied());
        }
        while let Some(current) = interfaces.pop_front() {
            if !visited.insert(current.key()) {
                continue;
            }
            let current = current.declaration();
            polymorphic |= current.is_polymorphic();
            collect(&current, &mut fields);
            interfaces.extend(current.supertypes().iter().copied());
        }

        let identity = single(&fields, DirectiveKind::Identity, || {
            MappingError::AmbiguousIdentity(type_name.to_string())
        })?;
        let additional_data = single(&fields, DirectiveKind::AdditionalData, || {
            MappingError::invalid_declaration(type_name, "more than one additional-data field")
        })?;
        validate(type_name, &fields)?;

        let claimed = fields
            .iter()
            .filter(|field| field.additional_data().is_none())
            .flat_map(|field| {
                std::iter::once(field.external_name().to_string())
                    .chain(field.aliases().iter().cloned())
            })
            .collect();

        Ok(Self {
            handle,
            name: type_name,
            kind: declaration.kind(),
            collection: declaration
                .declared_collection()
                .map(str::to_string)
                .unwrap_or_else(|| naming::to_external(type_name)),
            discriminator: declaration.resolved_discriminator(),
            polymorphic,
            translate_names: declaration.translates_names(),
            fields,
            identity,
            additional_data,
            claimed,
            declaration,
        })
    }

    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn is_entity(&self) -> bool {
        self.kind == RecordKind::Entity
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Whether stored documents of this type carry the discriminator.
    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    pub fn translates_names(&self) -> bool {
        self.translate_names
    }

    /// Fields in linearized order: own fields first, then inherited ones.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name() == name)
    }

    pub fn identity(&self) -> Option<&FieldDescriptor> {
        self.identity.map(|index| &self.fields[index])
    }

    /// # Errors
    ///
    /// Returns [`MappingError::MissingIdentity`] for types without an identity field.
    pub fn require_identity(&self) -> MappingResult<&FieldDescriptor> {
        self.identity()
            .ok_or_else(|| MappingError::MissingIdentity(self.name.to_string()))
    }

    pub fn additional_data(&self) -> Option<&FieldDescriptor> {
        self.additional_data.map(|index| &self.fields[index])
    }

    /// Whether a stored key belongs to a declared field (by external name or alias).
    pub fn is_claimed(&self, key: &str) -> bool {
        self.claimed.contains(key)
    }

    pub fn declaration(&self) -> &TypeDeclaration {
        &self.declaration
    }

    pub fn instantiate(&self) -> Box<dyn Record> {
        self.declaration.instantiate()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let by = |matches: &dyn Fn(&FieldDescriptor) -> bool| {
            self.fields.iter().position(|field| matches(field))
        };
        by(&|field| field.external_name() == name)
            .or_else(|| by(&|field| field.aliases().iter().any(|alias| alias == name)))
            .or_else(|| by(&|field| field.name() == name))
    }
}

fn single(
    fields: &[FieldDescriptor],
    kind: DirectiveKind,
    error: impl FnOnce() -> MappingError,
) -> MappingResult<Option<usize>> {
    let mut positions = fields
        .iter()
        .enumerate()
        .filter(|(_, field)| field.has(kind))
        .map(|(index, _)| index);
    let first = positions.next();
    match positions.next() {
        Some(_) => Err(error()),
        None => Ok(first),
    }
}

fn validate(type_name: &str, fields: &[FieldDescriptor]) -> MappingResult<()> {
    let mut external_names = HashSet::new();
    for field in fields {
        let directives = field.directives();
        if directives.identity && directives.rename.is_some() {
            return Err(MappingError::invalid_declaration(
                type_name,
                format!("identity field {} cannot be renamed", field.name()),
            ));
        }
        if field.additional_data().is_some() && !matches!(field.value_type(), ValueType::Map(_)) {
            return Err(MappingError::invalid_declaration(
                type_name,
                format!("additional-data field {} must be a map", field.name()),
            ));
        }
        if field.reference().is_some() && field.value_type().reference_target().is_none() {
            return Err(MappingError::invalid_declaration(
                type_name,
                format!("reference field {} is not of a reference type", field.name()),
            ));
        }
        if field.additional_data().is_none()
            && !field.is_transient()
            && !external_names.insert(field.external_name())
        {
            return Err(MappingError::invalid_declaration(
                type_name,
                format!("external name {} is used twice", field.external_name()),
            ));
        }
    }
    Ok(())
}

/// Outcome of looking up a stored key on a record type.
#[derive(Debug, Clone)]
pub enum FieldMatch {
    /// The key belongs to a declared field.
    Declared(FieldDescriptor),
    /// The key is unknown but the type captures unknown keys in this field.
    Additional(FieldDescriptor),
}

static GLOBAL: LazyLock<Arc<Metadata>> = LazyLock::new(|| Arc::new(Metadata::new()));

type FieldLookups = HashMap<TypeKey, HashMap<String, Option<usize>>>;

/// Caches descriptors, field lookups and the discriminator registry.
///
/// One process-wide instance is available through [`Metadata::global`]; tests and
/// embedders that need isolation create their own with [`Metadata::new`].
#[derive(Debug, Default)]
pub struct Metadata {
    registry: TypeRegistry,
    descriptors: RwLock<HashMap<TypeKey, Arc<TypeDescriptor>>>,
    field_lookups: RwLock<FieldLookups>,
    directive_fields: RwLock<HashMap<(TypeKey, DirectiveKind), Arc<[FieldDescriptor]>>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> Arc<Metadata> {
        Arc::clone(&GLOBAL)
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Returns the descriptor of `handle`, building and caching it on first use.
    ///
    /// Describing a type registers its discriminator.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid declarations or a discriminator owned by another type.
    pub fn describe(&self, handle: RecordHandle) -> MappingResult<Arc<TypeDescriptor>> {
        if let Some(descriptor) = self.descriptors.read().get(&handle.key()) {
            return Ok(Arc::clone(descriptor));
        }

        let descriptor = TypeDescriptor::build(handle)?;
        self.registry
            .register(descriptor.discriminator(), Registered::Record(handle))?;
        debug!(
            type_name = descriptor.name(),
            collection = descriptor.collection(),
            fields = descriptor.fields().len(),
            "described record type"
        );

        let mut descriptors = self.descriptors.write();
        Ok(Arc::clone(
            descriptors
                .entry(handle.key())
                .or_insert_with(|| Arc::new(descriptor)),
        ))
    }

    /// Describes `T` so that its discriminator is known before any document is read.
    pub fn register<T: crate::record::RecordType>(&self) -> MappingResult<()> {
        self.describe(T::handle()).map(|_| ())
    }

    /// Resolves the stored key of a field, given its internal name, external name or alias.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::FieldNotFound`] for unknown names.
    pub fn resolve_external_name(&self, handle: RecordHandle, name: &str) -> MappingResult<String> {
        self.resolve_field(handle, name)?
            .map(|field| field.external_name().to_string())
            .ok_or_else(|| MappingError::field_not_found(handle.key().name(), name))
    }

    /// Finds a field by external name, then alias, then internal name.
    ///
    /// Misses are cached too.
    pub fn resolve_field(
        &self,
        handle: RecordHandle,
        name: &str,
    ) -> MappingResult<Option<FieldDescriptor>> {
        let descriptor = self.describe(handle)?;
        let cached = self
            .field_lookups
            .read()
            .get(&handle.key())
            .and_then(|lookups| lookups.get(name).copied());
        let position = match cached {
            Some(position) => position,
            None => {
                let position = descriptor.position(name);
                self.field_lookups
                    .write()
                    .entry(handle.key())
                    .or_default()
                    .insert(name.to_string(), position);
                position
            }
        };
        Ok(position.map(|index| descriptor.fields()[index].clone()))
    }

    /// Like [`Metadata::resolve_field`], falling back to the additional-data field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::FieldNotFound`] when the name is unknown and the type
    /// has no additional-data field.
    pub fn lookup_field(&self, handle: RecordHandle, name: &str) -> MappingResult<FieldMatch> {
        if let Some(field) = self.resolve_field(handle, name)? {
            return Ok(FieldMatch::Declared(field));
        }
        self.describe(handle)?
            .additional_data()
            .cloned()
            .map(FieldMatch::Additional)
            .ok_or_else(|| MappingError::field_not_found(handle.key().name(), name))
    }

    /// All fields of `handle` carrying a directive of the given kind.
    pub fn fields_with(
        &self,
        handle: RecordHandle,
        kind: DirectiveKind,
    ) -> MappingResult<Arc<[FieldDescriptor]>> {
        if let Some(fields) = self.directive_fields.read().get(&(handle.key(), kind)) {
            return Ok(Arc::clone(fields));
        }
        let fields: Arc<[FieldDescriptor]> = self
            .describe(handle)?
            .fields()
            .iter()
            .filter(|field| field.has(kind))
            .cloned()
            .collect();
        self.directive_fields
            .write()
            .insert((handle.key(), kind), Arc::clone(&fields));
        Ok(fields)
    }

    /// Drops every cached descriptor and lookup.
    ///
    /// Discriminator registrations survive, so documents naming a subtype or enum
    /// registered at startup still resolve. Rebuilt descriptors re-register the same
    /// discriminators, which is a no-op.
    pub fn clear(&self) {
        self.descriptors.write().clear();
        self.field_lookups.write().clear();
        self.directive_fields.write().clear();
        debug!(registered = self.registry.len(), "cleared metadata caches");
    }
}
