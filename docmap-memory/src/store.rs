//! In-memory storage implementation.
//!
//! Documents are kept per collection in hash maps keyed by the rendered identity and
//! guarded by a read-write lock. Locks are never held while the mapper runs, so
//! nested reference loads and auto-stores can re-enter the store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::RwLock;
use tracing::{debug, instrument};

use docmap_core::{
    backend::ReferenceResolver,
    document::ID_KEY,
    error::{MappingError, MappingResult},
    mapper::{DocumentMapper, DocumentMapperBuilder},
    metadata::{FieldDescriptor, TypeDescriptor},
    record::{DirectiveKind, Record, RecordHandle, RecordType, TypeKey},
    value::{Value, ValueType},
};

type CollectionMap = HashMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document store.
///
/// The store owns a [`DocumentMapper`] whose reference resolver is the store itself,
/// so the store is always handed out behind an [`Arc`].
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
///
/// let store = InMemoryStore::builder().build();
/// let id = store.save(&customer)?;
/// assert_eq!(store.count("customer"), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    mapper: DocumentMapper,
    /// collection name -> (rendered identity -> document)
    store: RwLock<StoreMap>,
    vetoed: RwLock<HashSet<TypeKey>>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl InMemoryStore {
    /// Creates an empty store whose mapper is built from `mapper`.
    ///
    /// Any reference resolver configured on `mapper` is replaced by the store.
    pub fn new(mapper: DocumentMapperBuilder) -> Arc<Self> {
        Arc::new_cyclic(|store: &Weak<InMemoryStore>| {
            let resolver: Weak<dyn ReferenceResolver> = store.clone();
            Self {
                mapper: mapper.reference_resolver(resolver).build(),
                store: RwLock::new(StoreMap::new()),
                vetoed: RwLock::new(HashSet::new()),
                fetches: AtomicUsize::new(0),
                stores: AtomicUsize::new(0),
            }
        })
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    pub fn mapper(&self) -> &DocumentMapper {
        &self.mapper
    }

    /// Serializes and stores a record, assigning an identity if it has none.
    ///
    /// # Returns
    ///
    /// The identity under which the document was stored.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingIdentity`] for types without an identity field,
    /// [`MappingError::ConcurrentModification`] when a version field does not match the
    /// stored document, and any serialization error.
    #[instrument(level = "debug", skip_all, fields(record = %record.record_type().key()))]
    pub fn save(&self, record: &dyn Record) -> MappingResult<Bson> {
        self.persist(record).map(|document| stored_id(&document))
    }

    /// Like [`InMemoryStore::save`], then writes the assigned identity and versions back.
    pub fn insert(&self, record: &mut dyn Record) -> MappingResult<Bson> {
        let document = self.persist(record)?;
        let handle = record.record_type();
        let descriptor = self.mapper.metadata().describe(handle)?;

        let identity = descriptor.require_identity()?;
        let id = stored_id(&document);
        self.write_back(record, identity, &id)?;

        for version in self
            .mapper
            .metadata()
            .fields_with(handle, DirectiveKind::Version)?
            .iter()
        {
            if let Some(stored) = document.get(version.external_name()) {
                self.write_back(record, version, stored)?;
            }
        }
        Ok(id)
    }

    /// Stores a raw document, as another program writing to the same database would.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::InvalidDocument`] if the document has no `_id`.
    pub fn put_document(&self, collection: &str, document: Document) -> MappingResult<()> {
        let id = match document.get(ID_KEY) {
            Some(id) if !matches!(id, Bson::Null) => id.clone(),
            _ => {
                return Err(MappingError::InvalidDocument(format!(
                    "document for {collection} has no {ID_KEY}"
                )));
            }
        };
        self.store
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id_key(&id), document);
        Ok(())
    }

    /// Loads and deserializes the record of type `T` with the given identity.
    ///
    /// The identity is coerced to `T`'s identity type first, so a hex string finds an
    /// ObjectId identity.
    pub fn find_by_id<T: RecordType>(&self, id: impl Into<Bson>) -> MappingResult<Option<T>> {
        let descriptor = self.mapper.metadata().describe(T::handle())?;
        let id = self.coerce_id(&descriptor, id.into())?;
        let Some(document) = self.get_document(descriptor.collection(), &id) else {
            return Ok(None);
        };
        self.mapper.deserialize::<T>(&document).map(Some)
    }

    pub fn get_document(&self, collection: &str, id: &Bson) -> Option<Document> {
        self.store
            .read()
            .get(collection)
            .and_then(|documents| documents.get(&id_key(id)))
            .cloned()
    }

    /// Removes a document, returning whether it existed.
    pub fn remove(&self, collection: &str, id: &Bson) -> bool {
        self.store
            .write()
            .get_mut(collection)
            .is_some_and(|documents| documents.remove(&id_key(id)).is_some())
    }

    pub fn count(&self, collection: &str) -> usize {
        self.store.read().get(collection).map_or(0, HashMap::len)
    }

    /// Collection names, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut collections: Vec<String> = self.store.read().keys().cloned().collect();
        collections.sort();
        collections
    }

    /// Refuses every fetch of `T` until [`InMemoryStore::allow`] is called.
    pub fn veto<T: RecordType>(&self) {
        self.vetoed.write().insert(TypeKey::of::<T>());
    }

    pub fn allow<T: RecordType>(&self) {
        self.vetoed.write().remove(&TypeKey::of::<T>());
    }

    /// Number of reference fetches served, vetoed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of records stored through `store_if_absent`.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    fn persist(&self, record: &dyn Record) -> MappingResult<Document> {
        let handle = record.record_type();
        let descriptor = self.mapper.metadata().describe(handle)?;
        let identity = descriptor.require_identity()?;
        let mut document = self.mapper.serialize(record)?;

        let id = match document.get(ID_KEY) {
            Some(id) if !matches!(id, Bson::Null) => id.clone(),
            _ => {
                let id = generate_id(identity)?;
                document.insert(ID_KEY, id.clone());
                id
            }
        };

        let mut store = self.store.write();
        let documents = store.entry(descriptor.collection().to_string()).or_default();
        let existing = documents.get(&id_key(&id));
        for version in self
            .mapper
            .metadata()
            .fields_with(handle, DirectiveKind::Version)?
            .iter()
        {
            let key = version.external_name();
            let current = version_of(&document, key);
            let stored = existing.map(|existing| version_of(existing, key));
            if let Some(stored) = stored.filter(|stored| *stored != current) {
                return Err(MappingError::ConcurrentModification {
                    type_name: descriptor.name().to_string(),
                    id: id.to_string(),
                    expected: current,
                    actual: stored,
                });
            }
            document.insert(key, next_version(version, current));
        }

        debug!(collection = descriptor.collection(), %id, "stored document");
        documents.insert(id_key(&id), document.clone());
        Ok(document)
    }

    fn coerce_id(&self, descriptor: &TypeDescriptor, id: Bson) -> MappingResult<Bson> {
        let identity = descriptor.require_identity()?;
        match self.mapper.deserialize_value(&id, identity.value_type()) {
            Ok(Value::Scalar(coerced)) => Ok(coerced),
            _ => Err(MappingError::IdentityMismatch {
                type_name: descriptor.name().to_string(),
                expected: identity.value_type().to_string(),
                actual: format!("{:?}", id.element_type()),
            }),
        }
    }

    fn write_back(
        &self,
        record: &mut dyn Record,
        field: &FieldDescriptor,
        stored: &Bson,
    ) -> MappingResult<()> {
        let value = self.mapper.deserialize_value(stored, field.value_type())?;
        record.write_field(field.name(), value)
    }
}

impl ReferenceResolver for InMemoryStore {
    fn fetch_by_id(
        &self,
        target: RecordHandle,
        id: &Bson,
        collection: Option<&str>,
    ) -> MappingResult<Option<Box<dyn Record>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let descriptor = self.mapper.metadata().describe(target)?;
        if self.vetoed.read().contains(&target.key()) {
            return Err(MappingError::AccessVetoed {
                type_name: descriptor.name().to_string(),
                id: id.to_string(),
            });
        }

        let collection = collection.unwrap_or(descriptor.collection());
        let Some(document) = self.get_document(collection, id) else {
            debug!(collection, %id, "referenced document not found");
            return Ok(None);
        };
        self.mapper.deserialize_record(target, &document).map(Some)
    }

    fn store_if_absent(&self, record: &dyn Record) -> MappingResult<Bson> {
        let descriptor = self.mapper.metadata().describe(record.record_type())?;
        let identity = descriptor.require_identity()?;
        if let Value::Scalar(id) = record.read_field(identity.name())? {
            if !matches!(id, Bson::Null)
                && self.get_document(descriptor.collection(), &id).is_some()
            {
                return Ok(id);
            }
        }
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.save(record)
    }
}

/// Builder for [`InMemoryStore`].
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    mapper: Option<DocumentMapperBuilder>,
}

impl InMemoryStoreBuilder {
    /// Configures the store's mapper (metadata, converters, encryption).
    pub fn mapper(mut self, mapper: DocumentMapperBuilder) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn build(self) -> Arc<InMemoryStore> {
        InMemoryStore::new(self.mapper.unwrap_or_default())
    }
}

fn id_key(id: &Bson) -> String {
    id.to_string()
}

fn stored_id(document: &Document) -> Bson {
    document.get(ID_KEY).cloned().unwrap_or(Bson::Null)
}

fn generate_id(identity: &FieldDescriptor) -> MappingResult<Bson> {
    match identity.value_type() {
        ValueType::ObjectId => Ok(Bson::ObjectId(ObjectId::new())),
        ValueType::String => Ok(Bson::String(ObjectId::new().to_hex())),
        ValueType::Uuid => Ok(Bson::from(bson::Uuid::new())),
        other => Err(MappingError::InvalidDocument(format!(
            "cannot generate an identity of type {other}"
        ))),
    }
}

fn version_of(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(version)) => i64::from(*version),
        Some(Bson::Int64(version)) => *version,
        _ => 0,
    }
}

fn next_version(field: &FieldDescriptor, current: i64) -> Bson {
    match field.value_type() {
        ValueType::Int32 => Bson::Int32(i32::try_from(current + 1).unwrap_or(i32::MAX)),
        _ => Bson::Int64(current + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmap_core::metadata::Metadata;
    use docmap_macros::Record;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default, Record)]
    struct Note {
        #[record(id)]
        id: Option<bson::Uuid>,
        #[record(version(name = "rev"))]
        revision: i32,
        text: String,
    }

    #[derive(Debug, Clone, Default, Record)]
    struct Counter {
        #[record(id)]
        id: Option<i64>,
    }

    fn store() -> Arc<InMemoryStore> {
        InMemoryStore::builder()
            .mapper(DocumentMapper::builder().metadata(Arc::new(Metadata::new())))
            .build()
    }

    #[test]
    fn uuid_identities_and_named_versions() {
        let store = store();
        let mut note = Note {
            text: "hello".into(),
            ..Note::default()
        };
        let id = store.insert(&mut note).unwrap();
        assert!(matches!(id, Bson::Binary(_)));
        assert!(note.id.is_some());
        assert_eq!(note.revision, 1);

        let stored = store.get_document("note", &id).unwrap();
        assert_eq!(stored.get("rev"), Some(&Bson::Int32(1)));
        assert_eq!(stored.get_str("text").unwrap(), "hello");
    }

    #[test]
    fn numeric_identities_are_not_generated() {
        let store = store();
        assert!(matches!(
            store.save(&Counter::default()),
            Err(MappingError::InvalidDocument(_))
        ));
        assert_eq!(store.save(&Counter { id: Some(7) }).unwrap(), Bson::Int64(7));
    }

    #[test]
    fn versions_default_to_zero() {
        let document = doc! { "a": 3, "b": 4_i64, "c": "x" };
        assert_eq!(version_of(&document, "a"), 3);
        assert_eq!(version_of(&document, "b"), 4);
        assert_eq!(version_of(&document, "c"), 0);
        assert_eq!(version_of(&document, "missing"), 0);
    }

    #[test]
    fn store_if_absent_reuses_stored_records() {
        let store = store();
        let first = store.store_if_absent(&Counter { id: Some(1) }).unwrap();
        let second = store.store_if_absent(&Counter { id: Some(1) }).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.store_count(), 1);
        assert_eq!(store.count("counter"), 1);
    }
}
