//! Document to record.

use std::sync::Arc;

use bson::{Bson, Document};
use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::coerce::{bson_kind, coerce_scalar};
use crate::document::{DISCRIMINATOR_KEY, ENUM_NAME_KEY, ID_KEY, ReferenceValue};
use crate::enumeration::{EnumHandle, EnumValue};
use crate::error::{MappingError, MappingResult};
use crate::mapper::DocumentMapper;
use crate::metadata::{FieldDescriptor, TypeDescriptor};
use crate::record::{EncryptedDirective, Record, RecordHandle, RecordType, ReferenceDirective};
use crate::reference::{LazyProxy, RefTarget};
use crate::registry::Registered;
use crate::value::{Value, ValueType};

impl DocumentMapper {
    /// Converts a document to a record of type `T`, or of the subtype named by its
    /// discriminator.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown discriminators, identity mismatches, values that
    /// cannot be coerced to their field types, and failed reference loads.
    #[instrument(level = "debug", skip_all, fields(record = %T::handle().key()))]
    pub fn deserialize<T: RecordType>(&self, document: &Document) -> MappingResult<T> {
        let record = self.deserialize_record(T::handle(), document)?;
        let actual = record.record_type().key();
        record
            .downcast::<T>()
            .map(|record| *record)
            .map_err(|_| MappingError::coercion(T::handle().key(), actual))
    }

    /// Converts a document to a boxed record of `handle`'s type, or of the subtype
    /// named by its discriminator.
    pub fn deserialize_record(
        &self,
        handle: RecordHandle,
        document: &Document,
    ) -> MappingResult<Box<dyn Record>> {
        let handle = match self.discriminated(document)? {
            Some(Registered::Record(actual)) => actual,
            Some(Registered::Enum(actual)) => {
                return Err(MappingError::coercion(handle.key(), actual.key()));
            }
            None => handle,
        };
        let descriptor = self.metadata.describe(handle)?;
        let mut record = descriptor.instantiate();

        for field in descriptor.fields() {
            if field.is_transient() {
                continue;
            }
            if field.additional_data().is_some() {
                let unclaimed = self.collect_unclaimed(&descriptor, document)?;
                record.write_field(field.name(), Value::Map(unclaimed))?;
                continue;
            }
            let Some(raw) = stored_value(field, document) else {
                continue;
            };

            let value = if let Some(directive) = field.encrypted() {
                self.decrypt_field(&descriptor, field, directive, raw)?
            } else if let Some(directive) = field.reference() {
                self.reference_from_bson(raw, field.value_type(), directive)?
            } else if field.is_identity() {
                self.identity_from_bson(&descriptor, field, raw)?
            } else {
                self.value_from_bson(raw, field.value_type())
                    .map_err(|error| error.in_field(field.name()))?
            };

            if !value.is_null() {
                record.write_field(field.name(), value)?;
            }
        }

        // The stored identity is authoritative, whatever aliases said.
        if let Some(identity) = descriptor.identity() {
            if let Some(raw) = document.get(ID_KEY).filter(|raw| !matches!(raw, Bson::Null)) {
                let value = self.identity_from_bson(&descriptor, identity, raw)?;
                record.write_field(identity.name(), value)?;
            }
        }
        Ok(record)
    }

    /// Decodes a stored value without a declared type.
    ///
    /// Discriminated documents become records or enums, other documents become maps.
    pub fn deserialize_any(&self, raw: &Bson) -> MappingResult<Value> {
        Ok(match raw {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Document(document) => match self.discriminated(document)? {
                Some(Registered::Record(handle)) => {
                    Value::Record(self.deserialize_record(handle, document)?)
                }
                Some(Registered::Enum(handle)) => {
                    Value::Enum(enum_from_document(handle, document)?)
                }
                None => Value::Map(
                    document
                        .iter()
                        .map(|(key, value)| Ok((key.clone(), self.deserialize_any(value)?)))
                        .collect::<MappingResult<_>>()?,
                ),
            },
            Bson::Array(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.deserialize_any(item))
                    .collect::<MappingResult<_>>()?,
            ),
            other => Value::Scalar(other.clone()),
        })
    }

    /// Decodes a stored value as if it were read from a field of type `declared`.
    pub fn deserialize_value(&self, raw: &Bson, declared: &ValueType) -> MappingResult<Value> {
        self.value_from_bson(raw, declared)
    }

    fn discriminated(&self, document: &Document) -> MappingResult<Option<Registered>> {
        match document.get(DISCRIMINATOR_KEY) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::String(discriminator)) => {
                self.metadata.registry().resolve(discriminator).map(Some)
            }
            Some(other) => Err(MappingError::UnknownDiscriminator(other.to_string())),
        }
    }

    fn collect_unclaimed(
        &self,
        descriptor: &TypeDescriptor,
        document: &Document,
    ) -> MappingResult<IndexMap<String, Value>> {
        let mut unclaimed = IndexMap::new();
        for (key, value) in document {
            if key == ID_KEY || key == DISCRIMINATOR_KEY || descriptor.is_claimed(key) {
                continue;
            }
            unclaimed.insert(key.clone(), self.deserialize_any(value)?);
        }
        Ok(unclaimed)
    }

    pub(crate) fn value_from_bson(&self, raw: &Bson, declared: &ValueType) -> MappingResult<Value> {
        if matches!(declared, ValueType::Any) {
            return self.deserialize_any(raw);
        }
        if matches!(raw, Bson::Null | Bson::Undefined) {
            return Ok(Value::Null);
        }
        let mismatch = || MappingError::coercion(declared, bson_kind(raw));

        Ok(match declared {
            ValueType::Record(handle) => match raw {
                Bson::Document(document) => {
                    Value::Record(self.deserialize_record(*handle, document)?)
                }
                _ => return Err(mismatch()),
            },
            ValueType::DynRecord => match raw {
                Bson::Document(document) => match self.discriminated(document)? {
                    Some(Registered::Record(handle)) => {
                        Value::Record(self.deserialize_record(handle, document)?)
                    }
                    _ => return Err(mismatch()),
                },
                _ => return Err(mismatch()),
            },
            ValueType::Enum(handle) => Value::Enum(self.enum_from_bson(*handle, raw)?),
            ValueType::Reference(_) => {
                self.reference_from_bson(raw, declared, &ReferenceDirective::default())?
            }
            ValueType::List(element) | ValueType::Set(element) | ValueType::Array(element) => {
                match raw {
                    Bson::Array(items) => Value::List(
                        items
                            .iter()
                            .map(|item| self.value_from_bson(item, element))
                            .collect::<MappingResult<_>>()?,
                    ),
                    _ => return Err(mismatch()),
                }
            }
            ValueType::Map(element) => match raw {
                Bson::Document(document) => Value::Map(
                    document
                        .iter()
                        .map(|(key, value)| Ok((key.clone(), self.value_from_bson(value, element)?)))
                        .collect::<MappingResult<_>>()?,
                ),
                _ => return Err(mismatch()),
            },
            ValueType::Custom(key) => Value::Custom(self.converters.unmarshall(*key, raw.clone())?),
            scalar => Value::Scalar(coerce_scalar(raw, scalar).ok_or_else(mismatch)?),
        })
    }

    fn enum_from_bson(&self, handle: EnumHandle, raw: &Bson) -> MappingResult<EnumValue> {
        match raw {
            Bson::String(name) => EnumValue::parse(handle, name),
            Bson::Document(document) => match self.discriminated(document)? {
                Some(Registered::Enum(actual)) if actual == handle => {
                    enum_from_document(handle, document)
                }
                Some(other) => Err(MappingError::coercion(handle.key(), other.key())),
                None => enum_from_document(handle, document),
            },
            other => Err(MappingError::coercion(handle.key(), bson_kind(other))),
        }
    }

    fn reference_from_bson(
        &self,
        raw: &Bson,
        declared: &ValueType,
        directive: &ReferenceDirective,
    ) -> MappingResult<Value> {
        if matches!(raw, Bson::Null) {
            return Ok(Value::Null);
        }
        // Elements that resolve to nothing are skipped, see `ReferenceDirective`.
        match declared {
            ValueType::Reference(target) => self.single_reference(raw, *target, directive),
            ValueType::List(element) | ValueType::Set(element) | ValueType::Array(element) => {
                match raw {
                    Bson::Array(items) => Ok(Value::List(
                        items
                            .iter()
                            .map(|item| self.reference_from_bson(item, element, directive))
                            .filter(|item| !matches!(item, Ok(Value::Null)))
                            .collect::<MappingResult<_>>()?,
                    )),
                    other => Err(MappingError::coercion(declared, bson_kind(other))),
                }
            }
            ValueType::Map(element) => match raw {
                Bson::Document(document) => {
                    let mut entries = IndexMap::new();
                    for (key, value) in document {
                        let value = self.reference_from_bson(value, element, directive)?;
                        if !value.is_null() {
                            entries.insert(key.clone(), value);
                        }
                    }
                    Ok(Value::Map(entries))
                }
                other => Err(MappingError::coercion(declared, bson_kind(other))),
            },
            other => Err(MappingError::coercion(other, bson_kind(raw))),
        }
    }

    fn single_reference(
        &self,
        raw: &Bson,
        target: RecordHandle,
        directive: &ReferenceDirective,
    ) -> MappingResult<Value> {
        let (handle, id, collection) = match raw {
            Bson::Document(document) if ReferenceValue::is_reference_document(document) => {
                let pointer = ReferenceValue::from_document(document)?;
                // The declared target may not have been described yet.
                self.metadata.describe(target)?;
                let handle = match self.metadata.registry().resolve(&pointer.discriminator)? {
                    Registered::Record(handle) => handle,
                    Registered::Enum(_) => {
                        return Err(MappingError::UnknownDiscriminator(pointer.discriminator));
                    }
                };
                (handle, pointer.id, pointer.collection_name)
            }
            other => (target, other.clone(), None),
        };
        if matches!(id, Bson::Null) {
            return Ok(Value::Null);
        }
        let id = self.reference_id(handle, id)?;

        if directive.lazy {
            let proxy = LazyProxy::new(handle, id, collection, self.resolver_handle()?);
            return Ok(Value::Reference(RefTarget::Lazy(Arc::new(proxy))));
        }

        match self
            .reference_resolver()?
            .fetch_by_id(handle, &id, collection.as_deref())
        {
            Ok(Some(record)) => Ok(Value::Reference(RefTarget::Resolved(Arc::from(record)))),
            Ok(None) => {
                debug!(target_type = %handle.key(), %id, "referenced record not found");
                Ok(Value::Null)
            }
            Err(error) if error.is_veto() => {
                debug!(%error, "reference fetch vetoed, leaving field unset");
                Ok(Value::Null)
            }
            Err(error) => Err(error),
        }
    }

    /// Coerces a reference identity to the identity type of its target.
    fn reference_id(&self, handle: RecordHandle, id: Bson) -> MappingResult<Bson> {
        let descriptor = self.metadata.describe(handle)?;
        match descriptor.identity() {
            Some(identity) => match self.identity_from_bson(&descriptor, identity, &id)? {
                Value::Scalar(id) => Ok(id),
                _ => Ok(id),
            },
            None => Ok(id),
        }
    }

    fn identity_from_bson(
        &self,
        descriptor: &TypeDescriptor,
        identity: &FieldDescriptor,
        raw: &Bson,
    ) -> MappingResult<Value> {
        self.value_from_bson(raw, identity.value_type())
            .map_err(|_| MappingError::IdentityMismatch {
                type_name: descriptor.name().to_string(),
                expected: identity.value_type().to_string(),
                actual: bson_kind(raw),
            })
    }

    fn decrypt_field(
        &self,
        descriptor: &TypeDescriptor,
        field: &FieldDescriptor,
        directive: &EncryptedDirective,
        raw: &Bson,
    ) -> MappingResult<Value> {
        let ciphertext = match raw {
            Bson::Null => return Ok(Value::Null),
            Bson::Binary(binary) => &binary.bytes,
            other => {
                return Err(MappingError::Encryption(format!(
                    "expected binary ciphertext in {}, found {}",
                    field.name(),
                    bson_kind(other)
                )));
            }
        };
        let key_name = directive
            .key_name
            .as_deref()
            .unwrap_or(descriptor.discriminator());
        let plaintext = self.value_encryption()?.decrypt(key_name, ciphertext)?;
        let text = String::from_utf8(plaintext)
            .map_err(|error| MappingError::Encryption(error.to_string()))?;

        if matches!(field.value_type(), ValueType::String) {
            return Ok(Value::Scalar(Bson::String(text)));
        }
        let decoded = serde_json::from_str::<Bson>(&text).unwrap_or(Bson::String(text));
        self.value_from_bson(&decoded, field.value_type())
            .map_err(|error| error.in_field(field.name()))
    }
}

fn stored_value<'a>(field: &FieldDescriptor, document: &'a Document) -> Option<&'a Bson> {
    document.get(field.external_name()).or_else(|| {
        field
            .aliases()
            .iter()
            .find_map(|alias| document.get(alias))
    })
}

fn enum_from_document(handle: EnumHandle, document: &Document) -> MappingResult<EnumValue> {
    match document.get(ENUM_NAME_KEY) {
        Some(Bson::String(name)) => EnumValue::parse(handle, name),
        _ => Err(MappingError::InvalidDocument(format!(
            "enum {} stored without a {ENUM_NAME_KEY}",
            handle.key()
        ))),
    }
}
