//! Record to document.

use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use tracing::{debug, instrument, trace};

use crate::document::{DISCRIMINATOR_KEY, ENUM_NAME_KEY, ID_KEY, ReferenceValue};
use crate::error::{MappingError, MappingResult};
use crate::mapper::DocumentMapper;
use crate::metadata::{FieldDescriptor, TypeDescriptor};
use crate::record::{EncryptedDirective, Record, ReferenceDirective};
use crate::reference::RefTarget;
use crate::value::{Value, ValueType};

impl DocumentMapper {
    /// Converts a record to a document.
    ///
    /// Transient and read-only fields are skipped, null fields are omitted unless
    /// they are marked `use_if_null`, and polymorphic types get their discriminator.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid declarations, unstored references, missing
    /// converters and encryption failures.
    #[instrument(level = "debug", skip_all, fields(record = %record.record_type().key()))]
    pub fn serialize(&self, record: &dyn Record) -> MappingResult<Document> {
        self.serialize_record(record, false)
    }

    /// Encodes a single value as if it were stored in a field of type `declared`.
    pub fn serialize_value(&self, value: &Value, declared: &ValueType) -> MappingResult<Bson> {
        self.value_to_bson(value, declared)
    }

    fn serialize_record(&self, record: &dyn Record, tagged: bool) -> MappingResult<Document> {
        let descriptor = self.metadata.describe(record.record_type())?;
        let mut document = Document::new();
        let mut additional = Vec::new();

        for field in descriptor.fields() {
            if field.is_transient() || field.is_read_only() {
                continue;
            }
            let value = record.read_field(field.name())?;

            if let Some(directive) = field.additional_data() {
                if !directive.read_only {
                    self.collect_additional(field, value, &mut additional)?;
                }
                continue;
            }

            let bson = if value.is_null() {
                Bson::Null
            } else if let Some(directive) = field.encrypted() {
                self.encrypt_field(&descriptor, field, directive, &value)?
            } else if let Some(directive) = field.reference() {
                self.reference_to_bson(field, directive, &value)?
            } else {
                self.value_to_bson(&value, field.value_type())
                    .map_err(|error| error.in_field(field.name()))?
            };

            if matches!(bson, Bson::Null) && (field.is_identity() || !field.use_if_null()) {
                trace!(field = field.name(), "omitting null field");
                continue;
            }
            document.insert(field.external_name(), bson);
        }

        for (key, value) in additional {
            if !document.contains_key(&key) {
                document.insert(key, value);
            }
        }

        if tagged || descriptor.is_polymorphic() {
            document.insert(DISCRIMINATOR_KEY, descriptor.discriminator());
        }
        Ok(document)
    }

    fn collect_additional(
        &self,
        field: &FieldDescriptor,
        value: Value,
        additional: &mut Vec<(String, Bson)>,
    ) -> MappingResult<()> {
        let entries = match value {
            Value::Null => return Ok(()),
            Value::Map(entries) => entries,
            other => {
                return Err(MappingError::coercion(field.value_type(), other.kind())
                    .in_field(field.name()));
            }
        };
        let element = field.value_type().element_type();
        for (key, value) in entries {
            let bson = self.value_to_bson(&value, element)?;
            additional.push((key, bson));
        }
        Ok(())
    }

    pub(crate) fn value_to_bson(&self, value: &Value, declared: &ValueType) -> MappingResult<Bson> {
        Ok(match value {
            Value::Null => Bson::Null,
            Value::Scalar(bson) => bson.clone(),
            Value::Record(record) => {
                let handle = record.record_type();
                let exact = matches!(declared, ValueType::Record(expected) if *expected == handle);
                let mut document = self.serialize_record(record.as_ref(), !exact)?;
                if self.metadata.describe(handle)?.is_entity() {
                    document.remove(ID_KEY);
                }
                Bson::Document(document)
            }
            Value::Enum(value) => {
                let exact = matches!(declared, ValueType::Enum(expected) if *expected == value.handle());
                if exact {
                    Bson::String(value.name().to_string())
                } else {
                    let discriminator = value.discriminator();
                    self.metadata
                        .registry()
                        .register_enum_handle(value.handle())?;
                    let mut document = Document::new();
                    document.insert(DISCRIMINATOR_KEY, discriminator);
                    document.insert(ENUM_NAME_KEY, value.name());
                    Bson::Document(document)
                }
            }
            Value::Reference(target) => {
                Bson::Document(self.reference_value(target, None)?.to_document()?)
            }
            Value::List(items) => {
                let element = declared.element_type();
                Bson::Array(
                    items
                        .iter()
                        .map(|item| self.value_to_bson(item, element))
                        .collect::<MappingResult<_>>()?,
                )
            }
            Value::Map(entries) => {
                let element = declared.element_type();
                let mut document = Document::new();
                for (key, value) in entries {
                    document.insert(key.clone(), self.value_to_bson(value, element)?);
                }
                Bson::Document(document)
            }
            Value::Custom(custom) => self.converters.marshall(custom)?,
        })
    }

    /// A single reference stores the raw identity; collections store pointers.
    fn reference_to_bson(
        &self,
        field: &FieldDescriptor,
        directive: &ReferenceDirective,
        value: &Value,
    ) -> MappingResult<Bson> {
        let pointer = |value: &Value| -> MappingResult<Bson> {
            match value {
                Value::Null => Ok(Bson::Null),
                Value::Reference(target) => Ok(Bson::Document(
                    self.reference_value(target, Some(directive))?
                        .to_document()?,
                )),
                other => Err(MappingError::coercion(field.value_type(), other.kind())
                    .in_field(field.name())),
            }
        };

        match value {
            Value::Reference(target) => Ok(self.reference_value(target, Some(directive))?.id),
            Value::List(items) => Ok(Bson::Array(
                items.iter().map(pointer).collect::<MappingResult<_>>()?,
            )),
            Value::Map(entries) => {
                let mut document = Document::new();
                for (key, value) in entries {
                    document.insert(key.clone(), pointer(value)?);
                }
                Ok(Bson::Document(document))
            }
            other => pointer(other),
        }
    }

    fn reference_value(
        &self,
        target: &RefTarget,
        directive: Option<&ReferenceDirective>,
    ) -> MappingResult<ReferenceValue> {
        match target {
            RefTarget::Lazy(proxy) => {
                let descriptor = self.metadata.describe(proxy.target_type())?;
                let collection = proxy
                    .collection()
                    .unwrap_or(descriptor.collection())
                    .to_string();
                Ok(ReferenceValue::new(
                    descriptor.discriminator(),
                    proxy.id().clone(),
                    Some(collection),
                ))
            }
            RefTarget::Resolved(record) => {
                let descriptor = self.metadata.describe(record.record_type())?;
                let identity = descriptor.require_identity()?;
                let id = if directive.is_some_and(|directive| directive.auto_store) {
                    debug!(type_name = descriptor.name(), "storing referenced record if absent");
                    self.reference_resolver()?.store_if_absent(record.as_ref())?
                } else {
                    let id = self.value_to_bson(
                        &record.read_field(identity.name())?,
                        identity.value_type(),
                    )?;
                    if matches!(id, Bson::Null) {
                        return Err(MappingError::ReferenceNotStored(
                            descriptor.name().to_string(),
                        ));
                    }
                    id
                };
                Ok(ReferenceValue::new(
                    descriptor.discriminator(),
                    id,
                    Some(descriptor.collection().to_string()),
                ))
            }
        }
    }

    fn encrypt_field(
        &self,
        descriptor: &TypeDescriptor,
        field: &FieldDescriptor,
        directive: &EncryptedDirective,
        value: &Value,
    ) -> MappingResult<Bson> {
        let encryption = self.value_encryption()?;
        let key_name = directive
            .key_name
            .as_deref()
            .unwrap_or(descriptor.discriminator());
        let plaintext = match value {
            Value::Scalar(Bson::String(text)) => text.clone().into_bytes(),
            other => serde_json::to_vec(&self.value_to_bson(other, field.value_type())?)?,
        };
        Ok(Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: encryption.encrypt(key_name, &plaintext)?,
        }))
    }
}
