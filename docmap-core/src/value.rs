//! The in-memory value model exchanged between records and the codec.
//!
//! Records expose their fields as [`Value`]s, and every Rust field type knows
//! its declared [`ValueType`] and how to move in and out of a `Value` through
//! [`FieldValue`].

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use indexmap::IndexMap;

use crate::enumeration::{EnumHandle, EnumValue, MappedEnum};
use crate::error::{MappingError, MappingResult};
use crate::record::{Record, RecordHandle, RecordType, TypeKey};
use crate::reference::RefTarget;

/// A field value in its type-erased form.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent or null.
    #[default]
    Null,
    /// Any BSON scalar: booleans, numbers, strings, dates, identifiers, binary, raw documents.
    Scalar(Bson),
    Record(Box<dyn Record>),
    Enum(EnumValue),
    Reference(RefTarget),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// A value handled by a registered type converter.
    Custom(CustomValue),
}

impl Value {
    pub fn scalar(value: impl Into<Bson>) -> Self {
        Value::Scalar(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Scalar(Bson::Null))
    }

    pub fn as_scalar(&self) -> Option<&Bson> {
        match self {
            Value::Scalar(bson) => Some(bson),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&dyn Record> {
        match self {
            Value::Record(record) => Some(record.as_ref()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// A short description of the value's shape, used in error messages.
    pub fn kind(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Scalar(bson) => format!("{:?}", bson.element_type()),
            Value::Record(record) => format!("record {}", record.record_type().key()),
            Value::Enum(value) => format!("enum {}", value.handle().key()),
            Value::Reference(_) => "reference".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Map(_) => "map".to_string(),
            Value::Custom(custom) => format!("custom {}", custom.key()),
        }
    }

    /// Takes the concrete record out of a record value.
    ///
    /// # Errors
    ///
    /// Returns a coercion error for any other value or record type.
    pub fn into_record<T: RecordType>(self) -> MappingResult<T> {
        match self {
            Value::Record(record) => {
                let actual = record.record_type().key();
                record
                    .downcast::<T>()
                    .map(|record| *record)
                    .map_err(|_| MappingError::coercion(TypeKey::of::<T>(), actual))
            }
            other => Err(MappingError::coercion(TypeKey::of::<T>(), other.kind())),
        }
    }

    pub fn into_enum<E: MappedEnum>(self) -> MappingResult<E> {
        match self {
            Value::Enum(value) => value.to_enum::<E>(),
            other => Err(MappingError::coercion(TypeKey::of::<E>(), other.kind())),
        }
    }

    pub fn into_custom<T: Any + Clone>(self) -> MappingResult<T> {
        match &self {
            Value::Custom(custom) => custom
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| MappingError::coercion(TypeKey::of::<T>(), custom.key())),
            other => Err(MappingError::coercion(TypeKey::of::<T>(), other.kind())),
        }
    }

    fn into_scalar(self, expected: &ValueType) -> MappingResult<Bson> {
        match self {
            Value::Scalar(bson) => Ok(bson),
            other => Err(MappingError::coercion(expected, other.kind())),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Scalar(bson) => f.debug_tuple("Scalar").field(bson).finish(),
            Value::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Value::Enum(value) => f.debug_tuple("Enum").field(&value.name()).finish(),
            Value::Reference(target) => f.debug_tuple("Reference").field(target).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Value::Custom(custom) => f.debug_tuple("Custom").field(&custom.key()).finish(),
        }
    }
}

/// A value of a converter-backed type.
#[derive(Clone)]
pub struct CustomValue {
    key: TypeKey,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

/// The declared type of a field, used to pick the encoding and to coerce stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    /// Whatever the stored value is; discriminated documents become records or enums.
    Any,
    Bool,
    Int32,
    Int64,
    Double,
    String,
    DateTime,
    ObjectId,
    Uuid,
    Binary,
    Document,
    Record(RecordHandle),
    /// A record of any registered type, selected by discriminator.
    DynRecord,
    Enum(EnumHandle),
    Reference(RecordHandle),
    List(Box<ValueType>),
    Set(Box<ValueType>),
    Array(Box<ValueType>),
    Map(Box<ValueType>),
    Custom(TypeKey),
}

static ANY: ValueType = ValueType::Any;

impl ValueType {
    /// The element type of a collection, or `Any` for everything else.
    pub fn element_type(&self) -> &ValueType {
        match self {
            ValueType::List(element)
            | ValueType::Set(element)
            | ValueType::Array(element)
            | ValueType::Map(element) => element,
            _ => &ANY,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ValueType::List(_) | ValueType::Set(_) | ValueType::Array(_) | ValueType::Map(_)
        )
    }

    /// Returns the target of a reference, looking through collections.
    pub fn reference_target(&self) -> Option<RecordHandle> {
        match self {
            ValueType::Reference(handle) => Some(*handle),
            other if other.is_collection() => other.element_type().reference_target(),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int32 => f.write_str("int32"),
            ValueType::Int64 => f.write_str("int64"),
            ValueType::Double => f.write_str("double"),
            ValueType::String => f.write_str("string"),
            ValueType::DateTime => f.write_str("datetime"),
            ValueType::ObjectId => f.write_str("objectId"),
            ValueType::Uuid => f.write_str("uuid"),
            ValueType::Binary => f.write_str("binary"),
            ValueType::Document => f.write_str("document"),
            ValueType::Record(handle) => write!(f, "record {}", handle.key()),
            ValueType::DynRecord => f.write_str("record"),
            ValueType::Enum(handle) => write!(f, "enum {}", handle.key()),
            ValueType::Reference(handle) => write!(f, "reference {}", handle.key()),
            ValueType::List(element) => write!(f, "list<{element}>"),
            ValueType::Set(element) => write!(f, "set<{element}>"),
            ValueType::Array(element) => write!(f, "array<{element}>"),
            ValueType::Map(element) => write!(f, "map<{element}>"),
            ValueType::Custom(key) => write!(f, "custom {key}"),
        }
    }
}

/// Conversion between a Rust field type and a [`Value`].
pub trait FieldValue: Sized {
    /// The declared type of fields of this Rust type.
    fn value_type() -> ValueType;

    fn to_value(&self) -> Value;

    /// # Errors
    ///
    /// Returns a coercion error when the value does not have this type's shape.
    fn from_value(value: Value) -> MappingResult<Self>;
}

macro_rules! scalar_field_value {
    ($ty:ty, $value_type:ident, $variant:ident) => {
        impl FieldValue for $ty {
            fn value_type() -> ValueType {
                ValueType::$value_type
            }

            fn to_value(&self) -> Value {
                Value::Scalar(Bson::$variant(self.clone()))
            }

            fn from_value(value: Value) -> MappingResult<Self> {
                match value.into_scalar(&ValueType::$value_type)? {
                    Bson::$variant(inner) => Ok(inner),
                    other => Err(MappingError::coercion(
                        ValueType::$value_type,
                        format!("{:?}", other.element_type()),
                    )),
                }
            }
        }
    };
}

scalar_field_value!(bool, Bool, Boolean);
scalar_field_value!(i32, Int32, Int32);
scalar_field_value!(i64, Int64, Int64);
scalar_field_value!(f64, Double, Double);
scalar_field_value!(String, String, String);
scalar_field_value!(bson::DateTime, DateTime, DateTime);
scalar_field_value!(ObjectId, ObjectId, ObjectId);
scalar_field_value!(Document, Document, Document);

impl FieldValue for chrono::DateTime<chrono::Utc> {
    fn value_type() -> ValueType {
        ValueType::DateTime
    }

    fn to_value(&self) -> Value {
        Value::Scalar(Bson::DateTime(bson::DateTime::from_chrono(*self)))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        bson::DateTime::from_value(value).map(|datetime| datetime.to_chrono())
    }
}

impl FieldValue for Binary {
    fn value_type() -> ValueType {
        ValueType::Binary
    }

    fn to_value(&self) -> Value {
        Value::Scalar(Bson::Binary(self.clone()))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value.into_scalar(&ValueType::Binary)? {
            Bson::Binary(binary) => Ok(binary),
            other => Err(MappingError::coercion(
                ValueType::Binary,
                format!("{:?}", other.element_type()),
            )),
        }
    }
}

impl FieldValue for bson::Uuid {
    fn value_type() -> ValueType {
        ValueType::Uuid
    }

    fn to_value(&self) -> Value {
        Value::Scalar(Bson::from(*self))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value.into_scalar(&ValueType::Uuid)? {
            Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes,
            }) => {
                let bytes: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| MappingError::coercion(ValueType::Uuid, "binary of wrong length"))?;
                Ok(bson::Uuid::from_bytes(bytes))
            }
            other => Err(MappingError::coercion(
                ValueType::Uuid,
                format!("{:?}", other.element_type()),
            )),
        }
    }
}

impl FieldValue for uuid::Uuid {
    fn value_type() -> ValueType {
        ValueType::Uuid
    }

    fn to_value(&self) -> Value {
        bson::Uuid::from_bytes(self.into_bytes()).to_value()
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        bson::Uuid::from_value(value).map(|uuid| uuid::Uuid::from_bytes(uuid.bytes()))
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

fn list_items(value: Value, expected: ValueType) -> MappingResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(MappingError::coercion(expected, other.kind())),
    }
}

fn map_entries(value: Value, expected: ValueType) -> MappingResult<IndexMap<String, Value>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(MappingError::coercion(expected, other.kind())),
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List(Box::new(T::value_type()))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, Self::value_type())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FieldValue> FieldValue for Box<[T]> {
    fn value_type() -> ValueType {
        ValueType::Array(Box::new(T::value_type()))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, Self::value_type())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FieldValue + Eq + Hash> FieldValue for HashSet<T> {
    fn value_type() -> ValueType {
        ValueType::Set(Box::new(T::value_type()))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, Self::value_type())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FieldValue + Ord> FieldValue for BTreeSet<T> {
    fn value_type() -> ValueType {
        ValueType::Set(Box::new(T::value_type()))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, Self::value_type())?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

macro_rules! map_field_value {
    ($map:ident) => {
        impl<T: FieldValue> FieldValue for $map<String, T> {
            fn value_type() -> ValueType {
                ValueType::Map(Box::new(T::value_type()))
            }

            fn to_value(&self) -> Value {
                Value::Map(
                    self.iter()
                        .map(|(key, value)| (key.clone(), value.to_value()))
                        .collect(),
                )
            }

            fn from_value(value: Value) -> MappingResult<Self> {
                map_entries(value, Self::value_type())?
                    .into_iter()
                    .map(|(key, value)| T::from_value(value).map(|value| (key, value)))
                    .collect()
            }
        }
    };
}

map_field_value!(HashMap);
map_field_value!(BTreeMap);
map_field_value!(IndexMap);

impl FieldValue for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        Ok(value)
    }
}

impl FieldValue for Box<dyn Record> {
    fn value_type() -> ValueType {
        ValueType::DynRecord
    }

    fn to_value(&self) -> Value {
        Value::Record(self.clone_record())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Record(record) => Ok(record),
            other => Err(MappingError::coercion(ValueType::DynRecord, other.kind())),
        }
    }
}

/// Implements [`FieldValue`] for a type stored through a registered type converter.
///
/// The type must be `Clone + Send + Sync + 'static`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct Money { cents: i64, currency: String }
///
/// custom_field_value!(Money);
/// ```
#[macro_export]
macro_rules! custom_field_value {
    ($ty:ty) => {
        impl $crate::value::FieldValue for $ty {
            fn value_type() -> $crate::value::ValueType {
                $crate::value::ValueType::Custom($crate::record::TypeKey::of::<$ty>())
            }

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Custom($crate::value::CustomValue::new(
                    ::std::clone::Clone::clone(self),
                ))
            }

            fn from_value(value: $crate::value::Value) -> $crate::error::MappingResult<Self> {
                value.into_custom::<$ty>()
            }
        }
    };
}
