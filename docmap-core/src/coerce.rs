//! Scalar coercion from stored BSON values to declared field types.
//!
//! Documents written by other programs (or older versions of this one) do not always
//! store the declared type: numbers arrive widened or narrowed, identities arrive as
//! hex strings. Only lossless conversions are accepted.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, DateTime};

use crate::value::ValueType;

/// Coerces `raw` to the scalar type `declared`.
///
/// Returns `None` when there is no lossless conversion.
pub(crate) fn coerce_scalar(raw: &Bson, declared: &ValueType) -> Option<Bson> {
    match (declared, raw) {
        (ValueType::Bool, Bson::Boolean(_))
        | (ValueType::Int32, Bson::Int32(_))
        | (ValueType::Int64, Bson::Int64(_))
        | (ValueType::Double, Bson::Double(_))
        | (ValueType::String, Bson::String(_))
        | (ValueType::DateTime, Bson::DateTime(_))
        | (ValueType::ObjectId, Bson::ObjectId(_))
        | (ValueType::Binary, Bson::Binary(_))
        | (ValueType::Document, Bson::Document(_)) => Some(raw.clone()),

        (ValueType::Bool, Bson::Int32(value)) => int_to_bool(i64::from(*value)),
        (ValueType::Bool, Bson::Int64(value)) => int_to_bool(*value),
        (ValueType::Bool, Bson::String(text)) => text.trim().parse().ok().map(Bson::Boolean),

        (ValueType::Int32, Bson::Int64(value)) => i32::try_from(*value).ok().map(Bson::Int32),
        (ValueType::Int32, Bson::Double(value)) => integral(*value)
            .and_then(|value| i32::try_from(value).ok())
            .map(Bson::Int32),
        (ValueType::Int32, Bson::String(text)) => text.trim().parse().ok().map(Bson::Int32),

        (ValueType::Int64, Bson::Int32(value)) => Some(Bson::Int64(i64::from(*value))),
        (ValueType::Int64, Bson::Double(value)) => integral(*value).map(Bson::Int64),
        (ValueType::Int64, Bson::DateTime(value)) => Some(Bson::Int64(value.timestamp_millis())),
        (ValueType::Int64, Bson::String(text)) => text.trim().parse().ok().map(Bson::Int64),

        (ValueType::Double, Bson::Int32(value)) => Some(Bson::Double(f64::from(*value))),
        (ValueType::Double, Bson::Int64(value)) => {
            let widened = *value as f64;
            (widened as i128 == i128::from(*value)).then_some(Bson::Double(widened))
        }
        (ValueType::Double, Bson::String(text)) => text.trim().parse().ok().map(Bson::Double),

        (ValueType::String, Bson::Symbol(text)) => Some(Bson::String(text.clone())),
        (ValueType::String, Bson::ObjectId(id)) => Some(Bson::String(id.to_hex())),
        (ValueType::String, Bson::Int32(value)) => Some(Bson::String(value.to_string())),
        (ValueType::String, Bson::Int64(value)) => Some(Bson::String(value.to_string())),
        (ValueType::String, Bson::Double(value)) => Some(Bson::String(value.to_string())),
        (ValueType::String, Bson::Boolean(value)) => Some(Bson::String(value.to_string())),
        (ValueType::String, Bson::Binary(binary)) => {
            uuid_of(binary).map(|uuid| Bson::String(uuid.to_string()))
        }

        (ValueType::DateTime, Bson::Int64(millis)) => Some(Bson::DateTime(DateTime::from_millis(*millis))),
        (ValueType::DateTime, Bson::Int32(millis)) => {
            Some(Bson::DateTime(DateTime::from_millis(i64::from(*millis))))
        }
        (ValueType::DateTime, Bson::String(text)) => chrono::DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| Bson::DateTime(DateTime::from_millis(parsed.timestamp_millis()))),

        (ValueType::ObjectId, Bson::String(text)) => ObjectId::parse_str(text).ok().map(Bson::ObjectId),

        (ValueType::Uuid, Bson::Binary(binary)) => uuid_of(binary).map(Bson::from),
        (ValueType::Uuid, Bson::String(text)) => bson::Uuid::parse_str(text).ok().map(Bson::from),

        _ => None,
    }
}

/// A name for the stored type of `raw`, used in error messages.
pub(crate) fn bson_kind(raw: &Bson) -> String {
    format!("{:?}", raw.element_type())
}

fn int_to_bool(value: i64) -> Option<Bson> {
    match value {
        0 => Some(Bson::Boolean(false)),
        1 => Some(Bson::Boolean(true)),
        _ => None,
    }
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn integral(value: f64) -> Option<i64> {
    if value.fract() != 0.0 || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return None;
    }
    Some(value as i64)
}

fn uuid_of(binary: &Binary) -> Option<bson::Uuid> {
    if binary.subtype != BinarySubtype::Uuid {
        return None;
    }
    let bytes: [u8; 16] = binary.bytes.as_slice().try_into().ok()?;
    Some(bson::Uuid::from_bytes(bytes))
}
