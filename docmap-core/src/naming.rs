//! Translation between in-memory field names and stored key names.
//!
//! Stored keys are snake_case (`orderDate` and `order_date` both become
//! `order_date`); the inverse produces lowerCamelCase.

use heck::{ToLowerCamelCase, ToSnakeCase};

/// Translates a field or type name to its stored form.
pub fn to_external(name: &str) -> String {
    name.to_snake_case()
}

/// Translates a stored key back to the lowerCamelCase field form.
pub fn to_internal(name: &str) -> String {
    name.to_lower_camel_case()
}
