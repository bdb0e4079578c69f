//! Parsing of `#[record(...)]` attributes.

use syn::{Attribute, LitBool, LitStr, Token, meta::ParseNestedMeta, token};

#[derive(Default)]
pub(crate) struct TypeAttrs {
    pub embedded: bool,
    pub collection: Option<String>,
    pub discriminator: Option<String>,
    pub polymorphic: bool,
    pub translate_names: Option<bool>,
}

#[derive(Default)]
pub(crate) struct ReferenceAttrs {
    pub lazy: bool,
    pub auto_store: bool,
    pub name: Option<String>,
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub id: bool,
    pub reference: Option<ReferenceAttrs>,
    pub aliases: Vec<String>,
    pub version: Option<Option<String>>,
    pub additional_data: Option<bool>,
    pub read_only: bool,
    pub use_if_null: bool,
    pub encrypted: Option<Option<String>>,
    pub transient: bool,
    pub rename: Option<String>,
    pub translate: Option<bool>,
    pub flatten: bool,
}

fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}

/// `flag` or `flag = true|false`.
fn flag(meta: &ParseNestedMeta) -> syn::Result<bool> {
    if meta.input.peek(Token![=]) {
        Ok(meta.value()?.parse::<LitBool>()?.value)
    } else {
        Ok(true)
    }
}

fn has_arguments(meta: &ParseNestedMeta) -> bool {
    meta.input.peek(token::Paren)
}

fn record_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|attr| attr.path().is_ident("record"))
}

pub(crate) fn parse_type_attrs(attrs: &[Attribute]) -> syn::Result<TypeAttrs> {
    let mut result = TypeAttrs::default();
    for attr in record_attrs(attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("embedded") {
                result.embedded = true;
            } else if meta.path.is_ident("collection") {
                result.collection = Some(string(&meta)?);
            } else if meta.path.is_ident("discriminator") {
                result.discriminator = Some(string(&meta)?);
            } else if meta.path.is_ident("polymorphic") {
                result.polymorphic = flag(&meta)?;
            } else if meta.path.is_ident("translate_names") {
                result.translate_names = Some(flag(&meta)?);
            } else {
                return Err(meta.error("unsupported #[record] type attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

pub(crate) fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();
    for attr in record_attrs(attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                if result.id {
                    return Err(meta.error("field already marked as #[record(id)]"));
                }
                result.id = true;
            } else if meta.path.is_ident("reference") {
                let mut reference = ReferenceAttrs::default();
                if has_arguments(&meta) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("lazy") {
                            reference.lazy = flag(&inner)?;
                        } else if inner.path.is_ident("auto_store") {
                            reference.auto_store = flag(&inner)?;
                        } else if inner.path.is_ident("name") {
                            reference.name = Some(string(&inner)?);
                        } else {
                            return Err(inner.error("expected `lazy`, `auto_store` or `name`"));
                        }
                        Ok(())
                    })?;
                }
                result.reference = Some(reference);
            } else if meta.path.is_ident("alias") {
                result.aliases.push(string(&meta)?);
            } else if meta.path.is_ident("version") {
                let mut name = None;
                if has_arguments(&meta) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("name") {
                            name = Some(string(&inner)?);
                            Ok(())
                        } else {
                            Err(inner.error("expected `name`"))
                        }
                    })?;
                }
                result.version = Some(name);
            } else if meta.path.is_ident("additional_data") {
                let mut read_only = false;
                if has_arguments(&meta) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("read_only") {
                            read_only = flag(&inner)?;
                            Ok(())
                        } else {
                            Err(inner.error("expected `read_only`"))
                        }
                    })?;
                }
                result.additional_data = Some(read_only);
            } else if meta.path.is_ident("encrypted") {
                let mut key = None;
                if has_arguments(&meta) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("key") {
                            key = Some(string(&inner)?);
                            Ok(())
                        } else {
                            Err(inner.error("expected `key`"))
                        }
                    })?;
                }
                result.encrypted = Some(key);
            } else if meta.path.is_ident("read_only") {
                result.read_only = flag(&meta)?;
            } else if meta.path.is_ident("use_if_null") {
                result.use_if_null = flag(&meta)?;
            } else if meta.path.is_ident("transient") {
                result.transient = flag(&meta)?;
            } else if meta.path.is_ident("flatten") {
                result.flatten = true;
            } else if meta.path.is_ident("rename") {
                result.rename = Some(string(&meta)?);
            } else if meta.path.is_ident("translate") {
                result.translate = Some(flag(&meta)?);
            } else {
                return Err(meta.error("unsupported #[record] field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

/// Variant attributes of a mapped enum: only `rename`.
pub(crate) fn parse_variant_rename(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in record_attrs(attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                rename = Some(string(&meta)?);
                Ok(())
            } else {
                Err(meta.error("unsupported #[record] variant attribute"))
            }
        })?;
    }
    Ok(rename)
}
