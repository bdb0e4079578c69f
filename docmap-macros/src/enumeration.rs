use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields};

use crate::attrs::{parse_type_attrs, parse_variant_rename};

pub(crate) fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let type_name = name.unraw().to_string();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "MappedEnum can only be derived for enums",
        ));
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "MappedEnum cannot be derived for generic types",
        ));
    }

    let type_attrs = parse_type_attrs(&input.attrs)?;
    let mut variants = Vec::new();
    let mut stored_names = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "MappedEnum variants cannot carry data",
            ));
        }
        let stored = parse_variant_rename(&variant.attrs)?
            .unwrap_or_else(|| variant.ident.unraw().to_string());
        variants.push(&variant.ident);
        stored_names.push(stored);
    }

    let discriminator = type_attrs
        .discriminator
        .as_ref()
        .map(|discriminator| quote!(.discriminator(#discriminator)));

    Ok(quote! {
        impl ::docmap_core::enumeration::MappedEnum for #name {
            fn declaration() -> ::docmap_core::enumeration::EnumDeclaration {
                ::docmap_core::enumeration::EnumDeclaration::new::<Self>(
                    #type_name,
                    &[#(#stored_names),*],
                )
                #discriminator
            }

            fn name(&self) -> &'static str {
                match self {
                    #(Self::#variants => #stored_names,)*
                }
            }

            fn from_name(name: &str) -> ::std::option::Option<Self> {
                match name {
                    #(#stored_names => ::std::option::Option::Some(Self::#variants),)*
                    _ => ::std::option::Option::None,
                }
            }
        }

        impl ::docmap_core::value::FieldValue for #name {
            fn value_type() -> ::docmap_core::value::ValueType {
                ::docmap_core::value::ValueType::Enum(
                    ::docmap_core::enumeration::EnumHandle::of::<Self>()
                )
            }

            fn to_value(&self) -> ::docmap_core::value::Value {
                ::docmap_core::value::Value::Enum(
                    ::docmap_core::enumeration::EnumValue::of(self)
                )
            }

            fn from_value(
                value: ::docmap_core::value::Value,
            ) -> ::docmap_core::error::MappingResult<Self> {
                value.into_enum::<Self>()
            }
        }
    })
}
