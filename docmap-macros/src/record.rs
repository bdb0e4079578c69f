use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DataStruct, DeriveInput, Fields};

use crate::attrs::{FieldAttrs, parse_field_attrs, parse_type_attrs};

fn optional_string(value: &Option<String>) -> TokenStream {
    match value {
        Some(value) => quote!(::std::option::Option::Some(::std::string::String::from(#value))),
        None => quote!(::std::option::Option::None),
    }
}

fn directives(attrs: &FieldAttrs) -> TokenStream {
    let mut calls = Vec::new();
    if attrs.id {
        calls.push(quote!(.identity()));
    }
    if let Some(reference) = &attrs.reference {
        let lazy = reference.lazy;
        let auto_store = reference.auto_store;
        let name = optional_string(&reference.name);
        calls.push(quote! {
            .reference(::docmap_core::record::ReferenceDirective {
                lazy: #lazy,
                auto_store: #auto_store,
                name: #name,
            })
        });
    }
    for alias in &attrs.aliases {
        calls.push(quote!(.alias(#alias)));
    }
    if let Some(name) = &attrs.version {
        let name = optional_string(name);
        calls.push(quote!(.version(#name)));
    }
    if let Some(read_only) = attrs.additional_data {
        calls.push(quote!(.additional_data(#read_only)));
    }
    if attrs.read_only {
        calls.push(quote!(.read_only()));
    }
    if attrs.use_if_null {
        calls.push(quote!(.use_if_null()));
    }
    if let Some(key) = &attrs.encrypted {
        let key = optional_string(key);
        calls.push(quote!(.encrypted(#key)));
    }
    if attrs.transient {
        calls.push(quote!(.transient()));
    }
    if let Some(rename) = &attrs.rename {
        calls.push(quote!(.rename(#rename)));
    }
    if let Some(translate) = attrs.translate {
        calls.push(quote!(.translate(#translate)));
    }
    quote!(#(#calls)*)
}

pub(crate) fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let type_name = name.unraw().to_string();

    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(named),
            ..
        }) => &named.named,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Record can only be derived for structs with named fields",
            ));
        }
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic types",
        ));
    }

    let type_attrs = parse_type_attrs(&input.attrs)?;

    let mut names = Vec::new();
    let mut declarations = Vec::new();
    let mut read_arms = Vec::new();
    let mut write_arms = Vec::new();
    let mut flattened = Vec::new();
    let mut supertypes = Vec::new();

    for field in fields {
        let Some(ident) = &field.ident else { continue };
        let ty = &field.ty;
        let attrs = parse_field_attrs(&field.attrs)?;

        if attrs.flatten {
            flattened.push(ident);
            supertypes.push(quote! {
                .supertype(::docmap_core::record::RecordHandle::of::<#ty>())
            });
            continue;
        }

        let internal = ident.unraw().to_string();
        let directives = directives(&attrs);
        declarations.push(quote! {
            .field(::docmap_core::record::FieldDeclaration::of::<#ty>(#internal) #directives)
        });
        read_arms.push(quote! {
            #internal => ::std::result::Result::Ok(
                ::docmap_core::value::FieldValue::to_value(&self.#ident)
            ),
        });
        write_arms.push(quote! {
            #internal => {
                self.#ident = <#ty as ::docmap_core::value::FieldValue>::from_value(value)
                    .map_err(|error| error.in_field(#internal))?;
                ::std::result::Result::Ok(())
            }
        });
        names.push(internal);
    }

    let mut declaration = quote! {
        ::docmap_core::record::TypeDeclaration::new::<Self>(#type_name)
    };
    if type_attrs.embedded {
        declaration.extend(quote!(.embedded()));
    }
    if let Some(collection) = &type_attrs.collection {
        declaration.extend(quote!(.collection(#collection)));
    }
    if let Some(discriminator) = &type_attrs.discriminator {
        declaration.extend(quote!(.discriminator(#discriminator)));
    }
    if type_attrs.polymorphic {
        declaration.extend(quote!(.polymorphic()));
    }
    if let Some(translate) = type_attrs.translate_names {
        declaration.extend(quote!(.translate_names(#translate)));
    }

    Ok(quote! {
        impl ::docmap_core::record::Record for #name {
            fn record_type(&self) -> ::docmap_core::record::RecordHandle {
                ::docmap_core::record::RecordHandle::of::<Self>()
            }

            fn has_field(&self, name: &str) -> bool {
                let own: &[&str] = &[#(#names),*];
                own.contains(&name)
                    #(|| ::docmap_core::record::Record::has_field(&self.#flattened, name))*
            }

            fn read_field(
                &self,
                name: &str,
            ) -> ::docmap_core::error::MappingResult<::docmap_core::value::Value> {
                match name {
                    #(#read_arms)*
                    _ => {
                        #(
                            if ::docmap_core::record::Record::has_field(&self.#flattened, name) {
                                return ::docmap_core::record::Record::read_field(&self.#flattened, name);
                            }
                        )*
                        ::std::result::Result::Err(
                            ::docmap_core::error::MappingError::field_not_found(#type_name, name)
                        )
                    }
                }
            }

            #[allow(unused_variables)]
            fn write_field(
                &mut self,
                name: &str,
                value: ::docmap_core::value::Value,
            ) -> ::docmap_core::error::MappingResult<()> {
                match name {
                    #(#write_arms)*
                    _ => {
                        #(
                            if ::docmap_core::record::Record::has_field(&self.#flattened, name) {
                                return ::docmap_core::record::Record::write_field(&mut self.#flattened, name, value);
                            }
                        )*
                        ::std::result::Result::Err(
                            ::docmap_core::error::MappingError::field_not_found(#type_name, name)
                        )
                    }
                }
            }

            fn clone_record(&self) -> ::std::boxed::Box<dyn ::docmap_core::record::Record> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }

            fn into_any_arc(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + ::std::marker::Send + ::std::marker::Sync> {
                self
            }
        }

        impl ::docmap_core::record::RecordType for #name {
            fn declaration() -> ::docmap_core::record::TypeDeclaration {
                #declaration
                    #(#declarations)*
                    #(#supertypes)*
            }
        }

        impl ::docmap_core::value::FieldValue for #name {
            fn value_type() -> ::docmap_core::value::ValueType {
                ::docmap_core::value::ValueType::Record(
                    ::docmap_core::record::RecordHandle::of::<Self>()
                )
            }

            fn to_value(&self) -> ::docmap_core::value::Value {
                ::docmap_core::value::Value::Record(::std::boxed::Box::new(
                    ::std::clone::Clone::clone(self)
                ))
            }

            fn from_value(
                value: ::docmap_core::value::Value,
            ) -> ::docmap_core::error::MappingResult<Self> {
                value.into_record::<Self>()
            }
        }
    })
}
