//! Procedural macros for the docrepo project.
//!
//! `#[derive(Entity)]` implements `docrepo::entity::Entity` for a struct:
//!
//! ```ignore
//! use docrepo::{prelude::*, entity::AuditedEntity};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Entity)]
//! #[entity(validate)]
//! pub struct Invoice {
//!     #[serde(flatten)]
//!     #[entity(base)]
//!     pub audit: AuditedEntity,
//!     pub total: i64,
//! }
//!
//! impl Validation for Invoice {
//!     fn validate(&self) -> Result<(), String> {
//!         (self.total >= 0).then_some(()).ok_or_else(|| "negative total".into())
//!     }
//! }
//! ```
//!
//! - `#[entity(base)]` on a field delegates the identifier and lifecycle hooks to it.
//! - `#[entity(id)]` on an `ObjectId` field only supplies the identifier.
//! - `#[entity(validate)]` on the struct routes validation to its `Validation` impl.

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Member, parse_macro_input, spanned::Spanned};

enum IdentitySource {
    Base(Member),
    Id(Member),
}

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let mut validate = false;
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("validate") {
                validate = true;
                Ok(())
            } else {
                Err(meta.error("expected `validate`"))
            }
        })?;
    }

    let source = identity_source(&input)?;

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let hooks = match &source {
        IdentitySource::Base(member) => quote! {
            fn object_id(&self) -> ::docrepo::bson::oid::ObjectId {
                ::docrepo::entity::Entity::object_id(&self.#member)
            }

            fn as_before_create(&mut self) -> ::core::option::Option<&mut dyn ::docrepo::entity::BeforeCreate> {
                ::docrepo::entity::Entity::as_before_create(&mut self.#member)
            }

            fn as_before_update(&mut self) -> ::core::option::Option<&mut dyn ::docrepo::entity::BeforeUpdate> {
                ::docrepo::entity::Entity::as_before_update(&mut self.#member)
            }
        },
        IdentitySource::Id(member) => quote! {
            fn object_id(&self) -> ::docrepo::bson::oid::ObjectId {
                self.#member
            }
        },
    };

    let validation = validate.then(|| {
        quote! {
            fn as_validation(&self) -> ::core::option::Option<&dyn ::docrepo::entity::Validation> {
                ::core::option::Option::Some(self)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::docrepo::entity::Entity for #name #ty_generics #where_clause {
            #hooks
            #validation
        }
    })
}

fn identity_source(input: &DeriveInput) -> syn::Result<IdentitySource> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "Entity can only be derived for structs"));
    };

    let fields = match &data.fields {
        Fields::Named(fields) => &fields.named,
        Fields::Unnamed(fields) => &fields.unnamed,
        Fields::Unit => {
            return Err(syn::Error::new(input.span(), "Entity requires a field marked #[entity(base)] or #[entity(id)]"));
        }
    };

    let mut source = None;
    for (index, field) in fields.iter().enumerate() {
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(index.into()),
        };

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
            let mut found = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("base") {
                    found = Some(IdentitySource::Base(member.clone()));
                    Ok(())
                } else if meta.path.is_ident("id") {
                    found = Some(IdentitySource::Id(member.clone()));
                    Ok(())
                } else {
                    Err(meta.error("expected `base` or `id`"))
                }
            })?;

            if found.is_some() && source.is_some() {
                return Err(syn::Error::new(
                    attr.span(),
                    "only one field may be marked #[entity(base)] or #[entity(id)]",
                ));
            }
            source = source.or(found);
        }
    }

    source.ok_or_else(|| {
        syn::Error::new(
            input.ident.span(),
            "Entity requires a field marked #[entity(base)] or #[entity(id)]",
        )
    })
}
