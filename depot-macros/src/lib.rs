mod decode_field;

use decode_field::decode_field;
use proc_macro::TokenStream;
use quote::quote;
use syn::{Fields, ItemStruct, parse_macro_input};

/// Derive `Shape`, `Item` and `FromRow` for a struct with named fields.
///
/// Every field must be `Clone`, implement `AsValue` and the struct must be
/// `Default`. Fields map to the column of the same name (a leading underscore
/// is dropped), `#[depot(name = "column")]` renames it and `#[depot(ignore)]`
/// leaves the field out.
#[proc_macro_derive(Shape, attributes(depot))]
pub fn derive_shape(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    let name = &item.ident;
    if !item.generics.params.is_empty() {
        panic!("Shape cannot be derived on generic structs (`{}`)", name);
    }
    let Fields::Named(..) = &item.fields else {
        panic!("Shape can only be derived on structs with named fields (`{}`)", name);
    };
    let fields: Vec<_> = item
        .fields
        .iter()
        .map(decode_field)
        .filter(|v| !v.ignore)
        .collect();
    let count = fields.len();
    let definitions = fields.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        let field = ident.to_string();
        let column = &f.column;
        let nullable = f.nullable;
        quote! {
            ::depot::FieldDef {
                field: #field,
                column: #column,
                nullable: #nullable,
                get: |item: &#name| {
                    ::depot::AsValue::as_value(::std::clone::Clone::clone(&item.#ident))
                },
                set: |item: &mut #name, value: ::depot::Value| -> ::depot::Result<()> {
                    item.#ident = <#ty as ::depot::AsValue>::try_from_value(value)?;
                    Ok(())
                },
            }
        }
    });
    quote! {
        impl ::depot::Shape for #name {
            fn fields() -> &'static [::depot::FieldDef<Self>] {
                static FIELDS: [::depot::FieldDef<#name>; #count] = [#(#definitions),*];
                &FIELDS
            }
            fn index() -> &'static ::depot::ShapeIndex {
                static INDEX: ::std::sync::OnceLock<::depot::ShapeIndex> =
                    ::std::sync::OnceLock::new();
                INDEX.get_or_init(|| ::depot::ShapeIndex::new(<Self as ::depot::Shape>::fields()))
            }
        }
        impl ::depot::Item for #name {
            fn name_values(&self) -> ::std::vec::Vec<::depot::NameValue<'_>> {
                ::depot::shape_name_values(self)
            }
            fn write_key(&mut self, name: &str, value: ::depot::Value) -> ::depot::Result<bool> {
                ::depot::shape_write_key(self, name, value)
            }
        }
        impl ::depot::FromRow for #name {
            type Plan = ::depot::ShapePlan;
            fn plan(
                labels: &::depot::RowNames,
                options: &::depot::MappingOptions,
            ) -> ::depot::Result<Self::Plan> {
                ::depot::ShapePlan::new::<Self>(labels, options)
            }
            fn from_row(
                plan: &Self::Plan,
                values: ::depot::Row,
                row: usize,
            ) -> ::depot::Result<Self> {
                plan.build::<Self>(values, row)
            }
        }
    }
    .into()
}
