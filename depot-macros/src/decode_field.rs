use quote::ToTokens;
use syn::{Field, GenericArgument, Ident, LitStr, PathArguments, Type, parse::ParseBuffer};

pub(crate) struct FieldMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) column: String,
    pub(crate) nullable: bool,
    pub(crate) ignore: bool,
}

/// `Option<T>` (also spelled with a path) is nullable.
fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident != "Option" {
        return false;
    }
    let PathArguments::AngleBracketed(arguments) = &last.arguments else {
        return false;
    };
    matches!(arguments.args.first(), Some(GenericArgument::Type(..)))
}

pub(crate) fn decode_field(field: &Field) -> FieldMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Shape can only be derived on structs with named fields");
    let mut column = ident.to_string();
    if column.starts_with('_') {
        column.remove(0);
    }
    let mut metadata = FieldMetadata {
        ident,
        ty: field.ty.clone(),
        column,
        nullable: is_option(&field.ty),
        ignore: false,
    };
    for attr in &field.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("depot") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `depot`, use it like: `#[depot(attribute = value, ...)]`");
        };
        let _ = list.parse_nested_meta(|arg| {
            if arg.path.is_ident("name") {
                let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `name`, use it like: `#[depot(name = \"my_column\")]`");
                };
                metadata.column = v.value();
            } else if arg.path.is_ident("ignore") {
                let Err(..) = arg.value() else {
                    // value() is Err for Meta::Path
                    panic!("Error while parsing `ignore`, use it like: `#[depot(ignore)]`");
                };
                metadata.ignore = true;
            } else {
                panic!(
                    "Unknown attribute `{}` inside depot macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
    }
    metadata
}
