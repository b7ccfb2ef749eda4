//! Derive macro for Trellis database records.
//!
//! `#[derive(Record)]` walks the struct's named fields at compile time
//! and generates the field declarations and path-addressed binding the
//! scanner needs. Field behaviour is controlled with `#[db(...)]`
//! attributes:
//!
//! - `#[db("column_name")]` maps the field to an explicit column
//! - no attribute maps the field to its lower-cased name
//! - `#[db(skip)]` excludes the field from scanning
//! - `#[db(flatten)]` splices an embedded record's columns, prefixing
//!   their field paths with this field's name
//!
//! # Example
//!
//! ```ignore
//! use trellis_db::Record;
//!
//! #[derive(Debug, Default, Record)]
//! struct User {
//!     #[db(flatten)]
//!     base: BaseModel,
//!     name: String,
//!     #[db("email")]
//!     email: String,
//!     #[db(skip)]
//!     password_plain: String,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

enum FieldKind {
    /// Mapped column; an empty tag defers to the scanner's
    /// lower-cased-name default.
    Column(String),
    Skip,
    Flatten,
}

fn field_kind(field: &syn::Field) -> syn::Result<FieldKind> {
    for attr in &field.attrs {
        if !attr.path().is_ident("db") {
            continue;
        }
        let list = attr.meta.require_list()?;
        let tokens = list.tokens.clone();

        if let Ok(lit) = syn::parse2::<syn::LitStr>(tokens.clone()) {
            return Ok(FieldKind::Column(lit.value()));
        }
        if let Ok(ident) = syn::parse2::<syn::Ident>(tokens) {
            return match ident.to_string().as_str() {
                "skip" => Ok(FieldKind::Skip),
                "flatten" => Ok(FieldKind::Flatten),
                other => Err(syn::Error::new_spanned(
                    attr,
                    format!("unknown db attribute `{other}`; expected a column name literal, `skip`, or `flatten`"),
                )),
            };
        }
        return Err(syn::Error::new_spanned(
            attr,
            "expected #[db(\"column\")], #[db(skip)], or #[db(flatten)]",
        ));
    }
    Ok(FieldKind::Column(String::new()))
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Record can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            input,
            "Record requires named fields",
        ));
    };

    let mut specs = Vec::new();
    let mut arms = Vec::new();

    for field in &fields.named {
        let ident = field.ident.as_ref().expect("named field has an ident");
        let field_name = ident.to_string();
        let ty = &field.ty;

        match field_kind(field)? {
            FieldKind::Column(tag) => {
                specs.push(quote! {
                    trellis_db::record::FieldDecl::Column {
                        field: #field_name,
                        tag: #tag,
                    }
                });
                arms.push(quote! {
                    [#field_name] => {
                        self.#ident = trellis_db::record::FromValue::from_value(value)?;
                        Ok(())
                    }
                });
            }
            FieldKind::Skip => {
                specs.push(quote! {
                    trellis_db::record::FieldDecl::Column {
                        field: #field_name,
                        tag: "-",
                    }
                });
            }
            FieldKind::Flatten => {
                specs.push(quote! {
                    trellis_db::record::FieldDecl::Embedded {
                        field: #field_name,
                        fields: <#ty as trellis_db::record::Record>::fields,
                    }
                });
                arms.push(quote! {
                    [#field_name, rest @ ..] => {
                        trellis_db::record::Record::bind(&mut self.#ident, rest, value)
                    }
                });
            }
        }
    }

    Ok(quote! {
        impl trellis_db::record::Record for #name {
            fn fields() -> ::std::vec::Vec<trellis_db::record::FieldDecl> {
                ::std::vec![ #( #specs ),* ]
            }

            fn bind(
                &mut self,
                path: &[&str],
                value: trellis_db::Value,
            ) -> ::std::result::Result<(), trellis_db::record::ScanError> {
                match path {
                    #( #arms )*
                    _ => Err(trellis_db::record::ScanError::UnknownField {
                        path: path.join("."),
                    }),
                }
            }
        }
    })
}

/// Derives the `Record` trait for a struct with named fields.
#[proc_macro_derive(Record, attributes(db))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
