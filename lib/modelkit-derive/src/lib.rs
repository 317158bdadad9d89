use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Lit, parse_macro_input};

/// Convert CamelCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);

    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Parsed `#[table(name = "...", pk = "...")]` arguments
struct TableAttr {
    name: Option<String>,
    pk: Option<String>,
}

/// Parse every #[table(...)] attribute on the type
fn parse_table_attr(input: &DeriveInput) -> syn::Result<TableAttr> {
    let mut parsed = TableAttr {
        name: None,
        pk: None,
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("table") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let key = if meta.path.is_ident("name") {
                &mut parsed.name
            } else if meta.path.is_ident("pk") {
                &mut parsed.pk
            } else {
                return Err(meta.error("expected `name` or `pk`"));
            };
            meta.input.parse::<syn::Token![=]>()?;
            let lit: Lit = meta.input.parse()?;
            match lit {
                Lit::Str(s) => {
                    *key = Some(s.value());
                    Ok(())
                }
                other => Err(syn::Error::new_spanned(other, "expected a string literal")),
            }
        })?;
    }

    Ok(parsed)
}

/// Derive macro for the `Table` trait.
///
/// Attributes (all optional):
/// - `name`: the table name (default: the type name in snake_case)
/// - `pk`: the primary-key column (default: `"id"`)
///
/// Example:
/// ```text
/// #[derive(Table, Serialize, Deserialize)]
/// #[table(name = "t_users", pk = "uid")]
/// pub struct User {
///     pub uid: i64,
///     pub name: String,
/// }
/// ```
#[proc_macro_derive(Table, attributes(table))]
pub fn derive_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let type_name = &input.ident;

    let attr = match parse_table_attr(&input) {
        Ok(attr) => attr,
        Err(e) => return e.to_compile_error().into(),
    };
    let table_name = attr
        .name
        .unwrap_or_else(|| to_snake_case(&type_name.to_string()));
    let primary_key = attr.pk.unwrap_or_else(|| "id".to_string());

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::modelkit::Table for #type_name #ty_generics #where_clause {
            fn table_name() -> &'static str {
                #table_name
            }

            fn primary_key() -> &'static str {
                #primary_key
            }
        }
    };

    TokenStream::from(expanded)
}
