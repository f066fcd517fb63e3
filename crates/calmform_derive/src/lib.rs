use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{
    Data, DeriveInput, Field, Fields, GenericArgument, Lit, LitStr, PathArguments, Type,
    parse_macro_input,
};

#[proc_macro_derive(FormSchema, attributes(form))]
pub fn derive_form_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormSchema derive currently supports only non-generic structs",
        ));
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormSchema derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormSchema derive is only supported on structs",
            ));
        }
    };

    let calmform = calmform_path();
    let mut field_methods = Vec::new();
    let mut shape_fields = Vec::new();

    for field in &named_fields {
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let field_name = field_ident.to_string();
        let field_name = field_name.trim_start_matches("r#");
        let rules = parse_rules(field)?;
        let schema = schema_expr(&field.ty, &rules, &calmform)?;

        field_methods.push(quote! {
            pub fn #field_ident(&self) -> #calmform::form::FieldKey {
                #calmform::form::FieldKey::new(#field_name)
            }
        });
        shape_fields.push(quote! {
            .field(#field_name, #schema)
        });
    }

    Ok(quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#field_methods)*
        }

        impl #calmform::form::FormSchema for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn schema() -> #calmform::schema::ObjectSchema {
                #calmform::schema::ObjectSchema::new()
                    #(#shape_fields)*
            }
        }
    })
}

enum Rule {
    Email(Span),
    Nonempty(Span),
    Min(Lit),
    Max(Lit),
    Message(LitStr),
}

impl Rule {
    fn span(&self) -> Span {
        match self {
            Rule::Email(span) | Rule::Nonempty(span) => *span,
            Rule::Min(lit) | Rule::Max(lit) => lit.span(),
            Rule::Message(lit) => lit.span(),
        }
    }
}

fn parse_rules(field: &Field) -> syn::Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            let span = meta.path.get_ident().map_or_else(Span::call_site, Ident::span);
            if meta.path.is_ident("email") {
                rules.push(Rule::Email(span));
            } else if meta.path.is_ident("nonempty") {
                rules.push(Rule::Nonempty(span));
            } else if meta.path.is_ident("min") {
                rules.push(Rule::Min(meta.value()?.parse()?));
            } else if meta.path.is_ident("max") {
                rules.push(Rule::Max(meta.value()?.parse()?));
            } else if meta.path.is_ident("message") {
                rules.push(Rule::Message(meta.value()?.parse()?));
            } else {
                return Err(meta.error("unsupported form attribute"));
            }
            Ok(())
        })?;
    }
    Ok(rules)
}

enum Kind<'a> {
    String,
    Boolean,
    Integer,
    Float,
    Array(&'a Type),
    Optional(&'a Type),
    Nested,
}

fn classify(ty: &Type) -> Kind<'_> {
    let Type::Path(path) = ty else {
        return Kind::Nested;
    };
    if path.qself.is_some() {
        return Kind::Nested;
    }
    let Some(segment) = path.path.segments.last() else {
        return Kind::Nested;
    };
    let name = segment.ident.to_string();
    match name.as_str() {
        "String" => Kind::String,
        "bool" => Kind::Boolean,
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => Kind::Integer,
        "f32" | "f64" => Kind::Float,
        "Vec" => first_type_argument(&segment.arguments).map_or(Kind::Nested, Kind::Array),
        "Option" => first_type_argument(&segment.arguments).map_or(Kind::Nested, Kind::Optional),
        _ => Kind::Nested,
    }
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(arguments) = arguments else {
        return None;
    };
    arguments.args.iter().find_map(|argument| match argument {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn schema_expr(ty: &Type, rules: &[Rule], calmform: &TokenStream2) -> syn::Result<TokenStream2> {
    let schema = quote!(#calmform::schema::Schema);
    let builder = match classify(ty) {
        Kind::Optional(inner) => {
            let inner = schema_expr(inner, rules, calmform)?;
            return Ok(quote!(#schema::from(#inner).optional()));
        }
        Kind::Boolean => {
            reject_rules(rules, "bool fields take no form rules")?;
            return Ok(quote!(#schema::boolean()));
        }
        Kind::Nested => {
            reject_rules(rules, "nested form fields take no form rules")?;
            return Ok(quote!(
                #schema::object(<#ty as #calmform::form::FormSchema>::schema())
            ));
        }
        Kind::String => {
            let mut builder = quote!(#schema::string());
            for rule in rules {
                builder = match rule {
                    Rule::Email(_) => quote!(#builder.email()),
                    Rule::Nonempty(_) => quote!(#builder.nonempty()),
                    Rule::Min(lit) => quote!(#builder.min(#lit)),
                    Rule::Max(lit) => quote!(#builder.max(#lit)),
                    Rule::Message(lit) => quote!(#builder.message(#lit)),
                };
            }
            builder
        }
        kind @ (Kind::Integer | Kind::Float) => {
            let mut builder = match kind {
                Kind::Integer => quote!(#schema::number().int()),
                _ => quote!(#schema::number()),
            };
            for rule in rules {
                builder = match rule {
                    Rule::Min(lit) => quote!(#builder.min((#lit) as f64)),
                    Rule::Max(lit) => quote!(#builder.max((#lit) as f64)),
                    Rule::Message(lit) => quote!(#builder.message(#lit)),
                    other => {
                        return Err(syn::Error::new(
                            other.span(),
                            "numeric fields support only min, max and message",
                        ));
                    }
                };
            }
            builder
        }
        Kind::Array(item) => {
            let item = schema_expr(item, &[], calmform)?;
            let mut builder = quote!(#schema::array(#item));
            for rule in rules {
                builder = match rule {
                    Rule::Nonempty(_) => quote!(#builder.nonempty()),
                    Rule::Min(lit) => quote!(#builder.min(#lit)),
                    Rule::Max(lit) => quote!(#builder.max(#lit)),
                    Rule::Message(lit) => quote!(#builder.message(#lit)),
                    Rule::Email(span) => {
                        return Err(syn::Error::new(
                            *span,
                            "email applies to string fields only",
                        ));
                    }
                };
            }
            builder
        }
    };
    Ok(quote!(#schema::from(#builder)))
}

fn reject_rules(rules: &[Rule], message: &str) -> syn::Result<()> {
    match rules.first() {
        Some(rule) => Err(syn::Error::new(rule.span(), message)),
        None => Ok(()),
    }
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
