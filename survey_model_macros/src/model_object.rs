use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr};

pub fn derive_model_object(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Struct(_) => {
            let object_type = extract_object_type(&input.attrs)
                .unwrap_or_else(|| to_snake_case(&name.to_string()));
            quote! { survey_model::ObjectType::from(#object_type) }
        }
        Data::Enum(data_enum) => {
            let arms = data_enum.variants.iter().map(|variant| {
                let ident = &variant.ident;
                let object_type = extract_object_type(&variant.attrs)
                    .unwrap_or_else(|| to_snake_case(&ident.to_string()));
                let pattern = match &variant.fields {
                    Fields::Named(_) => quote! { Self::#ident { .. } },
                    Fields::Unnamed(_) => quote! { Self::#ident(..) },
                    Fields::Unit => quote! { Self::#ident },
                };
                quote! { #pattern => survey_model::ObjectType::from(#object_type), }
            });
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Union(_) => {
            return syn::Error::new_spanned(name, "ModelObject cannot be derived for unions")
                .to_compile_error()
                .into();
        }
    };

    let expanded = quote! {
        impl #impl_generics survey_model::ModelObject for #name #ty_generics #where_clause {
            fn object_type(&self) -> survey_model::ObjectType {
                #body
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_object_type(attrs: &[Attribute]) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        let mut object_type = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("object_type") {
                let value: LitStr = meta.value()?.parse()?;
                object_type = Some(value.value());
            }
            Ok(())
        });

        if object_type.is_some() {
            return object_type;
        }
    }

    None
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
