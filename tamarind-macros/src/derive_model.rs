use crate::{
    prelude::*,
    utils::{extract_serde_rename, krate},
};

#[derive(FromAttributes)]
#[darling(attributes(model))]
struct Attributes {
    collection: Option<Override<String>>,
    whitelist: Option<PathList>,
    getter: Flag,
    setter: Flag,
    validator: Flag,
    soft_deletes: Flag,
    register: Flag,
}

pub fn derive_model(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "generic models are not supported",
        ));
    }

    let attributes = Attributes::from_attributes(&input.attrs)?;

    let fields = named_fields(&input.data);

    let whitelist = match &attributes.whitelist {
        Some(paths) => paths
            .iter()
            .map(|path| {
                let ident = path
                    .get_ident()
                    .ok_or_else(|| Error::new_spanned(path, "expected ident"))?;

                match &fields {
                    Some(fields) => fields
                        .iter()
                        .find(|field| field.ident == *ident)
                        .map(|field| field.name.clone())
                        .ok_or_else(|| Error::new_spanned(ident, "unknown field")),
                    None => Ok(ident.to_string()),
                }
            })
            .try_collect::<_, Vec<_>, _>()?,
        None => fields
            .iter()
            .flatten()
            .map(|field| field.name.clone())
            .collect(),
    };

    let collection = match attributes.collection {
        Some(Override::Explicit(name)) => {
            if name.is_empty() {
                return Err(Error::new(
                    input.ident.span(),
                    "collection name must not be empty",
                ));
            }

            Some(name)
        }
        Some(Override::Inherit) => Some(default_collection_name(&input.ident)),
        None => None,
    };

    if attributes.register.is_present() && collection.is_none() {
        return Err(Error::new(
            attributes.register.span(),
            "`register` requires a collection",
        ));
    }

    let output = build(
        &input.ident,
        collection.as_deref(),
        &whitelist,
        &Capabilities {
            getter: attributes.getter.is_present(),
            setter: attributes.setter.is_present(),
            validator: attributes.validator.is_present(),
            soft_deletes: attributes.soft_deletes.is_present(),
            register: attributes.register.is_present(),
        },
    );

    Ok(output)
}

struct FieldConfig {
    ident: Ident,
    name: String,
}

struct Capabilities {
    getter: bool,
    setter: bool,
    validator: bool,
    soft_deletes: bool,
    register: bool,
}

/// Named fields of a struct, with their stored names. `None` for anything
/// else.
fn named_fields(data: &Data) -> Option<Vec<FieldConfig>> {
    let Data::Struct(data_struct) = data else {
        return None;
    };

    let Fields::Named(fields_named) = &data_struct.fields else {
        return None;
    };

    Some(
        fields_named
            .named
            .iter()
            .filter_map(|field| {
                let ident = field.ident.clone()?;
                let name = extract_serde_rename(field).unwrap_or_else(|| ident.to_string());

                Some(FieldConfig { ident, name })
            })
            .collect(),
    )
}

/// `UserModel` → `user`, `BlogPost` → `blog_post`.
fn default_collection_name(ident: &Ident) -> String {
    let snake_case = ident.to_string().to_snake_case();

    snake_case
        .strip_suffix("_model")
        .or_else(|| snake_case.strip_suffix("_entity"))
        .unwrap_or(&snake_case)
        .to_owned()
}

fn build(
    ident: &Ident,
    collection: Option<&str>,
    whitelist: &[String],
    capabilities: &Capabilities,
) -> TokenStream {
    let krate = krate();

    let collection_body = match collection {
        Some(name) => {
            let lit = LitStr::new(name, Span::call_site());
            quote! { ::std::option::Option::Some(#lit) }
        }
        None => quote! { ::std::option::Option::None },
    };

    let whitelist_lits = whitelist
        .iter()
        .map(|name| LitStr::new(name, Span::call_site()))
        .collect_vec();

    let getter = capabilities.getter.then(|| {
        quote! {
            fn getter(&self) -> ::std::option::Option<&dyn #krate::CustomGetter> {
                ::std::option::Option::Some(self)
            }
        }
    });

    let setter = capabilities.setter.then(|| {
        quote! {
            fn setter(&self) -> ::std::option::Option<&dyn #krate::CustomSetter> {
                ::std::option::Option::Some(self)
            }
        }
    });

    let validator = capabilities.validator.then(|| {
        quote! {
            fn validate(
                &self,
                entity: &#krate::Entity,
                errors: &mut ::std::vec::Vec<::std::string::String>,
            ) {
                #krate::Validator::validate(self, entity, errors);
            }
        }
    });

    let soft_deletes = capabilities.soft_deletes.then(|| {
        quote! {
            fn soft_deletes(&self) -> bool {
                true
            }
        }
    });

    let register = collection
        .filter(|_| capabilities.register)
        .map(|name| {
            let lit = LitStr::new(name, Span::call_site());
            quote! {
                #krate::__register_model!(#ident, #lit);
            }
        });

    quote! {
        impl #krate::Model for #ident {
            fn collection(&self) -> ::std::option::Option<&str> {
                #collection_body
            }

            fn whitelist(&self) -> &[&str] {
                &[ #( #whitelist_lits ),* ]
            }

            #getter

            #setter

            #validator

            #soft_deletes
        }

        #register
    }
}
