#[warn(clippy::pedantic)]
mod derive_model;
mod prelude;
mod utils;

fn expand<F: FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>>(
    fun: F,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    fun(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Implements `tamarind::Model`.
///
/// ```ignore
/// #[derive(Default, Model)]
/// #[model(collection = "users", whitelist(name, email), getter, soft_deletes)]
/// struct User {
///     name: String,
///     email: String,
///     password_hash: String,
/// }
/// ```
///
/// - `collection = "..."` names the backing collection; a bare `collection`
///   derives it from the type name (`BlogPost` → `blog_post`). Without it
///   the model has no collection and entities of it cannot be built.
/// - `whitelist(..)` lists the persisted fields. Defaults to every named
///   field, honoring `#[serde(rename)]`.
/// - `getter`, `setter` and `validator` route to the type's `CustomGetter`,
///   `CustomSetter` and `Validator` impls.
/// - `soft_deletes` marks documents with `deleted_at` instead of deleting.
/// - `register` adds the model to `ClassMap::registered()`.
#[proc_macro_derive(Model, attributes(model))]
pub fn model(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(derive_model::derive_model, input)
}
