pub use darling::{
    FromAttributes,
    util::{Flag, Override, PathList},
};
pub use heck::ToSnakeCase;
pub use itertools::Itertools;
pub use proc_macro2::{Span, TokenStream};
pub use quote::quote;
pub use syn::{Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, parse2};
