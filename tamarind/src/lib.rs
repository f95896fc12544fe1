//! Tamarind is an Active Record document mapper for `MongoDB`.
//!
//! A [`Model`] describes a collection; an [`Entity`] is one document of it.
//! Entities read and write fields freely, persist only whitelisted fields,
//! and resolve references to documents of other collections on first
//! access.
//!
//! ## Example
//!
//! ```no_run
//! use tamarind::{Connection, ConnectionOptions, Finder, FindOptions, Model};
//! use std::sync::Arc;
//!
//! #[derive(Default, Model)]
//! #[model(collection = "users", whitelist(name, email, friend))]
//! struct User;
//!
//! # async fn run() -> tamarind::Result<()> {
//! let conn = Connection::init(ConnectionOptions::new().db("blog")).await?;
//! conn.register(Arc::new(User))?;
//!
//! // Insert: `_id`, `id` and `created_at` are assigned on save
//! let mut martyn = User::new([("name", "Martyn"), ("email", "martyn@example.com")])?;
//! martyn.save(&conn, [("admin", true)]).await?; // `admin` is not whitelisted
//!
//! // Store a reference to another document
//! let mut kit = User::create(&conn, [("name", "Kit")]).await?;
//! kit.save(&conn, [("friend", martyn.clone())]).await?;
//!
//! // Query by related entity, then resolve the reference
//! let mut found = User::find_one_or_fail(&conn, [("friend", martyn)], FindOptions::new()).await?;
//! let friend = found.get(&conn, "friend").await?;
//!
//! // Plain documents, two levels deep
//! let document = found.to_array(&conn, tamarind::DEFAULT_DEPTH).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate self as tamarind;

mod config;
mod connection;
mod entity;
mod error;
mod iter;
mod model;
mod options;

pub mod reference;
pub mod store;
pub mod value;

#[cfg(feature = "meta")]
pub mod meta;

pub use config::{
    ConnectionOptions, DEFAULT_COUNTERS_COLLECTION, DEFAULT_HOST, DEFAULT_PORT, SequenceStrategy,
};
pub use connection::{ClassMap, Connection, Connections};
pub use entity::{DEFAULT_DEPTH, DEPTH_PLACEHOLDER, Entity};
pub use error::{Error, Result};
pub use iter::Entities;
pub use model::{CustomGetter, CustomSetter, Finder, Model, Validator};
pub use mongodb;
pub use options::{DeleteOptions, FindOptions, PushOptions, UpdateOptions};
pub use reference::DbRef;
pub use tamarind_macros::Model;
pub use value::{Fields, IntoFields, Value};

#[cfg(feature = "meta")]
#[doc(hidden)]
#[macro_export]
macro_rules! __register_model {
    ($model: ty, $collection: expr) => {
        $crate::meta::inventory::submit! {
            $crate::meta::ModelMetadataWrapper($crate::meta::ModelMetadata::new(
                $collection,
                $crate::meta::model_of::<$model>,
            ))
        }
    };
}

#[cfg(not(feature = "meta"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __register_model {
    ($model: ty, $collection: expr) => {};
}
