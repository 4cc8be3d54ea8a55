//! Arrow Flight client for the skiff document store.
//!
//! Wraps the Flight RPC surface — collection creation, queries, uploads —
//! and composes with [`skiff_core`] for typed decoding of query results:
//!
//! ```no_run
//! use skiff_client::Client;
//! use skiff_core::{DocSet, Registry};
//! # use skiff_core::{Descriptor, Doc, Field, ShapeRef};
//! # struct Span;
//! # impl Doc for Span {
//! #     fn descriptor() -> Descriptor {
//! #         Descriptor::struct_of::<Span>("Span", vec![
//! #             Field::new("name", ShapeRef::of::<String>()),
//! #         ])
//! #     }
//! # }
//!
//! # async fn run() -> Result<(), skiff_client::ClientError> {
//! let reg = Registry::new();
//! let mut client = Client::connect("http://localhost:8089").await?;
//! let mut docs = DocSet::<Span>::new(&reg);
//! client
//!     .query_docs(&reg, b"select * from spans".as_slice(), &mut docs)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod error;
pub mod schema;

pub use client::Client;
pub use error::{ClientError, ClientResult};
pub use schema::{derive_schema, DateFormat, SchemaError, LAYOUT_METADATA_KEY};
