//! Main docrepo crate providing typed repositories over document databases.
//!
//! This crate is the primary entry point for users of the docrepo framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! access to the storage backends.
//!
//! # Features
//!
//! - **Typed repositories** - Create, read, update and delete Serde entities by `ObjectId`
//! - **Lifecycle hooks** - Identity assignment and audit timestamps before writes
//! - **Builders** - Update documents, aggregation pipelines, indexes and bulk writes
//! - **Deadlines** - Every operation runs under a configurable timeout and can be cancelled
//! - **Multiple backends** - In-memory storage, and MongoDB behind the `mongodb` feature
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, entity::AuditedEntity, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Entity)]
//! pub struct User {
//!     #[serde(flatten)]
//!     #[entity(base)]
//!     pub audit: AuditedEntity,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let users = Repository::builder(InMemoryStore::new())
//!         .database("app")
//!         .collection("users")
//!         .configuration(Configuration::builder().with_default_sort_field("creationTime").build())
//!         .build()
//!         .await?;
//!
//!     let mut user = User { name: "Alice".into(), ..Default::default() };
//!     let id = users.create(&mut user).await?;
//!
//!     user.name = "Alice Liddell".into();
//!     users.find_one_and_update(&mut user).await?;
//!
//!     let found: Option<User> = users.find_by_object_id_as(id).await?;
//!     println!("{found:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Streaming
//!
//! Finds return a [`FindResult`](result::FindResult) that decodes lazily, either all at
//! once or as a stream:
//!
//! ```ignore
//! use futures::TryStreamExt;
//!
//! let names = users
//!     .find_by_filter(doc! { "active": true }, FindOptions::default())
//!     .await
//!     .into_stream::<User>()
//!     .map_ok(|user| user.name)
//!     .try_collect::<Vec<_>>()
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docrepo_core::{
    aggregate, backend, bulk, config, context, cursor, entity, error, index, operator, options, page, repository,
    result, update,
};

pub use docrepo_macros::Entity;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrepo_memory::{InMemoryCollection, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoCollection, MongoCursor, MongoSession, MongoStore, MongoStoreBuilder};
}
