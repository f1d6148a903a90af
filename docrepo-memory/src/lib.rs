//! In-memory document storage backend for docrepo.
//!
//! This crate provides a thread-safe, in-memory implementation of the collection
//! contract. It uses async-aware read-write locks for concurrent access and is meant
//! for development, testing and small deployments.
//!
//! # Features
//!
//! - **Query operators** - Comparison, logical, element and array operators on dotted paths
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$push`, `$addToSet`, `$pull`,
//!   `$pullAll`, `$pop` and `$setOnInsert`, plus upserts
//! - **Aggregation** - `$match`, `$group`, `$sort`, `$skip`, `$limit`, `$project`,
//!   `$unwind` and `$count`
//! - **Indexes** - Unique and sparse indexes enforced with the server's duplicate-key code
//!
//! Transactional sessions are accepted but not isolated.
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = Repository::builder(InMemoryStore::new())
//!         .database("app")
//!         .collection("users")
//!         .build()
//!         .await?;
//!
//!     let mut user = bson::doc! { "name": "Alice" };
//!     repository.create(&mut user).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

pub mod evaluator;
mod modifier;
mod pipeline;
pub mod store;

pub use store::{InMemoryCollection, InMemoryStore, InMemoryStoreBuilder};
