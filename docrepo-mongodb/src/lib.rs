//! MongoDB backend implementation for docrepo.
//!
//! This crate implements the collection contract on the official `mongodb` driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data lives in MongoDB Atlas or a self-hosted deployment
//! - **Transactions** - [`MongoSession`] carries a driver session through transactional contexts
//! - **Error classification** - Server write codes surface as `DocumentStoreError::Write`
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{prelude::*, mongodb::MongoStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoStore::builder("mongodb://localhost:27017").build().await?;
//!     let repository = Repository::builder(store.clone())
//!         .database("app")
//!         .collection("users")
//!         .build()
//!         .await?;
//!
//!     store
//!         .with_transaction(|session| async move {
//!             let scoped = repository.with_session(session);
//!             scoped.delete_many(Some(bson::doc! { "inactive": true })).await?;
//!             Ok(())
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

mod convert;
pub mod cursor;
mod error;
pub mod session;
pub mod store;

pub use cursor::MongoCursor;
pub use session::MongoSession;
pub use store::{MongoCollection, MongoStore, MongoStoreBuilder};
