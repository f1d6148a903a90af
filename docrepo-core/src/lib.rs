//! A typed repository layer over document databases.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Repository** ([`repository`]) - Typed create/read/update/delete, index, bulk and
//!   aggregation operations over one named collection
//! - **Store contract** ([`backend`], [`cursor`]) - The operations a document store must offer
//! - **Find results** ([`result`]) - Deferred decoding of single lookups and streaming cursors
//! - **Entities** ([`entity`]) - Identity, lifecycle hooks and audited base records
//! - **Builders** ([`update`], [`aggregate`], [`index`], [`bulk`], [`operator`]) - Update
//!   documents, pipelines, index specifications, write batches and the operator catalog
//! - **Execution** ([`config`], [`context`]) - Query timeouts, default sorting and
//!   per-operation deadlines
//! - **Error handling** ([`error`]) - The error taxonomy shared by every store
//!
//! # Example
//!
//! ```ignore
//! use docrepo_core::{entity::{EntityBase, Entity}, repository::Repository};
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize)]
//! pub struct User {
//!     #[serde(flatten)]
//!     pub base: EntityBase,
//!     pub name: String,
//! }
//!
//! impl Entity for User {
//!     fn object_id(&self) -> bson::oid::ObjectId {
//!         self.base.id
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod aggregate;
pub mod backend;
pub mod bulk;
pub mod config;
pub mod context;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod index;
pub mod operator;
pub mod options;
pub mod page;
pub mod repository;
pub mod result;
pub mod update;
