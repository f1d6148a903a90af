//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The repository, its builder and find results
//! - Entity traits, audited bases and the `Entity` derive
//! - Option types and the update, pipeline, index and bulk builders
//! - Configuration, execution contexts and the store contract
//! - Error types

pub use docrepo_core::{
    aggregate::AggregatePipelineBuilder,
    backend::{CollectionBackend, CollectionHandle, CollectionProvider, StoreBuilder},
    bulk::{BulkWriteResult, WriteModel, build_write_models, build_write_models_with_object_id},
    config::{Configuration, ConfigurationBuilder, ResultItem},
    context::{ExecutionContext, SessionHandle, TransactionSession},
    entity::{AuditedEntity, BeforeCreate, BeforeUpdate, CreationAuditedEntity, Entity, EntityBase, Validation},
    error::{DocumentStoreError, DocumentStoreResult},
    index::{IndexDefinition, IndexModel, IndexOptions},
    operator::op,
    options::{
        AggregateOptions, BulkWriteOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        ReplaceOptions, ReturnDocument, UpdateOptions, sort_by,
    },
    page::{Page, PaginationParams},
    repository::{Repository, RepositoryBuilder},
    result::FindResult,
    update::UpdateBuilder,
};

pub use docrepo_macros::Entity;
