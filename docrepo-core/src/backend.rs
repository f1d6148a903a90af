//! The document store contract.
//!
//! A repository issues every operation through a [`CollectionBackend`], a handle onto
//! one named collection. A [`CollectionProvider`] hands such handles out per database and
//! collection name. Backends own the network client or the in-memory state and are
//! never closed by a repository.
//!
//! # Contract
//!
//! - Every method receives the [`ExecutionContext`] of the calling operation. Deadlines
//!   and cancellation are enforced by the caller through [`ExecutionContext::run`]. A
//!   backend only inspects the context to pick up a transactional session.
//! - Write failures carrying a server error code are reported as
//!   [`DocumentStoreError::Write`](crate::error::DocumentStoreError::Write) so the
//!   repository can classify them. Anything else becomes
//!   [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
//! - `find_one` and `find_one_and_update` report "nothing matched" as `Ok(None)`.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    bulk::{BulkWriteResult, WriteModel},
    context::ExecutionContext,
    cursor::DocumentCursor,
    error::DocumentStoreResult,
    index::IndexModel,
    options::{
        AggregateOptions, BulkWriteOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        ReplaceOptions, UpdateOptions,
    },
};

pub type BoxedCursor = Box<dyn DocumentCursor>;

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyResult {
    /// Generated identifiers keyed by the position of the inserted document.
    pub inserted_ids: HashMap<usize, Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Operations against one named collection.
///
/// Implementations must be safe to share between tasks; a repository clones the handle
/// freely.
#[async_trait]
pub trait CollectionBackend: Send + Sync + Debug {
    /// The collection name.
    fn name(&self) -> &str;

    /// Streams every document matching `filter`.
    async fn find(
        &self,
        context: &ExecutionContext,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<BoxedCursor>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<Document>>;

    async fn count_documents(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<u64>;

    /// Returns a count from collection metadata rather than a scan.
    async fn estimated_document_count(&self, context: &ExecutionContext) -> DocumentStoreResult<u64>;

    /// Returns the distinct values of `field` among documents matching `filter`.
    async fn distinct(
        &self,
        context: &ExecutionContext,
        field: &str,
        filter: Document,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Inserts `document`. The store generates an `_id` if the document has none.
    async fn insert_one(&self, context: &ExecutionContext, document: Document) -> DocumentStoreResult<InsertOneResult>;

    async fn insert_many(
        &self,
        context: &ExecutionContext,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult>;

    async fn update_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult>;

    async fn update_many(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Updates the first match and returns it as selected by `options.return_document`.
    async fn find_one_and_update(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentStoreResult<Option<Document>>;

    async fn replace_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> DocumentStoreResult<UpdateResult>;

    async fn delete_one(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<DeleteResult>;

    async fn delete_many(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<DeleteResult>;

    /// Applies `models` in order. With `options.ordered` the first failure stops the run.
    async fn bulk_write(
        &self,
        context: &ExecutionContext,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult>;

    /// Runs an aggregation pipeline and streams its output.
    async fn aggregate(
        &self,
        context: &ExecutionContext,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DocumentStoreResult<BoxedCursor>;

    /// Creates the given indexes and returns their names.
    async fn create_indexes(
        &self,
        context: &ExecutionContext,
        models: Vec<IndexModel>,
    ) -> DocumentStoreResult<Vec<String>>;

    /// Lists index specifications as documents (`name`, `key`, `unique`, ...).
    async fn list_indexes(&self, context: &ExecutionContext) -> DocumentStoreResult<Vec<Document>>;

    async fn drop_index(&self, context: &ExecutionContext, name: &str) -> DocumentStoreResult<()>;

    /// Drops every index except the one on `_id`.
    async fn drop_indexes(&self, context: &ExecutionContext) -> DocumentStoreResult<()>;
}

pub type CollectionHandle = Arc<dyn CollectionBackend>;

/// Hands out collection handles by database and collection name.
#[async_trait]
pub trait CollectionProvider: Send + Sync + Debug {
    async fn collection(&self, database: &str, name: &str) -> DocumentStoreResult<CollectionHandle>;
}

#[async_trait]
impl<P> CollectionProvider for Arc<P>
where
    P: CollectionProvider + ?Sized,
{
    async fn collection(&self, database: &str, name: &str) -> DocumentStoreResult<CollectionHandle> {
        (**self).collection(database, name).await
    }
}

#[async_trait]
impl<P> CollectionProvider for &P
where
    P: CollectionProvider + ?Sized,
{
    async fn collection(&self, database: &str, name: &str) -> DocumentStoreResult<CollectionHandle> {
        (**self).collection(database, name).await
    }
}

/// Factory for store providers that need asynchronous setup.
#[async_trait]
pub trait StoreBuilder {
    type Store: CollectionProvider;

    async fn build(self) -> DocumentStoreResult<Self::Store>;
}
