use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, ser::serialize_to_document};
use futures::TryStreamExt;
use mongodb::{Client, Collection, options::ClientOptions};
use tracing::{debug, warn};

use docrepo_core::{
    backend::{
        BoxedCursor, CollectionBackend, CollectionHandle, CollectionProvider, DeleteResult, InsertManyResult,
        InsertOneResult, StoreBuilder, UpdateResult,
    },
    bulk::{BulkWriteResult, WriteModel},
    context::{ExecutionContext, SessionHandle},
    cursor::BufferedCursor,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexModel,
    options::{
        AggregateOptions, BulkWriteOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        ReplaceOptions, UpdateOptions,
    },
};

use crate::{
    convert,
    cursor::MongoCursor,
    error::map_error,
    session::{MongoSession, session_of},
};

/// Awaits a driver action, attaching the context's session when there is one.
macro_rules! with_session {
    ($context:expr, $action:expr) => {
        match session_of($context) {
            Some(session) => {
                let mut guard = session.session.lock().await;
                $action.session(&mut *guard).await
            }
            None => $action.await,
        }
    };
}

/// A MongoDB deployment reached through the official driver.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn builder(dsn: &str) -> MongoStoreBuilder {
        MongoStoreBuilder::new(dsn)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn start_session(&self) -> DocumentStoreResult<MongoSession> {
        MongoSession::start(&self.client).await
    }

    /// Runs `operation` inside a transaction, committing on success and aborting on
    /// error.
    pub async fn with_transaction<F, Fut, T>(&self, operation: F) -> DocumentStoreResult<T>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = DocumentStoreResult<T>>,
    {
        let session = Arc::new(self.start_session().await?);
        session.start_transaction().await?;

        match operation(Arc::clone(&session) as SessionHandle).await {
            Ok(value) => {
                session.commit_transaction().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(error = %abort, "failed to abort transaction");
                }
                Err(error)
            }
        }
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl CollectionProvider for MongoStore {
    async fn collection(&self, database: &str, name: &str) -> DocumentStoreResult<CollectionHandle> {
        let collection = self.client.database(database).collection::<Document>(name);

        Ok(Arc::new(MongoCollection::new(collection)))
    }
}

pub struct MongoStoreBuilder {
    dsn: String,
    app_name: Option<String>,
}

impl MongoStoreBuilder {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            app_name: None,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait]
impl StoreBuilder for MongoStoreBuilder {
    type Store = MongoStore;

    async fn build(self) -> DocumentStoreResult<Self::Store> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }

        debug!(hosts = ?options.hosts, app_name = ?options.app_name, "connecting to MongoDB");

        Ok(MongoStore::new(
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        ))
    }
}

/// One MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: Collection<Document>,
}

impl MongoCollection {
    pub fn new(inner: Collection<Document>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Collection<Document> {
        &self.inner
    }

    async fn apply_model(
        &self,
        context: &ExecutionContext,
        position: usize,
        model: WriteModel,
        result: &mut BulkWriteResult,
    ) -> DocumentStoreResult<()> {
        let updated = match model {
            WriteModel::InsertOne { document } => {
                with_session!(context, self.inner.insert_one(document)).map_err(map_error)?;
                result.inserted_count += 1;
                return Ok(());
            }
            WriteModel::DeleteOne { filter } => {
                let deleted = with_session!(context, self.inner.delete_one(filter)).map_err(map_error)?;
                result.deleted_count += deleted.deleted_count;
                return Ok(());
            }
            WriteModel::DeleteMany { filter } => {
                let deleted = with_session!(context, self.inner.delete_many(filter)).map_err(map_error)?;
                result.deleted_count += deleted.deleted_count;
                return Ok(());
            }
            WriteModel::UpdateOne { filter, update, upsert } => with_session!(
                context,
                self.inner
                    .update_one(filter, update)
                    .with_options(convert::update_options(UpdateOptions { upsert }))
            ),
            WriteModel::UpdateMany { filter, update, upsert } => with_session!(
                context,
                self.inner
                    .update_many(filter, update)
                    .with_options(convert::update_options(UpdateOptions { upsert }))
            ),
            WriteModel::ReplaceOne { filter, replacement, upsert } => with_session!(
                context,
                self.inner
                    .replace_one(filter, replacement)
                    .with_options(convert::replace_options(ReplaceOptions { upsert }))
            ),
        }
        .map_err(map_error)?;

        result.matched_count += updated.matched_count;
        result.modified_count += updated.modified_count;
        if let Some(id) = updated.upserted_id {
            result.upserted_count += 1;
            result.upserted_ids.insert(position, id);
        }

        Ok(())
    }
}

fn update_result(result: mongodb::results::UpdateResult) -> UpdateResult {
    UpdateResult {
        matched_count: result.matched_count,
        modified_count: result.modified_count,
        upserted_id: result.upserted_id,
    }
}

#[async_trait]
impl CollectionBackend for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(
        &self,
        context: &ExecutionContext,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<BoxedCursor> {
        let options = convert::find_options(options);

        match session_of(context) {
            Some(session) => {
                let mut guard = session.session.lock().await;
                let mut cursor = self
                    .inner
                    .find(filter)
                    .with_options(options)
                    .session(&mut *guard)
                    .await
                    .map_err(map_error)?;
                let documents = cursor
                    .stream(&mut *guard)
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(map_error)?;

                Ok(Box::new(BufferedCursor::new(documents)))
            }
            None => {
                let cursor = self
                    .inner
                    .find(filter)
                    .with_options(options)
                    .await
                    .map_err(map_error)?;

                Ok(Box::new(MongoCursor::new(cursor)))
            }
        }
    }

    async fn find_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        with_session!(
            context,
            self.inner
                .find_one(filter)
                .with_options(convert::find_one_options(options))
        )
        .map_err(map_error)
    }

    async fn count_documents(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<u64> {
        with_session!(context, self.inner.count_documents(filter)).map_err(map_error)
    }

    async fn estimated_document_count(&self, _context: &ExecutionContext) -> DocumentStoreResult<u64> {
        self.inner
            .estimated_document_count()
            .await
            .map_err(map_error)
    }

    async fn distinct(
        &self,
        context: &ExecutionContext,
        field: &str,
        filter: Document,
    ) -> DocumentStoreResult<Vec<Bson>> {
        with_session!(context, self.inner.distinct(field, filter)).map_err(map_error)
    }

    async fn insert_one(&self, context: &ExecutionContext, document: Document) -> DocumentStoreResult<InsertOneResult> {
        let result = with_session!(context, self.inner.insert_one(&document)).map_err(map_error)?;

        Ok(InsertOneResult {
            inserted_id: result.inserted_id,
        })
    }

    async fn insert_many(
        &self,
        context: &ExecutionContext,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult> {
        let result = with_session!(context, self.inner.insert_many(&documents)).map_err(map_error)?;

        Ok(InsertManyResult {
            inserted_ids: result.inserted_ids,
        })
    }

    async fn update_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        with_session!(
            context,
            self.inner
                .update_one(filter, update)
                .with_options(convert::update_options(options))
        )
        .map(update_result)
        .map_err(map_error)
    }

    async fn update_many(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        with_session!(
            context,
            self.inner
                .update_many(filter, update)
                .with_options(convert::update_options(options))
        )
        .map(update_result)
        .map_err(map_error)
    }

    async fn find_one_and_update(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        with_session!(
            context,
            self.inner
                .find_one_and_update(filter, update)
                .with_options(convert::find_one_and_update_options(options))
        )
        .map_err(map_error)
    }

    async fn replace_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        with_session!(
            context,
            self.inner
                .replace_one(filter, &replacement)
                .with_options(convert::replace_options(options))
        )
        .map(update_result)
        .map_err(map_error)
    }

    async fn delete_one(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<DeleteResult> {
        let result = with_session!(context, self.inner.delete_one(filter)).map_err(map_error)?;

        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn delete_many(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<DeleteResult> {
        let result = with_session!(context, self.inner.delete_many(filter)).map_err(map_error)?;

        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn bulk_write(
        &self,
        context: &ExecutionContext,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult> {
        let mut result = BulkWriteResult::default();
        let mut first_error = None;

        for (position, model) in models.into_iter().enumerate() {
            if let Err(error) = self.apply_model(context, position, model, &mut result).await {
                if options.ordered {
                    return Err(error);
                }
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }

    async fn aggregate(
        &self,
        context: &ExecutionContext,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DocumentStoreResult<BoxedCursor> {
        let options = convert::aggregate_options(options);

        match session_of(context) {
            Some(session) => {
                let mut guard = session.session.lock().await;
                let mut cursor = self
                    .inner
                    .aggregate(pipeline)
                    .with_options(options)
                    .session(&mut *guard)
                    .await
                    .map_err(map_error)?;
                let documents = cursor
                    .stream(&mut *guard)
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(map_error)?;

                Ok(Box::new(BufferedCursor::new(documents)))
            }
            None => {
                let cursor = self
                    .inner
                    .aggregate(pipeline)
                    .with_options(options)
                    .await
                    .map_err(map_error)?;

                Ok(Box::new(MongoCursor::new(cursor)))
            }
        }
    }

    async fn create_indexes(
        &self,
        context: &ExecutionContext,
        models: Vec<IndexModel>,
    ) -> DocumentStoreResult<Vec<String>> {
        let models = models.into_iter().map(convert::index_model).collect::<Vec<_>>();
        let result = with_session!(context, self.inner.create_indexes(models)).map_err(map_error)?;

        Ok(result.index_names)
    }

    async fn list_indexes(&self, context: &ExecutionContext) -> DocumentStoreResult<Vec<Document>> {
        let indexes = match session_of(context) {
            Some(session) => {
                let mut guard = session.session.lock().await;
                let mut cursor = self
                    .inner
                    .list_indexes()
                    .session(&mut *guard)
                    .await
                    .map_err(map_error)?;
                cursor
                    .stream(&mut *guard)
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(map_error)?
            }
            None => self
                .inner
                .list_indexes()
                .await
                .map_err(map_error)?
                .try_collect::<Vec<_>>()
                .await
                .map_err(map_error)?,
        };

        indexes
            .iter()
            .map(|index| serialize_to_document(index).map_err(DocumentStoreError::from))
            .collect()
    }

    async fn drop_index(&self, context: &ExecutionContext, name: &str) -> DocumentStoreResult<()> {
        with_session!(context, self.inner.drop_index(name)).map_err(map_error)
    }

    async fn drop_indexes(&self, context: &ExecutionContext) -> DocumentStoreResult<()> {
        with_session!(context, self.inner.drop_indexes()).map_err(map_error)
    }
}
