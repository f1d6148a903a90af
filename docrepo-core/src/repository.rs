//! The repository facade over one collection.
//!
//! [`Repository`] turns typed intents into store operations:
//!
//! - it opens one [`ExecutionContext`] per call and drops it before returning;
//! - it invokes entity lifecycle hooks where they apply;
//! - it wraps whole-entity updates in a `$set` envelope;
//! - it classifies duplicate-key writes as [`DocumentStoreError::RecordAlreadyExists`].
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryStore};
//!
//! let repository = Repository::builder(InMemoryStore::new())
//!     .database("app")
//!     .collection("users")
//!     .build()
//!     .await?;
//!
//! let mut user = User { name: "Ada".into(), ..Default::default() };
//! let id = repository.create(&mut user).await?;
//! let found: Option<User> = repository.find_by_object_id_as(id).await?;
//! ```

use std::{fmt, sync::Arc};

use bson::{Bson, Document, doc, oid::ObjectId, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    backend::{CollectionHandle, CollectionProvider, DeleteResult, UpdateResult},
    bulk::{BulkWriteResult, WriteModel},
    config::Configuration,
    context::{ExecutionContext, SessionHandle},
    entity::{Entity, is_nil_object_id, run_before_create, run_before_update},
    error::{DUPLICATE_KEY_CODE, DocumentStoreError, DocumentStoreResult},
    index::{IndexDefinition, IndexModel, IndexOptions},
    options::{
        AggregateOptions, BulkWriteOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        ReplaceOptions, UpdateOptions,
    },
    page::{Page, PaginationParams},
    result::FindResult,
    update::set_envelope,
};

/// Typed operations against one named collection.
///
/// Cheap to clone; clones share the collection handle and configuration.
#[derive(Clone)]
pub struct Repository {
    collection: CollectionHandle,
    configuration: Arc<Configuration>,
    session: Option<SessionHandle>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.collection.name())
            .field("configuration", &self.configuration)
            .field("transactional", &self.session.is_some())
            .finish()
    }
}

impl Repository {
    pub fn new(collection: CollectionHandle, configuration: Configuration) -> Self {
        Self {
            collection,
            configuration: Arc::new(configuration),
            session: None,
        }
    }

    /// Starts building a repository over a collection handed out by `provider`.
    pub fn builder<P: CollectionProvider>(provider: P) -> RepositoryBuilder<P> {
        RepositoryBuilder::new(provider)
    }

    /// Builds a repository over the collection returned by `getter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] when `getter` yields no collection.
    pub fn from_getter<F>(getter: F, configuration: Configuration) -> DocumentStoreResult<Self>
    where
        F: FnOnce() -> Option<CollectionHandle>,
    {
        getter()
            .map(|collection| Self::new(collection, configuration))
            .ok_or_else(|| DocumentStoreError::Configuration("collection getter returned no collection".into()))
    }

    /// Returns a copy whose operations run inside `session`.
    pub fn with_session(&self, session: SessionHandle) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            configuration: Arc::clone(&self.configuration),
            session: Some(session),
        }
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn open_context(&self, operation: &'static str) -> ExecutionContext {
        debug!(collection = %self.name(), operation, "repository operation");

        match &self.session {
            Some(session) => ExecutionContext::transactional(Arc::clone(session)),
            None => self.configuration.create_context(),
        }
    }

    fn classify(&self, error: DocumentStoreError) -> DocumentStoreError {
        match error {
            DocumentStoreError::Write { code, message } if code == DUPLICATE_KEY_CODE => {
                warn!(collection = %self.name(), %message, "duplicate key");
                DocumentStoreError::RecordAlreadyExists {
                    collection: self.name().to_string(),
                    message,
                }
            }
            other => other,
        }
    }

    /// Runs the pre-create hook and serializes `entity` for insertion.
    ///
    /// Entities without an identity hook may still carry the zero `_id`; it is swapped
    /// for a fresh one so the zero value never becomes a stored key.
    fn insertable<E: Entity>(entity: &mut E) -> DocumentStoreResult<Document> {
        run_before_create(entity);
        let mut document = serialize_to_document(&*entity)?;

        if matches!(document.get("_id"), Some(Bson::ObjectId(id)) if is_nil_object_id(id)) {
            document.insert("_id", ObjectId::new());
        }

        Ok(document)
    }

    fn as_object_id(value: Bson) -> DocumentStoreResult<ObjectId> {
        match value {
            Bson::ObjectId(id) => Ok(id),
            other => Err(DocumentStoreError::InvalidType(format!(
                "generated identifier {other} is not an ObjectId"
            ))),
        }
    }

    pub async fn count_by_filter(&self, filter: Document) -> DocumentStoreResult<u64> {
        let context = self.open_context("count_by_filter");
        context
            .run(self.collection.count_documents(&context, filter))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Estimated number of documents, read from collection metadata.
    pub async fn count_all(&self) -> DocumentStoreResult<u64> {
        let context = self.open_context("count_all");
        context
            .run(self.collection.estimated_document_count(&context))
            .await
            .map_err(|e| self.classify(e))
    }

    pub async fn find_all(&self, options: FindOptions) -> FindResult {
        self.find_by_filter(Document::new(), options).await
    }

    /// Looks up a document by `_id`. A miss leaves the result in the not-found state.
    pub async fn find_by_object_id(&self, id: ObjectId) -> FindResult {
        self.find_one(doc! { "_id": id }, FindOneOptions::default()).await
    }

    pub async fn find_one(&self, filter: Document, options: FindOneOptions) -> FindResult {
        let context = self.open_context("find_one");
        let lookup = context
            .run(self.collection.find_one(&context, filter, options))
            .await
            .map_err(|e| self.classify(e));

        FindResult::from_lookup(lookup, Arc::clone(&self.configuration))
    }

    /// Streams documents matching `filter`.
    ///
    /// The configured default sort applies first; `options` then override it.
    pub async fn find_by_filter(&self, filter: Document, options: FindOptions) -> FindResult {
        let mut effective = FindOptions::default();
        self.configuration.apply_default_sort(&mut effective);
        effective.merge(options);

        let context = self.open_context("find_by_filter");
        match context.run(self.collection.find(&context, filter, effective)).await {
            Ok(cursor) => FindResult::multi(cursor, Arc::clone(&self.configuration)),
            Err(error) => FindResult::failed(self.classify(error), Arc::clone(&self.configuration)),
        }
    }

    /// Reads one page of documents matching `filter` along with the total count.
    pub async fn find_page<T>(&self, filter: Document, params: PaginationParams) -> DocumentStoreResult<Page<T>>
    where
        T: DeserializeOwned + Send,
    {
        let count = self.count_by_filter(filter.clone()).await?;
        let items = self
            .find_by_filter(filter, params.to_find_options())
            .await
            .all::<T>()
            .await?;

        Ok(params.page_of(items, count))
    }

    pub async fn distinct(&self, field: &str, filter: Document) -> DocumentStoreResult<Vec<Bson>> {
        let context = self.open_context("distinct");
        context
            .run(self.collection.distinct(&context, field, filter))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Runs `pipeline` and decodes every output document into `T`.
    pub async fn aggregate<T>(&self, pipeline: Vec<Document>, options: AggregateOptions) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let cursor = {
            let context = self.open_context("aggregate");
            context
                .run(self.collection.aggregate(&context, pipeline, options))
                .await
                .map_err(|e| self.classify(e))?
        };

        FindResult::multi(cursor, Arc::clone(&self.configuration))
            .all::<T>()
            .await
    }

    /// Runs the pre-create hook of `entity`, then inserts it. A zero `_id` left in place
    /// by the hook is replaced with a generated one, which is returned.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::RecordAlreadyExists`] on a unique key collision and
    /// [`DocumentStoreError::InvalidType`] if the store generated a non-ObjectId key.
    pub async fn create<E: Entity>(&self, entity: &mut E) -> DocumentStoreResult<ObjectId> {
        let document = Self::insertable(entity)?;

        let context = self.open_context("create");
        let inserted = context
            .run(self.collection.insert_one(&context, document))
            .await
            .map_err(|e| self.classify(e))?;

        Self::as_object_id(inserted.inserted_id)
    }

    /// Inserts every entity after running its pre-create hook. Returns the identifiers
    /// in input order.
    pub async fn create_many<E: Entity>(&self, entities: &mut [E]) -> DocumentStoreResult<Vec<ObjectId>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            documents.push(Self::insertable(entity)?);
        }

        let count = documents.len();
        let context = self.open_context("create_many");
        let mut inserted = context
            .run(self.collection.insert_many(&context, documents))
            .await
            .map_err(|e| self.classify(e))?;

        (0..count)
            .map(|index| {
                inserted
                    .inserted_ids
                    .remove(&index)
                    .ok_or_else(|| DocumentStoreError::InvalidType(format!("no identifier for document {index}")))
                    .and_then(Self::as_object_id)
            })
            .collect()
    }

    /// Runs the pre-update hook of `entity` and writes all of its fields with `$set`.
    ///
    /// The entity must already exist.
    pub async fn find_one_and_update<E: Entity>(&self, entity: &mut E) -> DocumentStoreResult<()> {
        run_before_update(entity);
        let update = set_envelope(&*entity)?;

        self.find_one_and_update_with_id(entity.object_id(), update, None)
            .await
    }

    /// Applies `update` to the document with `_id == id`.
    ///
    /// Upsert stays off unless `options` turn it on.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidArgument`] for the zero identifier and
    /// [`DocumentStoreError::NoDocuments`] when nothing matched without upsert.
    pub async fn find_one_and_update_with_id(
        &self,
        id: ObjectId,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> DocumentStoreResult<()> {
        if is_nil_object_id(&id) {
            return Err(DocumentStoreError::InvalidArgument("object id must not be zero".into()));
        }

        let mut options = options.unwrap_or_default();
        let upsert = *options.upsert.get_or_insert(false);

        let context = self.open_context("find_one_and_update");
        let updated = context
            .run(self.collection.find_one_and_update(&context, doc! { "_id": id }, update, options))
            .await
            .map_err(|e| self.classify(e))?;

        match updated {
            Some(_) => Ok(()),
            None if upsert => Ok(()),
            None => Err(DocumentStoreError::NoDocuments),
        }
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateResult> {
        let context = self.open_context("update_one");
        context
            .run(self.collection.update_one(&context, filter, update, options.unwrap_or_default()))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Updates every document matching `filter`.
    ///
    /// # Errors
    ///
    /// An absent filter is rejected with [`DocumentStoreError::InvalidArgument`] before
    /// the store is contacted.
    pub async fn update_many(
        &self,
        filter: Option<Document>,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = filter.ok_or_else(|| DocumentStoreError::InvalidArgument("update_many requires a filter".into()))?;

        let context = self.open_context("update_many");
        context
            .run(self.collection.update_many(&context, filter, update, options.unwrap_or_default()))
            .await
            .map_err(|e| self.classify(e))
    }

    pub async fn replace_by_id<V>(&self, id: ObjectId, replacement: &V) -> DocumentStoreResult<UpdateResult>
    where
        V: Serialize + Sync + ?Sized,
    {
        self.replace(doc! { "_id": id }, replacement, None).await
    }

    pub async fn replace<V>(
        &self,
        filter: Document,
        replacement: &V,
        options: Option<ReplaceOptions>,
    ) -> DocumentStoreResult<UpdateResult>
    where
        V: Serialize + Sync + ?Sized,
    {
        let replacement = serialize_to_document(replacement)?;

        let context = self.open_context("replace");
        context
            .run(self.collection.replace_one(&context, filter, replacement, options.unwrap_or_default()))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Runs the pre-update hook of `entity` and replaces the stored document with it.
    pub async fn replace_entity<E: Entity>(&self, entity: &mut E) -> DocumentStoreResult<UpdateResult> {
        run_before_update(entity);
        self.replace_by_id(entity.object_id(), &*entity).await
    }

    pub async fn delete_one(&self, id: ObjectId) -> DocumentStoreResult<DeleteResult> {
        self.delete_one_by_filter(doc! { "_id": id }).await
    }

    pub async fn delete_one_by_filter(&self, filter: Document) -> DocumentStoreResult<DeleteResult> {
        let context = self.open_context("delete_one");
        context
            .run(self.collection.delete_one(&context, filter))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Deletes every document matching `filter`.
    ///
    /// # Errors
    ///
    /// An absent filter is rejected with [`DocumentStoreError::InvalidArgument`] before
    /// the store is contacted.
    pub async fn delete_many(&self, filter: Option<Document>) -> DocumentStoreResult<DeleteResult> {
        let filter = filter.ok_or_else(|| DocumentStoreError::InvalidArgument("delete_many requires a filter".into()))?;

        let context = self.open_context("delete_many");
        context
            .run(self.collection.delete_many(&context, filter))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Creates a (compound) index from `definition`.
    ///
    /// Returns `None`, without contacting the store, when the definition has no fields.
    pub async fn create_index(
        &self,
        definition: &IndexDefinition,
        options: Option<IndexOptions>,
    ) -> DocumentStoreResult<Option<String>> {
        match definition.to_index_model(options) {
            Some(model) => Ok(Some(self.create_index_model(model).await?)),
            None => Ok(None),
        }
    }

    /// Creates one index per non-empty definition.
    pub async fn create_indexes(
        &self,
        definitions: &[IndexDefinition],
        options: Option<IndexOptions>,
    ) -> DocumentStoreResult<Vec<String>> {
        let models = definitions
            .iter()
            .filter_map(|definition| definition.to_index_model(options.clone()))
            .collect();

        self.create_index_models(models).await
    }

    pub async fn create_index_model(&self, model: IndexModel) -> DocumentStoreResult<String> {
        let name = model.name();
        let names = self.create_index_models(vec![model]).await?;

        Ok(names.into_iter().next().unwrap_or(name))
    }

    pub async fn create_index_models(&self, models: Vec<IndexModel>) -> DocumentStoreResult<Vec<String>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let context = self.open_context("create_indexes");
        context
            .run(self.collection.create_indexes(&context, models))
            .await
            .map_err(|e| self.classify(e))
    }

    pub async fn delete_index(&self, name: &str) -> DocumentStoreResult<()> {
        let context = self.open_context("delete_index");
        context
            .run(self.collection.drop_index(&context, name))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Drops every index except the one on `_id`.
    pub async fn delete_all_indexes(&self) -> DocumentStoreResult<()> {
        let context = self.open_context("delete_all_indexes");
        context
            .run(self.collection.drop_indexes(&context))
            .await
            .map_err(|e| self.classify(e))
    }

    pub async fn list_indexes(&self) -> DocumentStoreResult<Vec<Document>> {
        let context = self.open_context("list_indexes");
        context
            .run(self.collection.list_indexes(&context))
            .await
            .map_err(|e| self.classify(e))
    }

    /// Applies `models` in one bulk request. An empty list is a no-op returning `None`.
    pub async fn bulk_write(
        &self,
        models: Vec<WriteModel>,
        options: Option<BulkWriteOptions>,
    ) -> DocumentStoreResult<Option<BulkWriteResult>> {
        if models.is_empty() {
            return Ok(None);
        }

        let context = self.open_context("bulk_write");
        context
            .run(self.collection.bulk_write(&context, models, options.unwrap_or_default()))
            .await
            .map(Some)
            .map_err(|e| self.classify(e))
    }

    /// Writes each entity back by `_id` with `$set`, running its pre-update hook first.
    pub async fn bulk_write_entities<E: Entity>(&self, entities: &mut [E]) -> DocumentStoreResult<Option<BulkWriteResult>> {
        let mut models = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            run_before_update(entity);
            models.push(WriteModel::update_by_id(entity.object_id(), set_envelope(&*entity)?));
        }

        self.bulk_write(models, None).await
    }

    pub async fn find_all_as<T>(&self) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.find_all(FindOptions::default()).await.all::<T>().await
    }

    pub async fn find_as<T>(&self, filter: Document, options: FindOptions) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.find_by_filter(filter, options).await.all::<T>().await
    }

    /// Decodes the document with `_id == id`, or `None` if there is none.
    pub async fn find_by_object_id_as<T>(&self, id: ObjectId) -> DocumentStoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        not_found_as_none(self.find_by_object_id(id).await.one::<T>().await)
    }

    pub async fn find_one_as<T>(&self, filter: Document) -> DocumentStoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        not_found_as_none(
            self.find_one(filter, FindOneOptions::default())
                .await
                .one::<T>()
                .await,
        )
    }
}

fn not_found_as_none<T>(result: DocumentStoreResult<T>) -> DocumentStoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_not_found() => Ok(None),
        Err(error) => Err(error),
    }
}

/// Builder for [`Repository`].
///
/// Database and collection names are required; an empty name fails the build.
pub struct RepositoryBuilder<P> {
    provider: P,
    database: Option<String>,
    collection: Option<String>,
    configuration: Option<Configuration>,
}

impl<P: CollectionProvider> RepositoryBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            database: None,
            collection: None,
            configuration: None,
        }
    }

    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Resolves the collection handle and builds the repository.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] when the database or collection
    /// name is missing or empty, or whatever the provider reports.
    pub async fn build(self) -> DocumentStoreResult<Repository> {
        let database = required(self.database, "database")?;
        let collection = required(self.collection, "collection")?;

        let handle = self.provider.collection(&database, &collection).await?;

        Ok(Repository::new(handle, self.configuration.unwrap_or_default()))
    }
}

fn required(value: Option<String>, what: &str) -> DocumentStoreResult<String> {
    value
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DocumentStoreError::Configuration(format!("{what} name must not be empty")))
}
