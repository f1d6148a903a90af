//! In-memory storage implementation of the collection contract.
//!
//! Documents are kept per collection in insertion order behind async-aware read-write
//! locks. Unique indexes, including the implicit one on `_id`, are enforced on every
//! write and report the server's duplicate-key code.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use tracing::{debug, trace};

use docrepo_core::{
    backend::{
        BoxedCursor, CollectionBackend, CollectionHandle, CollectionProvider, DeleteResult, InsertManyResult,
        InsertOneResult, StoreBuilder, UpdateResult,
    },
    bulk::{BulkWriteResult, WriteModel},
    context::ExecutionContext,
    cursor::BufferedCursor,
    error::{DUPLICATE_KEY_CODE, DocumentStoreError, DocumentStoreResult},
    index::IndexModel,
    options::{
        AggregateOptions, BulkWriteOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        ReplaceOptions, ReturnDocument, UpdateOptions,
    },
};

use crate::{
    evaluator::{Comparable, compare_by, lookup, matches, project, same_value},
    modifier::{apply_replacement, apply_update, ensure_id, is_operator_update, upsert_seed},
    pipeline,
};

const ID_INDEX: &str = "_id_";
const INDEX_NOT_FOUND: i32 = 27;
const INVALID_OPTIONS: i32 = 72;

type CollectionMap = HashMap<(String, String), Arc<InMemoryCollection>>;

/// Thread-safe in-memory document store.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones
/// share the same collections. Collections are created on first access.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo_core::backend::CollectionProvider;
///
/// let store = InMemoryStore::new();
/// let users = store.collection("app", "users").await?;
/// assert_eq!(users.name(), "users");
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<CollectionMap>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder
    }

    /// Names of the collections created so far in `database`.
    pub async fn list_collections(&self, database: &str) -> Vec<String> {
        let mut names = self
            .collections
            .read()
            .await
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, name)| name.clone())
            .collect::<Vec<_>>();

        names.sort();
        names
    }
}

#[async_trait]
impl CollectionProvider for InMemoryStore {
    async fn collection(&self, database: &str, name: &str) -> DocumentStoreResult<CollectionHandle> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .entry((database.to_string(), name.to_string()))
            .or_insert_with(|| {
                debug!(database, collection = name, "creating in-memory collection");
                Arc::new(InMemoryCollection::new(database, name))
            });

        Ok(Arc::clone(collection) as CollectionHandle)
    }
}

/// Builder for [`InMemoryStore`]. Building always succeeds.
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBuilder for InMemoryStoreBuilder {
    type Store = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Store> {
        Ok(InMemoryStore::new())
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexModel>,
}

/// One in-memory collection.
#[derive(Debug)]
pub struct InMemoryCollection {
    database: String,
    name: String,
    state: RwLock<CollectionState>,
}

/// Outcome of a single-document write, shared by the update paths.
struct Applied {
    matched: u64,
    modified: u64,
    upserted_id: Option<Bson>,
    before: Option<Document>,
    after: Option<Document>,
}

impl InMemoryCollection {
    pub fn new(database: &str, name: &str) -> Self {
        Self {
            database: database.to_string(),
            name: name.to_string(),
            state: RwLock::new(CollectionState::default()),
        }
    }

    fn note_session(&self, context: &ExecutionContext) {
        if context.is_transactional() {
            trace!(collection = %self.name, "in-memory collection ignores transactional session");
        }
    }

    fn duplicate_key(&self, index: &str, key: &[Bson]) -> DocumentStoreError {
        let key = key.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");

        DocumentStoreError::Write {
            code: DUPLICATE_KEY_CODE,
            message: format!(
                "E11000 duplicate key error collection: {}.{} index: {index} dup key: {{ {key} }}",
                self.database, self.name
            ),
        }
    }

    /// Key of `document` under `index`, or `None` when a sparse index skips it.
    fn index_key(document: &Document, index: &IndexModel) -> Option<Vec<Bson>> {
        let sparse = index
            .options
            .as_ref()
            .and_then(|options| options.sparse)
            .unwrap_or(false);

        let values = index
            .keys
            .keys()
            .map(|field| lookup(document, field).cloned())
            .collect::<Vec<_>>();

        if sparse && values.iter().all(Option::is_none) {
            return None;
        }

        Some(values.into_iter().map(|value| value.unwrap_or(Bson::Null)).collect())
    }

    fn same_key(left: &[Bson], right: &[Bson]) -> bool {
        left.len() == right.len() && left.iter().zip(right).all(|(a, b)| same_value(a, b))
    }

    /// Verifies `candidate` against every unique index, ignoring the document at `skip`.
    fn check_unique(&self, state: &CollectionState, candidate: &Document, skip: Option<usize>) -> DocumentStoreResult<()> {
        let id = candidate.get("_id").cloned().unwrap_or(Bson::Null);
        let others = || {
            state
                .documents
                .iter()
                .enumerate()
                .filter(move |(position, _)| Some(*position) != skip)
                .map(|(_, document)| document)
        };

        if others().any(|existing| existing.get("_id").is_some_and(|existing| same_value(existing, &id))) {
            return Err(self.duplicate_key(ID_INDEX, &[id]));
        }

        for index in state.indexes.iter().filter(|index| index.is_unique()) {
            let Some(key) = Self::index_key(candidate, index) else {
                continue;
            };

            let collides = others()
                .filter_map(|existing| Self::index_key(existing, index))
                .any(|existing| Self::same_key(&existing, &key));

            if collides {
                return Err(self.duplicate_key(&index.name(), &key));
            }
        }

        Ok(())
    }

    fn positions(state: &CollectionState, filter: &Document, sort: Option<&Document>) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in state.documents.iter().enumerate() {
            if matches(document, filter)? {
                positions.push(position);
            }
        }

        if let Some(sort) = sort {
            positions.sort_by(|a, b| compare_by(&state.documents[*a], &state.documents[*b], sort));
        }

        Ok(positions)
    }

    fn select(
        state: &CollectionState,
        filter: &Document,
        sort: Option<&Document>,
        skip: Option<u64>,
        limit: Option<i64>,
        projection: Option<&Document>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let limit = match limit {
            Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
            _ => usize::MAX,
        };

        Ok(Self::positions(state, filter, sort)?
            .into_iter()
            .skip(skip.unwrap_or(0) as usize)
            .take(limit)
            .map(|position| {
                let document = &state.documents[position];
                match projection {
                    Some(projection) => project(document, projection),
                    None => document.clone(),
                }
            })
            .collect())
    }

    fn insert_into(&self, state: &mut CollectionState, document: Document) -> DocumentStoreResult<Bson> {
        let document = ensure_id(document);
        self.check_unique(state, &document, None)?;

        let id = document.get("_id").cloned().unwrap_or(Bson::Null);
        state.documents.push(document);

        Ok(id)
    }

    /// Updates the first match (or every match when `multi`), upserting if requested.
    fn update_in(
        &self,
        state: &mut CollectionState,
        filter: &Document,
        update: &Document,
        sort: Option<&Document>,
        multi: bool,
        upsert: bool,
    ) -> DocumentStoreResult<Applied> {
        let replacing = !is_operator_update(update);
        let mut targets = Self::positions(state, filter, sort)?;
        if !multi {
            targets.truncate(1);
        }

        let mut applied = Applied {
            matched: targets.len() as u64,
            modified: 0,
            upserted_id: None,
            before: None,
            after: None,
        };

        for position in targets {
            let original = &state.documents[position];
            let updated = if replacing {
                apply_replacement(original, update)?
            } else {
                let mut updated = original.clone();
                apply_update(&mut updated, update, false)?;
                updated
            };

            self.check_unique(state, &updated, Some(position))?;

            if updated != state.documents[position] {
                applied.modified += 1;
            }
            if applied.before.is_none() {
                applied.before = Some(state.documents[position].clone());
                applied.after = Some(updated.clone());
            }
            state.documents[position] = updated;
        }

        if applied.matched == 0 && upsert {
            let mut seed = upsert_seed(filter);
            if replacing {
                let id = seed.get("_id").cloned();
                seed = update.clone();
                if let Some(id) = id {
                    seed.insert("_id", id);
                }
            } else {
                apply_update(&mut seed, update, true)?;
            }

            let seed = ensure_id(seed);
            let id = self.insert_into(state, seed.clone())?;
            applied.upserted_id = Some(id);
            applied.after = Some(seed);
        }

        Ok(applied)
    }

    fn delete_in(state: &mut CollectionState, filter: &Document, multi: bool) -> DocumentStoreResult<u64> {
        let mut targets = Self::positions(state, filter, None)?;
        if !multi {
            targets.truncate(1);
        }

        for position in targets.iter().rev() {
            state.documents.remove(*position);
        }

        Ok(targets.len() as u64)
    }

    fn apply_model(
        &self,
        state: &mut CollectionState,
        position: usize,
        model: WriteModel,
        result: &mut BulkWriteResult,
    ) -> DocumentStoreResult<()> {
        let applied = match model {
            WriteModel::InsertOne { document } => {
                self.insert_into(state, document)?;
                result.inserted_count += 1;
                return Ok(());
            }
            WriteModel::DeleteOne { filter } => {
                result.deleted_count += Self::delete_in(state, &filter, false)?;
                return Ok(());
            }
            WriteModel::DeleteMany { filter } => {
                result.deleted_count += Self::delete_in(state, &filter, true)?;
                return Ok(());
            }
            WriteModel::UpdateOne { filter, update, upsert } => {
                if !is_operator_update(&update) {
                    return Err(DocumentStoreError::InvalidArgument("update must contain only $-operators".into()));
                }
                self.update_in(state, &filter, &update, None, false, upsert.unwrap_or(false))?
            }
            WriteModel::UpdateMany { filter, update, upsert } => {
                if !is_operator_update(&update) {
                    return Err(DocumentStoreError::InvalidArgument("update must contain only $-operators".into()));
                }
                self.update_in(state, &filter, &update, None, true, upsert.unwrap_or(false))?
            }
            WriteModel::ReplaceOne { filter, replacement, upsert } => {
                self.update_in(state, &filter, &replacement, None, false, upsert.unwrap_or(false))?
            }
        };

        result.matched_count += applied.matched;
        result.modified_count += applied.modified;
        if let Some(id) = applied.upserted_id {
            result.upserted_count += 1;
            result.upserted_ids.insert(position, id);
        }

        Ok(())
    }

    fn index_document(index: &IndexModel) -> Document {
        let mut document = doc! { "v": 2, "key": index.keys.clone(), "name": index.name() };

        if let Some(options) = &index.options {
            if let Some(unique) = options.unique {
                document.insert("unique", unique);
            }
            if let Some(sparse) = options.sparse {
                document.insert("sparse", sparse);
            }
            if let Some(expire_after) = options.expire_after {
                document.insert("expireAfterSeconds", expire_after.as_secs() as i64);
            }
        }

        document
    }
}

#[async_trait]
impl CollectionBackend for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        context: &ExecutionContext,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<BoxedCursor> {
        self.note_session(context);
        let state = self.state.read().await;
        let documents = Self::select(
            &state,
            &filter,
            options.sort.as_ref(),
            options.skip,
            options.limit,
            options.projection.as_ref(),
        )?;

        Ok(Box::new(BufferedCursor::new(documents)))
    }

    async fn find_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        self.note_session(context);
        let state = self.state.read().await;
        let documents = Self::select(
            &state,
            &filter,
            options.sort.as_ref(),
            options.skip,
            Some(1),
            options.projection.as_ref(),
        )?;

        Ok(documents.into_iter().next())
    }

    async fn count_documents(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<u64> {
        self.note_session(context);
        let state = self.state.read().await;

        Ok(Self::positions(&state, &filter, None)?.len() as u64)
    }

    async fn estimated_document_count(&self, _context: &ExecutionContext) -> DocumentStoreResult<u64> {
        Ok(self.state.read().await.documents.len() as u64)
    }

    async fn distinct(
        &self,
        context: &ExecutionContext,
        field: &str,
        filter: Document,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.note_session(context);
        let state = self.state.read().await;

        let mut values: Vec<Bson> = Vec::new();
        for position in Self::positions(&state, &filter, None)? {
            let candidates = match lookup(&state.documents[position], field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };

            for candidate in candidates {
                if !values.iter().any(|value| same_value(value, &candidate)) {
                    values.push(candidate);
                }
            }
        }

        values.sort_by(|a, b| Comparable::from(a).sort_cmp(&Comparable::from(b)));
        Ok(values)
    }

    async fn insert_one(&self, context: &ExecutionContext, document: Document) -> DocumentStoreResult<InsertOneResult> {
        self.note_session(context);
        let mut state = self.state.write().await;
        let inserted_id = self.insert_into(&mut state, document)?;

        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(
        &self,
        context: &ExecutionContext,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult> {
        self.note_session(context);
        let mut state = self.state.write().await;

        let mut inserted_ids = HashMap::with_capacity(documents.len());
        for (position, document) in documents.into_iter().enumerate() {
            inserted_ids.insert(position, self.insert_into(&mut state, document)?);
        }

        Ok(InsertManyResult { inserted_ids })
    }

    async fn update_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        self.note_session(context);
        if !is_operator_update(&update) {
            return Err(DocumentStoreError::InvalidArgument("update must contain only $-operators".into()));
        }

        let mut state = self.state.write().await;
        let applied = self.update_in(&mut state, &filter, &update, None, false, options.upsert.unwrap_or(false))?;

        Ok(UpdateResult {
            matched_count: applied.matched,
            modified_count: applied.modified,
            upserted_id: applied.upserted_id,
        })
    }

    async fn update_many(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        self.note_session(context);
        if !is_operator_update(&update) {
            return Err(DocumentStoreError::InvalidArgument("update must contain only $-operators".into()));
        }

        let mut state = self.state.write().await;
        let applied = self.update_in(&mut state, &filter, &update, None, true, options.upsert.unwrap_or(false))?;

        Ok(UpdateResult {
            matched_count: applied.matched,
            modified_count: applied.modified,
            upserted_id: applied.upserted_id,
        })
    }

    async fn find_one_and_update(
        &self,
        context: &ExecutionContext,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        self.note_session(context);
        if !is_operator_update(&update) {
            return Err(DocumentStoreError::InvalidArgument("update must contain only $-operators".into()));
        }

        let mut state = self.state.write().await;
        let applied = self.update_in(
            &mut state,
            &filter,
            &update,
            options.sort.as_ref(),
            false,
            options.upsert.unwrap_or(false),
        )?;

        let returned = match options.return_document {
            ReturnDocument::Before => applied.before,
            ReturnDocument::After => applied.after,
        };

        Ok(match (returned, options.projection.as_ref()) {
            (Some(document), Some(projection)) => Some(project(&document, projection)),
            (returned, _) => returned,
        })
    }

    async fn replace_one(
        &self,
        context: &ExecutionContext,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        self.note_session(context);
        if is_operator_update(&replacement) {
            return Err(DocumentStoreError::InvalidArgument(
                "replacement document must not contain $-operators".into(),
            ));
        }

        let mut state = self.state.write().await;
        let applied = self.update_in(&mut state, &filter, &replacement, None, false, options.upsert.unwrap_or(false))?;

        Ok(UpdateResult {
            matched_count: applied.matched,
            modified_count: applied.modified,
            upserted_id: applied.upserted_id,
        })
    }

    async fn delete_one(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<DeleteResult> {
        self.note_session(context);
        let mut state = self.state.write().await;

        Ok(DeleteResult {
            deleted_count: Self::delete_in(&mut state, &filter, false)?,
        })
    }

    async fn delete_many(&self, context: &ExecutionContext, filter: Document) -> DocumentStoreResult<DeleteResult> {
        self.note_session(context);
        let mut state = self.state.write().await;

        Ok(DeleteResult {
            deleted_count: Self::delete_in(&mut state, &filter, true)?,
        })
    }

    async fn bulk_write(
        &self,
        context: &ExecutionContext,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult> {
        self.note_session(context);
        let mut state = self.state.write().await;

        let mut result = BulkWriteResult::default();
        let mut first_error = None;
        for (position, model) in models.into_iter().enumerate() {
            if let Err(error) = self.apply_model(&mut state, position, model, &mut result) {
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
        _options: AggregateOptions,
    ) -> DocumentStoreResult<BoxedCursor> {
        self.note_session(context);
        let documents = self.state.read().await.documents.clone();
        let output = pipeline::run(documents, &pipeline)?;

        Ok(Box::new(BufferedCursor::new(output)))
    }

    async fn create_indexes(
        &self,
        context: &ExecutionContext,
        models: Vec<IndexModel>,
    ) -> DocumentStoreResult<Vec<String>> {
        self.note_session(context);
        let mut state = self.state.write().await;

        let mut names = Vec::with_capacity(models.len());
        for model in models {
            let name = model.name();

            if let Some(existing) = state.indexes.iter().find(|index| index.name() == name) {
                if existing.keys != model.keys {
                    return Err(DocumentStoreError::Write {
                        code: INVALID_OPTIONS,
                        message: format!("an index named {name} already exists with different keys"),
                    });
                }
                names.push(name);
                continue;
            }

            if model.is_unique() {
                let mut seen: Vec<Vec<Bson>> = Vec::new();
                for document in &state.documents {
                    let Some(key) = Self::index_key(document, &model) else {
                        continue;
                    };
                    if seen.iter().any(|existing| Self::same_key(existing, &key)) {
                        return Err(self.duplicate_key(&name, &key));
                    }
                    seen.push(key);
                }
            }

            debug!(collection = %self.name, index = %name, "creating index");
            state.indexes.push(model);
            names.push(name);
        }

        Ok(names)
    }

    async fn list_indexes(&self, context: &ExecutionContext) -> DocumentStoreResult<Vec<Document>> {
        self.note_session(context);
        let state = self.state.read().await;

        let mut indexes = vec![doc! { "v": 2, "key": { "_id": 1 }, "name": ID_INDEX }];
        indexes.extend(state.indexes.iter().map(Self::index_document));

        Ok(indexes)
    }

    async fn drop_index(&self, context: &ExecutionContext, name: &str) -> DocumentStoreResult<()> {
        self.note_session(context);
        if name == ID_INDEX {
            return Err(DocumentStoreError::Write {
                code: INVALID_OPTIONS,
                message: "cannot drop _id index".into(),
            });
        }

        let mut state = self.state.write().await;
        let before = state.indexes.len();
        state.indexes.retain(|index| index.name() != name);

        if state.indexes.len() == before {
            return Err(DocumentStoreError::Write {
                code: INDEX_NOT_FOUND,
                message: format!("index not found with name [{name}]"),
            });
        }

        debug!(collection = %self.name, index = name, "dropped index");
        Ok(())
    }

    async fn drop_indexes(&self, context: &ExecutionContext) -> DocumentStoreResult<()> {
        self.note_session(context);
        let dropped = std::mem::take(&mut self.state.write().await.indexes);

        debug!(collection = %self.name, count = dropped.len(), "dropped indexes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrepo_core::{index::IndexOptions, options::sort_by};

    async fn collection() -> CollectionHandle {
        InMemoryStore::new().collection("test", "people").await.unwrap()
    }

    async fn seed(collection: &CollectionHandle) {
        let context = ExecutionContext::background();
        collection
            .insert_many(
                &context,
                vec![
                    doc! { "name": "ada", "age": 36 },
                    doc! { "name": "grace", "age": 45 },
                    doc! { "name": "linus", "age": 21 },
                ],
            )
            .await
            .unwrap();
    }

    async fn drain(mut cursor: BoxedCursor) -> Vec<Document> {
        let mut documents = Vec::new();
        while cursor.advance().await.unwrap() {
            documents.push(cursor.current().unwrap());
        }
        documents
    }

    #[tokio::test]
    async fn insert_generates_object_id() {
        let collection = collection().await;
        let context = ExecutionContext::background();

        let result = collection.insert_one(&context, doc! { "name": "ada" }).await.unwrap();

        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let collection = collection().await;
        seed(&collection).await;
        let context = ExecutionContext::background();

        let options = FindOptions::default()
            .with_sort(sort_by("age", false))
            .with_skip(1)
            .with_limit(1)
            .with_projection(doc! { "name": 1, "_id": 0 });
        let cursor = collection.find(&context, doc! {}, options).await.unwrap();

        assert_eq!(drain(cursor).await, vec![doc! { "name": "ada" }]);
    }

    #[tokio::test]
    async fn duplicate_id_is_a_duplicate_key_write() {
        let collection = collection().await;
        let context = ExecutionContext::background();

        collection.insert_one(&context, doc! { "_id": 1 }).await.unwrap();
        let error = collection.insert_one(&context, doc! { "_id": 1 }).await.unwrap_err();

        assert!(error.is_duplicate_key());
    }

    #[tokio::test]
    async fn unique_index_rejects_collisions() {
        let collection = collection().await;
        seed(&collection).await;
        let context = ExecutionContext::background();

        let model = IndexModel::new(doc! { "name": 1 }).with_options(IndexOptions::default().with_unique(true));
        let names = collection.create_indexes(&context, vec![model]).await.unwrap();
        assert_eq!(names, vec!["name_1".to_string()]);

        let error = collection.insert_one(&context, doc! { "name": "ada" }).await.unwrap_err();
        assert!(error.is_duplicate_key());

        let indexes = collection.list_indexes(&context).await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].get_str("name").unwrap(), ID_INDEX);
    }

    #[tokio::test]
    async fn id_index_cannot_be_dropped() {
        let collection = collection().await;
        let context = ExecutionContext::background();

        let error = collection.drop_index(&context, ID_INDEX).await.unwrap_err();
        assert!(matches!(error, DocumentStoreError::Write { code: INVALID_OPTIONS, .. }));

        let error = collection.drop_index(&context, "missing_1").await.unwrap_err();
        assert!(matches!(error, DocumentStoreError::Write { code: INDEX_NOT_FOUND, .. }));
    }

    #[tokio::test]
    async fn update_many_counts_matches_and_modifications() {
        let collection = collection().await;
        seed(&collection).await;
        let context = ExecutionContext::background();

        let result = collection
            .update_many(
                &context,
                doc! { "age": { "$gte": 30 } },
                doc! { "$set": { "senior": true } },
                UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
        assert_eq!(collection.count_documents(&context, doc! { "senior": true }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_inserts_seeded_document() {
        let collection = collection().await;
        let context = ExecutionContext::background();

        let result = collection
            .update_one(
                &context,
                doc! { "name": "ada" },
                doc! { "$set": { "age": 36 } },
                UpdateOptions::default().with_upsert(true),
            )
            .await
            .unwrap();

        assert_eq!(result.matched_count, 0);
        assert!(result.upserted_id.is_some());

        let stored = collection
            .find_one(&context, doc! { "name": "ada" }, FindOneOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_i32("age").unwrap(), 36);
    }

    #[tokio::test]
    async fn find_one_and_update_returns_requested_version() {
        let collection = collection().await;
        seed(&collection).await;
        let context = ExecutionContext::background();

        let before = collection
            .find_one_and_update(
                &context,
                doc! { "name": "ada" },
                doc! { "$inc": { "age": 1 } },
                FindOneAndUpdateOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        let after = collection
            .find_one_and_update(
                &context,
                doc! { "name": "ada" },
                doc! { "$inc": { "age": 1 } },
                FindOneAndUpdateOptions::default().with_return_document(ReturnDocument::After),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(before.get_i32("age").unwrap(), 36);
        assert_eq!(after.get_i32("age").unwrap(), 38);
    }

    #[tokio::test]
    async fn find_one_and_update_rejects_replacement_documents() {
        let collection = collection().await;
        seed(&collection).await;
        let context = ExecutionContext::background();

        let error = collection
            .find_one_and_update(
                &context,
                doc! { "name": "ada" },
                doc! { "name": "ada", "age": 99 },
                FindOneAndUpdateOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, DocumentStoreError::InvalidArgument(_)));
        let stored = collection
            .find_one(&context, doc! { "name": "ada" }, FindOneOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_i32("age").unwrap(), 36);
    }

    #[tokio::test]
    async fn distinct_flattens_and_deduplicates() {
        let collection = collection().await;
        let context = ExecutionContext::background();
        collection
            .insert_many(
                &context,
                vec![doc! { "tags": ["b", "a"] }, doc! { "tags": "a" }, doc! { "other": 1 }],
            )
            .await
            .unwrap();

        let values = collection.distinct(&context, "tags", doc! {}).await.unwrap();

        assert_eq!(values, vec![Bson::String("a".into()), Bson::String("b".into())]);
    }

    #[tokio::test]
    async fn unordered_bulk_write_continues_past_failures() {
        let collection = collection().await;
        let context = ExecutionContext::background();
        collection.insert_one(&context, doc! { "_id": 1 }).await.unwrap();

        let models = vec![
            WriteModel::InsertOne { document: doc! { "_id": 1 } },
            WriteModel::InsertOne { document: doc! { "_id": 2 } },
        ];
        let error = collection
            .bulk_write(&context, models, BulkWriteOptions::default().with_ordered(false))
            .await
            .unwrap_err();

        assert!(error.is_duplicate_key());
        assert_eq!(collection.estimated_document_count(&context).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bulk_write_tallies_each_kind() {
        let collection = collection().await;
        seed(&collection).await;
        let context = ExecutionContext::background();

        let models = vec![
            WriteModel::InsertOne { document: doc! { "name": "ken" } },
            WriteModel::UpdateOne {
                filter: doc! { "name": "ada" },
                update: doc! { "$set": { "age": 37 } },
                upsert: None,
            },
            WriteModel::UpdateOne {
                filter: doc! { "name": "barbara" },
                update: doc! { "$set": { "age": 80 } },
                upsert: Some(true),
            },
            WriteModel::DeleteMany { filter: doc! { "age": { "$lt": 30 } } },
        ];
        let result = collection
            .bulk_write(&context, models, BulkWriteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 1);
        assert_eq!(result.upserted_count, 1);
        assert!(result.upserted_ids.contains_key(&2));
        assert_eq!(result.deleted_count, 1);
    }
}
