//! Write models for bulk operations.

use std::collections::HashMap;

use bson::{Bson, Document, doc, oid::ObjectId};
use serde::Serialize;

use crate::{error::DocumentStoreResult, update::set_envelope};

/// One write of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: Option<bool>,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: Option<bool>,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: Option<bool>,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

impl WriteModel {
    /// An update-one model matching `_id`.
    pub fn update_by_id(id: ObjectId, update: Document) -> Self {
        WriteModel::UpdateOne {
            filter: doc! { "_id": id },
            update,
            upsert: None,
        }
    }
}

/// Aggregate counts of a bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
    /// Upserted identifiers keyed by the index of the model that produced them.
    pub upserted_ids: HashMap<usize, Bson>,
}

/// Builds one `$set` update model per `(id, value)` pair.
///
/// # Errors
///
/// Fails if any value cannot be serialized into a document.
pub fn build_write_models_with_object_id<V>(
    values: impl IntoIterator<Item = (ObjectId, V)>,
) -> DocumentStoreResult<Vec<WriteModel>>
where
    V: Serialize,
{
    values
        .into_iter()
        .map(|(id, value)| Ok(WriteModel::update_by_id(id, set_envelope(&value)?)))
        .collect()
}

/// Builds one update-one model per filter, computing the update with `update_fn`.
pub fn build_write_models<F>(filters: Vec<Document>, mut update_fn: F) -> Vec<WriteModel>
where
    F: FnMut(&Document) -> Document,
{
    filters
        .into_iter()
        .map(|filter| {
            let update = update_fn(&filter);
            WriteModel::UpdateOne { filter, update, upsert: None }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_models_wrap_values_in_set() {
        let id = ObjectId::new();
        let models = build_write_models_with_object_id(vec![(id, doc! { "active": false })]).unwrap();

        assert_eq!(
            models,
            vec![WriteModel::UpdateOne {
                filter: doc! { "_id": id },
                update: doc! { "$set": { "active": false } },
                upsert: None,
            }]
        );
    }

    #[test]
    fn filter_models_use_the_update_function() {
        let models = build_write_models(vec![doc! { "team": "a" }, doc! { "team": "b" }], |filter| {
            doc! { "$set": { "label": filter.get("team").cloned().unwrap_or(Bson::Null) } }
        });

        assert_eq!(models.len(), 2);
        assert!(matches!(
            &models[1],
            WriteModel::UpdateOne { update, .. } if update == &doc! { "$set": { "label": "b" } }
        ));
    }
}
