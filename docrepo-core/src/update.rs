//! Builds update envelopes.
//!
//! An update sent to the store is a document keyed by update operators, e.g.
//! `{ "$set": { ... } }`. [`UpdateBuilder`] wraps a payload into that shape and keeps
//! repeated calls safe: the first `$set` payload wins.

use bson::{Bson, Document, ser::serialize_to_bson};
use serde::Serialize;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    operator::{Operator, op},
};

const SET: &str = "$set";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBuilder {
    update: Document,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `value` as the `$set` payload, unless one is already present.
    ///
    /// A second call leaves the first payload untouched. A value serializing to null
    /// produces an empty `$set`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if `value` cannot be serialized and
    /// [`DocumentStoreError::InvalidDocument`] if it is not document-shaped.
    pub fn new_or_update_set<V>(&mut self, value: &V) -> DocumentStoreResult<&mut Self>
    where
        V: Serialize + ?Sized,
    {
        if self.update.contains_key(SET) {
            return Ok(self);
        }

        let payload = match serialize_to_bson(value)? {
            Bson::Document(document) => document,
            Bson::Null => Document::new(),
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "$set payload must be a document, got {:?}",
                    other.element_type()
                )));
            }
        };

        self.update.insert(SET, payload);
        Ok(self)
    }

    /// Appends `field: value` to the `$push` operand.
    pub fn push(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.with_array_operator(op::push(), field, value.into())
    }

    /// Appends `field: value` to the `$addToSet` operand.
    pub fn add_to_set(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.with_array_operator(op::add_to_set(), field, value.into())
    }

    /// Removes elements of `field` matching `condition`.
    pub fn pull(&mut self, field: &str, condition: impl Into<Bson>) -> &mut Self {
        self.with_array_operator(op::pull(), field, condition.into())
    }

    pub fn pull_all(&mut self, field: &str, values: Vec<Bson>) -> &mut Self {
        self.with_array_operator(op::pull_all(), field, Bson::Array(values))
    }

    /// Removes the first (`first == true`) or last element of `field`.
    pub fn pop(&mut self, field: &str, first: bool) -> &mut Self {
        self.with_array_operator(op::pop(), field, Bson::Int32(if first { -1 } else { 1 }))
    }

    fn with_array_operator(&mut self, operator: &Operator, field: &str, value: Bson) -> &mut Self {
        match self.update.get_mut(operator.name()) {
            Some(Bson::Document(operand)) => {
                operand.insert(field, value);
            }
            _ => {
                let mut operand = Document::new();
                operand.insert(field, value);
                self.update.insert(operator.name(), operand);
            }
        }

        self
    }

    /// Returns the assembled update, or an empty document if nothing was set.
    pub fn to_value(&self) -> Document {
        self.update.clone()
    }

    pub fn into_value(self) -> Document {
        self.update
    }
}

/// Shorthand for a builder holding only `value` under `$set`.
pub fn set_envelope<V>(value: &V) -> DocumentStoreResult<Document>
where
    V: Serialize + ?Sized,
{
    let mut builder = UpdateBuilder::new();
    builder.new_or_update_set(value)?;
    Ok(builder.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Profile {
        name: String,
        age: i32,
    }

    #[test]
    fn first_set_payload_wins() {
        let mut builder = UpdateBuilder::new();
        builder.new_or_update_set(&doc! { "name": "first" }).unwrap();
        builder.new_or_update_set(&doc! { "name": "second" }).unwrap();

        assert_eq!(builder.to_value(), doc! { "$set": { "name": "first" } });
    }

    #[test]
    fn structs_are_serialized_into_the_payload() {
        let update = set_envelope(&Profile { name: "Ada".into(), age: 36 }).unwrap();

        assert_eq!(update, doc! { "$set": { "name": "Ada", "age": 36 } });
    }

    #[test]
    fn empty_builder_yields_empty_update() {
        assert_eq!(UpdateBuilder::new().to_value(), Document::new());
    }

    #[test]
    fn null_payload_still_builds_an_envelope() {
        let update = set_envelope(&Option::<Profile>::None).unwrap();

        assert_eq!(update, doc! { "$set": {} });
    }

    #[test]
    fn scalar_payload_is_rejected() {
        let err = set_envelope(&42).unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn array_operators_merge_per_operator() {
        let mut builder = UpdateBuilder::new();
        builder
            .push("tags", "new")
            .push("scores", 10)
            .add_to_set("roles", "admin")
            .pop("queue", true);

        assert_eq!(
            builder.into_value(),
            doc! {
                "$push": { "tags": "new", "scores": 10 },
                "$addToSet": { "roles": "admin" },
                "$pop": { "queue": -1 },
            }
        );
    }
}
