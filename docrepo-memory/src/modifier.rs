//! Application of update documents to stored documents.

use bson::{Bson, Document, oid::ObjectId};

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::evaluator::{same_value, value_matches};

const BAD_VALUE: i32 = 2;
const TYPE_MISMATCH: i32 = 14;
const IMMUTABLE_FIELD: i32 = 66;

fn write_error(code: i32, message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::Write { code, message: message.into() }
}

/// Whether `update` is made of `$`-operators rather than being a replacement.
pub(crate) fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// Applies the operators of `update` to `document` in place.
///
/// `inserting` is set while building an upserted document, which enables
/// `$setOnInsert` and permits setting `_id`.
pub(crate) fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> DocumentStoreResult<()> {
    if !is_operator_update(update) {
        return Err(DocumentStoreError::InvalidArgument(
            "update document must contain only $-operators".into(),
        ));
    }

    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DocumentStoreError::InvalidArgument(format!("{operator} expects a document")));
        };

        for (path, value) in fields {
            if path == "_id" && !inserting && document.get("_id").is_none_or(|id| !same_value(id, value)) {
                return Err(write_error(
                    IMMUTABLE_FIELD,
                    "Performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }

            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" if inserting => set_path(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => unset_path(document, path),
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value, false)?,
                "$addToSet" => push(document, path, value, true)?,
                "$pull" => pull(document, path, value)?,
                "$pullAll" => pull_all(document, path, value)?,
                "$pop" => pop(document, path, value)?,
                other => {
                    return Err(DocumentStoreError::InvalidArgument(format!("unsupported update operator {other}")));
                }
            }
        }
    }

    Ok(())
}

/// Produces the stored form of a replacement, keeping the identifier of `original`.
pub(crate) fn apply_replacement(original: &Document, replacement: &Document) -> DocumentStoreResult<Document> {
    if is_operator_update(replacement) {
        return Err(DocumentStoreError::InvalidArgument(
            "replacement document must not contain $-operators".into(),
        ));
    }

    let id = original.get("_id").cloned().unwrap_or(Bson::Null);
    if let Some(requested) = replacement.get("_id") {
        if !same_value(requested, &id) {
            return Err(write_error(
                IMMUTABLE_FIELD,
                "the (immutable) field '_id' was found to have been altered",
            ));
        }
    }

    Ok(with_id_first(id, replacement))
}

/// Seeds an upserted document from the equality conditions of `filter`.
pub(crate) fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();

    for (field, condition) in filter {
        if field.starts_with('$') || field.contains('.') {
            continue;
        }

        match condition {
            Bson::Document(operators) if is_operator_update(operators) => {
                if let Some(value) = operators.get("$eq") {
                    seed.insert(field.clone(), value.clone());
                }
            }
            value => {
                seed.insert(field.clone(), value.clone());
            }
        }
    }

    seed
}

/// Returns `document` with `_id` as its first field, generating one if absent.
pub(crate) fn ensure_id(document: Document) -> Document {
    match document.get("_id") {
        Some(_) => document,
        None => with_id_first(Bson::ObjectId(ObjectId::new()), &document),
    }
}

fn with_id_first(id: Bson, document: &Document) -> Document {
    let mut result = Document::new();
    result.insert("_id", id);
    for (key, value) in document {
        if key != "_id" {
            result.insert(key.clone(), value.clone());
        }
    }
    result
}

fn container_mut<'d, 'p>(
    document: &'d mut Document,
    path: &'p str,
    create: bool,
) -> Option<(&'d mut Document, &'p str)> {
    match path.split_once('.') {
        None => Some((document, path)),
        Some((head, rest)) => {
            if create && !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(child)) => container_mut(child, rest, create),
                _ => None,
            }
        }
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    let (container, field) = container_mut(document, path, true)
        .ok_or_else(|| write_error(BAD_VALUE, format!("cannot create field in path '{path}'")))?;

    container.insert(field, value);
    Ok(())
}

fn unset_path(document: &mut Document, path: &str) {
    if let Some((container, field)) = container_mut(document, path, false) {
        container.remove(field);
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn add_numbers(current: &Bson, delta: &Bson) -> Option<Bson> {
    Some(match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        (Bson::Int32(a), Bson::Int64(b)) | (Bson::Int64(b), Bson::Int32(a)) => Bson::Int64((*a as i64).wrapping_add(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.wrapping_add(*b)),
        (a, b) => Bson::Double(as_f64(a)? + as_f64(b)?),
    })
}

fn increment(document: &mut Document, path: &str, delta: &Bson) -> DocumentStoreResult<()> {
    if as_f64(delta).is_none() {
        return Err(write_error(TYPE_MISMATCH, format!("Cannot increment with non-numeric argument: {delta}")));
    }

    let (container, field) = container_mut(document, path, true)
        .ok_or_else(|| write_error(BAD_VALUE, format!("cannot create field in path '{path}'")))?;

    let next = match container.get(field) {
        None => delta.clone(),
        Some(current) => add_numbers(current, delta).ok_or_else(|| {
            write_error(
                TYPE_MISMATCH,
                format!("Cannot apply $inc to a value of non-numeric type in field '{path}'"),
            )
        })?,
    };

    container.insert(field, next);
    Ok(())
}

fn array_mut<'d>(document: &'d mut Document, path: &str, create: bool) -> DocumentStoreResult<Option<&'d mut Vec<Bson>>> {
    let Some((container, field)) = container_mut(document, path, create) else {
        return Ok(None);
    };

    if create && !container.contains_key(field) {
        container.insert(field, Bson::Array(Vec::new()));
    }

    match container.get_mut(field) {
        None => Ok(None),
        Some(Bson::Array(items)) => Ok(Some(items)),
        Some(_) => Err(write_error(BAD_VALUE, format!("The field '{path}' must be an array"))),
    }
}

fn push(document: &mut Document, path: &str, value: &Bson, unique: bool) -> DocumentStoreResult<()> {
    let values = match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(each)) => each.clone(),
            _ => return Err(write_error(BAD_VALUE, "$each requires an array")),
        },
        single => vec![single.clone()],
    };

    let Some(items) = array_mut(document, path, true)? else {
        return Err(write_error(BAD_VALUE, format!("cannot create field in path '{path}'")));
    };

    for value in values {
        if unique && items.iter().any(|item| same_value(item, &value)) {
            continue;
        }
        items.push(value);
    }

    Ok(())
}

fn pull(document: &mut Document, path: &str, condition: &Bson) -> DocumentStoreResult<()> {
    let Some(items) = array_mut(document, path, false)? else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !value_matches(&item, condition)? {
            kept.push(item);
        }
    }
    *items = kept;

    Ok(())
}

fn pull_all(document: &mut Document, path: &str, values: &Bson) -> DocumentStoreResult<()> {
    let Bson::Array(values) = values else {
        return Err(write_error(BAD_VALUE, "$pullAll requires an array argument"));
    };

    if let Some(items) = array_mut(document, path, false)? {
        items.retain(|item| !values.iter().any(|value| same_value(item, value)));
    }

    Ok(())
}

fn pop(document: &mut Document, path: &str, direction: &Bson) -> DocumentStoreResult<()> {
    let first = match as_f64(direction) {
        Some(value) if value == -1.0 => true,
        Some(value) if value == 1.0 => false,
        _ => return Err(write_error(BAD_VALUE, "$pop expects 1 or -1")),
    };

    if let Some(items) = array_mut(document, path, false)? {
        if first {
            if !items.is_empty() {
                items.remove(0);
            }
        } else {
            items.pop();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_and_unset_nested_fields() {
        let mut document = doc! { "_id": 1, "name": "Ada" };

        apply_update(&mut document, &doc! { "$set": { "address.city": "London" } }, false).unwrap();
        apply_update(&mut document, &doc! { "$unset": { "name": "" } }, false).unwrap();

        assert_eq!(document, doc! { "_id": 1, "address": { "city": "London" } });
    }

    #[test]
    fn inc_adds_or_initializes() {
        let mut document = doc! { "_id": 1, "count": 2 };

        apply_update(&mut document, &doc! { "$inc": { "count": 3, "visits": 1 } }, false).unwrap();

        assert_eq!(document.get_i32("count").unwrap(), 5);
        assert_eq!(document.get_i32("visits").unwrap(), 1);
    }

    #[test]
    fn inc_on_string_is_a_type_mismatch() {
        let mut document = doc! { "_id": 1, "name": "Ada" };

        let error = apply_update(&mut document, &doc! { "$inc": { "name": 1 } }, false).unwrap_err();

        assert!(matches!(error, DocumentStoreError::Write { code: TYPE_MISMATCH, .. }));
    }

    #[test]
    fn array_operators_modify_lists() {
        let mut document = doc! { "_id": 1, "tags": ["a", "b"] };

        apply_update(&mut document, &doc! { "$push": { "tags": "c" } }, false).unwrap();
        apply_update(&mut document, &doc! { "$addToSet": { "tags": "a" } }, false).unwrap();
        apply_update(&mut document, &doc! { "$pull": { "tags": "b" } }, false).unwrap();
        apply_update(&mut document, &doc! { "$pop": { "tags": -1 } }, false).unwrap();

        assert_eq!(document.get_array("tags").unwrap(), &vec![Bson::String("c".into())]);
    }

    #[test]
    fn changing_id_is_rejected() {
        let mut document = doc! { "_id": 1 };

        let error = apply_update(&mut document, &doc! { "$set": { "_id": 2 } }, false).unwrap_err();

        assert!(matches!(error, DocumentStoreError::Write { code: IMMUTABLE_FIELD, .. }));
    }

    #[test]
    fn set_on_insert_only_applies_when_inserting() {
        let mut document = doc! { "_id": 1 };

        apply_update(&mut document, &doc! { "$setOnInsert": { "created": true } }, false).unwrap();
        assert!(!document.contains_key("created"));

        apply_update(&mut document, &doc! { "$setOnInsert": { "created": true } }, true).unwrap();
        assert!(document.contains_key("created"));
    }

    #[test]
    fn replacement_keeps_original_id_first() {
        let original = doc! { "_id": 7, "name": "old" };

        let replaced = apply_replacement(&original, &doc! { "name": "new" }).unwrap();

        assert_eq!(replaced, doc! { "_id": 7, "name": "new" });
    }

    #[test]
    fn upsert_seed_takes_equality_conditions() {
        let seed = upsert_seed(&doc! { "name": "Ada", "age": { "$eq": 36 }, "score": { "$gt": 1 } });

        assert_eq!(seed, doc! { "name": "Ada", "age": 36 });
    }
}
