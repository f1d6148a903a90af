//! Filter evaluation for in-memory documents.
//!
//! Supports the comparison, logical, element and array query operators on dotted
//! field paths. Values are compared through [`Comparable`], which normalizes every
//! numeric BSON type to `f64`.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document, oid::ObjectId};

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Position in the cross-type sort order used by the server.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
        }
    }

    /// Total order for sorting: type rank first, then value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

/// Whether two values are equal under query semantics.
pub(crate) fn same_value(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Resolves a dotted path such as `address.city` or `tags.0`.
pub(crate) fn lookup<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(child) => child.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Interprets a projection flag or a boolean query operand.
pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// Evaluates `filter` against `document`.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidArgument`] for unsupported operators or
/// malformed operands.
pub fn matches(document: &Document, filter: &Document) -> DocumentStoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" | "$or" | "$nor" => logical(document, key, condition)?,
            operator if operator.starts_with('$') => {
                return Err(DocumentStoreError::InvalidArgument(format!(
                    "unsupported top-level operator {operator}"
                )));
            }
            path => field_matches(lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Evaluates a single value against a condition, the way `$pull` and `$elemMatch`
/// test array elements.
pub(crate) fn value_matches(value: &Bson, condition: &Bson) -> DocumentStoreResult<bool> {
    match (value, condition) {
        (Bson::Document(item), Bson::Document(filter)) if !is_operator_document(filter) => matches(item, filter),
        _ => field_matches(Some(value), condition),
    }
}

fn logical(document: &Document, operator: &str, condition: &Bson) -> DocumentStoreResult<bool> {
    let Bson::Array(filters) = condition else {
        return Err(DocumentStoreError::InvalidArgument(format!("{operator} expects an array")));
    };

    let mut any = false;
    for filter in filters {
        let Bson::Document(filter) = filter else {
            return Err(DocumentStoreError::InvalidArgument(format!("{operator} entries must be documents")));
        };

        let matched = matches(document, filter)?;
        match operator {
            "$and" if !matched => return Ok(false),
            "$or" if matched => return Ok(true),
            "$nor" if matched => return Ok(false),
            _ => any |= matched,
        }
    }

    Ok(match operator {
        "$and" | "$nor" => true,
        _ => any,
    })
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> DocumentStoreResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(operators) => {
            for (operator, operand) in operators {
                if !operator_matches(value, operator, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, condition)),
    }
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let Some(actual) = value else {
        return matches!(expected, Bson::Null);
    };

    let expected = Comparable::from(expected);
    if Comparable::from(actual) == expected {
        return true;
    }

    match actual {
        Bson::Array(items) => items.iter().any(|item| Comparable::from(item) == expected),
        _ => false,
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let Some(actual) = value else {
        return false;
    };

    let operand = Comparable::from(operand);
    let check = |item: &Bson| Comparable::from(item).partial_cmp(&operand).is_some_and(accept);

    check(actual) || matches!(actual, Bson::Array(items) if items.iter().any(|item| check(item)))
}

fn operand_array<'o>(operator: &str, operand: &'o Bson) -> DocumentStoreResult<&'o Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(DocumentStoreError::InvalidArgument(format!("{operator} expects an array"))),
    }
}

fn operator_matches(value: Option<&Bson>, operator: &str, operand: &Bson) -> DocumentStoreResult<bool> {
    match operator {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(ordered(value, operand, Ordering::is_gt)),
        "$gte" => Ok(ordered(value, operand, Ordering::is_ge)),
        "$lt" => Ok(ordered(value, operand, Ordering::is_lt)),
        "$lte" => Ok(ordered(value, operand, Ordering::is_le)),
        "$in" => Ok(operand_array(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate))),
        "$nin" => Ok(!operand_array(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate))),
        "$all" => Ok(operand_array(operator, operand)?
            .iter()
            .all(|required| equals(value, required))),
        "$exists" => Ok(value.is_some() == truthy(operand)),
        "$type" => Ok(value.is_some_and(|value| type_matches(value, operand))),
        "$size" => Ok(matches!(
            value,
            Some(Bson::Array(items)) if Comparable::Number(items.len() as f64) == Comparable::from(operand)
        )),
        "$not" => Ok(!field_matches(value, operand)?),
        "$elemMatch" => {
            let Some(Bson::Array(items)) = value else {
                return Ok(false);
            };
            for item in items {
                if value_matches(item, operand)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(DocumentStoreError::InvalidArgument(format!("unsupported query operator {other}"))),
    }
}

fn type_alias(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        _ => "unknown",
    }
}

fn type_matches(value: &Bson, operand: &Bson) -> bool {
    match operand {
        Bson::String(alias) if alias == "number" => {
            matches!(value, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_))
        }
        Bson::String(alias) => type_alias(value) == alias,
        Bson::Int32(code) => value.element_type() as i32 == *code,
        Bson::Int64(code) => value.element_type() as i64 == *code,
        Bson::Array(options) => options.iter().any(|option| type_matches(value, option)),
        _ => false,
    }
}

/// Orders two documents by a sort specification such as `{ "age": -1, "name": 1 }`.
///
/// Non-numeric directions (text score metadata) do not affect the order.
pub(crate) fn compare_by(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let descending = match direction {
            Bson::Int32(value) => *value < 0,
            Bson::Int64(value) => *value < 0,
            Bson::Double(value) => *value < 0.0,
            _ => continue,
        };

        let a = lookup(left, field).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = lookup(right, field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = if descending { b.sort_cmp(&a) } else { a.sort_cmp(&b) };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies an inclusion or exclusion projection to top-level fields.
pub(crate) fn project(document: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return document.clone();
    }

    let include_id = projection.get("_id").is_none_or(truthy);
    let inclusive = projection
        .iter()
        .any(|(field, flag)| field != "_id" && truthy(flag));

    if !inclusive {
        let mut projected = document.clone();
        for (field, flag) in projection {
            if !truthy(flag) {
                projected.remove(field);
            }
        }
        return projected;
    }

    let mut projected = Document::new();
    if include_id {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for (field, flag) in projection {
        if field == "_id" || !truthy(flag) {
            continue;
        }
        if let Some(value) = document.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }

    projected
}
