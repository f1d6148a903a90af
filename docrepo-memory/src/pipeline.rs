//! Aggregation pipeline execution over in-memory documents.
//!
//! Supported stages: `$match`, `$group`, `$sort`, `$skip`, `$limit`, `$project`,
//! `$unwind` and `$count`.

use bson::{Bson, Document};

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::evaluator::{Comparable, compare_by, lookup, matches, project, same_value};

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidArgument(message.into())
}

fn stage_document<'s>(stage: &str, spec: &'s Bson) -> DocumentStoreResult<&'s Document> {
    match spec {
        Bson::Document(document) => Ok(document),
        _ => Err(invalid(format!("{stage} expects a document"))),
    }
}

fn stage_count(stage: &str, spec: &Bson) -> DocumentStoreResult<usize> {
    match spec {
        Bson::Int32(value) if *value >= 0 => Ok(*value as usize),
        Bson::Int64(value) if *value >= 0 => Ok(*value as usize),
        Bson::Double(value) if *value >= 0.0 => Ok(*value as usize),
        _ => Err(invalid(format!("{stage} expects a non-negative number"))),
    }
}

/// Runs `pipeline` over `documents` and returns the output documents.
pub(crate) fn run(documents: Vec<Document>, pipeline: &[Document]) -> DocumentStoreResult<Vec<Document>> {
    let mut current = documents;

    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(invalid("each pipeline stage must have exactly one field"));
        };

        current = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut kept = Vec::with_capacity(current.len());
                for document in current {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                let sort = stage_document(name, spec)?;
                current.sort_by(|a, b| compare_by(a, b, sort));
                current
            }
            "$skip" => current.into_iter().skip(stage_count(name, spec)?).collect(),
            "$limit" => current.into_iter().take(stage_count(name, spec)?).collect(),
            "$project" => {
                let projection = stage_document(name, spec)?;
                current.iter().map(|document| project(document, projection)).collect()
            }
            "$group" => group(&current, stage_document(name, spec)?)?,
            "$unwind" => unwind(current, spec)?,
            "$count" => match spec {
                Bson::String(field) if !field.is_empty() => {
                    let mut output = Document::new();
                    output.insert(field.clone(), Bson::Int32(current.len() as i32));
                    vec![output]
                }
                _ => return Err(invalid("$count expects a field name")),
            },
            other => return Err(invalid(format!("unsupported pipeline stage {other}"))),
        };
    }

    Ok(current)
}

/// Evaluates an expression: `"$field"` paths, documents of expressions, or literals.
fn evaluate(document: &Document, expression: &Bson) -> Bson {
    match expression {
        Bson::String(path) if path.starts_with('$') => lookup(document, &path[1..]).cloned().unwrap_or(Bson::Null),
        Bson::Document(fields) => Bson::Document(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), evaluate(document, value)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> DocumentStoreResult<Vec<Document>> {
    let path = match spec {
        Bson::String(path) => path.as_str(),
        Bson::Document(options) => options.get_str("path").map_err(|_| invalid("$unwind requires a path"))?,
        _ => return Err(invalid("$unwind expects a path")),
    };
    let field = path
        .strip_prefix('$')
        .ok_or_else(|| invalid("$unwind path must start with '$'"))?;

    let mut output = Vec::new();
    for document in documents {
        match document.get(field) {
            Some(Bson::Array(items)) => {
                for item in items {
                    let mut unwound = document.clone();
                    unwound.insert(field, item.clone());
                    output.push(unwound);
                }
            }
            Some(Bson::Null) | None => {}
            Some(_) => output.push(document),
        }
    }

    Ok(output)
}

#[derive(Debug)]
enum Accumulator {
    Sum { total: f64, integral: bool, fits_i32: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

impl Accumulator {
    fn new(operator: &str) -> DocumentStoreResult<Self> {
        Ok(match operator {
            "$sum" | "$count" => Accumulator::Sum { total: 0.0, integral: true, fits_i32: true },
            "$avg" => Accumulator::Avg { total: 0.0, count: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            "$push" => Accumulator::Push(Vec::new()),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            other => return Err(invalid(format!("unsupported accumulator {other}"))),
        })
    }

    fn feed(&mut self, value: Bson) {
        match self {
            Accumulator::Sum { total, integral, fits_i32 } => match value {
                Bson::Int32(value) => *total += value as f64,
                Bson::Int64(value) => {
                    *total += value as f64;
                    *fits_i32 = false;
                }
                Bson::Double(value) => {
                    *total += value;
                    *integral = false;
                }
                _ => {}
            },
            Accumulator::Avg { total, count } => {
                let number = match value {
                    Bson::Int32(value) => value as f64,
                    Bson::Int64(value) => value as f64,
                    Bson::Double(value) => value,
                    _ => return,
                };
                *total += number;
                *count += 1;
            }
            Accumulator::Min(current) => {
                if !matches!(value, Bson::Null)
                    && current.as_ref().is_none_or(|c| Comparable::from(&value).sort_cmp(&Comparable::from(c)).is_lt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if !matches!(value, Bson::Null)
                    && current.as_ref().is_none_or(|c| Comparable::from(&value).sort_cmp(&Comparable::from(c)).is_gt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = value,
            Accumulator::Push(items) => items.push(value),
            Accumulator::AddToSet(items) => {
                if !items.iter().any(|item| same_value(item, &value)) {
                    items.push(value);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum { total, integral, fits_i32 } => {
                if !integral {
                    Bson::Double(total)
                } else if fits_i32 && total >= i32::MIN as f64 && total <= i32::MAX as f64 {
                    Bson::Int32(total as i32)
                } else {
                    Bson::Int64(total as i64)
                }
            }
            Accumulator::Avg { total, count } if count > 0 => Bson::Double(total / count as f64),
            Accumulator::Avg { .. } => Bson::Null,
            Accumulator::Min(value) | Accumulator::Max(value) | Accumulator::First(value) => {
                value.unwrap_or(Bson::Null)
            }
            Accumulator::Last(value) => value,
            Accumulator::Push(items) | Accumulator::AddToSet(items) => Bson::Array(items),
        }
    }
}

fn group(documents: &[Document], spec: &Document) -> DocumentStoreResult<Vec<Document>> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| invalid("$group requires an _id expression"))?;

    let mut fields: Vec<(&str, &str, &Bson)> = Vec::new();
    for (name, accumulator) in spec {
        if name == "_id" {
            continue;
        }
        let definition = stage_document("$group field", accumulator)?;
        let mut entries = definition.iter();
        let (Some((operator, expression)), None) = (entries.next(), entries.next()) else {
            return Err(invalid(format!("$group field {name} must use exactly one accumulator")));
        };
        Accumulator::new(operator)?;
        fields.push((name.as_str(), operator.as_str(), expression));
    }

    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for document in documents {
        let key = evaluate(document, key_expression);
        let position = match groups.iter().position(|(existing, _)| same_value(existing, &key)) {
            Some(position) => position,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|(_, operator, _)| Accumulator::new(operator))
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };

        for ((_, operator, expression), accumulator) in fields.iter().zip(groups[position].1.iter_mut()) {
            let value = if *operator == "$count" {
                Bson::Int32(1)
            } else {
                evaluate(document, expression)
            };
            accumulator.feed(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut output = Document::new();
            output.insert("_id", key);
            for ((name, _, _), accumulator) in fields.iter().zip(accumulators) {
                output.insert(*name, accumulator.finish());
            }
            output
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn orders() -> Vec<Document> {
        vec![
            doc! { "customer": "ada", "total": 10, "items": ["a", "b"] },
            doc! { "customer": "grace", "total": 5, "items": ["c"] },
            doc! { "customer": "ada", "total": 7, "items": [] },
        ]
    }

    #[test]
    fn match_group_sort() {
        let pipeline = vec![
            doc! { "$match": { "total": { "$gt": 1 } } },
            doc! { "$group": { "_id": "$customer", "spent": { "$sum": "$total" }, "orders": { "$sum": 1 } } },
            doc! { "$sort": { "spent": -1 } },
        ];

        let output = run(orders(), &pipeline).unwrap();

        assert_eq!(
            output,
            vec![
                doc! { "_id": "ada", "spent": 17, "orders": 2 },
                doc! { "_id": "grace", "spent": 5, "orders": 1 },
            ]
        );
    }

    #[test]
    fn averages_and_extremes() {
        let pipeline = vec![doc! { "$group": {
            "_id": Bson::Null,
            "avg": { "$avg": "$total" },
            "max": { "$max": "$total" },
            "min": { "$min": "$total" },
        } }];

        let output = run(orders(), &pipeline).unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].get_i32("max").unwrap(), 10);
        assert_eq!(output[0].get_i32("min").unwrap(), 5);
        assert!((output[0].get_f64("avg").unwrap() - 22.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unwind_skip_limit_count() {
        let pipeline = vec![
            doc! { "$unwind": "$items" },
            doc! { "$skip": 1 },
            doc! { "$limit": 5 },
            doc! { "$count": "n" },
        ];

        let output = run(orders(), &pipeline).unwrap();

        assert_eq!(output, vec![doc! { "n": 2 }]);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let result = run(orders(), &[doc! { "$lookup": {} }]);

        assert!(matches!(result, Err(DocumentStoreError::InvalidArgument(_))));
    }
}
