//! The catalog of query and update operators.
//!
//! Callers building filters or updates by hand can take operator names from here instead
//! of typing wire syntax. The catalog is built once, on first access, and is read-only
//! afterwards; every accessor hands out the same `&'static` token for a given operator.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docrepo_core::operator::op;
//!
//! let adults = doc! { "age": op::gte().apply(18) };
//! let either = doc! { op::or().name(): [{ "role": "admin" }, { "role": "owner" }] };
//! ```

use std::{collections::HashMap, fmt};

use bson::{Bson, Document};
use once_cell::sync::Lazy;

/// Groups operators by what they act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorCategory {
    Comparison,
    Logical,
    Element,
    Array,
}

/// A named operator token as understood by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operator {
    name: &'static str,
    category: OperatorCategory,
}

impl Operator {
    /// The wire name, including the leading `$`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn category(&self) -> OperatorCategory {
        self.category
    }

    /// Wraps `value` as the operand of this operator: `{ "<op>": value }`.
    pub fn apply(&self, value: impl Into<Bson>) -> Document {
        let mut document = Document::new();
        document.insert(self.name, value.into());
        document
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Read-only registry of every supported operator, keyed by wire name.
#[derive(Debug)]
pub struct OperatorCatalog {
    operators: HashMap<&'static str, Operator>,
}

impl OperatorCatalog {
    fn new() -> Self {
        let mut catalog = Self { operators: HashMap::new() };

        for name in ["$eq", "$gt", "$gte", "$in", "$lt", "$lte", "$ne", "$nin"] {
            catalog.register(name, OperatorCategory::Comparison);
        }
        for name in ["$and", "$not", "$nor", "$or"] {
            catalog.register(name, OperatorCategory::Logical);
        }
        for name in ["$exists", "$type"] {
            catalog.register(name, OperatorCategory::Element);
        }
        for name in ["$addToSet", "$pop", "$pull", "$push", "$pullAll", "$elemMatch"] {
            catalog.register(name, OperatorCategory::Array);
        }

        catalog
    }

    fn register(&mut self, name: &'static str, category: OperatorCategory) {
        let previous = self.operators.insert(name, Operator { name, category });
        assert!(previous.is_none(), "operator {name} registered twice");
    }

    /// Looks up an operator by its wire name.
    pub fn get(&self, name: &str) -> Option<&Operator> {
        self.operators.get(name)
    }

    /// Returns every operator in `category`, sorted by name.
    pub fn by_category(&self, category: OperatorCategory) -> Vec<&Operator> {
        let mut operators = self
            .operators
            .values()
            .filter(|operator| operator.category == category)
            .collect::<Vec<_>>();

        operators.sort_by_key(|operator| operator.name);
        operators
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

static CATALOG: Lazy<OperatorCatalog> = Lazy::new(OperatorCatalog::new);

/// Returns the process-wide operator catalog.
pub fn catalog() -> &'static OperatorCatalog {
    &CATALOG
}

/// Accessors for each catalogued operator.
pub mod op {
    use super::{Operator, catalog};

    macro_rules! operators {
        ($($(#[$meta:meta])* $fn_name:ident => $wire:literal),* $(,)?) => {
            $(
                $(#[$meta])*
                pub fn $fn_name() -> &'static Operator {
                    match catalog().get($wire) {
                        Some(operator) => operator,
                        None => unreachable!(concat!("operator ", $wire, " is always registered")),
                    }
                }
            )*
        };
    }

    operators! {
        /// Matches values equal to the operand.
        eq => "$eq",
        gt => "$gt",
        gte => "$gte",
        /// Matches any of the values in the operand array.
        in_ => "$in",
        lt => "$lt",
        lte => "$lte",
        ne => "$ne",
        nin => "$nin",
        and => "$and",
        not => "$not",
        nor => "$nor",
        or => "$or",
        exists => "$exists",
        type_ => "$type",
        add_to_set => "$addToSet",
        pop => "$pop",
        pull => "$pull",
        push => "$push",
        pull_all => "$pullAll",
        /// Matches arrays holding at least one element that satisfies every condition.
        elem_match => "$elemMatch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn catalog_holds_every_operator_once() {
        assert_eq!(catalog().len(), 20);
        assert_eq!(catalog().by_category(OperatorCategory::Comparison).len(), 8);
        assert_eq!(catalog().by_category(OperatorCategory::Logical).len(), 4);
        assert_eq!(catalog().by_category(OperatorCategory::Element).len(), 2);
        assert_eq!(catalog().by_category(OperatorCategory::Array).len(), 6);
    }

    #[test]
    fn accessors_return_the_same_token() {
        assert!(std::ptr::eq(op::gt(), op::gt()));
        assert!(std::ptr::eq(op::gt(), catalog().get("$gt").unwrap()));
        assert_eq!(op::elem_match().category(), OperatorCategory::Array);
        assert_eq!(op::in_().to_string(), "$in");
    }

    #[test]
    fn apply_wraps_the_operand() {
        assert_eq!(op::gte().apply(18), doc! { "$gte": 18 });
        assert_eq!(
            doc! { "tags": op::in_().apply(vec!["a", "b"]) },
            doc! { "tags": { "$in": ["a", "b"] } },
        );
    }

    #[test]
    fn unknown_names_are_absent() {
        assert!(catalog().get("$regex").is_none());
    }
}
